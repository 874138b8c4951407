//! Endorse Common Types, Policy Language and Transport
//!
//! Shared building blocks for policy-aware endorsement submission on a
//! permissioned, multi-organization ledger network.
//!
//! # Overview
//!
//! A transaction must be endorsed by peers whose organizations satisfy every
//! membership policy governing the chaincodes and private-data collections it
//! touches. This crate provides the pieces every other crate agrees on:
//!
//! - **Protocol Layer**: proposals, peer responses, read/write sets, peers,
//!   invocation chains, collection configs and the error taxonomy
//! - **Policy Layer**: the `AND`/`OR`/`OutOf` policy language, its parser and
//!   a memoizing resolver
//! - **Transport Layer**: the [`ProposalTransport`] seam and a JSON-RPC over
//!   HTTP implementation
//!
//! # Components
//!
//! - [`protocol`] - Core protocol types and [`EndorseError`]
//! - [`policy`] - [`Policy`] trees and [`PolicyResolver`]
//! - [`transport`] - [`ProposalTransport`] and [`HttpTransport`]
//!
//! # Example
//!
//! ```
//! use endorse_common::{PolicyResolver, Proposal};
//! use std::collections::BTreeSet;
//!
//! let resolver = PolicyResolver::new();
//! let policy = resolver.resolve("OR('Org1MSP.member', 'Org2MSP.member')").unwrap();
//!
//! let orgs: BTreeSet<String> = ["Org2MSP".to_string()].into_iter().collect();
//! assert!(policy.satisfied_by(&orgs));
//!
//! let proposal = Proposal::new("orgchannel", "pvtcc", "putprivate")
//!     .with_args(["collection1", "key", "value"]);
//! ```

pub mod policy;
pub mod protocol;
pub mod transport;

pub use policy::{Policy, PolicyResolver, Role};
pub use protocol::*;
pub use transport::{HttpTransport, ProposalTransport};
