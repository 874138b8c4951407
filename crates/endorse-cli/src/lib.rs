//! # Endorse CLI
//!
//! Library half of the `endorse` binary: the JSON network file and the
//! reports printed by each subcommand.
//!
//! ## Key Commands
//!
//! - `endorse policy`: parse a policy and optionally check an org set against it
//! - `endorse select`: print the endorsement plan for an explicit chain
//! - `endorse submit`: collect endorsements over JSON-RPC and print the result

pub mod network;
pub mod report;

pub use network::{NetworkConfig, PeerConfig};
pub use report::{build_chain, evaluate_policy, PlanReport, PolicyReport, SubmitReport};
