//! Endorser Selection
//!
//! Turns channel policies and a peer directory into endorsement plans.
//!
//! - [`PeerDirectory`] / [`DirectorySnapshot`]: immutable per-attempt view of peers
//! - [`ManagedPeerDirectory`] + [`LivenessProber`]: runtime liveness tracking
//! - [`PolicyProvider`]: chaincode and collection policies of a channel
//! - [`EndorserSelector`]: minimal covering peer sets per chain entry
//! - [`InvocationChainBuilder`]: explicit or simulated invocation chains

pub mod chain_builder;
pub mod directory;
pub mod peer;
pub mod plan;
pub mod prober;
pub mod provider;
pub mod selector;

#[cfg(test)]
mod testing;

pub use chain_builder::{ChainBuilderConfig, InvocationChainBuilder};
pub use directory::{DirectorySnapshot, ManagedPeerDirectory, PeerDirectory, StaticPeerDirectory};
pub use peer::{DisableReason, PeerEntry, ProbeStatus};
pub use plan::{EndorsementPlan, EntryRequirement, PlanEntry};
pub use prober::{LivenessProber, ProbeConfig, ProbeUpdate, MIN_PROBE_INTERVAL};
pub use provider::{ChaincodeDefinition, PolicyProvider, StaticPolicyProvider};
pub use selector::{EndorserSelector, SelectorConfig, MAX_EXHAUSTIVE_ORG_LIMIT};
