//! Endorse Channel Client
//!
//! Policy-aware transaction submission: every attempt builds the invocation
//! chain, selects a minimal set of endorsers satisfying each chaincode and
//! collection policy, sends the proposal to them concurrently and validates
//! that the endorsements agree.
//!
//! - [`ChannelClient`]: entry point, `submit(&Proposal, SubmitOptions)`
//! - [`ExecutionCoordinator`]: concurrent dispatch, alternates and
//!   agreement checks
//! - [`RetryOrchestrator`]: state machine re-driving the pipeline with
//!   exponential backoff

pub mod client;
pub mod coordinator;
pub mod retry;

#[cfg(test)]
mod testing;

pub use client::{ChannelClient, ClientConfig, SubmitOptions};
pub use coordinator::{ExecutionCoordinator, ExecutionResult};
pub use retry::{
    compute_delay, AttemptHandle, AttemptState, RetryOrchestrator, RetryPolicy, Transition,
};
