//! Peer transport layer.
//!
//! The core never opens sockets itself: every peer interaction goes through a
//! [`ProposalTransport`]. Two operations are needed:
//!
//! - **send_proposal**: simulate a proposal on one peer and return its response
//! - **probe**: cheap liveness check used by the directory's prober
//!
//! [`HttpTransport`] implements both as JSON-RPC 2.0 over HTTP. Tests and
//! embedders can supply their own implementation.

pub mod http;

pub use http::HttpTransport;

use async_trait::async_trait;

use crate::protocol::{PeerInfo, Proposal, ProposalResponse, Result};

#[async_trait]
pub trait ProposalTransport: Send + Sync {
    /// Sends `proposal` to `peer` and returns the peer's response.
    ///
    /// A response whose status is not a success is still returned as `Ok`;
    /// only transport-level failures are errors.
    async fn send_proposal(&self, peer: &PeerInfo, proposal: &Proposal) -> Result<ProposalResponse>;

    /// Checks that `peer` is reachable.
    async fn probe(&self, peer: &PeerInfo) -> Result<()>;
}
