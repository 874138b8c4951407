//! Proposal responses returned by endorsing peers.

use serde::{Deserialize, Serialize};

use super::{ReadWriteSet, TxId};

/// Status code of a successful simulation.
pub const STATUS_OK: i32 = 200;

/// Responses with a status at or above this value are rejections.
pub const STATUS_ERROR_THRESHOLD: i32 = 400;

/// A single peer's response to a proposal.
///
/// # Fields
///
/// - `endpoint` / `org`: which peer endorsed
/// - `status` / `message`: simulation outcome
/// - `payload`: chaincode return value
/// - `rwset`: the simulated read/write set
///
/// Two responses *agree* when status, payload and read/write set are all
/// identical; endpoint and org naturally differ between peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalResponse {
    pub tx_id: TxId,
    pub endpoint: String,
    pub org: String,
    pub status: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub rwset: ReadWriteSet,
}

impl ProposalResponse {
    pub fn success(
        tx_id: impl Into<TxId>,
        endpoint: impl Into<String>,
        org: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        rwset: ReadWriteSet,
    ) -> Self {
        ProposalResponse {
            tx_id: tx_id.into(),
            endpoint: endpoint.into(),
            org: org.into(),
            status: STATUS_OK,
            message: String::new(),
            payload: payload.into(),
            rwset,
        }
    }

    pub fn rejected(
        tx_id: impl Into<TxId>,
        endpoint: impl Into<String>,
        org: impl Into<String>,
        status: i32,
        message: impl Into<String>,
    ) -> Self {
        ProposalResponse {
            tx_id: tx_id.into(),
            endpoint: endpoint.into(),
            org: org.into(),
            status,
            message: message.into(),
            payload: Vec::new(),
            rwset: ReadWriteSet::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status >= STATUS_OK && self.status < STATUS_ERROR_THRESHOLD
    }

    /// Whether two responses carry the same endorsement outcome.
    pub fn agrees_with(&self, other: &ProposalResponse) -> bool {
        self.status == other.status && self.payload == other.payload && self.rwset == other.rwset
    }
}
