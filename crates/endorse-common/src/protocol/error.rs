use thiserror::Error;

/// Error taxonomy for policy resolution, endorser selection and submission.
///
/// Variants are split into three groups:
///
/// - **Terminal**: surfaced immediately, never retried (`MalformedPolicy`,
///   `EndorsementMismatch`, configuration errors)
/// - **Retryable**: the orchestrator re-drives the whole pipeline
///   (`SimulationFailed`, `InsufficientEndorsers`, `AttemptTimedOut`)
/// - **Per-peer**: absorbed by the coordinator while alternates exist
///   (`Timeout`, `Transport`, `ProposalRejected`)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EndorseError {
    #[error("Malformed policy '{expression}': {reason}")]
    MalformedPolicy { expression: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown chaincode: {0}")]
    UnknownChaincode(String),

    #[error("Unknown collection '{collection}' in chaincode '{chaincode}'")]
    UnknownCollection { chaincode: String, collection: String },

    #[error("Simulation failed for chaincode '{chaincode}': {cause}")]
    SimulationFailed { chaincode: String, cause: String },

    #[error("Insufficient endorsers for chaincode '{chaincode}' under policy {policy}: {cause}")]
    InsufficientEndorsers {
        chaincode: String,
        policy: String,
        cause: String,
    },

    #[error("Endorsement mismatch for chaincode '{chaincode}': {details}")]
    EndorsementMismatch { chaincode: String, details: String },

    #[error("Request to {peer} timed out after {timeout_ms}ms")]
    Timeout { peer: String, timeout_ms: u64 },

    #[error("Transport error from {peer}: {message}")]
    Transport { peer: String, message: String },

    #[error("Proposal rejected by {peer} with status {status}: {message}")]
    ProposalRejected {
        peer: String,
        status: i32,
        message: String,
    },

    #[error("Attempt timed out after {0}ms")]
    AttemptTimedOut(u64),

    #[error("Deadline exceeded before the operation could complete")]
    DeadlineExceeded,

    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<EndorseError>,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl EndorseError {
    /// Whether the retry orchestrator should re-run the pipeline after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EndorseError::SimulationFailed { .. }
                | EndorseError::InsufficientEndorsers { .. }
                | EndorseError::AttemptTimedOut(_)
        )
    }

    /// Whether this error describes a single peer call rather than the attempt.
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            EndorseError::Timeout { .. }
                | EndorseError::Transport { .. }
                | EndorseError::ProposalRejected { .. }
        )
    }

    /// Short, stable label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EndorseError::MalformedPolicy { .. } => "malformed_policy",
            EndorseError::InvalidConfig(_) => "invalid_config",
            EndorseError::UnknownChaincode(_) => "unknown_chaincode",
            EndorseError::UnknownCollection { .. } => "unknown_collection",
            EndorseError::SimulationFailed { .. } => "simulation_failed",
            EndorseError::InsufficientEndorsers { .. } => "insufficient_endorsers",
            EndorseError::EndorsementMismatch { .. } => "endorsement_mismatch",
            EndorseError::Timeout { .. } => "timeout",
            EndorseError::Transport { .. } => "transport",
            EndorseError::ProposalRejected { .. } => "proposal_rejected",
            EndorseError::AttemptTimedOut(_) => "attempt_timed_out",
            EndorseError::DeadlineExceeded => "deadline_exceeded",
            EndorseError::RetriesExhausted { .. } => "retries_exhausted",
            EndorseError::JsonSerialization(_) => "json_serialization",
            EndorseError::Io(_) => "io",
        }
    }

    /// Unwraps `RetriesExhausted` to the error that caused the final attempt to fail.
    pub fn root(&self) -> &EndorseError {
        match self {
            EndorseError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for EndorseError {
    fn from(err: serde_json::Error) -> Self {
        EndorseError::JsonSerialization(err.to_string())
    }
}

impl From<std::io::Error> for EndorseError {
    fn from(err: std::io::Error) -> Self {
        EndorseError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EndorseError>;
