use std::time::{Duration, Instant};

use endorse_common::{Liveness, PeerInfo};

/// Reason why a peer is excluded from selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// Manually disabled by an operator - never re-enabled by the prober
    Manual,
    /// Disabled after consecutive probe failures - re-enabled on the next success
    Probe,
}

/// Outcome of the last liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Reachable,
    Unreachable(String),
}

/// A peer tracked by a managed directory, with its probe history
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub endpoint: String,
    pub org: String,
    pub disable_reason: Option<DisableReason>,
    pub consecutive_failures: u32,
    pub latency: Option<Duration>,
    pub last_probe: Option<Instant>,
    pub last_probe_status: Option<ProbeStatus>,
}

impl PeerEntry {
    pub fn new(endpoint: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            org: org.into(),
            disable_reason: None,
            consecutive_failures: 0,
            latency: None,
            last_probe: None,
            last_probe_status: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.disable_reason.is_none()
    }

    /// The view of this peer handed out in directory snapshots.
    pub fn to_info(&self) -> PeerInfo {
        PeerInfo {
            endpoint: self.endpoint.clone(),
            org: self.org.clone(),
            liveness: if self.is_enabled() {
                Liveness::Live
            } else {
                Liveness::Unreachable
            },
            latency: self.latency,
        }
    }
}
