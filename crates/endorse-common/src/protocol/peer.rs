use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type OrgId = String;

/// Reachability of a peer as last observed by the liveness prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Live,
    Unreachable,
}

/// A peer as seen in a directory snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub endpoint: String,
    pub org: OrgId,
    pub liveness: Liveness,
    /// Last observed round-trip latency, if the peer has ever been probed.
    #[serde(default, with = "opt_millis")]
    pub latency: Option<Duration>,
}

impl PeerInfo {
    pub fn new(endpoint: impl Into<String>, org: impl Into<OrgId>) -> Self {
        Self {
            endpoint: endpoint.into(),
            org: org.into(),
            liveness: Liveness::Live,
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.liveness = Liveness::Unreachable;
        self
    }

    pub fn is_live(&self) -> bool {
        self.liveness == Liveness::Live
    }

    /// Ordering key used for deterministic tie-breaks: known latency first
    /// (lowest wins), then endpoint.
    pub fn rank_key(&self) -> (Duration, &str) {
        (self.latency.unwrap_or(Duration::MAX), self.endpoint.as_str())
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
