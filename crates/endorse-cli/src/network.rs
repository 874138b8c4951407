//! JSON network file: channel name, peers and chaincode definitions.
//!
//! ```json
//! {
//!   "channel": "mychannel",
//!   "peers": [
//!     { "endpoint": "127.0.0.1:7051", "org": "Org1MSP", "latency_ms": 3 },
//!     { "endpoint": "127.0.0.1:9051", "org": "Org2MSP", "live": false }
//!   ],
//!   "chaincodes": {
//!     "pvtcc": {
//!       "policy": "OR('Org1MSP.member', 'Org2MSP.member')",
//!       "collections": [
//!         { "name": "collection1", "policy": "OR('Org2MSP.member')",
//!           "required_peer_count": 0, "maximum_peer_count": 1 }
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use endorse_common::{EndorseError, OrgId, PeerInfo, Result};
use endorse_selection::{DirectorySnapshot, ManagedPeerDirectory, StaticPolicyProvider};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub endpoint: String,
    pub org: OrgId,
    /// Last known latency, used to rank peers before the first probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default = "default_live")]
    pub live: bool,
}

fn default_live() -> bool {
    true
}

impl PeerConfig {
    pub fn to_info(&self) -> PeerInfo {
        let mut peer = PeerInfo::new(self.endpoint.clone(), self.org.clone());
        if let Some(ms) = self.latency_ms {
            peer = peer.with_latency(Duration::from_millis(ms));
        }
        if !self.live {
            peer = peer.unreachable();
        }
        peer
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub channel: String,
    pub peers: Vec<PeerConfig>,
    #[serde(default)]
    pub chaincodes: StaticPolicyProvider,
}

impl NetworkConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: NetworkConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel.is_empty() {
            return Err(EndorseError::InvalidConfig(
                "channel name must not be empty".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for peer in &self.peers {
            if peer.endpoint.is_empty() || peer.org.is_empty() {
                return Err(EndorseError::InvalidConfig(
                    "every peer needs an endpoint and an org".to_string(),
                ));
            }
            if !seen.insert(peer.endpoint.as_str()) {
                return Err(EndorseError::InvalidConfig(format!(
                    "duplicate peer endpoint '{}'",
                    peer.endpoint
                )));
            }
        }

        self.chaincodes.validate()
    }

    pub fn peer_infos(&self) -> Vec<PeerInfo> {
        self.peers.iter().map(PeerConfig::to_info).collect()
    }

    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot::new(self.peer_infos())
    }

    /// A runtime directory seeded from the file; peers marked not live start
    /// disabled until a probe succeeds.
    pub fn directory(&self) -> ManagedPeerDirectory {
        ManagedPeerDirectory::new(self.peer_infos())
    }
}
