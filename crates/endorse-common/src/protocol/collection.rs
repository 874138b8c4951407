use serde::{Deserialize, Serialize};

use super::error::{EndorseError, Result};

/// Static configuration of a private-data collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Member-orgs policy expression, e.g. `OR('Org2MSP.member')`
    pub policy: String,
    #[serde(default)]
    pub required_peer_count: u32,
    #[serde(default = "default_maximum_peer_count")]
    pub maximum_peer_count: u32,
    /// Number of blocks private data is retained for; 0 keeps it forever
    #[serde(default)]
    pub block_to_live: u64,
}

fn default_maximum_peer_count() -> u32 {
    1
}

impl CollectionConfig {
    pub fn new(
        name: impl Into<String>,
        policy: impl Into<String>,
        required_peer_count: u32,
        maximum_peer_count: u32,
        block_to_live: u64,
    ) -> Result<Self> {
        let config = Self {
            name: name.into(),
            policy: policy.into(),
            required_peer_count,
            maximum_peer_count,
            block_to_live,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EndorseError::InvalidConfig(
                "collection name must not be empty".to_string(),
            ));
        }
        if self.required_peer_count > self.maximum_peer_count {
            return Err(EndorseError::InvalidConfig(format!(
                "collection '{}': required_peer_count ({}) exceeds maximum_peer_count ({})",
                self.name, self.required_peer_count, self.maximum_peer_count
            )));
        }
        Ok(())
    }
}
