//! Channel policy configuration: which policy governs each chaincode and
//! each of its private-data collections.

use std::collections::BTreeMap;

use endorse_common::{ChaincodeId, CollectionConfig, EndorseError, Result};
use serde::{Deserialize, Serialize};

/// Supplies chaincode endorsement policies and collection configurations.
pub trait PolicyProvider: Send + Sync {
    /// Endorsement policy expression of a chaincode.
    ///
    /// Fails with [`EndorseError::UnknownChaincode`] when the chaincode is
    /// not defined on the channel.
    fn chaincode_policy(&self, chaincode: &str) -> Result<String>;

    /// Configuration of one collection of a chaincode.
    ///
    /// Fails with [`EndorseError::UnknownCollection`] when the chaincode has
    /// no such collection.
    fn collection_config(&self, chaincode: &str, collection: &str) -> Result<CollectionConfig>;
}

/// A chaincode as defined on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeDefinition {
    pub policy: String,
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

impl ChaincodeDefinition {
    pub fn new(policy: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            collections: Vec::new(),
        }
    }

    pub fn with_collection(mut self, collection: CollectionConfig) -> Self {
        self.collections.retain(|c| c.name != collection.name);
        self.collections.push(collection);
        self
    }
}

/// In-memory [`PolicyProvider`] built from chaincode definitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticPolicyProvider {
    chaincodes: BTreeMap<ChaincodeId, ChaincodeDefinition>,
}

impl StaticPolicyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a provider, validating every collection config.
    pub fn from_definitions(
        chaincodes: impl IntoIterator<Item = (ChaincodeId, ChaincodeDefinition)>,
    ) -> Result<Self> {
        let provider = Self {
            chaincodes: chaincodes.into_iter().collect(),
        };
        provider.validate()?;
        Ok(provider)
    }

    pub fn with_chaincode(mut self, id: impl Into<ChaincodeId>, definition: ChaincodeDefinition) -> Self {
        self.chaincodes.insert(id.into(), definition);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (id, definition) in &self.chaincodes {
            for collection in &definition.collections {
                collection.validate().map_err(|e| match e {
                    EndorseError::InvalidConfig(msg) => {
                        EndorseError::InvalidConfig(format!("chaincode '{}': {}", id, msg))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    pub fn chaincodes(&self) -> impl Iterator<Item = (&ChaincodeId, &ChaincodeDefinition)> {
        self.chaincodes.iter()
    }
}

impl PolicyProvider for StaticPolicyProvider {
    fn chaincode_policy(&self, chaincode: &str) -> Result<String> {
        self.chaincodes
            .get(chaincode)
            .map(|d| d.policy.clone())
            .ok_or_else(|| EndorseError::UnknownChaincode(chaincode.to_string()))
    }

    fn collection_config(&self, chaincode: &str, collection: &str) -> Result<CollectionConfig> {
        let definition = self
            .chaincodes
            .get(chaincode)
            .ok_or_else(|| EndorseError::UnknownChaincode(chaincode.to_string()))?;
        definition
            .collections
            .iter()
            .find(|c| c.name == collection)
            .cloned()
            .ok_or_else(|| EndorseError::UnknownCollection {
                chaincode: chaincode.to_string(),
                collection: collection.to_string(),
            })
    }
}
