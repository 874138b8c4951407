//! Read/write sets produced by proposal simulation.
//!
//! A read/write set lists, per chaincode namespace, the public keys read and
//! written and the private-data collections touched. The chain builder uses
//! it to discover which chaincodes and collections an invocation really
//! touches; the coordinator compares it across peers to detect divergence.

use serde::{Deserialize, Serialize};

use super::ChaincodeId;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReadWriteSet {
    pub namespaces: Vec<NamespaceRwSet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NamespaceRwSet {
    pub namespace: ChaincodeId,
    #[serde(default)]
    pub reads: Vec<KvRead>,
    #[serde(default)]
    pub writes: Vec<KvWrite>,
    #[serde(default)]
    pub collections: Vec<CollectionRwSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct KvRead {
    pub key: String,
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct KvWrite {
    pub key: String,
    #[serde(default)]
    pub value: Vec<u8>,
    #[serde(default)]
    pub is_delete: bool,
}

/// Hashed reads/writes against one private-data collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CollectionRwSet {
    pub collection: String,
    #[serde(default)]
    pub read_keys: Vec<String>,
    #[serde(default)]
    pub write_keys: Vec<String>,
}

impl ReadWriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self, id: &str) -> Option<&NamespaceRwSet> {
        self.namespaces.iter().find(|ns| ns.namespace == id)
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

impl NamespaceRwSet {
    pub fn new(namespace: impl Into<ChaincodeId>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_write(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.writes.push(KvWrite {
            key: key.into(),
            value: value.into(),
            is_delete: false,
        });
        self
    }

    pub fn with_read(mut self, key: impl Into<String>, version: Option<u64>) -> Self {
        self.reads.push(KvRead {
            key: key.into(),
            version,
        });
        self
    }

    pub fn with_collection_write(
        mut self,
        collection: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let collection = collection.into();
        let key = key.into();
        match self.collections.iter_mut().find(|c| c.collection == collection) {
            Some(existing) => existing.write_keys.push(key),
            None => self.collections.push(CollectionRwSet {
                collection,
                read_keys: Vec::new(),
                write_keys: vec![key],
            }),
        }
        self
    }

    pub fn with_collection_read(
        mut self,
        collection: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let collection = collection.into();
        let key = key.into();
        match self.collections.iter_mut().find(|c| c.collection == collection) {
            Some(existing) => existing.read_keys.push(key),
            None => self.collections.push(CollectionRwSet {
                collection,
                read_keys: vec![key],
                write_keys: Vec::new(),
            }),
        }
        self
    }

    /// Names of the collections this namespace touched, sorted and de-duplicated.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .iter()
            .filter(|c| !c.read_keys.is_empty() || !c.write_keys.is_empty())
            .map(|c| c.collection.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
