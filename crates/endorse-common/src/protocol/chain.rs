//! Invocation chains: which chaincodes and collections an invocation touches.

use serde::{Deserialize, Serialize};

use super::ChaincodeId;

/// One chaincode touched by an invocation, with the private collections it uses.
///
/// An empty collection list means only the chaincode's own endorsement
/// policy applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChaincodeCall {
    pub id: ChaincodeId,
    #[serde(default)]
    pub collections: Vec<String>,
}

impl ChaincodeCall {
    pub fn new(id: impl Into<ChaincodeId>) -> Self {
        Self {
            id: id.into(),
            collections: Vec::new(),
        }
    }

    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for c in collections {
            let c = c.into();
            if !self.collections.contains(&c) {
                self.collections.push(c);
            }
        }
        self
    }
}

/// Ordered set of [`ChaincodeCall`]s, unique by chaincode id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationChain {
    calls: Vec<ChaincodeCall>,
}

impl InvocationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a call, merging its collections into an existing entry with the same id.
    pub fn push(&mut self, call: ChaincodeCall) {
        match self.calls.iter_mut().find(|c| c.id == call.id) {
            Some(existing) => {
                for coll in call.collections {
                    if !existing.collections.contains(&coll) {
                        existing.collections.push(coll);
                    }
                }
            }
            None => self.calls.push(call),
        }
    }

    pub fn calls(&self) -> &[ChaincodeCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ChaincodeCall> {
        self.calls.iter().find(|c| c.id == id)
    }
}

impl FromIterator<ChaincodeCall> for InvocationChain {
    fn from_iter<T: IntoIterator<Item = ChaincodeCall>>(iter: T) -> Self {
        let mut chain = InvocationChain::new();
        for call in iter {
            chain.push(call);
        }
        chain
    }
}

impl<'a> IntoIterator for &'a InvocationChain {
    type Item = &'a ChaincodeCall;
    type IntoIter = std::slice::Iter<'a, ChaincodeCall>;

    fn into_iter(self) -> Self::IntoIter {
        self.calls.iter()
    }
}
