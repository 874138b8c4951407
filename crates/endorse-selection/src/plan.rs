use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use endorse_common::{ChaincodeCall, ChaincodeId, OrgId, PeerInfo, Policy};

/// Everything one chain entry's endorsements must satisfy.
///
/// The chaincode policy and each collection policy are evaluated
/// independently; an org set satisfies the requirement only if it satisfies
/// all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRequirement {
    pub chaincode: ChaincodeId,
    pub chaincode_policy: Arc<Policy>,
    /// Collection name and its member-orgs policy, in chain order
    pub collection_policies: Vec<(String, Arc<Policy>)>,
    /// Largest `required_peer_count` among the entry's collections
    pub required_peer_count: u32,
    /// Smallest `maximum_peer_count` among the entry's collections
    pub maximum_peer_count: Option<u32>,
}

impl EntryRequirement {
    pub fn new(chaincode: impl Into<ChaincodeId>, chaincode_policy: Arc<Policy>) -> Self {
        Self {
            chaincode: chaincode.into(),
            chaincode_policy,
            collection_policies: Vec::new(),
            required_peer_count: 0,
            maximum_peer_count: None,
        }
    }

    pub fn satisfied_by(&self, orgs: &BTreeSet<OrgId>) -> bool {
        self.satisfied_with(&|org: &str| orgs.contains(org))
    }

    pub fn satisfied_with<F>(&self, has_org: &F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        self.chaincode_policy.satisfied_with(has_org)
            && self
                .collection_policies
                .iter()
                .all(|(_, policy)| policy.satisfied_with(has_org))
    }

    /// Every organization named by any of the policies.
    pub fn orgs(&self) -> BTreeSet<OrgId> {
        let mut orgs = self.chaincode_policy.orgs();
        for (_, policy) in &self.collection_policies {
            orgs.extend(policy.orgs());
        }
        orgs
    }
}

impl fmt::Display for EntryRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.collection_policies.is_empty() {
            return write!(f, "{}", self.chaincode_policy);
        }
        write!(f, "AND({}", self.chaincode_policy)?;
        for (_, policy) in &self.collection_policies {
            write!(f, ", {}", policy)?;
        }
        write!(f, ")")
    }
}

/// Peers chosen for one chain entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub call: ChaincodeCall,
    pub requirement: EntryRequirement,
    /// Non-empty, ordered by endpoint
    pub peers: Vec<PeerInfo>,
}

impl PlanEntry {
    pub fn orgs(&self) -> BTreeSet<OrgId> {
        self.peers.iter().map(|p| p.org.clone()).collect()
    }
}

/// Per-entry peer assignment for one attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndorsementPlan {
    entries: Vec<PlanEntry>,
}

impl EndorsementPlan {
    pub fn new(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn entry(&self, chaincode: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.call.id == chaincode)
    }

    /// Union of every entry's peers, de-duplicated and ordered by endpoint.
    pub fn dispatch_set(&self) -> Vec<PeerInfo> {
        let mut peers: BTreeMap<&str, &PeerInfo> = BTreeMap::new();
        for entry in &self.entries {
            for peer in &entry.peers {
                peers.entry(peer.endpoint.as_str()).or_insert(peer);
            }
        }
        peers.into_values().cloned().collect()
    }

    /// Organizations of the dispatch set.
    pub fn orgs(&self) -> BTreeSet<OrgId> {
        self.entries.iter().flat_map(|e| e.orgs()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
