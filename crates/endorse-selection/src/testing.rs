//! In-memory transport for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use endorse_common::{
    EndorseError, PeerInfo, Proposal, ProposalResponse, ProposalTransport, ReadWriteSet, Result,
};

#[derive(Default)]
pub(crate) struct FakeTransport {
    down: Mutex<BTreeSet<String>>,
    rejecting: Mutex<BTreeSet<String>>,
    rwsets: Mutex<BTreeMap<String, ReadWriteSet>>,
    default_rwset: Mutex<ReadWriteSet>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_down(&self, endpoint: &str, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(endpoint.to_string());
        } else {
            set.remove(endpoint);
        }
    }

    pub(crate) fn reject(&self, endpoint: &str) {
        self.rejecting.lock().unwrap().insert(endpoint.to_string());
    }

    pub(crate) fn set_rwset(&self, endpoint: &str, rwset: ReadWriteSet) {
        self.rwsets.lock().unwrap().insert(endpoint.to_string(), rwset);
    }

    pub(crate) fn set_default_rwset(&self, rwset: ReadWriteSet) {
        *self.default_rwset.lock().unwrap() = rwset;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProposalTransport for FakeTransport {
    async fn send_proposal(&self, peer: &PeerInfo, proposal: &Proposal) -> Result<ProposalResponse> {
        self.calls.lock().unwrap().push(peer.endpoint.clone());
        if self.down.lock().unwrap().contains(&peer.endpoint) {
            return Err(EndorseError::Transport {
                peer: peer.endpoint.clone(),
                message: "connection refused".to_string(),
            });
        }
        if self.rejecting.lock().unwrap().contains(&peer.endpoint) {
            return Ok(ProposalResponse::rejected(
                proposal.tx_id.clone(),
                peer.endpoint.clone(),
                peer.org.clone(),
                500,
                "chaincode error",
            ));
        }
        let rwset = self
            .rwsets
            .lock()
            .unwrap()
            .get(&peer.endpoint)
            .cloned()
            .unwrap_or_else(|| self.default_rwset.lock().unwrap().clone());
        Ok(ProposalResponse::success(
            proposal.tx_id.clone(),
            peer.endpoint.clone(),
            peer.org.clone(),
            b"ok".to_vec(),
            rwset,
        ))
    }

    async fn probe(&self, peer: &PeerInfo) -> Result<()> {
        if self.down.lock().unwrap().contains(&peer.endpoint) {
            return Err(EndorseError::Transport {
                peer: peer.endpoint.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}
