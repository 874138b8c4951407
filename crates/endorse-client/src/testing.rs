//! Scripted in-memory transport for unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use endorse_common::{
    EndorseError, NamespaceRwSet, PeerInfo, Proposal, ProposalResponse, ProposalTransport,
    ReadWriteSet, Result,
};

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Endorse,
    /// Transport error
    Down,
    /// Response with status 500
    Reject,
    /// Endorses with a different payload
    Diverge,
    /// Endorses after sleeping
    Delay(Duration),
    /// Transport error for the next `n` calls, then endorses
    DownFor(u32),
}

pub(crate) struct ScriptedTransport {
    scripts: Mutex<BTreeMap<String, Script>>,
    rwset: Mutex<Option<ReadWriteSet>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(BTreeMap::new()),
            rwset: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn script(&self, endpoint: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), script);
    }

    /// Read/write set returned by every peer; defaults to a plain write in
    /// the proposal's chaincode.
    pub(crate) fn set_rwset(&self, rwset: ReadWriteSet) {
        *self.rwset.lock().unwrap() = Some(rwset);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, endpoint: &str) -> usize {
        self.calls().iter().filter(|c| *c == endpoint).count()
    }
}

#[async_trait]
impl ProposalTransport for ScriptedTransport {
    async fn send_proposal(&self, peer: &PeerInfo, proposal: &Proposal) -> Result<ProposalResponse> {
        self.calls.lock().unwrap().push(peer.endpoint.clone());
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.get(&peer.endpoint).cloned().unwrap_or(Script::Endorse);
            if let Script::DownFor(n) = script {
                let next = if n <= 1 { Script::Endorse } else { Script::DownFor(n - 1) };
                scripts.insert(peer.endpoint.clone(), next);
            }
            script
        };

        let mut payload = b"ok".to_vec();
        match script {
            Script::Down | Script::DownFor(_) => {
                return Err(EndorseError::Transport {
                    peer: peer.endpoint.clone(),
                    message: "connection refused".to_string(),
                })
            }
            Script::Reject => {
                return Ok(ProposalResponse::rejected(
                    proposal.tx_id.clone(),
                    peer.endpoint.clone(),
                    peer.org.clone(),
                    500,
                    "chaincode error",
                ))
            }
            Script::Diverge => payload = b"different".to_vec(),
            Script::Delay(delay) => tokio::time::sleep(delay).await,
            Script::Endorse => {}
        }

        let rwset = self.rwset.lock().unwrap().clone().unwrap_or_else(|| ReadWriteSet {
            namespaces: vec![NamespaceRwSet::new(proposal.chaincode_id.clone()).with_write("k", "v")],
        });
        Ok(ProposalResponse::success(
            proposal.tx_id.clone(),
            peer.endpoint.clone(),
            peer.org.clone(),
            payload,
            rwset,
        ))
    }

    async fn probe(&self, _peer: &PeerInfo) -> Result<()> {
        Ok(())
    }
}
