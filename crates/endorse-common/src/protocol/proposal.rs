use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

pub type TxId = String;
pub type ChaincodeId = String;

static TX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A transaction proposal sent to endorsing peers for simulation.
///
/// The same proposal is sent to every peer of an attempt; peers return a
/// [`ProposalResponse`](super::ProposalResponse) carrying the simulated
/// read/write set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proposal {
    pub tx_id: TxId,
    pub channel_id: String,
    pub chaincode_id: ChaincodeId,
    pub fcn: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub transient: BTreeMap<String, String>,
}

impl Proposal {
    pub fn new(
        channel_id: impl Into<String>,
        chaincode_id: impl Into<ChaincodeId>,
        fcn: impl Into<String>,
    ) -> Self {
        Proposal {
            tx_id: generate_tx_id(),
            channel_id: channel_id.into(),
            chaincode_id: chaincode_id.into(),
            fcn: fcn.into(),
            args: Vec::new(),
            transient: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transient(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transient.insert(key.into(), value.into());
        self
    }
}

fn generate_tx_id() -> TxId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    // Counter keeps ids unique within the same nanosecond
    let counter = TX_COUNTER.fetch_add(1, Ordering::SeqCst);

    format!("{:016x}{:08x}", timestamp, counter & 0xFFFF_FFFF)
}
