use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use endorse_common::{
    ChaincodeCall, EndorseError, InvocationChain, OrgId, PeerInfo, Proposal, ProposalResponse,
    ProposalTransport, ReadWriteSet, Result,
};
use tracing::{debug, warn};

use crate::directory::DirectorySnapshot;
use crate::selector::EndorserSelector;

/// Chain builder configuration.
#[derive(Debug, Clone)]
pub struct ChainBuilderConfig {
    /// Namespaces never added to a detected chain
    pub ignored_namespaces: BTreeSet<String>,
}

impl Default for ChainBuilderConfig {
    fn default() -> Self {
        Self {
            ignored_namespaces: ["lscc", "_lifecycle"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Produces the invocation chain for a proposal, either verbatim from the
/// caller or by simulating once and reading the resulting read/write set.
pub struct InvocationChainBuilder {
    selector: Arc<EndorserSelector>,
    transport: Arc<dyn ProposalTransport>,
    config: ChainBuilderConfig,
}

impl InvocationChainBuilder {
    pub fn new(selector: Arc<EndorserSelector>, transport: Arc<dyn ProposalTransport>) -> Self {
        Self {
            selector,
            transport,
            config: ChainBuilderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChainBuilderConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns `explicit` unchanged when given, otherwise detects the chain.
    pub async fn build(
        &self,
        proposal: &Proposal,
        explicit: Option<&InvocationChain>,
        snapshot: &DirectorySnapshot,
        target_orgs: Option<&BTreeSet<OrgId>>,
        peer_timeout: Duration,
    ) -> Result<InvocationChain> {
        match explicit {
            Some(chain) => Ok(chain.clone()),
            None => self.detect(proposal, snapshot, target_orgs, peer_timeout).await,
        }
    }

    /// Simulates `proposal` once and derives the chain from the first
    /// successful response.
    ///
    /// Peers for the simulation come from selecting against the primary
    /// chaincode alone; if none of them succeed, the remaining live peers of
    /// organizations named by the primary policy are tried.
    pub async fn detect(
        &self,
        proposal: &Proposal,
        snapshot: &DirectorySnapshot,
        target_orgs: Option<&BTreeSet<OrgId>>,
        peer_timeout: Duration,
    ) -> Result<InvocationChain> {
        let primary = proposal.chaincode_id.as_str();
        let primary_chain: InvocationChain = std::iter::once(ChaincodeCall::new(primary)).collect();

        let provisional = match self.selector.select(&primary_chain, snapshot, target_orgs) {
            Ok(plan) => plan.dispatch_set(),
            Err(e) if e.is_retryable() => {
                debug!("No provisional plan for {}: {}", primary, e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut last_error = None;
        if !provisional.is_empty() {
            match self.simulate(proposal, &provisional, peer_timeout).await {
                Ok(response) => return Ok(self.chain_from_rwset(primary, &response.rwset)),
                Err(e) => last_error = Some(e),
            }
        }

        let requirement = self.selector.requirement(&ChaincodeCall::new(primary))?;
        let policy_orgs = requirement.orgs();
        let tried: BTreeSet<&str> = provisional.iter().map(|p| p.endpoint.as_str()).collect();
        let fallback: Vec<PeerInfo> = snapshot
            .live_peers()
            .filter(|p| policy_orgs.contains(&p.org))
            .filter(|p| target_orgs.map_or(true, |t| t.contains(&p.org)))
            .filter(|p| !tried.contains(p.endpoint.as_str()))
            .cloned()
            .collect();

        if !fallback.is_empty() {
            debug!(
                "Simulating {} on {} fallback peer(s)",
                primary,
                fallback.len()
            );
            match self.simulate(proposal, &fallback, peer_timeout).await {
                Ok(response) => return Ok(self.chain_from_rwset(primary, &response.rwset)),
                Err(e) => last_error = Some(e),
            }
        }

        let cause = last_error.map_or_else(
            || "no live peers available for simulation".to_string(),
            |e| e.to_string(),
        );
        warn!("Simulation of {} failed on every peer: {}", primary, cause);
        Err(EndorseError::SimulationFailed {
            chaincode: primary.to_string(),
            cause,
        })
    }

    /// Derives a chain from a simulated read/write set: the primary chaincode
    /// first, then every other namespace sorted by id, each with its touched
    /// collections sorted.
    pub fn chain_from_rwset(&self, primary: &str, rwset: &ReadWriteSet) -> InvocationChain {
        let mut namespaces: Vec<&str> = rwset
            .namespaces
            .iter()
            .map(|ns| ns.namespace.as_str())
            .filter(|id| *id != primary && !self.config.ignored_namespaces.contains(*id))
            .collect();
        namespaces.sort_unstable();
        namespaces.dedup();

        let collections_of = |id: &str| -> Vec<String> {
            let mut names: Vec<String> = rwset
                .namespaces
                .iter()
                .filter(|ns| ns.namespace == id)
                .flat_map(|ns| ns.collection_names())
                .collect();
            names.sort();
            names.dedup();
            names
        };

        let mut chain = InvocationChain::new();
        chain.push(ChaincodeCall::new(primary).with_collections(collections_of(primary)));
        for id in namespaces {
            chain.push(ChaincodeCall::new(id).with_collections(collections_of(id)));
        }
        debug!("Detected invocation chain {:?}", chain);
        chain
    }

    /// Sends the proposal to `peers` concurrently and returns the first
    /// successful response in endpoint order, or the failure of the last
    /// peer in that order. `peers` must not be empty.
    async fn simulate(
        &self,
        proposal: &Proposal,
        peers: &[PeerInfo],
        peer_timeout: Duration,
    ) -> Result<ProposalResponse> {

        let mut ordered: Vec<&PeerInfo> = peers.iter().collect();
        ordered.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));

        let calls = ordered.iter().map(|peer| {
            let transport = &self.transport;
            async move {
                match tokio::time::timeout(peer_timeout, transport.send_proposal(peer, proposal)).await {
                    Ok(result) => result,
                    Err(_) => Err(EndorseError::Timeout {
                        peer: peer.endpoint.clone(),
                        timeout_ms: peer_timeout.as_millis() as u64,
                    }),
                }
            }
        });
        let results = futures::future::join_all(calls).await;

        let mut last_error = EndorseError::Transport {
            peer: String::new(),
            message: "no peers to simulate on".to_string(),
        };
        for (peer, result) in ordered.iter().zip(results) {
            let error = match result {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => EndorseError::ProposalRejected {
                    peer: peer.endpoint.clone(),
                    status: response.status,
                    message: response.message,
                },
                Err(e) => e,
            };
            warn!("Simulation on {} failed: {}", peer.endpoint, error);
            last_error = error;
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChaincodeDefinition, StaticPolicyProvider};
    use crate::testing::FakeTransport;
    use endorse_common::{CollectionConfig, NamespaceRwSet, PolicyResolver};

    fn selector() -> Arc<EndorserSelector> {
        let provider = StaticPolicyProvider::new()
            .with_chaincode(
                "pvtcc",
                ChaincodeDefinition::new("OR('Org1MSP.member','Org2MSP.member')").with_collection(
                    CollectionConfig::new("collection1", "OR('Org2MSP.member')", 0, 1, 0).unwrap(),
                ),
            )
            .with_chaincode("helper", ChaincodeDefinition::new("'Org1MSP.member'"));
        Arc::new(EndorserSelector::new(
            Arc::new(provider),
            Arc::new(PolicyResolver::new()),
        ))
    }

    fn snapshot() -> DirectorySnapshot {
        DirectorySnapshot::new(vec![
            PeerInfo::new("peer0.org1:7051", "Org1MSP").with_latency(Duration::from_millis(5)),
            PeerInfo::new("peer1.org1:8051", "Org1MSP").with_latency(Duration::from_millis(9)),
            PeerInfo::new("peer0.org2:9051", "Org2MSP").with_latency(Duration::from_millis(20)),
        ])
    }

    fn rwset() -> ReadWriteSet {
        ReadWriteSet {
            namespaces: vec![
                NamespaceRwSet::new("lscc").with_read("pvtcc", Some(1)),
                NamespaceRwSet::new("pvtcc")
                    .with_collection_write("collection1", "key")
                    .with_write("public", b"v".to_vec()),
                NamespaceRwSet::new("helper").with_read("k", None),
            ],
        }
    }

    fn builder(transport: Arc<FakeTransport>) -> InvocationChainBuilder {
        InvocationChainBuilder::new(selector(), transport)
    }

    fn proposal() -> Proposal {
        Proposal::new("orgchannel", "pvtcc", "putprivate").with_args(["collection1", "key", "value"])
    }

    #[test]
    fn test_chain_from_rwset_orders_primary_first() {
        let builder = builder(Arc::new(FakeTransport::new()));
        let rwset = ReadWriteSet {
            namespaces: vec![
                NamespaceRwSet::new("zeta"),
                NamespaceRwSet::new("alpha").with_collection_read("c2", "k"),
                NamespaceRwSet::new("pvtcc")
                    .with_collection_write("c2", "k")
                    .with_collection_write("c1", "k"),
                NamespaceRwSet::new("_lifecycle"),
            ],
        };
        let chain = builder.chain_from_rwset("pvtcc", &rwset);
        let ids: Vec<_> = chain.calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["pvtcc", "alpha", "zeta"]);
        assert_eq!(chain.get("pvtcc").unwrap().collections, vec!["c1", "c2"]);
        assert_eq!(chain.get("alpha").unwrap().collections, vec!["c2"]);
        assert!(chain.get("zeta").unwrap().collections.is_empty());
    }

    #[test]
    fn test_primary_is_included_even_if_absent_from_rwset() {
        let builder = builder(Arc::new(FakeTransport::new()));
        let chain = builder.chain_from_rwset("pvtcc", &ReadWriteSet::new());
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.calls()[0].id, "pvtcc");
    }

    #[test]
    fn test_ignored_namespaces_are_configurable() {
        let builder = builder(Arc::new(FakeTransport::new())).with_config(ChainBuilderConfig {
            ignored_namespaces: ["helper".to_string()].into_iter().collect(),
        });
        let chain = builder.chain_from_rwset("pvtcc", &rwset());
        let ids: Vec<_> = chain.calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["pvtcc", "lscc"]);
    }

    #[tokio::test]
    async fn test_explicit_chain_is_used_verbatim() {
        let transport = Arc::new(FakeTransport::new());
        let builder = builder(transport.clone());
        let explicit: InvocationChain = vec![ChaincodeCall::new("pvtcc").with_collections(["collection1"])]
            .into_iter()
            .collect();

        let chain = builder
            .build(&proposal(), Some(&explicit), &snapshot(), None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(chain, explicit);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_detect_simulates_on_provisional_peer() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_default_rwset(rwset());
        let builder = builder(transport.clone());

        let chain = builder
            .build(&proposal(), None, &snapshot(), None, Duration::from_secs(1))
            .await
            .unwrap();

        let ids: Vec<_> = chain.calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["pvtcc", "helper"]);
        assert_eq!(chain.get("pvtcc").unwrap().collections, vec!["collection1"]);
        // One org satisfies the primary policy, so one peer simulates
        assert_eq!(transport.calls(), vec!["peer0.org1:7051"]);
    }

    #[tokio::test]
    async fn test_detect_is_deterministic() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_default_rwset(rwset());
        let builder = builder(transport);

        let a = builder
            .detect(&proposal(), &snapshot(), None, Duration::from_secs(1))
            .await
            .unwrap();
        let b = builder
            .detect(&proposal(), &snapshot(), None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_detect_falls_back_to_other_policy_peers() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_default_rwset(rwset());
        transport.set_down("peer0.org1:7051", true);
        let builder = builder(transport.clone());

        let chain = builder
            .detect(&proposal(), &snapshot(), None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(chain.calls()[0].id, "pvtcc");

        let calls = transport.calls();
        assert_eq!(calls[0], "peer0.org1:7051");
        assert!(calls.contains(&"peer0.org2:9051".to_string()));
        assert!(calls.contains(&"peer1.org1:8051".to_string()));
    }

    #[tokio::test]
    async fn test_detect_fails_when_every_peer_fails() {
        let transport = Arc::new(FakeTransport::new());
        for endpoint in ["peer0.org1:7051", "peer1.org1:8051"] {
            transport.set_down(endpoint, true);
        }
        transport.reject("peer0.org2:9051");
        let builder = builder(transport);

        let err = builder
            .detect(&proposal(), &snapshot(), None, Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            EndorseError::SimulationFailed { chaincode, cause } => {
                assert_eq!(chaincode, "pvtcc");
                // last fallback peer in endpoint order
                assert!(cause.contains("peer1.org1:8051"), "cause: {}", cause);
                assert!(cause.contains("connection refused"), "cause: {}", cause);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_reports_rejection_as_cause() {
        let transport = Arc::new(FakeTransport::new());
        transport.reject("peer0.org2:9051");
        let builder = builder(transport);
        let targets: BTreeSet<OrgId> = ["Org2MSP".to_string()].into_iter().collect();

        let err = builder
            .detect(&proposal(), &snapshot(), Some(&targets), Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            EndorseError::SimulationFailed { cause, .. } => {
                assert_eq!(
                    cause,
                    "Proposal rejected by peer0.org2:9051 with status 500: chaincode error"
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detect_with_no_live_peers() {
        let transport = Arc::new(FakeTransport::new());
        let builder = builder(transport.clone());
        let snapshot = DirectorySnapshot::new(
            snapshot().peers().iter().cloned().map(PeerInfo::unreachable),
        );

        let err = builder
            .detect(&proposal(), &snapshot, None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EndorseError::SimulationFailed { .. }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_detect_unknown_chaincode_is_terminal() {
        let builder = builder(Arc::new(FakeTransport::new()));
        let proposal = Proposal::new("orgchannel", "missing", "invoke");
        let err = builder
            .detect(&proposal, &snapshot(), None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, EndorseError::UnknownChaincode("missing".to_string()));
    }
}
