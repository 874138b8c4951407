//! Concurrent proposal dispatch and endorsement validation.
//!
//! One attempt sends the proposal to every peer of the plan's dispatch set at
//! once, each call under its own timeout. Entries are then validated
//! independently:
//!
//! 1. Successful responses of the entry's peers must all agree, otherwise the
//!    attempt fails with `EndorsementMismatch`.
//! 2. If the orgs that endorsed do not satisfy the entry's requirement,
//!    alternates are selected from the same snapshot (failed peers excluded,
//!    endorsed orgs counted) and dispatched, until the requirement holds or
//!    no alternate exists.
//!
//! Finally all entries must agree with each other, since they endorse one
//! proposal. Responses are compared as sets, so arrival order never changes
//! the outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use endorse_common::{
    EndorseError, OrgId, PeerInfo, Proposal, ProposalResponse, ProposalTransport, ReadWriteSet,
    Result, TxId,
};
use endorse_metrics::MetricsCollector;
use endorse_selection::{DirectorySnapshot, EndorsementPlan, EndorserSelector, PlanEntry};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Aggregated outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tx_id: TxId,
    /// Every endorsement used, ordered by endpoint
    pub responses: Vec<ProposalResponse>,
    /// Status all endorsements agreed on
    pub status: i32,
    pub payload: Vec<u8>,
    pub rwset: ReadWriteSet,
    /// Attempts taken, including the successful one
    pub attempts: u32,
}

impl ExecutionResult {
    pub fn endorsing_orgs(&self) -> BTreeSet<OrgId> {
        self.responses.iter().map(|r| r.org.clone()).collect()
    }

    pub fn endpoints(&self) -> Vec<&str> {
        self.responses.iter().map(|r| r.endpoint.as_str()).collect()
    }
}

type Outcomes = BTreeMap<String, Result<ProposalResponse>>;

/// Dispatches a plan's proposals and validates the endorsements.
pub struct ExecutionCoordinator {
    transport: Arc<dyn ProposalTransport>,
    selector: Arc<EndorserSelector>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl ExecutionCoordinator {
    pub fn new(transport: Arc<dyn ProposalTransport>, selector: Arc<EndorserSelector>) -> Self {
        Self {
            transport,
            selector,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Executes one attempt of `plan`.
    ///
    /// `snapshot` must be the snapshot the plan was selected from; alternates
    /// are drawn from it. The returned result reports one attempt.
    pub async fn execute(
        &self,
        proposal: &Proposal,
        plan: &EndorsementPlan,
        snapshot: &DirectorySnapshot,
        target_orgs: Option<&BTreeSet<OrgId>>,
        peer_timeout: Duration,
    ) -> Result<ExecutionResult> {
        let proposal = Arc::new(proposal.clone());
        let mut outcomes = Outcomes::new();
        self.dispatch(&proposal, plan.dispatch_set(), peer_timeout, &mut outcomes)
            .await;

        let mut endorsements: BTreeMap<String, ProposalResponse> = BTreeMap::new();
        let mut reference: Option<(String, ProposalResponse)> = None;

        for entry in plan.entries() {
            let responses = self
                .settle_entry(&proposal, entry, snapshot, target_orgs, peer_timeout, &mut outcomes)
                .await?;

            // Entries endorse the same proposal and must agree with each other
            let Some(first) = responses.first() else {
                continue;
            };
            match &reference {
                None => reference = Some((entry.call.id.clone(), first.clone())),
                Some((other, expected)) if !expected.agrees_with(first) => {
                    return Err(EndorseError::EndorsementMismatch {
                        chaincode: entry.call.id.clone(),
                        details: format!(
                            "endorsements for {} disagree with endorsements for {}",
                            entry.call.id, other
                        ),
                    });
                }
                Some(_) => {}
            }

            for response in responses {
                endorsements.entry(response.endpoint.clone()).or_insert(response);
            }
        }

        let (_, agreed) = reference.ok_or_else(|| {
            EndorseError::InvalidConfig("endorsement plan has no entries".to_string())
        })?;

        Ok(ExecutionResult {
            tx_id: proposal.tx_id.clone(),
            responses: endorsements.into_values().collect(),
            status: agreed.status,
            payload: agreed.payload,
            rwset: agreed.rwset,
            attempts: 1,
        })
    }

    /// Validates one entry, dispatching alternates until its requirement is
    /// satisfied. Returns the entry's successful responses ordered by endpoint.
    async fn settle_entry(
        &self,
        proposal: &Arc<Proposal>,
        entry: &PlanEntry,
        snapshot: &DirectorySnapshot,
        target_orgs: Option<&BTreeSet<OrgId>>,
        peer_timeout: Duration,
        outcomes: &mut Outcomes,
    ) -> Result<Vec<ProposalResponse>> {
        let chaincode = entry.call.id.as_str();
        let mut assigned: BTreeSet<String> = entry.peers.iter().map(|p| p.endpoint.clone()).collect();
        let mut last_cause = String::from("no peer responded");

        loop {
            let succeeded: Vec<&ProposalResponse> = assigned
                .iter()
                .filter_map(|endpoint| outcomes.get(endpoint))
                .filter_map(|outcome| outcome.as_ref().ok())
                .collect();
            check_agreement(chaincode, &succeeded)?;

            let endorsed: BTreeSet<OrgId> = succeeded.iter().map(|r| r.org.clone()).collect();
            if entry.requirement.satisfied_by(&endorsed) {
                return Ok(succeeded.into_iter().cloned().collect());
            }

            for endpoint in &assigned {
                if let Some(Err(e)) = outcomes.get(endpoint) {
                    last_cause = e.to_string();
                }
            }
            let excluded: BTreeSet<String> = outcomes
                .iter()
                .filter(|(_, outcome)| outcome.is_err())
                .map(|(endpoint, _)| endpoint.clone())
                .collect();

            let alternates = match self.selector.select_alternates(
                &entry.requirement,
                snapshot,
                target_orgs,
                &excluded,
                &endorsed,
            ) {
                Ok(alternates) if !alternates.is_empty() => alternates,
                Ok(_) | Err(EndorseError::InsufficientEndorsers { .. }) => {
                    return Err(EndorseError::InsufficientEndorsers {
                        chaincode: chaincode.to_string(),
                        policy: entry.requirement.to_string(),
                        cause: last_cause,
                    });
                }
                Err(e) => return Err(e),
            };

            debug!(
                "Dispatching {} alternate(s) for {}: {:?}",
                alternates.len(),
                chaincode,
                alternates.iter().map(|p| p.endpoint.as_str()).collect::<Vec<_>>()
            );
            let fresh: Vec<PeerInfo> = alternates
                .iter()
                .filter(|p| !outcomes.contains_key(&p.endpoint))
                .cloned()
                .collect();
            assigned.extend(alternates.into_iter().map(|p| p.endpoint));
            self.dispatch(proposal, fresh, peer_timeout, outcomes).await;
        }
    }

    /// Sends the proposal to every peer concurrently and records each outcome.
    ///
    /// Dropping the returned future aborts every in-flight call.
    async fn dispatch(
        &self,
        proposal: &Arc<Proposal>,
        peers: Vec<PeerInfo>,
        peer_timeout: Duration,
        outcomes: &mut Outcomes,
    ) {
        let mut tasks = JoinSet::new();
        for peer in &peers {
            let transport = Arc::clone(&self.transport);
            let proposal = Arc::clone(proposal);
            let peer = peer.clone();
            tasks.spawn(async move {
                let started = Instant::now();
                let outcome = call_peer(transport.as_ref(), &peer, &proposal, peer_timeout).await;
                (peer.endpoint, outcome, started.elapsed())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((endpoint, outcome, latency)) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_peer_call(&endpoint, latency, outcome.is_ok());
                    }
                    if let Err(e) = &outcome {
                        warn!("Endorsement from {} failed: {}", endpoint, e);
                    }
                    outcomes.insert(endpoint, outcome);
                }
                Err(e) => warn!("Endorsement task failed: {}", e),
            }
        }

        // A task that panicked leaves no outcome; count its peer as failed
        for peer in peers {
            outcomes.entry(peer.endpoint.clone()).or_insert_with(|| {
                Err(EndorseError::Transport {
                    peer: peer.endpoint,
                    message: "endorsement task aborted".to_string(),
                })
            });
        }
    }
}

/// One peer call: transport errors, timeouts and non-success statuses are
/// all per-peer failures.
async fn call_peer(
    transport: &dyn ProposalTransport,
    peer: &PeerInfo,
    proposal: &Proposal,
    peer_timeout: Duration,
) -> Result<ProposalResponse> {
    let response = tokio::time::timeout(peer_timeout, transport.send_proposal(peer, proposal))
        .await
        .map_err(|_| EndorseError::Timeout {
            peer: peer.endpoint.clone(),
            timeout_ms: peer_timeout.as_millis() as u64,
        })??;

    if !response.is_success() {
        return Err(EndorseError::ProposalRejected {
            peer: peer.endpoint.clone(),
            status: response.status,
            message: response.message,
        });
    }
    Ok(response)
}

fn check_agreement(chaincode: &str, responses: &[&ProposalResponse]) -> Result<()> {
    let Some(first) = responses.first() else {
        return Ok(());
    };
    match responses.iter().find(|r| !first.agrees_with(r)) {
        Some(other) => Err(EndorseError::EndorsementMismatch {
            chaincode: chaincode.to_string(),
            details: format!(
                "{} and {} returned different results",
                first.endpoint, other.endpoint
            ),
        }),
        None => Ok(()),
    }
}
