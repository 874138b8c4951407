use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use endorse_common::{
    EndorseError, InvocationChain, OrgId, PolicyResolver, Proposal, ProposalTransport, Result,
};
use endorse_metrics::{MetricsCollector, MetricsSnapshot, SubmitMetricsCollector};
use endorse_selection::{
    ChainBuilderConfig, EndorserSelector, InvocationChainBuilder, PeerDirectory, PolicyProvider,
    SelectorConfig,
};
use tracing::{info, warn};

use crate::coordinator::{ExecutionCoordinator, ExecutionResult};
use crate::retry::{AttemptHandle, AttemptState, RetryOrchestrator, RetryPolicy, Transition};

/// Per-submission options.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Chain to endorse verbatim; `None` detects it by simulation
    pub invocation_chain: Option<InvocationChain>,
    pub retry: RetryPolicy,
    /// Budget for one attempt (build, select and execute)
    ///
    /// Default: 30s
    pub timeout: Duration,
    /// Budget for a single peer call
    ///
    /// Default: 10s
    pub peer_timeout: Duration,
    /// Caller deadline for the whole submission, retries included
    pub deadline: Option<Instant>,
    /// Restricts endorsers to these organizations
    pub target_orgs: Option<BTreeSet<OrgId>>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            invocation_chain: None,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            peer_timeout: Duration::from_secs(10),
            deadline: None,
            target_orgs: None,
        }
    }
}

impl SubmitOptions {
    pub fn with_invocation_chain(mut self, chain: InvocationChain) -> Self {
        self.invocation_chain = Some(chain);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_peer_timeout(mut self, peer_timeout: Duration) -> Self {
        self.peer_timeout = peer_timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_target_orgs<I, S>(mut self, orgs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OrgId>,
    {
        self.target_orgs = Some(orgs.into_iter().map(Into::into).collect());
        self
    }
}

/// Submits proposals on one channel.
///
/// Each attempt takes a fresh snapshot of the peer directory, builds the
/// invocation chain, selects endorsers and executes the resulting plan. The
/// [`RetryOrchestrator`] re-drives the pipeline on retryable failures.
///
/// # Example
/// ```no_run
/// # use endorse_client::{ChannelClient, SubmitOptions};
/// # use endorse_common::{HttpTransport, PeerInfo, Proposal};
/// # use endorse_selection::{ChaincodeDefinition, StaticPeerDirectory, StaticPolicyProvider};
/// # use std::sync::Arc;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let directory = StaticPeerDirectory::new(vec![
///     PeerInfo::new("127.0.0.1:7051", "Org1MSP"),
///     PeerInfo::new("127.0.0.1:9051", "Org2MSP"),
/// ]);
/// let provider = StaticPolicyProvider::new().with_chaincode(
///     "basic",
///     ChaincodeDefinition::new("OR('Org1MSP.member', 'Org2MSP.member')"),
/// );
/// let client = ChannelClient::new(
///     "mychannel",
///     Arc::new(directory),
///     Arc::new(provider),
///     Arc::new(HttpTransport::new()),
/// );
///
/// let proposal = Proposal::new("mychannel", "basic", "CreateAsset").with_args(["asset1"]);
/// let result = client.submit(&proposal, SubmitOptions::default()).await?;
/// println!("endorsed by {:?}", result.endorsing_orgs());
/// # Ok(())
/// # }
/// ```
pub struct ChannelClient {
    channel_id: String,
    directory: Arc<dyn PeerDirectory>,
    selector: Arc<EndorserSelector>,
    chain_builder: InvocationChainBuilder,
    coordinator: ExecutionCoordinator,
    metrics: Arc<dyn MetricsCollector>,
}

impl ChannelClient {
    pub fn new(
        channel_id: impl Into<String>,
        directory: Arc<dyn PeerDirectory>,
        provider: Arc<dyn PolicyProvider>,
        transport: Arc<dyn ProposalTransport>,
    ) -> Self {
        Self::with_config(
            channel_id,
            directory,
            provider,
            transport,
            ClientConfig::default(),
        )
    }

    pub fn with_config(
        channel_id: impl Into<String>,
        directory: Arc<dyn PeerDirectory>,
        provider: Arc<dyn PolicyProvider>,
        transport: Arc<dyn ProposalTransport>,
        config: ClientConfig,
    ) -> Self {
        let metrics = config
            .metrics
            .unwrap_or_else(|| Arc::new(SubmitMetricsCollector::new()));
        let selector = Arc::new(
            EndorserSelector::new(provider, Arc::new(PolicyResolver::new()))
                .with_config(config.selector),
        );
        let chain_builder =
            InvocationChainBuilder::new(Arc::clone(&selector), Arc::clone(&transport))
                .with_config(config.chain_builder);
        let coordinator = ExecutionCoordinator::new(transport, Arc::clone(&selector))
            .with_metrics(Arc::clone(&metrics));

        Self {
            channel_id: channel_id.into(),
            directory,
            selector,
            chain_builder,
            coordinator,
            metrics,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn selector(&self) -> &Arc<EndorserSelector> {
        &self.selector
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Collects endorsements for `proposal` that satisfy every policy it
    /// touches.
    pub async fn submit(&self, proposal: &Proposal, options: SubmitOptions) -> Result<ExecutionResult> {
        self.submit_traced(proposal, options).await.0
    }

    /// Like [`submit`](Self::submit), also returning the attempt state
    /// transitions.
    pub async fn submit_traced(
        &self,
        proposal: &Proposal,
        options: SubmitOptions,
    ) -> (Result<ExecutionResult>, Vec<Transition>) {
        let started = Instant::now();

        if proposal.channel_id != self.channel_id {
            let error = EndorseError::InvalidConfig(format!(
                "proposal targets channel '{}' but client is bound to '{}'",
                proposal.channel_id, self.channel_id
            ));
            self.metrics.record_submission(started, Some(error.kind()));
            return (Err(error), Vec::new());
        }

        let orchestrator = RetryOrchestrator::new(options.retry.clone())
            .with_attempt_timeout(Some(options.timeout))
            .with_deadline(options.deadline);

        let result = orchestrator
            .run(|handle| self.attempt(proposal, &options, handle))
            .await;

        match &result {
            Ok(r) => info!(
                "Transaction {} endorsed by {:?} after {} attempt(s)",
                r.tx_id,
                r.endpoints(),
                r.attempts
            ),
            Err(e) => warn!("Transaction {} failed: {}", proposal.tx_id, e),
        }
        self.metrics
            .record_submission(started, result.as_ref().err().map(|e| e.root().kind()));

        (result, orchestrator.history())
    }

    async fn attempt(
        &self,
        proposal: &Proposal,
        options: &SubmitOptions,
        handle: AttemptHandle,
    ) -> Result<ExecutionResult> {
        self.metrics.record_attempt(handle.attempt());
        let snapshot = self.directory.snapshot();
        let targets = options.target_orgs.as_ref();

        let chain = self
            .chain_builder
            .build(
                proposal,
                options.invocation_chain.as_ref(),
                &snapshot,
                targets,
                options.peer_timeout,
            )
            .await?;

        handle.enter(AttemptState::Selecting);
        let plan = self.selector.select(&chain, &snapshot, targets)?;

        handle.enter(AttemptState::Executing);
        let mut result = self
            .coordinator
            .execute(proposal, &plan, &snapshot, targets, options.peer_timeout)
            .await?;
        result.attempts = handle.attempt();
        Ok(result)
    }
}

/// Construction-time settings for a [`ChannelClient`].
#[derive(Default)]
pub struct ClientConfig {
    pub selector: SelectorConfig,
    pub chain_builder: ChainBuilderConfig,
    /// Shared metrics sink; a private collector is created when `None`
    pub metrics: Option<Arc<dyn MetricsCollector>>,
}
