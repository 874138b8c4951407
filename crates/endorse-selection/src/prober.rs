use std::sync::Arc;
use std::time::{Duration, Instant};

use endorse_common::{EndorseError, PeerInfo, ProposalTransport, Result};
use tracing::{debug, info, warn};

use crate::directory::ManagedPeerDirectory;
use crate::peer::PeerEntry;

/// Shortest interval the probe loop runs at; smaller values are raised to it.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(10);

/// Liveness probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_millis(2000),
            failure_threshold: 3,
        }
    }
}

/// Result of probing one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeUpdate {
    pub endpoint: String,
    pub outcome: std::result::Result<Duration, String>,
}

/// Periodically probes every peer of a [`ManagedPeerDirectory`] and flips
/// their liveness.
pub struct LivenessProber {
    directory: Arc<ManagedPeerDirectory>,
    transport: Arc<dyn ProposalTransport>,
    config: ProbeConfig,
}

impl LivenessProber {
    pub fn new(
        directory: Arc<ManagedPeerDirectory>,
        transport: Arc<dyn ProposalTransport>,
        mut config: ProbeConfig,
    ) -> Self {
        config.interval = config.interval.max(MIN_PROBE_INTERVAL);
        Self {
            directory,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Starts the probe loop on the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            interval.tick().await;
            self.probe_all().await;
        }
    }

    /// Probes every peer once, concurrently, and applies the results.
    pub async fn probe_all(&self) -> Vec<ProbeUpdate> {
        let entries = self.directory.entries();

        let probes: Vec<_> = entries
            .iter()
            .map(|entry| {
                let transport = &self.transport;
                let timeout = self.config.timeout;
                async move {
                    let started = Instant::now();
                    let result = Self::probe_peer(transport.as_ref(), entry, timeout).await;
                    ProbeUpdate {
                        endpoint: entry.endpoint.clone(),
                        outcome: result.map(|_| started.elapsed()).map_err(|e| e.to_string()),
                    }
                }
            })
            .collect();

        let updates = futures::future::join_all(probes).await;
        for update in &updates {
            self.apply_probe_update(update);
        }
        updates
    }

    async fn probe_peer(
        transport: &dyn ProposalTransport,
        entry: &PeerEntry,
        timeout: Duration,
    ) -> Result<()> {
        let peer = PeerInfo::new(entry.endpoint.clone(), entry.org.clone());
        tokio::time::timeout(timeout, transport.probe(&peer))
            .await
            .map_err(|_| EndorseError::Timeout {
                peer: entry.endpoint.clone(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// Applies one probe result to the directory.
    pub fn apply_probe_update(&self, update: &ProbeUpdate) {
        match &update.outcome {
            Ok(latency) => {
                debug!("Peer {} reachable in {:?}", update.endpoint, latency);
                if self.directory.record_probe_success(&update.endpoint, *latency) {
                    info!("Peer {} re-enabled after probe recovery", update.endpoint);
                }
            }
            Err(reason) => {
                if self.directory.record_probe_failure(
                    &update.endpoint,
                    reason,
                    self.config.failure_threshold,
                ) {
                    warn!(
                        "Peer {} marked unreachable after {} consecutive probe failures: {}",
                        update.endpoint,
                        self.directory.consecutive_failures(&update.endpoint),
                        reason
                    );
                }
            }
        }
    }
}
