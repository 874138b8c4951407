// Copyright 2025 Endorse Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::registry::{MetricsConfig, MetricsRegistry};
use crate::snapshot::MetricsSnapshot;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sink for submission metrics.
///
/// The client calls these hooks as a submission progresses:
///
/// - `record_attempt` when an attempt starts (1-based)
/// - `record_peer_call` after each proposal sent to a peer
/// - `record_submission` once the submission finishes
///
/// # Example
///
/// ```rust
/// use endorse_metrics::{MetricsCollector, SubmitMetricsCollector};
/// use std::time::{Duration, Instant};
///
/// let collector = SubmitMetricsCollector::new();
///
/// let started = Instant::now();
/// collector.record_attempt(1);
/// collector.record_peer_call("peer0.org2.example.com:9051", Duration::from_millis(4), true);
/// collector.record_submission(started, None);
///
/// let snapshot = collector.snapshot();
/// assert_eq!(snapshot.successful_submissions, 1);
/// ```
pub trait MetricsCollector: Send + Sync {
    fn record_attempt(&self, attempt: u32);

    /// Records the outcome of one proposal sent to `endpoint`.
    fn record_peer_call(&self, endpoint: &str, latency: Duration, success: bool);

    /// Records a finished submission; `error_kind` is `None` on success.
    fn record_submission(&self, started: Instant, error_kind: Option<&str>);

    fn snapshot(&self) -> MetricsSnapshot;
}

/// Registry-backed [`MetricsCollector`].
///
/// Cloning is cheap and clones share the same registry, so one collector
/// can be handed to several clients.
#[derive(Debug, Clone)]
pub struct SubmitMetricsCollector {
    registry: Arc<MetricsRegistry>,
}

impl SubmitMetricsCollector {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self {
            registry: Arc::new(MetricsRegistry::with_config(config)),
        }
    }

    pub fn with_registry(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }
}

impl Default for SubmitMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector for SubmitMetricsCollector {
    fn record_attempt(&self, attempt: u32) {
        self.registry.record_attempt(attempt);
    }

    fn record_peer_call(&self, endpoint: &str, latency: Duration, success: bool) {
        self.registry.record_peer_call(endpoint, latency, success);
    }

    fn record_submission(&self, started: Instant, error_kind: Option<&str>) {
        self.registry.record_submission(started.elapsed(), error_kind);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }
}
