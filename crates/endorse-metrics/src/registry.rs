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

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::snapshot::{LatencyMetrics, MetricsSnapshot, PeerMetrics};

/// Number of histogram bins: ten per decade from 1us to 10s, plus overflow.
const NUM_HISTOGRAM_BINS: usize = 71;

/// Registry limits.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Maximum number of distinct peers tracked; calls to further peers
    /// only count towards the totals
    pub max_peers: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { max_peers: 1000 }
    }
}

/// Logarithmic latency histogram.
///
/// Each decade from 1us to 10s is split into ten bins, which keeps
/// percentile estimates within roughly 10% at constant memory.
#[derive(Debug)]
struct LatencyHistogram {
    bins: [AtomicU64; NUM_HISTOGRAM_BINS],
    total_latency_us: AtomicU64,
    sample_count: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            bins: std::array::from_fn(|_| AtomicU64::new(0)),
            total_latency_us: AtomicU64::new(0),
            sample_count: AtomicU64::new(0),
        }
    }

    fn record(&self, latency_us: u64) {
        self.bins[Self::latency_to_bin(latency_us)].fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    fn latency_to_bin(latency_us: u64) -> usize {
        if latency_us == 0 {
            return 0;
        }
        let decade = latency_us.ilog10() as usize;
        let leading = (latency_us / 10u64.pow(decade as u32)) as usize;
        (decade * 10 + leading).min(NUM_HISTOGRAM_BINS - 1)
    }

    /// Lower bound of a bin.
    fn bin_to_latency(bin: usize) -> u64 {
        let decade = (bin / 10) as u32;
        let leading = (bin % 10).max(1) as u64;
        10u64.saturating_pow(decade).saturating_mul(leading)
    }

    fn estimate_percentile(&self, percentile: u64) -> u64 {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }

        let target = (total * percentile).div_ceil(100).max(1);
        let mut cumulative = 0;
        for (idx, bin) in self.bins.iter().enumerate() {
            cumulative += bin.load(Ordering::Relaxed);
            if cumulative >= target {
                return Self::bin_to_latency(idx);
            }
        }
        Self::bin_to_latency(NUM_HISTOGRAM_BINS - 1)
    }

    fn metrics(&self) -> LatencyMetrics {
        let total = self.sample_count.load(Ordering::Relaxed);
        if total == 0 {
            return LatencyMetrics::default();
        }
        LatencyMetrics {
            avg_us: self.total_latency_us.load(Ordering::Relaxed) / total,
            p50_us: self.estimate_percentile(50),
            p95_us: self.estimate_percentile(95),
            p99_us: self.estimate_percentile(99),
        }
    }
}

#[derive(Debug)]
struct PeerStats {
    request_count: AtomicU64,
    failure_count: AtomicU64,
    latencies: LatencyHistogram,
}

impl PeerStats {
    fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            latencies: LatencyHistogram::new(),
        }
    }

    fn snapshot(&self) -> PeerMetrics {
        PeerMetrics {
            request_count: self.request_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            latency: self.latencies.metrics(),
        }
    }
}

/// Thread-safe storage for submission metrics.
///
/// Counters are lock-free atomics with relaxed ordering; each counter is
/// independent, so a snapshot taken during concurrent updates may mix
/// slightly different instants. The peer and error-kind maps are behind
/// `RwLock`s that are only write-locked the first time a key is seen.
#[derive(Debug)]
pub struct MetricsRegistry {
    submissions: AtomicU64,
    successful_submissions: AtomicU64,
    failed_submissions: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    submit_latencies: LatencyHistogram,
    failures_by_kind: RwLock<HashMap<String, Arc<AtomicU64>>>,
    peers: RwLock<HashMap<String, Arc<PeerStats>>>,
    start_time: Instant,
    config: MetricsConfig,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_config(MetricsConfig::default())
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self {
            submissions: AtomicU64::new(0),
            successful_submissions: AtomicU64::new(0),
            failed_submissions: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            submit_latencies: LatencyHistogram::new(),
            failures_by_kind: RwLock::new(HashMap::new()),
            peers: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
            config,
        }
    }

    /// Counts one attempt; every attempt after the first also counts as a retry.
    pub fn record_attempt(&self, attempt: u32) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if attempt > 1 {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records the end of a submission. `error_kind` is `None` on success.
    pub fn record_submission(&self, elapsed: Duration, error_kind: Option<&str>) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
        self.submit_latencies.record(elapsed.as_micros() as u64);
        match error_kind {
            None => {
                self.successful_submissions.fetch_add(1, Ordering::Relaxed);
            }
            Some(kind) => {
                self.failed_submissions.fetch_add(1, Ordering::Relaxed);
                self.kind_counter(kind).fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records one proposal sent to a peer.
    pub fn record_peer_call(&self, endpoint: &str, latency: Duration, success: bool) {
        let Some(stats) = self.peer_stats(endpoint) else {
            return;
        };
        stats.request_count.fetch_add(1, Ordering::Relaxed);
        if !success {
            stats.failure_count.fetch_add(1, Ordering::Relaxed);
        }
        stats.latencies.record(latency.as_micros() as u64);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let failures_by_kind: BTreeMap<String, u64> = self
            .failures_by_kind
            .read()
            .map(|kinds| {
                kinds
                    .iter()
                    .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
                    .collect()
            })
            .unwrap_or_default();
        let peers: BTreeMap<String, PeerMetrics> = self
            .peers
            .read()
            .map(|peers| {
                peers
                    .iter()
                    .map(|(endpoint, stats)| (endpoint.clone(), stats.snapshot()))
                    .collect()
            })
            .unwrap_or_default();

        MetricsSnapshot {
            submissions: self.submissions.load(Ordering::Relaxed),
            successful_submissions: self.successful_submissions.load(Ordering::Relaxed),
            failed_submissions: self.failed_submissions.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            uptime_ms: self.uptime().as_millis() as u64,
            submit_latency: self.submit_latencies.metrics(),
            failures_by_kind,
            peers,
        }
    }

    fn kind_counter(&self, kind: &str) -> Arc<AtomicU64> {
        if let Ok(kinds) = self.failures_by_kind.read() {
            if let Some(counter) = kinds.get(kind) {
                return Arc::clone(counter);
            }
        }
        match self.failures_by_kind.write() {
            Ok(mut kinds) => Arc::clone(
                kinds
                    .entry(kind.to_string())
                    .or_insert_with(|| Arc::new(AtomicU64::new(0))),
            ),
            Err(_) => Arc::new(AtomicU64::new(0)),
        }
    }

    fn peer_stats(&self, endpoint: &str) -> Option<Arc<PeerStats>> {
        if let Ok(peers) = self.peers.read() {
            if let Some(stats) = peers.get(endpoint) {
                return Some(Arc::clone(stats));
            }
        }
        let mut peers = self.peers.write().ok()?;
        if !peers.contains_key(endpoint) && peers.len() >= self.config.max_peers {
            return None;
        }
        Some(Arc::clone(
            peers
                .entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(PeerStats::new())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_bins() {
        assert_eq!(LatencyHistogram::latency_to_bin(0), 0);
        assert_eq!(LatencyHistogram::latency_to_bin(1), 1);
        assert_eq!(LatencyHistogram::latency_to_bin(9), 9);
        assert_eq!(LatencyHistogram::latency_to_bin(10), 11);
        assert_eq!(LatencyHistogram::latency_to_bin(250), 22);
        assert_eq!(LatencyHistogram::latency_to_bin(u64::MAX), NUM_HISTOGRAM_BINS - 1);

        assert_eq!(LatencyHistogram::bin_to_latency(11), 10);
        assert_eq!(LatencyHistogram::bin_to_latency(22), 200);
    }

    #[test]
    fn test_histogram_percentiles() {
        let histogram = LatencyHistogram::new();
        for _ in 0..90 {
            histogram.record(1_000);
        }
        for _ in 0..10 {
            histogram.record(50_000);
        }
        let metrics = histogram.metrics();
        assert_eq!(metrics.p50_us, 1_000);
        assert_eq!(metrics.p95_us, 50_000);
        assert_eq!(metrics.p99_us, 50_000);
        assert_eq!(metrics.avg_us, (90 * 1_000 + 10 * 50_000) / 100);
    }

    #[test]
    fn test_empty_histogram_is_zero() {
        assert_eq!(LatencyHistogram::new().metrics(), LatencyMetrics::default());
    }

    #[test]
    fn test_attempts_and_retries() {
        let registry = MetricsRegistry::new();
        registry.record_attempt(1);
        registry.record_attempt(2);
        registry.record_attempt(3);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.retries, 2);
    }

    #[test]
    fn test_submission_outcomes() {
        let registry = MetricsRegistry::new();
        registry.record_submission(Duration::from_millis(3), None);
        registry.record_submission(Duration::from_millis(3), Some("insufficient_endorsers"));
        registry.record_submission(Duration::from_millis(3), Some("insufficient_endorsers"));
        registry.record_submission(Duration::from_millis(3), Some("endorsement_mismatch"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.submissions, 4);
        assert_eq!(snapshot.successful_submissions, 1);
        assert_eq!(snapshot.failed_submissions, 3);
        assert_eq!(snapshot.failures_by_kind["insufficient_endorsers"], 2);
        assert_eq!(snapshot.failures_by_kind["endorsement_mismatch"], 1);
    }

    #[test]
    fn test_peer_calls() {
        let registry = MetricsRegistry::new();
        registry.record_peer_call("peer0.org1:7051", Duration::from_millis(2), true);
        registry.record_peer_call("peer0.org1:7051", Duration::from_millis(4), false);

        let peer = &registry.snapshot().peers["peer0.org1:7051"];
        assert_eq!(peer.request_count, 2);
        assert_eq!(peer.failure_count, 1);
        assert_eq!(peer.latency.avg_us, 3_000);
    }

    #[test]
    fn test_max_peers_limit() {
        let registry = MetricsRegistry::with_config(MetricsConfig { max_peers: 1 });
        registry.record_peer_call("a:1", Duration::from_millis(1), true);
        registry.record_peer_call("b:1", Duration::from_millis(1), true);
        registry.record_peer_call("a:1", Duration::from_millis(1), true);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(snapshot.peers["a:1"].request_count, 2);
    }

    #[test]
    fn test_concurrent_recording() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.record_peer_call(&format!("peer{}:1", i % 4), Duration::from_micros(50), true);
                        registry.record_attempt(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.attempts, 800);
        assert_eq!(snapshot.peers.len(), 4);
        assert_eq!(
            snapshot.peers.values().map(|p| p.request_count).sum::<u64>(),
            800
        );
    }
}
