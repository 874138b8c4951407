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

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latency summary in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub avg_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

/// Proposal traffic to one peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetrics {
    pub request_count: u64,
    pub failure_count: u64,
    pub latency: LatencyMetrics,
}

/// Complete metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub submissions: u64,
    pub successful_submissions: u64,
    pub failed_submissions: u64,
    pub attempts: u64,
    pub retries: u64,
    pub uptime_ms: u64,
    pub submit_latency: LatencyMetrics,
    /// Failed submissions keyed by error kind
    pub failures_by_kind: BTreeMap<String, u64>,
    /// Per-peer proposal traffic keyed by endpoint
    pub peers: BTreeMap<String, PeerMetrics>,
}

impl MetricsSnapshot {
    /// Fraction of finished submissions that succeeded, or `None` before the first one.
    pub fn success_rate(&self) -> Option<f64> {
        if self.submissions == 0 {
            return None;
        }
        Some(self.successful_submissions as f64 / self.submissions as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.success_rate(), None);

        snapshot.submissions = 4;
        snapshot.successful_submissions = 3;
        assert_eq!(snapshot.success_rate(), Some(0.75));
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut snapshot = MetricsSnapshot {
            submissions: 1,
            failed_submissions: 1,
            ..Default::default()
        };
        snapshot
            .failures_by_kind
            .insert("insufficient_endorsers".to_string(), 1);
        snapshot.peers.insert(
            "peer0.org2:9051".to_string(),
            PeerMetrics {
                request_count: 2,
                failure_count: 1,
                latency: LatencyMetrics::default(),
            },
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["failures_by_kind"]["insufficient_endorsers"], 1);
        assert_eq!(json["peers"]["peer0.org2:9051"]["request_count"], 2);

        let back: MetricsSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
