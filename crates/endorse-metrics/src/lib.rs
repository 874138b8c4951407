//! Endorse Metrics Collection
//!
//! Thread-safe metrics for policy-aware submission: how many submissions
//! and attempts ran, why they failed, and how each endorsing peer behaved.
//!
//! # Architecture
//!
//! - [`MetricsRegistry`]: lock-free counters, latency histograms and
//!   per-peer stats
//! - [`MetricsCollector`]: the hooks the client calls while submitting
//! - [`MetricsSnapshot`]: serializable point-in-time view
//!
//! # Usage Example
//!
//! ```rust
//! use endorse_metrics::{MetricsCollector, SubmitMetricsCollector};
//! use std::time::Instant;
//!
//! let collector = SubmitMetricsCollector::new();
//! let started = Instant::now();
//! collector.record_attempt(1);
//! collector.record_submission(started, Some("insufficient_endorsers"));
//!
//! let snapshot = collector.snapshot();
//! assert_eq!(snapshot.failures_by_kind["insufficient_endorsers"], 1);
//! println!("{}", serde_json::to_string_pretty(&snapshot).unwrap());
//! ```

mod collector;
mod registry;
mod snapshot;

pub use collector::{MetricsCollector, SubmitMetricsCollector};
pub use registry::{MetricsConfig, MetricsRegistry};
pub use snapshot::{LatencyMetrics, MetricsSnapshot, PeerMetrics};
