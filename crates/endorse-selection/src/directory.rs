//! Peer directory and immutable snapshots.
//!
//! Selection never reads live directory state: every attempt takes a
//! [`DirectorySnapshot`] up front and works against it until the attempt
//! ends. Only the liveness prober (and operators) mutate a
//! [`ManagedPeerDirectory`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use endorse_common::{OrgId, PeerInfo};

use crate::peer::{DisableReason, PeerEntry, ProbeStatus};

/// Source of peer snapshots.
pub trait PeerDirectory: Send + Sync {
    /// Returns the current view of every known peer.
    fn snapshot(&self) -> DirectorySnapshot;
}

/// Immutable, endpoint-ordered view of the directory at one instant.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    peers: Arc<[PeerInfo]>,
}

impl DirectorySnapshot {
    /// Builds a snapshot, ordering peers by endpoint. Later duplicates of an
    /// endpoint are dropped.
    pub fn new(peers: impl IntoIterator<Item = PeerInfo>) -> Self {
        let mut by_endpoint: BTreeMap<String, PeerInfo> = BTreeMap::new();
        for peer in peers {
            by_endpoint.entry(peer.endpoint.clone()).or_insert(peer);
        }
        Self {
            peers: by_endpoint.into_values().collect(),
        }
    }

    pub fn peers(&self) -> &[PeerInfo] {
        &self.peers
    }

    pub fn peer(&self, endpoint: &str) -> Option<&PeerInfo> {
        self.peers
            .binary_search_by(|p| p.endpoint.as_str().cmp(endpoint))
            .ok()
            .map(|idx| &self.peers[idx])
    }

    pub fn live_peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.iter().filter(|p| p.is_live())
    }

    /// Live peers grouped by organization, each group ordered by latency
    /// then endpoint.
    pub fn live_by_org(&self) -> BTreeMap<OrgId, Vec<PeerInfo>> {
        let mut groups: BTreeMap<OrgId, Vec<PeerInfo>> = BTreeMap::new();
        for peer in self.live_peers() {
            groups.entry(peer.org.clone()).or_default().push(peer.clone());
        }
        for peers in groups.values_mut() {
            peers.sort_by(|a, b| a.rank_key().cmp(&b.rank_key()));
        }
        groups
    }

    /// Organizations with at least one live peer.
    pub fn live_orgs(&self) -> BTreeSet<OrgId> {
        self.live_peers().map(|p| p.org.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// A fixed set of peers whose liveness never changes.
#[derive(Debug, Clone, Default)]
pub struct StaticPeerDirectory {
    snapshot: DirectorySnapshot,
}

impl StaticPeerDirectory {
    pub fn new(peers: impl IntoIterator<Item = PeerInfo>) -> Self {
        Self {
            snapshot: DirectorySnapshot::new(peers),
        }
    }
}

impl PeerDirectory for StaticPeerDirectory {
    fn snapshot(&self) -> DirectorySnapshot {
        self.snapshot.clone()
    }
}

/// A directory whose peers are enabled and disabled at runtime, either by
/// an operator or by the [`LivenessProber`](crate::LivenessProber).
#[derive(Debug, Default)]
pub struct ManagedPeerDirectory {
    entries: RwLock<BTreeMap<String, PeerEntry>>,
}

impl ManagedPeerDirectory {
    pub fn new(peers: impl IntoIterator<Item = PeerInfo>) -> Self {
        let directory = Self::default();
        for peer in peers {
            directory.add_peer(peer);
        }
        directory
    }

    /// Adds a peer, keeping existing state if the endpoint is already known.
    pub fn add_peer(&self, peer: PeerInfo) {
        if let Ok(mut entries) = self.entries.write() {
            let live = peer.is_live();
            entries.entry(peer.endpoint.clone()).or_insert_with(|| {
                let mut entry = PeerEntry::new(peer.endpoint, peer.org);
                entry.latency = peer.latency;
                if !live {
                    entry.disable_reason = Some(DisableReason::Probe);
                }
                entry
            });
        }
    }

    pub fn remove_peer(&self, endpoint: &str) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(endpoint).is_some())
            .unwrap_or(false)
    }

    /// Copies of every tracked entry, ordered by endpoint.
    pub fn entries(&self) -> Vec<PeerEntry> {
        self.entries
            .read()
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn entry(&self, endpoint: &str) -> Option<PeerEntry> {
        self.entries.read().ok()?.get(endpoint).cloned()
    }

    pub fn consecutive_failures(&self, endpoint: &str) -> u32 {
        self.entry(endpoint)
            .map(|e| e.consecutive_failures)
            .unwrap_or(0)
    }

    /// Manually disables a peer. Returns false if the peer is unknown.
    pub fn disable_peer(&self, endpoint: &str) -> bool {
        self.with_entry(endpoint, |entry| {
            entry.disable_reason = Some(DisableReason::Manual);
        })
    }

    /// Manually re-enables a peer regardless of why it was disabled.
    pub fn enable_peer(&self, endpoint: &str) -> bool {
        self.with_entry(endpoint, |entry| {
            entry.disable_reason = None;
            entry.consecutive_failures = 0;
        })
    }

    /// Records a successful probe. Returns true if the peer was re-enabled.
    pub fn record_probe_success(&self, endpoint: &str, latency: Duration) -> bool {
        let mut re_enabled = false;
        self.with_entry(endpoint, |entry| {
            entry.consecutive_failures = 0;
            entry.latency = Some(latency);
            entry.last_probe = Some(Instant::now());
            entry.last_probe_status = Some(ProbeStatus::Reachable);
            if entry.disable_reason == Some(DisableReason::Probe) {
                entry.disable_reason = None;
                re_enabled = true;
            }
        });
        re_enabled
    }

    /// Records a failed probe. Returns true if this failure disabled the
    /// peer, which happens once `failure_threshold` consecutive failures have
    /// been seen on an enabled peer.
    pub fn record_probe_failure(&self, endpoint: &str, reason: &str, failure_threshold: u32) -> bool {
        let mut disabled = false;
        self.with_entry(endpoint, |entry| {
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            entry.last_probe = Some(Instant::now());
            entry.last_probe_status = Some(ProbeStatus::Unreachable(reason.to_string()));
            if entry.is_enabled() && entry.consecutive_failures >= failure_threshold {
                entry.disable_reason = Some(DisableReason::Probe);
                disabled = true;
            }
        });
        disabled
    }

    fn with_entry(&self, endpoint: &str, f: impl FnOnce(&mut PeerEntry)) -> bool {
        match self.entries.write() {
            Ok(mut entries) => match entries.get_mut(endpoint) {
                Some(entry) => {
                    f(entry);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }
}

impl PeerDirectory for ManagedPeerDirectory {
    fn snapshot(&self) -> DirectorySnapshot {
        let peers = self
            .entries
            .read()
            .map(|entries| entries.values().map(PeerEntry::to_info).collect::<Vec<_>>())
            .unwrap_or_default();
        DirectorySnapshot::new(peers)
    }
}
