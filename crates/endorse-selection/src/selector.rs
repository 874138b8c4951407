//! Policy-satisfying endorser selection.
//!
//! For each chain entry the selector finds a smallest set of organizations
//! whose live peers satisfy the entry's [`EntryRequirement`], then picks
//! concrete peers inside those organizations.
//!
//! # Search
//!
//! Candidate organizations are ranked by their best peer's latency (unknown
//! latency last), then by name. Subsets are tried by increasing size in rank
//! order, so the first satisfying subset is both minimal and preferred by
//! latency. Up to [`SelectorConfig::exhaustive_org_limit`] organizations the
//! enumeration is exhaustive; beyond that the full set is pruned greedily,
//! worst-ranked first, which yields an irredundant (though not necessarily
//! smallest) cover.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use endorse_common::{
    ChaincodeCall, EndorseError, InvocationChain, OrgId, PeerInfo, PolicyResolver, Result,
};
use tracing::debug;

use crate::directory::DirectorySnapshot;
use crate::plan::{EndorsementPlan, EntryRequirement, PlanEntry};
use crate::provider::PolicyProvider;

type Candidates = BTreeMap<OrgId, Vec<PeerInfo>>;

/// Upper bound on [`SelectorConfig::exhaustive_org_limit`]; larger values are
/// lowered to it.
pub const MAX_EXHAUSTIVE_ORG_LIMIT: usize = 20;

/// Selector configuration.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Largest number of candidate organizations searched exhaustively
    pub exhaustive_org_limit: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            exhaustive_org_limit: 16,
        }
    }
}

/// Computes endorsement plans from channel policies and a directory snapshot.
pub struct EndorserSelector {
    provider: Arc<dyn PolicyProvider>,
    resolver: Arc<PolicyResolver>,
    config: SelectorConfig,
}

impl EndorserSelector {
    pub fn new(provider: Arc<dyn PolicyProvider>, resolver: Arc<PolicyResolver>) -> Self {
        Self {
            provider,
            resolver,
            config: SelectorConfig::default(),
        }
    }

    pub fn with_config(mut self, mut config: SelectorConfig) -> Self {
        config.exhaustive_org_limit = config.exhaustive_org_limit.min(MAX_EXHAUSTIVE_ORG_LIMIT);
        self.config = config;
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Resolves the chaincode policy and every named collection policy of
    /// `call` into one requirement.
    pub fn requirement(&self, call: &ChaincodeCall) -> Result<EntryRequirement> {
        let expression = self.provider.chaincode_policy(&call.id)?;
        let mut requirement = EntryRequirement::new(call.id.clone(), self.resolver.resolve(&expression)?);

        for name in &call.collections {
            let config = self.provider.collection_config(&call.id, name)?;
            config.validate()?;
            let policy = self.resolver.resolve(&config.policy)?;

            requirement.required_peer_count = requirement
                .required_peer_count
                .max(config.required_peer_count);
            requirement.maximum_peer_count = Some(match requirement.maximum_peer_count {
                Some(max) => max.min(config.maximum_peer_count),
                None => config.maximum_peer_count,
            });
            requirement.collection_policies.push((name.clone(), policy));
        }

        Ok(requirement)
    }

    /// Plans every entry of `chain` independently against `snapshot`.
    ///
    /// With `target_orgs`, only peers of those organizations are considered.
    pub fn select(
        &self,
        chain: &InvocationChain,
        snapshot: &DirectorySnapshot,
        target_orgs: Option<&BTreeSet<OrgId>>,
    ) -> Result<EndorsementPlan> {
        if chain.is_empty() {
            return Err(EndorseError::InvalidConfig(
                "invocation chain is empty".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(chain.len());
        for call in chain {
            let requirement = self.requirement(call)?;
            let peers = self.select_for(&requirement, snapshot, target_orgs)?;
            debug!(
                "Selected {} peer(s) for {}: {:?}",
                peers.len(),
                call.id,
                peers.iter().map(|p| p.endpoint.as_str()).collect::<Vec<_>>()
            );
            entries.push(PlanEntry {
                call: call.clone(),
                requirement,
                peers,
            });
        }

        Ok(EndorsementPlan::new(entries))
    }

    /// Chooses peers satisfying one requirement, including any extra peers
    /// the collections ask for.
    pub fn select_for(
        &self,
        requirement: &EntryRequirement,
        snapshot: &DirectorySnapshot,
        target_orgs: Option<&BTreeSet<OrgId>>,
    ) -> Result<Vec<PeerInfo>> {
        let endorsed = BTreeSet::new();
        let candidates = candidates(requirement, snapshot, target_orgs, &BTreeSet::new(), &endorsed);
        let chosen = self
            .cover(requirement, &candidates, &endorsed)
            .ok_or_else(|| insufficient(requirement, &candidates, target_orgs))?;
        Ok(pick_peers(requirement, &chosen, &candidates))
    }

    /// Finds the additional peers needed to satisfy `requirement` when
    /// `endorsed_orgs` have already endorsed and the `excluded` endpoints
    /// failed. Returns an empty list when nothing more is needed.
    pub fn select_alternates(
        &self,
        requirement: &EntryRequirement,
        snapshot: &DirectorySnapshot,
        target_orgs: Option<&BTreeSet<OrgId>>,
        excluded: &BTreeSet<String>,
        endorsed_orgs: &BTreeSet<OrgId>,
    ) -> Result<Vec<PeerInfo>> {
        if requirement.satisfied_by(endorsed_orgs) {
            return Ok(Vec::new());
        }

        let candidates = candidates(requirement, snapshot, target_orgs, excluded, endorsed_orgs);
        let chosen = self
            .cover(requirement, &candidates, endorsed_orgs)
            .ok_or_else(|| insufficient(requirement, &candidates, target_orgs))?;

        let mut peers: Vec<PeerInfo> = chosen
            .iter()
            .filter_map(|org| candidates.get(org).and_then(|p| p.first()).cloned())
            .collect();
        peers.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        Ok(peers)
    }

    /// Returns a minimal set of candidate orgs which, together with
    /// `endorsed`, satisfies the requirement. Orgs are returned in rank order.
    fn cover(
        &self,
        requirement: &EntryRequirement,
        candidates: &Candidates,
        endorsed: &BTreeSet<OrgId>,
    ) -> Option<Vec<OrgId>> {
        let ranked = rank_orgs(candidates);
        let n = ranked.len();

        let satisfies = |subset: &[usize]| {
            requirement.satisfied_with(&|org: &str| {
                endorsed.contains(org) || subset.iter().any(|&i| ranked[i] == org)
            })
        };
        let capacity = |subset: &[usize]| {
            subset
                .iter()
                .map(|&i| candidates.get(ranked[i]).map_or(0, Vec::len))
                .sum::<usize>()
        };
        let to_orgs = |subset: &[usize]| -> Vec<OrgId> {
            subset.iter().map(|&i| ranked[i].clone()).collect()
        };

        let all: Vec<usize> = (0..n).collect();
        if !satisfies(&all) {
            return None;
        }

        if n <= self.config.exhaustive_org_limit {
            let required = requirement.required_peer_count as usize;
            for size in 1..=n {
                let mut first_satisfying: Option<Vec<usize>> = None;
                let mut indices: Vec<usize> = (0..size).collect();
                loop {
                    if satisfies(&indices) {
                        if capacity(&indices) >= required {
                            return Some(to_orgs(&indices));
                        }
                        if first_satisfying.is_none() {
                            first_satisfying = Some(indices.clone());
                        }
                    }
                    if !next_combination(&mut indices, n) {
                        break;
                    }
                }
                if let Some(subset) = first_satisfying {
                    return Some(to_orgs(&subset));
                }
            }
            return None;
        }

        debug!(
            "{} candidate orgs for {} exceed exhaustive limit {}, pruning greedily",
            n, requirement.chaincode, self.config.exhaustive_org_limit
        );
        let mut subset = all;
        for i in (0..n).rev() {
            let trial: Vec<usize> = subset.iter().copied().filter(|&j| j != i).collect();
            if satisfies(&trial) {
                subset = trial;
            }
        }
        Some(to_orgs(&subset))
    }
}

/// Live peers of organizations the requirement names, grouped by org and
/// filtered by target orgs, exclusions and already-endorsed orgs.
fn candidates(
    requirement: &EntryRequirement,
    snapshot: &DirectorySnapshot,
    target_orgs: Option<&BTreeSet<OrgId>>,
    excluded: &BTreeSet<String>,
    endorsed: &BTreeSet<OrgId>,
) -> Candidates {
    let relevant = requirement.orgs();
    snapshot
        .live_by_org()
        .into_iter()
        .filter(|(org, _)| relevant.contains(org) && !endorsed.contains(org))
        .filter(|(org, _)| target_orgs.map_or(true, |t| t.contains(org)))
        .filter_map(|(org, peers)| {
            let peers: Vec<PeerInfo> = peers
                .into_iter()
                .filter(|p| !excluded.contains(&p.endpoint))
                .collect();
            (!peers.is_empty()).then_some((org, peers))
        })
        .collect()
}

/// Orgs ordered by their best peer's latency, then by name.
fn rank_orgs(candidates: &Candidates) -> Vec<&OrgId> {
    let mut ranked: Vec<&OrgId> = candidates.keys().collect();
    ranked.sort_by_key(|org| {
        let best = candidates
            .get(*org)
            .and_then(|peers| peers.first())
            .map(|p| p.rank_key().0)
            .unwrap_or(std::time::Duration::MAX);
        (best, (*org).clone())
    });
    ranked
}

/// Advances `indices` to the next k-combination of `0..n` in lexicographic order.
fn next_combination(indices: &mut [usize], n: usize) -> bool {
    let k = indices.len();
    let mut i = k;
    while i > 0 {
        i -= 1;
        if indices[i] < n - k + i {
            indices[i] += 1;
            for j in i + 1..k {
                indices[j] = indices[j - 1] + 1;
            }
            return true;
        }
    }
    false
}

/// One peer per chosen org, then extra peers until the required peer count is
/// met, capped by the maximum peer count.
fn pick_peers(requirement: &EntryRequirement, chosen: &[OrgId], candidates: &Candidates) -> Vec<PeerInfo> {
    let mut picked: Vec<PeerInfo> = Vec::with_capacity(chosen.len());
    let mut next: BTreeMap<&OrgId, usize> = BTreeMap::new();
    for org in chosen {
        if let Some(peer) = candidates.get(org).and_then(|p| p.first()) {
            picked.push(peer.clone());
            next.insert(org, 1);
        }
    }

    let required = requirement.required_peer_count as usize;
    let cap = requirement
        .maximum_peer_count
        .map_or(usize::MAX, |max| (max as usize).max(chosen.len()));
    let target = required.min(cap);

    while picked.len() < target {
        // Org with the most unused healthy peers; rank order breaks ties
        let mut best: Option<(&OrgId, usize)> = None;
        for org in chosen {
            let total = candidates.get(org).map_or(0, Vec::len);
            let used = next.get(org).copied().unwrap_or(0);
            let remaining = total.saturating_sub(used);
            if remaining > 0 && best.map_or(true, |(_, r)| remaining > r) {
                best = Some((org, remaining));
            }
        }
        let Some((org, _)) = best else { break };
        let idx = next.get(org).copied().unwrap_or(0);
        if let Some(peer) = candidates.get(org).and_then(|p| p.get(idx)) {
            picked.push(peer.clone());
        }
        next.insert(org, idx + 1);
    }

    if picked.len() < required {
        debug!(
            "Only {} peer(s) available for {}, required peer count is {}",
            picked.len(),
            requirement.chaincode,
            required
        );
    }

    picked.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
    picked
}

fn insufficient(
    requirement: &EntryRequirement,
    candidates: &Candidates,
    target_orgs: Option<&BTreeSet<OrgId>>,
) -> EndorseError {
    let live: Vec<&str> = candidates.keys().map(String::as_str).collect();
    let mut cause = format!("no live peer set satisfies the policy; live candidate orgs: {:?}", live);
    if let Some(targets) = target_orgs {
        cause.push_str(&format!(", restricted to {:?}", targets));
    }
    EndorseError::InsufficientEndorsers {
        chaincode: requirement.chaincode.clone(),
        policy: requirement.to_string(),
        cause,
    }
}
