//! JSON views printed by the subcommands.

use std::collections::BTreeSet;

use endorse_client::{ExecutionResult, Transition};
use endorse_common::{policy, ChaincodeCall, InvocationChain, OrgId, Result};
use endorse_metrics::MetricsSnapshot;
use endorse_selection::{EndorsementPlan, PlanEntry};
use serde::Serialize;

/// Normalized policy plus, when orgs were given, whether they satisfy it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyReport {
    pub policy: String,
    pub orgs: Vec<OrgId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satisfied: Option<bool>,
}

pub fn evaluate_policy(expression: &str, endorsing_orgs: &[String]) -> Result<PolicyReport> {
    let parsed = policy::parse(expression)?;
    let satisfied = if endorsing_orgs.is_empty() {
        None
    } else {
        let orgs: BTreeSet<OrgId> = endorsing_orgs.iter().cloned().collect();
        Some(parsed.satisfied_by(&orgs))
    };
    Ok(PolicyReport {
        policy: parsed.to_string(),
        orgs: parsed.orgs().into_iter().collect(),
        satisfied,
    })
}

/// Explicit chain: `chaincode` with its collections first, then any further
/// chaincodes it calls.
pub fn build_chain(chaincode: &str, collections: &[String], extra_chaincodes: &[String]) -> InvocationChain {
    let mut chain = InvocationChain::new();
    chain.push(ChaincodeCall::new(chaincode).with_collections(collections.iter().cloned()));
    for other in extra_chaincodes {
        chain.push(ChaincodeCall::new(other.as_str()));
    }
    chain
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerReport {
    pub endpoint: String,
    pub org: OrgId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryReport {
    pub chaincode: String,
    pub collections: Vec<String>,
    /// Combined requirement the peers satisfy
    pub requirement: String,
    pub peers: Vec<PeerReport>,
}

impl From<&PlanEntry> for EntryReport {
    fn from(entry: &PlanEntry) -> Self {
        Self {
            chaincode: entry.call.id.clone(),
            collections: entry.call.collections.clone(),
            requirement: entry.requirement.to_string(),
            peers: entry
                .peers
                .iter()
                .map(|p| PeerReport {
                    endpoint: p.endpoint.clone(),
                    org: p.org.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub entries: Vec<EntryReport>,
    /// Every peer the proposal would be sent to, ordered by endpoint
    pub dispatch_set: Vec<String>,
    pub orgs: Vec<OrgId>,
}

impl From<&EndorsementPlan> for PlanReport {
    fn from(plan: &EndorsementPlan) -> Self {
        Self {
            entries: plan.entries().iter().map(EntryReport::from).collect(),
            dispatch_set: plan.dispatch_set().into_iter().map(|p| p.endpoint).collect(),
            orgs: plan.orgs().into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReport {
    #[serde(flatten)]
    pub result: ExecutionResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<Transition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use endorse_common::{PeerInfo, PolicyResolver};
    use endorse_selection::{
        ChaincodeDefinition, DirectorySnapshot, EndorserSelector, StaticPolicyProvider,
    };
    use std::sync::Arc;

    #[test]
    fn test_evaluate_policy() {
        let report = evaluate_policy(
            "OutOf(2, 'Org1MSP.member', 'Org2MSP.member', 'Org3MSP.member')",
            &["Org1MSP".to_string(), "Org3MSP".to_string()],
        )
        .unwrap();
        assert_eq!(report.orgs.len(), 3);
        assert_eq!(report.satisfied, Some(true));

        let report = evaluate_policy("AND('Org1MSP.member', 'Org2MSP.member')", &[]).unwrap();
        assert_eq!(report.satisfied, None);
        assert!(report.policy.starts_with("AND("));
    }

    #[test]
    fn test_evaluate_malformed_policy() {
        let err = evaluate_policy("AND('Org1MSP.member'", &[]).unwrap_err();
        assert_eq!(err.kind(), "malformed_policy");
    }

    #[test]
    fn test_build_chain_merges_duplicates() {
        let chain = build_chain(
            "pvtcc",
            &["collection1".to_string()],
            &["basic".to_string(), "pvtcc".to_string()],
        );
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.calls()[0].collections, vec!["collection1".to_string()]);
    }

    #[test]
    fn test_plan_report() {
        let provider = StaticPolicyProvider::new().with_chaincode(
            "basic",
            ChaincodeDefinition::new("AND('Org1MSP.member', 'Org2MSP.member')"),
        );
        let selector = EndorserSelector::new(Arc::new(provider), Arc::new(PolicyResolver::new()));
        let snapshot = DirectorySnapshot::new(vec![
            PeerInfo::new("peer0.org2:9051", "Org2MSP"),
            PeerInfo::new("peer0.org1:7051", "Org1MSP"),
        ]);
        let plan = selector
            .select(&build_chain("basic", &[], &[]), &snapshot, None)
            .unwrap();

        let report = PlanReport::from(&plan);
        assert_eq!(report.dispatch_set, vec!["peer0.org1:7051", "peer0.org2:9051"]);
        assert_eq!(report.orgs, vec!["Org1MSP", "Org2MSP"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["chaincode"], "basic");
        assert_eq!(json["entries"][0]["peers"].as_array().unwrap().len(), 2);
    }
}
