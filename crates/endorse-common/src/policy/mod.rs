//! Membership policy language.
//!
//! A policy is a boolean combinator tree over organization principals:
//!
//! ```text
//! OR('Org1MSP.member', AND('Org2MSP.peer', OutOf(2, 'Org3MSP.member', 'Org4MSP.member', 'Org5MSP.member')))
//! ```
//!
//! Policies are evaluated against a set of organizations: a principal is
//! satisfied iff its organization is present. Roles are carried through for
//! display and diagnostics but do not change org-set evaluation.
//!
//! - [`Policy`]: the parsed tree and its evaluator
//! - [`parse`]: text form to tree
//! - [`PolicyResolver`]: memoizing front end to the parser

mod parser;
mod resolver;

pub use parser::{parse, MAX_POLICY_DEPTH};
pub use resolver::PolicyResolver;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::protocol::OrgId;

/// Role a principal must hold within its organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
    Client,
    Peer,
    Orderer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Client => "client",
            Role::Peer => "peer",
            Role::Orderer => "orderer",
        }
    }

    pub fn from_name(name: &str) -> Option<Role> {
        match name.to_ascii_lowercase().as_str() {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            "client" => Some(Role::Client),
            "peer" => Some(Role::Peer),
            "orderer" => Some(Role::Orderer),
            _ => None,
        }
    }
}

/// A parsed membership policy. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Identity { org: OrgId, role: Role },
    And(Vec<Policy>),
    Or(Vec<Policy>),
    NOfM { n: usize, children: Vec<Policy> },
}

impl Policy {
    pub fn member(org: impl Into<OrgId>) -> Self {
        Policy::Identity {
            org: org.into(),
            role: Role::Member,
        }
    }

    /// Evaluates the policy against a set of organizations.
    pub fn satisfied_by(&self, orgs: &BTreeSet<OrgId>) -> bool {
        self.satisfied_with(&|org: &str| orgs.contains(org))
    }

    /// Evaluates the policy with an arbitrary org-membership predicate.
    pub fn satisfied_with<F>(&self, has_org: &F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        match self {
            Policy::Identity { org, .. } => has_org(org),
            Policy::And(children) => children.iter().all(|c| c.satisfied_with(has_org)),
            Policy::Or(children) => children.iter().any(|c| c.satisfied_with(has_org)),
            Policy::NOfM { n, children } => {
                let mut satisfied = 0;
                for child in children {
                    if child.satisfied_with(has_org) {
                        satisfied += 1;
                        if satisfied >= *n {
                            return true;
                        }
                    }
                }
                *n == 0
            }
        }
    }

    /// Every organization the policy mentions, sorted.
    pub fn orgs(&self) -> BTreeSet<OrgId> {
        let mut out = BTreeSet::new();
        self.collect_orgs(&mut out);
        out
    }

    fn collect_orgs(&self, out: &mut BTreeSet<OrgId>) {
        match self {
            Policy::Identity { org, .. } => {
                out.insert(org.clone());
            }
            Policy::And(children) | Policy::Or(children) | Policy::NOfM { children, .. } => {
                for child in children {
                    child.collect_orgs(out);
                }
            }
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_children(f: &mut fmt::Formatter<'_>, children: &[Policy]) -> fmt::Result {
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", child)?;
            }
            Ok(())
        }

        match self {
            Policy::Identity { org, role } => write!(f, "'{}.{}'", org, role.as_str()),
            Policy::And(children) => {
                write!(f, "AND(")?;
                write_children(f, children)?;
                write!(f, ")")
            }
            Policy::Or(children) => {
                write!(f, "OR(")?;
                write_children(f, children)?;
                write!(f, ")")
            }
            Policy::NOfM { n, children } => {
                write!(f, "OutOf({}, ", n)?;
                write_children(f, children)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orgs(names: &[&str]) -> BTreeSet<OrgId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_identity_evaluation() {
        let p = Policy::member("Org1MSP");
        assert!(p.satisfied_by(&orgs(&["Org1MSP"])));
        assert!(!p.satisfied_by(&orgs(&["Org2MSP"])));
        assert!(!p.satisfied_by(&orgs(&[])));
    }

    #[test]
    fn test_and_or_evaluation() {
        let and = Policy::And(vec![Policy::member("Org1MSP"), Policy::member("Org2MSP")]);
        assert!(and.satisfied_by(&orgs(&["Org1MSP", "Org2MSP"])));
        assert!(!and.satisfied_by(&orgs(&["Org1MSP"])));

        let or = Policy::Or(vec![Policy::member("Org1MSP"), Policy::member("Org2MSP")]);
        assert!(or.satisfied_by(&orgs(&["Org2MSP"])));
        assert!(!or.satisfied_by(&orgs(&["Org3MSP"])));
    }

    #[test]
    fn test_n_of_m_evaluation() {
        let p = Policy::NOfM {
            n: 2,
            children: vec![
                Policy::member("Org1MSP"),
                Policy::member("Org2MSP"),
                Policy::member("Org3MSP"),
            ],
        };
        assert!(!p.satisfied_by(&orgs(&["Org1MSP"])));
        assert!(p.satisfied_by(&orgs(&["Org1MSP", "Org3MSP"])));
        assert!(p.satisfied_by(&orgs(&["Org1MSP", "Org2MSP", "Org3MSP"])));
    }

    #[test]
    fn test_nested_evaluation() {
        // Org1 alone, or both Org2 and Org3
        let p = Policy::Or(vec![
            Policy::member("Org1MSP"),
            Policy::And(vec![Policy::member("Org2MSP"), Policy::member("Org3MSP")]),
        ]);
        assert!(p.satisfied_by(&orgs(&["Org1MSP"])));
        assert!(!p.satisfied_by(&orgs(&["Org2MSP"])));
        assert!(p.satisfied_by(&orgs(&["Org2MSP", "Org3MSP"])));
    }

    #[test]
    fn test_orgs_collects_every_principal() {
        let p = Policy::Or(vec![
            Policy::member("Org2MSP"),
            Policy::And(vec![Policy::member("Org1MSP"), Policy::member("Org2MSP")]),
        ]);
        assert_eq!(p.orgs(), orgs(&["Org1MSP", "Org2MSP"]));
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let p = Policy::NOfM {
            n: 1,
            children: vec![
                Policy::member("Org1MSP"),
                Policy::Identity { org: "Org2MSP".into(), role: Role::Admin },
            ],
        };
        let text = p.to_string();
        assert_eq!(text, "OutOf(1, 'Org1MSP.member', 'Org2MSP.admin')");
        assert_eq!(parse(&text).unwrap(), p);
    }
}
