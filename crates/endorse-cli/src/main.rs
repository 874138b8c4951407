//! # Endorse CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Check whether Org1 and Org3 satisfy a policy
//! endorse policy "OutOf(2, 'Org1MSP.member', 'Org2MSP.member', 'Org3MSP.member')" \
//!   --org Org1MSP --org Org3MSP
//!
//! # Show which peers would endorse a call touching a private collection
//! endorse select -n network.json -c pvtcc --collection collection1
//!
//! # Submit, detecting the invocation chain by simulation (outputs raw JSON)
//! endorse submit -n network.json -c pvtcc -f putprivate --arg collection1 --arg k --arg v
//! ```
//!
//! Logs go to stderr; `RUST_LOG` overrides the default `info` level.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use argh::FromArgs;
use endorse_cli::{build_chain, evaluate_policy, NetworkConfig, PlanReport, SubmitReport};
use endorse_client::{ChannelClient, RetryPolicy, SubmitOptions};
use endorse_common::{HttpTransport, PolicyResolver, Proposal, ProposalTransport};
use endorse_selection::{
    EndorserSelector, LivenessProber, PeerDirectory, ProbeConfig, SelectorConfig,
};

#[derive(FromArgs)]
/// Policy-aware endorsement for permissioned ledger channels
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Policy(PolicyArgs),
    Select(SelectArgs),
    Submit(SubmitArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "policy")]
/// parse an endorsement policy and evaluate it against a set of orgs
struct PolicyArgs {
    /// policy expression, e.g. "OR('Org1MSP.member', 'Org2MSP.member')"
    #[argh(positional)]
    expression: String,

    /// organization that endorsed; repeat for several
    ///
    /// When given, the output reports whether the orgs satisfy the policy.
    #[argh(option, long = "org")]
    orgs: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "select")]
/// print the endorsement plan for an explicit invocation chain
struct SelectArgs {
    /// path to the JSON network file
    #[argh(option, short = 'n')]
    network: PathBuf,

    /// chaincode invoked by the transaction
    #[argh(option, short = 'c')]
    chaincode: String,

    /// private-data collection the chaincode touches; repeatable
    #[argh(option, long = "collection")]
    collections: Vec<String>,

    /// further chaincode called by the transaction; repeatable
    #[argh(option, long = "calls")]
    calls: Vec<String>,

    /// restrict endorsers to this organization; repeatable
    #[argh(option, long = "target-org")]
    target_orgs: Vec<String>,

    /// largest number of organizations searched exhaustively for a minimal set
    ///
    /// Above this, a greedy search is used. Defaults to 16, capped at 20.
    #[argh(option, long = "exhaustive-org-limit", default = "16")]
    exhaustive_org_limit: usize,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "submit")]
/// collect endorsements for a proposal and print the result as JSON
struct SubmitArgs {
    /// path to the JSON network file
    #[argh(option, short = 'n')]
    network: PathBuf,

    /// chaincode invoked by the transaction
    #[argh(option, short = 'c')]
    chaincode: String,

    /// chaincode function to invoke
    #[argh(option, short = 'f')]
    fcn: String,

    /// function argument; repeatable, in order
    #[argh(option, long = "arg")]
    args: Vec<String>,

    /// transient data entry as key=value; repeatable
    #[argh(option, long = "transient")]
    transient: Vec<String>,

    /// private-data collection the chaincode touches; implies an explicit chain
    #[argh(option, long = "collection")]
    collections: Vec<String>,

    /// further chaincode called by the transaction; implies an explicit chain
    #[argh(option, long = "calls")]
    calls: Vec<String>,

    /// use the named chaincode alone as an explicit chain instead of simulating
    #[argh(switch, long = "explicit")]
    explicit: bool,

    /// restrict endorsers to this organization; repeatable
    #[argh(option, long = "target-org")]
    target_orgs: Vec<String>,

    /// total attempts including the first; defaults to 3
    #[argh(option, long = "max-attempts", default = "3")]
    max_attempts: u32,

    /// backoff before the second attempt in milliseconds; defaults to 50
    #[argh(option, long = "initial-delay-ms", default = "50")]
    initial_delay_ms: u64,

    /// upper bound on any backoff in milliseconds; defaults to 5000
    #[argh(option, long = "max-delay-ms", default = "5000")]
    max_delay_ms: u64,

    /// budget for one attempt in milliseconds; defaults to 30000
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,

    /// budget for a single peer call in milliseconds; defaults to 10000
    #[argh(option, long = "peer-timeout-ms", default = "10000")]
    peer_timeout_ms: u64,

    /// overall deadline for the submission in milliseconds, retries included
    #[argh(option, long = "deadline-ms")]
    deadline_ms: Option<u64>,

    /// probe every peer once before submitting and skip unreachable ones
    #[argh(switch, long = "probe")]
    probe: bool,

    /// include the attempt state transitions in the output
    #[argh(switch, long = "trace")]
    trace: bool,

    /// include submission metrics in the output
    #[argh(switch, long = "metrics")]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // stdout carries the JSON output only
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Policy(args) => {
            let report = evaluate_policy(&args.expression, &args.orgs)?;
            println!("{}", serde_json::to_string(&report)?);
            Ok(())
        }
        Commands::Select(args) => run_select(args),
        Commands::Submit(args) => run_submit(args).await,
    }
}

fn run_select(args: SelectArgs) -> Result<()> {
    let network = NetworkConfig::load(&args.network)?;
    let selector = EndorserSelector::new(
        Arc::new(network.chaincodes.clone()),
        Arc::new(PolicyResolver::new()),
    )
    .with_config(SelectorConfig {
        exhaustive_org_limit: args.exhaustive_org_limit,
    });

    let chain = build_chain(&args.chaincode, &args.collections, &args.calls);
    let targets: Option<BTreeSet<String>> = (!args.target_orgs.is_empty())
        .then(|| args.target_orgs.iter().cloned().collect());
    let plan = selector.select(&chain, &network.snapshot(), targets.as_ref())?;

    println!("{}", serde_json::to_string(&PlanReport::from(&plan))?);
    Ok(())
}

async fn run_submit(args: SubmitArgs) -> Result<()> {
    let network = NetworkConfig::load(&args.network)?;
    let peer_timeout = Duration::from_millis(args.peer_timeout_ms);

    let directory = Arc::new(network.directory());
    let transport: Arc<dyn ProposalTransport> = Arc::new(HttpTransport::with_timeout(peer_timeout));

    if args.probe {
        let prober = LivenessProber::new(
            Arc::clone(&directory),
            Arc::clone(&transport),
            ProbeConfig {
                failure_threshold: 1,
                ..ProbeConfig::default()
            },
        );
        prober.probe_all().await;
        tracing::info!(
            "{} of {} peer(s) live after probing",
            directory.snapshot().live_peers().count(),
            network.peers.len()
        );
    }

    let mut proposal = Proposal::new(network.channel.as_str(), args.chaincode.as_str(), args.fcn.as_str())
        .with_args(args.args.iter().cloned());
    for entry in &args.transient {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid transient entry '{}': expected key=value", entry))?;
        proposal = proposal.with_transient(key, value);
    }

    let retry = RetryPolicy {
        max_attempts: args.max_attempts,
        initial_delay: Duration::from_millis(args.initial_delay_ms),
        max_delay: Duration::from_millis(args.max_delay_ms),
        ..RetryPolicy::default()
    };
    let mut options = SubmitOptions::default()
        .with_retry(retry)
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .with_peer_timeout(peer_timeout);
    if args.explicit || !args.collections.is_empty() || !args.calls.is_empty() {
        options = options.with_invocation_chain(build_chain(&args.chaincode, &args.collections, &args.calls));
    }
    if !args.target_orgs.is_empty() {
        options = options.with_target_orgs(args.target_orgs.iter().cloned());
    }
    if let Some(ms) = args.deadline_ms {
        options = options.with_deadline(Instant::now() + Duration::from_millis(ms));
    }

    let client = ChannelClient::new(
        network.channel.clone(),
        directory,
        Arc::new(network.chaincodes.clone()),
        transport,
    );
    let (result, transitions) = client.submit_traced(&proposal, options).await;

    let report = SubmitReport {
        result: result?,
        transitions: if args.trace { transitions } else { Vec::new() },
        metrics: args.metrics.then(|| client.metrics()),
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_policy() {
        let args: Cli = Cli::from_args(
            &["endorse"],
            &["policy", "OR('Org1MSP.member')", "--org", "Org1MSP", "--org", "Org2MSP"],
        )
        .unwrap();
        match args.command {
            Commands::Policy(PolicyArgs { expression, orgs }) => {
                assert_eq!(expression, "OR('Org1MSP.member')");
                assert_eq!(orgs, vec!["Org1MSP".to_string(), "Org2MSP".to_string()]);
            }
            _ => panic!("Expected Policy command"),
        }
    }

    #[test]
    fn test_cli_parse_select() {
        let args: Cli = Cli::from_args(
            &["endorse"],
            &[
                "select",
                "-n", "network.json",
                "-c", "pvtcc",
                "--collection", "collection1",
                "--target-org", "Org2MSP",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Select(args) => {
                assert_eq!(args.network, PathBuf::from("network.json"));
                assert_eq!(args.chaincode, "pvtcc");
                assert_eq!(args.collections, vec!["collection1".to_string()]);
                assert!(args.calls.is_empty());
                assert_eq!(args.target_orgs, vec!["Org2MSP".to_string()]);
                assert_eq!(args.exhaustive_org_limit, 16); // default
            }
            _ => panic!("Expected Select command"),
        }
    }

    #[test]
    fn test_cli_parse_submit_defaults() {
        let args: Cli = Cli::from_args(
            &["endorse"],
            &["submit", "-n", "network.json", "-c", "basic", "-f", "ReadAsset", "--arg", "asset1"],
        )
        .unwrap();
        match args.command {
            Commands::Submit(args) => {
                assert_eq!(args.fcn, "ReadAsset");
                assert_eq!(args.args, vec!["asset1".to_string()]);
                assert_eq!(args.max_attempts, 3);
                assert_eq!(args.initial_delay_ms, 50);
                assert_eq!(args.max_delay_ms, 5000);
                assert_eq!(args.timeout_ms, 30000);
                assert_eq!(args.peer_timeout_ms, 10000);
                assert!(args.deadline_ms.is_none());
                assert!(!args.explicit);
                assert!(!args.probe);
                assert!(!args.trace);
            }
            _ => panic!("Expected Submit command"),
        }
    }

    #[test]
    fn test_cli_parse_submit_options() {
        let args: Cli = Cli::from_args(
            &["endorse"],
            &[
                "submit",
                "-n", "network.json",
                "-c", "pvtcc",
                "-f", "putprivate",
                "--transient", "price=42",
                "--calls", "basic",
                "--max-attempts", "5",
                "--deadline-ms", "1500",
                "--probe",
                "--trace",
                "--metrics",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Submit(args) => {
                assert_eq!(args.transient, vec!["price=42".to_string()]);
                assert_eq!(args.calls, vec!["basic".to_string()]);
                assert_eq!(args.max_attempts, 5);
                assert_eq!(args.deadline_ms, Some(1500));
                assert!(args.probe && args.trace && args.metrics);
            }
            _ => panic!("Expected Submit command"),
        }
    }

    #[test]
    fn test_cli_submit_requires_fcn() {
        let result = Cli::from_args(&["endorse"], &["submit", "-n", "network.json", "-c", "basic"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_unknown_command() {
        assert!(Cli::from_args(&["endorse"], &["orchestrate"]).is_err());
    }
}
