//! CLI Integration Tests
//!
//! Runs the `endorse` binary against temporary network files:
//! 1. `policy` evaluation and malformed expressions
//! 2. `select` plans, including collection restriction and unreachable orgs
//! 3. `submit` end to end against axum mock peers
//! 4. Error reporting (non-zero exit, message on stderr, clean stdout)

use axum::{routing::post, Json, Router};
use endorse_common::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, ENDORSE_METHOD};
use endorse_common::{NamespaceRwSet, Proposal, ProposalResponse, ReadWriteSet};
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::process::{Command, Output};

// ============================================================================
// Test Helpers
// ============================================================================

fn endorse(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_endorse"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run endorse binary")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

/// Writes a network file with one peer per organization.
fn network_file(org1: &str, org2: &str, org2_live: bool) -> tempfile::NamedTempFile {
    let network = json!({
        "channel": "mychannel",
        "peers": [
            { "endpoint": org1, "org": "Org1MSP" },
            { "endpoint": org2, "org": "Org2MSP", "live": org2_live }
        ],
        "chaincodes": {
            "pvtcc": {
                "policy": "OR('Org1MSP.member', 'Org2MSP.member')",
                "collections": [
                    { "name": "collection1", "policy": "OR('Org2MSP.member')",
                      "required_peer_count": 0, "maximum_peer_count": 1 }
                ]
            }
        }
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(network.to_string().as_bytes()).unwrap();
    file
}

fn path(file: &tempfile::NamedTempFile) -> String {
    file.path().to_string_lossy().into_owned()
}

/// Starts a peer that endorses every proposal with a write to `collection1`.
async fn start_peer() -> SocketAddr {
    async fn handle(Json(req): Json<JsonRpcRequest>) -> Json<JsonRpcResponse> {
        if req.method != ENDORSE_METHOD {
            return Json(JsonRpcResponse::success(req.id, json!({})));
        }
        let proposal: Proposal = serde_json::from_value(req.params).unwrap();
        let rwset = ReadWriteSet {
            namespaces: vec![NamespaceRwSet::new(proposal.chaincode_id.clone())
                .with_collection_write("collection1", "secret")],
        };
        let response = ProposalResponse::success(proposal.tx_id, "", "", b"ok".to_vec(), rwset);
        Json(JsonRpcResponse::success(
            req.id,
            serde_json::to_value(response).unwrap(),
        ))
    }

    let app = Router::new().route("/", post(handle));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ============================================================================
// policy
// ============================================================================

#[test]
fn test_policy_satisfied() {
    let output = endorse(&[
        "policy",
        "OutOf(2, 'Org1MSP.member', 'Org2MSP.member', 'Org3MSP.member')",
        "--org",
        "Org1MSP",
        "--org",
        "Org3MSP",
    ]);
    let report = stdout_json(&output);
    assert_eq!(report["satisfied"], true);
    assert_eq!(report["orgs"], json!(["Org1MSP", "Org2MSP", "Org3MSP"]));
}

#[test]
fn test_policy_not_satisfied() {
    let output = endorse(&["policy", "AND('Org1MSP.member', 'Org2MSP.member')", "--org", "Org1MSP"]);
    assert_eq!(stdout_json(&output)["satisfied"], false);
}

#[test]
fn test_policy_malformed_fails() {
    let output = endorse(&["policy", "AND('Org1MSP.member'"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Malformed policy"));
}

// ============================================================================
// select
// ============================================================================

#[test]
fn test_select_collection_restricts_to_org2() {
    let network = network_file("127.0.0.1:7051", "127.0.0.1:9051", true);
    let output = endorse(&["select", "-n", &path(&network), "-c", "pvtcc", "--collection", "collection1"]);

    let plan = stdout_json(&output);
    assert_eq!(plan["dispatch_set"], json!(["127.0.0.1:9051"]));
    assert_eq!(plan["orgs"], json!(["Org2MSP"]));
    assert_eq!(plan["entries"][0]["collections"], json!(["collection1"]));
}

#[test]
fn test_select_without_collection_prefers_first_org() {
    let network = network_file("127.0.0.1:7051", "127.0.0.1:9051", true);
    let output = endorse(&["select", "-n", &path(&network), "-c", "pvtcc"]);
    assert_eq!(stdout_json(&output)["orgs"], json!(["Org1MSP"]));
}

#[test]
fn test_select_fails_when_org2_unreachable() {
    let network = network_file("127.0.0.1:7051", "127.0.0.1:9051", false);
    let output = endorse(&["select", "-n", &path(&network), "-c", "pvtcc", "--collection", "collection1"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Insufficient endorsers"));
}

#[test]
fn test_select_missing_network_file() {
    let output = endorse(&["select", "-n", "/nonexistent/network.json", "-c", "pvtcc"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("IO error"));
}

#[test]
fn test_select_unknown_chaincode() {
    let network = network_file("127.0.0.1:7051", "127.0.0.1:9051", true);
    let output = endorse(&["select", "-n", &path(&network), "-c", "missingcc"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown chaincode"));
}

// ============================================================================
// submit
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_submit_end_to_end() {
    let org1 = start_peer().await;
    let org2 = start_peer().await;
    let network = network_file(&org1.to_string(), &org2.to_string(), true);
    let network_path = path(&network);

    let output = tokio::task::spawn_blocking(move || {
        endorse(&[
            "submit",
            "-n", &network_path,
            "-c", "pvtcc",
            "-f", "putprivate",
            "--arg", "collection1",
            "--arg", "secret",
            "--trace",
            "--metrics",
        ])
    })
    .await
    .unwrap();

    let report = stdout_json(&output);
    assert_eq!(report["attempts"], 1);
    assert_eq!(report["status"], 200);
    assert_eq!(report["responses"].as_array().unwrap().len(), 1);
    assert_eq!(report["responses"][0]["endpoint"], org2.to_string());
    assert_eq!(report["responses"][0]["org"], "Org2MSP");
    assert_eq!(report["transitions"].as_array().unwrap().last().unwrap()["state"], "succeeded");
    assert_eq!(report["metrics"]["successful_submissions"], 1);
}

#[test]
fn test_submit_unreachable_peers_fails() {
    let network = network_file("127.0.0.1:1", "127.0.0.1:2", true);
    let output = endorse(&[
        "submit",
        "-n", &path(&network),
        "-c", "pvtcc",
        "-f", "putprivate",
        "--max-attempts", "2",
        "--initial-delay-ms", "1",
        "--peer-timeout-ms", "500",
    ]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Gave up after 2 attempt(s)"), "stderr: {}", stderr);
}

#[test]
fn test_submit_rejects_bad_transient() {
    let network = network_file("127.0.0.1:7051", "127.0.0.1:9051", true);
    let output = endorse(&[
        "submit",
        "-n", &path(&network),
        "-c", "pvtcc",
        "-f", "putprivate",
        "--transient", "novalue",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected key=value"));
}
