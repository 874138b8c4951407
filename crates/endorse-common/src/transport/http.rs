//! JSON-RPC over HTTP peer transport.
//!
//! Each call issues one `POST /` to the peer with a JSON-RPC body. Peers are
//! addressed by their directory endpoint; a bare `host:port` gets an
//! `http://` prefix.
//!
//! # Example
//!
//! ```no_run
//! use endorse_common::transport::{HttpTransport, ProposalTransport};
//! use endorse_common::protocol::{PeerInfo, Proposal};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new();
//! let peer = PeerInfo::new("127.0.0.1:7051", "Org1MSP");
//! let proposal = Proposal::new("orgchannel", "pvtcc", "getprivate").with_args(["collection1", "key"]);
//! let response = transport.send_proposal(&peer, &proposal).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::ProposalTransport;
use crate::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, ENDORSE_METHOD, PROBE_METHOD};
use crate::protocol::{EndorseError, PeerInfo, Proposal, ProposalResponse, Result};

/// Default upper bound on a single HTTP exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(request_timeout: Duration) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            request_timeout,
        }
    }

    /// Turns a directory endpoint into a request URL.
    pub fn url_for(endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            format!("{}/", endpoint.trim_end_matches('/'))
        } else {
            format!("http://{}/", endpoint)
        }
    }

    async fn call(&self, peer: &PeerInfo, request: &JsonRpcRequest) -> Result<serde_json::Value> {
        let transport_err = |message: String| EndorseError::Transport {
            peer: peer.endpoint.clone(),
            message,
        };

        let body = serde_json::to_vec(request)?;
        let http_request = Request::builder()
            .method("POST")
            .uri(Self::url_for(&peer.endpoint))
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| transport_err(format!("failed to build request: {}", e)))?;

        let exchange = async {
            let response = self
                .client
                .request(http_request)
                .await
                .map_err(|e| transport_err(format!("HTTP request failed: {}", e)))?;
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| transport_err(format!("failed to read response: {}", e)))?
                .to_bytes();
            if !status.is_success() {
                return Err(transport_err(format!("HTTP status {}", status)));
            }
            Ok(bytes)
        };

        let bytes = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| EndorseError::Timeout {
                peer: peer.endpoint.clone(),
                timeout_ms: self.request_timeout.as_millis() as u64,
            })??;

        let rpc: JsonRpcResponse = serde_json::from_slice(&bytes)
            .map_err(|e| transport_err(format!("invalid JSON-RPC response: {}", e)))?;

        if let Some(error) = rpc.error {
            return Err(EndorseError::ProposalRejected {
                peer: peer.endpoint.clone(),
                status: error.code,
                message: error.message,
            });
        }

        rpc.result
            .ok_or_else(|| transport_err("response missing result".to_string()))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProposalTransport for HttpTransport {
    async fn send_proposal(&self, peer: &PeerInfo, proposal: &Proposal) -> Result<ProposalResponse> {
        let request = JsonRpcRequest::new(
            ENDORSE_METHOD,
            serde_json::to_value(proposal)?,
            serde_json::Value::String(proposal.tx_id.clone()),
        );
        let result = self.call(peer, &request).await?;

        let mut response: ProposalResponse =
            serde_json::from_value(result).map_err(|e| EndorseError::Transport {
                peer: peer.endpoint.clone(),
                message: format!("malformed proposal response: {}", e),
            })?;

        if response.tx_id != proposal.tx_id {
            return Err(EndorseError::Transport {
                peer: peer.endpoint.clone(),
                message: format!(
                    "response for transaction {} does not match proposal {}",
                    response.tx_id, proposal.tx_id
                ),
            });
        }

        // The directory is authoritative for which peer answered
        response.endpoint = peer.endpoint.clone();
        response.org = peer.org.clone();
        Ok(response)
    }

    async fn probe(&self, peer: &PeerInfo) -> Result<()> {
        let request = JsonRpcRequest::new(PROBE_METHOD, serde_json::json!({}), serde_json::json!(0));
        self.call(peer, &request).await.map(|_| ())
    }
}
