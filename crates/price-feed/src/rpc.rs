//! Read-only contract calls over Ethereum JSON-RPC
//!
//! The node handle is created once by the binary and shared by every worker.
//! `reqwest::Client` pools connections internally, so concurrent calls need
//! no external locking.

use alloy_primitives::{hex, Address, Bytes};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use pricefeed_core::FeedError;

/// Executes `eth_call` against a node
#[async_trait::async_trait]
pub trait ContractCaller: Send + Sync {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, FeedError>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC node connection
#[derive(Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        Ok(Self {
            timeout: Some(timeout),
            ..Self::with_client(http, url)
        })
    }

    pub fn with_client(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            timeout: None,
            next_id: AtomicU64::new(1),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> FeedError {
        match self.timeout {
            Some(timeout) if e.is_timeout() => FeedError::Timeout(timeout),
            _ => FeedError::Transport(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl ContractCaller for JsonRpcClient {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, FeedError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "eth_call",
            "params": [
                {
                    "to": to.to_checksum(None),
                    "data": hex::encode_prefixed(&data),
                },
                "latest"
            ]
        });

        debug!("eth_call #{} to {}", id, to);

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Transport(format!("node returned HTTP {}", status.as_u16())));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(FeedError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = body
            .result
            .ok_or_else(|| FeedError::Decode("missing result".to_string()))?;

        Bytes::from_str(&result).map_err(|e| FeedError::Decode(format!("invalid hex result: {e}")))
    }
}
