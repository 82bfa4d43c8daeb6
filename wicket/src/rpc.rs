//! Generic JSON-RPC passthrough to a chain node.
//!
//! Methods the dispatcher does not own are forwarded here verbatim. One
//! client exists per resolved network endpoint; the
//! [`RpcClientFactory`] seam lets embedders (and tests) substitute the
//! transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{ProviderError, Result};

/// Transport for methods the provider does not own.
#[async_trait]
pub trait ChainRpcClient: Send + Sync {
    /// Invoke `method` with positional `params` on the chain node.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;
}

/// Builds one [`ChainRpcClient`] per resolved network endpoint.
pub trait RpcClientFactory: Send + Sync {
    /// Create a client bound to `endpoint`.
    fn client_for(&self, endpoint: &Url) -> Arc<dyn ChainRpcClient>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC client.
pub struct HttpRpcClient {
    http_client: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl std::fmt::Debug for HttpRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRpcClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpRpcClient {
    /// Create a client for `endpoint` with a default HTTP client.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create a client for `endpoint` reusing an existing HTTP client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http_client,
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl ChainRpcClient for HttpRpcClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, endpoint = self.endpoint.as_str(), "rpc passthrough");

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::rpc(format!("request to '{}' failed: {e}", self.endpoint)))?;

        let payload: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::rpc(format!("malformed rpc response: {e}")))?;

        if let Some(error) = payload.error {
            return Err(ProviderError::rpc(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }
        Ok(payload.result.unwrap_or(Value::Null))
    }
}

/// Default factory producing [`HttpRpcClient`]s that share one HTTP client.
#[derive(Debug, Clone, Default)]
pub struct HttpRpcFactory {
    http_client: reqwest::Client,
}

impl HttpRpcFactory {
    /// Create a factory with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RpcClientFactory for HttpRpcFactory {
    fn client_for(&self, endpoint: &Url) -> Arc<dyn ChainRpcClient> {
        Arc::new(HttpRpcClient::with_client(
            self.http_client.clone(),
            endpoint.clone(),
        ))
    }
}
