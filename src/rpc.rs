//! Minimal JSON-RPC 2.0 client over HTTP

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceError;

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    #[serde(default)]
    result: Option<R>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC client bound to one endpoint
pub struct RpcClient {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method`, returning its `result`.
    ///
    /// A `null` result deserializes as `R` when `R` accepts null (e.g. `Option<T>`).
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, ServiceError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(url = %self.url, method, id, "JSON-RPC call");

        let response = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("{} unreachable: {}", self.url, e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Protocol(format!(
                "{} returned HTTP {}: {}",
                method, status, body
            )));
        }

        let body: RpcResponse<serde_json::Value> = response.json().await?;

        if let Some(err) = body.error {
            return Err(ServiceError::Rejected(format!(
                "{} (code {})",
                err.message, err.code
            )));
        }

        let result = body.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).map_err(|e| {
            ServiceError::Protocol(format!("unexpected {} result: {}", method, e))
        })
    }
}

/// Parse an `0x`-prefixed hex quantity
pub fn parse_quantity(value: &str) -> Result<u64, ServiceError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| ServiceError::Protocol(format!("quantity {:?} lacks 0x prefix", value)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ServiceError::Protocol(format!("invalid quantity {:?}: {}", value, e)))
}
