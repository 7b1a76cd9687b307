// src/rpc/client.rs
//! Low-level JSON-RPC 2.0 HTTP client shared by every remote surface
//! (rater, peers, CDR server, signaling clients).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::error::SessionError;

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<T>,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<R> {
    pub result: Option<R>,
    pub error: Option<JsonRpcError>,
    #[allow(dead_code)]
    pub id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

pub struct RpcClient {
    http_client: Client,
    base_url: String,
    request_id: AtomicU64,
}

impl RpcClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SessionError> {
        let http_client = ClientBuilder::new()
            .timeout(timeout)
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| SessionError::Internal(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    #[instrument(skip(self, params), fields(url = %self.base_url))]
    pub async fn call<T, R>(&self, method: &str, params: T) -> Result<R, SessionError>
    where
        T: Serialize + std::fmt::Debug,
        R: DeserializeOwned,
    {
        let request_id = self.next_id();

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: vec![params],
            id: request_id,
        };

        debug!("RPC request: method={}, id={}", method, request_id);

        let response = self
            .http_client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::Internal(format!("rpc connection: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            error!("RPC HTTP error: status={}", status);
            return Err(SessionError::Internal(format!(
                "rpc http status {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SessionError::Internal(format!("rpc body: {}", e)))?;

        let rpc_response: JsonRpcResponse<R> = serde_json::from_str(&body)
            .map_err(|e| SessionError::Internal(format!("rpc parse: {} - body: {}", e, body)))?;

        if let Some(err) = rpc_response.error {
            if err.message.to_uppercase().contains("NOT_ENOUGH_BALANCE")
                || err.message.to_uppercase().contains("INSUFFICIENT")
            {
                return Err(SessionError::InsufficientBalance);
            }
            return Err(SessionError::Internal(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }

        rpc_response
            .result
            .ok_or_else(|| SessionError::Internal("empty rpc response".to_string()))
    }
}
