use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};

/// reqwest client paced by a per-adapter rate limiter
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpTransport {
    pub fn new(timeout: Duration, requests_per_second: u32) -> AdapterResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Network(format!("failed to build HTTP client: {}", e)))?;

        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> AdapterResult<T> {
        let response = self.send(self.client.get(url)).await?;
        Ok(response.json().await?)
    }

    pub async fn get_json_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> AdapterResult<T> {
        let response = self.send(self.client.get(url).query(query)).await?;
        Ok(response.json().await?)
    }

    pub async fn get_text(&self, url: &str) -> AdapterResult<String> {
        let response = self.send(self.client.get(url)).await?;
        Ok(response.text().await?)
    }

    pub async fn post_text(&self, url: &str, body: String) -> AdapterResult<String> {
        let response = self.send(self.client.post(url).body(body)).await?;
        Ok(response.text().await?)
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> AdapterResult<T> {
        let response = self.send(self.client.post(url).json(body)).await?;
        Ok(response.json().await?)
    }

    /// JSON-RPC 2.0 call; an RPC-level error is mapped like an HTTP one
    pub async fn rpc_call<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> AdapterResult<T> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let reply: RpcReply<T> = self.post_json(url, &request).await?;
        match (reply.result, reply.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(map_rpc_error(error.code, &error.message)),
            (None, None) => Err(AdapterError::Network(format!(
                "{} returned neither result nor error",
                method
            ))),
        }
    }

    async fn send(&self, request: RequestBuilder) -> AdapterResult<Response> {
        self.limiter.until_ready().await;

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Backend replied {}: {}", status, body);
        Err(map_status(status, &body))
    }
}

#[derive(Debug, Deserialize)]
struct RpcReply<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Maps a non-success HTTP status onto the adapter taxonomy
pub fn map_status(status: StatusCode, body: &str) -> AdapterError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimited,
        StatusCode::NOT_FOUND => AdapterError::NotFound(truncate(body)),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            if mentions_insufficient_funds(body) {
                AdapterError::InsufficientFunds(truncate(body))
            } else {
                AdapterError::InvalidParams(truncate(body))
            }
        }
        other => AdapterError::Network(format!("HTTP {}: {}", other, truncate(body))),
    }
}

fn map_rpc_error(code: i64, message: &str) -> AdapterError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("rate limit") || code == -32029 {
        AdapterError::RateLimited
    } else if mentions_insufficient_funds(message) {
        AdapterError::InsufficientFunds(message.to_string())
    } else if lowered.contains("not found") || lowered.contains("could not find") {
        AdapterError::NotFound(message.to_string())
    } else if code == -32602 || code == -32600 {
        AdapterError::InvalidParams(message.to_string())
    } else {
        AdapterError::Network(format!("RPC error {}: {}", code, message))
    }
}

pub fn mentions_insufficient_funds(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    lowered.contains("insufficient funds")
        || lowered.contains("insufficient balance")
        || lowered.contains("insufficientcoinbalance")
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status(StatusCode::TOO_MANY_REQUESTS, ""), AdapterError::RateLimited);
        assert!(matches!(map_status(StatusCode::NOT_FOUND, "Block not found"), AdapterError::NotFound(_)));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, "sendrawtransaction RPC error: insufficient funds"),
            AdapterError::InsufficientFunds(_)
        ));
        assert!(matches!(map_status(StatusCode::BAD_REQUEST, "bad-txns"), AdapterError::InvalidParams(_)));
        assert!(matches!(map_status(StatusCode::BAD_GATEWAY, ""), AdapterError::Network(_)));
    }

    #[test]
    fn test_rpc_error_mapping() {
        assert_eq!(map_rpc_error(-32029, "Too many requests"), AdapterError::RateLimited);
        assert!(matches!(
            map_rpc_error(-32000, "Could not find the referenced checkpoint"),
            AdapterError::NotFound(_)
        ));
        assert!(matches!(map_rpc_error(-32602, "Invalid params"), AdapterError::InvalidParams(_)));
    }
}
