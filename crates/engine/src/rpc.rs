//! JSON-RPC network probe.
//!
//! Answers `eth_chainId` and `eth_gasPrice` from a node. Uses `ureq` (sync)
//! wrapped in `tokio::task::spawn_blocking` so the runtime never blocks.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use warden_core::U256;

use crate::verifier::{Network, VerifierError};

pub struct RpcNetwork {
    url: String,
}

impl RpcNetwork {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn call(&self, method: &'static str) -> Result<String, VerifierError> {
        let url = self.url.clone();
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": [] });

        let response = tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            let response = agent
                .post(&url)
                .send_json(&body)
                .map_err(|e| VerifierError::Transport(e.to_string()))?;
            response
                .into_body()
                .read_json::<Value>()
                .map_err(|e| VerifierError::Transport(format!("invalid JSON-RPC response: {}", e)))
        })
        .await
        .map_err(|e| VerifierError::Transport(format!("task join error: {}", e)))??;

        debug!(method, "JSON-RPC call answered");
        result_quantity(method, &response)
    }
}

/// Pull the hex quantity out of a JSON-RPC response.
fn result_quantity(method: &str, response: &Value) -> Result<String, VerifierError> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(VerifierError::Transport(format!("{} failed: {}", method, message)));
    }
    response
        .get("result")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| VerifierError::Transport(format!("{} returned no result", method)))
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(text: &str) -> Result<U256, VerifierError> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| VerifierError::Transport(format!("quantity '{}' is not 0x-prefixed", text)))?;
    if digits.is_empty() {
        return Err(VerifierError::Transport("empty quantity".to_string()));
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| VerifierError::Transport(format!("invalid quantity '{}': {}", text, e)))
}

#[async_trait]
impl Network for RpcNetwork {
    async fn chain_id(&self) -> Result<u64, VerifierError> {
        let quantity = parse_quantity(&self.call("eth_chainId").await?)?;
        u64::try_from(quantity)
            .map_err(|_| VerifierError::Transport(format!("chain id {} out of range", quantity)))
    }

    async fn gas_price(&self) -> Result<U256, VerifierError> {
        parse_quantity(&self.call("eth_gasPrice").await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_quantity("0x1").unwrap(), U256::from(1u64));
        assert_eq!(parse_quantity("0x7a69").unwrap(), U256::from(31337u64));
        assert!(parse_quantity("1").is_err());
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn error_responses_surface_message() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "method not found"}});
        let err = result_quantity("eth_gasPrice", &response).unwrap_err();
        assert!(err.to_string().contains("method not found"));

        let ok = json!({"jsonrpc": "2.0", "id": 1, "result": "0x3b9aca00"});
        assert_eq!(result_quantity("eth_gasPrice", &ok).unwrap(), "0x3b9aca00");
    }

    #[tokio::test]
    async fn unreachable_node_is_transport_error() {
        let network = RpcNetwork::new("http://127.0.0.1:1");
        let err = network.chain_id().await.unwrap_err();
        assert!(matches!(err, VerifierError::Transport(_)));
    }
}
