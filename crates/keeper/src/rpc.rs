//! Thin Ethereum JSON-RPC client used by venue adapters and keeper endpoints.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::abi::to_hex;
use crate::error::RpcError;

/// Response envelope of a JSON-RPC 2.0 call
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Mined transaction receipt (the fields the keeper reads)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: Option<String>,
    pub status: Option<String>,
}

impl TransactionReceipt {
    /// Pre-Byzantium receipts carry no status and count as successful
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() != Some("0x0")
    }

    pub fn block(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(|b| parse_quantity(b).ok())
    }
}

/// Parse a hex quantity such as `"0x1b4"`
pub fn parse_quantity(quantity: &str) -> Result<u64, RpcError> {
    let digits = quantity.strip_prefix("0x").unwrap_or(quantity);
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::Decode {
        what: format!("quantity {}", quantity),
        reason: e.to_string(),
    })
}

pub struct EthRpc {
    client: Client,
    url: String,
    receipt_poll: Duration,
    next_id: AtomicU64,
}

impl EthRpc {
    pub fn new(url: impl Into<String>, timeout: Duration, receipt_poll: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            receipt_poll,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request_optional<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(RpcError::Node {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result)
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))
    }

    /// `eth_call` against the latest block, returning the raw return data
    pub async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, RpcError> {
        let result: String = self
            .request("eth_call", json!([{ "to": to, "data": to_hex(data) }, "latest"]))
            .await?;
        hex::decode(result.trim_start_matches("0x")).map_err(|e| RpcError::Decode {
            what: "eth_call result".to_string(),
            reason: e.to_string(),
        })
    }

    /// Submit a transaction from a node-managed account, returning its hash
    pub async fn send_transaction(&self, from: &str, to: &str, data: &[u8]) -> Result<String, RpcError> {
        let hash: String = self
            .request(
                "eth_sendTransaction",
                json!([{ "from": from, "to": to, "data": to_hex(data) }]),
            )
            .await?;
        debug!(%hash, %to, "transaction submitted");
        Ok(hash)
    }

    pub async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, RpcError> {
        self.request_optional("eth_getTransactionReceipt", json!([hash])).await
    }

    /// Whether the node knows the transaction at all (pending or mined)
    pub async fn transaction_known(&self, hash: &str) -> Result<bool, RpcError> {
        let tx: Option<Value> = self.request_optional("eth_getTransactionByHash", json!([hash])).await?;
        Ok(tx.is_some())
    }

    /// Poll until the transaction is mined. Has no deadline of its own;
    /// callers bound it with the retry executor.
    pub async fn wait_for_receipt(&self, hash: &str) -> Result<TransactionReceipt, RpcError> {
        loop {
            if let Some(receipt) = self.transaction_receipt(hash).await? {
                if !receipt.succeeded() {
                    return Err(RpcError::Reverted(hash.to_string()));
                }
                return Ok(receipt);
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }

    /// Submit and wait for confirmation
    pub async fn transact(&self, from: &str, to: &str, data: &[u8]) -> Result<TransactionReceipt, RpcError> {
        let hash = self.send_transaction(from, to, data).await?;
        self.wait_for_receipt(&hash).await
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let quantity: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("0xnope").is_err());
    }

    #[test]
    fn test_receipt_status() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockNumber": "0x10",
            "status": "0x1",
            "gasUsed": "0x5208"
        }))
        .unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.block(), Some(16));

        let reverted: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0xdef",
            "blockNumber": null,
            "status": "0x0"
        }))
        .unwrap();
        assert!(!reverted.succeeded());
        assert_eq!(reverted.block(), None);
    }

    #[test]
    fn test_error_envelope() {
        let response: JsonRpcResponse<String> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted" }
        }))
        .unwrap();
        assert!(response.result.is_none());
        let err = response.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "execution reverted");
    }
}
