//! Keeper endpoints that accept a published APY.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use apy_math::Wad;
use async_trait::async_trait;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::abi::{self, selectors, Word};
use crate::error::{KeeperError, KeeperResult, RpcError};
use crate::rpc::{EthRpc, TransactionReceipt};

/// Wire scales keeper contracts are known to consume
pub const SUPPORTED_WIRE_DECIMALS: [u32; 2] = [16, 18];

/// Number of past cycles whose submissions are remembered
const MEMO_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Primary,
    Backup,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Primary => write!(f, "primary"),
            EndpointRole::Backup => write!(f, "backup"),
        }
    }
}

/// APY converted to a keeper's wire scale and encoded as one `int256` word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpkeepPayload {
    wire_value: BigInt,
    wire_decimals: u32,
    word: Word,
}

impl UpkeepPayload {
    /// Fails fast on a scale no keeper is known to read
    pub fn encode(apy: &Wad, wire_decimals: u32) -> KeeperResult<Self> {
        if !SUPPORTED_WIRE_DECIMALS.contains(&wire_decimals) {
            return Err(KeeperError::ScaleMismatch {
                decimals: wire_decimals,
                supported: SUPPORTED_WIRE_DECIMALS.to_vec(),
            });
        }

        let wire_value = apy.raw_at_scale(wire_decimals);
        let word = abi::encode_int256(&wire_value)?;
        Ok(Self {
            wire_value,
            wire_decimals,
            word,
        })
    }

    pub fn wire_value(&self) -> &BigInt {
        &self.wire_value
    }

    pub fn wire_decimals(&self) -> u32 {
        self.wire_decimals
    }

    /// `abi.encode(int256)`, the `performData` argument
    pub fn perform_data(&self) -> &[u8] {
        &self.word
    }
}

/// One publish of one payload. Every retry of the same publish carries the
/// same `cycle_id`.
#[derive(Debug, Clone)]
pub struct UpkeepRequest {
    pub cycle_id: i64,
    pub payload: UpkeepPayload,
}

impl UpkeepRequest {
    fn memo_key(&self) -> (i64, Word) {
        (self.cycle_id, self.payload.word)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpkeepReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait KeeperEndpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Submit the payload and wait for confirmation
    async fn perform_upkeep(&self, request: &UpkeepRequest) -> KeeperResult<UpkeepReceipt>;
}

/// Node calls a keeper submission goes through
#[async_trait]
pub trait UpkeepTransport: Send + Sync {
    async fn send_transaction(&self, from: &str, to: &str, data: &[u8]) -> Result<String, RpcError>;

    /// Whether the node still has the transaction, pending or mined
    async fn transaction_known(&self, hash: &str) -> Result<bool, RpcError>;

    async fn wait_for_receipt(&self, hash: &str) -> Result<TransactionReceipt, RpcError>;
}

#[async_trait]
impl UpkeepTransport for EthRpc {
    async fn send_transaction(&self, from: &str, to: &str, data: &[u8]) -> Result<String, RpcError> {
        EthRpc::send_transaction(self, from, to, data).await
    }

    async fn transaction_known(&self, hash: &str) -> Result<bool, RpcError> {
        EthRpc::transaction_known(self, hash).await
    }

    async fn wait_for_receipt(&self, hash: &str) -> Result<TransactionReceipt, RpcError> {
        EthRpc::wait_for_receipt(self, hash).await
    }
}

/// Keeper contract reached through `performUpkeep(bytes)` on a JSON-RPC node
pub struct RpcKeeper {
    name: String,
    address: String,
    sender: String,
    rpc: Arc<dyn UpkeepTransport>,
    /// (cycle_id, performData) -> hash of the transaction submitted for it
    submitted: Mutex<HashMap<(i64, Word), String>>,
}

impl RpcKeeper {
    pub fn new(name: impl Into<String>, address: impl Into<String>, sender: impl Into<String>, rpc: Arc<dyn UpkeepTransport>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            sender: sender.into(),
            rpc,
            submitted: Mutex::new(HashMap::new()),
        }
    }

    /// Hash of a live submission of this request, if one exists
    async fn pending_submission(&self, request: &UpkeepRequest) -> KeeperResult<Option<String>> {
        let cycle_id = request.cycle_id;
        let remembered = self.submitted.lock().await.get(&request.memo_key()).cloned();
        let Some(hash) = remembered else {
            return Ok(None);
        };

        if self.rpc.transaction_known(&hash).await? {
            debug!(keeper = %self.name, cycle_id, %hash, "reusing earlier submission");
            Ok(Some(hash))
        } else {
            warn!(keeper = %self.name, cycle_id, %hash, "earlier submission dropped by node, resubmitting");
            Ok(None)
        }
    }

    async fn remember(&self, request: &UpkeepRequest, hash: &str) {
        let mut submitted = self.submitted.lock().await;
        submitted.insert(request.memo_key(), hash.to_string());
        if submitted.len() > MEMO_DEPTH {
            let mut keys: Vec<(i64, Word)> = submitted.keys().copied().collect();
            keys.sort_unstable();
            for stale in &keys[..keys.len() - MEMO_DEPTH] {
                submitted.remove(stale);
            }
        }
    }
}

#[async_trait]
impl KeeperEndpoint for RpcKeeper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn perform_upkeep(&self, request: &UpkeepRequest) -> KeeperResult<UpkeepReceipt> {
        let hash = match self.pending_submission(request).await? {
            Some(hash) => hash,
            None => {
                let data = abi::calldata_with_bytes(selectors::PERFORM_UPKEEP, request.payload.perform_data());
                let hash = self.rpc.send_transaction(&self.sender, &self.address, &data).await?;
                self.remember(request, &hash).await;
                hash
            }
        };

        let receipt = self.rpc.wait_for_receipt(&hash).await?;
        info!(
            keeper = %self.name,
            cycle_id = request.cycle_id,
            tx = %receipt.transaction_hash,
            "upkeep confirmed"
        );
        Ok(UpkeepReceipt {
            block_number: receipt.block(),
            tx_hash: receipt.transaction_hash,
        })
    }
}
