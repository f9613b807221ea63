//! Error types for the keeper service

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("ABI error: {0}")]
    Abi(#[from] AbiError),

    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    #[error("Venue {venue}: {reason}")]
    Venue { venue: String, reason: String },

    #[error("Unsupported wire scale: {decimals} decimals (expected one of {supported:?})")]
    ScaleMismatch { decimals: u32, supported: Vec<u32> },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeeperError {
    /// Create a configuration error naming the offending parameter
    pub fn invalid_parameter(parameter: &str, value: &str, expected: &str) -> Self {
        Self::InvalidConfig(format!("{} = {} (expected {})", parameter, value, expected))
    }

    /// Create a venue error with context
    pub fn venue(venue: &str, reason: impl Into<String>) -> Self {
        Self::Venue {
            venue: venue.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        KeeperError::SerializationError(err.to_string())
    }
}

/// JSON-RPC transport and node errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("No result in response to {0}")]
    MissingResult(String),

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("Transaction {0} reverted")]
    Reverted(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        RpcError::Transport(err.to_string())
    }
}

/// ABI word encoding and decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Value {value} does not fit in a {kind} word")]
    OutOfRange { value: String, kind: &'static str },

    #[error("Return data too short: need {expected} bytes, got {actual}")]
    ShortReturn { expected: usize, actual: usize },
}

/// Snapshot history errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("History invariant violated at record {index}: {reason}")]
    InvariantViolated { index: usize, reason: String },

    #[error("Failed to access {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Corrupt history file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Result type alias for keeper operations
pub type KeeperResult<T> = std::result::Result<T, KeeperError>;
