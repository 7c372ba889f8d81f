use alloy_primitives::{Bytes, TxHash, U256};
use thiserror::Error;

use crate::protocol::TransportKind;

/// Revert reason the destination gateway reports for a nonce it has already executed.
pub const ALREADY_EXECUTED: &str = "AlreadyExecuted";

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Decode error: {reason}")]
    Decode { reason: String },

    #[error("Unsupported adapter: {name}")]
    UnsupportedAdapter { name: String },

    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("Gateway {gateway} is not registered for chain {chain_id}")]
    UnregisteredGateway { chain_id: u64, gateway: String },

    #[error("Chain not configured: {chain_id}")]
    ChainNotConfigured { chain_id: u64 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Attestation failed: {reason}")]
    AttestationFailed { reason: String },

    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Attestation not found (will retry)")]
    AttestationNotFound,

    #[error("Timeout waiting for {transport} attestation")]
    AttestationTimeout { transport: TransportKind },

    #[error("Contract reverted: {reason}")]
    ContractRevert { reason: String, data: Option<Bytes> },

    #[error("Transient RPC error: {0}")]
    TransientRpc(String),

    #[error("Transaction {tx_hash} not found")]
    NotFound { tx_hash: TxHash },

    #[error("Timeout waiting for {confirmations} confirmations of {tx_hash}")]
    ConfirmationTimeout { tx_hash: TxHash, confirmations: u64 },

    #[error("Transaction {tx_hash} reverted on chain")]
    TransactionReverted { tx_hash: TxHash },

    #[error("Nonce {nonce} of chain {source_chain_id} is being relayed by another worker")]
    NonceInFlight { source_chain_id: u64, nonce: U256 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] alloy_json_rpc::RpcError<alloy_transport::TransportErrorKind>),

    #[error("Contract call failed: {0}")]
    ContractCall(#[from] alloy_contract::Error),

    #[error("ABI encoding/decoding error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Hex conversion error: {0}")]
    Hex(#[from] alloy_primitives::hex::FromHexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RelayError {
    /// Shorthand for a [`RelayError::Decode`] with the given reason.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Whether the failing step may be repeated.
    ///
    /// Everything that depends on an external network catching up (a receipt
    /// that is not mined yet, a guardian that has not signed yet, a flaky RPC
    /// endpoint) is retryable. Malformed input and contract reverts are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_)
            | Self::RateLimitExceeded { .. }
            | Self::AttestationNotFound
            | Self::AttestationTimeout { .. }
            | Self::TransientRpc(_)
            | Self::NotFound { .. }
            | Self::NonceInFlight { .. }
            | Self::ConfirmationTimeout { .. } => true,
            Self::Rpc(err) => err.is_transport_error(),
            Self::ContractCall(alloy_contract::Error::TransportError(err)) => {
                err.is_transport_error()
            }
            _ => false,
        }
    }

    /// Whether the destination gateway rejected the call because the nonce
    /// was already executed.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::ContractRevert { reason, .. } if reason == ALREADY_EXECUTED)
    }

    /// Short variant name used for span and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "Decode",
            Self::UnsupportedAdapter { .. } => "UnsupportedAdapter",
            Self::InvalidMessage { .. } => "InvalidMessage",
            Self::UnregisteredGateway { .. } => "UnregisteredGateway",
            Self::ChainNotConfigured { .. } => "ChainNotConfigured",
            Self::Network(_) => "Network",
            Self::AttestationFailed { .. } => "AttestationFailed",
            Self::RateLimitExceeded { .. } => "RateLimitExceeded",
            Self::AttestationNotFound => "AttestationNotFound",
            Self::AttestationTimeout { .. } => "AttestationTimeout",
            Self::ContractRevert { .. } => "ContractRevert",
            Self::TransientRpc(_) => "TransientRpc",
            Self::NotFound { .. } => "NotFound",
            Self::ConfirmationTimeout { .. } => "ConfirmationTimeout",
            Self::TransactionReverted { .. } => "TransactionReverted",
            Self::NonceInFlight { .. } => "NonceInFlight",
            Self::Cancelled => "Cancelled",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Rpc(_) => "Rpc",
            Self::ContractCall(_) => "ContractCall",
            Self::Abi(_) => "Abi",
            Self::Json(_) => "Json",
            Self::Hex(_) => "Hex",
            Self::Io(_) => "Io",
            Self::Toml(_) => "Toml",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
