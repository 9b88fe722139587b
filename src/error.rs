//! Unified error types for the arbitrage engine.

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Chain RPC error.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// WebSocket subscription error.
    #[error("websocket error: {0}")]
    Ws(#[from] WsError),

    /// Pool discovery error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Trade execution error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classified transaction-submission failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// The node rejected the gas price or fee cap.
    #[error("gas-too-high")]
    GasTooHigh,

    /// Nonce already used or out of sequence.
    #[error("nonce-conflict")]
    NonceConflict,

    /// Execution reverted during submission checks.
    #[error("reverted")]
    Reverted,

    /// Transport or node failure.
    #[error("network")]
    Network,
}

/// Chain RPC and transaction errors.
#[derive(Error, Debug)]
pub enum ChainError {
    /// HTTP transport failure.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON-RPC level error returned by the node.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Node-supplied message.
        message: String,
    },

    /// An `eth_call` reverted.
    #[error("call reverted: {reason}")]
    CallReverted {
        /// Decoded revert reason (selector or message).
        reason: String,
        /// Raw revert data.
        data: Vec<u8>,
    },

    /// Response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Classified transaction submission failure.
    #[error("submission failed ({kind}): {message}")]
    Submit {
        /// Failure classification.
        kind: SubmitErrorKind,
        /// Raw failure message.
        message: String,
    },

    /// No receipt appeared within the polling deadline.
    #[error("receipt timeout for {hash}")]
    ReceiptTimeout {
        /// Transaction hash being awaited.
        hash: B256,
    },
}

impl ChainError {
    /// Classification of a submission error, if this is one.
    pub fn submit_kind(&self) -> Option<SubmitErrorKind> {
        match self {
            ChainError::Submit { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: {reason}")]
    ConnectionClosed {
        /// Close reason.
        reason: String,
    },

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    Parse(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    Send(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Pool discovery and registration errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A factory lookup failed.
    #[error("factory query failed for {dex}: {reason}")]
    Factory {
        /// Dex identifier.
        dex: String,
        /// Failure reason.
        reason: String,
    },

    /// Token metadata could not be fetched.
    #[error("token metadata failed for {token}: {reason}")]
    TokenMetadata {
        /// Token address.
        token: Address,
        /// Failure reason.
        reason: String,
    },

    /// Underlying chain error.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

/// Trade execution errors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Signing material was invalid.
    #[error("signing error: {0}")]
    Signing(String),

    /// Transaction submission failed after any permitted retry.
    #[error("submission failed ({kind}): {message}")]
    Submission {
        /// Failure classification.
        kind: SubmitErrorKind,
        /// Raw failure message.
        message: String,
    },

    /// A realized loss breached a configured ceiling.
    #[error("loss limit breached: loss {loss} >= limit {limit}")]
    LossLimit {
        /// Observed loss in wei.
        loss: U256,
        /// Breached limit in wei.
        limit: U256,
    },

    /// Underlying chain error.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
