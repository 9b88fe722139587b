//! Per-chain RPC access, event subscriptions and nonce management.

pub mod client;
pub mod mock;
pub mod nonce;
pub mod subscription;
pub mod types;

pub use client::{ChainClient, RpcClient};
pub use nonce::NonceManager;
pub use subscription::{Backoff, EventSubscriber, RefreshHook};
pub use types::{PoolEvent, PoolEventData, SeqNo, TxReceipt, TxRequest};
