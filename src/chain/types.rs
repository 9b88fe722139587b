//! Chain-facing data types.

use alloy::primitives::{Address, B256, U256};
use serde::Serialize;

/// Monotone ordering key for pool updates, derived from the event position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SeqNo {
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u64,
}

impl SeqNo {
    /// Create a sequence number from block position.
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

/// Decoded pricing payload of a pool event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEventData {
    /// v2-family `Sync`: reserves taken verbatim.
    V2Sync {
        /// Reserve of token0.
        reserve0: U256,
        /// Reserve of token1.
        reserve1: U256,
    },
    /// v3-family `Swap`: post-swap price and in-range liquidity.
    V3Swap {
        /// Current sqrt price in Q64.96.
        sqrt_price_x96: U256,
        /// In-range liquidity.
        liquidity: u128,
    },
}

/// A decoded pool event delivered by the subscription stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEvent {
    /// Emitting pool.
    pub pool: Address,
    /// Ordering key.
    pub seq: SeqNo,
    /// Decoded payload.
    pub data: PoolEventData,
}

/// A call or transaction request.
#[derive(Debug, Clone, Default)]
pub struct TxRequest {
    /// Sender, when relevant (simulation, gas estimation).
    pub from: Option<Address>,
    /// Target contract.
    pub to: Address,
    /// Calldata.
    pub data: Vec<u8>,
    /// Value in wei.
    pub value: U256,
}

/// A mined transaction receipt.
#[derive(Debug, Clone, Serialize)]
pub struct TxReceipt {
    /// Transaction hash.
    pub transaction_hash: B256,
    /// True when execution succeeded.
    pub status: bool,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// Gas consumed.
    pub gas_used: u64,
    /// Effective gas price paid, in wei.
    pub effective_gas_price: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_no_orders_by_block_then_log_index() {
        assert!(SeqNo::new(10, 0) < SeqNo::new(10, 1));
        assert!(SeqNo::new(10, 9) < SeqNo::new(11, 0));
        assert_eq!(SeqNo::new(10, 3), SeqNo::new(10, 3));
    }
}
