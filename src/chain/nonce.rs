//! Per-chain nonce management.
//!
//! One `NonceManager` exists per chain and is only driven by that chain's
//! executor task, so nonces are handed out by a single writer. The counter
//! starts from the chain and only advances once a submitted transaction is
//! confirmed mined; a mined revert consumes its nonce like a success.

use alloy::primitives::Address;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::client::ChainClient;
use crate::error::ChainError;

/// Single-writer nonce counter for one wallet on one chain.
#[derive(Debug)]
pub struct NonceManager {
    address: Address,
    next: Mutex<Option<u64>>,
}

impl NonceManager {
    /// Create an uninitialized manager; the first `next` call syncs from chain.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            next: Mutex::new(None),
        }
    }

    /// The nonce to use for the next submission. Initializes lazily from
    /// `eth_getTransactionCount` and does not advance.
    pub async fn next(&self, client: &dyn ChainClient) -> Result<u64, ChainError> {
        let mut guard = self.next.lock().await;
        match *guard {
            Some(nonce) => Ok(nonce),
            None => {
                let nonce = client.transaction_count(self.address).await?;
                info!(
                    chain = client.chain_id(),
                    address = %self.address,
                    nonce,
                    "nonce counter initialized from chain"
                );
                *guard = Some(nonce);
                Ok(nonce)
            }
        }
    }

    /// Advance after a submitted transaction was confirmed mined.
    pub async fn advance(&self) {
        let mut guard = self.next.lock().await;
        if let Some(nonce) = guard.as_mut() {
            *nonce += 1;
            debug!(nonce = *nonce, "nonce advanced");
        }
    }

    /// Re-read the counter from the chain after a nonce conflict.
    pub async fn resync(&self, client: &dyn ChainClient) -> Result<u64, ChainError> {
        let nonce = client.transaction_count(self.address).await?;
        let mut guard = self.next.lock().await;
        info!(
            chain = client.chain_id(),
            address = %self.address,
            nonce,
            "nonce counter resynced from chain"
        );
        *guard = Some(nonce);
        Ok(nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainClient;

    #[tokio::test]
    async fn initializes_from_chain_and_advances_only_on_request() {
        let client = MockChainClient::new(137);
        client.set_transaction_count(7);

        let manager = NonceManager::new(Address::repeat_byte(0x01));
        assert_eq!(manager.next(&client).await.unwrap(), 7);
        // Repeated reads do not advance.
        assert_eq!(manager.next(&client).await.unwrap(), 7);

        manager.advance().await;
        assert_eq!(manager.next(&client).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn resync_overrides_local_counter() {
        let client = MockChainClient::new(137);
        client.set_transaction_count(3);

        let manager = NonceManager::new(Address::repeat_byte(0x01));
        assert_eq!(manager.next(&client).await.unwrap(), 3);
        manager.advance().await;
        manager.advance().await;

        client.set_transaction_count(4);
        assert_eq!(manager.resync(&client).await.unwrap(), 4);
        assert_eq!(manager.next(&client).await.unwrap(), 4);
    }
}
