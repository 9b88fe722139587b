//! Mock chain client for unit and scenario testing.
//!
//! Call results, receipts and failure modes are scriptable so the executor
//! and pipeline can be exercised without network access.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;

use super::client::ChainClient;
use super::types::{TxReceipt, TxRequest};
use crate::error::{ChainError, SubmitErrorKind};

/// Scriptable mock chain client.
pub struct MockChainClient {
    chain_id: u64,
    gas_price: AtomicU64,
    block_number: AtomicU64,
    transaction_count: AtomicU64,
    estimate_gas_result: AtomicU64,
    call_responses: Mutex<HashMap<(Address, [u8; 4]), Vec<u8>>>,
    call_reverts: Mutex<HashMap<Address, Vec<u8>>>,
    submit_errors: Mutex<VecDeque<(SubmitErrorKind, String)>>,
    sent: Mutex<Vec<Vec<u8>>>,
    receipts: Mutex<VecDeque<TxReceipt>>,
}

impl MockChainClient {
    /// Create a mock client with benign defaults: 20 gwei gas, empty call
    /// returns, every submission mined successfully.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            gas_price: AtomicU64::new(20_000_000_000),
            block_number: AtomicU64::new(1_000),
            transaction_count: AtomicU64::new(0),
            estimate_gas_result: AtomicU64::new(200_000),
            call_responses: Mutex::new(HashMap::new()),
            call_reverts: Mutex::new(HashMap::new()),
            submit_errors: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            receipts: Mutex::new(VecDeque::new()),
        }
    }

    /// Set the reported gas price in wei.
    pub fn set_gas_price(&self, wei: u64) {
        self.gas_price.store(wei, Ordering::SeqCst);
    }

    /// Set the reported block number.
    pub fn set_block_number(&self, block: u64) {
        self.block_number.store(block, Ordering::SeqCst);
    }

    /// Set the confirmed nonce returned for any address.
    pub fn set_transaction_count(&self, nonce: u64) {
        self.transaction_count.store(nonce, Ordering::SeqCst);
    }

    /// Set the gas estimate returned for any request.
    pub fn set_estimate_gas(&self, gas: u64) {
        self.estimate_gas_result.store(gas, Ordering::SeqCst);
    }

    /// Script the return payload of calls to `(to, selector)`.
    pub fn set_call_response(&self, to: Address, selector: [u8; 4], response: Vec<u8>) {
        self.call_responses
            .lock()
            .unwrap()
            .insert((to, selector), response);
    }

    /// Make every call (and gas estimate) against `to` revert with `data`.
    pub fn set_call_revert(&self, to: Address, data: Vec<u8>) {
        self.call_reverts.lock().unwrap().insert(to, data);
    }

    /// Remove a scripted revert.
    pub fn clear_call_revert(&self, to: Address) {
        self.call_reverts.lock().unwrap().remove(&to);
    }

    /// Script the next submission to fail with the given classification.
    pub fn push_submit_error(&self, kind: SubmitErrorKind, message: &str) {
        self.submit_errors
            .lock()
            .unwrap()
            .push_back((kind, message.to_string()));
    }

    /// Script the next receipt returned (hash is overwritten to match).
    pub fn push_receipt(&self, receipt: TxReceipt) {
        self.receipts.lock().unwrap().push_back(receipt);
    }

    /// Script a mined-revert receipt burning the given gas.
    pub fn push_reverted_receipt(&self, gas_used: u64, effective_gas_price: u128) {
        self.push_receipt(TxReceipt {
            transaction_hash: B256::ZERO,
            status: false,
            block_number: self.block_number.load(Ordering::SeqCst),
            gas_used,
            effective_gas_price,
        });
    }

    /// Raw transactions submitted so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of raw transactions submitted so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn revert_for(&self, to: Address) -> Option<ChainError> {
        self.call_reverts.lock().unwrap().get(&to).map(|data| {
            ChainError::CallReverted {
                reason: crate::abi::decode_revert_reason(data),
                data: data.clone(),
            }
        })
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, request: &TxRequest) -> Result<Vec<u8>, ChainError> {
        if let Some(err) = self.revert_for(request.to) {
            return Err(err);
        }

        let selector: [u8; 4] = request
            .data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .unwrap_or([0u8; 4]);

        let responses = self.call_responses.lock().unwrap();
        Ok(responses
            .get(&(request.to, selector))
            .cloned()
            .unwrap_or_else(|| U256::ZERO.to_be_bytes::<32>().to_vec()))
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, ChainError> {
        if let Some(err) = self.revert_for(request.to) {
            return Err(err);
        }
        Ok(self.estimate_gas_result.load(Ordering::SeqCst))
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.gas_price.load(Ordering::SeqCst) as u128)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.block_number.load(Ordering::SeqCst))
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64, ChainError> {
        Ok(self.transaction_count.load(Ordering::SeqCst))
    }

    async fn send_raw_transaction(&self, raw: &[u8], _private: bool) -> Result<B256, ChainError> {
        if let Some((kind, message)) = self.submit_errors.lock().unwrap().pop_front() {
            return Err(ChainError::Submit { kind, message });
        }

        self.sent.lock().unwrap().push(raw.to_vec());
        Ok(keccak256(raw))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let mut receipts = self.receipts.lock().unwrap();
        if let Some(mut receipt) = receipts.pop_front() {
            receipt.transaction_hash = hash;
            return Ok(Some(receipt));
        }

        Ok(Some(TxReceipt {
            transaction_hash: hash,
            status: true,
            block_number: self.block_number.load(Ordering::SeqCst),
            gas_used: 150_000,
            effective_gas_price: self.gas_price.load(Ordering::SeqCst) as u128,
        }))
    }
}
