//! Wallet key handling and transaction signing.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::error::ExecutionError;

/// Create a local signer from a hex-encoded private key.
///
/// The private key can be with or without the "0x" prefix.
pub fn create_signer(private_key: &str) -> Result<PrivateKeySigner, ExecutionError> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);
    let bytes = hex::decode(key)
        .map_err(|e| ExecutionError::Signing(format!("invalid private key hex: {e}")))?;

    if bytes.len() != 32 {
        return Err(ExecutionError::Signing(format!(
            "private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);

    PrivateKeySigner::from_bytes(&key_bytes.into())
        .map_err(|e| ExecutionError::Signing(format!("failed to create signer: {e}")))
}

/// Get the wallet address from a private key.
pub fn address_from_private_key(private_key: &str) -> Result<Address, ExecutionError> {
    Ok(create_signer(private_key)?.address())
}

/// Parameters of one EIP-1559 submission.
#[derive(Debug, Clone)]
pub struct TxParams {
    /// Chain id.
    pub chain_id: u64,
    /// Nonce.
    pub nonce: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Fee cap in wei.
    pub max_fee_per_gas: u128,
    /// Priority fee in wei.
    pub max_priority_fee_per_gas: u128,
    /// Target contract.
    pub to: Address,
    /// Calldata.
    pub data: Vec<u8>,
    /// Value in wei.
    pub value: U256,
}

/// Sign an EIP-1559 transaction and return the raw bytes for
/// `eth_sendRawTransaction`.
pub fn sign_transaction(
    signer: &PrivateKeySigner,
    params: &TxParams,
) -> Result<Vec<u8>, ExecutionError> {
    let tx = TxEip1559 {
        chain_id: params.chain_id,
        nonce: params.nonce,
        gas_limit: params.gas_limit,
        max_fee_per_gas: params.max_fee_per_gas,
        max_priority_fee_per_gas: params.max_priority_fee_per_gas,
        to: TxKind::Call(params.to),
        value: params.value,
        access_list: Default::default(),
        input: Bytes::from(params.data.clone()),
    };

    let signature = signer
        .sign_hash_sync(&tx.signature_hash())
        .map_err(|e| ExecutionError::Signing(format!("failed to sign transaction: {e}")))?;

    let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));
    Ok(envelope.encoded_2718())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn create_signer_valid_key() {
        assert!(create_signer(TEST_KEY).is_ok());
    }

    #[test]
    fn create_signer_without_prefix() {
        assert!(create_signer(TEST_KEY.trim_start_matches("0x")).is_ok());
    }

    #[test]
    fn create_signer_invalid_hex() {
        assert!(create_signer("0xnot_valid_hex").is_err());
    }

    #[test]
    fn create_signer_wrong_length() {
        assert!(create_signer("0x1234").is_err());
    }

    #[test]
    fn address_derivation_is_deterministic() {
        let first = address_from_private_key(TEST_KEY).unwrap();
        let second = address_from_private_key(TEST_KEY).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, Address::ZERO);
    }

    #[test]
    fn sign_transaction_produces_typed_raw_bytes() {
        let signer = create_signer(TEST_KEY).unwrap();
        let params = TxParams {
            chain_id: 137,
            nonce: 7,
            gas_limit: 250_000,
            max_fee_per_gas: 40_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
            to: Address::repeat_byte(0xaa),
            data: vec![0x01, 0x02],
            value: U256::ZERO,
        };

        let raw = sign_transaction(&signer, &params).unwrap();
        // EIP-2718 type byte for EIP-1559 transactions.
        assert_eq!(raw[0], 0x02);
        assert!(raw.len() > 64);
    }
}
