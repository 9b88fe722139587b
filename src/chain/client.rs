//! JSON-RPC chain client over HTTP.

use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::types::{TxReceipt, TxRequest};
use crate::abi;
use crate::error::{ChainError, SubmitErrorKind};

/// Attempts for idempotent read requests.
const READ_RETRIES: u32 = 3;
/// Base backoff between read retries.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
/// Receipt polling cadence.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Chain access used by discovery, the mirror refresh path, the simulator
/// and the executor. Event delivery is a separate concern (see
/// [`super::subscription`]).
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id this client talks to.
    fn chain_id(&self) -> u64;

    /// Execute a read-only contract call.
    async fn call(&self, request: &TxRequest) -> Result<Vec<u8>, ChainError>;

    /// Estimate gas for a transaction.
    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, ChainError>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Current block number.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Confirmed nonce for an address.
    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError>;

    /// Submit a signed raw transaction. `private` selects the
    /// private-mempool endpoint when one is configured.
    async fn send_raw_transaction(&self, raw: &[u8], private: bool) -> Result<B256, ChainError>;

    /// Fetch a receipt if the transaction is mined.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError>;

    /// Await a receipt at the requested confirmation depth.
    async fn wait_for_receipt(
        &self,
        hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<TxReceipt, ChainError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut mined: Option<TxReceipt> = None;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::ReceiptTimeout { hash });
            }

            if mined.is_none() {
                mined = self.transaction_receipt(hash).await?;
            }

            if let Some(receipt) = &mined {
                if confirmations <= 1 {
                    return Ok(receipt.clone());
                }
                let head = self.block_number().await?;
                if head >= receipt.block_number + confirmations - 1 {
                    return Ok(receipt.clone());
                }
            }

            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

/// JSON-RPC client for one chain.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    chain_id: u64,
    rpc_url: String,
    private_submit_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    status: Option<String>,
    block_number: Option<String>,
    gas_used: Option<String>,
    effective_gas_price: Option<String>,
}

impl RpcClient {
    /// Create a client with low-latency HTTP settings.
    pub fn new(
        chain_id: u64,
        rpc_url: String,
        private_submit_url: Option<String>,
        timeout_ms: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .connect_timeout(Duration::from_millis(500))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("failed to create HTTP client");

        Self {
            http,
            chain_id,
            rpc_url,
            private_submit_url,
        }
    }

    async fn request_once(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            // `eth_call` reverts surface as RPC errors carrying the revert
            // data blob.
            if let Some(data) = revert_data(&err) {
                return Err(ChainError::CallReverted {
                    reason: abi::decode_revert_reason(&data),
                    data,
                });
            }
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| ChainError::Decode("response carried neither result nor error".into()))
    }

    /// Idempotent read with transport-level retry and backoff. Node-level
    /// errors (reverts, bad params) are not retried.
    async fn read(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let mut attempt = 0u32;
        loop {
            match self.request_once(&self.rpc_url, method, params.clone()).await {
                Err(ChainError::Http(e)) if attempt + 1 < READ_RETRIES => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    debug!(
                        chain = self.chain_id,
                        method,
                        attempt,
                        error = %e,
                        "transient rpc failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn revert_data(err: &RpcErrorBody) -> Option<Vec<u8>> {
    let looks_reverted = err.message.to_lowercase().contains("revert");
    let data = err.data.as_ref().and_then(|d| match d {
        Value::String(s) => hex::decode(s.trim_start_matches("0x")).ok(),
        Value::Object(o) => o
            .get("data")
            .and_then(Value::as_str)
            .and_then(|s| hex::decode(s.trim_start_matches("0x")).ok()),
        _ => None,
    });

    match (looks_reverted, data) {
        (_, Some(d)) if looks_reverted || !d.is_empty() => Some(d),
        (true, None) => Some(Vec::new()),
        _ => None,
    }
}

/// Classify a submission failure from the node's error message.
pub fn classify_submit_error(message: &str) -> SubmitErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("nonce") || lower.contains("already known") {
        SubmitErrorKind::NonceConflict
    } else if lower.contains("revert") {
        SubmitErrorKind::Reverted
    } else if lower.contains("fee cap")
        || lower.contains("gas price")
        || lower.contains("underpriced")
        || lower.contains("exceeds")
    {
        SubmitErrorKind::GasTooHigh
    } else {
        SubmitErrorKind::Network
    }
}

fn quantity_u64(value: &Value) -> Result<u64, ChainError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected quantity string, got {value}")))?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity {raw}: {e}")))
}

fn quantity_u128(value: &Value) -> Result<u128, ChainError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected quantity string, got {value}")))?;
    u128::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity {raw}: {e}")))
}

fn bytes_from(value: &Value) -> Result<Vec<u8>, ChainError> {
    let raw = value
        .as_str()
        .ok_or_else(|| ChainError::Decode(format!("expected hex string, got {value}")))?;
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| ChainError::Decode(format!("bad hex payload: {e}")))
}

fn call_object(request: &TxRequest) -> Value {
    let mut obj = json!({
        "to": request.to,
        "data": format!("0x{}", hex::encode(&request.data)),
    });
    if let Some(from) = request.from {
        obj["from"] = json!(from);
    }
    if !request.value.is_zero() {
        obj["value"] = json!(format!("0x{:x}", request.value));
    }
    obj
}

#[async_trait]
impl ChainClient for RpcClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[instrument(skip(self, request), fields(chain = self.chain_id, to = %request.to))]
    async fn call(&self, request: &TxRequest) -> Result<Vec<u8>, ChainError> {
        let result = self
            .read("eth_call", json!([call_object(request), "latest"]))
            .await?;
        bytes_from(&result)
    }

    async fn estimate_gas(&self, request: &TxRequest) -> Result<u64, ChainError> {
        let result = self
            .read("eth_estimateGas", json!([call_object(request)]))
            .await?;
        quantity_u64(&result)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        let result = self.read("eth_gasPrice", json!([])).await?;
        quantity_u128(&result)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let result = self.read("eth_blockNumber", json!([])).await?;
        quantity_u64(&result)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        let result = self
            .read("eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        quantity_u64(&result)
    }

    async fn send_raw_transaction(&self, raw: &[u8], private: bool) -> Result<B256, ChainError> {
        let url = if private {
            self.private_submit_url.as_deref().unwrap_or_else(|| {
                warn!(
                    chain = self.chain_id,
                    "private submission requested without endpoint, using public"
                );
                &self.rpc_url
            })
        } else {
            &self.rpc_url
        };

        // Never retried: a transport error leaves the outcome unknown.
        let params = json!([format!("0x{}", hex::encode(raw))]);
        let result = self
            .request_once(url, "eth_sendRawTransaction", params)
            .await
            .map_err(|e| match e {
                ChainError::Rpc { message, .. } => ChainError::Submit {
                    kind: classify_submit_error(&message),
                    message,
                },
                ChainError::CallReverted { reason, .. } => ChainError::Submit {
                    kind: SubmitErrorKind::Reverted,
                    message: reason,
                },
                ChainError::Http(e) => ChainError::Submit {
                    kind: SubmitErrorKind::Network,
                    message: e.to_string(),
                },
                other => other,
            })?;

        let raw_hash = bytes_from(&result)?;
        if raw_hash.len() != 32 {
            return Err(ChainError::Decode(format!(
                "transaction hash has {} bytes",
                raw_hash.len()
            )));
        }
        Ok(B256::from_slice(&raw_hash))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let result = self
            .read("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }

        let raw: RawReceipt = serde_json::from_value(result)
            .map_err(|e| ChainError::Decode(format!("bad receipt: {e}")))?;

        let status = raw.status.as_deref() == Some("0x1");
        let block_number = raw
            .block_number
            .as_deref()
            .map(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16))
            .transpose()
            .map_err(|e| ChainError::Decode(format!("bad block number: {e}")))?
            .unwrap_or(0);
        let gas_used = raw
            .gas_used
            .as_deref()
            .map(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16))
            .transpose()
            .map_err(|e| ChainError::Decode(format!("bad gas used: {e}")))?
            .unwrap_or(0);
        let effective_gas_price = raw
            .effective_gas_price
            .as_deref()
            .map(|s| u128::from_str_radix(s.trim_start_matches("0x"), 16))
            .transpose()
            .map_err(|e| ChainError::Decode(format!("bad gas price: {e}")))?
            .unwrap_or(0);

        Ok(Some(TxReceipt {
            transaction_hash: raw.transaction_hash,
            status,
            block_number,
            gas_used,
            effective_gas_price,
        }))
    }
}

/// Read an ERC-20 token's decimals.
pub async fn fetch_decimals(
    client: &dyn ChainClient,
    token: Address,
) -> Result<u8, ChainError> {
    let ret = client
        .call(&TxRequest {
            to: token,
            data: abi::encode_decimals(),
            ..Default::default()
        })
        .await?;
    abi::decode_u8_return(&ret)
}

/// Read an ERC-20 balance.
pub async fn fetch_balance(
    client: &dyn ChainClient,
    token: Address,
    owner: Address,
) -> Result<U256, ChainError> {
    let ret = client
        .call(&TxRequest {
            to: token,
            data: abi::encode_balance_of(owner),
            ..Default::default()
        })
        .await?;
    abi::decode_u256_return(&ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_submit_error_covers_known_messages() {
        assert_eq!(
            classify_submit_error("nonce too low"),
            SubmitErrorKind::NonceConflict
        );
        assert_eq!(
            classify_submit_error("execution reverted: K"),
            SubmitErrorKind::Reverted
        );
        assert_eq!(
            classify_submit_error("transaction underpriced"),
            SubmitErrorKind::GasTooHigh
        );
        assert_eq!(
            classify_submit_error("connection reset by peer"),
            SubmitErrorKind::Network
        );
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(quantity_u64(&json!("0x1a")).unwrap(), 26);
        assert_eq!(quantity_u128(&json!("0x0")).unwrap(), 0);
        assert!(quantity_u64(&json!(12)).is_err());
        assert!(quantity_u64(&json!("0xzz")).is_err());
    }

    #[test]
    fn call_object_includes_optional_fields() {
        let request = TxRequest {
            from: Some(Address::repeat_byte(0x11)),
            to: Address::repeat_byte(0x22),
            data: vec![0xab, 0xcd],
            value: U256::from(5u64),
        };
        let obj = call_object(&request);
        assert_eq!(obj["data"], "0xabcd");
        assert_eq!(obj["value"], "0x5");
        assert!(obj["from"].is_string());
    }

    #[test]
    fn revert_data_extraction() {
        let err = RpcErrorBody {
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(json!("0xdeadbeef")),
        };
        assert_eq!(revert_data(&err).unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);

        let err = RpcErrorBody {
            code: -32000,
            message: "nonce too low".to_string(),
            data: None,
        };
        assert!(revert_data(&err).is_none());
    }
}
