//! WebSocket log subscription for pool events.
//!
//! The subscriber owns one chain's `eth_subscribe("logs")` stream over the
//! watched pool set. A dropped stream reconnects with doubling backoff and
//! re-subscribes; after a reconnect the watched pools are re-read before
//! the stream is trusted again, so the mirror cannot act on snapshots that
//! went stale during the outage.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::types::{PoolEvent, PoolEventData, SeqNo};
use crate::abi;
use crate::error::WsError;
use crate::metrics;

/// Hook run after a reconnect, before events are pumped again. Used to
/// re-read the reserves of every watched pool.
pub type RefreshHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Reconnect backoff: the delay doubles per consecutive failure, from
/// `base` up to `cap`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound on the delay.
    pub cap: Duration,
}

impl Backoff {
    /// Delay to sleep after `failures` consecutive failed connections.
    pub fn delay_for(&self, failures: u32) -> Duration {
        // The shift is clamped; past ~16 doublings the cap has long won.
        let factor = 1u32 << failures.min(16);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Manages the log subscription of one chain.
pub struct EventSubscriber {
    chain_id: u64,
    ws_url: String,
    pools: Vec<Address>,
    backoff: Backoff,
    heartbeat: Duration,
    /// Set once a (re)connected stream has been refreshed and is trusted.
    healthy: AtomicBool,
    /// Frame clock: milliseconds since `started_at` of the last frame,
    /// zero before the first frame. Atomic so readers never block the
    /// pump.
    last_frame_ms: AtomicU64,
    started_at: Instant,
}

#[derive(Debug, Deserialize)]
struct WsRpcMessage {
    id: Option<u64>,
    result: Option<serde_json::Value>,
    method: Option<String>,
    params: Option<WsSubscriptionParams>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WsSubscriptionParams {
    result: Option<RawLog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: Address,
    topics: Vec<B256>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl EventSubscriber {
    /// Create a subscriber over the given pool set.
    pub fn new(
        chain_id: u64,
        ws_url: String,
        pools: Vec<Address>,
        backoff: Backoff,
        heartbeat: Duration,
    ) -> Self {
        Self {
            chain_id,
            ws_url,
            pools,
            backoff,
            heartbeat,
            healthy: AtomicBool::new(false),
            last_frame_ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Whether the current stream is connected and post-refresh trusted.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// How long the stream has been silent, or `None` before any frame.
    pub fn silence(&self) -> Option<Duration> {
        let ms = self.last_frame_ms.load(Ordering::Relaxed);
        if ms == 0 {
            return None;
        }
        Some(
            self.started_at
                .elapsed()
                .saturating_sub(Duration::from_millis(ms)),
        )
    }

    /// A stream that missed two heartbeat windows is considered stale.
    pub fn is_stale(&self) -> bool {
        self.silence().is_some_and(|d| d > self.heartbeat * 2)
    }

    fn note_frame(&self) {
        let ms = self.started_at.elapsed().as_millis() as u64;
        self.last_frame_ms.store(ms.max(1), Ordering::Relaxed);
    }

    /// Run the subscription with automatic reconnection, yielding decoded
    /// pool events. `refresh` runs after every reconnect before the stream
    /// is marked healthy. The backoff streak resets once a connection got
    /// healthy, so a long-lived stream that drops retries promptly.
    pub async fn run_with_reconnect(
        self: Arc<Self>,
        refresh: RefreshHook,
    ) -> mpsc::Receiver<PoolEvent> {
        let (tx, rx) = mpsc::channel(1024);

        tokio::spawn(async move {
            let mut failures = 0u32;
            let mut reconnecting = false;

            loop {
                info!(
                    chain = self.chain_id,
                    failures, "connecting log subscription"
                );

                match self.run_once(&tx, refresh.clone(), reconnecting).await {
                    Ok(()) => {
                        // Stream ended cleanly: the receiver is gone.
                        info!(chain = self.chain_id, "event channel closed, stopping");
                        return;
                    }
                    Err(e) => {
                        warn!(chain = self.chain_id, error = %e, "subscription dropped");
                    }
                }

                failures = if self.is_healthy() { 0 } else { failures + 1 };
                self.healthy.store(false, Ordering::SeqCst);
                reconnecting = true;

                let delay = self.backoff.delay_for(failures);
                metrics::inc_ws_reconnects();

                info!(
                    chain = self.chain_id,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting after delay"
                );
                tokio::time::sleep(delay).await;
            }
        });

        rx
    }

    /// One connection lifetime: subscribe, refresh when reconnecting, pump
    /// events. Returns `Ok(())` only when the receiving side went away.
    async fn run_once(
        &self,
        tx: &mpsc::Sender<PoolEvent>,
        refresh: RefreshHook,
        reconnecting: bool,
    ) -> Result<(), WsError> {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let addresses: Vec<String> = self
            .pools
            .iter()
            .map(|a| format!("{a:#x}"))
            .collect();
        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["logs", { "address": addresses }],
        });

        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| WsError::Send(e.to_string()))?;

        info!(
            chain = self.chain_id,
            pools = self.pools.len(),
            "log subscription requested"
        );

        if reconnecting {
            // The outage may have swallowed events; re-read every watched
            // pool before trusting the stream again. Events raced behind
            // the refresh are dropped by the mirror's sequence guard.
            info!(chain = self.chain_id, "refreshing pool state after reconnect");
            refresh().await;
        }

        self.healthy.store(true, Ordering::SeqCst);

        while let Some(message) = read.next().await {
            self.note_frame();

            match message {
                Ok(Message::Text(text)) => {
                    if let Some(event) = self.process_message(&text) {
                        metrics::inc_events_received();
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    debug!(chain = self.chain_id, "heartbeat");
                }
                Ok(Message::Close(frame)) => {
                    return Err(WsError::ConnectionClosed {
                        reason: frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "no close frame".to_string()),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    error!(chain = self.chain_id, error = %e, "websocket error");
                    return Err(WsError::Tungstenite(e));
                }
            }
        }

        Err(WsError::ConnectionClosed {
            reason: "stream ended".to_string(),
        })
    }

    /// Parse one WebSocket frame into a pool event, if it carries one.
    /// Decode failures are logged and dropped; they never stop the stream.
    fn process_message(&self, text: &str) -> Option<PoolEvent> {
        let message: WsRpcMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                debug!(chain = self.chain_id, error = %e, "unparseable frame dropped");
                return None;
            }
        };

        if let Some(err) = message.error {
            warn!(chain = self.chain_id, error = %err, "subscription error frame");
            return None;
        }

        if message.id == Some(1) {
            if let Some(sub_id) = message.result.as_ref().and_then(|v| v.as_str()) {
                info!(chain = self.chain_id, subscription = sub_id, "subscription confirmed");
            }
            return None;
        }

        if message.method.as_deref() != Some("eth_subscription") {
            return None;
        }

        let log = message.params?.result?;
        match decode_log(&log) {
            Ok(event) => event,
            Err(reason) => {
                warn!(
                    chain = self.chain_id,
                    pool = %log.address,
                    reason,
                    "undecodable pool event dropped"
                );
                metrics::inc_events_decode_failed();
                None
            }
        }
    }
}

/// Decode a raw log into a pool event. Unknown topics and reorged logs are
/// `Ok(None)`; malformed payloads of known topics are errors.
fn decode_log(log: &RawLog) -> Result<Option<PoolEvent>, String> {
    if log.removed {
        debug!(pool = %log.address, "reorged log dropped");
        return Ok(None);
    }

    let topic0 = match log.topics.first() {
        Some(t) => *t,
        None => return Ok(None),
    };

    let data = hex::decode(log.data.trim_start_matches("0x"))
        .map_err(|e| format!("bad data hex: {e}"))?;

    let payload = if topic0 == *abi::SYNC_TOPIC {
        let (reserve0, reserve1) =
            abi::decode_sync_event(&data).map_err(|e| e.to_string())?;
        PoolEventData::V2Sync { reserve0, reserve1 }
    } else if topic0 == *abi::SWAP_TOPIC {
        let (sqrt_price_x96, liquidity) =
            abi::decode_swap_event(&data).map_err(|e| e.to_string())?;
        PoolEventData::V3Swap {
            sqrt_price_x96,
            liquidity,
        }
    } else {
        return Ok(None);
    };

    let block_number = parse_quantity(log.block_number.as_deref())?;
    let log_index = parse_quantity(log.log_index.as_deref())?;

    Ok(Some(PoolEvent {
        pool: log.address,
        seq: SeqNo::new(block_number, log_index),
        data: payload,
    }))
}

fn parse_quantity(raw: Option<&str>) -> Result<u64, String> {
    let raw = raw.ok_or("missing quantity")?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| format!("bad quantity {raw}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    fn sync_log(block: u64, index: u64) -> RawLog {
        let mut data = Vec::new();
        data.extend_from_slice(&U256::from(1000u64).to_be_bytes::<32>());
        data.extend_from_slice(&U256::from(2000u64).to_be_bytes::<32>());
        RawLog {
            address: Address::repeat_byte(0x33),
            topics: vec![*abi::SYNC_TOPIC],
            data: format!("0x{}", hex::encode(data)),
            block_number: Some(format!("{block:#x}")),
            log_index: Some(format!("{index:#x}")),
            removed: false,
        }
    }

    fn subscriber() -> EventSubscriber {
        EventSubscriber::new(
            137,
            "ws://localhost:8546".to_string(),
            vec![Address::repeat_byte(0x33)],
            Backoff {
                base: Duration::from_secs(1),
                cap: Duration::from_secs(30),
            },
            Duration::from_secs(30),
        )
    }

    #[test]
    fn decode_log_extracts_sync_event() {
        let event = decode_log(&sync_log(100, 5)).unwrap().unwrap();
        assert_eq!(event.pool, Address::repeat_byte(0x33));
        assert_eq!(event.seq, SeqNo::new(100, 5));
        assert_eq!(
            event.data,
            PoolEventData::V2Sync {
                reserve0: U256::from(1000u64),
                reserve1: U256::from(2000u64),
            }
        );
    }

    #[test]
    fn decode_log_skips_unknown_topics_and_reorgs() {
        let mut log = sync_log(100, 5);
        log.topics = vec![B256::repeat_byte(0x77)];
        assert!(decode_log(&log).unwrap().is_none());

        let mut log = sync_log(100, 5);
        log.removed = true;
        assert!(decode_log(&log).unwrap().is_none());
    }

    #[test]
    fn decode_log_rejects_malformed_known_payload() {
        let mut log = sync_log(100, 5);
        log.data = "0xdead".to_string();
        assert!(decode_log(&log).is_err());
    }

    #[test]
    fn backoff_doubles_until_the_cap() {
        let backoff = Backoff {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        };
        assert_eq!(backoff.delay_for(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(30));
        // Large streaks stay clamped instead of overflowing the shift.
        assert_eq!(backoff.delay_for(1_000), Duration::from_secs(30));
    }

    #[test]
    fn stream_starts_unhealthy_and_without_frames() {
        let sub = subscriber();
        assert!(!sub.is_healthy());
        assert!(sub.silence().is_none());
        assert!(!sub.is_stale());
    }

    #[test]
    fn frames_feed_the_silence_clock() {
        let sub = subscriber();
        sub.note_frame();
        let silence = sub.silence().expect("frame was noted");
        assert!(silence < Duration::from_secs(1));
        // Well inside the two-heartbeat window.
        assert!(!sub.is_stale());
    }
}
