//! Opportunity pipeline: bounded FIFO with dedup, expiry and USD filter.
//!
//! Opportunities are owned by the queue while pending and handed to the
//! executor exactly once at dequeue time. Equivalent pool sequences seen
//! within the dedup window are rejected at enqueue; expired or sub-threshold
//! entries are dropped at dequeue; a timer-driven sweep keeps stale entries
//! from accumulating when nobody dequeues.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::Notify;
use tracing::debug;

use crate::detector::Opportunity;
use crate::metrics;
use crate::oracle::{amount_to_decimal, PriceOracle};

/// Outcome of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Accepted and pending.
    Queued,
    /// An equivalent pool sequence is already pending or was seen within
    /// the dedup window.
    Duplicate,
    /// The bounded queue was full; the opportunity was dropped.
    Full,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<Opportunity>,
    recent: HashMap<String, Instant>,
}

/// Bounded opportunity queue of one chain.
pub struct OpportunityQueue {
    chain_id: u64,
    capacity: usize,
    dedup_window: Duration,
    min_profit_usd: Decimal,
    decimals: HashMap<Address, u8>,
    oracle: Arc<dyn PriceOracle>,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl OpportunityQueue {
    /// Create a queue.
    pub fn new(
        chain_id: u64,
        capacity: usize,
        dedup_window: Duration,
        min_profit_usd: Decimal,
        decimals: HashMap<Address, u8>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            chain_id,
            capacity,
            dedup_window,
            min_profit_usd,
            decimals,
            oracle,
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue an opportunity, rejecting duplicates within the window.
    pub fn enqueue(&self, opportunity: Opportunity) -> EnqueueOutcome {
        let key = opportunity.key();
        let now = Instant::now();

        let mut inner = self.inner.lock().expect("queue lock poisoned");

        if let Some(seen_at) = inner.recent.get(&key) {
            if now.duration_since(*seen_at) < self.dedup_window {
                debug!(chain = self.chain_id, key, "duplicate opportunity rejected");
                return EnqueueOutcome::Duplicate;
            }
        }

        if inner.pending.len() >= self.capacity {
            debug!(chain = self.chain_id, "queue full, opportunity dropped");
            return EnqueueOutcome::Full;
        }

        inner.recent.insert(key, now);
        inner.pending.push_back(opportunity);
        drop(inner);

        metrics::inc_opportunities_enqueued();
        self.notify.notify_one();
        EnqueueOutcome::Queued
    }

    /// Dequeue the next still-valid opportunity: expired entries are
    /// discarded, entries whose estimated USD profit sits below the
    /// threshold are dropped. An unanswerable USD valuation passes the
    /// entry through for native-unit evaluation by the simulator.
    pub async fn dequeue(&self) -> Option<Opportunity> {
        loop {
            let candidate = {
                let mut inner = self.inner.lock().expect("queue lock poisoned");
                inner.pending.pop_front()
            }?;

            if candidate.is_expired(OffsetDateTime::now_utc()) {
                debug!(
                    chain = self.chain_id,
                    key = candidate.key(),
                    "expired opportunity dropped at dequeue"
                );
                metrics::inc_opportunities_expired();
                continue;
            }

            if !self.passes_usd_filter(&candidate).await {
                debug!(
                    chain = self.chain_id,
                    key = candidate.key(),
                    "opportunity below USD profit threshold"
                );
                continue;
            }

            return Some(candidate);
        }
    }

    /// Wait until something may be pending.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Drop expired entries and prune the dedup map. Runs on a timer so
    /// stale entries do not accumulate in the absence of dequeues.
    pub fn gc(&self) {
        let now_wall = OffsetDateTime::now_utc();
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("queue lock poisoned");

        let before = inner.pending.len();
        inner.pending.retain(|o| !o.is_expired(now_wall));
        let expired = before - inner.pending.len();
        if expired > 0 {
            debug!(chain = self.chain_id, expired, "expired opportunities swept");
            for _ in 0..expired {
                metrics::inc_opportunities_expired();
            }
        }

        let window = self.dedup_window;
        inner.recent.retain(|_, seen| now.duration_since(*seen) < window);
    }

    /// Number of pending opportunities.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").pending.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of the pending entries, for the operator API.
    pub fn pending(&self) -> Vec<Opportunity> {
        self.inner
            .lock()
            .expect("queue lock poisoned")
            .pending
            .iter()
            .cloned()
            .collect()
    }

    async fn passes_usd_filter(&self, opportunity: &Opportunity) -> bool {
        let Some(price) = self
            .oracle
            .usd_price(self.chain_id, opportunity.input_token)
            .await
        else {
            return true;
        };

        let decimals = self
            .decimals
            .get(&opportunity.input_token)
            .copied()
            .unwrap_or(18);
        let Some(profit_tokens) = amount_to_decimal(opportunity.expected_profit, decimals)
        else {
            return true;
        };

        profit_tokens * price >= self.min_profit_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::CycleStep;
    use crate::graph::Edge;
    use crate::oracle::{NoopOracle, StaticOracle};
    use crate::registry::DexFamily;
    use alloy::primitives::U256;
    use rust_decimal_macros::dec;

    fn test_edge(pool_byte: u8, from: Address, to: Address) -> Edge {
        Edge {
            pool: Address::repeat_byte(pool_byte),
            family: DexFamily::V2ConstantProduct,
            router: Address::repeat_byte(0xe1),
            from,
            to,
            fee_bps: 30,
            fee_tier_pips: None,
            stable: false,
            zero_for_one: true,
            reserve_in: U256::from(1_000_000u64),
            reserve_out: U256::from(1_000_000u64),
            weight: 0.0,
        }
    }

    fn test_opportunity(pool_byte: u8, profit_wei: u128, ttl: Duration) -> Opportunity {
        let weth = Address::repeat_byte(0x01);
        let usdc = Address::repeat_byte(0x02);
        let input = U256::from(1_000_000_000_000_000_000u128);
        let output = input + U256::from(profit_wei);
        let detected_at = OffsetDateTime::now_utc();

        Opportunity {
            chain_id: 137,
            input_token: weth,
            input_amount: input,
            steps: vec![
                CycleStep {
                    edge: test_edge(pool_byte, weth, usdc),
                    amount_in: input,
                    expected_out: U256::from(3_000_000_000u64),
                },
                CycleStep {
                    edge: test_edge(pool_byte + 1, usdc, weth),
                    amount_in: U256::from(3_000_000_000u64),
                    expected_out: output,
                },
            ],
            expected_output: output,
            expected_profit: U256::from(profit_wei),
            gas_estimate: None,
            confidence: 0.5,
            detected_at,
            expires_at: detected_at + ttl,
        }
    }

    fn queue(oracle: Arc<dyn PriceOracle>, min_profit_usd: Decimal) -> OpportunityQueue {
        let decimals = [(Address::repeat_byte(0x01), 18u8)].into_iter().collect();
        OpportunityQueue::new(
            137,
            4,
            Duration::from_millis(500),
            min_profit_usd,
            decimals,
            oracle,
        )
    }

    #[tokio::test]
    async fn enqueue_dequeue_round_trip() {
        let q = queue(Arc::new(NoopOracle), dec!(5));
        let opportunity = test_opportunity(0x10, 10_000_000_000_000_000, Duration::from_secs(2));

        assert_eq!(q.enqueue(opportunity.clone()), EnqueueOutcome::Queued);
        assert_eq!(q.len(), 1);

        let dequeued = q.dequeue().await.unwrap();
        assert_eq!(dequeued.key(), opportunity.key());
        assert!(q.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn duplicate_pool_sequence_is_rejected_within_window() {
        let q = queue(Arc::new(NoopOracle), dec!(5));
        let opportunity = test_opportunity(0x10, 10_000_000_000_000_000, Duration::from_secs(2));

        assert_eq!(q.enqueue(opportunity.clone()), EnqueueOutcome::Queued);
        assert_eq!(q.enqueue(opportunity.clone()), EnqueueOutcome::Duplicate);

        // A different pool sequence is fine.
        let other = test_opportunity(0x20, 10_000_000_000_000_000, Duration::from_secs(2));
        assert_eq!(q.enqueue(other), EnqueueOutcome::Queued);
    }

    #[tokio::test]
    async fn bounded_capacity_drops_excess() {
        let q = queue(Arc::new(NoopOracle), dec!(5));
        for i in 0..4u8 {
            let o = test_opportunity(0x10 + i * 2, 10_000_000_000_000_000, Duration::from_secs(2));
            assert_eq!(q.enqueue(o), EnqueueOutcome::Queued);
        }
        let overflow = test_opportunity(0x40, 10_000_000_000_000_000, Duration::from_secs(2));
        assert_eq!(q.enqueue(overflow), EnqueueOutcome::Full);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_at_dequeue() {
        let q = queue(Arc::new(NoopOracle), dec!(5));
        let expired = test_opportunity(0x10, 10_000_000_000_000_000, Duration::ZERO);
        q.enqueue(expired);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(q.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn usd_filter_blocks_small_profit_and_passes_when_oracle_silent() {
        // 0.01 native at $3000 = $30 >= $5: passes.
        let mut oracle = StaticOracle::default();
        oracle.set_price(Address::repeat_byte(0x01), dec!(3000));
        let q = queue(Arc::new(oracle.clone()), dec!(5));
        q.enqueue(test_opportunity(0x10, 10_000_000_000_000_000, Duration::from_secs(2)));
        assert!(q.dequeue().await.is_some());

        // 0.000001 native at $3000 = $0.003 < $5: dropped.
        let q = queue(Arc::new(oracle), dec!(5));
        q.enqueue(test_opportunity(0x10, 1_000_000_000_000, Duration::from_secs(2)));
        assert!(q.dequeue().await.is_none());

        // Oracle silent: the same tiny profit passes through.
        let q = queue(Arc::new(NoopOracle), dec!(5));
        q.enqueue(test_opportunity(0x10, 1_000_000_000_000, Duration::from_secs(2)));
        assert!(q.dequeue().await.is_some());
    }

    #[tokio::test]
    async fn gc_sweeps_expired_entries() {
        let q = queue(Arc::new(NoopOracle), dec!(5));
        q.enqueue(test_opportunity(0x10, 10_000_000_000_000_000, Duration::ZERO));
        q.enqueue(test_opportunity(0x20, 10_000_000_000_000_000, Duration::from_secs(5)));
        assert_eq!(q.len(), 2);

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.gc();
        assert_eq!(q.len(), 1);
    }
}
