//! In-memory mirror of on-chain pool pricing state.
//!
//! The mirror exclusively owns pool snapshots. Every update is guarded by
//! the monotonic sequence invariant: a snapshot is replaced only by one with
//! a strictly higher (block, log index) position, so replaying unordered
//! event deliveries converges to the same state as an ordered replay.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::chain::{PoolEvent, PoolEventData, SeqNo};
use crate::metrics;

/// Reference quote of a view-priced pool: `amount_in` of token-in was
/// quoted to `amount_out` of token-out, pre-fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpotQuote {
    /// Reference input amount.
    pub amount_in: U256,
    /// Quoted output amount.
    pub amount_out: U256,
}

/// Pricing payload of one pool snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PoolPricing {
    /// v2-family reserves.
    V2 {
        /// Reserve of token0.
        reserve0: U256,
        /// Reserve of token1.
        reserve1: U256,
    },
    /// v3-family price and in-range liquidity.
    V3 {
        /// Current sqrt price in Q64.96.
        sqrt_price_x96: U256,
        /// In-range liquidity.
        liquidity: u128,
    },
    /// View-quoted families (stable-curve, route-list).
    Spot {
        /// Reference quote token0 -> token1.
        zero_to_one: SpotQuote,
        /// Reference quote token1 -> token0.
        one_to_zero: SpotQuote,
    },
}

/// One pool's mirrored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolState {
    /// Current pricing inputs.
    pub pricing: PoolPricing,
    /// Position of the update that produced this snapshot.
    pub seq: SeqNo,
    /// Wall-clock time of the update.
    pub updated_at: OffsetDateTime,
}

/// Outcome of applying an event to the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// The snapshot advanced; the new state is returned for edge rebuild.
    Applied(PoolState),
    /// The event was at or behind the current sequence and was discarded.
    Stale,
}

/// Snapshot table for one chain.
#[derive(Debug, Default)]
pub struct StateMirror {
    pools: DashMap<Address, PoolState>,
}

impl StateMirror {
    /// Create an empty mirror.
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// Apply a decoded pool event under the sequence guard.
    pub fn apply_event(&self, event: &PoolEvent) -> ApplyResult {
        let pricing = match &event.data {
            PoolEventData::V2Sync { reserve0, reserve1 } => PoolPricing::V2 {
                reserve0: *reserve0,
                reserve1: *reserve1,
            },
            PoolEventData::V3Swap {
                sqrt_price_x96,
                liquidity,
            } => PoolPricing::V3 {
                sqrt_price_x96: *sqrt_price_x96,
                liquidity: *liquidity,
            },
        };

        self.apply(event.pool, pricing, event.seq)
    }

    /// Apply a refresh (startup seed or post-reconnect re-read) at the
    /// given sequence position.
    pub fn apply_refresh(&self, pool: Address, pricing: PoolPricing, seq: SeqNo) -> ApplyResult {
        self.apply(pool, pricing, seq)
    }

    fn apply(&self, pool: Address, pricing: PoolPricing, seq: SeqNo) -> ApplyResult {
        use dashmap::mapref::entry::Entry;

        let state = PoolState {
            pricing,
            seq,
            updated_at: OffsetDateTime::now_utc(),
        };

        match self.pools.entry(pool) {
            Entry::Occupied(mut occupied) => {
                if seq <= occupied.get().seq {
                    debug!(
                        pool = %pool,
                        incoming_block = seq.block_number,
                        incoming_index = seq.log_index,
                        current_block = occupied.get().seq.block_number,
                        current_index = occupied.get().seq.log_index,
                        "stale snapshot discarded"
                    );
                    metrics::inc_events_stale_dropped();
                    return ApplyResult::Stale;
                }
                occupied.insert(state.clone());
                ApplyResult::Applied(state)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(state.clone());
                ApplyResult::Applied(state)
            }
        }
    }

    /// Current snapshot of a pool.
    pub fn snapshot(&self, pool: &Address) -> Option<PoolState> {
        self.pools.get(pool).map(|s| s.clone())
    }

    /// Number of mirrored pools.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether the mirror is empty.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// All snapshots, for the operator API.
    pub fn snapshots(&self) -> Vec<(Address, PoolState)> {
        self.pools
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_event(pool: Address, block: u64, index: u64, r0: u64, r1: u64) -> PoolEvent {
        PoolEvent {
            pool,
            seq: SeqNo::new(block, index),
            data: PoolEventData::V2Sync {
                reserve0: U256::from(r0),
                reserve1: U256::from(r1),
            },
        }
    }

    #[test]
    fn applies_in_order() {
        let mirror = StateMirror::new();
        let pool = Address::repeat_byte(0x01);

        assert!(matches!(
            mirror.apply_event(&sync_event(pool, 10, 0, 100, 200)),
            ApplyResult::Applied(_)
        ));
        assert!(matches!(
            mirror.apply_event(&sync_event(pool, 10, 1, 110, 190)),
            ApplyResult::Applied(_)
        ));

        let state = mirror.snapshot(&pool).unwrap();
        assert_eq!(state.seq, SeqNo::new(10, 1));
        assert_eq!(
            state.pricing,
            PoolPricing::V2 {
                reserve0: U256::from(110u64),
                reserve1: U256::from(190u64),
            }
        );
    }

    #[test]
    fn out_of_order_event_is_discarded() {
        let mirror = StateMirror::new();
        let pool = Address::repeat_byte(0x01);

        mirror.apply_event(&sync_event(pool, 10, 5, 100, 200));
        assert_eq!(
            mirror.apply_event(&sync_event(pool, 10, 4, 999, 999)),
            ApplyResult::Stale
        );

        let state = mirror.snapshot(&pool).unwrap();
        assert_eq!(state.seq, SeqNo::new(10, 5));
        assert_eq!(
            state.pricing,
            PoolPricing::V2 {
                reserve0: U256::from(100u64),
                reserve1: U256::from(200u64),
            }
        );
    }

    #[test]
    fn duplicate_sequence_is_idempotent() {
        let mirror = StateMirror::new();
        let pool = Address::repeat_byte(0x01);

        mirror.apply_event(&sync_event(pool, 10, 5, 100, 200));
        let before = mirror.snapshot(&pool).unwrap();

        // Same seq, different payload: must not replace.
        assert_eq!(
            mirror.apply_event(&sync_event(pool, 10, 5, 999, 999)),
            ApplyResult::Stale
        );
        assert_eq!(mirror.snapshot(&pool).unwrap().pricing, before.pricing);
    }

    #[test]
    fn unordered_replay_converges_to_ordered_replay() {
        let pool = Address::repeat_byte(0x01);
        let events = vec![
            sync_event(pool, 10, 0, 100, 200),
            sync_event(pool, 10, 2, 120, 180),
            sync_event(pool, 11, 0, 130, 170),
            sync_event(pool, 10, 1, 110, 190),
        ];

        let unordered = StateMirror::new();
        for event in &events {
            unordered.apply_event(event);
        }

        let mut sorted = events.clone();
        sorted.sort_by_key(|e| e.seq);
        let ordered = StateMirror::new();
        for event in &sorted {
            ordered.apply_event(event);
        }

        assert_eq!(
            unordered.snapshot(&pool).unwrap().pricing,
            ordered.snapshot(&pool).unwrap().pricing
        );
        assert_eq!(unordered.snapshot(&pool).unwrap().seq, SeqNo::new(11, 0));
    }

    #[test]
    fn refresh_respects_sequence_guard() {
        let mirror = StateMirror::new();
        let pool = Address::repeat_byte(0x01);

        mirror.apply_event(&sync_event(pool, 20, 3, 100, 200));

        // A refresh read at an older block loses to the live event.
        let stale_refresh = mirror.apply_refresh(
            pool,
            PoolPricing::V2 {
                reserve0: U256::from(1u64),
                reserve1: U256::from(1u64),
            },
            SeqNo::new(19, 0),
        );
        assert_eq!(stale_refresh, ApplyResult::Stale);

        // A refresh at a newer block wins.
        assert!(matches!(
            mirror.apply_refresh(
                pool,
                PoolPricing::V2 {
                    reserve0: U256::from(300u64),
                    reserve1: U256::from(400u64),
                },
                SeqNo::new(21, 0),
            ),
            ApplyResult::Applied(_)
        ));
    }
}
