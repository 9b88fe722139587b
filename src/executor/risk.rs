//! Realized-loss accounting and trading limits.

use alloy::primitives::U256;
use time::{Duration, OffsetDateTime};
use tracing::warn;

/// Verdict of recording one realized loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossVerdict {
    /// Loss recorded, limits intact.
    WithinLimits,
    /// This single loss breached the per-trade ceiling.
    SingleLimitBreached,
    /// The accumulated daily loss breached the daily ceiling.
    DailyLimitBreached,
}

/// Daily loss accumulator of one chain.
///
/// The 24h window opens with the first loss after a reset and the
/// accumulator is monotonically non-decreasing inside it; at rollover it
/// resets to zero and the next loss opens a fresh window.
#[derive(Debug)]
pub struct LossTracker {
    window_start: Option<OffsetDateTime>,
    running_loss: U256,
    single_limit: U256,
    daily_limit: U256,
}

impl LossTracker {
    /// Create a tracker with the given ceilings in wei.
    pub fn new(single_limit: U256, daily_limit: U256) -> Self {
        Self {
            window_start: None,
            running_loss: U256::ZERO,
            single_limit,
            daily_limit,
        }
    }

    /// Record a realized loss at `now` and report the limit state.
    pub fn record_loss(&mut self, loss: U256, now: OffsetDateTime) -> LossVerdict {
        if let Some(start) = self.window_start {
            if now - start >= Duration::hours(24) {
                self.window_start = None;
                self.running_loss = U256::ZERO;
            }
        }

        if self.window_start.is_none() {
            self.window_start = Some(now);
        }

        self.running_loss = self.running_loss.saturating_add(loss);

        if loss >= self.single_limit {
            warn!(
                loss = %loss,
                limit = %self.single_limit,
                "single-trade loss ceiling breached"
            );
            return LossVerdict::SingleLimitBreached;
        }

        if self.running_loss >= self.daily_limit {
            warn!(
                running_loss = %self.running_loss,
                limit = %self.daily_limit,
                "daily loss ceiling breached"
            );
            return LossVerdict::DailyLimitBreached;
        }

        LossVerdict::WithinLimits
    }

    /// Accumulated loss in the current window.
    pub fn running_loss(&self) -> U256 {
        self.running_loss
    }

    /// Start of the current window, if one is open.
    pub fn window_start(&self) -> Option<OffsetDateTime> {
        self.window_start
    }

    /// Operator reset: clears the accumulator and closes the window.
    pub fn clear(&mut self) {
        self.window_start = None;
        self.running_loss = U256::ZERO;
    }
}
