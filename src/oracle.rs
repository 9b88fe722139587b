//! USD price oracle seam.
//!
//! The oracle is an external collaborator: when it is absent or failing,
//! USD-denominated filters become no-ops and profit is reported in
//! native-token units only.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// USD quote source for tokens.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD price of one whole token, or `None` when unavailable. Failures
    /// are reported as `None`; callers treat missing prices permissively.
    async fn usd_price(&self, chain_id: u64, token: Address) -> Option<Decimal>;
}

/// Oracle that never answers; USD filters become no-ops.
#[derive(Debug, Default, Clone)]
pub struct NoopOracle;

#[async_trait]
impl PriceOracle for NoopOracle {
    async fn usd_price(&self, _chain_id: u64, _token: Address) -> Option<Decimal> {
        None
    }
}

/// Fixed price table, used in tests and as a minimal live option.
#[derive(Debug, Default, Clone)]
pub struct StaticOracle {
    prices: HashMap<Address, Decimal>,
}

impl StaticOracle {
    /// Create from a price table.
    pub fn new(prices: HashMap<Address, Decimal>) -> Self {
        Self { prices }
    }

    /// Add or replace a price.
    pub fn set_price(&mut self, token: Address, price: Decimal) {
        self.prices.insert(token, price);
    }
}

#[async_trait]
impl PriceOracle for StaticOracle {
    async fn usd_price(&self, _chain_id: u64, token: Address) -> Option<Decimal> {
        self.prices.get(&token).copied()
    }
}

/// Convert a raw token amount to a decimal token count.
/// `None` when the amount exceeds decimal precision; callers treat that
/// as an unavailable valuation.
pub fn amount_to_decimal(amount: U256, decimals: u8) -> Option<Decimal> {
    let mut value: Decimal = amount.to_string().parse().ok()?;
    value.set_scale(decimals as u32).ok()?;
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn noop_oracle_answers_nothing() {
        let oracle = NoopOracle;
        assert!(oracle.usd_price(1, Address::ZERO).await.is_none());
    }

    #[tokio::test]
    async fn static_oracle_answers_configured_tokens() {
        let token = Address::repeat_byte(0x01);
        let mut oracle = StaticOracle::default();
        oracle.set_price(token, dec!(3000));

        assert_eq!(oracle.usd_price(137, token).await, Some(dec!(3000)));
        assert!(oracle.usd_price(137, Address::ZERO).await.is_none());
    }

    #[test]
    fn amount_to_decimal_scales_by_decimals() {
        let wei = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(amount_to_decimal(wei, 18), Some(dec!(1.5)));

        let usdc = U256::from(2_500_000u64);
        assert_eq!(amount_to_decimal(usdc, 6), Some(dec!(2.5)));
    }

    #[test]
    fn amount_to_decimal_rejects_oversized_values() {
        assert!(amount_to_decimal(U256::MAX, 18).is_none());
    }
}
