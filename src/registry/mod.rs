//! Token and pool registry.
//!
//! Built once at startup by discovery and immutable afterwards; every other
//! component reads pool topology from here.

pub mod discovery;

use std::collections::HashMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

pub use discovery::{discover_pools, fetch_pricing};

/// Pricing family of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DexFamily {
    /// Constant-product pair with explicit reserves.
    V2ConstantProduct,
    /// Concentrated liquidity pool priced by (sqrtPrice, liquidity).
    V3Concentrated,
    /// Stable-swap curve quoted via its own view function.
    StableCurve,
    /// Route-list pool (volatile/stable pairs) quoted via its view function.
    RouteList,
}

impl DexFamily {
    /// Wire discriminant used in the contract's swap steps.
    pub fn dex_type_id(&self) -> u8 {
        match self {
            DexFamily::V2ConstantProduct => 0,
            DexFamily::V3Concentrated => 1,
            DexFamily::StableCurve => 2,
            DexFamily::RouteList => 3,
        }
    }

    /// Stable identifier for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DexFamily::V2ConstantProduct => "v2-constant-product",
            DexFamily::V3Concentrated => "v3-concentrated",
            DexFamily::StableCurve => "stable-curve",
            DexFamily::RouteList => "route-list",
        }
    }
}

/// A token known to one chain. Immutable post-discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// Token contract address.
    pub address: Address,
    /// Display symbol.
    pub symbol: String,
    /// ERC-20 decimals.
    pub decimals: u8,
}

/// A pool known to one chain. Immutable post-discovery; pricing lives in
/// the state mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pool {
    /// Pool contract address.
    pub address: Address,
    /// Owning chain.
    pub chain_id: u64,
    /// Dex identifier for logs and records.
    pub dex: String,
    /// Pricing family.
    pub family: DexFamily,
    /// First pooled token (canonical ordering).
    pub token0: Address,
    /// Second pooled token.
    pub token1: Address,
    /// Swap fee in basis points.
    pub fee_bps: u32,
    /// v3 fee tier in pips, when applicable.
    pub fee_tier_pips: Option<u32>,
    /// Route-list stable flag.
    pub stable: bool,
    /// Router the arbitrage contract calls for this pool.
    pub router: Address,
}

/// Immutable registry of one chain's tokens and pools.
#[derive(Debug, Default, Clone)]
pub struct PoolRegistry {
    pools: HashMap<Address, Pool>,
    tokens: HashMap<Address, Token>,
}

impl PoolRegistry {
    /// Build a registry from discovered parts.
    pub fn new(tokens: Vec<Token>, pools: Vec<Pool>) -> Self {
        Self {
            tokens: tokens.into_iter().map(|t| (t.address, t)).collect(),
            pools: pools.into_iter().map(|p| (p.address, p)).collect(),
        }
    }

    /// Look up a pool.
    pub fn pool(&self, address: &Address) -> Option<&Pool> {
        self.pools.get(address)
    }

    /// Look up a token.
    pub fn token(&self, address: &Address) -> Option<&Token> {
        self.tokens.get(address)
    }

    /// Decimals of a token, when known.
    pub fn decimals(&self, address: &Address) -> Option<u8> {
        self.tokens.get(address).map(|t| t.decimals)
    }

    /// All registered pools.
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    /// All registered pool addresses, for subscription filters.
    pub fn pool_addresses(&self) -> Vec<Address> {
        self.pools.keys().copied().collect()
    }

    /// All registered tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    /// Number of registered pools.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Decimals map keyed by token address.
    pub fn decimals_map(&self) -> HashMap<Address, u8> {
        self.tokens
            .iter()
            .map(|(addr, token)| (*addr, token.decimals))
            .collect()
    }
}
