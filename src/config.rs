//! Application configuration loaded from environment variables.
//!
//! Scalar knobs come straight from the environment via `envy`. Per-chain
//! topology (endpoints, contract addresses, token sets, dex factories) is a
//! single JSON document in `CHAIN_CONFIG`, parsed on demand.

use std::collections::HashMap;

use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::registry::DexFamily;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Wallet ===
    /// Wallet private key (hex, starts with 0x).
    pub wallet_key: String,

    // === Chain selection ===
    /// Chain ids to run on (comma separated in the environment).
    #[serde(default)]
    pub enabled_chains: Vec<u64>,

    /// Per-chain topology as a JSON array (see [`ChainSettings`]).
    #[serde(default)]
    pub chain_config: String,

    // === Trading parameters ===
    /// Minimum estimated profit in USD to dispatch a trade.
    #[serde(default = "default_min_profit_usd")]
    pub min_profit_usd: Decimal,

    /// Gas price ceiling in gwei; opportunities are skipped above it.
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,

    /// Slippage allowance in basis points applied to `minProfit`.
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,

    /// Run an `eth_call` simulation before every submission.
    #[serde(default = "default_true")]
    pub simulate_before_execute: bool,

    /// Simulation mode: detected trades are archived, nothing is sent.
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Minimum milliseconds between trade executions on one chain.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    // === Detection parameters ===
    /// Input amount for executable quotes, in wei of the wrapped native token.
    #[serde(default = "default_probe_amount_wei")]
    pub probe_amount_wei: u128,

    /// Minimum profit in wei of the input token to promote a cycle.
    #[serde(default = "default_min_profit_wei")]
    pub min_profit_wei: u128,

    /// Maximum cycle length explored by the bounded search.
    #[serde(default = "default_max_cycle_len")]
    pub max_cycle_len: usize,

    /// Reserve level below which an edge is considered thin.
    #[serde(default = "default_liquidity_floor_wei")]
    pub liquidity_floor_wei: u128,

    // === Pipeline parameters ===
    /// Opportunity validity window in milliseconds.
    #[serde(default = "default_opportunity_ttl_ms")]
    pub opportunity_ttl_ms: u64,

    /// Window in which an identical pool sequence is rejected as duplicate.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// Bounded queue capacity per chain.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Execution history ring capacity per chain.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    // === Risk limits ===
    /// Per-trade realized loss ceiling in wei; breach is a hard failure.
    #[serde(default = "default_max_single_loss_wei")]
    pub max_single_loss_wei: u128,

    /// Daily realized loss ceiling in wei; breach pauses the chain.
    #[serde(default = "default_max_daily_loss_wei")]
    pub max_daily_loss_wei: u128,

    // === Execution ===
    /// Confirmation depth awaited for submitted transactions.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    // === Oracle ===
    /// Optional static USD prices as JSON: {"0xToken": "3000.0", ...}.
    #[serde(default)]
    pub static_prices: Option<String>,

    // === Transport tuning ===
    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Maximum WebSocket reconnect backoff in seconds.
    #[serde(default = "default_ws_reconnect_max_delay_s")]
    pub ws_reconnect_max_delay_s: u64,

    /// WebSocket heartbeat interval in seconds.
    #[serde(default = "default_ws_heartbeat_interval_s")]
    pub ws_heartbeat_interval_s: u64,

    // === Server ===
    /// HTTP server port for the operator API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

/// Topology of a single chain, one entry of the `CHAIN_CONFIG` JSON array.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    /// Chain id.
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,
    /// WebSocket endpoint for subscriptions.
    pub ws_url: String,
    /// Optional private-mempool submission endpoint.
    #[serde(default)]
    pub private_submit_url: Option<String>,
    /// Route submissions via the private endpoint when available.
    #[serde(default)]
    pub private_mempool: bool,
    /// Arbitrage contract address.
    pub contract: Address,
    /// Wrapped native token; the detector's source vertex.
    pub wrapped_native: Address,
    /// Priority fee in gwei for EIP-1559 submissions.
    #[serde(default = "default_priority_fee_gwei")]
    pub priority_fee_gwei: u64,
    /// Curated token set joined pairwise during discovery.
    pub tokens: Vec<TokenSettings>,
    /// Dex factories to enumerate.
    #[serde(default)]
    pub dexes: Vec<DexSettings>,
    /// Pools registered directly (stable-curve and route-list families).
    #[serde(default)]
    pub extra_pools: Vec<ExtraPoolSettings>,
}

/// A curated token entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSettings {
    /// Token contract address.
    pub address: Address,
    /// Display symbol.
    pub symbol: String,
}

/// A dex factory entry.
#[derive(Debug, Clone, Deserialize)]
pub struct DexSettings {
    /// Dex identifier for logs and records.
    pub name: String,
    /// Pricing family.
    pub family: DexFamily,
    /// Factory contract address.
    pub factory: Address,
    /// Router the arbitrage contract should call for this dex.
    pub router: Address,
    /// Swap fee in basis points (v2-family; v3 derives it from the tier).
    #[serde(default = "default_v2_fee_bps")]
    pub fee_bps: u32,
    /// Fee tiers in pips probed during v3 discovery.
    #[serde(default = "default_v3_fee_tiers")]
    pub fee_tiers: Vec<u32>,
}

/// A directly-registered pool (no factory enumeration).
#[derive(Debug, Clone, Deserialize)]
pub struct ExtraPoolSettings {
    /// Pool contract address.
    pub address: Address,
    /// Dex identifier for logs and records.
    pub name: String,
    /// Pricing family.
    pub family: DexFamily,
    /// Router the arbitrage contract should call.
    pub router: Address,
    /// First pooled token.
    pub token0: Address,
    /// Second pooled token.
    pub token1: Address,
    /// Swap fee in basis points.
    pub fee_bps: u32,
    /// Route-list stable flag.
    #[serde(default)]
    pub stable: bool,
}

fn default_min_profit_usd() -> Decimal {
    Decimal::new(5, 0) // $5
}

fn default_max_gas_price_gwei() -> u64 {
    100
}

fn default_max_slippage_bps() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_cooldown_ms() -> u64 {
    1_000
}

fn default_probe_amount_wei() -> u128 {
    1_000_000_000_000_000_000 // 1 native unit
}

fn default_min_profit_wei() -> u128 {
    100_000_000_000_000 // 0.0001 native unit
}

fn default_max_cycle_len() -> usize {
    3
}

fn default_liquidity_floor_wei() -> u128 {
    1_000_000_000_000_000_000
}

fn default_opportunity_ttl_ms() -> u64 {
    2_000
}

fn default_dedup_window_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    64
}

fn default_history_capacity() -> usize {
    256
}

fn default_max_single_loss_wei() -> u128 {
    50_000_000_000_000_000 // 0.05 native unit
}

fn default_max_daily_loss_wei() -> u128 {
    200_000_000_000_000_000 // 0.2 native unit
}

fn default_confirmations() -> u64 {
    1
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

fn default_ws_reconnect_max_delay_s() -> u64 {
    30
}

fn default_ws_heartbeat_interval_s() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_priority_fee_gwei() -> u64 {
    1
}

fn default_v2_fee_bps() -> u32 {
    30
}

fn default_v3_fee_tiers() -> Vec<u32> {
    // 1, 5, 30, 100 bps expressed in pips
    vec![100, 500, 3_000, 10_000]
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Parse the per-chain topology, filtered to enabled chains.
    pub fn chains(&self) -> Result<Vec<ChainSettings>, serde_json::Error> {
        if self.chain_config.trim().is_empty() {
            return Ok(Vec::new());
        }
        let all: Vec<ChainSettings> = serde_json::from_str(&self.chain_config)?;
        Ok(all
            .into_iter()
            .filter(|c| self.enabled_chains.is_empty() || self.enabled_chains.contains(&c.chain_id))
            .collect())
    }

    /// Parse the optional static oracle price table.
    pub fn static_price_table(&self) -> Result<HashMap<Address, Decimal>, serde_json::Error> {
        match &self.static_prices {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw),
            _ => Ok(HashMap::new()),
        }
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.wallet_key.is_empty() {
            return Err("WALLET_KEY is required".to_string());
        }

        if !self.wallet_key.starts_with("0x") {
            return Err("WALLET_KEY must start with 0x".to_string());
        }

        let chains = self
            .chains()
            .map_err(|e| format!("CHAIN_CONFIG is invalid JSON: {e}"))?;

        if chains.is_empty() {
            return Err("no enabled chains configured".to_string());
        }

        for chain in &chains {
            if chain.tokens.len() < 2 && chain.extra_pools.is_empty() {
                return Err(format!(
                    "chain {} needs at least two curated tokens or an extra pool",
                    chain.chain_id
                ));
            }
        }

        if self.probe_amount_wei == 0 {
            return Err("PROBE_AMOUNT_WEI must be positive".to_string());
        }

        if self.max_cycle_len < 2 {
            return Err("MAX_CYCLE_LEN must be at least 2".to_string());
        }

        if self.max_slippage_bps >= 10_000 {
            return Err("MAX_SLIPPAGE_BPS must be below 10000".to_string());
        }

        Ok(())
    }

    /// Opportunity time-to-live as a duration.
    pub fn opportunity_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.opportunity_ttl_ms)
    }

    /// Dedup window as a duration.
    pub fn dedup_window(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.dedup_window_ms)
    }
}
