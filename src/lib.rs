//! Multi-chain EVM cyclic-arbitrage engine.
//!
//! The engine mirrors AMM pool state from live event streams into a
//! per-chain pricing graph, searches the graph for profitable cycles, and
//! dispatches flashloan-backed atomic trades through an on-chain executor
//! contract.
//!
//! # Pipeline
//!
//! ```text
//! chain events → state mirror → pricing graph → detector → queue → executor
//! ```
//!
//! Each chain runs the pipeline independently: one event-loop task owns the
//! mirror and graph, one executor task owns the nonce and keeps at most one
//! transaction in flight.
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment + per-chain JSON topology
//! - [`error`]: Unified error types
//! - [`abi`]: Contract bindings and calldata encoding
//! - [`chain`]: JSON-RPC client, log subscriptions, nonce management
//! - [`registry`]: Token/pool model and factory discovery
//! - [`mirror`]: Sequence-guarded pool snapshot table
//! - [`graph`]: Pricing graph and exact quote math
//! - [`detector`]: Negative-cycle and bounded cycle search
//! - [`pipeline`]: Bounded opportunity queue
//! - [`executor`]: Simulate-then-send execution with loss limits
//! - [`coordinator`]: Per-chain wiring
//! - [`oracle`]: Optional USD price source
//! - [`api`]: Operator HTTP surface

pub mod abi;
pub mod api;
pub mod chain;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod executor;
pub mod graph;
pub mod metrics;
pub mod mirror;
pub mod oracle;
pub mod pipeline;
pub mod registry;
pub mod signing;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
