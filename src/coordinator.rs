//! Per-chain coordination: event loop, detector scheduling and execution.
//!
//! Each enabled chain gets one coordinator owning its mirror, graph, queue
//! and executor. Graph mutation happens on the single event-loop task,
//! trades on the single executor task, so per-chain state has exactly one
//! writer and at most one transaction is ever in flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::chain::{Backoff, ChainClient, EventSubscriber, PoolEvent, SeqNo};
use crate::config::{ChainSettings, Config};
use crate::detector::{self, DetectorParams};
use crate::error::BotError;
use crate::executor::risk::LossTracker;
use crate::executor::{ExecutionRecord, ExecutorSettings, ExecutorStats, TradeExecutor};
use crate::graph::PricingGraph;
use crate::metrics;
use crate::mirror::{ApplyResult, StateMirror};
use crate::oracle::PriceOracle;
use crate::pipeline::OpportunityQueue;
use crate::registry::{discover_pools, fetch_pricing, PoolRegistry};
use crate::signing;

/// Shared handles of one chain, exposed to the operator API.
#[derive(Clone)]
pub struct ChainHandle {
    /// Chain id.
    pub chain_id: u64,
    /// Pause flag; runtime-mutable by the operator.
    pub paused: Arc<AtomicBool>,
    /// Opportunity queue.
    pub queue: Arc<OpportunityQueue>,
    /// Pool snapshot mirror.
    pub mirror: Arc<StateMirror>,
    /// Discovered topology.
    pub registry: Arc<PoolRegistry>,
    /// Executor counters.
    pub stats: Arc<RwLock<ExecutorStats>>,
    /// Execution history ring.
    pub history: Arc<Mutex<VecDeque<ExecutionRecord>>>,
    /// Loss accumulator; cleared by the operator on resume.
    pub loss_tracker: Arc<Mutex<LossTracker>>,
}

/// One chain's wiring.
pub struct ChainCoordinator {
    settings: ChainSettings,
    cooldown: Duration,
    client: Arc<dyn ChainClient>,
    registry: Arc<PoolRegistry>,
    mirror: Arc<StateMirror>,
    graph: Arc<PricingGraph>,
    queue: Arc<OpportunityQueue>,
    executor: TradeExecutor,
    detector_params: DetectorParams,
    subscriber: Arc<EventSubscriber>,
    paused: Arc<AtomicBool>,
}

impl ChainCoordinator {
    /// Discover pools, seed state and wire the components of one chain.
    pub async fn build(
        config: &Config,
        settings: ChainSettings,
        client: Arc<dyn ChainClient>,
        oracle: Arc<dyn PriceOracle>,
    ) -> Result<(Self, ChainHandle), BotError> {
        let registry = Arc::new(discover_pools(&*client, &settings).await?);
        let mirror = Arc::new(StateMirror::new());
        let graph = Arc::new(PricingGraph::new(
            settings.chain_id,
            registry.decimals_map(),
        ));

        refresh_all(&*client, &registry, &mirror, &graph).await;
        info!(
            chain = settings.chain_id,
            pools = mirror.len(),
            "initial snapshots seeded"
        );

        let queue = Arc::new(OpportunityQueue::new(
            settings.chain_id,
            config.queue_capacity,
            config.dedup_window(),
            config.min_profit_usd,
            registry.decimals_map(),
            oracle,
        ));

        let paused = Arc::new(AtomicBool::new(false));
        let signer = signing::create_signer(&config.wallet_key)?;
        let executor = TradeExecutor::new(
            ExecutorSettings {
                chain_id: settings.chain_id,
                contract: settings.contract,
                max_gas_price_wei: config.max_gas_price_gwei as u128 * 1_000_000_000,
                slippage_bps: config.max_slippage_bps,
                simulate_before_execute: config.simulate_before_execute,
                dry_run: config.dry_run,
                confirmations: config.confirmations,
                priority_fee_wei: settings.priority_fee_gwei as u128 * 1_000_000_000,
                private_mempool: settings.private_mempool
                    && settings.private_submit_url.is_some(),
                single_loss_limit: alloy::primitives::U256::from(config.max_single_loss_wei),
                daily_loss_limit: alloy::primitives::U256::from(config.max_daily_loss_wei),
                receipt_timeout: Duration::from_secs(60),
                history_capacity: config.history_capacity,
            },
            client.clone(),
            signer,
            paused.clone(),
        );

        let subscriber = Arc::new(EventSubscriber::new(
            settings.chain_id,
            settings.ws_url.clone(),
            registry.pool_addresses(),
            Backoff {
                base: Duration::from_secs(1),
                cap: Duration::from_secs(config.ws_reconnect_max_delay_s),
            },
            Duration::from_secs(config.ws_heartbeat_interval_s),
        ));

        let detector_params = DetectorParams::from_config(
            config,
            settings.wrapped_native,
            registry.decimals_map(),
        );

        let handle = ChainHandle {
            chain_id: settings.chain_id,
            paused: paused.clone(),
            queue: queue.clone(),
            mirror: mirror.clone(),
            registry: registry.clone(),
            stats: executor.stats_handle(),
            history: executor.history_handle(),
            loss_tracker: executor.loss_tracker_handle(),
        };

        let coordinator = Self {
            settings,
            cooldown: Duration::from_millis(config.cooldown_ms),
            client,
            registry,
            mirror,
            graph,
            queue,
            executor,
            detector_params,
            subscriber,
            paused,
        };

        Ok((coordinator, handle))
    }

    /// Run the event loop and the executor loop until shutdown.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let ChainCoordinator {
            settings,
            cooldown,
            client,
            registry,
            mirror,
            graph,
            queue,
            mut executor,
            detector_params,
            subscriber,
            paused,
        } = self;

        let chain_id = settings.chain_id;

        // Post-reconnect hook: re-read every watched pool before the
        // subscriber reports healthy again.
        let refresh = {
            let client = client.clone();
            let registry = registry.clone();
            let mirror = mirror.clone();
            let graph = graph.clone();
            Arc::new(move || {
                let client = client.clone();
                let registry = registry.clone();
                let mirror = mirror.clone();
                let graph = graph.clone();
                Box::pin(async move {
                    refresh_all(&*client, &registry, &mirror, &graph).await;
                }) as futures::future::BoxFuture<'static, ()>
            }) as crate::chain::RefreshHook
        };

        let mut events = subscriber.clone().run_with_reconnect(refresh).await;

        let event_loop = {
            let registry = registry.clone();
            let mirror = mirror.clone();
            let graph = graph.clone();
            let queue = queue.clone();
            let subscriber = subscriber.clone();
            let mut shutdown = shutdown.clone();
            async move {
                let mut gc_timer = tokio::time::interval(Duration::from_millis(500));
                gc_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        maybe_event = events.recv() => {
                            let Some(event) = maybe_event else {
                                warn!(chain = chain_id, "event stream ended");
                                break;
                            };

                            let apply_started = Instant::now();
                            let mut dirty = apply_event(&registry, &mirror, &graph, &event);
                            // Drain the burst so one detector run covers it.
                            while let Ok(event) = events.try_recv() {
                                dirty |= apply_event(&registry, &mirror, &graph, &event);
                            }
                            metrics::record_mirror_apply_latency(apply_started);

                            if dirty {
                                let run_started = Instant::now();
                                let view = graph.view();
                                let opportunities =
                                    detector::find_opportunities(&view, &detector_params);
                                metrics::inc_detector_runs();
                                metrics::record_detector_run_latency(run_started);
                                metrics::inc_opportunities_detected(opportunities.len() as u64);

                                for opportunity in opportunities {
                                    queue.enqueue(opportunity);
                                }
                            }
                        }
                        _ = gc_timer.tick() => {
                            queue.gc();
                            if subscriber.is_stale() {
                                warn!(
                                    chain = chain_id,
                                    "event stream silent past the heartbeat window"
                                );
                            }
                        }
                        _ = shutdown.changed() => {
                            info!(chain = chain_id, "event loop stopping");
                            break;
                        }
                    }
                }
            }
        };

        let executor_loop = {
            let queue = queue.clone();
            let paused = paused.clone();
            let mut shutdown = shutdown.clone();
            async move {
                loop {
                    if *shutdown.borrow() {
                        info!(chain = chain_id, "executor loop stopping");
                        break;
                    }

                    // Operator pause stops dequeuing; in-flight work has
                    // already finished by the time we get here.
                    if paused.load(Ordering::SeqCst) {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        continue;
                    }

                    match queue.dequeue().await {
                        Some(opportunity) => {
                            let submit_started = Instant::now();
                            match executor.execute(&opportunity).await {
                                Ok(outcome) => {
                                    debug!(chain = chain_id, ?outcome, "execution finished");
                                }
                                Err(e) => {
                                    error!(chain = chain_id, error = %e, "execution failed");
                                }
                            }
                            metrics::record_submit_latency(submit_started);

                            if !cooldown.is_zero() {
                                tokio::time::sleep(cooldown).await;
                            }
                        }
                        None => {
                            tokio::select! {
                                _ = queue.wait() => {}
                                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                                _ = shutdown.changed() => {}
                            }
                        }
                    }
                }
            }
        };

        tokio::join!(event_loop, executor_loop);
        info!(chain = chain_id, "coordinator stopped");
    }
}

/// Apply one event: mirror under the sequence guard, then rebuild the
/// pool's edge pair. Returns true when the graph changed.
fn apply_event(
    registry: &PoolRegistry,
    mirror: &StateMirror,
    graph: &PricingGraph,
    event: &PoolEvent,
) -> bool {
    let Some(pool) = registry.pool(&event.pool) else {
        debug!(pool = %event.pool, "event for unregistered pool dropped");
        return false;
    };

    match mirror.apply_event(event) {
        ApplyResult::Applied(state) => {
            graph.update_pool(pool, &state.pricing);
            true
        }
        ApplyResult::Stale => false,
    }
}

/// Re-read the pricing of every registered pool and fold it into mirror
/// and graph at the current block position. Individual failures are logged
/// and skipped; the sequence guard drops reads that lost a race with the
/// live stream.
pub async fn refresh_all(
    client: &dyn ChainClient,
    registry: &PoolRegistry,
    mirror: &StateMirror,
    graph: &PricingGraph,
) {
    let block = match client.block_number().await {
        Ok(block) => block,
        Err(e) => {
            warn!(error = %e, "refresh aborted: block number unavailable");
            return;
        }
    };

    for pool in registry.pools() {
        let decimals0 = registry.decimals(&pool.token0).unwrap_or(18);
        let decimals1 = registry.decimals(&pool.token1).unwrap_or(18);

        match fetch_pricing(client, pool, decimals0, decimals1).await {
            Ok(pricing) => {
                if let ApplyResult::Applied(state) =
                    mirror.apply_refresh(pool.address, pricing, SeqNo::new(block, 0))
                {
                    graph.update_pool(pool, &state.pricing);
                }
            }
            Err(e) => {
                warn!(pool = %pool.address, error = %e, "pool refresh failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi;
    use crate::chain::mock::MockChainClient;
    use crate::registry::{DexFamily, Pool, PoolRegistry, Token};
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::SolCall;

    fn registry_with_pool(pool_address: Address) -> PoolRegistry {
        let weth = Token {
            address: Address::repeat_byte(0x01),
            symbol: "WETH".to_string(),
            decimals: 18,
        };
        let usdc = Token {
            address: Address::repeat_byte(0x02),
            symbol: "USDC".to_string(),
            decimals: 6,
        };
        let pool = Pool {
            address: pool_address,
            chain_id: 137,
            dex: "quickswap".to_string(),
            family: DexFamily::V2ConstantProduct,
            token0: weth.address,
            token1: usdc.address,
            fee_bps: 30,
            fee_tier_pips: None,
            stable: false,
            router: Address::repeat_byte(0xe1),
        };
        PoolRegistry::new(vec![weth, usdc], vec![pool])
    }

    #[tokio::test]
    async fn refresh_all_seeds_mirror_and_graph() {
        let client = MockChainClient::new(137);
        let pool_address = Address::repeat_byte(0x77);
        let registry = registry_with_pool(pool_address);

        let mut reserves = U256::from(1_000u64).to_be_bytes::<32>().to_vec();
        reserves.extend_from_slice(&U256::from(2_000u64).to_be_bytes::<32>());
        reserves.extend_from_slice(&U256::from(0u64).to_be_bytes::<32>());
        client.set_call_response(pool_address, abi::getReservesCall::SELECTOR, reserves);
        client.set_block_number(500);

        let mirror = StateMirror::new();
        let graph = PricingGraph::new(137, registry.decimals_map());

        refresh_all(&client, &registry, &mirror, &graph).await;

        let state = mirror.snapshot(&pool_address).unwrap();
        assert_eq!(state.seq, SeqNo::new(500, 0));
        assert_eq!(graph.view().edges.len(), 2);
    }

    #[tokio::test]
    async fn apply_event_updates_graph_only_for_fresh_registered_events() {
        let pool_address = Address::repeat_byte(0x77);
        let registry = registry_with_pool(pool_address);
        let mirror = StateMirror::new();
        let graph = PricingGraph::new(137, registry.decimals_map());

        let event = PoolEvent {
            pool: pool_address,
            seq: SeqNo::new(10, 1),
            data: crate::chain::PoolEventData::V2Sync {
                reserve0: U256::from(100u64),
                reserve1: U256::from(200u64),
            },
        };
        assert!(apply_event(&registry, &mirror, &graph, &event));
        assert_eq!(graph.view().edges.len(), 2);

        // Stale delivery leaves the graph untouched.
        let stale = PoolEvent {
            seq: SeqNo::new(10, 0),
            ..event.clone()
        };
        assert!(!apply_event(&registry, &mirror, &graph, &stale));

        // Unregistered pool events are dropped.
        let unknown = PoolEvent {
            pool: Address::repeat_byte(0x99),
            ..event
        };
        assert!(!apply_event(&registry, &mirror, &graph, &unknown));
    }
}
