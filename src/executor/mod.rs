//! Trade simulation and execution.
//!
//! Strictly one execution in flight per chain: the owning coordinator task
//! drives this executor sequentially. Every dequeued opportunity runs
//! simulate → gas gate → submit → confirm, with dry-run short-circuiting
//! before submission.

pub mod risk;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::abi::{self, SwapStep};
use crate::chain::{ChainClient, NonceManager, TxRequest};
use crate::detector::Opportunity;
use crate::error::{ChainError, ExecutionError, SubmitErrorKind};
use crate::graph::Edge;
use crate::metrics;
use crate::registry::DexFamily;
use crate::signing::{self, TxParams};

use risk::{LossTracker, LossVerdict};

/// Sentinel transaction hash archived for dry-run executions.
pub const DRY_RUN_HASH: B256 = B256::ZERO;

/// Executor tuning for one chain.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Chain id.
    pub chain_id: u64,
    /// Arbitrage contract address.
    pub contract: Address,
    /// Gas price ceiling in wei.
    pub max_gas_price_wei: u128,
    /// Slippage allowance in basis points applied to `minProfit`.
    pub slippage_bps: u32,
    /// Run an `eth_call` simulation before submitting.
    pub simulate_before_execute: bool,
    /// Dry-run mode: archive without submitting.
    pub dry_run: bool,
    /// Confirmation depth awaited.
    pub confirmations: u64,
    /// Priority fee in wei.
    pub priority_fee_wei: u128,
    /// Route submissions via the private mempool endpoint.
    pub private_mempool: bool,
    /// Per-trade realized loss ceiling in wei.
    pub single_loss_limit: U256,
    /// Daily realized loss ceiling in wei.
    pub daily_loss_limit: U256,
    /// Receipt polling deadline.
    pub receipt_timeout: Duration,
    /// Execution history ring capacity.
    pub history_capacity: usize,
}

/// Outcome of one opportunity's trip through the executor.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The chain is paused; nothing was attempted.
    Paused,
    /// Simulation reverted; the opportunity is disqualified.
    SimulationReverted {
        /// Decoded revert reason or selector.
        reason: String,
    },
    /// Estimated gas cost exceeded the profit margin.
    GasUnprofitable {
        /// Estimated gas cost in wei.
        gas_cost: U256,
        /// Quoted profit in wei.
        expected_profit: U256,
    },
    /// Current gas price sits above the configured ceiling.
    GasPriceTooHigh {
        /// Observed gas price in wei.
        gas_price: u128,
        /// Configured ceiling in wei.
        ceiling: u128,
    },
    /// Dry-run: archived as success with the sentinel hash.
    DryRun {
        /// The archived record.
        record: ExecutionRecord,
    },
    /// Mined successfully.
    Confirmed {
        /// The archived record.
        record: ExecutionRecord,
    },
    /// Mined but reverted; gas was burned, loss recorded.
    Reverted {
        /// The archived record.
        record: ExecutionRecord,
    },
}

/// Archived outcome of one opportunity. Append-only ring.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    /// Owning chain.
    pub chain_id: u64,
    /// Pools traversed, in order.
    pub pools: Vec<Address>,
    /// Input token of the cycle.
    pub input_token: Address,
    /// Input amount in wei.
    pub input_amount: U256,
    /// Quoted profit at detection time.
    pub expected_profit: U256,
    /// Whether the trade succeeded.
    pub success: bool,
    /// Transaction hash, when one exists.
    pub tx_hash: Option<B256>,
    /// Error kind for failures.
    pub error: Option<String>,
    /// Realized profit, when observable.
    pub realized_profit: Option<U256>,
    /// Realized loss (burned gas on a mined revert).
    pub realized_loss: Option<U256>,
    /// Gas consumed.
    pub gas_used: Option<u64>,
    /// Block the transaction mined in.
    pub block_number: Option<u64>,
    /// Submission time.
    pub submitted_at: OffsetDateTime,
    /// Confirmation time.
    pub confirmed_at: Option<OffsetDateTime>,
}

/// Counters of one chain's executor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutorStats {
    /// Opportunities handed to the executor.
    pub opportunities_processed: u64,
    /// Transactions submitted.
    pub trades_submitted: u64,
    /// Mined successes.
    pub trades_succeeded: u64,
    /// Failures (simulation passes but submission or execution failed).
    pub trades_failed: u64,
    /// Simulation reverts.
    pub simulations_reverted: u64,
    /// Opportunities skipped on gas grounds.
    pub gas_skips: u64,
    /// Accumulated expected profit of successful trades, in wei.
    pub total_profit_wei: U256,
    /// Accumulated realized loss, in wei.
    pub total_loss_wei: U256,
}

/// Simulate-then-send executor of one chain.
pub struct TradeExecutor {
    settings: ExecutorSettings,
    client: Arc<dyn ChainClient>,
    signer: PrivateKeySigner,
    wallet: Address,
    nonce: NonceManager,
    paused: Arc<AtomicBool>,
    loss_tracker: Arc<Mutex<LossTracker>>,
    stats: Arc<RwLock<ExecutorStats>>,
    history: Arc<Mutex<VecDeque<ExecutionRecord>>>,
}

impl TradeExecutor {
    /// Create an executor.
    pub fn new(
        settings: ExecutorSettings,
        client: Arc<dyn ChainClient>,
        signer: PrivateKeySigner,
        paused: Arc<AtomicBool>,
    ) -> Self {
        let wallet = signer.address();
        let loss_tracker = Arc::new(Mutex::new(LossTracker::new(
            settings.single_loss_limit,
            settings.daily_loss_limit,
        )));
        Self {
            nonce: NonceManager::new(wallet),
            settings,
            client,
            signer,
            wallet,
            paused,
            loss_tracker,
            stats: Arc::new(RwLock::new(ExecutorStats::default())),
            history: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Shared pause flag.
    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        self.paused.clone()
    }

    /// Shared loss tracker, so the operator surface can clear it.
    pub fn loss_tracker_handle(&self) -> Arc<Mutex<LossTracker>> {
        self.loss_tracker.clone()
    }

    /// Shared stats handle for the operator API.
    pub fn stats_handle(&self) -> Arc<RwLock<ExecutorStats>> {
        self.stats.clone()
    }

    /// Shared history handle for the operator API.
    pub fn history_handle(&self) -> Arc<Mutex<VecDeque<ExecutionRecord>>> {
        self.history.clone()
    }

    /// Snapshot of the stats.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.read().expect("stats lock poisoned").clone()
    }

    /// Execute one opportunity end to end.
    #[instrument(skip(self, opportunity), fields(chain = self.settings.chain_id, cycle_len = opportunity.cycle_len()))]
    pub async fn execute(
        &mut self,
        opportunity: &Opportunity,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        if self.paused.load(Ordering::SeqCst) {
            debug!("chain paused, opportunity skipped");
            return Ok(ExecutionOutcome::Paused);
        }

        self.stats
            .write()
            .expect("stats lock poisoned")
            .opportunities_processed += 1;

        let calldata = self.build_calldata(opportunity);
        let request = TxRequest {
            from: Some(self.wallet),
            to: self.settings.contract,
            data: calldata.clone(),
            value: U256::ZERO,
        };

        // 1. Simulate: any revert disqualifies.
        if self.settings.simulate_before_execute {
            match self.client.call(&request).await {
                Ok(_) => {}
                Err(ChainError::CallReverted { reason, .. }) => {
                    info!(reason, "simulation reverted, opportunity disqualified");
                    metrics::inc_simulations_reverted();
                    self.stats
                        .write()
                        .expect("stats lock poisoned")
                        .simulations_reverted += 1;
                    return Ok(ExecutionOutcome::SimulationReverted { reason });
                }
                Err(e) => return Err(e.into()),
            }
        }

        let gas_estimate = match self.client.estimate_gas(&request).await {
            Ok(gas) => gas,
            Err(ChainError::CallReverted { reason, .. }) => {
                info!(reason, "gas estimation reverted, opportunity disqualified");
                metrics::inc_simulations_reverted();
                self.stats
                    .write()
                    .expect("stats lock poisoned")
                    .simulations_reverted += 1;
                return Ok(ExecutionOutcome::SimulationReverted { reason });
            }
            Err(e) => return Err(e.into()),
        };

        // 2. Gas gate.
        let gas_price = self.client.gas_price().await?;
        if gas_price > self.settings.max_gas_price_wei {
            info!(
                gas_price_gwei = gas_price / 1_000_000_000,
                ceiling_gwei = self.settings.max_gas_price_wei / 1_000_000_000,
                "gas price above ceiling, opportunity skipped"
            );
            metrics::inc_gas_skips();
            self.stats.write().expect("stats lock poisoned").gas_skips += 1;
            return Ok(ExecutionOutcome::GasPriceTooHigh {
                gas_price,
                ceiling: self.settings.max_gas_price_wei,
            });
        }

        let gas_cost = U256::from(gas_estimate) * U256::from(gas_price);
        // Disqualify when gas eats more than 150% of the quoted profit.
        if gas_cost * U256::from(2u64) > opportunity.expected_profit * U256::from(3u64) {
            info!(
                gas_cost = %gas_cost,
                expected_profit = %opportunity.expected_profit,
                "gas cost exceeds profit margin, opportunity skipped"
            );
            metrics::inc_gas_skips();
            self.stats.write().expect("stats lock poisoned").gas_skips += 1;
            return Ok(ExecutionOutcome::GasUnprofitable {
                gas_cost,
                expected_profit: opportunity.expected_profit,
            });
        }

        // 3. Dry-run short-circuit: archive a synthesized success.
        if self.settings.dry_run {
            info!(
                expected_profit = %opportunity.expected_profit,
                "dry-run execution archived"
            );
            let record = self.record_dry_run(opportunity, gas_estimate);
            {
                let mut stats = self.stats.write().expect("stats lock poisoned");
                stats.trades_succeeded += 1;
                stats.total_profit_wei =
                    stats.total_profit_wei.saturating_add(opportunity.expected_profit);
            }
            metrics::inc_trades_succeeded();
            return Ok(ExecutionOutcome::DryRun { record });
        }

        // 4. Submit, retrying exactly once on a nonce conflict.
        let submitted_at = OffsetDateTime::now_utc();
        let hash = match self.submit(&calldata, gas_estimate, gas_price).await {
            Ok(hash) => hash,
            Err(e) => {
                error!(error = %e, "submission failed");
                self.record_failure(opportunity, None, &e, submitted_at);
                self.stats.write().expect("stats lock poisoned").trades_failed += 1;
                metrics::inc_trades_failed();
                return match e {
                    ChainError::Submit { kind, message } => {
                        Err(ExecutionError::Submission { kind, message })
                    }
                    other => Err(other.into()),
                };
            }
        };

        self.stats.write().expect("stats lock poisoned").trades_submitted += 1;
        info!(tx_hash = %hash, "transaction submitted, awaiting confirmation");

        // 5. Confirm. Never retry past this point: the transaction exists.
        let receipt = match self
            .client
            .wait_for_receipt(hash, self.settings.confirmations, self.settings.receipt_timeout)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.record_failure(opportunity, Some(hash), &e, submitted_at);
                self.stats.write().expect("stats lock poisoned").trades_failed += 1;
                metrics::inc_trades_failed();
                return Err(e.into());
            }
        };

        // The transaction is mined; its nonce is consumed either way.
        self.nonce.advance().await;

        if receipt.status {
            let record = ExecutionRecord {
                chain_id: self.settings.chain_id,
                pools: opportunity.pools(),
                input_token: opportunity.input_token,
                input_amount: opportunity.input_amount,
                expected_profit: opportunity.expected_profit,
                success: true,
                tx_hash: Some(hash),
                error: None,
                realized_profit: None,
                realized_loss: None,
                gas_used: Some(receipt.gas_used),
                block_number: Some(receipt.block_number),
                submitted_at,
                confirmed_at: Some(OffsetDateTime::now_utc()),
            };
            self.archive(record.clone());
            {
                let mut stats = self.stats.write().expect("stats lock poisoned");
                stats.trades_succeeded += 1;
                stats.total_profit_wei =
                    stats.total_profit_wei.saturating_add(opportunity.expected_profit);
            }
            metrics::inc_trades_succeeded();
            info!(
                tx_hash = %hash,
                block = receipt.block_number,
                gas_used = receipt.gas_used,
                "arbitrage confirmed"
            );
            return Ok(ExecutionOutcome::Confirmed { record });
        }

        // Mined revert: the observable loss is the burned gas.
        let loss = U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price);
        warn!(
            tx_hash = %hash,
            gas_used = receipt.gas_used,
            loss = %loss,
            "transaction reverted on chain"
        );

        let record = ExecutionRecord {
            chain_id: self.settings.chain_id,
            pools: opportunity.pools(),
            input_token: opportunity.input_token,
            input_amount: opportunity.input_amount,
            expected_profit: opportunity.expected_profit,
            success: false,
            tx_hash: Some(hash),
            error: Some("reverted".to_string()),
            realized_profit: None,
            realized_loss: Some(loss),
            gas_used: Some(receipt.gas_used),
            block_number: Some(receipt.block_number),
            submitted_at,
            confirmed_at: Some(OffsetDateTime::now_utc()),
        };
        self.archive(record.clone());
        {
            let mut stats = self.stats.write().expect("stats lock poisoned");
            stats.trades_failed += 1;
            stats.total_loss_wei = stats.total_loss_wei.saturating_add(loss);
        }
        metrics::inc_trades_failed();

        let verdict = self
            .loss_tracker
            .lock()
            .expect("loss tracker lock poisoned")
            .record_loss(loss, OffsetDateTime::now_utc());
        match verdict {
            LossVerdict::WithinLimits => Ok(ExecutionOutcome::Reverted { record }),
            LossVerdict::DailyLimitBreached => {
                self.pause("daily loss ceiling breached");
                Ok(ExecutionOutcome::Reverted { record })
            }
            LossVerdict::SingleLimitBreached => {
                self.pause("single-trade loss ceiling breached");
                Err(ExecutionError::LossLimit {
                    loss,
                    limit: self.settings.single_loss_limit,
                })
            }
        }
    }

    /// Pause the chain: stops future executions until an operator clears it.
    pub fn pause(&self, reason: &str) {
        warn!(chain = self.settings.chain_id, reason, "chain paused");
        self.paused.store(true, Ordering::SeqCst);
    }

    async fn submit(
        &self,
        calldata: &[u8],
        gas_estimate: u64,
        gas_price: u128,
    ) -> Result<B256, ChainError> {
        let mut nonce = self.nonce.next(&*self.client).await?;
        let mut retried = false;

        loop {
            let params = TxParams {
                chain_id: self.settings.chain_id,
                nonce,
                gas_limit: gas_estimate + gas_estimate / 5,
                max_fee_per_gas: gas_price * 2,
                max_priority_fee_per_gas: self.settings.priority_fee_wei,
                to: self.settings.contract,
                data: calldata.to_vec(),
                value: U256::ZERO,
            };
            let raw = signing::sign_transaction(&self.signer, &params).map_err(|e| {
                ChainError::Submit {
                    kind: SubmitErrorKind::Network,
                    message: e.to_string(),
                }
            })?;

            match self
                .client
                .send_raw_transaction(&raw, self.settings.private_mempool)
                .await
            {
                Ok(hash) => return Ok(hash),
                Err(ChainError::Submit {
                    kind: SubmitErrorKind::NonceConflict,
                    message,
                }) if !retried => {
                    warn!(message, "nonce conflict, resyncing and retrying once");
                    nonce = self.nonce.resync(&*self.client).await?;
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn build_calldata(&self, opportunity: &Opportunity) -> Vec<u8> {
        let slippage_keep = 10_000u64 - self.settings.slippage_bps as u64;
        let min_profit =
            opportunity.expected_profit * U256::from(slippage_keep) / U256::from(10_000u64);

        let swaps = opportunity
            .steps
            .iter()
            .map(|step| SwapStep {
                router: step.edge.router,
                tokenIn: step.edge.from,
                tokenOut: step.edge.to,
                amountIn: step.amount_in,
                data: step_data(&step.edge).into(),
                dexType: step.edge.family.dex_type_id(),
            })
            .collect();

        abi::encode_execute_arbitrage(
            opportunity.input_token,
            opportunity.input_amount,
            swaps,
            min_profit,
        )
    }

    fn record_dry_run(&self, opportunity: &Opportunity, gas_estimate: u64) -> ExecutionRecord {
        let now = OffsetDateTime::now_utc();
        let record = ExecutionRecord {
            chain_id: self.settings.chain_id,
            pools: opportunity.pools(),
            input_token: opportunity.input_token,
            input_amount: opportunity.input_amount,
            expected_profit: opportunity.expected_profit,
            success: true,
            tx_hash: Some(DRY_RUN_HASH),
            error: None,
            realized_profit: Some(opportunity.expected_profit),
            realized_loss: None,
            gas_used: Some(gas_estimate),
            block_number: None,
            submitted_at: now,
            confirmed_at: Some(now),
        };
        self.archive(record.clone());
        record
    }

    fn record_failure(
        &self,
        opportunity: &Opportunity,
        tx_hash: Option<B256>,
        error: &ChainError,
        submitted_at: OffsetDateTime,
    ) -> ExecutionRecord {
        let record = ExecutionRecord {
            chain_id: self.settings.chain_id,
            pools: opportunity.pools(),
            input_token: opportunity.input_token,
            input_amount: opportunity.input_amount,
            expected_profit: opportunity.expected_profit,
            success: false,
            tx_hash,
            error: Some(error.to_string()),
            realized_profit: None,
            realized_loss: None,
            gas_used: None,
            block_number: None,
            submitted_at,
            confirmed_at: None,
        };
        self.archive(record.clone());
        record
    }

    fn archive(&self, record: ExecutionRecord) {
        let mut history = self.history.lock().expect("history lock poisoned");
        history.push_back(record);
        while history.len() > self.settings.history_capacity {
            history.pop_front();
        }
    }
}

fn step_data(edge: &Edge) -> Vec<u8> {
    match edge.family {
        DexFamily::V2ConstantProduct => Vec::new(),
        DexFamily::V3Concentrated => {
            abi::encode_v3_step_data(edge.fee_tier_pips.unwrap_or(3_000))
        }
        DexFamily::StableCurve => {
            let (i, j) = if edge.zero_for_one { (0, 1) } else { (1, 0) };
            abi::encode_stable_step_data(i, j)
        }
        DexFamily::RouteList => abi::encode_route_step_data(edge.stable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainClient;
    use crate::detector::CycleStep;
    use crate::signing::create_signer;

    const TEST_KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn test_settings(dry_run: bool) -> ExecutorSettings {
        ExecutorSettings {
            chain_id: 137,
            contract: Address::repeat_byte(0xaa),
            max_gas_price_wei: 100_000_000_000,
            slippage_bps: 50,
            simulate_before_execute: true,
            dry_run,
            confirmations: 1,
            priority_fee_wei: 1_000_000_000,
            private_mempool: false,
            single_loss_limit: U256::from(50_000_000_000_000_000u128),
            daily_loss_limit: U256::from(200_000_000_000_000_000u128),
            receipt_timeout: Duration::from_secs(5),
            history_capacity: 16,
        }
    }

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

    fn test_opportunity(profit_wei: u128) -> Opportunity {
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
                    edge: test_edge(0x10, weth, usdc),
                    amount_in: input,
                    expected_out: U256::from(3_000_000_000u64),
                },
                CycleStep {
                    edge: test_edge(0x11, usdc, weth),
                    amount_in: U256::from(3_000_000_000u64),
                    expected_out: output,
                },
            ],
            expected_output: output,
            expected_profit: U256::from(profit_wei),
            gas_estimate: None,
            confidence: 0.5,
            detected_at,
            expires_at: detected_at + Duration::from_secs(2),
        }
    }

    fn executor(client: Arc<MockChainClient>, dry_run: bool) -> TradeExecutor {
        TradeExecutor::new(
            test_settings(dry_run),
            client,
            create_signer(TEST_KEY).unwrap(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn dry_run_archives_sentinel_success_without_submitting() {
        let client = Arc::new(MockChainClient::new(137));
        client.set_transaction_count(5);
        let mut exec = executor(client.clone(), true);

        let opportunity = test_opportunity(10_000_000_000_000_000);
        let outcome = exec.execute(&opportunity).await.unwrap();

        let ExecutionOutcome::DryRun { record } = outcome else {
            panic!("expected dry-run outcome");
        };
        assert!(record.success);
        assert_eq!(record.tx_hash, Some(DRY_RUN_HASH));
        assert_eq!(record.realized_profit, Some(opportunity.expected_profit));
        assert_eq!(client.sent_count(), 0);
        // On-chain nonce untouched.
        assert_eq!(client.transaction_count(Address::ZERO).await.unwrap(), 5);
        assert_eq!(exec.stats().trades_succeeded, 1);
    }

    #[tokio::test]
    async fn simulation_revert_disqualifies_without_submission() {
        let client = Arc::new(MockChainClient::new(137));
        client.set_call_revert(Address::repeat_byte(0xaa), vec![0xde, 0xad, 0xbe, 0xef]);
        let mut exec = executor(client.clone(), false);

        let outcome = exec
            .execute(&test_opportunity(10_000_000_000_000_000))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ExecutionOutcome::SimulationReverted { .. }
        ));
        assert_eq!(client.sent_count(), 0);
        assert_eq!(exec.stats().simulations_reverted, 1);
        assert_eq!(exec.stats().trades_failed, 0);
    }

    #[tokio::test]
    async fn gas_price_ceiling_skips_execution() {
        let client = Arc::new(MockChainClient::new(137));
        client.set_gas_price(200_000_000_000); // 200 gwei > 100 gwei ceiling
        let mut exec = executor(client.clone(), false);

        let outcome = exec
            .execute(&test_opportunity(10_000_000_000_000_000))
            .await
            .unwrap();

        assert!(matches!(outcome, ExecutionOutcome::GasPriceTooHigh { .. }));
        assert_eq!(client.sent_count(), 0);
        assert_eq!(exec.stats().gas_skips, 1);
    }

    #[tokio::test]
    async fn unprofitable_gas_cost_skips_execution() {
        let client = Arc::new(MockChainClient::new(137));
        // 200k gas at 20 gwei = 0.004 native; 1.5x margin needs profit
        // >= 0.00267, give it far less.
        let mut exec = executor(client.clone(), false);

        let outcome = exec.execute(&test_opportunity(1_000_000_000_000)).await.unwrap();

        assert!(matches!(outcome, ExecutionOutcome::GasUnprofitable { .. }));
        assert_eq!(client.sent_count(), 0);
    }

    #[tokio::test]
    async fn live_submission_confirms_and_advances_nonce() {
        let client = Arc::new(MockChainClient::new(137));
        client.set_transaction_count(9);
        let mut exec = executor(client.clone(), false);

        let outcome = exec
            .execute(&test_opportunity(10_000_000_000_000_000))
            .await
            .unwrap();

        let ExecutionOutcome::Confirmed { record } = outcome else {
            panic!("expected confirmation");
        };
        assert!(record.success);
        assert!(record.tx_hash.is_some());
        assert_eq!(client.sent_count(), 1);
        assert_eq!(exec.stats().trades_submitted, 1);
        assert_eq!(exec.stats().trades_succeeded, 1);

        // The local nonce advanced past the initial chain value.
        assert_eq!(exec.nonce.next(&*exec.client).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn nonce_conflict_resyncs_and_retries_once() {
        let client = Arc::new(MockChainClient::new(137));
        client.set_transaction_count(3);
        client.push_submit_error(SubmitErrorKind::NonceConflict, "nonce too low");
        let mut exec = executor(client.clone(), false);

        let outcome = exec
            .execute(&test_opportunity(10_000_000_000_000_000))
            .await
            .unwrap();

        assert!(matches!(outcome, ExecutionOutcome::Confirmed { .. }));
        assert_eq!(client.sent_count(), 1);
    }

    #[tokio::test]
    async fn non_nonce_submission_failure_surfaces_as_trade_failure() {
        let client = Arc::new(MockChainClient::new(137));
        client.push_submit_error(SubmitErrorKind::Network, "connection reset");
        let mut exec = executor(client.clone(), false);

        let result = exec.execute(&test_opportunity(10_000_000_000_000_000)).await;

        assert!(matches!(
            result,
            Err(ExecutionError::Submission {
                kind: SubmitErrorKind::Network,
                ..
            })
        ));
        assert_eq!(exec.stats().trades_failed, 1);
    }

    #[tokio::test]
    async fn mined_revert_records_loss_and_daily_breach_pauses() {
        let client = Arc::new(MockChainClient::new(137));
        let mut exec = executor(client.clone(), false);
        let paused = exec.pause_flag();

        // Each revert burns 0.045 native: below the 0.05 single ceiling,
        // so the 0.2 daily ceiling is reached on the fifth revert.
        for round in 1..=5u32 {
            client.push_reverted_receipt(1_500_000, 30_000_000_000);
            let outcome = exec
                .execute(&test_opportunity(10_000_000_000_000_000))
                .await
                .unwrap();
            assert!(matches!(outcome, ExecutionOutcome::Reverted { .. }));
            assert_eq!(paused.load(Ordering::SeqCst), round >= 5);
        }

        assert!(exec.stats().total_loss_wei >= U256::from(200_000_000_000_000_000u128));

        // While paused nothing more is attempted.
        let outcome = exec
            .execute(&test_opportunity(10_000_000_000_000_000))
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Paused));
    }

    #[tokio::test]
    async fn single_loss_breach_fails_hard() {
        let client = Arc::new(MockChainClient::new(137));
        let mut exec = executor(client.clone(), false);
        let paused = exec.pause_flag();

        // One revert burning 0.06 native: above the 0.05 single ceiling.
        client.push_reverted_receipt(2_000_000, 30_000_000_000);
        let result = exec.execute(&test_opportunity(10_000_000_000_000_000)).await;

        assert!(matches!(result, Err(ExecutionError::LossLimit { .. })));
        assert!(paused.load(Ordering::SeqCst));
    }

    #[test]
    fn step_data_follows_family_encoding() {
        let weth = Address::repeat_byte(0x01);
        let usdc = Address::repeat_byte(0x02);

        let v2 = test_edge(0x10, weth, usdc);
        assert!(step_data(&v2).is_empty());

        let mut v3 = test_edge(0x10, weth, usdc);
        v3.family = DexFamily::V3Concentrated;
        v3.fee_tier_pips = Some(500);
        assert_eq!(abi::decode_v3_step_data(&step_data(&v3)).unwrap(), 500);

        let mut stable = test_edge(0x10, weth, usdc);
        stable.family = DexFamily::StableCurve;
        stable.zero_for_one = false;
        assert_eq!(
            abi::decode_stable_step_data(&step_data(&stable)).unwrap(),
            (1, 0)
        );

        let mut route = test_edge(0x10, weth, usdc);
        route.family = DexFamily::RouteList;
        route.stable = true;
        assert!(abi::decode_route_step_data(&step_data(&route)).unwrap());
    }
}
