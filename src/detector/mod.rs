//! Arbitrage cycle detection.
//!
//! Pure synchronous computation over a [`GraphView`]: two complementary
//! searches (negative-cycle and bounded enumeration), candidate dedup, then
//! an executable quote against the exact pool formulas. Only cycles whose
//! quoted output beats the input by the configured minimum are promoted.

pub mod bellman;
pub mod dfs;

use std::collections::HashSet;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use time::OffsetDateTime;
use tracing::{debug, trace};

use crate::config::Config;
use crate::graph::{Edge, GraphView};

/// Tuning of one chain's detector.
#[derive(Debug, Clone)]
pub struct DetectorParams {
    /// Source token for both searches (wrapped native).
    pub source: Address,
    /// Input amount of the executable quote, in source-token wei.
    pub probe_amount: U256,
    /// Minimum quoted profit, in source-token wei.
    pub min_profit: U256,
    /// Maximum cycle length for the bounded search.
    pub max_cycle_len: usize,
    /// Reserve floor below which an edge counts as thin, in native scale.
    pub liquidity_floor: U256,
    /// Decimals per token, used to rescale the liquidity floor.
    pub decimals: std::collections::HashMap<Address, u8>,
    /// Opportunity time-to-live.
    pub ttl: Duration,
    /// Confidence multiplier per cycle hop beyond two.
    pub length_decay: f64,
    /// Confidence multiplier per thin edge.
    pub thin_penalty: f64,
}

impl DetectorParams {
    /// Build params from config for one chain.
    pub fn from_config(
        config: &Config,
        source: Address,
        decimals: std::collections::HashMap<Address, u8>,
    ) -> Self {
        Self {
            source,
            probe_amount: U256::from(config.probe_amount_wei),
            min_profit: U256::from(config.min_profit_wei),
            max_cycle_len: config.max_cycle_len,
            liquidity_floor: U256::from(config.liquidity_floor_wei),
            decimals,
            ttl: config.opportunity_ttl(),
            length_decay: 0.95,
            thin_penalty: 0.8,
        }
    }
}

/// One hop of a quoted cycle.
#[derive(Debug, Clone)]
pub struct CycleStep {
    /// The edge taken.
    pub edge: Edge,
    /// Exact input to this hop.
    pub amount_in: U256,
    /// Exact quoted output of this hop.
    pub expected_out: U256,
}

/// A quoted, profitable cycle ready for the pipeline.
#[derive(Debug, Clone)]
pub struct Opportunity {
    /// Owning chain.
    pub chain_id: u64,
    /// Token the cycle starts and ends in.
    pub input_token: Address,
    /// Input amount in wei of the input token.
    pub input_amount: U256,
    /// Hops in execution order.
    pub steps: Vec<CycleStep>,
    /// Quoted final output.
    pub expected_output: U256,
    /// Quoted profit (`expected_output − input_amount`).
    pub expected_profit: U256,
    /// Gas estimate, filled in by the simulator.
    pub gas_estimate: Option<u64>,
    /// Ordering and pre-filter heuristic in [0, 1].
    pub confidence: f64,
    /// Detection time.
    pub detected_at: OffsetDateTime,
    /// Expiry time.
    pub expires_at: OffsetDateTime,
}

impl Opportunity {
    /// Identity of the ordered pool sequence, used for dedup.
    pub fn key(&self) -> String {
        let mut key = String::new();
        for step in &self.steps {
            key.push_str(&format!("{:#x}:{:#x};", step.edge.pool, step.edge.from));
        }
        key
    }

    /// Number of hops.
    pub fn cycle_len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the opportunity has expired.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Pools traversed, in order.
    pub fn pools(&self) -> Vec<Address> {
        self.steps.iter().map(|s| s.edge.pool).collect()
    }
}

/// Run both searches and promote profitable candidates.
///
/// Ordering of the result: higher quoted profit first, then higher
/// confidence, then earlier detection.
pub fn find_opportunities(view: &GraphView, params: &DetectorParams) -> Vec<Opportunity> {
    if view.is_empty() {
        return Vec::new();
    }

    let adjacency = view.adjacency();

    let mut candidates = bellman::negative_cycles(view, params.source);
    candidates.extend(dfs::source_cycles(
        view,
        &adjacency,
        params.source,
        params.max_cycle_len,
    ));

    let mut seen = HashSet::new();
    let mut opportunities = Vec::new();

    for cycle in candidates {
        let Some(rotated) = rotate_to_source(view, &cycle, params.source) else {
            trace!("cycle without source token dropped");
            continue;
        };

        if !pools_are_distinct(view, &rotated) {
            continue;
        }

        let identity: Vec<usize> = rotated.clone();
        if !seen.insert(identity) {
            continue;
        }

        if let Some(opportunity) = promote(view, &rotated, params) {
            debug!(
                chain = view.chain_id,
                cycle_len = opportunity.cycle_len(),
                profit = %opportunity.expected_profit,
                confidence = opportunity.confidence,
                "cycle promoted to opportunity"
            );
            opportunities.push(opportunity);
        }
    }

    opportunities.sort_by(|a, b| {
        b.expected_profit
            .cmp(&a.expected_profit)
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.detected_at.cmp(&b.detected_at))
    });

    opportunities
}

/// Rotate a cycle so it starts at the source token; `None` when the cycle
/// never passes through it (its input cannot be sized).
fn rotate_to_source(view: &GraphView, cycle: &[usize], source: Address) -> Option<Vec<usize>> {
    let position = cycle
        .iter()
        .position(|&edge_index| view.edges[edge_index].from == source)?;
    let mut rotated = cycle.to_vec();
    rotated.rotate_left(position);
    Some(rotated)
}

/// A cycle may not visit the same pool twice; the quote treats pool states
/// as independent and a second visit would quote a stale snapshot.
fn pools_are_distinct(view: &GraphView, cycle: &[usize]) -> bool {
    let pools: HashSet<Address> = cycle.iter().map(|&i| view.edges[i].pool).collect();
    pools.len() == cycle.len()
}

/// Apply the exact output formula hop by hop; promote when the final
/// output beats the input by the configured minimum profit.
fn promote(view: &GraphView, cycle: &[usize], params: &DetectorParams) -> Option<Opportunity> {
    let mut steps = Vec::with_capacity(cycle.len());
    let mut amount = params.probe_amount;

    for &edge_index in cycle {
        let edge = &view.edges[edge_index];
        let out = edge.amount_out(amount);
        if out.is_zero() {
            return None;
        }
        steps.push(CycleStep {
            edge: edge.clone(),
            amount_in: amount,
            expected_out: out,
        });
        amount = out;
    }

    let expected_output = amount;
    let expected_profit = expected_output.checked_sub(params.probe_amount)?;
    if expected_profit < params.min_profit {
        return None;
    }

    let confidence = confidence_score(&steps, params);
    let detected_at = OffsetDateTime::now_utc();

    Some(Opportunity {
        chain_id: view.chain_id,
        input_token: params.source,
        input_amount: params.probe_amount,
        steps,
        expected_output,
        expected_profit,
        gas_estimate: None,
        confidence,
        detected_at,
        expires_at: detected_at + params.ttl,
    })
}

/// Heuristic in [0, 1]: profit-proportional base, decayed per extra hop,
/// penalized per thin edge. An ordering hint only.
fn confidence_score(steps: &[CycleStep], params: &DetectorParams) -> f64 {
    let input = steps[0].amount_in;
    let output = steps[steps.len() - 1].expected_out;
    let profit = output.saturating_sub(input);

    let profit_bps = (profit.saturating_mul(U256::from(10_000u64)) / input)
        .try_into()
        .unwrap_or(u64::MAX) as f64;
    let mut score = (profit_bps / 100.0).min(1.0);

    score *= params.length_decay.powi(steps.len() as i32 - 2);

    for step in steps {
        let floor = scaled_floor(params, &step.edge.from, &step.edge.to, &step.edge);
        if step.edge.thin_side_reserve() < floor {
            score *= params.thin_penalty;
        }
    }

    score.clamp(0.0, 1.0)
}

/// The liquidity floor is configured in native-token (18-decimal) scale;
/// rescale it to the precision of the thinner side's token.
fn scaled_floor(params: &DetectorParams, from: &Address, to: &Address, edge: &Edge) -> U256 {
    let thin_token = if edge.reserve_in <= edge.reserve_out {
        from
    } else {
        to
    };
    let decimals = params.decimals.get(thin_token).copied().unwrap_or(18);
    if decimals >= 18 {
        params.liquidity_floor * U256::from(10u64).pow(U256::from(decimals - 18))
    } else {
        params.liquidity_floor / U256::from(10u64).pow(U256::from(18 - decimals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PricingGraph;
    use crate::mirror::PoolPricing;
    use crate::registry::{DexFamily, Pool};
    use std::collections::HashMap;

    fn pool(address_byte: u8, token0: Address, token1: Address) -> Pool {
        Pool {
            address: Address::repeat_byte(address_byte),
            chain_id: 137,
            dex: "testdex".to_string(),
            family: DexFamily::V2ConstantProduct,
            token0,
            token1,
            fee_bps: 30,
            fee_tier_pips: None,
            stable: false,
            router: Address::repeat_byte(0xe1),
        }
    }

    fn v2(reserve0: u128, reserve1: u128) -> PoolPricing {
        PoolPricing::V2 {
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
        }
    }

    fn params(source: Address, decimals: HashMap<Address, u8>) -> DetectorParams {
        DetectorParams {
            source,
            probe_amount: U256::from(1_000_000_000_000_000_000u128),
            min_profit: U256::from(100_000_000_000_000u128),
            max_cycle_len: 3,
            liquidity_floor: U256::from(1_000_000_000_000_000_000u128),
            decimals,
            ttl: Duration::from_secs(2),
            length_decay: 0.95,
            thin_penalty: 0.8,
        }
    }

    /// WETH/USDC/DAI triangle with a 2% skew on the stable leg.
    fn triangle_graph() -> (PricingGraph, Address, HashMap<Address, u8>) {
        let weth = Address::repeat_byte(0x01);
        let usdc = Address::repeat_byte(0x02);
        let dai = Address::repeat_byte(0x03);
        let decimals: HashMap<Address, u8> = [(weth, 18u8), (usdc, 6u8), (dai, 18u8)]
            .into_iter()
            .collect();

        let graph = PricingGraph::new(137, decimals.clone());
        // WETH/USDC at 1:3000.
        graph.update_pool(
            &pool(0x10, weth, usdc),
            &v2(1_000_000_000_000_000_000_000, 3_000_000_000_000),
        );
        // USDC/DAI at 1:1.02.
        graph.update_pool(
            &pool(0x11, usdc, dai),
            &v2(1_000_000_000_000, 1_020_000_000_000_000_000_000_000),
        );
        // DAI/WETH at 3000:1.
        graph.update_pool(
            &pool(0x12, dai, weth),
            &v2(3_000_000_000_000_000_000_000_000, 1_000_000_000_000_000_000_000),
        );

        (graph, weth, decimals)
    }

    #[test]
    fn empty_graph_detects_nothing() {
        let view = GraphView::default();
        let params = params(Address::repeat_byte(0x01), HashMap::new());
        assert!(find_opportunities(&view, &params).is_empty());
    }

    #[test]
    fn profitable_triangle_is_detected_and_quotes_exactly() {
        let (graph, weth, decimals) = triangle_graph();
        let params = params(weth, decimals);

        let opportunities = find_opportunities(&graph.view(), &params);
        assert_eq!(opportunities.len(), 1);

        let opportunity = &opportunities[0];
        assert_eq!(opportunity.cycle_len(), 3);
        assert_eq!(opportunity.input_token, weth);
        assert!(opportunity.expected_profit > U256::ZERO);
        assert!(opportunity.confidence > 0.0);

        // The quoted chain is internally exact: re-applying each edge's
        // formula reproduces the recorded outputs.
        let mut amount = opportunity.input_amount;
        for step in &opportunity.steps {
            assert_eq!(step.amount_in, amount);
            assert_eq!(step.edge.amount_out(amount), step.expected_out);
            amount = step.expected_out;
        }
        assert_eq!(amount, opportunity.expected_output);
        assert!(
            opportunity.expected_output >= opportunity.input_amount + params.min_profit
        );
    }

    #[test]
    fn balanced_graph_detects_nothing() {
        let weth = Address::repeat_byte(0x01);
        let usdc = Address::repeat_byte(0x02);
        let decimals: HashMap<Address, u8> =
            [(weth, 18u8), (usdc, 6u8)].into_iter().collect();

        // Two pools at the same 1:3000 price: fees make every round trip
        // lossy, so nothing should surface.
        let graph = PricingGraph::new(137, decimals.clone());
        graph.update_pool(
            &pool(0x10, weth, usdc),
            &v2(1_000_000_000_000_000_000_000, 3_000_000_000_000),
        );
        graph.update_pool(
            &pool(0x11, weth, usdc),
            &v2(2_000_000_000_000_000_000_000, 6_000_000_000_000),
        );

        let params = params(weth, decimals);
        assert!(find_opportunities(&graph.view(), &params).is_empty());
    }

    #[test]
    fn two_pool_price_gap_is_found_as_two_cycle() {
        let weth = Address::repeat_byte(0x01);
        let usdc = Address::repeat_byte(0x02);
        let decimals: HashMap<Address, u8> =
            [(weth, 18u8), (usdc, 6u8)].into_iter().collect();

        // 3000 vs 3150: a 5% gap dwarfing two 30 bps fees.
        let graph = PricingGraph::new(137, decimals.clone());
        graph.update_pool(
            &pool(0x10, weth, usdc),
            &v2(1_000_000_000_000_000_000_000, 3_150_000_000_000),
        );
        graph.update_pool(
            &pool(0x11, weth, usdc),
            &v2(1_000_000_000_000_000_000_000, 3_000_000_000_000),
        );

        let params = params(weth, decimals);
        let opportunities = find_opportunities(&graph.view(), &params);
        assert!(!opportunities.is_empty());
        assert_eq!(opportunities[0].cycle_len(), 2);
        // The two hops go through distinct pools.
        let pools = opportunities[0].pools();
        assert_ne!(pools[0], pools[1]);
    }

    #[test]
    fn single_pool_round_trip_is_never_emitted() {
        let weth = Address::repeat_byte(0x01);
        let usdc = Address::repeat_byte(0x02);
        let decimals: HashMap<Address, u8> =
            [(weth, 18u8), (usdc, 6u8)].into_iter().collect();

        let graph = PricingGraph::new(137, decimals.clone());
        graph.update_pool(
            &pool(0x10, weth, usdc),
            &v2(1_000_000_000_000_000_000_000, 3_000_000_000_000),
        );

        let params = params(weth, decimals);
        assert!(find_opportunities(&graph.view(), &params).is_empty());
    }

    #[test]
    fn ordering_prefers_profit_then_confidence() {
        let (graph, weth, decimals) = triangle_graph();
        // Add a second, fatter price gap as a direct 2-cycle.
        let usdc = Address::repeat_byte(0x02);
        graph.update_pool(
            &pool(0x20, weth, usdc),
            &v2(1_000_000_000_000_000_000_000, 3_400_000_000_000),
        );

        let params = params(weth, decimals);
        let opportunities = find_opportunities(&graph.view(), &params);
        assert!(opportunities.len() >= 2);
        for pair in opportunities.windows(2) {
            assert!(pair[0].expected_profit >= pair[1].expected_profit);
        }
    }

    #[test]
    fn opportunity_key_identifies_pool_sequence() {
        let (graph, weth, decimals) = triangle_graph();
        let params = params(weth, decimals);

        let opportunities = find_opportunities(&graph.view(), &params);
        let key = opportunities[0].key();
        assert!(key.contains(&format!("{:#x}", Address::repeat_byte(0x10))));
        assert_eq!(opportunities[0].key(), key);
    }

    #[test]
    fn expiry_window_is_applied() {
        let (graph, weth, decimals) = triangle_graph();
        let params = params(weth, decimals);

        let opportunity = &find_opportunities(&graph.view(), &params)[0];
        assert!(!opportunity.is_expired(opportunity.detected_at));
        assert!(opportunity.is_expired(opportunity.detected_at + Duration::from_secs(3)));
    }
}
