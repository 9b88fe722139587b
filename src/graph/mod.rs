//! Per-chain pricing graph derived from the state mirror.
//!
//! Tokens are vertices keyed by address, pools contribute one directed edge
//! per direction. Both edges of a pool are recomputed and swapped in under
//! a single write-lock section, so no reader ever observes one direction
//! updated and the other stale.

pub mod quote;

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use alloy::primitives::{Address, U256};

use crate::mirror::PoolPricing;
use crate::registry::{DexFamily, Pool};

/// A directed pricing edge derived from one pool snapshot.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Pool this edge was derived from.
    pub pool: Address,
    /// Pricing family.
    pub family: DexFamily,
    /// Router the arbitrage contract calls for this pool.
    pub router: Address,
    /// Source token.
    pub from: Address,
    /// Destination token.
    pub to: Address,
    /// Swap fee in basis points.
    pub fee_bps: u32,
    /// v3 fee tier in pips, when applicable.
    pub fee_tier_pips: Option<u32>,
    /// Route-list stable flag.
    pub stable: bool,
    /// True when this edge goes token0 -> token1.
    pub zero_for_one: bool,
    /// Reference reserve on the input side.
    pub reserve_in: U256,
    /// Reference reserve on the output side.
    pub reserve_out: U256,
    /// `−ln(marginal rate after fee)` at the reference input.
    pub weight: f64,
}

impl Edge {
    /// Exact output of this edge for a given input.
    pub fn amount_out(&self, amount_in: U256) -> U256 {
        quote::amount_out(
            self.family,
            self.fee_bps,
            self.reserve_in,
            self.reserve_out,
            amount_in,
        )
    }

    /// The smaller of the two reference reserves, for thinness checks.
    pub fn thin_side_reserve(&self) -> U256 {
        self.reserve_in.min(self.reserve_out)
    }
}

/// An immutable copy of the graph handed to detector runs.
#[derive(Debug, Clone, Default)]
pub struct GraphView {
    /// Owning chain.
    pub chain_id: u64,
    /// All edges present at snapshot time.
    pub edges: Vec<Edge>,
}

impl GraphView {
    /// Vertex set: the union of edge endpoints.
    pub fn vertices(&self) -> HashSet<Address> {
        let mut set = HashSet::with_capacity(self.edges.len());
        for edge in &self.edges {
            set.insert(edge.from);
            set.insert(edge.to);
        }
        set
    }

    /// Adjacency index: outgoing edge positions per vertex.
    pub fn adjacency(&self) -> HashMap<Address, Vec<usize>> {
        let mut adjacency: HashMap<Address, Vec<usize>> = HashMap::new();
        for (index, edge) in self.edges.iter().enumerate() {
            adjacency.entry(edge.from).or_default().push(index);
        }
        adjacency
    }

    /// Whether the view holds no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Pricing graph of one chain.
#[derive(Debug)]
pub struct PricingGraph {
    chain_id: u64,
    decimals: HashMap<Address, u8>,
    edges: RwLock<HashMap<Address, [Edge; 2]>>,
}

impl PricingGraph {
    /// Create an empty graph; `decimals` sizes the reference input of each
    /// token's outgoing edges.
    pub fn new(chain_id: u64, decimals: HashMap<Address, u8>) -> Self {
        Self {
            chain_id,
            decimals,
            edges: RwLock::new(HashMap::new()),
        }
    }

    /// Recompute and atomically replace both edges of a pool.
    pub fn update_pool(&self, pool: &Pool, pricing: &PoolPricing) {
        let pair = self.compute_edges(pool, pricing);
        let mut edges = self.edges.write().expect("graph lock poisoned");
        edges.insert(pool.address, pair);
    }

    /// Drop a pool's edges.
    pub fn remove_pool(&self, pool: &Address) {
        let mut edges = self.edges.write().expect("graph lock poisoned");
        edges.remove(pool);
    }

    /// Snapshot the graph for a detector run.
    pub fn view(&self) -> GraphView {
        let edges = self.edges.read().expect("graph lock poisoned");
        let mut flat = Vec::with_capacity(edges.len() * 2);
        for pair in edges.values() {
            flat.extend(pair.iter().cloned());
        }
        GraphView {
            chain_id: self.chain_id,
            edges: flat,
        }
    }

    /// Number of pools currently contributing edges.
    pub fn pool_count(&self) -> usize {
        self.edges.read().expect("graph lock poisoned").len()
    }

    fn reference_input(&self, token: &Address) -> U256 {
        let decimals = self.decimals.get(token).copied().unwrap_or(18);
        U256::from(10u64).pow(U256::from(decimals))
    }

    fn compute_edges(&self, pool: &Pool, pricing: &PoolPricing) -> [Edge; 2] {
        let (reserve0, reserve1) = match pricing {
            PoolPricing::V2 { reserve0, reserve1 } => (*reserve0, *reserve1),
            PoolPricing::V3 {
                sqrt_price_x96,
                liquidity,
            } => quote::v3_virtual_reserves(*sqrt_price_x96, *liquidity),
            PoolPricing::Spot { .. } => (U256::ZERO, U256::ZERO),
        };

        let (in01, out01, in10, out10) = match pricing {
            PoolPricing::Spot {
                zero_to_one,
                one_to_zero,
            } => (
                zero_to_one.amount_in,
                zero_to_one.amount_out,
                one_to_zero.amount_in,
                one_to_zero.amount_out,
            ),
            _ => (reserve0, reserve1, reserve1, reserve0),
        };

        let forward = self.make_edge(pool, pool.token0, pool.token1, true, in01, out01);
        let backward = self.make_edge(pool, pool.token1, pool.token0, false, in10, out10);
        [forward, backward]
    }

    fn make_edge(
        &self,
        pool: &Pool,
        from: Address,
        to: Address,
        zero_for_one: bool,
        reserve_in: U256,
        reserve_out: U256,
    ) -> Edge {
        let weight = quote::edge_weight(
            pool.family,
            pool.fee_bps,
            reserve_in,
            reserve_out,
            self.reference_input(&from),
        );

        Edge {
            pool: pool.address,
            family: pool.family,
            router: pool.router,
            from,
            to,
            fee_bps: pool.fee_bps,
            fee_tier_pips: pool.fee_tier_pips,
            stable: pool.stable,
            zero_for_one,
            reserve_in,
            reserve_out,
            weight,
        }
    }
}
