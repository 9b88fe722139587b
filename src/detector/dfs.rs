//! Bounded-depth cycle enumeration from the source token.
//!
//! Complements the negative-cycle search: short cycles whose weights do not
//! dominate the shortest-path tree still get quoted. Cycles are simple (no
//! intermediate vertex repeats) and a pool contributes at most one hop.

use std::collections::{HashMap, HashSet};

use alloy::primitives::Address;

use crate::graph::GraphView;

/// Enumerate cycles of length 2..=`max_len` starting and ending at
/// `source`. Returns edge index sequences in traversal order.
pub fn source_cycles(
    view: &GraphView,
    adjacency: &HashMap<Address, Vec<usize>>,
    source: Address,
    max_len: usize,
) -> Vec<Vec<usize>> {
    let mut cycles = Vec::new();
    if max_len < 2 || !adjacency.contains_key(&source) {
        return cycles;
    }

    let mut path = Vec::with_capacity(max_len);
    let mut used_pools = HashSet::new();
    let mut visited = HashSet::new();
    visited.insert(source);

    extend(
        view,
        adjacency,
        source,
        source,
        max_len,
        &mut path,
        &mut used_pools,
        &mut visited,
        &mut cycles,
    );

    cycles
}

#[allow(clippy::too_many_arguments)]
fn extend(
    view: &GraphView,
    adjacency: &HashMap<Address, Vec<usize>>,
    source: Address,
    current: Address,
    max_len: usize,
    path: &mut Vec<usize>,
    used_pools: &mut HashSet<Address>,
    visited: &mut HashSet<Address>,
    cycles: &mut Vec<Vec<usize>>,
) {
    let Some(out_edges) = adjacency.get(&current) else {
        return;
    };

    for &edge_index in out_edges {
        let edge = &view.edges[edge_index];
        if edge.weight.is_infinite() || used_pools.contains(&edge.pool) {
            continue;
        }

        if edge.to == source {
            if path.len() + 1 >= 2 {
                let mut cycle = path.clone();
                cycle.push(edge_index);
                cycles.push(cycle);
            }
            continue;
        }

        if path.len() + 1 >= max_len || visited.contains(&edge.to) {
            continue;
        }

        path.push(edge_index);
        used_pools.insert(edge.pool);
        visited.insert(edge.to);

        extend(
            view, adjacency, source, edge.to, max_len, path, used_pools, visited, cycles,
        );

        visited.remove(&edge.to);
        used_pools.remove(&edge.pool);
        path.pop();
    }
}
