//! Negative-cycle search over the pricing graph.
//!
//! Bellman–Ford from a designated source token: |V|−1 relaxation rounds,
//! then one extra pass over the edges. Any edge that still relaxes sits on
//! or downstream of a negative cycle; walking the predecessor chain |V|
//! steps lands inside the cycle, which is then traced until the first
//! vertex repeats.

use std::collections::{HashMap, HashSet};

use alloy::primitives::Address;

use crate::graph::GraphView;

/// Relaxation slack; weights are floats, exact zero-cycles are not profit.
const EPS: f64 = 1e-12;

/// Find negative cycles reachable from `source`. Returns cycles as edge
/// index sequences in forward traversal order, deduplicated by rotation.
pub fn negative_cycles(view: &GraphView, source: Address) -> Vec<Vec<usize>> {
    let vertices: Vec<Address> = view.vertices().into_iter().collect();
    let index: HashMap<Address, usize> = vertices
        .iter()
        .enumerate()
        .map(|(i, a)| (*a, i))
        .collect();
    let n = vertices.len();

    let Some(&src) = index.get(&source) else {
        return Vec::new();
    };

    let mut dist = vec![f64::INFINITY; n];
    let mut pred: Vec<Option<usize>> = vec![None; n];
    dist[src] = 0.0;

    for _ in 0..n.saturating_sub(1) {
        let mut changed = false;
        for (edge_index, edge) in view.edges.iter().enumerate() {
            if edge.weight.is_infinite() {
                continue;
            }
            let u = index[&edge.from];
            let v = index[&edge.to];
            if dist[u].is_finite() && dist[u] + edge.weight < dist[v] - EPS {
                dist[v] = dist[u] + edge.weight;
                pred[v] = Some(edge_index);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut cycles = Vec::new();
    let mut seen: HashSet<Vec<usize>> = HashSet::new();

    for (edge_index, edge) in view.edges.iter().enumerate() {
        if edge.weight.is_infinite() {
            continue;
        }
        let u = index[&edge.from];
        let v = index[&edge.to];
        if !dist[u].is_finite() || dist[u] + edge.weight >= dist[v] - EPS {
            continue;
        }

        // This edge still improves: recover the cycle it witnesses.
        let mut pred_local = pred.clone();
        pred_local[v] = Some(edge_index);

        if let Some(cycle) = recover_cycle(view, &index, &pred_local, v, n) {
            let canonical = canonicalize(&cycle);
            if seen.insert(canonical) {
                cycles.push(cycle);
            }
        }
    }

    cycles
}

/// Walk predecessors n steps to get inside the cycle, then collect edges
/// until the entry vertex repeats. Returns edges in forward order.
fn recover_cycle(
    view: &GraphView,
    index: &HashMap<Address, usize>,
    pred: &[Option<usize>],
    start: usize,
    n: usize,
) -> Option<Vec<usize>> {
    let mut cursor = start;
    for _ in 0..n {
        let edge_index = pred[cursor]?;
        cursor = index[&view.edges[edge_index].from];
    }

    let anchor = cursor;
    let mut reversed = Vec::new();
    loop {
        let edge_index = pred[cursor]?;
        reversed.push(edge_index);
        cursor = index[&view.edges[edge_index].from];
        if cursor == anchor {
            break;
        }
        if reversed.len() > n {
            // Predecessor chain is inconsistent; give up on this witness.
            return None;
        }
    }

    reversed.reverse();
    Some(reversed)
}

/// Rotate a cycle so its smallest edge index comes first, giving every
/// rotation of the same cycle one canonical spelling.
fn canonicalize(cycle: &[usize]) -> Vec<usize> {
    let Some(min_position) = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, edge)| **edge)
        .map(|(position, _)| position)
    else {
        return Vec::new();
    };
    let mut rotated = cycle.to_vec();
    rotated.rotate_left(min_position);
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use crate::registry::DexFamily;
    use alloy::primitives::U256;

    fn edge(pool_byte: u8, from: Address, to: Address, weight: f64) -> Edge {
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
            weight,
        }
    }

    fn tokens() -> (Address, Address, Address) {
        (
            Address::repeat_byte(0x01),
            Address::repeat_byte(0x02),
            Address::repeat_byte(0x03),
        )
    }

    #[test]
    fn finds_a_negative_triangle() {
        let (a, b, c) = tokens();
        // Cycle weight: 0.1 + 0.1 - 0.3 = -0.1 < 0.
        let view = GraphView {
            chain_id: 1,
            edges: vec![
                edge(0x10, a, b, 0.1),
                edge(0x11, b, c, 0.1),
                edge(0x12, c, a, -0.3),
            ],
        };

        let cycles = negative_cycles(&view, a);
        assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.len(), 3);

        // Edges chain correctly and close the loop.
        for pair in cycle.windows(2) {
            assert_eq!(view.edges[pair[0]].to, view.edges[pair[1]].from);
        }
        assert_eq!(
            view.edges[cycle[cycle.len() - 1]].to,
            view.edges[cycle[0]].from
        );
    }

    #[test]
    fn ignores_nonnegative_cycles() {
        let (a, b, c) = tokens();
        // Total weight +0.1: no arbitrage.
        let view = GraphView {
            chain_id: 1,
            edges: vec![
                edge(0x10, a, b, 0.2),
                edge(0x11, b, c, 0.2),
                edge(0x12, c, a, -0.3),
            ],
        };

        assert!(negative_cycles(&view, a).is_empty());
    }

    #[test]
    fn empty_graph_and_unknown_source_return_nothing() {
        let view = GraphView::default();
        assert!(negative_cycles(&view, Address::repeat_byte(0x01)).is_empty());

        let (a, b, _) = tokens();
        let view = GraphView {
            chain_id: 1,
            edges: vec![edge(0x10, a, b, 0.1)],
        };
        assert!(negative_cycles(&view, Address::repeat_byte(0x99)).is_empty());
    }

    #[test]
    fn infinite_edges_do_not_participate() {
        let (a, b, c) = tokens();
        let view = GraphView {
            chain_id: 1,
            edges: vec![
                edge(0x10, a, b, 0.1),
                edge(0x11, b, c, f64::INFINITY),
                edge(0x12, c, a, -0.5),
            ],
        };

        assert!(negative_cycles(&view, a).is_empty());
    }

    #[test]
    fn duplicate_witnesses_collapse_to_one_cycle() {
        let (a, b, c) = tokens();
        // A strongly negative triangle; several edges will still relax in
        // the extra pass, all witnessing the same cycle.
        let view = GraphView {
            chain_id: 1,
            edges: vec![
                edge(0x10, a, b, -0.2),
                edge(0x11, b, c, -0.2),
                edge(0x12, c, a, -0.2),
            ],
        };

        let cycles = negative_cycles(&view, a);
        assert_eq!(cycles.len(), 1);
    }
}
