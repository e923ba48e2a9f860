// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic topological scheduling.
//!
//! The order is a valid topological order of the module graph, with ties
//! among unconstrained modules broken by creation order. The same graph
//! always yields the same order.

use gridflow_network::{ModuleId, Network};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, BTreeSet};
use thiserror::Error;

/// The graph cannot be linearized: a cycle exists, and `module` is one of
/// its members.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("graph contains a cycle involving {module}")]
pub struct CycleError {
    /// A module participating in the cycle.
    pub module: ModuleId,
}

/// Computes an execution order over a network.
pub trait Scheduler {
    /// Linearize the module graph, or fail with [`CycleError`].
    fn schedule(&self, network: &Network) -> Result<Vec<ModuleId>, CycleError>;
}

/// Kahn's algorithm with a creation-order tie-break.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologicalScheduler;

impl Scheduler for TopologicalScheduler {
    fn schedule(&self, network: &Network) -> Result<Vec<ModuleId>, CycleError> {
        let ids: Vec<ModuleId> = network.module_ids().cloned().collect();
        let n = ids.len();

        // Module-level edges, deduplicated: parallel connections between
        // the same pair induce one constraint.
        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut indegree = vec![0usize; n];
        for connection in network.connections() {
            let cid = connection.id();
            let (Some(from), Some(to)) = (
                network.creation_index(&cid.from_module),
                network.creation_index(&cid.to_module),
            ) else {
                continue;
            };
            if successors[from].insert(to) {
                indegree[to] += 1;
            }
        }

        // Min-heap over creation index: the earliest-created ready module
        // runs first.
        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(current)) = ready.pop() {
            order.push(ids[current].clone());
            for &next in &successors[current] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < n {
            // A stalled sort leaves the cycle members plus anything
            // downstream of them. Peel nodes that cannot sit on a cycle
            // (no surviving successor), then walk successors until a node
            // repeats; the repeated stretch is an actual cycle.
            let mut remaining: Vec<bool> = indegree.iter().map(|d| *d > 0).collect();
            loop {
                let mut peeled = false;
                for i in 0..n {
                    if remaining[i] && successors[i].iter().all(|s| !remaining[*s]) {
                        remaining[i] = false;
                        peeled = true;
                    }
                }
                if !peeled {
                    break;
                }
            }

            let Some(start) = (0..n).find(|i| remaining[*i]) else {
                unreachable!("a stalled sort always leaves a cycle");
            };
            let mut visited_at = vec![usize::MAX; n];
            let mut path = Vec::new();
            let mut current = start;
            let member = loop {
                if visited_at[current] != usize::MAX {
                    let cycle = &path[visited_at[current]..];
                    break cycle.iter().copied().min().unwrap_or(current);
                }
                visited_at[current] = path.len();
                path.push(current);
                current = match successors[current].iter().find(|s| remaining[**s]) {
                    Some(next) => *next,
                    // Peeling only keeps nodes with a surviving successor.
                    None => unreachable!("peeled nodes keep a successor"),
                };
            };
            return Err(CycleError {
                module: ids[member].clone(),
            });
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridflow_network::library::standard_registry;
    use gridflow_network::{ModuleFactory, Network, PortId};

    fn chain() -> (Network, ModuleId, ModuleId, ModuleId) {
        let registry = standard_registry();
        let mut net = Network::new();
        let a = net.add_module(registry.create("CreateMatrix").unwrap());
        let b = net.add_module(registry.create("EvaluateLinearAlgebraBinary").unwrap());
        let c = net.add_module(registry.create("ReportMatrixInfo").unwrap());
        net.add_connection(
            &a,
            &PortId::new(0, "EnteredMatrix"),
            &b,
            &PortId::new(0, "LHS"),
        )
        .unwrap();
        net.add_connection(
            &a,
            &PortId::new(0, "EnteredMatrix"),
            &b,
            &PortId::new(0, "RHS"),
        )
        .unwrap();
        net.add_connection(
            &b,
            &PortId::new(0, "Result"),
            &c,
            &PortId::new(0, "InputMatrix"),
        )
        .unwrap();
        (net, a, b, c)
    }

    #[test]
    fn test_linear_chain_order() {
        let (net, a, b, c) = chain();
        let order = TopologicalScheduler.schedule(&net).unwrap();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let (net, ..) = chain();
        let first = TopologicalScheduler.schedule(&net).unwrap();
        for _ in 0..10 {
            assert_eq!(TopologicalScheduler.schedule(&net).unwrap(), first);
        }
    }

    #[test]
    fn test_source_still_precedes_after_edge_removal() {
        let (mut net, a, b, c) = chain();
        let bc = gridflow_network::ConnectionId::new(
            b.clone(),
            PortId::new(0, "Result"),
            c.clone(),
            PortId::new(0, "InputMatrix"),
        );
        net.remove_connection(&bc).unwrap();

        let order = TopologicalScheduler.schedule(&net).unwrap();
        let pos =
            |id: &ModuleId| order.iter().position(|m| m == id).expect("module scheduled");
        assert!(pos(&a) < pos(&b));
        assert!(pos(&a) < pos(&c));
    }

    #[test]
    fn test_cycle_reported_with_member() {
        let registry = standard_registry();
        let mut net = Network::new();
        let a = net.add_module(registry.create("EvaluateLinearAlgebraBinary").unwrap());
        let b = net.add_module(registry.create("EvaluateLinearAlgebraBinary").unwrap());
        net.add_connection(&a, &PortId::new(0, "Result"), &b, &PortId::new(0, "LHS"))
            .unwrap();
        net.add_connection(&b, &PortId::new(0, "Result"), &a, &PortId::new(0, "LHS"))
            .unwrap();

        let err = TopologicalScheduler.schedule(&net).unwrap_err();
        assert!(err.module == a || err.module == b);
    }

    #[test]
    fn test_cycle_report_skips_downstream_modules() {
        let registry = standard_registry();
        let mut net = Network::new();
        // Created first, but only downstream of the cycle.
        let sink = net.add_module(registry.create("ReportMatrixInfo").unwrap());
        let a = net.add_module(registry.create("EvaluateLinearAlgebraBinary").unwrap());
        let b = net.add_module(registry.create("EvaluateLinearAlgebraBinary").unwrap());
        net.add_connection(&a, &PortId::new(0, "Result"), &b, &PortId::new(0, "LHS"))
            .unwrap();
        net.add_connection(&b, &PortId::new(0, "Result"), &a, &PortId::new(0, "LHS"))
            .unwrap();
        net.add_connection(
            &a,
            &PortId::new(0, "Result"),
            &sink,
            &PortId::new(0, "InputMatrix"),
        )
        .unwrap();

        let err = TopologicalScheduler.schedule(&net).unwrap_err();
        assert_ne!(err.module, sink);
        assert!(err.module == a || err.module == b);
    }

    #[test]
    fn test_unconstrained_modules_run_in_creation_order() {
        let registry = standard_registry();
        let mut net = Network::new();
        let a = net.add_module(registry.create("CreateMatrix").unwrap());
        let b = net.add_module(registry.create("CreateLatVol").unwrap());
        let c = net.add_module(registry.create("CreateMatrix").unwrap());

        let order = TopologicalScheduler.schedule(&net).unwrap();
        assert_eq!(order, vec![a, b, c]);
    }
}
