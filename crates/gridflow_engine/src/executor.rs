// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executors: walk a scheduled order and run modules.
//!
//! The serial executor runs the order one module at a time. The parallel
//! executor runs independent modules on scoped worker threads, in waves:
//! a module starts only after every upstream dependency's wave finished.
//! Transfer slots are mutex-guarded, so a send on one thread happens
//! before the downstream read on another.

use gridflow_network::{AlgorithmError, ExecutionState, ModuleError, ModuleId, Network};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of one network run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// The scheduled order that was walked.
    pub order: Vec<ModuleId>,
    /// Modules that reached `Completed`.
    pub completed: Vec<ModuleId>,
    /// Modules whose execution raised a condition, with the condition.
    pub failed: Vec<(ModuleId, ModuleError)>,
}

impl RunReport {
    /// Whether every scheduled module completed.
    pub fn all_completed(&self) -> bool {
        self.failed.is_empty() && self.completed.len() == self.order.len()
    }

    /// The condition a module failed with, if it failed.
    pub fn failure(&self, id: &ModuleId) -> Option<&ModuleError> {
        self.failed
            .iter()
            .find(|(m, _)| m == id)
            .map(|(_, e)| e)
    }
}

/// Cooperative cancellation flag for a run in progress. Modules already
/// completed keep their outputs; modules not yet started never run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs a scheduled order against a network.
pub trait NetworkExecutor {
    /// Execute `order`, honoring `cancel` between module starts.
    fn execute(&self, network: &Network, order: &[ModuleId], cancel: &CancellationToken)
        -> RunReport;
}

/// Drive one module through its per-run state machine.
fn run_module(network: &Network, id: &ModuleId) -> Option<Result<(), ModuleError>> {
    let handle = network.module(id)?;
    let result = {
        let mut module = handle.lock();
        module.set_exec_state(ExecutionState::JustStarted);
        tracing::debug!(module = %id, "executing");
        match module.execute() {
            Ok(()) => {
                module.set_exec_state(ExecutionState::Completed);
                Ok(())
            }
            Err(e) => {
                // Failed modules never send, so downstream consumers see
                // their inputs as absent rather than stale. Back to
                // NeedData: a failed module is not "running".
                module.set_exec_state(ExecutionState::NeedData);
                Err(e)
            }
        }
    };
    if let Err(e) = &result {
        // Raise the error signal with the module lock released, so an
        // observer may lock the module from inside its callback.
        let events = handle.lock().events_handle();
        tracing::error!(module = %id, "{e}");
        events.error.emit(id);
    }
    Some(result)
}

/// Runs the order fully sequentially.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

impl NetworkExecutor for SerialExecutor {
    fn execute(
        &self,
        network: &Network,
        order: &[ModuleId],
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut report = RunReport {
            order: order.to_vec(),
            ..RunReport::default()
        };
        for id in order {
            if cancel.is_cancelled() {
                tracing::debug!(module = %id, "run cancelled before start");
                break;
            }
            match run_module(network, id) {
                Some(Ok(())) => report.completed.push(id.clone()),
                Some(Err(e)) => report.failed.push((id.clone(), e)),
                None => {}
            }
        }
        report
    }
}

/// Runs independent modules concurrently, in dependency waves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelExecutor;

impl ParallelExecutor {
    /// Group the order into waves: each module lands one wave after its
    /// deepest upstream dependency.
    fn waves(network: &Network, order: &[ModuleId]) -> Vec<Vec<ModuleId>> {
        let mut upstream: HashMap<&ModuleId, Vec<&ModuleId>> = HashMap::new();
        for connection in network.connections() {
            let cid = connection.id();
            upstream
                .entry(&cid.to_module)
                .or_default()
                .push(&cid.from_module);
        }

        let mut depth: HashMap<&ModuleId, usize> = HashMap::new();
        let mut waves: Vec<Vec<ModuleId>> = Vec::new();
        for id in order {
            let d = upstream
                .get(id)
                .map(|ups| {
                    ups.iter()
                        .filter_map(|u| depth.get(u))
                        .max()
                        .map_or(0, |m| m + 1)
                })
                .unwrap_or(0);
            depth.insert(id, d);
            if waves.len() <= d {
                waves.resize_with(d + 1, Vec::new);
            }
            waves[d].push(id.clone());
        }
        waves
    }
}

impl NetworkExecutor for ParallelExecutor {
    fn execute(
        &self,
        network: &Network,
        order: &[ModuleId],
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut report = RunReport {
            order: order.to_vec(),
            ..RunReport::default()
        };

        for wave in Self::waves(network, order) {
            if cancel.is_cancelled() {
                break;
            }
            let mut outcomes: Vec<(ModuleId, Option<Result<(), ModuleError>>)> =
                std::thread::scope(|scope| {
                    let mut handles = Vec::new();
                    for id in &wave {
                        if cancel.is_cancelled() {
                            break;
                        }
                        handles.push((id.clone(), scope.spawn(move || run_module(network, id))));
                    }
                    handles
                        .into_iter()
                        .map(|(id, join)| match join.join() {
                            Ok(outcome) => (id, outcome),
                            Err(_) => (
                                id,
                                Some(Err(ModuleError::Algorithm(AlgorithmError::new(
                                    "module panicked during execution",
                                )))),
                            ),
                        })
                        .collect()
                });

            for (id, outcome) in outcomes.drain(..) {
                match outcome {
                    Some(Ok(())) => report.completed.push(id),
                    Some(Err(e)) => report.failed.push((id, e)),
                    None => {}
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Scheduler, TopologicalScheduler};
    use gridflow_network::library::standard_registry;
    use gridflow_network::{ModuleFactory, PortId};

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_waves_follow_dependency_depth() {
        let registry = standard_registry();
        let mut net = Network::new();
        let src = net.add_module(registry.create("CreateMatrix").unwrap());
        let mid = net.add_module(registry.create("EvaluateLinearAlgebraBinary").unwrap());
        let other = net.add_module(registry.create("CreateLatVol").unwrap());
        net.add_connection(
            &src,
            &PortId::new(0, "EnteredMatrix"),
            &mid,
            &PortId::new(0, "LHS"),
        )
        .unwrap();
        net.add_connection(
            &src,
            &PortId::new(0, "EnteredMatrix"),
            &mid,
            &PortId::new(0, "RHS"),
        )
        .unwrap();

        let order = TopologicalScheduler.schedule(&net).unwrap();
        let waves = ParallelExecutor::waves(&net, &order);
        assert_eq!(waves, vec![vec![src, other], vec![mid]]);
    }

    #[test]
    fn test_error_observer_may_lock_the_failed_module() {
        use gridflow_network::ExecutionState;
        use parking_lot::Mutex;
        use std::sync::Arc;

        let registry = standard_registry();
        let mut net = Network::new();
        // Required input left unconnected, so execution fails.
        let id = net.add_module(registry.create("ReportMatrixInfo").unwrap());

        let handle = net.module(&id).unwrap().clone();
        let seen: Arc<Mutex<Vec<ExecutionState>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observed = handle.clone();
        handle.lock().events_handle().error.subscribe(move |_| {
            sink.lock().push(observed.lock().exec_state());
        });

        let order = TopologicalScheduler.schedule(&net).unwrap();
        let report = SerialExecutor.execute(&net, &order, &CancellationToken::new());

        assert!(report.failure(&id).is_some());
        assert_eq!(seen.lock().as_slice(), &[ExecutionState::NeedData]);
        assert_eq!(handle.lock().exec_state(), ExecutionState::NeedData);
    }

    #[test]
    fn test_serial_executor_skips_after_cancel() {
        let registry = standard_registry();
        let mut net = Network::new();
        net.add_module(registry.create("CreateMatrix").unwrap());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let order = TopologicalScheduler.schedule(&net).unwrap();
        let report = SerialExecutor.execute(&net, &order, &cancel);
        assert!(report.completed.is_empty());
        assert!(report.failed.is_empty());
        assert!(!report.all_completed());
    }
}
