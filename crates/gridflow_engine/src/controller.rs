// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network controller: the high-level command surface.
//!
//! The controller owns the network behind a mutex, creates modules through
//! a factory, and drives whole-network runs through a scheduler and an
//! executor. Hosts (editors, script bindings, tests) talk to this type
//! rather than to [`Network`] directly.

use crate::executor::{CancellationToken, NetworkExecutor, RunReport, SerialExecutor};
use crate::scheduler::{CycleError, Scheduler, TopologicalScheduler};
use gridflow_network::{
    ConnectionId, ExecutionState, ModuleFactory, ModuleHandle, ModuleId, Network, NetworkError,
    PortId, Subscription, TransientValue,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// High-level command surface over one network.
pub struct Controller {
    network: Mutex<Network>,
    factory: Arc<dyn ModuleFactory>,
    scheduler: Box<dyn Scheduler + Send + Sync>,
}

impl Controller {
    /// A controller over an empty network, scheduling topologically.
    pub fn new(factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            network: Mutex::new(Network::new()),
            factory,
            scheduler: Box::new(TopologicalScheduler),
        }
    }

    /// Swap in a different scheduling strategy.
    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler + Send + Sync>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Create a module of the named type and add it to the network.
    pub fn add_module(&self, type_name: &str) -> Result<ModuleId, NetworkError> {
        let handle = self.factory.create(type_name)?;
        let id = self.network.lock().add_module(handle);
        tracing::info!(module = %id, "module added");
        Ok(id)
    }

    /// Remove a module, severing its connections first.
    pub fn remove_module(&self, id: &ModuleId) -> Result<(), NetworkError> {
        self.network.lock().remove_module(id)?;
        tracing::info!(module = %id, "module removed");
        Ok(())
    }

    /// Connect an output port to an input port.
    pub fn add_connection(
        &self,
        from: &ModuleId,
        from_port: &PortId,
        to: &ModuleId,
        to_port: &PortId,
    ) -> Result<ConnectionId, NetworkError> {
        self.network
            .lock()
            .add_connection(from, from_port, to, to_port)
    }

    /// Connect by port name: the source's output named `output` to the
    /// destination's first open input named `input`. On a dynamic family
    /// the open input is the trailing vacant member.
    pub fn add_connection_by_name(
        &self,
        from: &ModuleId,
        output: &str,
        to: &ModuleId,
        input: &str,
    ) -> Result<ConnectionId, NetworkError> {
        let mut network = self.network.lock();

        let from_port = {
            let handle = network
                .module(from)
                .ok_or_else(|| NetworkError::ModuleNotFound(from.clone()))?;
            let module = handle.lock();
            module
                .find_output_ports_with_name(output)
                .first()
                .map(|p| p.id().clone())
                .ok_or_else(|| NetworkError::PortNotFound {
                    module: from.clone(),
                    port: PortId::new(0, output),
                })?
        };
        let to_port = {
            let handle = network
                .module(to)
                .ok_or_else(|| NetworkError::ModuleNotFound(to.clone()))?;
            let module = handle.lock();
            module
                .find_input_ports_with_name(input)
                .iter()
                .find(|p| !p.is_connected())
                .map(|p| p.id().clone())
                .ok_or_else(|| NetworkError::PortNotFound {
                    module: to.clone(),
                    port: PortId::new(0, input),
                })?
        };

        network.add_connection(from, &from_port, to, &to_port)
    }

    /// Remove a connection.
    pub fn remove_connection(&self, id: &ConnectionId) -> Result<(), NetworkError> {
        self.network.lock().remove_connection(id)
    }

    /// Number of modules in the network.
    pub fn nmodules(&self) -> usize {
        self.network.lock().nmodules()
    }

    /// Number of connections in the network.
    pub fn nconnections(&self) -> usize {
        self.network.lock().nconnections()
    }

    /// Shared handle to a module, if it exists.
    pub fn module(&self, id: &ModuleId) -> Option<ModuleHandle> {
        self.network.lock().module(id).cloned()
    }

    /// Run a closure against the network under the lock.
    pub fn with_network<R>(&self, f: impl FnOnce(&Network) -> R) -> R {
        f(&self.network.lock())
    }

    /// Write to a module's transient channel.
    pub fn set_transient(
        &self,
        id: &ModuleId,
        name: &str,
        value: TransientValue,
    ) -> Result<(), NetworkError> {
        let handle = self
            .module(id)
            .ok_or_else(|| NetworkError::ModuleNotFound(id.clone()))?;
        handle.lock().state_mut().set_transient(name, value);
        Ok(())
    }

    /// Read back from a module's transient channel.
    pub fn get_transient(
        &self,
        id: &ModuleId,
        name: &str,
    ) -> Result<Option<TransientValue>, NetworkError> {
        let handle = self
            .module(id)
            .ok_or_else(|| NetworkError::ModuleNotFound(id.clone()))?;
        let value = handle.lock().state().get_transient(name).cloned();
        Ok(value)
    }

    /// Observe a module's error signal. Returns the subscription token.
    pub fn on_module_error(
        &self,
        id: &ModuleId,
        callback: impl Fn(&ModuleId) + Send + Sync + 'static,
    ) -> Result<Subscription, NetworkError> {
        let handle = self
            .module(id)
            .ok_or_else(|| NetworkError::ModuleNotFound(id.clone()))?;
        let token = handle.lock().events().error.subscribe(callback);
        Ok(token)
    }

    /// Run the whole network serially, in scheduled order.
    pub fn execute_all(&self) -> Result<RunReport, CycleError> {
        self.execute_all_with(&SerialExecutor, &CancellationToken::new())
    }

    /// Run the whole network with the given executor and cancellation token.
    ///
    /// The network stays locked for the whole run, keeping structural edits
    /// out while modules execute. Signal observers fired during the run may
    /// lock individual modules but must not call back into the controller.
    pub fn execute_all_with(
        &self,
        executor: &dyn NetworkExecutor,
        cancel: &CancellationToken,
    ) -> Result<RunReport, CycleError> {
        let network = self.network.lock();
        let order = self.scheduler.schedule(&network)?;
        tracing::info!(modules = order.len(), "network run scheduled");

        // Fresh run: stale transfer data from the previous run must never
        // satisfy this run's inputs.
        network.clear_all_data();
        for id in &order {
            if let Some(handle) = network.module(id) {
                handle.lock().set_exec_state(ExecutionState::NeedData);
            }
        }

        let report = executor.execute(&network, &order, cancel);
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "network run finished"
        );
        Ok(report)
    }
}
