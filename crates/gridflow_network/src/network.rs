// SPDX-License-Identifier: MIT OR Apache-2.0
//! The network: owned collection of module instances and connections.
//!
//! All structural invariants are enforced here: every connection's
//! endpoints reference live modules, failed mutations leave nothing
//! half-attached, and module ids are never reused.

use crate::connection::{Connection, ConnectionId};
use crate::module::{ModuleError, ModuleHandle, ModuleId};
use crate::port::{PortId, PortType};
use indexmap::IndexMap;
use std::collections::HashMap;
use thiserror::Error;

/// Structural errors raised by network mutations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    /// Referenced module is not in the network.
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleId),

    /// Referenced port does not exist on the module.
    #[error("port not found: {port} on {module}")]
    PortNotFound {
        /// The module searched.
        module: ModuleId,
        /// The missing port.
        port: PortId,
    },

    /// The two endpoint type tags cannot be connected.
    #[error("incompatible port types: {from:?} -> {to:?}")]
    IncompatiblePorts {
        /// Source tag.
        from: PortType,
        /// Destination tag.
        to: PortType,
    },

    /// The destination input already holds a connection.
    #[error("port already connected: {port} on {module}")]
    PortAlreadyConnected {
        /// The destination module.
        module: ModuleId,
        /// The filled port.
        port: PortId,
    },

    /// Source and destination are the same module.
    #[error("self-loop not allowed on {0}")]
    SelfLoop(ModuleId),

    /// An identical connection already exists.
    #[error("duplicate connection: {0}")]
    DuplicateConnection(ConnectionId),

    /// Referenced connection is not live (possibly removed twice).
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// The factory has no module type registered under this name.
    #[error("unknown module type: {0}")]
    UnknownModuleType(String),

    /// Module construction failed inside the factory.
    #[error("module construction failed: {0}")]
    ModuleConstruction(#[from] ModuleError),
}

/// The dataflow graph: modules keyed by id, connections keyed by their
/// endpoint 4-tuple. Iteration order is creation order, which downstream
/// scheduling relies on for determinism.
#[derive(Default)]
pub struct Network {
    modules: IndexMap<ModuleId, ModuleHandle>,
    connections: IndexMap<ConnectionId, Connection>,
    // Per-type-name counters; monotonic so ids are never reused.
    instance_counters: HashMap<String, usize>,
}

impl Network {
    /// An empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of module instances.
    pub fn nmodules(&self) -> usize {
        self.modules.len()
    }

    /// Number of live connections.
    pub fn nconnections(&self) -> usize {
        self.connections.len()
    }

    /// Insert a module, assigning its unique instance id.
    pub fn add_module(&mut self, handle: ModuleHandle) -> ModuleId {
        let name = handle.lock().name().to_owned();
        let counter = self.instance_counters.entry(name.clone()).or_insert(0);
        let id = ModuleId::new(name, *counter);
        *counter += 1;

        handle.lock().set_id(id.clone());
        self.modules.insert(id.clone(), handle);
        id
    }

    /// Look up a module handle.
    pub fn module(&self, id: &ModuleId) -> Option<&ModuleHandle> {
        self.modules.get(id)
    }

    /// Module ids in creation order.
    pub fn module_ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.keys()
    }

    /// All modules with their ids, in creation order.
    pub fn modules(&self) -> impl Iterator<Item = (&ModuleId, &ModuleHandle)> {
        self.modules.iter()
    }

    /// Position of a module in creation order.
    pub fn creation_index(&self, id: &ModuleId) -> Option<usize> {
        self.modules.get_index_of(id)
    }

    /// Look up a live connection.
    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Whether a connection is live.
    pub fn has_connection(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// All live connections in creation order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Live connections touching a module.
    pub fn connections_touching<'a>(
        &'a self,
        id: &'a ModuleId,
    ) -> impl Iterator<Item = &'a Connection> {
        self.connections.values().filter(|c| c.involves_module(id))
    }

    /// Wire an output port to an input port.
    ///
    /// All validation happens before any mutation, so a failure leaves the
    /// network untouched. On success both endpoint ports record the
    /// connection, and a dynamic destination grows its next vacant member.
    pub fn add_connection(
        &mut self,
        from_module: &ModuleId,
        from_port: &PortId,
        to_module: &ModuleId,
        to_port: &PortId,
    ) -> Result<ConnectionId, NetworkError> {
        if from_module == to_module {
            return Err(NetworkError::SelfLoop(from_module.clone()));
        }
        let source = self
            .modules
            .get(from_module)
            .ok_or_else(|| NetworkError::ModuleNotFound(from_module.clone()))?;
        let dest = self
            .modules
            .get(to_module)
            .ok_or_else(|| NetworkError::ModuleNotFound(to_module.clone()))?;

        let id = ConnectionId::new(
            from_module.clone(),
            from_port.clone(),
            to_module.clone(),
            to_port.clone(),
        );
        if self.connections.contains_key(&id) {
            return Err(NetworkError::DuplicateConnection(id));
        }

        // Distinct modules, so locking both is deadlock-free under the
        // network-wide mutation lock.
        let mut source = source.lock();
        let mut dest = dest.lock();

        let from_type = source
            .output_port(from_port)
            .map_err(|_| NetworkError::PortNotFound {
                module: from_module.clone(),
                port: from_port.clone(),
            })?
            .port_type();
        let to = dest
            .input_port(to_port)
            .map_err(|_| NetworkError::PortNotFound {
                module: to_module.clone(),
                port: to_port.clone(),
            })?;
        let to_type = to.port_type();
        let to_dynamic = to.is_dynamic();
        let to_name = to.name().to_owned();

        if !from_type.can_connect_to(&to_type) {
            return Err(NetworkError::IncompatiblePorts {
                from: from_type,
                to: to_type,
            });
        }
        // Every input member holds at most one connection, dynamic families
        // included; new edges land on the trailing vacant member.
        if to.is_connected() {
            return Err(NetworkError::PortAlreadyConnected {
                module: to_module.clone(),
                port: to_port.clone(),
            });
        }

        let connection = Connection::new(id.clone());
        let slot = connection.slot().clone();

        if let Ok(port) = source.oports_mut().get_mut(from_port) {
            port.attach(id.clone(), slot.clone());
        }
        if let Ok(port) = dest.iports_mut().get_mut(to_port) {
            port.attach(id.clone(), slot);
        }
        if to_dynamic {
            dest.iports_mut().ensure_trailing_spare(&to_name);
        }

        drop(source);
        drop(dest);
        self.connections.insert(id.clone(), connection);
        tracing::debug!(connection = %id, "connection added");
        Ok(id)
    }

    /// Destroy a connection: detaches both endpoints, irreversibly.
    /// Removing an already-removed id is an error.
    pub fn remove_connection(&mut self, id: &ConnectionId) -> Result<(), NetworkError> {
        let connection = self
            .connections
            .shift_remove(id)
            .ok_or_else(|| NetworkError::ConnectionNotFound(id.clone()))?;
        connection.clear_data();

        if let Some(source) = self.modules.get(&id.from_module) {
            let mut source = source.lock();
            if let Ok(port) = source.oports_mut().get_mut(&id.from_port) {
                port.detach(id);
            }
        }
        if let Some(dest) = self.modules.get(&id.to_module) {
            let mut dest = dest.lock();
            let dynamic_name = dest
                .input_port(&id.to_port)
                .ok()
                .filter(|p| p.is_dynamic())
                .map(|p| p.name().to_owned());
            if let Ok(port) = dest.iports_mut().get_mut(&id.to_port) {
                port.detach(id);
            }
            if let Some(name) = dynamic_name {
                dest.iports_mut().compact_family(&name);
            }
        }
        tracing::debug!(connection = %id, "connection removed");
        Ok(())
    }

    /// Remove a module, severing every touching connection first so no
    /// connection ever references a removed module.
    pub fn remove_module(&mut self, id: &ModuleId) -> Result<ModuleHandle, NetworkError> {
        if !self.modules.contains_key(id) {
            return Err(NetworkError::ModuleNotFound(id.clone()));
        }
        let touching: Vec<ConnectionId> = self
            .connections_touching(id)
            .map(|c| c.id().clone())
            .collect();
        for cid in &touching {
            self.remove_connection(cid)?;
        }

        // Checked present above; shift keeps creation order for the rest.
        match self.modules.shift_remove(id) {
            Some(handle) => {
                tracing::debug!(module = %id, "module removed");
                Ok(handle)
            }
            None => Err(NetworkError::ModuleNotFound(id.clone())),
        }
    }

    /// Drop all in-flight data from every connection, so a new run never
    /// observes stale values.
    pub fn clear_all_data(&self) {
        for connection in self.connections.values() {
            connection.clear_data();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{AlgorithmInput, AlgorithmOutput, FnAlgorithm};
    use crate::datatype::{Datatype, DenseMatrix, Matrix};
    use crate::module::{Module, ModuleBuilder};
    use crate::port::{PortDescription, PortType};
    use crate::state::ModuleState;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn handle(module: Module) -> ModuleHandle {
        Arc::new(Mutex::new(module))
    }

    fn source_module() -> ModuleHandle {
        handle(
            ModuleBuilder::new()
                .with_name("CreateMatrix")
                .using(Box::new(FnAlgorithm(
                    |_: &AlgorithmInput, _: &mut ModuleState| Ok(AlgorithmOutput::new()),
                )))
                .add_output_port(PortDescription::new("EnteredMatrix", PortType::Matrix))
                .build()
                .unwrap(),
        )
    }

    fn sink_module() -> ModuleHandle {
        handle(
            ModuleBuilder::new()
                .with_name("ReportMatrixInfo")
                .using(Box::new(FnAlgorithm(
                    |_: &AlgorithmInput, _: &mut ModuleState| Ok(AlgorithmOutput::new()),
                )))
                .add_input_port(PortDescription::new("InputMatrix", PortType::Matrix))
                .build()
                .unwrap(),
        )
    }

    fn dynamic_sink_module() -> ModuleHandle {
        handle(
            ModuleBuilder::new()
                .with_name("AppendMatrix")
                .using(Box::new(FnAlgorithm(
                    |_: &AlgorithmInput, _: &mut ModuleState| Ok(AlgorithmOutput::new()),
                )))
                .add_input_port(PortDescription::new("InputMatrices", PortType::Matrix).dynamic())
                .add_output_port(PortDescription::new("ResultMatrix", PortType::Matrix))
                .build()
                .unwrap(),
        )
    }

    fn field_sink_module() -> ModuleHandle {
        handle(
            ModuleBuilder::new()
                .with_name("ShowField")
                .using(Box::new(FnAlgorithm(
                    |_: &AlgorithmInput, _: &mut ModuleState| Ok(AlgorithmOutput::new()),
                )))
                .add_input_port(PortDescription::new("Field", PortType::Field))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_module_ids_are_unique_and_never_reused() {
        let mut net = Network::new();
        let a = net.add_module(source_module());
        let b = net.add_module(source_module());
        assert_eq!(a, ModuleId::new("CreateMatrix", 0));
        assert_eq!(b, ModuleId::new("CreateMatrix", 1));

        net.remove_module(&a).unwrap();
        let c = net.add_module(source_module());
        assert_eq!(c, ModuleId::new("CreateMatrix", 2));
    }

    #[test]
    fn test_valid_connection_recorded_on_both_ports() {
        let mut net = Network::new();
        let src = net.add_module(source_module());
        let dst = net.add_module(sink_module());

        let cid = net
            .add_connection(
                &src,
                &PortId::new(0, "EnteredMatrix"),
                &dst,
                &PortId::new(0, "InputMatrix"),
            )
            .unwrap();

        assert_eq!(net.nconnections(), 1);
        let src_mod = net.module(&src).unwrap().lock();
        let out = src_mod.output_port(&PortId::new(0, "EnteredMatrix")).unwrap();
        assert_eq!(out.connection_ids().collect::<Vec<_>>(), vec![&cid]);
        drop(src_mod);

        let dst_mod = net.module(&dst).unwrap().lock();
        let inp = dst_mod.input_port(&PortId::new(0, "InputMatrix")).unwrap();
        assert_eq!(inp.connection_ids().collect::<Vec<_>>(), vec![&cid]);
    }

    #[test]
    fn test_invalid_requests_leave_network_unchanged() {
        let mut net = Network::new();
        let src = net.add_module(source_module());
        let field_sink = net.add_module(field_sink_module());
        let ghost = ModuleId::new("Ghost", 0);

        // Type mismatch: Matrix -> Field.
        assert!(matches!(
            net.add_connection(
                &src,
                &PortId::new(0, "EnteredMatrix"),
                &field_sink,
                &PortId::new(0, "Field"),
            ),
            Err(NetworkError::IncompatiblePorts { .. })
        ));
        // Missing module.
        assert!(matches!(
            net.add_connection(
                &src,
                &PortId::new(0, "EnteredMatrix"),
                &ghost,
                &PortId::new(0, "Field"),
            ),
            Err(NetworkError::ModuleNotFound(_))
        ));
        // Missing port.
        assert!(matches!(
            net.add_connection(
                &src,
                &PortId::new(0, "Bogus"),
                &field_sink,
                &PortId::new(0, "Field"),
            ),
            Err(NetworkError::PortNotFound { .. })
        ));
        // Self loop.
        assert!(matches!(
            net.add_connection(
                &src,
                &PortId::new(0, "EnteredMatrix"),
                &src,
                &PortId::new(0, "EnteredMatrix"),
            ),
            Err(NetworkError::SelfLoop(_))
        ));

        assert_eq!(net.nmodules(), 2);
        assert_eq!(net.nconnections(), 0);
        let sink = net.module(&field_sink).unwrap().lock();
        assert!(!sink.input_port(&PortId::new(0, "Field")).unwrap().is_connected());
    }

    #[test]
    fn test_filled_static_input_rejects_second_connection() {
        let mut net = Network::new();
        let a = net.add_module(source_module());
        let b = net.add_module(source_module());
        let dst = net.add_module(sink_module());

        net.add_connection(
            &a,
            &PortId::new(0, "EnteredMatrix"),
            &dst,
            &PortId::new(0, "InputMatrix"),
        )
        .unwrap();
        let err = net
            .add_connection(
                &b,
                &PortId::new(0, "EnteredMatrix"),
                &dst,
                &PortId::new(0, "InputMatrix"),
            )
            .unwrap_err();

        assert!(matches!(err, NetworkError::PortAlreadyConnected { .. }));
        assert_eq!(net.nconnections(), 1);
    }

    #[test]
    fn test_output_fans_out_to_many_connections() {
        let mut net = Network::new();
        let src = net.add_module(source_module());
        let d1 = net.add_module(sink_module());
        let d2 = net.add_module(sink_module());

        net.add_connection(
            &src,
            &PortId::new(0, "EnteredMatrix"),
            &d1,
            &PortId::new(0, "InputMatrix"),
        )
        .unwrap();
        net.add_connection(
            &src,
            &PortId::new(0, "EnteredMatrix"),
            &d2,
            &PortId::new(0, "InputMatrix"),
        )
        .unwrap();

        let matrix = Datatype::Matrix(Matrix::Dense(DenseMatrix::filled(2, 2, 7.0)));
        net.module(&src)
            .unwrap()
            .lock()
            .send_output(&PortId::new(0, "EnteredMatrix"), Arc::new(matrix.clone()))
            .unwrap();

        for d in [&d1, &d2] {
            let received = net
                .module(d)
                .unwrap()
                .lock()
                .input_handle(&PortId::new(0, "InputMatrix"))
                .unwrap();
            assert_eq!(received.as_deref(), Some(&matrix));
        }
    }

    #[test]
    fn test_duplicate_connection_rejected() {
        let mut net = Network::new();
        let src = net.add_module(source_module());
        let dst = net.add_module(dynamic_sink_module());

        net.add_connection(
            &src,
            &PortId::new(0, "EnteredMatrix"),
            &dst,
            &PortId::new(0, "InputMatrices"),
        )
        .unwrap();
        let err = net
            .add_connection(
                &src,
                &PortId::new(0, "EnteredMatrix"),
                &dst,
                &PortId::new(0, "InputMatrices"),
            )
            .unwrap_err();
        // The first edge filled member 0, so the identical request now hits
        // a filled member.
        assert!(matches!(
            err,
            NetworkError::DuplicateConnection(_) | NetworkError::PortAlreadyConnected { .. }
        ));
        assert_eq!(net.nconnections(), 1);
    }

    #[test]
    fn test_dynamic_input_grows_and_exposes_trailing_vacant() {
        let mut net = Network::new();
        let a = net.add_module(source_module());
        let b = net.add_module(source_module());
        let dst = net.add_module(dynamic_sink_module());

        net.add_connection(
            &a,
            &PortId::new(0, "EnteredMatrix"),
            &dst,
            &PortId::new(0, "InputMatrices"),
        )
        .unwrap();
        net.add_connection(
            &b,
            &PortId::new(0, "EnteredMatrix"),
            &dst,
            &PortId::new(1, "InputMatrices"),
        )
        .unwrap();

        let dst_mod = net.module(&dst).unwrap().lock();
        let family = dst_mod.find_input_ports_with_name("InputMatrices");
        assert_eq!(family.len(), 3);
        assert!(family[0].is_connected());
        assert!(family[1].is_connected());
        assert!(!family[2].is_connected());

        let handles = dst_mod
            .dynamic_input_handles(&PortId::new(0, "InputMatrices"))
            .unwrap();
        assert_eq!(handles.len(), 3);
        assert!(handles[2].is_none());
    }

    #[test]
    fn test_remove_connection_detaches_and_guards_double_removal() {
        let mut net = Network::new();
        let src = net.add_module(source_module());
        let dst = net.add_module(sink_module());
        let cid = net
            .add_connection(
                &src,
                &PortId::new(0, "EnteredMatrix"),
                &dst,
                &PortId::new(0, "InputMatrix"),
            )
            .unwrap();

        net.remove_connection(&cid).unwrap();
        assert_eq!(net.nconnections(), 0);
        assert!(!net
            .module(&dst)
            .unwrap()
            .lock()
            .input_port(&PortId::new(0, "InputMatrix"))
            .unwrap()
            .is_connected());

        assert!(matches!(
            net.remove_connection(&cid),
            Err(NetworkError::ConnectionNotFound(_))
        ));
    }

    #[test]
    fn test_remove_module_severs_touching_connections() {
        let mut net = Network::new();
        let src = net.add_module(source_module());
        let dst = net.add_module(sink_module());
        net.add_connection(
            &src,
            &PortId::new(0, "EnteredMatrix"),
            &dst,
            &PortId::new(0, "InputMatrix"),
        )
        .unwrap();

        net.remove_module(&src).unwrap();
        assert_eq!(net.nmodules(), 1);
        assert_eq!(net.nconnections(), 0);
        assert!(!net
            .module(&dst)
            .unwrap()
            .lock()
            .input_port(&PortId::new(0, "InputMatrix"))
            .unwrap()
            .is_connected());
    }

    #[test]
    fn test_dynamic_family_compacts_after_disconnect() {
        let mut net = Network::new();
        let a = net.add_module(source_module());
        let b = net.add_module(source_module());
        let dst = net.add_module(dynamic_sink_module());

        let c0 = net
            .add_connection(
                &a,
                &PortId::new(0, "EnteredMatrix"),
                &dst,
                &PortId::new(0, "InputMatrices"),
            )
            .unwrap();
        net.add_connection(
            &b,
            &PortId::new(0, "EnteredMatrix"),
            &dst,
            &PortId::new(1, "InputMatrices"),
        )
        .unwrap();

        net.remove_connection(&c0).unwrap();

        let dst_mod = net.module(&dst).unwrap().lock();
        let family = dst_mod.find_input_ports_with_name("InputMatrices");
        assert_eq!(family.len(), 2);
        assert!(family[0].is_connected());
        assert!(!family[1].is_connected());
    }
}
