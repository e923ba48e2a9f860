// SPDX-License-Identifier: MIT OR Apache-2.0
//! Module instances: named, versioned computational units with typed ports,
//! a state store, and an exclusively-owned algorithm body.

use crate::algorithm::{Algorithm, AlgorithmError, AlgorithmInput, AlgorithmOutput};
use crate::datatype::{DatatypeHandle, PortData, TypedHandle};
use crate::events::ModuleEvents;
use crate::port::{Port, PortDescription, PortDirection, PortId, PortType};
use crate::port_manager::{PortManager, UnknownPortError};
use crate::state::{ModuleState, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Identifier of a module instance: the type name plus a per-network
/// sequence number. Never reused within a network's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    /// Module type name.
    pub name: String,
    /// Instance sequence number.
    pub instance: usize,
}

impl ModuleId {
    /// Create a module id.
    pub fn new(name: impl Into<String>, instance: usize) -> Self {
        Self {
            name: name.into(),
            instance,
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.instance)
    }
}

/// Factory lookup info: where a module type lives in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleLookupInfo {
    /// Package the type ships in.
    pub package: String,
    /// Category within the package.
    pub category: String,
    /// Module type name.
    pub name: String,
}

impl ModuleLookupInfo {
    /// Full lookup info.
    pub fn new(
        package: impl Into<String>,
        category: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            category: category.into(),
            name: name.into(),
        }
    }

    /// Lookup info in the default package and category.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new("GridFlow", "General", name)
    }
}

impl fmt::Display for ModuleLookupInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.category, self.name)
    }
}

/// Per-run execution state of a module, driven by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    /// Waiting for upstream data.
    #[default]
    NeedData,
    /// Picked by the controller, about to run.
    JustStarted,
    /// Running its body.
    Executing,
    /// Finished without a fatal condition.
    Completed,
}

/// Errors raised by module operations.
///
/// An absent optional input is not an error; these cover programmer errors
/// (unknown port ids, incomplete construction) and execute-time conditions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    /// Port id does not exist on this module.
    #[error(transparent)]
    UnknownPort(#[from] UnknownPortError),

    /// A required input had no data at execute time.
    #[error("no data on required port {port}")]
    PortDataMissing {
        /// The empty port.
        port: PortId,
    },

    /// The concrete value does not satisfy the declared port type.
    #[error("wrong datatype on port {port}: expected {expected:?}, received {actual:?}")]
    PortTypeMismatch {
        /// The offending port.
        port: PortId,
        /// Declared tag.
        expected: PortType,
        /// Tag of the value that arrived.
        actual: PortType,
    },

    /// Staged construction finished without a required step.
    #[error("module builder incomplete: {0}")]
    BuilderIncomplete(String),

    /// The algorithm body failed.
    #[error("algorithm failed: {0}")]
    Algorithm(#[from] AlgorithmError),
}

/// Compile-time-typed name of a static port. `T` fixes what the port sends
/// or receives; the runtime value is still subtype-checked at transfer.
#[derive(Debug, Clone)]
pub struct StaticPortName<T: PortData> {
    /// The underlying port id.
    pub id: PortId,
    _marker: PhantomData<T>,
}

impl<T: PortData> StaticPortName<T> {
    /// Name a static port at family index 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PortId::new(0, name),
            _marker: PhantomData,
        }
    }
}

/// Compile-time-typed name of a dynamic input family.
#[derive(Debug, Clone)]
pub struct DynamicPortName<T: PortData> {
    /// The id naming the family (index 0).
    pub id: PortId,
    _marker: PhantomData<T>,
}

impl<T: PortData> DynamicPortName<T> {
    /// Name a dynamic input family.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PortId::new(0, name),
            _marker: PhantomData,
        }
    }
}

/// Recompute-or-skip policy consulted before each execution. The default
/// always recomputes; fingerprint caching is a collaborator concern.
pub trait ReexecutePolicy: Send + Sync {
    /// Whether the module must recompute on this run.
    fn needs_execute(&self, module: &Module) -> bool;
}

/// The default policy: always recompute.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReexecute;

impl ReexecutePolicy for AlwaysReexecute {
    fn needs_execute(&self, _module: &Module) -> bool {
        true
    }
}

/// Shared handle to a module instance.
pub type ModuleHandle = Arc<Mutex<Module>>;

/// A module instance living in a network.
pub struct Module {
    info: ModuleLookupInfo,
    id: ModuleId,
    ui_visible: bool,
    iports: PortManager,
    oports: PortManager,
    algorithm: Box<dyn Algorithm>,
    state: ModuleState,
    exec_state: ExecutionState,
    reexecute: Box<dyn ReexecutePolicy>,
    events: Arc<ModuleEvents>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("info", &self.info)
            .field("id", &self.id)
            .field("ui_visible", &self.ui_visible)
            .field("state", &self.state)
            .field("exec_state", &self.exec_state)
            .finish_non_exhaustive()
    }
}

impl Module {
    /// Module type name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Catalog category.
    pub fn category(&self) -> &str {
        &self.info.category
    }

    /// Catalog package.
    pub fn package(&self) -> &str {
        &self.info.package
    }

    /// Full lookup info, for the persistence collaborator.
    pub fn info(&self) -> &ModuleLookupInfo {
        &self.info
    }

    /// Instance id.
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Overwrite the instance id, for the network and the persistence
    /// collaborator.
    pub fn set_id(&mut self, id: ModuleId) {
        self.id = id;
    }

    /// Whether the host should show a UI for this module.
    pub fn ui_visible(&self) -> bool {
        self.ui_visible
    }

    /// Toggle UI visibility.
    pub fn set_ui_visible(&mut self, visible: bool) {
        self.ui_visible = visible;
    }

    /// Number of concrete input ports, dynamic family members included.
    pub fn num_input_ports(&self) -> usize {
        self.iports.len()
    }

    /// Number of concrete output ports.
    pub fn num_output_ports(&self) -> usize {
        self.oports.len()
    }

    /// Whether an input port with this id exists.
    pub fn has_input_port(&self, id: &PortId) -> bool {
        self.iports.has(id)
    }

    /// Whether an output port with this id exists.
    pub fn has_output_port(&self, id: &PortId) -> bool {
        self.oports.has(id)
    }

    /// Resolve an input port.
    pub fn input_port(&self, id: &PortId) -> Result<&Port, UnknownPortError> {
        self.iports.get(id)
    }

    /// Resolve an output port.
    pub fn output_port(&self, id: &PortId) -> Result<&Port, UnknownPortError> {
        self.oports.get(id)
    }

    /// Input ports sharing a logical name, in attachment order.
    pub fn find_input_ports_with_name(&self, name: &str) -> Vec<&Port> {
        self.iports.find_with_name(name)
    }

    /// Output ports sharing a logical name.
    pub fn find_output_ports_with_name(&self, name: &str) -> Vec<&Port> {
        self.oports.find_with_name(name)
    }

    /// All input ports in position order.
    pub fn input_ports(&self) -> impl Iterator<Item = &Port> {
        self.iports.iter()
    }

    /// All output ports in position order.
    pub fn output_ports(&self) -> impl Iterator<Item = &Port> {
        self.oports.iter()
    }

    /// Whether anything is connected to this output port.
    pub fn oport_connected(&self, id: &PortId) -> bool {
        self.oports.get(id).map(Port::is_connected).unwrap_or(false)
    }

    /// Current data on an input port. `Ok(None)` means nothing connected or
    /// nothing sent yet; an unknown id is a programmer error.
    pub fn input_handle(&self, id: &PortId) -> Result<Option<DatatypeHandle>, ModuleError> {
        let port = self.iports.get(id)?;
        Ok(port.first_slot().and_then(|slot| slot.lock().clone()))
    }

    /// Current data across a dynamic input family, one entry per member in
    /// order, always ending with the trailing vacant entry.
    pub fn dynamic_input_handles(
        &self,
        id: &PortId,
    ) -> Result<Vec<Option<DatatypeHandle>>, ModuleError> {
        let port = self.iports.get(id)?;
        let name = port.name().to_owned();
        Ok(self
            .iports
            .find_with_name(&name)
            .into_iter()
            .map(|p| p.first_slot().and_then(|slot| slot.lock().clone()))
            .collect())
    }

    /// Push data to every connection attached to an output port. This is
    /// the only path by which downstream modules receive values.
    pub fn send_output(&self, id: &PortId, handle: DatatypeHandle) -> Result<(), ModuleError> {
        let port = self.oports.get(id)?;
        if !handle.tag().can_connect_to(&port.port_type()) {
            return Err(ModuleError::PortTypeMismatch {
                port: id.clone(),
                expected: port.port_type(),
                actual: handle.tag(),
            });
        }
        for slot in port.slots() {
            *slot.lock() = Some(handle.clone());
        }
        Ok(())
    }

    /// Typed required input: fails with `PortDataMissing` when absent.
    pub fn required_input<T: PortData>(
        &self,
        port: &StaticPortName<T>,
    ) -> Result<TypedHandle<T>, ModuleError> {
        let opt = self.input_handle(&port.id)?;
        self.check_input(opt, &port.id)
    }

    /// Typed optional input: absence is a normal `Ok(None)`.
    pub fn optional_input<T: PortData>(
        &self,
        port: &StaticPortName<T>,
    ) -> Result<Option<TypedHandle<T>>, ModuleError> {
        match self.input_handle(&port.id)? {
            None => Ok(None),
            some => self.check_input(some, &port.id).map(Some),
        }
    }

    /// Typed handles across a dynamic family, trailing vacant entry
    /// excluded. Every bound member must carry data.
    pub fn required_dynamic_inputs<T: PortData>(
        &self,
        port: &DynamicPortName<T>,
    ) -> Result<Vec<TypedHandle<T>>, ModuleError> {
        let handles = self.dynamic_input_handles(&port.id)?;
        let bound = &handles[..handles.len().saturating_sub(1)];
        bound
            .iter()
            .map(|opt| self.check_input(opt.clone(), &port.id))
            .collect()
    }

    /// Typed send through a static output port name.
    pub fn send<T: PortData>(&self, port: &StaticPortName<T>, data: T) -> Result<(), ModuleError> {
        self.send_output(&port.id, Arc::new(data.upcast()))
    }

    fn check_input<T: PortData>(
        &self,
        opt: Option<DatatypeHandle>,
        id: &PortId,
    ) -> Result<TypedHandle<T>, ModuleError> {
        let handle = opt.ok_or_else(|| ModuleError::PortDataMissing { port: id.clone() })?;
        TypedHandle::new(handle).map_err(|rejected| ModuleError::PortTypeMismatch {
            port: id.clone(),
            expected: T::TAG,
            actual: rejected.tag(),
        })
    }

    /// Persistent state store.
    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    /// Mutable persistent state store.
    pub fn state_mut(&mut self) -> &mut ModuleState {
        &mut self.state
    }

    /// Replace the whole state, for the persistence collaborator.
    pub fn set_state(&mut self, state: ModuleState) {
        self.state = state;
    }

    /// Current per-run execution state.
    pub fn exec_state(&self) -> ExecutionState {
        self.exec_state
    }

    /// Update the per-run execution state.
    pub fn set_exec_state(&mut self, state: ExecutionState) {
        self.exec_state = state;
    }

    /// Execution signals for observers.
    pub fn events(&self) -> &ModuleEvents {
        &self.events
    }

    /// Shared handle to the execution signals, usable after the module
    /// lock is released.
    pub fn events_handle(&self) -> Arc<ModuleEvents> {
        self.events.clone()
    }

    /// Consult the reexecute policy.
    pub fn needs_execute(&self) -> bool {
        self.reexecute.needs_execute(self)
    }

    /// Replace the reexecute policy.
    pub fn set_reexecute_policy(&mut self, policy: Box<dyn ReexecutePolicy>) {
        self.reexecute = policy;
    }

    /// Report an error: logged and raised through the module-identified
    /// error signal.
    pub fn error(&self, msg: &str) {
        tracing::error!(module = %self.id, "{msg}");
        self.events.error.emit(&self.id);
    }

    /// Report a warning.
    pub fn warning(&self, msg: &str) {
        tracing::warn!(module = %self.id, "{msg}");
    }

    /// Report a remark.
    pub fn remark(&self, msg: &str) {
        tracing::info!(module = %self.id, "{msg}");
    }

    /// Report transient status.
    pub fn status(&self, msg: &str) {
        tracing::debug!(module = %self.id, "{msg}");
    }

    /// Run the module: gather inputs per the port declarations, invoke the
    /// algorithm, push outputs. Not re-entrant; callers hold the module
    /// lock for the duration.
    pub fn execute(&mut self) -> Result<(), ModuleError> {
        self.events.execute_begins.emit(&self.id);
        self.exec_state = ExecutionState::Executing;
        let result = self.execute_impl();
        self.events.execute_ends.emit(&self.id);
        result
    }

    fn execute_impl(&mut self) -> Result<(), ModuleError> {
        if !self.needs_execute() {
            self.status("skipping execution, inputs and state unchanged");
            return Ok(());
        }
        let input = self.gather_inputs()?;
        let output = self.algorithm.run(&input, &mut self.state)?;
        self.route_outputs(&output)
    }

    /// Collect one entry per logical input family, enforcing required-ness
    /// and the runtime type check.
    fn gather_inputs(&self) -> Result<AlgorithmInput, ModuleError> {
        let mut input = AlgorithmInput::new();
        let mut seen: Vec<&str> = Vec::new();
        for port in self.iports.iter() {
            if seen.contains(&port.name()) {
                continue;
            }
            seen.push(port.name());

            let family = self.iports.find_with_name(port.name());
            let mut handles = Vec::new();
            if port.is_dynamic() {
                // Bound members only; the trailing vacant member is skipped.
                for member in &family[..family.len() - 1] {
                    let value = member.first_slot().and_then(|slot| slot.lock().clone());
                    let handle = self.checked(value, member)?;
                    handles.push(handle);
                }
            } else {
                let value = port.first_slot().and_then(|slot| slot.lock().clone());
                match value {
                    Some(_) => handles.push(self.checked(value, port)?),
                    None if port.is_optional() => {}
                    None => {
                        return Err(ModuleError::PortDataMissing {
                            port: port.id().clone(),
                        })
                    }
                }
            }
            input.insert(port.name(), handles);
        }
        Ok(input)
    }

    fn checked(
        &self,
        value: Option<DatatypeHandle>,
        port: &Port,
    ) -> Result<DatatypeHandle, ModuleError> {
        let handle = value.ok_or_else(|| ModuleError::PortDataMissing {
            port: port.id().clone(),
        })?;
        if !handle.tag().can_connect_to(&port.port_type()) {
            return Err(ModuleError::PortTypeMismatch {
                port: port.id().clone(),
                expected: port.port_type(),
                actual: handle.tag(),
            });
        }
        Ok(handle)
    }

    fn route_outputs(&self, output: &AlgorithmOutput) -> Result<(), ModuleError> {
        for (name, handle) in output.iter() {
            let ports = self.oports.find_with_name(name);
            let port = ports.first().ok_or_else(|| UnknownPortError {
                id: PortId::new(0, name),
            })?;
            self.send_output(port.id(), handle.clone())?;
        }
        Ok(())
    }

    pub(crate) fn iports_mut(&mut self) -> &mut PortManager {
        &mut self.iports
    }

    pub(crate) fn oports_mut(&mut self) -> &mut PortManager {
        &mut self.oports
    }
}

/// Staged module construction. `build` fails fast when a required step
/// (name, algorithm) was never performed.
pub struct ModuleBuilder {
    info: Option<ModuleLookupInfo>,
    algorithm: Option<Box<dyn Algorithm>>,
    inputs: Vec<PortDescription>,
    outputs: Vec<PortDescription>,
    state_defaults: Vec<(String, Value)>,
    ui_visible: bool,
}

impl ModuleBuilder {
    /// Start a fresh builder.
    pub fn new() -> Self {
        Self {
            info: None,
            algorithm: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            state_defaults: Vec::new(),
            ui_visible: true,
        }
    }

    /// Set the module type name (default package/category).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.info = Some(ModuleLookupInfo::named(name));
        self
    }

    /// Set the full lookup info.
    pub fn with_info(mut self, info: ModuleLookupInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Supply the algorithm body.
    pub fn using(mut self, algorithm: Box<dyn Algorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Declare an input port.
    pub fn add_input_port(mut self, desc: PortDescription) -> Self {
        self.inputs.push(desc);
        self
    }

    /// Declare an output port.
    pub fn add_output_port(mut self, desc: PortDescription) -> Self {
        self.outputs.push(desc);
        self
    }

    /// Seed a persistent state default.
    pub fn set_state_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.state_defaults.push((name.into(), value));
        self
    }

    /// Set UI visibility.
    pub fn with_ui(mut self, visible: bool) -> Self {
        self.ui_visible = visible;
        self
    }

    /// Finish construction.
    pub fn build(self) -> Result<Module, ModuleError> {
        let info = self
            .info
            .ok_or_else(|| ModuleError::BuilderIncomplete("module name never set".into()))?;
        let algorithm = self
            .algorithm
            .ok_or_else(|| ModuleError::BuilderIncomplete("algorithm never supplied".into()))?;

        let mut iports = PortManager::new();
        for desc in &self.inputs {
            iports.add(Port::from_description(desc, PortDirection::Input));
        }
        let mut oports = PortManager::new();
        for desc in &self.outputs {
            oports.add(Port::from_description(desc, PortDirection::Output));
        }

        let mut state = ModuleState::new();
        for (name, value) in self.state_defaults {
            state.set(name, value);
        }

        Ok(Module {
            id: ModuleId::new(info.name.clone(), 0),
            info,
            ui_visible: self.ui_visible,
            iports,
            oports,
            algorithm,
            state,
            exec_state: ExecutionState::NeedData,
            reexecute: Box::new(AlwaysReexecute),
            events: Arc::new(ModuleEvents::default()),
        })
    }
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::FnAlgorithm;
    use crate::connection::ConnectionId;
    use crate::datatype::{Datatype, DenseMatrix};
    use crate::port::DataSlot;

    fn noop_algorithm() -> Box<dyn Algorithm> {
        Box::new(FnAlgorithm(|_: &AlgorithmInput, _: &mut ModuleState| {
            Ok(AlgorithmOutput::new())
        }))
    }

    fn test_module() -> Module {
        ModuleBuilder::new()
            .with_name("ReportMatrixInfo")
            .using(noop_algorithm())
            .add_input_port(PortDescription::new("InputMatrix", PortType::Matrix))
            .add_output_port(PortDescription::new("Report", PortType::String))
            .set_state_default("Precision", Value::Int(4))
            .build()
            .unwrap()
    }

    fn wire_input(module: &mut Module, port: &PortId, value: Datatype) -> DataSlot {
        let slot: DataSlot = Arc::new(Mutex::new(Some(Arc::new(value))));
        let cid = ConnectionId::new(
            ModuleId::new("Src", 0),
            PortId::new(0, "Out"),
            module.id().clone(),
            port.clone(),
        );
        module.iports_mut().get_mut(port).unwrap().attach(cid, slot.clone());
        slot
    }

    #[test]
    fn test_builder_requires_algorithm() {
        let err = ModuleBuilder::new().with_name("Broken").build().unwrap_err();
        assert!(matches!(err, ModuleError::BuilderIncomplete(_)));
    }

    #[test]
    fn test_builder_requires_name() {
        let err = ModuleBuilder::new().using(noop_algorithm()).build().unwrap_err();
        assert!(matches!(err, ModuleError::BuilderIncomplete(_)));
    }

    #[test]
    fn test_builder_establishes_ports_and_state() {
        let m = test_module();
        assert_eq!(m.num_input_ports(), 1);
        assert_eq!(m.num_output_ports(), 1);
        assert!(m.has_input_port(&PortId::new(0, "InputMatrix")));
        assert!(!m.has_input_port(&PortId::new(0, "Report")));
        assert_eq!(m.state().get("Precision"), Some(&Value::Int(4)));
        assert_eq!(m.exec_state(), ExecutionState::NeedData);
        assert!(m.needs_execute());
    }

    #[test]
    fn test_unknown_port_is_a_programmer_error() {
        let m = test_module();
        assert!(matches!(
            m.input_handle(&PortId::new(0, "Nope")),
            Err(ModuleError::UnknownPort(_))
        ));
    }

    #[test]
    fn test_optional_input_absent_is_not_an_error() {
        let m = test_module();
        let port = StaticPortName::<DenseMatrix>::new("InputMatrix");
        assert!(m.optional_input(&port).unwrap().is_none());
    }

    #[test]
    fn test_required_input_absent_raises_missing() {
        let m = test_module();
        let port = StaticPortName::<DenseMatrix>::new("InputMatrix");
        assert!(matches!(
            m.required_input(&port),
            Err(ModuleError::PortDataMissing { .. })
        ));
    }

    #[test]
    fn test_required_input_checks_concrete_subtype() {
        let mut m = test_module();
        let id = PortId::new(0, "InputMatrix");
        wire_input(
            &mut m,
            &id,
            Datatype::Matrix(crate::datatype::Matrix::SparseRow(
                crate::datatype::SparseRowMatrix {
                    rows: 1,
                    cols: 1,
                    triplets: vec![],
                },
            )),
        );

        // Tag-compatible, class-incompatible: sparse arrives on a dense
        // accessor.
        let dense = StaticPortName::<DenseMatrix>::new("InputMatrix");
        assert!(matches!(
            m.required_input(&dense),
            Err(ModuleError::PortTypeMismatch { .. })
        ));

        let any_matrix = StaticPortName::<crate::datatype::Matrix>::new("InputMatrix");
        assert_eq!(m.required_input(&any_matrix).unwrap().rows(), 1);
    }

    #[test]
    fn test_execute_raises_missing_on_required_input() {
        let mut m = test_module();
        assert!(matches!(
            m.execute(),
            Err(ModuleError::PortDataMissing { .. })
        ));
    }

    #[test]
    fn test_execute_fires_begin_and_end_signals() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut m = test_module();
        wire_input(
            &mut m,
            &PortId::new(0, "InputMatrix"),
            Datatype::Matrix(crate::datatype::Matrix::Dense(DenseMatrix::zeros(1, 1))),
        );

        let begins = Arc::new(AtomicUsize::new(0));
        let ends = Arc::new(AtomicUsize::new(0));
        let b = begins.clone();
        m.events().execute_begins.subscribe(move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });
        let e = ends.clone();
        m.events().execute_ends.subscribe(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        m.execute().unwrap();
        assert_eq!(begins.load(Ordering::SeqCst), 1);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_raises_module_identified_signal() {
        let m = test_module();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        m.events().error.subscribe(move |id: &ModuleId| {
            sink.lock().push(id.clone());
        });

        m.error("matrix was singular");
        assert_eq!(seen.lock().as_slice(), &[m.id().clone()]);
    }

    #[test]
    fn test_send_output_rejects_incompatible_tag() {
        let m = test_module();
        let err = m
            .send_output(
                &PortId::new(0, "Report"),
                Arc::new(Datatype::Scalar(1.0)),
            )
            .unwrap_err();
        assert!(matches!(err, ModuleError::PortTypeMismatch { .. }));
    }
}
