// SPDX-License-Identifier: MIT OR Apache-2.0
//! Module type registry and factory.
//!
//! Module types are data-driven: a description is an ordered list of port
//! declarations plus an algorithm maker, evaluated when an instance is
//! created. The registry is an explicit object handed to the controller;
//! there are no process-wide statics.

use crate::algorithm::Algorithm;
use crate::module::{ModuleBuilder, ModuleHandle, ModuleLookupInfo};
use crate::network::NetworkError;
use crate::port::PortDescription;
use crate::state::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Produces a fresh algorithm instance per module instance.
pub type AlgorithmMaker = Arc<dyn Fn() -> Box<dyn Algorithm> + Send + Sync>;

/// Data-driven description of a module type.
#[derive(Clone)]
pub struct ModuleDescription {
    /// Catalog lookup info.
    pub info: ModuleLookupInfo,
    /// Ordered input port declarations.
    pub inputs: Vec<PortDescription>,
    /// Ordered output port declarations.
    pub outputs: Vec<PortDescription>,
    /// Persistent state defaults established at creation.
    pub state_defaults: Vec<(String, Value)>,
    /// Algorithm factory for this type.
    pub maker: AlgorithmMaker,
    /// Whether instances show a UI.
    pub has_ui: bool,
}

impl ModuleDescription {
    /// Describe a module type with its algorithm maker.
    pub fn new(info: ModuleLookupInfo, maker: AlgorithmMaker) -> Self {
        Self {
            info,
            inputs: Vec::new(),
            outputs: Vec::new(),
            state_defaults: Vec::new(),
            maker,
            has_ui: true,
        }
    }

    /// Declare an input port.
    pub fn with_input(mut self, desc: PortDescription) -> Self {
        self.inputs.push(desc);
        self
    }

    /// Declare an output port.
    pub fn with_output(mut self, desc: PortDescription) -> Self {
        self.outputs.push(desc);
        self
    }

    /// Seed a state default.
    pub fn with_state_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.state_defaults.push((name.into(), value));
        self
    }

    /// Mark the type as UI-less.
    pub fn without_ui(mut self) -> Self {
        self.has_ui = false;
        self
    }
}

/// Instantiates registered module types by name.
pub trait ModuleFactory: Send + Sync {
    /// Create a module instance, failing with `UnknownModuleType` when the
    /// name is not registered.
    fn create(&self, name: &str) -> Result<ModuleHandle, NetworkError>;
}

/// Registry of module type descriptions, keyed by type name.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    descriptions: IndexMap<String, ModuleDescription>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module type.
    pub fn register(&mut self, description: ModuleDescription) {
        self.descriptions
            .insert(description.info.name.clone(), description);
    }

    /// Look up a description by type name.
    pub fn get(&self, name: &str) -> Option<&ModuleDescription> {
        self.descriptions.get(name)
    }

    /// Registered type names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptions.keys().map(String::as_str)
    }

    /// All registered descriptions.
    pub fn descriptions(&self) -> impl Iterator<Item = &ModuleDescription> {
        self.descriptions.values()
    }
}

impl ModuleFactory for ModuleRegistry {
    fn create(&self, name: &str) -> Result<ModuleHandle, NetworkError> {
        let desc = self
            .get(name)
            .ok_or_else(|| NetworkError::UnknownModuleType(name.to_owned()))?;

        let mut builder = ModuleBuilder::new()
            .with_info(desc.info.clone())
            .using((desc.maker)())
            .with_ui(desc.has_ui);
        for input in &desc.inputs {
            builder = builder.add_input_port(input.clone());
        }
        for output in &desc.outputs {
            builder = builder.add_output_port(output.clone());
        }
        for (key, value) in &desc.state_defaults {
            builder = builder.set_state_default(key.clone(), value.clone());
        }

        let module = builder.build()?;
        Ok(Arc::new(Mutex::new(module)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{AlgorithmInput, AlgorithmOutput, FnAlgorithm};
    use crate::port::{PortId, PortType};
    use crate::state::ModuleState;

    fn noop_maker() -> AlgorithmMaker {
        Arc::new(|| {
            Box::new(FnAlgorithm(|_: &AlgorithmInput, _: &mut ModuleState| {
                Ok(AlgorithmOutput::new())
            }))
        })
    }

    #[test]
    fn test_unknown_module_type() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.create("DoesNotExist"),
            Err(NetworkError::UnknownModuleType(_))
        ));
    }

    #[test]
    fn test_create_applies_description() {
        let mut registry = ModuleRegistry::new();
        registry.register(
            ModuleDescription::new(
                ModuleLookupInfo::new("GridFlow", "Math", "Normalize"),
                noop_maker(),
            )
            .with_input(PortDescription::new("Input", PortType::Matrix))
            .with_output(PortDescription::new("Output", PortType::Matrix))
            .with_state_default("Scale", Value::Double(1.0))
            .without_ui(),
        );

        let handle = registry.create("Normalize").unwrap();
        let module = handle.lock();
        assert_eq!(module.category(), "Math");
        assert!(module.has_input_port(&PortId::new(0, "Input")));
        assert!(module.has_output_port(&PortId::new(0, "Output")));
        assert_eq!(module.state().get("Scale"), Some(&Value::Double(1.0)));
        assert!(!module.ui_visible());
    }
}
