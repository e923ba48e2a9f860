// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable algorithm bodies.
//!
//! The scheduler and network never look inside an algorithm: a module hands
//! it the gathered inputs and its state, and routes whatever outputs come
//! back. One algorithm instance belongs to exactly one module instance.

use crate::datatype::{DatatypeHandle, PortData};
use crate::state::ModuleState;
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by an algorithm body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AlgorithmError(pub String);

impl AlgorithmError {
    /// Build from anything displayable.
    pub fn new(msg: impl ToString) -> Self {
        Self(msg.to_string())
    }
}

/// Inputs gathered for one execution, keyed by logical port name. Dynamic
/// families contribute one handle per bound member, in port order.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmInput {
    values: IndexMap<String, Vec<DatatypeHandle>>,
}

impl AlgorithmInput {
    /// An empty input set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the handles gathered for a port name.
    pub fn insert(&mut self, name: impl Into<String>, handles: Vec<DatatypeHandle>) {
        self.values.insert(name.into(), handles);
    }

    /// The single handle for a static port, if present.
    pub fn get(&self, name: &str) -> Option<&DatatypeHandle> {
        self.values.get(name).and_then(|v| v.first())
    }

    /// Every handle gathered for a port name (dynamic families).
    pub fn get_all(&self, name: &str) -> &[DatatypeHandle] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Typed view of the single handle for a port name.
    pub fn get_as<T: PortData>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(|h| T::downcast(h))
    }
}

/// Outputs produced by one execution, keyed by logical port name.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmOutput {
    values: IndexMap<String, DatatypeHandle>,
}

impl AlgorithmOutput {
    /// An empty output set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a ready-made handle under a port name.
    pub fn set(&mut self, name: impl Into<String>, handle: DatatypeHandle) {
        self.values.insert(name.into(), handle);
    }

    /// Wrap a typed value and store it under a port name.
    pub fn set_data<T: PortData>(&mut self, name: impl Into<String>, value: T) {
        self.set(name, Arc::new(value.upcast()));
    }

    /// The handle stored under a port name.
    pub fn get(&self, name: &str) -> Option<&DatatypeHandle> {
        self.values.get(name)
    }

    /// All produced outputs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatatypeHandle)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// An algorithm body attached to a module instance.
pub trait Algorithm: Send {
    /// Compute outputs from the gathered inputs and the module state.
    fn run(
        &mut self,
        input: &AlgorithmInput,
        state: &mut ModuleState,
    ) -> Result<AlgorithmOutput, AlgorithmError>;
}

/// Closure-backed algorithm, mostly for tests and small adapters.
pub struct FnAlgorithm<F>(pub F);

impl<F> Algorithm for FnAlgorithm<F>
where
    F: FnMut(&AlgorithmInput, &mut ModuleState) -> Result<AlgorithmOutput, AlgorithmError> + Send,
{
    fn run(
        &mut self,
        input: &AlgorithmInput,
        state: &mut ModuleState,
    ) -> Result<AlgorithmOutput, AlgorithmError> {
        (self.0)(input, state)
    }
}
