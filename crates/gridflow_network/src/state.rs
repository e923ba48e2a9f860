// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-module parameter state.
//!
//! Two channels live here: the persistent name/value map that survives runs
//! and is serialized by the persistence collaborator, and a transient
//! channel used for hand-off with an external evaluator, which is never
//! persisted.

use crate::datatype::DatatypeHandle;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A dynamically-typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Integer.
    Int(i64),
    /// Floating point.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// String.
    String(String),
    /// Homogeneous or mixed list.
    List(Vec<Value>),
}

impl Value {
    /// Integer view, when this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view, accepting `Double` and `Int`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean view.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// List view.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }
}

/// A value on the transient channel. May carry a full datatype handle so an
/// external evaluator can pass data in and out of a running module.
#[derive(Debug, Clone)]
pub enum TransientValue {
    /// A plain parameter value.
    Value(Value),
    /// A shared datatype handle.
    Datatype(DatatypeHandle),
}

/// Named parameter store owned by one module instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleState {
    values: IndexMap<String, Value>,
    #[serde(skip)]
    transient: HashMap<String, TransientValue>,
}

impl ModuleState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a persistent value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Write a persistent value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Whether a persistent value exists under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Persistent value names, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Read a transient value. Returns exactly what the last write under
    /// this name stored.
    pub fn get_transient(&self, name: &str) -> Option<&TransientValue> {
        self.transient.get(name)
    }

    /// Write a transient value.
    pub fn set_transient(&mut self, name: impl Into<String>, value: TransientValue) {
        self.transient.insert(name.into(), value);
    }

    /// Remove and return a transient value.
    pub fn take_transient(&mut self, name: &str) -> Option<TransientValue> {
        self.transient.remove(name)
    }
}
