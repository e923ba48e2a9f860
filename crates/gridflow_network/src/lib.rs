// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow network model for gridflow.
//!
//! This crate provides the in-process graph model:
//! - Typed input/output ports, static and dynamic
//! - Connection validation and ownership
//! - Module instances with state, algorithm bodies, and execution signals
//! - A data-driven module registry/factory
//!
//! ## Architecture
//!
//! The [`Network`] owns every module and connection. Ports never own
//! connections; they hold connection ids plus the shared transfer slot a
//! connection spans. Scheduling and orchestration live in the companion
//! engine crate.

pub mod algorithm;
pub mod connection;
pub mod datatype;
pub mod events;
pub mod library;
pub mod module;
pub mod network;
pub mod port;
pub mod port_manager;
pub mod registry;
pub mod state;

pub use algorithm::{Algorithm, AlgorithmError, AlgorithmInput, AlgorithmOutput};
pub use connection::{Connection, ConnectionId};
pub use datatype::{Datatype, DatatypeHandle, PortData, TypedHandle};
pub use events::{ModuleEvents, Signal, Subscription};
pub use module::{
    DynamicPortName, ExecutionState, Module, ModuleBuilder, ModuleError, ModuleHandle, ModuleId,
    ModuleLookupInfo, StaticPortName,
};
pub use network::{Network, NetworkError};
pub use port::{Port, PortDescription, PortDirection, PortId, PortType};
pub use port_manager::{PortManager, UnknownPortError};
pub use registry::{ModuleDescription, ModuleFactory, ModuleRegistry};
pub use state::{ModuleState, TransientValue, Value};
