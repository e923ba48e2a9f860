// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the network.

use crate::module::ModuleId;
use crate::port::{DataSlot, PortId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a connection: the composite of its four endpoints.
/// Unique among live connections; a removed connection is never revived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId {
    /// Source module.
    pub from_module: ModuleId,
    /// Source output port.
    pub from_port: PortId,
    /// Destination module.
    pub to_module: ModuleId,
    /// Destination input port.
    pub to_port: PortId,
}

impl ConnectionId {
    /// Compose a connection id from its endpoints.
    pub fn new(
        from_module: ModuleId,
        from_port: PortId,
        to_module: ModuleId,
        to_port: PortId,
    ) -> Self {
        Self {
            from_module,
            from_port,
            to_module,
            to_port,
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.from_module, self.from_port, self.to_module, self.to_port
        )
    }
}

/// A directed edge between one output port and one input port.
///
/// The network owns every connection; ports only hold the id and the shared
/// transfer slot. Destroying a connection detaches both endpoints and is
/// irreversible.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    slot: DataSlot,
}

impl Connection {
    /// Create a connection with a fresh, empty transfer slot.
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// The composite id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// The shared transfer slot spanning the two endpoints.
    pub fn slot(&self) -> &DataSlot {
        &self.slot
    }

    /// Whether either endpoint sits on `module_id`.
    pub fn involves_module(&self, module_id: &ModuleId) -> bool {
        self.id.from_module == *module_id || self.id.to_module == *module_id
    }

    /// Drop any value currently held in the transfer slot.
    pub fn clear_data(&self) {
        *self.slot.lock() = None;
    }
}
