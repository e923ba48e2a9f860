// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions: typed connection endpoints on modules.

use crate::connection::ConnectionId;
use crate::datatype::DatatypeHandle;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a port on a module: a position index within its logical
/// family plus the logical name. Ordinary ports use index 0; members of a
/// dynamic family share the name and count up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId {
    /// Position within the logical family.
    pub index: usize,
    /// Logical port name.
    pub name: String,
}

impl PortId {
    /// Create a port id.
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.index)
    }
}

/// Port direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port.
    Input,
    /// Output port.
    Output,
}

/// Data type tag that a port declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortType {
    /// Matrix data.
    Matrix,
    /// Scalar value.
    Scalar,
    /// Text data.
    String,
    /// Field data.
    Field,
    /// Mesh data.
    Mesh,
    /// Renderable geometry.
    Geometry,
    /// Wildcard: accepts any value.
    Datatype,
}

impl PortType {
    /// Check whether a value tagged `self` may flow into a port tagged
    /// `other`.
    pub fn can_connect_to(&self, other: &PortType) -> bool {
        if matches!(self, Self::Datatype) || matches!(other, Self::Datatype) {
            return true;
        }
        self == other
    }
}

/// Shared transfer slot: the upstream module writes, the downstream module
/// reads. The mutex makes a cross-thread send/receive a happens-before pair.
pub type DataSlot = Arc<Mutex<Option<DatatypeHandle>>>;

/// Declaration of a port on a module type: an entry in the data-driven
/// port list evaluated at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDescription {
    /// Logical port name.
    pub name: String,
    /// Declared type tag.
    pub port_type: PortType,
    /// Whether this is a growing input family.
    pub dynamic: bool,
    /// Whether an unconnected input is acceptable at execute time.
    pub optional: bool,
}

impl PortDescription {
    /// Declare a static, required port.
    pub fn new(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            dynamic: false,
            optional: false,
        }
    }

    /// Mark as a dynamic input family.
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Mark the input as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A concrete port instance on a module.
///
/// A port never owns a connection; it records the [`ConnectionId`]s attached
/// to it (handles into the network's connection collection) together with
/// the shared transfer slot for each.
#[derive(Debug, Clone)]
pub struct Port {
    id: PortId,
    port_type: PortType,
    direction: PortDirection,
    dynamic: bool,
    optional: bool,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
struct Attachment {
    id: ConnectionId,
    slot: DataSlot,
}

impl Port {
    /// Create an unconnected port.
    pub fn new(id: PortId, port_type: PortType, direction: PortDirection, dynamic: bool) -> Self {
        Self {
            id,
            port_type,
            direction,
            dynamic,
            optional: false,
            attachments: Vec::new(),
        }
    }

    /// Build an input port from its declaration.
    pub fn from_description(desc: &PortDescription, direction: PortDirection) -> Self {
        Self {
            id: PortId::new(0, desc.name.clone()),
            port_type: desc.port_type,
            direction,
            dynamic: desc.dynamic,
            optional: desc.optional,
            attachments: Vec::new(),
        }
    }

    /// Port identifier.
    pub fn id(&self) -> &PortId {
        &self.id
    }

    /// Logical name.
    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Declared type tag.
    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    /// Direction.
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Whether this port belongs to a dynamic family.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Whether an unconnected input is acceptable at execute time.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Number of attached connections.
    pub fn nconnections(&self) -> usize {
        self.attachments.len()
    }

    /// Whether at least one connection is attached.
    pub fn is_connected(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Ids of attached connections, in attachment order.
    pub fn connection_ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.attachments.iter().map(|a| &a.id)
    }

    /// Whether direction and type allow a connection into `other`.
    pub fn can_connect(&self, other: &Port) -> bool {
        if self.direction == other.direction {
            return false;
        }
        self.port_type.can_connect_to(&other.port_type)
    }

    /// A vacant copy of this port with a new index, used to grow a dynamic
    /// family.
    pub fn vacant_clone(&self, index: usize) -> Self {
        Self {
            id: PortId::new(index, self.id.name.clone()),
            port_type: self.port_type,
            direction: self.direction,
            dynamic: self.dynamic,
            optional: self.optional,
            attachments: Vec::new(),
        }
    }

    /// Record an attached connection and its transfer slot.
    pub(crate) fn attach(&mut self, id: ConnectionId, slot: DataSlot) {
        self.attachments.push(Attachment { id, slot });
    }

    /// Forget an attached connection; returns whether it was attached.
    pub(crate) fn detach(&mut self, id: &ConnectionId) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|a| a.id != *id);
        self.attachments.len() != before
    }

    /// The transfer slot of the first attached connection (input ports hold
    /// at most one).
    pub(crate) fn first_slot(&self) -> Option<&DataSlot> {
        self.attachments.first().map(|a| &a.slot)
    }

    /// Transfer slots of every attached connection (fan-out on outputs).
    pub(crate) fn slots(&self) -> impl Iterator<Item = &DataSlot> {
        self.attachments.iter().map(|a| &a.slot)
    }
}
