// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered per-module port collection.
//!
//! Ports are indexed both by position and by [`PortId`]. Dynamic input
//! families keep one always-vacant trailing member: filling it grows a new
//! spare, and detaching a member retires the emptied slot.

use crate::port::{Port, PortId};
use thiserror::Error;

/// Lookup failure for a port id that does not exist on the module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown port: {id}")]
pub struct UnknownPortError {
    /// The id that failed to resolve.
    pub id: PortId,
}

/// Ordered collection of a module's input or output ports.
#[derive(Debug, Clone, Default)]
pub struct PortManager {
    ports: Vec<Port>,
}

impl PortManager {
    /// An empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a port and return its assigned position index.
    pub fn add(&mut self, port: Port) -> usize {
        self.ports.push(port);
        self.ports.len() - 1
    }

    /// Number of concrete ports, trailing vacant members included.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Whether no ports exist.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Whether `id` resolves to a port.
    pub fn has(&self, id: &PortId) -> bool {
        self.ports.iter().any(|p| p.id() == id)
    }

    /// Resolve a port by id.
    pub fn get(&self, id: &PortId) -> Result<&Port, UnknownPortError> {
        self.ports
            .iter()
            .find(|p| p.id() == id)
            .ok_or_else(|| UnknownPortError { id: id.clone() })
    }

    /// Resolve a port mutably by id.
    pub fn get_mut(&mut self, id: &PortId) -> Result<&mut Port, UnknownPortError> {
        self.ports
            .iter_mut()
            .find(|p| p.id() == id)
            .ok_or_else(|| UnknownPortError { id: id.clone() })
    }

    /// All ports in position order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    /// Every port sharing a logical name, in attachment order. More than
    /// one entry means a dynamic family.
    pub fn find_with_name(&self, name: &str) -> Vec<&Port> {
        self.ports.iter().filter(|p| p.name() == name).collect()
    }

    /// Grow a new vacant trailing member when the family's last member is
    /// filled. No-op when a vacant trailing member already exists.
    pub fn ensure_trailing_spare(&mut self, name: &str) {
        let Some(last_pos) = self.ports.iter().rposition(|p| p.name() == name) else {
            return;
        };
        if !self.ports[last_pos].is_dynamic() || !self.ports[last_pos].is_connected() {
            return;
        }
        let next_index = self.ports[last_pos].id().index + 1;
        let spare = self.ports[last_pos].vacant_clone(next_index);
        self.ports.insert(last_pos + 1, spare);
    }

    /// Retire emptied dynamic members so the family is always "k filled
    /// plus one trailing vacant". Member indices are stable: retired slots
    /// leave gaps rather than renumbering live connections.
    pub fn compact_family(&mut self, name: &str) {
        let Some(last_pos) = self.ports.iter().rposition(|p| p.name() == name) else {
            return;
        };
        if !self.ports[last_pos].is_dynamic() {
            return;
        }
        let trailing_id = self.ports[last_pos].id().clone();
        self.ports
            .retain(|p| p.name() != name || p.is_connected() || *p.id() == trailing_id);
        self.ensure_trailing_spare(name);
    }
}
