use super::{ConnectionId, SlotConnectionId};
use crate::core::spec::ParticleSpec;
use crate::core::ty::TypeVarId;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A component node. Connections live in the recipe's arenas; the particle
/// holds their ids.
#[derive(Debug, Clone)]
pub struct Particle {
    pub(crate) name: Option<String>,
    pub(crate) local_name: Option<String>,
    pub(crate) spec: Option<Arc<ParticleSpec>>,
    pub(crate) verbs: Vec<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) connections: IndexMap<String, ConnectionId>,
    pub(crate) unnamed_connections: Vec<ConnectionId>,
    pub(crate) consumed_slots: IndexMap<String, SlotConnectionId>,
    /// Variables created for this particle's spec, by name.
    pub(crate) variables: HashMap<String, TypeVarId>,
    /// Dropped at the next normalization.
    pub(crate) retired: bool,
}

impl Particle {
    pub(crate) fn new(name: Option<String>) -> Self {
        Self {
            name,
            local_name: None,
            spec: None,
            verbs: Vec::new(),
            tags: Vec::new(),
            connections: IndexMap::new(),
            unnamed_connections: Vec::new(),
            consumed_slots: IndexMap::new(),
            variables: HashMap::new(),
            retired: false,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn spec(&self) -> Option<&Arc<ParticleSpec>> {
        self.spec.as_ref()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn verbs(&self) -> &[String] {
        &self.verbs
    }

    pub fn primary_verb(&self) -> Option<&str> {
        self.verbs.first().map(String::as_str)
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn connection(&self, name: &str) -> Option<ConnectionId> {
        self.connections.get(name).copied()
    }

    /// Named connections in insertion (or, once normalized, sorted) order.
    pub fn connections(&self) -> impl Iterator<Item = (&str, ConnectionId)> {
        self.connections.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn unnamed_connections(&self) -> &[ConnectionId] {
        &self.unnamed_connections
    }

    /// Named then unnamed connection ids.
    pub fn all_connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections
            .values()
            .copied()
            .chain(self.unnamed_connections.iter().copied())
    }

    pub fn consumed_slot(&self, name: &str) -> Option<SlotConnectionId> {
        self.consumed_slots.get(name).copied()
    }

    pub fn consumed_slots(&self) -> impl Iterator<Item = (&str, SlotConnectionId)> {
        self.consumed_slots.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
