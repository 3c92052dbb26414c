use super::{ParticleId, SlotConnectionId, SlotId};
use indexmap::IndexMap;

/// A UI composition point.
#[derive(Debug, Clone)]
pub struct Slot {
    pub(crate) id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) local_name: Option<String>,
    pub(crate) tags: Vec<String>,
    /// The slot connection that provides this slot, if any.
    pub(crate) source_connection: Option<SlotConnectionId>,
    pub(crate) consume_connections: Vec<SlotConnectionId>,
    pub(crate) retired: bool,
}

impl Slot {
    pub(crate) fn new(name: Option<String>) -> Self {
        Self {
            id: None,
            name,
            local_name: None,
            tags: Vec::new(),
            source_connection: None,
            consume_connections: Vec::new(),
            retired: false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn source_connection(&self) -> Option<SlotConnectionId> {
        self.source_connection
    }

    pub fn consume_connections(&self) -> &[SlotConnectionId] {
        &self.consume_connections
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

/// A particle consuming a slot, optionally providing named sub-slots.
#[derive(Debug, Clone)]
pub struct SlotConnection {
    pub(crate) name: String,
    pub(crate) particle: ParticleId,
    pub(crate) target_slot: Option<SlotId>,
    pub(crate) provided_slots: IndexMap<String, SlotId>,
    pub(crate) tags: Vec<String>,
}

impl SlotConnection {
    pub(crate) fn new(particle: ParticleId, name: String) -> Self {
        Self {
            name,
            particle,
            target_slot: None,
            provided_slots: IndexMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn particle(&self) -> ParticleId {
        self.particle
    }

    pub fn target_slot(&self) -> Option<SlotId> {
        self.target_slot
    }

    pub fn provided_slots(&self) -> impl Iterator<Item = (&str, SlotId)> {
        self.provided_slots.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}
