//! Recipe graphs.
//!
//! A recipe owns arenas of particles, handles, handle connections, slots and
//! slot connections. Cross references are arena ids, never pointers. A recipe
//! is mutable until [`Recipe::normalize`] succeeds; from then on it is frozen,
//! canonically ordered and has a stable [`Recipe::digest`].

mod connection;
mod constraint;
mod display;
mod handle;
mod normalize;
mod particle;
mod search;
mod slot;

pub use connection::HandleConnection;
pub use constraint::ConnectionConstraint;
pub use display::ToStringOptions;
pub use handle::Handle;
pub use particle::Particle;
pub use search::Search;
pub use slot::{Slot, SlotConnection};

use super::error::{RecipeError, RecipeResult, SourceLocation};
use super::spec::{ConnectionSpec, ParticleSpec};
use super::ty::{Type, TypeVarId, TypeVariables};
use super::types::{Direction, Fate};
use std::collections::HashMap;
use std::sync::Arc;

macro_rules! arena_id {
    ($($name:ident),*) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) usize);

            impl $name {
                pub fn index(self) -> usize {
                    self.0
                }
            }
        )*
    };
}

arena_id!(ParticleId, HandleId, ConnectionId, SlotId, SlotConnectionId);

/// Translation table from ids in a source recipe to ids in a copy of it.
/// Arenas are copied in order, so the table is one offset per arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloneMap {
    particles: usize,
    handles: usize,
    connections: usize,
    slots: usize,
    slot_connections: usize,
    type_vars: u32,
}

impl CloneMap {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn particle(&self, id: ParticleId) -> ParticleId {
        ParticleId(id.0 + self.particles)
    }

    pub fn handle(&self, id: HandleId) -> HandleId {
        HandleId(id.0 + self.handles)
    }

    pub fn connection(&self, id: ConnectionId) -> ConnectionId {
        ConnectionId(id.0 + self.connections)
    }

    pub fn slot(&self, id: SlotId) -> SlotId {
        SlotId(id.0 + self.slots)
    }

    pub fn slot_connection(&self, id: SlotConnectionId) -> SlotConnectionId {
        SlotConnectionId(id.0 + self.slot_connections)
    }

    pub fn type_var(&self, id: TypeVarId) -> TypeVarId {
        TypeVarId(id.0 + self.type_vars)
    }

    fn ty(&self, ty: &Type) -> Type {
        ty.offset_variables(self.type_vars)
    }
}

/// Ids that can be carried across a [`CloneMap`].
pub trait Remap: Copy {
    fn remap(self, map: &CloneMap) -> Self;
}

impl Remap for () {
    fn remap(self, _map: &CloneMap) -> Self {}
}

impl Remap for ParticleId {
    fn remap(self, map: &CloneMap) -> Self {
        map.particle(self)
    }
}

impl Remap for HandleId {
    fn remap(self, map: &CloneMap) -> Self {
        map.handle(self)
    }
}

impl Remap for ConnectionId {
    fn remap(self, map: &CloneMap) -> Self {
        map.connection(self)
    }
}

impl Remap for SlotId {
    fn remap(self, map: &CloneMap) -> Self {
        map.slot(self)
    }
}

impl Remap for SlotConnectionId {
    fn remap(self, map: &CloneMap) -> Self {
        map.slot_connection(self)
    }
}

/// A spec connection of a particle that has no bound connection yet.
#[derive(Debug, Clone)]
pub struct DisconnectedConnection {
    pub particle: ParticleId,
    pub spec: ConnectionSpec,
}

#[derive(Debug, Clone, Default)]
pub struct Recipe {
    pub(crate) name: Option<String>,
    pub(crate) verbs: Vec<String>,
    pub(crate) particles: Vec<Particle>,
    pub(crate) handles: Vec<Handle>,
    pub(crate) connections: Vec<HandleConnection>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) slot_connections: Vec<SlotConnection>,
    pub(crate) constraints: Vec<ConnectionConstraint>,
    pub(crate) search: Option<Search>,
    pub(crate) type_vars: TypeVariables,
    pub(crate) normalized: bool,
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    fn assert_mutable(&self) {
        assert!(!self.normalized, "normalized recipes cannot be modified");
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn verbs(&self) -> &[String] {
        &self.verbs
    }

    pub fn set_verbs(&mut self, verbs: Vec<String>) {
        self.assert_mutable();
        self.verbs = verbs;
    }

    /// Unfrozen copy for rewriting. Ids are preserved.
    pub fn clone_mutable(&self) -> (Recipe, CloneMap) {
        let mut copy = self.clone();
        copy.normalized = false;
        (copy, CloneMap::identity())
    }

    // ------------------------------------------------------------------
    // Particles
    // ------------------------------------------------------------------

    pub fn new_particle(&mut self, name: Option<&str>) -> ParticleId {
        self.assert_mutable();
        self.particles.push(Particle::new(name.map(str::to_string)));
        ParticleId(self.particles.len() - 1)
    }

    pub fn set_particle_name(&mut self, p: ParticleId, name: &str) {
        self.assert_mutable();
        self.particles[p.0].name = Some(name.to_string());
    }

    pub fn set_particle_local_name(&mut self, p: ParticleId, name: &str) {
        self.assert_mutable();
        self.particles[p.0].local_name = Some(name.to_string());
    }

    pub fn set_particle_verbs(&mut self, p: ParticleId, verbs: Vec<String>) {
        self.assert_mutable();
        self.particles[p.0].verbs = verbs;
    }

    pub fn set_particle_tags(&mut self, p: ParticleId, tags: Vec<String>) {
        self.assert_mutable();
        self.particles[p.0].tags = tags;
    }

    /// Attach a spec. Existing named connections take their type from the
    /// spec, and their direction if they have none. Variables in the spec's
    /// types are shared across all of this particle's connections.
    pub fn set_particle_spec(&mut self, p: ParticleId, spec: Arc<ParticleSpec>) {
        self.assert_mutable();
        let particle = &mut self.particles[p.0];
        particle.name = Some(spec.name.clone());
        particle.variables.clear();
        particle.spec = Some(spec);
        let named: Vec<(String, ConnectionId)> = particle
            .connections
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for (name, c) in named {
            if let Some((ty, direction)) = self.spec_connection_type(p, &name) {
                let conn = &mut self.connections[c.0];
                conn.ty = Some(ty);
                conn.direction.get_or_insert(direction);
            }
        }
    }

    fn spec_connection_type(&mut self, p: ParticleId, name: &str) -> Option<(Type, Direction)> {
        let spec = self.particles[p.0].spec.clone()?;
        let cs = spec.connection(name)?;
        let mut names = std::mem::take(&mut self.particles[p.0].variables);
        let ty = cs.ty.assign_variable_ids(&mut self.type_vars, &mut names);
        self.particles[p.0].variables = names;
        Some((ty, cs.direction))
    }

    /// Add a named connection. Panics if the name is taken.
    pub fn add_connection(&mut self, p: ParticleId, name: &str) -> ConnectionId {
        self.assert_mutable();
        assert!(
            !self.particles[p.0].connections.contains_key(name),
            "particle already has a connection named '{}'",
            name
        );
        let mut conn = HandleConnection::new(p, Some(name.to_string()));
        if let Some((ty, direction)) = self.spec_connection_type(p, name) {
            conn.ty = Some(ty);
            conn.direction = Some(direction);
        }
        self.connections.push(conn);
        let id = ConnectionId(self.connections.len() - 1);
        self.particles[p.0]
            .connections
            .insert(name.to_string(), id);
        id
    }

    /// The named connection, added if missing.
    pub fn ensure_connection(&mut self, p: ParticleId, name: &str) -> ConnectionId {
        match self.particles[p.0].connection(name) {
            Some(c) => c,
            None => self.add_connection(p, name),
        }
    }

    pub fn add_unnamed_connection(&mut self, p: ParticleId) -> ConnectionId {
        self.assert_mutable();
        self.connections
            .push(HandleConnection::new(p, None));
        let id = ConnectionId(self.connections.len() - 1);
        self.particles[p.0].unnamed_connections.push(id);
        id
    }

    /// Give an unnamed connection a name. Returns `false` when the connection
    /// is already named or the particle already uses the name.
    pub fn name_connection(&mut self, c: ConnectionId, name: &str) -> bool {
        self.assert_mutable();
        let p = self.connections[c.0].particle;
        if self.connections[c.0].name.is_some() || self.particles[p.0].connections.contains_key(name) {
            return false;
        }
        self.particles[p.0].unnamed_connections.retain(|u| *u != c);
        self.particles[p.0]
            .connections
            .insert(name.to_string(), c);
        self.connections[c.0].name = Some(name.to_string());
        if let Some((ty, direction)) = self.spec_connection_type(p, name) {
            let conn = &mut self.connections[c.0];
            conn.ty = Some(ty);
            conn.direction.get_or_insert(direction);
        }
        true
    }

    pub fn set_connection_direction(&mut self, c: ConnectionId, direction: Direction) {
        self.assert_mutable();
        self.connections[c.0].direction = Some(direction);
    }

    pub fn set_connection_type(&mut self, c: ConnectionId, ty: Type) {
        self.assert_mutable();
        self.connections[c.0].ty = Some(ty);
    }

    pub fn set_connection_tags(&mut self, c: ConnectionId, tags: Vec<String>) {
        self.assert_mutable();
        self.connections[c.0].tags = tags;
    }

    /// Bind a connection to a handle. Panics if bound to a different handle.
    pub fn connect(&mut self, c: ConnectionId, h: HandleId) {
        self.assert_mutable();
        match self.connections[c.0].handle {
            Some(existing) if existing == h => return,
            Some(_) => panic!("connection is already bound to another handle"),
            None => {}
        }
        self.connections[c.0].handle = Some(h);
        self.handles[h.0].connections.push(c);
    }

    pub fn disconnect(&mut self, c: ConnectionId) {
        self.assert_mutable();
        if let Some(h) = self.connections[c.0].handle.take() {
            self.handles[h.0].connections.retain(|x| *x != c);
        }
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    pub fn new_handle(&mut self) -> HandleId {
        self.assert_mutable();
        self.handles.push(Handle::new());
        HandleId(self.handles.len() - 1)
    }

    /// A handle with a fate and id from the start, so neither counts as
    /// overwritten.
    pub fn declare_handle(&mut self, fate: Fate, id: Option<&str>) -> HandleId {
        let h = self.new_handle();
        let handle = &mut self.handles[h.0];
        handle.fate = fate;
        handle.id = id.map(str::to_string);
        h
    }

    pub fn set_handle_local_name(&mut self, h: HandleId, name: &str) {
        self.assert_mutable();
        self.handles[h.0].local_name = Some(name.to_string());
    }

    /// Change the fate, remembering the first one it replaced.
    pub fn set_fate(&mut self, h: HandleId, fate: Fate) {
        self.assert_mutable();
        let handle = &mut self.handles[h.0];
        if handle.fate != fate {
            handle.original_fate.get_or_insert(handle.fate);
            handle.fate = fate;
        }
    }

    /// Change the id, remembering the first one it replaced.
    pub fn set_handle_id(&mut self, h: HandleId, id: Option<&str>) {
        self.assert_mutable();
        let handle = &mut self.handles[h.0];
        if let Some(old) = handle.id.take() {
            handle.original_id.get_or_insert(old);
        }
        handle.id = id.map(str::to_string);
    }

    pub fn set_handle_tags(&mut self, h: HandleId, tags: Vec<String>) {
        self.assert_mutable();
        self.handles[h.0].tags = tags;
    }

    /// Declare the handle's type. Variables must already belong to this
    /// recipe; see [`Recipe::assign_type_variables`].
    pub fn set_mapped_type(&mut self, h: HandleId, ty: Option<Type>) {
        self.assert_mutable();
        self.handles[h.0].mapped_type = ty;
    }

    /// Replace variable references in `ty` with variables of this recipe.
    pub fn assign_type_variables(&mut self, ty: &Type, names: &mut HashMap<String, TypeVarId>) -> Type {
        self.assert_mutable();
        ty.assign_variable_ids(&mut self.type_vars, names)
    }

    /// Bind a handle to an existing store.
    pub fn map_to_store(&mut self, h: HandleId, id: &str, ty: &Type) {
        let ty = self.assign_type_variables(ty, &mut HashMap::new());
        self.set_handle_id(h, Some(id));
        self.handles[h.0].mapped_type = Some(ty);
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    pub fn new_slot(&mut self, name: Option<&str>) -> SlotId {
        self.assert_mutable();
        self.slots.push(Slot::new(name.map(str::to_string)));
        SlotId(self.slots.len() - 1)
    }

    pub fn set_slot_id(&mut self, s: SlotId, id: &str) {
        self.assert_mutable();
        self.slots[s.0].id = Some(id.to_string());
    }

    pub fn set_slot_local_name(&mut self, s: SlotId, name: &str) {
        self.assert_mutable();
        self.slots[s.0].local_name = Some(name.to_string());
    }

    pub fn set_slot_tags(&mut self, s: SlotId, tags: Vec<String>) {
        self.assert_mutable();
        self.slots[s.0].tags = tags;
    }

    /// A particle consumes the slot `name`. Panics if it already does.
    pub fn new_slot_connection(&mut self, p: ParticleId, name: &str) -> SlotConnectionId {
        self.assert_mutable();
        assert!(
            !self.particles[p.0].consumed_slots.contains_key(name),
            "particle already consumes slot '{}'",
            name
        );
        self.slot_connections
            .push(SlotConnection::new(p, name.to_string()));
        let id = SlotConnectionId(self.slot_connections.len() - 1);
        self.particles[p.0]
            .consumed_slots
            .insert(name.to_string(), id);
        id
    }

    pub fn connect_slot(&mut self, sc: SlotConnectionId, s: SlotId) {
        self.assert_mutable();
        if let Some(old) = self.slot_connections[sc.0].target_slot.replace(s) {
            self.slots[old.0].consume_connections.retain(|x| *x != sc);
        }
        self.slots[s.0].consume_connections.push(sc);
    }

    /// Record that `sc` provides `slot` under `name`.
    pub fn provide_slot(&mut self, sc: SlotConnectionId, name: &str, s: SlotId) {
        self.assert_mutable();
        self.slot_connections[sc.0]
            .provided_slots
            .insert(name.to_string(), s);
        let slot = &mut self.slots[s.0];
        slot.source_connection = Some(sc);
        slot.name.get_or_insert_with(|| name.to_string());
    }

    /// Detach a particle from every handle and slot. Ids stay valid until
    /// the next [`Recipe::normalize`], which drops the particle.
    pub fn retire_particle(&mut self, p: ParticleId) {
        self.assert_mutable();
        let connections: Vec<ConnectionId> = self.particles[p.0].all_connections().collect();
        for c in connections {
            self.disconnect(c);
        }
        let consumed: Vec<SlotConnectionId> =
            self.particles[p.0].consumed_slots.values().copied().collect();
        for sc in consumed {
            if let Some(s) = self.slot_connections[sc.0].target_slot.take() {
                self.slots[s.0].consume_connections.retain(|x| *x != sc);
            }
            let provided: Vec<SlotId> = self.slot_connections[sc.0]
                .provided_slots
                .drain(..)
                .map(|(_, s)| s)
                .collect();
            for s in provided {
                if self.slots[s.0].source_connection == Some(sc) {
                    self.slots[s.0].source_connection = None;
                }
            }
        }
        self.particles[p.0].retired = true;
    }

    /// Detach a slot from its source and consumers; dropped like a retired
    /// particle.
    pub fn retire_slot(&mut self, s: SlotId) {
        self.assert_mutable();
        for sc in std::mem::take(&mut self.slots[s.0].consume_connections) {
            self.slot_connections[sc.0].target_slot = None;
        }
        if let Some(sc) = self.slots[s.0].source_connection.take() {
            self.slot_connections[sc.0]
                .provided_slots
                .retain(|_, x| *x != s);
        }
        self.slots[s.0].retired = true;
    }

    // ------------------------------------------------------------------
    // Constraints and search
    // ------------------------------------------------------------------

    pub fn new_connection_constraint(
        &mut self,
        from: Arc<ParticleSpec>,
        from_connection: &str,
        to: Arc<ParticleSpec>,
        to_connection: &str,
        direction: Direction,
    ) {
        self.assert_mutable();
        self.constraints.push(ConnectionConstraint {
            from,
            from_connection: from_connection.to_string(),
            to,
            to_connection: to_connection.to_string(),
            direction,
        });
    }

    pub fn remove_constraint(&mut self, index: usize) -> ConnectionConstraint {
        self.assert_mutable();
        self.constraints.remove(index)
    }

    pub fn clear_connection_constraints(&mut self) {
        self.assert_mutable();
        self.constraints.clear();
    }

    pub fn set_search_phrase(&mut self, phrase: &str) -> RecipeResult<()> {
        self.assert_mutable();
        if self.search.is_some() {
            return Err(RecipeError::SearchAlreadySet {
                location: SourceLocation::new("search"),
            });
        }
        self.search = Some(Search::new(phrase));
        Ok(())
    }

    pub fn resolve_search_token(&mut self, token: &str) -> bool {
        self.assert_mutable();
        self.search
            .as_mut()
            .is_some_and(|s| s.resolve_token(token))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn particle(&self, id: ParticleId) -> &Particle {
        &self.particles[id.0]
    }

    pub fn particle_ids(&self) -> impl Iterator<Item = ParticleId> {
        (0..self.particles.len()).map(ParticleId)
    }

    pub fn particles(&self) -> impl Iterator<Item = (ParticleId, &Particle)> {
        self.particles
            .iter()
            .enumerate()
            .map(|(i, p)| (ParticleId(i), p))
    }

    pub fn handle(&self, id: HandleId) -> &Handle {
        &self.handles[id.0]
    }

    pub fn handle_ids(&self) -> impl Iterator<Item = HandleId> {
        (0..self.handles.len()).map(HandleId)
    }

    pub fn handles(&self) -> impl Iterator<Item = (HandleId, &Handle)> {
        self.handles
            .iter()
            .enumerate()
            .map(|(i, h)| (HandleId(i), h))
    }

    pub fn connection(&self, id: ConnectionId) -> &HandleConnection {
        &self.connections[id.0]
    }

    /// Every handle connection, grouped by particle: named first, then unnamed.
    pub fn handle_connections(&self) -> Vec<ConnectionId> {
        self.particles
            .iter()
            .flat_map(|p| p.all_connections())
            .collect()
    }

    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.0]
    }

    pub fn slot_ids(&self) -> impl Iterator<Item = SlotId> {
        (0..self.slots.len()).map(SlotId)
    }

    pub fn slot_connection(&self, id: SlotConnectionId) -> &SlotConnection {
        &self.slot_connections[id.0]
    }

    /// Every slot connection, grouped by particle.
    pub fn slot_connections(&self) -> Vec<SlotConnectionId> {
        self.particles
            .iter()
            .flat_map(|p| p.consumed_slots.values().copied())
            .collect()
    }

    pub fn constraints(&self) -> &[ConnectionConstraint] {
        &self.constraints
    }

    pub fn search(&self) -> Option<&Search> {
        self.search.as_ref()
    }

    pub fn type_vars(&self) -> &TypeVariables {
        &self.type_vars
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty() && self.handles.is_empty() && self.slots.is_empty()
    }

    pub fn find_handle_by_id(&self, id: &str) -> Option<HandleId> {
        self.handles
            .iter()
            .position(|h| h.id.as_deref() == Some(id))
            .map(HandleId)
    }

    pub fn free_handles(&self) -> Vec<HandleId> {
        self.handles()
            .filter(|(_, h)| h.is_free())
            .map(|(id, _)| id)
            .collect()
    }

    /// The spec entry behind a named connection.
    pub fn connection_spec(&self, c: ConnectionId) -> Option<&ConnectionSpec> {
        let conn = &self.connections[c.0];
        let spec = self.particles[conn.particle.0].spec.as_ref()?;
        spec.connection(conn.name.as_deref()?)
    }

    pub fn is_optional(&self, c: ConnectionId) -> bool {
        self.connection_spec(c).is_some_and(|s| s.optional)
    }

    /// Spec connections that are missing or unbound, in particle order.
    pub fn disconnected_connections(&self) -> Vec<DisconnectedConnection> {
        let mut out = Vec::new();
        for (id, particle) in self.particles() {
            let Some(spec) = particle.spec().filter(|_| !particle.retired) else {
                continue;
            };
            for cs in &spec.connections {
                let bound = particle
                    .connection(&cs.name)
                    .is_some_and(|c| self.connections[c.0].handle.is_some());
                if !bound {
                    out.push(DisconnectedConnection {
                        particle: id,
                        spec: cs.clone(),
                    });
                }
            }
        }
        out
    }

    /// Append a copy of every entity into `target`, returning the id map.
    pub fn merge_into(&self, target: &mut Recipe) -> CloneMap {
        target.assert_mutable();
        let mut map = CloneMap {
            particles: target.particles.len(),
            handles: target.handles.len(),
            connections: target.connections.len(),
            slots: target.slots.len(),
            slot_connections: target.slot_connections.len(),
            type_vars: 0,
        };
        map.type_vars = target.type_vars.append(&self.type_vars);

        for particle in &self.particles {
            let mut p = particle.clone();
            for c in p.connections.values_mut() {
                *c = map.connection(*c);
            }
            for c in &mut p.unnamed_connections {
                *c = map.connection(*c);
            }
            for sc in p.consumed_slots.values_mut() {
                *sc = map.slot_connection(*sc);
            }
            for v in p.variables.values_mut() {
                *v = map.type_var(*v);
            }
            target.particles.push(p);
        }
        for handle in &self.handles {
            let mut h = handle.clone();
            h.connections = h.connections.iter().map(|c| map.connection(*c)).collect();
            h.mapped_type = h.mapped_type.as_ref().map(|t| map.ty(t));
            h.ty = h.ty.as_ref().map(|t| map.ty(t));
            target.handles.push(h);
        }
        for conn in &self.connections {
            let mut c = conn.clone();
            c.particle = map.particle(c.particle);
            c.handle = c.handle.map(|h| map.handle(h));
            c.ty = c.ty.as_ref().map(|t| map.ty(t));
            target.connections.push(c);
        }
        for slot in &self.slots {
            let mut s = slot.clone();
            s.source_connection = s.source_connection.map(|sc| map.slot_connection(sc));
            s.consume_connections = s
                .consume_connections
                .iter()
                .map(|sc| map.slot_connection(*sc))
                .collect();
            target.slots.push(s);
        }
        for sc in &self.slot_connections {
            let mut c = sc.clone();
            c.particle = map.particle(c.particle);
            c.target_slot = c.target_slot.map(|s| map.slot(s));
            for s in c.provided_slots.values_mut() {
                *s = map.slot(*s);
            }
            target.slot_connections.push(c);
        }
        target.constraints.extend(self.constraints.iter().cloned());
        match (&mut target.search, &self.search) {
            (Some(existing), Some(search)) => existing.merge(search),
            (None, Some(search)) => target.search = Some(search.clone()),
            _ => {}
        }
        map
    }
}
