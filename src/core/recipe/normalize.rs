//! Validation, total ordering and canonical reordering.
//!
//! Normalization runs in phases: validate (unifying handle types on the way),
//! clear local names and sort small collections, sort connection lists with
//! the global comparators, then rebuild every arena in canonical order. Two
//! recipes with the same structure end up with identical arenas, and so with
//! identical text and digest.

use super::{ConnectionId, HandleId, ParticleId, Recipe, SlotConnectionId, SlotId};
use crate::core::checker::{TypeCheck, TypeChecker, TypeListItem};
use crate::core::types::{Direction, Fate};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

impl Recipe {
    /// Canonicalize and freeze. Returns `true` on success or if already
    /// normalized. On validation failure the recipe stays mutable, the invalid
    /// entities are logged, and `false` is returned.
    pub fn normalize(&mut self) -> bool {
        if self.normalized {
            return true;
        }
        self.drop_retired();
        let errors = self.validate();
        if !errors.is_empty() {
            debug!(
                recipe = self.name.as_deref().unwrap_or("<unnamed>"),
                ?errors,
                "recipe failed validation"
            );
            return false;
        }

        self.start_normalize();
        self.finish_normalize();

        let mut ordered = self.handle_connections();
        ordered.sort_by(|a, b| self.compare_connections(*a, *b));
        let (mut ordered, interfaces): (Vec<_>, Vec<_>) = ordered
            .into_iter()
            .partition(|c| !self.is_interface_connection(*c));
        ordered.extend(interfaces);

        let particle_order = self.particle_order(&ordered);
        let handle_order = self.handle_order(&ordered);
        let slot_order = self.slot_order();
        self.constraints.sort_by(|a, b| a.compare(b));
        self.reorder(&particle_order, &handle_order, &slot_order);
        self.normalized = true;
        true
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Run every entity's local check. Computes handle types as a side effect.
    pub(crate) fn validate(&mut self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for handle in &self.handles {
            if let Some(id) = &handle.id {
                if !seen.insert(id.clone()) {
                    errors.push(format!("duplicate handle id '{}'", id));
                }
            }
        }

        // Handles sharing a type variable bind it in this order.
        let mut handle_order: Vec<HandleId> = (0..self.handles.len()).map(HandleId).collect();
        handle_order.sort_by(|a, b| self.compare_handle_shapes(*a, *b));
        for h in handle_order {
            if let Err(e) = self.validate_handle(h) {
                errors.push(e);
            }
        }
        for (_, particle) in self.particles() {
            if particle.name.is_none() && particle.verbs.is_empty() {
                errors.push("particle has neither a name nor a verb".to_string());
            }
        }
        for i in 0..self.connections.len() {
            if let Err(e) = self.validate_connection(ConnectionId(i)) {
                errors.push(e);
            }
        }
        for i in 0..self.slot_connections.len() {
            if let Err(e) = self.validate_slot_connection(SlotConnectionId(i)) {
                errors.push(e);
            }
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(sc) = slot.source_connection {
                let provides = self.slot_connections[sc.0]
                    .provided_slots
                    .values()
                    .any(|s| s.0 == i);
                if !provides {
                    errors.push(format!("slot #{} names a source that does not provide it", i));
                }
            }
        }
        if let Some(search) = &self.search {
            if !search.is_valid() {
                errors.push(format!("search tokens do not match '{}'", search.phrase()));
            }
        }
        errors
    }

    fn handle_label(&self, h: HandleId) -> String {
        let handle = &self.handles[h.0];
        handle
            .local_name
            .clone()
            .or_else(|| handle.id.as_ref().map(|id| format!("'{}'", id)))
            .unwrap_or_else(|| format!("#{}", h.0))
    }

    /// The types meeting at a handle: its declared type as `Inout`, then each
    /// typed connection with its direction (`Inout` when unknown).
    pub fn handle_type_list(&self, h: HandleId) -> Vec<TypeListItem> {
        let handle = &self.handles[h.0];
        let mut items = Vec::new();
        if let Some(ty) = &handle.mapped_type {
            items.push(TypeListItem::new(ty.clone(), Direction::Inout));
        }
        for c in &handle.connections {
            let conn = &self.connections[c.0];
            if let Some(ty) = &conn.ty {
                items.push(TypeListItem::new(
                    ty.clone(),
                    conn.direction.unwrap_or(Direction::Inout),
                ));
            }
        }
        items
    }

    fn validate_handle(&mut self, h: HandleId) -> Result<(), String> {
        let items = self.handle_type_list(h);
        let handle = &self.handles[h.0];
        let mut tags = handle.tags.clone();
        for c in &handle.connections {
            let conn = &self.connections[c.0];
            if handle.fate == Fate::Map && conn.is_output() {
                return Err(format!(
                    "handle {} has fate map but is written",
                    self.handle_label(h)
                ));
            }
            for tag in &conn.tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        match TypeChecker::process_type_list(&mut self.type_vars, &items) {
            TypeCheck::Invalid => Err(format!(
                "handle {} has incompatible connection types",
                self.handle_label(h)
            )),
            TypeCheck::Valid(item) => {
                let handle = &mut self.handles[h.0];
                handle.ty = item.map(|i| i.ty);
                handle.tags = tags;
                Ok(())
            }
        }
    }

    fn validate_connection(&self, c: ConnectionId) -> Result<(), String> {
        let conn = &self.connections[c.0];
        let particle = &self.particles[conn.particle.0];
        let (Some(spec), Some(name)) = (&particle.spec, &conn.name) else {
            return Ok(());
        };
        let Some(cs) = spec.connection(name) else {
            return Err(format!("particle {} has no connection '{}'", spec.name, name));
        };
        match conn.direction {
            Some(d) if !d.satisfies(cs.direction) => Err(format!(
                "connection {}.{} is {} but declared {}",
                spec.name, name, d, cs.direction
            )),
            _ => Ok(()),
        }
    }

    fn validate_slot_connection(&self, sc: SlotConnectionId) -> Result<(), String> {
        let conn = &self.slot_connections[sc.0];
        let Some(spec) = &self.particles[conn.particle.0].spec else {
            return Ok(());
        };
        let Some(slot_spec) = spec.slot(&conn.name) else {
            return Err(format!("particle {} does not consume slot '{}'", spec.name, conn.name));
        };
        for name in conn.provided_slots.keys() {
            if !slot_spec.provides.iter().any(|p| &p.name == name) {
                return Err(format!(
                    "slot {}.{} does not provide '{}'",
                    spec.name, conn.name, name
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Comparators
    // ------------------------------------------------------------------

    pub(crate) fn compare_particles(&self, a: ParticleId, b: ParticleId) -> Ordering {
        let (pa, pb) = (&self.particles[a.0], &self.particles[b.0]);
        pa.name
            .cmp(&pb.name)
            .then_with(|| pa.local_name.cmp(&pb.local_name))
            .then_with(|| pa.verbs.cmp(&pb.verbs))
            .then_with(|| pa.tags.cmp(&pb.tags))
            .then_with(|| self.particle_signature(a).cmp(&self.particle_signature(b)))
    }

    /// Connection names with their direction and the fate and id of the
    /// handle they bind. Breaks ties between same-named particles.
    fn particle_signature(&self, p: ParticleId) -> Vec<String> {
        let mut sig: Vec<String> = self.particles[p.0]
            .all_connections()
            .map(|c| {
                let conn = &self.connections[c.0];
                let handle = conn.handle.map(|h| &self.handles[h.0]);
                format!(
                    "{}:{}:{}:{}",
                    conn.name.as_deref().unwrap_or("*"),
                    conn.direction.map_or("", Direction::as_str),
                    handle.map_or("", |h| h.fate.as_str()),
                    handle.and_then(|h| h.id.as_deref()).unwrap_or("")
                )
            })
            .collect();
        sig.sort();
        sig
    }

    pub(crate) fn compare_handles(&self, a: HandleId, b: HandleId) -> Ordering {
        let (ha, hb) = (&self.handles[a.0], &self.handles[b.0]);
        ha.id
            .cmp(&hb.id)
            .then_with(|| ha.local_name.cmp(&hb.local_name))
            .then_with(|| ha.tags.cmp(&hb.tags))
            .then_with(|| ha.fate.cmp(&hb.fate))
            .then_with(|| self.handle_type_text(a).cmp(&self.handle_type_text(b)))
            .then_with(|| self.handle_signature(a).cmp(&self.handle_signature(b)))
    }

    /// Like [`Recipe::compare_handles`] without the computed type, which is
    /// not known until validation has run.
    fn compare_handle_shapes(&self, a: HandleId, b: HandleId) -> Ordering {
        let (ha, hb) = (&self.handles[a.0], &self.handles[b.0]);
        ha.id
            .cmp(&hb.id)
            .then_with(|| ha.local_name.cmp(&hb.local_name))
            .then_with(|| ha.tags.cmp(&hb.tags))
            .then_with(|| ha.fate.cmp(&hb.fate))
            .then_with(|| self.handle_signature(a).cmp(&self.handle_signature(b)))
    }

    fn handle_type_text(&self, h: HandleId) -> Option<String> {
        self.handles[h.0]
            .ty()
            .map(|t| t.display(&self.type_vars).to_string())
    }

    /// `Particle.connection:direction` for every connection of the handle.
    fn handle_signature(&self, h: HandleId) -> Vec<String> {
        let mut sig: Vec<String> = self.handles[h.0]
            .connections
            .iter()
            .map(|c| {
                let conn = &self.connections[c.0];
                format!(
                    "{}.{}:{}",
                    self.particles[conn.particle.0].name.as_deref().unwrap_or("*"),
                    conn.name.as_deref().unwrap_or("*"),
                    conn.direction.map_or("", Direction::as_str)
                )
            })
            .collect();
        sig.sort();
        sig
    }

    pub(crate) fn compare_connections(&self, a: ConnectionId, b: ConnectionId) -> Ordering {
        let (ca, cb) = (&self.connections[a.0], &self.connections[b.0]);
        self.compare_particles(ca.particle, cb.particle)
            .then_with(|| ca.name.cmp(&cb.name))
            .then_with(|| ca.tags.cmp(&cb.tags))
            .then_with(|| match (ca.handle, cb.handle) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => self.compare_handles(x, y),
            })
            .then_with(|| ca.direction.cmp(&cb.direction))
    }

    pub(crate) fn compare_slots(&self, a: SlotId, b: SlotId) -> Ordering {
        let (sa, sb) = (&self.slots[a.0], &self.slots[b.0]);
        sa.id
            .cmp(&sb.id)
            .then_with(|| sa.name.cmp(&sb.name))
            .then_with(|| sa.local_name.cmp(&sb.local_name))
            .then_with(|| sa.tags.cmp(&sb.tags))
    }

    pub(crate) fn compare_slot_connections(&self, a: SlotConnectionId, b: SlotConnectionId) -> Ordering {
        let (sa, sb) = (&self.slot_connections[a.0], &self.slot_connections[b.0]);
        self.compare_particles(sa.particle, sb.particle)
            .then_with(|| sa.name.cmp(&sb.name))
            .then_with(|| sa.tags.cmp(&sb.tags))
            .then_with(|| match (sa.target_slot, sb.target_slot) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => self.compare_slots(x, y),
            })
            .then_with(|| {
                let ka: Vec<&String> = sa.provided_slots.keys().collect();
                let kb: Vec<&String> = sb.provided_slots.keys().collect();
                ka.cmp(&kb)
            })
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn start_normalize(&mut self) {
        for p in &mut self.particles {
            p.local_name = None;
            p.verbs.sort();
            p.tags.sort();
            p.connections.sort_keys();
            p.consumed_slots.sort_keys();
        }
        for h in &mut self.handles {
            h.local_name = None;
            h.tags.sort();
        }
        for s in &mut self.slots {
            s.local_name = None;
            s.tags.sort();
        }
        for c in &mut self.connections {
            c.tags.sort();
        }
        for sc in &mut self.slot_connections {
            sc.tags.sort();
            sc.provided_slots.sort_keys();
        }
        if let Some(search) = &mut self.search {
            search.normalize();
        }
    }

    fn finish_normalize(&mut self) {
        for i in 0..self.particles.len() {
            let mut list = self.particles[i].unnamed_connections.clone();
            list.sort_by(|a, b| self.compare_connections(*a, *b));
            self.particles[i].unnamed_connections = list;
        }
        for i in 0..self.handles.len() {
            let mut list = self.handles[i].connections.clone();
            list.sort_by(|a, b| self.compare_connections(*a, *b));
            self.handles[i].connections = list;
        }
        for i in 0..self.slots.len() {
            let mut list = self.slots[i].consume_connections.clone();
            list.sort_by(|a, b| self.compare_slot_connections(*a, *b));
            self.slots[i].consume_connections = list;
        }
    }

    fn is_interface_connection(&self, c: ConnectionId) -> bool {
        self.connections[c.0]
            .handle
            .and_then(|h| self.handles[h.0].ty())
            .is_some_and(|t| self.type_vars.resolved_type(t).is_interface())
    }

    /// First reference in `ordered`, then orphans in sorted order.
    fn particle_order(&self, ordered: &[ConnectionId]) -> Vec<ParticleId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for c in ordered {
            let p = self.connections[c.0].particle;
            if seen.insert(p) {
                order.push(p);
            }
        }
        let mut orphans: Vec<ParticleId> = self.particle_ids().filter(|p| !seen.contains(p)).collect();
        orphans.sort_by(|a, b| self.compare_particles(*a, *b));
        order.extend(orphans);
        order
    }

    fn handle_order(&self, ordered: &[ConnectionId]) -> Vec<HandleId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for c in ordered {
            if let Some(h) = self.connections[c.0].handle {
                if seen.insert(h) {
                    order.push(h);
                }
            }
        }
        let mut orphans: Vec<HandleId> = self.handle_ids().filter(|h| !seen.contains(h)).collect();
        orphans.sort_by(|a, b| self.compare_handles(*a, *b));
        order.extend(orphans);
        order
    }

    /// Slots in the order sorted slot connections consume and provide them.
    fn slot_order(&self) -> Vec<SlotId> {
        let mut scs = self.slot_connections();
        scs.sort_by(|a, b| self.compare_slot_connections(*a, *b));
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for sc in scs {
            let conn = &self.slot_connections[sc.0];
            for s in conn.target_slot.into_iter().chain(conn.provided_slots.values().copied()) {
                if seen.insert(s) {
                    order.push(s);
                }
            }
        }
        let mut orphans: Vec<SlotId> = self.slot_ids().filter(|s| !seen.contains(s)).collect();
        orphans.sort_by(|a, b| self.compare_slots(*a, *b));
        order.extend(orphans);
        order
    }

    fn drop_retired(&mut self) {
        if !self.particles.iter().any(|p| p.retired) && !self.slots.iter().any(|s| s.retired) {
            return;
        }
        let particles: Vec<ParticleId> = self
            .particle_ids()
            .filter(|p| !self.particles[p.0].retired)
            .collect();
        let handles: Vec<HandleId> = self.handle_ids().collect();
        let slots: Vec<SlotId> = self.slot_ids().filter(|s| !self.slots[s.0].retired).collect();
        self.reorder(&particles, &handles, &slots);
    }

    /// Rebuild every arena in canonical order and rewrite all ids.
    fn reorder(&mut self, particles: &[ParticleId], handles: &[HandleId], slots: &[SlotId]) {
        let particle_map = inverse(particles.iter().map(|p| p.0), self.particles.len());
        let handle_map = inverse(handles.iter().map(|h| h.0), self.handles.len());
        let slot_map = inverse(slots.iter().map(|s| s.0), self.slots.len());

        let connection_order: Vec<ConnectionId> = particles
            .iter()
            .flat_map(|p| self.particles[p.0].all_connections())
            .collect();
        let connection_map = inverse(connection_order.iter().map(|c| c.0), self.connections.len());
        let slot_connection_order: Vec<SlotConnectionId> = particles
            .iter()
            .flat_map(|p| self.particles[p.0].consumed_slots.values().copied())
            .collect();
        let slot_connection_map = inverse(
            slot_connection_order.iter().map(|sc| sc.0),
            self.slot_connections.len(),
        );

        let new_particles = particles
            .iter()
            .map(|p| {
                let mut x = self.particles[p.0].clone();
                for c in x.connections.values_mut() {
                    *c = ConnectionId(connection_map[c.0]);
                }
                for c in &mut x.unnamed_connections {
                    *c = ConnectionId(connection_map[c.0]);
                }
                for sc in x.consumed_slots.values_mut() {
                    *sc = SlotConnectionId(slot_connection_map[sc.0]);
                }
                x
            })
            .collect();
        let new_handles = handles
            .iter()
            .map(|h| {
                let mut x = self.handles[h.0].clone();
                for c in &mut x.connections {
                    *c = ConnectionId(connection_map[c.0]);
                }
                x
            })
            .collect();
        let new_connections = connection_order
            .iter()
            .map(|c| {
                let mut x = self.connections[c.0].clone();
                x.particle = ParticleId(particle_map[x.particle.0]);
                x.handle = x.handle.map(|h| HandleId(handle_map[h.0]));
                x
            })
            .collect();
        let new_slots = slots
            .iter()
            .map(|s| {
                let mut x = self.slots[s.0].clone();
                x.source_connection = x
                    .source_connection
                    .map(|sc| SlotConnectionId(slot_connection_map[sc.0]));
                for sc in &mut x.consume_connections {
                    *sc = SlotConnectionId(slot_connection_map[sc.0]);
                }
                x
            })
            .collect();
        let new_slot_connections = slot_connection_order
            .iter()
            .map(|sc| {
                let mut x = self.slot_connections[sc.0].clone();
                x.particle = ParticleId(particle_map[x.particle.0]);
                x.target_slot = x.target_slot.map(|s| SlotId(slot_map[s.0]));
                for s in x.provided_slots.values_mut() {
                    *s = SlotId(slot_map[s.0]);
                }
                x
            })
            .collect();

        self.particles = new_particles;
        self.handles = new_handles;
        self.connections = new_connections;
        self.slots = new_slots;
        self.slot_connections = new_slot_connections;
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Whether the recipe is ready for instantiation. Panics unless normalized.
    pub fn is_resolved(&self) -> bool {
        assert!(
            self.normalized,
            "resolution is only defined for normalized recipes"
        );
        if !self.constraints.is_empty() {
            return false;
        }
        if self.search.as_ref().is_some_and(|s| !s.is_resolved()) {
            return false;
        }
        self.handle_ids().all(|h| self.is_handle_resolved(h))
            && self.particle_ids().all(|p| self.is_particle_resolved(p))
            && (0..self.connections.len()).all(|c| self.is_connection_resolved(ConnectionId(c)))
            && self
                .slots
                .iter()
                .all(|s| s.id.is_some() || s.source_connection.is_some())
            && (0..self.slot_connections.len())
                .all(|sc| self.is_slot_connection_resolved(SlotConnectionId(sc)))
    }

    pub(super) fn is_handle_resolved(&self, h: HandleId) -> bool {
        let handle = &self.handles[h.0];
        let Some(ty) = handle.ty() else {
            return false;
        };
        match handle.fate {
            Fate::Unset => false,
            Fate::Create => true,
            Fate::Use | Fate::Map | Fate::Copy => {
                handle.id.is_some() && self.type_vars.is_fully_resolved(ty)
            }
        }
    }

    pub(super) fn is_particle_resolved(&self, p: ParticleId) -> bool {
        let particle = &self.particles[p.0];
        let Some(spec) = &particle.spec else {
            return false;
        };
        if !particle.unnamed_connections.is_empty() {
            return false;
        }
        let connections_bound = spec.connections.iter().filter(|cs| !cs.optional).all(|cs| {
            particle
                .connection(&cs.name)
                .is_some_and(|c| self.connections[c.0].handle.is_some())
        });
        let slots_bound = spec.slots.iter().filter(|s| s.required).all(|s| {
            particle
                .consumed_slot(&s.name)
                .is_some_and(|sc| self.slot_connections[sc.0].target_slot.is_some())
        });
        connections_bound && slots_bound
    }

    pub(super) fn is_connection_resolved(&self, c: ConnectionId) -> bool {
        let conn = &self.connections[c.0];
        if conn.handle.is_none() {
            return self.is_optional(c);
        }
        conn.ty.is_some() && conn.direction.is_some()
    }

    fn is_slot_connection_resolved(&self, sc: SlotConnectionId) -> bool {
        let conn = &self.slot_connections[sc.0];
        if conn.target_slot.is_some() {
            return true;
        }
        let particle = &self.particles[conn.particle.0];
        particle
            .spec
            .as_ref()
            .and_then(|spec| spec.slot(&conn.name))
            .is_some_and(|s| !s.required)
    }
}

/// `map[old] = new` for an ordering listing old indices by new position.
fn inverse(order: impl Iterator<Item = usize>, len: usize) -> Vec<usize> {
    let mut map = vec![0; len];
    for (new, old) in order.enumerate() {
        map[old] = new;
    }
    map
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::core::schema::Schema;
    use crate::core::spec::ParticleSpec;
    use crate::core::ty::Type;
    use proptest::prelude::*;
    use std::sync::Arc;

    /// A reads `in`, writes `out`; B reads what A wrote.
    fn build(order: &[usize]) -> Recipe {
        let a = spec("A", &[("x", Direction::In), ("y", Direction::Out)]);
        let b = spec("B", &[("z", Direction::In)]);
        let mut r = Recipe::new();
        let h_in = r.new_handle();
        r.set_fate(h_in, Fate::Map);
        r.set_handle_id(h_in, Some("numbers"));
        let h_mid = r.new_handle();
        r.set_fate(h_mid, Fate::Create);
        for i in order {
            match i {
                0 => {
                    let p = r.new_particle(Some("A"));
                    r.set_particle_spec(p, a.clone());
                    let x = r.add_connection(p, "x");
                    let y = r.add_connection(p, "y");
                    r.connect(x, h_in);
                    r.connect(y, h_mid);
                }
                _ => {
                    let p = r.new_particle(Some("B"));
                    r.set_particle_spec(p, b.clone());
                    let z = r.add_connection(p, "z");
                    r.connect(z, h_mid);
                }
            }
        }
        r
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut r = build(&[0, 1]);
        assert!(r.normalize());
        let text = r.to_string();
        let digest = r.digest();
        assert!(r.normalize());
        assert_eq!(r.to_string(), text);
        assert_eq!(r.digest(), digest);
    }

    #[test]
    fn test_particle_insertion_order_does_not_matter() {
        let mut r1 = build(&[0, 1]);
        let mut r2 = build(&[1, 0]);
        assert!(r1.normalize());
        assert!(r2.normalize());
        assert_eq!(r1.to_string(), r2.to_string());
        assert_eq!(r1.digest(), r2.digest());
    }

    #[test]
    fn test_canonical_particle_and_handle_order() {
        let mut r = build(&[1, 0]);
        assert!(r.normalize());
        let names: Vec<_> = r.particles().map(|(_, p)| p.name().unwrap().to_string()).collect();
        assert_eq!(names, vec!["A", "B"]);
        // A.x binds the map handle, which is referenced first.
        assert_eq!(r.handle(HandleId(0)).id(), Some("numbers"));
        assert_eq!(r.handle(HandleId(1)).fate(), Fate::Create);
        for c in r.handle_connections() {
            let conn = r.connection(c);
            let h = conn.handle().unwrap();
            assert!(r.handle(h).connections().contains(&c));
            assert!(r.particle(conn.particle()).all_connections().any(|x| x == c));
        }
    }

    #[test]
    fn test_duplicate_handle_ids_invalid() {
        let mut r = Recipe::new();
        let a = r.new_handle();
        let b = r.new_handle();
        r.set_handle_id(a, Some("x"));
        r.set_handle_id(b, Some("x"));
        assert!(!r.normalize());
        assert!(!r.is_normalized());
        r.set_handle_id(b, Some("y"));
        assert!(r.normalize());
    }

    #[test]
    fn test_incompatible_types_invalid() {
        let mut r = Recipe::new();
        let a = Arc::new(ParticleSpec::new("A").with_connection(
            "out",
            Direction::Out,
            Type::entity(Schema::new("Left")),
        ));
        let b = Arc::new(ParticleSpec::new("B").with_connection(
            "in",
            Direction::In,
            Type::entity(Schema::new("Right")),
        ));
        let h = r.new_handle();
        let pa = r.new_particle(None);
        r.set_particle_spec(pa, a);
        let c = r.add_connection(pa, "out");
        r.connect(c, h);
        let pb = r.new_particle(None);
        r.set_particle_spec(pb, b);
        let c = r.add_connection(pb, "in");
        r.connect(c, h);
        assert!(!r.normalize());
    }

    #[test]
    fn test_subtype_unification_picks_writer_subtype() {
        let thing = Schema::new("Thing").with_field("name", "Text");
        let product = Schema::new("Product")
            .with_field("price", "Number")
            .extending(&thing);
        let reader = Arc::new(ParticleSpec::new("Reader").with_connection(
            "item",
            Direction::In,
            Type::entity(thing),
        ));
        let writer = Arc::new(ParticleSpec::new("Writer").with_connection(
            "item",
            Direction::Out,
            Type::entity(product.clone()),
        ));
        let mut r = Recipe::new();
        let h = r.new_handle();
        r.set_fate(h, Fate::Create);
        for s in [reader, writer] {
            let p = r.new_particle(None);
            r.set_particle_spec(p, s);
            let c = r.add_connection(p, "item");
            r.connect(c, h);
        }
        assert!(r.normalize());
        let h = r.handle_ids().next().unwrap();
        assert_eq!(r.handle(h).ty(), Some(&Type::entity(product)));
        assert!(r.is_resolved());
    }

    #[test]
    fn test_map_handle_cannot_be_written() {
        let mut r = build(&[0, 1]);
        let mid = r.handle_ids().nth(1).unwrap();
        r.set_fate(mid, Fate::Map);
        r.set_handle_id(mid, Some("other"));
        assert!(!r.normalize());
    }

    #[test]
    fn test_unknown_spec_connection_invalid() {
        let mut r = Recipe::new();
        let p = r.new_particle(Some("A"));
        r.set_particle_spec(p, spec("A", &[("x", Direction::In)]));
        r.add_connection(p, "nope");
        assert!(!r.normalize());
    }

    #[test]
    fn test_direction_mismatch_invalid() {
        let mut r = Recipe::new();
        let p = r.new_particle(Some("A"));
        r.set_particle_spec(p, spec("A", &[("x", Direction::In)]));
        let c = r.add_connection(p, "x");
        r.set_connection_direction(c, Direction::Out);
        assert!(!r.normalize());
    }

    #[test]
    fn test_resolution() {
        let mut r = build(&[0, 1]);
        assert!(r.normalize());
        assert!(r.is_resolved());

        let mut r = build(&[0]);
        assert!(r.normalize());
        // h_mid is created, A is fully bound: still resolved.
        assert!(r.is_resolved());

        let mut r = Recipe::new();
        let p = r.new_particle(Some("A"));
        r.set_particle_spec(p, spec("A", &[("x", Direction::In)]));
        assert!(r.normalize());
        assert!(!r.is_resolved());
    }

    #[test]
    fn test_unset_fate_is_unresolved() {
        let mut r = Recipe::new();
        let p = r.new_particle(Some("A"));
        r.set_particle_spec(p, spec("A", &[("x", Direction::In)]));
        let c = r.add_connection(p, "x");
        let h = r.new_handle();
        r.connect(c, h);
        assert!(r.normalize());
        assert!(!r.is_resolved());
    }

    #[test]
    fn test_use_handle_needs_id() {
        let mut r = Recipe::new();
        let p = r.new_particle(Some("A"));
        r.set_particle_spec(p, spec("A", &[("x", Direction::In)]));
        let c = r.add_connection(p, "x");
        let h = r.new_handle();
        r.set_fate(h, Fate::Use);
        r.connect(c, h);
        let (mut with_id, map) = r.clone_mutable();
        with_id.set_handle_id(map.handle(h), Some("store"));
        assert!(r.normalize());
        assert!(!r.is_resolved());
        assert!(with_id.normalize());
        assert!(with_id.is_resolved());
    }

    #[test]
    fn test_orphan_slots_kept_in_order() {
        let mut r = Recipe::new();
        let b = r.new_slot(Some("b"));
        r.set_slot_id(b, "slot-b");
        let a = r.new_slot(Some("a"));
        r.set_slot_id(a, "slot-a");
        assert!(r.normalize());
        let ids: Vec<_> = r.slot_ids().map(|s| r.slot(s).id().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["slot-a", "slot-b"]);
    }

    #[test]
    fn test_constraints_sorted() {
        let a = spec("A", &[("x", Direction::Out)]);
        let b = spec("B", &[("y", Direction::In)]);
        let mut r = Recipe::new();
        r.new_connection_constraint(b.clone(), "y", a.clone(), "x", Direction::In);
        r.new_connection_constraint(a, "x", b, "y", Direction::Out);
        assert!(r.normalize());
        assert_eq!(r.constraints()[0].from.name, "A");
    }

    /// Writer -> Copy<~t> -> {Reader, Viewer<~b>}. With `narrow_reader` the
    /// writer produces Thing and the reader insists on Product.
    fn typed_chain(
        particle_order: &[usize],
        copy_output_first: bool,
        handles_swapped: bool,
        narrow_reader: bool,
    ) -> Recipe {
        let thing = Schema::new("Thing").with_field("name", "Text");
        let product = Schema::new("Product")
            .with_field("price", "Number")
            .extending(&thing);
        let (written, read) = if narrow_reader {
            (thing, product)
        } else {
            (product, thing)
        };
        let writer = Arc::new(ParticleSpec::new("Writer").with_connection(
            "item",
            Direction::Out,
            Type::entity(written),
        ));
        let copy = Arc::new(
            ParticleSpec::new("Copy")
                .with_connection("input", Direction::In, Type::VariableReference("t".into()))
                .with_connection("output", Direction::Out, Type::VariableReference("t".into())),
        );
        let reader = Arc::new(ParticleSpec::new("Reader").with_connection(
            "item",
            Direction::In,
            Type::entity(read),
        ));
        let viewer = Arc::new(ParticleSpec::new("Viewer").with_connection(
            "item",
            Direction::In,
            Type::VariableReference("b".into()),
        ));

        let mut r = Recipe::new();
        let (upstream, downstream) = if handles_swapped {
            let d = r.new_handle();
            (r.new_handle(), d)
        } else {
            let u = r.new_handle();
            (u, r.new_handle())
        };
        r.set_fate(upstream, Fate::Create);
        r.set_fate(downstream, Fate::Create);

        for i in particle_order {
            let (name, s, conns): (_, _, Vec<(&str, HandleId)>) = match i {
                0 => ("Writer", &writer, vec![("item", upstream)]),
                1 if copy_output_first => (
                    "Copy",
                    &copy,
                    vec![("output", downstream), ("input", upstream)],
                ),
                1 => (
                    "Copy",
                    &copy,
                    vec![("input", upstream), ("output", downstream)],
                ),
                2 => ("Reader", &reader, vec![("item", downstream)]),
                _ => ("Viewer", &viewer, vec![("item", downstream)]),
            };
            let p = r.new_particle(Some(name));
            r.set_particle_spec(p, s.clone());
            for (conn, h) in conns {
                let c = r.add_connection(p, conn);
                r.connect(c, h);
            }
        }
        r
    }

    /// One writer `out ~a` and one reader `in ~b` on a created handle.
    fn variable_pair(writer_first: bool) -> Recipe {
        let writer = Arc::new(ParticleSpec::new("W").with_connection(
            "out",
            Direction::Out,
            Type::VariableReference("a".into()),
        ));
        let reader = Arc::new(ParticleSpec::new("R").with_connection(
            "in",
            Direction::In,
            Type::VariableReference("b".into()),
        ));
        let mut r = Recipe::new();
        let h = r.new_handle();
        r.set_fate(h, Fate::Create);
        let pair = if writer_first {
            [("W", writer, "out"), ("R", reader, "in")]
        } else {
            [("R", reader, "in"), ("W", writer, "out")]
        };
        for (name, s, conn) in pair {
            let p = r.new_particle(Some(name));
            r.set_particle_spec(p, s);
            let c = r.add_connection(p, conn);
            r.connect(c, h);
        }
        r
    }

    #[test]
    fn test_variable_pair_digest_independent_of_particle_order() {
        let mut r1 = variable_pair(true);
        let mut r2 = variable_pair(false);
        assert!(r1.normalize());
        assert!(r2.normalize());
        assert_eq!(r1.to_string(), r2.to_string());
        assert_eq!(r1.digest(), r2.digest());
        assert!(r1.to_string().contains("// ~a"));
    }

    #[test]
    fn test_supertype_writer_rejected_in_any_connection_order() {
        let thing = Schema::new("Thing").with_field("name", "Text");
        let product = Schema::new("Product")
            .with_field("price", "Number")
            .extending(&thing);
        let specs = [
            ("R1", Direction::In, Type::entity(thing.clone())),
            ("W", Direction::Out, Type::entity(thing)),
            ("R2", Direction::In, Type::entity(product)),
        ];
        for order in [[0, 1, 2], [1, 0, 2], [2, 1, 0], [2, 0, 1]] {
            let mut r = Recipe::new();
            let h = r.new_handle();
            r.set_fate(h, Fate::Create);
            for i in order {
                let (name, direction, ty) = &specs[i];
                let s = Arc::new(ParticleSpec::new(*name).with_connection(
                    "item",
                    *direction,
                    ty.clone(),
                ));
                let p = r.new_particle(Some(*name));
                r.set_particle_spec(p, s);
                let c = r.add_connection(p, "item");
                r.connect(c, h);
            }
            assert!(!r.normalize(), "order {:?} accepted", order);
        }
    }

    #[test]
    fn test_shared_variable_binds_to_upstream_writer() {
        let mut r = typed_chain(&[3, 2, 1, 0], true, true, false);
        assert!(r.normalize());
        let text = r.to_string();
        assert!(!text.contains("~"), "unbound variable in\n{}", text);
        for h in r.handle_ids() {
            let ty = r.handle(h).ty().map(|t| t.display(r.type_vars()).to_string());
            assert_eq!(ty.as_deref(), Some("Product"));
        }
    }

    proptest! {
        #[test]
        fn prop_typed_recipe_independent_of_construction_order(
            order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
            copy_output_first in any::<bool>(),
            handles_swapped in any::<bool>(),
            narrow_reader in any::<bool>(),
        ) {
            let mut shuffled = typed_chain(&order, copy_output_first, handles_swapped, narrow_reader);
            let mut reference = typed_chain(&[0, 1, 2, 3], false, false, narrow_reader);
            let valid = reference.normalize();
            prop_assert_eq!(valid, !narrow_reader);
            prop_assert_eq!(shuffled.normalize(), valid);
            if valid {
                prop_assert_eq!(shuffled.to_string(), reference.to_string());
                prop_assert_eq!(shuffled.digest(), reference.digest());
            }
        }

        #[test]
        fn prop_digest_independent_of_insertion_order(
            order in Just(vec![0usize, 1, 1, 0]).prop_shuffle()
        ) {
            let mut shuffled = build(&order);
            let mut reference = build(&[0, 0, 1, 1]);
            prop_assert!(shuffled.normalize());
            prop_assert!(reference.normalize());
            prop_assert_eq!(shuffled.to_string(), reference.to_string());
            prop_assert_eq!(shuffled.digest(), reference.digest());
        }
    }
}
