//! Structural pattern matching of shapes against recipes.
//!
//! A [`Shape`] is a small recipe of named particles, handles and connections.
//! [`Shape::find`] enumerates every consistent embedding of the shape into a
//! target recipe. Embeddings are built one shape connection at a time; each
//! step branches on every compatible recipe connection. What cannot be matched
//! maps to `None` and costs score:
//!
//! - `-1` per unmatched shape connection
//! - `-2` per unmatched shape handle
//! - `-1` per unmatched shape particle
//!
//! Free recipe handles (no connections) may then fill unmatched shape handles
//! for `+1` each. A score of `0` means the recipe already contains the shape.

use super::recipe::{ConnectionId, HandleId, ParticleId, Recipe};
use super::types::{Direction, Fate};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

/// How one shape connection points at a shape handle.
#[derive(Debug, Clone, Default)]
pub struct HandleRepr {
    /// Name of the shape handle.
    pub handle: String,
    /// `None` accepts any direction.
    pub direction: Option<Direction>,
    pub tags: Vec<String>,
    pub local_name: Option<String>,
}

impl HandleRepr {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            ..Self::default()
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// A pattern recipe with names for its elements. Connections are named
/// `Particle:connection`.
#[derive(Debug, Clone)]
pub struct Shape {
    pub recipe: Recipe,
    pub particles: IndexMap<String, ParticleId>,
    pub handles: IndexMap<String, HandleId>,
    pub connections: IndexMap<String, ConnectionId>,
}

/// A recipe element a shape element was mapped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementRef {
    Particle(ParticleId),
    Handle(HandleId),
    /// A spec connection of a particle; it need not exist in the recipe yet.
    Connection { particle: ParticleId, name: String },
}

#[derive(Debug, Clone)]
pub struct ShapeMatch {
    /// Shape element name to recipe element, `None` when unmatched.
    pub matched: IndexMap<String, Option<ElementRef>>,
    pub score: i32,
}

impl ShapeMatch {
    pub fn particle(&self, name: &str) -> Option<ParticleId> {
        match self.matched.get(name) {
            Some(Some(ElementRef::Particle(p))) => Some(*p),
            _ => None,
        }
    }

    pub fn handle(&self, name: &str) -> Option<HandleId> {
        match self.matched.get(name) {
            Some(Some(ElementRef::Handle(h))) => Some(*h),
            _ => None,
        }
    }

    pub fn connection(&self, name: &str) -> Option<(ParticleId, &str)> {
        match self.matched.get(name) {
            Some(Some(ElementRef::Connection { particle, name })) => Some((*particle, name)),
            _ => None,
        }
    }
}

/// Per-direction connection counts of a handle. `inout` also counts toward
/// both `reads` and `writes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionCounts {
    pub reads: usize,
    pub writes: usize,
    pub inout: usize,
    pub host: usize,
    /// Connections with no direction yet.
    pub unknown: usize,
}

pub fn direction_counts(recipe: &Recipe, handle: HandleId) -> DirectionCounts {
    let mut counts = DirectionCounts::default();
    for c in recipe.handle(handle).connections() {
        match recipe.connection(*c).direction() {
            Some(Direction::In) => counts.reads += 1,
            Some(Direction::Out) => counts.writes += 1,
            Some(Direction::Inout) => counts.inout += 1,
            Some(Direction::Host) => counts.host += 1,
            None => counts.unknown += 1,
        }
    }
    counts.reads += counts.inout;
    counts.writes += counts.inout;
    counts
}

/// True when some embedding of `plan` into `recipe` scores `0`.
pub fn matches_recipe(recipe: &Recipe, plan: &Recipe) -> bool {
    Shape::from_recipe(plan)
        .find(recipe)
        .iter()
        .any(|m| m.score == 0)
}

/// Whether a shape connection with `shape` direction accepts a spec
/// connection declared `spec`.
fn accepts(shape: Direction, spec: Direction) -> bool {
    match shape {
        Direction::In => matches!(spec, Direction::In | Direction::Inout | Direction::Host),
        Direction::Out => matches!(spec, Direction::Out | Direction::Inout),
        Direction::Inout => spec == Direction::Inout,
        Direction::Host => spec == Direction::Host,
    }
}

fn tags_subset(required: &[String], available: &[String]) -> bool {
    required.iter().all(|t| available.contains(t))
}

/// A partial embedding. Forward maps go shape -> recipe; the `used_*` sets
/// record which recipe elements are taken.
#[derive(Debug, Clone, Default)]
struct Partial {
    particles: FxHashMap<ParticleId, Option<ParticleId>>,
    handles: FxHashMap<HandleId, Option<HandleId>>,
    connections: FxHashMap<ConnectionId, Option<(ParticleId, String)>>,
    used_particles: FxHashMap<ParticleId, ParticleId>,
    used_handles: FxHashMap<HandleId, HandleId>,
    used_connections: FxHashSet<(ParticleId, String)>,
    score: i32,
}

impl Shape {
    /// Build a shape from particle names, handle names and
    /// `(particle, connection, handle)` triples.
    pub fn make(particles: &[&str], handles: &[&str], connections: &[(&str, &str, HandleRepr)]) -> Shape {
        let mut recipe = Recipe::new();
        let particles: IndexMap<String, ParticleId> = particles
            .iter()
            .map(|name| (name.to_string(), recipe.new_particle(Some(name))))
            .collect();
        let handles: IndexMap<String, HandleId> = handles
            .iter()
            .map(|name| (name.to_string(), recipe.new_handle()))
            .collect();
        let mut named = IndexMap::new();
        for (particle, conn, repr) in connections {
            let (Some(&p), Some(&h)) = (particles.get(*particle), handles.get(&repr.handle)) else {
                continue;
            };
            let c = recipe.add_connection(p, conn);
            if let Some(d) = repr.direction {
                recipe.set_connection_direction(c, d);
            }
            if let Some(local) = &repr.local_name {
                recipe.set_handle_local_name(h, local);
            }
            if !repr.tags.is_empty() {
                let mut tags = recipe.handle(h).tags().to_vec();
                for t in &repr.tags {
                    if !tags.contains(t) {
                        tags.push(t.clone());
                    }
                }
                recipe.set_handle_tags(h, tags);
            }
            recipe.connect(c, h);
            named.insert(format!("{}:{}", particle, conn), c);
        }
        Shape {
            recipe,
            particles,
            handles,
            connections: named,
        }
    }

    /// Treat a whole recipe as a shape. Handles are named `v0`, `v1`, ...
    pub fn from_recipe(recipe: &Recipe) -> Shape {
        let mut particles = IndexMap::new();
        for (id, p) in recipe.particles() {
            particles.insert(p.name().unwrap_or_default().to_string(), id);
        }
        let handles = recipe
            .handle_ids()
            .map(|h| (format!("v{}", h.index()), h))
            .collect();
        let mut connections = IndexMap::new();
        for c in recipe.handle_connections() {
            let conn = recipe.connection(c);
            let particle = recipe.particle(conn.particle()).name().unwrap_or_default();
            connections.insert(
                format!("{}:{}", particle, conn.name().unwrap_or_default()),
                c,
            );
        }
        Shape {
            recipe: recipe.clone(),
            particles,
            handles,
            connections,
        }
    }

    /// Every embedding of this shape into `recipe`, with scores.
    pub fn find(&self, recipe: &Recipe) -> Vec<ShapeMatch> {
        let mut matches = vec![Partial::default()];
        for sc in self.recipe.handle_connections() {
            let mut next = Vec::new();
            for m in &matches {
                self.extend_connection(recipe, sc, m, &mut next);
            }
            matches = next;
        }

        for (sp, particle) in self.recipe.particles() {
            if particle.all_connections().next().is_some() {
                continue;
            }
            let mut next = Vec::new();
            for m in &matches {
                self.extend_particle(recipe, sp, m, &mut next);
            }
            matches = next;
        }

        for free in recipe.free_handles() {
            matches = matches
                .into_iter()
                .flat_map(|m| self.assign_free_handle(recipe, free, m))
                .collect();
        }

        matches.into_iter().map(|m| self.to_match(m)).collect()
    }

    fn handles_match(&self, recipe: &Recipe, sh: HandleId, rh: HandleId) -> bool {
        let s = self.recipe.handle(sh);
        let r = recipe.handle(rh);
        if !tags_subset(s.tags(), r.tags()) {
            return false;
        }
        // Created handles get arbitrary ids.
        let created = s.fate() == Fate::Create
            && (r.fate() == Fate::Create || r.original_fate() == Some(Fate::Create));
        created || s.id() == r.id() || s.id() == r.original_id()
    }

    fn extend_connection(&self, recipe: &Recipe, sc: ConnectionId, m: &Partial, out: &mut Vec<Partial>) {
        let shape_conn = self.recipe.connection(sc);
        let sp = shape_conn.particle();
        let shape_particle = self.recipe.particle(sp);
        let sh = shape_conn.handle();
        let mut found = false;

        for (rp, particle) in recipe.particles() {
            let Some(spec) = particle.spec() else {
                continue;
            };
            if particle.name() != shape_particle.name() {
                continue;
            }
            for cs in &spec.connections {
                let key = (rp, cs.name.clone());
                if m.used_connections.contains(&key) {
                    continue;
                }
                if shape_conn.name().is_some_and(|n| n != cs.name) {
                    continue;
                }
                if shape_conn.direction().is_some_and(|d| !accepts(d, cs.direction)) {
                    continue;
                }
                let rh = particle
                    .connection(&cs.name)
                    .and_then(|c| recipe.connection(c).handle());
                if let (Some(sh), Some(rh)) = (sh, rh) {
                    let local = self.recipe.handle(sh).local_name();
                    if local.is_some() && local != recipe.handle(rh).local_name() {
                        continue;
                    }
                }

                match m.used_particles.get(&rp) {
                    Some(mapped) if *mapped != sp => continue,
                    Some(_) => {}
                    None if m.particles.contains_key(&sp) => continue,
                    None => {}
                }

                if let (Some(sh), Some(rh)) = (sh, rh) {
                    match m.used_handles.get(&rh) {
                        Some(mapped) if *mapped != sh => continue,
                        Some(_) => {}
                        None if matches!(m.handles.get(&sh), Some(Some(_))) => continue,
                        None => {}
                    }
                    if !self.handles_match(recipe, sh, rh) {
                        continue;
                    }
                }

                let mut next = m.clone();
                next.particles.insert(sp, Some(rp));
                next.used_particles.insert(rp, sp);
                if let Some(sh) = sh {
                    match rh {
                        Some(rh) => {
                            next.handles.insert(sh, Some(rh));
                            next.used_handles.insert(rh, sh);
                        }
                        None => {
                            if !next.handles.contains_key(&sh) {
                                next.handles.insert(sh, None);
                                next.score -= 2;
                            }
                        }
                    }
                }
                next.connections.insert(sc, Some(key.clone()));
                next.used_connections.insert(key);
                out.push(next);
                found = true;
            }
        }

        if found {
            return;
        }
        let mut with_particle = Vec::new();
        if matches!(m.particles.get(&sp), Some(Some(_))) {
            // The particle matched through another connection; keep it.
            with_particle.push(m.clone());
        } else {
            self.extend_particle(recipe, sp, m, &mut with_particle);
        }
        for mut next in with_particle {
            if let Some(sh) = sh {
                if !next.handles.contains_key(&sh) {
                    next.handles.insert(sh, None);
                    next.score -= 2;
                }
            }
            next.connections.insert(sc, None);
            next.score -= 1;
            out.push(next);
        }
    }

    fn extend_particle(&self, recipe: &Recipe, sp: ParticleId, m: &Partial, out: &mut Vec<Partial>) {
        let shape_particle = self.recipe.particle(sp);
        let mut found = false;
        for (rp, particle) in recipe.particles() {
            if m.used_particles.contains_key(&rp) || particle.name() != shape_particle.name() {
                continue;
            }
            let names_match = particle.connections().all(|(name, c)| {
                let Some(rh) = recipe.connection(c).handle() else {
                    return true;
                };
                let shape_handle = shape_particle
                    .connection(name)
                    .and_then(|sc| self.recipe.connection(sc).handle());
                match shape_handle.and_then(|sh| self.recipe.handle(sh).local_name()) {
                    Some(local) => recipe.handle(rh).local_name() == Some(local),
                    None => true,
                }
            });
            if !names_match {
                continue;
            }
            let mut next = m.clone();
            next.particles.insert(sp, Some(rp));
            next.used_particles.insert(rp, sp);
            out.push(next);
            found = true;
        }
        if !found {
            let mut next = m.clone();
            if !next.particles.contains_key(&sp) {
                next.particles.insert(sp, None);
                next.score -= 1;
            }
            out.push(next);
        }
    }

    /// Branch `m` over every unmatched shape handle the free recipe handle
    /// can fill. A match with no fillable handle is kept as it is.
    fn assign_free_handle(&self, recipe: &Recipe, free: HandleId, m: Partial) -> Vec<Partial> {
        let free_tags = recipe.handle(free).tags();
        let candidates: Vec<HandleId> = self
            .handles
            .values()
            .copied()
            .filter(|sh| matches!(m.handles.get(sh), Some(None)))
            .filter(|sh| tags_subset(self.recipe.handle(*sh).tags(), free_tags))
            .collect();
        if candidates.is_empty() {
            return vec![m];
        }
        candidates
            .into_iter()
            .map(|sh| {
                let mut next = m.clone();
                next.handles.insert(sh, Some(free));
                next.used_handles.insert(free, sh);
                next.score += 1;
                next
            })
            .collect()
    }

    fn to_match(&self, m: Partial) -> ShapeMatch {
        let mut matched = IndexMap::new();
        for (name, id) in &self.particles {
            if let Some(v) = m.particles.get(id) {
                matched.insert(name.clone(), v.map(ElementRef::Particle));
            }
        }
        for (name, id) in &self.handles {
            if let Some(v) = m.handles.get(id) {
                matched.insert(name.clone(), v.map(ElementRef::Handle));
            }
        }
        for (name, id) in &self.connections {
            if let Some(v) = m.connections.get(id) {
                matched.insert(
                    name.clone(),
                    v.clone()
                        .map(|(particle, name)| ElementRef::Connection { particle, name }),
                );
            }
        }
        ShapeMatch {
            matched,
            score: m.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::fixtures::spec;

    fn ab_shape() -> Shape {
        Shape::make(
            &["A", "B"],
            &["h"],
            &[
                ("A", "foo", HandleRepr::new("h").with_direction(Direction::Out)),
                ("B", "bar", HandleRepr::new("h").with_direction(Direction::In)),
            ],
        )
    }

    fn ab_recipe(bind: bool) -> Recipe {
        let mut r = Recipe::new();
        let a = r.new_particle(None);
        r.set_particle_spec(a, spec("A", &[("foo", Direction::Out)]));
        let b = r.new_particle(None);
        r.set_particle_spec(b, spec("B", &[("bar", Direction::In)]));
        if bind {
            let h = r.new_handle();
            r.set_fate(h, Fate::Create);
            let foo = r.add_connection(a, "foo");
            let bar = r.add_connection(b, "bar");
            r.connect(foo, h);
            r.connect(bar, h);
        }
        r
    }

    #[test]
    fn test_find_unbound_connections() {
        let r = ab_recipe(false);
        let matches = ab_shape().find(&r);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.score, -2);
        assert_eq!(m.particle("A"), Some(ParticleId(0)));
        assert_eq!(m.connection("A:foo"), Some((ParticleId(0), "foo")));
        assert_eq!(m.connection("B:bar"), Some((ParticleId(1), "bar")));
        assert_eq!(m.matched.get("h"), Some(&None));
    }

    #[test]
    fn test_find_bound_connections() {
        let r = ab_recipe(true);
        let matches = ab_shape().find(&r);
        assert!(matches.iter().any(|m| m.score == 0 && m.handle("h").is_some()));
    }

    #[test]
    fn test_missing_particle_costs_score() {
        let mut r = Recipe::new();
        let a = r.new_particle(None);
        r.set_particle_spec(a, spec("A", &[("foo", Direction::Out)]));
        let matches = ab_shape().find(&r);
        assert_eq!(matches.len(), 1);
        // h unmatched (-2), B unmatched (-1), B:bar unmatched (-1).
        assert_eq!(matches[0].score, -4);
        assert_eq!(matches[0].matched.get("B"), Some(&None));
        assert_eq!(matches[0].matched.get("B:bar"), Some(&None));
    }

    #[test]
    fn test_particle_matched_on_one_connection_keeps_missing_one() {
        let shape = Shape::make(
            &["A"],
            &["h", "g"],
            &[
                ("A", "foo", HandleRepr::new("h").with_direction(Direction::Out)),
                ("A", "baz", HandleRepr::new("g").with_direction(Direction::In)),
            ],
        );
        let r = ab_recipe(false);
        let matches = shape.find(&r);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.particle("A"), Some(ParticleId(0)));
        assert_eq!(m.connection("A:foo"), Some((ParticleId(0), "foo")));
        assert_eq!(m.matched.get("A:baz"), Some(&None));
        // h and g unmatched (-2 each), A:baz unmatched (-1).
        assert_eq!(m.score, -5);
    }

    #[test]
    fn test_direction_must_be_accepted() {
        let shape = Shape::make(
            &["A"],
            &["h"],
            &[("A", "foo", HandleRepr::new("h").with_direction(Direction::In))],
        );
        let r = ab_recipe(false);
        let m = shape.find(&r);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].matched.get("A:foo"), Some(&None));
    }

    #[test]
    fn test_free_handle_fills_unmatched_shape_handle() {
        let mut r = ab_recipe(false);
        let free = r.new_handle();
        r.set_handle_tags(free, vec!["fav".into()]);
        let matches = ab_shape().find(&r);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, -1);
        assert_eq!(matches[0].handle("h"), Some(free));
    }

    #[test]
    fn test_free_handle_with_missing_tags_keeps_match() {
        let shape = Shape::make(
            &["A"],
            &["h"],
            &[(
                "A",
                "foo",
                HandleRepr::new("h").with_tags(vec!["fav".into()]),
            )],
        );
        let mut r = ab_recipe(false);
        r.new_handle();
        let matches = shape.find(&r);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched.get("h"), Some(&None));
    }

    #[test]
    fn test_create_handles_ignore_ids() {
        let mut shape = ab_shape();
        let h = shape.handles["h"];
        shape.recipe.set_fate(h, Fate::Create);
        shape.recipe.set_handle_id(h, Some("one"));

        let mut r = ab_recipe(true);
        let rh = r.handle_ids().next().unwrap();
        r.set_handle_id(rh, Some("two"));
        assert!(shape.find(&r).iter().any(|m| m.score == 0));

        shape.recipe.set_fate(h, Fate::Use);
        assert!(!shape.find(&r).iter().any(|m| m.score == 0));
    }

    #[test]
    fn test_matches_recipe() {
        let mut r = ab_recipe(true);
        assert!(r.normalize());
        let mut same = ab_recipe(true);
        assert!(same.normalize());
        assert!(matches_recipe(&r, &same));
        let mut other = ab_recipe(false);
        assert!(other.normalize());
        assert!(!matches_recipe(&other, &r));
    }

    #[test]
    fn test_matches_are_sound() {
        let r = ab_recipe(true);
        for m in ab_shape().find(&r) {
            for value in m.matched.values().flatten() {
                if let ElementRef::Connection { particle, name } = value {
                    let spec = r.particle(*particle).spec().unwrap();
                    assert!(spec.connection(name).is_some());
                }
            }
        }
    }

    #[test]
    fn test_direction_counts() {
        let mut r = Recipe::new();
        let p = r.new_particle(Some("P"));
        let h = r.new_handle();
        for (name, d) in [("a", Some(Direction::In)), ("b", Some(Direction::Inout)), ("c", None)] {
            let c = r.add_connection(p, name);
            if let Some(d) = d {
                r.set_connection_direction(c, d);
            }
            r.connect(c, h);
        }
        let counts = direction_counts(&r, h);
        assert_eq!(counts.reads, 2);
        assert_eq!(counts.writes, 1);
        assert_eq!(counts.unknown, 1);
    }
}
