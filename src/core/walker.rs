//! Recipe traversal and rewrite application.
//!
//! A [`RecipeVisitor`] looks at each element of a recipe and answers with a
//! [`Continuation`]: nothing, one rewrite, or alternative rewrites. The
//! [`Walker`] turns those answers into descendant recipes. Each descendant is
//! built on its own unfrozen clone, normalized, and hashed if valid.

use super::recipe::{
    CloneMap, ConnectionId, HandleId, ParticleId, Recipe, Remap, SlotConnectionId, SlotId,
};
use serde::Serialize;
use std::sync::Arc;

/// A rewrite of one element. Receives the clone and the element's id in it;
/// returns its score contribution.
pub type Rewrite<'a, T> = Box<dyn Fn(&mut Recipe, T) -> f64 + 'a>;

pub enum Continuation<'a, T> {
    Skip,
    One(Rewrite<'a, T>),
    Alternatives(Vec<Rewrite<'a, T>>),
}

impl<'a, T> Continuation<'a, T> {
    pub fn one(f: impl Fn(&mut Recipe, T) -> f64 + 'a) -> Self {
        Continuation::One(Box::new(f))
    }

    /// `Skip` when `alternatives` is empty.
    pub fn alternatives(alternatives: Vec<Rewrite<'a, T>>) -> Self {
        if alternatives.is_empty() {
            Continuation::Skip
        } else {
            Continuation::Alternatives(alternatives)
        }
    }

    fn into_vec(self) -> Vec<Rewrite<'a, T>> {
        match self {
            Continuation::Skip => Vec::new(),
            Continuation::One(f) => vec![f],
            Continuation::Alternatives(fs) => fs,
        }
    }
}

/// Per-element callbacks. Every method defaults to `Skip`.
pub trait RecipeVisitor {
    fn on_recipe<'a>(&'a self, _recipe: &'a Recipe) -> Continuation<'a, ()> {
        Continuation::Skip
    }

    fn on_particle<'a>(&'a self, _recipe: &'a Recipe, _p: ParticleId) -> Continuation<'a, ParticleId> {
        Continuation::Skip
    }

    fn on_handle_connection<'a>(
        &'a self,
        _recipe: &'a Recipe,
        _c: ConnectionId,
    ) -> Continuation<'a, ConnectionId> {
        Continuation::Skip
    }

    fn on_handle<'a>(&'a self, _recipe: &'a Recipe, _h: HandleId) -> Continuation<'a, HandleId> {
        Continuation::Skip
    }

    fn on_slot_connection<'a>(
        &'a self,
        _recipe: &'a Recipe,
        _sc: SlotConnectionId,
    ) -> Continuation<'a, SlotConnectionId> {
        Continuation::Skip
    }

    fn on_slot<'a>(&'a self, _recipe: &'a Recipe, _s: SlotId) -> Continuation<'a, SlotId> {
        Continuation::Skip
    }
}

/// How continuations from different elements combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerTactic {
    /// One descendant per combination: one rewrite from every element that
    /// proposed any.
    Permuted,
    /// One descendant per rewrite, each applied alone.
    Independent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Derivation {
    /// Content hash of the parent; `None` for seeded recipes.
    pub parent: Option<String>,
    pub strategy: String,
}

/// A candidate recipe with its provenance.
#[derive(Debug, Clone)]
pub struct Descendant {
    pub result: Recipe,
    pub score: f64,
    pub derivation: Vec<Derivation>,
    /// Digest of `result`; `None` when normalization failed.
    pub hash: Option<String>,
    pub valid: bool,
}

impl Descendant {
    /// Normalize `recipe` and wrap it. Used for seeds and rewrite results.
    pub fn new(mut recipe: Recipe, score: f64, parent: Option<String>, strategy: &str) -> Self {
        let valid = recipe.normalize();
        let hash = valid.then(|| recipe.digest());
        Self {
            result: recipe,
            score,
            derivation: vec![Derivation {
                parent,
                strategy: strategy.to_string(),
            }],
            hash,
            valid,
        }
    }

    pub fn strategies(&self) -> impl Iterator<Item = &str> {
        self.derivation.iter().map(|d| d.strategy.as_str())
    }
}

type BoundRewrite<'a> = Box<dyn Fn(&mut Recipe, &CloneMap) -> f64 + 'a>;

fn bind<'a, T: Remap + 'a>(continuation: Continuation<'a, T>, id: T) -> Vec<BoundRewrite<'a>> {
    continuation
        .into_vec()
        .into_iter()
        .map(|f| -> BoundRewrite<'a> { Box::new(move |r: &mut Recipe, map: &CloneMap| f(r, id.remap(map))) })
        .collect()
}

pub struct Walker;

impl Walker {
    /// Visit every parent and collect descendants, in parent order.
    pub fn over<V: RecipeVisitor + ?Sized>(
        parents: &[Arc<Descendant>],
        visitor: &V,
        tactic: WalkerTactic,
        strategy: &str,
    ) -> Vec<Descendant> {
        let mut out = Vec::new();
        for parent in parents {
            out.extend(Self::walk(parent, visitor, tactic, strategy));
        }
        out
    }

    /// Descendants of a single parent.
    pub fn walk<V: RecipeVisitor + ?Sized>(
        parent: &Descendant,
        visitor: &V,
        tactic: WalkerTactic,
        strategy: &str,
    ) -> Vec<Descendant> {
        let recipe = &parent.result;
        let mut updates: Vec<Vec<BoundRewrite<'_>>> = Vec::new();
        updates.push(bind(visitor.on_recipe(recipe), ()));
        // Retired entities wait for normalization and are not visited.
        let live = |p: ParticleId| !recipe.particle(p).is_retired();
        for p in recipe.particle_ids().filter(|p| live(*p)) {
            updates.push(bind(visitor.on_particle(recipe, p), p));
        }
        for c in recipe.handle_connections() {
            if !live(recipe.connection(c).particle()) {
                continue;
            }
            updates.push(bind(visitor.on_handle_connection(recipe, c), c));
        }
        for h in recipe.handle_ids() {
            updates.push(bind(visitor.on_handle(recipe, h), h));
        }
        for sc in recipe.slot_connections() {
            if !live(recipe.slot_connection(sc).particle()) {
                continue;
            }
            updates.push(bind(visitor.on_slot_connection(recipe, sc), sc));
        }
        for s in recipe.slot_ids().filter(|s| !recipe.slot(*s).is_retired()) {
            updates.push(bind(visitor.on_slot(recipe, s), s));
        }
        updates.retain(|u| !u.is_empty());
        if updates.is_empty() {
            return Vec::new();
        }

        let descend = |steps: &[&BoundRewrite<'_>]| {
            let (mut copy, map) = recipe.clone_mutable();
            let score: f64 = steps.iter().map(|f| f(&mut copy, &map)).sum();
            Descendant::new(copy, parent.score + score, parent.hash.clone(), strategy)
        };

        match tactic {
            WalkerTactic::Independent => updates
                .iter()
                .flatten()
                .map(|f| descend(&[f]))
                .collect(),
            WalkerTactic::Permuted => {
                let mut out = Vec::new();
                let mut choice = vec![0usize; updates.len()];
                loop {
                    let steps: Vec<&BoundRewrite<'_>> = updates
                        .iter()
                        .zip(&choice)
                        .map(|(u, i)| &u[*i])
                        .collect();
                    out.push(descend(&steps));
                    // Advance the odometer; done once every position wraps.
                    let mut pos = 0;
                    loop {
                        if pos == choice.len() {
                            return out;
                        }
                        choice[pos] += 1;
                        if choice[pos] < updates[pos].len() {
                            break;
                        }
                        choice[pos] = 0;
                        pos += 1;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::fixtures::spec;
    use crate::core::types::{Direction, Fate};

    fn seed() -> Arc<Descendant> {
        let mut r = Recipe::new();
        let a = r.new_particle(None);
        r.set_particle_spec(a, spec("A", &[("x", Direction::In)]));
        let b = r.new_particle(None);
        r.set_particle_spec(b, spec("B", &[("y", Direction::In)]));
        r.new_handle();
        r.new_handle();
        Arc::new(Descendant::new(r, 1.0, None, "Seed"))
    }

    struct Fates;

    impl RecipeVisitor for Fates {
        fn on_handle<'a>(&'a self, _recipe: &'a Recipe, _h: HandleId) -> Continuation<'a, HandleId> {
            let create: Rewrite<'a, HandleId> = Box::new(|r: &mut Recipe, h: HandleId| {
                r.set_fate(h, Fate::Create);
                1.0
            });
            let map: Rewrite<'a, HandleId> = Box::new(|r: &mut Recipe, h: HandleId| {
                r.set_fate(h, Fate::Map);
                0.0
            });
            Continuation::alternatives(vec![create, map])
        }
    }

    #[test]
    fn test_permuted_crosses_alternatives() {
        let parent = seed();
        let out = Walker::over(&[parent.clone()], &Fates, WalkerTactic::Permuted, "Fates");
        assert_eq!(out.len(), 4);
        let scores: Vec<f64> = out.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![3.0, 2.0, 2.0, 1.0]);
        assert!(out.iter().all(|d| d.valid && d.hash.is_some()));
        assert_eq!(out[0].derivation[0].parent, parent.hash);
        assert_eq!(out[0].derivation[0].strategy, "Fates");
    }

    #[test]
    fn test_independent_applies_each_alone() {
        let out = Walker::over(&[seed()], &Fates, WalkerTactic::Independent, "Fates");
        assert_eq!(out.len(), 4);
        for d in &out {
            let set = d.result.handles().filter(|(_, h)| h.fate() != Fate::Unset).count();
            assert_eq!(set, 1);
        }
    }

    #[test]
    fn test_parent_is_untouched() {
        let parent = seed();
        let before = parent.result.to_string();
        Walker::over(&[parent.clone()], &Fates, WalkerTactic::Permuted, "Fates");
        assert_eq!(parent.result.to_string(), before);
    }

    struct Nothing;
    impl RecipeVisitor for Nothing {}

    #[test]
    fn test_no_continuations_no_descendants() {
        assert!(Walker::over(&[seed()], &Nothing, WalkerTactic::Permuted, "Nothing").is_empty());
    }

    struct Breaks;

    impl RecipeVisitor for Breaks {
        fn on_recipe<'a>(&'a self, _recipe: &'a Recipe) -> Continuation<'a, ()> {
            Continuation::one(|r: &mut Recipe, ()| {
                r.declare_handle(Fate::Use, Some("dup"));
                r.declare_handle(Fate::Use, Some("dup"));
                0.0
            })
        }
    }

    #[test]
    fn test_invalid_descendant_is_recorded() {
        let out = Walker::over(&[seed()], &Breaks, WalkerTactic::Independent, "Breaks");
        assert_eq!(out.len(), 1);
        assert!(!out[0].valid);
        assert!(out[0].hash.is_none());
    }
}
