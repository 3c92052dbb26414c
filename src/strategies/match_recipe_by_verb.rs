//! Replaces verb-only particles with context recipes carrying that verb.
//!
//! A candidate recipe must be able to take over every handle and slot the
//! particle was wired to. The rewrite merges the candidate, retires the
//! particle, and moves its handles and slots onto the merged particles.

use crate::core::checker::TypeChecker;
use crate::core::context::PlanningContext;
use crate::core::recipe::{HandleId, ParticleId, Recipe, SlotId};
use crate::core::spec::ConnectionSpec;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Direction;
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Rewrite, Walker, WalkerTactic};
use async_trait::async_trait;
use std::sync::Arc;

pub struct MatchRecipeByVerb {
    context: Arc<PlanningContext>,
}

impl MatchRecipeByVerb {
    pub fn new(context: Arc<PlanningContext>) -> Self {
        Self { context }
    }
}

/// One handle connection of the particle being replaced.
#[derive(Debug, Clone)]
struct HandleConstraint {
    /// `None` for an unnamed connection, which any spec connection may take.
    name: Option<String>,
    direction: Option<Direction>,
    handle: Option<HandleId>,
}

/// One consumed slot of the particle being replaced.
#[derive(Debug, Clone)]
struct SlotConstraint {
    name: String,
    /// Kept only when something else provides the slot.
    target: Option<SlotId>,
    /// Provided sub-slots, with the slot when it has consumers.
    provided: Vec<(String, Option<SlotId>)>,
}

impl SlotConstraint {
    fn is_wired(&self) -> bool {
        self.target.is_some() || self.provided.iter().any(|(_, s)| s.is_some())
    }
}

/// Whether `cs` on particle `p` of `owner` can take the constraint's place.
/// Types are checked against the constrained handle in `host`.
fn connection_fits(
    host: &Recipe,
    owner: &Recipe,
    p: ParticleId,
    cs: &ConnectionSpec,
    constraint: &HandleConstraint,
) -> bool {
    if let Some(c) = owner.particle(p).connection(&cs.name) {
        if owner.connection(c).handle().is_some() {
            return false;
        }
    }
    if constraint.direction.is_some_and(|d| d != cs.direction) {
        return false;
    }
    match constraint.handle {
        Some(h) => TypeChecker::accepts_declared_type(
            host.type_vars(),
            &host.handle_type_list(h),
            &cs.ty,
            cs.direction,
        ),
        None => true,
    }
}

/// The spec connections of particle `p` a constraint may land on.
fn fitting_connections<'r>(
    host: &Recipe,
    owner: &'r Recipe,
    p: ParticleId,
    constraint: &HandleConstraint,
) -> Vec<&'r ConnectionSpec> {
    let Some(spec) = owner.particle(p).spec() else {
        return Vec::new();
    };
    spec.connections
        .iter()
        .filter(|cs| constraint.name.as_deref().map_or(true, |n| n == cs.name))
        .filter(|cs| connection_fits(host, owner, p, cs, constraint))
        .collect()
}

fn slot_fits(recipe: &Recipe, p: ParticleId, constraint: &SlotConstraint) -> bool {
    let particle = recipe.particle(p);
    let Some(slot_spec) = particle.spec().and_then(|s| s.slot(&constraint.name)) else {
        return false;
    };
    if constraint.target.is_some() {
        let occupied = particle
            .consumed_slot(&constraint.name)
            .is_some_and(|sc| recipe.slot_connection(sc).target_slot().is_some());
        if occupied {
            return false;
        }
    }
    constraint
        .provided
        .iter()
        .all(|(name, _)| slot_spec.provides.iter().any(|ps| &ps.name == name))
}

fn handle_constraints(recipe: &Recipe, p: ParticleId) -> Option<Vec<HandleConstraint>> {
    let particle = recipe.particle(p);
    let mut out: Vec<HandleConstraint> = particle
        .connections()
        .map(|(name, c)| HandleConstraint {
            name: Some(name.to_string()),
            direction: recipe.connection(c).direction(),
            handle: recipe.connection(c).handle(),
        })
        .collect();
    for c in particle.unnamed_connections() {
        let conn = recipe.connection(*c);
        // Nothing to match an unnamed, unbound connection against.
        conn.handle()?;
        out.push(HandleConstraint {
            name: None,
            direction: conn.direction(),
            handle: conn.handle(),
        });
    }
    Some(out)
}

fn slot_constraints(recipe: &Recipe, p: ParticleId) -> Vec<SlotConstraint> {
    recipe
        .particle(p)
        .consumed_slots()
        .map(|(name, sc)| {
            let conn = recipe.slot_connection(sc);
            SlotConstraint {
                name: name.to_string(),
                target: conn
                    .target_slot()
                    .filter(|s| recipe.slot(*s).source_connection().is_some()),
                provided: conn
                    .provided_slots()
                    .map(|(n, s)| {
                        let used = !recipe.slot(s).consume_connections().is_empty();
                        (n.to_string(), used.then_some(s))
                    })
                    .collect(),
            }
        })
        .collect()
}

fn satisfies(
    recipe: &Recipe,
    candidate: &Recipe,
    handles: &[HandleConstraint],
    slots: &[SlotConstraint],
) -> bool {
    let handles_ok = handles.iter().all(|hc| {
        candidate
            .particle_ids()
            .any(|cp| !fitting_connections(recipe, candidate, cp, hc).is_empty())
    });
    handles_ok
        && slots
            .iter()
            .all(|sc| candidate.particle_ids().any(|cp| slot_fits(candidate, cp, sc)))
}

/// Merge `candidate` in place of `p` and rewire what `p` was connected to.
fn replace(
    recipe: &mut Recipe,
    p: ParticleId,
    candidate: &Recipe,
    handles: &[HandleConstraint],
    slots: &[SlotConstraint],
) {
    recipe.retire_particle(p);
    let map = candidate.merge_into(recipe);
    let merged: Vec<ParticleId> = candidate.particle_ids().map(|cp| map.particle(cp)).collect();

    for sc in slots.iter().filter(|sc| sc.is_wired()) {
        let view: &Recipe = recipe;
        let Some(mp) = merged.iter().copied().find(|mp| slot_fits(view, *mp, sc)) else {
            continue;
        };
        let existing = recipe.particle(mp).consumed_slot(&sc.name);
        let conn = match existing {
            Some(conn) => conn,
            None => recipe.new_slot_connection(mp, &sc.name),
        };
        if let Some(target) = sc.target {
            recipe.connect_slot(conn, target);
        }
        for (name, old) in &sc.provided {
            let Some(old) = *old else {
                continue;
            };
            let replaced = recipe
                .slot_connection(conn)
                .provided_slots()
                .find(|(n, _)| *n == name.as_str())
                .map(|(_, s)| s);
            if let Some(new) = replaced {
                let consumers = recipe.slot(new).consume_connections().to_vec();
                for consumer in consumers {
                    recipe.connect_slot(consumer, old);
                }
                recipe.retire_slot(new);
            }
            recipe.provide_slot(conn, name, old);
        }
    }

    for hc in handles {
        let Some(h) = hc.handle else {
            continue;
        };
        let view: &Recipe = recipe;
        let target = merged.iter().find_map(|mp| {
            fitting_connections(view, view, *mp, hc)
                .first()
                .map(|cs| (*mp, cs.name.clone()))
        });
        if let Some((mp, name)) = target {
            let c = recipe.ensure_connection(mp, &name);
            recipe.connect(c, h);
        }
    }
}

impl RecipeVisitor for MatchRecipeByVerb {
    fn on_particle<'a>(&'a self, recipe: &'a Recipe, p: ParticleId) -> Continuation<'a, ParticleId> {
        let particle = recipe.particle(p);
        if particle.name().is_some() {
            return Continuation::Skip;
        }
        let Some(verb) = particle.primary_verb() else {
            return Continuation::Skip;
        };
        let Some(handles) = handle_constraints(recipe, p) else {
            return Continuation::Skip;
        };
        let slots = slot_constraints(recipe, p);
        let rewrites = self
            .context
            .recipes_by_verb(verb)
            .into_iter()
            .filter(|candidate| satisfies(recipe, candidate, &handles, &slots))
            .map(|candidate| -> Rewrite<'a, ParticleId> {
                let handles = handles.clone();
                let slots = slots.clone();
                Box::new(move |recipe: &mut Recipe, p| {
                    replace(recipe, p, candidate, &handles, &slots);
                    1.0
                })
            })
            .collect();
        Continuation::alternatives(rewrites)
    }
}

#[async_trait]
impl Strategy for MatchRecipeByVerb {
    fn name(&self) -> &str {
        "MatchRecipeByVerb"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Schema;
    use crate::core::spec::{ConsumeSlotSpec, ParticleSpec, ProvideSlotSpec};
    use crate::core::ty::Type;
    use crate::core::types::Fate;
    use crate::strategies::fixtures::params;

    fn thing() -> Type {
        Type::entity(Schema::new("Thing"))
    }

    fn consume(name: &str, provides: &[&str]) -> ConsumeSlotSpec {
        ConsumeSlotSpec {
            name: name.to_string(),
            required: true,
            is_set: false,
            provides: provides
                .iter()
                .map(|p| ProvideSlotSpec {
                    name: p.to_string(),
                    is_set: false,
                })
                .collect(),
        }
    }

    /// A context recipe for `verb` holding one particle built from `spec`.
    fn offered(verb: &str, spec: ParticleSpec) -> Recipe {
        let mut r = Recipe::named(format!("{}Recipe", spec.name));
        r.set_verbs(vec![verb.to_string()]);
        let name = spec.name.clone();
        let p = r.new_particle(Some(name.as_str()));
        r.set_particle_spec(p, Arc::new(spec));
        r
    }

    fn context(recipes: Vec<Recipe>) -> Arc<PlanningContext> {
        Arc::new(PlanningContext {
            recipes,
            ..PlanningContext::default()
        })
    }

    /// A `&show` particle reading `list` from a created handle.
    fn verb_reader(direction: Direction) -> Recipe {
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_verbs(p, vec!["show".to_string()]);
        let c = r.add_connection(p, "list");
        r.set_connection_direction(c, direction);
        let h = r.declare_handle(Fate::Create, None);
        r.connect(c, h);
        r
    }

    fn particle_named(r: &Recipe, name: &str) -> ParticleId {
        r.particles()
            .find(|(_, p)| p.name() == Some(name))
            .map(|(id, _)| id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_verb_particle_replaced_by_recipe() {
        let ctx = context(vec![offered(
            "show",
            ParticleSpec::new("ShowList").with_connection("list", Direction::In, thing()),
        )]);
        let out = MatchRecipeByVerb::new(ctx).generate(&params(verb_reader(Direction::In))).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].valid);
        assert_eq!(out[0].score, 1.0);
        let result = &out[0].result;
        assert_eq!(result.particle_ids().count(), 1);
        let c = result.particle(particle_named(result, "ShowList")).connection("list").unwrap();
        let h = result.connection(c).handle().unwrap();
        assert_eq!(result.handle(h).fate(), Fate::Create);
        assert_eq!(result.handle(h).connections(), &[c]);
        assert_eq!(result.handle_ids().count(), 1);
    }

    #[tokio::test]
    async fn test_direction_mismatch_rejects_candidate() {
        let ctx = context(vec![offered(
            "show",
            ParticleSpec::new("ShowList").with_connection("list", Direction::In, thing()),
        )]);
        let out = MatchRecipeByVerb::new(ctx).generate(&params(verb_reader(Direction::Out))).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_rejects_candidate() {
        let ctx = context(vec![offered(
            "show",
            ParticleSpec::new("ShowList").with_connection(
                "list",
                Direction::In,
                Type::entity(Schema::new("Person")),
            ),
        )]);
        let mut r = verb_reader(Direction::In);
        let h = r.handle_ids().next().unwrap();
        r.set_mapped_type(h, Some(thing()));
        let out = MatchRecipeByVerb::new(ctx).generate(&params(r)).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_connection_lands_on_any_fitting_connection() {
        let ctx = context(vec![offered(
            "show",
            ParticleSpec::new("ShowList").with_connection("items", Direction::In, thing()),
        )]);
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_verbs(p, vec!["show".to_string()]);
        let c = r.add_unnamed_connection(p);
        r.set_connection_direction(c, Direction::In);
        let h = r.declare_handle(Fate::Create, None);
        r.connect(c, h);
        let out = MatchRecipeByVerb::new(ctx).generate(&params(r)).await;
        assert_eq!(out.len(), 1);
        let result = &out[0].result;
        let merged = result.particle(particle_named(result, "ShowList"));
        assert!(merged.unnamed_connections().is_empty());
        let items = merged.connection("items").unwrap();
        assert!(result.connection(items).handle().is_some());
    }

    #[tokio::test]
    async fn test_unbound_unnamed_connection_matches_nothing() {
        let ctx = context(vec![offered(
            "show",
            ParticleSpec::new("ShowList").with_connection("items", Direction::In, thing()),
        )]);
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_verbs(p, vec!["show".to_string()]);
        r.add_unnamed_connection(p);
        let out = MatchRecipeByVerb::new(ctx).generate(&params(r)).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_slots_move_to_merged_particle() {
        let ctx = context(vec![offered(
            "show",
            ParticleSpec::new("ShowList").with_slot(consume("root", &["detail"])),
        )]);
        let mut r = Recipe::new();
        // Host provides `root`; the verb particle consumes it and provides
        // `detail`, which a third particle consumes.
        let host = r.new_particle(Some("Host"));
        let host_conn = r.new_slot_connection(host, "main");
        let root = r.new_slot(Some("root"));
        r.provide_slot(host_conn, "root", root);
        let p = r.new_particle(None);
        r.set_particle_verbs(p, vec!["show".to_string()]);
        let verb_conn = r.new_slot_connection(p, "root");
        r.connect_slot(verb_conn, root);
        let detail = r.new_slot(Some("detail"));
        r.provide_slot(verb_conn, "detail", detail);
        let inner = r.new_particle(Some("Inner"));
        let inner_conn = r.new_slot_connection(inner, "detail");
        r.connect_slot(inner_conn, detail);

        let out = MatchRecipeByVerb::new(ctx).generate(&params(r)).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].valid);
        let result = &out[0].result;
        assert_eq!(result.particle_ids().count(), 3);
        assert_eq!(result.slot_ids().count(), 2);

        let host_sc = result.particle(particle_named(result, "Host")).consumed_slot("main").unwrap();
        let show_sc = result.particle(particle_named(result, "ShowList")).consumed_slot("root").unwrap();
        let inner_sc = result.particle(particle_named(result, "Inner")).consumed_slot("detail").unwrap();

        let root = result.slot_connection(show_sc).target_slot().unwrap();
        assert_eq!(result.slot(root).source_connection(), Some(host_sc));
        assert_eq!(result.slot(root).consume_connections(), &[show_sc]);
        let provided: Vec<(&str, SlotId)> = result.slot_connection(show_sc).provided_slots().collect();
        assert_eq!(provided.len(), 1);
        let (name, detail) = provided[0];
        assert_eq!(name, "detail");
        assert_eq!(result.slot(detail).source_connection(), Some(show_sc));
        assert_eq!(result.slot_connection(inner_sc).target_slot(), Some(detail));
    }

    #[tokio::test]
    async fn test_candidate_without_slot_rejected() {
        let ctx = context(vec![offered("show", ParticleSpec::new("ShowList"))]);
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_verbs(p, vec!["show".to_string()]);
        r.new_slot_connection(p, "root");
        let out = MatchRecipeByVerb::new(ctx).generate(&params(r)).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_named_particles_and_other_verbs_skipped() {
        let ctx = context(vec![offered(
            "edit",
            ParticleSpec::new("EditList").with_connection("list", Direction::In, thing()),
        )]);
        let r = verb_reader(Direction::In);
        assert!(MatchRecipeByVerb::new(ctx.clone()).generate(&params(r)).await.is_empty());

        let mut named = Recipe::new();
        let p = named.new_particle(Some("Already"));
        named.set_particle_verbs(p, vec!["edit".to_string()]);
        assert!(MatchRecipeByVerb::new(ctx).generate(&params(named)).await.is_empty());
    }
}
