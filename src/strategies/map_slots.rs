//! Connects consumed slots to a slot of the same name, either one another
//! particle of the recipe provides or one offered by the context.

use crate::core::context::PlanningContext;
use crate::core::recipe::{Recipe, SlotConnectionId, SlotId};
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Rewrite, Walker, WalkerTactic};
use async_trait::async_trait;
use std::sync::Arc;

pub struct MapSlots {
    context: Arc<PlanningContext>,
}

impl MapSlots {
    pub fn new(context: Arc<PlanningContext>) -> Self {
        Self { context }
    }

    fn local_candidates(recipe: &Recipe, sc: SlotConnectionId) -> Vec<SlotId> {
        let conn = recipe.slot_connection(sc);
        recipe
            .slot_ids()
            .filter(|s| {
                let slot = recipe.slot(*s);
                slot.name() == Some(conn.name())
                    && slot
                        .source_connection()
                        .is_some_and(|src| recipe.slot_connection(src).particle() != conn.particle())
            })
            .collect()
    }
}

impl RecipeVisitor for MapSlots {
    fn on_slot_connection<'a>(
        &'a self,
        recipe: &'a Recipe,
        sc: SlotConnectionId,
    ) -> Continuation<'a, SlotConnectionId> {
        let conn = recipe.slot_connection(sc);
        if conn.target_slot().is_some() {
            return Continuation::Skip;
        }
        let mut rewrites: Vec<Rewrite<'a, SlotConnectionId>> = Self::local_candidates(recipe, sc)
            .into_iter()
            .map(|s| -> Rewrite<'a, SlotConnectionId> {
                Box::new(move |recipe: &mut Recipe, sc| {
                    recipe.connect_slot(sc, s);
                    1.0
                })
            })
            .collect();

        let taken = |id: &str| recipe.slot_ids().any(|s| recipe.slot(s).id() == Some(id));
        for slot in self.context.slots.iter() {
            if slot.name != conn.name() || taken(&slot.id) {
                continue;
            }
            rewrites.push(Box::new(move |recipe: &mut Recipe, sc| {
                let s = recipe.new_slot(Some(&slot.name));
                recipe.set_slot_id(s, &slot.id);
                recipe.set_slot_tags(s, slot.tags.clone());
                recipe.connect_slot(sc, s);
                1.0
            }));
        }
        Continuation::alternatives(rewrites)
    }
}

#[async_trait]
impl Strategy for MapSlots {
    fn name(&self) -> &str {
        "MapSlots"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::SlotInfo;
    use crate::core::spec::{ConsumeSlotSpec, ParticleSpec, ProvideSlotSpec};
    use crate::strategies::fixtures::params;

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

    fn context(slots: Vec<SlotInfo>) -> Arc<PlanningContext> {
        Arc::new(PlanningContext {
            slots,
            ..PlanningContext::default()
        })
    }

    #[tokio::test]
    async fn test_maps_root_to_context_slot() {
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, Arc::new(ParticleSpec::new("List").with_slot(consume("root", &[]))));
        r.new_slot_connection(p, "root");
        let ctx = context(vec![SlotInfo {
            id: "root-01".to_string(),
            name: "root".to_string(),
            tags: Vec::new(),
        }]);
        let out = MapSlots::new(ctx).generate(&params(r)).await;
        assert_eq!(out.len(), 1);
        let result = &out[0].result;
        let s = result.slot_ids().next().unwrap();
        assert_eq!(result.slot(s).id(), Some("root-01"));
        assert!(result.is_resolved());
    }

    #[tokio::test]
    async fn test_maps_to_provided_slot() {
        let mut r = Recipe::new();
        let list = r.new_particle(None);
        r.set_particle_spec(
            list,
            Arc::new(ParticleSpec::new("List").with_slot(consume("root", &["item"]))),
        );
        let root = r.new_slot_connection(list, "root");
        let item = r.new_slot(None);
        r.provide_slot(root, "item", item);
        let detail = r.new_particle(None);
        r.set_particle_spec(
            detail,
            Arc::new(ParticleSpec::new("Detail").with_slot(consume("item", &[]))),
        );
        r.new_slot_connection(detail, "item");

        let out = MapSlots::new(context(Vec::new())).generate(&params(r)).await;
        assert_eq!(out.len(), 1);
        let result = &out[0].result;
        let bound = result
            .slot_connections()
            .into_iter()
            .filter(|sc| result.slot_connection(*sc).target_slot().is_some())
            .count();
        assert_eq!(bound, 1);
    }
}
