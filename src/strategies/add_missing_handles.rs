//! Gives every missing or unbound required connection its own undecided
//! handle, once constraints are gone and no handle is left dangling.

use crate::core::recipe::Recipe;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Direction;
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Walker, WalkerTactic};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct AddMissingHandles;

/// Recipes the handle-adding strategies are allowed to touch.
pub(crate) fn ready_for_handles(recipe: &Recipe) -> bool {
    recipe.constraints().is_empty()
        && recipe.free_handles().is_empty()
        && recipe.particles().all(|(_, p)| p.spec().is_some())
}

impl RecipeVisitor for AddMissingHandles {
    fn on_recipe<'a>(&'a self, recipe: &'a Recipe) -> Continuation<'a, ()> {
        if !ready_for_handles(recipe) {
            return Continuation::Skip;
        }
        let missing: Vec<_> = recipe
            .disconnected_connections()
            .into_iter()
            .filter(|d| !d.spec.optional && d.spec.name != "descriptions")
            .filter(|d| d.spec.direction != Direction::Host)
            .collect();
        if missing.is_empty() {
            return Continuation::Skip;
        }
        Continuation::one(move |recipe: &mut Recipe, ()| {
            for d in &missing {
                let c = recipe.ensure_connection(d.particle, &d.spec.name);
                let h = recipe.new_handle();
                recipe.connect(c, h);
            }
            0.0
        })
    }
}

#[async_trait]
impl Strategy for AddMissingHandles {
    fn name(&self) -> &str {
        "AddMissingHandles"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::fixtures::{number, spec};
    use crate::core::spec::ParticleSpec;
    use crate::core::types::Fate;
    use crate::strategies::fixtures::params;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_adds_one_handle_per_required_connection() {
        let spec = ParticleSpec::new("A")
            .with_connection("x", Direction::In, number())
            .with_connection("descriptions", Direction::Out, number())
            .with_optional_connection("y", Direction::Out, number());
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, Arc::new(spec));

        let out = AddMissingHandles.generate(&params(r)).await;
        assert_eq!(out.len(), 1);
        let result = &out[0].result;
        assert_eq!(result.handles().count(), 1);
        let (_, handle) = result.handles().next().unwrap();
        assert_eq!(handle.fate(), Fate::Unset);
        let (_, particle) = result.particles().next().unwrap();
        assert!(particle.connection("x").is_some());
        assert!(particle.connection("y").is_none());
        assert_eq!(out[0].score, 0.0);
    }

    #[tokio::test]
    async fn test_skips_recipes_with_constraints() {
        let a = spec("A", &[("x", Direction::Out)]);
        let b = spec("B", &[("y", Direction::In)]);
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, a.clone());
        r.new_connection_constraint(a, "x", b, "y", Direction::Out);
        assert!(AddMissingHandles.generate(&params(r)).await.is_empty());
    }

    #[tokio::test]
    async fn test_skips_recipes_with_free_handles() {
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, spec("A", &[("x", Direction::In)]));
        r.new_handle();
        assert!(AddMissingHandles.generate(&params(r)).await.is_empty());
    }
}
