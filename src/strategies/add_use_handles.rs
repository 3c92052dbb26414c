//! Binds declared but unbound required connections to new `use` handles.

use crate::core::recipe::Recipe;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::{Direction, Fate};
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Walker, WalkerTactic};
use crate::strategies::add_missing_handles::ready_for_handles;
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct AddUseHandles;

impl RecipeVisitor for AddUseHandles {
    fn on_recipe<'a>(&'a self, recipe: &'a Recipe) -> Continuation<'a, ()> {
        if !ready_for_handles(recipe) {
            return Continuation::Skip;
        }
        let unbound: Vec<_> = recipe
            .handle_connections()
            .into_iter()
            .filter(|c| {
                let conn = recipe.connection(*c);
                conn.handle().is_none()
                    && conn.name().is_some_and(|n| n != "descriptions")
                    && conn.direction() != Some(Direction::Host)
                    && !recipe.is_optional(*c)
            })
            .collect();
        if unbound.is_empty() {
            return Continuation::Skip;
        }
        Continuation::one(move |recipe: &mut Recipe, ()| {
            for c in &unbound {
                let h = recipe.declare_handle(Fate::Use, None);
                recipe.connect(*c, h);
            }
            0.0
        })
    }
}

#[async_trait]
impl Strategy for AddUseHandles {
    fn name(&self) -> &str {
        "AddUseHandles"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::fixtures::spec;
    use crate::strategies::fixtures::params;

    #[tokio::test]
    async fn test_unbound_connections_get_use_handles() {
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, spec("A", &[("x", Direction::In), ("descriptions", Direction::Out)]));
        r.add_connection(p, "x");
        r.add_connection(p, "descriptions");

        let out = AddUseHandles.generate(&params(r)).await;
        assert_eq!(out.len(), 1);
        let result = &out[0].result;
        assert_eq!(result.handles().count(), 1);
        let (_, handle) = result.handles().next().unwrap();
        assert_eq!(handle.fate(), Fate::Use);
        let (_, particle) = result.particles().next().unwrap();
        let descriptions = particle.connection("descriptions").unwrap();
        assert!(result.connection(descriptions).handle().is_none());
    }

    #[tokio::test]
    async fn test_nothing_unbound_nothing_generated() {
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, spec("A", &[("x", Direction::In)]));
        let c = r.add_connection(p, "x");
        let h = r.new_handle();
        r.connect(c, h);
        assert!(AddUseHandles.generate(&params(r)).await.is_empty());
    }
}
