//! Attaches each free handle to one of the recipe's missing or unbound
//! required connections.

use crate::core::recipe::{HandleId, Recipe};
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Direction;
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Rewrite, Walker, WalkerTactic};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct MatchFreeHandlesToConnections;

impl RecipeVisitor for MatchFreeHandlesToConnections {
    fn on_handle<'a>(&'a self, recipe: &'a Recipe, h: HandleId) -> Continuation<'a, HandleId> {
        if !recipe.handle(h).is_free() {
            return Continuation::Skip;
        }
        let rewrites = recipe
            .disconnected_connections()
            .into_iter()
            .filter(|d| !d.spec.optional && d.spec.name != "descriptions")
            .filter(|d| d.spec.direction != Direction::Host)
            .map(|d| -> Rewrite<'a, HandleId> {
                Box::new(move |recipe: &mut Recipe, h| {
                    let c = recipe.ensure_connection(d.particle, &d.spec.name);
                    recipe.connect(c, h);
                    1.0
                })
            })
            .collect();
        Continuation::alternatives(rewrites)
    }
}

#[async_trait]
impl Strategy for MatchFreeHandlesToConnections {
    fn name(&self) -> &str {
        "MatchFreeHandlesToConnections"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Independent, self.name())
    }
}
