//! Names unnamed connections after spec connections the particle does not
//! use yet, when the handle's types allow it.

use crate::core::checker::TypeChecker;
use crate::core::recipe::{ConnectionId, Recipe};
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Rewrite, Walker, WalkerTactic};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct NameUnnamedConnections;

impl RecipeVisitor for NameUnnamedConnections {
    fn on_handle_connection<'a>(
        &'a self,
        recipe: &'a Recipe,
        c: ConnectionId,
    ) -> Continuation<'a, ConnectionId> {
        let conn = recipe.connection(c);
        if conn.name().is_some() {
            return Continuation::Skip;
        }
        let particle = recipe.particle(conn.particle());
        let Some(spec) = particle.spec() else {
            return Continuation::Skip;
        };
        let types = conn
            .handle()
            .map(|h| recipe.handle_type_list(h))
            .unwrap_or_default();
        let rewrites = spec
            .connections
            .iter()
            .filter(|cs| particle.connection(&cs.name).is_none())
            .filter(|cs| conn.direction().is_none_or(|d| d.satisfies(cs.direction)))
            .filter(|cs| TypeChecker::accepts_declared_type(recipe.type_vars(), &types, &cs.ty, cs.direction))
            .map(|cs| -> Rewrite<'a, ConnectionId> {
                Box::new(move |recipe: &mut Recipe, c| {
                    recipe.name_connection(c, &cs.name);
                    1.0
                })
            })
            .collect();
        Continuation::alternatives(rewrites)
    }
}

#[async_trait]
impl Strategy for NameUnnamedConnections {
    fn name(&self) -> &str {
        "NameUnnamedConnections"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}
