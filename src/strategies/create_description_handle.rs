use crate::core::recipe::{ConnectionId, Recipe};
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Fate;
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Walker, WalkerTactic};
use async_trait::async_trait;

/// Binds an unbound `descriptions` connection to a fresh `create` handle.
#[derive(Debug, Default)]
pub struct CreateDescriptionHandle;

impl RecipeVisitor for CreateDescriptionHandle {
    fn on_handle_connection<'a>(
        &'a self,
        recipe: &'a Recipe,
        c: ConnectionId,
    ) -> Continuation<'a, ConnectionId> {
        let conn = recipe.connection(c);
        if conn.handle().is_some() || conn.name() != Some("descriptions") {
            return Continuation::Skip;
        }
        Continuation::one(|recipe: &mut Recipe, c| {
            let h = recipe.declare_handle(Fate::Create, None);
            recipe.connect(c, h);
            1.0
        })
    }
}

#[async_trait]
impl Strategy for CreateDescriptionHandle {
    fn name(&self) -> &str {
        "CreateDescriptionHandle"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}
