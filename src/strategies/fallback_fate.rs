//! Gives search-built recipes a fate for their undecided handles: `copy`
//! when some connection writes the handle, `map` otherwise.

use crate::core::recipe::{HandleId, Recipe};
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Fate;
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Walker, WalkerTactic};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct FallbackFate;

impl RecipeVisitor for FallbackFate {
    fn on_handle<'a>(&'a self, recipe: &'a Recipe, h: HandleId) -> Continuation<'a, HandleId> {
        let searched = recipe
            .search()
            .is_some_and(|s| !s.resolved_tokens().is_empty());
        if !searched {
            return Continuation::Skip;
        }
        let handle = recipe.handle(h);
        if handle.fate() != Fate::Unset || handle.id().is_some() {
            return Continuation::Skip;
        }
        let written = handle
            .connections()
            .iter()
            .any(|c| recipe.connection(*c).is_output());
        let fate = if written { Fate::Copy } else { Fate::Map };
        Continuation::one(move |recipe: &mut Recipe, h| {
            recipe.set_fate(h, fate);
            0.0
        })
    }
}

#[async_trait]
impl Strategy for FallbackFate {
    fn name(&self) -> &str {
        "FallbackFate"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}
