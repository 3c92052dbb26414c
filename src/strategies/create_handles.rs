//! Marks undecided, id-less handles as `create`.
//!
//! A handle both read and written scores 1. A handle that is only read
//! scores 0, one only written (or not connected at all) scores -1. Handles
//! with connections of unknown direction are left alone unless they already
//! have both a reader and a writer.

use crate::core::recipe::{HandleId, Recipe};
use crate::core::shape::direction_counts;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Fate;
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Walker, WalkerTactic};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct CreateHandles;

impl RecipeVisitor for CreateHandles {
    fn on_handle<'a>(&'a self, recipe: &'a Recipe, h: HandleId) -> Continuation<'a, HandleId> {
        let counts = direction_counts(recipe, h);
        let mut score = 1.0;
        if counts.reads == 0 || counts.writes == 0 {
            if counts.unknown > 0 {
                return Continuation::Skip;
            }
            score = if counts.reads == 0 { -1.0 } else { 0.0 };
        }
        let handle = recipe.handle(h);
        if handle.id().is_some() || handle.fate() != Fate::Unset {
            return Continuation::Skip;
        }
        Continuation::one(move |recipe: &mut Recipe, h| {
            recipe.set_fate(h, Fate::Create);
            score
        })
    }
}

#[async_trait]
impl Strategy for CreateHandles {
    fn name(&self) -> &str {
        "CreateHandles"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}
