//! Seeds generation 0 with an empty recipe carrying the search phrase.

use crate::core::context::PlanningContext;
use crate::core::recipe::Recipe;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::walker::Descendant;
use async_trait::async_trait;
use std::sync::Arc;

pub struct InitSearch {
    context: Arc<PlanningContext>,
}

impl InitSearch {
    pub fn new(context: Arc<PlanningContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Strategy for InitSearch {
    fn name(&self) -> &str {
        "InitSearch"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        let Some(phrase) = self.context.search.as_deref() else {
            return Vec::new();
        };
        if params.generation != 0 {
            return Vec::new();
        }
        let mut recipe = Recipe::new();
        if recipe.set_search_phrase(phrase).is_err() {
            return Vec::new();
        }
        vec![Descendant::new(recipe, 0.0, None, self.name())]
    }
}
