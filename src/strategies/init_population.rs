//! Seeds generation 0 with the context's recipes.

use crate::core::context::PlanningContext;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::walker::Descendant;
use async_trait::async_trait;
use std::sync::Arc;

pub struct InitPopulation {
    context: Arc<PlanningContext>,
}

impl InitPopulation {
    pub fn new(context: Arc<PlanningContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Strategy for InitPopulation {
    fn name(&self) -> &str {
        "InitPopulation"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        if params.generation != 0 {
            return Vec::new();
        }
        self.context
            .recipes
            .iter()
            .map(|r| Descendant::new(r.clone_mutable().0, 1.0, None, self.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::Recipe;

    #[tokio::test]
    async fn test_seeds_only_first_generation() {
        let mut ctx = PlanningContext::new();
        ctx.recipes.push(Recipe::named("a"));
        ctx.recipes.push(Recipe::named("b"));
        let strategy = InitPopulation::new(Arc::new(ctx));
        let seeded = strategy.generate(&GenerateParams::default()).await;
        assert_eq!(seeded.len(), 2);
        assert!(seeded.iter().all(|d| d.valid && d.score == 1.0));
        assert!(seeded[0].derivation[0].parent.is_none());

        let later = GenerateParams {
            generation: 1,
            ..GenerateParams::default()
        };
        assert!(strategy.generate(&later).await.is_empty());
    }
}
