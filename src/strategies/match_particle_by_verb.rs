//! Resolves verb-only particles to each spec carrying that verb.

use crate::core::context::PlanningContext;
use crate::core::recipe::{ParticleId, Recipe};
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Rewrite, Walker, WalkerTactic};
use async_trait::async_trait;
use std::sync::Arc;

pub struct MatchParticleByVerb {
    context: Arc<PlanningContext>,
}

impl MatchParticleByVerb {
    pub fn new(context: Arc<PlanningContext>) -> Self {
        Self { context }
    }
}

impl RecipeVisitor for MatchParticleByVerb {
    fn on_particle<'a>(&'a self, recipe: &'a Recipe, p: ParticleId) -> Continuation<'a, ParticleId> {
        let particle = recipe.particle(p);
        if particle.name().is_some() {
            return Continuation::Skip;
        }
        let Some(verb) = particle.primary_verb() else {
            return Continuation::Skip;
        };
        let rewrites = self
            .context
            .particles_by_verb(verb)
            .into_iter()
            .map(|spec| -> Rewrite<'a, ParticleId> {
                Box::new(move |recipe: &mut Recipe, p| {
                    recipe.set_particle_spec(p, spec.clone());
                    1.0
                })
            })
            .collect();
        Continuation::alternatives(rewrites)
    }
}

#[async_trait]
impl Strategy for MatchParticleByVerb {
    fn name(&self) -> &str {
        "MatchParticleByVerb"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::ParticleSpec;
    use crate::strategies::fixtures::{context_with, params};

    #[tokio::test]
    async fn test_each_spec_with_verb_is_tried() {
        let ctx = context_with(vec![
            ParticleSpec::new("Grid").with_verb("show"),
            ParticleSpec::new("List").with_verb("show"),
            ParticleSpec::new("Edit").with_verb("edit"),
        ]);
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_verbs(p, vec!["show".to_string()]);
        let out = MatchParticleByVerb::new(ctx).generate(&params(r)).await;
        let mut names: Vec<&str> = out
            .iter()
            .filter_map(|d| d.result.particles().next().and_then(|(_, p)| p.name()))
            .collect();
        names.sort();
        assert_eq!(names, vec!["Grid", "List"]);
    }
}
