//! Turns search tokens into particles.
//!
//! A token names a particle spec either directly (case-insensitive) or
//! through one of its verbs. Every combination of one spec per matching
//! token becomes a candidate, up to the strategy's budget.

use crate::core::context::PlanningContext;
use crate::core::recipe::Recipe;
use crate::core::spec::ParticleSpec;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Rewrite, Walker, WalkerTactic};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

pub struct SearchTokensToParticles {
    by_token: IndexMap<String, Vec<Arc<ParticleSpec>>>,
}

impl SearchTokensToParticles {
    pub fn new(context: Arc<PlanningContext>) -> Self {
        let mut by_token: IndexMap<String, Vec<Arc<ParticleSpec>>> = IndexMap::new();
        for spec in &context.particles {
            let keys = std::iter::once(&spec.name).chain(spec.verbs.iter());
            for key in keys {
                let specs = by_token.entry(key.to_lowercase()).or_default();
                if !specs.iter().any(|s| s.name == spec.name) {
                    specs.push(spec.clone());
                }
            }
        }
        Self { by_token }
    }
}

struct TokenVisitor<'s> {
    by_token: &'s IndexMap<String, Vec<Arc<ParticleSpec>>>,
    budget: usize,
}

/// Cartesian product of the per-token choices, capped at `limit`.
fn combinations<'s>(
    choices: &[(&'s str, &'s [Arc<ParticleSpec>])],
    limit: usize,
) -> Vec<Vec<(&'s str, &'s Arc<ParticleSpec>)>> {
    let mut out: Vec<Vec<(&str, &Arc<ParticleSpec>)>> = vec![Vec::new()];
    for (token, specs) in choices {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                specs.iter().map(move |spec| {
                    let mut next = prefix.clone();
                    next.push((*token, spec));
                    next
                })
            })
            .take(limit)
            .collect();
    }
    out
}

impl RecipeVisitor for TokenVisitor<'_> {
    fn on_recipe<'a>(&'a self, recipe: &'a Recipe) -> Continuation<'a, ()> {
        let Some(search) = recipe.search() else {
            return Continuation::Skip;
        };
        let choices: Vec<(&str, &[Arc<ParticleSpec>])> = search
            .unresolved_tokens()
            .iter()
            .filter_map(|t| self.by_token.get(t).map(|specs| (t.as_str(), specs.as_slice())))
            .collect();
        if choices.is_empty() {
            return Continuation::Skip;
        }
        let rewrites = combinations(&choices, self.budget)
            .into_iter()
            .map(|combination| -> Rewrite<'a, ()> {
                Box::new(move |recipe: &mut Recipe, ()| {
                    for (token, spec) in &combination {
                        let present = recipe
                            .particles()
                            .any(|(_, p)| p.name() == Some(spec.name.as_str()));
                        if !present {
                            let p = recipe.new_particle(None);
                            recipe.set_particle_spec(p, (*spec).clone());
                        }
                        recipe.resolve_search_token(token);
                    }
                    combination.len() as f64
                })
            })
            .collect();
        Continuation::alternatives(rewrites)
    }
}

#[async_trait]
impl Strategy for SearchTokensToParticles {
    fn name(&self) -> &str {
        "SearchTokensToParticles"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        let visitor = TokenVisitor {
            by_token: &self.by_token,
            budget: params.budget.max(1),
        };
        Walker::over(&params.generated, &visitor, WalkerTactic::Permuted, self.name())
    }
}
