//! What the planner plans against: available particle specs, context
//! recipes, store pools, context slots and the search phrase.

use super::recipe::Recipe;
use super::spec::ParticleSpec;
use super::ty::Type;
use super::types::Fate;
use async_trait::async_trait;
use std::sync::Arc;

/// A store a handle can be bound to.
#[derive(Debug, Clone)]
pub struct StoreInfo {
    pub id: String,
    pub ty: Type,
    pub tags: Vec<String>,
    pub name: Option<String>,
}

/// A slot offered by the surrounding context.
#[derive(Debug, Clone)]
pub struct SlotInfo {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanningContext {
    pub particles: Vec<Arc<ParticleSpec>>,
    /// Recipes the search starts from.
    pub recipes: Vec<Recipe>,
    /// Arc-local stores, bound with fate `use`.
    pub stores: Vec<StoreInfo>,
    /// Remote stores, bound with fate `map`.
    pub remote_stores: Vec<StoreInfo>,
    /// Context stores, bound with fate `copy`.
    pub context_stores: Vec<StoreInfo>,
    pub slots: Vec<SlotInfo>,
    pub search: Option<String>,
    /// The recipe already running; plans equivalent to it are not suggested.
    pub active_recipe: Option<Recipe>,
}

impl PlanningContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_particle(&self, name: &str) -> Option<&Arc<ParticleSpec>> {
        self.particles.iter().find(|p| p.name == name)
    }

    pub fn particles_by_verb(&self, verb: &str) -> Vec<&Arc<ParticleSpec>> {
        self.particles
            .iter()
            .filter(|p| p.verbs.iter().any(|v| v == verb))
            .collect()
    }

    /// Context recipes offered for `verb`.
    pub fn recipes_by_verb(&self, verb: &str) -> Vec<&Recipe> {
        self.recipes
            .iter()
            .filter(|r| r.verbs().iter().any(|v| v == verb))
            .collect()
    }

    /// The pool a fate binds from. Unset and `create` have none.
    pub fn stores_for(&self, fate: Fate) -> &[StoreInfo] {
        match fate {
            Fate::Use => &self.stores,
            Fate::Map => &self.remote_stores,
            Fate::Copy => &self.context_stores,
            Fate::Unset | Fate::Create => &[],
        }
    }
}

/// Outcome of speculatively executing a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Relevance {
    pub relevant: bool,
    pub rank: f64,
    pub description: Option<String>,
}

/// Speculative execution, supplied by the host environment.
#[async_trait]
pub trait Speculator: Send + Sync {
    /// `None` when the plan could not be speculated at all.
    async fn speculate(&self, plan: &Recipe) -> Option<Relevance>;
}

/// Speculator that describes a plan from its particles' spec descriptions.
/// Every plan is relevant; rank is the number of described particles.
#[derive(Debug, Default)]
pub struct DescriptionSpeculator;

#[async_trait]
impl Speculator for DescriptionSpeculator {
    async fn speculate(&self, plan: &Recipe) -> Option<Relevance> {
        let descriptions: Vec<String> = plan
            .particles()
            .filter_map(|(_, p)| p.spec().and_then(|s| s.description.clone()))
            .collect();
        Some(Relevance {
            relevant: true,
            rank: descriptions.len() as f64,
            description: (!descriptions.is_empty()).then(|| descriptions.join("; ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Schema;

    fn store(id: &str) -> StoreInfo {
        StoreInfo {
            id: id.to_string(),
            ty: Type::entity(Schema::new("Product")),
            tags: Vec::new(),
            name: None,
        }
    }

    #[test]
    fn test_pools_by_fate() {
        let mut ctx = PlanningContext::new();
        ctx.stores.push(store("local"));
        ctx.remote_stores.push(store("remote"));
        assert_eq!(ctx.stores_for(Fate::Use)[0].id, "local");
        assert_eq!(ctx.stores_for(Fate::Map)[0].id, "remote");
        assert!(ctx.stores_for(Fate::Copy).is_empty());
        assert!(ctx.stores_for(Fate::Create).is_empty());
    }

    #[test]
    fn test_particle_lookup() {
        let mut ctx = PlanningContext::new();
        ctx.particles.push(Arc::new(ParticleSpec::new("Show").with_verb("show")));
        ctx.particles.push(Arc::new(ParticleSpec::new("List").with_verb("show")));
        assert!(ctx.find_particle("List").is_some());
        assert!(ctx.find_particle("Ghost").is_none());
        assert_eq!(ctx.particles_by_verb("show").len(), 2);
    }

    #[test]
    fn test_recipe_lookup_by_verb() {
        let mut ctx = PlanningContext::new();
        let mut show = Recipe::named("ShowAll");
        show.set_verbs(vec!["show".to_string(), "list".to_string()]);
        ctx.recipes.push(show);
        ctx.recipes.push(Recipe::named("Plain"));
        assert_eq!(ctx.recipes_by_verb("list").len(), 1);
        assert!(ctx.recipes_by_verb("edit").is_empty());
    }

    #[tokio::test]
    async fn test_description_speculator() {
        let mut spec = ParticleSpec::new("Show");
        spec.description = Some("show products".to_string());
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, Arc::new(spec));
        let relevance = DescriptionSpeculator.speculate(&r).await.unwrap();
        assert!(relevance.relevant);
        assert_eq!(relevance.description.as_deref(), Some("show products"));
        assert_eq!(relevance.rank, 1.0);
    }
}
