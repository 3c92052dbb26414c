//! Generational search over strategy rewrites.
//!
//! Each [`Strategizer::generate`] call asks every strategy for descendants of
//! the individuals it may extend, deduplicates them by content hash, drops
//! invalid ones, ranks the survivors and folds them into a bounded population.

use super::ruleset::Ruleset;
use super::types::PlannerPolicy;
use super::walker::{Derivation, Descendant};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// What a strategy sees of the search.
#[derive(Debug, Clone, Default)]
pub struct GenerateParams {
    /// Number of the generation that produced `generated`.
    pub generation: usize,
    /// Survivors of the latest generation.
    pub generated: Vec<Arc<Descendant>>,
    /// Individuals of the previous generation nothing descended from.
    pub terminal: Vec<Arc<Descendant>>,
    pub population: Vec<Arc<Descendant>>,
    /// This strategy's share of the per-generation budget.
    pub budget: usize,
}

/// Advisory estimate of a strategy's ability to generate and evaluate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Activation {
    pub generate: f64,
    pub evaluate: f64,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name used in derivations, records and ordering rules.
    fn name(&self) -> &str;

    async fn activate(&self) -> Activation {
        Activation::default()
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant>;

    /// Called with individuals pruned from the population.
    fn discard(&self, _individuals: &[Arc<Descendant>]) {}

    /// One fitness per individual; `NaN` abstains.
    async fn evaluate(&self, individuals: &[Arc<Descendant>]) -> Vec<f64> {
        vec![f64::NAN; individuals.len()]
    }
}

/// Runs strategies in sequence. Each one extends the leaves of what the
/// previous ones produced; only leaves are returned.
pub struct CombinedStrategy {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl CombinedStrategy {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>) -> Self {
        Self { strategies }
    }
}

#[async_trait]
impl Strategy for CombinedStrategy {
    fn name(&self) -> &str {
        "CombinedStrategy"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        let mut leaves: Vec<Arc<Descendant>> = params.generated.clone();
        let mut produced: Vec<Arc<Descendant>> = Vec::new();
        for strategy in &self.strategies {
            let stage = GenerateParams {
                generated: leaves.clone(),
                ..params.clone()
            };
            let outputs: Vec<Arc<Descendant>> = strategy
                .generate(&stage)
                .await
                .into_iter()
                .filter(|d| d.valid)
                .map(Arc::new)
                .collect();
            let superseded = |d: &Arc<Descendant>| {
                outputs.iter().any(|o| {
                    d.hash.is_some() && o.derivation.iter().any(|x| x.parent == d.hash)
                })
            };
            leaves.retain(|d| !superseded(d));
            produced.retain(|d| !superseded(d));
            leaves.extend(outputs.iter().cloned());
            produced.extend(outputs);
        }
        produced
            .into_iter()
            .map(|d| Arc::try_unwrap(d).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }
}

/// Counters for one generation, keyed by strategy name where split.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub size_of_last_generation: usize,
    pub generated_derivations_by_strategy: IndexMap<String, usize>,
    pub generated_derivations: usize,
    pub null_derivations: usize,
    pub invalid_derivations: usize,
    pub duplicate_derivations: usize,
    pub duplicate_same_parent_derivations: usize,
    pub null_derivations_by_strategy: IndexMap<String, usize>,
    pub invalid_derivations_by_strategy: IndexMap<String, usize>,
    pub duplicate_derivations_by_strategy: IndexMap<String, usize>,
    pub duplicate_same_parent_derivations_by_strategy: IndexMap<String, usize>,
    pub surviving_derivations: usize,
    pub surviving_derivations_by_strategy: IndexMap<String, usize>,
    pub population_size: usize,
    pub terminal_count: usize,
}

fn bump(map: &mut IndexMap<String, usize>, key: &str) {
    *map.entry(key.to_string()).or_default() += 1;
}

/// A hashed individual and every derivation that reached it.
#[derive(Debug, Clone)]
pub struct PopulationEntry {
    pub descendant: Arc<Descendant>,
    pub derivation: Vec<Derivation>,
}

pub struct Strategizer {
    strategies: Vec<Arc<dyn Strategy>>,
    evaluators: Vec<Arc<dyn Strategy>>,
    ruleset: Ruleset,
    max_population: usize,
    generation_size: usize,
    discard_size: usize,
    generation: usize,
    internal_population: Vec<(f64, Arc<Descendant>)>,
    population: Vec<Arc<Descendant>>,
    generated: Vec<Arc<Descendant>>,
    terminal: Vec<Arc<Descendant>>,
    population_hash: IndexMap<String, PopulationEntry>,
}

impl Strategizer {
    pub fn new(
        strategies: Vec<Arc<dyn Strategy>>,
        evaluators: Vec<Arc<dyn Strategy>>,
        ruleset: Ruleset,
        policy: &PlannerPolicy,
    ) -> Self {
        Self {
            strategies,
            evaluators,
            ruleset,
            max_population: policy.max_population,
            generation_size: policy.generation_size,
            discard_size: policy.discard_size,
            generation: 0,
            internal_population: Vec::new(),
            population: Vec::new(),
            generated: Vec::new(),
            terminal: Vec::new(),
            population_hash: IndexMap::new(),
        }
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn population(&self) -> &[Arc<Descendant>] {
        &self.population
    }

    pub fn generated(&self) -> &[Arc<Descendant>] {
        &self.generated
    }

    pub fn terminal(&self) -> &[Arc<Descendant>] {
        &self.terminal
    }

    /// Every distinct valid recipe seen, by content hash.
    pub fn population_hash(&self) -> &IndexMap<String, PopulationEntry> {
        &self.population_hash
    }

    fn params_for(&self, strategy: &dyn Strategy, budget: usize) -> GenerateParams {
        let allowed = |list: &[Arc<Descendant>]| -> Vec<Arc<Descendant>> {
            list.iter()
                .filter(|d| self.ruleset.is_allowed(strategy.name(), d))
                .cloned()
                .collect()
        };
        GenerateParams {
            generation: self.generation,
            generated: allowed(&self.generated),
            terminal: allowed(&self.terminal),
            population: allowed(&self.population),
            budget,
        }
    }

    /// Run one generation to completion.
    pub async fn generate(&mut self) -> GenerationRecord {
        let generation = self.generation + 1;
        let budget = (self.generation_size / self.strategies.len().max(1)).max(1);
        let mut record = GenerationRecord {
            generation,
            size_of_last_generation: self.generated.len(),
            ..GenerationRecord::default()
        };

        let mut candidates = Vec::new();
        for strategy in &self.strategies {
            let params = self.params_for(strategy.as_ref(), budget);
            let results = strategy.generate(&params).await;
            record
                .generated_derivations_by_strategy
                .insert(strategy.name().to_string(), results.len());
            candidates.extend(results);
        }
        record.generated_derivations = candidates.len();

        let mut generated: Vec<Arc<Descendant>> = Vec::new();
        for result in candidates {
            let Some(first) = result.derivation.first().cloned() else {
                continue;
            };
            let strategy = first.strategy.as_str();
            if let Some(hash) = result.hash.clone() {
                if let Some(existing) = self.population_hash.get_mut(&hash) {
                    if first.parent.as_deref() == Some(hash.as_str()) {
                        record.null_derivations += 1;
                        bump(&mut record.null_derivations_by_strategy, strategy);
                    } else if existing.derivation.iter().any(|d| d.parent == first.parent) {
                        record.duplicate_same_parent_derivations += 1;
                        bump(&mut record.duplicate_same_parent_derivations_by_strategy, strategy);
                    } else {
                        record.duplicate_derivations += 1;
                        bump(&mut record.duplicate_derivations_by_strategy, strategy);
                        existing.derivation.push(first);
                    }
                    continue;
                }
                let derivation = result.derivation.clone();
                let descendant = Arc::new(result);
                self.population_hash.insert(
                    hash,
                    PopulationEntry {
                        descendant: descendant.clone(),
                        derivation,
                    },
                );
                generated.push(descendant);
                continue;
            }
            if !result.valid {
                record.invalid_derivations += 1;
                bump(&mut record.invalid_derivations_by_strategy, strategy);
                continue;
            }
            generated.push(Arc::new(result));
        }

        let mut terminal: IndexMap<&str, &Arc<Descendant>> = self
            .generated
            .iter()
            .filter_map(|d| d.hash.as_deref().map(|h| (h, d)))
            .collect();
        for entry in self.population_hash.values() {
            for d in &entry.derivation {
                if let Some(parent) = &d.parent {
                    terminal.shift_remove(parent.as_str());
                }
            }
        }
        let terminal: Vec<Arc<Descendant>> = terminal.into_values().cloned().collect();

        record.surviving_derivations = generated.len();
        for d in &generated {
            if let Some(first) = d.derivation.first() {
                bump(&mut record.surviving_derivations_by_strategy, &first.strategy);
            }
        }

        generated.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut evaluations = Vec::with_capacity(self.evaluators.len());
        for evaluator in &self.evaluators {
            evaluations.push(evaluator.evaluate(&generated).await);
        }
        let fitness = merge_evaluations(&evaluations, generated.len());
        self.internal_population
            .extend(fitness.into_iter().zip(generated.iter().cloned()));
        // Fitness first; equal fitness falls back to the strategies' score.
        self.internal_population.sort_by(|x, y| {
            y.0.partial_cmp(&x.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| y.1.score.partial_cmp(&x.1.score).unwrap_or(Ordering::Equal))
        });

        if self.internal_population.len() > self.max_population {
            let keep = self.max_population.saturating_sub(self.discard_size);
            let discarded: Vec<Arc<Descendant>> = self
                .internal_population
                .split_off(keep)
                .into_iter()
                .map(|(_, d)| d)
                .collect();
            for strategy in &self.strategies {
                strategy.discard(&discarded);
            }
        }

        self.terminal = terminal;
        self.generation = generation;
        self.generated = generated;
        self.population = self
            .internal_population
            .iter()
            .map(|(_, d)| d.clone())
            .collect();

        record.population_size = self.population.len();
        record.terminal_count = self.terminal.len();
        debug!(
            generation,
            generated = record.generated_derivations,
            surviving = record.surviving_derivations,
            duplicates = record.duplicate_derivations,
            invalid = record.invalid_derivations,
            "generation complete"
        );
        record
    }
}

/// Mean of the non-`NaN` scores per individual; 0.5 when every evaluator
/// abstains.
pub fn merge_evaluations(evaluations: &[Vec<f64>], n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let scores: Vec<f64> = evaluations
                .iter()
                .filter_map(|e| e.get(i).copied())
                .filter(|f| !f.is_nan())
                .collect();
            if scores.is_empty() {
                0.5
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            }
        })
        .collect()
}
