//! Planner: drives the strategizer to exhaustion and speculates the
//! resolved plans.

use super::context::{PlanningContext, Speculator};
use super::error::PlanningResult;
use super::hasher::short_hash;
use super::recipe::Recipe;
use super::ruleset::Ruleset;
use super::shape::matches_recipe;
use super::strategizer::{GenerationRecord, Strategizer};
use super::types::PlannerPolicy;
use crate::strategies;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// A speculated plan worth offering.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub plan: Recipe,
    pub rank: f64,
    /// Last four characters of the plan's digest.
    pub hash: String,
    pub description: Option<String>,
    pub group_index: usize,
}

/// Result of [`Planner::plan`].
#[derive(Debug, Default)]
pub struct PlanOutcome {
    /// Resolved recipes in the order they were generated.
    pub plans: Vec<Recipe>,
    /// One record per generation, when requested.
    pub records: Vec<GenerationRecord>,
    pub timed_out: bool,
}

pub struct Planner {
    context: Arc<PlanningContext>,
    policy: PlannerPolicy,
    strategizer: Strategizer,
}

impl Planner {
    /// Assemble the named pipeline (or the default one) and the ordering
    /// ruleset from `policy`.
    pub fn new(context: Arc<PlanningContext>, policy: PlannerPolicy) -> PlanningResult<Self> {
        let pipeline = match &policy.strategies {
            Some(names) => strategies::pipeline(names, &context)?,
            None => strategies::default_pipeline(&context),
        };
        let ruleset = policy
            .ordering
            .iter()
            .fold(Ruleset::builder(), |builder, chain| builder.order(chain))
            .build()?;
        let strategizer = Strategizer::new(pipeline, Vec::new(), ruleset, &policy);
        Ok(Self {
            context,
            policy,
            strategizer,
        })
    }

    pub fn strategizer(&self) -> &Strategizer {
        &self.strategizer
    }

    /// Run generations until one produces nothing and leaves nothing
    /// terminal, or `timeout` (falling back to the policy's) has passed.
    /// The deadline is only checked between generations.
    pub async fn plan(&mut self, timeout: Option<Duration>, record: bool) -> PlanOutcome {
        let timeout = timeout.or(self.policy.timeout_ms.map(Duration::from_millis));
        let start = Instant::now();
        let mut outcome = PlanOutcome::default();
        loop {
            let generation = self.strategizer.generate().await;
            if record {
                outcome.records.push(generation);
            }
            outcome.plans.extend(
                self.strategizer
                    .generated()
                    .iter()
                    .filter(|d| d.result.is_resolved())
                    .map(|d| d.result.clone()),
            );
            if let Some(limit) = timeout {
                let elapsed = start.elapsed();
                if elapsed > limit {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        timeout_ms = limit.as_millis() as u64,
                        "planning timed out"
                    );
                    outcome.timed_out = true;
                    break;
                }
            }
            if self.strategizer.generated().is_empty() && self.strategizer.terminal().is_empty() {
                break;
            }
        }
        debug!(
            generations = self.strategizer.generation(),
            resolved = outcome.plans.len(),
            "planning finished"
        );
        outcome
    }

    /// Plan, then speculate the resolved plans in concurrent groups.
    /// Plans equivalent to the active recipe and irrelevant ones are dropped.
    pub async fn suggest(
        &mut self,
        timeout: Option<Duration>,
        speculator: Arc<dyn Speculator>,
    ) -> Vec<Suggestion> {
        let plans = self.plan(timeout, false).await.plans;
        let groups = split_to_groups(plans, speculative_thread_count(&self.policy));
        let group_count = groups.len();

        let mut set = JoinSet::new();
        for (group_index, group) in groups.into_iter().enumerate() {
            let context = self.context.clone();
            let speculator = speculator.clone();
            set.spawn(async move {
                let mut out = Vec::new();
                for plan in group {
                    if let Some(s) = speculate(&context, speculator.as_ref(), plan, group_index).await {
                        out.push(s);
                    }
                }
                (group_index, out)
            });
        }

        let mut by_group: Vec<Vec<Suggestion>> = vec![Vec::new(); group_count];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, suggestions)) => by_group[index] = suggestions,
                Err(e) => warn!(error = %e, "speculation group failed"),
            }
        }
        by_group.into_iter().flatten().collect()
    }
}

async fn speculate(
    context: &PlanningContext,
    speculator: &dyn Speculator,
    plan: Recipe,
    group_index: usize,
) -> Option<Suggestion> {
    let hash = short_hash(&plan.digest()).to_string();
    if let Some(active) = &context.active_recipe {
        if matches_recipe(active, &plan) {
            debug!(hash = %hash, "plan matches the active recipe");
            return None;
        }
    }
    let relevance = speculator.speculate(&plan).await?;
    if !relevance.relevant {
        debug!(hash = %hash, "irrelevant plan");
        return None;
    }
    if let Some(search) = context.search.as_deref().filter(|s| !s.is_empty()) {
        if plan.search().is_none() {
            let wanted = search.to_lowercase();
            let described = relevance
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&wanted));
            if !described {
                debug!(hash = %hash, "description does not match the search");
                return None;
            }
        }
    }
    Some(Suggestion {
        plan,
        rank: relevance.rank,
        hash,
        description: relevance.description,
        group_index,
    })
}

/// Number of speculation groups: the policy override, else half the cores
/// with a floor of two.
pub fn speculative_thread_count(policy: &PlannerPolicy) -> usize {
    if let Some(n) = policy.speculation_threads {
        return n.max(1);
    }
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(0);
    (cores / 2).max(2)
}

/// Split `items` into at most `count` groups of `len / count` items; the
/// remainder goes to the last group.
pub fn split_to_groups<T>(items: Vec<T>, count: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = (items.len() / count.max(1)).max(1);
    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut rest = items.into_iter().peekable();
    while groups.len() < count.max(1) && rest.peek().is_some() {
        groups.push(rest.by_ref().take(size).collect());
    }
    if let Some(last) = groups.last_mut() {
        last.extend(rest);
    }
    groups
}
