//! Strategy ordering rules.
//!
//! `order(["A", "B"])` means B never appears before A in a derivation chain:
//! A may not run on a recipe that B helped derive. Ordering is transitive.

use super::error::{PlanningError, PlanningResult};
use super::walker::Descendant;
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Default)]
pub struct RulesetBuilder {
    rules: IndexMap<String, IndexSet<String>>,
}

impl RulesetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each strategy in the chain must precede every later one.
    pub fn order<S: AsRef<str>>(mut self, chain: &[S]) -> Self {
        for pair in chain.windows(2) {
            self.rules
                .entry(pair[0].as_ref().to_string())
                .or_default()
                .insert(pair[1].as_ref().to_string());
        }
        self
    }

    /// Compute the transitive closure. A loop is an error.
    pub fn build(self) -> PlanningResult<Ruleset> {
        let mut closed: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for strategy in self.rules.keys() {
            let mut stack = vec![strategy.clone()];
            self.expand(strategy, &mut stack, &mut closed)?;
        }
        Ok(Ruleset { rules: closed })
    }

    fn expand(
        &self,
        strategy: &str,
        stack: &mut Vec<String>,
        closed: &mut IndexMap<String, IndexSet<String>>,
    ) -> PlanningResult<IndexSet<String>> {
        if let Some(done) = closed.get(strategy) {
            return Ok(done.clone());
        }
        let mut following = IndexSet::new();
        for next in self.rules.get(strategy).into_iter().flatten() {
            if stack.iter().any(|s| s == next) {
                return Err(PlanningError::OrderingLoop(strategy.to_string(), next.clone()));
            }
            following.insert(next.clone());
            stack.push(next.clone());
            following.extend(self.expand(next, stack, closed)?);
            stack.pop();
        }
        closed.insert(strategy.to_string(), following.clone());
        Ok(following)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    /// Strategy name to the strategies it must precede.
    rules: IndexMap<String, IndexSet<String>>,
}

impl Ruleset {
    pub fn builder() -> RulesetBuilder {
        RulesetBuilder::new()
    }

    /// Whether `strategy` may extend `individual`, given its derivation.
    pub fn is_allowed(&self, strategy: &str, individual: &Descendant) -> bool {
        match self.rules.get(strategy) {
            Some(forbidden) => !individual.strategies().any(|s| forbidden.contains(s)),
            None => true,
        }
    }

    /// Strategies that must run after `strategy`, transitively.
    pub fn following(&self, strategy: &str) -> impl Iterator<Item = &str> {
        self.rules
            .get(strategy)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}
