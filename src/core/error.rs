//! Error types for recipe construction and planning setup.
//!
//! Structural invalidity and type incompatibility are not errors: they make
//! `Recipe::normalize` return `false` and the candidate is dropped. The types
//! here cover the fatal cases that abort building a recipe or a planner.

use std::fmt;
use thiserror::Error;

/// Where in the manifest an item came from, as a dotted path
/// (`recipes[0].particles[1].connections.foo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: String,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Extend the path with a field segment.
    pub fn field(&self, name: &str) -> Self {
        Self::new(format!("{}.{}", self.path, name))
    }

    /// Extend the path with an index segment.
    pub fn index(&self, i: usize) -> Self {
        Self::new(format!("{}[{}]", self.path, i))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("{location}: unknown particle '{name}'")]
    UnknownParticle {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: particle '{particle}' has no connection named '{connection}'")]
    UnknownConnection {
        particle: String,
        connection: String,
        location: SourceLocation,
    },

    #[error("{location}: unknown handle '{name}'")]
    UnknownHandle {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: unknown slot '{name}'")]
    UnknownSlot {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: unknown schema '{name}'")]
    UnknownSchema {
        name: String,
        location: SourceLocation,
    },

    #[error("{location}: invalid constraint endpoint '{endpoint}', expected Particle.connection")]
    InvalidEndpoint {
        endpoint: String,
        location: SourceLocation,
    },

    #[error("schema inheritance cycle involving: {0}")]
    SchemaCycle(String),

    #[error("{location}: search phrase already set")]
    SearchAlreadySet { location: SourceLocation },

    #[error("{location}: {message}")]
    Invalid {
        message: String,
        location: SourceLocation,
    },
}

pub type RecipeResult<T> = Result<T, RecipeError>;

#[derive(Debug, Error)]
pub enum PlanningError {
    /// Strategy ordering rules contradict each other.
    #[error("strategy ordering loop: '{0}' must both precede and follow '{1}'")]
    OrderingLoop(String, String),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error(transparent)]
    Recipe(#[from] RecipeError),
}

pub type PlanningResult<T> = Result<T, PlanningError>;
