//! Manifest schema types and the small enums shared across the engine.
//!
//! The manifest is the pre-parsed input: schema definitions, particle specs,
//! store pools and recipe items. All manifest types derive
//! Serialize/Deserialize for YAML roundtripping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// Direction and fate
// ============================================================================

/// Data flow direction of a handle connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "<-")]
    In,
    #[serde(alias = "->")]
    Out,
    #[serde(alias = "=")]
    Inout,
    Host,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Inout => "inout",
            Direction::Host => "host",
        }
    }

    /// Arrow used by the canonical text form.
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::In => "<-",
            Direction::Out => "->",
            Direction::Inout => "=",
            Direction::Host => "host",
        }
    }

    pub fn is_input(self) -> bool {
        matches!(self, Direction::In | Direction::Inout)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Direction::Out | Direction::Inout)
    }

    /// Direction seen from the other end of a constraint.
    pub fn reverse(self) -> Direction {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
            other => other,
        }
    }

    /// Whether a connection declared `self` may stand in for a spec declaring `spec`.
    pub fn satisfies(self, spec: Direction) -> bool {
        self == spec || (spec == Direction::Inout && matches!(self, Direction::In | Direction::Out))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PartialOrd for Direction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Direction {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

/// How a handle will be realized at instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fate {
    #[default]
    #[serde(rename = "?")]
    Unset,
    Use,
    Map,
    Copy,
    Create,
}

impl Fate {
    pub fn as_str(self) -> &'static str {
        match self {
            Fate::Unset => "?",
            Fate::Use => "use",
            Fate::Map => "map",
            Fate::Copy => "copy",
            Fate::Create => "create",
        }
    }
}

impl fmt::Display for Fate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Fates order by their textual form so canonical ordering matches the text.
impl PartialOrd for Fate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

// ============================================================================
// Top-level manifest
// ============================================================================

/// Root manifest: everything the planner needs for one planning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable manifest name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Entity schemas
    #[serde(default)]
    pub schemas: IndexMap<String, SchemaDecl>,

    /// Particle specs
    #[serde(default)]
    pub particles: IndexMap<String, ParticleDecl>,

    /// Arc-local stores (`use` fate)
    #[serde(default)]
    pub stores: Vec<StoreDecl>,

    /// Remote stores (`map` fate)
    #[serde(default)]
    pub remote_stores: Vec<StoreDecl>,

    /// Context stores (`copy` fate)
    #[serde(default)]
    pub context_stores: Vec<StoreDecl>,

    /// Slots offered by the surrounding context
    #[serde(default)]
    pub slots: Vec<SlotDecl>,

    /// Recipe items, in declaration order
    #[serde(default)]
    pub recipes: Vec<RecipeDecl>,

    /// Free-text search phrase
    #[serde(default)]
    pub search: Option<String>,

    /// Name of the recipe currently running in the arc
    #[serde(default)]
    pub active_recipe: Option<String>,

    /// Planner policy
    #[serde(default)]
    pub planner: PlannerPolicy,
}

// ============================================================================
// Schemas and types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDecl {
    /// Parent schemas; the child inherits their names and fields
    #[serde(default)]
    pub extends: Vec<String>,

    /// Field name -> field type name
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

/// A type as written in the manifest.
///
/// A bare string names a schema, or a variable when it starts with `~`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeDecl {
    Named(String),
    Set { set: Box<TypeDecl> },
    Variable { variable: String },
    Interface { interface: String },
    Tuple { tuple: Vec<TypeDecl> },
    Relation { relation: Vec<TypeDecl> },
}

// ============================================================================
// Particle specs
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticleDecl {
    #[serde(default)]
    pub verbs: Vec<String>,

    #[serde(default)]
    pub connections: Vec<ConnectionDecl>,

    /// Slots consumed by the particle
    #[serde(default)]
    pub slots: Vec<ConsumeSlotDecl>,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDecl {
    pub name: String,

    pub direction: Direction,

    #[serde(rename = "type")]
    pub ty: TypeDecl,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeSlotDecl {
    pub name: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub set: bool,

    #[serde(default)]
    pub provides: Vec<ProvideSlotDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvideSlotDecl {
    pub name: String,

    #[serde(default)]
    pub set: bool,
}

// ============================================================================
// Context pools
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDecl {
    pub id: String,

    #[serde(rename = "type")]
    pub ty: TypeDecl,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDecl {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// Recipes
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeDecl {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub verbs: Vec<String>,

    /// Handles keyed by local name
    #[serde(default)]
    pub handles: IndexMap<String, HandleDecl>,

    /// Slots keyed by local name
    #[serde(default)]
    pub slots: IndexMap<String, RecipeSlotDecl>,

    #[serde(default)]
    pub particles: Vec<RecipeParticleDecl>,

    #[serde(default)]
    pub constraints: Vec<ConstraintDecl>,

    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandleDecl {
    #[serde(default)]
    pub fate: Fate,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(rename = "type", default)]
    pub ty: Option<TypeDecl>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeSlotDecl {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeParticleDecl {
    /// Spec name; absent for verb-only particles
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub verbs: Vec<String>,

    /// Named connections -> binding
    #[serde(default)]
    pub connections: IndexMap<String, ConnectionBinding>,

    #[serde(default)]
    pub unnamed: Vec<ConnectionBinding>,

    /// Consumed slot name -> binding
    #[serde(default)]
    pub consumes: IndexMap<String, SlotBinding>,
}

/// A connection binding: either just a handle local name or the full form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionBinding {
    Handle(String),
    Detailed {
        #[serde(default)]
        handle: Option<String>,
        #[serde(default)]
        direction: Option<Direction>,
        #[serde(default)]
        tags: Vec<String>,
    },
}

impl ConnectionBinding {
    pub fn handle(&self) -> Option<&str> {
        match self {
            ConnectionBinding::Handle(h) => Some(h),
            ConnectionBinding::Detailed { handle, .. } => handle.as_deref(),
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            ConnectionBinding::Handle(_) => None,
            ConnectionBinding::Detailed { direction, .. } => *direction,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            ConnectionBinding::Handle(_) => &[],
            ConnectionBinding::Detailed { tags, .. } => tags,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotBinding {
    /// Local name of the consumed recipe slot
    #[serde(default)]
    pub slot: Option<String>,

    /// Provided slot name -> recipe slot local name
    #[serde(default)]
    pub provides: IndexMap<String, String>,
}

/// `from: A.foo`, `to: B.bar`, `direction: "->"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintDecl {
    pub from: String,

    pub to: String,

    #[serde(default = "default_constraint_direction")]
    pub direction: Direction,
}

fn default_constraint_direction() -> Direction {
    Direction::Out
}

// ============================================================================
// Planner policy
// ============================================================================

/// Planner policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerPolicy {
    /// Internal population size that triggers pruning
    #[serde(default = "default_max_population")]
    pub max_population: usize,

    /// Candidate budget per generation, shared by all strategies
    #[serde(default = "default_generation_size")]
    pub generation_size: usize,

    /// Headroom freed when pruning: the population is cut to
    /// `max_population - discard_size`
    #[serde(default = "default_discard_size")]
    pub discard_size: usize,

    /// Soft wall-clock deadline, checked between generations
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Override for the number of speculation groups
    #[serde(default)]
    pub speculation_threads: Option<usize>,

    /// Strategy names to run instead of the default pipeline
    #[serde(default)]
    pub strategies: Option<Vec<String>>,

    /// Ordering chains for the strategy ruleset
    #[serde(default)]
    pub ordering: Vec<Vec<String>>,
}

impl Default for PlannerPolicy {
    fn default() -> Self {
        Self {
            max_population: default_max_population(),
            generation_size: default_generation_size(),
            discard_size: default_discard_size(),
            timeout_ms: None,
            speculation_threads: None,
            strategies: None,
            ordering: Vec::new(),
        }
    }
}

fn default_max_population() -> usize {
    100
}

fn default_generation_size() -> usize {
    100
}

fn default_discard_size() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fate_orders_by_text() {
        let mut fates = vec![Fate::Use, Fate::Create, Fate::Unset, Fate::Map, Fate::Copy];
        fates.sort();
        assert_eq!(
            fates,
            vec![Fate::Unset, Fate::Copy, Fate::Create, Fate::Map, Fate::Use]
        );
    }

    #[test]
    fn test_direction_helpers() {
        assert!(Direction::Inout.is_input());
        assert!(Direction::Inout.is_output());
        assert!(!Direction::In.is_output());
        assert_eq!(Direction::Out.reverse(), Direction::In);
        assert_eq!(Direction::Host.reverse(), Direction::Host);
        assert!(Direction::In.satisfies(Direction::Inout));
        assert!(!Direction::Inout.satisfies(Direction::In));
    }

    #[test]
    fn test_direction_arrow_aliases() {
        let d: Direction = serde_yaml_ng::from_str("\"->\"").unwrap();
        assert_eq!(d, Direction::Out);
        let d: Direction = serde_yaml_ng::from_str("in").unwrap();
        assert_eq!(d, Direction::In);
    }

    #[test]
    fn test_fate_yaml() {
        let f: Fate = serde_yaml_ng::from_str("\"?\"").unwrap();
        assert_eq!(f, Fate::Unset);
        let f: Fate = serde_yaml_ng::from_str("create").unwrap();
        assert_eq!(f, Fate::Create);
    }

    #[test]
    fn test_type_decl_forms() {
        let t: TypeDecl = serde_yaml_ng::from_str("Product").unwrap();
        assert_eq!(t, TypeDecl::Named("Product".to_string()));
        let t: TypeDecl = serde_yaml_ng::from_str("{set: Product}").unwrap();
        assert_eq!(
            t,
            TypeDecl::Set {
                set: Box::new(TypeDecl::Named("Product".to_string()))
            }
        );
        let t: TypeDecl = serde_yaml_ng::from_str("{variable: a}").unwrap();
        assert_eq!(
            t,
            TypeDecl::Variable {
                variable: "a".to_string()
            }
        );
    }

    #[test]
    fn test_connection_binding_forms() {
        let b: ConnectionBinding = serde_yaml_ng::from_str("h0").unwrap();
        assert_eq!(b.handle(), Some("h0"));
        assert_eq!(b.direction(), None);
        let b: ConnectionBinding =
            serde_yaml_ng::from_str("{handle: h1, direction: out, tags: [a]}").unwrap();
        assert_eq!(b.handle(), Some("h1"));
        assert_eq!(b.direction(), Some(Direction::Out));
        assert_eq!(b.tags(), &["a".to_string()]);
    }

    #[test]
    fn test_policy_defaults() {
        let p = PlannerPolicy::default();
        assert_eq!(p.max_population, 100);
        assert_eq!(p.generation_size, 100);
        assert_eq!(p.discard_size, 20);
        assert!(p.strategies.is_none());
    }
}
