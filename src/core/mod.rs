//! Core engine: recipe model, types, shape matching, walking, strategizing, planning.

pub mod checker;
pub mod context;
pub mod error;
pub mod hasher;
pub mod parser;
pub mod planner;
pub mod recipe;
pub mod resolver;
pub mod ruleset;
pub mod schema;
pub mod shape;
pub mod spec;
pub mod strategizer;
pub mod ty;
pub mod types;
pub mod walker;
