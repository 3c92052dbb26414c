//! planwright: recipe resolution engine.
//!
//! Canonical recipe graphs with BLAKE3 digests, structural shape matching,
//! type unification across connections, and a generational search over
//! rewrite strategies that turns partial recipes into resolved plans.

pub mod cli;
pub mod core;
pub mod strategies;
