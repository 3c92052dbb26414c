//! Manifest parsing and structural validation.
//!
//! Parses a planning manifest and validates cross references:
//! - Version must be "1.0"
//! - Schema parents, recipe particles, handles and slots must exist
//! - Particle specs may not repeat a connection name
//! - Planner policy sizes must be consistent

use super::types::*;
use std::collections::HashSet;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn error(message: String) -> ValidationError {
    ValidationError { message }
}

/// Parse a manifest file from disk.
pub fn parse_manifest_file(path: &Path) -> Result<Manifest, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_manifest(&content)
}

/// Parse a manifest from a string.
pub fn parse_manifest(yaml: &str) -> Result<Manifest, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed manifest. Returns a list of errors (empty = valid).
pub fn validate_manifest(manifest: &Manifest) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if manifest.version != "1.0" {
        errors.push(error(format!(
            "version must be \"1.0\", got \"{}\"",
            manifest.version
        )));
    }
    if manifest.name.is_empty() {
        errors.push(error("name must not be empty".to_string()));
    }

    for (name, schema) in &manifest.schemas {
        for parent in &schema.extends {
            if !manifest.schemas.contains_key(parent) {
                errors.push(error(format!(
                    "schema '{}' extends unknown schema '{}'",
                    name, parent
                )));
            }
            if parent == name {
                errors.push(error(format!("schema '{}' extends itself", name)));
            }
        }
    }

    for (name, particle) in &manifest.particles {
        let mut seen = HashSet::new();
        for conn in &particle.connections {
            if !seen.insert(conn.name.as_str()) {
                errors.push(error(format!(
                    "particle '{}' declares connection '{}' twice",
                    name, conn.name
                )));
            }
        }
    }

    for (i, recipe) in manifest.recipes.iter().enumerate() {
        validate_recipe(manifest, i, recipe, &mut errors);
    }

    if let Some(active) = &manifest.active_recipe {
        if !manifest
            .recipes
            .iter()
            .any(|r| r.name.as_deref() == Some(active.as_str()))
        {
            errors.push(error(format!("active recipe '{}' is not declared", active)));
        }
    }

    let policy = &manifest.planner;
    if policy.generation_size == 0 {
        errors.push(error("planner.generation_size must be positive".to_string()));
    }
    if policy.discard_size > policy.max_population {
        errors.push(error(format!(
            "planner.discard_size ({}) exceeds planner.max_population ({})",
            policy.discard_size, policy.max_population
        )));
    }
    if policy.speculation_threads == Some(0) {
        errors.push(error("planner.speculation_threads must be positive".to_string()));
    }

    errors
}

fn validate_recipe(manifest: &Manifest, i: usize, recipe: &RecipeDecl, errors: &mut Vec<ValidationError>) {
    let label = recipe
        .name
        .clone()
        .unwrap_or_else(|| format!("recipes[{}]", i));

    let mut ids = HashSet::new();
    for (local, handle) in &recipe.handles {
        if let Some(id) = &handle.id {
            if !ids.insert(id.as_str()) {
                errors.push(error(format!(
                    "recipe '{}' handle '{}' reuses id '{}'",
                    label, local, id
                )));
            }
        }
    }

    for particle in &recipe.particles {
        let pname = match (&particle.name, particle.verbs.first()) {
            (Some(name), _) => {
                if !manifest.particles.contains_key(name) {
                    errors.push(error(format!(
                        "recipe '{}' references unknown particle '{}'",
                        label, name
                    )));
                }
                name.clone()
            }
            (None, Some(verb)) => format!("&{}", verb),
            (None, None) => {
                errors.push(error(format!(
                    "recipe '{}' has a particle with neither name nor verbs",
                    label
                )));
                continue;
            }
        };

        let bindings = particle.connections.values().chain(particle.unnamed.iter());
        for binding in bindings {
            if let Some(h) = binding.handle() {
                if !recipe.handles.contains_key(h) {
                    errors.push(error(format!(
                        "recipe '{}' particle '{}' binds unknown handle '{}'",
                        label, pname, h
                    )));
                }
            }
        }
        for (slot_name, binding) in &particle.consumes {
            let targets = binding.slot.iter().chain(binding.provides.values());
            for s in targets {
                if !recipe.slots.contains_key(s) {
                    errors.push(error(format!(
                        "recipe '{}' particle '{}' slot '{}' references unknown slot '{}'",
                        label, pname, slot_name, s
                    )));
                }
            }
        }
    }

    for constraint in &recipe.constraints {
        for endpoint in [&constraint.from, &constraint.to] {
            match endpoint.split_once('.') {
                Some((p, c)) if !p.is_empty() && !c.is_empty() => {
                    if !manifest.particles.contains_key(p) {
                        errors.push(error(format!(
                            "recipe '{}' constraint references unknown particle '{}'",
                            label, p
                        )));
                    }
                }
                _ => errors.push(error(format!(
                    "recipe '{}' constraint endpoint '{}' must look like Particle.connection",
                    label, endpoint
                ))),
            }
        }
    }
}
