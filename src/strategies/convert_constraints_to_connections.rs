//! Turns connection constraints into real connections.
//!
//! The constraints of a recipe are compiled into a [`Shape`]: one shape
//! particle per constrained particle, one shape handle per group of
//! endpoints that must share a handle. Each embedding of the shape into the
//! recipe becomes a candidate that binds the endpoints, creating particles
//! and `create` handles for whatever the embedding left unmatched, and
//! drops the constraints.

use crate::core::recipe::{HandleId, ParticleId, Recipe};
use crate::core::shape::{HandleRepr, Shape};
use crate::core::spec::ParticleSpec;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Direction;
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Rewrite, Walker, WalkerTactic};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ConvertConstraintsToConnections;

/// Two endpoint directions on one connection: equal ones stay, anything
/// else becomes unconstrained.
fn union_directions(a: Option<Direction>, b: Option<Direction>) -> Option<Direction> {
    match (a, b) {
        (Some(a), Some(b)) if a == b => Some(a),
        _ => None,
    }
}

/// Per particle name, connection name to the shape handle it must use.
type ConnectionMap = IndexMap<String, IndexMap<String, HandleRepr>>;

struct Compiled {
    specs: IndexMap<String, Arc<ParticleSpec>>,
    map: ConnectionMap,
    handles: Vec<String>,
}

fn compile(recipe: &Recipe) -> Compiled {
    let mut specs = IndexMap::new();
    let mut map = ConnectionMap::new();
    let mut handles: Vec<String> = Vec::new();

    for constraint in recipe.constraints() {
        let from = constraint.from.name.clone();
        let to = constraint.to.name.clone();
        specs.entry(from.clone()).or_insert_with(|| constraint.from.clone());
        specs.entry(to.clone()).or_insert_with(|| constraint.to.clone());

        let existing = map
            .get(&from)
            .and_then(|m| m.get(&constraint.from_connection))
            .or_else(|| map.get(&to).and_then(|m| m.get(&constraint.to_connection)))
            .map(|repr| repr.handle.clone());
        let handle = existing.unwrap_or_else(|| {
            let name = format!("v{}", handles.len());
            handles.push(name.clone());
            name
        });

        for (particle, connection, direction) in [
            (&from, &constraint.from_connection, constraint.direction),
            (&to, &constraint.to_connection, constraint.direction.reverse()),
        ] {
            let conns = map.entry(particle.clone()).or_default();
            let direction = match conns.get(connection) {
                Some(prior) => union_directions(Some(direction), prior.direction),
                None => Some(direction),
            };
            conns.insert(
                connection.clone(),
                HandleRepr {
                    handle: handle.clone(),
                    direction,
                    ..HandleRepr::default()
                },
            );
        }
    }
    Compiled { specs, map, handles }
}

impl RecipeVisitor for ConvertConstraintsToConnections {
    fn on_recipe<'a>(&'a self, recipe: &'a Recipe) -> Continuation<'a, ()> {
        if recipe.constraints().is_empty() {
            return Continuation::Skip;
        }
        let compiled = Arc::new(compile(recipe));
        let particle_names: Vec<&str> = compiled.map.keys().map(String::as_str).collect();
        let handle_names: Vec<&str> = compiled.handles.iter().map(String::as_str).collect();
        let connections: Vec<(&str, &str, HandleRepr)> = compiled
            .map
            .iter()
            .flat_map(|(p, conns)| {
                conns
                    .iter()
                    .map(move |(c, repr)| (p.as_str(), c.as_str(), repr.clone()))
            })
            .collect();
        let shape = Shape::make(&particle_names, &handle_names, &connections);
        let constraint_count = recipe.constraints().len() as f64;

        let rewrites = shape
            .find(recipe)
            .into_iter()
            .filter(|m| {
                // Unmatched handles are created, so each needs a writer.
                compiled.handles.iter().all(|handle| {
                    m.handle(handle).is_some()
                        || compiled.map.iter().any(|(p, conns)| {
                            conns.iter().any(|(c, repr)| {
                                &repr.handle == handle && compiled.specs[p].is_output(c)
                            })
                        })
                })
            })
            .map(|m| -> Rewrite<'a, ()> {
                let compiled = compiled.clone();
                Box::new(move |recipe: &mut Recipe, ()| {
                    let score = constraint_count + m.score as f64;
                    let mut handles: IndexMap<&str, HandleId> = compiled
                        .handles
                        .iter()
                        .filter_map(|h| m.handle(h).map(|id| (h.as_str(), id)))
                        .collect();
                    for (name, conns) in &compiled.map {
                        let p: ParticleId = match m.particle(name) {
                            Some(p) => p,
                            None => {
                                let p = recipe.new_particle(None);
                                recipe.set_particle_spec(p, compiled.specs[name].clone());
                                p
                            }
                        };
                        for (connection, repr) in conns {
                            let c = recipe.ensure_connection(p, connection);
                            if recipe.connection(c).handle().is_some() {
                                continue;
                            }
                            let h = *handles.entry(repr.handle.as_str()).or_insert_with(|| {
                                let h = recipe.new_handle();
                                recipe.set_fate(h, crate::core::types::Fate::Create);
                                h
                            });
                            recipe.connect(c, h);
                        }
                    }
                    recipe.clear_connection_constraints();
                    score
                })
            })
            .collect();
        Continuation::alternatives(rewrites)
    }
}

#[async_trait]
impl Strategy for ConvertConstraintsToConnections {
    fn name(&self) -> &str {
        "ConvertConstraintsToConnections"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Independent, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recipe::fixtures::spec;
    use crate::core::types::Fate;
    use crate::strategies::fixtures::params;

    fn specs() -> (Arc<ParticleSpec>, Arc<ParticleSpec>) {
        (
            spec("A", &[("foo", Direction::Out)]),
            spec("B", &[("bar", Direction::In)]),
        )
    }

    #[tokio::test]
    async fn test_constraint_becomes_shared_create_handle() {
        let (a, b) = specs();
        let mut r = Recipe::new();
        let pa = r.new_particle(None);
        r.set_particle_spec(pa, a.clone());
        let pb = r.new_particle(None);
        r.set_particle_spec(pb, b.clone());
        r.new_connection_constraint(a, "foo", b, "bar", Direction::Out);

        let out = ConvertConstraintsToConnections.generate(&params(r)).await;
        assert_eq!(out.len(), 1);
        let result = &out[0].result;
        assert!(result.constraints().is_empty());
        assert_eq!(result.particles().count(), 2);
        assert_eq!(result.handles().count(), 1);
        let (_, handle) = result.handles().next().unwrap();
        assert_eq!(handle.fate(), Fate::Create);
        assert_eq!(handle.connections().len(), 2);
        assert!(result.is_resolved());
        // One constraint, one unmatched handle.
        assert_eq!(out[0].score, -1.0);
    }

    #[tokio::test]
    async fn test_missing_particles_are_created() {
        let (a, b) = specs();
        let mut r = Recipe::new();
        r.new_connection_constraint(a, "foo", b, "bar", Direction::Out);
        let out = ConvertConstraintsToConnections.generate(&params(r)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].result.particles().count(), 2);
        assert!(out[0].result.is_resolved());
    }

    #[tokio::test]
    async fn test_handle_without_writer_is_rejected() {
        let a = spec("A", &[("foo", Direction::In)]);
        let b = spec("B", &[("bar", Direction::In)]);
        let mut r = Recipe::new();
        r.new_connection_constraint(a, "foo", b, "bar", Direction::In);
        assert!(ConvertConstraintsToConnections
            .generate(&params(r))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_no_constraints_no_candidates() {
        let (a, _) = specs();
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, a);
        assert!(ConvertConstraintsToConnections
            .generate(&params(r))
            .await
            .is_empty());
    }
}
