//! Groups unbound connections of the same type onto shared fresh handles.
//!
//! Per type, the particle with the most unbound connections of that type
//! goes first; each of its connections collects at most one matching
//! connection from every other particle. A group is kept only when it has
//! both a reader and a writer.

use crate::core::recipe::{ConnectionId, ParticleId, Recipe};
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::ty::Type;
use crate::core::walker::{Continuation, Descendant, RecipeVisitor, Walker, WalkerTactic};
use async_trait::async_trait;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct GroupHandleConnections;

fn unbound_of_type(recipe: &Recipe, p: ParticleId, ty: &Type) -> Vec<ConnectionId> {
    recipe
        .particle(p)
        .all_connections()
        .filter(|c| {
            let conn = recipe.connection(*c);
            conn.handle().is_none() && !recipe.is_optional(*c) && conn.ty() == Some(ty)
        })
        .collect()
}

fn find_groups(recipe: &Recipe) -> Vec<Vec<ConnectionId>> {
    let mut types: Vec<&Type> = Vec::new();
    for c in recipe.handle_connections() {
        let conn = recipe.connection(c);
        if conn.handle().is_some() || recipe.is_optional(c) {
            continue;
        }
        if let Some(ty) = conn.ty() {
            if !types.contains(&ty) {
                types.push(ty);
            }
        }
    }

    let mut groups = Vec::new();
    for ty in types {
        let mut particles: Vec<(ParticleId, Vec<ConnectionId>)> = recipe
            .particle_ids()
            .map(|p| (p, unbound_of_type(recipe, p, ty)))
            .filter(|(_, conns)| !conns.is_empty())
            .collect();
        particles.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut used: HashSet<ConnectionId> = HashSet::new();
        for (i, (_, conns)) in particles.iter().enumerate() {
            for c in conns {
                if used.contains(c) {
                    continue;
                }
                let mut group = vec![*c];
                for (_, others) in &particles[i + 1..] {
                    if let Some(o) = others.iter().find(|o| !used.contains(*o)) {
                        group.push(*o);
                    }
                }
                let reads = group.iter().any(|g| recipe.connection(*g).is_input());
                let writes = group.iter().any(|g| recipe.connection(*g).is_output());
                if group.len() > 1 && reads && writes {
                    used.extend(group.iter().copied());
                    groups.push(group);
                }
            }
        }
    }
    groups
}

impl RecipeVisitor for GroupHandleConnections {
    fn on_recipe<'a>(&'a self, recipe: &'a Recipe) -> Continuation<'a, ()> {
        let unnamed = recipe
            .particles()
            .any(|(_, p)| !p.unnamed_connections().is_empty());
        if unnamed {
            return Continuation::Skip;
        }
        let groups = find_groups(recipe);
        if groups.is_empty() {
            return Continuation::Skip;
        }
        Continuation::one(move |recipe: &mut Recipe, ()| {
            for group in &groups {
                let h = recipe.new_handle();
                for c in group {
                    recipe.connect(*c, h);
                }
            }
            0.0
        })
    }
}

#[async_trait]
impl Strategy for GroupHandleConnections {
    fn name(&self) -> &str {
        "GroupHandleConnections"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, self, WalkerTactic::Permuted, self.name())
    }
}
