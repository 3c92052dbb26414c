//! Manifest resolution: schema inheritance, type declarations, particle
//! specs, context pools and recipes.
//!
//! Schemas are built in topological order over `extends` edges using Kahn's
//! algorithm with deterministic (alphabetical) tie-breaking, so a child always
//! sees fully built parents.

use super::context::{PlanningContext, SlotInfo, StoreInfo};
use super::error::{RecipeError, RecipeResult, SourceLocation};
use super::recipe::{HandleId, Recipe, SlotId};
use super::schema::Schema;
use super::spec::{ConnectionSpec, ConsumeSlotSpec, ParticleSpec, ProvideSlotSpec};
use super::ty::{InterfaceInfo, Type};
use super::types::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Built schemas by name.
pub type SchemaTable = HashMap<String, Arc<Schema>>;

/// Order schemas so every parent precedes its children.
pub fn schema_order(manifest: &Manifest) -> RecipeResult<Vec<String>> {
    let names: Vec<String> = manifest.schemas.keys().cloned().collect();
    let mut in_degree: HashMap<&str, usize> = names.iter().map(|n| (n.as_str(), 0)).collect();
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();

    for (name, schema) in &manifest.schemas {
        for parent in &schema.extends {
            if !manifest.schemas.contains_key(parent) {
                return Err(RecipeError::UnknownSchema {
                    name: parent.clone(),
                    location: SourceLocation::new("schemas").field(name).field("extends"),
                });
            }
            children.entry(parent.as_str()).or_default().push(name.as_str());
            if let Some(d) = in_degree.get_mut(name.as_str()) {
                *d += 1;
            }
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(n, _)| *n)
        .collect();
    ready.sort();
    let mut queue: VecDeque<&str> = ready.into_iter().collect();

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());
        let mut next_ready = Vec::new();
        for child in children.get(current).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(child) {
                *d -= 1;
                if *d == 0 {
                    next_ready.push(*child);
                }
            }
        }
        next_ready.sort();
        queue.extend(next_ready);
    }

    if order.len() != names.len() {
        let ordered: HashSet<&String> = order.iter().collect();
        let mut cycle: Vec<&str> = names
            .iter()
            .filter(|n| !ordered.contains(n))
            .map(String::as_str)
            .collect();
        cycle.sort();
        return Err(RecipeError::SchemaCycle(cycle.join(", ")));
    }
    Ok(order)
}

/// Build every schema, children carrying their ancestors' names and fields.
pub fn build_schemas(manifest: &Manifest) -> RecipeResult<SchemaTable> {
    let mut table = SchemaTable::new();
    for name in schema_order(manifest)? {
        let Some(decl) = manifest.schemas.get(&name) else {
            continue;
        };
        let mut schema = Schema::new(name.as_str());
        for (field, ty) in &decl.fields {
            schema = schema.with_field(field.as_str(), ty.as_str());
        }
        for parent in &decl.extends {
            if let Some(p) = table.get(parent) {
                schema = schema.extending(p);
            }
        }
        table.insert(name, Arc::new(schema));
    }
    Ok(table)
}

/// Resolve a declared type against the schema table. Bare names are manifest
/// references until looked up; a leading `~` makes a variable.
pub fn resolve_type(decl: &TypeDecl, schemas: &SchemaTable, location: &SourceLocation) -> RecipeResult<Type> {
    Ok(match decl {
        TypeDecl::Named(name) => match name.strip_prefix('~') {
            Some(var) => Type::VariableReference(var.to_string()),
            None => resolve_reference(&Type::ManifestReference(name.clone()), schemas, location)?,
        },
        TypeDecl::Set { set } => Type::set_of(resolve_type(set, schemas, location)?),
        TypeDecl::Variable { variable } => Type::VariableReference(variable.clone()),
        TypeDecl::Interface { interface } => Type::Interface(Arc::new(InterfaceInfo {
            name: interface.clone(),
            handles: Vec::new(),
        })),
        TypeDecl::Tuple { tuple } => Type::Tuple(
            tuple
                .iter()
                .map(|t| resolve_type(t, schemas, location))
                .collect::<RecipeResult<_>>()?,
        ),
        TypeDecl::Relation { relation } => Type::Relation(
            relation
                .iter()
                .map(|t| resolve_type(t, schemas, location))
                .collect::<RecipeResult<_>>()?,
        ),
    })
}

fn resolve_reference(ty: &Type, schemas: &SchemaTable, location: &SourceLocation) -> RecipeResult<Type> {
    match ty.as_manifest_reference() {
        Some(name) => schemas
            .get(name)
            .map(|s| Type::Entity(s.clone()))
            .ok_or_else(|| RecipeError::UnknownSchema {
                name: name.to_string(),
                location: location.clone(),
            }),
        None => Ok(ty.clone()),
    }
}

pub fn build_particle_specs(manifest: &Manifest, schemas: &SchemaTable) -> RecipeResult<Vec<Arc<ParticleSpec>>> {
    let mut specs = Vec::new();
    for (name, decl) in &manifest.particles {
        let loc = SourceLocation::new("particles").field(name);
        let mut spec = ParticleSpec::new(name.as_str());
        spec.verbs = decl.verbs.clone();
        spec.description = decl.description.clone();
        for (i, c) in decl.connections.iter().enumerate() {
            let cloc = loc.field("connections").index(i);
            spec.connections.push(ConnectionSpec {
                name: c.name.clone(),
                direction: c.direction,
                ty: resolve_type(&c.ty, schemas, &cloc.field("type"))?,
                optional: c.optional,
                tags: c.tags.clone(),
            });
        }
        for s in &decl.slots {
            spec.slots.push(ConsumeSlotSpec {
                name: s.name.clone(),
                required: s.required,
                is_set: s.set,
                provides: s
                    .provides
                    .iter()
                    .map(|p| ProvideSlotSpec {
                        name: p.name.clone(),
                        is_set: p.set,
                    })
                    .collect(),
            });
        }
        specs.push(Arc::new(spec));
    }
    Ok(specs)
}

fn build_stores(decls: &[StoreDecl], schemas: &SchemaTable, pool: &str) -> RecipeResult<Vec<StoreInfo>> {
    decls
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let loc = SourceLocation::new(pool).index(i).field("type");
            Ok(StoreInfo {
                id: s.id.clone(),
                ty: resolve_type(&s.ty, schemas, &loc)?,
                tags: s.tags.clone(),
                name: s.name.clone(),
            })
        })
        .collect()
}

/// Split `Particle.connection`.
fn parse_endpoint<'a>(endpoint: &'a str, location: &SourceLocation) -> RecipeResult<(&'a str, &'a str)> {
    match endpoint.split_once('.') {
        Some((p, c)) if !p.is_empty() && !c.is_empty() => Ok((p, c)),
        _ => Err(RecipeError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            location: location.clone(),
        }),
    }
}

fn find_spec(specs: &[Arc<ParticleSpec>], name: &str, location: &SourceLocation) -> RecipeResult<Arc<ParticleSpec>> {
    specs
        .iter()
        .find(|s| s.name == name)
        .cloned()
        .ok_or_else(|| RecipeError::UnknownParticle {
            name: name.to_string(),
            location: location.clone(),
        })
}

fn bind_connection(
    recipe: &mut Recipe,
    c: super::recipe::ConnectionId,
    binding: &ConnectionBinding,
    handles: &HashMap<&str, HandleId>,
    location: &SourceLocation,
) -> RecipeResult<()> {
    if let Some(d) = binding.direction() {
        recipe.set_connection_direction(c, d);
    }
    if !binding.tags().is_empty() {
        recipe.set_connection_tags(c, binding.tags().to_vec());
    }
    if let Some(name) = binding.handle() {
        let h = handles.get(name).ok_or_else(|| RecipeError::UnknownHandle {
            name: name.to_string(),
            location: location.clone(),
        })?;
        recipe.connect(c, *h);
    }
    Ok(())
}

/// Build one recipe item. Local names from the manifest are kept until
/// normalization clears them.
pub fn build_recipe(
    decl: &RecipeDecl,
    specs: &[Arc<ParticleSpec>],
    schemas: &SchemaTable,
    location: &SourceLocation,
) -> RecipeResult<Recipe> {
    let mut recipe = match &decl.name {
        Some(name) => Recipe::named(name.as_str()),
        None => Recipe::new(),
    };
    recipe.set_verbs(decl.verbs.clone());

    let mut handles: HashMap<&str, HandleId> = HashMap::new();
    for (local, h) in &decl.handles {
        let hloc = location.field("handles").field(local);
        let id = recipe.declare_handle(h.fate, h.id.as_deref());
        recipe.set_handle_local_name(id, local);
        recipe.set_handle_tags(id, h.tags.clone());
        if let Some(ty) = &h.ty {
            let ty = resolve_type(ty, schemas, &hloc.field("type"))?;
            let ty = recipe.assign_type_variables(&ty, &mut HashMap::new());
            recipe.set_mapped_type(id, Some(ty));
        }
        handles.insert(local.as_str(), id);
    }

    let mut slots: HashMap<&str, SlotId> = HashMap::new();
    for (local, s) in &decl.slots {
        let id = recipe.new_slot(None);
        recipe.set_slot_local_name(id, local);
        if let Some(slot_id) = &s.id {
            recipe.set_slot_id(id, slot_id);
        }
        recipe.set_slot_tags(id, s.tags.clone());
        slots.insert(local.as_str(), id);
    }
    let lookup_slot = |name: &str, loc: &SourceLocation| {
        slots.get(name).copied().ok_or_else(|| RecipeError::UnknownSlot {
            name: name.to_string(),
            location: loc.clone(),
        })
    };

    for (i, pd) in decl.particles.iter().enumerate() {
        let ploc = location.field("particles").index(i);
        let p = recipe.new_particle(None);
        if let Some(name) = &pd.name {
            let spec = find_spec(specs, name, &ploc)?;
            recipe.set_particle_spec(p, spec);
        }
        if !pd.verbs.is_empty() {
            recipe.set_particle_verbs(p, pd.verbs.clone());
        }

        for (cname, binding) in &pd.connections {
            let cloc = ploc.field("connections").field(cname);
            if let Some(spec) = recipe.particle(p).spec() {
                if spec.connection(cname).is_none() {
                    return Err(RecipeError::UnknownConnection {
                        particle: spec.name.clone(),
                        connection: cname.clone(),
                        location: cloc,
                    });
                }
            }
            let c = recipe.add_connection(p, cname);
            bind_connection(&mut recipe, c, binding, &handles, &cloc)?;
        }
        for (j, binding) in pd.unnamed.iter().enumerate() {
            let c = recipe.add_unnamed_connection(p);
            bind_connection(&mut recipe, c, binding, &handles, &ploc.field("unnamed").index(j))?;
        }
        for (sname, sb) in &pd.consumes {
            let sloc = ploc.field("consumes").field(sname);
            let sc = recipe.new_slot_connection(p, sname);
            if let Some(target) = &sb.slot {
                let s = lookup_slot(target, &sloc)?;
                recipe.connect_slot(sc, s);
            }
            for (provided, local) in &sb.provides {
                let s = lookup_slot(local, &sloc.field("provides").field(provided))?;
                recipe.provide_slot(sc, provided, s);
            }
        }
    }

    for (i, c) in decl.constraints.iter().enumerate() {
        let cloc = location.field("constraints").index(i);
        let (fp, fc) = parse_endpoint(&c.from, &cloc.field("from"))?;
        let (tp, tc) = parse_endpoint(&c.to, &cloc.field("to"))?;
        let from = find_spec(specs, fp, &cloc.field("from"))?;
        let to = find_spec(specs, tp, &cloc.field("to"))?;
        for (spec, conn, field) in [(&from, fc, "from"), (&to, tc, "to")] {
            if spec.connection(conn).is_none() {
                return Err(RecipeError::UnknownConnection {
                    particle: spec.name.clone(),
                    connection: conn.to_string(),
                    location: cloc.field(field),
                });
            }
        }
        recipe.new_connection_constraint(from, fc, to, tc, c.direction);
    }

    if let Some(search) = &decl.search {
        recipe.set_search_phrase(search)?;
    }
    Ok(recipe)
}

/// Resolve a whole manifest into a planning context.
pub fn build_context(manifest: &Manifest) -> RecipeResult<PlanningContext> {
    let schemas = build_schemas(manifest)?;
    let particles = build_particle_specs(manifest, &schemas)?;
    let recipes = manifest
        .recipes
        .iter()
        .enumerate()
        .map(|(i, r)| build_recipe(r, &particles, &schemas, &SourceLocation::new("recipes").index(i)))
        .collect::<RecipeResult<Vec<_>>>()?;

    let active_recipe = match &manifest.active_recipe {
        Some(name) => Some(
            recipes
                .iter()
                .find(|r| r.name() == Some(name.as_str()))
                .cloned()
                .ok_or_else(|| RecipeError::Invalid {
                    message: format!("active recipe '{}' is not declared", name),
                    location: SourceLocation::new("active_recipe"),
                })?,
        ),
        None => None,
    };

    Ok(PlanningContext {
        stores: build_stores(&manifest.stores, &schemas, "stores")?,
        remote_stores: build_stores(&manifest.remote_stores, &schemas, "remote_stores")?,
        context_stores: build_stores(&manifest.context_stores, &schemas, "context_stores")?,
        slots: manifest
            .slots
            .iter()
            .map(|s| SlotInfo {
                id: s.id.clone(),
                name: s.name.clone(),
                tags: s.tags.clone(),
            })
            .collect(),
        search: manifest.search.clone(),
        particles,
        recipes,
        active_recipe,
    })
}
