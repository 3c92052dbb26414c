//! CLI subcommands: init, validate, normalize, plan.

use crate::core::context::PlanningContext;
use crate::core::hasher::short_hash;
use crate::core::planner::Planner;
use crate::core::recipe::{Recipe, ToStringOptions};
use crate::core::strategizer::GenerationRecord;
use crate::core::{parser, resolver, types};
use clap::Subcommand;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new planwright project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a manifest and resolve its types and recipes
    Validate {
        /// Path to planwright.yaml
        #[arg(short, long, default_value = "planwright.yaml")]
        file: PathBuf,
    },

    /// Print the canonical form, digest and resolution of each recipe
    Normalize {
        /// Path to planwright.yaml
        #[arg(short, long, default_value = "planwright.yaml")]
        file: PathBuf,

        /// Only this recipe
        #[arg(short, long)]
        recipe: Option<String>,
    },

    /// Search for resolved recipes
    Plan {
        /// Path to planwright.yaml
        #[arg(short, long, default_value = "planwright.yaml")]
        file: PathBuf,

        /// Soft deadline in milliseconds (overrides the manifest policy)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Include per-generation records
        #[arg(long)]
        generations: bool,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Normalize { file, recipe } => cmd_normalize(&file, recipe.as_deref()),
        Commands::Plan {
            file,
            timeout_ms,
            json,
            generations,
        } => cmd_plan(&file, timeout_ms, json, generations),
    }
}

const TEMPLATE: &str = r#"version: "1.0"
name: my-recipes
description: "Managed by planwright"

schemas:
  Product:
    fields: {name: Text}

particles:
  Recommend:
    verbs: [recommend]
    description: recommend products
    connections:
      - {name: out, direction: out, type: {set: Product}}
  ShowProducts:
    verbs: [show]
    description: show products
    connections:
      - {name: list, direction: in, type: {set: Product}}

recipes:
  - name: Recommendations
    constraints:
      - {from: Recommend.out, to: ShowProducts.list}

planner:
  max_population: 100
  generation_size: 100
  discard_size: 20
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let manifest_path = path.join("planwright.yaml");
    if manifest_path.exists() {
        return Err(format!("{} already exists", manifest_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&manifest_path, TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", manifest_path.display(), e))?;

    println!("Initialized planwright project at {}", path.display());
    println!("  Created: {}", manifest_path.display());
    Ok(())
}

/// Parse, validate and resolve a manifest.
fn load(file: &Path) -> Result<(types::Manifest, PlanningContext), String> {
    let manifest = parser::parse_manifest_file(file)?;
    let errors = parser::validate_manifest(&manifest);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }
    let context = resolver::build_context(&manifest).map_err(|e| e.to_string())?;
    Ok((manifest, context))
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let (manifest, context) = load(file)?;
    println!(
        "OK: {} ({} particles, {} recipes, {} stores)",
        manifest.name,
        context.particles.len(),
        context.recipes.len(),
        context.stores.len() + context.remote_stores.len() + context.context_stores.len()
    );
    Ok(())
}

fn cmd_normalize(file: &Path, only: Option<&str>) -> Result<(), String> {
    let (_, context) = load(file)?;
    let selected: Vec<&Recipe> = context
        .recipes
        .iter()
        .filter(|r| only.is_none() || r.name() == only)
        .collect();
    if let (Some(name), true) = (only, selected.is_empty()) {
        return Err(format!("no recipe named '{}'", name));
    }

    for (i, recipe) in selected.into_iter().enumerate() {
        let (mut recipe, _) = recipe.clone_mutable();
        let label = recipe
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", i));
        if i > 0 {
            println!();
        }
        if !recipe.normalize() {
            println!("{}: invalid", label);
            continue;
        }
        println!("{}:", label);
        print!(
            "{}",
            recipe.to_string_with(ToStringOptions {
                show_unresolved: true
            })
        );
        println!("digest: {}", recipe.digest());
        println!("resolved: {}", recipe.is_resolved());
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlanReport {
    name: String,
    timed_out: bool,
    plans: Vec<PlanEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    generations: Vec<GenerationRecord>,
}

#[derive(Debug, Serialize)]
struct PlanEntry {
    hash: String,
    digest: String,
    recipe: String,
}

fn run_plan(
    manifest: &types::Manifest,
    context: PlanningContext,
    timeout_ms: Option<u64>,
    generations: bool,
) -> Result<PlanReport, String> {
    let mut planner =
        Planner::new(Arc::new(context), manifest.planner.clone()).map_err(|e| e.to_string())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("cannot start runtime: {}", e))?;
    let outcome = runtime.block_on(planner.plan(timeout_ms.map(Duration::from_millis), generations));

    let plans = outcome
        .plans
        .iter()
        .map(|plan| {
            let digest = plan.digest();
            PlanEntry {
                hash: short_hash(&digest).to_string(),
                digest,
                recipe: plan.to_string(),
            }
        })
        .collect();
    Ok(PlanReport {
        name: manifest.name.clone(),
        timed_out: outcome.timed_out,
        plans,
        generations: outcome.records,
    })
}

fn cmd_plan(
    file: &Path,
    timeout_ms: Option<u64>,
    json: bool,
    generations: bool,
) -> Result<(), String> {
    let (manifest, context) = load(file)?;
    let report = run_plan(&manifest, context, timeout_ms, generations)?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("JSON serialization error: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!("Planning: {} ({} resolved)", report.name, report.plans.len());
    for entry in &report.plans {
        println!();
        println!("[{}]", entry.hash);
        print!("{}", entry.recipe);
    }
    if generations {
        println!();
        for g in &report.generations {
            println!(
                "generation {}: {} generated, {} surviving, {} duplicate, {} invalid, population {}",
                g.generation,
                g.generated_derivations,
                g.surviving_derivations,
                g.duplicate_derivations,
                g.invalid_derivations,
                g.population_size
            );
        }
    }
    if report.timed_out {
        println!();
        println!("Planning stopped at the deadline.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("planwright.yaml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("test-project");
        cmd_init(&sub).unwrap();
        assert!(sub.join("planwright.yaml").exists());
    }

    #[test]
    fn test_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("planwright.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_template_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), TEMPLATE);
        cmd_validate(&path).unwrap();
    }

    #[test]
    fn test_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"
version: "2.0"
name: ""
"#,
        );
        assert!(cmd_validate(&path).is_err());
    }

    #[test]
    fn test_validate_unknown_particle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(
            dir.path(),
            r#"
version: "1.0"
name: broken
recipes:
  - particles:
      - name: Missing
"#,
        );
        assert!(cmd_validate(&path).is_err());
    }

    #[test]
    fn test_normalize_named_recipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), TEMPLATE);
        cmd_normalize(&path, Some("Recommendations")).unwrap();
        assert!(cmd_normalize(&path, Some("Nope")).is_err());
    }

    #[test]
    fn test_plan_template_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), TEMPLATE);
        let (manifest, context) = load(&path).unwrap();
        let report = run_plan(&manifest, context, None, true).unwrap();
        assert!(!report.timed_out);
        assert!(!report.plans.is_empty());
        assert!(!report.generations.is_empty());
        for entry in &report.plans {
            assert!(entry.digest.ends_with(&entry.hash));
            assert!(entry.recipe.contains("Recommend"));
        }
    }

    #[test]
    fn test_plan_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_manifest(dir.path(), TEMPLATE);
        cmd_plan(&path, Some(5_000), true, false).unwrap();
    }
}
