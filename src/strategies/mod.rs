//! Rewrite rules, one per file, and the pipeline that strings them together.

pub mod add_missing_handles;
pub mod add_use_handles;
pub mod assign_handles_by_tag_and_type;
pub mod assign_remote_handles;
pub mod convert_constraints_to_connections;
pub mod copy_remote_handles;
pub mod create_description_handle;
pub mod create_handles;
pub mod fallback_fate;
pub mod group_handle_connections;
pub mod init_population;
pub mod init_search;
pub mod map_slots;
pub mod match_free_handles_to_connections;
pub mod match_particle_by_verb;
pub mod match_recipe_by_verb;
pub mod name_unnamed_connections;
pub mod search_tokens_to_particles;
mod store_binding;

pub use add_missing_handles::AddMissingHandles;
pub use add_use_handles::AddUseHandles;
pub use assign_handles_by_tag_and_type::AssignHandlesByTagAndType;
pub use assign_remote_handles::AssignRemoteHandles;
pub use convert_constraints_to_connections::ConvertConstraintsToConnections;
pub use copy_remote_handles::CopyRemoteHandles;
pub use create_description_handle::CreateDescriptionHandle;
pub use create_handles::CreateHandles;
pub use fallback_fate::FallbackFate;
pub use group_handle_connections::GroupHandleConnections;
pub use init_population::InitPopulation;
pub use init_search::InitSearch;
pub use map_slots::MapSlots;
pub use match_free_handles_to_connections::MatchFreeHandlesToConnections;
pub use match_particle_by_verb::MatchParticleByVerb;
pub use match_recipe_by_verb::MatchRecipeByVerb;
pub use name_unnamed_connections::NameUnnamedConnections;
pub use search_tokens_to_particles::SearchTokensToParticles;

use crate::core::context::PlanningContext;
use crate::core::error::{PlanningError, PlanningResult};
use crate::core::strategizer::{CombinedStrategy, Strategy};
use std::sync::Arc;

/// Stage names of the default pipeline, in run order.
pub const DEFAULT_PIPELINE: &[&str] = &[
    "InitPopulation",
    "InitSearch",
    "SearchTokensToParticles+GroupHandleConnections",
    "FallbackFate",
    "CreateHandles",
    "AssignHandlesByTagAndType",
    "ConvertConstraintsToConnections",
    "MapSlots",
    "AssignRemoteHandles",
    "CopyRemoteHandles",
    "MatchParticleByVerb",
    "MatchRecipeByVerb",
    "NameUnnamedConnections",
    "AddUseHandles",
    "CreateDescriptionHandle",
    "MatchFreeHandlesToConnections",
];

/// Look up a strategy by name. Names joined by `+` build a
/// [`CombinedStrategy`] of the parts.
pub fn by_name(name: &str, context: &Arc<PlanningContext>) -> PlanningResult<Arc<dyn Strategy>> {
    if name.contains('+') {
        let parts = name
            .split('+')
            .map(|part| by_name(part.trim(), context))
            .collect::<PlanningResult<Vec<_>>>()?;
        return Ok(Arc::new(CombinedStrategy::new(parts)));
    }
    let ctx = context.clone();
    let strategy: Arc<dyn Strategy> = match name {
        "InitPopulation" => Arc::new(InitPopulation::new(ctx)),
        "InitSearch" => Arc::new(InitSearch::new(ctx)),
        "SearchTokensToParticles" => Arc::new(SearchTokensToParticles::new(ctx)),
        "GroupHandleConnections" => Arc::new(GroupHandleConnections),
        "FallbackFate" => Arc::new(FallbackFate),
        "CreateHandles" => Arc::new(CreateHandles),
        "AssignHandlesByTagAndType" => Arc::new(AssignHandlesByTagAndType::new(ctx)),
        "ConvertConstraintsToConnections" => Arc::new(ConvertConstraintsToConnections),
        "MapSlots" => Arc::new(MapSlots::new(ctx)),
        "AssignRemoteHandles" => Arc::new(AssignRemoteHandles::new(ctx)),
        "CopyRemoteHandles" => Arc::new(CopyRemoteHandles::new(ctx)),
        "MatchParticleByVerb" => Arc::new(MatchParticleByVerb::new(ctx)),
        "MatchRecipeByVerb" => Arc::new(MatchRecipeByVerb::new(ctx)),
        "NameUnnamedConnections" => Arc::new(NameUnnamedConnections),
        "AddMissingHandles" => Arc::new(AddMissingHandles),
        "AddUseHandles" => Arc::new(AddUseHandles),
        "CreateDescriptionHandle" => Arc::new(CreateDescriptionHandle),
        "MatchFreeHandlesToConnections" => Arc::new(MatchFreeHandlesToConnections),
        other => return Err(PlanningError::UnknownStrategy(other.to_string())),
    };
    Ok(strategy)
}

/// Build a pipeline from stage names.
pub fn pipeline<S: AsRef<str>>(
    names: &[S],
    context: &Arc<PlanningContext>,
) -> PlanningResult<Vec<Arc<dyn Strategy>>> {
    names.iter().map(|n| by_name(n.as_ref(), context)).collect()
}

pub fn default_pipeline(context: &Arc<PlanningContext>) -> Vec<Arc<dyn Strategy>> {
    DEFAULT_PIPELINE
        .iter()
        .filter_map(|n| by_name(n, context).ok())
        .collect()
}
