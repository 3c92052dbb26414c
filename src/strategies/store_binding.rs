//! Binding id-less handles to stores from one of the context's pools.

use crate::core::checker::TypeChecker;
use crate::core::context::{PlanningContext, StoreInfo};
use crate::core::recipe::{HandleId, Recipe};
use crate::core::types::{Direction, Fate};
use crate::core::walker::{Continuation, RecipeVisitor, Rewrite};
use std::sync::Arc;

/// Offers every compatible store in the pool for `fate` to each undecided
/// or `fate` handle that has no id yet.
pub(crate) struct StoreBinder {
    pub(crate) context: Arc<PlanningContext>,
    pub(crate) fate: Fate,
}

impl StoreBinder {
    fn accepts(&self, recipe: &Recipe, h: HandleId, store: &StoreInfo) -> bool {
        let handle = recipe.handle(h);
        if !handle.tags().iter().all(|t| store.tags.contains(t)) {
            return false;
        }
        if recipe.find_handle_by_id(&store.id).is_some() {
            return false;
        }
        TypeChecker::accepts_declared_type(
            recipe.type_vars(),
            &recipe.handle_type_list(h),
            &store.ty,
            Direction::Inout,
        )
    }
}

impl RecipeVisitor for StoreBinder {
    fn on_handle<'a>(&'a self, recipe: &'a Recipe, h: HandleId) -> Continuation<'a, HandleId> {
        let handle = recipe.handle(h);
        if handle.id().is_some() || handle.is_free() {
            return Continuation::Skip;
        }
        if handle.fate() != Fate::Unset && handle.fate() != self.fate {
            return Continuation::Skip;
        }
        let written = handle
            .connections()
            .iter()
            .any(|c| recipe.connection(*c).is_output());
        if self.fate == Fate::Map && written {
            return Continuation::Skip;
        }
        let fate = self.fate;
        let rewrites = self
            .context
            .stores_for(fate)
            .iter()
            .filter(|store| self.accepts(recipe, h, store))
            .map(|store| -> Rewrite<'a, HandleId> {
                Box::new(move |recipe: &mut Recipe, h| {
                    recipe.set_fate(h, fate);
                    recipe.map_to_store(h, &store.id, &store.ty);
                    1.0
                })
            })
            .collect();
        Continuation::alternatives(rewrites)
    }
}
