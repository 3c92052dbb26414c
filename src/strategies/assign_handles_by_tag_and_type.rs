//! Binds id-less handles to compatible stores from the arc-local store pool, fate `use`.

use super::store_binding::StoreBinder;
use crate::core::context::PlanningContext;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Fate;
use crate::core::walker::{Descendant, Walker, WalkerTactic};
use async_trait::async_trait;
use std::sync::Arc;

pub struct AssignHandlesByTagAndType {
    binder: StoreBinder,
}

impl AssignHandlesByTagAndType {
    pub fn new(context: Arc<PlanningContext>) -> Self {
        Self {
            binder: StoreBinder {
                context,
                fate: Fate::Use,
            },
        }
    }
}

#[async_trait]
impl Strategy for AssignHandlesByTagAndType {
    fn name(&self) -> &str {
        "AssignHandlesByTagAndType"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, &self.binder, WalkerTactic::Permuted, self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::StoreInfo;
    use crate::core::recipe::fixtures::{number, spec};
    use crate::core::recipe::Recipe;
    use crate::core::schema::Schema;
    use crate::core::ty::Type;
    use crate::core::types::Direction;
    use crate::strategies::fixtures::params;

    fn store(id: &str, ty: Type, tags: &[&str]) -> StoreInfo {
        StoreInfo {
            id: id.to_string(),
            ty,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            name: None,
        }
    }

    fn reader(tags: &[&str]) -> Recipe {
        let mut r = Recipe::new();
        let p = r.new_particle(None);
        r.set_particle_spec(p, spec("A", &[("x", Direction::In)]));
        let h = r.new_handle();
        r.set_handle_tags(h, tags.iter().map(|t| t.to_string()).collect());
        let c = r.add_connection(p, "x");
        r.connect(c, h);
        r
    }

    fn strategy(stores: Vec<StoreInfo>) -> AssignHandlesByTagAndType {
        let ctx = PlanningContext {
            stores,
            ..PlanningContext::default()
        };
        AssignHandlesByTagAndType::new(Arc::new(ctx))
    }

    #[tokio::test]
    async fn test_binds_compatible_stores() {
        let s = strategy(vec![
            store("numbers", number(), &[]),
            store("words", Type::entity(Schema::new("Text")), &[]),
        ]);
        let out = s.generate(&params(reader(&[]))).await;
        assert_eq!(out.len(), 1);
        let (_, h) = out[0].result.handles().next().unwrap();
        assert_eq!(h.id(), Some("numbers"));
        assert_eq!(h.fate(), Fate::Use);
        assert!(out[0].result.is_resolved());
    }

    #[tokio::test]
    async fn test_tags_must_be_carried_by_store() {
        let s = strategy(vec![
            store("plain", number(), &[]),
            store("favorites", number(), &["fav"]),
        ]);
        let out = s.generate(&params(reader(&["fav"]))).await;
        assert_eq!(out.len(), 1);
        let (_, h) = out[0].result.handles().next().unwrap();
        assert_eq!(h.id(), Some("favorites"));
    }

    #[tokio::test]
    async fn test_alternatives_per_store() {
        let s = strategy(vec![store("a", number(), &[]), store("b", number(), &[])]);
        assert_eq!(s.generate(&params(reader(&[]))).await.len(), 2);
    }
}
