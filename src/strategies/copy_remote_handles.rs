//! Binds id-less handles to compatible stores from the context store pool, fate `copy`.

use super::store_binding::StoreBinder;
use crate::core::context::PlanningContext;
use crate::core::strategizer::{GenerateParams, Strategy};
use crate::core::types::Fate;
use crate::core::walker::{Descendant, Walker, WalkerTactic};
use async_trait::async_trait;
use std::sync::Arc;

pub struct CopyRemoteHandles {
    binder: StoreBinder,
}

impl CopyRemoteHandles {
    pub fn new(context: Arc<PlanningContext>) -> Self {
        Self {
            binder: StoreBinder {
                context,
                fate: Fate::Copy,
            },
        }
    }
}

#[async_trait]
impl Strategy for CopyRemoteHandles {
    fn name(&self) -> &str {
        "CopyRemoteHandles"
    }

    async fn generate(&self, params: &GenerateParams) -> Vec<Descendant> {
        Walker::over(&params.generated, &self.binder, WalkerTactic::Permuted, self.name())
    }
}
