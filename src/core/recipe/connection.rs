use super::{HandleId, ParticleId};
use crate::core::ty::Type;
use crate::core::types::Direction;

/// Edge from a particle to a handle. `name` is `None` for unnamed
/// connections; `handle` is `None` until bound.
#[derive(Debug, Clone)]
pub struct HandleConnection {
    pub(crate) name: Option<String>,
    pub(crate) particle: ParticleId,
    pub(crate) handle: Option<HandleId>,
    pub(crate) direction: Option<Direction>,
    pub(crate) ty: Option<Type>,
    pub(crate) tags: Vec<String>,
}

impl HandleConnection {
    pub(crate) fn new(particle: ParticleId, name: Option<String>) -> Self {
        Self {
            name,
            particle,
            handle: None,
            direction: None,
            ty: None,
            tags: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn particle(&self) -> ParticleId {
        self.particle
    }

    pub fn handle(&self) -> Option<HandleId> {
        self.handle
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_input(&self) -> bool {
        self.direction.is_some_and(Direction::is_input)
    }

    pub fn is_output(&self) -> bool {
        self.direction.is_some_and(Direction::is_output)
    }
}
