use crate::core::spec::ParticleSpec;
use crate::core::types::Direction;
use std::cmp::Ordering;
use std::sync::Arc;

/// `from.from_connection -> to.to_connection`, pending conversion into a
/// shared handle.
#[derive(Debug, Clone)]
pub struct ConnectionConstraint {
    pub from: Arc<ParticleSpec>,
    pub from_connection: String,
    pub to: Arc<ParticleSpec>,
    pub to_connection: String,
    /// Direction as seen from `from`.
    pub direction: Direction,
}

impl ConnectionConstraint {
    pub(crate) fn sort_key(&self) -> (&str, &str, &str, &str, Direction) {
        (
            &self.from.name,
            &self.from_connection,
            &self.to.name,
            &self.to_connection,
            self.direction,
        )
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
