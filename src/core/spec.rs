//! Particle specs: the declared interface a particle is checked against.

use super::ty::Type;
use super::types::Direction;

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSpec {
    pub name: String,
    pub direction: Direction,
    pub ty: Type,
    pub optional: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvideSlotSpec {
    pub name: String,
    pub is_set: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeSlotSpec {
    pub name: String,
    pub required: bool,
    pub is_set: bool,
    pub provides: Vec<ProvideSlotSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSpec {
    pub name: String,
    pub verbs: Vec<String>,
    pub connections: Vec<ConnectionSpec>,
    pub slots: Vec<ConsumeSlotSpec>,
    pub description: Option<String>,
}

impl ParticleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbs: Vec::new(),
            connections: Vec::new(),
            slots: Vec::new(),
            description: None,
        }
    }

    pub fn with_verb(mut self, verb: impl Into<String>) -> Self {
        self.verbs.push(verb.into());
        self
    }

    pub fn with_connection(mut self, name: impl Into<String>, direction: Direction, ty: Type) -> Self {
        self.connections.push(ConnectionSpec {
            name: name.into(),
            direction,
            ty,
            optional: false,
            tags: Vec::new(),
        });
        self
    }

    pub fn with_optional_connection(
        mut self,
        name: impl Into<String>,
        direction: Direction,
        ty: Type,
    ) -> Self {
        self.connections.push(ConnectionSpec {
            name: name.into(),
            direction,
            ty,
            optional: true,
            tags: Vec::new(),
        });
        self
    }

    pub fn with_slot(mut self, slot: ConsumeSlotSpec) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionSpec> {
        self.connections.iter().find(|c| c.name == name)
    }

    pub fn is_input(&self, name: &str) -> bool {
        self.connection(name).is_some_and(|c| c.direction.is_input())
    }

    pub fn is_output(&self, name: &str) -> bool {
        self.connection(name).is_some_and(|c| c.direction.is_output())
    }

    pub fn primary_verb(&self) -> Option<&str> {
        self.verbs.first().map(String::as_str)
    }

    pub fn slot(&self, name: &str) -> Option<&ConsumeSlotSpec> {
        self.slots.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Schema;

    #[test]
    fn test_connection_lookup() {
        let number = Type::entity(Schema::new("Number"));
        let spec = ParticleSpec::new("Adder")
            .with_verb("add")
            .with_connection("x", Direction::In, number.clone())
            .with_connection("y", Direction::Out, number);
        assert!(spec.is_input("x"));
        assert!(!spec.is_output("x"));
        assert!(spec.is_output("y"));
        assert!(spec.connection("z").is_none());
        assert_eq!(spec.primary_verb(), Some("add"));
    }
}
