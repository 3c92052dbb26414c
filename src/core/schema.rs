//! Entity schemas and the subclass relation used by unification.

use std::collections::BTreeMap;
use std::fmt;

/// An entity schema. `names` lists the schema's own name first, followed by
/// every ancestor name; `fields` includes inherited fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Schema {
    pub names: Vec<String>,
    pub fields: BTreeMap<String, String>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.fields.insert(name.into(), ty.into());
        self
    }

    /// Inherit names and fields from `parent`. Own fields win on conflict.
    pub fn extending(mut self, parent: &Schema) -> Self {
        for name in &parent.names {
            if !self.names.contains(name) {
                self.names.push(name.clone());
            }
        }
        for (field, ty) in &parent.fields {
            self.fields
                .entry(field.clone())
                .or_insert_with(|| ty.clone());
        }
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// True when every name and field of `other` is present here.
    pub fn is_more_specific_than(&self, other: &Schema) -> bool {
        other.names.iter().all(|n| self.names.contains(n))
            && other
                .fields
                .iter()
                .all(|(k, v)| self.fields.get(k) == Some(v))
    }

    /// Strict subclass: more specific and not the same schema.
    pub fn is_strict_subclass_of(&self, other: &Schema) -> bool {
        self != other && self.is_more_specific_than(other)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().unwrap_or("*"))
    }
}
