use super::ConnectionId;
use crate::core::ty::Type;
use crate::core::types::Fate;

/// A data view placeholder.
#[derive(Debug, Clone)]
pub struct Handle {
    pub(crate) id: Option<String>,
    pub(crate) local_name: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) fate: Fate,
    pub(crate) original_fate: Option<Fate>,
    pub(crate) original_id: Option<String>,
    /// Type declared for the handle or taken from the store it maps.
    pub(crate) mapped_type: Option<Type>,
    /// Type computed by unifying every connection; set during validation.
    pub(crate) ty: Option<Type>,
    pub(crate) connections: Vec<ConnectionId>,
}

impl Handle {
    pub(crate) fn new() -> Self {
        Self {
            id: None,
            local_name: None,
            tags: Vec::new(),
            fate: Fate::Unset,
            original_fate: None,
            original_id: None,
            mapped_type: None,
            ty: None,
            connections: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn fate(&self) -> Fate {
        self.fate
    }

    pub fn original_fate(&self) -> Option<Fate> {
        self.original_fate
    }

    pub fn original_id(&self) -> Option<&str> {
        self.original_id.as_deref()
    }

    pub fn mapped_type(&self) -> Option<&Type> {
        self.mapped_type.as_ref()
    }

    /// The unified type, falling back to the declared one before validation.
    pub fn ty(&self) -> Option<&Type> {
        self.ty.as_ref().or(self.mapped_type.as_ref())
    }

    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    pub fn is_free(&self) -> bool {
        self.connections.is_empty()
    }
}
