//! Types and the type-variable arena.
//!
//! `Type::Variable` holds an index into a [`TypeVariables`] arena owned by the
//! recipe. The index is frozen with the recipe; the cell it points at may still
//! gain a resolution, and every read resolves through the arena.

use super::schema::Schema;
use super::types::Direction;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarId(pub(crate) u32);

impl TypeVarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A hosted-particle interface: a name plus the handle positions it expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceInfo {
    pub name: String,
    pub handles: Vec<InterfaceHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceHandle {
    pub name: Option<String>,
    pub direction: Option<Direction>,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Entity(Arc<Schema>),
    SetView(Box<Type>),
    Interface(Arc<InterfaceInfo>),
    VariableReference(String),
    Variable(TypeVarId),
    Relation(Vec<Type>),
    Tuple(Vec<Type>),
    ManifestReference(String),
}

impl Type {
    pub fn entity(schema: Schema) -> Type {
        Type::Entity(Arc::new(schema))
    }

    pub fn set_of(inner: Type) -> Type {
        Type::SetView(Box::new(inner))
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Type::Entity(_))
    }

    pub fn is_set_view(&self) -> bool {
        matches!(self, Type::SetView(_))
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, Type::Interface(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Type::Variable(_))
    }

    pub fn is_variable_reference(&self) -> bool {
        matches!(self, Type::VariableReference(_))
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, Type::Relation(_))
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Type::Tuple(_))
    }

    pub fn is_manifest_reference(&self) -> bool {
        matches!(self, Type::ManifestReference(_))
    }

    pub fn as_entity(&self) -> Option<&Schema> {
        match self {
            Type::Entity(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set_view(&self) -> Option<&Type> {
        match self {
            Type::SetView(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&InterfaceInfo> {
        match self {
            Type::Interface(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<TypeVarId> {
        match self {
            Type::Variable(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_variable_reference(&self) -> Option<&str> {
        match self {
            Type::VariableReference(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_manifest_reference(&self) -> Option<&str> {
        match self {
            Type::ManifestReference(name) => Some(name),
            _ => None,
        }
    }

    /// Strip matching `SetView` layers from both sides.
    pub fn unwrap_pair<'a>(mut a: &'a Type, mut b: &'a Type) -> (&'a Type, &'a Type) {
        while let (Type::SetView(x), Type::SetView(y)) = (a, b) {
            a = x;
            b = y;
        }
        (a, b)
    }

    pub fn has_variable_reference(&self) -> bool {
        match self {
            Type::VariableReference(_) => true,
            Type::SetView(inner) => inner.has_variable_reference(),
            Type::Relation(items) | Type::Tuple(items) => {
                items.iter().any(Type::has_variable_reference)
            }
            Type::Interface(info) => info
                .handles
                .iter()
                .any(|h| h.ty.as_ref().is_some_and(Type::has_variable_reference)),
            _ => false,
        }
    }

    /// Replace every `VariableReference` with a `Variable` in `vars`. Names
    /// already present in `names` reuse their variable, so one pass over a
    /// particle spec shares one variable per name.
    pub fn assign_variable_ids(
        &self,
        vars: &mut TypeVariables,
        names: &mut HashMap<String, TypeVarId>,
    ) -> Type {
        match self {
            Type::VariableReference(name) => {
                let id = *names
                    .entry(name.clone())
                    .or_insert_with(|| vars.fresh(name));
                Type::Variable(id)
            }
            Type::SetView(inner) => Type::set_of(inner.assign_variable_ids(vars, names)),
            Type::Relation(items) => Type::Relation(
                items
                    .iter()
                    .map(|t| t.assign_variable_ids(vars, names))
                    .collect(),
            ),
            Type::Tuple(items) => Type::Tuple(
                items
                    .iter()
                    .map(|t| t.assign_variable_ids(vars, names))
                    .collect(),
            ),
            Type::Interface(info) => {
                let handles = info
                    .handles
                    .iter()
                    .map(|h| InterfaceHandle {
                        name: h.name.clone(),
                        direction: h.direction,
                        ty: h.ty.as_ref().map(|t| t.assign_variable_ids(vars, names)),
                    })
                    .collect();
                Type::Interface(Arc::new(InterfaceInfo {
                    name: info.name.clone(),
                    handles,
                }))
            }
            other => other.clone(),
        }
    }

    /// Shift every variable index by `offset`, for merging arenas.
    pub fn offset_variables(&self, offset: u32) -> Type {
        match self {
            Type::Variable(id) => Type::Variable(TypeVarId(id.0 + offset)),
            Type::SetView(inner) => Type::set_of(inner.offset_variables(offset)),
            Type::Relation(items) => {
                Type::Relation(items.iter().map(|t| t.offset_variables(offset)).collect())
            }
            Type::Tuple(items) => {
                Type::Tuple(items.iter().map(|t| t.offset_variables(offset)).collect())
            }
            Type::Interface(info) => {
                let handles = info
                    .handles
                    .iter()
                    .map(|h| InterfaceHandle {
                        name: h.name.clone(),
                        direction: h.direction,
                        ty: h.ty.as_ref().map(|t| t.offset_variables(offset)),
                    })
                    .collect();
                Type::Interface(Arc::new(InterfaceInfo {
                    name: info.name.clone(),
                    handles,
                }))
            }
            other => other.clone(),
        }
    }

    /// Render through `vars`, following resolved variables.
    pub fn display<'a>(&'a self, vars: &'a TypeVariables) -> TypeDisplay<'a> {
        TypeDisplay { ty: self, vars }
    }
}

pub struct TypeDisplay<'a> {
    ty: &'a Type,
    vars: &'a TypeVariables,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Type::Entity(schema) => write!(f, "{}", schema),
            Type::SetView(inner) => write!(f, "[{}]", inner.display(self.vars)),
            Type::Interface(info) => write!(f, "{}", info.name),
            Type::VariableReference(name) => write!(f, "~{}", name),
            Type::Variable(id) => match self.vars.resolution(*id) {
                Some(resolved) => write!(f, "{}", resolved.display(self.vars)),
                None => write!(f, "~{}", self.vars.name(*id)),
            },
            Type::Relation(items) | Type::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.display(self.vars))?;
                }
                write!(f, ")")
            }
            Type::ManifestReference(name) => write!(f, "{}", name),
        }
    }
}

// ============================================================================
// Variable arena
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TypeVariable {
    pub name: String,
    resolution: Option<Type>,
}

/// Unification cells, addressed by [`TypeVarId`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeVariables {
    cells: Vec<TypeVariable>,
}

impl TypeVariables {
    pub fn fresh(&mut self, name: &str) -> TypeVarId {
        self.cells.push(TypeVariable {
            name: name.to_string(),
            resolution: None,
        });
        TypeVarId((self.cells.len() - 1) as u32)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn name(&self, id: TypeVarId) -> &str {
        &self.cells[id.index()].name
    }

    pub fn resolution(&self, id: TypeVarId) -> Option<&Type> {
        self.cells[id.index()].resolution.as_ref()
    }

    /// Resolve `id` to `ty`. The first resolution wins: returns `false` and
    /// leaves the cell untouched if it is already resolved or if `ty` still
    /// mentions `id` once resolved.
    pub fn resolve(&mut self, id: TypeVarId, ty: Type) -> bool {
        if self.cells[id.index()].resolution.is_some() {
            return false;
        }
        if self.mentions(&ty, id) {
            return false;
        }
        self.cells[id.index()].resolution = Some(ty);
        true
    }

    /// Follow resolutions until reaching a concrete type or an unresolved
    /// variable. Set wrappers are resolved recursively.
    pub fn resolved_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Variable(id) => match self.resolution(*id) {
                Some(next) => self.resolved_type(next),
                None => ty.clone(),
            },
            Type::SetView(inner) => Type::set_of(self.resolved_type(inner)),
            other => other.clone(),
        }
    }

    fn mentions(&self, ty: &Type, id: TypeVarId) -> bool {
        match self.resolved_type(ty) {
            Type::Variable(other) => other == id,
            Type::SetView(inner) => self.mentions(&inner, id),
            Type::Relation(items) | Type::Tuple(items) => {
                items.iter().any(|t| self.mentions(t, id))
            }
            _ => false,
        }
    }

    /// True when no unresolved variable remains inside `ty`.
    pub fn is_fully_resolved(&self, ty: &Type) -> bool {
        match self.resolved_type(ty) {
            Type::Variable(_) | Type::VariableReference(_) => false,
            Type::SetView(inner) => self.is_fully_resolved(&inner),
            Type::Relation(items) | Type::Tuple(items) => {
                items.iter().all(|t| self.is_fully_resolved(t))
            }
            _ => true,
        }
    }

    /// Append `other`'s cells, returning the index offset applied to them.
    pub fn append(&mut self, other: &TypeVariables) -> u32 {
        let offset = self.cells.len() as u32;
        for cell in &other.cells {
            self.cells.push(TypeVariable {
                name: cell.name.clone(),
                resolution: cell.resolution.as_ref().map(|t| t.offset_variables(offset)),
            });
        }
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Type {
        Type::entity(Schema::new("Product"))
    }

    #[test]
    fn test_assign_variable_ids_shares_by_name() {
        let mut vars = TypeVariables::default();
        let mut names = HashMap::new();
        let a = Type::VariableReference("a".into()).assign_variable_ids(&mut vars, &mut names);
        let set_a = Type::set_of(Type::VariableReference("a".into()))
            .assign_variable_ids(&mut vars, &mut names);
        let b = Type::VariableReference("b".into()).assign_variable_ids(&mut vars, &mut names);
        assert_eq!(vars.len(), 2);
        assert_eq!(set_a.as_set_view(), Some(&a));
        assert_ne!(a, b);
    }

    #[test]
    fn test_separate_passes_get_separate_variables() {
        let mut vars = TypeVariables::default();
        let reference = Type::VariableReference("x".into());
        let first = reference.assign_variable_ids(&mut vars, &mut HashMap::new());
        let second = reference.assign_variable_ids(&mut vars, &mut HashMap::new());
        assert_ne!(first, second);
    }

    #[test]
    fn test_first_resolution_wins() {
        let mut vars = TypeVariables::default();
        let v = vars.fresh("x");
        assert!(vars.resolve(v, product()));
        assert!(!vars.resolve(v, Type::entity(Schema::new("Other"))));
        assert_eq!(vars.resolved_type(&Type::Variable(v)), product());
    }

    #[test]
    fn test_variable_chain_and_self_cycle() {
        let mut vars = TypeVariables::default();
        let a = vars.fresh("a");
        let b = vars.fresh("b");
        assert!(vars.resolve(a, Type::Variable(b)));
        assert!(!vars.resolve(b, Type::Variable(a)));
        assert!(vars.resolve(b, product()));
        assert_eq!(vars.resolved_type(&Type::Variable(a)), product());
    }

    #[test]
    fn test_variable_never_resolves_to_type_containing_itself() {
        let mut vars = TypeVariables::default();
        let a = vars.fresh("a");
        assert!(!vars.resolve(a, Type::set_of(Type::Variable(a))));
        assert!(vars.resolution(a).is_none());
    }

    #[test]
    fn test_display_resolves_through_arena() {
        let mut vars = TypeVariables::default();
        let v = vars.fresh("t");
        let ty = Type::set_of(Type::Variable(v));
        assert_eq!(ty.display(&vars).to_string(), "[~t]");
        vars.resolve(v, product());
        assert_eq!(ty.display(&vars).to_string(), "[Product]");
        assert!(vars.is_fully_resolved(&ty));
    }

    #[test]
    fn test_unwrap_pair() {
        let a = Type::set_of(Type::set_of(product()));
        let b = Type::set_of(product());
        let (x, y) = Type::unwrap_pair(&a, &b);
        assert!(x.is_set_view());
        assert!(y.is_entity());
    }

    #[test]
    fn test_append_offsets_resolutions() {
        let mut left = TypeVariables::default();
        left.fresh("a");
        let mut right = TypeVariables::default();
        let x = right.fresh("x");
        let y = right.fresh("y");
        right.resolve(x, Type::Variable(y));
        let offset = left.append(&right);
        assert_eq!(offset, 1);
        assert_eq!(left.resolution(TypeVarId(1)), Some(&Type::Variable(TypeVarId(2))));
    }
}
