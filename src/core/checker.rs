//! Type unification across the connections that share a handle.

use super::ty::{Type, TypeVarId, TypeVariables};
use super::types::Direction;
use std::collections::HashMap;

/// One position in a handle's type list: a type plus the direction it is
/// used in. A handle's own declared type participates as `Inout`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeListItem {
    pub ty: Type,
    pub direction: Direction,
}

impl TypeListItem {
    pub fn new(ty: Type, direction: Direction) -> Self {
        Self { ty, direction }
    }
}

/// Result of unifying types.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeCheck {
    /// Compatible; carries the surviving item (none for an empty list).
    Valid(Option<TypeListItem>),
    Invalid,
}

impl TypeCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, TypeCheck::Valid(_))
    }

    pub fn into_type(self) -> Option<Type> {
        match self {
            TypeCheck::Valid(item) => item.map(|i| i.ty),
            TypeCheck::Invalid => None,
        }
    }
}

pub struct TypeChecker;

/// Sort key giving a handle's type list a construction-independent order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ItemKey {
    variable: bool,
    rendered: String,
    direction: Direction,
}

impl TypeChecker {
    /// Unify two positions bound to the same handle.
    ///
    /// Equal types pass. Between an entity and a strict subclass of it the
    /// subclass survives when the supertype side only reads or the subtype
    /// side only writes; other direction pairs are incompatible. An unresolved
    /// variable on either side is resolved to the other side's type. Two
    /// unresolved variables bind toward the one with the smaller name, so the
    /// survivor does not depend on which side is visited first. A variable
    /// that would have to contain itself is incompatible.
    pub fn compare_types(
        vars: &mut TypeVariables,
        left: &TypeListItem,
        right: &TypeListItem,
    ) -> TypeCheck {
        let l = vars.resolved_type(&left.ty);
        let r = vars.resolved_type(&right.ty);
        if l == r {
            return TypeCheck::Valid(Some(left.clone()));
        }

        let (lp, rp) = Type::unwrap_pair(&l, &r);
        match (lp, rp) {
            (Type::Variable(a), Type::Variable(b)) => {
                let (keep, bind) = if Self::variable_key(vars, *a) <= Self::variable_key(vars, *b) {
                    ((*a, left), *b)
                } else {
                    ((*b, right), *a)
                };
                if !vars.resolve(bind, Type::Variable(keep.0)) {
                    return TypeCheck::Invalid;
                }
                TypeCheck::Valid(Some(keep.1.clone()))
            }
            (Type::Variable(a), other) => {
                if !vars.resolve(*a, other.clone()) {
                    return TypeCheck::Invalid;
                }
                TypeCheck::Valid(Some(right.clone()))
            }
            (other, Type::Variable(b)) => {
                if !vars.resolve(*b, other.clone()) {
                    return TypeCheck::Invalid;
                }
                TypeCheck::Valid(Some(left.clone()))
            }
            (Type::Entity(ls), Type::Entity(rs)) => {
                if ls == rs {
                    return TypeCheck::Valid(Some(left.clone()));
                }
                let (sup, sub) = if ls.is_strict_subclass_of(rs) {
                    (right, left)
                } else if rs.is_strict_subclass_of(ls) {
                    (left, right)
                } else {
                    return TypeCheck::Invalid;
                };
                if sup.direction == Direction::In || sub.direction == Direction::Out {
                    TypeCheck::Valid(Some(sub.clone()))
                } else {
                    TypeCheck::Invalid
                }
            }
            (Type::Interface(a), Type::Interface(b)) if a.name == b.name => {
                TypeCheck::Valid(Some(left.clone()))
            }
            (Type::ManifestReference(a), Type::ManifestReference(b)) if a == b => {
                TypeCheck::Valid(Some(left.clone()))
            }
            _ => TypeCheck::Invalid,
        }
    }

    /// Unify a handle's type list. Empty lists are valid with no type.
    ///
    /// The list is put in canonical order first: concrete types before
    /// unresolved variables, then by rendered type and direction. Folding
    /// that order binds every variable to the narrowest concrete type. Every
    /// pair is then checked, so a writer that is incompatible with any
    /// reader fails wherever it sits in the list.
    pub fn process_type_list(vars: &mut TypeVariables, list: &[TypeListItem]) -> TypeCheck {
        let mut sorted: Vec<(ItemKey, &TypeListItem)> = list
            .iter()
            .map(|item| (Self::item_key(vars, item), item))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let items: Vec<&TypeListItem> = sorted.into_iter().map(|(_, item)| item).collect();

        let Some((first, rest)) = items.split_first() else {
            return TypeCheck::Valid(None);
        };
        let mut base = (*first).clone();
        for item in rest {
            match Self::compare_types(vars, &base, item) {
                TypeCheck::Valid(Some(next)) => base = next,
                TypeCheck::Valid(None) => {}
                TypeCheck::Invalid => return TypeCheck::Invalid,
            }
        }

        for (i, left) in items.iter().enumerate() {
            for right in &items[i + 1..] {
                if !Self::compare_types(vars, left, right).is_valid() {
                    return TypeCheck::Invalid;
                }
            }
        }
        TypeCheck::Valid(Some(base))
    }

    /// Check whether a type as the manifest declares it (a spec connection or
    /// a store) could join `list` without disturbing the caller's variables.
    /// Its variable references get scratch variables first.
    pub fn accepts_declared_type(
        vars: &TypeVariables,
        list: &[TypeListItem],
        ty: &Type,
        direction: Direction,
    ) -> bool {
        let mut scratch = vars.clone();
        let ty = ty.assign_variable_ids(&mut scratch, &mut HashMap::new());
        let mut all = list.to_vec();
        all.push(TypeListItem::new(ty, direction));
        Self::process_type_list(&mut scratch, &all).is_valid()
    }

    fn variable_key(vars: &TypeVariables, id: TypeVarId) -> (&str, TypeVarId) {
        (vars.name(id), id)
    }

    fn item_key(vars: &TypeVariables, item: &TypeListItem) -> ItemKey {
        let resolved = vars.resolved_type(&item.ty);
        let mut core = &resolved;
        while let Type::SetView(inner) = core {
            core = inner;
        }
        ItemKey {
            variable: core.is_variable(),
            rendered: resolved.display(vars).to_string(),
            direction: item.direction,
        }
    }
}
