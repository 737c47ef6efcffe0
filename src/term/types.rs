//! Type slice consumed during unification
//!
//! The engine only needs a minimal notion of typing: every term node carries
//! a resolved [`TypeTag`], and unification asks a [`TypeSystem`] whether two
//! tags are compatible before attempting to bind or decompose. Full type
//! inference lives outside this crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resolved type of a term node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// Truth values (formulas, atoms, connectives, quantifiers)
    Bool,
    /// Individuals of the domain of discourse
    Entity,
    /// Integers (constraint and arithmetic predicates)
    Int,
    /// A named type from the caller's type system
    Named(String),
}

impl TypeTag {
    /// Check if this tag is a formula type
    pub fn is_bool(&self) -> bool {
        matches!(self, TypeTag::Bool)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Entity => write!(f, "entity"),
            TypeTag::Int => write!(f, "int"),
            TypeTag::Named(n) => write!(f, "{}", n),
        }
    }
}

/// Interface to the caller's type system
///
/// The engine consumes this during unification and goal validation. The
/// default implementation, [`SimpleTypeSystem`], treats identical tags as
/// compatible and `Entity` as compatible with any non-formula type.
pub trait TypeSystem: Send + Sync {
    /// Resolve the type of a named symbol, if known
    fn get_type(&self, name: &str) -> Option<TypeTag>;

    /// Check whether two types may denote the same value
    fn check_compatible(&self, t1: &TypeTag, t2: &TypeTag) -> bool;
}

/// Structural type system with no subtyping beyond `Entity`
#[derive(Debug, Clone, Default)]
pub struct SimpleTypeSystem;

impl TypeSystem for SimpleTypeSystem {
    fn get_type(&self, _name: &str) -> Option<TypeTag> {
        None
    }

    fn check_compatible(&self, t1: &TypeTag, t2: &TypeTag) -> bool {
        if t1 == t2 {
            return true;
        }
        // Entity is the top of the value hierarchy; it covers every
        // non-formula type, so an untyped variable can bind any individual
        match (t1, t2) {
            (TypeTag::Entity, other) | (other, TypeTag::Entity) => !other.is_bool(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_compatible() {
        let ts = SimpleTypeSystem;
        assert!(ts.check_compatible(&TypeTag::Int, &TypeTag::Int));
        assert!(ts.check_compatible(&TypeTag::Bool, &TypeTag::Bool));
    }

    #[test]
    fn test_entity_named_compatible() {
        let ts = SimpleTypeSystem;
        let person = TypeTag::Named("Person".to_string());
        assert!(ts.check_compatible(&TypeTag::Entity, &person));
        assert!(ts.check_compatible(&person, &TypeTag::Entity));
    }

    #[test]
    fn test_entity_covers_value_types() {
        let ts = SimpleTypeSystem;
        assert!(ts.check_compatible(&TypeTag::Entity, &TypeTag::Int));
        assert!(ts.check_compatible(&TypeTag::Int, &TypeTag::Entity));
    }

    #[test]
    fn test_incompatible() {
        let ts = SimpleTypeSystem;
        assert!(!ts.check_compatible(&TypeTag::Int, &TypeTag::Bool));
        assert!(!ts.check_compatible(&TypeTag::Entity, &TypeTag::Bool));
        assert!(!ts.check_compatible(
            &TypeTag::Named("Person".to_string()),
            &TypeTag::Named("Place".to_string())
        ));
    }
}
