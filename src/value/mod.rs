//! The tagged value model crossing the language boundary.
//!
//! Every value exchanged with the host is an [`AtomicValue`]: a scalar, an
//! encoded string, a nested event tree, or one of two opaque handle kinds.
//! Values own their payloads; strings keep their source encoding and are
//! converted on demand (see [`convert`]).

pub mod codec;
pub mod convert;
pub mod handle;

pub use codec::{EncodedString, StringEncoding};
pub use handle::{HostObject, HostObjectRef};

use crate::boundary::IteratorRef;
use crate::tree::Tree;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub enum AtomicValue {
    /// Undefined / absent.
    #[default]
    Void,
    Int(i64),
    UInt(u64),
    Double(f64),
    Bool(bool),
    Str(EncodedString),
    /// Opaque engine object handle.
    Object(HostObjectRef),
    /// Nested event tree (owned).
    Tree(Box<Tree>),
    /// Pull-iterator handle.
    Iterator(IteratorRef),
}

impl AtomicValue {
    pub fn string(s: impl Into<String>) -> AtomicValue {
        AtomicValue::Str(EncodedString::from_utf8(s))
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, AtomicValue::Void)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AtomicValue::Int(_) | AtomicValue::UInt(_) | AtomicValue::Double(_) | AtomicValue::Bool(_)
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, AtomicValue::Str(_))
    }

    /// Numeric or string: representable as a single host scalar.
    pub fn is_atomic(&self) -> bool {
        self.is_numeric() || self.is_string()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AtomicValue::Void => "void",
            AtomicValue::Int(_) => "int",
            AtomicValue::UInt(_) => "uint",
            AtomicValue::Double(_) => "double",
            AtomicValue::Bool(_) => "bool",
            AtomicValue::Str(_) => "string",
            AtomicValue::Object(_) => "object",
            AtomicValue::Tree(_) => "serialization",
            AtomicValue::Iterator(_) => "iterator",
        }
    }
}

impl PartialEq for AtomicValue {
    /// Scalars compare structurally, handles by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AtomicValue::Void, AtomicValue::Void) => true,
            (AtomicValue::Int(a), AtomicValue::Int(b)) => a == b,
            (AtomicValue::UInt(a), AtomicValue::UInt(b)) => a == b,
            (AtomicValue::Double(a), AtomicValue::Double(b)) => a == b,
            (AtomicValue::Bool(a), AtomicValue::Bool(b)) => a == b,
            (AtomicValue::Str(a), AtomicValue::Str(b)) => a == b,
            (AtomicValue::Tree(a), AtomicValue::Tree(b)) => a == b,
            (AtomicValue::Object(a), AtomicValue::Object(b)) => Arc::ptr_eq(a, b),
            (AtomicValue::Iterator(a), AtomicValue::Iterator(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for AtomicValue {
    fn from(v: i64) -> Self {
        AtomicValue::Int(v)
    }
}

impl From<u64> for AtomicValue {
    fn from(v: u64) -> Self {
        AtomicValue::UInt(v)
    }
}

impl From<f64> for AtomicValue {
    fn from(v: f64) -> Self {
        AtomicValue::Double(v)
    }
}

impl From<bool> for AtomicValue {
    fn from(v: bool) -> Self {
        AtomicValue::Bool(v)
    }
}

impl From<&str> for AtomicValue {
    fn from(v: &str) -> Self {
        AtomicValue::string(v)
    }
}

impl From<String> for AtomicValue {
    fn from(v: String) -> Self {
        AtomicValue::string(v)
    }
}

impl From<Tree> for AtomicValue {
    fn from(t: Tree) -> Self {
        AtomicValue::Tree(Box::new(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(!AtomicValue::Void.is_defined());
        assert!(AtomicValue::Int(-1).is_numeric());
        assert!(AtomicValue::Bool(true).is_numeric());
        assert!(AtomicValue::string("x").is_string());
        assert!(AtomicValue::string("x").is_atomic());
        assert!(!AtomicValue::from(Tree::new()).is_atomic());
    }

    #[test]
    fn test_handle_equality_is_identity() {
        let a = HostObject::borrowed(1);
        let b = HostObject::borrowed(1);
        assert_eq!(AtomicValue::Object(a.clone()), AtomicValue::Object(a.clone()));
        assert_ne!(AtomicValue::Object(a), AtomicValue::Object(b));
    }
}
