//! Call boundary between the host language and the engine.
//!
//! Every native call fills a [`CallResult`]: exactly one payload kind plus an
//! out-of-band error slot. A written error takes precedence over whatever
//! payload is present; the host side never sees both.

pub mod iterator;

pub use iterator::{IteratorHandle, IteratorRef, Pull, ResultIterator, VecIterator};

use crate::value::{AtomicValue, HostObjectRef};
use crate::tree::Tree;

#[derive(Debug, Default)]
pub enum CallValue {
    #[default]
    Void,
    Atomic(AtomicValue),
    Tree(Tree),
    Object(HostObjectRef),
    Iterator(IteratorRef),
}

impl CallValue {
    pub fn is_void(&self) -> bool {
        matches!(self, CallValue::Void)
    }
}

#[derive(Debug, Default)]
pub struct CallResult {
    value: CallValue,
    error: String,
}

impl CallResult {
    pub fn new() -> CallResult {
        CallResult::default()
    }

    pub fn set_value(&mut self, value: CallValue) {
        self.value = value;
    }

    pub fn set_atomic(&mut self, value: impl Into<AtomicValue>) {
        self.value = CallValue::Atomic(value.into());
    }

    pub fn set_tree(&mut self, tree: Tree) {
        self.value = CallValue::Tree(tree);
    }

    pub fn set_object(&mut self, handle: HostObjectRef) {
        self.value = CallValue::Object(handle);
    }

    pub fn set_iterator(&mut self, handle: IteratorRef) {
        self.value = CallValue::Iterator(handle);
    }

    /// Record an error message. The latest write wins; any payload becomes
    /// unreachable through [`CallResult::value`].
    pub fn report_error(&mut self, msg: impl Into<String>) {
        self.error = msg.into();
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    /// The payload, unless an error is set.
    pub fn value(&self) -> Option<&CallValue> {
        if self.has_error() {
            None
        } else {
            Some(&self.value)
        }
    }

    /// Take the payload out, leaving Void. `None` under an error.
    pub fn take_value(&mut self) -> Option<CallValue> {
        if self.has_error() {
            None
        } else {
            Some(std::mem::take(&mut self.value))
        }
    }

    /// Reset for reuse as an iterator scratch slot.
    pub fn clear(&mut self) {
        self.value = CallValue::Void;
        self.error.clear();
    }
}
