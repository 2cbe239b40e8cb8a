//! Pull-based result iteration across the call boundary.
//!
//! The host drives iteration synchronously: each pull writes the next item
//! into a scratch [`CallResult`] and reports whether one was produced.
//! Errors never unwind across the boundary; they land in the scratch
//! object's error slot and the pull reports exhaustion.

use super::CallResult;
use crate::error::BindError;
use crate::value::AtomicValue;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// An item was written into the scratch result.
    Produced,
    /// No more items; the scratch result is untouched unless an error
    /// was reported.
    Exhausted,
}

/// Engine-side source of iteration items.
pub trait ResultIterator: Send {
    /// Write the next item into `scratch`. Report failures through
    /// `scratch.report_error` and return `Exhausted`.
    fn pull(&mut self, scratch: &mut CallResult) -> Pull;
}

pub type IteratorRef = Arc<IteratorHandle>;

/// Shared handle around a result iterator. The mutex serializes pulls: at
/// most one outstanding pull per handle, never re-entrant. Destroying the
/// handle drops the underlying iterator once; pulls after that report an
/// error through the scratch slot.
pub struct IteratorHandle {
    inner: Mutex<Option<Box<dyn ResultIterator>>>,
}

impl IteratorHandle {
    pub fn new(iter: impl ResultIterator + 'static) -> IteratorRef {
        Arc::new(IteratorHandle {
            inner: Mutex::new(Some(Box::new(iter))),
        })
    }

    pub fn pull_next(&self, scratch: &mut CallResult) -> Pull {
        scratch.clear();
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(_) => {
                scratch.report_error(BindError::Alloc.to_string());
                return Pull::Exhausted;
            }
        };
        match guard.as_mut() {
            Some(iter) => iter.pull(scratch),
            None => {
                scratch.report_error("iterator already destroyed");
                Pull::Exhausted
            }
        }
    }

    /// Drop the underlying iterator now. Idempotent.
    pub fn destroy(&self) -> bool {
        match self.inner.lock() {
            Ok(mut guard) => guard.take().is_some(),
            Err(_) => false,
        }
    }

    /// Take the underlying iterator out without destroying it.
    pub fn release(&self) -> Option<Box<dyn ResultIterator>> {
        self.inner.lock().ok().and_then(|mut g| g.take())
    }

    pub fn is_live(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl fmt::Debug for IteratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorHandle")
            .field("live", &self.is_live())
            .finish()
    }
}

/// Iterator over a pre-built vector of atomic values. Used for paging
/// engine result lists to the host.
pub struct VecIterator {
    items: std::vec::IntoIter<AtomicValue>,
}

impl VecIterator {
    pub fn new(items: Vec<AtomicValue>) -> VecIterator {
        VecIterator {
            items: items.into_iter(),
        }
    }
}

impl ResultIterator for VecIterator {
    fn pull(&mut self, scratch: &mut CallResult) -> Pull {
        match self.items.next() {
            Some(item) => {
                scratch.set_atomic(item);
                Pull::Produced
            }
            None => Pull::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::CallValue;

    #[test]
    fn test_pull_until_exhausted() {
        let handle = IteratorHandle::new(VecIterator::new(vec![
            AtomicValue::Int(1),
            AtomicValue::Int(2),
        ]));
        let mut scratch = CallResult::new();
        assert_eq!(handle.pull_next(&mut scratch), Pull::Produced);
        assert!(matches!(scratch.value(), Some(CallValue::Atomic(AtomicValue::Int(1)))));
        assert_eq!(handle.pull_next(&mut scratch), Pull::Produced);
        assert_eq!(handle.pull_next(&mut scratch), Pull::Exhausted);
        assert!(!scratch.has_error());
        // exhaustion is sticky
        assert_eq!(handle.pull_next(&mut scratch), Pull::Exhausted);
    }

    #[test]
    fn test_pull_after_destroy_reports_error() {
        let handle = IteratorHandle::new(VecIterator::new(vec![AtomicValue::Int(1)]));
        assert!(handle.destroy());
        assert!(!handle.destroy());
        let mut scratch = CallResult::new();
        assert_eq!(handle.pull_next(&mut scratch), Pull::Exhausted);
        assert!(scratch.has_error());
    }

    struct FailingIterator;

    impl ResultIterator for FailingIterator {
        fn pull(&mut self, scratch: &mut CallResult) -> Pull {
            scratch.report_error("backend gone");
            Pull::Exhausted
        }
    }

    #[test]
    fn test_iterator_error_lands_in_scratch_slot() {
        let handle = IteratorHandle::new(FailingIterator);
        let mut scratch = CallResult::new();
        assert_eq!(handle.pull_next(&mut scratch), Pull::Exhausted);
        assert_eq!(scratch.error(), "backend gone");
        assert!(scratch.value().is_none());
    }

    #[test]
    fn test_scratch_is_cleared_between_pulls() {
        let handle = IteratorHandle::new(VecIterator::new(vec![AtomicValue::Int(1)]));
        let mut scratch = CallResult::new();
        scratch.report_error("stale");
        assert_eq!(handle.pull_next(&mut scratch), Pull::Produced);
        assert!(!scratch.has_error());
    }

    #[test]
    fn test_release_transfers_iterator() {
        let handle = IteratorHandle::new(VecIterator::new(vec![AtomicValue::Int(9)]));
        let mut iter = handle.release().unwrap();
        assert!(!handle.is_live());
        let mut scratch = CallResult::new();
        assert_eq!(iter.pull(&mut scratch), Pull::Produced);
    }
}
