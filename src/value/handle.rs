//! Opaque host-object handles.
//!
//! A handle wraps an engine-side object together with the single-shot
//! capability to destroy it. Exactly one destroy happens per object: either
//! an explicit `destroy`, or implicitly when the last handle clone drops.
//! Transferring the object elsewhere goes through `release`, which takes the
//! payload out without destroying it.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

pub type HostObjectRef = Arc<HostObject>;

pub struct HostObject {
    class_id: u32,
    id: u64,
    payload: Mutex<Option<Box<dyn Any + Send>>>,
}

impl HostObject {
    /// Wrap an engine object. The handle owns the destroy obligation from
    /// here on.
    pub fn new(class_id: u32, payload: Box<dyn Any + Send>) -> HostObjectRef {
        Arc::new(HostObject {
            class_id,
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            payload: Mutex::new(Some(payload)),
        })
    }

    /// A handle that merely borrows an object owned elsewhere. Carries no
    /// destroy obligation.
    pub fn borrowed(class_id: u32) -> HostObjectRef {
        Arc::new(HostObject {
            class_id,
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            payload: Mutex::new(None),
        })
    }

    pub fn class_id(&self) -> u32 {
        self.class_id
    }

    /// Destroy the wrapped object now. Idempotent: the first call destroys,
    /// later calls (and the eventual drop) are no-ops. Returns whether this
    /// call performed the destruction.
    pub fn destroy(&self) -> bool {
        match self.payload.lock() {
            Ok(mut guard) => guard.take().is_some(),
            Err(_) => false,
        }
    }

    /// Take the wrapped object out without destroying it, transferring the
    /// destroy obligation to the caller. `None` if already destroyed,
    /// released, or borrowed.
    pub fn release(&self) -> Option<Box<dyn Any + Send>> {
        self.payload.lock().ok().and_then(|mut guard| guard.take())
    }

    /// Whether the handle still owns a live object.
    pub fn is_live(&self) -> bool {
        self.payload.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Run `f` on the wrapped object if it is live and of type `T`.
    pub fn with_payload<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.payload.lock().ok()?;
        guard.as_ref()?.downcast_ref::<T>().map(f)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("class_id", &self.class_id)
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destroy_is_single_shot() {
        let h = HostObject::new(7, Box::new(42u32));
        assert!(h.is_live());
        assert!(h.destroy());
        assert!(!h.destroy());
        assert!(!h.is_live());
    }

    #[test]
    fn test_release_transfers_ownership() {
        let h = HostObject::new(7, Box::new("engine object".to_string()));
        let payload = h.release().unwrap();
        assert_eq!(payload.downcast_ref::<String>().unwrap(), "engine object");
        // obligation moved out: nothing left to destroy
        assert!(!h.destroy());
    }

    #[test]
    fn test_borrowed_handle_has_nothing_to_destroy() {
        let h = HostObject::borrowed(3);
        assert_eq!(h.class_id(), 3);
        assert!(!h.is_live());
        assert!(!h.destroy());
    }

    #[test]
    fn test_with_payload() {
        let h = HostObject::new(1, Box::new(99i64));
        assert_eq!(h.with_payload(|v: &i64| *v), Some(99));
        assert_eq!(h.with_payload(|v: &u8| *v), None);
    }
}
