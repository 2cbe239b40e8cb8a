//! ResourceArc Wrappers
//!
//! Persistent handles held by the host between calls: result iterators
//! survive across pulls until destroyed or garbage collected.

use crate::boundary::IteratorRef;
use rustler::ResourceArc;

/// Wrapper for an iterator handle that can be stored in a ResourceArc.
/// The handle itself serializes pulls; the resource adds only host
/// lifetime management.
pub struct ResultIteratorResource {
    pub handle: IteratorRef,
}

impl ResultIteratorResource {
    pub fn new(handle: IteratorRef) -> Self {
        ResultIteratorResource { handle }
    }
}

#[rustler::resource_impl]
impl rustler::Resource for ResultIteratorResource {}

/// Type alias for the ResourceArc
pub type ResultIteratorRef = ResourceArc<ResultIteratorResource>;
