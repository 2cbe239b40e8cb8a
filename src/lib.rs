//! RustySearch - native bindings layer for a search engine
//!
//! Host values cross the boundary as flat event trees (see `tree`); the
//! structure readers in `reader` turn them into typed records, and the call
//! boundary in `boundary` carries results, handles and errors back. The
//! value model and text codec live in `value`.

use rustler::{Binary, Encoder, Env, NifResult, ResourceArc, Term};

pub mod boundary;
pub mod error;
pub mod reader;
pub mod resource;
pub mod term;
pub mod tree;
pub mod value;

use boundary::{CallResult, IteratorHandle, Pull, VecIterator};
use resource::{ResultIteratorRef, ResultIteratorResource};
use term::{bytes_to_binary, call_result_to_term, tree_from_term};
use value::{codec, AtomicValue, EncodedString, StringEncoding};

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "memory_tracking")]
mod tracking {
    use std::alloc::{GlobalAlloc, Layout};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
    pub static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

    pub struct TrackingAllocator;

    #[cfg(feature = "mimalloc")]
    static UNDERLYING: mimalloc::MiMalloc = mimalloc::MiMalloc;

    #[cfg(not(feature = "mimalloc"))]
    static UNDERLYING: std::alloc::System = std::alloc::System;

    unsafe impl GlobalAlloc for TrackingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ptr = UNDERLYING.alloc(layout);
            if !ptr.is_null() {
                let current = ALLOCATED.fetch_add(layout.size(), Ordering::Relaxed) + layout.size();
                let mut peak = PEAK_ALLOCATED.load(Ordering::Relaxed);
                while current > peak {
                    match PEAK_ALLOCATED.compare_exchange_weak(
                        peak,
                        current,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(p) => peak = p,
                    }
                }
            }
            ptr
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
            UNDERLYING.dealloc(ptr, layout)
        }
    }
}

#[cfg(feature = "memory_tracking")]
#[global_allocator]
static GLOBAL: tracking::TrackingAllocator = tracking::TrackingAllocator;

#[cfg(all(feature = "mimalloc", not(feature = "memory_tracking")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Memory Tracking NIFs
// ============================================================================

#[cfg(feature = "memory_tracking")]
use std::sync::atomic::Ordering;

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn get_rust_memory() -> usize {
    tracking::ALLOCATED.load(Ordering::SeqCst)
}

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    tracking::PEAK_ALLOCATED.load(Ordering::SeqCst)
}

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    let current = tracking::ALLOCATED.load(Ordering::SeqCst);
    let peak = tracking::PEAK_ALLOCATED.swap(current, Ordering::SeqCst);
    (current, peak)
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn get_rust_memory() -> usize {
    0
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    0
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    (0, 0)
}

// ============================================================================
// Structure Readers
// ============================================================================

fn error_tuple<'a>(env: Env<'a>, msg: impl AsRef<str>) -> Term<'a> {
    (term::error(), bytes_to_binary(env, msg.as_ref().as_bytes())).encode(env)
}

/// Parse a query expression. `operators` is the engine's join operator
/// vocabulary, needed to tell a zero-argument join from a term.
#[rustler::nif]
fn read_query_expression<'a>(
    env: Env<'a>,
    expr: Term<'a>,
    operators: Vec<String>,
) -> NifResult<Term<'a>> {
    let tree = match tree_from_term(expr) {
        Ok(t) => t,
        Err(e) => return Ok(error_tuple(env, e)),
    };
    match reader::expression::parse_expression(&tree, &operators) {
        Ok(parsed) => Ok((term::ok(), term::expression_to_term(env, &parsed)).encode(env)),
        Err(e) => Ok(error_tuple(env, e.to_string())),
    }
}

/// Parse an insert document.
#[rustler::nif]
fn read_insert_document<'a>(env: Env<'a>, doc: Term<'a>) -> NifResult<Term<'a>> {
    let tree = match tree_from_term(doc) {
        Ok(t) => t,
        Err(e) => return Ok(error_tuple(env, e)),
    };
    match reader::document::read_document(&tree) {
        Ok(parsed) => match term::document_to_term(env, &parsed) {
            Ok(t) => Ok((term::ok(), t).encode(env)),
            Err(e) => Ok(error_tuple(env, e)),
        },
        Err(e) => Ok(error_tuple(env, e.to_string())),
    }
}

/// Parse a metadata restriction into its CNF groups.
#[rustler::nif]
fn read_metadata_restriction<'a>(env: Env<'a>, restriction: Term<'a>) -> NifResult<Term<'a>> {
    let tree = match tree_from_term(restriction) {
        Ok(t) => t,
        Err(e) => return Ok(error_tuple(env, e)),
    };
    match reader::restriction::parse_restriction(&tree) {
        Ok(parsed) => match term::restriction_to_term(env, &parsed) {
            Ok(t) => Ok((term::ok(), t).encode(env)),
            Err(e) => Ok(error_tuple(env, e)),
        },
        Err(e) => Ok(error_tuple(env, e.to_string())),
    }
}

/// Parse a statistics message; the blob arrives base64-encoded and comes
/// back as a raw binary.
#[rustler::nif]
fn read_statistics_message<'a>(env: Env<'a>, message: Term<'a>) -> NifResult<Term<'a>> {
    let tree = match tree_from_term(message) {
        Ok(t) => t,
        Err(e) => return Ok(error_tuple(env, e)),
    };
    match reader::statistics::read_statistics(&tree) {
        Ok(parsed) => Ok((term::ok(), term::statistics_to_term(env, &parsed)).encode(env)),
        Err(e) => Ok(error_tuple(env, e.to_string())),
    }
}

/// Flatten a configuration structure to `key=value;...` text. A binary
/// passes through unchanged.
#[rustler::nif]
fn read_config_text<'a>(env: Env<'a>, config: Term<'a>) -> NifResult<Term<'a>> {
    if config.is_binary() {
        return Ok((term::ok(), config).encode(env));
    }
    let tree = match tree_from_term(config) {
        Ok(t) => t,
        Err(e) => return Ok(error_tuple(env, e)),
    };
    match reader::config::read_config(&tree) {
        Ok(text) => Ok((term::ok(), bytes_to_binary(env, text.as_bytes())).encode(env)),
        Err(e) => Ok(error_tuple(env, e.to_string())),
    }
}

/// Flat event list of the tree a host term maps to, for debugging the
/// structure a reader actually sees.
#[rustler::nif]
fn tree_events<'a>(env: Env<'a>, input: Term<'a>) -> NifResult<Term<'a>> {
    let tree = match tree_from_term(input) {
        Ok(t) => t,
        Err(e) => return Ok(error_tuple(env, e)),
    };
    match term::tree_events_to_term(env, &tree) {
        Ok(t) => Ok((term::ok(), t).encode(env)),
        Err(e) => Ok(error_tuple(env, e)),
    }
}

// ============================================================================
// Text Codec
// ============================================================================

/// Encode UTF-8 text into one of the supported string encodings.
#[rustler::nif]
fn encode_text<'a>(env: Env<'a>, text: Binary<'a>, encoding: &str) -> NifResult<Term<'a>> {
    let enc = match StringEncoding::from_name(encoding) {
        Some(e) => e,
        None => return Ok(error_tuple(env, format!("unknown encoding '{encoding}'"))),
    };
    let utf8 = match std::str::from_utf8(text.as_slice()) {
        Ok(s) => s,
        Err(_) => return Ok(error_tuple(env, "input is not valid UTF-8")),
    };
    let encoded = codec::encode(utf8, enc);
    Ok((term::ok(), bytes_to_binary(env, &encoded.bytes)).encode(env))
}

/// Decode text in one of the supported string encodings to UTF-8.
#[rustler::nif]
fn decode_text<'a>(env: Env<'a>, bytes: Binary<'a>, encoding: &str) -> NifResult<Term<'a>> {
    let enc = match StringEncoding::from_name(encoding) {
        Some(e) => e,
        None => return Ok(error_tuple(env, format!("unknown encoding '{encoding}'"))),
    };
    let encoded = EncodedString::new(enc, bytes.as_slice().to_vec());
    match codec::decode(&encoded) {
        Ok(s) => Ok((term::ok(), bytes_to_binary(env, s.as_bytes())).encode(env)),
        Err(e) => Ok(error_tuple(env, e.to_string())),
    }
}

// ============================================================================
// Result Iteration
// ============================================================================

/// Wrap a list of values in a pull iterator resource.
#[rustler::nif]
fn results_iterator<'a>(env: Env<'a>, items: Term<'a>) -> NifResult<Term<'a>> {
    let tree = match tree_from_term(items) {
        Ok(t) => t,
        Err(e) => return Ok(error_tuple(env, e)),
    };
    let mut values: Vec<AtomicValue> = Vec::new();
    let mut cur = tree.cursor();
    loop {
        match cur.tag() {
            None => break,
            Some(tree::Tag::Value) => {
                values.push(cur.value().expect("value node").clone());
                cur.advance();
            }
            Some(tree::Tag::Open) => {
                let start = cur.position();
                if cur.skip().is_err() {
                    return Ok(error_tuple(env, "unbalanced structure"));
                }
                let mut sub = tree::Tree::new();
                for node in &tree.nodes()[start + 1..cur.position() - 1] {
                    match node.tag {
                        tree::Tag::Open => sub.push_open(),
                        tree::Tag::Close => sub.push_close(),
                        tree::Tag::Name => sub.push_name(node.value.clone()),
                        tree::Tag::Value => sub.push_value(node.value.clone()),
                    }
                }
                values.push(AtomicValue::Tree(Box::new(sub)));
            }
            _ => return Ok(error_tuple(env, "iterator items must be values or structures")),
        }
    }
    let handle = IteratorHandle::new(VecIterator::new(values));
    let res = ResourceArc::new(ResultIteratorResource::new(handle));
    Ok((term::ok(), res).encode(env))
}

/// Pull the next item: `{:ok, item}`, `:done`, or `{:error, message}`.
#[rustler::nif]
fn iterator_next<'a>(env: Env<'a>, res: ResultIteratorRef) -> NifResult<Term<'a>> {
    let mut scratch = CallResult::new();
    match res.handle.pull_next(&mut scratch) {
        Pull::Produced => Ok(call_result_to_term(env, &mut scratch)),
        Pull::Exhausted => {
            if scratch.has_error() {
                Ok(error_tuple(env, scratch.error()))
            } else {
                Ok(term::done().encode(env))
            }
        }
    }
}

/// Destroy the iterator now instead of waiting for garbage collection.
/// Returns whether this call released the underlying iterator.
#[rustler::nif]
fn iterator_destroy(res: ResultIteratorRef) -> bool {
    res.handle.destroy()
}

// ============================================================================
// NIF Initialization
// ============================================================================

fn load(_env: Env, _info: Term) -> bool {
    true
}

rustler::init!("Elixir.RustySearch.Native", load = load);
