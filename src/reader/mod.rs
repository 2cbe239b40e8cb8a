//! Structure readers: turn event trees coming from the host into typed
//! records.
//!
//! The submodules hold one builder per record family; this module has the
//! shared primitives they are written in terms of (scalar readers, list
//! readers, close consumption) and the error-context rendering attached by
//! the outermost entry points.

pub mod config;
pub mod defs;
pub mod document;
pub mod expression;
pub mod name_map;
pub mod restriction;
pub mod statistics;

use crate::error::{BindError, BindResult};
use crate::tree::{Tag, Tree, TreeCursor};
use crate::value::{convert, AtomicValue};

/// Read the atomic value at the cursor and step over it.
pub fn value<'a>(cur: &mut TreeCursor<'a>) -> BindResult<&'a AtomicValue> {
    match cur.tag() {
        Some(Tag::Value) => {
            let v = cur.value().expect("value node");
            cur.advance();
            Ok(v)
        }
        _ => Err(BindError::UnexpectedToken {
            context: "structure",
            expected: "atomic value",
        }),
    }
}

pub fn string(cur: &mut TreeCursor<'_>) -> BindResult<String> {
    convert::to_string(value(cur)?)
}

pub fn int(cur: &mut TreeCursor<'_>) -> BindResult<i64> {
    convert::to_int(value(cur)?)
}

pub fn uint(cur: &mut TreeCursor<'_>) -> BindResult<u64> {
    convert::to_uint(value(cur)?)
}

/// Unsigned value that must fit 32 bits (term lengths, positions).
pub fn uint32(cur: &mut TreeCursor<'_>) -> BindResult<u32> {
    u32::try_from(uint(cur)?).map_err(|_| BindError::OutOfRange("value does not fit 32 bits"))
}

pub fn double(cur: &mut TreeCursor<'_>) -> BindResult<f64> {
    convert::to_double(value(cur)?)
}

pub fn boolean(cur: &mut TreeCursor<'_>) -> BindResult<bool> {
    convert::to_bool(value(cur)?)
}

/// Consume the Close ending the current structure. The end of the tree
/// counts as closed (top-level structures carry no explicit Close).
pub fn consume_close(cur: &mut TreeCursor<'_>) -> BindResult<()> {
    match cur.tag() {
        None => Ok(()),
        Some(Tag::Close) => {
            cur.advance();
            Ok(())
        }
        _ => Err(BindError::UnexpectedToken {
            context: "structure",
            expected: "end of structure",
        }),
    }
}

/// Read a homogeneous list: either a substructure of values or a single
/// bare value, which parses as a one-element list.
pub fn atomic_list<T>(
    cur: &mut TreeCursor<'_>,
    mut read_one: impl FnMut(&mut TreeCursor<'_>) -> BindResult<T>,
) -> BindResult<Vec<T>> {
    match cur.tag() {
        Some(Tag::Open) => {
            cur.advance();
            let mut out = Vec::new();
            while cur.tag() == Some(Tag::Value) {
                out.push(read_one(cur)?);
            }
            consume_close(cur)?;
            Ok(out)
        }
        Some(Tag::Value) => Ok(vec![read_one(cur)?]),
        _ => Err(BindError::UnexpectedToken {
            context: "list",
            expected: "substructure or atomic value",
        }),
    }
}

pub fn string_list(cur: &mut TreeCursor<'_>) -> BindResult<Vec<String>> {
    atomic_list(cur, string)
}

/// Does the string value start with the given ASCII prefix character?
pub fn is_string_with_prefix(v: &AtomicValue, prefix: u8) -> bool {
    match v {
        AtomicValue::Str(s) => crate::value::codec::first_unit(s) == Some(prefix as u32),
        _ => false,
    }
}

/// The string behind a one-character prefix ("=var" -> "var").
pub fn prefix_string_value(v: &AtomicValue, prefix: u8) -> BindResult<String> {
    match v {
        AtomicValue::Str(s) if crate::value::codec::first_unit(s) == Some(prefix as u32) => {
            crate::value::codec::tail_string(s)
        }
        _ => Err(BindError::UnexpectedToken {
            context: "prefixed value",
            expected: "string with prefix character",
        }),
    }
}

// ============================================================================
// Error-context rendering
// ============================================================================

/// Number of tokens shown around a failing position.
pub const CONTEXT_WINDOW: usize = 32;

/// Tokens rendered before the failing one when space permits.
const CONTEXT_LOOKBACK: usize = 8;

/// Run a reader over a whole tree and, on failure, annotate the error with
/// a rendered window around the failing cursor position. Inner builders
/// raise bare errors; only entry points go through here, so windows never
/// stack.
pub fn read_root<T>(
    tree: &Tree,
    f: impl FnOnce(&mut TreeCursor<'_>) -> BindResult<T>,
) -> BindResult<T> {
    let mut cur = tree.cursor();
    match f(&mut cur) {
        Ok(v) => Ok(v),
        Err(e) => Err(e.at(render_context(tree, cur.position()))),
    }
}

fn render_token(tree: &Tree, pos: usize) -> String {
    let node = &tree.nodes()[pos];
    match node.tag {
        Tag::Open => "[".to_string(),
        Tag::Close => "]".to_string(),
        Tag::Name => match convert::to_string(&node.value) {
            Ok(s) => format!("{s}:"),
            Err(_) => "<obj>:".to_string(),
        },
        Tag::Value => match &node.value {
            AtomicValue::Void => "<null>".to_string(),
            AtomicValue::Str(_) => {
                let s = convert::to_string(&node.value).unwrap_or_else(|_| "<obj>".to_string());
                if s.chars().count() > 24 {
                    let head: String = s.chars().take(24).collect();
                    format!("\"{head}...\"")
                } else {
                    format!("\"{s}\"")
                }
            }
            v => convert::to_string(v).unwrap_or_else(|_| "<obj>".to_string()),
        },
    }
}

/// Render a bounded token window around `errpos`, the failing token marked
/// with `<!>`. Pure string building; never fails.
pub fn render_context(tree: &Tree, errpos: usize) -> String {
    let len = tree.len();
    let start = errpos.min(len).saturating_sub(CONTEXT_LOOKBACK);
    let end = (start + CONTEXT_WINDOW).min(len);
    let mut parts: Vec<String> = Vec::with_capacity(end - start + 2);
    if start > 0 {
        parts.push("...".to_string());
    }
    for pos in start..end {
        if pos == errpos {
            parts.push("<!>".to_string());
        }
        parts.push(render_token(tree, pos));
    }
    if errpos >= len {
        parts.push("<!>".to_string());
    }
    if end < len {
        parts.push("...".to_string());
    }
    parts.join(" ")
}
