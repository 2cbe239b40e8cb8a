//! Configuration flattening.
//!
//! Engine components take their configuration as a flat `key=value;...`
//! string. Hosts pass either that string directly or a structure of
//! name/value entries, which gets flattened here. String values containing
//! delimiter characters are quoted with whichever quote kind they do not
//! contain themselves; a value containing both kinds cannot be represented
//! and is rejected.

use super::defs::ConfigItem;
use crate::error::{BindError, BindResult};
use crate::tree::{Tag, Tree, TreeCursor};
use crate::value::{convert, AtomicValue};
use memchr::{memchr, memchr3};

fn quote_value(s: &str) -> BindResult<String> {
    let bytes = s.as_bytes();
    // bare when free of delimiters and quotes
    if memchr3(b';', b'=', b' ', bytes).is_none()
        && memchr(b'"', bytes).is_none()
        && memchr(b'\'', bytes).is_none()
    {
        return Ok(s.to_string());
    }
    if memchr(b'"', bytes).is_none() {
        return Ok(format!("\"{s}\""));
    }
    if memchr(b'\'', bytes).is_none() {
        return Ok(format!("'{s}'"));
    }
    Err(BindError::type_error(format!(
        "config value cannot be quoted, contains both quote kinds: '{s}'"
    )))
}

fn config_line(item: &ConfigItem) -> BindResult<String> {
    let rendered = match &item.value {
        AtomicValue::Str(_) => quote_value(&convert::to_string(&item.value)?)?,
        other if other.is_numeric() => convert::to_string(other)?,
        other => {
            return Err(BindError::type_error(format!(
                "config value for '{}' must be atomic, got {}",
                item.name,
                other.type_name()
            )))
        }
    };
    Ok(format!("{}={}", item.name, rendered))
}

/// Flatten a configuration structure to `key=value` text.
pub fn build_config(cur: &mut TreeCursor<'_>) -> BindResult<String> {
    let mut lines: Vec<String> = Vec::new();
    match cur.tag() {
        Some(Tag::Name) => {
            while cur.tag() == Some(Tag::Name) {
                lines.push(config_line(&ConfigItem::read(cur)?)?);
            }
            super::consume_close(cur)?;
        }
        Some(Tag::Open) => {
            while cur.tag() == Some(Tag::Open) {
                lines.push(config_line(&ConfigItem::read(cur)?)?);
            }
            super::consume_close(cur)?;
        }
        _ => {
            return Err(BindError::UnexpectedToken {
                context: "config",
                expected: "configuration entries",
            })
        }
    }
    Ok(lines.join(";"))
}

/// Configuration from a single atomic value: strings pass through
/// unchanged, anything else is rejected.
pub fn config_from_value(v: &AtomicValue) -> BindResult<String> {
    match v {
        AtomicValue::Str(_) => convert::to_string(v),
        AtomicValue::Tree(t) => read_config(t),
        other => Err(BindError::type_error(format!(
            "configuration expected as string or structure, got {}",
            other.type_name()
        ))),
    }
}

/// Entry point with error-context rendering.
pub fn read_config(tree: &Tree) -> BindResult<String> {
    super::read_root(tree, |cur| {
        let cfg = build_config(cur)?;
        if !cur.at_end() {
            return Err(BindError::UnexpectedToken {
                context: "config",
                expected: "end of input after configuration",
            });
        }
        Ok(cfg)
    })
}
