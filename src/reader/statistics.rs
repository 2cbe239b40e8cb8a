//! Statistics message builder.
//!
//! A statistics message pairs a timestamp with an opaque engine blob. The
//! blob crosses the boundary base64-encoded; decoding failures get their own
//! error kind so hosts can tell transport corruption from a malformed
//! structure.

use super::defs::TimeStamp;
use super::name_map::NameMap;
use super::{consume_close, value};
use crate::error::{BindError, BindResult};
use crate::tree::{Tag, Tree, TreeCursor};
use crate::value::{codec, AtomicValue};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsMessage {
    pub timestamp: TimeStamp,
    pub blob: Vec<u8>,
}

static MESSAGE_NAMES: NameMap = NameMap::new("statistics message", &["timestamp", "blob"]);

fn blob_bytes(v: &AtomicValue) -> BindResult<Vec<u8>> {
    match v {
        AtomicValue::Str(s) => {
            let text = codec::to_ascii(s)?;
            Ok(BASE64.decode(text.trim().as_bytes())?)
        }
        other => Err(BindError::type_error(format!(
            "statistics blob expected as base64 string, got {}",
            other.type_name()
        ))),
    }
}

/// Build a statistics message from the cursor; named or positional form.
pub fn build_statistics(cur: &mut TreeCursor<'_>) -> BindResult<StatisticsMessage> {
    let mut timestamp: Option<TimeStamp> = None;
    let mut blob: Option<Vec<u8>> = None;

    match cur.tag() {
        Some(Tag::Name) => {
            while cur.tag() == Some(Tag::Name) {
                let name = cur.value().expect("name node");
                let idx = MESSAGE_NAMES
                    .index(name)
                    .ok_or_else(|| MESSAGE_NAMES.unknown(name))?;
                cur.advance();
                let dup = |field| BindError::DuplicateField {
                    record: "statistics message",
                    field,
                };
                match idx {
                    0 => {
                        if timestamp.replace(TimeStamp::read(cur)?).is_some() {
                            return Err(dup("timestamp"));
                        }
                    }
                    _ => {
                        if blob.replace(blob_bytes(value(cur)?)?).is_some() {
                            return Err(dup("blob"));
                        }
                    }
                }
            }
            consume_close(cur)?;
        }
        Some(Tag::Value) | Some(Tag::Open) => {
            timestamp = Some(TimeStamp::read(cur)?);
            blob = Some(blob_bytes(value(cur)?)?);
            consume_close(cur)?;
        }
        _ => {
            return Err(BindError::UnexpectedToken {
                context: "statistics message",
                expected: "named fields or positional values",
            })
        }
    }

    let missing = |field| BindError::MissingField {
        record: "statistics message",
        field,
    };
    Ok(StatisticsMessage {
        timestamp: timestamp.ok_or_else(|| missing("timestamp"))?,
        blob: blob.ok_or_else(|| missing("blob"))?,
    })
}

/// Entry point with error-context rendering.
pub fn read_statistics(tree: &Tree) -> BindResult<StatisticsMessage> {
    super::read_root(tree, |cur| {
        let msg = build_statistics(cur)?;
        if !cur.at_end() {
            return Err(BindError::UnexpectedToken {
                context: "statistics message",
                expected: "end of input after message",
            });
        }
        Ok(msg)
    })
}

/// Base64 text of a blob for the way back to the host.
pub fn encode_blob(blob: &[u8]) -> String {
    BASE64.encode(blob)
}
