//! Small record builders shared by the larger readers.
//!
//! Every record accepts both surface shapes: named fields (Name/Value pairs
//! in any order, duplicates rejected) and positional values in the
//! vocabulary order. Mandatory fields are tracked with presence flags and
//! reported by name when missing.

use super::name_map::NameMap;
use super::{consume_close, int, string, uint, uint32, value};
use crate::error::{BindError, BindResult};
use crate::tree::{Tag, TreeCursor};
use crate::value::{codec, convert, AtomicValue};

/// A query term: type, optional value and span length, optional variable
/// assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub term_type: String,
    pub value: Option<String>,
    pub length: Option<u32>,
    pub variable: Option<String>,
}

static TERM_NAMES: NameMap = NameMap::new("term", &["type", "value", "variable", "len"]);

impl Term {
    /// Read a term from the content of its structure; consumes the ending
    /// Close. Positional form accepts an optional leading `=variable`
    /// value before type, value and length.
    pub fn read(cur: &mut TreeCursor<'_>) -> BindResult<Term> {
        let mut term_type: Option<String> = None;
        let mut term_value: Option<String> = None;
        let mut length: Option<u32> = None;
        let mut variable: Option<String> = None;

        match cur.tag() {
            Some(Tag::Name) => {
                while cur.tag() == Some(Tag::Name) {
                    let name = cur.value().expect("name node");
                    let idx = TERM_NAMES.index(name).ok_or_else(|| TERM_NAMES.unknown(name))?;
                    cur.advance();
                    let dup = |field| BindError::DuplicateField { record: "term", field };
                    match idx {
                        0 => {
                            if term_type.replace(string(cur)?).is_some() {
                                return Err(dup("type"));
                            }
                        }
                        1 => {
                            if term_value.replace(string(cur)?).is_some() {
                                return Err(dup("value"));
                            }
                        }
                        2 => {
                            if variable.replace(string(cur)?).is_some() {
                                return Err(dup("variable"));
                            }
                        }
                        _ => {
                            if length.replace(uint32(cur)?).is_some() {
                                return Err(dup("len"));
                            }
                        }
                    }
                }
                consume_close(cur)?;
            }
            Some(Tag::Value) => {
                let term = Self::read_bare(cur)?;
                consume_close(cur)?;
                return Ok(term);
            }
            _ => {
                return Err(BindError::UnexpectedToken {
                    context: "term structure",
                    expected: "named fields or positional values",
                })
            }
        }

        if term_value.is_none() && length.is_some() {
            return Err(BindError::type_error(
                "term length given without a term value",
            ));
        }
        let term_type = term_type.ok_or(BindError::MissingField {
            record: "term",
            field: "type",
        })?;
        Ok(Term {
            term_type,
            value: term_value,
            length,
            variable,
        })
    }

    /// Positional term without a surrounding structure: reads leading
    /// values and stops at the first non-value, leaving any Close for the
    /// caller. Used for bare term arguments inside larger structures.
    pub fn read_bare(cur: &mut TreeCursor<'_>) -> BindResult<Term> {
        let mut variable: Option<String> = None;
        if cur.tag() == Some(Tag::Value)
            && super::is_string_with_prefix(cur.value().expect("value node"), b'=')
        {
            variable = Some(super::prefix_string_value(cur.value().expect("value node"), b'=')?);
            cur.advance();
        }
        if cur.tag() != Some(Tag::Value) {
            return Err(BindError::UnexpectedToken {
                context: "term structure",
                expected: "term type value",
            });
        }
        let term_type = string(cur)?;
        let mut term_value: Option<String> = None;
        let mut length: Option<u32> = None;
        if cur.tag() == Some(Tag::Value) {
            term_value = Some(string(cur)?);
            if cur.tag() == Some(Tag::Value) {
                length = Some(uint32(cur)?);
            }
        }
        Ok(Term {
            term_type,
            value: term_value,
            length,
            variable,
        })
    }
}

/// Comparison operator of a metadata condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
        }
    }

    pub fn from_token(token: &str) -> Option<CompareOp> {
        match token {
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "=" | "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            _ => None,
        }
    }

    pub fn from_value(v: &AtomicValue) -> BindResult<CompareOp> {
        let token = match v {
            AtomicValue::Str(s) => codec::to_ascii(s)?,
            other => {
                return Err(BindError::type_error(format!(
                    "metadata compare operator expected, got {}",
                    other.type_name()
                )))
            }
        };
        CompareOp::from_token(token.trim()).ok_or_else(|| {
            BindError::type_error(format!("unknown metadata compare operator '{token}'"))
        })
    }
}

/// One metadata condition: `name op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaDataCompare {
    pub op: CompareOp,
    pub name: String,
    pub value: AtomicValue,
}

static COMPARE_NAMES: NameMap = NameMap::new("metadata condition", &["op", "name", "value"]);

impl MetaDataCompare {
    /// Read a condition wrapped in its own structure.
    pub fn read(cur: &mut TreeCursor<'_>) -> BindResult<MetaDataCompare> {
        if cur.tag() != Some(Tag::Open) {
            return Err(BindError::UnexpectedToken {
                context: "metadata condition",
                expected: "substructure",
            });
        }
        cur.advance();
        let cmp = Self::read_fields(cur)?;
        consume_close(cur)?;
        Ok(cmp)
    }

    /// Read the condition fields without the surrounding Open/Close.
    pub fn read_fields(cur: &mut TreeCursor<'_>) -> BindResult<MetaDataCompare> {
        let mut op: Option<CompareOp> = None;
        let mut name: Option<String> = None;
        let mut cmp_value: Option<AtomicValue> = None;

        match cur.tag() {
            Some(Tag::Name) => {
                while cur.tag() == Some(Tag::Name) {
                    let field = cur.value().expect("name node");
                    let idx = COMPARE_NAMES
                        .index(field)
                        .ok_or_else(|| COMPARE_NAMES.unknown(field))?;
                    cur.advance();
                    let dup = |field| BindError::DuplicateField {
                        record: "metadata condition",
                        field,
                    };
                    match idx {
                        0 => {
                            if op.replace(CompareOp::from_value(value(cur)?)?).is_some() {
                                return Err(dup("op"));
                            }
                        }
                        1 => {
                            if name.replace(string(cur)?).is_some() {
                                return Err(dup("name"));
                            }
                        }
                        _ => {
                            if cmp_value.replace(value(cur)?.clone()).is_some() {
                                return Err(dup("value"));
                            }
                        }
                    }
                }
            }
            Some(Tag::Value) => {
                op = Some(CompareOp::from_value(value(cur)?)?);
                name = Some(string(cur)?);
                cmp_value = Some(value(cur)?.clone());
            }
            _ => {
                return Err(BindError::UnexpectedToken {
                    context: "metadata condition",
                    expected: "named fields or positional values",
                })
            }
        }

        let missing = |field| BindError::MissingField {
            record: "metadata condition",
            field,
        };
        Ok(MetaDataCompare {
            op: op.ok_or_else(|| missing("op"))?,
            name: name.ok_or_else(|| missing("name"))?,
            value: cmp_value.ok_or_else(|| missing("value"))?,
        })
    }
}

/// Point in time of a statistics message: seconds plus a disambiguating
/// counter for messages in the same second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeStamp {
    pub unixtime: i64,
    pub counter: u64,
}

static TIMESTAMP_NAMES: NameMap = NameMap::new("timestamp", &["unixtime", "counter"]);

impl TimeStamp {
    /// Accepts a bare atomic (unixtime), a positional pair, or named
    /// `{unixtime, counter}` fields.
    pub fn read(cur: &mut TreeCursor<'_>) -> BindResult<TimeStamp> {
        match cur.tag() {
            Some(Tag::Value) => Ok(TimeStamp {
                unixtime: int(cur)?,
                counter: 0,
            }),
            Some(Tag::Open) => {
                cur.advance();
                let ts = Self::read_fields(cur)?;
                consume_close(cur)?;
                Ok(ts)
            }
            _ => Err(BindError::UnexpectedToken {
                context: "timestamp",
                expected: "atomic value or substructure",
            }),
        }
    }

    fn read_fields(cur: &mut TreeCursor<'_>) -> BindResult<TimeStamp> {
        let mut unixtime: Option<i64> = None;
        let mut counter: Option<u64> = None;
        match cur.tag() {
            Some(Tag::Name) => {
                while cur.tag() == Some(Tag::Name) {
                    let field = cur.value().expect("name node");
                    let idx = TIMESTAMP_NAMES
                        .index(field)
                        .ok_or_else(|| TIMESTAMP_NAMES.unknown(field))?;
                    cur.advance();
                    let dup = |field| BindError::DuplicateField {
                        record: "timestamp",
                        field,
                    };
                    match idx {
                        0 => {
                            if unixtime.replace(int(cur)?).is_some() {
                                return Err(dup("unixtime"));
                            }
                        }
                        _ => {
                            if counter.replace(uint(cur)?).is_some() {
                                return Err(dup("counter"));
                            }
                        }
                    }
                }
            }
            Some(Tag::Value) => {
                unixtime = Some(int(cur)?);
                if cur.tag() == Some(Tag::Value) {
                    counter = Some(uint(cur)?);
                }
            }
            _ => {
                return Err(BindError::UnexpectedToken {
                    context: "timestamp",
                    expected: "named fields or positional values",
                })
            }
        }
        Ok(TimeStamp {
            unixtime: unixtime.ok_or(BindError::MissingField {
                record: "timestamp",
                field: "unixtime",
            })?,
            counter: counter.unwrap_or(0),
        })
    }
}

/// One configuration entry, flattened later by the config reader.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigItem {
    pub name: String,
    pub value: AtomicValue,
}

static CONFIG_NAMES: NameMap = NameMap::new("config", &["name", "value"]);

impl ConfigItem {
    /// Accepts a labeled entry (`name: value`) at the current level, or a
    /// substructure with positional or named name/value fields.
    pub fn read(cur: &mut TreeCursor<'_>) -> BindResult<ConfigItem> {
        match cur.tag() {
            Some(Tag::Name) => {
                let name = convert::to_string(cur.value().expect("name node"))?;
                cur.advance();
                Ok(ConfigItem {
                    name,
                    value: value(cur)?.clone(),
                })
            }
            Some(Tag::Open) => {
                cur.advance();
                let item = Self::read_fields(cur)?;
                consume_close(cur)?;
                Ok(item)
            }
            _ => Err(BindError::UnexpectedToken {
                context: "config",
                expected: "labeled entry or substructure",
            }),
        }
    }

    fn read_fields(cur: &mut TreeCursor<'_>) -> BindResult<ConfigItem> {
        let mut name: Option<String> = None;
        let mut item_value: Option<AtomicValue> = None;
        match cur.tag() {
            Some(Tag::Name) => {
                while cur.tag() == Some(Tag::Name) {
                    let field = cur.value().expect("name node");
                    let idx = CONFIG_NAMES
                        .index(field)
                        .ok_or_else(|| CONFIG_NAMES.unknown(field))?;
                    cur.advance();
                    let dup = |field| BindError::DuplicateField {
                        record: "config",
                        field,
                    };
                    match idx {
                        0 => {
                            if name.replace(string(cur)?).is_some() {
                                return Err(dup("name"));
                            }
                        }
                        _ => {
                            if item_value.replace(value(cur)?.clone()).is_some() {
                                return Err(dup("value"));
                            }
                        }
                    }
                }
            }
            Some(Tag::Value) => {
                name = Some(string(cur)?);
                item_value = Some(value(cur)?.clone());
            }
            _ => {
                return Err(BindError::UnexpectedToken {
                    context: "config",
                    expected: "named fields or positional values",
                })
            }
        }
        Ok(ConfigItem {
            name: name.ok_or(BindError::MissingField {
                record: "config",
                field: "name",
            })?,
            value: item_value.ok_or(BindError::MissingField {
                record: "config",
                field: "value",
            })?,
        })
    }
}
