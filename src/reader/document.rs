//! Document record builder.
//!
//! An insert document is a named structure with sections for attributes,
//! numeric metadata, search and forward index terms, structure spans and
//! access rights. Section content is a repeated-named-list: elements come
//! either as direct `name: value` assignments, as anonymous substructures,
//! or wrapped in the singular element name (`attribute:`, `term:`, ...),
//! which is what host-side XML front ends produce.

use super::defs::ConfigItem;
use super::name_map::NameMap;
use super::{consume_close, string, uint32};
use crate::error::{BindError, BindResult};
use crate::tree::{Tag, Tree, TreeCursor};
use crate::value::{codec, convert, AtomicValue};

#[derive(Debug, Clone, PartialEq)]
pub struct IndexTerm {
    pub term_type: String,
    pub value: String,
    pub position: u32,
}

/// Ordinal position range of a structure span, inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureSpan {
    pub name: String,
    pub header: PositionRange,
    pub content: PositionRange,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub doctype: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub metadata: Vec<(String, AtomicValue)>,
    pub search_index: Vec<IndexTerm>,
    pub forward_index: Vec<IndexTerm>,
    pub structures: Vec<StructureSpan>,
    pub access: Vec<String>,
}

static DOCUMENT_NAMES: NameMap = NameMap::new(
    "document",
    &[
        "doctype",
        "attributes",
        "metadata",
        "searchindex",
        "forwardindex",
        "structures",
        "access",
    ],
);
static TERM_NAMES: NameMap = NameMap::new("index term", &["type", "value", "pos", "len"]);
static RANGE_NAMES: NameMap = NameMap::new("position range", &["start", "end"]);
static SPAN_NAMES: NameMap = NameMap::new("structure span", &["name", "header", "content"]);

/// Is the Name at the cursor the given wrapper element?
fn is_wrapper(cur: &TreeCursor<'_>, wrapper: &str) -> bool {
    match cur.value() {
        Some(AtomicValue::Str(s)) => codec::eq_ascii(s, wrapper),
        _ => false,
    }
}

/// Read a section of name/value assignments, tolerating the singular
/// wrapper element around each entry.
fn assignment_section(
    cur: &mut TreeCursor<'_>,
    wrappers: &[&str],
) -> BindResult<Vec<(String, AtomicValue)>> {
    if cur.tag() != Some(Tag::Open) {
        return Err(BindError::UnexpectedToken {
            context: "document section",
            expected: "substructure",
        });
    }
    cur.advance();
    let mut out = Vec::new();
    loop {
        match cur.tag() {
            Some(Tag::Name) if wrappers.iter().any(|w| is_wrapper(cur, w)) => {
                cur.advance();
                let item = ConfigItem::read(cur)?;
                out.push((item.name, item.value));
            }
            Some(Tag::Name) | Some(Tag::Open) => {
                let item = ConfigItem::read(cur)?;
                out.push((item.name, item.value));
            }
            _ => break,
        }
    }
    consume_close(cur)?;
    Ok(out)
}

fn index_term(cur: &mut TreeCursor<'_>) -> BindResult<IndexTerm> {
    if cur.tag() != Some(Tag::Open) {
        return Err(BindError::UnexpectedToken {
            context: "index term",
            expected: "substructure",
        });
    }
    cur.advance();

    let mut term_type: Option<String> = None;
    let mut term_value: Option<String> = None;
    let mut position: Option<u32> = None;

    match cur.tag() {
        Some(Tag::Name) => {
            while cur.tag() == Some(Tag::Name) {
                let name = cur.value().expect("name node");
                let idx = TERM_NAMES.index(name).ok_or_else(|| TERM_NAMES.unknown(name))?;
                cur.advance();
                let dup = |field| BindError::DuplicateField {
                    record: "index term",
                    field,
                };
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
                        if position.replace(uint32(cur)?).is_some() {
                            return Err(dup("pos"));
                        }
                    }
                    // span length is an analyzer concern, tolerated and dropped
                    _ => {
                        let _ = uint32(cur)?;
                    }
                }
            }
        }
        Some(Tag::Value) => {
            term_type = Some(string(cur)?);
            term_value = Some(string(cur)?);
            position = Some(uint32(cur)?);
            if cur.tag() == Some(Tag::Value) {
                let _ = uint32(cur)?;
            }
        }
        _ => {
            return Err(BindError::UnexpectedToken {
                context: "index term",
                expected: "named fields or positional values",
            })
        }
    }
    consume_close(cur)?;

    let missing = |field| BindError::MissingField {
        record: "index term",
        field,
    };
    Ok(IndexTerm {
        term_type: term_type.ok_or_else(|| missing("type"))?,
        value: term_value.ok_or_else(|| missing("value"))?,
        position: position.ok_or_else(|| missing("pos"))?,
    })
}

fn index_term_section(cur: &mut TreeCursor<'_>) -> BindResult<Vec<IndexTerm>> {
    if cur.tag() != Some(Tag::Open) {
        return Err(BindError::UnexpectedToken {
            context: "document section",
            expected: "substructure",
        });
    }
    cur.advance();
    let mut out = Vec::new();
    loop {
        match cur.tag() {
            Some(Tag::Name) if is_wrapper(cur, "term") => {
                cur.advance();
                out.push(index_term(cur)?);
            }
            Some(Tag::Open) => out.push(index_term(cur)?),
            _ => break,
        }
    }
    consume_close(cur)?;
    Ok(out)
}

fn position_range(cur: &mut TreeCursor<'_>) -> BindResult<PositionRange> {
    if cur.tag() != Some(Tag::Open) {
        return Err(BindError::UnexpectedToken {
            context: "position range",
            expected: "substructure",
        });
    }
    cur.advance();
    let mut start: Option<u32> = None;
    let mut end: Option<u32> = None;
    match cur.tag() {
        Some(Tag::Name) => {
            while cur.tag() == Some(Tag::Name) {
                let name = cur.value().expect("name node");
                let idx = RANGE_NAMES.index(name).ok_or_else(|| RANGE_NAMES.unknown(name))?;
                cur.advance();
                let dup = |field| BindError::DuplicateField {
                    record: "position range",
                    field,
                };
                match idx {
                    0 => {
                        if start.replace(uint32(cur)?).is_some() {
                            return Err(dup("start"));
                        }
                    }
                    _ => {
                        if end.replace(uint32(cur)?).is_some() {
                            return Err(dup("end"));
                        }
                    }
                }
            }
        }
        Some(Tag::Value) => {
            start = Some(uint32(cur)?);
            end = Some(uint32(cur)?);
        }
        _ => {
            return Err(BindError::UnexpectedToken {
                context: "position range",
                expected: "named fields or positional values",
            })
        }
    }
    consume_close(cur)?;
    let missing = |field| BindError::MissingField {
        record: "position range",
        field,
    };
    Ok(PositionRange {
        start: start.ok_or_else(|| missing("start"))?,
        end: end.ok_or_else(|| missing("end"))?,
    })
}

fn structure_span(cur: &mut TreeCursor<'_>) -> BindResult<StructureSpan> {
    if cur.tag() != Some(Tag::Open) {
        return Err(BindError::UnexpectedToken {
            context: "structure span",
            expected: "substructure",
        });
    }
    cur.advance();
    let mut name: Option<String> = None;
    let mut header: Option<PositionRange> = None;
    let mut content: Option<PositionRange> = None;
    match cur.tag() {
        Some(Tag::Name) => {
            while cur.tag() == Some(Tag::Name) {
                let field = cur.value().expect("name node");
                let idx = SPAN_NAMES.index(field).ok_or_else(|| SPAN_NAMES.unknown(field))?;
                cur.advance();
                let dup = |field| BindError::DuplicateField {
                    record: "structure span",
                    field,
                };
                match idx {
                    0 => {
                        if name.replace(string(cur)?).is_some() {
                            return Err(dup("name"));
                        }
                    }
                    1 => {
                        if header.replace(position_range(cur)?).is_some() {
                            return Err(dup("header"));
                        }
                    }
                    _ => {
                        if content.replace(position_range(cur)?).is_some() {
                            return Err(dup("content"));
                        }
                    }
                }
            }
        }
        Some(Tag::Value) => {
            name = Some(string(cur)?);
            header = Some(position_range(cur)?);
            content = Some(position_range(cur)?);
        }
        _ => {
            return Err(BindError::UnexpectedToken {
                context: "structure span",
                expected: "named fields or positional values",
            })
        }
    }
    consume_close(cur)?;
    let missing = |field| BindError::MissingField {
        record: "structure span",
        field,
    };
    Ok(StructureSpan {
        name: name.ok_or_else(|| missing("name"))?,
        header: header.ok_or_else(|| missing("header"))?,
        content: content.ok_or_else(|| missing("content"))?,
    })
}

fn structure_section(cur: &mut TreeCursor<'_>) -> BindResult<Vec<StructureSpan>> {
    if cur.tag() != Some(Tag::Open) {
        return Err(BindError::UnexpectedToken {
            context: "document section",
            expected: "substructure",
        });
    }
    cur.advance();
    let mut out = Vec::new();
    loop {
        match cur.tag() {
            Some(Tag::Name) if is_wrapper(cur, "structure") => {
                cur.advance();
                out.push(structure_span(cur)?);
            }
            Some(Tag::Open) => out.push(structure_span(cur)?),
            _ => break,
        }
    }
    consume_close(cur)?;
    Ok(out)
}

fn access_section(cur: &mut TreeCursor<'_>) -> BindResult<Vec<String>> {
    match cur.tag() {
        Some(Tag::Value) => Ok(vec![string(cur)?]),
        Some(Tag::Open) => {
            cur.advance();
            let mut out = Vec::new();
            loop {
                match cur.tag() {
                    Some(Tag::Value) => out.push(string(cur)?),
                    Some(Tag::Name) if is_wrapper(cur, "user") => {
                        cur.advance();
                        out.push(string(cur)?);
                    }
                    _ => break,
                }
            }
            consume_close(cur)?;
            Ok(out)
        }
        _ => Err(BindError::UnexpectedToken {
            context: "access rights",
            expected: "user name or user list",
        }),
    }
}

/// Build a document record from the cursor.
pub fn build_document(cur: &mut TreeCursor<'_>) -> BindResult<Document> {
    let mut doc = Document::default();
    if !matches!(cur.tag(), Some(Tag::Name)) {
        return Err(BindError::UnexpectedToken {
            context: "document",
            expected: "named document sections",
        });
    }
    let mut seen = [false; 7];
    while cur.tag() == Some(Tag::Name) {
        let name = cur.value().expect("name node");
        let idx = DOCUMENT_NAMES
            .index(name)
            .ok_or_else(|| DOCUMENT_NAMES.unknown(name))?;
        if seen[idx] {
            return Err(BindError::DuplicateField {
                record: "document",
                field: DOCUMENT_NAMES.name(idx),
            });
        }
        seen[idx] = true;
        cur.advance();
        match idx {
            0 => doc.doctype = Some(string(cur)?),
            1 => {
                doc.attributes = assignment_section(cur, &["attribute", "assign"])?
                    .into_iter()
                    .map(|(n, v)| Ok((n, convert::to_string(&v)?)))
                    .collect::<BindResult<_>>()?
            }
            2 => {
                doc.metadata = assignment_section(cur, &["assign"])?
                    .into_iter()
                    .map(|(n, v)| Ok((n, convert::to_numeric(&v)?)))
                    .collect::<BindResult<_>>()?
            }
            3 => doc.search_index = index_term_section(cur)?,
            4 => doc.forward_index = index_term_section(cur)?,
            5 => doc.structures = structure_section(cur)?,
            _ => doc.access = access_section(cur)?,
        }
    }
    consume_close(cur)?;
    Ok(doc)
}

/// Entry point with error-context rendering.
pub fn read_document(tree: &Tree) -> BindResult<Document> {
    super::read_root(tree, |cur| {
        let doc = build_document(cur)?;
        if !cur.at_end() {
            return Err(BindError::UnexpectedToken {
                context: "document",
                expected: "end of input after document",
            });
        }
        Ok(doc)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Tree {
        let mut t = Tree::new();
        t.push_name_str("doctype");
        t.push_value_str("article");

        t.push_name_str("attributes");
        t.push_open();
        t.push_name_str("title");
        t.push_value_str("A Title");
        t.push_name_str("author");
        t.push_value_str("someone");
        t.push_close();

        t.push_name_str("metadata");
        t.push_open();
        t.push_name_str("weight");
        t.push_value_double(0.5);
        t.push_name_str("year");
        t.push_value_str("2007");
        t.push_close();

        t.push_name_str("searchindex");
        t.push_open();
        t.push_open();
        t.push_value_str("word");
        t.push_value_str("hello");
        t.push_value_uint(1);
        t.push_close();
        t.push_open();
        t.push_value_str("word");
        t.push_value_str("world");
        t.push_value_uint(2);
        t.push_close();
        t.push_close();

        t.push_name_str("access");
        t.push_value_str("nobody");
        t
    }

    #[test]
    fn test_read_document() {
        let doc = read_document(&sample_document()).unwrap();
        assert_eq!(doc.doctype.as_deref(), Some("article"));
        assert_eq!(doc.attributes.len(), 2);
        assert_eq!(doc.attributes[0], ("title".to_string(), "A Title".to_string()));
        assert_eq!(doc.metadata[0], ("weight".to_string(), AtomicValue::Double(0.5)));
        // numeric strings are normalized to numbers
        assert_eq!(doc.metadata[1], ("year".to_string(), AtomicValue::UInt(2007)));
        assert_eq!(doc.search_index.len(), 2);
        assert_eq!(
            doc.search_index[1],
            IndexTerm {
                term_type: "word".to_string(),
                value: "world".to_string(),
                position: 2,
            }
        );
        assert_eq!(doc.access, vec!["nobody".to_string()]);
    }

    #[test]
    fn test_wrapped_section_elements() {
        let mut t = Tree::new();
        t.push_name_str("attributes");
        t.push_open();
        t.push_name_str("attribute");
        t.push_open();
        t.push_name_str("name");
        t.push_value_str("title");
        t.push_name_str("value");
        t.push_value_str("A Title");
        t.push_close();
        t.push_close();

        t.push_name_str("forwardindex");
        t.push_open();
        t.push_name_str("term");
        t.push_open();
        t.push_name_str("type");
        t.push_value_str("orig");
        t.push_name_str("value");
        t.push_value_str("Hello");
        t.push_name_str("pos");
        t.push_value_uint(1);
        t.push_name_str("len");
        t.push_value_uint(1);
        t.push_close();
        t.push_close();

        let doc = read_document(&t).unwrap();
        assert_eq!(doc.attributes[0].0, "title");
        assert_eq!(doc.forward_index.len(), 1);
        assert_eq!(doc.forward_index[0].term_type, "orig");
    }

    #[test]
    fn test_structures_section() {
        let mut t = Tree::new();
        t.push_name_str("structures");
        t.push_open();
        t.push_open();
        t.push_value_str("chapter");
        t.push_open();
        t.push_value_uint(1);
        t.push_value_uint(2);
        t.push_close();
        t.push_open();
        t.push_name_str("start");
        t.push_value_uint(3);
        t.push_name_str("end");
        t.push_value_uint(10);
        t.push_close();
        t.push_close();
        t.push_close();

        let doc = read_document(&t).unwrap();
        assert_eq!(
            doc.structures,
            vec![StructureSpan {
                name: "chapter".to_string(),
                header: PositionRange { start: 1, end: 2 },
                content: PositionRange { start: 3, end: 10 },
            }]
        );
    }

    #[test]
    fn test_unknown_section() {
        let mut t = Tree::new();
        t.push_name_str("doctyp");
        t.push_value_str("article");
        let err = read_document(&t).unwrap_err();
        assert!(err.to_string().contains("unknown field 'doctyp' in document"));
    }

    #[test]
    fn test_duplicate_section() {
        let mut t = Tree::new();
        t.push_name_str("doctype");
        t.push_value_str("a");
        t.push_name_str("doctype");
        t.push_value_str("b");
        let err = read_document(&t).unwrap_err();
        assert!(err.to_string().contains("duplicate field 'doctype'"));
    }

    #[test]
    fn test_index_term_missing_position() {
        let mut t = Tree::new();
        t.push_name_str("searchindex");
        t.push_open();
        t.push_open();
        t.push_name_str("type");
        t.push_value_str("word");
        t.push_name_str("value");
        t.push_value_str("x");
        t.push_close();
        t.push_close();
        let err = read_document(&t).unwrap_err();
        assert!(err.to_string().contains("missing field 'pos' in index term"));
    }
}
