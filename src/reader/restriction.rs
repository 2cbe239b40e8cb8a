//! Metadata restriction builder.
//!
//! Restrictions are conjunctive normal form: the top-level list is an AND
//! over groups, a nested list of conditions an OR within its group. The
//! reader emits conditions in order with a group boundary flag; a fresh
//! group starts when `new_group` is true. Surface shapes accepted:
//!
//! - a bare condition (`op, name, value`, positional or named)
//! - a list of conditions, each its own AND group
//! - a list whose elements are lists of conditions (OR groups)
//! - explicitly named `union` / `condition` elements mixing both
//!
//! Consumers that compile the conditions into a program keep a running
//! count per group and emit an OR combinator only for groups that close
//! with more than one condition; see [`MetaDataRestriction::or_group_sizes`].

use super::defs::MetaDataCompare;
use super::{consume_close, name_map::NameMap};
use crate::error::{BindError, BindResult};
use crate::tree::{Tag, Tree, TreeCursor};
use crate::value::{convert, AtomicValue};

/// Receiver of restriction conditions in emission order.
pub trait RestrictionSink {
    /// `new_group` starts a fresh AND group; conditions within one group
    /// are alternatives (OR).
    fn add_condition(&mut self, condition: MetaDataCompare, new_group: bool) -> BindResult<()>;
}

static LIST_NAMES: NameMap = NameMap::new("metadata restriction", &["union", "condition"]);
static FIELD_NAMES: [&str; 3] = ["op", "name", "value"];

fn name_text(v: &AtomicValue) -> BindResult<String> {
    match v {
        AtomicValue::Str(_) => convert::to_string(v),
        _ => Err(LIST_NAMES.unknown(v)),
    }
}

/// Build a restriction from the cursor into the sink.
pub fn build_restriction(cur: &mut TreeCursor<'_>, sink: &mut dyn RestrictionSink) -> BindResult<()> {
    match cur.tag() {
        Some(Tag::Value) => {
            // bare positional condition at the top level
            let cmp = MetaDataCompare::read_fields(cur)?;
            sink.add_condition(cmp, true)
        }
        Some(Tag::Name) => {
            let text = name_text(cur.value().expect("name node"))?;
            if FIELD_NAMES.contains(&text.as_str()) {
                let cmp = MetaDataCompare::read_fields(cur)?;
                sink.add_condition(cmp, true)
            } else {
                build_named_list(cur, sink)
            }
        }
        Some(Tag::Open) => {
            let mut inner = *cur;
            inner.advance();
            match inner.tag() {
                None => Err(BindError::UnexpectedToken {
                    context: "metadata restriction",
                    expected: "structure content",
                }),
                Some(Tag::Close) => {
                    // empty restriction matches everything
                    cur.advance();
                    cur.advance();
                    Ok(())
                }
                Some(Tag::Value) => {
                    cur.advance();
                    let cmp = MetaDataCompare::read_fields(cur)?;
                    sink.add_condition(cmp, true)?;
                    consume_close(cur)
                }
                Some(Tag::Name) => {
                    let text = name_text(inner.value().expect("name node"))?;
                    cur.advance();
                    if FIELD_NAMES.contains(&text.as_str()) {
                        let cmp = MetaDataCompare::read_fields(cur)?;
                        sink.add_condition(cmp, true)?;
                        consume_close(cur)
                    } else {
                        build_named_list(cur, sink)?;
                        consume_close(cur)
                    }
                }
                Some(Tag::Open) => {
                    cur.advance();
                    while cur.tag() == Some(Tag::Open) || cur.tag() == Some(Tag::Name) {
                        build_element(cur, sink)?;
                    }
                    consume_close(cur)
                }
            }
        }
        _ => Err(BindError::UnexpectedToken {
            context: "metadata restriction",
            expected: "condition or condition list",
        }),
    }
}

/// One AND-group element of the restriction list: either a condition
/// structure or a nested OR group.
fn build_element(cur: &mut TreeCursor<'_>, sink: &mut dyn RestrictionSink) -> BindResult<()> {
    match cur.tag() {
        Some(Tag::Name) => build_named_element(cur, sink),
        Some(Tag::Open) => {
            let mut inner = *cur;
            inner.advance();
            if inner.tag() == Some(Tag::Open) {
                // OR group: list of condition structures
                cur.advance();
                let mut new_group = true;
                while cur.tag() == Some(Tag::Open) {
                    let cmp = MetaDataCompare::read(cur)?;
                    sink.add_condition(cmp, new_group)?;
                    new_group = false;
                }
                consume_close(cur)
            } else {
                let cmp = MetaDataCompare::read(cur)?;
                sink.add_condition(cmp, true)
            }
        }
        _ => Err(BindError::UnexpectedToken {
            context: "metadata restriction",
            expected: "condition or union structure",
        }),
    }
}

/// Named run of `union:` / `condition:` elements.
fn build_named_list(cur: &mut TreeCursor<'_>, sink: &mut dyn RestrictionSink) -> BindResult<()> {
    while cur.tag() == Some(Tag::Name) {
        build_named_element(cur, sink)?;
    }
    Ok(())
}

fn build_named_element(cur: &mut TreeCursor<'_>, sink: &mut dyn RestrictionSink) -> BindResult<()> {
    let name = cur.value().expect("name node");
    match LIST_NAMES.index(name) {
        Some(0) => {
            // union: OR group of condition structures
            cur.advance();
            if cur.tag() != Some(Tag::Open) {
                return Err(BindError::UnexpectedToken {
                    context: "metadata restriction",
                    expected: "union substructure",
                });
            }
            cur.advance();
            let mut new_group = true;
            while cur.tag() == Some(Tag::Open) {
                let cmp = MetaDataCompare::read(cur)?;
                sink.add_condition(cmp, new_group)?;
                new_group = false;
            }
            consume_close(cur)
        }
        Some(_) => {
            cur.advance();
            let cmp = MetaDataCompare::read(cur)?;
            sink.add_condition(cmp, true)
        }
        None => Err(LIST_NAMES.unknown(name)),
    }
}

/// Entry point with error-context rendering.
pub fn read_restriction(tree: &Tree, sink: &mut dyn RestrictionSink) -> BindResult<()> {
    super::read_root(tree, |cur| {
        build_restriction(cur, sink)?;
        if !cur.at_end() {
            return Err(BindError::UnexpectedToken {
                context: "metadata restriction",
                expected: "end of input after restriction",
            });
        }
        Ok(())
    })
}

/// A collected restriction: AND over groups, OR within a group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaDataRestriction {
    pub groups: Vec<Vec<MetaDataCompare>>,
}

impl MetaDataRestriction {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Sizes of the groups that need an OR combinator when compiled: the
    /// groups that closed with more than one condition.
    pub fn or_group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(Vec::len).filter(|n| *n > 1).collect()
    }
}

impl RestrictionSink for MetaDataRestriction {
    fn add_condition(&mut self, condition: MetaDataCompare, new_group: bool) -> BindResult<()> {
        if new_group || self.groups.is_empty() {
            self.groups.push(Vec::new());
        }
        self.groups.last_mut().expect("group").push(condition);
        Ok(())
    }
}

/// Parse a tree into a collected restriction record.
pub fn parse_restriction(tree: &Tree) -> BindResult<MetaDataRestriction> {
    let mut rt = MetaDataRestriction::default();
    read_restriction(tree, &mut rt)?;
    Ok(rt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::defs::CompareOp;

    fn push_condition(t: &mut Tree, op: &str, name: &str, value: AtomicValue) {
        t.push_open();
        t.push_value_str(op);
        t.push_value_str(name);
        t.push_value(value);
        t.push_close();
    }

    #[test]
    fn test_bare_condition() {
        let mut t = Tree::new();
        t.push_value_str("<=");
        t.push_value_str("date");
        t.push_value_str("1970-01-01");
        let r = parse_restriction(&t).unwrap();
        assert_eq!(r.groups.len(), 1);
        assert_eq!(r.groups[0].len(), 1);
        assert_eq!(r.groups[0][0].op, CompareOp::Le);
    }

    #[test]
    fn test_flat_list_is_all_and() {
        // [["<=","date",...], [">","weight",1.0]]
        let mut t = Tree::new();
        t.push_open();
        push_condition(&mut t, "<=", "date", AtomicValue::string("1970-01-01"));
        push_condition(&mut t, ">", "weight", AtomicValue::Double(1.0));
        t.push_close();
        let r = parse_restriction(&t).unwrap();
        assert_eq!(r.groups.len(), 2);
        assert!(r.groups.iter().all(|g| g.len() == 1));
        assert!(r.or_group_sizes().is_empty());
    }

    #[test]
    fn test_nested_list_is_or_group() {
        // [[["=","a",1],["=","a",2]], ["<","y","2007"]]
        let mut t = Tree::new();
        t.push_open();
        t.push_open();
        push_condition(&mut t, "=", "a", AtomicValue::Int(1));
        push_condition(&mut t, "=", "a", AtomicValue::Int(2));
        t.push_close();
        push_condition(&mut t, "<", "y", AtomicValue::string("2007"));
        t.push_close();
        let r = parse_restriction(&t).unwrap();
        assert_eq!(r.groups.len(), 2);
        assert_eq!(r.groups[0].len(), 2);
        assert_eq!(r.groups[1].len(), 1);
        assert_eq!(r.or_group_sizes(), vec![2]);
        assert_eq!(r.groups[0][0].name, "a");
        assert_eq!(r.groups[1][0].op, CompareOp::Lt);
    }

    #[test]
    fn test_named_union_and_condition() {
        let mut t = Tree::new();
        t.push_open();
        t.push_name_str("union");
        t.push_open();
        push_condition(&mut t, "=", "a", AtomicValue::Int(1));
        push_condition(&mut t, "=", "a", AtomicValue::Int(2));
        t.push_close();
        t.push_name_str("condition");
        push_condition(&mut t, ">=", "weight", AtomicValue::Double(0.5));
        t.push_close();
        let r = parse_restriction(&t).unwrap();
        assert_eq!(r.groups.len(), 2);
        assert_eq!(r.groups[0].len(), 2);
        assert_eq!(r.groups[1].len(), 1);
        assert_eq!(r.groups[1][0].op, CompareOp::Ge);
    }

    #[test]
    fn test_named_condition_fields_as_single_condition() {
        let mut t = Tree::new();
        t.push_open();
        t.push_name_str("name");
        t.push_value_str("date");
        t.push_name_str("op");
        t.push_value_str("!=");
        t.push_name_str("value");
        t.push_value_int(0);
        t.push_close();
        let r = parse_restriction(&t).unwrap();
        assert_eq!(r.groups.len(), 1);
        assert_eq!(r.groups[0][0].op, CompareOp::Ne);
    }

    #[test]
    fn test_empty_restriction() {
        let mut t = Tree::new();
        t.push_open();
        t.push_close();
        let r = parse_restriction(&t).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_unknown_element_name() {
        let mut t = Tree::new();
        t.push_open();
        t.push_name_str("disjunction");
        t.push_open();
        t.push_close();
        t.push_close();
        let err = parse_restriction(&t).unwrap_err();
        assert!(err.to_string().contains("unknown field 'disjunction'"));
    }

    #[test]
    fn test_singleton_groups_need_no_or() {
        let mut t = Tree::new();
        t.push_open();
        t.push_open();
        push_condition(&mut t, "=", "a", AtomicValue::Int(1));
        t.push_close();
        t.push_close();
        let r = parse_restriction(&t).unwrap();
        assert_eq!(r.groups.len(), 1);
        assert!(r.or_group_sizes().is_empty());
    }
}
