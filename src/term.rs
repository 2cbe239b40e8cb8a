//! Conversion between Elixir terms and the native value model.
//!
//! Host structures map onto event trees: maps become named fields, lists
//! positional elements, keyword tuples named fields inside lists. Records
//! built by the readers encode back as maps; binaries carry strings and
//! blobs.

use crate::boundary::{CallResult, CallValue};
use crate::reader::defs::{Term as QueryTerm, TimeStamp};
use crate::reader::document::{Document, IndexTerm, PositionRange, StructureSpan};
use crate::reader::expression::Expression;
use crate::reader::restriction::MetaDataRestriction;
use crate::reader::statistics::{encode_blob, StatisticsMessage};
use crate::tree::{Tag, Tree, TreeCursor};
use crate::value::{codec, AtomicValue, EncodedString, StringEncoding};
use rustler::types::map::MapIterator;
use rustler::types::tuple::get_tuple;
use rustler::{Encoder, Env, NewBinary, Term};

rustler::atoms! {
    ok,
    error,
    done,
    object,
    iterator,
    op,
    range,
    cardinality,
    args,
    variable,
    term_type = "type",
    term_value = "value",
    term_len = "len",
    name,
    pos,
    doctype,
    attributes,
    metadata,
    searchindex,
    forwardindex,
    structures,
    access,
    header,
    content,
    start,
    stop = "end",
    timestamp,
    unixtime,
    counter,
    blob,
}

pub fn bytes_to_binary<'a>(env: Env<'a>, bytes: &[u8]) -> Term<'a> {
    let mut bin = NewBinary::new(env, bytes.len());
    bin.as_mut_slice().copy_from_slice(bytes);
    bin.into()
}

// ============================================================================
// Host term -> Tree
// ============================================================================

fn scalar_from_term(term: Term) -> Result<AtomicValue, String> {
    if term.is_atom() {
        let text = term
            .atom_to_string()
            .map_err(|_| "unreadable atom".to_string())?;
        return Ok(match text.as_str() {
            "true" => AtomicValue::Bool(true),
            "false" => AtomicValue::Bool(false),
            "nil" | "undefined" => AtomicValue::Void,
            _ => AtomicValue::string(text),
        });
    }
    if term.is_binary() {
        let bin: rustler::Binary = term
            .decode()
            .map_err(|_| "unreadable binary".to_string())?;
        return Ok(AtomicValue::Str(EncodedString::new(
            StringEncoding::Utf8,
            bin.as_slice().to_vec(),
        )));
    }
    if term.is_number() {
        if let Ok(i) = term.decode::<i64>() {
            return Ok(AtomicValue::Int(i));
        }
        if let Ok(u) = term.decode::<u64>() {
            return Ok(AtomicValue::UInt(u));
        }
        if let Ok(d) = term.decode::<f64>() {
            return Ok(AtomicValue::Double(d));
        }
    }
    Err("unsupported scalar term".to_string())
}

fn name_from_term(term: Term) -> Result<AtomicValue, String> {
    match scalar_from_term(term)? {
        v @ (AtomicValue::Str(_) | AtomicValue::Bool(_)) => match v {
            AtomicValue::Bool(b) => Ok(AtomicValue::string(if b { "true" } else { "false" })),
            other => Ok(other),
        },
        v if v.is_numeric() => Ok(v),
        _ => Err("unsupported field name term".to_string()),
    }
}

fn push_entry(tree: &mut Tree, term: Term) -> Result<(), String> {
    if term.is_map() || term.is_list() || term.is_empty_list() {
        tree.push_open();
        push_content(tree, term)?;
        tree.push_close();
        Ok(())
    } else {
        tree.push_value(scalar_from_term(term)?);
        Ok(())
    }
}

fn push_content(tree: &mut Tree, term: Term) -> Result<(), String> {
    if term.is_map() {
        let iter: MapIterator = term.decode().map_err(|_| "unreadable map".to_string())?;
        for (key, value) in iter {
            tree.push_name(name_from_term(key)?);
            push_entry(tree, value)?;
        }
        return Ok(());
    }
    if term.is_list() || term.is_empty_list() {
        let iter: rustler::types::ListIterator =
            term.decode().map_err(|_| "unreadable list".to_string())?;
        for item in iter {
            // a {key, value} tuple inside a list is a named field
            if item.is_tuple() {
                let parts = get_tuple(item).map_err(|_| "unreadable tuple".to_string())?;
                if parts.len() == 2 {
                    tree.push_name(name_from_term(parts[0])?);
                    push_entry(tree, parts[1])?;
                    continue;
                }
                return Err("tuple fields must be {key, value} pairs".to_string());
            }
            push_entry(tree, item)?;
        }
        return Ok(());
    }
    Err("expected a map or list".to_string())
}

/// Build a tree from a host term. Maps and lists spread their content at
/// the top level; a scalar becomes a single value node.
pub fn tree_from_term(term: Term) -> Result<Tree, String> {
    let mut tree = Tree::new();
    if term.is_map() || term.is_list() || term.is_empty_list() {
        push_content(&mut tree, term)?;
    } else {
        tree.push_value(scalar_from_term(term)?);
    }
    Ok(tree)
}

// ============================================================================
// Tree / values -> host terms
// ============================================================================

pub fn atomic_to_term<'a>(env: Env<'a>, v: &AtomicValue) -> Result<Term<'a>, String> {
    match v {
        AtomicValue::Void => Ok(rustler::types::atom::nil().encode(env)),
        AtomicValue::Int(i) => Ok(i.encode(env)),
        AtomicValue::UInt(u) => Ok(u.encode(env)),
        AtomicValue::Double(d) => Ok(d.encode(env)),
        AtomicValue::Bool(b) => Ok(b.encode(env)),
        AtomicValue::Str(s) => {
            let text = codec::decode(s).map_err(|e| e.to_string())?;
            Ok(bytes_to_binary(env, text.as_bytes()))
        }
        AtomicValue::Tree(t) => tree_to_term(env, t),
        AtomicValue::Object(h) => Ok((object(), h.class_id()).encode(env)),
        AtomicValue::Iterator(_) => Ok(iterator().encode(env)),
    }
}

fn element_to_term<'a>(env: Env<'a>, cur: &mut TreeCursor<'_>) -> Result<Term<'a>, String> {
    match cur.tag() {
        Some(Tag::Open) => {
            cur.advance();
            let term = content_to_term(env, cur)?;
            match cur.tag() {
                Some(Tag::Close) => {
                    cur.advance();
                    Ok(term)
                }
                _ => Err("unbalanced structure".to_string()),
            }
        }
        Some(Tag::Value) => {
            let term = atomic_to_term(env, cur.value().expect("value node"))?;
            cur.advance();
            Ok(term)
        }
        _ => Err("unexpected token in structure".to_string()),
    }
}

fn content_to_term<'a>(env: Env<'a>, cur: &mut TreeCursor<'_>) -> Result<Term<'a>, String> {
    if cur.tag() == Some(Tag::Name) {
        let mut pairs: Vec<(Term<'a>, Term<'a>)> = Vec::new();
        while cur.tag() == Some(Tag::Name) {
            let key = atomic_to_term(env, cur.value().expect("name node"))?;
            cur.advance();
            pairs.push((key, element_to_term(env, cur)?));
        }
        Term::map_from_pairs(env, &pairs).map_err(|_| "duplicate map key".to_string())
    } else {
        let mut items: Vec<Term<'a>> = Vec::new();
        while !matches!(cur.tag(), Some(Tag::Close) | None) {
            items.push(element_to_term(env, cur)?);
        }
        let mut list = Term::list_new_empty(env);
        for item in items.into_iter().rev() {
            list = list.list_prepend(item);
        }
        Ok(list)
    }
}

/// Encode a whole tree as nested host structures.
pub fn tree_to_term<'a>(env: Env<'a>, tree: &Tree) -> Result<Term<'a>, String> {
    let mut cur = tree.cursor();
    let term = content_to_term(env, &mut cur)?;
    if !cur.at_end() {
        return Err("unbalanced structure".to_string());
    }
    Ok(term)
}

/// Flat event list of a tree, for host-side debugging.
pub fn tree_events_to_term<'a>(env: Env<'a>, tree: &Tree) -> Result<Term<'a>, String> {
    let mut list = Term::list_new_empty(env);
    for node in tree.nodes().iter().rev() {
        let tag = match node.tag {
            Tag::Open => "open",
            Tag::Close => "close",
            Tag::Name => "name",
            Tag::Value => "value",
        };
        let value = atomic_to_term(env, &node.value)?;
        list = list.list_prepend((tag, value).encode(env));
    }
    Ok(list)
}

// ============================================================================
// Records -> host terms
// ============================================================================

pub fn query_term_to_term<'a>(env: Env<'a>, t: &QueryTerm) -> Term<'a> {
    let mut pairs: Vec<(Term<'a>, Term<'a>)> = vec![(
        term_type().encode(env),
        bytes_to_binary(env, t.term_type.as_bytes()),
    )];
    if let Some(v) = &t.value {
        pairs.push((term_value().encode(env), bytes_to_binary(env, v.as_bytes())));
    }
    if let Some(l) = t.length {
        pairs.push((term_len().encode(env), l.encode(env)));
    }
    if let Some(v) = &t.variable {
        pairs.push((variable().encode(env), bytes_to_binary(env, v.as_bytes())));
    }
    Term::map_from_pairs(env, &pairs).expect("distinct keys")
}

pub fn expression_to_term<'a>(env: Env<'a>, e: &Expression) -> Term<'a> {
    match e {
        Expression::Term(t) => query_term_to_term(env, t),
        Expression::Join {
            op: join_op,
            range: join_range,
            cardinality: join_cardinality,
            args: join_args,
            variable: join_variable,
        } => {
            let mut list = Term::list_new_empty(env);
            for arg in join_args.iter().rev() {
                list = list.list_prepend(expression_to_term(env, arg));
            }
            let mut pairs: Vec<(Term<'a>, Term<'a>)> = vec![
                (op().encode(env), bytes_to_binary(env, join_op.as_bytes())),
                (range().encode(env), join_range.encode(env)),
                (cardinality().encode(env), join_cardinality.encode(env)),
                (args().encode(env), list),
            ];
            if let Some(v) = join_variable {
                pairs.push((variable().encode(env), bytes_to_binary(env, v.as_bytes())));
            }
            Term::map_from_pairs(env, &pairs).expect("distinct keys")
        }
    }
}

pub fn restriction_to_term<'a>(env: Env<'a>, r: &MetaDataRestriction) -> Result<Term<'a>, String> {
    let mut groups = Term::list_new_empty(env);
    for group in r.groups.iter().rev() {
        let mut conditions = Term::list_new_empty(env);
        for cmp in group.iter().rev() {
            let pairs: Vec<(Term<'a>, Term<'a>)> = vec![
                (op().encode(env), bytes_to_binary(env, cmp.op.as_str().as_bytes())),
                (name().encode(env), bytes_to_binary(env, cmp.name.as_bytes())),
                (term_value().encode(env), atomic_to_term(env, &cmp.value)?),
            ];
            let map = Term::map_from_pairs(env, &pairs).expect("distinct keys");
            conditions = conditions.list_prepend(map);
        }
        groups = groups.list_prepend(conditions);
    }
    Ok(groups)
}

pub fn timestamp_to_term<'a>(env: Env<'a>, ts: &TimeStamp) -> Term<'a> {
    let pairs: Vec<(Term<'a>, Term<'a>)> = vec![
        (unixtime().encode(env), ts.unixtime.encode(env)),
        (counter().encode(env), ts.counter.encode(env)),
    ];
    Term::map_from_pairs(env, &pairs).expect("distinct keys")
}

pub fn statistics_to_term<'a>(env: Env<'a>, msg: &StatisticsMessage) -> Term<'a> {
    let pairs: Vec<(Term<'a>, Term<'a>)> = vec![
        (timestamp().encode(env), timestamp_to_term(env, &msg.timestamp)),
        (blob().encode(env), bytes_to_binary(env, &msg.blob)),
    ];
    Term::map_from_pairs(env, &pairs).expect("distinct keys")
}

/// Base64 text of a message blob, the transport-safe direction.
pub fn statistics_blob_text(msg: &StatisticsMessage) -> String {
    encode_blob(&msg.blob)
}

fn index_term_to_term<'a>(env: Env<'a>, t: &IndexTerm) -> Term<'a> {
    let pairs: Vec<(Term<'a>, Term<'a>)> = vec![
        (term_type().encode(env), bytes_to_binary(env, t.term_type.as_bytes())),
        (term_value().encode(env), bytes_to_binary(env, t.value.as_bytes())),
        (pos().encode(env), t.position.encode(env)),
    ];
    Term::map_from_pairs(env, &pairs).expect("distinct keys")
}

fn range_to_term<'a>(env: Env<'a>, r: &PositionRange) -> Term<'a> {
    let pairs: Vec<(Term<'a>, Term<'a>)> = vec![
        (start().encode(env), r.start.encode(env)),
        (stop().encode(env), r.end.encode(env)),
    ];
    Term::map_from_pairs(env, &pairs).expect("distinct keys")
}

fn span_to_term<'a>(env: Env<'a>, s: &StructureSpan) -> Term<'a> {
    let pairs: Vec<(Term<'a>, Term<'a>)> = vec![
        (name().encode(env), bytes_to_binary(env, s.name.as_bytes())),
        (header().encode(env), range_to_term(env, &s.header)),
        (content().encode(env), range_to_term(env, &s.content)),
    ];
    Term::map_from_pairs(env, &pairs).expect("distinct keys")
}

fn string_pairs_to_term<'a>(env: Env<'a>, pairs: &[(String, String)]) -> Term<'a> {
    let mut list = Term::list_new_empty(env);
    for (k, v) in pairs.iter().rev() {
        let tuple = (bytes_to_binary(env, k.as_bytes()), bytes_to_binary(env, v.as_bytes()));
        list = list.list_prepend(tuple.encode(env));
    }
    list
}

pub fn document_to_term<'a>(env: Env<'a>, doc: &Document) -> Result<Term<'a>, String> {
    let mut metadata_list = Term::list_new_empty(env);
    for (k, v) in doc.metadata.iter().rev() {
        let tuple = (bytes_to_binary(env, k.as_bytes()), atomic_to_term(env, v)?);
        metadata_list = metadata_list.list_prepend(tuple.encode(env));
    }
    let mut search = Term::list_new_empty(env);
    for t in doc.search_index.iter().rev() {
        search = search.list_prepend(index_term_to_term(env, t));
    }
    let mut forward = Term::list_new_empty(env);
    for t in doc.forward_index.iter().rev() {
        forward = forward.list_prepend(index_term_to_term(env, t));
    }
    let mut spans = Term::list_new_empty(env);
    for s in doc.structures.iter().rev() {
        spans = spans.list_prepend(span_to_term(env, s));
    }
    let mut users = Term::list_new_empty(env);
    for u in doc.access.iter().rev() {
        users = users.list_prepend(bytes_to_binary(env, u.as_bytes()));
    }
    let doctype_term = match &doc.doctype {
        Some(d) => bytes_to_binary(env, d.as_bytes()),
        None => rustler::types::atom::nil().encode(env),
    };
    let pairs: Vec<(Term<'a>, Term<'a>)> = vec![
        (doctype().encode(env), doctype_term),
        (attributes().encode(env), string_pairs_to_term(env, &doc.attributes)),
        (metadata().encode(env), metadata_list),
        (searchindex().encode(env), search),
        (forwardindex().encode(env), forward),
        (structures().encode(env), spans),
        (access().encode(env), users),
    ];
    Term::map_from_pairs(env, &pairs).map_err(|_| "duplicate map key".to_string())
}

/// Encode a finished call result: `{:ok, payload}` or `{:error, message}`.
pub fn call_result_to_term<'a>(env: Env<'a>, result: &mut CallResult) -> Term<'a> {
    if result.has_error() {
        let msg = bytes_to_binary(env, result.error().as_bytes());
        return (error(), msg).encode(env);
    }
    let payload = match result.take_value() {
        None | Some(CallValue::Void) => rustler::types::atom::nil().encode(env),
        Some(CallValue::Atomic(v)) => match atomic_to_term(env, &v) {
            Ok(t) => t,
            Err(e) => return (error(), bytes_to_binary(env, e.as_bytes())).encode(env),
        },
        Some(CallValue::Tree(t)) => match tree_to_term(env, &t) {
            Ok(t) => t,
            Err(e) => return (error(), bytes_to_binary(env, e.as_bytes())).encode(env),
        },
        Some(CallValue::Object(h)) => (object(), h.class_id()).encode(env),
        Some(CallValue::Iterator(_)) => iterator().encode(env),
    };
    (ok(), payload).encode(env)
}
