//! Flat event-stream representation of structured values.
//!
//! A [`Tree`] is an append-only vector of tagged nodes. Structure nesting is
//! expressed by balanced `Open`/`Close` pairs, field labels by `Name` nodes,
//! payloads by `Value` nodes. There is no pointer-linked tree; readers walk
//! the node vector with a [`TreeCursor`].

pub mod cursor;

pub use cursor::TreeCursor;

use crate::error::{BindError, BindResult};
use crate::value::AtomicValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Start of a substructure.
    Open,
    /// End of a substructure.
    Close,
    /// Label of the following Value or Open.
    Name,
    /// Atomic payload.
    Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub tag: Tag,
    pub value: AtomicValue,
}

impl Node {
    pub fn new(tag: Tag, value: AtomicValue) -> Node {
        Node { tag, value }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Tree {
        Tree::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn cursor(&self) -> TreeCursor<'_> {
        TreeCursor::new(self)
    }

    pub fn push_open(&mut self) {
        self.nodes.push(Node::new(Tag::Open, AtomicValue::Void));
    }

    pub fn push_close(&mut self) {
        self.nodes.push(Node::new(Tag::Close, AtomicValue::Void));
    }

    pub fn push_name(&mut self, value: AtomicValue) {
        self.nodes.push(Node::new(Tag::Name, value));
    }

    pub fn push_value(&mut self, value: AtomicValue) {
        self.nodes.push(Node::new(Tag::Value, value));
    }

    pub fn push_name_str(&mut self, name: &str) {
        self.push_name(AtomicValue::string(name));
    }

    pub fn push_name_uint(&mut self, name: u64) {
        self.push_name(AtomicValue::UInt(name));
    }

    pub fn push_value_str(&mut self, value: &str) {
        self.push_value(AtomicValue::string(value));
    }

    pub fn push_value_int(&mut self, value: i64) {
        self.push_value(AtomicValue::Int(value));
    }

    pub fn push_value_uint(&mut self, value: u64) {
        self.push_value(AtomicValue::UInt(value));
    }

    pub fn push_value_double(&mut self, value: f64) {
        self.push_value(AtomicValue::Double(value));
    }

    pub fn push_value_bool(&mut self, value: bool) {
        self.push_value(AtomicValue::Bool(value));
    }

    pub fn push_value_void(&mut self) {
        self.push_value(AtomicValue::Void);
    }

    /// Append all nodes of `other`.
    pub fn append(&mut self, other: &Tree) {
        self.nodes.extend_from_slice(&other.nodes);
    }

    /// Whether the top level starts with a labeled field. An empty tree
    /// counts as labeled (nothing contradicts it).
    pub fn is_labeled(&self) -> bool {
        match self.nodes.first() {
            None => true,
            Some(n) => n.tag == Tag::Name,
        }
    }

    /// Check that every Open has a matching Close at the top level.
    pub fn is_balanced(&self) -> bool {
        let mut depth = 0i64;
        for n in &self.nodes {
            match n.tag {
                Tag::Open => depth += 1,
                Tag::Close => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            }
        }
        depth == 0
    }

    /// Rewrite the positional elements from `start` to the end of the tree
    /// as named fields with an incrementing numeric key starting at
    /// `first_key`. A top-level Value becomes Name+Value, a top-level
    /// Open..Close subtree gets a Name in front. Fails (leaving the tree
    /// untouched) when the range already contains names or is unbalanced.
    pub fn convert_to_named(&mut self, start: usize, first_key: u64) -> BindResult<()> {
        if start > self.nodes.len() {
            return Err(BindError::UnexpectedToken {
                context: "structure conversion",
                expected: "valid start position",
            });
        }
        let mut rewritten: Vec<Node> = Vec::with_capacity((self.nodes.len() - start) * 2);
        let mut key = first_key;
        let mut i = start;
        while i < self.nodes.len() {
            match self.nodes[i].tag {
                Tag::Value => {
                    rewritten.push(Node::new(Tag::Name, AtomicValue::UInt(key)));
                    rewritten.push(self.nodes[i].clone());
                    key += 1;
                    i += 1;
                }
                Tag::Open => {
                    let end = match subtree_end(&self.nodes, i) {
                        Some(e) => e,
                        None => {
                            return Err(BindError::UnexpectedToken {
                                context: "structure conversion",
                                expected: "balanced substructure",
                            })
                        }
                    };
                    rewritten.push(Node::new(Tag::Name, AtomicValue::UInt(key)));
                    rewritten.extend_from_slice(&self.nodes[i..end]);
                    key += 1;
                    i = end;
                }
                Tag::Name | Tag::Close => {
                    return Err(BindError::UnexpectedToken {
                        context: "structure conversion",
                        expected: "positional element",
                    })
                }
            }
        }
        self.nodes.truncate(start);
        self.nodes.extend(rewritten);
        Ok(())
    }
}

/// Index just past the Close matching the Open at `open_pos`.
pub(crate) fn subtree_end(nodes: &[Node], open_pos: usize) -> Option<usize> {
    debug_assert_eq!(nodes[open_pos].tag, Tag::Open);
    let mut depth = 0usize;
    for (i, n) in nodes.iter().enumerate().skip(open_pos) {
        match n.tag {
            Tag::Open => depth += 1,
            Tag::Close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
