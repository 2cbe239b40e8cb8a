//! Cursor over a tree's node vector.
//!
//! The cursor is a borrowed slice plus a position, `Copy` by design: readers
//! snapshot it freely to look ahead (shape sniffing) and fall back to the
//! snapshot without rewind bookkeeping.

use super::{subtree_end, Node, Tag, Tree};
use crate::error::{BindError, BindResult};
use crate::value::AtomicValue;

#[derive(Debug, Clone, Copy)]
pub struct TreeCursor<'a> {
    nodes: &'a [Node],
    pos: usize,
}

impl<'a> TreeCursor<'a> {
    pub fn new(tree: &'a Tree) -> TreeCursor<'a> {
        TreeCursor {
            nodes: tree.nodes(),
            pos: 0,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.nodes.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn node(&self) -> Option<&'a Node> {
        self.nodes.get(self.pos)
    }

    pub fn tag(&self) -> Option<Tag> {
        self.node().map(|n| n.tag)
    }

    pub fn value(&self) -> Option<&'a AtomicValue> {
        self.node().map(|n| &n.value)
    }

    /// Tag of the node after the current one, without moving.
    pub fn follow_tag(&self) -> Option<Tag> {
        self.nodes.get(self.pos + 1).map(|n| n.tag)
    }

    /// Step over the current node. Saturates at the end.
    pub fn advance(&mut self) {
        if self.pos < self.nodes.len() {
            self.pos += 1;
        }
    }

    /// Skip the current element: one node for Name/Value, the whole balanced
    /// subtree for Open. Skipping at the end or over an unmatched Close is a
    /// contract violation and reported as an error.
    pub fn skip(&mut self) -> BindResult<()> {
        match self.tag() {
            None => Err(BindError::UnexpectedToken {
                context: "cursor skip",
                expected: "a node before the end",
            }),
            Some(Tag::Close) => Err(BindError::UnexpectedToken {
                context: "cursor skip",
                expected: "an element, not a structure end",
            }),
            Some(Tag::Open) => match subtree_end(self.nodes, self.pos) {
                Some(end) => {
                    self.pos = end;
                    Ok(())
                }
                None => Err(BindError::UnexpectedToken {
                    context: "cursor skip",
                    expected: "balanced substructure",
                }),
            },
            Some(Tag::Name) | Some(Tag::Value) => {
                self.pos += 1;
                Ok(())
            }
        }
    }
}

impl PartialEq for TreeCursor<'_> {
    /// Position equality on the same underlying tree.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.nodes.as_ptr(), other.nodes.as_ptr()) && self.pos == other.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        // "a" [ "b" [ 1 ] ] "c"
        let mut t = Tree::new();
        t.push_value_str("a");
        t.push_open();
        t.push_value_str("b");
        t.push_open();
        t.push_value_int(1);
        t.push_close();
        t.push_close();
        t.push_value_str("c");
        t
    }

    #[test]
    fn test_skip_subtree() {
        let t = sample();
        let mut c = t.cursor();
        c.skip().unwrap(); // "a"
        assert_eq!(c.tag(), Some(Tag::Open));
        c.skip().unwrap(); // whole [ "b" [ 1 ] ]
        assert_eq!(c.value(), Some(&AtomicValue::string("c")));
        c.skip().unwrap();
        assert!(c.at_end());
        assert!(c.skip().is_err());
    }

    #[test]
    fn test_copy_snapshot_is_independent() {
        let t = sample();
        let mut c = t.cursor();
        let snap = c;
        c.skip().unwrap();
        c.skip().unwrap();
        assert_eq!(snap.position(), 0);
        assert_eq!(snap.value(), Some(&AtomicValue::string("a")));
        assert_ne!(snap, c);
    }

    #[test]
    fn test_skip_unmatched_close_is_error() {
        let mut t = Tree::new();
        t.push_open();
        t.push_value_int(1);
        t.push_close();
        let mut c = t.cursor();
        c.advance(); // inside the structure
        c.skip().unwrap(); // the value
        assert_eq!(c.tag(), Some(Tag::Close));
        assert!(c.skip().is_err());
    }

    #[test]
    fn test_follow_tag() {
        let t = sample();
        let c = t.cursor();
        assert_eq!(c.follow_tag(), Some(Tag::Open));
    }
}
