//! Query expression builder.
//!
//! Expression structures arrive in several surface shapes and the reader
//! commits to one by sniffing a cursor snapshot: named fields are classified
//! by vocabulary (term fields vs. join fields, with `variable` neutral),
//! positional content by counting leading values before the structure ends.
//! A single leading value that names a known operator is reinterpreted as a
//! zero-argument join; operator knowledge comes from the sink, the reader
//! itself knows no engine vocabulary.

use super::defs::Term;
use super::name_map::NameMap;
use super::{consume_close, int, string, uint32};
use crate::error::{BindError, BindResult};
use crate::tree::{Tag, Tree, TreeCursor};
use crate::value::{convert, AtomicValue};

/// Receiver of expression build events, stack-ordered: arguments are pushed
/// before the join that consumes them.
pub trait ExpressionSink {
    fn push_term(&mut self, term: Term) -> BindResult<()>;

    /// Combine the `argc` most recently pushed subexpressions.
    fn push_join(&mut self, op: &str, argc: usize, range: i32, cardinality: u32) -> BindResult<()>;

    /// Attach a variable assignment to the most recently pushed node.
    fn attach_variable(&mut self, name: &str) -> BindResult<()>;

    /// Whether `name` is a known join operator. Drives the zero-argument
    /// join reinterpretation of single-keyword structures.
    fn is_operator(&self, name: &str) -> bool;
}

static JOIN_NAMES: NameMap =
    NameMap::new("expression", &["op", "range", "cardinality", "arg", "variable"]);
static TERM_FIELDS: [&str; 3] = ["type", "value", "len"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Empty,
    Term,
    Join,
}

/// Classify a run of named fields as term or join without moving the
/// caller's cursor. Works both inside a structure and at the tree root.
fn classify_names(snapshot: TreeCursor<'_>) -> BindResult<Shape> {
    let mut cur = snapshot;
    while cur.tag() == Some(Tag::Name) {
        let name = cur.value().expect("name node");
        let text = match name {
            AtomicValue::Str(_) => convert::to_string(name)?,
            _ => return Err(JOIN_NAMES.unknown(name)),
        };
        if TERM_FIELDS.contains(&text.as_str()) {
            return Ok(Shape::Term);
        }
        match text.as_str() {
            "op" | "range" | "cardinality" | "arg" => return Ok(Shape::Join),
            // neutral: both shapes carry variables, keep looking
            "variable" => {
                cur.advance();
                cur.skip()?;
            }
            _ => return Err(JOIN_NAMES.unknown(name)),
        }
    }
    Err(BindError::UnexpectedToken {
        context: "expression",
        expected: "a field deciding between term and join",
    })
}

/// Classify the structure under the Open at the cursor without moving it.
fn sniff(snapshot: TreeCursor<'_>, sink: &dyn ExpressionSink) -> BindResult<Shape> {
    let mut cur = snapshot;
    debug_assert_eq!(cur.tag(), Some(Tag::Open));
    cur.advance();

    if cur.tag() == Some(Tag::Name) {
        return classify_names(cur);
    }

    // positional: skip variable assignments, then count leading values
    while cur.tag() == Some(Tag::Value)
        && super::is_string_with_prefix(cur.value().expect("value node"), b'=')
    {
        cur.advance();
    }
    let mut first_value: Option<&AtomicValue> = None;
    let mut count = 0usize;
    while cur.tag() == Some(Tag::Value) && count < 3 {
        if count == 0 {
            first_value = cur.value();
        }
        count += 1;
        cur.advance();
    }
    match cur.tag() {
        Some(Tag::Close) | None if count == 0 => Ok(Shape::Empty),
        Some(Tag::Close) | None => {
            if count == 1 {
                if let Some(AtomicValue::Str(_)) = first_value {
                    let keyword = convert::to_string(first_value.expect("first value"))?;
                    if sink.is_operator(&keyword) {
                        return Ok(Shape::Join);
                    }
                }
            }
            Ok(Shape::Term)
        }
        _ => Ok(Shape::Join),
    }
}

/// Build one expression from the cursor into the sink.
pub fn build_expression(cur: &mut TreeCursor<'_>, sink: &mut dyn ExpressionSink) -> BindResult<()> {
    match cur.tag() {
        Some(Tag::Open) => match sniff(*cur, sink)? {
            Shape::Empty => Err(BindError::UnexpectedToken {
                context: "expression",
                expected: "a non-empty structure",
            }),
            Shape::Term => {
                cur.advance();
                let term = Term::read(cur)?;
                let variable = term.variable.clone();
                sink.push_term(term)?;
                if let Some(v) = variable {
                    sink.attach_variable(&v)?;
                }
                Ok(())
            }
            Shape::Join => build_join(cur, sink),
        },
        // a bare value run is a term without its own structure; named
        // fields can appear unwrapped at the top level
        Some(Tag::Value) => {
            let term = Term::read_bare(cur)?;
            let variable = term.variable.clone();
            sink.push_term(term)?;
            if let Some(v) = variable {
                sink.attach_variable(&v)?;
            }
            Ok(())
        }
        Some(Tag::Name) => match classify_names(*cur)? {
            Shape::Join => build_named_join(cur, sink),
            _ => {
                let term = Term::read(cur)?;
                let variable = term.variable.clone();
                sink.push_term(term)?;
                if let Some(v) = variable {
                    sink.attach_variable(&v)?;
                }
                Ok(())
            }
        },
        _ => Err(BindError::UnexpectedToken {
            context: "expression",
            expected: "structure or value",
        }),
    }
}

/// Named join fields at the current level; consumes the ending Close (the
/// end of the tree counts for root-level joins without a wrapper).
fn build_named_join(cur: &mut TreeCursor<'_>, sink: &mut dyn ExpressionSink) -> BindResult<()> {
    let mut op: Option<String> = None;
    let mut range = 0i32;
    let mut cardinality = 0u32;
    let mut variable: Option<String> = None;
    let mut argc = 0usize;

    while cur.tag() == Some(Tag::Name) {
        let name = cur.value().expect("name node");
        let idx = JOIN_NAMES.index(name).ok_or_else(|| JOIN_NAMES.unknown(name))?;
        cur.advance();
        let dup = |field| BindError::DuplicateField {
            record: "expression",
            field,
        };
        match idx {
            0 => {
                if op.replace(string(cur)?).is_some() {
                    return Err(dup("op"));
                }
            }
            1 => {
                range = i32::try_from(int(cur)?)
                    .map_err(|_| BindError::OutOfRange("expression range does not fit 32 bits"))?;
            }
            2 => cardinality = uint32(cur)?,
            3 => {
                build_expression(cur, sink)?;
                argc += 1;
            }
            _ => {
                if variable.replace(string(cur)?).is_some() {
                    return Err(dup("variable"));
                }
            }
        }
    }
    consume_close(cur)?;

    let op = op.ok_or(BindError::MissingField {
        record: "expression",
        field: "op",
    })?;
    sink.push_join(&op, argc, range, cardinality)?;
    if let Some(v) = variable {
        sink.attach_variable(&v)?;
    }
    Ok(())
}

fn build_join(cur: &mut TreeCursor<'_>, sink: &mut dyn ExpressionSink) -> BindResult<()> {
    debug_assert_eq!(cur.tag(), Some(Tag::Open));
    cur.advance();

    if cur.tag() == Some(Tag::Name) {
        return build_named_join(cur, sink);
    }

    let mut variable: Option<String> = None;
    if cur.tag() == Some(Tag::Value)
        && super::is_string_with_prefix(cur.value().expect("value node"), b'=')
    {
        variable = Some(super::prefix_string_value(cur.value().expect("value node"), b'=')?);
        cur.advance();
    }
    if cur.tag() != Some(Tag::Value) {
        return Err(BindError::UnexpectedToken {
            context: "expression",
            expected: "join operator name",
        });
    }
    let op = string(cur)?;
    let mut range = 0i32;
    let mut cardinality = 0u32;
    // optional numeric range and cardinality before the arguments
    if cur.tag() == Some(Tag::Value) && is_numeric_token(cur.value().expect("value node")) {
        range = i32::try_from(int(cur)?)
            .map_err(|_| BindError::OutOfRange("expression range does not fit 32 bits"))?;
        if cur.tag() == Some(Tag::Value) && is_numeric_token(cur.value().expect("value node")) {
            cardinality = uint32(cur)?;
        }
    }
    let mut argc = 0usize;
    while !matches!(cur.tag(), Some(Tag::Close) | None) {
        build_expression(cur, sink)?;
        argc += 1;
    }
    consume_close(cur)?;

    sink.push_join(&op, argc, range, cardinality)?;
    if let Some(v) = variable {
        sink.attach_variable(&v)?;
    }
    Ok(())
}

fn is_numeric_token(v: &AtomicValue) -> bool {
    v.is_numeric() || matches!(v, AtomicValue::Str(_) if convert::to_numeric(v).is_ok())
}

/// Entry point with error-context rendering.
pub fn read_expression(tree: &Tree, sink: &mut dyn ExpressionSink) -> BindResult<()> {
    super::read_root(tree, |cur| {
        build_expression(cur, sink)?;
        if !cur.at_end() {
            return Err(BindError::UnexpectedToken {
                context: "expression",
                expected: "end of input after expression",
            });
        }
        Ok(())
    })
}

// ============================================================================
// Record-producing sink
// ============================================================================

/// A built expression tree, the default sink output.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Term(Term),
    Join {
        op: String,
        range: i32,
        cardinality: u32,
        args: Vec<Expression>,
        variable: Option<String>,
    },
}

/// Sink assembling [`Expression`] values on a stack.
pub struct ExpressionTree {
    stack: Vec<Expression>,
    operators: Vec<String>,
}

impl ExpressionTree {
    pub fn new<S: AsRef<str>>(operators: &[S]) -> ExpressionTree {
        ExpressionTree {
            stack: Vec::new(),
            operators: operators.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn finish(mut self) -> BindResult<Expression> {
        let root = self.stack.pop().ok_or(BindError::UnexpectedToken {
            context: "expression",
            expected: "a built expression",
        })?;
        if !self.stack.is_empty() {
            return Err(BindError::UnexpectedToken {
                context: "expression",
                expected: "a single root expression",
            });
        }
        Ok(root)
    }
}

impl ExpressionSink for ExpressionTree {
    fn push_term(&mut self, term: Term) -> BindResult<()> {
        self.stack.push(Expression::Term(term));
        Ok(())
    }

    fn push_join(&mut self, op: &str, argc: usize, range: i32, cardinality: u32) -> BindResult<()> {
        if self.stack.len() < argc {
            return Err(BindError::UnexpectedToken {
                context: "expression",
                expected: "enough arguments for the join",
            });
        }
        let args = self.stack.split_off(self.stack.len() - argc);
        self.stack.push(Expression::Join {
            op: op.to_string(),
            range,
            cardinality,
            args,
            variable: None,
        });
        Ok(())
    }

    fn attach_variable(&mut self, name: &str) -> BindResult<()> {
        match self.stack.last_mut() {
            Some(Expression::Join { variable, .. }) => {
                *variable = Some(name.to_string());
                Ok(())
            }
            Some(Expression::Term(term)) => {
                term.variable = Some(name.to_string());
                Ok(())
            }
            None => Err(BindError::UnexpectedToken {
                context: "expression",
                expected: "an expression to attach the variable to",
            }),
        }
    }

    fn is_operator(&self, name: &str) -> bool {
        self.operators.iter().any(|o| o == name)
    }
}

/// Parse a tree into an [`Expression`] record using the given operator
/// vocabulary.
pub fn parse_expression<S: AsRef<str>>(tree: &Tree, operators: &[S]) -> BindResult<Expression> {
    let mut sink = ExpressionTree::new(operators);
    read_expression(tree, &mut sink)?;
    sink.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPS: &[&str] = &["sequence", "within", "union", "intersect"];

    fn term(t: &str, v: &str) -> Expression {
        Expression::Term(Term {
            term_type: t.to_string(),
            value: Some(v.to_string()),
            length: None,
            variable: None,
        })
    }

    fn push_term_struct(tree: &mut Tree, t: &str, v: &str) {
        tree.push_open();
        tree.push_value_str(t);
        tree.push_value_str(v);
        tree.push_close();
    }

    #[test]
    fn test_positional_term() {
        let mut t = Tree::new();
        push_term_struct(&mut t, "word", "hello");
        assert_eq!(parse_expression(&t, OPS).unwrap(), term("word", "hello"));
    }

    #[test]
    fn test_bare_value_is_type_only_term() {
        let mut t = Tree::new();
        t.push_value_str("sent");
        let e = parse_expression(&t, OPS).unwrap();
        assert_eq!(
            e,
            Expression::Term(Term {
                term_type: "sent".to_string(),
                value: None,
                length: None,
                variable: None,
            })
        );
    }

    #[test]
    fn test_positional_join_with_range_and_cardinality() {
        // ["within", 5, 2, ["word", "a"], ["word", "b"], ["word", "c"]]
        let mut t = Tree::new();
        t.push_open();
        t.push_value_str("within");
        t.push_value_int(5);
        t.push_value_uint(2);
        push_term_struct(&mut t, "word", "a");
        push_term_struct(&mut t, "word", "b");
        push_term_struct(&mut t, "word", "c");
        t.push_close();

        let e = parse_expression(&t, OPS).unwrap();
        match e {
            Expression::Join { op, range, cardinality, args, variable } => {
                assert_eq!(op, "within");
                assert_eq!(range, 5);
                assert_eq!(cardinality, 2);
                assert_eq!(args.len(), 3);
                assert_eq!(args[0], term("word", "a"));
                assert!(variable.is_none());
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_named_join() {
        let mut t = Tree::new();
        t.push_open();
        t.push_name_str("op");
        t.push_value_str("sequence");
        t.push_name_str("range");
        t.push_value_int(10);
        t.push_name_str("arg");
        push_term_struct(&mut t, "word", "a");
        t.push_name_str("arg");
        push_term_struct(&mut t, "word", "b");
        t.push_close();

        let e = parse_expression(&t, OPS).unwrap();
        match e {
            Expression::Join { op, range, args, .. } => {
                assert_eq!(op, "sequence");
                assert_eq!(range, 10);
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_root_named_join_without_wrapper() {
        // host maps spread their fields at the top level, no enclosing Open
        let mut t = Tree::new();
        t.push_name_str("op");
        t.push_value_str("union");
        let e = parse_expression(&t, OPS).unwrap();
        assert_eq!(
            e,
            Expression::Join {
                op: "union".to_string(),
                range: 0,
                cardinality: 0,
                args: vec![],
                variable: None,
            }
        );
    }

    #[test]
    fn test_root_named_join_with_args_and_variable() {
        let mut t = Tree::new();
        t.push_name_str("variable");
        t.push_value_str("match");
        t.push_name_str("op");
        t.push_value_str("sequence");
        t.push_name_str("arg");
        push_term_struct(&mut t, "word", "a");
        t.push_name_str("arg");
        push_term_struct(&mut t, "word", "b");

        let e = parse_expression(&t, OPS).unwrap();
        match e {
            Expression::Join { op, args, variable, .. } => {
                assert_eq!(op, "sequence");
                assert_eq!(args.len(), 2);
                assert_eq!(variable.as_deref(), Some("match"));
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_named_term_with_variable_first() {
        // the variable field alone does not decide the shape
        let mut t = Tree::new();
        t.push_open();
        t.push_name_str("variable");
        t.push_value_str("X");
        t.push_name_str("type");
        t.push_value_str("word");
        t.push_name_str("value");
        t.push_value_str("hello");
        t.push_close();

        let e = parse_expression(&t, OPS).unwrap();
        assert_eq!(
            e,
            Expression::Term(Term {
                term_type: "word".to_string(),
                value: Some("hello".to_string()),
                length: None,
                variable: Some("X".to_string()),
            })
        );
    }

    #[test]
    fn test_single_operator_keyword_is_zero_arg_join() {
        let mut t = Tree::new();
        t.push_open();
        t.push_value_str("union");
        t.push_close();
        let e = parse_expression(&t, OPS).unwrap();
        assert_eq!(
            e,
            Expression::Join {
                op: "union".to_string(),
                range: 0,
                cardinality: 0,
                args: vec![],
                variable: None,
            }
        );
    }

    #[test]
    fn test_single_non_operator_keyword_is_term() {
        let mut t = Tree::new();
        t.push_open();
        t.push_value_str("word");
        t.push_close();
        assert_eq!(
            parse_expression(&t, OPS).unwrap(),
            Expression::Term(Term {
                term_type: "word".to_string(),
                value: None,
                length: None,
                variable: None,
            })
        );
    }

    #[test]
    fn test_positional_variable_assignment_on_join() {
        let mut t = Tree::new();
        t.push_open();
        t.push_value_str("=match");
        t.push_value_str("sequence");
        push_term_struct(&mut t, "word", "a");
        push_term_struct(&mut t, "word", "b");
        t.push_close();

        let e = parse_expression(&t, OPS).unwrap();
        match e {
            Expression::Join { op, variable, args, .. } => {
                assert_eq!(op, "sequence");
                assert_eq!(variable.as_deref(), Some("match"));
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_structure_is_error() {
        let mut t = Tree::new();
        t.push_open();
        t.push_close();
        assert!(parse_expression(&t, OPS).is_err());
    }

    #[test]
    fn test_four_values_is_a_join() {
        // four leading values cannot be a term; "within" takes them as
        // operator, range, cardinality and one bare term argument
        let mut t = Tree::new();
        t.push_open();
        t.push_value_str("within");
        t.push_value_int(5);
        t.push_value_uint(1);
        t.push_value_str("sent");
        t.push_close();
        let e = parse_expression(&t, OPS).unwrap();
        match e {
            Expression::Join { op, range, cardinality, args, .. } => {
                assert_eq!(op, "within");
                assert_eq!(range, 5);
                assert_eq!(cardinality, 1);
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_join_depth() {
        let mut inner = Tree::new();
        inner.push_open();
        inner.push_value_str("sequence");
        push_term_struct(&mut inner, "word", "a");
        push_term_struct(&mut inner, "word", "b");
        inner.push_close();

        let mut t = Tree::new();
        t.push_open();
        t.push_value_str("within");
        t.push_value_int(20);
        t.append(&inner);
        push_term_struct(&mut t, "word", "c");
        t.push_close();

        let e = parse_expression(&t, OPS).unwrap();
        match e {
            Expression::Join { op, args, .. } => {
                assert_eq!(op, "within");
                assert_eq!(args.len(), 2);
                assert!(matches!(&args[0], Expression::Join { op, .. } if op == "sequence"));
            }
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[test]
    fn test_error_mentions_context_window() {
        let mut t = Tree::new();
        t.push_open();
        t.push_name_str("bogus");
        t.push_value_str("x");
        t.push_close();
        let err = parse_expression(&t, OPS).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown field 'bogus'"));
        assert!(msg.contains("<!>"));
    }
}
