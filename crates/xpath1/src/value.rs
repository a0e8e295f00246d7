//! The four XPath value kinds and the coercions between them.

use crate::ast::BinaryOperator;
use crate::datasource::{DataSourceNode, NodeType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Represents the possible result types of an XPath expression evaluation.
///
/// A node-set holds borrowed handles into the host tree, in the order the
/// evaluator produced them. It never owns the nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<N> {
    String(String),
    Number(f64),
    Boolean(bool),
    NodeSet(Vec<N>),
}

static NUMBER_LEXEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*-?(?:\d+(?:\.\d*)?|\.\d+)\s*$").expect("number lexeme pattern is valid")
});

/// Parses a string the way XPath's `number()` does. Anything that is not a
/// plain decimal numeral yields negative zero rather than NaN.
pub fn string_to_number(s: &str) -> f64 {
    if !NUMBER_LEXEME.is_match(s) {
        return -0.0;
    }
    s.trim().parse().unwrap_or(-0.0)
}

/// Formats a number the way XPath's `string()` does: integral values have no
/// fraction and both zeros print as `0`.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// The string value of a single node.
///
/// Elements and documents use only their direct text children, trimmed; this
/// differs from the descendant-text rule of XPath 1.0 and is relied upon by
/// existing templates.
pub fn node_string_value<'a, N: DataSourceNode<'a>>(node: N) -> String {
    match node.node_type() {
        NodeType::Element | NodeType::Document => {
            let text: String = node
                .children()
                .filter(|child| child.node_type() == NodeType::Text)
                .filter_map(|child| child.node_value())
                .collect();
            text.trim().to_string()
        }
        _ => node.node_value().unwrap_or_default(),
    }
}

impl<N> Value<N> {
    pub fn node_set(nodes: Vec<N>) -> Self {
        Value::NodeSet(nodes)
    }

    pub fn is_node_set(&self) -> bool {
        matches!(self, Value::NodeSet(_))
    }

    /// The name used for this kind in type errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::NodeSet(_) => "node-set",
        }
    }
}

impl<'a, N: DataSourceNode<'a>> Value<N> {
    /// Coerces the XPath value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }

    /// Coerces the XPath value to a number. Node-sets go through their string value.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => string_to_number(s),
            Value::NodeSet(_) => string_to_number(&self.to_string()),
        }
    }

    /// Consumes the value, returning its nodes, or a type error naming `what`.
    pub fn into_nodes(self, what: &str) -> Result<Vec<N>, crate::error::XPathError> {
        match self {
            Value::NodeSet(nodes) => Ok(nodes),
            other => Err(crate::error::XPathError::TypeError(format!(
                "{} requires a node-set, got a {}",
                what,
                other.kind()
            ))),
        }
    }
}

impl<'a, N: DataSourceNode<'a>> fmt::Display for Value<N> {
    /// Coerces the XPath value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::NodeSet(nodes) => match nodes.first() {
                Some(node) => f.write_str(&node_string_value(*node)),
                None => Ok(()),
            },
            Value::String(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&number_to_string(*n)),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl<N> From<&str> for Value<N> {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<N> From<String> for Value<N> {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<N> From<f64> for Value<N> {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl<N> From<bool> for Value<N> {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<N> From<Vec<N>> for Value<N> {
    fn from(nodes: Vec<N>) -> Self {
        Value::NodeSet(nodes)
    }
}

/// Concatenates two node lists, dropping handles already present.
pub fn merge_nodes<'a, N: DataSourceNode<'a>>(left: Vec<N>, right: Vec<N>) -> Vec<N> {
    let mut seen: HashSet<N> = HashSet::with_capacity(left.len() + right.len());
    left.into_iter()
        .chain(right)
        .filter(|node| seen.insert(*node))
        .collect()
}

/// The domain two operands are compared in.
#[derive(Debug, Clone, PartialEq)]
enum Comparable {
    Numbers(f64, f64),
    Booleans(bool, bool),
    Strings(String, String),
}

impl Comparable {
    /// The cross-type decision table for `=`, `!=`, `<`, `<=`, `>`, `>=`.
    fn of<'a, N: DataSourceNode<'a>>(left: &Value<N>, right: &Value<N>) -> Self {
        use Value::*;
        match (left, right) {
            (NodeSet(_), NodeSet(_)) => Comparable::Strings(left.to_string(), right.to_string()),
            (NodeSet(_), Number(_)) | (Number(_), NodeSet(_)) => {
                Comparable::Numbers(left.to_number(), right.to_number())
            }
            (NodeSet(_), String(_)) | (String(_), NodeSet(_)) => {
                Comparable::Strings(left.to_string(), right.to_string())
            }
            (Number(_), _) | (_, Number(_)) => {
                Comparable::Numbers(left.to_number(), right.to_number())
            }
            (Boolean(_), _) | (_, Boolean(_)) => {
                Comparable::Booleans(left.to_bool(), right.to_bool())
            }
            _ => Comparable::Strings(left.to_string(), right.to_string()),
        }
    }

    fn ordering(&self) -> Option<Ordering> {
        match self {
            Comparable::Numbers(l, r) => l.partial_cmp(r),
            Comparable::Booleans(l, r) => Some(l.cmp(r)),
            Comparable::Strings(l, r) => Some(l.cmp(r)),
        }
    }
}

/// Applies an equality or relational operator using the decision table above.
pub fn compare<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &Value<N>,
    right: &Value<N>,
) -> bool {
    let comparable = Comparable::of(left, right);
    let ordering = comparable.ordering();
    match op {
        BinaryOperator::Equals => ordering == Some(Ordering::Equal),
        BinaryOperator::NotEquals => ordering != Some(Ordering::Equal),
        BinaryOperator::LessThan => ordering == Some(Ordering::Less),
        BinaryOperator::LessThanOrEqual => {
            matches!(ordering, Some(Ordering::Less | Ordering::Equal))
        }
        BinaryOperator::GreaterThan => ordering == Some(Ordering::Greater),
        BinaryOperator::GreaterThanOrEqual => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
        _ => false,
    }
}

/// Applies an arithmetic operator to the numeric coercions of both operands.
pub fn arithmetic<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &Value<N>,
    right: &Value<N>,
) -> f64 {
    let (l, r) = (left.to_number(), right.to_number());
    match op {
        BinaryOperator::Plus => l + r,
        BinaryOperator::Minus => l - r,
        BinaryOperator::Multiply => l * r,
        BinaryOperator::Divide => l / r,
        BinaryOperator::Modulo => l % r,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    type V<'a> = Value<MockNode<'a>>;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(1.50), "1.5");
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(-12.25), "-12.25");
    }

    #[test]
    fn test_string_to_number_sentinel() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number("-.5"), -0.5);
        assert_eq!(string_to_number("7."), 7.0);
        let bad = string_to_number("abc");
        assert_eq!(bad, 0.0);
        assert!(bad.is_sign_negative());
        assert!(string_to_number("1e3").is_sign_negative());
        assert!(string_to_number("").is_sign_negative());
    }

    #[test]
    fn test_scalar_coercions() {
        assert!(!V::from("").to_bool());
        assert!(V::from("0").to_bool());
        assert!(!V::from(0.0).to_bool());
        assert!(V::from(-2.0).to_bool());
        assert_eq!(V::from(true).to_number(), 1.0);
        assert_eq!(V::from(false).to_number(), 0.0);
        assert_eq!(V::from(true).to_string(), "true");
        assert!(!V::from("nope").to_number().is_nan());
    }

    #[test]
    fn test_node_set_string_uses_direct_text_only() {
        let tree = crate::datasource::tests::MockTreeBuilder::new()
            .start("p")
            .text("  outer ")
            .start("b")
            .text("inner")
            .end()
            .text("tail  ")
            .end()
            .build();
        let p = tree.element("p").unwrap();
        assert_eq!(Value::NodeSet(vec![p]).to_string(), "outer tail");
        assert_eq!(Value::<MockNode>::NodeSet(vec![]).to_string(), "");
    }

    #[test]
    fn test_node_set_coercions() {
        let tree = create_test_tree();
        let attr = tree.node(3); // id="p1"
        let set = Value::NodeSet(vec![attr, tree.node(2)]);
        assert_eq!(set.to_string(), "p1");
        assert!(set.to_bool());
        assert!(set.to_number().is_sign_negative());
    }

    #[test]
    fn test_comparison_table() {
        let tree = create_test_tree();
        let para = Value::NodeSet(vec![tree.node(2)]); // "Hello"
        let world = Value::NodeSet(vec![tree.node(9)]); // "World"
        assert!(compare(BinaryOperator::Equals, &para, &V::from("Hello")));
        assert!(compare(BinaryOperator::NotEquals, &para, &world));
        assert!(compare(BinaryOperator::LessThan, &para, &world));
        // node-set vs boolean compares truth values
        assert!(compare(BinaryOperator::Equals, &para, &V::from(true)));
        // number wins over string
        assert!(compare(BinaryOperator::Equals, &V::from("2"), &V::from(2.0)));
        // boolean wins over string
        assert!(compare(BinaryOperator::Equals, &V::from("x"), &V::from(true)));
        // plain strings compare lexicographically
        assert!(compare(BinaryOperator::LessThan, &V::from("10"), &V::from("9")));
        assert!(compare(BinaryOperator::GreaterThanOrEqual, &V::from(true), &V::from(false)));
    }

    #[test]
    fn test_arithmetic_and_merge() {
        assert_eq!(arithmetic::<MockNode>(BinaryOperator::Modulo, &V::from(-5.0), &V::from(2.0)), -1.0);
        assert_eq!(arithmetic::<MockNode>(BinaryOperator::Divide, &V::from("6"), &V::from(4.0)), 1.5);
        let tree = create_test_tree();
        let (a, b, c) = (tree.node(1), tree.node(2), tree.node(7));
        assert_eq!(merge_nodes(vec![a, b], vec![b, c, a]), vec![a, b, c]);
    }
}
