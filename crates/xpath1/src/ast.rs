//! Defines the Abstract Syntax Tree (AST) for XPath 1.0 expressions.
//!
//! The tree is immutable once built. Every node type can be constructed
//! directly, so hosts may assemble expressions without going through the
//! parser, and every node renders back to unabbreviated XPath via `Display`.

use crate::value::number_to_string;
use std::fmt;

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A location path such as `/child::a/attribute::b` or `descendant::*[2]`.
    Location(LocationPath),
    Function {
        name: String,
        args: Vec<Expression>,
    },
    Union(Box<Expression>, Box<Expression>),
    /// A filter expression followed by a relative path, e.g. `$items/child::name`.
    Path {
        filter: Box<Expression>,
        relative: LocationPath,
    },
    /// A primary expression with predicates, e.g. `(//a)[1]`.
    Filter {
        expr: Box<Expression>,
        predicates: Vec<Predicate>,
    },
    Negate(Box<Expression>),
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Literal(String),
    Number(f64),
    Variable(String),
}

impl Expression {
    pub fn literal(value: impl Into<String>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn number(value: f64) -> Self {
        Expression::Number(value)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Function {
            name: name.into(),
            args,
        }
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn union(left: Expression, right: Expression) -> Self {
        Expression::Union(Box::new(left), Box::new(right))
    }

    pub fn negate(expr: Expression) -> Self {
        Expression::Negate(Box::new(expr))
    }

    pub fn path(filter: Expression, relative: LocationPath) -> Self {
        Expression::Path {
            filter: Box::new(filter),
            relative,
        }
    }

    pub fn filter(expr: Expression, predicates: Vec<Predicate>) -> Self {
        Expression::Filter {
            expr: Box::new(expr),
            predicates,
        }
    }

    pub fn location(path: LocationPath) -> Self {
        Expression::Location(path)
    }

    /// Checks if the expression is a `Location` variant.
    pub fn is_location_path(&self) -> bool {
        matches!(self, Expression::Location(_))
    }

    /// Checks if the expression is a `Binary` variant.
    pub fn is_binary_op(&self) -> bool {
        matches!(self, Expression::Binary { .. })
    }
}

/// A binary operator used in an expression. `|` is modelled by [`Expression::Union`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Equals => "=",
            BinaryOperator::NotEquals => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "div",
            BinaryOperator::Modulo => "mod",
        }
    }
}

/// Represents a location path, like `/child::foo` or `descendant::bar[1]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocationPath {
    /// True if the path starts from the owner document (e.g., `/foo`).
    pub absolute: bool,
    pub steps: Vec<Step>,
}

impl LocationPath {
    pub fn relative(steps: Vec<Step>) -> Self {
        Self {
            absolute: false,
            steps,
        }
    }

    pub fn absolute(steps: Vec<Step>) -> Self {
        Self {
            absolute: true,
            steps,
        }
    }

    /// The bare `/` path selecting the document node.
    pub fn root() -> Self {
        Self::absolute(vec![])
    }
}

/// Represents a single step in a location path, like `child::foo[position() > 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Predicate>,
}

impl Step {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: vec![],
        }
    }

    pub fn with_predicate(mut self, expr: Expression) -> Self {
        self.predicates.push(Predicate::new(expr));
        self
    }

    /// `descendant-or-self::node()`, the step `//` abbreviates.
    pub fn descendant_or_self_node() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::Any)
    }
}

/// A bracketed filter. A numeric value selects by position, anything else by truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate(pub Expression);

impl Predicate {
    pub fn new(expr: Expression) -> Self {
        Predicate(expr)
    }

    pub fn expression(&self) -> &Expression {
        &self.0
    }
}

/// The axis of movement from the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

impl Axis {
    pub const ALL: [Axis; 13] = [
        Axis::Ancestor,
        Axis::AncestorOrSelf,
        Axis::Attribute,
        Axis::Child,
        Axis::Descendant,
        Axis::DescendantOrSelf,
        Axis::Following,
        Axis::FollowingSibling,
        Axis::Namespace,
        Axis::Parent,
        Axis::Preceding,
        Axis::PrecedingSibling,
        Axis::SelfAxis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Attribute => "attribute",
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Following => "following",
            Axis::FollowingSibling => "following-sibling",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Preceding => "preceding",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::SelfAxis => "self",
        }
    }

    pub fn from_name(name: &str) -> Option<Axis> {
        Axis::ALL.into_iter().find(|axis| axis.name() == name)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A test to apply to nodes on a given axis to see if they should be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `node()`
    Any,
    /// `*`: any node of the axis' principal type.
    ElementOrAttribute,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()` with an optional target literal.
    ProcessingInstruction(Option<String>),
    /// `prefix:*`
    NamePrefixed(String),
    /// A qualified name test (e.g., `foo`, `xsl:if`).
    NameExact(String),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Location(path) => write!(f, "{}", path),
            Expression::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expression::Union(left, right) => write!(f, "({} | {})", left, right),
            Expression::Path { filter, relative } => match filter.as_ref() {
                Expression::Location(_) => write!(f, "({})/{}", filter, relative),
                _ => write!(f, "{}/{}", filter, relative),
            },
            Expression::Filter { expr, predicates } => {
                write!(f, "({})", expr)?;
                for predicate in predicates {
                    write!(f, "{}", predicate)?;
                }
                Ok(())
            }
            Expression::Negate(expr) => write!(f, "-{}", expr),
            Expression::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::Literal(s) if s.contains('\'') => write!(f, "\"{}\"", s),
            Expression::Literal(s) => write!(f, "'{}'", s),
            Expression::Number(n) => f.write_str(&number_to_string(*n)),
            Expression::Variable(name) => write!(f, "${}", name),
        }
    }
}

impl fmt::Display for LocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.axis, self.test)?;
        for predicate in &self.predicates {
            write!(f, "{}", predicate)?;
        }
        Ok(())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Any => f.write_str("node()"),
            NodeTest::ElementOrAttribute => f.write_str("*"),
            NodeTest::Text => f.write_str("text()"),
            NodeTest::Comment => f.write_str("comment()"),
            NodeTest::ProcessingInstruction(None) => f.write_str("processing-instruction()"),
            NodeTest::ProcessingInstruction(Some(target)) => {
                write!(f, "processing-instruction('{}')", target)
            }
            NodeTest::NamePrefixed(prefix) => write!(f, "{}:*", prefix),
            NodeTest::NameExact(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_names_round_trip() {
        for axis in Axis::ALL {
            assert_eq!(Axis::from_name(axis.name()), Some(axis));
        }
        assert_eq!(Axis::from_name("sideways"), None);
    }

    #[test]
    fn test_display_unabbreviated() {
        let expr = Expression::location(LocationPath::absolute(vec![
            Step::descendant_or_self_node(),
            Step::new(Axis::Child, NodeTest::NameExact("item".into()))
                .with_predicate(Expression::number(2.0)),
            Step::new(Axis::Attribute, NodeTest::ElementOrAttribute),
        ]));
        assert_eq!(
            expr.to_string(),
            "/descendant-or-self::node()/child::item[2]/attribute::*"
        );
    }

    #[test]
    fn test_display_operators_and_literals() {
        let expr = Expression::binary(
            BinaryOperator::And,
            Expression::function("contains", vec![
                Expression::variable("s"),
                Expression::literal("it's"),
            ]),
            Expression::negate(Expression::number(1.5)),
        );
        assert_eq!(expr.to_string(), "(contains($s, \"it's\") and -1.5)");
        assert_eq!(LocationPath::root().to_string(), "/");
    }
}
