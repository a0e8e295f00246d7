//! The fixed rule table driving the shift-reduce parser.
//!
//! A rule rewrites a tail of the parse stack into one nonterminal. Patterns
//! are sequences of [`Item`]s, each a symbol or a group with an optional
//! quantifier, and are matched backwards from the top of the stack.

use crate::ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, Predicate, Step};
use crate::error::XPathError;
use crate::lexer::{HIGH, Tag, Token};
use once_cell::sync::Lazy;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// The partial AST carried by a parse stack frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Token(Token),
    Expr(Expression),
    Step(Step),
    Test(NodeTest),
    Predicate(Predicate),
    Path(LocationPath),
}

impl Node {
    fn describe(&self) -> String {
        match self {
            Node::Token(token) => format!("'{}'", token.text),
            Node::Expr(expr) => format!("expression {}", expr),
            Node::Step(step) => format!("step {}", step),
            Node::Test(test) => format!("node test {}", test),
            Node::Predicate(predicate) => format!("predicate {}", predicate),
            Node::Path(path) => format!("path {}", path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quant {
    One,
    Optional,
    Many,
    OneOrMore,
}

#[derive(Debug, Clone)]
pub enum Element {
    Symbol(Tag),
    /// Matched atomically: either every item in the group matches or none does.
    Group(Vec<Item>),
}

#[derive(Debug, Clone)]
pub struct Item {
    pub element: Element,
    pub quant: Quant,
}

fn sym(tag: Tag) -> Item {
    Item {
        element: Element::Symbol(tag),
        quant: Quant::One,
    }
}

fn group(items: Vec<Item>) -> Item {
    Item {
        element: Element::Group(items),
        quant: Quant::One,
    }
}

impl Item {
    fn optional(self) -> Self {
        Self {
            quant: Quant::Optional,
            ..self
        }
    }

    fn many(self) -> Self {
        Self {
            quant: Quant::Many,
            ..self
        }
    }

    #[cfg(test)]
    fn one_or_more(self) -> Self {
        Self {
            quant: Quant::OneOrMore,
            ..self
        }
    }

    fn match_once(&self, tags: &[Tag], end: usize) -> Option<usize> {
        match &self.element {
            Element::Symbol(tag) => (end > 0 && tags[end - 1] == *tag).then(|| end - 1),
            Element::Group(items) => match_sequence(items, tags, end),
        }
    }

    fn repeat(&self, tags: &[Tag], mut end: usize) -> usize {
        while let Some(start) = self.match_once(tags, end) {
            if start == end {
                break;
            }
            end = start;
        }
        end
    }

    /// Greedy backwards match ending at `end`; returns where the match starts.
    fn match_back(&self, tags: &[Tag], end: usize) -> Option<usize> {
        match self.quant {
            Quant::One => self.match_once(tags, end),
            Quant::Optional => Some(self.match_once(tags, end).unwrap_or(end)),
            Quant::Many => Some(self.repeat(tags, end)),
            Quant::OneOrMore => self
                .match_once(tags, end)
                .map(|start| self.repeat(tags, start)),
        }
    }
}

fn match_sequence(items: &[Item], tags: &[Tag], end: usize) -> Option<usize> {
    items
        .iter()
        .rev()
        .try_fold(end, |pos, item| item.match_back(tags, pos))
}

/// Collects the tags that can end `items`. Returns true if `items` can match
/// nothing at all.
fn collect_last_tags(items: &[Item], out: &mut HashSet<Tag>) -> bool {
    for item in items.iter().rev() {
        let element_nullable = match &item.element {
            Element::Symbol(tag) => {
                out.insert(*tag);
                false
            }
            Element::Group(inner) => collect_last_tags(inner, out),
        };
        if !element_nullable && !matches!(item.quant, Quant::Optional | Quant::Many) {
            return false;
        }
    }
    true
}

pub type Builder = fn(Vec<Node>) -> Result<Node, XPathError>;

pub struct Rule {
    pub name: &'static str,
    pub target: Tag,
    pub pattern: Vec<Item>,
    pub precedence: Option<u8>,
    pub build: Builder,
}

impl Rule {
    fn new(name: &'static str, target: Tag, pattern: Vec<Item>, build: Builder) -> Self {
        Self {
            name,
            target,
            pattern,
            precedence: None,
            build,
        }
    }

    fn with_precedence(mut self, precedence: u8) -> Self {
        self.precedence = Some(precedence);
        self
    }

    /// Number of stack frames this rule would consume from the top of `tags`.
    pub fn matches(&self, tags: &[Tag]) -> Option<usize> {
        match_sequence(&self.pattern, tags, tags.len())
            .map(|start| tags.len() - start)
            .filter(|&len| len > 0)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("precedence", &self.precedence)
            .finish()
    }
}

/// The immutable rule table, sorted by pattern length and indexed by the
/// tags that can end each pattern.
#[derive(Debug)]
pub struct Grammar {
    rules: Vec<Rule>,
    index: HashMap<Tag, Vec<usize>>,
}

impl Grammar {
    fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|rule| Reverse(rule.pattern.len()));
        let mut index: HashMap<Tag, Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            let mut last = HashSet::new();
            collect_last_tags(&rule.pattern, &mut last);
            for tag in last {
                index.entry(tag).or_default().push(i);
            }
        }
        Self { rules, index }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The rule with the longest match on the top of `tags`, with its length.
    /// Equal lengths keep the earlier rule.
    pub fn candidate(&self, tags: &[Tag]) -> Option<(&Rule, usize)> {
        let top = tags.last()?;
        let mut best: Option<(&Rule, usize)> = None;
        for &i in self.index.get(top)? {
            let rule = &self.rules[i];
            if let Some(len) = rule.matches(tags) {
                if best.is_none_or(|(_, best_len)| len > best_len) {
                    best = Some((rule, len));
                }
            }
        }
        best
    }
}

pub static GRAMMAR: Lazy<Grammar> = Lazy::new(|| Grammar::new(rules()));

fn rules() -> Vec<Rule> {
    use Tag::*;
    let mut rules = vec![
        Rule::new("test-name", Test, vec![sym(Name)], test_name),
        Rule::new("test-star", Test, vec![sym(Star)], test_star),
        Rule::new("test-kind", Test, vec![sym(NodeType)], test_kind),
        Rule::new("step-child", Step, vec![sym(Test)], step_child).with_precedence(HIGH),
        Rule::new("step-axis", Step, vec![sym(AxisName), sym(Test)], step_axis),
        Rule::new("step-attribute", Step, vec![sym(At), sym(Test)], step_attribute),
        Rule::new("step-self", Step, vec![sym(Dot)], step_self),
        Rule::new("step-parent", Step, vec![sym(DotDot)], step_parent),
        Rule::new("step-predicate", Step, vec![sym(Step), sym(Pred)], step_predicate)
            .with_precedence(HIGH),
        Rule::new(
            "predicate",
            Pred,
            vec![sym(LBracket), sym(Expr), sym(RBracket)],
            predicate,
        )
        .with_precedence(HIGH),
        Rule::new("path-step", Path, vec![sym(Step)], path_step).with_precedence(9),
        Rule::new("path-child", Path, vec![sym(Path), sym(Slash), sym(Step)], path_child),
        Rule::new(
            "path-descendant",
            Path,
            vec![sym(Path), sym(DSlash), sym(Step)],
            path_descendant,
        ),
        Rule::new("path-root", Path, vec![sym(RootSlash), sym(Path).optional()], path_root),
        Rule::new(
            "path-root-descendant",
            Path,
            vec![sym(RootDSlash), sym(Path)],
            path_root_descendant,
        ),
        Rule::new("expr-path", Expr, vec![sym(Path)], expr_path).with_precedence(8),
        Rule::new(
            "expr-child-path",
            Expr,
            vec![sym(Expr), sym(Slash), sym(Path)],
            expr_child_path,
        ),
        Rule::new(
            "expr-descendant-path",
            Expr,
            vec![sym(Expr), sym(DSlash), sym(Path)],
            expr_descendant_path,
        ),
        Rule::new("expr-filter", Expr, vec![sym(Expr), sym(Pred)], expr_filter)
            .with_precedence(HIGH),
        Rule::new("expr-number", Expr, vec![sym(Number)], expr_number),
        Rule::new("expr-literal", Expr, vec![sym(Literal)], expr_literal),
        Rule::new("expr-variable", Expr, vec![sym(Dollar), sym(Name)], expr_variable),
        Rule::new(
            "expr-group",
            Expr,
            vec![sym(LParen), sym(Expr), sym(RParen)],
            expr_group,
        )
        .with_precedence(HIGH),
        Rule::new(
            "expr-call",
            Expr,
            vec![
                sym(FuncName),
                group(vec![sym(Expr), group(vec![sym(Comma), sym(Expr)]).many()]).optional(),
                sym(RParen),
            ],
            expr_call,
        )
        .with_precedence(HIGH),
        Rule::new("expr-negate", Expr, vec![sym(Neg), sym(Expr)], expr_negate),
    ];
    for op in [
        Or, And, Eq, Neq, Lt, Lte, Gt, Gte, Plus, Minus, Multiply, Div, Mod, Pipe,
    ] {
        rules.push(Rule::new(
            "expr-binary",
            Expr,
            vec![sym(Expr), sym(op), sym(Expr)],
            expr_binary,
        ));
    }
    rules
}

/// Typed access to the frames handed to a builder, in stack order.
struct Frames(std::vec::IntoIter<Node>);

impl Frames {
    fn next(&mut self, expected: &str) -> Result<Node, XPathError> {
        self.0
            .next()
            .ok_or_else(|| XPathError::syntax("", format!("missing {}", expected)))
    }

    fn token(&mut self) -> Result<Token, XPathError> {
        match self.next("token")? {
            Node::Token(token) => Ok(token),
            other => Err(unexpected("a token", &other)),
        }
    }

    fn expr(&mut self) -> Result<Expression, XPathError> {
        match self.next("expression")? {
            Node::Expr(expr) => Ok(expr),
            other => Err(unexpected("an expression", &other)),
        }
    }

    fn step(&mut self) -> Result<Step, XPathError> {
        match self.next("step")? {
            Node::Step(step) => Ok(step),
            other => Err(unexpected("a step", &other)),
        }
    }

    fn test(&mut self) -> Result<NodeTest, XPathError> {
        match self.next("node test")? {
            Node::Test(test) => Ok(test),
            other => Err(unexpected("a node test", &other)),
        }
    }

    fn predicate(&mut self) -> Result<Predicate, XPathError> {
        match self.next("predicate")? {
            Node::Predicate(predicate) => Ok(predicate),
            other => Err(unexpected("a predicate", &other)),
        }
    }

    fn path(&mut self) -> Result<LocationPath, XPathError> {
        match self.next("location path")? {
            Node::Path(path) => Ok(path),
            other => Err(unexpected("a location path", &other)),
        }
    }
}

fn frames(nodes: Vec<Node>) -> Frames {
    Frames(nodes.into_iter())
}

fn unexpected(expected: &str, found: &Node) -> XPathError {
    XPathError::syntax(
        "",
        format!("expected {}, found {}", expected, found.describe()),
    )
}

fn unquote(text: &str) -> &str {
    let text = text.trim();
    if text.len() >= 2 {
        &text[1..text.len() - 1]
    } else {
        ""
    }
}

fn test_name(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let name = frames(nodes).token()?.text;
    Ok(Node::Test(match name.strip_suffix(":*") {
        Some(prefix) => NodeTest::NamePrefixed(prefix.to_string()),
        None => NodeTest::NameExact(name),
    }))
}

fn test_star(_: Vec<Node>) -> Result<Node, XPathError> {
    Ok(Node::Test(NodeTest::ElementOrAttribute))
}

fn test_kind(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let text = frames(nodes).token()?.text;
    let (kind, rest) = text
        .split_once('(')
        .ok_or_else(|| XPathError::syntax(text.as_str(), "malformed node type test"))?;
    let test = match kind.trim() {
        "node" => NodeTest::Any,
        "text" => NodeTest::Text,
        "comment" => NodeTest::Comment,
        "processing-instruction" => {
            let target = rest.trim_end().trim_end_matches(')').trim();
            NodeTest::ProcessingInstruction(
                (!target.is_empty()).then(|| unquote(target).to_string()),
            )
        }
        other => {
            return Err(XPathError::syntax(
                text.as_str(),
                format!("unknown node type '{}'", other),
            ));
        }
    };
    Ok(Node::Test(test))
}

fn step_child(nodes: Vec<Node>) -> Result<Node, XPathError> {
    Ok(Node::Step(Step::new(Axis::Child, frames(nodes).test()?)))
}

fn step_axis(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let text = nodes.token()?.text;
    let name = text.trim_end_matches(':').trim_end();
    let axis = Axis::from_name(name)
        .ok_or_else(|| XPathError::syntax(text.as_str(), format!("unknown axis '{}'", name)))?;
    Ok(Node::Step(Step::new(axis, nodes.test()?)))
}

fn step_attribute(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    nodes.token()?;
    Ok(Node::Step(Step::new(Axis::Attribute, nodes.test()?)))
}

fn step_self(_: Vec<Node>) -> Result<Node, XPathError> {
    Ok(Node::Step(Step::new(Axis::SelfAxis, NodeTest::Any)))
}

fn step_parent(_: Vec<Node>) -> Result<Node, XPathError> {
    Ok(Node::Step(Step::new(Axis::Parent, NodeTest::Any)))
}

fn step_predicate(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let mut step = nodes.step()?;
    step.predicates.push(nodes.predicate()?);
    Ok(Node::Step(step))
}

fn predicate(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    nodes.token()?;
    Ok(Node::Predicate(Predicate::new(nodes.expr()?)))
}

fn path_step(nodes: Vec<Node>) -> Result<Node, XPathError> {
    Ok(Node::Path(LocationPath::relative(vec![
        frames(nodes).step()?,
    ])))
}

fn path_child(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let mut path = nodes.path()?;
    nodes.token()?;
    path.steps.push(nodes.step()?);
    Ok(Node::Path(path))
}

fn path_descendant(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let mut path = nodes.path()?;
    nodes.token()?;
    path.steps.push(Step::descendant_or_self_node());
    path.steps.push(nodes.step()?);
    Ok(Node::Path(path))
}

fn relative_steps(path: LocationPath) -> Result<Vec<Step>, XPathError> {
    if path.absolute {
        return Err(XPathError::syntax(
            path.to_string(),
            "an absolute path cannot follow '/'",
        ));
    }
    Ok(path.steps)
}

fn path_root(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    nodes.token()?;
    let steps = match nodes.0.next() {
        Some(Node::Path(path)) => relative_steps(path)?,
        Some(other) => return Err(unexpected("a location path", &other)),
        None => vec![],
    };
    Ok(Node::Path(LocationPath::absolute(steps)))
}

fn path_root_descendant(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    nodes.token()?;
    let mut steps = vec![Step::descendant_or_self_node()];
    steps.extend(relative_steps(nodes.path()?)?);
    Ok(Node::Path(LocationPath::absolute(steps)))
}

fn expr_path(nodes: Vec<Node>) -> Result<Node, XPathError> {
    Ok(Node::Expr(Expression::Location(frames(nodes).path()?)))
}

/// Appends `steps` to `filter`, extending an existing filter path in place.
fn compose(filter: Expression, steps: Vec<Step>) -> Expression {
    match filter {
        Expression::Path {
            filter,
            mut relative,
        } => {
            relative.steps.extend(steps);
            Expression::Path { filter, relative }
        }
        other => Expression::path(other, LocationPath::relative(steps)),
    }
}

fn expr_child_path(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let filter = nodes.expr()?;
    nodes.token()?;
    let steps = relative_steps(nodes.path()?)?;
    Ok(Node::Expr(compose(filter, steps)))
}

fn expr_descendant_path(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let filter = nodes.expr()?;
    nodes.token()?;
    let mut steps = vec![Step::descendant_or_self_node()];
    steps.extend(relative_steps(nodes.path()?)?);
    Ok(Node::Expr(compose(filter, steps)))
}

fn expr_filter(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let expr = nodes.expr()?;
    let predicate = nodes.predicate()?;
    Ok(Node::Expr(match expr {
        Expression::Filter {
            expr,
            mut predicates,
        } => {
            predicates.push(predicate);
            Expression::Filter { expr, predicates }
        }
        other => Expression::filter(other, vec![predicate]),
    }))
}

fn expr_number(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let text = frames(nodes).token()?.text;
    let value: f64 = text
        .parse()
        .map_err(|_| XPathError::syntax(text.as_str(), "malformed number"))?;
    Ok(Node::Expr(Expression::Number(value)))
}

fn expr_literal(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let text = frames(nodes).token()?.text;
    Ok(Node::Expr(Expression::literal(unquote(&text))))
}

fn expr_variable(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    nodes.token()?;
    let name = nodes.token()?.text;
    if name.ends_with('*') {
        return Err(XPathError::syntax(
            format!("${}", name),
            "a variable name cannot be a wildcard",
        ));
    }
    Ok(Node::Expr(Expression::Variable(name)))
}

fn expr_group(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    nodes.token()?;
    Ok(Node::Expr(nodes.expr()?))
}

fn expr_call(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let text = nodes.token()?.text;
    let name = text.trim_end_matches('(').trim_end().to_string();
    let args = nodes
        .0
        .filter_map(|node| match node {
            Node::Expr(expr) => Some(expr),
            _ => None,
        })
        .collect();
    Ok(Node::Expr(Expression::Function { name, args }))
}

fn expr_negate(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    nodes.token()?;
    Ok(Node::Expr(Expression::negate(nodes.expr()?)))
}

fn expr_binary(nodes: Vec<Node>) -> Result<Node, XPathError> {
    let mut nodes = frames(nodes);
    let left = nodes.expr()?;
    let operator = nodes.token()?;
    let right = nodes.expr()?;
    let op = match operator.tag {
        Tag::Pipe => return Ok(Node::Expr(Expression::union(left, right))),
        Tag::Or => BinaryOperator::Or,
        Tag::And => BinaryOperator::And,
        Tag::Eq => BinaryOperator::Equals,
        Tag::Neq => BinaryOperator::NotEquals,
        Tag::Lt => BinaryOperator::LessThan,
        Tag::Lte => BinaryOperator::LessThanOrEqual,
        Tag::Gt => BinaryOperator::GreaterThan,
        Tag::Gte => BinaryOperator::GreaterThanOrEqual,
        Tag::Plus => BinaryOperator::Plus,
        Tag::Minus => BinaryOperator::Minus,
        Tag::Multiply => BinaryOperator::Multiply,
        Tag::Div => BinaryOperator::Divide,
        Tag::Mod => BinaryOperator::Modulo,
        _ => {
            return Err(XPathError::syntax(
                operator.text.as_str(),
                "not a binary operator",
            ));
        }
    };
    Ok(Node::Expr(Expression::binary(op, left, right)))
}
