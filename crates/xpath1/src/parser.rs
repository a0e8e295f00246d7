//! A precedence-driven shift-reduce parser for XPath expressions.

use crate::ast::*;
use crate::error::XPathError;
use crate::grammar::{GRAMMAR, Node};
use crate::lexer::{Assoc, Lexer, Tag, Token};
use once_cell::sync::Lazy;
use regex::Regex;

// --- Main Public Parser ---

/// Parses expression text, trying the trivial-expression shortcuts before the
/// general engine.
pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    if let Some(expr) = parse_fast_path(input) {
        log::debug!("fast path parse of '{}'", input);
        return Ok(expr);
    }
    parse_with_engine(input)
}

/// Parses expression text with the shift-reduce engine only.
pub fn parse_with_engine(input: &str) -> Result<Expression, XPathError> {
    let mut lexer = Lexer::new(input);
    let mut stack: Vec<Frame> = Vec::new();
    let mut lookahead = lexer.next_token();

    loop {
        let tags: Vec<Tag> = stack.iter().map(|f| f.tag).collect();
        if let Some((rule, len)) = GRAMMAR.candidate(&tags) {
            let start = stack.len() - len;
            let precedence = rule.precedence.unwrap_or_else(|| {
                stack[start..]
                    .iter()
                    .map(|f| f.precedence)
                    .max()
                    .unwrap_or(0)
            });
            let reduce = match &lookahead {
                None => true,
                Some(la) => {
                    precedence > la.precedence
                        || (precedence >= la.precedence && la.assoc == Assoc::Left)
                }
            };
            if reduce {
                log::trace!("reduce {} over {} frame(s)", rule.name, len);
                let matched = stack.drain(start..).map(|f| f.node).collect();
                let node = (rule.build)(matched).map_err(|e| with_expression(e, input))?;
                stack.push(Frame {
                    tag: rule.target,
                    precedence: 0,
                    node,
                });
                continue;
            }
        }
        match lookahead.take() {
            Some(token) => {
                log::trace!("shift {} '{}'", token.tag, token.text);
                stack.push(Frame::shift(token));
                lookahead = lexer.next_token();
            }
            None => break,
        }
    }

    let remaining = lexer.remaining();
    if !remaining.is_empty() {
        return Err(XPathError::Lex {
            remaining: remaining.to_string(),
            stack: render(&stack),
        });
    }
    match (stack.len(), stack.pop()) {
        (
            1,
            Some(Frame {
                node: Node::Expr(expr),
                ..
            }),
        ) => Ok(expr),
        (_, last) => {
            stack.extend(last);
            Err(XPathError::Parse {
                remaining: remaining.to_string(),
                stack: render(&stack),
            })
        }
    }
}

/// A parse stack entry. Reduced frames carry precedence 0.
#[derive(Debug)]
struct Frame {
    tag: Tag,
    precedence: u8,
    node: Node,
}

impl Frame {
    fn shift(token: Token) -> Self {
        Self {
            tag: token.tag,
            precedence: token.precedence,
            node: Node::Token(token),
        }
    }
}

fn render(stack: &[Frame]) -> String {
    stack
        .iter()
        .map(|f| f.tag.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn with_expression(error: XPathError, input: &str) -> XPathError {
    match error {
        XPathError::Syntax { message, .. } => XPathError::syntax(input, message),
        other => other,
    }
}

// --- Fast Paths ---

static SIMPLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([$@])?(\w+)$").expect("simple name pattern is valid"));
static SIMPLE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+(/\w+)*$").expect("simple path pattern is valid"));

fn is_name_segment(segment: &str) -> bool {
    segment
        .chars()
        .next()
        .is_some_and(|c| !c.is_numeric())
}

fn child_step(name: &str) -> Step {
    Step::new(Axis::Child, NodeTest::NameExact(name.to_string()))
}

/// Builds the tree for `name`, `@name`, `$name` and `a/b/c` directly. Returns
/// `None` for anything else, including numeric segments.
fn parse_fast_path(input: &str) -> Option<Expression> {
    if let Some(caps) = SIMPLE_NAME.captures(input) {
        let name = caps.get(2)?.as_str();
        if !is_name_segment(name) {
            return None;
        }
        return Some(match caps.get(1).map(|m| m.as_str()) {
            Some("$") => Expression::variable(name),
            Some(_) => Expression::location(LocationPath::relative(vec![Step::new(
                Axis::Attribute,
                NodeTest::NameExact(name.to_string()),
            )])),
            None => Expression::location(LocationPath::relative(vec![child_step(name)])),
        });
    }
    if SIMPLE_PATH.is_match(input) {
        let segments: Vec<&str> = input.split('/').collect();
        if segments.iter().all(|s| is_name_segment(s)) {
            return Some(Expression::location(LocationPath::relative(
                segments.into_iter().map(child_step).collect(),
            )));
        }
    }
    None
}
