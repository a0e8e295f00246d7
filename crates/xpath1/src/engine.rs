//! The evaluation engine for executing a parsed XPath AST against a generic `DataSourceNode`.

use crate::ast::{BinaryOperator, Expression, LocationPath, Predicate, Step};
use crate::axes;
use crate::cache::ExpressionCache;
use crate::context::Context;
use crate::datasource::DataSourceNode;
use crate::error::XPathError;
use crate::functions::{Builtin, Invocation, Resolved};
use crate::value::{self, Value, merge_nodes};
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

/// Parses `text` through the process-wide cache.
pub fn compile(text: &str) -> Result<Arc<Expression>, XPathError> {
    ExpressionCache::global().get_or_parse(text)
}

/// Parses (cached) and evaluates `text` against `ctx`.
pub fn evaluate<'a, N: DataSourceNode<'a>>(
    text: &str,
    ctx: &Context<'a, '_, N>,
) -> Result<Value<N>, XPathError> {
    compile(text)?.evaluate(ctx)
}

/// Evaluates `text` with a default context at `node`.
pub fn select<'a, N: DataSourceNode<'a>>(text: &str, node: N) -> Result<Value<N>, XPathError> {
    evaluate(text, &Context::new(node))
}

impl Expression {
    /// Evaluates the expression synchronously. Reaching a deferred extension
    /// function fails with [`XPathError::RequiresAsync`].
    pub fn evaluate<'a, N: DataSourceNode<'a>>(
        &self,
        ctx: &Context<'a, '_, N>,
    ) -> Result<Value<N>, XPathError> {
        match self {
            Expression::Literal(s) => Ok(Value::String(s.clone())),
            Expression::Number(n) => Ok(Value::Number(*n)),
            Expression::Variable(name) => ctx.resolve_variable(name),
            Expression::Location(path) => Ok(Value::NodeSet(path.select(ctx)?)),
            Expression::Function { name, args } => call_function(name, args, ctx),
            Expression::Union(left, right) => {
                let left = left.evaluate(ctx)?.into_nodes("union")?;
                let right = right.evaluate(ctx)?.into_nodes("union")?;
                Ok(Value::NodeSet(merge_nodes(left, right)))
            }
            Expression::Path { filter, relative } => {
                let list: Rc<[N]> = filter.evaluate(ctx)?.into_nodes("path composition")?.into();
                let mut results = Vec::new();
                for (i, node) in list.iter().enumerate() {
                    let step_ctx = ctx.derive(*node, i, Rc::clone(&list));
                    results = merge_nodes(results, relative.select(&step_ctx)?);
                }
                Ok(Value::NodeSet(results))
            }
            Expression::Filter { expr, predicates } => {
                let nodes = expr.evaluate(ctx)?.into_nodes("a filter expression")?;
                Ok(Value::NodeSet(apply_predicates(nodes, predicates, ctx)?))
            }
            Expression::Negate(expr) => Ok(Value::Number(-expr.evaluate(ctx)?.to_number())),
            Expression::Binary { op, left, right } => match op {
                BinaryOperator::Or => Ok(Value::Boolean(
                    left.evaluate(ctx)?.to_bool() || right.evaluate(ctx)?.to_bool(),
                )),
                BinaryOperator::And => Ok(Value::Boolean(
                    left.evaluate(ctx)?.to_bool() && right.evaluate(ctx)?.to_bool(),
                )),
                _ => Ok(binary_value(*op, &left.evaluate(ctx)?, &right.evaluate(ctx)?)),
            },
        }
    }
}

/// Applies a non-logical binary operator to evaluated operands.
pub(crate) fn binary_value<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &Value<N>,
    right: &Value<N>,
) -> Value<N> {
    match op {
        BinaryOperator::Equals
        | BinaryOperator::NotEquals
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => Value::Boolean(value::compare(op, left, right)),
        BinaryOperator::Or => Value::Boolean(left.to_bool() || right.to_bool()),
        BinaryOperator::And => Value::Boolean(left.to_bool() && right.to_bool()),
        _ => Value::Number(value::arithmetic(op, left, right)),
    }
}

fn call_function<'a, N: DataSourceNode<'a>>(
    name: &str,
    args: &[Expression],
    ctx: &Context<'a, '_, N>,
) -> Result<Value<N>, XPathError> {
    match ctx.functions().resolve(name) {
        Resolved::Builtin(Builtin::If) => {
            Builtin::If.check_arity(args.len())?;
            let branch = if args[0].evaluate(ctx)?.to_bool() {
                &args[1]
            } else {
                &args[2]
            };
            branch.evaluate(ctx)
        }
        Resolved::Builtin(builtin) => {
            builtin.check_arity(args.len())?;
            let values = evaluate_args(args, ctx)?;
            builtin.call(values, ctx)
        }
        Resolved::Extension { function, name } => {
            let values = evaluate_args(args, ctx)?;
            function.call(Invocation::new(name, values, ctx))
        }
        Resolved::Unknown => Ok(Value::Boolean(false)),
    }
}

fn evaluate_args<'a, N: DataSourceNode<'a>>(
    args: &[Expression],
    ctx: &Context<'a, '_, N>,
) -> Result<Vec<Value<N>>, XPathError> {
    args.iter().map(|arg| arg.evaluate(ctx)).collect()
}

impl LocationPath {
    /// The nodes a location path reaches from the context node, or from the
    /// owner document when the path is absolute.
    pub fn select<'a, N: DataSourceNode<'a>>(
        &self,
        ctx: &Context<'a, '_, N>,
    ) -> Result<Vec<N>, XPathError> {
        let mut current = vec![self.start_node(ctx)];
        for step in &self.steps {
            current = step.select(&current, ctx)?;
        }
        Ok(current)
    }

    pub(crate) fn start_node<'a, N: DataSourceNode<'a>>(&self, ctx: &Context<'a, '_, N>) -> N {
        if self.absolute {
            ctx.node().owner_document()
        } else {
            ctx.node()
        }
    }
}

impl Step {
    /// Applies this step to each context node in turn and concatenates the
    /// results, keeping the first occurrence of each node.
    pub fn select<'a, N: DataSourceNode<'a>>(
        &self,
        context_nodes: &[N],
        ctx: &Context<'a, '_, N>,
    ) -> Result<Vec<N>, XPathError> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for &node in context_nodes {
            let candidates = self.candidates(node, ctx)?;
            for found in apply_predicates(candidates, &self.predicates, ctx)? {
                if seen.insert(found) {
                    results.push(found);
                }
            }
        }
        Ok(results)
    }

    /// Axis collection followed by the node test, for one context node.
    pub(crate) fn candidates<'a, N: DataSourceNode<'a>>(
        &self,
        node: N,
        ctx: &Context<'a, '_, N>,
    ) -> Result<Vec<N>, XPathError> {
        let options = ctx.options();
        if let Some(nodes) = axes::collect_descendants_by_name(self.axis, &self.test, node, options)
        {
            return Ok(nodes);
        }
        Ok(axes::collect_axis_nodes(self.axis, node, options)?
            .into_iter()
            .filter(|n| axes::matches_test(*n, &self.test, self.axis, options))
            .collect())
    }
}

/// Whether a predicate value keeps the node at 0-based `index`.
pub(crate) fn keeps<'a, N: DataSourceNode<'a>>(value: &Value<N>, index: usize) -> bool {
    match value {
        Value::Number(n) => index as f64 == n - 1.0,
        other => other.to_bool(),
    }
}

/// Filters `nodes` through each predicate in turn. Every pass re-indexes the
/// surviving nodes.
pub fn apply_predicates<'a, N: DataSourceNode<'a>>(
    nodes: Vec<N>,
    predicates: &[Predicate],
    ctx: &Context<'a, '_, N>,
) -> Result<Vec<N>, XPathError> {
    let mut current = nodes;
    for predicate in predicates {
        let list: Rc<[N]> = current.into();
        let mut kept = Vec::with_capacity(list.len());
        for (i, &node) in list.iter().enumerate() {
            let predicate_ctx = ctx.derive(node, i, Rc::clone(&list));
            if keeps(&predicate.expression().evaluate(&predicate_ctx)?, i) {
                kept.push(node);
            }
        }
        current = kept;
    }
    Ok(current)
}
