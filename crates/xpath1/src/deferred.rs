//! Asynchronous evaluation, for expressions that call deferred extension
//! functions.
//!
//! Mirrors the synchronous engine node for node. Immediate functions still
//! run inline; only deferred ones suspend, and their errors surface through
//! the returned future.

use crate::ast::{BinaryOperator, Expression, LocationPath, Predicate, Step};
use crate::context::Context;
use crate::datasource::DataSourceNode;
use crate::engine::{binary_value, compile, keeps};
use crate::error::XPathError;
use crate::functions::{Builtin, Invocation, Resolved};
use crate::value::{Value, merge_nodes};
use futures::future::{FutureExt, LocalBoxFuture};
use std::collections::HashSet;
use std::rc::Rc;

type EvalFuture<'e, N> = LocalBoxFuture<'e, Result<Value<N>, XPathError>>;

/// Parses (cached) and evaluates `text`, awaiting deferred functions.
pub async fn evaluate_async<'a, N: DataSourceNode<'a>>(
    text: &str,
    ctx: &Context<'a, '_, N>,
) -> Result<Value<N>, XPathError> {
    let expr = compile(text)?;
    expr.evaluate_async(ctx).await
}

impl Expression {
    pub fn evaluate_async<'e, 'a: 'e, N>(&'e self, ctx: &'e Context<'a, '_, N>) -> EvalFuture<'e, N>
    where
        N: DataSourceNode<'a> + 'e,
    {
        async move {
            match self {
                Expression::Literal(_) | Expression::Number(_) | Expression::Variable(_) => {
                    self.evaluate(ctx)
                }
                Expression::Location(path) => Ok(Value::NodeSet(select_path(path, ctx).await?)),
                Expression::Function { name, args } => call_function(name, args, ctx).await,
                Expression::Union(left, right) => {
                    let left = left.evaluate_async(ctx).await?.into_nodes("union")?;
                    let right = right.evaluate_async(ctx).await?.into_nodes("union")?;
                    Ok(Value::NodeSet(merge_nodes(left, right)))
                }
                Expression::Path { filter, relative } => {
                    let list: Rc<[N]> = filter
                        .evaluate_async(ctx)
                        .await?
                        .into_nodes("path composition")?
                        .into();
                    let mut results = Vec::new();
                    for (i, node) in list.iter().enumerate() {
                        let step_ctx = ctx.derive(*node, i, Rc::clone(&list));
                        results = merge_nodes(results, select_path(relative, &step_ctx).await?);
                    }
                    Ok(Value::NodeSet(results))
                }
                Expression::Filter { expr, predicates } => {
                    let nodes = expr
                        .evaluate_async(ctx)
                        .await?
                        .into_nodes("a filter expression")?;
                    Ok(Value::NodeSet(apply_predicates(nodes, predicates, ctx).await?))
                }
                Expression::Negate(expr) => {
                    Ok(Value::Number(-expr.evaluate_async(ctx).await?.to_number()))
                }
                Expression::Binary { op, left, right } => {
                    let left = left.evaluate_async(ctx).await?;
                    match op {
                        BinaryOperator::Or if left.to_bool() => Ok(Value::Boolean(true)),
                        BinaryOperator::And if !left.to_bool() => Ok(Value::Boolean(false)),
                        _ => {
                            let right = right.evaluate_async(ctx).await?;
                            Ok(binary_value(*op, &left, &right))
                        }
                    }
                }
            }
        }
        .boxed_local()
    }
}

async fn call_function<'e, 'a: 'e, N>(
    name: &'e str,
    args: &'e [Expression],
    ctx: &'e Context<'a, '_, N>,
) -> Result<Value<N>, XPathError>
where
    N: DataSourceNode<'a> + 'e,
{
    match ctx.functions().resolve(name) {
        Resolved::Builtin(Builtin::If) => {
            Builtin::If.check_arity(args.len())?;
            let branch = if args[0].evaluate_async(ctx).await?.to_bool() {
                &args[1]
            } else {
                &args[2]
            };
            branch.evaluate_async(ctx).await
        }
        Resolved::Builtin(builtin) => {
            builtin.check_arity(args.len())?;
            let values = evaluate_args(args, ctx).await?;
            builtin.call(values, ctx)
        }
        Resolved::Extension { function, name } => {
            let values = evaluate_args(args, ctx).await?;
            function.call_async(Invocation::new(name, values, ctx)).await
        }
        Resolved::Unknown => Ok(Value::Boolean(false)),
    }
}

async fn evaluate_args<'e, 'a: 'e, N>(
    args: &'e [Expression],
    ctx: &'e Context<'a, '_, N>,
) -> Result<Vec<Value<N>>, XPathError>
where
    N: DataSourceNode<'a> + 'e,
{
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(arg.evaluate_async(ctx).await?);
    }
    Ok(values)
}

async fn select_path<'e, 'a: 'e, N>(
    path: &'e LocationPath,
    ctx: &'e Context<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'e,
{
    let mut current = vec![path.start_node(ctx)];
    for step in &path.steps {
        current = select_step(step, &current, ctx).await?;
    }
    Ok(current)
}

async fn select_step<'e, 'a: 'e, N>(
    step: &'e Step,
    context_nodes: &[N],
    ctx: &'e Context<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'e,
{
    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for &node in context_nodes {
        let candidates = step.candidates(node, ctx)?;
        for found in apply_predicates(candidates, &step.predicates, ctx).await? {
            if seen.insert(found) {
                results.push(found);
            }
        }
    }
    Ok(results)
}

async fn apply_predicates<'e, 'a: 'e, N>(
    nodes: Vec<N>,
    predicates: &'e [Predicate],
    ctx: &'e Context<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'e,
{
    let mut current = nodes;
    for predicate in predicates {
        let list: Rc<[N]> = current.into();
        let mut kept = Vec::with_capacity(list.len());
        for (i, &node) in list.iter().enumerate() {
            let predicate_ctx = ctx.derive(node, i, Rc::clone(&list));
            let value = predicate.expression().evaluate_async(&predicate_ctx).await?;
            if keeps(&value, i) {
                kept.push(node);
            }
        }
        current = kept;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};
    use crate::functions::{Function, FunctionTable};
    use crate::parser::parse_expression;
    use futures::executor::block_on;

    fn lookup_table<'a>() -> FunctionTable<'a, MockNode<'a>> {
        FunctionTable::new()
            .with(
                "lookup",
                Function::deferred(|invocation: Invocation<MockNode<'a>>| async move {
                    let key = invocation.args.first().map(|v| v.to_string()).unwrap_or_default();
                    match key.as_str() {
                        "p1" => Ok(Value::from("first")),
                        _ => Err(XPathError::function("lookup", format!("no entry for '{}'", key))),
                    }
                }),
            )
            .with("twice", Function::immediate(|invocation: Invocation<MockNode<'a>>| {
                Ok(Value::Number(invocation.args[0].to_number() * 2.0))
            }))
    }

    #[test]
    fn test_deferred_function_resolves_through_async_path() {
        let tree = create_test_tree();
        let mut ctx = Context::new(tree.node(1));
        ctx.register_function_table("db", lookup_table());

        let expr = parse_expression("concat(db:lookup(para/@id), '-', db:twice(2))").unwrap();
        assert_eq!(block_on(expr.evaluate_async(&ctx)), Ok(Value::from("first-4")));
        assert_eq!(
            expr.evaluate(&ctx),
            Err(XPathError::RequiresAsync {
                function: "lookup".into()
            })
        );
    }

    #[test]
    fn test_deferred_errors_arrive_through_the_future() {
        let tree = create_test_tree();
        let mut ctx = Context::new(tree.node(1));
        ctx.register_function_table("db", lookup_table());
        let expr = parse_expression("para[db:lookup(@id) = 'first']").unwrap();
        // the second para has no @id, so its lookup fails
        assert_eq!(
            block_on(expr.evaluate_async(&ctx)),
            Err(XPathError::function("lookup", "no entry for ''"))
        );
    }

    #[test]
    fn test_async_matches_sync_for_plain_expressions() {
        let tree = create_test_tree();
        let ctx = Context::new(tree.node(1));
        for text in [
            "para[2]",
            "count(//node()) + 1",
            "ext-if(div, //para[last()], 'none')",
            "(para | div)[@id or . = 'World']",
            "false() and foo:bar()",
            "$missing/x",
        ] {
            let expr = parse_expression(text).unwrap();
            assert_eq!(block_on(expr.evaluate_async(&ctx)), expr.evaluate(&ctx), "{}", text);
        }
    }

    #[test]
    fn test_text_entry_point() {
        let tree = create_test_tree();
        let mut ctx = Context::new(tree.node(2));
        ctx.register_fallback_function_invoker(Function::deferred(|invocation| async move {
            Ok(Value::from(invocation.name))
        }));
        assert_eq!(
            block_on(evaluate_async("any:thing()", &ctx)),
            Ok(Value::from("any:thing"))
        );
    }
}
