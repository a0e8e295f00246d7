//! An XPath 1.0 compiler and evaluator over host-supplied node trees.
//!
//! Expressions are lexed with a regex table, parsed by a precedence-driven
//! shift-reduce engine and cached by source text. Evaluation walks the AST
//! against any tree implementing [`DataSourceNode`].

pub mod ast;
pub mod axes;
pub mod cache;
pub mod context;
pub mod datasource;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod functions;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, Predicate, Step};
pub use cache::ExpressionCache;
pub use context::{Context, ContextOptions};
pub use datasource::{DataSourceNode, NodeType, QName};
pub use deferred::evaluate_async;
pub use engine::{compile, evaluate, select};
pub use functions::{Builtin, Function, FunctionRegistry, FunctionTable, Invocation};
pub use value::Value;

// Re-export test utilities for integration testing in downstream crates
pub use datasource::tests;
pub use error::XPathError;
pub use parser::{parse_expression, parse_with_engine};
