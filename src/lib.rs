//! Facade over the `sprig-xpath1` expression engine.
//!
//! Hosts implement [`DataSourceNode`] for their tree, then compile and
//! evaluate expressions through [`evaluate`], [`select`] or
//! [`evaluate_async`] when deferred extension functions are registered.

pub use sprig_xpath1::*;

pub mod prelude {
    pub use sprig_xpath1::{
        Context, ContextOptions, DataSourceNode, Expression, Function, FunctionTable, Invocation,
        NodeType, QName, Value, XPathError, evaluate, evaluate_async, select,
    };
}
