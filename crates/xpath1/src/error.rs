use crate::ast::Axis;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("Unrecognised input at '{remaining}' (parse stack: [{stack}])")]
    Lex { remaining: String, stack: String },

    #[error("Incomplete expression, unconsumed input '{remaining}' (parse stack: [{stack}])")]
    Parse { remaining: String, stack: String },

    #[error("XPath syntax error in '{expression}': {message}")]
    Syntax { expression: String, message: String },

    #[error("The {0} axis is not supported")]
    UnsupportedAxis(Axis),

    #[error("Function '{function}' expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: &'static str,
        got: usize,
    },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Variable '{0}' not found")]
    UnknownVariable(String),

    #[error("Function '{function}' can only be evaluated asynchronously")]
    RequiresAsync { function: String },

    #[error("Function '{function}' error: {message}")]
    FunctionError { function: String, message: String },

    #[error("Position {position} is outside a node list of size {size}")]
    PositionOutOfRange { position: usize, size: usize },
}

impl XPathError {
    pub fn syntax(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Syntax {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FunctionError {
            function: function.into(),
            message: message.into(),
        }
    }

    pub(crate) fn arity(function: &str, expected: &'static str, got: usize) -> Self {
        Self::Arity {
            function: function.to_string(),
            expected,
            got,
        }
    }

    /// True for errors raised while compiling, before any evaluation ran.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            XPathError::Lex { .. } | XPathError::Parse { .. } | XPathError::Syntax { .. }
        )
    }
}
