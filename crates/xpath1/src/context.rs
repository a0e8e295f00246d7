//! The evaluation context: current node, position, variable scope and the
//! registered extension functions.

use crate::datasource::DataSourceNode;
use crate::error::XPathError;
use crate::functions::{Function, FunctionRegistry, FunctionTable};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Evaluation switches a host can load from its own configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextOptions {
    /// Compare element and attribute names without regard to case.
    #[serde(default)]
    pub case_insensitive_names: bool,
    /// Drop attributes whose value is empty from the attribute axis.
    #[serde(default)]
    pub ignore_valueless_attributes: bool,
    /// Treat references to unbound variables as errors.
    #[serde(default)]
    pub strict: bool,
}

/// A container for all state needed during expression evaluation.
/// `'a` is the lifetime of the underlying data source.
/// `'c` is the lifetime of the parent context a derived context points to.
///
/// Stepping to another node never mutates a context; the evaluator derives a
/// child that shares the function registry and links back for variable lookup.
pub struct Context<'a, 'c, N: DataSourceNode<'a>> {
    node: N,
    position: usize,
    node_list: Rc<[N]>,
    variables: HashMap<String, Value<N>>,
    parent: Option<&'c Context<'a, 'c, N>>,
    options: ContextOptions,
    functions: Rc<FunctionRegistry<'a, N>>,
}

impl<'a, 'c, N: DataSourceNode<'a>> Context<'a, 'c, N> {
    pub fn new(node: N) -> Self {
        Self::with_options(node, ContextOptions::default())
    }

    pub fn with_options(node: N, options: ContextOptions) -> Self {
        Self {
            node,
            position: 0,
            node_list: Rc::from(vec![node]),
            variables: HashMap::new(),
            parent: None,
            options,
            functions: Rc::new(FunctionRegistry::default()),
        }
    }

    /// A root context positioned at `position` (0-based) within `node_list`.
    pub fn at(node: N, position: usize, node_list: impl Into<Rc<[N]>>) -> Self {
        Self {
            position,
            node_list: node_list.into(),
            ..Self::new(node)
        }
    }

    /// A child context for another node. It has its own variable scope and
    /// falls back to this context's variables.
    pub fn derive(&self, node: N, position: usize, node_list: Rc<[N]>) -> Context<'a, '_, N> {
        Context {
            node,
            position,
            node_list,
            variables: HashMap::new(),
            parent: Some(self),
            options: self.options,
            functions: Rc::clone(&self.functions),
        }
    }

    pub fn node(&self) -> N {
        self.node
    }

    /// 0-based position of the context node in its node list.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.node_list.len()
    }

    pub fn node_list(&self) -> &Rc<[N]> {
        &self.node_list
    }

    pub fn parent(&self) -> Option<&Context<'a, 'c, N>> {
        self.parent
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ContextOptions {
        &mut self.options
    }

    pub fn functions(&self) -> &FunctionRegistry<'a, N> {
        &self.functions
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value<N>>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Looks `name` up in this scope, then in each parent in turn.
    pub fn get_variable(&self, name: &str) -> Option<&Value<N>> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            if let Some(value) = ctx.variables.get(name) {
                return Some(value);
            }
            scope = ctx.parent;
        }
        None
    }

    /// The value of `$name` as the evaluator sees it: unbound variables are
    /// the empty string unless the context is strict.
    pub fn resolve_variable(&self, name: &str) -> Result<Value<N>, XPathError> {
        match self.get_variable(name) {
            Some(value) => Ok(value.clone()),
            None if self.options.strict => Err(XPathError::UnknownVariable(name.to_string())),
            None => {
                log::debug!("variable '${}' is not bound, using ''", name);
                Ok(Value::String(String::new()))
            }
        }
    }

    /// Moves to another node of the same node list, keeping the variable scope.
    pub fn set_node(&mut self, position: usize) -> Result<(), XPathError> {
        let node = *self
            .node_list
            .get(position)
            .ok_or(XPathError::PositionOutOfRange {
                position,
                size: self.node_list.len(),
            })?;
        self.node = node;
        self.position = position;
        Ok(())
    }

    /// Makes `prefix:name(...)` calls resolve against `table`.
    pub fn register_function_table(&mut self, prefix: impl Into<String>, table: FunctionTable<'a, N>) {
        Rc::make_mut(&mut self.functions).register_table(prefix, table);
    }

    /// Installs the function invoked for calls nothing else resolves.
    pub fn register_fallback_function_invoker(&mut self, function: Function<'a, N>) {
        Rc::make_mut(&mut self.functions).set_fallback(function);
    }
}

impl<'a, N: DataSourceNode<'a>> fmt::Debug for Context<'a, '_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("node", &self.node)
            .field("position", &self.position)
            .field("size", &self.node_list.len())
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("has_parent", &self.parent.is_some())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::create_test_tree;

    #[test]
    fn test_derived_context_sees_parent_variables() {
        let tree = create_test_tree();
        let mut root = Context::new(tree.document());
        root.set_variable("greeting", "hi");
        root.set_variable("shadowed", 1.0);

        let mut child = root.derive(tree.node(1), 0, Rc::from(vec![tree.node(1)]));
        child.set_variable("shadowed", 2.0);
        assert_eq!(child.get_variable("greeting"), Some(&Value::String("hi".into())));
        assert_eq!(child.get_variable("shadowed"), Some(&Value::Number(2.0)));
        assert_eq!(root.get_variable("shadowed"), Some(&Value::Number(1.0)));
        assert!(child.get_variable("missing").is_none());
    }

    #[test]
    fn test_unbound_variable_modes() {
        let tree = create_test_tree();
        let lenient = Context::new(tree.document());
        assert_eq!(lenient.resolve_variable("nope").unwrap(), Value::String(String::new()));

        let strict = Context::with_options(
            tree.document(),
            ContextOptions {
                strict: true,
                ..Default::default()
            },
        );
        assert_eq!(
            strict.resolve_variable("nope"),
            Err(XPathError::UnknownVariable("nope".into()))
        );
    }

    #[test]
    fn test_set_node_keeps_scope() {
        let tree = create_test_tree();
        let list = vec![tree.node(2), tree.node(7), tree.node(9)];
        let mut ctx = Context::at(tree.node(2), 0, list);
        ctx.set_variable("v", true);
        ctx.set_node(2).unwrap();
        assert_eq!(ctx.node(), tree.node(9));
        assert_eq!((ctx.position(), ctx.size()), (2, 3));
        assert!(ctx.get_variable("v").is_some());
        assert_eq!(
            ctx.set_node(3),
            Err(XPathError::PositionOutOfRange { position: 3, size: 3 })
        );
    }

    #[test]
    fn test_registration_is_copy_on_write() {
        let tree = create_test_tree();
        let mut first = Context::new(tree.document());
        first.register_function_table("my", FunctionTable::new());
        let mut second = first.derive(tree.node(1), 0, Rc::from(vec![tree.node(1)]));
        second.register_fallback_function_invoker(Function::immediate(|_| Ok(Value::Boolean(true))));
        assert!(second.functions().fallback().is_some());
        assert!(first.functions().fallback().is_none());
        assert!(second.functions().table("my").is_some());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ContextOptions =
            serde_json::from_str(r#"{ "caseInsensitiveNames": true }"#).unwrap();
        assert!(options.case_insensitive_names);
        assert!(!options.strict);
        let round_trip: ContextOptions =
            serde_json::from_str(&serde_json::to_string(&options).unwrap()).unwrap();
        assert_eq!(round_trip, options);
    }
}
