//! Defines the registry and built-in implementations for XPath functions.
//!
//! Calls resolve in a fixed order: a built-in with the exact name, then the
//! table registered for the name's prefix, then the fallback invoker. A call
//! nothing resolves evaluates to `false`.

use crate::context::Context;
use crate::datasource::DataSourceNode;
use crate::error::XPathError;
use crate::value::{Value, merge_nodes, node_string_value, number_to_string, string_to_number};
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Everything an extension function receives for one call.
#[derive(Debug, Clone)]
pub struct Invocation<N> {
    /// The local name for prefixed table functions, the full name for the fallback.
    pub name: String,
    pub args: Vec<Value<N>>,
    pub node: N,
    /// 0-based position of `node` in the context node list.
    pub position: usize,
    pub size: usize,
}

impl<N> Invocation<N> {
    pub fn new<'a>(name: impl Into<String>, args: Vec<Value<N>>, ctx: &Context<'a, '_, N>) -> Self
    where
        N: DataSourceNode<'a>,
    {
        Self {
            name: name.into(),
            args,
            node: ctx.node(),
            position: ctx.position(),
            size: ctx.size(),
        }
    }
}

pub type ImmediateFn<'a, N> = dyn Fn(Invocation<N>) -> Result<Value<N>, XPathError> + 'a;
pub type DeferredFn<'a, N> =
    dyn Fn(Invocation<N>) -> LocalBoxFuture<'a, Result<Value<N>, XPathError>> + 'a;

/// A host-supplied function. `Deferred` functions may suspend and can only be
/// reached through the asynchronous evaluation path.
pub enum Function<'a, N> {
    Immediate(Rc<ImmediateFn<'a, N>>),
    Deferred(Rc<DeferredFn<'a, N>>),
}

impl<'a, N> Clone for Function<'a, N> {
    fn clone(&self) -> Self {
        match self {
            Function::Immediate(f) => Function::Immediate(Rc::clone(f)),
            Function::Deferred(f) => Function::Deferred(Rc::clone(f)),
        }
    }
}

impl<N> fmt::Debug for Function<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Immediate(_) => f.write_str("Function::Immediate"),
            Function::Deferred(_) => f.write_str("Function::Deferred"),
        }
    }
}

impl<'a, N: 'a> Function<'a, N> {
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(Invocation<N>) -> Result<Value<N>, XPathError> + 'a,
    {
        Function::Immediate(Rc::new(f))
    }

    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(Invocation<N>) -> Fut + 'a,
        Fut: Future<Output = Result<Value<N>, XPathError>> + 'a,
    {
        Function::Deferred(Rc::new(move |invocation| f(invocation).boxed_local()))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Function::Deferred(_))
    }

    /// Calls the function synchronously. Deferred functions fail with
    /// [`XPathError::RequiresAsync`].
    pub fn call(&self, invocation: Invocation<N>) -> Result<Value<N>, XPathError> {
        match self {
            Function::Immediate(f) => f(invocation),
            Function::Deferred(_) => Err(XPathError::RequiresAsync {
                function: invocation.name,
            }),
        }
    }

    pub fn call_async(
        &self,
        invocation: Invocation<N>,
    ) -> LocalBoxFuture<'a, Result<Value<N>, XPathError>> {
        match self {
            Function::Immediate(f) => future::ready(f(invocation)).boxed_local(),
            Function::Deferred(f) => f(invocation),
        }
    }
}

/// Functions registered under one prefix, keyed by local name.
pub struct FunctionTable<'a, N> {
    functions: HashMap<String, Function<'a, N>>,
}

impl<N> Default for FunctionTable<'_, N> {
    fn default() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }
}

impl<N> Clone for FunctionTable<'_, N> {
    fn clone(&self) -> Self {
        Self {
            functions: self.functions.clone(),
        }
    }
}

impl<N> fmt::Debug for FunctionTable<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.functions.iter()).finish()
    }
}

impl<'a, N> FunctionTable<'a, N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, function: Function<'a, N>) {
        self.functions.insert(name.into(), function);
    }

    pub fn with(mut self, name: impl Into<String>, function: Function<'a, N>) -> Self {
        self.insert(name, function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Function<'a, N>> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Prefix tables plus the fallback invoker, shared by a context and the
/// contexts derived from it.
pub struct FunctionRegistry<'a, N> {
    tables: HashMap<String, FunctionTable<'a, N>>,
    fallback: Option<Function<'a, N>>,
}

impl<N> Default for FunctionRegistry<'_, N> {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            fallback: None,
        }
    }
}

impl<N> Clone for FunctionRegistry<'_, N> {
    fn clone(&self) -> Self {
        Self {
            tables: self.tables.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<N> fmt::Debug for FunctionRegistry<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("tables", &self.tables)
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// What a function name resolved to.
#[derive(Debug, Clone)]
pub enum Resolved<'a, N> {
    Builtin(Builtin),
    Extension {
        function: Function<'a, N>,
        name: String,
    },
    Unknown,
}

impl<'a, N> FunctionRegistry<'a, N> {
    pub fn register_table(&mut self, prefix: impl Into<String>, table: FunctionTable<'a, N>) {
        self.tables.insert(prefix.into(), table);
    }

    pub fn set_fallback(&mut self, function: Function<'a, N>) {
        self.fallback = Some(function);
    }

    pub fn table(&self, prefix: &str) -> Option<&FunctionTable<'a, N>> {
        self.tables.get(prefix)
    }

    pub fn fallback(&self) -> Option<&Function<'a, N>> {
        self.fallback.as_ref()
    }

    pub fn resolve(&self, name: &str) -> Resolved<'a, N> {
        if let Some(builtin) = Builtin::from_name(name) {
            return Resolved::Builtin(builtin);
        }
        if let Some((prefix, local)) = name.split_once(':') {
            if let Some(function) = self.table(prefix).and_then(|t| t.get(local)) {
                return Resolved::Extension {
                    function: function.clone(),
                    name: local.to_string(),
                };
            }
        }
        match &self.fallback {
            Some(function) => {
                log::debug!("'{}' resolved to the fallback invoker", name);
                Resolved::Extension {
                    function: function.clone(),
                    name: name.to_string(),
                }
            }
            None => {
                log::debug!("unknown function '{}' evaluates to false", name);
                Resolved::Unknown
            }
        }
    }
}

/// The built-in function library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Node-set
    Last,
    Position,
    Count,
    Id,
    Name,
    LocalName,
    // String
    String,
    Concat,
    StartsWith,
    Contains,
    SubstringBefore,
    SubstringAfter,
    Substring,
    StringLength,
    NormalizeSpace,
    Translate,
    // Boolean
    Boolean,
    Not,
    True,
    False,
    Lang,
    // Number
    Number,
    Sum,
    Floor,
    Ceiling,
    Round,
    // Extensions
    Join,
    If,
    Cardinal,
}

const BUILTIN_NAMES: [(&str, Builtin); 29] = [
    ("last", Builtin::Last),
    ("position", Builtin::Position),
    ("count", Builtin::Count),
    ("id", Builtin::Id),
    ("name", Builtin::Name),
    ("local-name", Builtin::LocalName),
    ("string", Builtin::String),
    ("concat", Builtin::Concat),
    ("starts-with", Builtin::StartsWith),
    ("contains", Builtin::Contains),
    ("substring-before", Builtin::SubstringBefore),
    ("substring-after", Builtin::SubstringAfter),
    ("substring", Builtin::Substring),
    ("string-length", Builtin::StringLength),
    ("normalize-space", Builtin::NormalizeSpace),
    ("translate", Builtin::Translate),
    ("boolean", Builtin::Boolean),
    ("not", Builtin::Not),
    ("true", Builtin::True),
    ("false", Builtin::False),
    ("lang", Builtin::Lang),
    ("number", Builtin::Number),
    ("sum", Builtin::Sum),
    ("floor", Builtin::Floor),
    ("ceiling", Builtin::Ceiling),
    ("round", Builtin::Round),
    ("ext-join", Builtin::Join),
    ("ext-if", Builtin::If),
    ("ext-cardinal", Builtin::Cardinal),
];

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTIN_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, builtin)| *builtin)
    }

    pub fn name(self) -> &'static str {
        BUILTIN_NAMES
            .iter()
            .find(|(_, b)| *b == self)
            .map_or("", |(n, _)| n)
    }

    /// `(min, max, description)` of accepted argument counts.
    fn arity(self) -> (usize, Option<usize>, &'static str) {
        use Builtin::*;
        match self {
            Last | Position | True | False => (0, Some(0), "0"),
            Count | Id | Boolean | Not | Lang | Sum | Floor | Ceiling | Round | Cardinal => {
                (1, Some(1), "1")
            }
            Name | LocalName | String | StringLength | NormalizeSpace | Number => {
                (0, Some(1), "0 or 1")
            }
            Concat => (2, None, "at least 2"),
            StartsWith | Contains | SubstringBefore | SubstringAfter | Join => (2, Some(2), "2"),
            Substring => (2, Some(3), "2 or 3"),
            Translate | If => (3, Some(3), "3"),
        }
    }

    pub fn check_arity(self, got: usize) -> Result<(), XPathError> {
        let (min, max, expected) = self.arity();
        if got < min || max.is_some_and(|max| got > max) {
            return Err(XPathError::arity(self.name(), expected, got));
        }
        Ok(())
    }

    /// Applies the function to already evaluated arguments.
    pub fn call<'a, N: DataSourceNode<'a>>(
        self,
        args: Vec<Value<N>>,
        ctx: &Context<'a, '_, N>,
    ) -> Result<Value<N>, XPathError> {
        self.check_arity(args.len())?;
        let mut args = Args(args.into_iter());
        let value = match self {
            Builtin::Last => Value::Number(ctx.size() as f64),
            Builtin::Position => Value::Number((ctx.position() + 1) as f64),
            Builtin::Count => Value::Number(args.next().into_nodes("count()")?.len() as f64),
            Builtin::Id => Value::NodeSet(id(args.next(), ctx.node())),
            Builtin::Name | Builtin::LocalName => {
                let node = match args.optional() {
                    None => Some(ctx.node()),
                    Some(value) => value.into_nodes(self.name())?.first().copied(),
                };
                let name = node
                    .and_then(|n| n.name())
                    .map(|q| match self {
                        Builtin::Name => q.to_string(),
                        _ => q.local_part.to_string(),
                    })
                    .unwrap_or_default();
                Value::String(name)
            }
            Builtin::String => Value::String(args.string_or_context(ctx.node())),
            Builtin::Concat => Value::String(args.0.map(|v| v.to_string()).collect()),
            Builtin::StartsWith => {
                let (s, prefix) = (args.string(), args.string());
                Value::Boolean(s.starts_with(&prefix))
            }
            Builtin::Contains => {
                let (s, needle) = (args.string(), args.string());
                Value::Boolean(s.contains(&needle))
            }
            Builtin::SubstringBefore => {
                let (s, needle) = (args.string(), args.string());
                Value::String(s.find(&needle).map_or("", |i| &s[..i]).to_string())
            }
            Builtin::SubstringAfter => {
                let (s, needle) = (args.string(), args.string());
                Value::String(
                    s.find(&needle)
                        .map_or("", |i| &s[i + needle.len()..])
                        .to_string(),
                )
            }
            Builtin::Substring => {
                let s = args.string();
                let start = args.next().to_number();
                let length = args.optional().map(|v| v.to_number());
                Value::String(substring(&s, start, length))
            }
            Builtin::StringLength => {
                Value::Number(args.string_or_context(ctx.node()).chars().count() as f64)
            }
            Builtin::NormalizeSpace => Value::String(
                args.string_or_context(ctx.node())
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Builtin::Translate => {
                let (s, from, to) = (args.string(), args.string(), args.string());
                Value::String(translate(&s, &from, &to))
            }
            Builtin::Boolean => Value::Boolean(args.next().to_bool()),
            Builtin::Not => Value::Boolean(!args.next().to_bool()),
            Builtin::True => Value::Boolean(true),
            Builtin::False => Value::Boolean(false),
            Builtin::Lang => Value::Boolean(lang(&args.string(), ctx.node())),
            Builtin::Number => Value::Number(match args.optional() {
                Some(value) => value.to_number(),
                None => string_to_number(&node_string_value(ctx.node())),
            }),
            Builtin::Sum => Value::Number(
                args.next()
                    .into_nodes("sum()")?
                    .into_iter()
                    .map(|node| string_to_number(&node_string_value(node)))
                    .sum(),
            ),
            Builtin::Floor => Value::Number(args.next().to_number().floor()),
            Builtin::Ceiling => Value::Number(args.next().to_number().ceil()),
            Builtin::Round => Value::Number(round(args.next().to_number())),
            Builtin::Join => {
                let (value, separator) = (args.next(), args.string());
                Value::String(join(value, &separator))
            }
            Builtin::If => {
                let condition = args.next().to_bool();
                let (then, otherwise) = (args.next(), args.next());
                if condition { then } else { otherwise }
            }
            Builtin::Cardinal => {
                let count = cardinal(args.next().to_number())?;
                Value::NodeSet(vec![ctx.node(); count])
            }
        };
        Ok(value)
    }
}

/// Positional access to arguments whose count was already checked.
struct Args<N>(std::vec::IntoIter<Value<N>>);

impl<'a, N: DataSourceNode<'a>> Args<N> {
    fn next(&mut self) -> Value<N> {
        self.0.next().unwrap_or(Value::String(String::new()))
    }

    fn optional(&mut self) -> Option<Value<N>> {
        self.0.next()
    }

    fn string(&mut self) -> String {
        self.next().to_string()
    }

    fn string_or_context(&mut self, node: N) -> String {
        match self.optional() {
            Some(value) => value.to_string(),
            None => node_string_value(node),
        }
    }
}

/// XPath rounding: halves round towards positive infinity.
pub fn round(n: f64) -> f64 {
    if n.is_finite() { (n + 0.5).floor() } else { n }
}

/// `substring()` over characters with XPath's 1-based, rounded bounds.
fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as f64;
    let first = round(start);
    let end = length.map_or(len + 1.0, |l| first + round(l));
    if first.is_nan() || end.is_nan() {
        return String::new();
    }
    let from = (first - 1.0).max(0.0);
    let to = (end - 1.0).min(len).max(0.0);
    if from >= to {
        return String::new();
    }
    chars[from as usize..to as usize].iter().collect()
}

/// Upper bound on the repeat count `ext-cardinal` accepts.
pub const MAX_CARDINAL: usize = 1 << 20;

/// The repeat count for `ext-cardinal(n)`: `round(n)`, zero for NaN and
/// non-positive values. Infinite or oversized counts are errors.
fn cardinal(n: f64) -> Result<usize, XPathError> {
    let count = round(n);
    if count.is_nan() || count <= 0.0 {
        return Ok(0);
    }
    if count > MAX_CARDINAL as f64 {
        return Err(XPathError::function(
            "ext-cardinal",
            format!("count {} exceeds the limit of {}", number_to_string(count), MAX_CARDINAL),
        ));
    }
    Ok(count as usize)
}

fn translate(s: &str, from: &str, to: &str) -> String {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect()
}

fn id<'a, N: DataSourceNode<'a>>(value: Value<N>, context: N) -> Vec<N> {
    let ids: Vec<String> = match &value {
        Value::NodeSet(nodes) => nodes.iter().map(|n| node_string_value(*n)).collect(),
        other => vec![other.to_string()],
    };
    let document = context.owner_document();
    let found = ids
        .iter()
        .flat_map(|s| s.split_whitespace())
        .filter_map(|id| document.element_by_id(id))
        .collect();
    merge_nodes(found, vec![])
}

/// True if the nearest `xml:lang` on the node or its ancestors is `target`
/// or a sub-language of it.
fn lang<'a, N: DataSourceNode<'a>>(target: &str, node: N) -> bool {
    let target = target.to_lowercase();
    let mut current = Some(node);
    while let Some(n) = current {
        let declared = n
            .attributes()
            .find(|attr| {
                attr.name()
                    .is_some_and(|q| q.prefix == Some("xml") && q.local_part == "lang")
            })
            .and_then(|attr| attr.node_value());
        if let Some(lang) = declared {
            let lang = lang.to_lowercase();
            return lang == target || lang.starts_with(&format!("{}-", target));
        }
        current = n.parent();
    }
    false
}

fn join<'a, N: DataSourceNode<'a>>(value: Value<N>, separator: &str) -> String {
    match value {
        Value::NodeSet(nodes) => nodes
            .into_iter()
            .map(node_string_value)
            .collect::<Vec<_>>()
            .join(separator),
        other => other.to_string(),
    }
}
