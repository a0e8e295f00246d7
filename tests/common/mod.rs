#![allow(dead_code)]

pub mod xml;

pub use xml::{XmlDocument, XmlNode};

use sprig::{Context, Value};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The string value of every node in a node-set, or of a scalar.
pub fn strings<'a>(value: &Value<XmlNode<'a, 'a>>) -> Vec<String> {
    match value {
        Value::NodeSet(nodes) => nodes
            .iter()
            .map(|n| sprig::value::node_string_value(*n))
            .collect(),
        other => vec![other.to_string()],
    }
}

/// Element names of a node-set, in result order.
pub fn names<'a>(value: &Value<XmlNode<'a, 'a>>) -> Vec<String> {
    use sprig::DataSourceNode;
    match value {
        Value::NodeSet(nodes) => nodes
            .iter()
            .filter_map(|n| n.name())
            .map(|q| q.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

pub fn eval<'a>(text: &str, ctx: &Context<'a, '_, XmlNode<'a, 'a>>) -> Value<XmlNode<'a, 'a>> {
    match sprig::evaluate(text, ctx) {
        Ok(value) => value,
        Err(e) => panic!("'{}' failed to evaluate: {}", text, e),
    }
}

/// The first node `path` selects from `from`.
pub fn find<'a>(from: XmlNode<'a, 'a>, path: &str) -> XmlNode<'a, 'a> {
    match sprig::select(path, from) {
        Ok(Value::NodeSet(nodes)) if !nodes.is_empty() => nodes[0],
        other => panic!("'{}' selected nothing: {:?}", path, other),
    }
}
