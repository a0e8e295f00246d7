//! Contains pure functions for collecting nodes along each XPath axis.
//!
//! Every collector yields one context node's candidates in axis order:
//! document order for forward axes, nearest-first for reverse axes.

use crate::ast::{Axis, NodeTest};
use crate::context::ContextOptions;
use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;

pub fn collect_self_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    results.push(node);
}

pub fn collect_child_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    results.extend(node.children());
}

pub fn collect_attribute_nodes<'a, N: DataSourceNode<'a>>(
    node: N,
    ignore_valueless: bool,
    results: &mut Vec<N>,
) {
    results.extend(
        node.attributes()
            .filter(|attr| !ignore_valueless || attr.node_value().is_some_and(|v| !v.is_empty())),
    );
}

/// Pre-order walk below `node`.
pub fn collect_descendant_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let mut stack: Vec<N> = node.children().collect();
    stack.reverse();
    while let Some(current) = stack.pop() {
        results.push(current);
        let mut children: Vec<N> = current.children().collect();
        children.reverse();
        stack.extend(children);
    }
}

pub fn collect_descendant_or_self_nodes<'a, N: DataSourceNode<'a>>(
    node: N,
    results: &mut Vec<N>,
) {
    results.push(node);
    collect_descendant_nodes(node, results);
}

pub fn collect_parent_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    results.extend(node.parent());
}

pub fn collect_ancestor_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let mut current = node.parent();
    while let Some(p) = current {
        results.push(p);
        current = p.parent();
    }
}

pub fn collect_ancestor_or_self_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    results.push(node);
    collect_ancestor_nodes(node, results);
}

pub fn collect_following_sibling_nodes<'a, N: DataSourceNode<'a>>(
    node: N,
    results: &mut Vec<N>,
) {
    let mut current = node.next_sibling();
    while let Some(sibling) = current {
        results.push(sibling);
        current = sibling.next_sibling();
    }
}

pub fn collect_preceding_sibling_nodes<'a, N: DataSourceNode<'a>>(
    node: N,
    results: &mut Vec<N>,
) {
    let mut current = node.previous_sibling();
    while let Some(sibling) = current {
        results.push(sibling);
        current = sibling.previous_sibling();
    }
}

/// Everything after `node` in document order, minus its descendants. An
/// attribute starts with its owner element's descendants.
pub fn collect_following_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let mut current = node;
    if node.node_type() == NodeType::Attribute {
        match node.parent() {
            Some(owner) => {
                collect_descendant_nodes(owner, results);
                current = owner;
            }
            None => return,
        }
    }
    let mut level = Some(current);
    while let Some(c) = level {
        let mut sibling = c.next_sibling();
        while let Some(s) = sibling {
            collect_descendant_or_self_nodes(s, results);
            sibling = s.next_sibling();
        }
        level = c.parent();
    }
}

/// Everything before `node` in document order, minus its ancestors, nearest first.
pub fn collect_preceding_nodes<'a, N: DataSourceNode<'a>>(node: N, results: &mut Vec<N>) {
    let mut level = Some(node);
    while let Some(c) = level {
        let mut sibling = c.previous_sibling();
        while let Some(s) = sibling {
            let mut subtree = Vec::new();
            collect_descendant_or_self_nodes(s, &mut subtree);
            results.extend(subtree.into_iter().rev());
            sibling = s.previous_sibling();
        }
        level = c.parent();
    }
}

/// Collects the candidates of one context node along `axis`.
pub fn collect_axis_nodes<'a, N: DataSourceNode<'a>>(
    axis: Axis,
    node: N,
    options: &ContextOptions,
) -> Result<Vec<N>, XPathError> {
    let mut results = Vec::new();
    match axis {
        Axis::Ancestor => collect_ancestor_nodes(node, &mut results),
        Axis::AncestorOrSelf => collect_ancestor_or_self_nodes(node, &mut results),
        Axis::Attribute => {
            collect_attribute_nodes(node, options.ignore_valueless_attributes, &mut results)
        }
        Axis::Child => collect_child_nodes(node, &mut results),
        Axis::Descendant => collect_descendant_nodes(node, &mut results),
        Axis::DescendantOrSelf => collect_descendant_or_self_nodes(node, &mut results),
        Axis::Following => collect_following_nodes(node, &mut results),
        Axis::FollowingSibling => collect_following_sibling_nodes(node, &mut results),
        Axis::Namespace => return Err(XPathError::UnsupportedAxis(Axis::Namespace)),
        Axis::Parent => collect_parent_nodes(node, &mut results),
        Axis::Preceding => collect_preceding_nodes(node, &mut results),
        Axis::PrecedingSibling => collect_preceding_sibling_nodes(node, &mut results),
        Axis::SelfAxis => collect_self_nodes(node, &mut results),
    }
    Ok(results)
}

/// Answers a descendant step with an exact-name or `*` test through the
/// host's tag-name lookup. `None` when the step does not qualify.
pub fn collect_descendants_by_name<'a, N: DataSourceNode<'a>>(
    axis: Axis,
    test: &NodeTest,
    node: N,
    options: &ContextOptions,
) -> Option<Vec<N>> {
    if options.case_insensitive_names {
        return None;
    }
    let name = match test {
        NodeTest::NameExact(name) => name.as_str(),
        NodeTest::ElementOrAttribute => "*",
        _ => return None,
    };
    let mut results = Vec::new();
    match axis {
        Axis::Descendant => {}
        Axis::DescendantOrSelf => {
            if matches_test(node, test, axis, options) {
                results.push(node);
            }
        }
        _ => return None,
    }
    results.extend(node.elements_by_tag_name(name));
    Some(results)
}

/// The kind of node a name test selects on `axis`.
fn principal_type(axis: Axis) -> NodeType {
    match axis {
        Axis::Attribute => NodeType::Attribute,
        _ => NodeType::Element,
    }
}

/// Applies a node test to a candidate found on `axis`.
pub fn matches_test<'a, N: DataSourceNode<'a>>(
    node: N,
    test: &NodeTest,
    axis: Axis,
    options: &ContextOptions,
) -> bool {
    let ignore_case = options.case_insensitive_names;
    match test {
        NodeTest::Any => true,
        NodeTest::Text => node.node_type() == NodeType::Text,
        NodeTest::Comment => node.node_type() == NodeType::Comment,
        NodeTest::ProcessingInstruction(target) => {
            node.node_type() == NodeType::ProcessingInstruction
                && target.as_deref().is_none_or(|target| {
                    node.name().is_some_and(|q| q.local_part == target)
                })
        }
        NodeTest::ElementOrAttribute => node.node_type() == principal_type(axis),
        NodeTest::NamePrefixed(prefix) => {
            node.node_type() == principal_type(axis)
                && node.name().and_then(|q| q.prefix).is_some_and(|p| {
                    if ignore_case {
                        p.eq_ignore_ascii_case(prefix)
                    } else {
                        p == prefix
                    }
                })
        }
        NodeTest::NameExact(name) => {
            node.node_type() == principal_type(axis)
                && node.name().is_some_and(|q| q.is(name, ignore_case))
        }
    }
}
