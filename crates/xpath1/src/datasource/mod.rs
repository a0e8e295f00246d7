//! Defines the contract for the externally supplied, read-only node tree that
//! expressions are evaluated against.
use std::fmt;
use std::hash::Hash;

/// A qualified name, consisting of an optional prefix and a local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
}

impl<'a> QName<'a> {
    pub fn new(prefix: Option<&'a str>, local_part: &'a str) -> Self {
        Self { prefix, local_part }
    }

    /// Compares against a lexical name such as `foo` or `xsl:if` without allocating.
    pub fn is(&self, name: &str, ignore_case: bool) -> bool {
        let eq = |a: &str, b: &str| {
            if ignore_case {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        };
        match self.prefix {
            Some(prefix) => name
                .split_once(':')
                .is_some_and(|(p, local)| eq(p, prefix) && eq(local, self.local_part)),
            None => eq(name, self.local_part),
        }
    }
}

impl fmt::Display for QName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local_part),
            None => f.write_str(self.local_part),
        }
    }
}

/// The kind of a host node. Discriminants follow the DOM `nodeType` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
}

impl NodeType {
    /// The DOM `nodeType` constant for this kind.
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(NodeType::Element),
            2 => Some(NodeType::Attribute),
            3 => Some(NodeType::Text),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            _ => None,
        }
    }
}

/// The contract for a node in a read-only, hierarchical host tree.
///
/// Implementors are cheap handles (an index, a pointer wrapper) that borrow
/// the underlying tree for `'a`. The evaluator never mutates a node and never
/// owns one: node-sets are vectors of these handles.
///
/// The provided methods walk the tree through the required accessors. Hosts
/// with indexes (sibling links, tag-name tables, ID maps) should override
/// them; the descendant axis and `id()` go through them.
pub trait DataSourceNode<'a>: fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + 'a {
    /// `nodeType`.
    fn node_type(&self) -> NodeType;

    /// `nodeName` for elements and attributes, the target for a processing
    /// instruction, `None` for everything else.
    fn name(&self) -> Option<QName<'a>>;

    /// `nodeValue`: the content of text, comment and processing-instruction
    /// nodes and the value of an attribute. `None` for elements and documents.
    fn node_value(&self) -> Option<String>;

    /// The attribute nodes of an element, in host order.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The child nodes, in document order.
    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// `parentNode`. Attributes report their owner element.
    fn parent(&self) -> Option<Self>;

    /// `nextSibling`. Attributes have no siblings.
    fn next_sibling(&self) -> Option<Self> {
        if self.node_type() == NodeType::Attribute {
            return None;
        }
        let parent = self.parent()?;
        let mut siblings = parent.children();
        siblings.by_ref().find(|sibling| sibling == self)?;
        siblings.next()
    }

    /// `previousSibling`. Attributes have no siblings.
    fn previous_sibling(&self) -> Option<Self> {
        if self.node_type() == NodeType::Attribute {
            return None;
        }
        let parent = self.parent()?;
        let mut previous = None;
        for sibling in parent.children() {
            if sibling == *self {
                return previous;
            }
            previous = Some(sibling);
        }
        None
    }

    /// `ownerDocument`; the document node returns itself.
    fn owner_document(&self) -> Self {
        let mut current = *self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// `getElementsByTagName`: descendant elements in document order whose
    /// name equals `name`, or every descendant element for `"*"`.
    fn elements_by_tag_name(&self, name: &str) -> Vec<Self> {
        let mut results = Vec::new();
        let mut stack: Vec<Self> = self.children().collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            if node.node_type() == NodeType::Element
                && (name == "*" || node.name().is_some_and(|q| q.is(name, false)))
            {
                results.push(node);
            }
            let mut children: Vec<Self> = node.children().collect();
            children.reverse();
            stack.extend(children);
        }
        results
    }

    /// `getElementById`: the first element in the document carrying an `id`
    /// (or `xml:id`) attribute with the given value.
    fn element_by_id(&self, id: &str) -> Option<Self> {
        let document = self.owner_document();
        document.elements_by_tag_name("*").into_iter().find(|element| {
            element.attributes().any(|attr| {
                attr.name().is_some_and(|q| {
                    q.local_part == "id" && matches!(q.prefix, None | Some("xml"))
                }) && attr.node_value().as_deref() == Some(id)
            })
        })
    }
}

// Test utilities - publicly available for integration testing in downstream crates
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::hash::Hasher;

    #[derive(Debug, Clone)]
    struct MockNodeData {
        node_type: NodeType,
        name: Option<(Option<String>, String)>,
        value: Option<String>,
        children: Vec<usize>,
        attributes: Vec<usize>,
    }

    /// An in-memory tree addressed by node ids assigned in creation order.
    #[derive(Debug)]
    pub struct MockTree {
        nodes: Vec<MockNodeData>,
        // We need a way to map a child ID back to its parent ID for the parent() method.
        parent_map: HashMap<usize, usize>,
    }

    /// A simple, in-memory node representation that holds a reference to its tree.
    /// This is necessary so that the node can navigate itself (e.g., find its parent or children).
    #[derive(Debug, Clone, Copy)]
    pub struct MockNode<'a> {
        pub id: usize,
        pub tree: &'a MockTree,
    }

    impl PartialEq for MockNode<'_> {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id && std::ptr::eq(self.tree, other.tree)
        }
    }
    impl Eq for MockNode<'_> {}

    impl Hash for MockNode<'_> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    impl MockTree {
        pub fn node(&self, id: usize) -> MockNode<'_> {
            MockNode { id, tree: self }
        }

        pub fn document(&self) -> MockNode<'_> {
            self.node(0)
        }

        /// The first element named `name` in document order.
        pub fn element(&self, name: &str) -> Option<MockNode<'_>> {
            self.document().elements_by_tag_name(name).into_iter().next()
        }

        pub fn len(&self) -> usize {
            self.nodes.len()
        }

        pub fn is_empty(&self) -> bool {
            self.nodes.is_empty()
        }
    }

    impl<'a> DataSourceNode<'a> for MockNode<'a> {
        fn node_type(&self) -> NodeType {
            self.tree.nodes[self.id].node_type
        }

        fn name(&self) -> Option<QName<'a>> {
            let tree = self.tree; // Re-borrow to help the lifetime checker
            tree.nodes[self.id]
                .name
                .as_ref()
                .map(|(prefix, local)| QName::new(prefix.as_deref(), local))
        }

        fn node_value(&self) -> Option<String> {
            self.tree.nodes[self.id].value.clone()
        }

        fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            let attribute_ids = tree.nodes[self.id].attributes.clone();
            Box::new(
                attribute_ids
                    .into_iter()
                    .map(move |id| MockNode { id, tree }),
            )
        }

        fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
            let tree = self.tree;
            let children_ids = tree.nodes[self.id].children.clone();
            Box::new(
                children_ids
                    .into_iter()
                    .map(move |id| MockNode { id, tree }),
            )
        }

        fn parent(&self) -> Option<Self> {
            self.tree.parent_map.get(&self.id).map(|&pid| MockNode {
                id: pid,
                tree: self.tree,
            })
        }
    }

    /// Builds a [`MockTree`] with a start/end cursor, so fixtures read like markup.
    ///
    /// ```
    /// use sprig_xpath1::datasource::tests::MockTreeBuilder;
    /// // <a><b/><c><d/></c></a>
    /// let tree = MockTreeBuilder::new()
    ///     .start("a").start("b").end().start("c").start("d").end().end().end()
    ///     .build();
    /// assert_eq!(tree.len(), 5);
    /// ```
    #[derive(Debug)]
    pub struct MockTreeBuilder {
        nodes: Vec<MockNodeData>,
        parent_map: HashMap<usize, usize>,
        open: Vec<usize>,
    }

    impl Default for MockTreeBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    fn split_name(name: &str) -> (Option<String>, String) {
        match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
            None => (None, name.to_string()),
        }
    }

    impl MockTreeBuilder {
        pub fn new() -> Self {
            let document = MockNodeData {
                node_type: NodeType::Document,
                name: None,
                value: None,
                children: vec![],
                attributes: vec![],
            };
            Self {
                nodes: vec![document],
                parent_map: HashMap::new(),
                open: vec![0],
            }
        }

        fn current(&self) -> usize {
            self.open.last().copied().unwrap_or(0)
        }

        fn push(&mut self, data: MockNodeData) -> usize {
            let id = self.nodes.len();
            let parent = self.current();
            self.nodes.push(data);
            self.parent_map.insert(id, parent);
            id
        }

        fn leaf(mut self, node_type: NodeType, name: Option<&str>, value: &str) -> Self {
            let id = self.push(MockNodeData {
                node_type,
                name: name.map(split_name),
                value: Some(value.to_string()),
                children: vec![],
                attributes: vec![],
            });
            let parent = self.current();
            self.nodes[parent].children.push(id);
            self
        }

        /// Opens an element as the last child of the current one.
        pub fn start(mut self, name: &str) -> Self {
            let id = self.push(MockNodeData {
                node_type: NodeType::Element,
                name: Some(split_name(name)),
                value: None,
                children: vec![],
                attributes: vec![],
            });
            let parent = self.current();
            self.nodes[parent].children.push(id);
            self.open.push(id);
            self
        }

        /// Adds an attribute to the current element.
        pub fn attr(mut self, name: &str, value: &str) -> Self {
            let id = self.push(MockNodeData {
                node_type: NodeType::Attribute,
                name: Some(split_name(name)),
                value: Some(value.to_string()),
                children: vec![],
                attributes: vec![],
            });
            let owner = self.current();
            self.nodes[owner].attributes.push(id);
            self
        }

        pub fn text(self, value: &str) -> Self {
            self.leaf(NodeType::Text, None, value)
        }

        pub fn comment(self, value: &str) -> Self {
            self.leaf(NodeType::Comment, None, value)
        }

        pub fn pi(self, target: &str, value: &str) -> Self {
            self.leaf(NodeType::ProcessingInstruction, Some(target), value)
        }

        /// Closes the current element.
        pub fn end(mut self) -> Self {
            if self.open.len() > 1 {
                self.open.pop();
            }
            self
        }

        pub fn build(self) -> MockTree {
            MockTree {
                nodes: self.nodes,
                parent_map: self.parent_map,
            }
        }
    }

    /// Creates a simple mock tree for testing:
    /// ```text
    /// <root>                                    <!-- id 1 (document is 0) -->
    ///   <para id="p1" xml:lang="en">Hello</para> <!-- id 2, attrs 3 & 4, text 5 -->
    ///   <!-- comment node -->                    <!-- id 6 -->
    ///   <div></div>                              <!-- id 7 -->
    ///   <?pi-target pi-value?>                   <!-- id 8 -->
    ///   <para>World</para>                       <!-- id 9, text 10 -->
    /// </root>
    /// ```
    pub fn create_test_tree() -> MockTree {
        MockTreeBuilder::new()
            .start("root")
            .start("para")
            .attr("id", "p1")
            .attr("xml:lang", "en")
            .text("Hello")
            .end()
            .comment(" comment node ")
            .start("div")
            .end()
            .pi("pi-target", "pi-value")
            .start("para")
            .text("World")
            .end()
            .end()
            .build()
    }

    /// `<a><b/><c><d/></c></a>`: document 0, a 1, b 2, c 3, d 4.
    pub fn create_abcd_tree() -> MockTree {
        MockTreeBuilder::new()
            .start("a")
            .start("b")
            .end()
            .start("c")
            .start("d")
            .end()
            .end()
            .end()
            .build()
    }
}

#[cfg(test)]
mod trait_tests {
    use super::tests::*;
    use super::*;

    #[test]
    fn test_sibling_navigation() {
        let tree = create_abcd_tree();
        let b = tree.node(2);
        let c = tree.node(3);
        assert_eq!(b.next_sibling(), Some(c));
        assert_eq!(c.previous_sibling(), Some(b));
        assert_eq!(b.previous_sibling(), None);
        assert_eq!(c.next_sibling(), None);
    }

    #[test]
    fn test_owner_document_and_tag_lookup() {
        let tree = create_abcd_tree();
        let d = tree.node(4);
        assert_eq!(d.owner_document(), tree.document());
        let all: Vec<usize> = tree
            .document()
            .elements_by_tag_name("*")
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(all, vec![1, 2, 3, 4]);
        assert_eq!(tree.node(1).elements_by_tag_name("d"), vec![d]);
    }

    #[test]
    fn test_element_by_id() {
        let tree = create_test_tree();
        let para = tree.node(2);
        assert_eq!(tree.node(10).element_by_id("p1"), Some(para));
        assert_eq!(tree.document().element_by_id("missing"), None);
    }

    #[test]
    fn test_qname_matching() {
        let q = QName::new(Some("xml"), "lang");
        assert!(q.is("xml:lang", false));
        assert!(!q.is("lang", false));
        assert!(QName::new(None, "DIV").is("div", true));
        assert!(!QName::new(None, "DIV").is("div", false));
        assert_eq!(q.to_string(), "xml:lang");
    }

    #[test]
    fn test_node_type_codes() {
        assert_eq!(NodeType::Document.code(), 9);
        assert_eq!(NodeType::ProcessingInstruction.code(), 7);
        assert_eq!(NodeType::from_code(3), Some(NodeType::Text));
        assert_eq!(NodeType::from_code(4), None);
    }
}
