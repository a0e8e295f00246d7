// XML host tree for the integration tests, backed by roxmltree
use sprig::{DataSourceNode, NodeType, QName};
use roxmltree::Node;
use std::hash::{Hash, Hasher};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse(text)?;
        Ok(Self { doc })
    }

    pub fn root_node(&self) -> XmlNode<'_, 'input> {
        XmlNode::Tree(self.doc.root())
    }

    /// The outermost element.
    pub fn root_element(&self) -> XmlNode<'_, 'input> {
        XmlNode::Tree(self.doc.root_element())
    }
}

/// A tree node, or an attribute addressed through its owner element since
/// roxmltree keeps attributes as element data.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a, 'input> {
    Tree(Node<'a, 'input>),
    Attribute { owner: Node<'a, 'input>, index: usize },
}

impl PartialEq for XmlNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (XmlNode::Tree(a), XmlNode::Tree(b)) => a.id() == b.id(),
            (
                XmlNode::Attribute { owner: o1, index: i1 },
                XmlNode::Attribute { owner: o2, index: i2 },
            ) => o1.id() == o2.id() && i1 == i2,
            _ => false,
        }
    }
}

impl Eq for XmlNode<'_, '_> {}

impl Hash for XmlNode<'_, '_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            XmlNode::Tree(node) => {
                0u8.hash(state);
                node.id().hash(state);
            }
            XmlNode::Attribute { owner, index } => {
                1u8.hash(state);
                owner.id().hash(state);
                index.hash(state);
            }
        }
    }
}

impl<'a> DataSourceNode<'a> for XmlNode<'a, 'a> {
    fn node_type(&self) -> NodeType {
        match self {
            XmlNode::Tree(node) => {
                if node.is_root() {
                    NodeType::Document
                } else if node.is_text() {
                    NodeType::Text
                } else if node.is_comment() {
                    NodeType::Comment
                } else if node.is_pi() {
                    NodeType::ProcessingInstruction
                } else {
                    NodeType::Element
                }
            }
            XmlNode::Attribute { .. } => NodeType::Attribute,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self {
            XmlNode::Tree(node) if node.is_element() => {
                Some(QName::new(None, node.tag_name().name()))
            }
            XmlNode::Tree(node) => node.pi().map(|pi| QName::new(None, pi.target)),
            XmlNode::Attribute { owner, index } => owner.attributes().nth(*index).map(|attr| {
                let prefix = (attr.namespace() == Some(XML_NAMESPACE)).then_some("xml");
                QName::new(prefix, attr.name())
            }),
        }
    }

    fn node_value(&self) -> Option<String> {
        match self {
            XmlNode::Tree(node) if node.is_pi() => {
                node.pi().map(|pi| pi.value.unwrap_or("").to_string())
            }
            XmlNode::Tree(node) if node.is_text() || node.is_comment() => {
                node.text().map(str::to_string)
            }
            XmlNode::Tree(_) => None,
            XmlNode::Attribute { owner, index } => owner
                .attributes()
                .nth(*index)
                .map(|attr| attr.value().to_string()),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Tree(node) if node.is_element() => {
                let owner = *node;
                let count = node.attributes().len();
                Box::new((0..count).map(move |index| XmlNode::Attribute { owner, index }))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Tree(node) => Box::new(node.children().map(XmlNode::Tree)),
            XmlNode::Attribute { .. } => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self {
            XmlNode::Tree(node) => node.parent().map(XmlNode::Tree),
            XmlNode::Attribute { owner, .. } => Some(XmlNode::Tree(*owner)),
        }
    }

    fn next_sibling(&self) -> Option<Self> {
        match self {
            XmlNode::Tree(node) => node.next_sibling().map(XmlNode::Tree),
            XmlNode::Attribute { .. } => None,
        }
    }

    fn previous_sibling(&self) -> Option<Self> {
        match self {
            XmlNode::Tree(node) => node.prev_sibling().map(XmlNode::Tree),
            XmlNode::Attribute { .. } => None,
        }
    }
}
