//! Generic parsed-XML tree and the scalar extractors that read it.
//!
//! Feeds in the wild disagree on shape: the same `<link>` can be a bare
//! string, an Atom element carrying `href`, or a repeated list. [`XmlNode`]
//! keeps that variety explicit so extraction pattern-matches instead of
//! probing.

use std::collections::BTreeMap;

/// A node of the parsed document tree.
///
/// Element children and XML attributes share one key space inside
/// [`XmlNode::Attributed`]. A name that occurs more than once under the same
/// parent is collected into a [`XmlNode::Sequence`] in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// Leaf element with no attributes or children (its trimmed text, possibly empty).
    Scalar(String),
    /// Element with attributes and/or child elements.
    Attributed {
        text: Option<String>,
        attrs: BTreeMap<String, XmlNode>,
    },
    /// Repeated sibling elements sharing a name.
    Sequence(Vec<XmlNode>),
}

impl XmlNode {
    /// Looks up a merged attribute or child element by key.
    ///
    /// Only attributed nodes have keys; scalars and sequences return `None`.
    pub fn get(&self, key: &str) -> Option<&XmlNode> {
        match self {
            XmlNode::Attributed { attrs, .. } => attrs.get(key),
            _ => None,
        }
    }

    /// Like [`XmlNode::get`] but treats an empty scalar as absent.
    pub fn get_present(&self, key: &str) -> Option<&XmlNode> {
        self.get(key).filter(|node| node.is_present())
    }

    /// Follows a dotted path of keys, e.g. `"rss.channel"`.
    pub fn path(&self, dotted: &str) -> Option<&XmlNode> {
        dotted
            .split('.')
            .try_fold(self, |node, key| node.get_present(key))
    }

    /// False for an empty scalar or an empty sequence.
    pub fn is_present(&self) -> bool {
        match self {
            XmlNode::Scalar(s) => !s.is_empty(),
            XmlNode::Sequence(items) => !items.is_empty(),
            XmlNode::Attributed { .. } => true,
        }
    }

    /// The first node of a sequence, or the node itself.
    pub fn first(&self) -> &XmlNode {
        match self {
            XmlNode::Sequence(items) => items.first().unwrap_or(self),
            other => other,
        }
    }

    /// Iterates a sequence's members, or yields the node itself once.
    pub fn iter_members(&self) -> std::slice::Iter<'_, XmlNode> {
        match self {
            XmlNode::Sequence(items) => items.iter(),
            other => std::slice::from_ref(other).iter(),
        }
    }

    /// Inserts a key, turning a repeated key into a sequence.
    pub(crate) fn insert(attrs: &mut BTreeMap<String, XmlNode>, key: String, value: XmlNode) {
        match attrs.get_mut(&key) {
            Some(XmlNode::Sequence(items)) => items.push(value),
            Some(existing) => {
                let first = std::mem::replace(existing, XmlNode::Sequence(Vec::with_capacity(2)));
                if let XmlNode::Sequence(items) = existing {
                    items.push(first);
                    items.push(value);
                }
            }
            None => {
                attrs.insert(key, value);
            }
        }
    }
}

/// Pulls the text content out of a node of any shape.
///
/// - scalar: the string itself
/// - sequence: the text of its first member
/// - attributed: its inner text, or empty when it only carries attributes
pub fn text_of(node: Option<&XmlNode>) -> String {
    match node {
        None => String::new(),
        Some(XmlNode::Scalar(s)) => s.clone(),
        Some(XmlNode::Sequence(items)) => text_of(items.first()),
        Some(XmlNode::Attributed { text, .. }) => text.clone().unwrap_or_default(),
    }
}

/// Pulls a named attribute out of a node of any shape.
///
/// A scalar node is its own value (`<media:thumbnail>http://…</media:thumbnail>`
/// yields the URL for any attribute name). A sequence defers to its first member.
pub fn attribute_of(node: Option<&XmlNode>, name: &str) -> String {
    match node {
        None => String::new(),
        Some(XmlNode::Scalar(s)) => s.clone(),
        Some(XmlNode::Sequence(items)) => attribute_of(items.first(), name),
        Some(attributed) => text_of(attributed.get(name)),
    }
}
