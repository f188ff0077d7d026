//! The decoded form of one stanza: a tree of tagged nodes.

use std::collections::BTreeMap;

use crate::jid::Jid;

/// One attribute value. Integers and booleans are a convenience for
/// builders; on the wire they travel as their decimal / `true`/`false`
/// string forms, so a decoded node reports them back as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Bool(bool),
    Jid(Jid),
    Bytes(Vec<u8>),
}

impl AttrValue {
    /// The string form used for wire encoding of non-JID values.
    pub fn as_wire_string(&self) -> Option<String> {
        match self {
            AttrValue::String(s) => Some(s.clone()),
            AttrValue::Int(i) => Some(i.to_string()),
            AttrValue::Bool(b) => Some(if *b { "true".into() } else { "false".into() }),
            AttrValue::Jid(_) | AttrValue::Bytes(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<Jid> for AttrValue {
    fn from(jid: Jid) -> Self {
        AttrValue::Jid(jid)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

/// Node content: absent, raw bytes, or an ordered list of children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    Bytes(Vec<u8>),
    Nodes(Vec<Node>),
}

/// One stanza node: tag, unique attribute keys, optional content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub attrs: BTreeMap<String, AttrValue>,
    pub content: Option<NodeContent>,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), attrs: BTreeMap::new(), content: None }
    }

    /// Builder-style attribute insertion.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Builder-style child list.
    pub fn children(mut self, children: Vec<Node>) -> Self {
        self.content = Some(NodeContent::Nodes(children));
        self
    }

    /// Builder-style byte content.
    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.content = Some(NodeContent::Bytes(bytes));
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Attribute as a string, if present and string-like.
    pub fn attr_string(&self, key: &str) -> Option<String> {
        match self.attrs.get(key)? {
            AttrValue::Jid(jid) => Some(jid.to_string()),
            other => other.as_wire_string(),
        }
    }

    /// Attribute as a JID. String attributes are parsed leniently since
    /// servers send both forms.
    pub fn attr_jid(&self, key: &str) -> Option<Jid> {
        match self.attrs.get(key)? {
            AttrValue::Jid(jid) => Some(jid.clone()),
            AttrValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        match self.attrs.get(key)? {
            AttrValue::Int(i) => u64::try_from(*i).ok(),
            AttrValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Children list, empty slice when content is bytes or absent.
    pub fn child_nodes(&self) -> &[Node] {
        match &self.content {
            Some(NodeContent::Nodes(nodes)) => nodes,
            _ => &[],
        }
    }

    /// First child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Node> {
        self.child_nodes().iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag.
    pub fn children_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> {
        self.child_nodes().iter().filter(move |c| c.tag == tag)
    }

    /// Byte content, if this node carries bytes.
    pub fn content_bytes(&self) -> Option<&[u8]> {
        match &self.content {
            Some(NodeContent::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }
}
