//! Arena-backed span tree.
//!
//! Every span lives in one `Vec` owned by the [`Tree`] and is addressed by a
//! [`SpanId`]. Ids are never reused: removing a span flips its state to
//! [`SpanState::Removed`] and leaves it in place, so a stale id can always be
//! told apart from a live one.
//!
//! Spans own no text. Each one is a set of [`Slice`]s that, emitted in order,
//! reproduce the span exactly. Structural nodes interleave their children
//! with [`Item::Trivia`] and [`Item::Comma`] slices so that blank lines,
//! comments inside arrays and separator spacing all survive a round trip.

pub mod builder;
pub mod serialize;

use crate::buffer::Slice;
use crate::errors::{Error, Result};
use std::fmt;

/// Stable index of a span inside its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct SpanId(pub(crate) u32);

impl SpanId {
    pub const ROOT: SpanId = SpanId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    /// No span: the parent of the root.
    None,
    NodeTable,
    NodeArray,
    NodeArrayTable,
    NodeInlineTable,
    LeafKeyval,
    LeafComment,
    SliceKey,
    SliceValue,
}

impl SpanKind {
    pub fn name(self) -> &'static str {
        match self {
            SpanKind::None => "NONE",
            SpanKind::NodeTable => "NODE_TABLE",
            SpanKind::NodeArray => "NODE_ARRAY",
            SpanKind::NodeArrayTable => "NODE_ARRAY_TABLE",
            SpanKind::NodeInlineTable => "NODE_INLINE_TABLE",
            SpanKind::LeafKeyval => "LEAF_KEYVAL",
            SpanKind::LeafComment => "LEAF_COMMENT",
            SpanKind::SliceKey => "SLICE_KEY",
            SpanKind::SliceValue => "SLICE_VALUE",
        }
    }

    pub fn is_node(self) -> bool {
        matches!(
            self,
            SpanKind::NodeTable
                | SpanKind::NodeArray
                | SpanKind::NodeArrayTable
                | SpanKind::NodeInlineTable
        )
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, SpanKind::LeafKeyval | SpanKind::LeafComment)
    }

    /// Kinds introduced by a `[name]` or `[[name]]` header line.
    pub fn is_header_table(self) -> bool {
        matches!(self, SpanKind::NodeTable | SpanKind::NodeArrayTable)
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    #[serde(rename = "BAREVALUE")]
    BareValue,
    String,
    Array,
    InlineTable,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::BareValue => "BAREVALUE",
            ValueType::String => "STRING",
            ValueType::Array => "ARRAY",
            ValueType::InlineTable => "INLINE_TABLE",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Delimiters stripped from a string value or quoted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quote {
    #[default]
    None,
    Basic,
    Literal,
    MlBasic,
    MlLiteral,
}

impl Quote {
    pub fn delimiter(self) -> &'static str {
        match self {
            Quote::None => "",
            Quote::Basic => "\"",
            Quote::Literal => "'",
            Quote::MlBasic => "\"\"\"",
            Quote::MlLiteral => "'''",
        }
    }

    pub fn is_multiline(self) -> bool {
        matches!(self, Quote::MlBasic | Quote::MlLiteral)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanState {
    /// Reachable from the root.
    Attached,
    /// Created but not yet inserted.
    Detached,
    /// Unlinked by a mutation; its id must not be used again.
    Removed,
}

/// The value half of a key/value pair, or an array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub ty: ValueType,
    pub quote: Quote,
    /// Payload without delimiters. For arrays and inline tables this is the
    /// bracketed text as first parsed; after edits inside the node only
    /// [`Value::node`] is authoritative.
    pub text: Slice,
    pub node: Option<SpanId>,
}

/// `[name]` or `[[name]]` line of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub lead: Slice,
    /// `[` or `[[` plus inner whitespace.
    pub open: Slice,
    pub name: Slice,
    /// Inner whitespace plus `]` or `]]`.
    pub close: Slice,
    /// Trailing whitespace, comment and line ending.
    pub trail: Slice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    Trivia(Slice),
    Comma(Slice),
    Child(SpanId),
}

impl Item {
    pub fn child(&self) -> Option<SpanId> {
        match self {
            Item::Child(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub header: Option<Header>,
    pub open: Option<Slice>,
    pub items: Vec<Item>,
    pub close: Option<Slice>,
}

impl Node {
    pub fn children(&self) -> impl Iterator<Item = SpanId> + '_ {
        self.items.iter().filter_map(Item::child)
    }

    pub fn position_of(&self, child: SpanId) -> Option<usize> {
        self.items.iter().position(|item| *item == Item::Child(child))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyVal {
    /// Indentation before the key.
    pub lead: Slice,
    pub key: Slice,
    pub key_quote: Quote,
    /// `=` with its surrounding whitespace.
    pub eq: Slice,
    pub value: Value,
    /// Whitespace, trailing comment and line ending after the value.
    pub trail: Slice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comment {
    pub lead: Slice,
    /// The comment including its `#`.
    pub text: Slice,
    pub trail: Slice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Node(Node),
    KeyVal(KeyVal),
    Comment(Comment),
    Element(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub parent: Option<SpanId>,
    pub state: SpanState,
    pub body: Body,
}

impl Span {
    pub fn node(&self) -> Option<&Node> {
        match &self.body {
            Body::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Value carried by a key/value pair or array element.
    pub fn value(&self) -> Option<&Value> {
        match &self.body {
            Body::KeyVal(kv) => Some(&kv.value),
            Body::Element(value) => Some(value),
            _ => None,
        }
    }

    pub fn header(&self) -> Option<&Header> {
        self.node().and_then(|node| node.header.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    spans: Vec<Span>,
}

impl Tree {
    /// A tree holding only the headerless root table.
    pub(crate) fn new() -> Self {
        Self {
            spans: vec![Span {
                kind: SpanKind::NodeTable,
                parent: None,
                state: SpanState::Attached,
                body: Body::Node(Node {
                    header: None,
                    open: None,
                    items: Vec::new(),
                    close: None,
                }),
            }],
        }
    }

    pub fn root(&self) -> SpanId {
        SpanId::ROOT
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, id: SpanId) -> Option<&Span> {
        self.spans.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: SpanId) -> Option<&mut Span> {
        self.spans.get_mut(id.index())
    }

    /// Live span lookup used on internal paths that already checked the id.
    pub(crate) fn span(&self, id: SpanId) -> Result<&Span> {
        self.get(id)
            .ok_or_else(|| Error::invalid_arg(format!("span {id} does not exist")))
    }

    pub(crate) fn span_mut(&mut self, id: SpanId) -> Result<&mut Span> {
        self.get_mut(id)
            .ok_or_else(|| Error::invalid_arg(format!("span {id} does not exist")))
    }

    pub(crate) fn node_mut(&mut self, id: SpanId) -> Result<&mut Node> {
        let span = self.span_mut(id)?;
        let kind = span.kind;
        match &mut span.body {
            Body::Node(node) => Ok(node),
            _ => Err(Error::wrong_kind("table or array", kind)),
        }
    }

    pub(crate) fn push(&mut self, span: Span) -> Result<SpanId> {
        let id = u32::try_from(self.spans.len())
            .map_err(|_| Error::invalid_arg("span arena is full"))?;
        self.spans.try_reserve(1)?;
        self.spans.push(span);
        Ok(SpanId(id))
    }

    /// Drop every span pushed after the arena had `len` entries.
    ///
    /// Only valid while nothing reachable refers to those spans, which holds
    /// for a failed build of a detached value.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len >= 1 {
            self.spans.truncate(len);
        }
    }

    pub fn children(&self, id: SpanId) -> impl Iterator<Item = SpanId> + '_ {
        self.get(id)
            .and_then(Span::node)
            .into_iter()
            .flat_map(Node::children)
    }

    /// Nesting depth below the root; the root is 0.
    pub fn depth(&self, id: SpanId) -> usize {
        let mut depth = 0;
        let mut current = self.get(id).and_then(|span| span.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.get(parent).and_then(|span| span.parent);
        }
        depth
    }

    /// Set the state of `id` and every span below it.
    pub(crate) fn set_state(&mut self, id: SpanId, state: SpanState) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(span) = self.get_mut(next) else {
                continue;
            };
            span.state = state;
            match &span.body {
                Body::Node(node) => stack.extend(node.children()),
                Body::KeyVal(KeyVal { value, .. }) | Body::Element(value) => {
                    stack.extend(value.node)
                }
                Body::Comment(_) => {}
            }
        }
    }

    /// Every span id in the arena, live or not.
    pub fn ids(&self) -> impl Iterator<Item = SpanId> {
        (0..self.spans.len() as u32).map(SpanId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Region;

    fn comment_span(parent: SpanId) -> Span {
        let at = Slice::empty(Region::Original, 0);
        Span {
            kind: SpanKind::LeafComment,
            parent: Some(parent),
            state: SpanState::Attached,
            body: Body::Comment(Comment {
                lead: at,
                text: at,
                trail: at,
            }),
        }
    }

    #[test]
    fn new_tree_has_root_table() {
        let tree = Tree::new();
        let root = tree.get(tree.root()).unwrap();
        assert_eq!(root.kind, SpanKind::NodeTable);
        assert!(root.parent.is_none());
        assert!(root.header().is_none());
    }

    #[test]
    fn ids_are_sequential() {
        let mut tree = Tree::new();
        let a = tree.push(comment_span(SpanId::ROOT)).unwrap();
        let b = tree.push(comment_span(SpanId::ROOT)).unwrap();
        assert_eq!(a, SpanId(1));
        assert_eq!(b, SpanId(2));
        assert_eq!(tree.depth(b), 1);
    }

    #[test]
    fn removal_reaches_value_nodes() {
        let mut tree = Tree::new();
        let array = tree
            .push(Span {
                kind: SpanKind::NodeArray,
                parent: None,
                state: SpanState::Attached,
                body: Body::Node(Node {
                    header: None,
                    open: None,
                    items: Vec::new(),
                    close: None,
                }),
            })
            .unwrap();
        let at = Slice::empty(Region::Original, 0);
        let kv = tree
            .push(Span {
                kind: SpanKind::LeafKeyval,
                parent: Some(SpanId::ROOT),
                state: SpanState::Attached,
                body: Body::KeyVal(KeyVal {
                    lead: at,
                    key: at,
                    key_quote: Quote::None,
                    eq: at,
                    value: Value {
                        ty: ValueType::Array,
                        quote: Quote::None,
                        text: at,
                        node: Some(array),
                    },
                    trail: at,
                }),
            })
            .unwrap();
        tree.set_state(kv, SpanState::Removed);
        assert_eq!(tree.get(array).unwrap().state, SpanState::Removed);
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(SpanKind::NodeArrayTable.to_string(), "NODE_ARRAY_TABLE");
        assert_eq!(SpanKind::None.name(), "NONE");
        assert_eq!(ValueType::BareValue.to_string(), "BAREVALUE");
        assert_eq!(Quote::MlLiteral.delimiter(), "'''");
    }

    #[test]
    fn truncate_keeps_root() {
        let mut tree = Tree::new();
        tree.push(comment_span(SpanId::ROOT)).unwrap();
        tree.truncate(0);
        assert_eq!(tree.len(), 1);
    }
}
