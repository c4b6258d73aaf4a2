//! Copyable handles into a document's span tree.
//!
//! A [`Cursor`] is a document identity plus a [`SpanId`]. It borrows nothing,
//! so it can be held across mutations; every accessor takes the document and
//! re-checks that the span is still part of it. A cursor whose span was
//! removed reports [`Error::StaleCursor`] from every accessor instead of
//! returning old data.

use crate::buffer::Slice;
use crate::document::{DocId, Document};
use crate::errors::{Error, Result};
use crate::tree::{Body, Item, Span, SpanId, SpanKind, SpanState, Tree, ValueType};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    doc: DocId,
    span: SpanId,
}

impl Cursor {
    pub(crate) fn new(doc: DocId, span: SpanId) -> Self {
        Self { doc, span }
    }

    pub fn span_id(&self) -> SpanId {
        self.span
    }

    pub(crate) fn resolve<'d>(&self, doc: &'d Document) -> Result<&'d Span> {
        if self.doc != doc.id() {
            return Err(Error::invalid_arg("cursor belongs to a different document"));
        }
        let span = doc.tree.span(self.span)?;
        if span.state == SpanState::Removed {
            return Err(Error::StaleCursor { span: self.span });
        }
        Ok(span)
    }

    /// False once the span was removed, or for a cursor of another document.
    pub fn is_valid(&self, doc: &Document) -> bool {
        self.resolve(doc).is_ok()
    }

    /// Whether the span is reachable from the root.
    pub fn is_attached(&self, doc: &Document) -> bool {
        self.resolve(doc)
            .is_ok_and(|span| span.state == SpanState::Attached)
    }

    pub fn kind(&self, doc: &Document) -> Result<SpanKind> {
        Ok(self.resolve(doc)?.kind)
    }

    fn step(&self, span: SpanId) -> Cursor {
        Cursor::new(self.doc, span)
    }

    pub fn parent(&self, doc: &Document) -> Result<Option<Cursor>> {
        Ok(self.resolve(doc)?.parent.map(|id| self.step(id)))
    }

    /// Kind of the parent span; [`SpanKind::None`] for the root.
    pub fn parent_kind(&self, doc: &Document) -> Result<SpanKind> {
        match self.resolve(doc)?.parent {
            Some(parent) => Ok(doc.tree.span(parent)?.kind),
            None => Ok(SpanKind::None),
        }
    }

    pub fn first_child(&self, doc: &Document) -> Result<Option<Cursor>> {
        let span = self.resolve(doc)?;
        Ok(span
            .node()
            .and_then(|node| node.children().next())
            .map(|id| self.step(id)))
    }

    pub fn next_sibling(&self, doc: &Document) -> Result<Option<Cursor>> {
        self.sibling(doc, true)
    }

    pub fn prev_sibling(&self, doc: &Document) -> Result<Option<Cursor>> {
        self.sibling(doc, false)
    }

    fn sibling(&self, doc: &Document, forward: bool) -> Result<Option<Cursor>> {
        let span = self.resolve(doc)?;
        let Some(node) = span
            .parent
            .and_then(|parent| doc.tree.get(parent))
            .and_then(Span::node)
        else {
            return Ok(None);
        };
        // Value nodes hang off a key/value and are not in any item list.
        let Some(index) = node.position_of(self.span) else {
            return Ok(None);
        };
        let found = if forward {
            node.items[index + 1..].iter().find_map(Item::child)
        } else {
            node.items[..index].iter().rev().find_map(Item::child)
        };
        Ok(found.map(|id| self.step(id)))
    }

    pub fn depth(&self, doc: &Document) -> Result<usize> {
        self.resolve(doc)?;
        Ok(doc.tree.depth(self.span))
    }

    /// Key of a key/value pair, or the name of a table header.
    ///
    /// Quotes around a key written as a single quoted string are not part of
    /// the text.
    pub fn key_text<'d>(&self, doc: &'d Document) -> Result<&'d str> {
        Ok(doc.buffer.slice_text(&self.key_slice(doc)?))
    }

    pub fn key_slice(&self, doc: &Document) -> Result<Slice> {
        let span = self.resolve(doc)?;
        match &span.body {
            Body::KeyVal(kv) => Ok(kv.key),
            Body::Node(node) => node
                .header
                .map(|header| header.name)
                .ok_or_else(|| Error::wrong_kind("key/value or table header", span.kind)),
            _ => Err(Error::wrong_kind("key/value or table header", span.kind)),
        }
    }

    /// Value of a key/value pair or array element.
    ///
    /// Strings come back without their delimiters. Arrays and inline tables
    /// are serialized, delimiters included.
    pub fn value_text<'d>(&self, doc: &'d Document) -> Result<Cow<'d, str>> {
        let span = self.resolve(doc)?;
        let value = span
            .value()
            .ok_or_else(|| Error::wrong_kind("key/value or array element", span.kind))?;
        Ok(match value.node {
            Some(node) => Cow::Owned(doc.span_text(node)),
            None => Cow::Borrowed(doc.buffer.slice_text(&value.text)),
        })
    }

    /// Payload slice of a scalar value.
    pub fn value_slice(&self, doc: &Document) -> Result<Slice> {
        let span = self.resolve(doc)?;
        span.value()
            .map(|value| value.text)
            .ok_or_else(|| Error::wrong_kind("key/value or array element", span.kind))
    }

    /// Key and value ranges of a key/value pair, tagged
    /// [`SpanKind::SliceKey`] and [`SpanKind::SliceValue`].
    pub fn sub_slices(&self, doc: &Document) -> Result<[(SpanKind, Slice); 2]> {
        let span = self.resolve(doc)?;
        match &span.body {
            Body::KeyVal(kv) => Ok([
                (SpanKind::SliceKey, kv.key),
                (SpanKind::SliceValue, kv.value.text),
            ]),
            _ => Err(Error::wrong_kind("key/value", span.kind)),
        }
    }

    pub fn value_type(&self, doc: &Document) -> Result<ValueType> {
        let span = self.resolve(doc)?;
        span.value()
            .map(|value| value.ty)
            .ok_or_else(|| Error::wrong_kind("key/value or array element", span.kind))
    }

    /// Drill into an array or inline table value.
    pub fn value_node(&self, doc: &Document) -> Result<Cursor> {
        let span = self.resolve(doc)?;
        span.value()
            .and_then(|value| value.node)
            .map(|node| self.step(node))
            .ok_or_else(|| Error::wrong_kind("array or inline table value", span.kind))
    }

    /// Exact serialized text of the span.
    pub fn text(&self, doc: &Document) -> Result<String> {
        self.resolve(doc)?;
        Ok(doc.span_text(self.span))
    }

    /// Text of a comment line, `#` included.
    pub fn comment_text<'d>(&self, doc: &'d Document) -> Result<&'d str> {
        let span = self.resolve(doc)?;
        match &span.body {
            Body::Comment(comment) => Ok(doc.buffer.slice_text(&comment.text)),
            _ => Err(Error::wrong_kind("comment", span.kind)),
        }
    }

    /// Comment after the value on a key/value line or after a table header.
    pub fn trailing_comment<'d>(&self, doc: &'d Document) -> Result<Option<&'d str>> {
        let span = self.resolve(doc)?;
        let trail = match &span.body {
            Body::KeyVal(kv) => kv.trail,
            Body::Node(node) => match &node.header {
                Some(header) => header.trail,
                None => return Err(Error::wrong_kind("key/value or table header", span.kind)),
            },
            _ => return Err(Error::wrong_kind("key/value or table header", span.kind)),
        };
        let text = doc.buffer.slice_text(&trail);
        Ok(text
            .find('#')
            .map(|at| text[at..].trim_end_matches(['\r', '\n'])))
    }

    /// Comment lines directly above this line with no blank line between.
    pub fn leading_comments(&self, doc: &Document) -> Result<Vec<Cursor>> {
        let span = self.resolve(doc)?;
        let Some(parent) = span.parent else {
            return Ok(Vec::new());
        };
        let Some(index) = doc
            .tree
            .get(parent)
            .and_then(Span::node)
            .and_then(|node| node.position_of(self.span))
        else {
            return Ok(Vec::new());
        };
        Ok(comment_run(&doc.tree, parent, index)
            .into_iter()
            .map(|id| self.step(id))
            .collect())
    }

    pub fn copy_key(&self, doc: &Document, out: &mut [u8]) -> Result<usize> {
        copy_text(self.key_text(doc)?, out)
    }

    pub fn copy_value(&self, doc: &Document, out: &mut [u8]) -> Result<usize> {
        copy_text(&self.value_text(doc)?, out)
    }

    /// Serialized text of the span, one line at a time.
    pub fn lines(&self, doc: &Document) -> Result<Lines> {
        Ok(Lines {
            text: self.text(doc)?,
            pos: 0,
        })
    }
}

/// Comment spans that directly precede `items[index]` of `parent`, in
/// document order. A header's comments may sit at the end of the table
/// above it.
pub(crate) fn comment_run(tree: &Tree, parent: SpanId, index: usize) -> Vec<SpanId> {
    let mut run = Vec::new();
    collect_comment_run(tree, parent, index, &mut run);
    run.reverse();
    run
}

fn collect_comment_run(tree: &Tree, parent: SpanId, index: usize, run: &mut Vec<SpanId>) {
    let Some(node) = tree.get(parent).and_then(Span::node) else {
        return;
    };
    for item in node.items[..index.min(node.items.len())].iter().rev() {
        let Item::Child(id) = item else {
            return;
        };
        match tree.get(*id).map(|span| span.kind) {
            Some(SpanKind::LeafComment) => run.push(*id),
            Some(kind) if kind.is_header_table() => {
                let len = tree.get(*id).and_then(Span::node).map_or(0, |n| n.items.len());
                collect_comment_run(tree, *id, len, run);
                return;
            }
            _ => return,
        }
    }
}

fn copy_text(text: &str, out: &mut [u8]) -> Result<usize> {
    let needed = text.len();
    if out.len() < needed {
        return Err(Error::Buffer {
            needed,
            capacity: out.len(),
        });
    }
    out[..needed].copy_from_slice(text.as_bytes());
    Ok(needed)
}

/// Iterator returned by [`Cursor::lines`]. Line endings are stripped.
#[derive(Debug, Clone)]
pub struct Lines {
    text: String,
    pos: usize,
}

impl Iterator for Lines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let rest = self.text.get(self.pos..).filter(|rest| !rest.is_empty())?;
        let (line, advance) = match rest.find('\n') {
            Some(at) => (&rest[..at], at + 1),
            None => (rest, rest.len()),
        };
        let line = line.strip_suffix('\r').unwrap_or(line).to_string();
        self.pos += advance;
        Some(line)
    }
}
