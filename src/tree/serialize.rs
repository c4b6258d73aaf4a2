//! Tree to text.
//!
//! Emits each span's slices in document order. Quote delimiters are not part
//! of any slice, so they are re-added here from the recorded [`Quote`] style.

use crate::buffer::{Buffer, Slice};
use crate::tree::{Body, Item, Node, Quote, SpanId, Tree, Value};

pub(crate) struct Writer<'a> {
    tree: &'a Tree,
    buffer: &'a Buffer,
    out: String,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(tree: &'a Tree, buffer: &'a Buffer) -> Self {
        Self {
            tree,
            buffer,
            out: String::with_capacity(buffer.original().len()),
        }
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }

    fn slice(&mut self, slice: &Slice) {
        self.out.push_str(self.buffer.slice_text(slice));
    }

    fn quoted(&mut self, quote: Quote, slice: &Slice) {
        self.out.push_str(quote.delimiter());
        self.slice(slice);
        self.out.push_str(quote.delimiter());
    }

    pub(crate) fn span(&mut self, id: SpanId) {
        let Some(span) = self.tree.get(id) else {
            return;
        };
        match &span.body {
            Body::Node(node) => self.node(node),
            Body::KeyVal(kv) => {
                self.slice(&kv.lead);
                self.quoted(kv.key_quote, &kv.key);
                self.slice(&kv.eq);
                self.value(&kv.value);
                self.slice(&kv.trail);
            }
            Body::Comment(comment) => {
                self.slice(&comment.lead);
                self.slice(&comment.text);
                self.slice(&comment.trail);
            }
            Body::Element(value) => self.value(value),
        }
    }

    pub(crate) fn value(&mut self, value: &Value) {
        match value.node {
            Some(node) => self.span(node),
            None => self.quoted(value.quote, &value.text),
        }
    }

    pub(crate) fn item(&mut self, item: &Item) {
        match item {
            Item::Trivia(slice) | Item::Comma(slice) => self.slice(slice),
            Item::Child(id) => self.span(*id),
        }
    }

    fn node(&mut self, node: &Node) {
        if let Some(header) = &node.header {
            self.slice(&header.lead);
            self.slice(&header.open);
            self.slice(&header.name);
            self.slice(&header.close);
            self.slice(&header.trail);
        }
        if let Some(open) = &node.open {
            self.slice(open);
        }
        for item in &node.items {
            self.item(item);
        }
        if let Some(close) = &node.close {
            self.slice(close);
        }
    }
}

/// Serialized text of the span `id` and everything below it.
pub(crate) fn span_to_string(tree: &Tree, buffer: &Buffer, id: SpanId) -> String {
    let mut writer = Writer::new(tree, buffer);
    writer.span(id);
    writer.finish()
}

pub(crate) fn item_to_string(tree: &Tree, buffer: &Buffer, item: &Item) -> String {
    let mut writer = Writer::new(tree, buffer);
    writer.item(item);
    writer.finish()
}

pub(crate) fn value_to_string(tree: &Tree, buffer: &Buffer, value: &Value) -> String {
    let mut writer = Writer::new(tree, buffer);
    writer.value(value);
    writer.finish()
}
