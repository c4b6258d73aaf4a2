//! Lookup and iteration on top of [`Cursor`].
//!
//! Names are compared as literal text: a key written `a.b` is one name and
//! is only found by the segment `"a.b"`. Nesting comes from table headers
//! and inline tables, never from dots inside a key.

use crate::cursor::Cursor;
use crate::document::Document;
use crate::errors::{Error, Result};
use crate::tree::{Body, Item, Span, SpanId, SpanKind, ValueType};

impl Cursor {
    /// The node whose children name lookups scan: the span itself for
    /// tables, or the inline table held by a key/value.
    fn lookup_scope(&self, doc: &Document) -> Result<Option<SpanId>> {
        let span = self.resolve(doc)?;
        Ok(match &span.body {
            Body::Node(_) if span.kind != SpanKind::NodeArray => Some(self.span_id()),
            Body::KeyVal(kv) if kv.value.ty == ValueType::InlineTable => kv.value.node,
            Body::Element(value) if value.ty == ValueType::InlineTable => value.node,
            _ => None,
        })
    }

    /// First direct child named `name`.
    pub fn find(&self, doc: &Document, name: &str) -> Result<Cursor> {
        let Some(scope) = self.lookup_scope(doc)? else {
            return Err(Error::not_found(name));
        };
        first_match(doc, scope, name, 0)
            .map(|id| doc.cursor(id))
            .ok_or_else(|| Error::not_found(name))
    }

    /// Follow literal segments from this cursor. An empty path is the
    /// cursor itself.
    pub fn find_path<S: AsRef<str>>(&self, doc: &Document, path: &[S]) -> Result<Cursor> {
        let mut current = *self;
        for segment in path {
            current = current.find(doc, segment.as_ref()).map_err(|err| match err {
                Error::NotFound { .. } => Error::not_found(join_path(path)),
                other => other,
            })?;
        }
        Ok(current)
    }

    /// Next child named `name` after `after`, for names that repeat such as
    /// `[[array_table]]` headers.
    pub fn find_next(&self, doc: &Document, name: &str, after: Cursor) -> Result<Cursor> {
        let Some(scope) = self.lookup_scope(doc)? else {
            return Err(Error::not_found(name));
        };
        after.resolve(doc)?;
        let index = doc
            .tree
            .span(scope)?
            .node()
            .and_then(|node| node.position_of(after.span_id()))
            .ok_or_else(|| Error::invalid_arg("resume cursor is not a child of this table"))?;
        first_match(doc, scope, name, index + 1)
            .map(|id| doc.cursor(id))
            .ok_or_else(|| Error::not_found(name))
    }

    /// Every direct child named `name`, in document order.
    pub fn find_all<'d>(
        &self,
        doc: &'d Document,
        name: &'d str,
    ) -> Result<impl Iterator<Item = Cursor> + 'd> {
        let scope = self.lookup_scope(doc)?;
        let children = scope
            .and_then(|id| doc.tree.get(id))
            .and_then(Span::node)
            .into_iter()
            .flat_map(|node| node.children());
        Ok(children
            .filter(move |id| child_name(doc, *id) == Some(name))
            .map(|id| doc.cursor(id)))
    }

    /// Elements of an array, either the array node itself or a key/value or
    /// element holding one.
    pub fn elements<'d>(&self, doc: &'d Document) -> Result<Children<'d>> {
        let span = self.resolve(doc)?;
        let node = match &span.body {
            Body::Node(_) if span.kind == SpanKind::NodeArray => self.span_id(),
            Body::KeyVal(kv) if kv.value.ty == ValueType::Array => {
                kv.value.node.ok_or_else(|| Error::wrong_kind("array", span.kind))?
            }
            Body::Element(value) if value.ty == ValueType::Array => {
                value.node.ok_or_else(|| Error::wrong_kind("array", span.kind))?
            }
            _ => return Err(Error::wrong_kind("array", span.kind)),
        };
        Ok(Children::new(doc, node))
    }

    /// Direct children of any structural span.
    pub fn children<'d>(&self, doc: &'d Document) -> Result<Children<'d>> {
        let span = self.resolve(doc)?;
        if !span.kind.is_node() {
            return Err(Error::wrong_kind("table or array", span.kind));
        }
        Ok(Children::new(doc, self.span_id()))
    }
}

fn child_name<'d>(doc: &'d Document, id: SpanId) -> Option<&'d str> {
    let span = doc.tree.get(id)?;
    let slice = match &span.body {
        Body::KeyVal(kv) => kv.key,
        Body::Node(node) => node.header?.name,
        _ => return None,
    };
    Some(doc.buffer.slice_text(&slice))
}

fn first_match(doc: &Document, scope: SpanId, name: &str, from: usize) -> Option<SpanId> {
    let node = doc.tree.get(scope)?.node()?;
    node.items
        .get(from..)?
        .iter()
        .filter_map(Item::child)
        .find(|id| child_name(doc, *id) == Some(name))
}

fn join_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|segment| segment.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

/// Lazy walk over the direct children of a node.
///
/// The walk is bounded by the child count when it was created. It borrows
/// the document, so the tree cannot be mutated while a walk is alive; to
/// edit while visiting, collect the cursors first. Clone or
/// [`restart`](Children::restart) it to walk again from the start.
#[derive(Debug, Clone)]
pub struct Children<'d> {
    doc: &'d Document,
    node: SpanId,
    next_item: usize,
    remaining: usize,
    total: usize,
}

impl<'d> Children<'d> {
    fn new(doc: &'d Document, node: SpanId) -> Self {
        let total = doc
            .tree
            .get(node)
            .and_then(Span::node)
            .map_or(0, |node| node.children().count());
        Self {
            doc,
            node,
            next_item: 0,
            remaining: total,
            total,
        }
    }

    pub fn restart(&mut self) {
        self.next_item = 0;
        self.remaining = self.total;
    }
}

impl Iterator for Children<'_> {
    type Item = Cursor;

    fn next(&mut self) -> Option<Cursor> {
        if self.remaining == 0 {
            return None;
        }
        let doc = self.doc;
        let items = &doc.tree.get(self.node)?.node()?.items;
        while let Some(item) = items.get(self.next_item) {
            self.next_item += 1;
            if let Item::Child(id) = item {
                self.remaining -= 1;
                return Some(doc.cursor(*id));
            }
        }
        self.remaining = 0;
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Children<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::parse(text).unwrap()
    }

    #[test]
    fn literal_dotted_keys() {
        let doc = doc("\"a.b\" = 1\n");
        let root = doc.root();
        let ab = root.find(&doc, "a.b").unwrap();
        assert_eq!(ab.value_text(&doc).unwrap(), "1");
        assert!(matches!(root.find(&doc, "a"), Err(Error::NotFound { .. })));
        assert!(matches!(ab.find(&doc, "b"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn bare_dotted_key_is_one_name() {
        let doc = doc("a.b = 1\n");
        assert!(doc.root().find(&doc, "a.b").is_ok());
        assert!(doc.root().find_path(&doc, &["a", "b"]).is_err());
    }

    #[test]
    fn path_through_tables_and_inline_tables() {
        let doc = doc("[server]\nhost = \"x\"\nopts = { tls = { on = true } }\n");
        let on = doc
            .root()
            .find_path(&doc, &["server", "opts", "tls", "on"])
            .unwrap();
        assert_eq!(on.value_text(&doc).unwrap(), "true");
        let err = doc
            .root()
            .find_path(&doc, &["server", "missing", "x"])
            .unwrap_err();
        match err {
            Error::NotFound { path } => assert_eq!(path, "server.missing.x"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn first_match_wins_and_resume() {
        let doc = doc("[[bin]]\nname = 'a'\n[[bin]]\nname = 'b'\n[[bin]]\nname = 'c'\n");
        let root = doc.root();
        let first = root.find(&doc, "bin").unwrap();
        assert_eq!(first.find(&doc, "name").unwrap().value_text(&doc).unwrap(), "a");
        let second = root.find_next(&doc, "bin", first).unwrap();
        assert_eq!(second.find(&doc, "name").unwrap().value_text(&doc).unwrap(), "b");
        let names: Vec<String> = root
            .find_all(&doc, "bin")
            .unwrap()
            .map(|c| c.find(&doc, "name").unwrap().value_text(&doc).unwrap().into_owned())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        let third = root.find_next(&doc, "bin", second).unwrap();
        assert!(matches!(
            root.find_next(&doc, "bin", third),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn elements_are_bounded_and_restartable() {
        let doc = doc("a = [1,2,3]\n");
        let a = doc.root().find(&doc, "a").unwrap();
        let mut walk = a.elements(&doc).unwrap();
        assert_eq!(walk.len(), 3);
        let first: Vec<_> = walk
            .by_ref()
            .map(|c| c.value_text(&doc).unwrap().into_owned())
            .collect();
        assert_eq!(first, vec!["1", "2", "3"]);
        assert!(walk.next().is_none());
        walk.restart();
        let second: Vec<_> = walk.map(|c| c.value_text(&doc).unwrap().into_owned()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn elements_on_non_array() {
        let doc = doc("a = 1\n");
        let a = doc.root().find(&doc, "a").unwrap();
        assert!(matches!(a.elements(&doc), Err(Error::Type { .. })));
    }

    #[test]
    fn nested_array_elements() {
        let doc = doc("m = [[1, 2], [3]]\n");
        let rows: Vec<usize> = doc
            .root()
            .find(&doc, "m")
            .unwrap()
            .elements(&doc)
            .unwrap()
            .map(|row| row.elements(&doc).unwrap().count())
            .collect();
        assert_eq!(rows, vec![2, 1]);
    }

    #[test]
    fn children_skip_trivia() {
        let doc = doc("a = 1\n\n# c\nb = 2\n");
        assert_eq!(doc.root().children(&doc).unwrap().count(), 3);
    }
}
