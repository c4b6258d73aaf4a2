//! Creating, inserting, removing and rewriting spans.
//!
//! New text is written to the boneyard and never over existing bytes.
//! Insertion and removal only change which items a node lists, so the
//! slices of every untouched sibling serialize exactly as before.
//!
//! Every operation checks everything that can fail before it touches the
//! tree. Spans pushed by a failed operation are truncated from the arena;
//! bytes already appended to the boneyard stay there, unreachable.

use crate::buffer::{Region, Slice};
use crate::cursor::{comment_run, Cursor};
use crate::document::Document;
use crate::errors::{Error, Result};
use crate::lexer::{self, Token, TokenKind};
use crate::tree::builder;
use crate::tree::serialize::item_to_string;
use crate::tree::{
    Body, Comment, Header, Item, KeyVal, Node, Quote, Span, SpanId, SpanKind, SpanState, Value,
    ValueType,
};
use crate::config::StringStyle;
use crate::verify::Expected;
use log::trace;

/// Content for creation and replacement operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewValue {
    /// Written verbatim; must lex as a single bare token (number, boolean,
    /// date).
    Bare(String),
    /// Quoted and escaped on output.
    String(String),
    Array(Vec<NewValue>),
    InlineTable(Vec<(String, NewValue)>),
}

impl NewValue {
    pub fn bare(text: impl Into<String>) -> Self {
        NewValue::Bare(text.into())
    }

    pub fn string(text: impl Into<String>) -> Self {
        NewValue::String(text.into())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            NewValue::Bare(_) => ValueType::BareValue,
            NewValue::String(_) => ValueType::String,
            NewValue::Array(_) => ValueType::Array,
            NewValue::InlineTable(_) => ValueType::InlineTable,
        }
    }
}

impl From<i64> for NewValue {
    fn from(value: i64) -> Self {
        NewValue::Bare(value.to_string())
    }
}

impl From<bool> for NewValue {
    fn from(value: bool) -> Self {
        NewValue::Bare(value.to_string())
    }
}

/// Where [`Document::insert`] places a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// After the last entry of the parent. Key/value pairs and comments go
    /// before trailing blank lines, and at the root before the first table.
    Append,
    /// Before a sibling, above the comment lines attached to it.
    Before(Cursor),
    After(Cursor),
}

#[derive(Clone, Copy)]
enum Anchor {
    End,
    Before(usize),
    After(usize),
}

impl Document {
    /// Run `op`, dropping any spans it pushed if it fails.
    fn rollback<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mark = self.tree.len();
        let result = op(self);
        if result.is_err() {
            self.tree.truncate(mark);
        }
        result
    }

    fn empty_slice(&self) -> Slice {
        Slice::empty(Region::Boneyard, self.buffer.boneyard_len())
    }

    fn detached(&mut self, kind: SpanKind, body: Body) -> Result<SpanId> {
        self.tree.push(Span {
            kind,
            parent: None,
            state: SpanState::Detached,
            body,
        })
    }

    /// Parse `raw` into a value owned by `owner` and append its text to the
    /// boneyard at the offset the slices point to.
    fn build_boneyard_value(&mut self, raw: &str, owner: SpanId) -> Result<Value> {
        let base = self.buffer.boneyard_len();
        let value = builder::build_value(
            raw,
            Region::Boneyard,
            base,
            &mut self.tree,
            owner,
            self.config.max_depth,
        )?;
        self.buffer.append_boneyard(raw)?;
        let state = self.tree.span(owner)?.state;
        if let Some(node) = value.node {
            self.tree.set_state(node, state);
        }
        Ok(value)
    }

    /// New detached key/value pair.
    pub fn create_keyval(&mut self, key: &str, value: &NewValue) -> Result<Cursor> {
        let raw = self.render_value(value, None)?;
        self.create_keyval_raw(key, &raw)
    }

    /// New detached key/value pair whose value is given as TOML text.
    pub fn create_keyval_raw(&mut self, key: &str, raw: &str) -> Result<Cursor> {
        let (key_quote, key_text) = render_key(key)?;
        let raw = raw.trim();
        let id = self.rollback(|doc| {
            let empty = doc.empty_slice();
            let placeholder = Value {
                ty: ValueType::BareValue,
                quote: Quote::None,
                text: empty,
                node: None,
            };
            let id = doc.detached(
                SpanKind::LeafKeyval,
                Body::KeyVal(KeyVal {
                    lead: empty,
                    key: empty,
                    key_quote,
                    eq: empty,
                    value: placeholder,
                    trail: empty,
                }),
            )?;
            let value = doc.build_boneyard_value(raw, id)?;
            let key = doc.buffer.append_boneyard(&key_text)?;
            let eq = doc.buffer.intern(&doc.config.key_value_separator)?;
            if let Body::KeyVal(kv) = &mut doc.tree.span_mut(id)?.body {
                kv.key = key;
                kv.eq = eq;
                kv.value = value;
            }
            Ok(id)
        })?;
        trace!("created key/value `{key}` as {id}");
        Ok(self.cursor(id))
    }

    /// New detached comment line. A missing `#` is added.
    pub fn create_comment(&mut self, text: &str) -> Result<Cursor> {
        if text.contains(['\n', '\r']) {
            return Err(Error::invalid_arg("comment text must be a single line"));
        }
        let text = if text.starts_with('#') {
            text.to_string()
        } else if text.is_empty() {
            "#".to_string()
        } else {
            format!("# {text}")
        };
        let id = self.rollback(|doc| {
            let slice = doc.buffer.append_boneyard(&text)?;
            let empty = doc.empty_slice();
            doc.detached(
                SpanKind::LeafComment,
                Body::Comment(Comment {
                    lead: empty,
                    text: slice,
                    trail: empty,
                }),
            )
        })?;
        trace!("created comment as {id}");
        Ok(self.cursor(id))
    }

    /// New detached `[name]` table. A name that is not a valid header
    /// expression is written as one quoted key.
    pub fn create_table(&mut self, name: &str) -> Result<Cursor> {
        self.create_header_table(name, SpanKind::NodeTable)
    }

    /// New detached `[[name]]` array table.
    pub fn create_array_table(&mut self, name: &str) -> Result<Cursor> {
        self.create_header_table(name, SpanKind::NodeArrayTable)
    }

    fn create_header_table(&mut self, name: &str, kind: SpanKind) -> Result<Cursor> {
        let rendered = render_table_name(name)?;
        let (open, close) = match kind {
            SpanKind::NodeArrayTable => ("[[", "]]"),
            _ => ("[", "]"),
        };
        let id = self.rollback(|doc| {
            let (open, name, close) = doc.header_slices(open, &rendered, close)?;
            let newline = doc.newline();
            let trail = doc.buffer.intern(newline)?;
            let lead = doc.empty_slice();
            doc.detached(
                kind,
                Body::Node(Node {
                    header: Some(Header {
                        lead,
                        open,
                        name,
                        close,
                        trail,
                    }),
                    open: None,
                    items: Vec::new(),
                    close: None,
                }),
            )
        })?;
        trace!("created {kind} `{name}` as {id}");
        Ok(self.cursor(id))
    }

    /// New detached array element.
    pub fn create_value(&mut self, value: &NewValue) -> Result<Cursor> {
        let raw = self.render_value(value, None)?;
        self.create_value_raw(&raw)
    }

    pub fn create_value_raw(&mut self, raw: &str) -> Result<Cursor> {
        let raw = raw.trim();
        let id = self.rollback(|doc| {
            let empty = doc.empty_slice();
            let id = doc.detached(
                SpanKind::SliceValue,
                Body::Element(Value {
                    ty: ValueType::BareValue,
                    quote: Quote::None,
                    text: empty,
                    node: None,
                }),
            )?;
            let value = doc.build_boneyard_value(raw, id)?;
            doc.tree.span_mut(id)?.body = Body::Element(value);
            Ok(id)
        })?;
        Ok(self.cursor(id))
    }

    /// Create a key/value pair and insert it in one step.
    pub fn insert_keyval(
        &mut self,
        parent: Cursor,
        key: &str,
        value: &NewValue,
        position: Position,
    ) -> Result<Cursor> {
        self.rollback(|doc| {
            let child = doc.create_keyval(key, value)?;
            doc.insert(parent, child, position)?;
            Ok(child)
        })
    }

    /// Splice a detached span into `parent`.
    pub fn insert(&mut self, parent: Cursor, child: Cursor, position: Position) -> Result<()> {
        let parent_span = parent.resolve(self)?;
        let parent_kind = parent_span.kind;
        let parent_state = parent_span.state;
        let is_root = parent_span.parent.is_none() && parent.span_id() == self.tree.root();
        let Some(node) = parent_span.node() else {
            return Err(Error::wrong_kind("table or array", parent_kind));
        };

        let child_span = child.resolve(self)?;
        let child_kind = child_span.kind;
        if child_span.state != SpanState::Detached || child_span.parent.is_some() {
            return Err(Error::invalid_arg(format!(
                "span {} is already part of the tree",
                child.span_id()
            )));
        }
        let allowed = match parent_kind {
            SpanKind::NodeArray => child_kind == SpanKind::SliceValue,
            SpanKind::NodeInlineTable => child_kind == SpanKind::LeafKeyval,
            _ if is_root => child_kind.is_leaf() || child_kind.is_header_table(),
            _ => child_kind.is_leaf(),
        };
        if !allowed {
            let expected = match parent_kind {
                SpanKind::NodeArray => "array element",
                SpanKind::NodeInlineTable => "key/value",
                _ if is_root => "key/value, comment or table",
                _ => "key/value or comment",
            };
            return Err(Error::wrong_kind(expected, child_kind));
        }

        // A detached subtree may not receive itself.
        let mut ancestor = Some(parent.span_id());
        while let Some(id) = ancestor {
            if id == child.span_id() {
                return Err(Error::invalid_arg("cannot insert a span into itself"));
            }
            ancestor = self.tree.get(id).and_then(|span| span.parent);
        }

        let anchor = match position {
            Position::Append => Anchor::End,
            Position::Before(sibling) | Position::After(sibling) => {
                sibling.resolve(self)?;
                let index = node.position_of(sibling.span_id()).ok_or_else(|| {
                    Error::invalid_arg(format!(
                        "span {} is not a child of span {}",
                        sibling.span_id(),
                        parent.span_id()
                    ))
                })?;
                match position {
                    Position::Before(_) => Anchor::Before(index),
                    _ => Anchor::After(index),
                }
            }
        };

        let (index, plan) = match parent_kind {
            SpanKind::NodeArray | SpanKind::NodeInlineTable => {
                self.plan_list_insert(parent.span_id(), child.span_id(), child_kind, anchor)?
            }
            _ => self.plan_table_insert(parent.span_id(), child.span_id(), child_kind, is_root, anchor)?,
        };

        if !plan.adopt.is_empty() {
            self.tree
                .node_mut(child.span_id())?
                .items
                .try_reserve(plan.adopt.len())?;
        }
        let items = &mut self.tree.node_mut(parent.span_id())?.items;
        items.try_reserve(plan.items.len())?;
        let _replaced: Vec<Item> = items.splice(index..index + plan.replace, plan.items).collect();
        if let Some((table, from)) = plan.adopt_tail {
            self.tree.node_mut(table)?.items.truncate(from);
        }
        if !plan.adopt.is_empty() {
            let adopted = &mut self.tree.node_mut(child.span_id())?.items;
            adopted.extend(plan.adopt.iter().copied().map(Item::Child));
            for id in &plan.adopt {
                if let Some(span) = self.tree.get_mut(*id) {
                    span.parent = Some(child.span_id());
                }
            }
        }
        if let Some(span) = self.tree.get_mut(child.span_id()) {
            span.parent = Some(parent.span_id());
            plan.slices.apply(&mut span.body);
        }
        self.tree.set_state(child.span_id(), parent_state);
        self.mark_modified();
        trace!(
            "inserted {child_kind} {} into {parent_kind} {} at item {index}",
            child.span_id(),
            parent.span_id()
        );
        Ok(())
    }

    fn plan_table_insert(
        &mut self,
        parent: SpanId,
        child: SpanId,
        child_kind: SpanKind,
        is_root: bool,
        anchor: Anchor,
    ) -> Result<(usize, InsertPlan)> {
        let node = self.node(parent)?;
        let items = &node.items;
        let table_like = child_kind.is_header_table();
        let first_table = items
            .iter()
            .position(|item| self.is_header_child(item));

        let mut plan = InsertPlan::default();
        let mut index = match anchor {
            Anchor::End if table_like => items.len(),
            Anchor::End => {
                let end = match first_table {
                    Some(at) if is_root => at,
                    _ => items.len(),
                };
                skip_back_trivia(items, end - self.attached_to_next_header(parent, end))
            }
            Anchor::Before(index) if !table_like => {
                index
                    - comment_run(&self.tree, parent, index)
                        .iter()
                        .filter(|id| self.parent_of(**id) == Some(parent))
                        .count()
            }
            Anchor::Before(index) => index,
            Anchor::After(index) => index + 1,
        };

        // A new table lands above the comments attached to the header after
        // it and takes them into its own body, where a reparse puts them.
        if table_like && is_root {
            let mut at = index;
            while items.get(at).is_some_and(|item| self.is_comment_child(item)) {
                at += 1;
            }
            if items.get(at).is_some_and(|item| self.is_header_child(item)) {
                let run = comment_run(&self.tree, parent, at);
                let in_root = run
                    .iter()
                    .filter(|id| self.parent_of(**id) == Some(parent))
                    .count();
                let in_table = run.len() - in_root;
                if in_table > 0 {
                    let table = run.first().and_then(|id| self.parent_of(*id));
                    if let Some(table) = table {
                        let len = self.node(table)?.items.len();
                        plan.adopt_tail = Some((table, len - in_table));
                    }
                }
                index = at - in_root;
                plan.replace = in_root;
                plan.adopt = run;
            }
        }

        if is_root {
            let misplaced = if table_like {
                items[index..].iter().any(|item| {
                    item.child()
                        .and_then(|id| self.tree.get(id))
                        .is_some_and(|span| span.kind == SpanKind::LeafKeyval)
                })
            } else {
                items[..index].iter().any(|item| self.is_header_child(item))
            };
            if misplaced {
                return Err(Error::invalid_arg(if table_like {
                    "tables must follow the root's key/value pairs"
                } else {
                    "root key/value pairs and comments must precede tables"
                }));
            }
        }

        let ends_line = self.preceding_ends_line(parent, index);
        let lead = if table_like {
            None
        } else {
            self.sibling_lead(items, index)
        };
        let has_content_before = index > 0 || !is_root;
        // Line-level trivia is blank lines, so one above the table is enough.
        let blank_before = ends_line
            && match plan.adopt_tail {
                Some((table, from)) => self
                    .node(table)?
                    .items
                    .get(from.wrapping_sub(1))
                    .is_some_and(|item| matches!(item, Item::Trivia(_))),
                None => index
                    .checked_sub(1)
                    .is_some_and(|before| matches!(items[before], Item::Trivia(_))),
            };

        let newline = self.newline();
        if !ends_line {
            plan.items.push(Item::Trivia(self.buffer.intern(newline)?));
        }
        if table_like && has_content_before && !blank_before {
            plan.items.push(Item::Trivia(self.buffer.intern(newline)?));
        }
        plan.items.push(Item::Child(child));
        plan.slices.lead = Some(lead.unwrap_or_else(|| self.empty_slice()));
        // A header always ends its line; a key/value or comment at the end of
        // input without a line ending keeps that shape.
        plan.slices.trail = Some(if ends_line || table_like {
            self.buffer.intern(newline)?
        } else {
            self.empty_slice()
        });
        Ok((index, plan))
    }

    fn plan_list_insert(
        &mut self,
        parent: SpanId,
        child: SpanId,
        child_kind: SpanKind,
        anchor: Anchor,
    ) -> Result<(usize, InsertPlan)> {
        let items = self.node(parent)?.items.clone();
        let is_inline = self.tree.span(parent)?.kind == SpanKind::NodeInlineTable;
        let separator = self.list_separator(&items);
        let (pre_comma, _) = self.config.array_separator_parts();
        let pre_comma = pre_comma.to_string();
        let padding = is_inline && self.config.inline_table_padding;

        let mut plan = InsertPlan::default();
        if child_kind == SpanKind::LeafKeyval {
            let empty = self.empty_slice();
            plan.slices.lead = Some(empty);
            plan.slices.trail = Some(empty);
        }

        let comma = |doc: &mut Document, plan: &mut InsertPlan| -> Result<()> {
            if !pre_comma.is_empty() {
                plan.items.push(Item::Trivia(doc.buffer.intern(&pre_comma)?));
            }
            plan.items.push(Item::Comma(doc.buffer.intern(",")?));
            Ok(())
        };
        let sep = |doc: &mut Document, plan: &mut InsertPlan| -> Result<()> {
            if !separator.is_empty() {
                plan.items.push(Item::Trivia(doc.buffer.intern(&separator)?));
            }
            Ok(())
        };

        let last_child = items.iter().rposition(|item| item.child().is_some());
        let index = match (anchor, last_child) {
            (Anchor::End, None) => {
                if padding {
                    let pad = self.buffer.intern(" ")?;
                    plan.items.push(Item::Trivia(pad));
                    plan.items.push(Item::Child(child));
                    plan.items.push(Item::Trivia(pad));
                } else {
                    plan.items.push(Item::Child(child));
                }
                // Blank padding such as `[ ]` is replaced, not kept.
                if items.iter().all(|item| is_horizontal_trivia(&self.buffer, item)) {
                    plan.replace = items.len();
                }
                0
            }
            (Anchor::End, Some(last)) | (Anchor::After(last), _) => {
                match comma_after(&items, last) {
                    Some(comma_index) => {
                        sep(self, &mut plan)?;
                        plan.items.push(Item::Child(child));
                        plan.items.push(Item::Comma(self.buffer.intern(",")?));
                        comma_index + 1
                    }
                    None => {
                        comma(self, &mut plan)?;
                        sep(self, &mut plan)?;
                        plan.items.push(Item::Child(child));
                        last + 1
                    }
                }
            }
            (Anchor::Before(index), _) => {
                plan.items.push(Item::Child(child));
                comma(self, &mut plan)?;
                sep(self, &mut plan)?;
                index
            }
        };
        Ok((index, plan))
    }

    /// Unlink a span from its parent. Its bytes stay where they are.
    pub fn remove(&mut self, target: Cursor) -> Result<()> {
        let span = target.resolve(self)?;
        let (kind, state, parent) = (span.kind, span.state, span.parent);
        let id = target.span_id();
        if id == self.tree.root() {
            return Err(Error::invalid_arg("the root table cannot be removed"));
        }
        let Some(parent) = parent else {
            // Never inserted: nothing to unlink.
            self.tree.set_state(id, SpanState::Removed);
            trace!("discarded {state:?} {kind} {id}");
            return Ok(());
        };
        let parent_span = self.tree.span(parent)?;
        let parent_kind = parent_span.kind;
        let Some(index) = parent_span.node().and_then(|node| node.position_of(id)) else {
            return Err(Error::invalid_arg(
                "array and inline table values are replaced with set_value, not removed",
            ));
        };
        if kind.is_header_table() {
            // Comments closing the table's body outlive it in the parent.
            let (from, kept) = self.trailing_comments(id)?;
            self.tree.node_mut(parent)?.items.try_reserve(kept.len())?;
            self.tree.node_mut(id)?.items.truncate(from);
            for item in &kept {
                if let Some(span) = item.child().and_then(|child| self.tree.get_mut(child)) {
                    span.parent = Some(parent);
                }
            }
            let _removed: Vec<Item> = self
                .tree
                .node_mut(parent)?
                .items
                .splice(index..=index, kept)
                .collect();
        } else {
            let doomed = match parent_kind {
                SpanKind::NodeArray | SpanKind::NodeInlineTable => {
                    let items = self.node(parent)?.items.clone();
                    self.plan_list_removal(&items, index)
                }
                _ => vec![index],
            };
            let items = &mut self.tree.node_mut(parent)?.items;
            for at in doomed.into_iter().rev() {
                items.remove(at);
            }
        }
        self.tree.set_state(id, SpanState::Removed);
        self.mark_modified();
        trace!("removed {kind} {id} from {parent_kind} {parent}");
        Ok(())
    }

    /// Start index and items of the comment lines, with the blank lines
    /// between and after them, that end a table's body.
    fn trailing_comments(&self, table: SpanId) -> Result<(usize, Vec<Item>)> {
        let items = &self.node(table)?.items;
        let mut from = items.len();
        let mut first_comment = None;
        while from > 0 {
            let item = &items[from - 1];
            if self.is_comment_child(item) {
                first_comment = Some(from - 1);
            } else if !matches!(item, Item::Trivia(_)) {
                break;
            }
            from -= 1;
        }
        Ok(match first_comment {
            Some(at) => (at, items[at..].to_vec()),
            None => (items.len(), Vec::new()),
        })
    }

    /// Item indices to drop, ascending, when removing `items[index]` from an
    /// array or inline table.
    fn plan_list_removal(&self, items: &[Item], index: usize) -> Vec<usize> {
        let next = (index + 1..items.len()).find(|&i| !matches!(items[i], Item::Trivia(_)));
        let prev = (0..index).rev().find(|&i| !matches!(items[i], Item::Trivia(_)));
        let is_comment = |i: usize| match items[i] {
            Item::Trivia(slice) => self.buffer.slice_text(&slice).contains('#'),
            _ => false,
        };

        if let Some(comma) = next.filter(|&i| matches!(items[i], Item::Comma(_))) {
            // `[a, b, c]` loses `b, ` and `[\n  a,\n  b,\n]` loses `\n  a,`.
            let leading_trivia = index.checked_sub(1).filter(|&i| {
                matches!(items[i], Item::Trivia(_))
                    && !is_comment(i)
                    && (i == 0 || matches!(items[i - 1], Item::Comma(_)))
            });
            let mut doomed: Vec<usize> = leading_trivia.into_iter().collect();
            doomed.extend((index..comma).filter(|&i| !is_comment(i)));
            doomed.push(comma);
            if leading_trivia.is_none()
                && items
                    .get(comma + 1)
                    .is_some_and(|after| is_horizontal_trivia(&self.buffer, after))
            {
                doomed.push(comma + 1);
            }
            return doomed;
        }
        if let Some(comma) = prev.filter(|&i| matches!(items[i], Item::Comma(_))) {
            return (comma..=index).filter(|&i| !is_comment(i)).collect();
        }
        vec![index]
    }

    /// Replace the value of a key/value pair or array element.
    ///
    /// A string replacing a string keeps the existing quote style.
    pub fn set_value(&mut self, target: Cursor, value: &NewValue) -> Result<()> {
        let span = target.resolve(self)?;
        let current = *span
            .value()
            .ok_or_else(|| Error::wrong_kind("key/value or array element", span.kind))?;
        let quote = (current.ty == ValueType::String).then_some(current.quote);
        let raw = self.render_value(value, quote)?;
        self.replace_value(target, &raw)
    }

    /// Replace a value with raw text such as `[1, 2]` or `"quoted"`.
    ///
    /// The text must parse as exactly one value; otherwise the document is
    /// left unchanged and a syntax error is returned.
    pub fn set_value_raw(&mut self, target: Cursor, raw: &str) -> Result<()> {
        self.replace_value(target, raw.trim())
    }

    /// Replace a value with text given as lines, joined with the document's
    /// line ending.
    pub fn set_value_lines<S: AsRef<str>>(&mut self, target: Cursor, lines: &[S]) -> Result<()> {
        let raw = lines
            .iter()
            .map(|line| line.as_ref())
            .collect::<Vec<_>>()
            .join(self.newline());
        self.set_value_raw(target, &raw)
    }

    /// [`set_value`](Self::set_value) guarded by the current value text.
    pub fn set_value_verified(
        &mut self,
        target: Cursor,
        value: &NewValue,
        expected: &Expected,
    ) -> Result<()> {
        let current = target.value_text(self)?;
        if !expected.matches(&current) {
            return Err(Error::invalid_arg(format!(
                "current value {current:?} does not match the expected value"
            )));
        }
        self.set_value(target, value)
    }

    fn replace_value(&mut self, target: Cursor, raw: &str) -> Result<()> {
        let span = target.resolve(self)?;
        let kind = span.kind;
        let old = *span
            .value()
            .ok_or_else(|| Error::wrong_kind("key/value or array element", kind))?;
        let id = target.span_id();
        let value = self.rollback(|doc| doc.build_boneyard_value(raw, id))?;
        if let Some(node) = old.node {
            self.tree.set_state(node, SpanState::Removed);
        }
        match &mut self.tree.span_mut(id)?.body {
            Body::KeyVal(kv) => kv.value = value,
            body => *body = Body::Element(value),
        }
        self.mark_modified();
        trace!("replaced value of {kind} {id} with {} bytes", raw.len());
        Ok(())
    }

    /// Change the key of a key/value pair or the name of a table header.
    pub fn rename(&mut self, target: Cursor, name: &str) -> Result<()> {
        let span = target.resolve(self)?;
        let kind = span.kind;
        let header = span.header().copied();
        let id = target.span_id();
        match kind {
            SpanKind::LeafKeyval => {
                let (quote, text) = render_key(name)?;
                let key = self.buffer.append_boneyard(&text)?;
                if let Body::KeyVal(kv) = &mut self.tree.span_mut(id)?.body {
                    kv.key = key;
                    kv.key_quote = quote;
                }
            }
            SpanKind::NodeTable | SpanKind::NodeArrayTable => {
                let Some(header) = header else {
                    return Err(Error::wrong_kind("key/value or table header", kind));
                };
                let rendered = render_table_name(name)?;
                let open = self
                    .buffer
                    .slice_text(&header.open)
                    .trim_end_matches(['"', '\''])
                    .to_string();
                let close = self
                    .buffer
                    .slice_text(&header.close)
                    .trim_start_matches(['"', '\''])
                    .to_string();
                let (open, name, close) = self.header_slices(&open, &rendered, &close)?;
                if let Body::Node(Node {
                    header: Some(header),
                    ..
                }) = &mut self.tree.span_mut(id)?.body
                {
                    header.open = open;
                    header.name = name;
                    header.close = close;
                }
            }
            _ => return Err(Error::wrong_kind("key/value or table header", kind)),
        }
        self.mark_modified();
        trace!("renamed {kind} {id} to `{name}`");
        Ok(())
    }

    fn node(&self, id: SpanId) -> Result<&Node> {
        let span = self.tree.span(id)?;
        span.node()
            .ok_or_else(|| Error::wrong_kind("table or array", span.kind))
    }

    fn is_header_child(&self, item: &Item) -> bool {
        item.child()
            .and_then(|id| self.tree.get(id))
            .is_some_and(|span| span.kind.is_header_table())
    }

    fn is_comment_child(&self, item: &Item) -> bool {
        item.child()
            .and_then(|id| self.tree.get(id))
            .is_some_and(|span| span.kind == SpanKind::LeafComment)
    }

    fn parent_of(&self, id: SpanId) -> Option<SpanId> {
        self.tree.get(id).and_then(|span| span.parent)
    }

    /// Comment children just before `items[end]` of `parent` that the next
    /// table header in the root claims as its own.
    fn attached_to_next_header(&self, parent: SpanId, end: usize) -> usize {
        let root = self.tree.root();
        let Some(root_node) = self.tree.get(root).and_then(Span::node) else {
            return 0;
        };
        let mut at = if parent == root {
            end
        } else {
            match root_node.position_of(parent) {
                Some(index) => index + 1,
                None => return 0,
            }
        };
        while root_node
            .items
            .get(at)
            .is_some_and(|item| self.is_comment_child(item))
        {
            at += 1;
        }
        if !root_node
            .items
            .get(at)
            .is_some_and(|item| self.is_header_child(item))
        {
            return 0;
        }
        comment_run(&self.tree, root, at)
            .into_iter()
            .filter(|id| self.parent_of(*id) == Some(parent))
            .count()
    }

    /// Interned delimiters around a boneyard copy of a rendered header name.
    fn header_slices(
        &mut self,
        open: &str,
        (quote, name): &(Quote, String),
        close: &str,
    ) -> Result<(Slice, Slice, Slice)> {
        let delimiter = quote.delimiter();
        let open = self.buffer.intern(&format!("{open}{delimiter}"))?;
        let name = self.buffer.append_boneyard(name)?;
        let close = self.buffer.intern(&format!("{delimiter}{close}"))?;
        Ok((open, name, close))
    }

    /// Whether the text emitted before `items[index]` of `parent` ends a line.
    fn preceding_ends_line(&self, parent: SpanId, index: usize) -> bool {
        let Ok(node) = self.node(parent) else {
            return true;
        };
        for item in node.items[..index].iter().rev() {
            let text = item_to_string(&self.tree, &self.buffer, item);
            if !text.is_empty() {
                return text.ends_with('\n');
            }
        }
        if let Some(header) = &node.header {
            let text: String = [header.lead, header.open, header.name, header.close, header.trail]
                .iter()
                .map(|slice| self.buffer.slice_text(slice))
                .collect();
            if !text.is_empty() {
                return text.ends_with('\n');
            }
        }
        match self.tree.get(parent).and_then(|span| span.parent) {
            // A table with an empty header: look at what precedes it in the root.
            Some(grand) => self
                .node(grand)
                .ok()
                .and_then(|root| root.position_of(parent))
                .map_or(true, |at| self.preceding_ends_line(grand, at)),
            None => true,
        }
    }

    /// Indentation of the nearest key/value or comment sibling.
    fn sibling_lead(&self, items: &[Item], index: usize) -> Option<Slice> {
        let lead_of = |item: &Item| {
            let span = self.tree.get(item.child()?)?;
            match &span.body {
                Body::KeyVal(kv) => Some(kv.lead),
                Body::Comment(comment) => Some(comment.lead),
                _ => None,
            }
        };
        items[..index]
            .iter()
            .rev()
            .find_map(&lead_of)
            .or_else(|| items[index..].iter().find_map(&lead_of))
    }

    /// Text between a comma and the next element, following the list's
    /// existing style where it has one.
    fn list_separator(&self, items: &[Item]) -> String {
        for (i, item) in items.iter().enumerate() {
            if !matches!(item, Item::Comma(_)) {
                continue;
            }
            match (items.get(i + 1), items.get(i + 2)) {
                (Some(Item::Child(_)), _) => return String::new(),
                (Some(Item::Trivia(slice)), Some(Item::Child(_))) => {
                    return strip_comment(self.buffer.slice_text(slice));
                }
                _ => {}
            }
        }
        if let (Some(Item::Trivia(slice)), Some(Item::Child(_))) = (items.first(), items.get(1)) {
            let text = self.buffer.slice_text(slice);
            if text.contains('\n') {
                return strip_comment(text);
            }
        }
        self.config.array_separator_parts().1.to_string()
    }

    /// Text for `value`; `quote` is the style of the string being replaced.
    fn render_value(&self, value: &NewValue, quote: Option<Quote>) -> Result<String> {
        match value {
            NewValue::Bare(text) => {
                let mut tokens = lexer::lex(text);
                match (tokens.next(), tokens.next()) {
                    (Some(token), None)
                        if token.kind == TokenKind::Bare && token.range.len() == text.len() =>
                    {
                        Ok(text.clone())
                    }
                    _ => Err(Error::syntax(0, format!("`{text}` is not a bare value"))),
                }
            }
            NewValue::String(text) => {
                let preferred = quote.unwrap_or(match self.config.string_style {
                    StringStyle::Basic => Quote::Basic,
                    StringStyle::Literal => Quote::Literal,
                });
                let (quote, payload) = encode_string(text, preferred);
                let delimiter = quote.delimiter();
                Ok(format!("{delimiter}{payload}{delimiter}"))
            }
            NewValue::Array(elements) => {
                let parts = elements
                    .iter()
                    .map(|element| self.render_value(element, None))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("[{}]", parts.join(&self.config.array_separator)))
            }
            NewValue::InlineTable(entries) => {
                if entries.is_empty() {
                    return Ok("{}".to_string());
                }
                let parts = entries
                    .iter()
                    .map(|(key, value)| {
                        let (quote, key) = render_key(key)?;
                        let delimiter = quote.delimiter();
                        let value = self.render_value(value, None)?;
                        Ok(format!(
                            "{delimiter}{key}{delimiter}{}{value}",
                            self.config.key_value_separator
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let pad = if self.config.inline_table_padding { " " } else { "" };
                Ok(format!("{{{pad}{}{pad}}}", parts.join(&self.config.array_separator)))
            }
        }
    }
}

/// Items and slices an insertion applies once nothing else can fail.
#[derive(Default)]
struct InsertPlan {
    items: Vec<Item>,
    /// Existing items at the insertion index to drop.
    replace: usize,
    slices: ChildSlices,
    /// Comment spans that move into the inserted table, in document order.
    adopt: Vec<SpanId>,
    /// Table whose items from the given index are among `adopt`.
    adopt_tail: Option<(SpanId, usize)>,
}

#[derive(Default)]
struct ChildSlices {
    lead: Option<Slice>,
    trail: Option<Slice>,
}

impl ChildSlices {
    fn apply(&self, body: &mut Body) {
        let (lead, trail) = match body {
            Body::KeyVal(kv) => (&mut kv.lead, &mut kv.trail),
            Body::Comment(comment) => (&mut comment.lead, &mut comment.trail),
            Body::Node(Node {
                header: Some(header),
                ..
            }) => (&mut header.lead, &mut header.trail),
            _ => return,
        };
        if let Some(slice) = self.lead {
            *lead = slice;
        }
        if let Some(slice) = self.trail {
            *trail = slice;
        }
    }
}

fn skip_back_trivia(items: &[Item], mut index: usize) -> usize {
    while index > 0 && matches!(items[index - 1], Item::Trivia(_)) {
        index -= 1;
    }
    index
}

fn comma_after(items: &[Item], index: usize) -> Option<usize> {
    items[index + 1..]
        .iter()
        .position(|item| !matches!(item, Item::Trivia(_)))
        .map(|offset| index + 1 + offset)
        .filter(|&i| matches!(items[i], Item::Comma(_)))
}

fn is_horizontal_trivia(buffer: &crate::buffer::Buffer, item: &Item) -> bool {
    match item {
        Item::Trivia(slice) => buffer
            .slice_text(slice)
            .chars()
            .all(|c| c == ' ' || c == '\t'),
        _ => false,
    }
}

/// Keep only the line break and indentation of separator trivia.
fn strip_comment(text: &str) -> String {
    match (text.contains('#'), text.rfind('\n')) {
        (true, Some(at)) => text[at..].to_string(),
        _ => text.to_string(),
    }
}

fn is_bare_key(key: &str) -> bool {
    key.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Quote style and payload for a key. Keys containing dots are quoted so
/// that they stay one literal key.
fn render_key(key: &str) -> Result<(Quote, String)> {
    if key.is_empty() {
        return Err(Error::invalid_arg("key must not be empty"));
    }
    if key.chars().any(char::is_control) {
        return Err(Error::invalid_arg(format!(
            "key {key:?} contains a control character"
        )));
    }
    if is_bare_key(key) {
        return Ok((Quote::None, key.to_string()));
    }
    if !key.contains(['"', '\\']) {
        return Ok((Quote::Basic, key.to_string()));
    }
    if !key.contains('\'') {
        return Ok((Quote::Literal, key.to_string()));
    }
    Err(Error::invalid_arg(format!(
        "key {key:?} mixes quote characters and cannot be written literally"
    )))
}

/// Quote style and text for a table name. A valid header expression such
/// as `a.b` or `a."b c"` is kept as written; anything else is quoted as one
/// key.
fn render_table_name(name: &str) -> Result<(Quote, String)> {
    let name = name.trim();
    let parts: Vec<Token> = lexer::lex(name)
        .filter(|token| token.kind != TokenKind::Whitespace)
        .collect();
    let expression = !parts.is_empty()
        && parts.iter().all(|token| token.kind.is_key_part())
        && parts
            .windows(2)
            .all(|pair| builder::joins_key_parts(pair[0].text(name), pair[1].text(name)));
    if !expression {
        return render_key(name);
    }
    match parts.as_slice() {
        [single] if single.kind != TokenKind::Bare => {
            let quote = match single.kind {
                TokenKind::BasicString => Quote::Basic,
                _ => Quote::Literal,
            };
            let text = single.text(name);
            Ok((quote, text[1..text.len() - 1].to_string()))
        }
        _ => Ok((Quote::None, name.to_string())),
    }
}

/// Payload for `text` in the `preferred` style, falling back to a style
/// that can hold it.
fn encode_string(text: &str, preferred: Quote) -> (Quote, String) {
    let has_control = |allowed: &[char]| {
        text.chars()
            .any(|c| c.is_control() && !allowed.contains(&c))
    };
    // A line break right after an opening `'''` or `"""` is dropped by readers.
    let leading_newline = text.starts_with('\n');
    match preferred {
        Quote::Literal if !text.contains('\'') && !has_control(&['\t']) => {
            (Quote::Literal, text.to_string())
        }
        Quote::MlLiteral
            if !text.contains("'''")
                && !text.ends_with('\'')
                && !leading_newline
                && !has_control(&['\t', '\n']) =>
        {
            (Quote::MlLiteral, text.to_string())
        }
        Quote::MlBasic | Quote::MlLiteral => {
            let payload = escape(text, true);
            let payload = if leading_newline {
                format!("\\n{}", &payload[1..])
            } else {
                payload
            };
            (Quote::MlBasic, payload)
        }
        _ => (Quote::Basic, escape(text, false)),
    }
}

fn escape(text: &str, multiline: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' if multiline => out.push('\n'),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::parse(text).unwrap()
    }

    fn find(doc: &Document, path: &[&str]) -> Cursor {
        doc.root().find_path(doc, path).unwrap()
    }

    #[test]
    fn insert_after_keeps_siblings() {
        let mut doc = doc("x=1\ny=2\n");
        let x = find(&doc, &["x"]);
        let y = find(&doc, &["y"]);
        let y_before = y.text(&doc).unwrap();
        let z = doc.create_keyval("z", &NewValue::from(3)).unwrap();
        doc.insert(doc.root(), z, Position::After(x)).unwrap();
        assert_eq!(doc.serialize(), "x=1\nz = 3\ny=2\n");
        assert_eq!(y.text(&doc).unwrap(), y_before);
        let keys: Vec<String> = doc
            .root()
            .children(&doc)
            .unwrap()
            .map(|c| c.key_text(&doc).unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["x", "z", "y"]);
    }

    #[test]
    fn append_goes_before_trailing_blank_lines_and_tables() {
        let mut doc = doc("a = 1\n\n# about t\n[t]\nb = 2\n\n");
        doc.insert_keyval(doc.root(), "c", &NewValue::string("x"), Position::Append)
            .unwrap();
        let t = find(&doc, &["t"]);
        doc.insert_keyval(t, "d", &NewValue::from(true), Position::Append)
            .unwrap();
        assert_eq!(
            doc.serialize(),
            "a = 1\nc = \"x\"\n\n# about t\n[t]\nb = 2\nd = true\n\n"
        );
    }

    #[test]
    fn append_copies_indentation() {
        let mut doc = doc("[t]\n  a = 1\n");
        let t = find(&doc, &["t"]);
        doc.insert_keyval(t, "b", &NewValue::from(2), Position::Append)
            .unwrap();
        assert_eq!(doc.serialize(), "[t]\n  a = 1\n  b = 2\n");
    }

    #[test]
    fn append_at_end_without_newline() {
        let mut doc = doc("a = 1");
        doc.insert_keyval(doc.root(), "b", &NewValue::from(2), Position::Append)
            .unwrap();
        assert_eq!(doc.serialize(), "a = 1\nb = 2");
        let table = doc.create_table("t").unwrap();
        doc.insert(doc.root(), table, Position::Append).unwrap();
        assert_eq!(doc.serialize(), "a = 1\nb = 2\n\n[t]\n");
    }

    #[test]
    fn insert_before_goes_above_attached_comments() {
        let mut doc = doc("a = 1\n# about b\nb = 2\n");
        let b = find(&doc, &["b"]);
        doc.insert_keyval(doc.root(), "n", &NewValue::from(0), Position::Before(b))
            .unwrap();
        assert_eq!(doc.serialize(), "a = 1\nn = 0\n# about b\nb = 2\n");
    }

    #[test]
    fn tables_and_root_keys_keep_their_order() {
        let mut doc = doc("a = 1\n[t]\n");
        let a = find(&doc, &["a"]);
        let t = find(&doc, &["t"]);
        let table = doc.create_table("u").unwrap();
        let err = doc.insert(doc.root(), table, Position::Before(a)).unwrap_err();
        assert!(matches!(err, Error::InvalidArg { .. }));
        let kv = doc.create_keyval("k", &NewValue::from(1)).unwrap();
        let err = doc.insert(doc.root(), kv, Position::After(t)).unwrap_err();
        assert!(matches!(err, Error::InvalidArg { .. }));
        assert_eq!(doc.serialize(), "a = 1\n[t]\n");
        assert!(!doc.is_modified());
    }

    #[test]
    fn new_table_with_entries() {
        let mut doc = doc("a = 1\n");
        let table = doc.create_array_table("bin").unwrap();
        doc.insert_keyval(table, "name", &NewValue::string("tool"), Position::Append)
            .unwrap();
        doc.insert(doc.root(), table, Position::Append).unwrap();
        assert_eq!(doc.serialize(), "a = 1\n\n[[bin]]\nname = \"tool\"\n");
        let name = find(&doc, &["bin", "name"]);
        assert!(name.is_attached(&doc));
    }

    #[test]
    fn type_errors() {
        let mut doc = doc("a = 1\nl = [1]\n");
        let a = find(&doc, &["a"]);
        let table = doc.create_table("t").unwrap();
        assert!(matches!(
            doc.insert(a, table, Position::Append),
            Err(Error::Type { .. })
        ));
        let list = find(&doc, &["l"]).value_node(&doc).unwrap();
        assert!(matches!(
            doc.insert(list, table, Position::Append),
            Err(Error::Type { .. })
        ));
    }

    #[test]
    fn invalid_keys() {
        let mut doc = doc("");
        assert!(matches!(
            doc.create_keyval("", &NewValue::from(1)),
            Err(Error::InvalidArg { .. })
        ));
        assert!(matches!(
            doc.create_keyval("a\nb", &NewValue::from(1)),
            Err(Error::InvalidArg { .. })
        ));
        assert!(matches!(
            doc.create_keyval("k", &NewValue::bare("not bare")),
            Err(Error::Syntax { .. })
        ));
    }

    #[test]
    fn dotted_key_is_quoted() {
        let mut doc = doc("");
        doc.insert_keyval(doc.root(), "a.b", &NewValue::from(1), Position::Append)
            .unwrap();
        assert_eq!(doc.serialize(), "\"a.b\" = 1\n");
        assert!(doc.root().find(&doc, "a.b").is_ok());
    }

    #[test]
    fn array_insert_follows_style() {
        let mut doc = doc("a = [1, 2]\nb = [\n  'x',\n]\nc = []\n");
        let a = find(&doc, &["a"]).value_node(&doc).unwrap();
        let three = doc.create_value(&NewValue::from(3)).unwrap();
        doc.insert(a, three, Position::Append).unwrap();
        let zero = doc.create_value(&NewValue::from(0)).unwrap();
        let first = a.first_child(&doc).unwrap().unwrap();
        doc.insert(a, zero, Position::Before(first)).unwrap();

        let b = find(&doc, &["b"]).value_node(&doc).unwrap();
        let y = doc.create_value(&NewValue::string("y")).unwrap();
        doc.insert(b, y, Position::Append).unwrap();

        let c = find(&doc, &["c"]).value_node(&doc).unwrap();
        let one = doc.create_value(&NewValue::from(1)).unwrap();
        doc.insert(c, one, Position::Append).unwrap();

        assert_eq!(
            doc.serialize(),
            "a = [0, 1, 2, 3]\nb = [\n  'x',\n  \"y\",\n]\nc = [1]\n"
        );
    }

    #[test]
    fn inline_table_insert_and_remove() {
        let mut doc = doc("p = {}\nq = { x = 1, y = 2 }\n");
        let p = find(&doc, &["p"]).value_node(&doc).unwrap();
        doc.insert_keyval(p, "k", &NewValue::string("v"), Position::Append)
            .unwrap();
        let q = find(&doc, &["q"]);
        let x = q.find(&doc, "x").unwrap();
        doc.remove(x).unwrap();
        assert_eq!(doc.serialize(), "p = { k = \"v\" }\nq = { y = 2 }\n");
    }

    #[test]
    fn array_removal_cleans_commas() {
        let mut doc = doc("a = [1, 2, 3]\nb = [\n  1,\n  2,\n]\nc = [1]\n");
        let a: Vec<Cursor> = find(&doc, &["a"]).elements(&doc).unwrap().collect();
        doc.remove(a[1]).unwrap();
        doc.remove(a[2]).unwrap();
        let b: Vec<Cursor> = find(&doc, &["b"]).elements(&doc).unwrap().collect();
        doc.remove(b[0]).unwrap();
        let c: Vec<Cursor> = find(&doc, &["c"]).elements(&doc).unwrap().collect();
        doc.remove(c[0]).unwrap();
        assert_eq!(doc.serialize(), "a = [1]\nb = [\n  2,\n]\nc = []\n");
    }

    #[test]
    fn removal_orphans_comments() {
        let mut doc = doc("x=1\n# note\ny=2\n");
        let y = find(&doc, &["y"]);
        doc.remove(y).unwrap();
        assert_eq!(doc.serialize(), "x=1\n# note\n");
        assert!(!y.is_valid(&doc));
        assert!(matches!(y.key_text(&doc), Err(Error::StaleCursor { .. })));
        assert!(matches!(doc.remove(y), Err(Error::StaleCursor { .. })));
        assert!(matches!(
            doc.remove(doc.root()),
            Err(Error::InvalidArg { .. })
        ));
    }

    #[test]
    fn removing_a_table_invalidates_its_children() {
        let mut doc = doc("[t]\na = [1]\n[u]\n");
        let t = find(&doc, &["t"]);
        let a = find(&doc, &["t", "a"]);
        let array = a.value_node(&doc).unwrap();
        doc.remove(t).unwrap();
        assert_eq!(doc.serialize(), "[u]\n");
        assert!(!a.is_valid(&doc));
        assert!(!array.is_valid(&doc));
    }

    #[test]
    fn removing_a_table_keeps_its_closing_comments() {
        let mut doc = doc("[a]\nx = 1\n\n# end of file\n");
        let a = find(&doc, &["a"]);
        doc.remove(a).unwrap();
        assert_eq!(doc.serialize(), "# end of file\n");
        let comment = doc.root().first_child(&doc).unwrap().unwrap();
        assert_eq!(comment.kind(&doc).unwrap(), SpanKind::LeafComment);
        assert_eq!(comment.parent(&doc).unwrap(), Some(doc.root()));

        let mut doc = doc_with_next_header();
        let a = find(&doc, &["a"]);
        let b = find(&doc, &["b"]);
        doc.remove(a).unwrap();
        assert_eq!(doc.serialize(), "# about b\n[b]\n");
        assert_eq!(b.leading_comments(&doc).unwrap().len(), 1);
    }

    fn doc_with_next_header() -> Document {
        doc("[a]\nx = 1\n# about b\n[b]\n")
    }

    #[test]
    fn append_keeps_comments_a_blank_line_separates_from_the_next_table() {
        let mut root = doc("# file header\n\n[t]\n");
        root.insert_keyval(root.root(), "k", &NewValue::from(1), Position::Append)
            .unwrap();
        assert_eq!(root.serialize(), "# file header\nk = 1\n\n[t]\n");

        let mut table = doc("[a]\nx = 1\n# note on a\n\n[b]\n");
        let a = find(&table, &["a"]);
        table
            .insert_keyval(a, "y", &NewValue::from(2), Position::Append)
            .unwrap();
        assert_eq!(table.serialize(), "[a]\nx = 1\n# note on a\ny = 2\n\n[b]\n");
    }

    #[test]
    fn append_stays_above_comments_attached_to_the_next_table() {
        let mut doc = doc_with_next_header();
        let a = find(&doc, &["a"]);
        doc.insert_keyval(a, "y", &NewValue::from(2), Position::Append)
            .unwrap();
        assert_eq!(doc.serialize(), "[a]\nx = 1\ny = 2\n# about b\n[b]\n");
    }

    #[test]
    fn new_table_before_a_table_leaves_its_comments_attached() {
        let mut edited = doc_with_next_header();
        let b = find(&edited, &["b"]);
        let n = edited.create_table("n").unwrap();
        edited.insert(edited.root(), n, Position::Before(b)).unwrap();
        let text = edited.serialize();
        assert_eq!(text, "[a]\nx = 1\n\n[n]\n# about b\n[b]\n");
        assert_eq!(b.leading_comments(&edited).unwrap().len(), 1);
        assert_eq!(find(&edited, &["a"]).children(&edited).unwrap().count(), 1);

        let reparsed = Document::parse(&text).unwrap();
        let b = reparsed.root().find(&reparsed, "b").unwrap();
        assert_eq!(b.leading_comments(&reparsed).unwrap().len(), 1);

        let mut root_comment = doc("a = 1\n\n# about t\n[t]\n");
        let t = find(&root_comment, &["t"]);
        let n = root_comment.create_table("n").unwrap();
        root_comment
            .insert(root_comment.root(), n, Position::Before(t))
            .unwrap();
        assert_eq!(root_comment.serialize(), "a = 1\n\n[n]\n# about t\n[t]\n");
        assert_eq!(t.leading_comments(&root_comment).unwrap().len(), 1);
    }

    #[test]
    fn set_value_keeps_quote_style() {
        let mut doc = doc("a = 'old' # keep\nb = 1\n");
        let a = find(&doc, &["a"]);
        doc.set_value(a, &NewValue::string("new")).unwrap();
        let b = find(&doc, &["b"]);
        doc.set_value(b, &NewValue::string("it's")).unwrap();
        assert_eq!(doc.serialize(), "a = 'new' # keep\nb = \"it's\"\n");
    }

    #[test]
    fn literal_falls_back_when_needed() {
        let mut doc = doc("a = 'old'\n");
        let a = find(&doc, &["a"]);
        doc.set_value(a, &NewValue::string("it's \"q\"")).unwrap();
        assert_eq!(doc.serialize(), "a = \"it's \\\"q\\\"\"\n");
    }

    #[test]
    fn set_value_raw_is_all_or_nothing() {
        let mut doc = doc("a = 1\n");
        let a = find(&doc, &["a"]);
        let spans = doc.tree().len();
        assert!(matches!(
            doc.set_value_raw(a, "[1, 2"),
            Err(Error::Syntax { .. })
        ));
        assert_eq!(doc.tree().len(), spans);
        assert_eq!(doc.serialize(), "a = 1\n");
        assert!(!doc.is_modified());

        doc.set_value_raw(a, "[1, 2]").unwrap();
        assert_eq!(doc.serialize(), "a = [1, 2]\n");
        assert_eq!(a.value_type(&doc).unwrap(), ValueType::Array);
    }

    #[test]
    fn replaced_array_invalidates_old_elements() {
        let mut doc = doc("a = [1]\n");
        let a = find(&doc, &["a"]);
        let old = a.elements(&doc).unwrap().next().unwrap();
        doc.set_value(a, &NewValue::from(5)).unwrap();
        assert!(!old.is_valid(&doc));
        assert_eq!(a.value_text(&doc).unwrap(), "5");
    }

    #[test]
    fn set_value_lines_uses_document_newline() {
        let mut doc = doc("a = 1\r\n");
        let a = find(&doc, &["a"]);
        doc.set_value_lines(a, &["[", "  1,", "]"]).unwrap();
        assert_eq!(doc.serialize(), "a = [\r\n  1,\r\n]\r\n");
    }

    #[test]
    fn verified_set_checks_current_value() {
        let mut doc = doc("port = 8080\n");
        let port = find(&doc, &["port"]);
        let err = doc
            .set_value_verified(port, &NewValue::from(1), &Expected::Text("80".into()))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArg { .. }));
        doc.set_value_verified(port, &NewValue::from(9090), &Expected::from_text("8080"))
            .unwrap();
        assert_eq!(doc.serialize(), "port = 9090\n");
    }

    #[test]
    fn rename_keys_and_tables() {
        let mut doc = doc("[old]\nk = 1\n");
        let table = find(&doc, &["old"]);
        doc.rename(table, "new").unwrap();
        let k = find(&doc, &["new", "k"]);
        doc.rename(k, "with space").unwrap();
        assert_eq!(doc.serialize(), "[new]\n\"with space\" = 1\n");
        assert!(matches!(doc.rename(k, ""), Err(Error::InvalidArg { .. })));
        assert!(matches!(doc.rename(table, " "), Err(Error::InvalidArg { .. })));
    }

    #[test]
    fn table_names_that_are_not_header_expressions_are_quoted() {
        let mut doc = doc("[ old ]\nk = 1\n");
        let table = find(&doc, &["old"]);
        doc.rename(table, "a]b").unwrap();
        assert_eq!(doc.serialize(), "[ \"a]b\" ]\nk = 1\n");
        assert_eq!(table.key_text(&doc).unwrap(), "a]b");
        doc.rename(table, "a b").unwrap();
        assert_eq!(doc.serialize(), "[ \"a b\" ]\nk = 1\n");
        doc.rename(table, "a . \"b c\"").unwrap();
        assert_eq!(doc.serialize(), "[ a . \"b c\" ]\nk = 1\n");

        let quoted = doc.create_table("\"x.y\"").unwrap();
        doc.insert(doc.root(), quoted, Position::Append).unwrap();
        assert_eq!(quoted.key_text(&doc).unwrap(), "x.y");
        let text = doc.serialize();
        assert!(text.ends_with("\n\n[\"x.y\"]\n"));
        let reparsed = Document::parse(&text).unwrap();
        assert!(reparsed.root().find(&reparsed, "x.y").is_ok());
        assert!(reparsed.root().find(&reparsed, "a b").is_err());
    }

    #[test]
    fn inserting_twice_is_rejected() {
        let mut doc = doc("a = 1\n");
        let kv = doc.create_keyval("b", &NewValue::from(2)).unwrap();
        doc.insert(doc.root(), kv, Position::Append).unwrap();
        assert!(matches!(
            doc.insert(doc.root(), kv, Position::Append),
            Err(Error::InvalidArg { .. })
        ));
    }

    #[test]
    fn nested_new_values() {
        let mut doc = doc("");
        let value = NewValue::InlineTable(vec![
            ("list".into(), NewValue::Array(vec![1.into(), 2.into()])),
            ("name".into(), NewValue::string("a\"b")),
        ]);
        doc.insert_keyval(doc.root(), "t", &value, Position::Append)
            .unwrap();
        assert_eq!(
            doc.serialize(),
            "t = { list = [1, 2], name = \"a\\\"b\" }\n"
        );
        let list = find(&doc, &["t", "list"]);
        assert_eq!(list.elements(&doc).unwrap().count(), 2);
    }

    #[test]
    fn raw_creation_parses_first() {
        let mut doc = doc("a = [1]\n");
        let spans = doc.tree().len();
        assert!(matches!(
            doc.create_keyval_raw("b", "{ x = "),
            Err(Error::Syntax { .. })
        ));
        assert_eq!(doc.tree().len(), spans);
        let b = doc.create_keyval_raw("b", " { x = 1 } ").unwrap();
        doc.insert(doc.root(), b, Position::Append).unwrap();
        let list = find(&doc, &["a"]).value_node(&doc).unwrap();
        let element = doc.create_value_raw("'two'").unwrap();
        doc.insert(list, element, Position::Append).unwrap();
        assert_eq!(doc.serialize(), "a = [1, 'two']\nb = { x = 1 }\n");
    }

    #[test]
    fn comments_insert_with_hash() {
        let mut doc = doc("a = 1\n");
        let c = doc.create_comment("hello").unwrap();
        doc.insert(doc.root(), c, Position::Append).unwrap();
        assert_eq!(doc.serialize(), "a = 1\n# hello\n");
    }
}
