//! Token stream to span tree.
//!
//! The top level is read line by line: every key/value, comment and table
//! header owns its indentation and its line ending, and blank lines become
//! trivia of whichever table is open. Arrays and inline tables are read
//! token by token, keeping whitespace, newlines and comments between
//! elements as trivia items.
//!
//! The builder never recovers. On the first error it stops, and the caller
//! keeps whatever lines were fully built before it.

use crate::buffer::{Region, Slice};
use crate::errors::{Error, Result};
use crate::lexer::{self, Token, TokenKind};
use crate::tree::{
    Body, Comment, Header, Item, KeyVal, Node, Quote, Span, SpanId, SpanKind, SpanState, Tree,
    Value, ValueType,
};
use log::debug;
use std::io;
use std::ops::Range;

/// Build the top level of a document into `tree`.
pub(crate) fn build_document<I>(text: &str, tokens: I, max_depth: usize, tree: &mut Tree) -> Result<()>
where
    I: IntoIterator<Item = io::Result<Token>>,
{
    Builder::new(text, Region::Original, 0, tokens.into_iter(), max_depth).document(tree)
}

/// Parse `text` as exactly one value owned by `owner`.
///
/// Slices are placed at `base` inside `region`, so the caller can parse text
/// before appending it to the boneyard at that offset. Spans pushed by a
/// failed parse are left in the arena for the caller to truncate.
pub(crate) fn build_value(
    text: &str,
    region: Region,
    base: usize,
    tree: &mut Tree,
    owner: SpanId,
    max_depth: usize,
) -> Result<Value> {
    let mut builder = Builder::new(text, region, base, lexer::token_stream(text), max_depth);
    let value = builder.value(tree, owner)?;
    if let Some(token) = builder.peek()?.cloned() {
        return Err(Error::syntax(token.range.start, "unexpected text after value"));
    }
    Ok(value)
}

/// Whether two consecutive key tokens form one dotted key. Whitespace may
/// only appear next to a dot: `a . b` is one key, `a b` is not.
pub(crate) fn joins_key_parts(written: &str, next: &str) -> bool {
    written.ends_with('.') || next.starts_with('.')
}

/// Append `item` to `items`, merging adjacent trivia.
pub(crate) fn push_item(items: &mut Vec<Item>, item: Item) -> Result<()> {
    if let (Item::Trivia(next), Some(Item::Trivia(prev))) = (item, items.last_mut()) {
        if prev.region == next.region && prev.end == next.start {
            prev.end = next.end;
            return Ok(());
        }
    }
    items.try_reserve(1)?;
    items.push(item);
    Ok(())
}

struct Builder<'a, I> {
    text: &'a str,
    region: Region,
    base: usize,
    tokens: I,
    peeked: Option<Token>,
    offset: usize,
    max_depth: usize,
}

impl<'a, I> Builder<'a, I>
where
    I: Iterator<Item = io::Result<Token>>,
{
    fn new(text: &'a str, region: Region, base: usize, tokens: I, max_depth: usize) -> Self {
        Self {
            text,
            region,
            base,
            tokens,
            peeked: None,
            offset: 0,
            max_depth,
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>> {
        if self.peeked.is_none() {
            match self.tokens.next() {
                Some(Ok(token)) => self.peeked = Some(token),
                Some(Err(error)) => return Err(Error::Io(error)),
                None => {}
            }
        }
        Ok(self.peeked.as_ref())
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>> {
        Ok(self.peek()?.map(|token| token.kind))
    }

    fn bump(&mut self) -> Result<Token> {
        self.peek()?;
        let token = self
            .peeked
            .take()
            .ok_or_else(|| Error::syntax(self.offset, "unexpected end of input"))?;
        self.offset = token.range.end;
        Ok(token)
    }

    fn eat_whitespace(&mut self) -> Result<Range<usize>> {
        let start = self.offset;
        if self.peek_kind()? == Some(TokenKind::Whitespace) {
            self.bump()?;
        }
        Ok(start..self.offset)
    }

    fn slice(&self, range: Range<usize>) -> Slice {
        Slice::new(self.region, self.base + range.start, self.base + range.end)
    }

    fn text_of(&self, range: Range<usize>) -> &'a str {
        self.text.get(range).unwrap_or_default()
    }

    fn bad_token(&self, token: &Token) -> Error {
        let text = token.text(self.text);
        let message = match text.chars().next() {
            Some('"') | Some('\'') => "unterminated string".to_string(),
            Some(c) => format!("unexpected character `{c}`"),
            None => "unexpected end of input".to_string(),
        };
        Error::syntax(token.range.start, message)
    }

    fn unexpected(&self, token: &Token, expected: &str) -> Error {
        if token.kind == TokenKind::Error {
            return self.bad_token(token);
        }
        Error::syntax(
            token.range.start,
            format!("{expected}, found `{}`", token.text(self.text)),
        )
    }

    fn document(&mut self, tree: &mut Tree) -> Result<()> {
        let mut container = SpanId::ROOT;
        loop {
            let line_start = self.offset;
            let lead = self.eat_whitespace()?;
            let Some(token) = self.peek()?.cloned() else {
                if !lead.is_empty() {
                    push_item(&mut tree.node_mut(container)?.items, Item::Trivia(self.slice(lead)))?;
                }
                return Ok(());
            };
            let item = match token.kind {
                TokenKind::Newline => {
                    self.bump()?;
                    Item::Trivia(self.slice(line_start..self.offset))
                }
                TokenKind::Comment => Item::Child(self.comment_line(tree, container, lead)?),
                TokenKind::LBracket => {
                    container = self.table_header(tree, lead)?;
                    continue;
                }
                kind if kind.is_key_part() => {
                    Item::Child(self.keyval(tree, container, lead, false)?)
                }
                _ => {
                    return Err(self.unexpected(&token, "expected a key, table header or comment"))
                }
            };
            push_item(&mut tree.node_mut(container)?.items, item)?;
        }
    }

    fn comment_line(&mut self, tree: &mut Tree, parent: SpanId, lead: Range<usize>) -> Result<SpanId> {
        let comment = self.bump()?;
        let trail_start = self.offset;
        if self.peek_kind()? == Some(TokenKind::Newline) {
            self.bump()?;
        }
        let body = Body::Comment(Comment {
            lead: self.slice(lead),
            text: self.slice(comment.range),
            trail: self.slice(trail_start..self.offset),
        });
        tree.push(Span {
            kind: SpanKind::LeafComment,
            parent: Some(parent),
            state: SpanState::Attached,
            body,
        })
    }

    fn table_header(&mut self, tree: &mut Tree, lead: Range<usize>) -> Result<SpanId> {
        let open = self.bump()?;
        let mut is_array = false;
        if let Some(next) = self.peek()?.cloned() {
            if next.kind == TokenKind::LBracket && next.range.start == open.range.end {
                self.bump()?;
                is_array = true;
            }
        }
        self.eat_whitespace()?;
        let name_start = self.offset;
        let mut name_end = name_start;
        let mut parts = Vec::new();
        loop {
            let Some(token) = self.peek()?.cloned() else {
                return Err(Error::syntax(open.range.start, "unterminated table header"));
            };
            match token.kind {
                TokenKind::RBracket => break,
                TokenKind::Whitespace => {
                    self.bump()?;
                }
                kind if kind.is_key_part() => {
                    self.check_key_join(name_start..name_end, &token)?;
                    name_end = self.bump()?.range.end;
                    parts.push(kind);
                }
                TokenKind::Newline => {
                    return Err(Error::syntax(token.range.start, "unterminated table header"))
                }
                _ => return Err(self.unexpected(&token, "expected a table name")),
            }
        }
        if name_end == name_start {
            return Err(Error::syntax(name_start, "empty table name"));
        }
        let close = self.bump()?;
        if is_array {
            match self.peek()?.cloned() {
                Some(next) if next.kind == TokenKind::RBracket && next.range.start == close.range.end => {
                    self.bump()?;
                }
                _ => {
                    return Err(Error::syntax(
                        close.range.start,
                        "expected `]]` to close array table header",
                    ))
                }
            }
        }
        let close_end = self.offset;
        let trail = self.line_trail("expected end of line after table header")?;

        let kind = if is_array {
            SpanKind::NodeArrayTable
        } else {
            SpanKind::NodeTable
        };
        debug!(
            "{} `{}` at byte {}",
            kind,
            self.text_of(name_start..name_end),
            self.base + open.range.start
        );
        // A single quoted name keeps its quotes in the delimiters, like a
        // quoted key, so lookups see the bare name.
        let quote = match parts.as_slice() {
            [TokenKind::BasicString] | [TokenKind::LiteralString] => 1,
            _ => 0,
        };
        let header = Header {
            lead: self.slice(lead),
            open: self.slice(open.range.start..name_start + quote),
            name: self.slice(name_start + quote..name_end - quote),
            close: self.slice(name_end - quote..close_end),
            trail: self.slice(trail),
        };
        let id = tree.push(Span {
            kind,
            parent: Some(SpanId::ROOT),
            state: SpanState::Attached,
            body: Body::Node(Node {
                header: Some(header),
                open: None,
                items: Vec::new(),
                close: None,
            }),
        })?;
        push_item(&mut tree.node_mut(SpanId::ROOT)?.items, Item::Child(id))?;
        Ok(id)
    }

    /// Key parts written so far must meet `next` at a dot.
    fn check_key_join(&self, written: Range<usize>, next: &Token) -> Result<()> {
        if written.is_empty() || joins_key_parts(self.text_of(written), next.text(self.text)) {
            Ok(())
        } else {
            Err(Error::syntax(next.range.start, "expected `.` between key parts"))
        }
    }

    /// Whitespace, optional comment, then a line ending or end of input.
    fn line_trail(&mut self, expected: &str) -> Result<Range<usize>> {
        let start = self.offset;
        self.eat_whitespace()?;
        if self.peek_kind()? == Some(TokenKind::Comment) {
            self.bump()?;
        }
        match self.peek()?.cloned() {
            None => {}
            Some(token) if token.kind == TokenKind::Newline => {
                self.bump()?;
            }
            Some(token) => return Err(self.unexpected(&token, expected)),
        }
        Ok(start..self.offset)
    }

    fn keyval(
        &mut self,
        tree: &mut Tree,
        parent: SpanId,
        lead: Range<usize>,
        inline: bool,
    ) -> Result<SpanId> {
        let (key, key_quote, eq) = self.key_and_eq()?;
        let placeholder = Value {
            ty: ValueType::BareValue,
            quote: Quote::None,
            text: Slice::empty(self.region, self.base + self.offset),
            node: None,
        };
        let id = tree.push(Span {
            kind: SpanKind::LeafKeyval,
            parent: Some(parent),
            state: SpanState::Attached,
            body: Body::KeyVal(KeyVal {
                lead: self.slice(lead.clone()),
                key,
                key_quote,
                eq,
                value: placeholder,
                trail: placeholder.text,
            }),
        })?;
        let value = self.value(tree, id)?;
        let trail = if inline {
            self.offset..self.offset
        } else {
            self.line_trail("expected end of line after value")?
        };
        let trail = self.slice(trail);
        if let Body::KeyVal(kv) = &mut tree.span_mut(id)?.body {
            kv.value = value;
            kv.trail = trail;
        }
        Ok(id)
    }

    fn key_and_eq(&mut self) -> Result<(Slice, Quote, Slice)> {
        let key_start = self.offset;
        let mut key_end = key_start;
        let mut parts = 0usize;
        let mut first: Option<Token> = None;
        loop {
            let Some(token) = self.peek()?.cloned() else {
                return Err(Error::syntax(self.offset, "expected `=` after key"));
            };
            match token.kind {
                TokenKind::Equals => break,
                TokenKind::Whitespace => {
                    self.bump()?;
                }
                kind if kind.is_key_part() => {
                    self.check_key_join(key_start..key_end, &token)?;
                    let token = self.bump()?;
                    key_end = token.range.end;
                    parts += 1;
                    first.get_or_insert(token);
                }
                _ => return Err(self.unexpected(&token, "expected `=` after key")),
            }
        }
        self.bump()?;
        self.eat_whitespace()?;
        let eq = self.slice(key_end..self.offset);

        let quoted = match first {
            Some(token) if parts == 1 => match token.kind {
                TokenKind::BasicString => Some(Quote::Basic),
                TokenKind::LiteralString => Some(Quote::Literal),
                _ => None,
            },
            _ => None,
        };
        let (key, quote) = match quoted {
            Some(quote) => (self.slice(key_start + 1..key_end - 1), quote),
            None => (self.slice(key_start..key_end), Quote::None),
        };
        Ok((key, quote, eq))
    }

    fn value(&mut self, tree: &mut Tree, owner: SpanId) -> Result<Value> {
        let Some(token) = self.peek()?.cloned() else {
            return Err(Error::syntax(self.offset, "expected a value"));
        };
        let (quote, trim) = match token.kind {
            TokenKind::BasicString => (Quote::Basic, 1),
            TokenKind::LiteralString => (Quote::Literal, 1),
            TokenKind::MlBasicString => (Quote::MlBasic, 3),
            TokenKind::MlLiteralString => (Quote::MlLiteral, 3),
            TokenKind::Bare => {
                self.bump()?;
                return Ok(Value {
                    ty: ValueType::BareValue,
                    quote: Quote::None,
                    text: self.slice(token.range),
                    node: None,
                });
            }
            TokenKind::LBracket => return self.array(tree, owner),
            TokenKind::LBrace => return self.inline_table(tree, owner),
            _ => return Err(self.unexpected(&token, "expected a value")),
        };
        self.bump()?;
        let Range { start, end } = token.range;
        Ok(Value {
            ty: ValueType::String,
            quote,
            text: self.slice(start + trim..end - trim),
            node: None,
        })
    }

    fn open_node(&mut self, tree: &mut Tree, owner: SpanId, kind: SpanKind) -> Result<(Token, SpanId)> {
        let open = self.bump()?;
        let depth = tree.depth(owner) + 1;
        if depth > self.max_depth {
            return Err(Error::syntax(
                open.range.start,
                format!("nesting deeper than {} levels", self.max_depth),
            ));
        }
        let id = tree.push(Span {
            kind,
            parent: Some(owner),
            state: SpanState::Attached,
            body: Body::Node(Node {
                header: None,
                open: Some(self.slice(open.range.clone())),
                items: Vec::new(),
                close: None,
            }),
        })?;
        Ok((open, id))
    }

    fn close_node(&self, tree: &mut Tree, id: SpanId, items: Vec<Item>, close: Token) -> Result<()> {
        let node = tree.node_mut(id)?;
        node.items = items;
        node.close = Some(self.slice(close.range));
        Ok(())
    }

    fn array(&mut self, tree: &mut Tree, owner: SpanId) -> Result<Value> {
        let (open, id) = self.open_node(tree, owner, SpanKind::NodeArray)?;
        let mut items = Vec::new();
        let mut need_comma = false;
        let close = loop {
            let Some(token) = self.peek()?.cloned() else {
                return Err(Error::syntax(open.range.start, "unterminated array"));
            };
            match token.kind {
                TokenKind::RBracket => break self.bump()?,
                kind if kind.is_trivia() => {
                    self.bump()?;
                    push_item(&mut items, Item::Trivia(self.slice(token.range)))?;
                }
                TokenKind::Comma => {
                    if !need_comma {
                        return Err(Error::syntax(token.range.start, "unexpected `,` in array"));
                    }
                    self.bump()?;
                    push_item(&mut items, Item::Comma(self.slice(token.range)))?;
                    need_comma = false;
                }
                _ => {
                    if need_comma {
                        return Err(Error::syntax(
                            token.range.start,
                            "expected `,` between array elements",
                        ));
                    }
                    let element = tree.push(Span {
                        kind: SpanKind::SliceValue,
                        parent: Some(id),
                        state: SpanState::Attached,
                        body: Body::Element(Value {
                            ty: ValueType::BareValue,
                            quote: Quote::None,
                            text: Slice::empty(self.region, self.base + token.range.start),
                            node: None,
                        }),
                    })?;
                    let value = self.value(tree, element)?;
                    tree.span_mut(element)?.body = Body::Element(value);
                    push_item(&mut items, Item::Child(element))?;
                    need_comma = true;
                }
            }
        };
        let text = self.slice(open.range.start..close.range.end);
        self.close_node(tree, id, items, close)?;
        Ok(Value {
            ty: ValueType::Array,
            quote: Quote::None,
            text,
            node: Some(id),
        })
    }

    fn inline_table(&mut self, tree: &mut Tree, owner: SpanId) -> Result<Value> {
        let (open, id) = self.open_node(tree, owner, SpanKind::NodeInlineTable)?;
        let mut items = Vec::new();
        let mut need_comma = false;
        let close = loop {
            let Some(token) = self.peek()?.cloned() else {
                return Err(Error::syntax(open.range.start, "unterminated inline table"));
            };
            match token.kind {
                TokenKind::RBrace => break self.bump()?,
                kind if kind.is_trivia() => {
                    self.bump()?;
                    push_item(&mut items, Item::Trivia(self.slice(token.range)))?;
                }
                TokenKind::Comma => {
                    if !need_comma {
                        return Err(Error::syntax(
                            token.range.start,
                            "unexpected `,` in inline table",
                        ));
                    }
                    self.bump()?;
                    push_item(&mut items, Item::Comma(self.slice(token.range)))?;
                    need_comma = false;
                }
                kind if kind.is_key_part() => {
                    if need_comma {
                        return Err(Error::syntax(
                            token.range.start,
                            "expected `,` between inline table entries",
                        ));
                    }
                    let at = self.offset..self.offset;
                    let entry = self.keyval(tree, id, at, true)?;
                    push_item(&mut items, Item::Child(entry))?;
                    need_comma = true;
                }
                _ => return Err(self.unexpected(&token, "expected a key in inline table")),
            }
        };
        let text = self.slice(open.range.start..close.range.end);
        self.close_node(tree, id, items, close)?;
        Ok(Value {
            ty: ValueType::InlineTable,
            quote: Quote::None,
            text,
            node: Some(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token_stream;

    fn build(text: &str) -> (Tree, Result<()>) {
        let mut tree = Tree::new();
        let result = build_document(text, token_stream(text), 128, &mut tree);
        (tree, result)
    }

    fn root_kinds(tree: &Tree) -> Vec<SpanKind> {
        tree.children(SpanId::ROOT)
            .map(|id| tree.get(id).unwrap().kind)
            .collect()
    }

    fn syntax_offset(result: Result<()>) -> usize {
        match result {
            Err(Error::Syntax { offset, .. }) => offset,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn top_level_lines() {
        let (tree, result) = build("# c\na = 1\n\n[t]\nb = 2\n");
        result.unwrap();
        assert_eq!(
            root_kinds(&tree),
            vec![
                SpanKind::LeafComment,
                SpanKind::LeafKeyval,
                SpanKind::NodeTable
            ]
        );
    }

    #[test]
    fn quoted_key_drops_quotes() {
        let text = "\"a.b\" = 1\n";
        let (tree, result) = build(text);
        result.unwrap();
        let id = tree.children(SpanId::ROOT).next().unwrap();
        let Body::KeyVal(kv) = &tree.get(id).unwrap().body else {
            panic!("expected key/value");
        };
        assert_eq!(&text[kv.key.start..kv.key.end], "a.b");
        assert_eq!(kv.key_quote, Quote::Basic);
    }

    #[test]
    fn string_value_excludes_delimiters() {
        let text = "s = '''raw'''\n";
        let (tree, result) = build(text);
        result.unwrap();
        let id = tree.children(SpanId::ROOT).next().unwrap();
        let value = tree.get(id).unwrap().value().unwrap();
        assert_eq!(&text[value.text.start..value.text.end], "raw");
        assert_eq!(value.quote, Quote::MlLiteral);
    }

    #[test]
    fn array_elements_skip_trivia() {
        let (tree, result) = build("a = [\n  1, # one\n  2,\n]\n");
        result.unwrap();
        let kv = tree.children(SpanId::ROOT).next().unwrap();
        let array = tree.get(kv).unwrap().value().unwrap().node.unwrap();
        assert_eq!(tree.children(array).count(), 2);
        assert_eq!(tree.get(array).unwrap().parent, Some(kv));
    }

    #[test]
    fn array_table_header() {
        let (tree, result) = build("[[items]]\nname = 'x'\n[[items]]\n");
        result.unwrap();
        assert_eq!(
            root_kinds(&tree),
            vec![SpanKind::NodeArrayTable, SpanKind::NodeArrayTable]
        );
    }

    #[test]
    fn quoted_header_name_drops_quotes() {
        let text = "[ \"a.b\" ]\n";
        let (tree, result) = build(text);
        result.unwrap();
        let id = tree.children(SpanId::ROOT).next().unwrap();
        let header = tree.get(id).unwrap().header().unwrap();
        assert_eq!(&text[header.name.start..header.name.end], "a.b");
        assert_eq!(&text[header.open.start..header.open.end], "[ \"");
        assert_eq!(&text[header.close.start..header.close.end], "\" ]");
    }

    #[test]
    fn key_parts_need_a_dot_between_them() {
        assert_eq!(syntax_offset(build("a b = 1\n").1), 2);
        assert_eq!(syntax_offset(build("[a b]\n").1), 3);
        assert_eq!(syntax_offset(build("'x'\"y\" = 1\n").1), 3);
        build("a . b = 1\n").1.unwrap();
        build("\"x\".y = 1\n").1.unwrap();
        build("[ a . 'b' ]\n").1.unwrap();
    }

    #[test]
    fn missing_equals() {
        let (_, result) = build("a\n");
        assert_eq!(syntax_offset(result), 1);
    }

    #[test]
    fn missing_value() {
        let (_, result) = build("a =\n");
        assert_eq!(syntax_offset(result), 3);
    }

    #[test]
    fn trailing_garbage() {
        let (_, result) = build("a = 1 2\n");
        assert_eq!(syntax_offset(result), 6);
    }

    #[test]
    fn unbalanced_array() {
        let (_, result) = build("a = [1, 2\n");
        assert_eq!(syntax_offset(result), 4);
    }

    #[test]
    fn comma_errors() {
        assert_eq!(syntax_offset(build("a = [,1]\n").1), 5);
        assert_eq!(syntax_offset(build("a = [1,,2]\n").1), 7);
        assert_eq!(syntax_offset(build("a = [1 2]\n").1), 7);
    }

    #[test]
    fn depth_limit() {
        let mut tree = Tree::new();
        let text = "a = [[[1]]]\n";
        let result = build_document(text, token_stream(text), 2, &mut tree);
        assert!(matches!(result, Err(Error::Syntax { .. })));
    }

    #[test]
    fn partial_tree_keeps_complete_lines() {
        let (tree, result) = build("a = 1\nb = \n");
        assert!(result.is_err());
        assert_eq!(root_kinds(&tree), vec![SpanKind::LeafKeyval]);
    }

    #[test]
    fn io_error_from_token_source() {
        let mut tree = Tree::new();
        let tokens = vec![
            Ok(Token::new(TokenKind::Bare, 0..1)),
            Err(io::Error::new(io::ErrorKind::Other, "source failed")),
        ];
        let result = build_document("a = 1", tokens, 128, &mut tree);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn value_parse_rejects_leftovers() {
        let mut tree = Tree::new();
        let result = build_value("1 2", Region::Boneyard, 0, &mut tree, SpanId::ROOT, 128);
        assert!(matches!(result, Err(Error::Syntax { offset: 1, .. })));
    }

    #[test]
    fn inline_table_entries() {
        let (tree, result) = build("p = { x = 1, y = \"two\" }\n");
        result.unwrap();
        let kv = tree.children(SpanId::ROOT).next().unwrap();
        let table = tree.get(kv).unwrap().value().unwrap().node.unwrap();
        assert_eq!(tree.get(table).unwrap().kind, SpanKind::NodeInlineTable);
        assert_eq!(tree.children(table).count(), 2);
    }
}
