//! The document: one buffer and one span tree with a single owner.

use crate::buffer::Buffer;
use crate::config::EditConfig;
use crate::cursor::Cursor;
use crate::errors::{Error, ParseError, Result};
use crate::lexer::{self, Token};
use crate::tree::builder;
use crate::tree::serialize::{self, Writer};
use crate::tree::{Body, SpanId, SpanKind, SpanState, Tree, ValueType};
use crate::validate;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use xxhash_rust::xxh3::xxh3_64;

static NEXT_DOC_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`Document`], carried by every [`Cursor`] it hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocId(u64);

impl DocId {
    fn next() -> Self {
        DocId(NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
pub struct Document {
    id: DocId,
    pub(crate) buffer: Buffer,
    pub(crate) tree: Tree,
    pub(crate) config: EditConfig,
    newline: &'static str,
    modified: bool,
}

impl Clone for Document {
    /// The clone is a separate document: cursors from `self` are rejected by it.
    fn clone(&self) -> Self {
        Self {
            id: DocId::next(),
            buffer: self.buffer.clone(),
            tree: self.tree.clone(),
            config: self.config.clone(),
            newline: self.newline,
            modified: self.modified,
        }
    }
}

impl Document {
    fn empty(text: &str, config: EditConfig) -> Self {
        Self {
            id: DocId::next(),
            buffer: Buffer::new(text),
            tree: Tree::new(),
            newline: config.newline.resolve(text),
            config,
            modified: false,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Self::parse_with(text, EditConfig::default())
    }

    pub fn parse_with(text: &str, config: EditConfig) -> Result<Self, ParseError> {
        Self::from_tokens(text, lexer::token_stream(text), config)
    }

    /// Build from an external token source.
    ///
    /// `tokens` must cover `text` losslessly, in order. An `Err` item aborts
    /// the build with an I/O error.
    pub fn from_tokens<I>(text: &str, tokens: I, config: EditConfig) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = io::Result<Token>>,
    {
        let mut doc = Self::empty(text, config);
        let result = builder::build_document(text, tokens, doc.config.max_depth, &mut doc.tree)
            .and_then(|()| {
                if doc.config.strict {
                    validate::validate_document(text)
                } else {
                    Ok(())
                }
            });
        match result {
            Ok(()) => {
                debug!("parsed {} bytes into {} spans", text.len(), doc.tree.len());
                Ok(doc)
            }
            Err(error) => {
                warn!("parse stopped: {error}");
                Err(ParseError {
                    error,
                    partial: Box::new(doc),
                })
            }
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        Self::load_with(path, EditConfig::default())
    }

    pub fn load_with(path: impl AsRef<Path>, config: EditConfig) -> Result<Self, ParseError> {
        match fs::read_to_string(path.as_ref()) {
            Ok(text) => Self::parse_with(&text, config),
            Err(error) => Err(ParseError {
                error: Error::Io(error),
                partial: Box::new(Self::empty("", config)),
            }),
        }
    }

    /// Write the serialization to `path` atomically.
    ///
    /// Uses tempfile + fsync + rename for crash safety.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        atomic_write(path.as_ref(), self.serialize().as_bytes())
    }

    pub fn write_to<W: Write>(&self, mut sink: W) -> Result<()> {
        sink.write_all(self.serialize().as_bytes())?;
        sink.flush()?;
        Ok(())
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn root(&self) -> Cursor {
        Cursor::new(self.id, self.tree.root())
    }

    pub(crate) fn cursor(&self, span: SpanId) -> Cursor {
        Cursor::new(self.id, span)
    }

    pub fn serialize(&self) -> String {
        let mut writer = Writer::new(&self.tree, &self.buffer);
        writer.span(self.tree.root());
        writer.finish()
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn config(&self) -> &EditConfig {
        &self.config
    }

    /// Line ending used for new text.
    pub fn newline(&self) -> &'static str {
        self.newline
    }

    /// Reparse the current text into a fresh document.
    ///
    /// This is the only way to reclaim boneyard bytes. Cursors into `self`
    /// are not valid for the result.
    pub fn compact(&self) -> Result<Document> {
        let text = self.serialize();
        let before = self.buffer.boneyard_len();
        let mut fresh = Self::parse_with(&text, self.config.clone()).map_err(|err| err.error)?;
        fresh.newline = self.newline;
        debug!("compacted document, dropped {before} boneyard bytes");
        Ok(fresh)
    }

    /// xxh3 hash of the current serialization.
    pub fn fingerprint(&self) -> u64 {
        xxh3_64(self.serialize().as_bytes())
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Full TOML validation of the current text.
    pub fn validate(&self) -> Result<()> {
        validate::validate_document(&self.serialize())
    }

    /// Serializable summary of the live tree.
    pub fn outline(&self) -> Outline {
        self.outline_span(self.tree.root())
    }

    fn outline_span(&self, id: SpanId) -> Outline {
        let mut outline = Outline {
            id,
            kind: self.tree.get(id).map_or(SpanKind::None, |span| span.kind),
            key: None,
            value_type: None,
            value: None,
            comment: None,
            children: Vec::new(),
        };
        let Some(span) = self.tree.get(id) else {
            return outline;
        };
        let mut nested = None;
        match &span.body {
            Body::Node(node) => {
                if let Some(header) = &node.header {
                    outline.key = Some(self.buffer.slice_text(&header.name).to_string());
                }
                outline.children = node
                    .children()
                    .filter(|child| self.is_live(*child))
                    .map(|child| self.outline_span(child))
                    .collect();
            }
            Body::KeyVal(kv) => {
                outline.key = Some(self.buffer.slice_text(&kv.key).to_string());
                outline.value_type = Some(kv.value.ty);
                nested = kv.value.node;
                if nested.is_none() {
                    outline.value = Some(self.buffer.slice_text(&kv.value.text).to_string());
                }
            }
            Body::Element(value) => {
                outline.value_type = Some(value.ty);
                nested = value.node;
                if nested.is_none() {
                    outline.value = Some(self.buffer.slice_text(&value.text).to_string());
                }
            }
            Body::Comment(comment) => {
                outline.comment = Some(self.buffer.slice_text(&comment.text).to_string());
            }
        }
        if let Some(node) = nested {
            outline.children = vec![self.outline_span(node)];
        }
        outline
    }

    pub(crate) fn is_live(&self, id: SpanId) -> bool {
        self.tree
            .get(id)
            .is_some_and(|span| span.state == SpanState::Attached)
    }

    pub(crate) fn span_text(&self, id: SpanId) -> String {
        serialize::span_to_string(&self.tree, &self.buffer, id)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// One span of [`Document::outline`].
#[derive(Debug, Clone, Serialize)]
pub struct Outline {
    pub id: SpanId,
    pub kind: SpanKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Outline>,
}

fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    // Tempfile in the same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Code;

    #[test]
    fn parse_and_serialize() {
        let text = "a = 1\n[t]\nb = 'x'\n";
        let doc = Document::parse(text).unwrap();
        assert_eq!(doc.serialize(), text);
        assert_eq!(doc.to_string(), text);
        assert!(!doc.is_modified());
    }

    #[test]
    fn parse_error_keeps_partial() {
        let err = Document::parse("a = 1\nb = [1,\n").unwrap_err();
        assert_eq!(err.code(), Code::ErrSyntax);
        let partial = err.into_partial();
        assert_eq!(partial.serialize(), "a = 1\n");
    }

    #[test]
    fn strict_mode_rejects_duplicates() {
        let config = EditConfig {
            strict: true,
            ..EditConfig::default()
        };
        let err = Document::parse_with("a = 1\na = 2\n", config).unwrap_err();
        assert_eq!(err.code(), Code::ErrSyntax);
        assert_eq!(err.into_partial().serialize(), "a = 1\na = 2\n");
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let doc = Document::parse("# keep\nname = \"x\"\n").unwrap();
        doc.save(&path).unwrap();
        let loaded = Document::load(&path).unwrap();
        assert_eq!(loaded.serialize(), "# keep\nname = \"x\"\n");
    }

    #[test]
    fn load_missing_file_is_io() {
        let err = Document::load("/nonexistent/tomlspan/doc.toml").unwrap_err();
        assert_eq!(err.code(), Code::ErrIo);
    }

    #[test]
    fn write_to_sink() {
        let doc = Document::parse("x = 1\n").unwrap();
        let mut out = Vec::new();
        doc.write_to(&mut out).unwrap();
        assert_eq!(out, b"x = 1\n");
    }

    #[test]
    fn crlf_detected() {
        let doc = Document::parse("a = 1\r\n").unwrap();
        assert_eq!(doc.newline(), "\r\n");
    }

    #[test]
    fn clone_gets_new_identity() {
        let doc = Document::parse("a = 1\n").unwrap();
        let copy = doc.clone();
        assert_ne!(doc.id(), copy.id());
        assert!(doc.root().is_valid(&doc));
        assert!(!doc.root().is_valid(&copy));
    }

    #[test]
    fn outline_lists_live_spans() {
        let doc = Document::parse("a = [1, 2]\n# c\n[t]\n").unwrap();
        let outline = doc.outline();
        assert_eq!(outline.kind, SpanKind::NodeTable);
        assert_eq!(outline.children.len(), 3);
        assert_eq!(outline.children[0].key.as_deref(), Some("a"));
        assert_eq!(outline.children[0].children[0].children.len(), 2);
        let json = serde_json::to_string(&outline).unwrap();
        assert!(json.contains("\"NODE_ARRAY\""));
    }
}
