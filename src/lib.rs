//! tomlspan: round-trip TOML editing
//!
//! A document is parsed into a tree of spans over the original bytes. Reading
//! it back out without changes reproduces the input exactly, comments and
//! spacing included. Edits append new text to a separate overflow region and
//! relink spans, so every untouched line keeps its bytes.
//!
//! # Architecture
//!
//! - [`buffer`]: the original text plus the append-only boneyard.
//! - [`lexer`]: lossless token source built with `logos`.
//! - [`tree`]: the span arena, its builder and its serializer.
//! - [`Cursor`]: copyable handles for navigation and reads.
//! - [`query`]: literal name lookups and iteration.
//! - [`mutate`]: creation, insertion, removal and replacement.
//!
//! # Example
//!
//! ```
//! use tomlspan::{Document, NewValue, Position};
//!
//! let mut doc = Document::parse("# server\nport = 8080\n").unwrap();
//! let port = doc.root().find(&doc, "port").unwrap();
//! assert_eq!(port.value_text(&doc).unwrap(), "8080");
//!
//! doc.set_value(port, &NewValue::from(9090)).unwrap();
//! doc.insert_keyval(doc.root(), "host", &NewValue::string("localhost"), Position::Append)
//!     .unwrap();
//! assert_eq!(doc.serialize(), "# server\nport = 9090\nhost = \"localhost\"\n");
//! ```

pub mod buffer;
pub mod config;
pub mod cursor;
pub mod document;
pub mod errors;
pub mod lexer;
pub mod mutate;
pub mod query;
pub mod tree;
pub mod validate;
pub mod verify;

// Re-exports
pub use buffer::{Buffer, Region, Slice};
pub use config::{
    load_from_path, load_from_str, ConfigError, ConfigErrorKind, EditConfig, NewlineStyle, StringStyle,
};
pub use cursor::{Cursor, Lines};
pub use document::{DocId, Document, Outline};
pub use errors::{Code, Error, ParseError, Result};
pub use lexer::{Token, TokenKind};
pub use mutate::{NewValue, Position};
pub use query::Children;
pub use tree::{Quote, SpanId, SpanKind, SpanState, ValueType};
pub use validate::validate_document;
pub use verify::Expected;
