use crate::document::Document;
use crate::tree::{SpanId, SpanKind};
use std::collections::TryReserveError;
use std::fmt;
use thiserror::Error;

/// Result codes shared by every fallible operation.
///
/// `Ok` and `Done` are the two success flavours: `Ok` means more results may
/// follow, `Done` means a sequence is exhausted. Iterators in this crate
/// express `Done` as `None`; the variant exists so hosts that speak in codes
/// can report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Done,
    ErrIo,
    ErrSyntax,
    ErrNotFound,
    ErrType,
    ErrBuffer,
    ErrNoMem,
    ErrInvalidArg,
}

impl Code {
    pub fn name(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Done => "DONE",
            Code::ErrIo => "ERR_IO",
            Code::ErrSyntax => "ERR_SYNTAX",
            Code::ErrNotFound => "ERR_NOT_FOUND",
            Code::ErrType => "ERR_TYPE",
            Code::ErrBuffer => "ERR_BUFFER",
            Code::ErrNoMem => "ERR_NOMEM",
            Code::ErrInvalidArg => "ERR_INVALID_ARG",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Code::Ok | Code::Done)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("type error: expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: SpanKind,
    },

    #[error("buffer too small: need {needed} bytes, have {capacity}")]
    Buffer { needed: usize, capacity: usize },

    #[error("allocation failed: {0}")]
    NoMem(#[from] TryReserveError),

    #[error("invalid argument: {message}")]
    InvalidArg { message: String },

    #[error("stale cursor: span {span} was removed from the document")]
    StaleCursor { span: SpanId },
}

impl Error {
    pub fn code(&self) -> Code {
        match self {
            Error::Io(_) => Code::ErrIo,
            Error::Syntax { .. } => Code::ErrSyntax,
            Error::NotFound { .. } => Code::ErrNotFound,
            Error::Type { .. } => Code::ErrType,
            Error::Buffer { .. } => Code::ErrBuffer,
            Error::NoMem(_) => Code::ErrNoMem,
            Error::InvalidArg { .. } | Error::StaleCursor { .. } => Code::ErrInvalidArg,
        }
    }

    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_arg(message: impl Into<String>) -> Self {
        Error::InvalidArg {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }

    pub(crate) fn wrong_kind(expected: &'static str, found: SpanKind) -> Self {
        Error::Type { expected, found }
    }
}

/// A build that stopped early.
///
/// The builder never resynchronizes: it hands back whatever tree it had
/// assembled before the failure together with the error.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct ParseError {
    #[source]
    pub error: Error,
    pub partial: Box<Document>,
}

impl ParseError {
    pub fn code(&self) -> Code {
        self.error.code()
    }

    pub fn into_partial(self) -> Document {
        *self.partial
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
