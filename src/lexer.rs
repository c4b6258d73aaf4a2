//! Token source for the span tree builder.
//!
//! The lexer is lossless: every byte of the input lands in exactly one
//! token, including whitespace, comments and line endings. Bytes that match
//! no rule become [`TokenKind::Error`] tokens instead of being dropped, and
//! the builder turns those into syntax errors.

use logos::Logos;
use std::ops::Range;

/// Raw token classes recognised by Logos.
///
/// Kept separate from [`TokenKind`] because Logos derives on it and has no
/// variant for unrecognised input.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
    #[regex(r"[ \t]+")]
    Whitespace,

    #[regex(r"\r?\n")]
    Newline,

    #[regex(r"#[^\r\n]*")]
    Comment,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("=")]
    Equals,

    #[token(",")]
    Comma,

    #[regex(r#""([^"\\\r\n]|\\.)*""#)]
    BasicString,

    #[regex(r"'[^'\r\n]*'")]
    LiteralString,

    #[token(r#"""""#, ml_basic)]
    MlBasicString,

    #[token("'''", ml_literal)]
    MlLiteralString,

    #[regex(r"[A-Za-z0-9_+\-.:]+", bare_datetime)]
    Bare,
}

/// Token classes handed to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Whitespace,
    Newline,
    Comment,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Equals,
    Comma,
    BasicString,
    LiteralString,
    MlBasicString,
    MlLiteralString,
    Bare,
    Error,
}

impl TokenKind {
    fn from_raw(raw: RawToken) -> Self {
        match raw {
            RawToken::Whitespace => TokenKind::Whitespace,
            RawToken::Newline => TokenKind::Newline,
            RawToken::Comment => TokenKind::Comment,
            RawToken::LBracket => TokenKind::LBracket,
            RawToken::RBracket => TokenKind::RBracket,
            RawToken::LBrace => TokenKind::LBrace,
            RawToken::RBrace => TokenKind::RBrace,
            RawToken::Equals => TokenKind::Equals,
            RawToken::Comma => TokenKind::Comma,
            RawToken::BasicString => TokenKind::BasicString,
            RawToken::LiteralString => TokenKind::LiteralString,
            RawToken::MlBasicString => TokenKind::MlBasicString,
            RawToken::MlLiteralString => TokenKind::MlLiteralString,
            RawToken::Bare => TokenKind::Bare,
        }
    }

    /// Tokens that may start or continue a key.
    pub fn is_key_part(self) -> bool {
        matches!(
            self,
            TokenKind::Bare | TokenKind::BasicString | TokenKind::LiteralString
        )
    }

    /// Whitespace, line endings and comments.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, range: Range<usize>) -> Self {
        Self { kind, range }
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.range.clone()).unwrap_or_default()
    }
}

/// Iterator over the tokens of `source`.
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, RawToken>,
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let result = self.inner.next()?;
        let kind = match result {
            Ok(raw) => TokenKind::from_raw(raw),
            Err(()) => TokenKind::Error,
        };
        Some(Token::new(kind, self.inner.span()))
    }
}

pub fn lex(source: &str) -> Lexer<'_> {
    Lexer {
        inner: RawToken::lexer(source),
    }
}

/// Lex `source` into the fallible stream shape the builder consumes.
pub fn token_stream(source: &str) -> impl Iterator<Item = std::io::Result<Token>> + '_ {
    lex(source).map(Ok)
}

// Scans for the closing `"""`, skipping escaped characters. Up to two quotes
// directly before the delimiter belong to the content.
fn ml_basic(lex: &mut logos::Lexer<RawToken>) -> bool {
    let rest = lex.remainder().as_bytes();
    let mut i = 0;
    while i < rest.len() {
        match rest[i] {
            b'\\' => i += 2,
            b'"' if rest[i..].starts_with(b"\"\"\"") => {
                lex.bump(closing_run(rest, i, b'"'));
                return true;
            }
            _ => i += 1,
        }
    }
    false
}

fn ml_literal(lex: &mut logos::Lexer<RawToken>) -> bool {
    let rest = lex.remainder().as_bytes();
    let Some(i) = rest.windows(3).position(|w| w == b"'''") else {
        return false;
    };
    lex.bump(closing_run(rest, i, b'\''));
    true
}

fn closing_run(rest: &[u8], at: usize, quote: u8) -> usize {
    let mut end = at + 3;
    while end < rest.len() && end - at < 5 && rest[end] == quote {
        end += 1;
    }
    end
}

// `1979-05-27 07:32:00` is one value even though it contains a space.
fn bare_datetime(lex: &mut logos::Lexer<RawToken>) {
    if !looks_like_date(lex.slice().as_bytes()) {
        return;
    }
    let rest = lex.remainder().as_bytes();
    let time_follows = rest.len() >= 4
        && rest[0] == b' '
        && rest[1].is_ascii_digit()
        && rest[2].is_ascii_digit()
        && rest[3] == b':';
    if !time_follows {
        return;
    }
    let len = 1 + rest[1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'.' | b'+' | b'-'))
        .count();
    lex.bump(len);
}

fn looks_like_date(text: &[u8]) -> bool {
    text.len() == 10
        && text[..4].iter().all(u8::is_ascii_digit)
        && text[4] == b'-'
        && text[5..7].iter().all(u8::is_ascii_digit)
        && text[7] == b'-'
        && text[8..].iter().all(u8::is_ascii_digit)
}
