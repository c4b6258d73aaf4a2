//! Full TOML validation.
//!
//! The span tree builder only checks structure. This pass hands the text to
//! `toml_edit`, which also rejects duplicate keys, redefined tables and
//! malformed scalars.

use crate::errors::{Error, Result};
use log::warn;
use toml_edit::DocumentMut;

pub fn validate_document(content: &str) -> Result<()> {
    content.parse::<DocumentMut>().map_err(|err| {
        let offset = err.span().map(|span| span.start).unwrap_or(0);
        warn!("strict validation failed at byte {offset}: {}", err.message());
        Error::syntax(offset, err.message().trim_end().to_string())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_toml() {
        validate_document("[a]\nb = 1\n[[c]]\nd = 'x'\n").unwrap();
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = validate_document("a = 1\na = 2\n").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn rejects_duplicate_tables() {
        assert!(validate_document("[a]\n[a]\n").is_err());
    }

    #[test]
    fn rejects_bad_scalar() {
        let err = validate_document("a = nope\n").unwrap_err();
        match err {
            Error::Syntax { offset, message } => {
                assert!(offset >= 4, "offset {offset} points before the value");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
