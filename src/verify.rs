//! Compare-and-set guards for value replacement.

use xxhash_rust::xxh3::xxh3_64;

/// Values longer than this are guarded by their xxh3 digest instead of a copy.
const DIGEST_THRESHOLD: usize = 1024;

/// What a value must currently read as before
/// [`Document::set_value_verified`](crate::Document::set_value_verified)
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Text(String),
    Digest(u64),
}

impl Expected {
    /// Guard for `text`, keeping a digest once it gets long.
    pub fn from_text(text: &str) -> Self {
        if text.len() > DIGEST_THRESHOLD {
            Expected::Digest(xxh3_64(text.as_bytes()))
        } else {
            Expected::Text(text.to_owned())
        }
    }

    pub fn matches(&self, current: &str) -> bool {
        match self {
            Expected::Text(text) => current == text,
            Expected::Digest(digest) => xxh3_64(current.as_bytes()) == *digest,
        }
    }

    pub fn digest(&self) -> u64 {
        match self {
            Expected::Text(text) => xxh3_64(text.as_bytes()),
            Expected::Digest(digest) => *digest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_digest_agree() {
        let guard = Expected::from_text("8080");
        assert_eq!(guard, Expected::Text("8080".into()));
        assert!(guard.matches("8080"));
        assert!(!guard.matches("8081"));
        assert!(Expected::Digest(guard.digest()).matches("8080"));
    }

    #[test]
    fn long_values_keep_a_digest() {
        let text = "x".repeat(DIGEST_THRESHOLD + 1);
        let guard = Expected::from_text(&text);
        assert!(matches!(guard, Expected::Digest(_)));
        assert!(guard.matches(&text));
        assert!(!guard.matches("x"));
    }
}
