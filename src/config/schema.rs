use serde::Deserialize;
use std::fmt;

/// How new text is written into a document.
///
/// Parsing never consults these settings except for `max_depth` and
/// `strict`; they only shape the bytes that creation and replacement
/// operations append to the boneyard.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EditConfig {
    /// Written between a new key and its value.
    pub key_value_separator: String,
    /// Written between new array elements when no sibling shows the style.
    pub array_separator: String,
    /// `{ a = 1 }` instead of `{a = 1}` for new inline tables.
    pub inline_table_padding: bool,
    pub string_style: StringStyle,
    pub newline: NewlineStyle,
    /// Deepest allowed span nesting while parsing.
    pub max_depth: usize,
    /// Run full TOML validation after every parse.
    pub strict: bool,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            key_value_separator: " = ".to_string(),
            array_separator: ", ".to_string(),
            inline_table_padding: true,
            string_style: StringStyle::Basic,
            newline: NewlineStyle::Detect,
            max_depth: 128,
            strict: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StringStyle {
    #[default]
    Basic,
    Literal,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NewlineStyle {
    /// Follow the first line ending of the parsed text.
    #[default]
    Detect,
    Lf,
    Crlf,
}

impl NewlineStyle {
    pub fn resolve(self, text: &str) -> &'static str {
        match self {
            NewlineStyle::Lf => "\n",
            NewlineStyle::Crlf => "\r\n",
            NewlineStyle::Detect => match text.find('\n') {
                Some(at) if at > 0 && text.as_bytes()[at - 1] == b'\r' => "\r\n",
                _ => "\n",
            },
        }
    }
}

impl EditConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        let sep = &self.key_value_separator;
        if sep.matches('=').count() != 1 || !is_blank_except(sep, '=') {
            issues.push(ValidationIssue::Separator {
                field: "key_value_separator",
                value: sep.clone(),
                delimiter: '=',
            });
        }

        let sep = &self.array_separator;
        if sep.matches(',').count() != 1 || !is_blank_except(sep, ',') {
            issues.push(ValidationIssue::Separator {
                field: "array_separator",
                value: sep.clone(),
                delimiter: ',',
            });
        }

        if self.max_depth == 0 {
            issues.push(ValidationIssue::ZeroDepth);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// `array_separator` split around its comma.
    pub fn array_separator_parts(&self) -> (&str, &str) {
        self.array_separator
            .split_once(',')
            .unwrap_or(("", " "))
    }
}

fn is_blank_except(text: &str, delimiter: char) -> bool {
    text.chars().all(|c| c == delimiter || c == ' ' || c == '\t')
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    Separator {
        field: &'static str,
        value: String,
        delimiter: char,
    },
    ZeroDepth,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::Separator {
                field,
                value,
                delimiter,
            } => write!(
                f,
                "'{field}' must be one '{delimiter}' with optional spaces or tabs, got {value:?}"
            ),
            ValidationIssue::ZeroDepth => write!(f, "'max_depth' must be at least 1"),
        }
    }
}
