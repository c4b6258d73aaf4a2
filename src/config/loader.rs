//! Reading [`EditConfig`] from TOML text or a file.

use crate::config::schema::{EditConfig, ValidationError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Edit settings that could not be loaded. `path` is `None` for settings
/// given as a string.
#[derive(Debug, Error)]
#[error("edit settings{}: {kind}", origin(.path))]
pub struct ConfigError {
    pub path: Option<PathBuf>,
    #[source]
    pub kind: ConfigErrorKind,
}

#[derive(Debug, Error)]
pub enum ConfigErrorKind {
    #[error("cannot be read: {0}")]
    Read(#[from] io::Error),

    #[error("are not valid TOML: {0}")]
    Syntax(#[from] toml_edit::de::Error),

    #[error("are rejected: {0}")]
    Invalid(#[from] ValidationError),
}

fn origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" in {}", path.display()))
        .unwrap_or_default()
}

fn parse(input: &str) -> Result<EditConfig, ConfigErrorKind> {
    let config: EditConfig = toml_edit::de::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn load_from_str(input: &str) -> Result<EditConfig, ConfigError> {
    parse(input).map_err(|kind| ConfigError { path: None, kind })
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<EditConfig, ConfigError> {
    let path = path.as_ref();
    fs::read_to_string(path)
        .map_err(ConfigErrorKind::from)
        .and_then(|text| parse(&text))
        .map_err(|kind| ConfigError {
            path: Some(path.to_path_buf()),
            kind,
        })
}
