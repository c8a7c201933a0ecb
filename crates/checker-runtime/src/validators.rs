//! Validator list files
//!
//! Each group is a file under the validators directory holding
//! comma-separated public keys. The file name is the group identifier.

use dg_detection::{DetectionError, ValidatorGroup};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorListError {
    #[error("invalid validator list name '{0}'")]
    InvalidName(String),

    #[error("validator list '{0}' not found")]
    NotFound(String),

    #[error("validator list '{name}' is invalid: {source}")]
    Invalid {
        name: String,
        source: DetectionError,
    },

    #[error("failed to read validator list '{name}': {source}")]
    Io {
        name: String,
        source: std::io::Error,
    },
}

impl ValidatorListError {
    /// Problem with the requested list rather than with this process.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}

/// Resolve `name` inside `dir`, refusing anything that is not a plain file name.
pub fn list_path(dir: &Path, name: &str) -> Result<PathBuf, ValidatorListError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with('.');
    if !plain {
        return Err(ValidatorListError::InvalidName(name.to_string()));
    }
    Ok(dir.join(name))
}

pub fn parse_pubkeys(content: &str) -> Vec<String> {
    content
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn load_group(dir: &Path, name: &str) -> Result<ValidatorGroup, ValidatorListError> {
    let path = list_path(dir, name)?;
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ValidatorListError::NotFound(name.to_string()))
        }
        Err(source) => {
            return Err(ValidatorListError::Io {
                name: name.to_string(),
                source,
            })
        }
    };

    ValidatorGroup::new(name, parse_pubkeys(&content)).map_err(|source| {
        ValidatorListError::Invalid {
            name: name.to_string(),
            source,
        }
    })
}
