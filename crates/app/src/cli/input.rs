//! Reading command inputs from flags and files

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} does not hold the expected JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("empty value for {0}")]
    Empty(&'static str),
}

/// `@path` reads the value from a file, anything else is taken as is.
/// Surrounding whitespace is dropped either way.
pub fn inline_or_file(value: &str, what: &'static str) -> Result<String, InputError> {
    let value = match value.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|source| InputError::Read {
            path: path.into(),
            source,
        })?,
        None => value.to_string(),
    };
    let value = value.trim();
    if value.is_empty() {
        return Err(InputError::Empty(what));
    }
    Ok(value.to_string())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    let raw = fs::read(path).map_err(|source| InputError::Read {
        path: path.into(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| InputError::Json {
        path: path.into(),
        source,
    })
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), InputError> {
    let raw = serde_json::to_vec_pretty(value).map_err(|source| InputError::Json {
        path: path.into(),
        source,
    })?;
    fs::write(path, raw).map_err(|source| InputError::Write {
        path: path.into(),
        source,
    })
}
