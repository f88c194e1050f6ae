// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Phase;

#[derive(Error, Debug)]
pub enum RunctlError {
    /// The external command could not be started at all.
    #[error("failed to launch '{program}': {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A phase process exited with a non-zero code.
    #[error("{phase} phase exited with code {code}")]
    PhaseFailure { phase: Phase, code: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {path:?}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunctlError {
    /// Attach a path to an IO error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RunctlError::IoAt {
            path: path.into(),
            source,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RunctlError>;
