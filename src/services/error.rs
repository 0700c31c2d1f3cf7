//! Errors of the override document layer

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("override document not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to access override document: {0}")]
    Io(#[from] std::io::Error),

    #[error("override document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to download override document: {0:#}")]
    Http(anyhow::Error),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
