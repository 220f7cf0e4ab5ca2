use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolyglotError {
    // Boot errors
    #[error("payload directory {path} is unreadable: {source}")]
    PayloadDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read payload file {path}: {source}")]
    PayloadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no payloads loaded from {path}")]
    NoPayloads { path: PathBuf },

    // Serialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("{0}")]
    Validation(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PolyglotError>;

impl PolyglotError {
    pub fn status_code(&self) -> u16 {
        match self {
            PolyglotError::Validation(_) => 400,
            _ => 500,
        }
    }
}
