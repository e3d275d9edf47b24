//! Errors raised at the ingestion boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown RS convention '{0}' (expected 'ratio' or 'percent')")]
    UnknownConvention(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
