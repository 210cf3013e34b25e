//! Error types for extraction, ingestion and export.

use litgraph_db::DbError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Structural problem in the XML stream. Fatal for the whole run.
    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Graph store error: {0}")]
    Store(#[from] DbError),

    #[error("Reference spool error: {0}")]
    Spool(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}
