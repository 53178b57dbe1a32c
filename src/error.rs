//! Error taxonomy for the ingestion and answering pipeline.
//!
//! Every failure a caller can act on is a [`RagError`] variant. The HTTP
//! layer maps each variant to a status code and a machine-readable error
//! code (see `server.rs`); the CLI prints the message.
//!
//! Ingestion errors (`UnsupportedFormat`, `Fetch`, `Extraction`) are raised
//! before a session is touched. External-service errors (`EmbeddingService`,
//! `Generation`, `SearchService`) abort the current upload or turn without
//! returning a partial answer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("web search error: {0}")]
    SearchService(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("vector index error: {0}")]
    Index(String),
}

impl RagError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::UnsupportedFormat(_) => "unsupported_format",
            RagError::Fetch { .. } => "fetch_error",
            RagError::Extraction(_) => "extraction_error",
            RagError::EmbeddingService(_) => "embedding_service_error",
            RagError::Generation(_) => "generation_error",
            RagError::SearchService(_) => "search_service_error",
            RagError::SessionNotFound(_) => "session_not_found",
            RagError::InvalidInput(_) => "bad_request",
            RagError::Index(_) => "internal",
        }
    }
}

pub type RagResult<T> = std::result::Result<T, RagError>;
