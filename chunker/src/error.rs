use thiserror::Error;

/// Failure of one pipeline run. Capability errors keep their source untouched.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("reconstruction failed: {0:#}")]
    Reconstruction(#[source] anyhow::Error),

    #[error("extraction request failed: {0:#}")]
    ExtractionRequest(#[source] anyhow::Error),

    #[error("extraction capability returned no content")]
    ExtractionEmptyResponse,

    #[error("extraction response rejected: {0}")]
    ExtractionSchema(#[from] SchemaError),

    #[error("tokenizer unavailable: {0}")]
    Tokenizer(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Why an extraction response did not conform to the chunk schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("response has no `chunks` array")]
    MissingChunks,

    #[error("chunk {index}: {reason}")]
    InvalidChunk { index: usize, reason: String },
}

impl SchemaError {
    pub(crate) fn chunk(index: usize, reason: impl Into<String>) -> Self {
        SchemaError::InvalidChunk {
            index,
            reason: reason.into(),
        }
    }
}
