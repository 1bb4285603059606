use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid fusion weights lexical={lexical} vector={vector}: weights must be non-negative and sum to 1.0")]
    InvalidWeights { lexical: f32, vector: f32 },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("lexical index holds no documents; build the index before querying")]
    EmptyIndex,

    #[error("vector index not found: {0}")]
    IndexNotFound(String),

    #[error("{service} request timed out")]
    ServiceTimeout { service: String },

    #[error("{service} unavailable: {message}")]
    ServiceUnavailable { service: String, message: String },

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("index not ready; retry after ingestion completes")]
    NotReady,

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Transient external-service failures are the only errors worth
    /// retrying. Validation and logic errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ServiceTimeout { .. } | Error::ServiceUnavailable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
