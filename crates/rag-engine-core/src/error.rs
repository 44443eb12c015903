//! Error taxonomy for the retrieval core.
//!
//! Every fallible core operation returns [`RagError`]. Remote-provider
//! failures keep the provider's message so callers can surface it, and
//! [`RagError::is_retryable`] tells the transport layer which failures are
//! worth retrying. The core itself never retries.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("embedding provider failed: {0}")]
    EmbeddingFailed(String),

    #[error("generation provider failed: {0}")]
    GenerationFailed(String),

    #[error("reranker failed: {0}")]
    RerankFailed(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("storage error: {0}")]
    Storage(String),
}

impl RagError {
    /// Whether the same call may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingFailed(_)
                | RagError::GenerationFailed(_)
                | RagError::RerankFailed(_)
                | RagError::Timeout { .. }
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        RagError::InvalidParameter(message.into())
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        RagError::Storage(format!("{:#}", err))
    }

    /// Classify a provider failure, keeping timeouts distinct.
    pub fn from_provider(
        operation: &'static str,
        err: anyhow::Error,
        wrap: fn(String) -> RagError,
    ) -> Self {
        match err.downcast_ref::<ProviderTimeout>() {
            Some(t) => RagError::Timeout {
                operation,
                secs: t.secs,
            },
            None => wrap(format!("{:#}", err)),
        }
    }
}

/// Marker error returned by provider adapters when a remote call exceeds
/// its configured timeout.
///
/// Adapters wrap it in an `anyhow::Error`; the core downcasts it into
/// [`RagError::Timeout`].
#[derive(Debug, Clone, Copy, Error)]
#[error("provider call timed out after {secs}s")]
pub struct ProviderTimeout {
    pub secs: u64,
}
