use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, InterestError>;

#[derive(Debug, Error)]
pub enum InterestError {
    /// Event failed validation at the dispatcher boundary
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Embedding length does not match the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Optimistic write lost the race more times than allowed
    #[error("Concurrent update conflict for user {user_id} after {attempts} attempts")]
    ConcurrentUpdateConflict { user_id: Uuid, attempts: u32 },

    /// Embeddings are computed once and never replaced
    #[error("Embedding already exists for content {0}")]
    EmbeddingAlreadyExists(Uuid),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl InterestError {
    /// Errors worth retrying at the call site (storage hiccups, lost races)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InterestError::Redis(_) | InterestError::ConcurrentUpdateConflict { .. }
        )
    }

    /// Errors caused by the input itself; retrying the same input never helps
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            InterestError::InvalidEvent(_)
                | InterestError::DimensionMismatch { .. }
                | InterestError::EmbeddingAlreadyExists(_)
        )
    }
}

impl From<redis::RedisError> for InterestError {
    fn from(err: redis::RedisError) -> Self {
        InterestError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for InterestError {
    fn from(err: serde_json::Error) -> Self {
        InterestError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let conflict = InterestError::ConcurrentUpdateConflict {
            user_id: Uuid::nil(),
            attempts: 3,
        };
        assert!(conflict.is_transient());
        assert!(!conflict.is_rejection());

        let invalid = InterestError::InvalidEvent("missing user_id".to_string());
        assert!(invalid.is_rejection());
        assert!(!invalid.is_transient());

        let mismatch = InterestError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert!(mismatch.is_rejection());
        assert_eq!(mismatch.to_string(), "Dimension mismatch: expected 3, got 2");
    }
}
