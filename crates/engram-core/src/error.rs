//! Error taxonomy shared across the engine.
//!
//! Errors are classified by kind, not by origin. Transports map kinds onto
//! their own wire codes; `kind()` is the stable machine-readable name.

/// Engine-wide error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Required field missing, empty, or out of domain
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Id does not refer to an existing entity
    #[error("not found: {0}")]
    NotFound(String),
    /// Unique-key violation or invalid lifecycle transition
    #[error("conflict: {0}")]
    Conflict(String),
    /// Durable store unreachable
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Embedder / vector / semantic search unavailable
    #[error("service degraded: {0}")]
    ServiceDegraded(String),
    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// Engine-wide result type
pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    /// Stable machine-readable kind string surfaced on both transports
    pub fn kind(&self) -> &'static str {
        match self {
            MemoryError::InvalidArgument(_) => "invalid_argument",
            MemoryError::NotFound(_) => "not_found",
            MemoryError::Conflict(_) => "conflict",
            MemoryError::BackendUnavailable(_) => "backend_unavailable",
            MemoryError::ServiceDegraded(_) => "service_degraded",
            MemoryError::Internal(_) => "internal",
        }
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => {
                MemoryError::NotFound("row not found".to_string())
            }
            rusqlite::Error::SqliteFailure(code, message) => {
                if code.code == rusqlite::ErrorCode::ConstraintViolation {
                    MemoryError::Conflict(
                        message.clone().unwrap_or_else(|| "constraint violation".to_string()),
                    )
                } else {
                    MemoryError::BackendUnavailable(err.to_string())
                }
            }
            _ => MemoryError::BackendUnavailable(err.to_string()),
        }
    }
}

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        MemoryError::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::Internal(format!("serialization failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(MemoryError::InvalidArgument("x".into()).kind(), "invalid_argument");
        assert_eq!(MemoryError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(MemoryError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(MemoryError::BackendUnavailable("x".into()).kind(), "backend_unavailable");
        assert_eq!(MemoryError::ServiceDegraded("x".into()).kind(), "service_degraded");
        assert_eq!(MemoryError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let err: MemoryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind(), "not_found");
    }
}
