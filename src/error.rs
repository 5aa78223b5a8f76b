use thiserror::Error;

/// Failure type returned by every public engine operation
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Search engine is not ready; call initialize() first")]
    NotReady,

    #[error("Embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Binary file: {0}")]
    BinaryFile(String),

    #[error("Symbol '{symbol}' not found in {file}")]
    SymbolNotFound { symbol: String, file: String },

    #[error("Access denied: {0} is outside the working directory")]
    AccessDenied(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] heed::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<regex::Error> for EngineError {
    fn from(err: regex::Error) -> Self {
        Self::Internal(format!("invalid pattern: {}", err))
    }
}

impl EngineError {
    /// True for failures caused by the caller's request rather than engine state
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery(_)
                | Self::FileNotFound(_)
                | Self::BinaryFile(_)
                | Self::SymbolNotFound { .. }
                | Self::AccessDenied(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(EngineError::InvalidQuery("bad".into()).is_client_error());
        assert!(EngineError::FileNotFound("a.py".into()).is_client_error());
        assert!(!EngineError::NotReady.is_client_error());
        assert!(!EngineError::Internal("boom".into()).is_client_error());
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::SymbolNotFound {
            symbol: "foo".into(),
            file: "a.py".into(),
        };
        assert_eq!(err.to_string(), "Symbol 'foo' not found in a.py");

        let err = EngineError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(
            err.to_string(),
            "Embedding dimension mismatch: expected 384, got 768"
        );
    }
}
