//! Error types for ratelens
//!
//! Centralized error handling using thiserror. Remote lookup failures have their
//! own taxonomy in [`crate::fetch::FetchError`] and never surface through this type;
//! the scheduler folds them into sentinel ratings instead.

use thiserror::Error;

/// All error types that can occur in ratelens
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Durable blob storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cache record could not be encoded or applied
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for ratelens operations
pub type Result<T> = std::result::Result<T, EnrichError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error() {
        let err = EnrichError::Storage("database is locked".to_string());
        assert_eq!(err.to_string(), "Storage error: database is locked");
    }

    #[test]
    fn test_config_error() {
        let err = EnrichError::Config("concurrency must be at least 1".to_string());
        assert_eq!(err.to_string(), "Config error: concurrency must be at least 1");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EnrichError = io_err.into();
        assert!(matches!(err, EnrichError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: EnrichError = json_err.into();
        assert!(matches!(err, EnrichError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(EnrichError::Cache("bad record".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
