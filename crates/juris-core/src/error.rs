//! Error types for the juris tagging and import subsystem.

use thiserror::Error;

/// Result type alias using juris' Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for juris operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Record store operation failed (non-SQL adapters)
    #[error("Store error: {0}")]
    Store(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tag definition rejected (empty name, blank module scope, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Spreadsheet parsed but carries no data rows
    #[error("Empty file: {0}")]
    EmptyFile(String),

    /// Input is not a spreadsheet container this crate can read
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Field mapping does not cover the fields an import needs
    #[error("Incomplete mapping: {0}")]
    IncompleteMapping(String),

    /// A write batch failed; every record in it is counted as an error
    #[error("Batch {batch} failed: {message}")]
    BatchWrite { batch: usize, message: String },

    /// Attaching tags to imported records failed
    #[error("Tag attach error: {0}")]
    TagAttach(String),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error aborts an import before anything is written.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::EmptyFile(_) | Error::UnsupportedFormat(_) | Error::IncompleteMapping(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("nome must not be empty".to_string());
        assert_eq!(err.to_string(), "Validation error: nome must not be empty");
    }

    #[test]
    fn test_error_display_batch_write() {
        let err = Error::BatchWrite {
            batch: 3,
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "Batch 3 failed: connection reset");
    }

    #[test]
    fn test_error_display_incomplete_mapping() {
        let err = Error::IncompleteMapping("no column mapped to 'nome'".to_string());
        assert!(err.to_string().starts_with("Incomplete mapping:"));
    }

    #[test]
    fn test_structural_errors() {
        assert!(Error::EmptyFile("x".into()).is_structural());
        assert!(Error::UnsupportedFormat("x".into()).is_structural());
        assert!(Error::IncompleteMapping("x".into()).is_structural());
        assert!(!Error::TagAttach("x".into()).is_structural());
        assert!(!Error::Store("x".into()).is_structural());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
