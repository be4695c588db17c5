//! Error types for headless-host
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur while loading apps or running tasks
#[derive(Debug, Error)]
pub enum HostError {
    /// Manifest is malformed or missing a required field
    #[error("Manifest error: {0}")]
    ManifestParse(String),

    /// SDK version is not in the supported set
    #[error("{0} is not a valid SDK version.")]
    UnsupportedVersion(String),

    /// Manifest or bundle fetch failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Debug packager did not respond
    #[error("Packager unreachable: {0}")]
    PackagerUnreachable(String),

    /// Runtime builder refused to produce an instance
    #[error("Runtime build failed: {0}")]
    RuntimeBuild(String),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// No task registered under the given identity
    #[error("Task not found: {app_id}/{name}")]
    TaskNotFound { app_id: String, name: String },

    /// Task's owning service has been dropped
    #[error("Task service unavailable for task: {0}")]
    TaskServiceUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HostError {
    /// Returns true for errors that end a `load_app` call
    pub fn is_load_terminal(&self) -> bool {
        matches!(
            self,
            HostError::ManifestParse(_)
                | HostError::UnsupportedVersion(_)
                | HostError::Fetch(_)
                | HostError::PackagerUnreachable(_)
                | HostError::RuntimeBuild(_)
        )
    }
}

/// Result type alias for headless-host operations
pub type Result<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parse_error() {
        let err = HostError::ManifestParse("missing field 'id'".to_string());
        assert_eq!(err.to_string(), "Manifest error: missing field 'id'");
    }

    #[test]
    fn test_unsupported_version_error() {
        let err = HostError::UnsupportedVersion("5.0.0".to_string());
        assert_eq!(err.to_string(), "5.0.0 is not a valid SDK version.");
    }

    #[test]
    fn test_packager_unreachable_error() {
        let err = HostError::PackagerUnreachable("connection refused".to_string());
        assert_eq!(err.to_string(), "Packager unreachable: connection refused");
    }

    #[test]
    fn test_task_not_found_error() {
        let err = HostError::TaskNotFound {
            app_id: "@user/app".to_string(),
            name: "sync".to_string(),
        };
        assert_eq!(err.to_string(), "Task not found: @user/app/sync");
    }

    #[test]
    fn test_load_terminal_classification() {
        assert!(HostError::Fetch("timeout".into()).is_load_terminal());
        assert!(HostError::UnsupportedVersion("1.0.0".into()).is_load_terminal());
        assert!(!HostError::Storage("locked".into()).is_load_terminal());
        assert!(!HostError::InvalidState("x".into()).is_load_terminal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HostError = io_err.into();
        assert!(matches!(err, HostError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: HostError = json_err.into();
        assert!(matches!(err, HostError::Json(_)));
    }

    #[test]
    fn test_url_error_conversion() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: HostError = url_err.into();
        assert!(matches!(err, HostError::Url(_)));
    }
}
