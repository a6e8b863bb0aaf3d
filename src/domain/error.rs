//! Domain-level error types for couchapp-push.
//!
//! All errors are typed with `thiserror`. Failures raised by hooks,
//! extensions and the document collaborators are surfaced unchanged to
//! the command caller; nothing in the crate retries.

use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed configuration, unresolvable database token, or a missing
    /// application directory.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No application path given and none could be inferred.
    #[error("Path error: {message}")]
    Path { message: String },

    /// Key lookup on the merged configuration failed.
    #[error("Unknown configuration key: {key}")]
    MissingKey { key: String },

    /// JSON parsing or serialization failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Request to a document store failed.
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A hook exited unsuccessfully or could not be started.
    #[error("Hook '{phase}' failed: {message}")]
    Hook { phase: String, message: String },

    /// An extension or hook URI could not be resolved or run.
    #[error("Extension error: {message}")]
    Extension { message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a path error.
    pub fn path(message: impl Into<String>) -> Self {
        Self::Path {
            message: message.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create an HTTP error from a reqwest failure.
    pub fn http(message: impl Into<String>, err: reqwest::Error) -> Self {
        Self::Http {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Whether this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Whether this is a path error.
    #[must_use]
    pub const fn is_path(&self) -> bool {
        matches!(self, Self::Path { .. })
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
