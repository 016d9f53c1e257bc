//! Error handling for whois-sweep.
//!
//! Per-domain lookup failures are never errors at this level: the engine turns
//! them into [`CheckStatus::Error`](crate::CheckStatus) values. `SweepError`
//! only covers faults the caller has to deal with before or around a run:
//! bad engine settings, unreadable config files and I/O on domain lists.

use std::fmt;

/// Main error type for whois-sweep operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepError {
    /// Engine settings rejected at construction time
    InvalidConfig { field: String, reason: String },

    /// Configuration file parsing or validation errors
    ConfigError { message: String },

    /// File I/O errors when reading domain lists or writing results
    FileError { path: String, message: String },

    /// Lookup backend could not be built (HTTP client, server address)
    BackendError { backend: String, message: String },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl SweepError {
    /// Create a new invalid engine configuration error.
    pub fn invalid_config<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new configuration file error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new backend construction error.
    pub fn backend<B: Into<String>, M: Into<String>>(backend: B, message: M) -> Self {
        Self::BackendError {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error was raised while validating settings.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::ConfigError { .. })
    }
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid engine configuration '{}': {}", field, reason)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::BackendError { backend, message } => {
                write!(f, "{} backend error: {}", backend, message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for SweepError {}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        Self::FileError {
            path: "<io>".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SweepError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML configuration: {}", err),
        }
    }
}
