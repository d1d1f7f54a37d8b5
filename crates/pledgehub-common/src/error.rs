//! Error types for PledgeHub
//!
//! This module defines the common error type used throughout the system.

use crate::types::{Collection, UnknownCollection};
use std::path::PathBuf;
use thiserror::Error;

/// Common result type for PledgeHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for PledgeHub
#[derive(Debug, Error)]
pub enum Error {
    // Storage errors
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // Record errors
    #[error(transparent)]
    UnknownCollection(#[from] UnknownCollection),

    #[error("{collection} record not found: {id}")]
    NotFound { collection: Collection, id: String },

    #[error("{collection} record already exists: {id}")]
    Conflict { collection: Collection, id: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a JSON error with the path it happened on
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::UnknownCollection(_))
    }

    /// Get HTTP status code for the REST surface
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NotFound { .. } | Self::UnknownCollection(_) => 404,
            Self::Conflict { .. } => 409,
            Self::Io { .. } | Self::Json { .. } | Self::Internal(_) => 500,
        }
    }

    /// Short machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::NotFound { .. } | Self::UnknownCollection(_) => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::Io { .. } | Self::Json { .. } | Self::Internal(_) => "InternalError",
        }
    }
}
