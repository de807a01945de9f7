//! Core error types for fbrun.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Graph-mutation and lookup failures surfaced synchronously by the
/// configuration and manager APIs. Faults raised inside a block's step
/// never become a `CoreError`; they stay inside the worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A configuration, block, port, type or edge could not be resolved
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up
        kind: String,
        /// Name that failed to resolve
        id: String,
    },

    /// Duplicate create
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// What was created
        kind: String,
        /// Name already in use
        id: String,
    },

    /// A `BLOCK.PORT` reference was malformed
    #[error("Invalid port reference: {reason}")]
    InvalidPortRef {
        /// Why the reference was rejected
        reason: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Failure reason
        reason: String,
    },

    /// A response body does not fit the 16-bit length field
    #[error("Frame body too large: {len} bytes")]
    FrameTooLarge {
        /// Body length in bytes
        len: usize,
    },

    /// Invalid encoding
    #[error("Invalid encoding: {message}")]
    InvalidEncoding {
        /// Encoder message
        message: String,
    },
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`]
    #[must_use]
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    /// Shorthand for a [`CoreError::AlreadyExists`]
    #[must_use]
    pub fn already_exists(kind: &str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    /// Whether this error is a duplicate create
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            message: err.to_string(),
        }
    }
}
