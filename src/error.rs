//! Error taxonomy for the engine.
//!
//! Every fallible operation in this crate returns [`Error`]; there is no
//! panic-based control flow outside of invariant breaches the docs call out
//! as `Internal`. `code()` is the stable string surfaced to callers in the
//! `{message, path, code}` GraphQL-style error record (spec-mandated taxonomy,
//! not a type name).

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input at {path}: {message}")]
    InvalidInput { path: String, message: String },

    #[error("policy violation at {path}: {message}")]
    PolicyViolation { path: String, message: String },

    #[error("driver failure for statement {label}: {source}")]
    DriverFailure {
        label: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error at {path}: {message}")]
    Internal { path: String, message: String },
}

impl Error {
    pub fn invalid_input(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn policy_violation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::PolicyViolation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn driver_failure(label: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Error::DriverFailure {
            label: label.into(),
            source: source.into(),
        }
    }

    pub fn internal(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Internal {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Stable kind string used as the `code` in the `{message, path, code}`
    /// error record. Never changes across refactors of the variant's fields.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput { .. } => "invalid-input",
            Error::PolicyViolation { .. } => "policy-violation",
            Error::DriverFailure { .. } => "driver-failure",
            Error::Cancelled => "cancelled",
            Error::DeadlineExceeded => "deadline-exceeded",
            Error::Internal { .. } => "internal",
        }
    }

    /// Path of the offending plan node / selection, empty for errors with no
    /// natural location (cancellation, deadlines).
    pub fn path(&self) -> &str {
        match self {
            Error::InvalidInput { path, .. }
            | Error::PolicyViolation { path, .. }
            | Error::Internal { path, .. } => path,
            Error::DriverFailure { label, .. } => label,
            Error::Cancelled | Error::DeadlineExceeded => "",
        }
    }

    /// Whether a partial top-level response may accompany this error.
    /// Only driver failures are allowed partial data per the policy in
    /// the error handling design.
    pub fn allows_partial_data(&self) -> bool {
        matches!(self, Error::DriverFailure { .. })
    }
}

/// A single error record in the shape the external interface emits:
/// `{message, path, code}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub path: String,
    pub code: String,
}

impl From<&Error> for ErrorRecord {
    fn from(err: &Error) -> Self {
        ErrorRecord {
            message: err.to_string(),
            path: err.path().to_string(),
            code: err.code().to_string(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.message, self.code, self.path)
    }
}
