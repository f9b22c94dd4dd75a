//! Error types for the log registry

use thiserror::Error;

/// Log registry error type
#[derive(Error, Debug)]
pub enum Error {
    /// A file specifier could not be parsed
    #[error("invalid filespec '{spec}': {reason}")]
    InvalidFileSpec {
        /// The specifier as given
        spec: String,
        /// What is wrong with it
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_spec(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFileSpec {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
