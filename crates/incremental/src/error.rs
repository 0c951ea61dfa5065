//! Error types for the incremental runtime.

use crate::types::Version;
use thiserror::Error;

/// Boxed error returned by fallible user callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for incremental operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while building or running a dataflow graph.
#[derive(Error, Debug)]
pub enum Error {
    /// An operator was configured incorrectly.
    #[error("invalid operator: {message}")]
    InvalidOperator { message: String },
    /// A runtime API was used incorrectly.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
    /// A user callback failed.
    #[error("callback failed: {0}")]
    Callback(#[source] BoxError),
    /// Several listeners of a single push failed.
    #[error("{} listeners failed", .0.len())]
    Listeners(Vec<Error>),
    /// Sources or post-commit nodes failed while committing a version.
    #[error("{} errors while committing version {version}", .errors.len())]
    Commit { version: Version, errors: Vec<Error> },
}

impl Error {
    /// Creates an invalid operator error.
    pub fn invalid_operator(message: impl Into<String>) -> Self {
        Error::InvalidOperator {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps a failure raised by user code.
    pub fn callback(err: impl Into<BoxError>) -> Self {
        Error::Callback(err.into())
    }

    /// Returns the errors collected by an aggregate error.
    ///
    /// Non-aggregate errors return an empty slice.
    pub fn collected(&self) -> &[Error] {
        match self {
            Error::Listeners(errors) | Error::Commit { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Folds a list of errors into a single result.
    pub(crate) fn from_many(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Listeners(errors)),
        }
    }
}
