//! Crate-level error type
//!
//! Every public operation returns [`Result`]. Argument errors are raised
//! before any store round-trip; store failures are passed through as
//! [`Error::Store`] with their structured context intact, except for the
//! optimistic-concurrency class which gets its own variant so the save loop
//! can retry it.

use thiserror::Error;

use crate::context::{StoreError, StoreErrorKind};
use crate::validation::ValidationErrors;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by specifications, the repository and its collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// A required argument was absent
    #[error("Value cannot be null. (Parameter '{param}')")]
    NullArgument {
        /// Name of the missing parameter
        param: &'static str,
    },

    /// An argument was present but structurally unusable
    #[error("{reason} (Parameter '{param}')")]
    InvalidArgument {
        /// Name of the offending parameter
        param: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// A numeric argument was outside its accepted range
    #[error("Specified argument was out of the range of valid values. (Parameter '{param}')")]
    OutOfRange {
        /// Name of the offending parameter
        param: &'static str,
    },

    /// One or more pending entities failed validation
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A single-result query matched more than one entity
    #[error("Sequence contains more than one matching {entity} ({count} matched)")]
    MultipleResults {
        /// Entity name
        entity: &'static str,
        /// Number of matches found
        count: usize,
    },

    /// The store rejected a write because the row changed underneath it
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(StoreError),

    /// Every save attempt ended in a concurrency conflict
    #[error("Save failed after {attempts} attempt(s): {last}")]
    RetryExhausted {
        /// Attempts made
        attempts: u32,
        /// The conflict raised by the final attempt
        last: StoreError,
    },

    /// The cancellation token fired while a store call was in flight
    #[error("Operation cancelled")]
    Cancelled,

    /// Any other store failure
    #[error(transparent)]
    Store(StoreError),

    /// Configuration could not be extracted
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`]
    pub fn invalid_argument(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            param,
            reason: reason.into(),
        }
    }

    /// Name of the parameter an argument error refers to
    pub fn param(&self) -> Option<&'static str> {
        match self {
            Self::NullArgument { param }
            | Self::InvalidArgument { param, .. }
            | Self::OutOfRange { param } => Some(param),
            _ => None,
        }
    }

    /// Whether this error is an argument error raised before any I/O
    pub fn is_argument_error(&self) -> bool {
        self.param().is_some()
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        if err.kind == StoreErrorKind::Concurrency {
            Self::ConcurrencyConflict(err)
        } else {
            Self::Store(err)
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
