use derive_more::Display;
use serde::{Deserialize, Serialize};
use tessera_core::error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// A fresh attempt of the same work may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Conflict { retryable: true })
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::AlreadyExists => ErrorKind::AlreadyExists,
            ErrorClass::Conflict => ErrorKind::Conflict {
                retryable: err.is_retryable(),
            },
            ErrorClass::InvalidKey => ErrorKind::InvalidKey,
            ErrorClass::NotFound => ErrorKind::NotFound,
            ErrorClass::Unsupported => ErrorKind::Unsupported,
            ErrorClass::Internal | ErrorClass::InvariantViolation => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    AlreadyExists,

    /// Unique violation or concurrent modification.
    Conflict { retryable: bool },

    InvalidKey,
    NotFound,
    Unsupported,

    /// The caller cannot remediate this.
    Internal,
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Config,
    Index,
    Key,
    Query,
    Record,
    Registry,
    Schema,
    Transaction,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Index => Self::Index,
            CoreErrorOrigin::Key => Self::Key,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Record => Self::Record,
            CoreErrorOrigin::Registry => Self::Registry,
            CoreErrorOrigin::Schema => Self::Schema,
            CoreErrorOrigin::Transaction => Self::Transaction,
        }
    }
}
