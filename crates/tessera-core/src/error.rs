use crate::db::record::RecordId;
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Every fallible engine operation surfaces this type.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct an index-origin invariant violation.
    pub(crate) fn index_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Index,
            message.into(),
        )
    }

    /// Construct a transaction-origin invariant violation.
    pub(crate) fn tx_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Transaction,
            message.into(),
        )
    }

    /// Construct an index-origin unsupported error.
    pub(crate) fn index_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Index, message.into())
    }

    /// Construct a query-origin unsupported error.
    pub(crate) fn query_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Query, message.into())
    }

    /// Construct a not-found error for a named object of some origin.
    pub(crate) fn not_found(origin: ErrorOrigin, what: &str, name: &str) -> Self {
        Self::new(
            ErrorClass::NotFound,
            origin,
            format!("{what} not found: '{name}'"),
        )
    }

    /// Construct an already-exists error for a named object of some origin.
    pub(crate) fn already_exists(origin: ErrorOrigin, what: &str, name: &str) -> Self {
        Self::new(
            ErrorClass::AlreadyExists,
            origin,
            format!("{what} already exists: '{name}'"),
        )
    }

    /// Construct an index uniqueness violation conflict error.
    pub(crate) fn unique_violation(
        index: &str,
        key: String,
        existing: RecordId,
        attempted: RecordId,
    ) -> Self {
        let detail = IndexError::UniqueViolation {
            index: index.to_string(),
            key,
            existing,
            attempted,
        };

        Self {
            class: ErrorClass::Conflict,
            origin: ErrorOrigin::Index,
            message: format!("index constraint violation: {detail}"),
            detail: Some(ErrorDetail::Index(detail)),
        }
    }

    /// Construct an invalid-key-shape error; such keys never reach a store.
    pub(crate) fn invalid_key_shape(index: &str, expected: usize, found: usize) -> Self {
        let detail = IndexError::InvalidKeyShape {
            index: index.to_string(),
            expected,
            found,
        };

        Self {
            class: ErrorClass::InvalidKey,
            origin: ErrorOrigin::Key,
            message: detail.to_string(),
            detail: Some(ErrorDetail::Index(detail)),
        }
    }

    /// Construct a retryable optimistic-concurrency conflict.
    pub(crate) fn concurrent_modification(
        record: RecordId,
        expected: Option<u64>,
        found: Option<u64>,
    ) -> Self {
        let detail = TxError::ConcurrentModification {
            record,
            expected,
            found,
        };

        Self {
            class: ErrorClass::Conflict,
            origin: ErrorOrigin::Transaction,
            message: detail.to_string(),
            detail: Some(ErrorDetail::Transaction(detail)),
        }
    }

    /// Construct the error returned when a finished transaction is used again.
    pub(crate) fn tx_not_active(state: &str) -> Self {
        let detail = TxError::NotActive {
            state: state.to_string(),
        };

        Self {
            class: ErrorClass::InvariantViolation,
            origin: ErrorOrigin::Transaction,
            message: detail.to_string(),
            detail: Some(ErrorDetail::Transaction(detail)),
        }
    }

    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Index(IndexError::UniqueViolation { .. }))
        )
    }

    #[must_use]
    pub const fn is_invalid_key(&self) -> bool {
        matches!(self.class, ErrorClass::InvalidKey)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.class, ErrorClass::Conflict)
    }

    /// Only concurrent-modification conflicts can succeed on a fresh attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Transaction(
                TxError::ConcurrentModification { .. }
            ))
        )
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Index(IndexError),
    #[error("{0}")]
    Transaction(TxError),
}

///
/// IndexError
///
/// Index contract violations reported to the caller of put or commit.
///

#[derive(Debug, ThisError)]
pub enum IndexError {
    #[error("{index}: key {key} already maps to {existing}, cannot add {attempted}")]
    UniqueViolation {
        index: String,
        key: String,
        existing: RecordId,
        attempted: RecordId,
    },

    #[error("{index}: key arity {found} does not fit declared arity {expected}")]
    InvalidKeyShape {
        index: String,
        expected: usize,
        found: usize,
    },
}

///
/// TxError
///

#[derive(Debug, ThisError)]
pub enum TxError {
    #[error(
        "concurrent modification of {record}: expected version {}, found {}",
        version_label(.expected),
        version_label(.found)
    )]
    ConcurrentModification {
        record: RecordId,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("transaction is not active ({state})")]
    NotActive { state: String },
}

#[allow(clippy::ref_option)]
fn version_label(version: &Option<u64>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    AlreadyExists,
    Conflict,
    Internal,
    InvalidKey,
    InvariantViolation,
    NotFound,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AlreadyExists => "already_exists",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
            Self::InvalidKey => "invalid_key",
            Self::InvariantViolation => "invariant_violation",
            Self::NotFound => "not_found",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
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

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Index => "index",
            Self::Key => "key",
            Self::Query => "query",
            Self::Record => "record",
            Self::Registry => "registry",
            Self::Schema => "schema",
            Self::Transaction => "transaction",
        };
        write!(f, "{label}")
    }
}
