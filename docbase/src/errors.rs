use backtrace::Backtrace;
use serde::{de, ser};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for docbase operations.
///
/// Every failure surfaced by the registry, the accessor, the pipeline parser,
/// the allocator or a store provider carries exactly one of these kinds, so
/// callers can branch on the category without parsing messages.
///
/// # Examples
///
/// ```rust,ignore
/// use docbase::errors::{DataError, ErrorKind, DataResult};
///
/// fn example() -> DataResult<()> {
///     Err(DataError::new("no document matches", ErrorKind::NotFound))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Startup errors, fatal for the process
    /// The document store or the counter store could not be reached
    ConnectionError,
    /// The supplied configuration is invalid
    ConfigError,

    // Expected, recoverable by the caller
    /// No document matched the query
    NotFound,
    /// A unique index rejected the write
    DuplicateKey,

    // Shape errors, indicate a programming bug
    /// A stored document does not match the requested type
    DecodeError,
    /// A value could not be turned into a document
    EncodeError,
    /// Aggregation text is malformed
    ParseError,

    // Store side failures
    /// The store failed while executing a well-formed request
    ExecutionError,
    /// The counter store is unreachable or rejected the request
    CounterUnavailable,
    /// The caller's deadline passed before the call completed
    Timeout,
    /// The caller cancelled the call
    Cancelled,
    /// Generic error from a store backend
    BackendError,

    /// The operation is not valid in the current state
    InvalidOperation,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ConnectionError => write!(f, "Connection error"),
            ErrorKind::ConfigError => write!(f, "Configuration error"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::DuplicateKey => write!(f, "Duplicate key"),
            ErrorKind::DecodeError => write!(f, "Decode error"),
            ErrorKind::EncodeError => write!(f, "Encode error"),
            ErrorKind::ParseError => write!(f, "Parse error"),
            ErrorKind::ExecutionError => write!(f, "Execution error"),
            ErrorKind::CounterUnavailable => write!(f, "Counter unavailable"),
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom docbase error type.
///
/// `DataError` carries a message, an [ErrorKind] and an optional cause. The
/// backtrace is captured unresolved on construction and only symbolized when
/// the error is printed with `{:?}`.
///
/// # Examples
///
/// ```rust,ignore
/// use docbase::errors::{DataError, ErrorKind};
///
/// let cause = DataError::new("connection reset", ErrorKind::BackendError);
/// let err = DataError::new_with_cause("insert failed", ErrorKind::ExecutionError, cause);
/// ```
#[derive(Clone)]
pub struct DataError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DataError>>,
    backtrace: Atomic<Backtrace>,
}

impl DataError {
    /// Creates a new `DataError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DataError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    /// Creates a new `DataError` wrapping an underlying cause.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DataError) -> Self {
        DataError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DataError> {
        self.cause.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.error_kind == ErrorKind::NotFound
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.error_kind == ErrorKind::DuplicateKey
    }

    pub fn is_parse_error(&self) -> bool {
        self.error_kind == ErrorKind::ParseError
    }
}

impl Display for DataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "[{}] {}\nCaused by: {:?}", self.error_kind, self.message, cause),
            None => {
                let mut backtrace = self.backtrace.write();
                backtrace.resolve();
                write!(f, "[{}] {}\n{:?}", self.error_kind, self.message, *backtrace)
            }
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for docbase operations.
pub type DataResult<T> = Result<T, DataError>;

impl de::Error for DataError {
    fn custom<T: Display>(msg: T) -> Self {
        DataError::new(&msg.to_string(), ErrorKind::DecodeError)
    }
}

impl ser::Error for DataError {
    fn custom<T: Display>(msg: T) -> Self {
        DataError::new(&msg.to_string(), ErrorKind::EncodeError)
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        let error_kind = if err.is_syntax() || err.is_eof() {
            ErrorKind::ParseError
        } else {
            ErrorKind::DecodeError
        };
        DataError::new(&format!("JSON error: {}", err), error_kind)
    }
}

impl From<String> for DataError {
    fn from(msg: String) -> Self {
        DataError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DataError {
    fn from(msg: &str) -> Self {
        DataError::new(msg, ErrorKind::InternalError)
    }
}
