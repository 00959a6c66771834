//! Contains the `Error` and `Result` types that `mongodb-cluster` uses.

use std::sync::Arc;

use thiserror::Error;

/// The result type for all methods that can return an error in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while monitoring a cluster or selecting a server.
/// The inner [`ErrorKind`] is boxed to keep the type cheap to move and is
/// cloneable so that a single failure can be reported to multiple waiters.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,
}

impl Error {
    pub(crate) fn invalid_state(message: impl Into<String>) -> Error {
        ErrorKind::InvalidState {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Error {
        ErrorKind::Configuration {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn connection_failure(message: impl Into<String>) -> Error {
        ErrorKind::ConnectionFailure {
            message: message.into(),
        }
        .into()
    }

    /// Whether this error was caused by the network or a broken socket, as
    /// opposed to a malformed reply or a usage error.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self.kind.as_ref(),
            ErrorKind::Io(..) | ErrorKind::ConnectionFailure { .. }
        )
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self {
            kind: Box::new(err.into()),
        }
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(err: std::io::ErrorKind) -> Self {
        Self::Io(Arc::new(err.into()))
    }
}

impl From<bson::de::Error> for ErrorKind {
    fn from(err: bson::de::Error) -> Self {
        Self::BsonDeserialization(err)
    }
}

/// The types of errors that can occur.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An invalid argument was provided.
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument { message: String },

    /// An operation was attempted that the cluster's lifecycle state does not
    /// permit, e.g. opening a cluster twice.
    #[error("{message}")]
    #[non_exhaustive]
    InvalidState { message: String },

    /// The deployment is not compatible with this driver, e.g. because a
    /// server's wire-protocol range does not overlap the driver's. Not
    /// retryable.
    #[error("{message}")]
    #[non_exhaustive]
    Configuration { message: String },

    /// No server could be reached, or none satisfied a selection before its
    /// deadline.
    #[error("{message}")]
    #[non_exhaustive]
    ConnectionFailure { message: String },

    /// The server returned an invalid reply to an `ismaster` call.
    #[error("The server returned an invalid reply: {message}")]
    #[non_exhaustive]
    InvalidResponse { message: String },

    /// Wrapper around `bson::de::Error`.
    #[error("{0}")]
    BsonDeserialization(bson::de::Error),

    /// Wrapper around [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Internal error: {message}")]
    #[non_exhaustive]
    Internal { message: String },
}
