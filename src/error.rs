//! Unified error type for candyget.
//!
//! Every failure of a call is delivered through the returned future as an
//! [`Error`]. Parameter problems are detected before any network I/O and
//! carry the name of the offending parameter; transport failures are passed
//! through untouched so callers can downcast them.

use std::error::Error as StdError;
use thiserror::Error;

/// Unified error type for all candyget operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A call argument or option was malformed.
    ///
    /// Raised before dispatch for `method`, `returnType`, `options`, `url`,
    /// `body`, `headers`, `fetch`, `timeout` and `maxRedirects`.
    #[error("Invalid Param:{0}")]
    InvalidParam(&'static str),

    /// A hop did not receive response headers within its timeout budget.
    #[error("timed out")]
    TimedOut,

    /// A redirect status was received without a `Location` header.
    #[error("no location header found")]
    RedirectWithoutLocation,

    /// The configured validator rejected the parsed response body.
    #[error("invalid response body")]
    ValidationFailed,

    /// Failure reported by the underlying transport (DNS, connect, TLS, body stream).
    #[error("{0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),
}

/// Convenient alias used across the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    /// Wrap a transport failure without reinterpreting it.
    pub fn transport(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Transport(error.into())
    }

    /// Check if this is a timeout error.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// Check if this error was raised while validating call parameters.
    pub const fn is_invalid_param(&self) -> bool {
        matches!(self, Self::InvalidParam(_))
    }

    /// Name of the rejected parameter, if this is an [`Error::InvalidParam`].
    pub const fn param(&self) -> Option<&'static str> {
        match self {
            Self::InvalidParam(name) => Some(*name),
            _ => None,
        }
    }

    /// Borrow the transport's own error, for downcasting to transport-specific types.
    pub fn transport_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Transport(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Get the error category.
    ///
    /// Useful for logging and monitoring.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParam(_) => ErrorKind::InvalidParam,
            Self::TimedOut => ErrorKind::TimedOut,
            Self::RedirectWithoutLocation => ErrorKind::Redirect,
            Self::ValidationFailed => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err)
    }
}

/// Error category labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed call parameter
    InvalidParam,
    /// Hop timeout
    TimedOut,
    /// Redirect without location
    Redirect,
    /// Response body rejected by the validator
    Validation,
    /// Transport/network error
    Transport,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParam => write!(f, "invalid_param"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Redirect => write!(f, "redirect"),
            Self::Validation => write!(f, "validation"),
            Self::Transport => write!(f, "transport"),
        }
    }
}
