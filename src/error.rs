//! Unified error types.
//!
//! Three families live here:
//!
//! - [`Error`] is what handlers return. It is a closed set of shapes, and the
//!   router turns each one into exactly one JSON error response (see
//!   [`classify`](crate::classify)).
//! - [`ServerError`] surfaces infrastructure failures from the lifecycle
//!   controller: binding the port, the accept loop dying, or a drain that
//!   outlived its grace period.
//! - [`ConfigError`] is returned while loading configuration and setting up
//!   logging, before anything is served.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::ops::Deref;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::bind::BindingError;
use crate::validate::ValidationError;

/// The error type returned by handlers and middleware.
///
/// Every variant maps to a fixed response shape. `Other` is opaque: its text
/// is logged but never sent to the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wraps any error as an opaque internal failure.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(anyhow::Error::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::other(e)
    }
}

// ── Domain errors ─────────────────────────────────────────────────────────────

/// A business-rule violation. Answered with `400 Bad Request`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DomainError {
    pub code: String,
    pub message: String,
}

impl DomainError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { code: String::new(), message: message.into() }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DomainError {}

/// A business-rule violation meaning "this does not exist".
///
/// Carries everything a [`DomainError`] does (it derefs to one) but is
/// answered with `404 Not Found`. The classifier checks it before the plain
/// domain error, so wrapping one inside the other still yields a 404.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NotFoundError(pub DomainError);

impl NotFoundError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(DomainError::new(message))
    }
}

impl Deref for NotFoundError {
    type Target = DomainError;

    fn deref(&self) -> &DomainError {
        &self.0
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.message)
    }
}

impl std::error::Error for NotFoundError {}

/// Builds an [`Error::Domain`] from a format string.
///
/// ```rust
/// let err = kiln::domain_err!("user {} is locked", 42);
/// assert_eq!(err.to_string(), "user 42 is locked");
/// ```
#[macro_export]
macro_rules! domain_err {
    ($($arg:tt)*) => {
        $crate::Error::Domain($crate::DomainError::new(format!($($arg)*)))
    };
}

/// Builds an [`Error::NotFound`] from a format string.
#[macro_export]
macro_rules! not_found {
    ($($arg:tt)*) => {
        $crate::Error::NotFound($crate::NotFoundError::new(format!($($arg)*)))
    };
}

// ── Server errors ─────────────────────────────────────────────────────────────

/// Failures of the server lifecycle.
///
/// Application-level errors are expressed as HTTP responses, not as
/// `ServerError`s.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("listener failed: {0}")]
    Listener(#[source] io::Error),

    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Failures while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Every key that was present but could not be parsed.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("failed to load {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_derefs_to_domain_error() {
        let err = NotFoundError(DomainError::new("user missing").with_code("USER"));
        assert_eq!(err.message, "user missing");
        assert_eq!(err.code, "USER");
        assert_eq!(err.to_string(), "user missing");
    }

    #[test]
    fn macros_format_messages() {
        let err = not_found!("order {} not found", 7);
        assert!(matches!(err, Error::NotFound(ref n) if n.message == "order 7 not found"));

        let err = domain_err!("balance too low");
        assert!(matches!(err, Error::Domain(ref d) if d.message == "balance too low"));
    }

    #[test]
    fn config_errors_list_every_key() {
        let err = ConfigError::Invalid(vec![
            "HTTP_READ_TIMEOUT: invalid digit found in string".to_owned(),
            "HTTP_IDLE_TIMEOUT: invalid digit found in string".to_owned(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("HTTP_READ_TIMEOUT"));
        assert!(msg.contains("HTTP_IDLE_TIMEOUT"));
    }

    #[test]
    fn io_errors_become_opaque() {
        let err = Error::other(io::Error::new(io::ErrorKind::Other, "disk on fire"));
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }
}
