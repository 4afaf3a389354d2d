//! Error types.
//!
//! Client-visible outcomes (401, 404, 500) are HTTP responses written into an
//! [`Exchange`](crate::Exchange), not `Error`s. The types here surface
//! infrastructure failures and faults raised by filters.

use http::StatusCode;

/// The error type returned by turnstile's fallible setup and serving operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding to a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The gateway configuration could not be loaded or deserialized.
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),

    /// A route path pattern was rejected by the router.
    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    /// The listen address is not a valid `host:port`.
    #[error("invalid socket address `{0}`")]
    Addr(String),
}

/// An unexpected fault raised inside a filter.
///
/// Returned before the response is committed, the chain turns it into a
/// `500 Internal Server Error` short-circuit. Returned afterwards, it is only
/// logged: the committed response is never reopened.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct FilterError {
    message: String,
}

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Status written to the client when this fault short-circuits a request.
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
