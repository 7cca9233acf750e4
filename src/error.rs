//! Error type shared by both platform adapters.

use thiserror::Error;
use url::Url;

/// Errors surfaced synchronously by the client facade.
///
/// Marshaling gaps are deliberately absent: a native value the marshaler
/// cannot classify becomes [`Value::Undefined`](crate::Value::Undefined)
/// instead of failing the dispatch pipeline.
#[derive(Error, Debug)]
pub enum SocketError {
    /// A required argument (event name, URL) was empty.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The client URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Failure raised by the embedded Lua native library, passed through unchanged.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// Typed conversion between a neutral value and an application type failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SocketError {
    /// Shorthand for [`SocketError::InvalidArgument`].
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Reject an empty event name before any native call happens.
pub(crate) fn require_event(event: &str) -> Result<(), SocketError> {
    if event.is_empty() {
        return Err(SocketError::invalid_argument("Event name is required"));
    }
    Ok(())
}

/// Parse a client URL, rejecting the empty string first.
pub(crate) fn parse_url(url: &str) -> Result<Url, SocketError> {
    if url.is_empty() {
        return Err(SocketError::invalid_argument("URL is required"));
    }
    Ok(Url::parse(url)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_event_rejects_empty() {
        let err = require_event("").expect_err("empty event must fail");
        assert!(matches!(err, SocketError::InvalidArgument(_)));
        assert_eq!(err.to_string(), "Invalid argument: Event name is required");
    }

    #[test]
    fn test_require_event_accepts_name() {
        assert!(require_event("chat").is_ok());
    }

    #[test]
    fn test_parse_url() {
        assert!(matches!(parse_url(""), Err(SocketError::InvalidArgument(_))));
        assert!(matches!(parse_url("::"), Err(SocketError::InvalidUrl(_))));
        assert_eq!(parse_url("http://localhost:3000").unwrap().port(), Some(3000));
    }
}
