//! Unified error types for tubeguide.
//!
//! Every variant renders as `CODE: detail` so callers on the MCP surface can
//! match on a stable prefix.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the cache controller, catalogue and server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty path).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No cache entry found for the given request.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be encoded or decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// The network could not be reached at all.
    #[error("NETWORK_UNAVAILABLE: {0}")]
    NetworkUnavailable(String),

    /// Nothing cached and nothing reachable for a non-navigation request.
    #[error("OFFLINE: {0}")]
    Offline(String),

    /// One or more manifest assets could not be fetched.
    #[error("INSTALL_FAILED: {version}: {reason}")]
    InstallFailed { version: String, reason: String },

    /// The controller task has shut down.
    #[error("CONTROLLER_GONE")]
    ControllerGone,

    /// No worker exists for the requested role.
    #[error("NO_CONTROLLER: {0}")]
    NoController(String),

    /// A reply from the controller did not arrive in time.
    #[error("REPLY_TIMEOUT: {0}")]
    ReplyTimeout(String),

    /// The dataset could not be loaded from any source.
    #[error("DATA_UNAVAILABLE: {0}")]
    DataUnavailable(String),
}

impl Error {
    /// Whether this error means the network itself was unreachable.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Error::NetworkUnavailable(_) | Error::FetchTimeout(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptEntry(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) | Error::CorruptEntry(msg) => (-32002, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::HttpError(msg) => (-32008, msg.clone()),
            Error::NetworkUnavailable(msg) | Error::Offline(msg) => (-32009, msg.clone()),
            Error::InstallFailed { .. } => (-32010, err.to_string()),
            Error::ControllerGone => (-32011, "cache controller is not running".to_string()),
            Error::NoController(msg) => (-32011, msg.clone()),
            Error::ReplyTimeout(msg) => (-32012, msg.clone()),
            Error::DataUnavailable(msg) => (-32013, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("GET https://example.com/app.js".to_string());
        assert!(err.to_string().starts_with("CACHE_MISS"));
        assert!(err.to_string().contains("app.js"));
    }

    #[test]
    fn test_install_failed_display() {
        let err = Error::InstallFailed { version: "v2".into(), reason: "status 404 for ./app.js".into() };
        assert_eq!(err.to_string(), "INSTALL_FAILED: v2: status 404 for ./app.js");
    }

    #[test]
    fn test_error_to_mcp_error() {
        let mcp_err: McpError = Error::Offline("no route".to_string()).into();
        assert_eq!(mcp_err.code.0, -32009);

        let mcp_err: McpError = Error::InvalidInput("empty".to_string()).into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_network_failure_classification() {
        assert!(Error::NetworkUnavailable("dns".into()).is_network_failure());
        assert!(Error::FetchTimeout("20s".into()).is_network_failure());
        assert!(!Error::HttpError("status 500".into()).is_network_failure());
    }
}
