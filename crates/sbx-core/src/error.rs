//! # Errors
//!
//! One error type shared by the whole workspace. Every operation reports
//! through [`Result`]; nothing is thrown across task boundaries.

use thiserror::Error;

use crate::query::Action;

/// Everything that can go wrong between building a query and handing rows
/// back to the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Connectivity failure or a non-2xx HTTP status.
    #[error("transport failure{}: {message}", .status.map(|s| format!(" (status {})", s)).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The response body was not the JSON shape we expected.
    #[error("decode failure: {0}")]
    Decode(String),

    /// The backend answered `success: false`.
    #[error("server reported failure: {}", .0.as_deref().unwrap_or("no message"))]
    Server(Option<String>),

    /// Builder misuse, e.g. adding a condition to an insert.
    #[error("invalid query mode: {mode} is not allowed for {action}")]
    InvalidQueryMode { action: Action, mode: &'static str },

    /// The request was aborted through `cancel()`.
    #[error("request cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_status() {
        let e = Error::Transport {
            status: Some(502),
            message: "bad gateway".into(),
        };
        assert_eq!(e.to_string(), "transport failure (status 502): bad gateway");
        assert_eq!(
            Error::transport("connection refused").to_string(),
            "transport failure: connection refused"
        );
    }

    #[test]
    fn test_server_display() {
        assert_eq!(
            Error::Server(Some("model not found".into())).to_string(),
            "server reported failure: model not found"
        );
        assert_eq!(
            Error::Server(None).to_string(),
            "server reported failure: no message"
        );
    }

    #[test]
    fn test_invalid_mode_display() {
        let e = Error::InvalidQueryMode {
            action: Action::Insert,
            mode: "conditions",
        };
        assert_eq!(
            e.to_string(),
            "invalid query mode: conditions is not allowed for insert"
        );
    }
}
