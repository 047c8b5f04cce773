//! Error types for the admin client core.

use thiserror::Error;

use crate::response::{parse_error_response, ResponseBody};

/// Errors raised by the admin client, the coercion layer and the listing store.
#[derive(Error, Debug)]
pub enum AdminError {
    /// The server answered with a non-success status.
    #[error("API request failed: {status} - {body}")]
    Http { status: u16, body: ResponseBody },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Raw form input could not be converted for the given column.
    #[error("Invalid value for {column}: {reason}")]
    Coercion { column: String, reason: String },

    #[error("Invalid order by string: {0}")]
    InvalidOrderBy(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("No table selected")]
    NoTableSelected,

    #[error("Preferences error: {0}")]
    Preferences(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    /// User-facing messages for this error.
    ///
    /// HTTP failures go through the response normalizer so that validation,
    /// database and custom form errors read the same everywhere.
    pub fn messages(&self) -> Vec<String> {
        match self {
            AdminError::Http { status, body } => parse_error_response(body, *status),
            other => vec![other.to_string()],
        }
    }
}

impl From<reqwest::Error> for AdminError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdminError::Decode(err.to_string())
        } else {
            AdminError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        AdminError::Decode(err.to_string())
    }
}
