//! Error types for resource API queries.

use thiserror::Error;

/// Result type alias for resource API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur while querying the resource API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Unknown cloud environment: {0}")]
    UnknownEnvironment(String),

    #[error("Resource API unavailable: {0}")]
    Unavailable(String),
}
