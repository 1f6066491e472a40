//! Error types for gradebox-gateway

use thiserror::Error;

/// Errors raised while talking to the job gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Endpoint URL could not be parsed or cannot carry a path
    #[error("invalid gateway endpoint: {0}")]
    InvalidEndpoint(String),

    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Gateway answered with a non-success status
    #[error("gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("unexpected gateway response: {0}")]
    Decode(String),

    /// Invalid gateway configuration
    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Http(err.to_string())
        }
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(err: url::ParseError) -> Self {
        GatewayError::InvalidEndpoint(err.to_string())
    }
}
