//! Error types for the PRTG MCP SDK.

use crate::protocol::JsonRpcError;
use serde::{Deserialize, Serialize};

/// Result type for SDK operations.
pub type McpResult<T> = Result<T, McpError>;

/// Error types that can occur while talking to an MCP Server PRTG deployment.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Auxiliary endpoint returned an unexpected status.
    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<String>,
    },

    /// The event stream could not be opened.
    #[error("SSE connection failed: {0}")]
    Connection(String),

    /// The event stream did not report a connection within the wait bound.
    #[error("SSE connection not established within the wait bound")]
    ConnectTimeout,

    /// No session id or endpoint event was seen within the wait bound.
    #[error("no session handle discovered on the event stream")]
    DiscoveryTimeout,

    /// The event stream ended while a result was still expected.
    #[error("SSE stream closed")]
    StreamClosed,

    /// The message endpoint refused the request.
    #[error("request rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// No matching response arrived on the stream within the wait bound.
    #[error("no response received via SSE")]
    ResponseTimeout,

    /// The response parsed but did not have the expected shape.
    #[error("unexpected response format: {0}")]
    UnexpectedShape(String),

    /// A payload on the stream was not valid JSON.
    #[error("malformed payload on stream: {0}")]
    MalformedPayload(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a JSON-RPC error object.
    #[error("JSON-RPC error {0}")]
    Rpc(JsonRpcError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl McpError {
    /// Check if this error came from a wait bound or transport timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ConnectTimeout | Self::DiscoveryTimeout | Self::ResponseTimeout => true,
            Self::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Create an API error from a status code and response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
            Self::Api {
                status,
                message: error_response.error,
                details: error_response.details,
            }
        } else {
            Self::Api {
                status,
                message: body.trim().to_string(),
                details: None,
            }
        }
    }
}

/// JSON error body some deployments send alongside non-success statuses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
