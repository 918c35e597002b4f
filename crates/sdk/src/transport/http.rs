//! HTTP transport layer for the PRTG MCP SDK.

use crate::config::ClientConfig;
use crate::error::{McpError, McpResult};
use crate::protocol::JsonRpcRequest;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Whether a request carries the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Bearer,
    Anonymous,
}

/// Status and body of a response, kept raw for diagnostics.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> McpResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// HTTP transport for one-shot requests and the long-lived event stream.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    stream_client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: Arc<ClientConfig>) -> McpResult<Self> {
        if let Some(ref api_key) = config.api_key {
            header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| McpError::Config("Invalid API key format".to_string()))?;
        }

        if config.accept_invalid_certs {
            warn!("TLS certificate verification is disabled");
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        // The stream stays open indefinitely, so only the connect phase is bounded.
        let stream_client = Client::builder()
            .connect_timeout(config.handshake.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            stream_client,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build a URL for the given path.
    pub(crate) fn build_url(&self, path: &str) -> McpResult<Url> {
        self.config
            .base_url
            .join(path)
            .map_err(McpError::InvalidUrl)
    }

    fn authorize(&self, request: RequestBuilder, auth: Auth) -> RequestBuilder {
        match (auth, &self.config.api_key) {
            (Auth::Bearer, Some(api_key)) => request.bearer_auth(api_key),
            _ => request,
        }
    }

    /// Execute a request once and capture status and body.
    async fn execute(&self, request: RequestBuilder) -> McpResult<RawResponse> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status = status, bytes = body.len(), "HTTP response");
        Ok(RawResponse { status, body })
    }

    /// Execute a GET request, returning the raw response whatever its status.
    pub async fn get_raw(&self, path: &str, auth: Auth) -> McpResult<RawResponse> {
        let url = self.build_url(path)?;
        debug!(url = %url, auth = ?auth, "GET request");

        self.execute(self.authorize(self.client.get(url), auth)).await
    }

    /// Execute a GET request and decode a successful JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, auth: Auth) -> McpResult<T> {
        let response = self.get_raw(path, auth).await?;
        if !response.is_success() {
            return Err(McpError::from_response(response.status, &response.body));
        }
        response.json()
    }

    /// POST a JSON-RPC message to a session's message endpoint.
    ///
    /// Only `200 OK` and `202 Accepted` count as accepted.
    pub async fn post_message(&self, url: &Url, message: &JsonRpcRequest) -> McpResult<RawResponse> {
        debug!(url = %url, method = %message.method, id = ?message.id, "POST message");

        let request = self.authorize(self.client.post(url.clone()), Auth::Bearer);
        let response = self.execute(request.json(message)).await?;

        match StatusCode::from_u16(response.status) {
            Ok(StatusCode::OK) | Ok(StatusCode::ACCEPTED) => Ok(response),
            _ => {
                warn!(status = response.status, "Message rejected");
                Err(McpError::Rejected {
                    status: response.status,
                    body: response.body,
                })
            }
        }
    }

    /// Open the event stream.
    pub async fn open_stream(&self) -> McpResult<Response> {
        let url = self.build_url(&self.config.handshake.sse_path)?;
        debug!(url = %url, "Opening event stream");

        let request = self
            .stream_client
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");

        let response = self.authorize(request, Auth::Bearer).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Connection(format!(
                "status {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        Ok(response)
    }
}
