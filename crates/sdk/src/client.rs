//! Main client for the PRTG MCP SDK.

use crate::api::HealthApi;
use crate::config::{ClientConfig, HandshakeConfig};
use crate::error::{McpError, McpResult};
use crate::handshake::McpSession;
use crate::transport::HttpTransport;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Main client for interacting with an MCP Server PRTG deployment.
#[derive(Debug, Clone)]
pub struct McpClient {
    config: Arc<ClientConfig>,
    pub(crate) http: HttpTransport,
}

impl McpClient {
    /// Create a new client builder.
    pub fn builder() -> McpClientBuilder {
        McpClientBuilder::new()
    }

    /// Create a client from configuration.
    pub fn from_config(config: ClientConfig) -> McpResult<Self> {
        let config = Arc::new(config);
        let http = HttpTransport::new(config.clone())?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the health API.
    pub fn health(&self) -> HealthApi<'_> {
        HealthApi::new(self)
    }

    /// Open an event stream and discover where to post messages.
    pub async fn connect(&self) -> McpResult<McpSession> {
        McpSession::open(self.http.clone()).await
    }
}

/// Builder for creating an McpClient.
pub struct McpClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    accept_invalid_certs: bool,
    handshake: HandshakeConfig,
}

impl McpClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: Duration::from_secs(5),
            accept_invalid_certs: false,
            handshake: HandshakeConfig::default(),
        }
    }

    /// Set the base URL of the server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the bearer token.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the timeout for one-shot requests.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accept self-signed certificates.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Set the handshake configuration.
    pub fn handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Build the client.
    pub fn build(self) -> McpResult<McpClient> {
        let base_url_str = self
            .base_url
            .ok_or_else(|| McpError::Config("base_url is required".to_string()))?;

        let base_url = Url::parse(&base_url_str)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(McpError::Config(format!(
                "unsupported scheme '{}' (expected http or https)",
                base_url.scheme()
            )));
        }

        let config = ClientConfig {
            base_url,
            api_key: self.api_key.filter(|key| !key.is_empty()),
            timeout: self.timeout,
            accept_invalid_certs: self.accept_invalid_certs,
            handshake: self.handshake,
        };

        McpClient::from_config(config)
    }
}

impl Default for McpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
