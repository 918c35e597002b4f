//! Health and status endpoints.

use crate::client::McpClient;
use crate::error::McpResult;
use crate::transport::{Auth, RawResponse};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Health API for the auxiliary status endpoints.
pub struct HealthApi<'a> {
    client: &'a McpClient,
}

impl<'a> HealthApi<'a> {
    pub(crate) fn new(client: &'a McpClient) -> Self {
        Self { client }
    }

    /// Public liveness check.
    pub async fn check(&self) -> McpResult<HealthCheck> {
        self.client.http.get("/health", Auth::Anonymous).await
    }

    /// Authenticated server status.
    pub async fn status(&self) -> McpResult<ServerStatus> {
        self.client.http.get("/status", Auth::Bearer).await
    }

    /// Raw `/status` exchange, used to verify the auth gate.
    pub async fn probe_status(&self, auth: Auth) -> McpResult<RawResponse> {
        self.client.http.get_raw("/status", auth).await
    }
}

/// Basic health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

/// Authenticated status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub tls_enabled: Option<bool>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub mcp_tools: Option<u32>,
    #[serde(default)]
    pub database: Option<DatabaseStatus>,
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl ServerStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// Database block of the status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStatus {
    pub status: DatabaseState,
    #[serde(default)]
    pub error: Option<String>,
}

impl DatabaseStatus {
    /// The reported error, ignoring the empty string some servers send.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
    Connected,
    Disconnected,
    NotConfigured,
    #[serde(other)]
    Unknown,
}
