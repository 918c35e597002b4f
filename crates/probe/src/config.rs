use anyhow::{Context, Result};
use prtg_mcp_sdk::{DiscoveryMode, HandshakeConfig, McpClient};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Probe configuration, read from `mcp-probe.toml` and overridden by flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub handshake: HandshakeSettings,

    #[serde(default)]
    pub checks: CheckSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeSettings {
    #[serde(default)]
    pub mode: DiscoveryMode,

    #[serde(default = "default_sse_path")]
    pub sse_path: String,

    #[serde(default = "default_message_path")]
    pub message_path: String,

    #[serde(default = "default_wait_secs")]
    pub connect_wait_secs: u64,

    #[serde(default = "default_wait_secs")]
    pub discovery_wait_secs: u64,

    #[serde(default = "default_wait_secs")]
    pub response_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSettings {
    #[serde(default = "default_sensors_limit")]
    pub sensors_limit: u32,

    /// Run the MCP `initialize` exchange before listing tools.
    #[serde(default)]
    pub initialize: bool,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8443".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_sse_path() -> String {
    "/sse".to_string()
}

fn default_message_path() -> String {
    "/message".to_string()
}

fn default_wait_secs() -> u64 {
    5
}

fn default_sensors_limit() -> u32 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            insecure: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::default(),
            sse_path: default_sse_path(),
            message_path: default_message_path(),
            connect_wait_secs: default_wait_secs(),
            discovery_wait_secs: default_wait_secs(),
            response_wait_secs: default_wait_secs(),
        }
    }
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            sensors_limit: default_sensors_limit(),
            initialize: false,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub insecure: bool,
    pub mode: Option<DiscoveryMode>,
    pub timeout_secs: Option<u64>,
    pub initialize: bool,
}

impl ProbeConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")
        } else {
            tracing::debug!(path = %config_path.display(), "Configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(base_url) = overrides.base_url {
            self.server.base_url = base_url;
        }
        if let Some(api_key) = overrides.api_key {
            self.server.api_key = Some(api_key);
        }
        if overrides.insecure {
            self.server.insecure = true;
        }
        if let Some(mode) = overrides.mode {
            self.handshake.mode = mode;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.server.timeout_secs = timeout;
        }
        if overrides.initialize {
            self.checks.initialize = true;
        }
    }

    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            sse_path: self.handshake.sse_path.clone(),
            message_path: self.handshake.message_path.clone(),
            discovery_mode: self.handshake.mode,
            connect_wait: Duration::from_secs(self.handshake.connect_wait_secs),
            discovery_wait: Duration::from_secs(self.handshake.discovery_wait_secs),
            response_wait: Duration::from_secs(self.handshake.response_wait_secs),
            ..Default::default()
        }
    }

    pub fn build_client(&self) -> Result<McpClient> {
        let mut builder = McpClient::builder()
            .base_url(self.server.base_url.clone())
            .timeout(Duration::from_secs(self.server.timeout_secs))
            .accept_invalid_certs(self.server.insecure)
            .handshake(self.handshake_config());
        if let Some(key) = &self.server.api_key {
            builder = builder.api_key(key.clone());
        }
        builder.build().context("Failed to build MCP client")
    }

    /// API key prefix safe to print.
    pub fn masked_api_key(&self) -> String {
        match self.server.api_key.as_deref() {
            Some(key) if key.chars().count() > 20 => {
                format!("{}...", key.chars().take(20).collect::<String>())
            }
            Some(key) => format!("{key}..."),
            None => "(none)".to_string(),
        }
    }
}
