//! Configuration types for the PRTG MCP SDK.

use crate::session::DiscoveryMode;
use std::time::Duration;
use url::Url;

/// Configuration for the MCP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the MCP Server PRTG deployment.
    pub base_url: Url,
    /// Static bearer token.
    pub api_key: Option<String>,
    /// Timeout for one-shot requests (health, status, message POSTs).
    pub timeout: Duration,
    /// Accept self-signed or otherwise invalid TLS certificates.
    pub accept_invalid_certs: bool,
    /// SSE handshake configuration.
    pub handshake: HandshakeConfig,
}

impl ClientConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            timeout: Duration::from_secs(5),
            accept_invalid_certs: false,
            handshake: HandshakeConfig::default(),
        }
    }
}

/// Bounds and endpoints for the SSE session handshake.
///
/// Every wait resolves as soon as the awaited state changes; the durations
/// only cap how long the orchestrator is willing to wait.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Path of the event stream, relative to the base URL.
    pub sse_path: String,
    /// Path of the message endpoint used with a bare session id.
    pub message_path: String,
    /// Which discovery forms are accepted.
    pub discovery_mode: DiscoveryMode,
    /// TCP/TLS connect timeout of the stream request.
    pub connect_timeout: Duration,
    /// Upper bound for the stream to report a successful open.
    pub connect_wait: Duration,
    /// Upper bound for a session handle to appear once connected.
    pub discovery_wait: Duration,
    /// Upper bound for a response to arrive after an accepted POST.
    pub response_wait: Duration,
    /// Close the stream if no event arrives for this long.
    pub idle_timeout: Option<Duration>,
    /// Stop listening after this many events once a handle is known.
    pub max_events: Option<usize>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
            discovery_mode: DiscoveryMode::Auto,
            connect_timeout: Duration::from_secs(30),
            connect_wait: Duration::from_secs(5),
            discovery_wait: Duration::from_secs(5),
            response_wait: Duration::from_secs(5),
            idle_timeout: None,
            max_events: None,
        }
    }
}

impl HandshakeConfig {
    /// Worst-case time spent before the first POST can be issued.
    pub fn discovery_budget(&self) -> Duration {
        self.connect_wait + self.discovery_wait
    }

    /// Whether the listener should stop after `events_seen` events.
    pub fn cutoff_reached(&self, events_seen: usize, handle_known: bool) -> bool {
        match self.max_events {
            Some(max) => handle_known && events_seen > max,
            None => false,
        }
    }
}
