//! # PRTG MCP SDK
//!
//! Client for MCP Server PRTG deployments speaking the SSE transport: requests
//! are POSTed to a per-session message URL, and their responses come back on a
//! separate, long-lived event stream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use prtg_mcp_sdk::{McpClient, McpResult};
//!
//! #[tokio::main]
//! async fn main() -> McpResult<()> {
//!     let client = McpClient::builder()
//!         .base_url("https://prtg-mcp.example.com:8443")
//!         .api_key("your-api-key")
//!         .build()?;
//!
//!     let health = client.health().check().await?;
//!     println!("Server status: {}", health.status);
//!
//!     // Opens /sse, waits for the session handle, then talks JSON-RPC.
//!     let session = client.connect().await?;
//!     let tools = session.list_tools().await?;
//!     for tool in &tools.tools {
//!         println!("{}", tool.name);
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod session;
pub mod transport;

pub use api::{DatabaseState, DatabaseStatus, HealthCheck, ServerStatus};
pub use client::{McpClient, McpClientBuilder};
pub use config::{ClientConfig, HandshakeConfig};
pub use error::{McpError, McpResult};
pub use handshake::{failure_stage, McpSession};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, Tool, ToolContent,
};
pub use session::{ConnectionPhase, DiscoveryMode, SessionHandle};
pub use transport::{Auth, RawResponse};
