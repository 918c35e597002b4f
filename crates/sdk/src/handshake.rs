//! Session handshake: open the stream, discover the handle, exchange JSON-RPC.

use crate::error::{McpError, McpResult};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult,
};
use crate::session::{ConnectionPhase, HandshakeState, SessionHandle};
use crate::transport::{HttpTransport, ListenerHandle, StreamListener};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// An open MCP session: a live event stream plus the URL to post messages to.
///
/// Requests are posted one at a time per id; responses are matched to their
/// request by JSON-RPC id, so several calls may be made on one session.
#[derive(Debug)]
pub struct McpSession {
    http: HttpTransport,
    state: Arc<HandshakeState>,
    listener: ListenerHandle,
    handle: SessionHandle,
    message_url: Url,
    next_id: AtomicU64,
    response_wait: Duration,
}

impl McpSession {
    /// Connect and discover the session handle.
    ///
    /// No message is posted unless both the connection and the discovery
    /// complete within their bounds.
    pub async fn open(http: HttpTransport) -> McpResult<Self> {
        let handshake = http.config().handshake.clone();
        let state = Arc::new(HandshakeState::new(handshake.discovery_mode));

        info!(mode = %handshake.discovery_mode, "Opening MCP session");
        let listener = StreamListener::new(http.clone(), state.clone()).spawn();

        state.wait_connected(handshake.connect_wait).await?;
        let handle = state.wait_handle(handshake.discovery_wait).await?;
        let message_url = handle.message_url(&http.config().base_url, &handshake.message_path)?;
        info!(handle = %handle, url = %message_url, "MCP session ready");

        Ok(Self {
            http,
            state,
            listener,
            handle,
            message_url,
            next_id: AtomicU64::new(1),
            response_wait: handshake.response_wait,
        })
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn message_url(&self) -> &Url {
        &self.message_url
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.phase()
    }

    /// Send a request and wait for its response.
    ///
    /// The raw response is returned; an `error` member is not turned into an
    /// `Err` here.
    pub async fn call(&self, method: &str, params: Option<Value>) -> McpResult<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);

        let responses = self.state.responses();

        // An answer may reach the stream before the POST returns.
        responses.register(id);
        let ack = match self.http.post_message(&self.message_url, &request).await {
            Ok(ack) => ack,
            Err(e) => {
                responses.release(id);
                return Err(e);
            }
        };
        debug!(status = ack.status, id = id, "Request accepted");

        // Some servers answer inline instead of on the stream.
        if ack.status == 200 {
            if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&ack.body) {
                if response.matches_id(id) && (response.result.is_some() || response.error.is_some()) {
                    debug!(id = id, "Response delivered in POST body");
                    responses.release(id);
                    return Ok(response);
                }
            }
        }

        let response = responses.wait_for(id, self.response_wait).await;
        if let Err(ref e) = response {
            warn!(error = %e, id = id, method = method, "No usable response on stream");
        }
        response
    }

    /// Send a notification; nothing is awaited.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let notification = JsonRpcRequest::notification(method, params);
        self.http
            .post_message(&self.message_url, &notification)
            .await?;
        Ok(())
    }

    /// Run the MCP `initialize` exchange.
    pub async fn initialize(
        &self,
        client_name: &str,
        client_version: &str,
    ) -> McpResult<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::new(client_name, client_version))?;
        let result: InitializeResult = self.call("initialize", Some(params)).await?.decode()?;
        self.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    /// List the tools the server exposes.
    pub async fn list_tools(&self) -> McpResult<ListToolsResult> {
        let response = self.call("tools/list", Some(json!({}))).await?;
        ListToolsResult::from_response(response)
    }

    /// Invoke a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        self.call("tools/call", Some(params)).await?.decode()
    }

    /// Close the event stream.
    pub async fn close(self) {
        debug!(handle = %self.handle, "Closing MCP session");
        self.listener.close().await;
    }
}

/// Map a failed handshake step to the phase it failed in.
pub fn failure_stage(error: &McpError) -> &'static str {
    match error {
        McpError::Connection(_) | McpError::ConnectTimeout => "connect",
        McpError::DiscoveryTimeout => "discovery",
        McpError::Rejected { .. } => "request",
        McpError::ResponseTimeout | McpError::StreamClosed | McpError::MalformedPayload(_) => {
            "response"
        }
        McpError::UnexpectedShape(_) | McpError::Rpc(_) => "result",
        _ => "transport",
    }
}
