//! Handshake state shared between the stream listener and the orchestrator.
//!
//! The listener is the only writer and goes through the setters here; the
//! orchestrator observes transitions through `watch` receivers and the
//! response queue, each wait carrying its own deadline.

use crate::error::{McpError, McpResult};
use crate::protocol::JsonRpcResponse;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use url::Url;

static SESSION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sessionId=([a-f0-9\-]+)").expect("session id pattern"));

/// Extract the `sessionId=<token>` value from a line of stream text.
pub fn extract_session_id(line: &str) -> Option<&str> {
    SESSION_ID
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Whether a data payload is a URL announcement rather than a message.
pub fn is_bare_url(payload: &str) -> bool {
    payload.starts_with("http://") || payload.starts_with("https://") || payload.starts_with('/')
}

/// How the server announces where messages must be posted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMode {
    /// Accept whichever form the stream announces first.
    #[default]
    Auto,
    /// Only a `sessionId=` fragment combined with the configured message path.
    QuerySession,
    /// Only a named `endpoint` event carrying the message URL.
    EndpointEvent,
}

impl DiscoveryMode {
    pub fn accepts_query_session(self) -> bool {
        matches!(self, Self::Auto | Self::QuerySession)
    }

    pub fn accepts_endpoint_event(self) -> bool {
        matches!(self, Self::Auto | Self::EndpointEvent)
    }
}

impl FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "query-session" => Ok(Self::QuerySession),
            "endpoint-event" => Ok(Self::EndpointEvent),
            other => Err(format!(
                "unknown discovery mode '{other}' (expected auto, query-session or endpoint-event)"
            )),
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::QuerySession => "query-session",
            Self::EndpointEvent => "endpoint-event",
        };
        f.write_str(name)
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    pub fn is_endpoint(&self) -> bool {
        self.event.as_deref() == Some("endpoint")
    }
}

/// Where requests for this stream's session are posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionHandle {
    /// Bare id announced in a `sessionId=` fragment.
    SessionId(String),
    /// Message URL announced by an `endpoint` event, kept verbatim.
    MessageUrl(String),
}

impl SessionHandle {
    /// Resolve the URL requests must be posted to.
    ///
    /// Relative endpoint URLs are joined onto the base URL.
    pub fn message_url(&self, base: &Url, message_path: &str) -> McpResult<Url> {
        match self {
            Self::SessionId(id) => {
                let mut url = base.join(message_path)?;
                url.query_pairs_mut().append_pair("sessionId", id);
                Ok(url)
            }
            Self::MessageUrl(raw) => match Url::parse(raw) {
                Ok(url) => Ok(url),
                Err(url::ParseError::RelativeUrlWithoutBase) => Ok(base.join(raw)?),
                Err(e) => Err(e.into()),
            },
        }
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionId(id) => write!(f, "session id {id}"),
            Self::MessageUrl(url) => write!(f, "message url {url}"),
        }
    }
}

/// Lifecycle of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Connected,
    Failed(String),
    Closed,
}

impl ConnectionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Closed)
    }
}

/// Raw payloads received on the stream, consumed by request id.
///
/// Only answers to requests still in flight, or to ids not issued yet, are
/// retained; everything else is evicted whenever a waiter scans the queue.
#[derive(Debug, Default)]
pub struct ResponseQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct QueueInner {
    entries: VecDeque<String>,
    closed: bool,
    in_flight: BTreeSet<u64>,
    highest_id: u64,
}

impl ResponseQueue {
    pub fn push(&self, payload: String) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.push_back(payload);
        }
        self.notify.notify_waiters();
    }

    /// Mark the producer as gone; pending waits resolve immediately.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that a response to `id` is expected.
    pub(crate) fn register(&self, id: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.in_flight.insert(id);
            inner.highest_id = inner.highest_id.max(id);
        }
    }

    /// Stop expecting a response to `id`; a late answer becomes evictable.
    pub(crate) fn release(&self, id: u64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.in_flight.remove(&id);
        }
    }

    /// Remove and return the response for `id`, evicting what nobody awaits.
    ///
    /// Non-JSON payloads are dropped and remembered in `malformed`, which is
    /// only reported if the wait ends without an answer.
    fn take(
        &self,
        id: u64,
        malformed: &mut Option<String>,
    ) -> Option<McpResult<JsonRpcResponse>> {
        let mut guard = self.inner.lock().ok()?;
        let QueueInner {
            entries,
            closed,
            in_flight,
            highest_id,
        } = &mut *guard;

        let mut found = None;
        entries.retain(|raw| {
            let value = match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(value) => value,
                Err(_) => {
                    debug!(payload = %raw, "Dropping non-JSON stream payload");
                    *malformed = Some(raw.clone());
                    return false;
                }
            };
            // Notifications and other non-responses.
            let Ok(response) = serde_json::from_value::<JsonRpcResponse>(value) else {
                return false;
            };
            if response.result.is_none() && response.error.is_none() {
                return false;
            }
            let Some(response_id) = response.numeric_id() else {
                return false;
            };
            if response_id == id && found.is_none() {
                found = Some(response);
                return false;
            }
            in_flight.contains(&response_id) || response_id > *highest_id
        });

        if let Some(response) = found {
            return Some(Ok(response));
        }
        if *closed {
            return Some(Err(match malformed.clone() {
                Some(raw) => McpError::MalformedPayload(raw),
                None => McpError::StreamClosed,
            }));
        }
        None
    }

    /// Wait up to `deadline` for the response to request `id`.
    pub async fn wait_for(&self, id: u64, deadline: Duration) -> McpResult<JsonRpcResponse> {
        self.register(id);
        let mut malformed = None;

        let outcome = tokio::time::timeout(deadline, async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(outcome) = self.take(id, &mut malformed) {
                    return outcome;
                }
                notified.await;
            }
        })
        .await;

        self.release(id);
        match outcome {
            Ok(outcome) => outcome,
            Err(_) => Err(match malformed {
                Some(raw) => McpError::MalformedPayload(raw),
                None => McpError::ResponseTimeout,
            }),
        }
    }
}

/// State one stream listener publishes for one orchestrator.
#[derive(Debug)]
pub struct HandshakeState {
    mode: DiscoveryMode,
    phase: watch::Sender<ConnectionPhase>,
    handle: watch::Sender<Option<SessionHandle>>,
    responses: ResponseQueue,
}

impl HandshakeState {
    pub fn new(mode: DiscoveryMode) -> Self {
        let (phase, _) = watch::channel(ConnectionPhase::Connecting);
        let (handle, _) = watch::channel(None);
        Self {
            mode,
            phase,
            handle,
            responses: ResponseQueue::default(),
        }
    }

    pub fn mode(&self) -> DiscoveryMode {
        self.mode
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase.borrow().clone()
    }

    pub fn handle(&self) -> Option<SessionHandle> {
        self.handle.borrow().clone()
    }

    pub fn responses(&self) -> &ResponseQueue {
        &self.responses
    }

    pub fn mark_connected(&self) {
        self.phase.send_if_modified(|phase| {
            if *phase == ConnectionPhase::Connecting {
                *phase = ConnectionPhase::Connected;
                true
            } else {
                false
            }
        });
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.phase.send_if_modified(|phase| {
            if phase.is_terminal() {
                return false;
            }
            *phase = ConnectionPhase::Failed(reason);
            true
        });
        self.responses.close();
    }

    pub fn mark_closed(&self) {
        self.phase.send_if_modified(|phase| {
            if phase.is_terminal() {
                return false;
            }
            *phase = ConnectionPhase::Closed;
            true
        });
        self.responses.close();
    }

    /// Publish a session handle. The first one wins.
    pub fn publish_handle(&self, candidate: SessionHandle) -> bool {
        self.handle.send_if_modified(|handle| {
            if handle.is_some() {
                return false;
            }
            *handle = Some(candidate);
            true
        })
    }

    /// Apply one decoded event to the state.
    pub fn observe(&self, event: &SseEvent) {
        let data = event.data.trim();

        if event.is_endpoint() && self.mode.accepts_endpoint_event() {
            if self.publish_handle(SessionHandle::MessageUrl(data.to_string())) {
                info!(url = %data, "Discovered message endpoint");
            } else {
                debug!(url = %data, "Ignoring endpoint event, session handle already known");
            }
        } else if self.mode.accepts_query_session() && self.handle.borrow().is_none() {
            if let Some(id) = extract_session_id(data) {
                if self.publish_handle(SessionHandle::SessionId(id.to_string())) {
                    info!(session_id = %id, "Discovered session id");
                }
            }
        }

        if !data.is_empty() && !is_bare_url(data) {
            debug!(bytes = data.len(), "Queued stream payload");
            self.responses.push(data.to_string());
        }
    }

    /// Wait until the stream reports it is open.
    pub async fn wait_connected(&self, deadline: Duration) -> McpResult<()> {
        let mut rx = self.phase.subscribe();
        let phase = tokio::time::timeout(deadline, async {
            rx.wait_for(|phase| *phase != ConnectionPhase::Connecting)
                .await
                .map(|phase| phase.clone())
                .unwrap_or(ConnectionPhase::Closed)
        })
        .await
        .map_err(|_| McpError::ConnectTimeout)?;

        // Closed is only reachable from Connected; a short stream may already be over.
        match phase {
            ConnectionPhase::Connected | ConnectionPhase::Closed => Ok(()),
            ConnectionPhase::Failed(reason) => Err(McpError::Connection(reason)),
            ConnectionPhase::Connecting => Err(McpError::ConnectTimeout),
        }
    }

    /// Wait until a session handle is published or the stream ends.
    pub async fn wait_handle(&self, deadline: Duration) -> McpResult<SessionHandle> {
        let mut handle_rx = self.handle.subscribe();
        let mut phase_rx = self.phase.subscribe();

        let discovered = tokio::time::timeout(deadline, async {
            tokio::select! {
                handle = handle_rx.wait_for(Option::is_some) => {
                    handle.ok().and_then(|handle| handle.clone())
                }
                _ = phase_rx.wait_for(ConnectionPhase::is_terminal) => None,
            }
        })
        .await;

        match discovered {
            Ok(Some(handle)) => Ok(handle),
            // A handle may have landed in the same instant the stream ended.
            Ok(None) => self.handle().ok_or_else(|| {
                warn!("Event stream ended before a session handle was announced");
                McpError::DiscoveryTimeout
            }),
            Err(_) => Err(McpError::DiscoveryTimeout),
        }
    }
}
