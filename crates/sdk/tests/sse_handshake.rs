//! End-to-end handshakes against an in-process SSE server.
//!
//! The server answers every POST with `202 Accepted` and delivers the JSON-RPC
//! response later on the session's event stream.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prtg_mcp_sdk::{
    Auth, ConnectionPhase, DiscoveryMode, HandshakeConfig, McpClient, McpError, SessionHandle,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

const TOKEN: &str = "test-api-key-12345678-1234-1234-1234-123456789abc";

#[derive(Debug, Clone, Copy)]
enum Announce {
    QuerySession,
    EndpointEvent,
    Both,
    Nothing,
}

struct MockMcp {
    base: String,
    announce: Announce,
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<Event>>>,
    posts: AtomicUsize,
}

impl MockMcp {
    fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        == Some(TOKEN)
}

async fn sse(State(state): State<Arc<MockMcp>>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel();

    let query = Event::default().data(format!("{}/sse?sessionId={}", state.base, session_id));
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}/message?sessionId={}", state.base, session_id));
    match state.announce {
        Announce::QuerySession => {
            let _ = tx.send(query);
        }
        Announce::EndpointEvent => {
            let _ = tx.send(endpoint);
        }
        Announce::Both => {
            let _ = tx.send(query);
            let _ = tx.send(endpoint);
        }
        Announce::Nothing => {}
    }

    state.sessions.lock().unwrap().insert(session_id, tx);

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

async fn message(
    State(state): State<Arc<MockMcp>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    state.posts.fetch_add(1, Ordering::SeqCst);

    let Some(sender) = state.sessions.lock().unwrap().get(&query.session_id).cloned() else {
        return (StatusCode::NOT_FOUND, "Invalid session ID").into_response();
    };

    // Notifications get no reply.
    let Some(id) = request.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };

    let reply = match request["method"].as_str().unwrap_or_default() {
        "initialize" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": "mcp-server-prtg", "version": "2.0.0"}
            }
        }),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": [{"name": "t1", "description": "d"}]}
        }),
        "tools/call" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32603, "message": "database not configured"}
        }),
        other => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": format!("Method not found: {other}")}
        }),
    };

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let noise = json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {}});
        let _ = sender.send(Event::default().data(noise.to_string()));
        let _ = sender.send(Event::default().data(reply.to_string()));
    });

    StatusCode::ACCEPTED.into_response()
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "timestamp": "2025-01-15T10:30:00Z"}))
}

async fn status(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    Json(json!({
        "status": "running",
        "version": "v2.0.0",
        "transport": "sse",
        "mcp_tools": 6,
        "database": {"status": "not_configured", "error": ""}
    }))
    .into_response()
}

async fn spawn_server(announce: Announce) -> Arc<MockMcp> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("prtg_mcp_sdk=debug")
        .with_test_writer()
        .try_init();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let state = Arc::new(MockMcp {
        base,
        announce,
        sessions: Mutex::new(HashMap::new()),
        posts: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/sse", get(sse))
        .route("/message", post(message))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    state
}

fn client(server: &MockMcp, token: &str, mode: DiscoveryMode) -> McpClient {
    McpClient::builder()
        .base_url(server.base.clone())
        .api_key(token)
        .handshake(HandshakeConfig {
            discovery_mode: mode,
            connect_wait: Duration::from_secs(2),
            discovery_wait: Duration::from_secs(2),
            response_wait: Duration::from_secs(2),
            ..Default::default()
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_tools_list_over_stream() {
    let server = spawn_server(Announce::Both).await;
    let client = client(&server, TOKEN, DiscoveryMode::Auto);

    let session = client.connect().await.unwrap();
    assert!(matches!(session.handle(), SessionHandle::SessionId(_)));
    assert_eq!(session.message_url().path(), "/message");

    let tools = session.list_tools().await.unwrap();
    assert_eq!(tools.tools.len(), 1);
    assert_eq!(tools.tools[0].name, "t1");
    assert_eq!(tools.tools[0].description.as_deref(), Some("d"));
    assert_eq!(server.posts(), 1);

    session.close().await;
}

#[tokio::test]
async fn test_endpoint_event_discovery() {
    let server = spawn_server(Announce::EndpointEvent).await;
    let client = client(&server, TOKEN, DiscoveryMode::EndpointEvent);

    let session = client.connect().await.unwrap();
    match session.handle() {
        SessionHandle::MessageUrl(url) => {
            assert!(url.starts_with(&format!("{}/message?sessionId=", server.base)));
            assert_eq!(session.message_url().as_str(), url);
        }
        other => panic!("Expected endpoint URL, got {other:?}"),
    }

    let response = session.call("tools/list", None).await.unwrap();
    assert!(response.matches_id(1));
    assert_eq!(response.result.unwrap()["tools"][0]["name"], "t1");
}

#[tokio::test]
async fn test_query_session_discovery() {
    let server = spawn_server(Announce::QuerySession).await;
    let client = client(&server, TOKEN, DiscoveryMode::QuerySession);

    let session = client.connect().await.unwrap();
    let tools = session.list_tools().await.unwrap();

    assert_eq!(tools.tools[0].name, "t1");
}

#[tokio::test]
async fn test_responses_correlate_across_calls() {
    let server = spawn_server(Announce::EndpointEvent).await;
    let client = client(&server, TOKEN, DiscoveryMode::Auto);
    let session = client.connect().await.unwrap();

    let tools = session.list_tools().await.unwrap();
    assert_eq!(tools.tools.len(), 1);

    let raw = session
        .call(
            "tools/call",
            Some(json!({"name": "prtg_get_sensors", "arguments": {"limit": 3}})),
        )
        .await
        .unwrap();
    assert!(raw.matches_id(2));
    assert!(raw.result.is_none());
    assert_eq!(raw.error.as_ref().unwrap().code, -32603);

    let typed = session
        .call_tool("prtg_get_sensors", json!({"limit": 3}))
        .await;
    match typed {
        Err(McpError::Rpc(err)) => assert_eq!(err.message, "database not configured"),
        other => panic!("Expected Rpc error, got {other:?}"),
    }
    assert_eq!(server.posts(), 3);
}

#[tokio::test]
async fn test_initialize_sends_notification() {
    let server = spawn_server(Announce::EndpointEvent).await;
    let client = client(&server, TOKEN, DiscoveryMode::Auto);
    let session = client.connect().await.unwrap();

    let init = session.initialize("mcp-probe", "0.1.0").await.unwrap();
    assert_eq!(init.server_info.name, "mcp-server-prtg");
    assert_eq!(init.protocol_version, "2024-11-05");
    // initialize + notifications/initialized
    assert_eq!(server.posts(), 2);
}

#[tokio::test]
async fn test_discovery_timeout_never_posts() {
    let server = spawn_server(Announce::Nothing).await;
    let client = McpClient::builder()
        .base_url(server.base.clone())
        .api_key(TOKEN)
        .handshake(HandshakeConfig {
            discovery_wait: Duration::from_millis(200),
            ..Default::default()
        })
        .build()
        .unwrap();

    let result = client.connect().await;

    assert!(matches!(result, Err(McpError::DiscoveryTimeout)));
    assert_eq!(server.posts(), 0);
}

#[tokio::test]
async fn test_bad_token_is_connection_failure() {
    let server = spawn_server(Announce::EndpointEvent).await;
    let client = client(&server, "wrong-token", DiscoveryMode::Auto);

    match client.connect().await {
        Err(McpError::Connection(reason)) => assert!(reason.contains("401")),
        other => panic!("Expected Connection error, got {other:?}"),
    }
    assert_eq!(server.posts(), 0);
}

#[tokio::test]
async fn test_status_auth_gate() {
    let server = spawn_server(Announce::Nothing).await;
    let client = client(&server, TOKEN, DiscoveryMode::Auto);

    let anonymous = client.health().probe_status(Auth::Anonymous).await.unwrap();
    assert_eq!(anonymous.status, 401);

    let authenticated = client.health().probe_status(Auth::Bearer).await.unwrap();
    assert_eq!(authenticated.status, 200);
    assert!(authenticated.body.contains(r#""status":"running""#));

    let health = client.health().check().await.unwrap();
    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn test_close_releases_stream() {
    let server = spawn_server(Announce::EndpointEvent).await;
    let client = client(&server, TOKEN, DiscoveryMode::Auto);

    let session = client.connect().await.unwrap();
    assert_eq!(session.phase(), ConnectionPhase::Connected);

    session.close().await;
}
