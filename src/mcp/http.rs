//! Streamable HTTP transport.
//!
//! Every JSON-RPC message is one `POST /mcp`. Sessions are opened by an
//! `initialize` request without an `Mcp-Session-Id` header; the id is handed
//! back on the response and must accompany every later request on that
//! session. `DELETE /mcp` ends a session.
//!
//! Each session has its own async mutex, so requests on one session run one
//! at a time while distinct sessions proceed concurrently. Dropping a
//! handler future (client disconnect) cancels the in-flight gateway call.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::gateway::Gateway;
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::{
    is_supported_version, parse_value, IncomingMessage, JsonRpcError, OutgoingMessage,
};
use crate::mcp::session::Session;

/// Header name for MCP session ID
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header name for MCP protocol version
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Path of the MCP endpoint.
pub const MCP_ENDPOINT: &str = "/mcp";

/// Default session TTL: 30 minutes
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

/// Default maximum number of sessions
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Shortest interval between expiry sweeps.
const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// One client session as held by the HTTP transport.
#[derive(Debug)]
struct HttpSession {
    /// Session ID
    id: String,
    /// Protocol state, locked for the duration of each dispatch
    state: Mutex<Session>,
    /// Cancelled when the session is closed or expires
    closed: CancellationToken,
    /// Timestamp of last activity (milliseconds since UNIX epoch)
    last_accessed: AtomicU64,
}

impl HttpSession {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: Mutex::new(Session::new()),
            closed: CancellationToken::new(),
            last_accessed: AtomicU64::new(current_timestamp_ms()),
        }
    }

    /// Update the last accessed timestamp
    fn touch(&self) {
        self.last_accessed
            .store(current_timestamp_ms(), Ordering::Relaxed);
    }

    /// Check if the session has expired
    fn is_expired(&self, ttl_ms: u64) -> bool {
        let last = self.last_accessed.load(Ordering::Relaxed);
        current_timestamp_ms().saturating_sub(last) > ttl_ms
    }

    /// Ends the session without waiting for in-flight work.
    ///
    /// A request holding the lock sees the cancellation and closes the
    /// protocol state itself.
    fn close(&self) {
        self.closed.cancel();
        if let Ok(mut session) = self.state.try_lock() {
            session.close();
        }
    }
}

/// Get current timestamp in milliseconds since UNIX epoch
fn current_timestamp_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Session store keyed by session ID.
#[derive(Debug)]
struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<HttpSession>>>,
    /// Session time-to-live in milliseconds
    ttl_ms: u64,
    /// Maximum number of sessions
    max_sessions: usize,
}

impl SessionStore {
    fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            max_sessions,
        }
    }

    async fn create(&self) -> Option<Arc<HttpSession>> {
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= self.max_sessions {
            tracing::warn!(
                max = self.max_sessions,
                current = sessions.len(),
                "Session limit reached, rejecting new session"
            );
            return None;
        }

        let session = Arc::new(HttpSession::new());
        sessions.insert(session.id.clone(), Arc::clone(&session));
        tracing::debug!(session_id = %session.id, total = sessions.len(), "Created new session");
        Some(session)
    }

    async fn get(&self, id: &str) -> Option<Arc<HttpSession>> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(id)?;
        if session.is_expired(self.ttl_ms) {
            tracing::debug!(session_id = %id, "Session expired on access");
            return None;
        }
        session.touch();
        Some(Arc::clone(session))
    }

    async fn remove(&self, id: &str) -> Option<Arc<HttpSession>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, total = sessions.len(), "Removed session");
        }
        removed
    }

    /// Remove all expired sessions
    async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            let expired = session.is_expired(self.ttl_ms);
            if expired {
                session.close();
            }
            !expired
        });
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(
                removed,
                remaining = sessions.len(),
                "Cleaned up expired sessions"
            );
        }
        removed
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Shared state for the HTTP handlers.
struct AppState<G> {
    dispatcher: Arc<Dispatcher<G>>,
    sessions: SessionStore,
}

/// HTTP transport for the MCP server.
pub struct HttpTransport<G> {
    dispatcher: Arc<Dispatcher<G>>,
    session_ttl: Duration,
    max_sessions: usize,
}

impl<G: Gateway> HttpTransport<G> {
    /// Creates a transport with default session limits.
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher<G>>) -> Self {
        Self {
            dispatcher,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Sets how long an idle session survives.
    #[must_use]
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sets the maximum number of concurrent sessions.
    #[must_use]
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Builds the axum router without starting the expiry sweep.
    ///
    /// Expired sessions are still refused on access.
    pub fn into_router(self) -> Router {
        router(self.into_state())
    }

    /// Binds `addr` and serves until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound, or
    /// [`ServerError::Io`] if serving fails.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let period = (self.session_ttl / 2).max(MIN_CLEANUP_INTERVAL);
        let state = self.into_state();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        tracing::info!(%addr, endpoint = MCP_ENDPOINT, "HTTP transport listening");

        let cleanup_state = Arc::clone(&state);
        let cleanup = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                cleanup_state.sessions.cleanup_expired().await;
            }
        });

        let result = axum::serve(listener, router(state))
            .with_graceful_shutdown(shutdown)
            .await;
        cleanup.abort();

        result.map_err(ServerError::from)
    }

    fn into_state(self) -> Arc<AppState<G>> {
        Arc::new(AppState {
            dispatcher: self.dispatcher,
            sessions: SessionStore::new(self.session_ttl, self.max_sessions),
        })
    }
}

fn router<G: Gateway>(state: Arc<AppState<G>>) -> Router {
    Router::new()
        .route(
            MCP_ENDPOINT,
            post(handle_post::<G>).delete(handle_delete::<G>),
        )
        .with_state(state)
}

/// Checks that the request body is declared as JSON.
fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

/// Checks that the client will take a JSON response.
fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|range| range.split(';').next())
        .map(str::trim)
        .any(|media| {
            media.eq_ignore_ascii_case("application/json")
                || media.eq_ignore_ascii_case("application/*")
                || media == "*/*"
        })
}

fn is_initialize(message: &IncomingMessage) -> bool {
    matches!(message, IncomingMessage::Request(req) if req.method == "initialize")
}

/// The `protocolVersion` an `initialize` asks for, if it names one.
fn requested_version(message: &IncomingMessage) -> Option<&str> {
    message
        .params()
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
}

fn rejection(status: StatusCode, message: &'static str) -> Response {
    tracing::debug!(status = status.as_u16(), message, "Rejected HTTP request");
    (status, message).into_response()
}

fn json_rpc(message: OutgoingMessage) -> Response {
    Json(message).into_response()
}

/// Handles `POST /mcp`.
async fn handle_post<G: Gateway>(
    State(state): State<Arc<AppState<G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !has_json_content_type(&headers) {
        return rejection(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json",
        );
    }
    if !accepts_json(&headers) {
        return rejection(StatusCode::NOT_ACCEPTABLE, "Accept must include application/json");
    }

    let message = match serde_json::from_slice::<Value>(&body)
        .map_err(|_| JsonRpcError::parse_error())
        .and_then(parse_value)
    {
        Ok(message) => message,
        Err(error) => return json_rpc(error.into()),
    };

    let version = match headers.get(MCP_PROTOCOL_VERSION_HEADER) {
        None => None,
        Some(value) => match value.to_str() {
            Ok(v) if is_supported_version(v) => Some(v.to_string()),
            _ => {
                return rejection(StatusCode::BAD_REQUEST, "Unsupported MCP-Protocol-Version");
            }
        },
    };

    let opening = headers.get(MCP_SESSION_ID_HEADER).is_none() && is_initialize(&message);
    if opening {
        if let (Some(sent), Some(requested)) = (version.as_deref(), requested_version(&message)) {
            if sent != requested {
                return rejection(
                    StatusCode::BAD_REQUEST,
                    "MCP-Protocol-Version does not match the requested protocolVersion",
                );
            }
        }
    }

    let (http_session, opened) = match headers.get(MCP_SESSION_ID_HEADER) {
        Some(id) => match state.sessions.get(id.to_str().unwrap_or_default()).await {
            Some(session) => (session, false),
            None => return rejection(StatusCode::NOT_FOUND, "Session not found"),
        },
        None if opening => match state.sessions.create().await {
            Some(session) => (session, true),
            None => {
                return rejection(StatusCode::SERVICE_UNAVAILABLE, "Session limit reached");
            }
        },
        None => return rejection(StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header"),
    };

    if !opened && version.is_none() {
        return rejection(StatusCode::BAD_REQUEST, "Missing MCP-Protocol-Version header");
    }

    let closed = &http_session.closed;
    let mut session = tokio::select! {
        biased;
        () = closed.cancelled() => return rejection(StatusCode::NOT_FOUND, "Session closed"),
        session = http_session.state.lock() => session,
    };

    if let (Some(negotiated), Some(sent)) = (session.protocol_version(), version.as_deref()) {
        if negotiated != sent {
            return rejection(
                StatusCode::BAD_REQUEST,
                "MCP-Protocol-Version does not match the negotiated version",
            );
        }
    }

    tracing::debug!(
        session_id = %http_session.id,
        id = ?message.id(),
        method = message.method(),
        "Dispatching HTTP request"
    );

    let dispatched = tokio::select! {
        biased;
        () = closed.cancelled() => None,
        response = state.dispatcher.handle(message, &mut session) => Some(response),
    };
    let Some(response) = dispatched else {
        session.close();
        return rejection(StatusCode::NOT_FOUND, "Session closed");
    };

    let negotiated = session.protocol_version().is_some();
    drop(session);

    if opened && !negotiated {
        state.sessions.remove(&http_session.id).await;
    }

    let mut reply = match response {
        Some(message) => json_rpc(message),
        None => StatusCode::OK.into_response(),
    };

    if opened && negotiated {
        if let Ok(id) = HeaderValue::from_str(&http_session.id) {
            reply.headers_mut().insert(MCP_SESSION_ID_HEADER, id);
        }
        tracing::info!(session_id = %http_session.id, "Opened HTTP session");
    }

    reply
}

/// Handles `DELETE /mcp`.
async fn handle_delete<G: Gateway>(
    State(state): State<Arc<AppState<G>>>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = headers.get(MCP_SESSION_ID_HEADER) else {
        return rejection(StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header");
    };

    match state.sessions.remove(id.to_str().unwrap_or_default()).await {
        Some(session) => {
            session.close();
            tracing::info!(session_id = %session.id, "Closed HTTP session");
            StatusCode::OK.into_response()
        }
        None => rejection(StatusCode::NOT_FOUND, "Session not found"),
    }
}
