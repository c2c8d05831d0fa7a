//! Request dispatcher.
//!
//! The [`Dispatcher`] is the single place JSON-RPC messages are interpreted.
//! Transports hand it one message at a time together with the connection's
//! [`Session`]; it returns at most one message to send back. It owns the tool
//! registry and the gateway and keeps no per-connection state of its own, so
//! one instance is shared by every connection.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::gateway::Gateway;
use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, RequestId,
    SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::session::{ClientInfo, Session, SessionError};
use crate::tools::ToolRegistry;

/// Usage hint returned to clients in the `initialize` result.
const INSTRUCTIONS: &str = "Financial market data from Alpha Vantage. Call tools/list for the \
                            available queries; tool results are the provider's raw JSON.";

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information as sent in `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfoParams {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    client_info: Option<ClientInfoParams>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// Routes JSON-RPC messages for any number of sessions.
#[derive(Debug)]
pub struct Dispatcher<G> {
    registry: ToolRegistry,
    gateway: G,
}

impl<G: Gateway> Dispatcher<G> {
    /// Creates a dispatcher over a populated registry.
    #[must_use]
    pub const fn new(registry: ToolRegistry, gateway: G) -> Self {
        Self { registry, gateway }
    }

    /// The tool registry.
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// The gateway tool calls are sent to.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Parses one raw message and handles it.
    ///
    /// Malformed input yields a parse or invalid-request error and leaves the
    /// session untouched.
    pub async fn handle_raw(&self, raw: &str, session: &mut Session) -> Option<OutgoingMessage> {
        if session.is_closed() {
            return None;
        }

        match parse_message(raw) {
            Ok(message) => self.handle(message, session).await,
            Err(error) => {
                tracing::debug!(code = error.error.code, "Rejected malformed message");
                Some(error.into())
            }
        }
    }

    /// Handles one parsed message.
    ///
    /// Returns the response for a request, or `None` for a notification or a
    /// closed session.
    pub async fn handle(
        &self,
        message: IncomingMessage,
        session: &mut Session,
    ) -> Option<OutgoingMessage> {
        if session.is_closed() {
            tracing::debug!(method = message.method(), "Dropping message for closed session");
            return None;
        }

        match message {
            IncomingMessage::Request(req) => Some(match self.handle_request(&req, session).await {
                Ok(resp) => resp.into(),
                Err(error) => error.into(),
            }),
            IncomingMessage::Notification(ref notif) => {
                Self::handle_notification(notif, session);
                None
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(
        &self,
        req: &JsonRpcRequest,
        session: &mut Session,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        tracing::debug!(id = %req.id, method = %req.method, "Handling request");

        session
            .check_request(&req.method)
            .map_err(|e| session_error(req.id.clone(), &e))?;

        match req.method.as_str() {
            "initialize" => Self::handle_initialize(req, session),
            "ping" => Ok(Self::handle_ping(req)),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req).await,
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(notif: &JsonRpcNotification, session: &mut Session) {
        match notif.method.as_str() {
            "notifications/initialized" => {
                if session.mark_ready() {
                    tracing::info!("Session ready");
                } else {
                    tracing::warn!(
                        phase = ?session.phase(),
                        "Ignoring initialized notification outside handshake"
                    );
                }
            }
            other => tracing::debug!(method = other, "Ignoring notification"),
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(
        req: &JsonRpcRequest,
        session: &mut Session,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: InitializeParams = parse_params(req, "initialize")?;

        let client_info = params.client_info.map(|info| ClientInfo {
            name: info.name,
            version: info.version,
        });

        session
            .begin_initialize(&params.protocol_version, params.capabilities, client_info)
            .map_err(|e| session_error(req.id.clone(), &e))?;

        tracing::info!(
            protocol_version = %params.protocol_version,
            client = session.client_info().map_or("unknown", |c| c.name.as_str()),
            "Session initialising"
        );

        let result = json!({
            "protocolVersion": params.protocol_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
            "instructions": INSTRUCTIONS,
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let result = json!({
            "tools": self.registry.definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ToolCallParams = parse_params(req, "tool call")?;

        let tool = self.registry.get(&params.name).ok_or_else(|| {
            JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::MethodNotFound,
                    format!("Unknown tool: {}", params.name),
                ),
            )
        })?;

        let arguments = tool.validate(&params.arguments).map_err(|e| {
            JsonRpcError::invalid_params(
                req.id.clone(),
                format!("Invalid arguments for tool '{}': {e}", params.name),
            )
        })?;

        let query = tool.query(&arguments);
        tracing::info!(tool = %params.name, function = %query.function, "Calling tool");

        let result = match self.gateway.invoke(&query).await {
            // Provider business errors are data, not faults
            Ok(payload) => ToolCallResult::text(serialise_payload(&req.id, &payload)?),
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "Gateway call failed");
                ToolCallResult::error(format!("Tool '{}' failed: {e}", params.name))
            }
        };

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }
}

/// Deserialises a request's params, treating absence as an error.
fn parse_params<T: DeserializeOwned>(req: &JsonRpcRequest, what: &str) -> Result<T, JsonRpcError> {
    req.params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}")))?
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params")))
}

/// Renders a provider payload as the text of a content block.
fn serialise_payload(id: &RequestId, payload: &Value) -> Result<String, JsonRpcError> {
    serde_json::to_string_pretty(payload).map_err(|e| {
        tracing::error!(error = %e, "Failed to serialise provider payload");
        JsonRpcError::internal_error(id.clone(), "Internal error: failed to serialise result")
    })
}

/// Maps a refused session transition onto a JSON-RPC error.
fn session_error(id: RequestId, error: &SessionError) -> JsonRpcError {
    match error {
        SessionError::UnsupportedVersion { requested } => JsonRpcError::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, error.to_string()).with_data(
                json!({
                    "supported": SUPPORTED_PROTOCOL_VERSIONS,
                    "requested": requested,
                }),
            ),
        ),
        SessionError::AlreadyInitialised | SessionError::NotInitialised | SessionError::Closed => {
            JsonRpcError::invalid_request_with(id, error.to_string())
        }
    }
}
