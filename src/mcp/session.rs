//! Per-connection MCP session state.
//!
//! A [`Session`] is owned by whichever transport holds the connection and is
//! passed explicitly into the dispatcher for every message. Nothing about a
//! session lives in shared or global state.
//!
//! ```text
//! Uninitialized ──initialize──▶ Initializing ──notifications/initialized──▶ Ready
//!       │                            │                                       │
//!       └────────────────────────────┴──────────── close ────────────────────┴──▶ Closed
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::mcp::protocol::is_supported_version;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the `initialize` request.
    Uninitialized,
    /// `initialize` answered, waiting for `notifications/initialized`.
    Initializing,
    /// Normal operation.
    Ready,
    /// Transport closed. Terminal.
    Closed,
}

/// Client information received during initialisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: Option<String>,
}

/// Reasons a session transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The client asked for a protocol version we do not speak.
    #[error("Unsupported protocol version: {requested}")]
    UnsupportedVersion {
        /// The version the client requested.
        requested: String,
    },

    /// `initialize` arrived on a session that already completed it.
    #[error("Session already initialised")]
    AlreadyInitialised,

    /// A request other than `initialize` arrived before the handshake finished.
    #[error("Session not initialised")]
    NotInitialised,

    /// The session has been closed.
    #[error("Session closed")]
    Closed,
}

/// State of one MCP connection.
#[derive(Debug)]
pub struct Session {
    phase: SessionPhase,
    protocol_version: Option<String>,
    client_capabilities: Value,
    client_info: Option<ClientInfo>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a session in the `Uninitialized` phase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            protocol_version: None,
            client_capabilities: Value::Null,
            client_info: None,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Returns `true` once `notifications/initialized` has been received.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    /// Returns `true` if the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Negotiated protocol version, set by a successful `initialize`.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Capabilities the client declared in `initialize`.
    #[must_use]
    pub const fn client_capabilities(&self) -> &Value {
        &self.client_capabilities
    }

    /// Client information from `initialize`, if the client sent any.
    #[must_use]
    pub const fn client_info(&self) -> Option<&ClientInfo> {
        self.client_info.as_ref()
    }

    /// Handles the `initialize` request: `Uninitialized → Initializing`.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the session untouched, if the session is past
    /// `Uninitialized` or the requested version is unsupported.
    pub fn begin_initialize(
        &mut self,
        requested_version: &str,
        capabilities: Value,
        client_info: Option<ClientInfo>,
    ) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Uninitialized => {}
            SessionPhase::Initializing | SessionPhase::Ready => {
                return Err(SessionError::AlreadyInitialised)
            }
            SessionPhase::Closed => return Err(SessionError::Closed),
        }

        if !is_supported_version(requested_version) {
            return Err(SessionError::UnsupportedVersion {
                requested: requested_version.to_string(),
            });
        }

        self.client_capabilities = capabilities;
        self.client_info = client_info;
        self.protocol_version = Some(requested_version.to_string());
        self.phase = SessionPhase::Initializing;
        Ok(())
    }

    /// Handles `notifications/initialized`: `Initializing → Ready`.
    ///
    /// Returns `false` (and changes nothing) in any other phase.
    pub fn mark_ready(&mut self) -> bool {
        if self.phase == SessionPhase::Initializing {
            self.phase = SessionPhase::Ready;
            true
        } else {
            false
        }
    }

    /// Checks that a request for `method` may be processed now.
    ///
    /// `initialize` and `ping` are accepted in every open phase; everything
    /// else needs `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotInitialised`] or [`SessionError::Closed`].
    pub fn check_request(&self, method: &str) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::Closed => Err(SessionError::Closed),
            SessionPhase::Ready => Ok(()),
            SessionPhase::Uninitialized | SessionPhase::Initializing => {
                if matches!(method, "initialize" | "ping") {
                    Ok(())
                } else {
                    Err(SessionError::NotInitialised)
                }
            }
        }
    }

    /// Closes the session. Idempotent.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_lifecycle() {
        let mut session = Session::new();
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert!(session.check_request("tools/list").is_err());
        assert!(session.check_request("initialize").is_ok());

        session
            .begin_initialize("2025-06-18", json!({"roots": {}}), None)
            .unwrap();
        assert_eq!(session.phase(), SessionPhase::Initializing);
        assert_eq!(session.protocol_version(), Some("2025-06-18"));
        assert_eq!(session.client_capabilities(), &json!({"roots": {}}));

        // Still gated until the client confirms
        assert_eq!(
            session.check_request("tools/call"),
            Err(SessionError::NotInitialised)
        );

        assert!(session.mark_ready());
        assert!(session.is_ready());
        assert!(session.check_request("tools/call").is_ok());
        assert!(!session.mark_ready());
    }

    #[test]
    fn unsupported_version_leaves_session_uninitialized() {
        let mut session = Session::new();
        let err = session
            .begin_initialize("1999-01-01", Value::Null, None)
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::UnsupportedVersion {
                requested: "1999-01-01".to_string()
            }
        );
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
        assert!(session.protocol_version().is_none());
    }

    #[test]
    fn reinitialise_is_rejected() {
        let mut session = Session::new();
        session
            .begin_initialize("2024-11-05", Value::Null, None)
            .unwrap();
        assert_eq!(
            session.begin_initialize("2024-11-05", Value::Null, None),
            Err(SessionError::AlreadyInitialised)
        );

        session.mark_ready();
        assert_eq!(
            session.begin_initialize("2024-11-05", Value::Null, None),
            Err(SessionError::AlreadyInitialised)
        );
    }

    #[test]
    fn initialized_notification_ignored_before_initialize() {
        let mut session = Session::new();
        assert!(!session.mark_ready());
        assert_eq!(session.phase(), SessionPhase::Uninitialized);
    }

    #[test]
    fn ping_allowed_before_ready() {
        let session = Session::new();
        assert!(session.check_request("ping").is_ok());
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = Session::new();
        session
            .begin_initialize("2025-03-26", Value::Null, None)
            .unwrap();
        session.mark_ready();
        session.close();

        assert!(session.is_closed());
        assert_eq!(session.check_request("ping"), Err(SessionError::Closed));
        assert!(!session.mark_ready());
        assert_eq!(
            session.begin_initialize("2025-03-26", Value::Null, None),
            Err(SessionError::Closed)
        );
    }
}
