//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the Alpha Vantage tool catalog to MCP clients over
//! JSON-RPC 2.0. Two transports share one [`Dispatcher`]: newline-delimited
//! stdio for a single local client, and streamable HTTP for many clients,
//! each with its own session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│   Tools     │    │
//! │   │ (stdio/http)│    │  (session)  │    │  (gateway)  │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  │                  │            │
//! │          ▼                  ▼                  ▼            │
//! │   ┌─────────────────────────────────────────────────┐      │
//! │   │              JSON-RPC Messages                  │      │
//! │   └─────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! The server speaks the versions in [`SUPPORTED_PROTOCOL_VERSIONS`],
//! preferring [`MCP_PROTOCOL_VERSION`].

pub mod dispatcher;
pub mod http;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use dispatcher::Dispatcher;
pub use http::HttpTransport;
pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, MCP_PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
pub use server::{shutdown_signal, McpServer};
pub use session::{Session, SessionPhase};
pub use transport::StdioTransport;
