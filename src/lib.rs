//! alphavantage-mcp: MCP server for Alpha Vantage market data
//!
//! This library exposes Alpha Vantage endpoints (quotes, time series, symbol
//! search, company fundamentals, exchange rates and market status) as MCP
//! tools that AI assistants can call.
//!
//! # Architecture
//!
//! The server is a thin protocol layer. It validates arguments and forwards
//! them; the provider's JSON comes back to the client unchanged.
//!
//! - **Transports**: newline-delimited stdio, or streamable HTTP
//! - **Session lifecycle**: `initialize` → `notifications/initialized` → ready
//! - **Tools**: a fixed catalog, each mapped onto one provider function
//! - **Gateway**: the single outbound HTTPS call per tool invocation
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`gateway`] — Data provider gateway
//! - [`mcp`] — MCP protocol implementation
//! - [`tools`] — Tool registry, catalog and argument validation

pub mod config;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod tools;
