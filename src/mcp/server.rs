//! stdio MCP server.
//!
//! One process is one connection: the server owns a single [`Session`] for
//! its whole life and processes lines strictly one at a time. The next line
//! is not read until the current response has been written and flushed.
//!
//! Shutdown happens on EOF or on SIGINT/SIGTERM (Ctrl+C on Windows). A
//! signal also abandons any request still being dispatched; nothing is
//! written for it afterwards.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::gateway::Gateway;
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::JsonRpcError;
use crate::mcp::session::{Session, SessionPhase};
use crate::mcp::transport::StdioTransport;

/// The stdio MCP server.
pub struct McpServer<G, R = tokio::io::BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    /// The transport layer.
    transport: StdioTransport<R, W>,
    /// Shared request dispatcher.
    dispatcher: Arc<Dispatcher<G>>,
    /// The single session of this connection.
    session: Session,
}

impl<G: Gateway> McpServer<G> {
    /// Creates a server on the process's stdin and stdout.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher<G>>) -> Self {
        Self::with_transport(dispatcher, StdioTransport::new())
    }

    /// Runs until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails or signal handlers cannot be
    /// installed.
    pub async fn run(&mut self) -> io::Result<()> {
        let shutdown = shutdown_signal()?;
        self.serve_until(shutdown).await
    }
}

impl<G, R, W> McpServer<G, R, W>
where
    G: Gateway,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an explicit transport.
    #[must_use]
    pub const fn with_transport(
        dispatcher: Arc<Dispatcher<G>>,
        transport: StdioTransport<R, W>,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            session: Session::new(),
        }
    }

    /// Returns the session state.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the current session phase.
    #[must_use]
    pub const fn state(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Consumes the server, returning the transport.
    pub fn into_transport(self) -> StdioTransport<R, W> {
        self.transport
    }

    /// Processes messages until EOF or until `shutdown` completes.
    ///
    /// The session is closed on return, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn serve_until<F>(&mut self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let result = loop {
            let line = tokio::select! {
                () = &mut shutdown => break Ok(()),
                line = self.transport.read_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("Input closed, shutting down");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            let response = match String::from_utf8(line) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    tokio::select! {
                        () = &mut shutdown => {
                            tracing::info!("Abandoning in-flight request");
                            break Ok(());
                        }
                        response = self.dispatcher.handle_raw(&line, &mut self.session) => response,
                    }
                }
                Err(_) => {
                    tracing::debug!("Rejected line that is not valid UTF-8");
                    Some(JsonRpcError::parse_error().into())
                }
            };

            if let Some(response) = response {
                tracing::trace!(id = ?response.id(), error = response.is_error(), "Writing response");
                if let Err(e) = self.transport.write_message(&response).await {
                    break Err(e);
                }
            }
        };

        self.session.close();
        result
    }
}

/// Completes when the process is asked to stop.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
#[cfg(unix)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    })
}

/// Completes when the process is asked to stop.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
#[cfg(windows)]
#[allow(clippy::unnecessary_wraps)] // Mirrors the unix signature
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, ProviderQuery};
    use crate::tools::ToolRegistry;
    use serde_json::{json, Value};

    struct EchoGateway;

    impl Gateway for EchoGateway {
        async fn invoke(&self, query: &ProviderQuery) -> Result<Value, GatewayError> {
            Ok(json!({"function": query.function, "symbol": query.param("symbol")}))
        }
    }

    /// Gateway that never answers.
    struct StalledGateway;

    impl Gateway for StalledGateway {
        async fn invoke(&self, _query: &ProviderQuery) -> Result<Value, GatewayError> {
            std::future::pending().await
        }
    }

    fn server<G: Gateway>(
        gateway: G,
        input: &'static str,
    ) -> McpServer<G, &'static [u8], Vec<u8>> {
        let dispatcher = Arc::new(Dispatcher::new(ToolRegistry::alphavantage(), gateway));
        McpServer::with_transport(
            dispatcher,
            StdioTransport::with_streams(input.as_bytes(), Vec::new()),
        )
    }

    fn output_lines(server: McpServer<impl Gateway, &'static [u8], Vec<u8>>) -> Vec<Value> {
        let output = String::from_utf8(server.into_transport().into_writer()).unwrap();
        output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    const HANDSHAKE: &str = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n",
    );

    #[test]
    fn server_initial_state() {
        let server = server(EchoGateway, "");
        assert_eq!(server.state(), SessionPhase::Uninitialized);
    }

    #[tokio::test]
    async fn responses_follow_request_order() {
        const INPUT: &str = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"stock_quote","arguments":{"symbol":"MSFT"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":"b","method":"tools/call","params":{"name":"stock_quote","arguments":{"symbol":"IBM"}}}"#,
            "\n",
        );
        let mut server = server(EchoGateway, INPUT);
        server.serve_until(std::future::pending()).await.unwrap();
        assert_eq!(server.state(), SessionPhase::Closed);

        let lines = output_lines(server);
        assert_eq!(lines.len(), 3, "notification and blank line must not answer");
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], "a");
        assert_eq!(lines[2]["id"], "b");

        let text = lines[2]["result"]["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["symbol"], "IBM");
    }

    #[tokio::test]
    async fn malformed_line_does_not_end_session() {
        let input = Box::leak(format!("{HANDSHAKE}{{oops\n{{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}}\n").into_boxed_str());
        let mut server = server(EchoGateway, input);
        server.serve_until(std::future::pending()).await.unwrap();

        let lines = output_lines(server);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["error"]["code"], -32700);
        assert_eq!(lines[2]["id"], 2);
    }

    #[tokio::test]
    async fn invalid_utf8_line_gets_parse_error() {
        const INPUT: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\
            \xff\xfe\n\
            {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n";
        let dispatcher = Arc::new(Dispatcher::new(ToolRegistry::alphavantage(), EchoGateway));
        let mut server =
            McpServer::with_transport(dispatcher, StdioTransport::with_streams(INPUT, Vec::new()));
        server.serve_until(std::future::pending()).await.unwrap();

        let lines = output_lines(server);
        assert_eq!(lines.len(), 3, "the bad line must not end the connection");
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["error"]["code"], -32700);
        assert!(lines[1]["id"].is_null());
        assert_eq!(lines[2]["id"], 2);
        assert_eq!(lines[2]["result"], json!({}));
    }

    #[tokio::test]
    async fn shutdown_abandons_in_flight_call() {
        let input = Box::leak(
            format!(
                "{HANDSHAKE}{}\n",
                r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"stock_quote","arguments":{"symbol":"AAPL"}}}"#
            )
            .into_boxed_str(),
        );
        let mut server = server(StalledGateway, input);
        server
            .serve_until(tokio::time::sleep(std::time::Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(server.state(), SessionPhase::Closed);

        let lines = output_lines(server);
        assert_eq!(lines.len(), 1, "only the initialize response is written");
        assert_eq!(lines[0]["id"], 1);
    }

    #[tokio::test]
    async fn read_failure_is_fatal() {
        let reader = tokio::io::BufReader::new(
            tokio_test::io::Builder::new()
                .read_error(io::Error::new(io::ErrorKind::InvalidData, "bad pipe"))
                .build(),
        );
        let dispatcher = Arc::new(Dispatcher::new(ToolRegistry::alphavantage(), EchoGateway));
        let mut server =
            McpServer::with_transport(dispatcher, StdioTransport::with_streams(reader, Vec::new()));

        let err = server.serve_until(std::future::pending()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(server.state(), SessionPhase::Closed);
    }
}
