//! Data-provider gateway.
//!
//! The dispatcher talks to the financial-data provider only through the
//! [`Gateway`] trait: one call per tool invocation, returning the provider's
//! raw JSON body. Provider-side business errors (unknown symbol, rate limit)
//! arrive as ordinary JSON and are passed through untouched; only failures to
//! obtain a JSON body at all become a [`GatewayError`].
//!
//! # Modules
//!
//! - [`alphavantage`] — HTTPS gateway for the Alpha Vantage `query` API

pub mod alphavantage;

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

pub use alphavantage::AlphaVantageGateway;

/// One outbound provider query, derived from a validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderQuery {
    /// Name of the tool that produced this query.
    pub tool: String,
    /// Provider function, e.g. `GLOBAL_QUOTE`.
    pub function: String,
    /// Query parameters in argument order.
    pub params: Vec<(String, String)>,
}

impl ProviderQuery {
    /// Returns the value of a query parameter, if present.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Errors raised when the provider could not be queried.
///
/// Messages never include the API key.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No API key was configured.
    #[error("no Alpha Vantage API key configured (set ALPHAVANTAGE_API_KEY or provider.api_key)")]
    MissingApiKey,

    /// The configured base URL could not be combined into a request URL.
    #[error("invalid provider URL: {message}")]
    InvalidUrl {
        /// Description of what's wrong.
        message: String,
    },

    /// The HTTP request failed before a response arrived.
    #[error("provider request failed: {message}")]
    Request {
        /// Description of the failure.
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The provider's body was not JSON.
    #[error("provider returned a non-JSON body: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },
}

/// Executes provider queries.
///
/// Implementations must be cheap to share: the dispatcher holds one behind an
/// `Arc` and calls it from every connection.
pub trait Gateway: Send + Sync + 'static {
    /// Runs `query` and returns the provider's JSON body verbatim.
    fn invoke(
        &self,
        query: &ProviderQuery,
    ) -> impl Future<Output = Result<Value, GatewayError>> + Send;
}
