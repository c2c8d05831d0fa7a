//! Alpha Vantage HTTPS gateway.
//!
//! Issues `GET {base_url}/query?function=...&apikey=...` for each query and
//! hands back the decoded JSON body. There is no retry: a failure is reported
//! once and surfaces to the client as a tool error.

use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::gateway::{Gateway, GatewayError, ProviderQuery};

/// Environment variable consulted when the config carries no API key.
pub const API_KEY_ENV: &str = "ALPHAVANTAGE_API_KEY";

/// Gateway backed by the public Alpha Vantage API.
#[derive(Clone)]
pub struct AlphaVantageGateway {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl fmt::Debug for AlphaVantageGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlphaVantageGateway")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl AlphaVantageGateway {
    /// Builds a gateway from provider settings.
    ///
    /// The API key comes from `config.api_key`, falling back to the
    /// `ALPHAVANTAGE_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is available, the base URL is invalid,
    /// or the HTTP client cannot be constructed.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, GatewayError> {
        let non_blank = |k: &String| !k.trim().is_empty();
        let api_key = config
            .api_key
            .clone()
            .filter(non_blank)
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(non_blank))
            .ok_or(GatewayError::MissingApiKey)?;

        Self::new(
            &config.base_url,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Builds a gateway against `base_url` with an explicit key and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be constructed.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let endpoint = query_endpoint(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("alphavantage-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Request {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// Builds the full request URL for `query`, API key included.
    fn request_url(&self, query: &ProviderQuery) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("function", &query.function);
            for (key, value) in &query.params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("apikey", &self.api_key);
        }
        url
    }
}

/// Resolves `{base_url}/query`, tolerating a trailing slash on the base.
fn query_endpoint(base_url: &str) -> Result<Url, GatewayError> {
    let base = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|u| u.join("query"))
        .map_err(|e| GatewayError::InvalidUrl {
            message: e.to_string(),
        })
}

impl Gateway for AlphaVantageGateway {
    async fn invoke(&self, query: &ProviderQuery) -> Result<Value, GatewayError> {
        tracing::debug!(
            tool = %query.tool,
            function = %query.function,
            "Querying Alpha Vantage"
        );

        let response = self
            .client
            .get(self.request_url(query))
            .send()
            .await
            // without_url keeps the API key out of the message
            .map_err(|e| GatewayError::Request {
                message: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), tool = %query.tool, "Provider returned error status");
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            let is_decode = e.is_decode();
            let message = e.without_url().to_string();
            if is_decode {
                GatewayError::Decode { message }
            } else {
                GatewayError::Request { message }
            }
        })
    }
}
