//! Alpha Vantage tool catalog.
//!
//! Each tool maps onto one Alpha Vantage `function`. Argument names match the
//! provider's query parameter names, so arguments are forwarded as-is.

use serde_json::{json, Map, Value};

use crate::gateway::ProviderQuery;
use crate::tools::{QueryBuilder, Tool};

/// Returns a query builder that forwards every argument to `function`.
///
/// Strings are passed unchanged; numbers and booleans use their JSON text.
#[must_use]
pub fn provider_function(tool: &str, function: &str) -> QueryBuilder {
    let tool = tool.to_string();
    let function = function.to_string();
    Box::new(move |arguments: &Map<String, Value>| ProviderQuery {
        tool: tool.clone(),
        function: function.clone(),
        params: arguments
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
    })
}

fn symbol_property() -> Value {
    json!({
        "type": "string",
        "description": "Ticker symbol, e.g. 'IBM', 'AAPL' or 'TSCO.LON'"
    })
}

fn outputsize_property() -> Value {
    json!({
        "type": "string",
        "enum": ["compact", "full"],
        "description": "'compact' returns the latest 100 data points, 'full' the full history (default: compact)"
    })
}

/// Schema for tools that take only a symbol.
fn symbol_only_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": symbol_property()
        },
        "required": ["symbol"],
        "additionalProperties": false
    })
}

/// Schema for daily series with optional output size.
fn daily_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "symbol": symbol_property(),
            "outputsize": outputsize_property()
        },
        "required": ["symbol"],
        "additionalProperties": false
    })
}

fn tool(name: &str, function: &str, description: &str, schema: Value) -> Tool {
    Tool::new(name, description, schema, provider_function(name, function))
}

/// Returns the full tool set in the order `tools/list` reports it.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn tools() -> Vec<Tool> {
    vec![
        tool(
            "stock_quote",
            "GLOBAL_QUOTE",
            "Fetch the latest price and volume information for a ticker: open, high, low, \
             price, volume, latest trading day, previous close, change and change percent.",
            symbol_only_schema(),
        ),
        tool(
            "time_series_intraday",
            "TIME_SERIES_INTRADAY",
            "Fetch intraday OHLCV time series for a ticker at the given interval. \
             Covers extended trading hours where applicable.",
            json!({
                "type": "object",
                "properties": {
                    "symbol": symbol_property(),
                    "interval": {
                        "type": "string",
                        "enum": ["1min", "5min", "15min", "30min", "60min"],
                        "description": "Time interval between two consecutive data points"
                    },
                    "adjusted": {
                        "type": "boolean",
                        "description": "Adjust output for splits and dividends (default: true)"
                    },
                    "extended_hours": {
                        "type": "boolean",
                        "description": "Include pre-market and post-market hours (default: true)"
                    },
                    "month": {
                        "type": "string",
                        "description": "Query a specific month in history, formatted YYYY-MM"
                    },
                    "outputsize": outputsize_property()
                },
                "required": ["symbol", "interval"],
                "additionalProperties": false
            }),
        ),
        tool(
            "time_series_daily",
            "TIME_SERIES_DAILY",
            "Fetch raw (as-traded) daily OHLCV time series for a ticker.",
            daily_schema(),
        ),
        tool(
            "time_series_daily_adjusted",
            "TIME_SERIES_DAILY_ADJUSTED",
            "Fetch daily OHLCV time series for a ticker with adjusted close, \
             split and dividend events.",
            daily_schema(),
        ),
        tool(
            "time_series_weekly",
            "TIME_SERIES_WEEKLY",
            "Fetch weekly time series (last trading day of each week) for a ticker, \
             covering 20+ years of history.",
            symbol_only_schema(),
        ),
        tool(
            "time_series_monthly",
            "TIME_SERIES_MONTHLY",
            "Fetch monthly time series (last trading day of each month) for a ticker, \
             covering 20+ years of history.",
            symbol_only_schema(),
        ),
        tool(
            "symbol_search",
            "SYMBOL_SEARCH",
            "Search for ticker symbols and market information matching the given keywords.",
            json!({
                "type": "object",
                "properties": {
                    "keywords": {
                        "type": "string",
                        "description": "Text to search for, e.g. 'microsoft' or 'tesco'"
                    }
                },
                "required": ["keywords"],
                "additionalProperties": false
            }),
        ),
        tool(
            "company_overview",
            "OVERVIEW",
            "Fetch company information, financial ratios and other key metrics for an equity.",
            symbol_only_schema(),
        ),
        tool(
            "exchange_rate",
            "CURRENCY_EXCHANGE_RATE",
            "Fetch the realtime exchange rate for a pair of physical or digital currencies.",
            json!({
                "type": "object",
                "properties": {
                    "from_currency": {
                        "type": "string",
                        "description": "Currency to convert from, e.g. 'USD' or 'BTC'"
                    },
                    "to_currency": {
                        "type": "string",
                        "description": "Currency to convert to, e.g. 'JPY' or 'EUR'"
                    }
                },
                "required": ["from_currency", "to_currency"],
                "additionalProperties": false
            }),
        ),
        tool(
            "market_status",
            "MARKET_STATUS",
            "Fetch the current open/closed status of major equity, forex and crypto \
             trading venues worldwide.",
            json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        ),
    ]
}
