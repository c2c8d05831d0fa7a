//! Tool registry.
//!
//! A [`ToolRegistry`] maps tool names to [`Tool`] values. Each tool carries
//! its description, its JSON input schema and the function that turns
//! validated arguments into a [`ProviderQuery`]. The registry is filled once
//! at startup and only read afterwards, so it is shared between connections
//! without locking.
//!
//! # Modules
//!
//! - [`catalog`] — the Alpha Vantage tool set
//! - [`schema`] — argument validation against a tool's input schema

pub mod catalog;
pub mod schema;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::gateway::ProviderQuery;

pub use schema::ArgumentError;

/// Builds the provider query for one validated call.
pub type QueryBuilder = Box<dyn Fn(&Map<String, Value>) -> ProviderQuery + Send + Sync>;

/// A registered tool.
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    build_query: QueryBuilder,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Tool {
    /// Creates a tool.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        build_query: QueryBuilder,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            build_query,
        }
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// JSON Schema of the tool's arguments.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Validates `arguments` against the input schema.
    ///
    /// A missing or `null` argument value is treated as an empty object.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self, arguments: &Value) -> Result<Map<String, Value>, ArgumentError> {
        schema::validate(&self.input_schema, arguments)
    }

    /// Builds the provider query for already-validated arguments.
    #[must_use]
    pub fn query(&self, arguments: &Map<String, Value>) -> ProviderQuery {
        (self.build_query)(arguments)
    }

    /// Returns the `tools/list` entry for this tool.
    #[must_use]
    pub fn definition(&self) -> ToolDefinition<'_> {
        ToolDefinition {
            name: &self.name,
            description: &self.description,
            input_schema: &self.input_schema,
        }
    }
}

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition<'a> {
    /// Unique tool name.
    pub name: &'a str,
    /// Human-readable description.
    pub description: &'a str,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: &'a Value,
}

/// Errors raised while populating a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("duplicate tool name: {name}")]
    Duplicate {
        /// The clashing name.
        name: String,
    },

    /// The tool is missing a name, description or object schema.
    #[error("invalid tool definition '{name}': {message}")]
    Invalid {
        /// Tool name (may be empty).
        name: String,
        /// Description of what's wrong.
        message: String,
    },
}

/// Name-indexed, registration-ordered set of tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Tool>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the Alpha Vantage tool set.
    #[must_use]
    pub fn alphavantage() -> Self {
        let mut registry = Self::new();
        for tool in catalog::tools() {
            // Catalog names are unique and fully described
            if let Err(e) = registry.register(tool) {
                tracing::error!(error = %e, "Skipping catalog tool");
            }
        }
        registry
    }

    /// Adds a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken, or if the name, description or
    /// schema is empty.
    pub fn register(&mut self, tool: Tool) -> Result<(), RegistryError> {
        let invalid = |message: &str| RegistryError::Invalid {
            name: tool.name.clone(),
            message: message.to_string(),
        };

        if tool.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if tool.description.trim().is_empty() {
            return Err(invalid("description is empty"));
        }
        if !tool.input_schema.is_object() {
            return Err(invalid("input schema must be a JSON object"));
        }
        if self.tools.contains_key(&tool.name) {
            return Err(RegistryError::Duplicate { name: tool.name });
        }

        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Iterates tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    /// Returns the `tools/list` entries in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition<'_>> {
        self.iter().map(Tool::definition).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &str) -> Tool {
        Tool::new(
            name,
            "Echo tool",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
            catalog::provider_function(name, "ECHO"),
        )
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(echo_tool(name)).unwrap();
        }

        let names: Vec<&str> = registry.iter().map(Tool::name).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn reject_duplicate_names() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("same")).unwrap();
        assert_eq!(
            registry.register(echo_tool("same")),
            Err(RegistryError::Duplicate {
                name: "same".to_string()
            })
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reject_empty_description() {
        let mut registry = ToolRegistry::new();
        let tool = Tool::new(
            "blank",
            "  ",
            json!({"type": "object"}),
            catalog::provider_function("blank", "X"),
        );
        assert!(matches!(
            registry.register(tool),
            Err(RegistryError::Invalid { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn reject_non_object_schema() {
        let mut registry = ToolRegistry::new();
        let tool = Tool::new("bad", "Bad", json!("string"), catalog::provider_function("bad", "X"));
        assert!(registry.register(tool).is_err());
    }

    #[test]
    fn definition_serialises_camel_case() {
        let tool = echo_tool("echo");
        let value = serde_json::to_value(tool.definition()).unwrap();
        assert_eq!(value["name"], "echo");
        assert_eq!(value["description"], "Echo tool");
        assert!(value["inputSchema"].is_object());
    }

    #[test]
    fn alphavantage_registry_is_complete() {
        let registry = ToolRegistry::alphavantage();
        assert_eq!(registry.len(), catalog::tools().len());
        assert!(registry.get("stock_quote").is_some());
        assert!(registry.get("time_series_daily").is_some());
        assert!(registry.get("no_such_tool").is_none());
    }
}
