//! Tool contracts and the read-only registry that holds them

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use busram_protocol::Tool;
use serde_json::{json, Map, Value};

use super::error::ToolError;

/// One declared argument
///
/// Every argument on the agent-facing surface is a string. An argument with
/// a default is optional.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub default: Option<&'static str>,
}

impl ArgSpec {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            default: None,
        }
    }

    pub const fn optional(
        name: &'static str,
        description: &'static str,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            default: Some(default),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Arguments after binding against a contract
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    values: HashMap<String, String>,
}

impl ToolArguments {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Value of an argument the contract declares
    pub fn require(&self, name: &str) -> Result<&str, ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{}'", name)))
    }
}

/// Executes one tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError>;
}

/// Immutable descriptor of one tool
#[derive(Clone)]
pub struct ToolContract {
    pub name: &'static str,
    pub description: &'static str,
    pub args: Vec<ArgSpec>,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolContract {
    /// JSON Schema advertised in `tools/list`
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for arg in &self.args {
            let mut prop = json!({
                "type": "string",
                "description": arg.description,
            });
            if let Some(default) = arg.default {
                prop["default"] = json!(default);
            }
            properties.insert(arg.name.to_string(), prop);
        }

        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|a| a.is_required())
            .map(|a| a.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn descriptor(&self) -> Tool {
        Tool {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Check caller-supplied arguments against the declared ones
    ///
    /// Numbers are accepted for string arguments and rendered as text. Blank
    /// strings count as missing. Undeclared arguments are ignored.
    pub fn bind(&self, raw: &Map<String, Value>) -> Result<ToolArguments, ToolError> {
        let mut bound = ToolArguments::default();

        for arg in &self.args {
            let value = match raw.get(arg.name) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.trim().is_empty() => None,
                Some(Value::String(s)) => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(_) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "'{}' must be a string",
                        arg.name
                    )))
                }
            };

            match (value, arg.default) {
                (Some(v), _) => bound.insert(arg.name, v),
                (None, Some(default)) => bound.insert(arg.name, default),
                (None, None) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "'{}' is required for {}",
                        arg.name, self.name
                    )))
                }
            }
        }

        Ok(bound)
    }
}

impl std::fmt::Debug for ToolContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContract")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Name-to-contract map, fixed once built
#[derive(Debug, Default)]
pub struct ToolRegistry {
    contracts: Vec<ToolContract>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ToolContract> {
        self.index.get(name).map(|&i| &self.contracts[i])
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> Vec<Tool> {
        self.contracts.iter().map(ToolContract::descriptor).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.contracts.iter().map(|c| c.name)
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    contracts: Vec<ToolContract>,
}

impl ToolRegistryBuilder {
    /// Add a contract; a later contract with the same name replaces it
    pub fn register(mut self, contract: ToolContract) -> Self {
        self.contracts.retain(|c| c.name != contract.name);
        self.contracts.push(contract);
        self
    }

    pub fn build(self) -> ToolRegistry {
        let index = self
            .contracts
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name, i))
            .collect();
        ToolRegistry {
            contracts: self.contracts,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
            Ok(arguments.require("text")?.to_string())
        }
    }

    fn echo_contract() -> ToolContract {
        ToolContract {
            name: "echo",
            description: "Echo text",
            args: vec![
                ArgSpec::required("text", "Text to echo"),
                ArgSpec::optional("lang", "Language", "en"),
            ],
            handler: Arc::new(Echo),
        }
    }

    #[test]
    fn test_schema_lists_required_and_defaults() {
        let schema = echo_contract().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["text"]));
        assert_eq!(schema["properties"]["lang"]["default"], "en");
        assert!(schema["properties"]["text"].get("default").is_none());
    }

    #[test]
    fn test_bind_fills_defaults_and_stringifies_numbers() {
        let raw = json!({"text": 42, "extra": true});
        let bound = echo_contract().bind(raw.as_object().unwrap()).unwrap();
        assert_eq!(bound.get("text"), Some("42"));
        assert_eq!(bound.get("lang"), Some("en"));
        assert_eq!(bound.get("extra"), None);
    }

    #[test]
    fn test_bind_rejects_missing_and_blank() {
        let contract = echo_contract();
        assert!(contract.bind(&Map::new()).is_err());

        let raw = json!({"text": "   "});
        let err = contract.bind(raw.as_object().unwrap()).unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }

    #[test]
    fn test_bind_rejects_non_scalar() {
        let raw = json!({"text": ["a"]});
        assert!(echo_contract().bind(raw.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_registry_lookup_and_order() {
        let registry = ToolRegistry::builder()
            .register(echo_contract())
            .register(ToolContract {
                name: "other",
                ..echo_contract()
            })
            .build();

        assert!(registry.get("echo").is_some());
        assert!(registry.get("delete_everything").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["echo", "other"]);
    }

    #[tokio::test]
    async fn test_handler_runs_with_bound_arguments() {
        let contract = echo_contract();
        let raw = json!({"text": "hi"});
        let bound = contract.bind(raw.as_object().unwrap()).unwrap();
        assert_eq!(contract.handler.call(bound).await.unwrap(), "hi");
    }
}
