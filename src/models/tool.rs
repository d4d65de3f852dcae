use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// A json schema describing the tool's input
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A model-issued request to invoke a named tool.
///
/// `arguments` holds whatever the provider sent: a JSON object when the
/// argument payload parsed, or the raw string verbatim when it did not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new ToolCall with the given name and arguments
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_creation() {
        let tool = Tool::new(
            "get_schema",
            "List tables and columns for a connection",
            json!({
                "type": "object",
                "properties": {
                    "connectionId": { "type": "string" }
                },
                "required": ["connectionId"]
            }),
        );

        assert_eq!(tool.name, "get_schema");
        assert_eq!(tool.input_schema["required"][0], "connectionId");
    }

    #[test]
    fn test_tool_call_roundtrip() {
        let call = ToolCall::new("execute_query", json!({"sql": "SELECT 1"}));
        let serialized = serde_json::to_string(&call).unwrap();
        let deserialized: ToolCall = serde_json::from_str(&serialized).unwrap();
        assert_eq!(call, deserialized);
    }
}
