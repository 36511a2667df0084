use serde::{Deserialize, Serialize};

/// Definition of a tool the model can call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool type, always `"function"` today
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function specification
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    /// Wrap a function definition as a tool
    pub fn function(function: FunctionDefinition) -> Self {
        Self {
            tool_type: "function".to_owned(),
            function,
        }
    }
}

/// Specification of a callable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// How the model should select tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// `"none"`, `"auto"` or `"required"`
    Mode(ToolChoiceMode),
    /// Force the named function
    Function(String),
}

/// Tool selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoiceMode {
    None,
    Auto,
    Required,
}

impl ToolChoice {
    /// Value of the wire `tool_choice` field
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Mode(ToolChoiceMode::None) => "none".into(),
            Self::Mode(ToolChoiceMode::Auto) => "auto".into(),
            Self::Mode(ToolChoiceMode::Required) => "required".into(),
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

/// Response format hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free text
    Text,
    /// A single JSON object
    JsonObject,
}

impl ResponseFormat {
    /// Parse a configuration value (`"text"` / `"json_object"`)
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "json_object" | "json" => Some(Self::JsonObject),
            _ => None,
        }
    }

    /// Wire name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::JsonObject => "json_object",
        }
    }
}
