use serde::{Deserialize, Serialize};

/// Normalized unit of streamed output
///
/// Both response dialects are reduced to a sequence of these. Chunks that
/// share a `completion_index` arrive in generation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationChunk {
    /// Text fragment; may be empty for role-only or tool-call-only events
    pub content_fragment: String,
    /// Author role, carried forward from the first event of the completion
    pub role: String,
    /// Candidate completion this chunk belongs to (`n > 1`)
    pub completion_index: u32,
    /// Prompt this chunk answers when several prompts share one call
    pub prompt_index: u32,
    /// Set on the terminal chunk of a completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Token log probabilities, only when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
    /// Partial legacy function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDelta>,
    /// Partial tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

impl GenerationChunk {
    /// Text chunk with no metadata
    pub fn text(content_fragment: impl Into<String>, role: impl Into<String>, completion_index: u32) -> Self {
        Self {
            content_fragment: content_fragment.into(),
            role: role.into(),
            completion_index,
            prompt_index: 0,
            finish_reason: None,
            logprobs: None,
            function_call: None,
            tool_calls: None,
        }
    }

    /// Whether this chunk closes its completion
    pub const fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Partial tool call data within a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position in the completion's `tool_calls` array
    pub index: u32,
    /// Tool call ID (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Partial function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionCallDelta>,
}

/// Partial function call data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    /// Function name (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental arguments fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
