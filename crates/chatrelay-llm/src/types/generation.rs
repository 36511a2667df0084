use serde::{Deserialize, Serialize};

use super::message::{ChatMessage, FunctionCall, Role, ToolCall};
use super::usage::TokenUsage;

/// One fully merged candidate completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Candidate index within the call
    pub completion_index: u32,
    /// Prompt index the completion answers
    pub prompt_index: u32,
    /// Author role
    pub role: String,
    /// Concatenated content fragments
    pub text: String,
    /// Last finish reason reported for this index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Merged log probabilities, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
    /// Completed legacy function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// Completed tool calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Generation {
    /// The completion as an assistant message, e.g. to continue the conversation
    pub fn to_message(&self) -> ChatMessage {
        let mut message = ChatMessage::new(Role::Assistant, self.text.clone());
        message.function_call.clone_from(&self.function_call);
        if !self.tool_calls.is_empty() {
            message.tool_calls = Some(self.tool_calls.clone());
        }
        message
    }
}

/// Aggregate result of a non-streaming-shaped call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Candidates ordered by completion index
    pub generations: Vec<Generation>,
    /// Reported or estimated usage
    pub usage: TokenUsage,
}

impl GenerationResult {
    /// Text of the first candidate, empty if the backend produced none
    pub fn text(&self) -> &str {
        self.generations.first().map_or("", |g| g.text.as_str())
    }
}
