//! Conversion between caller-facing types and the wire format

use crate::protocol::openai::{
    OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiStreamFunctionCall, OpenAiStreamToolCall, OpenAiTool,
    OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    ChatMessage, FunctionCall, FunctionCallDelta, FunctionDefinition, Role, TokenUsage, ToolCall, ToolCallDelta,
    ToolDefinition,
};

// -- Outbound: caller types -> wire --

impl From<&ChatMessage> for OpenAiMessage {
    fn from(msg: &ChatMessage) -> Self {
        let calls_something = msg.function_call.is_some() || msg.tool_calls.is_some();
        let content = if msg.role == Role::Assistant && calls_something && msg.content.is_empty() {
            None
        } else {
            Some(msg.content.clone())
        };

        Self {
            role: msg.role.as_str().to_owned(),
            content,
            name: msg.name.clone(),
            function_call: msg.function_call.as_ref().map(Into::into),
            tool_calls: msg
                .tool_calls
                .as_ref()
                .map(|calls| calls.iter().map(Into::into).collect()),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&FunctionCall> for OpenAiFunctionCall {
    fn from(call: &FunctionCall) -> Self {
        Self {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }
    }
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            tool_type: "function".to_owned(),
            function: (&call.function).into(),
        }
    }
}

impl From<&ToolDefinition> for OpenAiTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: tool.tool_type.clone(),
            function: (&tool.function).into(),
        }
    }
}

impl From<&FunctionDefinition> for OpenAiFunction {
    fn from(function: &FunctionDefinition) -> Self {
        Self {
            name: function.name.clone(),
            description: function.description.clone(),
            parameters: function.parameters.clone(),
        }
    }
}

// -- Inbound: wire -> caller types --

impl From<OpenAiUsage> for TokenUsage {
    fn from(usage: OpenAiUsage) -> Self {
        Self::reported(usage.prompt_tokens, usage.completion_tokens, usage.total_tokens)
    }
}

impl From<OpenAiStreamFunctionCall> for FunctionCallDelta {
    fn from(call: OpenAiStreamFunctionCall) -> Self {
        Self {
            name: call.name,
            arguments: call.arguments,
        }
    }
}

impl From<OpenAiStreamToolCall> for ToolCallDelta {
    fn from(call: OpenAiStreamToolCall) -> Self {
        Self {
            index: call.index,
            id: call.id,
            function: call.function.map(Into::into),
        }
    }
}

impl From<OpenAiFunctionCall> for FunctionCallDelta {
    fn from(call: OpenAiFunctionCall) -> Self {
        Self {
            name: Some(call.name),
            arguments: Some(call.arguments),
        }
    }
}

/// Express complete tool calls as deltas so both dialects share one chunk shape
pub fn tool_calls_to_deltas(calls: Vec<OpenAiToolCall>) -> Vec<ToolCallDelta> {
    (0u32..)
        .zip(calls)
        .map(|(index, call)| ToolCallDelta {
            index,
            id: Some(call.id),
            function: Some(call.function.into()),
        })
        .collect()
}
