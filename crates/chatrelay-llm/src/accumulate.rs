use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::{FunctionCall, FunctionCallDelta, Generation, GenerationChunk, ToolCall, ToolCallDelta};

/// Merges chunks into one [`Generation`] per completion index
///
/// Chunks of an index are merged in the order they are pushed.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    generations: BTreeMap<u32, PartialGeneration>,
}

#[derive(Debug, Clone, Default)]
struct PartialGeneration {
    prompt_index: u32,
    role: String,
    text: String,
    finish_reason: Option<String>,
    logprobs: Option<Value>,
    function_call: Option<FunctionCall>,
    tool_calls: BTreeMap<u32, ToolCall>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: GenerationChunk) {
        let entry = self.generations.entry(chunk.completion_index).or_default();

        entry.prompt_index = chunk.prompt_index;
        if entry.role.is_empty() || !chunk.role.is_empty() {
            entry.role = chunk.role;
        }
        entry.text.push_str(&chunk.content_fragment);
        if let Some(reason) = chunk.finish_reason.filter(|r| !r.is_empty()) {
            entry.finish_reason = Some(reason);
        }
        if let Some(logprobs) = chunk.logprobs {
            merge_logprobs(&mut entry.logprobs, logprobs);
        }
        if let Some(delta) = chunk.function_call {
            merge_function_call(&mut entry.function_call, delta);
        }
        for delta in chunk.tool_calls.into_iter().flatten() {
            merge_tool_call(&mut entry.tool_calls, delta);
        }
    }

    /// Merged generations ordered by completion index
    pub fn finish(self) -> Vec<Generation> {
        self.generations
            .into_iter()
            .map(|(completion_index, partial)| Generation {
                completion_index,
                prompt_index: partial.prompt_index,
                role: partial.role,
                text: partial.text,
                finish_reason: partial.finish_reason,
                logprobs: partial.logprobs,
                function_call: partial.function_call,
                tool_calls: partial.tool_calls.into_values().collect(),
            })
            .collect()
    }
}

/// Append a legacy function call fragment
pub(crate) fn merge_function_call(call: &mut Option<FunctionCall>, delta: FunctionCallDelta) {
    let call = call.get_or_insert_with(|| FunctionCall {
        name: String::new(),
        arguments: String::new(),
    });
    if let Some(name) = delta.name {
        call.name.push_str(&name);
    }
    if let Some(arguments) = delta.arguments {
        call.arguments.push_str(&arguments);
    }
}

/// Append a tool call fragment to the call with the same index
pub(crate) fn merge_tool_call(calls: &mut BTreeMap<u32, ToolCall>, delta: ToolCallDelta) {
    let call = calls.entry(delta.index).or_insert_with(|| ToolCall {
        id: String::new(),
        function: FunctionCall {
            name: String::new(),
            arguments: String::new(),
        },
    });

    if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
        call.id = id;
    }
    if let Some(function) = delta.function {
        if let Some(name) = function.name {
            call.function.name.push_str(&name);
        }
        if let Some(arguments) = function.arguments {
            call.function.arguments.push_str(&arguments);
        }
    }
}

/// Concatenate `content` token arrays; anything else replaces what was there
fn merge_logprobs(current: &mut Option<Value>, incoming: Value) {
    let appended = match (current.as_mut(), &incoming) {
        (Some(existing), Value::Object(new)) => match (existing.get_mut("content"), new.get("content")) {
            (Some(Value::Array(tokens)), Some(Value::Array(more))) => {
                tokens.extend(more.iter().cloned());
                true
            }
            _ => false,
        },
        _ => false,
    };
    if !appended {
        *current = Some(incoming);
    }
}
