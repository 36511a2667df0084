use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::{DEFAULT_ROLE, NormalizedEvent};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiStreamChoice, OpenAiStreamChunk};
use crate::types::{GenerationChunk, TokenUsage};

/// Normalizer for the incremental `delta` dialect
///
/// Stateful across the events of one response: a role sent on the first
/// event of a completion applies to every later event of that index.
#[derive(Debug, Clone, Default)]
pub struct DeltaNormalizer {
    prompt_index: u32,
    include_logprobs: bool,
    roles: BTreeMap<u32, String>,
    emitting: BTreeSet<u32>,
    finished: BTreeSet<u32>,
}

impl DeltaNormalizer {
    pub fn new(prompt_index: u32, include_logprobs: bool) -> Self {
        Self {
            prompt_index,
            include_logprobs,
            ..Self::default()
        }
    }

    /// Normalize one event, yielding at most one chunk per choice
    ///
    /// Events that do not decode, and choices whose content is not a plain
    /// string, are logged and skipped.
    pub fn normalize(&mut self, event: Value) -> NormalizedEvent {
        let chunk: OpenAiStreamChunk = match serde_json::from_value(event) {
            Ok(chunk) => chunk,
            Err(e) => {
                let err = LlmError::MalformedEvent(e.to_string());
                tracing::warn!(error = %err, "skipping delta event");
                return NormalizedEvent::default();
            }
        };

        NormalizedEvent {
            chunks: chunk
                .choices
                .into_iter()
                .filter_map(|choice| self.normalize_choice(choice))
                .collect(),
            usage: chunk.usage.map(TokenUsage::from),
        }
    }

    fn normalize_choice(&mut self, choice: OpenAiStreamChoice) -> Option<GenerationChunk> {
        let index = choice.index;
        let delta = choice.delta;

        let content_fragment = match delta.content {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text,
            Some(other) => {
                let err = LlmError::MalformedEvent(format!("delta content is not a string: {other}"));
                tracing::warn!(index, error = %err, "skipping delta event");
                return None;
            }
        };

        let role = match delta.role {
            Some(role) => {
                self.roles.insert(index, role.clone());
                role
            }
            None => self
                .roles
                .get(&index)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ROLE.to_owned()),
        };

        self.emitting.insert(index);
        if choice.finish_reason.is_some() {
            self.finished.insert(index);
        }

        Some(GenerationChunk {
            content_fragment,
            role,
            completion_index: index,
            prompt_index: self.prompt_index,
            finish_reason: choice.finish_reason,
            logprobs: choice.logprobs.filter(|_| self.include_logprobs),
            function_call: delta.function_call.map(Into::into),
            tool_calls: delta
                .tool_calls
                .map(|calls| calls.into_iter().map(Into::into).collect()),
        })
    }

    /// Indices that emitted output but never received a finish reason
    pub fn unfinished(&self) -> Vec<u32> {
        self.emitting.difference(&self.finished).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn concat(chunks: &[GenerationChunk]) -> String {
        chunks.iter().map(|c| c.content_fragment.as_str()).collect()
    }

    #[test]
    fn hello_world_scenario() {
        let mut normalizer = DeltaNormalizer::new(0, false);
        let events = [
            json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hel"}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": "lo"}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": " world"}, "finish_reason": "stop"}]}),
        ];

        let chunks: Vec<_> = events
            .into_iter()
            .flat_map(|e| normalizer.normalize(e).chunks)
            .collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(concat(&chunks), "Hello world");
        assert_eq!(chunks[2].finish_reason.as_deref(), Some("stop"));
        assert!(chunks[..2].iter().all(|c| c.finish_reason.is_none()));
        assert!(chunks.iter().all(|c| c.role == "assistant"));
        assert!(normalizer.unfinished().is_empty());
    }

    #[test]
    fn role_carries_forward_per_index() {
        let mut normalizer = DeltaNormalizer::new(2, false);
        normalizer.normalize(json!({"choices": [{"index": 1, "delta": {"role": "tool", "content": ""}}]}));

        let chunks = normalizer
            .normalize(json!({"choices": [
                {"index": 0, "delta": {"content": "a"}},
                {"index": 1, "delta": {"content": "b"}}
            ]}))
            .chunks;

        assert_eq!(chunks[0].role, "assistant");
        assert_eq!(chunks[1].role, "tool");
        assert_eq!(chunks[1].completion_index, 1);
        assert!(chunks.iter().all(|c| c.prompt_index == 2));
    }

    #[test]
    fn non_string_content_is_skipped() {
        let mut normalizer = DeltaNormalizer::new(0, false);
        let out = normalizer.normalize(json!({"choices": [{"index": 0, "delta": {"content": [{"type": "image"}]}}]}));
        assert!(out.chunks.is_empty());

        let out = normalizer.normalize(json!({"choices": [{"index": 0, "delta": {"content": "ok"}}]}));
        assert_eq!(concat(&out.chunks), "ok");
    }

    #[test]
    fn undecodable_event_is_skipped() {
        let mut normalizer = DeltaNormalizer::new(0, false);
        let out = normalizer.normalize(json!({"choices": "nope"}));
        assert_eq!(out, NormalizedEvent::default());
    }

    #[test]
    fn logprobs_only_when_requested() {
        let event = json!({"choices": [{"index": 0, "delta": {"content": "x"}, "logprobs": {"content": [{"token": "x", "logprob": -0.1}]}}]});

        let without = DeltaNormalizer::new(0, false).normalize(event.clone());
        assert!(without.chunks[0].logprobs.is_none());

        let with = DeltaNormalizer::new(0, true).normalize(event);
        assert_eq!(with.chunks[0].logprobs.as_ref().unwrap()["content"][0]["token"], "x");
    }

    #[test]
    fn tool_call_deltas_pass_through() {
        let mut normalizer = DeltaNormalizer::new(0, false);
        let chunks = normalizer
            .normalize(json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": "{\"ci"}}
            ]}}]}))
            .chunks;

        let calls = chunks[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].function.as_ref().unwrap().arguments.as_deref(), Some("{\"ci"));
        assert_eq!(chunks[0].content_fragment, "");
    }

    #[test]
    fn trailing_usage_is_reported() {
        let mut normalizer = DeltaNormalizer::new(0, false);
        let out = normalizer.normalize(json!({"choices": [], "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}}));

        assert!(out.chunks.is_empty());
        assert_eq!(out.usage, Some(TokenUsage::reported(9, 3, 12)));
    }

    #[test]
    fn unfinished_tracks_open_indices() {
        let mut normalizer = DeltaNormalizer::new(0, false);
        normalizer.normalize(json!({"choices": [
            {"index": 0, "delta": {"content": "a"}, "finish_reason": "stop"},
            {"index": 1, "delta": {"content": "b"}}
        ]}));
        assert_eq!(normalizer.unfinished(), vec![1]);
    }
}
