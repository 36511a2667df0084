use std::time::Duration;

use chatrelay_config::{ChunkPacingConfig, SplitMode};
use serde_json::Value;

use super::{DEFAULT_ROLE, NormalizedEvent};
use crate::convert::tool_calls_to_deltas;
use crate::detect::in_band_error;
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiChoice, OpenAiResponse};
use crate::types::{GenerationChunk, TokenUsage};

/// How whole messages are replayed as a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPacing {
    /// Pause between consecutive chunks; zero disables pacing
    pub delay: Duration,
    /// Fragment granularity
    pub split: SplitMode,
}

impl ChunkPacing {
    pub const fn new(delay: Duration, split: SplitMode) -> Self {
        Self { delay, split }
    }

    /// Whitespace fragments with no pause
    pub const fn immediate() -> Self {
        Self::new(Duration::ZERO, SplitMode::Whitespace)
    }
}

impl Default for ChunkPacing {
    fn default() -> Self {
        Self::from(&ChunkPacingConfig::default())
    }
}

impl From<&ChunkPacingConfig> for ChunkPacing {
    fn from(config: &ChunkPacingConfig) -> Self {
        Self::new(config.delay, config.split)
    }
}

/// Split text on single spaces, restoring the space on every fragment after
/// the first, so the fragments concatenate to exactly `content`
///
/// A leading empty fragment (content starting with a space) is dropped
/// unless it is the only one.
pub fn split_fragments(content: &str) -> Vec<String> {
    let mut fragments: Vec<String> = content
        .split(' ')
        .enumerate()
        .map(|(i, part)| if i == 0 { part.to_owned() } else { format!(" {part}") })
        .collect();

    if fragments.len() > 1 && fragments[0].is_empty() {
        fragments.remove(0);
    }
    fragments
}

/// Decode a complete-message body
///
/// # Errors
///
/// Returns `LlmError::Upstream` for in-band error payloads and bodies that
/// are not a chat completion.
pub fn decode_response(body: Value) -> Result<OpenAiResponse, LlmError> {
    if let Some(message) = in_band_error(&body) {
        return Err(LlmError::Upstream(message));
    }
    serde_json::from_value(body).map_err(|e| LlmError::Upstream(format!("response is not a chat completion: {e}")))
}

/// Normalizer for responses that carry whole messages
#[derive(Debug, Clone, Copy)]
pub struct CompleteMessageNormalizer {
    prompt_index: u32,
    include_logprobs: bool,
    split: SplitMode,
}

impl CompleteMessageNormalizer {
    pub const fn new(prompt_index: u32, include_logprobs: bool, split: SplitMode) -> Self {
        Self {
            prompt_index,
            include_logprobs,
            split,
        }
    }

    /// Expand every choice into fragment chunks; the last chunk of a choice
    /// carries its finish reason (default `"stop"`) and any function or
    /// tool calls
    pub fn normalize(&self, response: OpenAiResponse) -> NormalizedEvent {
        NormalizedEvent {
            chunks: response
                .choices
                .into_iter()
                .flat_map(|choice| self.normalize_choice(choice))
                .collect(),
            usage: response.usage.map(TokenUsage::from),
        }
    }

    fn normalize_choice(&self, choice: OpenAiChoice) -> Vec<GenerationChunk> {
        let message = choice.message;
        let role = message.role.unwrap_or_else(|| DEFAULT_ROLE.to_owned());
        let content = message.content.unwrap_or_default();

        let fragments = match self.split {
            SplitMode::Whitespace => split_fragments(&content),
            SplitMode::Whole => vec![content],
        };

        let mut chunks: Vec<GenerationChunk> = fragments
            .into_iter()
            .map(|fragment| GenerationChunk {
                prompt_index: self.prompt_index,
                ..GenerationChunk::text(fragment, role.clone(), choice.index)
            })
            .collect();

        if let Some(last) = chunks.last_mut() {
            last.finish_reason = Some(choice.finish_reason.unwrap_or_else(|| "stop".to_owned()));
            last.logprobs = choice.logprobs.filter(|_| self.include_logprobs);
            last.function_call = message.function_call.map(Into::into);
            last.tool_calls = message.tool_calls.map(tool_calls_to_deltas);
        }
        chunks
    }
}
