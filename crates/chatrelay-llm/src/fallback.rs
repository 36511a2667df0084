//! One-shot non-streaming recovery after a stream dies
//!
//! When a stream is interrupted the same request is sent once more with
//! streaming turned off. The returned message is replayed through the
//! complete-message normalizer, so callers see the same chunk contract.

use std::collections::BTreeMap;

use crate::accumulate::{merge_function_call, merge_tool_call};
use crate::error::LlmError;
use crate::normalize::decode_response;
use crate::params::RequestParams;
use crate::protocol::openai::{OpenAiChoice, OpenAiFunctionCall, OpenAiResponse};
use crate::transport::Transport;
use crate::types::{ChatMessage, FunctionCall, GenerationChunk, ToolCall};

/// Output already handed to the caller, per completion index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmittedOutput {
    by_index: BTreeMap<u32, EmittedCompletion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct EmittedCompletion {
    text: String,
    function_call: Option<FunctionCall>,
    tool_calls: BTreeMap<u32, ToolCall>,
    finished: bool,
}

impl EmittedOutput {
    pub fn record(&mut self, chunk: &GenerationChunk) {
        let completion = self.by_index.entry(chunk.completion_index).or_default();

        completion.text.push_str(&chunk.content_fragment);
        if let Some(delta) = chunk.function_call.clone() {
            merge_function_call(&mut completion.function_call, delta);
        }
        for delta in chunk.tool_calls.iter().flatten().cloned() {
            merge_tool_call(&mut completion.tool_calls, delta);
        }
        if chunk.is_terminal() {
            completion.finished = true;
        }
    }

    /// Whether `index` already received its finish reason
    pub fn is_finished(&self, index: u32) -> bool {
        self.by_index.get(&index).is_some_and(|c| c.finished)
    }

    /// Whether nothing beyond empty fragments was emitted
    pub fn is_empty(&self) -> bool {
        self.by_index
            .values()
            .all(|c| c.text.is_empty() && c.function_call.is_none() && c.tool_calls.is_empty())
    }
}

/// Issue the non-streaming retry for an interrupted stream
///
/// Returns a response holding only what was not emitted yet.
///
/// # Errors
///
/// Any failure of the retry, including a response that cannot be
/// reconciled with the emitted output, is returned as
/// `LlmError::FallbackFailed` wrapping both causes.
pub async fn recover(
    transport: &dyn Transport,
    params: &RequestParams,
    messages: &[ChatMessage],
    original: LlmError,
    emitted: &EmittedOutput,
) -> Result<OpenAiResponse, LlmError> {
    tracing::warn!(
        model = %params.model,
        error = %original,
        resumed = !emitted.is_empty(),
        "stream interrupted, retrying without streaming"
    );

    let body = params.non_streaming().to_body(messages);
    let attempt = async {
        let value = transport.complete(&body).await?;
        let response = decode_response(value)?;
        reconcile(response, emitted)
    };

    attempt.await.map_err(|fallback| {
        tracing::error!(error = %fallback, "non-streaming fallback failed");
        LlmError::FallbackFailed {
            original: Box::new(original),
            fallback: Box::new(fallback),
        }
    })
}

/// Strip already-emitted output from each choice
///
/// Choices whose index already finished are dropped. For the others the
/// emitted text, function call and tool call fragments are removed, so only
/// the remainder is replayed.
///
/// # Errors
///
/// Returns `LlmError::Upstream` when a choice does not extend what was
/// emitted for its index, since the streamed output cannot be retracted.
pub fn reconcile(mut response: OpenAiResponse, emitted: &EmittedOutput) -> Result<OpenAiResponse, LlmError> {
    response.choices.retain(|choice| !emitted.is_finished(choice.index));

    for choice in &mut response.choices {
        if let Some(completion) = emitted.by_index.get(&choice.index) {
            strip_completion(choice, completion)?;
        }
    }
    Ok(response)
}

fn strip_completion(choice: &mut OpenAiChoice, emitted: &EmittedCompletion) -> Result<(), LlmError> {
    let index = choice.index;
    let message = &mut choice.message;

    if !emitted.text.is_empty() {
        let content = message.content.take().unwrap_or_default();
        message.content = Some(remainder(&content, &emitted.text, index, "content")?.to_owned());
    }

    if let Some(sent) = &emitted.function_call {
        let call = message
            .function_call
            .as_mut()
            .ok_or_else(|| diverged(index, "function call"))?;
        strip_call(call, sent, index)?;
    }

    if !emitted.tool_calls.is_empty() {
        let calls = message.tool_calls.as_mut().ok_or_else(|| diverged(index, "tool calls"))?;
        for (position, sent) in &emitted.tool_calls {
            let call = usize::try_from(*position)
                .ok()
                .and_then(|position| calls.get_mut(position))
                .ok_or_else(|| diverged(index, "tool calls"))?;
            if !sent.id.is_empty() {
                call.id.clone_from(&sent.id);
            }
            strip_call(&mut call.function, &sent.function, index)?;
        }
    }
    Ok(())
}

fn strip_call(call: &mut OpenAiFunctionCall, sent: &FunctionCall, index: u32) -> Result<(), LlmError> {
    call.name = remainder(&call.name, &sent.name, index, "function name")?.to_owned();
    call.arguments = remainder(&call.arguments, &sent.arguments, index, "function arguments")?.to_owned();
    Ok(())
}

fn remainder<'a>(full: &'a str, emitted: &str, index: u32, part: &str) -> Result<&'a str, LlmError> {
    full.strip_prefix(emitted).ok_or_else(|| diverged(index, part))
}

fn diverged(index: u32, part: &str) -> LlmError {
    LlmError::Upstream(format!(
        "fallback {part} for completion {index} diverges from streamed output"
    ))
}
