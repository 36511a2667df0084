//! Network transport for chat-completions backends

mod client;
mod retry;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

pub use self::client::HttpTransport;
pub use self::retry::RetryingTransport;
use crate::error::LlmError;
use crate::protocol::openai::ChatCompletionBody;

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// JSON payload of a `data:` line
    Event(serde_json::Value),
    /// The `[DONE]` sentinel
    Done,
}

/// Stream of raw events as they arrive from the backend
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, LlmError>> + Send>>;

/// Sends chat-completion requests to a backend
///
/// Implementations only move bytes; interpreting the payload is left to
/// the detection and normalization stages.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a non-streaming request and return the response body
    async fn complete(&self, body: &ChatCompletionBody) -> Result<serde_json::Value, LlmError>;

    /// Send a streaming request and return its events
    async fn stream(&self, body: &ChatCompletionBody) -> Result<FrameStream, LlmError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn complete(&self, body: &ChatCompletionBody) -> Result<serde_json::Value, LlmError> {
        (**self).complete(body).await
    }

    async fn stream(&self, body: &ChatCompletionBody) -> Result<FrameStream, LlmError> {
        (**self).stream(body).await
    }
}
