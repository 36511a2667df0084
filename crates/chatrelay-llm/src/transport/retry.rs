use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{FrameStream, Transport};
use crate::error::LlmError;
use crate::protocol::openai::ChatCompletionBody;

/// Retries rate-limited, transient and timed-out requests with exponential backoff
///
/// Only the request itself is retried. Once a stream has been handed out,
/// failures while reading it surface to the caller unchanged.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    max_retries: u32,
    backoff: Duration,
}

impl<T: Transport> RetryingTransport<T> {
    pub const fn new(inner: T, max_retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff,
        }
    }

    pub const fn inner(&self) -> &T {
        &self.inner
    }

    async fn with_retries<R, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<R, LlmError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<R, LlmError>> + Send,
        R: Send,
    {
        let mut delay = self.backoff;
        let mut attempt = 0;

        loop {
            match call().await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let wait = retry_delay(&err, delay);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying upstream request"
                    );
                    tokio::time::sleep(wait).await;
                    delay = delay.saturating_mul(2);
                }
                result => return result,
            }
        }
    }
}

/// Honor `Retry-After` when the backend sent one
fn retry_delay(err: &LlmError, backoff: Duration) -> Duration {
    match err {
        LlmError::RateLimited {
            retry_after: Some(secs),
        } => Duration::from_secs(*secs),
        _ => backoff,
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn complete(&self, body: &ChatCompletionBody) -> Result<serde_json::Value, LlmError> {
        self.with_retries("complete", || self.inner.complete(body)).await
    }

    async fn stream(&self, body: &ChatCompletionBody) -> Result<FrameStream, LlmError> {
        self.with_retries("stream", || self.inner.stream(body)).await
    }
}
