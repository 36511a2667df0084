//! HTTP transport for OpenAI-compatible backends

use async_trait::async_trait;
use chatrelay_config::ProviderConfig;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{StreamExt, future};
use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response};
use url::Url;

use super::{FrameStream, SseFrame, Transport};
use crate::error::LlmError;
use crate::protocol::openai::{ChatCompletionBody, OpenAiStreamOptions};

/// Whether the backend is the canonical `OpenAI` API (vs a compatible third party)
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

/// Chat-completions client over reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    name: String,
    client: Client,
    completions_url: String,
    include_usage: bool,
}

impl HttpTransport {
    /// Build a transport from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if a header or the API key is not
    /// a valid header value, or the HTTP client cannot be built.
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let header_name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| LlmError::Configuration(format!("invalid header name '{key}': {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| LlmError::Configuration(format!("invalid value for header '{key}': {e}")))?;
            headers.insert(header_name, header_value);
        }

        if let Some(key) = config.effective_api_key() {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| LlmError::Configuration("api_key is not a valid header value".to_owned()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let base = config.base_url.as_str().trim_end_matches('/');

        Ok(Self {
            name: name.into(),
            client,
            completions_url: format!("{base}/chat/completions"),
            include_usage: is_canonical_openai(&config.base_url),
        })
    }

    /// Provider id used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full chat-completions endpoint
    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    async fn send(&self, body: &ChatCompletionBody) -> Result<Response, LlmError> {
        let response = self
            .client
            .post(&self.completions_url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = %self.name, error = %e, "upstream request failed");
                LlmError::from_request(&e)
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(provider = %self.name, status = %status, "upstream returned error");

        Err(LlmError::from_status(status, &text, retry_after))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn complete(&self, body: &ChatCompletionBody) -> Result<serde_json::Value, LlmError> {
        let response = self.send(body).await?;

        response.json().await.map_err(|e| {
            tracing::warn!(provider = %self.name, error = %e, "failed to read response body");
            LlmError::from_request(&e)
        })
    }

    async fn stream(&self, body: &ChatCompletionBody) -> Result<FrameStream, LlmError> {
        let mut body = body.clone();
        body.stream = true;
        // Many compatible APIs reject the unsupported parameter
        body.stream_options = self
            .include_usage
            .then_some(OpenAiStreamOptions { include_usage: true });

        let response = self.send(&body).await?;
        let name = self.name.clone();

        let frames = response.bytes_stream().eventsource().filter_map(move |result| {
            let frame = match result {
                Ok(event) => parse_frame(&event.data),
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "upstream stream failed");
                    Some(Err(stream_error(e)))
                }
            };
            future::ready(frame)
        });

        Ok(Box::pin(frames))
    }
}

/// Decode one `data:` payload; blank and non-JSON payloads are skipped
fn parse_frame(data: &str) -> Option<Result<SseFrame, LlmError>> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(SseFrame::Done));
    }

    match serde_json::from_str(data) {
        Ok(value) => Some(Ok(SseFrame::Event(value))),
        Err(e) => {
            let err = LlmError::MalformedEvent(e.to_string());
            tracing::warn!(error = %err, data = %data, "skipping unparseable SSE event");
            None
        }
    }
}

fn stream_error(err: EventStreamError<reqwest::Error>) -> LlmError {
    match err {
        EventStreamError::Transport(e) if e.is_timeout() => LlmError::Timeout,
        other => LlmError::StreamInterrupted(other.to_string()),
    }
}
