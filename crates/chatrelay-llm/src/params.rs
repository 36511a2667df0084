//! Invocation parameters: adapter configuration merged with per-call overrides

use chatrelay_config::GenerationConfig;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::normalize::ChunkPacing;
use crate::protocol::openai::{ChatCompletionBody, OpenAiResponseFormat};
use crate::types::{ChatMessage, FunctionDefinition, ResponseFormat, ToolChoice, ToolDefinition};

/// Per-call overrides and call-scoped controls
///
/// Every `None` falls back to the adapter's [`GenerationConfig`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    /// Negative values mean "leave it to the backend"
    pub max_tokens: Option<i64>,
    pub n: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub seed: Option<u64>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
    pub functions: Option<Vec<FunctionDefinition>>,
    /// Legacy `function_call` mode, passed through verbatim
    pub function_call: Option<serde_json::Value>,
    pub response_format: Option<ResponseFormat>,
    /// Pass log probabilities through to chunks
    pub logprobs: Option<bool>,
    pub top_logprobs: Option<u32>,
    pub user: Option<String>,
    /// Request a streamed response
    pub streaming: Option<bool>,
    /// Prompt index stamped on every chunk
    pub prompt_index: u32,
    /// Emulated streaming for complete-message responses
    pub pacing: Option<ChunkPacing>,
    /// Cooperative cancellation signal
    pub cancellation: Option<CancellationToken>,
}

impl CallOptions {
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: i64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub const fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = Some(streaming);
        self
    }

    #[must_use]
    pub const fn with_pacing(mut self, pacing: ChunkPacing) -> Self {
        self.pacing = Some(pacing);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Fully resolved parameters for one call
///
/// Built once per call and never modified; the fallback path derives a
/// non-streaming copy instead of mutating it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    pub model: String,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub max_tokens: Option<u32>,
    pub n: Option<u32>,
    pub stop: Vec<String>,
    pub stream: bool,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub functions: Vec<FunctionDefinition>,
    pub function_call: Option<serde_json::Value>,
    pub seed: Option<u64>,
    pub response_format: Option<ResponseFormat>,
    pub logprobs: bool,
    pub top_logprobs: Option<u32>,
    pub user: Option<String>,
}

impl RequestParams {
    /// Merge configuration and overrides, validating the result
    ///
    /// # Errors
    ///
    /// Returns `LlmError::InvalidRequest` when a value is out of range or
    /// the model id is empty
    pub fn build(config: &GenerationConfig, options: &CallOptions) -> Result<Self, LlmError> {
        let model = options.model.clone().unwrap_or_else(|| config.model.clone());
        if model.trim().is_empty() {
            return Err(LlmError::InvalidRequest("model id must not be empty".to_owned()));
        }

        let temperature = options.temperature.or(config.temperature);
        check_range("temperature", temperature, 0.0, 2.0)?;
        let top_p = options.top_p.or(config.top_p);
        check_range("top_p", top_p, 0.0, 1.0)?;
        let frequency_penalty = options.frequency_penalty.or(config.frequency_penalty);
        check_range("frequency_penalty", frequency_penalty, -2.0, 2.0)?;
        let presence_penalty = options.presence_penalty.or(config.presence_penalty);
        check_range("presence_penalty", presence_penalty, -2.0, 2.0)?;

        let n = options.n.or(config.n);
        if n == Some(0) {
            return Err(LlmError::InvalidRequest("n must be at least 1".to_owned()));
        }

        let response_format = match (options.response_format, config.response_format.as_deref()) {
            (Some(format), _) => Some(format),
            (None, Some(raw)) => Some(
                ResponseFormat::parse(raw)
                    .ok_or_else(|| LlmError::InvalidRequest(format!("unknown response_format '{raw}'")))?,
            ),
            (None, None) => None,
        };

        Ok(Self {
            model,
            temperature,
            top_p,
            frequency_penalty,
            presence_penalty,
            max_tokens: resolve_max_tokens(options.max_tokens.unwrap_or(config.max_tokens))?,
            n,
            stop: options.stop.clone().unwrap_or_else(|| config.stop.clone()),
            stream: options.streaming.unwrap_or(config.streaming),
            tools: options.tools.clone().unwrap_or_default(),
            tool_choice: options.tool_choice.clone(),
            functions: options.functions.clone().unwrap_or_default(),
            function_call: options.function_call.clone(),
            seed: options.seed.or(config.seed),
            response_format,
            logprobs: options.logprobs.unwrap_or(config.logprobs),
            top_logprobs: options.top_logprobs.or(config.top_logprobs),
            user: options.user.clone().or_else(|| config.user.clone()),
        })
    }

    /// Identical parameters with streaming turned off
    #[must_use]
    pub fn non_streaming(&self) -> Self {
        Self {
            stream: false,
            ..self.clone()
        }
    }

    /// Request body for the given conversation
    pub fn to_body(&self, messages: &[ChatMessage]) -> ChatCompletionBody {
        ChatCompletionBody {
            model: self.model.clone(),
            messages: messages.iter().map(Into::into).collect(),
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            max_tokens: self.max_tokens,
            n: self.n,
            stop: (!self.stop.is_empty()).then(|| self.stop.clone()),
            stream: self.stream,
            stream_options: None,
            tools: (!self.tools.is_empty()).then(|| self.tools.iter().map(Into::into).collect()),
            tool_choice: self.tool_choice.as_ref().map(ToolChoice::to_value),
            functions: (!self.functions.is_empty()).then(|| self.functions.iter().map(Into::into).collect()),
            function_call: self.function_call.clone(),
            response_format: self.response_format.map(|format| OpenAiResponseFormat {
                format_type: format.as_str().to_owned(),
            }),
            seed: self.seed,
            logprobs: self.logprobs.then_some(true),
            top_logprobs: self.top_logprobs.filter(|_| self.logprobs),
            user: self.user.clone(),
        }
    }
}

fn check_range(name: &str, value: Option<f64>, min: f64, max: f64) -> Result<(), LlmError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(LlmError::InvalidRequest(format!(
            "{name} must be between {min} and {max}, got {v}"
        ))),
        _ => Ok(()),
    }
}

/// Negative `max_tokens` (conventionally `-1`) means "unset"
fn resolve_max_tokens(raw: i64) -> Result<Option<u32>, LlmError> {
    if raw < 0 {
        return Ok(None);
    }
    u32::try_from(raw)
        .map(Some)
        .map_err(|_| LlmError::InvalidRequest(format!("max_tokens {raw} is too large")))
}
