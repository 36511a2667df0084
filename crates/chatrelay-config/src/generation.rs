use std::time::Duration;

use serde::Deserialize;

/// Model used when neither the config nor the call names one
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Pause between emulated chunks of a complete-message response
const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(10);

/// Generation defaults shared by every call on an adapter
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default)]
    pub top_p: Option<f64>,
    /// Frequency penalty
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    /// Presence penalty
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    /// Maximum tokens to generate; `-1` leaves it to the backend
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    /// Number of parallel candidate completions
    #[serde(default)]
    pub n: Option<u32>,
    /// Stop sequences
    #[serde(default)]
    pub stop: Vec<String>,
    /// Seed for deterministic sampling
    #[serde(default)]
    pub seed: Option<u64>,
    /// Response format hint (`"text"` or `"json_object"`)
    #[serde(default)]
    pub response_format: Option<String>,
    /// Request a streamed response
    #[serde(default = "default_streaming")]
    pub streaming: bool,
    /// Pass token log probabilities through to chunks
    #[serde(default)]
    pub logprobs: bool,
    /// Alternatives per position when `logprobs` is on
    #[serde(default)]
    pub top_logprobs: Option<u32>,
    /// End-user tag forwarded to the backend
    #[serde(default)]
    pub user: Option<String>,
    /// Emulated streaming for backends that return one complete message
    #[serde(default)]
    pub pacing: ChunkPacingConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            max_tokens: default_max_tokens(),
            n: None,
            stop: Vec::new(),
            seed: None,
            response_format: None,
            streaming: default_streaming(),
            logprobs: false,
            top_logprobs: None,
            user: None,
            pacing: ChunkPacingConfig::default(),
        }
    }
}

/// How a complete message is replayed as a stream of chunks
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkPacingConfig {
    /// Delay between emitted chunks; `"0ms"` disables it
    #[serde(default = "default_chunk_delay", deserialize_with = "crate::duration::deserialize")]
    pub delay: Duration,
    /// Split granularity
    #[serde(default)]
    pub split: SplitMode,
}

impl Default for ChunkPacingConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_CHUNK_DELAY,
            split: SplitMode::default(),
        }
    }
}

/// Granularity used to split a complete message into chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// One chunk per space-separated word
    #[default]
    Whitespace,
    /// The whole message as a single chunk
    Whole,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_owned()
}

const fn default_max_tokens() -> i64 {
    -1
}

const fn default_streaming() -> bool {
    true
}

const fn default_chunk_delay() -> Duration {
    DEFAULT_CHUNK_DELAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let config: GenerationConfig = toml::from_str("").unwrap();

        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.max_tokens, -1);
        assert!(config.streaming);
        assert!(!config.logprobs);
        assert_eq!(config.pacing.delay, Duration::from_millis(10));
        assert_eq!(config.pacing.split, SplitMode::Whitespace);
    }

    #[test]
    fn pacing_can_be_disabled() {
        let config: GenerationConfig = toml::from_str(
            r#"
            model = "llama3"
            [pacing]
            delay = "0ms"
            split = "whole"
            "#,
        )
        .unwrap();

        assert_eq!(config.model, "llama3");
        assert_eq!(config.pacing.delay, Duration::ZERO);
        assert_eq!(config.pacing.split, SplitMode::Whole);
    }
}
