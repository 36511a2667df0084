use serde::{Deserialize, Serialize};

/// Where a usage figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    /// Reported by the backend; exact
    Reported,
    /// Computed locally from message structure; approximate
    Estimated,
}

/// Token usage statistics
///
/// A value is either entirely reported or entirely estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Prompt plus completion
    pub total_tokens: u32,
    /// Whether the figures are exact
    pub source: UsageSource,
}

impl TokenUsage {
    /// Usage as reported by the backend
    pub const fn reported(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            source: UsageSource::Reported,
        }
    }

    /// Locally estimated usage; the total is derived
    pub const fn estimated(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            source: UsageSource::Estimated,
        }
    }

    pub const fn is_estimated(&self) -> bool {
        matches!(self.source, UsageSource::Estimated)
    }
}
