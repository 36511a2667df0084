//! Token usage estimation for backends that do not report usage
//!
//! The count follows the chat-format accounting rules published for the
//! `gpt-3.5`/`gpt-4` families. It is an approximation: the same inputs always
//! produce the same numbers, but no backend is guaranteed to bill the same.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::types::{ChatMessage, Generation, Role, TokenUsage};

/// Tokens that prime the assistant reply
const REPLY_PRIMING_TOKENS: i64 = 3;

/// Fixed overhead of an attached function call
const FUNCTION_CALL_TOKENS: i64 = 3;

/// Counts tokens in a string
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// BPE tokenizer from `tiktoken`, chosen by model name
///
/// Unknown models use `cl100k_base`. If no encoding can be loaded at all the
/// count degrades to one token per four bytes.
#[derive(Clone)]
pub struct TiktokenTokenizer {
    bpe: Option<Arc<CoreBPE>>,
}

impl TiktokenTokenizer {
    pub fn for_model(model: &str) -> Self {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .or_else(|_| tiktoken_rs::cl100k_base())
            .map_err(|e| tracing::warn!(model, error = %e, "no tokenizer available, using byte estimate"))
            .ok()
            .map(Arc::new);
        Self { bpe }
    }
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenTokenizer")
            .field("loaded", &self.bpe.is_some())
            .finish()
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.as_ref().map_or_else(
            || text.len() / 4,
            |bpe| bpe.encode_with_special_tokens(text).len(),
        )
    }
}

/// Per-message overheads of the chat format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCountingConstants {
    /// Framing tokens added to every message
    pub tokens_per_message: i64,
    /// Adjustment when a message carries a `name`
    pub tokens_per_name: i64,
}

impl TokenCountingConstants {
    /// Constants for a model family
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("gpt-3.5-turbo-0301") {
            Self {
                tokens_per_message: 4,
                tokens_per_name: -1,
            }
        } else {
            Self {
                tokens_per_message: 3,
                tokens_per_name: 1,
            }
        }
    }
}

/// Estimates usage from message structure
pub struct UsageEstimator<'a> {
    tokenizer: &'a dyn Tokenizer,
    constants: TokenCountingConstants,
}

impl<'a> UsageEstimator<'a> {
    pub fn new(tokenizer: &'a dyn Tokenizer, model: &str) -> Self {
        Self::with_constants(tokenizer, TokenCountingConstants::for_model(model))
    }

    pub const fn with_constants(tokenizer: &'a dyn Tokenizer, constants: TokenCountingConstants) -> Self {
        Self { tokenizer, constants }
    }

    /// Tokens the prompt consumes, including reply priming
    pub fn prompt_tokens(&self, messages: &[ChatMessage]) -> u32 {
        let total: i64 = messages.iter().map(|m| self.message_tokens(m)).sum();
        clamp(total + REPLY_PRIMING_TOKENS)
    }

    /// Tokens of the generated messages, one per completion index
    pub fn completion_tokens(&self, generations: &[Generation]) -> u32 {
        let total: i64 = generations
            .iter()
            .map(|g| self.message_tokens(&g.to_message()))
            .sum();
        clamp(total)
    }

    /// Estimated usage for a whole call
    pub fn estimate(&self, messages: &[ChatMessage], generations: &[Generation]) -> TokenUsage {
        TokenUsage::estimated(self.prompt_tokens(messages), self.completion_tokens(generations))
    }

    fn message_tokens(&self, message: &ChatMessage) -> i64 {
        let mut tokens =
            self.count(&message.content) + self.constants.tokens_per_message + self.count(message.role.as_str());

        if let Some(name) = &message.name {
            tokens += self.constants.tokens_per_name + self.count(name);
        }
        if message.role == Role::Function {
            tokens -= 2;
        }
        if let Some(call) = &message.function_call {
            tokens += FUNCTION_CALL_TOKENS + self.count(&call.name) + self.count(&compact_arguments(&call.arguments));
        }
        tokens
    }

    fn count(&self, text: &str) -> i64 {
        i64::try_from(self.tokenizer.count_tokens(text)).unwrap_or(i64::MAX)
    }
}

/// Arguments as the backend sees them: compact JSON when they parse
fn compact_arguments(arguments: &str) -> String {
    serde_json::from_str::<serde_json::Value>(arguments).map_or_else(|_| arguments.to_owned(), |v| v.to_string())
}

fn clamp(tokens: i64) -> u32 {
    u32::try_from(tokens.max(0)).unwrap_or(u32::MAX)
}
