//! Conversion of raw backend events into [`GenerationChunk`]s

mod complete;
mod delta;

pub use complete::{ChunkPacing, CompleteMessageNormalizer, decode_response, split_fragments};
pub use delta::DeltaNormalizer;

pub use chatrelay_config::SplitMode;

use crate::types::{GenerationChunk, TokenUsage};

/// Role assumed until the backend names one
pub(crate) const DEFAULT_ROLE: &str = "assistant";

/// Output of normalizing one event or response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedEvent {
    /// Chunks in emission order
    pub chunks: Vec<GenerationChunk>,
    /// Usage, when the backend reported it with this event
    pub usage: Option<TokenUsage>,
}
