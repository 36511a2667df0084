//! Provider-agnostic types exchanged with callers
//!
//! Wire formats live in [`crate::protocol`]; these are what callers build
//! requests from and receive results as.

pub mod chunk;
pub mod generation;
pub mod message;
pub mod tool;
pub mod usage;

pub use chunk::{FunctionCallDelta, GenerationChunk, ToolCallDelta};
pub use generation::{Generation, GenerationResult};
pub use message::{ChatMessage, FunctionCall, Role, ToolCall};
pub use tool::{FunctionDefinition, ResponseFormat, ToolChoice, ToolChoiceMode, ToolDefinition};
pub use usage::{TokenUsage, UsageSource};
