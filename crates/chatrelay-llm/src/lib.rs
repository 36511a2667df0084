//! Uniform streaming client for chat-completion backends
//!
//! Backends that speak the chat-completions protocol do not all stream the
//! same way: some send incremental `delta` events, others send one complete
//! message while claiming to stream. [`ChatAdapter`] hides the difference and
//! always hands out a sequence of [`GenerationChunk`]s. It also retries an
//! interrupted stream once without streaming, and estimates token usage when
//! the backend does not report it.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod accumulate;
pub mod adapter;
pub mod convert;
pub mod detect;
pub mod error;
pub mod fallback;
pub mod normalize;
pub mod params;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod types;
pub mod usage;

pub use accumulate::StreamAccumulator;
pub use adapter::{ChatAdapter, ChatAdapterBuilder, EventStream, GenerationEvent, GenerationStream};
pub use detect::{DetectorRegistry, DialectDetector, ResponseDialect};
pub use error::LlmError;
pub use normalize::{ChunkPacing, SplitMode};
pub use params::{CallOptions, RequestParams};
pub use store::ProviderConfigStore;
pub use transport::{HttpTransport, RetryingTransport, Transport};
pub use types::{ChatMessage, Generation, GenerationChunk, GenerationResult, Role, TokenUsage, UsageSource};
pub use usage::{TiktokenTokenizer, Tokenizer};
