//! Response dialect detection
//!
//! Backends that claim to stream do not all stream the same way. The first
//! event of a response is classified once, then handed on together with the
//! rest of the stream so nothing is lost or seen twice.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;

use crate::error::LlmError;
use crate::protocol::openai::OpenAiErrorResponse;
use crate::transport::{FrameStream, SseFrame};

/// Known response dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDialect {
    /// Incremental `choices[].delta` events
    DeltaStream,
    /// One event carrying whole `choices[].message` objects
    CompleteMessage,
}

impl ResponseDialect {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeltaStream => "delta_stream",
            Self::CompleteMessage => "complete_message",
        }
    }
}

impl fmt::Display for ResponseDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognizes one dialect from a first event
pub trait DialectDetector: Send + Sync + fmt::Debug {
    /// Claim the event, or return `None` to let the next detector look at it
    fn detect(&self, event: &Value) -> Option<ResponseDialect>;
}

/// A choice with a string `message.content` and no `delta`
#[derive(Debug, Clone, Copy, Default)]
pub struct CompleteMessageDetector;

impl DialectDetector for CompleteMessageDetector {
    fn detect(&self, event: &Value) -> Option<ResponseDialect> {
        let choice = event.get("choices")?.get(0)?;
        if choice.get("delta").is_some() {
            return None;
        }
        choice
            .get("message")?
            .get("content")?
            .is_string()
            .then_some(ResponseDialect::CompleteMessage)
    }
}

/// Ordered detectors; the first to claim an event wins
///
/// Events nobody claims are treated as [`ResponseDialect::DeltaStream`].
#[derive(Debug, Clone)]
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn DialectDetector>>,
}

impl DetectorRegistry {
    /// Registry with no detectors; every event classifies as delta stream
    pub fn empty() -> Self {
        Self { detectors: Vec::new() }
    }

    /// Append a detector, consulted after those already registered
    #[must_use]
    pub fn register(mut self, detector: impl DialectDetector + 'static) -> Self {
        self.detectors.push(Arc::new(detector));
        self
    }

    pub fn classify(&self, event: &Value) -> ResponseDialect {
        self.detectors
            .iter()
            .find_map(|d| d.detect(event))
            .unwrap_or(ResponseDialect::DeltaStream)
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::empty().register(CompleteMessageDetector)
    }
}

/// Outcome of inspecting the first frame of a stream
pub enum Detection {
    /// Stream ended before any event; not an error
    Done,
    /// First event classified; `first` must be processed before `rest`
    Classified {
        dialect: ResponseDialect,
        first: Value,
        rest: FrameStream,
    },
}

impl fmt::Debug for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Classified { dialect, first, .. } => f
                .debug_struct("Classified")
                .field("dialect", dialect)
                .field("first", first)
                .finish_non_exhaustive(),
        }
    }
}

/// Pull exactly one frame from `frames` and classify it
pub async fn detect(mut frames: FrameStream, registry: &DetectorRegistry) -> Result<Detection, LlmError> {
    let first = match frames.next().await {
        None | Some(Ok(SseFrame::Done)) => return Ok(Detection::Done),
        Some(Err(err)) => return Err(err),
        Some(Ok(SseFrame::Event(event))) => event,
    };

    if let Some(message) = in_band_error(&first) {
        return Err(LlmError::Upstream(message));
    }

    let dialect = registry.classify(&first);
    tracing::debug!(%dialect, "classified response");

    Ok(Detection::Classified {
        dialect,
        first,
        rest: frames,
    })
}

/// Message of an `{"error": {...}}` payload sent in place of a completion
pub fn in_band_error(event: &Value) -> Option<String> {
    event.get("error")?;
    let message = serde_json::from_value::<OpenAiErrorResponse>(event.clone())
        .map_or_else(|_| event["error"].to_string(), |e| e.error.message);
    Some(message)
}
