//! Chat adapter: one call from parameters to a uniform chunk stream
//!
//! ```text
//! build params ─> stream request ─> detect dialect ─┬─> delta events ──────┐
//!        │                │                         └─> complete message ──┤
//!        │                └─(interrupted)─> non-streaming retry ───────────┤
//!        └─(streaming off)─> non-streaming request ────────────────────────┴─> chunks, usage
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_stream::try_stream;
use chatrelay_config::{GenerationConfig, ProviderConfig};
use futures_util::{Stream, StreamExt, future};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::accumulate::StreamAccumulator;
use crate::detect::{Detection, DetectorRegistry, ResponseDialect, detect, in_band_error};
use crate::error::LlmError;
use crate::fallback::{self, EmittedOutput};
use crate::normalize::{ChunkPacing, CompleteMessageNormalizer, DeltaNormalizer, decode_response};
use crate::params::{CallOptions, RequestParams};
use crate::protocol::openai::OpenAiResponse;
use crate::store::ProviderConfigStore;
use crate::transport::{HttpTransport, RetryingTransport, SseFrame, Transport};
use crate::types::{ChatMessage, GenerationChunk, GenerationResult, TokenUsage};
use crate::usage::{TiktokenTokenizer, Tokenizer, UsageEstimator};

/// Chunks of one call, ending early with an error if the call fails
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk, LlmError>> + Send>>;

/// Chunks followed by the aggregate result
pub type EventStream = Pin<Box<dyn Stream<Item = Result<GenerationEvent, LlmError>> + Send>>;

/// Item of an [`EventStream`]
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Next chunk, in emission order
    Chunk(GenerationChunk),
    /// Merged generations and usage; always the last item of a successful call
    Completed(GenerationResult),
}

/// Chat-completion client for one backend
///
/// Cheap to clone; clones share the transport, which is created on first use
/// and never reconfigured.
#[derive(Clone)]
pub struct ChatAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    provider_id: String,
    provider: ProviderConfig,
    generation: GenerationConfig,
    transport: OnceCell<Arc<dyn Transport>>,
    tokenizer: OnceLock<Arc<dyn Tokenizer>>,
    detectors: DetectorRegistry,
}

impl fmt::Debug for ChatAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatAdapter")
            .field("provider", &self.inner.provider_id)
            .field("model", &self.inner.generation.model)
            .field("connected", &self.inner.transport.initialized())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ChatAdapter`]
pub struct ChatAdapterBuilder {
    provider_id: String,
    provider: ProviderConfig,
    generation: GenerationConfig,
    transport: Option<Arc<dyn Transport>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    detectors: DetectorRegistry,
}

impl ChatAdapterBuilder {
    /// Model defaults for every call
    #[must_use]
    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Use this transport instead of the HTTP one built from the provider
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Tokenizer for usage estimation; defaults to tiktoken for the model
    #[must_use]
    pub fn tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizer = Some(Arc::new(tokenizer));
        self
    }

    /// Dialect detectors; defaults to [`DetectorRegistry::default`]
    #[must_use]
    pub fn detectors(mut self, detectors: DetectorRegistry) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn build(self) -> ChatAdapter {
        let tokenizer = self.tokenizer.map_or_else(OnceLock::new, OnceLock::from);

        ChatAdapter {
            inner: Arc::new(AdapterInner {
                provider_id: self.provider_id,
                provider: self.provider,
                generation: self.generation,
                transport: OnceCell::new_with(self.transport),
                tokenizer,
                detectors: self.detectors,
            }),
        }
    }
}

impl ChatAdapter {
    pub fn builder(provider_id: impl Into<String>, provider: ProviderConfig) -> ChatAdapterBuilder {
        ChatAdapterBuilder {
            provider_id: provider_id.into(),
            provider,
            generation: GenerationConfig::default(),
            transport: None,
            tokenizer: None,
            detectors: DetectorRegistry::default(),
        }
    }

    /// Builder for a provider looked up in `store`
    pub fn from_store(store: &dyn ProviderConfigStore, provider_id: &str) -> Result<ChatAdapterBuilder, LlmError> {
        Ok(Self::builder(provider_id, store.resolve(provider_id)?))
    }

    pub fn provider_id(&self) -> &str {
        &self.inner.provider_id
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.inner.generation
    }

    /// Stream the chunks of one completion
    ///
    /// Emitted chunks stay valid when the stream later ends with an error.
    pub fn generate_stream(&self, messages: Vec<ChatMessage>, options: CallOptions) -> GenerationStream {
        Box::pin(self.events(messages, options).filter_map(|event| {
            future::ready(match event {
                Ok(GenerationEvent::Chunk(chunk)) => Some(Ok(chunk)),
                Ok(GenerationEvent::Completed(_)) => None,
                Err(err) => Some(Err(err)),
            })
        }))
    }

    /// Stream chunks, then the aggregate result with usage
    pub fn events(&self, messages: Vec<ChatMessage>, options: CallOptions) -> EventStream {
        Box::pin(self.clone().run(messages, options))
    }

    /// Run one completion to the end and return the merged result
    ///
    /// Pacing is off unless the options ask for it.
    pub async fn generate(&self, messages: Vec<ChatMessage>, mut options: CallOptions) -> Result<GenerationResult, LlmError> {
        if options.pacing.is_none() {
            options.pacing = Some(ChunkPacing::new(Duration::ZERO, self.inner.generation.pacing.split));
        }

        let mut events = self.events(messages, options);
        while let Some(event) = events.next().await {
            if let GenerationEvent::Completed(result) = event? {
                return Ok(result);
            }
        }
        Err(LlmError::Internal(anyhow::anyhow!("generation ended without a result")))
    }

    async fn transport(&self) -> Result<Arc<dyn Transport>, LlmError> {
        let transport = self
            .inner
            .transport
            .get_or_try_init(|| async {
                let provider = &self.inner.provider;
                let http = HttpTransport::new(self.inner.provider_id.clone(), provider)?;
                tracing::debug!(
                    provider = %self.inner.provider_id,
                    url = http.completions_url(),
                    "created transport"
                );
                let transport: Arc<dyn Transport> =
                    Arc::new(RetryingTransport::new(http, provider.max_retries, provider.retry_backoff));
                Ok::<_, LlmError>(transport)
            })
            .await?;

        Ok(Arc::clone(transport))
    }

    fn tokenizer(&self) -> &dyn Tokenizer {
        self.inner
            .tokenizer
            .get_or_init(|| -> Arc<dyn Tokenizer> { Arc::new(TiktokenTokenizer::for_model(&self.inner.generation.model)) })
            .as_ref()
    }

    fn run(self, messages: Vec<ChatMessage>, options: CallOptions) -> impl Stream<Item = Result<GenerationEvent, LlmError>> + Send {
        try_stream! {
            let inner = &self.inner;
            let params = RequestParams::build(&inner.generation, &options)?;
            let token = options.cancellation.clone();
            let cancel = token.as_ref();
            let pacing = options
                .pacing
                .unwrap_or_else(|| ChunkPacing::from(&inner.generation.pacing));

            tracing::debug!(
                provider = %inner.provider_id,
                model = %params.model,
                stream = params.stream,
                messages = messages.len(),
                "starting generation"
            );

            let transport = cancellable(cancel, self.transport()).await??;
            let body = params.to_body(&messages);

            let mut accumulator = StreamAccumulator::new();
            let mut emitted = EmittedOutput::default();
            let mut reported: Option<TokenUsage> = None;
            let mut complete: Option<OpenAiResponse> = None;
            let mut interruption: Option<LlmError> = None;

            if params.stream {
                let detection = cancellable(cancel, async {
                    let frames = transport.stream(&body).await?;
                    detect(frames, &inner.detectors).await
                })
                .await?;

                match detection {
                    Err(err) if err.triggers_fallback() => interruption = Some(err),
                    Err(err) => Err(err)?,
                    Ok(Detection::Done) => tracing::debug!(provider = %inner.provider_id, "backend sent an empty stream"),
                    Ok(Detection::Classified { dialect: ResponseDialect::CompleteMessage, first, .. }) => {
                        complete = Some(decode_response(first)?);
                    }
                    Ok(Detection::Classified { dialect: ResponseDialect::DeltaStream, first, mut rest }) => {
                        let mut normalizer = DeltaNormalizer::new(options.prompt_index, params.logprobs);
                        let mut pending = Some(first);

                        loop {
                            let event = match pending.take() {
                                Some(event) => event,
                                None => match cancellable(cancel, rest.next()).await? {
                                    Some(Ok(SseFrame::Event(event))) => event,
                                    Some(Ok(SseFrame::Done)) => break,
                                    Some(Err(err)) if err.triggers_fallback() => {
                                        interruption = Some(err);
                                        break;
                                    }
                                    Some(Err(err)) => Err(err)?,
                                    None => {
                                        let open = normalizer.unfinished();
                                        if !open.is_empty() {
                                            interruption = Some(LlmError::StreamInterrupted(format!(
                                                "stream closed before completions {open:?} finished"
                                            )));
                                        }
                                        break;
                                    }
                                },
                            };

                            if let Some(message) = in_band_error(&event) {
                                interruption = Some(LlmError::StreamInterrupted(message));
                                break;
                            }

                            let normalized = normalizer.normalize(event);
                            if normalized.usage.is_some() {
                                reported = normalized.usage;
                            }
                            for chunk in normalized.chunks {
                                ensure_active(cancel)?;
                                emitted.record(&chunk);
                                accumulator.push(chunk.clone());
                                yield GenerationEvent::Chunk(chunk);
                            }
                        }
                    }
                }
            } else {
                let value = cancellable(cancel, transport.complete(&body)).await??;
                complete = Some(decode_response(value)?);
            }

            if let Some(original) = interruption {
                // Usage of the failed attempt does not describe the retry
                reported = None;
                let recovered = cancellable(
                    cancel,
                    fallback::recover(transport.as_ref(), &params, &messages, original, &emitted),
                )
                .await??;
                complete = Some(recovered);
            }

            if let Some(response) = complete {
                let normalizer = CompleteMessageNormalizer::new(options.prompt_index, params.logprobs, pacing.split);
                let normalized = normalizer.normalize(response);
                if normalized.usage.is_some() {
                    reported = normalized.usage;
                }

                for (position, chunk) in normalized.chunks.into_iter().enumerate() {
                    if position > 0 && !pacing.delay.is_zero() {
                        cancellable(cancel, tokio::time::sleep(pacing.delay)).await?;
                    }
                    ensure_active(cancel)?;
                    accumulator.push(chunk.clone());
                    yield GenerationEvent::Chunk(chunk);
                }
            }

            let generations = accumulator.finish();
            let usage = match reported {
                Some(usage) => usage,
                None => UsageEstimator::new(self.tokenizer(), &params.model).estimate(&messages, &generations),
            };

            tracing::debug!(
                provider = %inner.provider_id,
                completions = generations.len(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                estimated = usage.is_estimated(),
                "generation finished"
            );

            yield GenerationEvent::Completed(GenerationResult { generations, usage });
        }
    }
}

/// Race `future` against the cancellation token
async fn cancellable<F: Future>(token: Option<&CancellationToken>, future: F) -> Result<F::Output, LlmError> {
    match token {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(LlmError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

fn ensure_active(token: Option<&CancellationToken>) -> Result<(), LlmError> {
    if token.is_some_and(CancellationToken::is_cancelled) {
        Err(LlmError::Cancelled)
    } else {
        Ok(())
    }
}
