mod harness;

use chatrelay_llm::{CallOptions, ChatAdapter, GenerationChunk, LlmError, UsageSource};
use futures_util::StreamExt;
use harness::config::{ConfigBuilder, adapter, user};
use harness::mock_backend::{Behavior, MockBackend};

async fn collect(adapter: &ChatAdapter, options: CallOptions) -> (Vec<GenerationChunk>, Option<LlmError>) {
    let mut stream = adapter.generate_stream(user("Hello"), options);
    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => chunks.push(chunk),
            Err(err) => return (chunks, Some(err)),
        }
    }
    (chunks, None)
}

fn text(chunks: &[GenerationChunk]) -> String {
    chunks.iter().map(|c| c.content_fragment.as_str()).collect()
}

#[tokio::test]
async fn delta_stream_end_to_end() {
    let mock = MockBackend::start(Behavior::Delta("Hello from mock LLM".to_owned()), "unused")
        .await
        .unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let (chunks, err) = collect(&adapter(&config), CallOptions::default()).await;

    assert!(err.is_none(), "unexpected error: {err:?}");
    assert_eq!(text(&chunks), "Hello from mock LLM");
    assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("stop"));
    assert_eq!(mock.stream_count(), 1);
    assert_eq!(mock.complete_count(), 0);
    assert_eq!(mock.authorization_headers(), ["Bearer test-key"]);
}

#[tokio::test]
async fn request_body_carries_parameters() {
    let mock = MockBackend::start(Behavior::Delta("ok".to_owned()), "unused")
        .await
        .unwrap();
    let config = ConfigBuilder::new()
        .with_provider("mock", &mock.base_url())
        .with_generation("temperature = 0.2")
        .with_generation("max_tokens = -1")
        .with_generation(r#"stop = ["END"]"#)
        .build();

    collect(&adapter(&config), CallOptions::default()).await;

    let body = &mock.bodies()[0];
    assert_eq!(body["model"], "mock-model-1");
    assert_eq!(body["stream"], true);
    assert_eq!(body["temperature"], 0.2);
    assert_eq!(body["stop"][0], "END");
    assert_eq!(body["messages"][0]["content"], "Hello");
    assert!(body.get("max_tokens").is_none());
    assert!(body.get("stream_options").is_none());
}

#[tokio::test]
async fn complete_message_over_stream_is_split() {
    let mock = MockBackend::start(Behavior::CompleteOverStream("Hi there".to_owned()), "unused")
        .await
        .unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let (chunks, err) = collect(&adapter(&config), CallOptions::default()).await;

    assert!(err.is_none());
    let fragments: Vec<_> = chunks.iter().map(|c| c.content_fragment.as_str()).collect();
    assert_eq!(fragments, ["Hi", " there"]);
    assert_eq!(chunks[1].finish_reason.as_deref(), Some("stop"));
    assert_eq!(mock.complete_count(), 0);
}

#[tokio::test]
async fn dropped_connection_falls_back_to_non_streaming() {
    let mock = MockBackend::start(
        Behavior::Interrupted {
            sent: vec!["Fallback".to_owned()],
        },
        "Fallback answer",
    )
    .await
    .unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let (chunks, err) = collect(&adapter(&config), CallOptions::default()).await;

    assert!(err.is_none(), "unexpected error: {err:?}");
    assert_eq!(text(&chunks), "Fallback answer");
    assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("stop"));
    assert_eq!(mock.stream_count(), 1);
    assert_eq!(mock.complete_count(), 1);
    assert_eq!(mock.bodies()[1]["stream"], false);
}

#[tokio::test]
async fn early_close_falls_back_and_emits_remainder() {
    let mock = MockBackend::start(
        Behavior::ClosedEarly {
            sent: vec!["Hello".to_owned(), " wor".to_owned()],
        },
        "Hello world, again",
    )
    .await
    .unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let (chunks, err) = collect(&adapter(&config), CallOptions::default()).await;

    assert!(err.is_none(), "unexpected error: {err:?}");
    assert_eq!(text(&chunks), "Hello world, again");
    assert_eq!(text(&chunks[..2]), "Hello wor");
    assert_eq!(mock.complete_count(), 1);
}

#[tokio::test]
async fn divergent_fallback_fails_after_partial_output() {
    let mock = MockBackend::start(
        Behavior::ClosedEarly {
            sent: vec!["Hello".to_owned()],
        },
        "Something else entirely",
    )
    .await
    .unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let (chunks, err) = collect(&adapter(&config), CallOptions::default()).await;

    assert_eq!(text(&chunks), "Hello");
    assert!(matches!(err, Some(LlmError::FallbackFailed { .. })), "got {err:?}");
}

#[tokio::test]
async fn unauthorized_is_not_retried_or_recovered() {
    let mock = MockBackend::start(Behavior::Unauthorized, "unused").await.unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let (chunks, err) = collect(&adapter(&config), CallOptions::default()).await;

    assert!(chunks.is_empty());
    match err {
        Some(LlmError::Authentication { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
    assert_eq!(mock.request_count(), 1);
    assert_eq!(mock.complete_count(), 0);
}

#[tokio::test]
async fn transient_failures_are_retried_with_backoff() {
    let mock = MockBackend::start(
        Behavior::FlakyThenDelta {
            failures: 2,
            content: "third time lucky".to_owned(),
        },
        "unused",
    )
    .await
    .unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let (chunks, err) = collect(&adapter(&config), CallOptions::default()).await;

    assert!(err.is_none(), "unexpected error: {err:?}");
    assert_eq!(text(&chunks), "third time lucky");
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_transient_error() {
    let mock = MockBackend::start(
        Behavior::FlakyThenDelta {
            failures: 10,
            content: "never".to_owned(),
        },
        "unused",
    )
    .await
    .unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let (_, err) = collect(&adapter(&config), CallOptions::default()).await;

    assert!(matches!(err, Some(LlmError::Transient(_))), "got {err:?}");
    assert_eq!(mock.request_count(), 3);
    assert_eq!(mock.complete_count(), 0);
}

#[tokio::test]
async fn streaming_disabled_sends_one_plain_request() {
    let mock = MockBackend::start(Behavior::Delta("unused".to_owned()), "Plain answer")
        .await
        .unwrap();
    let config = ConfigBuilder::new()
        .with_provider("mock", &mock.base_url())
        .with_generation("streaming = false")
        .build();

    let result = adapter(&config)
        .generate(user("Hello"), CallOptions::default())
        .await
        .unwrap();

    assert_eq!(result.text(), "Plain answer");
    assert_eq!(result.usage.source, UsageSource::Reported);
    assert_eq!(result.usage.total_tokens, 10);
    assert_eq!(mock.stream_count(), 0);
    assert_eq!(mock.complete_count(), 1);
}

#[tokio::test]
async fn streamed_generation_estimates_usage() {
    let mock = MockBackend::start(Behavior::Delta("Hello from mock LLM".to_owned()), "unused")
        .await
        .unwrap();
    let config = ConfigBuilder::new().with_provider("mock", &mock.base_url()).build();

    let result = adapter(&config)
        .generate(user("Hello"), CallOptions::default())
        .await
        .unwrap();

    assert_eq!(result.text(), "Hello from mock LLM");
    assert_eq!(result.generations[0].finish_reason.as_deref(), Some("stop"));
    assert!(result.usage.is_estimated());
    assert!(result.usage.prompt_tokens > 3);
    assert!(result.usage.completion_tokens > 0);
}

#[tokio::test]
async fn unknown_provider_is_configuration_error() {
    let config = ConfigBuilder::new()
        .with_provider("mock", "http://127.0.0.1:9/v1")
        .build();

    let result = ChatAdapter::from_store(&config, "missing");
    assert!(matches!(result, Err(LlmError::Configuration(_))));
}
