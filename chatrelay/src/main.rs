#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;

use args::Args;
use chatrelay_config::Config;
use chatrelay_llm::{CallOptions, ChatAdapter, ChatMessage, GenerationEvent, LlmError};
use clap::Parser;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize telemetry
    chatrelay_telemetry::init(config.telemetry.as_ref(), "info")?;

    let provider_id = match &args.provider {
        Some(id) => id.clone(),
        None => config
            .default_provider_id()
            .ok_or_else(|| anyhow::anyhow!("no provider configured"))?
            .to_owned(),
    };

    let adapter = ChatAdapter::from_store(&config, &provider_id)?
        .generation(config.generation.clone())
        .build();

    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(ChatMessage::system(system.as_str()));
    }
    messages.push(ChatMessage::user(args.prompt_text()?));

    // Ctrl+C stops the generation, keeping what was already printed
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_on_signal.cancel();
    });

    let mut options = CallOptions::default().with_cancellation(cancel);
    if let Some(model) = args.model {
        options = options.with_model(model);
    }
    if args.no_stream {
        options = options.with_streaming(false);
    }

    tracing::debug!(
        config_path = %args.config.display(),
        provider = %provider_id,
        "starting generation"
    );

    let mut events = adapter.events(messages, options);
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event {
            Ok(GenerationEvent::Chunk(chunk)) => {
                if chunk.completion_index == 0 {
                    stdout.write_all(chunk.content_fragment.as_bytes())?;
                    stdout.flush()?;
                }
            }
            Ok(GenerationEvent::Completed(result)) => {
                writeln!(stdout)?;
                tracing::info!(
                    prompt_tokens = result.usage.prompt_tokens,
                    completion_tokens = result.usage.completion_tokens,
                    total_tokens = result.usage.total_tokens,
                    estimated = result.usage.is_estimated(),
                    "usage"
                );
            }
            Err(LlmError::Cancelled) => {
                writeln!(stdout)?;
                tracing::warn!("generation cancelled");
                return Ok(());
            }
            Err(err) => {
                writeln!(stdout)?;
                return Err(err.into());
            }
        }
    }

    Ok(())
}

/// Wait for an interrupt (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("interrupt received, cancelling");
}
