//! Console runner for the aura pipeline.
//!
//! Streams the default microphone to the recognition service and prints
//! transcripts and sentiment results until Ctrl-C or a fatal session event.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use aura_events::SessionEvent;
use aura_session::{Session, SessionConfig, DEFAULT_ANALYSIS_URL};

fn config_from_env() -> anyhow::Result<SessionConfig> {
    let api_key = std::env::var("AURA_API_KEY")
        .context("AURA_API_KEY is required (recognition service credential)")?;

    let mut config = SessionConfig::new(api_key);
    if let Ok(url) = std::env::var("AURA_STREAM_URL") {
        config.stream_url = url;
    }
    config.analysis_url =
        std::env::var("AURA_ANALYSIS_URL").unwrap_or_else(|_| DEFAULT_ANALYSIS_URL.to_string());
    if let Ok(model) = std::env::var("AURA_MODEL") {
        config.model = model;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,aura=debug")),
        )
        .init();

    let config = config_from_env()?;
    tracing::info!("starting aura session");

    let (session, mut events) = Session::start(config)
        .await
        .context("failed to start session")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, stopping");
                break;
            }
            event = events.recv() => match event {
                Some(SessionEvent::Transcript(t)) if t.is_final => {
                    println!("[final]   {}", t.text);
                }
                Some(SessionEvent::Transcript(t)) => {
                    println!("[interim] {}", t.text);
                }
                Some(SessionEvent::Sentiment { segment_text, result }) => {
                    println!(
                        "[sentiment] {} (score {:+.2}, keywords: {}) <- {segment_text}",
                        result.sentiment,
                        result.score,
                        result.keywords.join(", "),
                    );
                }
                Some(SessionEvent::AnalysisFailed { segment_text, error }) => {
                    tracing::warn!("analysis failed for \"{segment_text}\": {error}");
                }
                Some(SessionEvent::Error(message)) => {
                    tracing::error!("session error: {message}");
                    break;
                }
                Some(SessionEvent::Closed) => {
                    tracing::info!("remote service closed the stream");
                    break;
                }
                None => break,
            },
        }
    }

    session.stop();
    Ok(())
}
