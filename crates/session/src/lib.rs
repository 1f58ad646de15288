//! Session aggregate: one capture, one stream client, one queue.
//!
//! A session is created on start and torn down completely on stop or fatal
//! error; nothing survives across sessions. Reconnection policy belongs to
//! the caller: when a [`SessionEvent::Error`] or [`SessionEvent::Closed`]
//! arrives, stop this session and start a new one.

use std::sync::Arc;

use tokio::sync::mpsc;

use aura_analysis::AnalysisDispatcher;
use aura_audio::AudioCapture;
use aura_events::SessionEvent;
use aura_segment::{QueueEvent, SegmentQueue};
use aura_stream::{StreamClient, StreamConfig, StreamEvent};

/// Default analysis endpoint.
pub const DEFAULT_ANALYSIS_URL: &str = "http://localhost:8000/process_text";

/// Explicit inputs to session construction; no ambient globals.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_key: String,
    pub stream_url: String,
    pub analysis_url: String,
    pub model: String,
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            stream_url: aura_stream::DEFAULT_URL.to_string(),
            analysis_url: DEFAULT_ANALYSIS_URL.to_string(),
            model: aura_stream::DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Stream(#[from] aura_stream::StreamError),
    #[error(transparent)]
    Audio(#[from] aura_audio::AudioError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// A live recording session.
///
/// Owns the microphone, the recognition stream, and the segment queue.
/// All outputs arrive on the receiver returned by [`Session::start`].
pub struct Session {
    capture: AudioCapture,
    stream: Arc<StreamClient>,
}

impl Session {
    /// Bring the pipeline up in dependency order.
    ///
    /// The stream client connects first (surfacing credential and
    /// connection errors before any device is touched); the microphone is
    /// acquired second, and the stream is closed again if acquisition
    /// fails, so a failed start leaks nothing.
    pub async fn start(
        config: SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let mut stream_config = StreamConfig::new(config.api_key);
        stream_config.url = config.stream_url;
        stream_config.model = config.model;

        let (stream, stream_events) = StreamClient::connect(stream_config).await?;
        let stream = Arc::new(stream);

        let sink_stream = Arc::clone(&stream);
        let capture = match AudioCapture::start(move |frame| sink_stream.send(frame)) {
            Ok(capture) => capture,
            Err(e) => {
                stream.stop();
                return Err(e.into());
            }
        };

        let (queue, queue_events) =
            SegmentQueue::new(AnalysisDispatcher::new(config.analysis_url));

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump_events(stream_events, queue_events, queue, out_tx));

        tracing::info!("session started");
        Ok((Self { capture, stream }, out_rx))
    }

    /// Tear the session down. Idempotent and safe at any point.
    ///
    /// Releases the device, closes the stream, and leaves any in-flight
    /// analysis call to complete naturally; its result is dropped with the
    /// event channel once the receiver goes away.
    pub fn stop(&self) {
        self.capture.stop();
        self.stream.stop();
        tracing::info!("session stopped");
    }

    /// Connection state of the underlying stream, for status display.
    pub fn connection_state(&self) -> aura_stream::ConnectionState {
        self.stream.state()
    }
}

/// Single coordinating loop: every inbound reaction (transcript, transport
/// error, analysis outcome) is serialized here, so interim display, final
/// enqueueing, and result forwarding never race each other.
async fn pump_events(
    mut stream_events: mpsc::UnboundedReceiver<StreamEvent>,
    mut queue_events: mpsc::UnboundedReceiver<QueueEvent>,
    queue: SegmentQueue<AnalysisDispatcher>,
    out: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut stream_done = false;
    loop {
        let forwarded = tokio::select! {
            // The queue's event sender lives inside `queue`, owned by this
            // task, so its channel alone can never signal shutdown. Watch
            // the consumer side instead: once the receiver is gone there is
            // nobody left to forward to and the pump must not outlive the
            // session.
            _ = out.closed() => break,
            event = stream_events.recv(), if !stream_done => match event {
                Some(StreamEvent::Transcript(event)) => {
                    if event.is_final {
                        queue.enqueue(&event.text);
                    }
                    out.send(SessionEvent::Transcript(event))
                }
                Some(StreamEvent::Error(message)) => out.send(SessionEvent::Error(message)),
                Some(StreamEvent::Closed) => out.send(SessionEvent::Closed),
                None => {
                    stream_done = true;
                    continue;
                }
            },
            event = queue_events.recv() => match event {
                Some(QueueEvent::Analyzed { segment, result }) => out.send(SessionEvent::Sentiment {
                    segment_text: segment.text,
                    result,
                }),
                Some(QueueEvent::Failed { segment, error }) => out.send(SessionEvent::AnalysisFailed {
                    segment_text: segment.text,
                    error,
                }),
                None => break,
            },
        };
        if forwarded.is_err() {
            // Consumer is gone; late analysis results are not acted upon.
            break;
        }
    }
    tracing::debug!("session event pump finished");
}
