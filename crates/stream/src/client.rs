//! Connection lifecycle for the recognition stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::message::parse_transcript;
use crate::{ConnectionState, StreamError};
use aura_events::TranscriptEvent;

/// Default recognition endpoint.
pub const DEFAULT_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Default recognition model.
pub const DEFAULT_MODEL: &str = "nova-2";

/// Handshake deadline.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters, fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub connect_timeout: Duration,
}

impl StreamConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Inbound events surfaced to the session.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Transcript(TranscriptEvent),
    /// Transport-level failure; emitted at most once, the state is `Failed`.
    Error(String),
    /// The connection ended, either by `stop()` or by the remote side.
    Closed,
}

enum Outbound {
    Audio(Vec<u8>),
    Close,
}

/// Client half of the duplex recognition stream.
///
/// `send` and `stop` are callable from any thread; the WebSocket itself is
/// driven by two spawned tasks (writer and reader) bridged over channels so
/// neither the audio callback nor the session loop ever blocks on I/O.
pub struct StreamClient {
    state: Arc<Mutex<ConnectionState>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl StreamClient {
    /// Open the connection, authenticate, and start the I/O tasks.
    ///
    /// The credential is presented at handshake time via the WebSocket
    /// subprotocol header. Fails with [`StreamError::MissingCredential`] if
    /// no key is configured, [`StreamError::ConnectTimeout`] if the
    /// handshake does not complete within the configured deadline, and
    /// [`StreamError::Connect`] on transport failure.
    pub async fn connect(
        config: StreamConfig,
    ) -> crate::Result<(Self, mpsc::UnboundedReceiver<StreamEvent>)> {
        if config.api_key.trim().is_empty() {
            return Err(StreamError::MissingCredential);
        }

        let mut url =
            Url::parse(&config.url).map_err(|e| StreamError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("encoding", "linear16")
            .append_pair("sample_rate", "16000")
            .append_pair("channels", "1")
            .append_pair("interim_results", "true")
            .append_pair("punctuate", "true")
            .append_pair("smart_format", "true")
            .append_pair("model", &config.model);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| StreamError::InvalidUrl(e.to_string()))?;
        let protocol = format!("token, {}", config.api_key.trim());
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(&protocol)
                .map_err(|_| StreamError::MissingCredential)?,
        );

        let state = Arc::new(Mutex::new(ConnectionState::Connecting));
        tracing::info!(url = %config.url, model = %config.model, "connecting to recognition service");

        let ws = match timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await
        {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                set_state(&state, ConnectionState::Failed);
                return Err(StreamError::Connect(e.to_string()));
            }
            Err(_) => {
                set_state(&state, ConnectionState::Failed);
                return Err(StreamError::ConnectTimeout(config.connect_timeout));
            }
        };

        set_state(&state, ConnectionState::Open);
        tracing::info!("recognition stream open");

        let (mut write, mut read) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<StreamEvent>();

        // Writer: encoded audio frames out, close frame on stop().
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let result = match msg {
                    Outbound::Audio(frame) => write.send(Message::Binary(frame)).await,
                    Outbound::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    tracing::debug!("outbound send failed: {e}");
                    break;
                }
            }
        });

        // Reader: transcript events in, exactly one terminal event out.
        let reader_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_transcript(&text) {
                            if events_tx.send(StreamEvent::Transcript(event)).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        set_state(&reader_state, ConnectionState::Closed);
                        let _ = events_tx.send(StreamEvent::Closed);
                        break;
                    }
                    Some(Ok(_)) => {} // binary/ping/pong are not transcript carriers
                    Some(Err(e)) => {
                        let closing = {
                            let mut state = reader_state
                                .lock()
                                .expect("connection state mutex poisoned");
                            if state.is_terminal() || *state == ConnectionState::Closing {
                                *state = ConnectionState::Closed;
                                true
                            } else {
                                *state = ConnectionState::Failed;
                                false
                            }
                        };
                        if closing {
                            // Errors racing our own close are not failures.
                            let _ = events_tx.send(StreamEvent::Closed);
                        } else {
                            tracing::error!("recognition stream error: {e}");
                            let _ = events_tx.send(StreamEvent::Error(e.to_string()));
                        }
                        break;
                    }
                }
            }
            tracing::debug!("recognition reader task finished");
        });

        Ok((
            Self {
                state,
                outbound: outbound_tx,
            },
            events_rx,
        ))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("connection state mutex poisoned")
    }

    /// Queue one encoded PCM frame for transmission.
    ///
    /// Fire-and-forget: when the connection is not `Open` the frame is
    /// silently dropped. Transient audio loss is preferred over failing the
    /// capture path.
    pub fn send(&self, frame: Vec<u8>) {
        if self.state() != ConnectionState::Open {
            return;
        }
        let _ = self.outbound.send(Outbound::Audio(frame));
    }

    /// Begin an orderly shutdown. Idempotent, never fails.
    ///
    /// Transitions `Open -> Closing`; the reader observes the close
    /// handshake and settles the state at `Closed`.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("connection state mutex poisoned");
        if matches!(*state, ConnectionState::Open | ConnectionState::Connecting) {
            *state = ConnectionState::Closing;
            let _ = self.outbound.send(Outbound::Close);
            tracing::info!("recognition stream closing");
        }
    }

    #[cfg(test)]
    fn detached(state: ConnectionState) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(state)),
                outbound: tx,
            },
            rx,
        )
    }
}

fn set_state(state: &Arc<Mutex<ConnectionState>>, to: ConnectionState) {
    let mut state = state.lock().expect("connection state mutex poisoned");
    let from = *state;
    tracing::debug!(?from, ?to, "connection state transition");
    *state = to;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fake-server accept that grants the `token` subprotocol the client
    /// requests; tungstenite rejects handshakes where it is not echoed.
    async fn accept_with_token_subprotocol(
        socket: tokio::net::TcpStream,
    ) -> tokio_tungstenite::WebSocketStream<tokio::net::TcpStream> {
        use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
        tokio_tungstenite::accept_hdr_async(socket, |_req: &Request, mut resp: Response| {
            resp.headers_mut().insert(
                "Sec-WebSocket-Protocol",
                HeaderValue::from_static("token"),
            );
            Ok(resp)
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_send_outside_open_is_silent_noop() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Closing,
            ConnectionState::Closed,
            ConnectionState::Failed,
        ] {
            let (client, mut rx) = StreamClient::detached(state);
            client.send(vec![0, 1, 2, 3]);
            assert!(rx.try_recv().is_err(), "frame leaked in state {state:?}");
        }
    }

    #[test]
    fn test_send_while_open_queues_frame() {
        let (client, mut rx) = StreamClient::detached(ConnectionState::Open);
        client.send(vec![0xAA, 0xBB]);
        match rx.try_recv() {
            Ok(Outbound::Audio(frame)) => assert_eq!(frame, vec![0xAA, 0xBB]),
            _ => panic!("expected queued audio frame"),
        }
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (client, mut rx) = StreamClient::detached(ConnectionState::Open);
        client.stop();
        client.stop();
        assert_eq!(client.state(), ConnectionState::Closing);
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
        assert!(rx.try_recv().is_err(), "second stop must not queue again");
    }

    #[tokio::test]
    async fn test_missing_credential_rejected_before_io() {
        let config = StreamConfig::new("   ");
        match StreamClient::connect(config).await {
            Err(StreamError::MissingCredential) => {}
            Err(e) => panic!("expected MissingCredential, got {e}"),
            Ok(_) => panic!("connect must reject a blank credential"),
        }
    }

    #[tokio::test]
    async fn test_connect_times_out_when_handshake_never_completes() {
        // A listener that accepts TCP but never answers the upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _socket = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let mut config = StreamConfig::new("test-key");
        config.url = format!("ws://{addr}");
        config.connect_timeout = Duration::from_millis(200);

        match StreamClient::connect(config).await {
            Err(StreamError::ConnectTimeout(_)) => {}
            Err(e) => panic!("expected ConnectTimeout, got {e}"),
            Ok(_) => panic!("handshake cannot have completed"),
        }
    }

    #[tokio::test]
    async fn test_connect_refused_maps_to_connect_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = StreamConfig::new("test-key");
        config.url = format!("ws://{addr}");

        match StreamClient::connect(config).await {
            Err(StreamError::Connect(_)) => {}
            Err(e) => panic!("expected Connect error, got {e}"),
            Ok(_) => panic!("nothing was listening on that port"),
        }
    }

    #[tokio::test]
    async fn test_inbound_messages_become_events_and_close_settles_state() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_with_token_subprotocol(socket).await;

            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Text(
                r#"{"channel":{"alternatives":[{"transcript":"   "}]},"is_final":true}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text(
                r#"{"channel":{"alternatives":[{"transcript":"hello there"}]},"is_final":true}"#
                    .into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Close(None)).await.unwrap();
        });

        let mut config = StreamConfig::new("test-key");
        config.url = format!("ws://{addr}");
        let (client, mut events) = StreamClient::connect(config).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Open);

        // Only the non-blank, well-formed message produces an event.
        match events.recv().await {
            Some(StreamEvent::Transcript(event)) => {
                assert_eq!(event.text, "hello there");
                assert!(event.is_final);
            }
            other => panic!("expected transcript event, got {other:?}"),
        }
        match events.recv().await {
            Some(StreamEvent::Closed) => {}
            other => panic!("expected Closed, got {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Closed);

        // Terminal state: further sends are silent no-ops.
        client.send(vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_transport_error_while_open_fails_the_stream_once() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_with_token_subprotocol(socket).await;
            // Bytes that can never be a valid frame header (reserved bits
            // and opcode all set) force a protocol error on the client.
            ws.get_mut().write_all(&[0xFF; 8]).await.unwrap();
            ws.get_mut().flush().await.unwrap();
            // Keep the socket open so the client sees the bad frame, not a
            // connection reset.
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut config = StreamConfig::new("test-key");
        config.url = format!("ws://{addr}");
        let (client, mut events) = StreamClient::connect(config).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Open);

        // Exactly one error event, then nothing.
        match events.recv().await {
            Some(StreamEvent::Error(_)) => {}
            other => panic!("expected Error event, got {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Failed);
        assert!(events.recv().await.is_none());

        // A subsequent send is a silent no-op.
        client.send(vec![0; 8]);
    }
}
