//! Persistent duplex-channel sinks
//!
//! Two variants share one connection state machine: the raw sink writes each
//! record as a single text frame, the multiplexed sink wraps every frame in a
//! named event envelope on a shared channel.
//!
//! State machine: `Connecting -> Open -> Closed`. A closed channel reconnects
//! after `reconnect_delay_ms` while `auto_reconnect` is set and the sink has
//! not been shut down; shutdown is the one irreversible transition. Records
//! delivered while the channel is not open are dropped silently — telemetry
//! is best-effort, never required for playback correctness.

use super::{Sink, SinkHooks};
use crate::types::{DuplexOptions, SinkState};
use crate::{Error, Result, TelemetryRecord};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

/// Outgoing frame queue depth per connection
const FRAME_QUEUE_DEPTH: usize = 64;

/// Notifications surfaced by a transport connection
#[derive(Debug)]
pub enum TransportEvent {
    /// Peer closed the channel; reason attached when the transport knows it
    Closed { reason: Option<String> },
    /// Transport-level failure
    Error(Error),
}

/// One live connection, normalized to channels
///
/// Frames go out through `sender`; close and error notifications come back
/// through `events`. Dropping `sender` asks the transport to close cleanly.
pub struct DuplexChannel {
    pub sender: mpsc::Sender<String>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Connection factory for duplex sinks
///
/// The production implementation dials a WebSocket URL. Adopting an existing
/// connection means implementing this trait around the already-open handle.
#[async_trait]
pub trait DuplexTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<DuplexChannel>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport backed by `tokio-tungstenite`
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl DuplexTransport for WsTransport {
    async fn connect(&self) -> Result<DuplexChannel> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::DuplexConnect(e.to_string()))?;
        let (mut write, read) = ws.split();

        let (frame_tx, mut frame_rx) = mpsc::channel::<String>(FRAME_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(8);

        // Writer half: drains outgoing frames, sends a close frame once the
        // sink drops its sender.
        let write_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if let Err(e) = write.send(Message::text(frame)).await {
                    let _ = write_events
                        .send(TransportEvent::Error(Error::DuplexSend(e.to_string())))
                        .await;
                    return;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        // Reader half: watches for the peer closing the channel. Inbound
        // payloads and ping/pong are not this sink's concern.
        tokio::spawn(read_loop(read, event_tx));

        Ok(DuplexChannel {
            sender: frame_tx,
            events: event_rx,
        })
    }
}

async fn read_loop(
    mut read: futures::stream::SplitStream<WsStream>,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Close(frame)) => {
                let reason = frame.map(|f| f.reason.to_string());
                let _ = event_tx.send(TransportEvent::Closed { reason }).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = event_tx
                    .send(TransportEvent::Error(Error::DuplexClosed {
                        reason: e.to_string(),
                    }))
                    .await;
                return;
            }
        }
    }
    let _ = event_tx.send(TransportEvent::Closed { reason: None }).await;
}

/// Frame layout for outgoing records
enum Framing {
    /// Serialized payload is the whole frame
    Raw,
    /// Named event envelope on a shared channel
    Event(String),
}

/// Persistent-channel sink; construct with [`DuplexSink::raw`] or
/// [`DuplexSink::multiplexed`].
///
/// Spawns its supervisor task at construction, so a Tokio runtime must be
/// current.
pub struct DuplexSink {
    kind: &'static str,
    framing: Framing,
    hooks: SinkHooks,
    frame_tx: mpsc::Sender<String>,
    state_rx: watch::Receiver<SinkState>,
    shutdown_tx: watch::Sender<bool>,
    destroyed: Arc<AtomicBool>,
}

impl DuplexSink {
    /// Raw duplex sink: one serialized record per frame
    pub fn raw(
        transport: Arc<dyn DuplexTransport>,
        options: DuplexOptions,
        hooks: SinkHooks,
    ) -> Self {
        Self::spawn("duplex", Framing::Raw, transport, options, hooks)
    }

    /// Event-multiplexed duplex sink: frames wrapped in a named envelope
    pub fn multiplexed(
        transport: Arc<dyn DuplexTransport>,
        event_name: impl Into<String>,
        options: DuplexOptions,
        hooks: SinkHooks,
    ) -> Self {
        Self::spawn(
            "multiplex",
            Framing::Event(event_name.into()),
            transport,
            options,
            hooks,
        )
    }

    /// Current channel state
    pub fn state(&self) -> SinkState {
        *self.state_rx.borrow()
    }

    fn spawn(
        kind: &'static str,
        framing: Framing,
        transport: Arc<dyn DuplexTransport>,
        options: DuplexOptions,
        hooks: SinkHooks,
    ) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (state_tx, state_rx) = watch::channel(SinkState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let destroyed = Arc::new(AtomicBool::new(false));

        let supervisor = Supervisor {
            kind,
            transport,
            options,
            hooks: hooks.clone(),
            state: state_tx,
            shutdown: shutdown_rx,
            destroyed: destroyed.clone(),
        };
        tokio::spawn(supervisor.run(frame_rx));

        Self {
            kind,
            framing,
            hooks,
            frame_tx,
            state_rx,
            shutdown_tx,
            destroyed,
        }
    }

    fn frame(&self, payload: &Value) -> Result<String> {
        match &self.framing {
            Framing::Raw => Ok(serde_json::to_string(payload)?),
            Framing::Event(name) => Ok(serde_json::to_string(&serde_json::json!({
                "event": name,
                "data": payload,
            }))?),
        }
    }
}

impl Sink for DuplexSink {
    fn name(&self) -> &'static str {
        self.kind
    }

    fn deliver(&self, record: &TelemetryRecord) {
        if self.destroyed.load(Ordering::SeqCst) || self.state() != SinkState::Open {
            debug!(
                sink = self.kind,
                event_type = %record.event_type,
                "Channel not open, dropping record"
            );
            return;
        }

        let payload = match self.hooks.encode_value(record) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    sink = self.kind,
                    error = %err,
                    event_type = %record.event_type,
                    "Dropping record: transform failed"
                );
                self.hooks.emit_error(&err);
                return;
            }
        };

        let frame = match self.frame(&payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(sink = self.kind, error = %err, "Dropping record: framing failed");
                self.hooks.emit_error(&err);
                return;
            }
        };

        if self.frame_tx.try_send(frame).is_err() {
            debug!(sink = self.kind, "Outgoing queue full, dropping record");
        }
    }

    fn shutdown(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(sink = self.kind, "Shutting down");
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for DuplexSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owns the connection lifecycle and the reconnect timer for one duplex sink
struct Supervisor {
    kind: &'static str,
    transport: Arc<dyn DuplexTransport>,
    options: DuplexOptions,
    hooks: SinkHooks,
    state: watch::Sender<SinkState>,
    shutdown: watch::Receiver<bool>,
    destroyed: Arc<AtomicBool>,
}

impl Supervisor {
    async fn run(mut self, mut frame_rx: mpsc::Receiver<String>) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let _ = self.state.send(SinkState::Connecting);

            match self.transport.connect().await {
                Ok(channel) => {
                    if *self.shutdown.borrow() {
                        // Shutdown raced the dial; drop the fresh connection.
                        break;
                    }
                    info!(sink = self.kind, "Channel open");
                    let _ = self.state.send(SinkState::Open);
                    self.hooks.emit_open();
                    self.pump(channel, &mut frame_rx).await;
                }
                Err(err) => {
                    warn!(sink = self.kind, error = %err, "Connect failed");
                    self.hooks.emit_error(&err);
                }
            }

            let _ = self.state.send(SinkState::Closed);
            if *self.shutdown.borrow() || !self.options.auto_reconnect {
                break;
            }

            debug!(
                sink = self.kind,
                delay_ms = self.options.reconnect_delay_ms,
                "Scheduling reconnect"
            );
            let delay = Duration::from_millis(self.options.reconnect_delay_ms);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {}
            }
            // The timer may race an in-flight shutdown; re-check before dialing.
            if self.destroyed.load(Ordering::SeqCst) || *self.shutdown.borrow() {
                break;
            }
        }

        let _ = self.state.send(SinkState::Closed);
        debug!(sink = self.kind, "Supervisor stopped");
    }

    /// Forward frames until the channel dies or shutdown is requested
    async fn pump(&mut self, mut channel: DuplexChannel, frame_rx: &mut mpsc::Receiver<String>) {
        let Supervisor {
            kind,
            hooks,
            shutdown,
            ..
        } = self;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    // Dropping the channel lets the transport close cleanly.
                    hooks.emit_close(Some("shutdown"));
                    return;
                }
                event = channel.events.recv() => {
                    match event {
                        Some(TransportEvent::Closed { reason }) => {
                            info!(
                                sink = *kind,
                                reason = reason.as_deref().unwrap_or("none"),
                                "Channel closed"
                            );
                            hooks.emit_close(reason.as_deref());
                        }
                        Some(TransportEvent::Error(err)) => {
                            warn!(sink = *kind, error = %err, "Channel error");
                            hooks.emit_error(&err);
                        }
                        None => {
                            debug!(sink = *kind, "Transport event stream ended");
                            hooks.emit_close(None);
                        }
                    }
                    return;
                }
                frame = frame_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if channel.sender.send(frame).await.is_err() {
                                warn!(sink = *kind, "Writer gone, channel closed");
                                hooks.emit_close(None);
                                return;
                            }
                        }
                        // Sink handle dropped; nothing left to forward.
                        None => return,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;
    use serde_json::Map;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn record(event_type: &str) -> TelemetryRecord {
        TelemetryRecord {
            event_type: event_type.to_string(),
            timestamp: 42,
            session_id: SessionId::from("s".to_string()),
            video_id: None,
            user_id: None,
            data: Map::new(),
        }
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    /// Transport that stays open and captures every frame
    struct CaptureTransport {
        attempts: Arc<AtomicUsize>,
        frames: Arc<Mutex<Vec<String>>>,
    }

    impl CaptureTransport {
        fn new() -> Self {
            Self {
                attempts: Arc::new(AtomicUsize::new(0)),
                frames: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DuplexTransport for CaptureTransport {
        async fn connect(&self) -> Result<DuplexChannel> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (frame_tx, mut frame_rx) = mpsc::channel(16);
            let (event_tx, event_rx) = mpsc::channel(4);
            let frames = self.frames.clone();
            tokio::spawn(async move {
                // Holding the sender keeps the connection "open".
                let _keep_open = event_tx;
                while let Some(frame) = frame_rx.recv().await {
                    frames.lock().unwrap().push(frame);
                }
            });
            Ok(DuplexChannel {
                sender: frame_tx,
                events: event_rx,
            })
        }
    }

    #[tokio::test]
    async fn test_raw_framing_is_serialized_record() {
        let transport = Arc::new(CaptureTransport::new());
        let frames = transport.frames.clone();
        let sink = DuplexSink::raw(
            transport,
            DuplexOptions::default(),
            SinkHooks::new(),
        );
        settle().await;
        assert_eq!(sink.state(), SinkState::Open);

        sink.deliver(&record("play"));
        settle().await;

        let frames = frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        let value: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["event_type"], "play");
        assert_eq!(value["session_id"], "s");
    }

    #[tokio::test]
    async fn test_multiplexed_framing_wraps_envelope() {
        let transport = Arc::new(CaptureTransport::new());
        let frames = transport.frames.clone();
        let sink = DuplexSink::multiplexed(
            transport,
            "analytics",
            DuplexOptions::default(),
            SinkHooks::new(),
        );
        settle().await;

        sink.deliver(&record("seeked"));
        settle().await;

        let frames = frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        let value: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["event"], "analytics");
        assert_eq!(value["data"]["event_type"], "seeked");
    }

    #[tokio::test]
    async fn test_delivery_after_shutdown_dropped() {
        let transport = Arc::new(CaptureTransport::new());
        let frames = transport.frames.clone();
        let sink = DuplexSink::raw(
            transport,
            DuplexOptions::default(),
            SinkHooks::new(),
        );
        settle().await;

        sink.shutdown();
        settle().await;
        assert_eq!(sink.state(), SinkState::Closed);

        sink.deliver(&record("pause"));
        settle().await;
        assert!(frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transform_error_drops_record_only() {
        let transport = Arc::new(CaptureTransport::new());
        let frames = transport.frames.clone();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_hook = errors.clone();
        let hooks = SinkHooks::new()
            .with_transform(|r| {
                if r.event_type == "poison" {
                    anyhow::bail!("unserializable");
                }
                Ok(serde_json::json!({ "t": r.event_type }))
            })
            .with_on_error(move |err| {
                errors_hook.lock().unwrap().push(err.error_code());
            });

        let sink = DuplexSink::raw(transport, DuplexOptions::default(), hooks);
        settle().await;

        sink.deliver(&record("poison"));
        sink.deliver(&record("play"));
        settle().await;

        let frames = frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], r#"{"t":"play"}"#);
        assert_eq!(errors.lock().unwrap().as_slice(), &["TRANSFORM"]);
    }
}
