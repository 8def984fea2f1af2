//! Session tracker - facade over the telemetry pipeline
//!
//! Folds lifecycle notifications into QoE counters, builds one immutable
//! record per notification, and fans records out to every configured sink.
//! Sinks succeed or fail independently; nothing here is fatal to playback.

use crate::{
    metrics::QoeAccumulator,
    record::build_record,
    sink::{
        duplex::{DuplexSink, WsTransport},
        request::RequestSink,
        Sink, SinkHooks,
    },
    types::{
        events, DuplexConfig, EnvironmentInfo, SessionContext, SessionId, TelemetryRecord,
        TrackerConfig, TrackerMetrics,
    },
    Result,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info};

/// Telemetry facade for one playback session
///
/// Lifecycle: `Active -> Destroyed` (terminal). After [`Tracker::destroy`],
/// [`Tracker::track`] is a guaranteed no-op — the owning player may emit a
/// final lifecycle event during its own teardown race.
///
/// Constructed inside a Tokio runtime; sink delivery is dispatched to spawned
/// tasks and never awaited by the caller.
pub struct Tracker {
    session: SessionContext,
    enabled: bool,
    environment: EnvironmentInfo,
    inner: Mutex<Inner>,
    sinks: Vec<Arc<dyn Sink>>,
    destroyed: AtomicBool,
}

struct Inner {
    accumulator: QoeAccumulator,
    records: Vec<TelemetryRecord>,
}

impl Tracker {
    /// Create a tracker from configuration alone
    pub fn new(config: TrackerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Create a tracker builder for attaching hooks and custom sinks
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder {
            config,
            request_hooks: SinkHooks::new(),
            duplex_hooks: SinkHooks::new(),
            sinks: Vec::new(),
        }
    }

    fn from_builder(builder: TrackerBuilder) -> Result<Self> {
        let TrackerBuilder {
            config,
            request_hooks,
            duplex_hooks,
            mut sinks,
        } = builder;

        let session = SessionContext {
            session_id: config.session_id.map(SessionId::from).unwrap_or_default(),
            started_at: Instant::now(),
            user_id: config.user_id,
            video_id: config.video_id,
        };

        if let Some(endpoint) = config.endpoint {
            sinks.push(Arc::new(RequestSink::new(endpoint, request_hooks)?) as Arc<dyn Sink>);
        }

        if let Some(transport) = config.transport {
            let sink = match transport {
                DuplexConfig::Raw { url, options } => DuplexSink::raw(
                    Arc::new(WsTransport::new(url)),
                    options,
                    duplex_hooks,
                ),
                DuplexConfig::Multiplexed {
                    url,
                    event_name,
                    options,
                } => DuplexSink::multiplexed(
                    Arc::new(WsTransport::new(url)),
                    event_name,
                    options,
                    duplex_hooks,
                ),
            };
            sinks.push(Arc::new(sink) as Arc<dyn Sink>);
        }

        let mut environment = EnvironmentInfo::detect();
        environment.viewport = config.viewport;
        environment.network = config.network;

        let tracker = Self {
            session,
            enabled: config.enabled,
            environment,
            inner: Mutex::new(Inner {
                accumulator: QoeAccumulator::new(),
                records: Vec::new(),
            }),
            sinks,
            destroyed: AtomicBool::new(false),
        };

        info!(
            session_id = %tracker.session.session_id,
            enabled = tracker.enabled,
            sinks = tracker.sinks.len(),
            "Tracker created"
        );

        if tracker.enabled {
            let context = tracker.environment_payload();
            tracker.record(events::SESSION_START, Some(context));
        }

        Ok(tracker)
    }

    /// Session identifier
    pub fn session_id(&self) -> &SessionId {
        &self.session.session_id
    }

    /// True once `destroy` has run
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Track one lifecycle notification
    ///
    /// Total: never fails, never blocks, and a no-op once destroyed or when
    /// tracking is disabled. Sink failures never reach this caller.
    pub fn track(&self, event_type: &str, data: Option<Map<String, Value>>) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.record(event_type, data);
    }

    /// Current session metrics
    pub fn metrics(&self) -> TrackerMetrics {
        let duration = self.session.session_duration_ms();
        let inner = self.lock_inner();
        let snapshot = inner.accumulator.snapshot(duration);

        TrackerMetrics {
            session_id: self.session.session_id.clone(),
            session_duration_ms: snapshot.session_duration_ms,
            total_play_time_ms: snapshot.total_play_time_ms,
            total_buffer_time_ms: snapshot.total_buffer_time_ms,
            buffering_ratio: snapshot.buffering_ratio,
            rebuffer_count: snapshot.rebuffer_count,
            seek_count: snapshot.seek_count,
            event_count: inner.records.len(),
        }
    }

    /// Snapshot of every record tracked so far
    ///
    /// A defensive copy; mutating it never affects tracker state.
    pub fn events(&self) -> Vec<TelemetryRecord> {
        self.lock_inner().records.clone()
    }

    /// Tear the session down
    ///
    /// Emits the synthetic `session_end` record, then shuts every sink down
    /// individually so one broken sink cannot block the others. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.enabled {
            self.record(events::SESSION_END, None);
        }

        for sink in &self.sinks {
            sink.shutdown();
            debug!(sink = sink.name(), "Sink shut down");
        }

        info!(session_id = %self.session.session_id, "Tracker destroyed");
    }

    fn record(&self, event_type: &str, data: Option<Map<String, Value>>) {
        if !self.enabled {
            return;
        }

        let now_ms = self.session.session_duration_ms();
        let record = {
            let mut inner = self.lock_inner();
            inner.accumulator.fold(event_type, now_ms);
            let snapshot = inner.accumulator.snapshot(now_ms);
            let record = build_record(event_type, data.as_ref(), &self.session, &snapshot);
            inner.records.push(record.clone());
            record
        };

        debug!(
            event_type,
            session_id = %self.session.session_id,
            "Event tracked"
        );

        for sink in &self.sinks {
            sink.deliver(&record);
        }
    }

    fn environment_payload(&self) -> Map<String, Value> {
        match serde_json::to_value(&self.environment) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Builder attaching per-sink hooks and custom sinks to a [`Tracker`]
pub struct TrackerBuilder {
    config: TrackerConfig,
    request_hooks: SinkHooks,
    duplex_hooks: SinkHooks,
    sinks: Vec<Arc<dyn Sink>>,
}

impl TrackerBuilder {
    /// Hooks for the HTTP request sink
    pub fn request_hooks(mut self, hooks: SinkHooks) -> Self {
        self.request_hooks = hooks;
        self
    }

    /// Hooks for the configured duplex sink
    pub fn duplex_hooks(mut self, hooks: SinkHooks) -> Self {
        self.duplex_hooks = hooks;
        self
    }

    /// Attach an additional, already-constructed sink
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Result<Tracker> {
        Tracker::from_builder(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[tokio::test]
    async fn test_session_start_emitted() {
        let tracker = Tracker::new(TrackerConfig::default()).unwrap();

        let records = tracker.events();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, events::SESSION_START);
        assert!(records[0].data.contains_key("os"));
        assert!(records[0].data.contains_key("session_duration_ms"));
    }

    #[tokio::test]
    async fn test_disabled_tracker_records_nothing() {
        let config = TrackerConfig {
            enabled: false,
            ..TrackerConfig::default()
        };
        let tracker = Tracker::new(config).unwrap();

        tracker.track("play", None);
        tracker.track("pause", None);

        assert!(tracker.events().is_empty());
        assert_eq!(tracker.metrics().event_count, 0);
    }

    #[tokio::test]
    async fn test_adopted_session_id() {
        let config = TrackerConfig {
            session_id: Some("external-7".to_string()),
            ..TrackerConfig::default()
        };
        let tracker = Tracker::new(config).unwrap();

        assert_eq!(tracker.session_id().as_str(), "external-7");
        assert_eq!(tracker.events()[0].session_id.as_str(), "external-7");
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_terminal() {
        let memory = MemorySink::new();
        let tracker = Tracker::builder(TrackerConfig::default())
            .sink(Arc::new(memory.clone()))
            .build()
            .unwrap();

        tracker.track("play", None);
        tracker.destroy();
        tracker.destroy();

        let count = memory.len();
        // session_start + play + one session_end
        assert_eq!(count, 3);
        assert!(tracker.is_destroyed());

        tracker.track("pause", None);
        tracker.track("seeked", None);
        assert_eq!(memory.len(), count);
        assert_eq!(tracker.events().len(), count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_duration_non_decreasing() {
        let tracker = Tracker::new(TrackerConfig::default()).unwrap();

        tracker.track("heartbeat", None);
        tokio::time::advance(std::time::Duration::from_millis(250)).await;
        tracker.track("heartbeat", None);

        let records = tracker.events();
        let durations: Vec<u64> = records
            .iter()
            .map(|r| r.data["session_duration_ms"].as_u64().unwrap())
            .collect();
        assert!(durations.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(durations.last(), Some(&250));
    }
}
