//! Telemetry delivery channels
//!
//! Every sink is best-effort: delivery never blocks the tracking caller and
//! failures never propagate to it. Failures surface through `tracing` and the
//! optional per-sink hooks.

pub mod duplex;
pub mod request;

use crate::{Error, Result, TelemetryRecord};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Per-record transform applied by a sink before serialization
pub type TransformFn = Arc<dyn Fn(&TelemetryRecord) -> anyhow::Result<Value> + Send + Sync>;
/// Invoked when a duplex channel becomes writable
pub type OpenHook = Arc<dyn Fn() + Send + Sync>;
/// Invoked when a duplex channel closes, with the reason when known
pub type CloseHook = Arc<dyn Fn(Option<&str>) + Send + Sync>;
/// Invoked on any sink-level error
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Optional caller-supplied hooks attached to a sink
#[derive(Clone, Default)]
pub struct SinkHooks {
    pub transform: Option<TransformFn>,
    pub on_open: Option<OpenHook>,
    pub on_close: Option<CloseHook>,
    pub on_error: Option<ErrorHook>,
}

impl SinkHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outgoing payload per record. A failing transform drops
    /// that one record, never the sink.
    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&TelemetryRecord) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn with_on_open<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_open = Some(Arc::new(f));
        self
    }

    pub fn with_on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.on_close = Some(Arc::new(f));
        self
    }

    pub fn with_on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Serialize a record through the transform when one is configured
    pub(crate) fn encode_value(&self, record: &TelemetryRecord) -> Result<Value> {
        match &self.transform {
            Some(transform) => transform(record).map_err(Error::Transform),
            None => Ok(serde_json::to_value(record)?),
        }
    }

    pub(crate) fn emit_open(&self) {
        if let Some(hook) = &self.on_open {
            hook();
        }
    }

    pub(crate) fn emit_close(&self, reason: Option<&str>) {
        if let Some(hook) = &self.on_close {
            hook(reason);
        }
    }

    pub(crate) fn emit_error(&self, err: &Error) {
        if let Some(hook) = &self.on_error {
            hook(err);
        }
    }
}

impl std::fmt::Debug for SinkHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHooks")
            .field("transform", &self.transform.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// A delivery channel for telemetry records
///
/// `deliver` receives the tracker-visible record pre-transform; per-sink
/// transforms apply inside the sink. It must never block or fail toward the
/// caller. `shutdown` is idempotent and cancels any pending reconnect.
pub trait Sink: Send + Sync {
    /// Short channel name used in logs
    fn name(&self) -> &'static str;

    /// Dispatch one record, best-effort
    fn deliver(&self, record: &TelemetryRecord);

    /// Tear the sink down; terminal
    fn shutdown(&self);
}

/// In-memory sink capturing every delivered record
///
/// Test and debug tooling; clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn deliver(&self, record: &TelemetryRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
    }

    fn shutdown(&self) {}
}
