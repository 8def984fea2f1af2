//! Playsight Core - Playback Telemetry Pipeline
//!
//! This crate provides session-scoped telemetry for video playback:
//! - Quality-of-Experience metric accumulation (play time, stalls, seeks)
//! - Immutable event records carrying derived metric snapshots
//! - Best-effort delivery over HTTP and persistent duplex channels
//! - Reconnection supervision with explicit-shutdown semantics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Playsight Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │     QoE      │  │    Record    │  │   Session    │           │
//! │  │ Accumulator  │  │   Builder    │  │   Context    │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Tracker   │                              │
//! │                    │   (facade)  │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │   Request    │  │    Duplex   │  │  Reconnect   │            │
//! │  │     Sink     │  │    Sinks    │  │  Supervisor  │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod metrics;
pub mod record;
pub mod sink;
pub mod tracker;
pub mod types;

pub use error::{Error, Result};
pub use metrics::{QoeAccumulator, QoeSnapshot};
pub use record::build_record;
pub use sink::duplex::{DuplexChannel, DuplexSink, DuplexTransport, TransportEvent, WsTransport};
pub use sink::request::RequestSink;
pub use sink::{MemorySink, Sink, SinkHooks};
pub use tracker::{Tracker, TrackerBuilder};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the telemetry library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Playsight Core initialized");
}
