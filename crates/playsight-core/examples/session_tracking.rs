//! Session tracking example
//!
//! Simulates a short playback session against an in-memory sink and prints
//! the derived QoE metrics.
//!
//! Run with: cargo run --example session_tracking

use playsight_core::{events, MemorySink, Tracker, TrackerConfig};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

fn payload(value: Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}

#[tokio::main]
async fn main() -> playsight_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playsight_core=debug".into()),
        )
        .init();

    playsight_core::init();

    let memory = MemorySink::new();
    let config = TrackerConfig {
        video_id: Some("demo-video".to_string()),
        ..TrackerConfig::default()
    };
    let tracker = Tracker::builder(config)
        .sink(Arc::new(memory.clone()))
        .build()?;

    println!("=== Session {} ===\n", tracker.session_id());

    tracker.track(events::PLAY, payload(json!({ "position": 0.0 })));
    tokio::time::sleep(Duration::from_millis(120)).await;

    tracker.track(events::BUFFERING_START, payload(json!({ "position": 4.2 })));
    tokio::time::sleep(Duration::from_millis(40)).await;
    tracker.track(events::BUFFERING_END, payload(json!({ "position": 4.2 })));

    tracker.track(events::SEEKED, payload(json!({ "from": 4.2, "to": 60.0 })));
    tokio::time::sleep(Duration::from_millis(80)).await;
    tracker.track(events::PAUSE, payload(json!({ "position": 61.5 })));

    let metrics = tracker.metrics();
    println!("Play time:       {} ms", metrics.total_play_time_ms);
    println!("Buffer time:     {} ms", metrics.total_buffer_time_ms);
    println!("Buffering ratio: {}", metrics.buffering_ratio);
    println!("Rebuffers:       {}", metrics.rebuffer_count);
    println!("Seeks:           {}", metrics.seek_count);
    println!("Events:          {}", metrics.event_count);

    tracker.destroy();

    println!("\n=== Delivered records ===");
    for record in memory.records() {
        println!("{:>20} @ {}", record.event_type, record.timestamp);
    }

    Ok(())
}
