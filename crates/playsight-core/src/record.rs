//! Telemetry record construction

use crate::metrics::QoeSnapshot;
use crate::types::{SessionContext, TelemetryRecord};
use chrono::Utc;
use serde_json::{Map, Value};

/// Build the immutable record for one tracked event.
///
/// The caller payload is shallow-merged into a fresh map and never mutated in
/// place; the metric snapshot keys win on collision. Session duration comes
/// from the snapshot, computed at build time, so successive records carry
/// non-decreasing values.
pub fn build_record(
    event_type: &str,
    payload: Option<&Map<String, Value>>,
    session: &SessionContext,
    snapshot: &QoeSnapshot,
) -> TelemetryRecord {
    let mut data = payload.cloned().unwrap_or_default();
    data.insert(
        "session_duration_ms".into(),
        snapshot.session_duration_ms.into(),
    );
    data.insert("total_play_time_ms".into(), snapshot.total_play_time_ms.into());
    data.insert(
        "total_buffer_time_ms".into(),
        snapshot.total_buffer_time_ms.into(),
    );
    data.insert("buffering_ratio".into(), snapshot.buffering_ratio.into());
    data.insert("rebuffer_count".into(), snapshot.rebuffer_count.into());
    data.insert("seek_count".into(), snapshot.seek_count.into());

    TelemetryRecord {
        event_type: event_type.to_string(),
        timestamp: Utc::now().timestamp_millis(),
        session_id: session.session_id.clone(),
        video_id: session.video_id.clone(),
        user_id: session.user_id.clone(),
        data,
    }
}
