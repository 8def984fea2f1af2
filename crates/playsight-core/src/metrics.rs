//! Quality-of-Experience metric accumulation
//!
//! Pure state machine folding lifecycle notifications into running counters.
//! No I/O; owned by the tracker and mutated only through `fold`.

use crate::types::events;
use serde::{Deserialize, Serialize};

/// Running QoE counters for one session
#[derive(Debug, Clone, Default)]
pub struct QoeAccumulator {
    total_play_time_ms: u64,
    total_buffer_time_ms: u64,
    rebuffer_count: u32,
    seek_count: u32,
    /// Set while playback runs; consumed by the next pause/ended
    playback_resumed_at: Option<u64>,
    /// Set while a stall runs; consumed by the next buffering_end
    buffering_started_at: Option<u64>,
}

impl QoeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one notification at a monotonic timestamp (milliseconds).
    ///
    /// Total: never fails, and a closing event with no matching open marker is
    /// a no-op. Rebuffer count follows starts, not resolutions — a session
    /// that ends mid-stall still reports the attempt, and a redundant start
    /// counts again.
    pub fn fold(&mut self, event_type: &str, now_ms: u64) {
        match event_type {
            events::PLAY => {
                self.playback_resumed_at = Some(now_ms);
            }
            events::PAUSE | events::ENDED => {
                if let Some(resumed) = self.playback_resumed_at.take() {
                    self.total_play_time_ms += now_ms.saturating_sub(resumed);
                }
            }
            events::BUFFERING_START => {
                self.rebuffer_count += 1;
                self.buffering_started_at = Some(now_ms);
            }
            events::BUFFERING_END => {
                if let Some(started) = self.buffering_started_at.take() {
                    self.total_buffer_time_ms += now_ms.saturating_sub(started);
                }
            }
            events::SEEKED => {
                self.seek_count += 1;
            }
            // Open vocabulary: everything else is an opaque record
            _ => {}
        }
    }

    /// Derived metric snapshot at the given session duration
    pub fn snapshot(&self, session_duration_ms: u64) -> QoeSnapshot {
        QoeSnapshot {
            session_duration_ms,
            total_play_time_ms: self.total_play_time_ms,
            total_buffer_time_ms: self.total_buffer_time_ms,
            buffering_ratio: self.buffering_ratio(),
            rebuffer_count: self.rebuffer_count,
            seek_count: self.seek_count,
        }
    }

    /// Stall-to-play ratio, exactly `0` until any play time accrues.
    /// Rounded to three decimal places.
    fn buffering_ratio(&self) -> f64 {
        if self.total_play_time_ms == 0 {
            return 0.0;
        }
        let raw = self.total_buffer_time_ms as f64 / self.total_play_time_ms as f64;
        (raw * 1000.0).round() / 1000.0
    }
}

/// Point-in-time view of the accumulated metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QoeSnapshot {
    pub session_duration_ms: u64,
    pub total_play_time_ms: u64,
    pub total_buffer_time_ms: u64,
    pub buffering_ratio: f64,
    pub rebuffer_count: u32,
    pub seek_count: u32,
}
