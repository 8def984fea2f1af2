//! Core types for Playsight

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

/// Lifecycle event types the accumulator special-cases.
///
/// The tracked vocabulary is open-ended; anything not listed here passes
/// through as an opaque record.
pub mod events {
    pub const PLAY: &str = "play";
    pub const PAUSE: &str = "pause";
    pub const ENDED: &str = "ended";
    pub const BUFFERING_START: &str = "buffering_start";
    pub const BUFFERING_END: &str = "buffering_end";
    pub const SEEKED: &str = "seeked";

    /// Synthetic record emitted when a tracker is constructed
    pub const SESSION_START: &str = "session_start";
    /// Synthetic record emitted when a tracker is destroyed
    pub const SESSION_END: &str = "session_end";
}

/// Unique identifier for a tracking session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::generate()
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and timing anchor for one session
///
/// Created once at tracker construction; immutable afterwards. Every outbound
/// record carries its identity fields.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Opaque session identifier, adopted from config or generated
    pub session_id: SessionId,
    /// Monotonic construction instant
    pub started_at: Instant,
    /// User identity, if the caller supplied one
    pub user_id: Option<String>,
    /// Content identity, if the caller supplied one
    pub video_id: Option<String>,
}

impl SessionContext {
    /// Milliseconds elapsed since construction, on the monotonic clock
    pub fn session_duration_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// One immutable telemetry record, produced per tracked event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Event type from the open vocabulary
    pub event_type: String,
    /// Wall-clock timestamp in milliseconds
    pub timestamp: i64,
    /// Session identifier
    pub session_id: SessionId,
    /// Content identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// User identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Caller payload merged with the metric snapshot
    pub data: Map<String, Value>,
}

/// Delivery channel connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkState {
    /// Dialing the remote channel
    Connecting,
    /// Channel is writable
    Open,
    /// Channel is down; terminal once the sink is shut down
    Closed,
}

impl std::fmt::Display for SinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkState::Connecting => write!(f, "connecting"),
            SinkState::Open => write!(f, "open"),
            SinkState::Closed => write!(f, "closed"),
        }
    }
}

/// Display dimensions reported in the session context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Network characteristics the caller can observe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Estimated bandwidth in bps
    pub bandwidth_estimate: u64,
    /// RTT in milliseconds
    pub rtt_ms: u32,
    /// Connection type (if known)
    pub connection_type: Option<ConnectionType>,
    /// Is connection metered
    pub metered: bool,
}

/// Connection type for network context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    Ethernet,
    Wifi,
    Cellular4G,
    Cellular5G,
    Cellular3G,
    Unknown,
}

/// Environment context attached to the synthetic `session_start` record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Operating system name
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// Playsight library version
    pub library_version: String,
    /// Locale, when observable from the environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Caller-observable display dimensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Resolution>,
    /// Caller-observable network characteristics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,
}

impl EnvironmentInfo {
    /// Gather what the process can observe on its own
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            locale: std::env::var("LANG").ok().filter(|l| !l.is_empty()),
            viewport: None,
            network: None,
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Enable tracking
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// HTTP collection endpoint for the request sink
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// Adopt an existing session ID instead of generating one
    #[serde(default)]
    pub session_id: Option<String>,
    /// User identity carried on every record
    #[serde(default)]
    pub user_id: Option<String>,
    /// Content identity carried on every record
    #[serde(default)]
    pub video_id: Option<String>,
    /// Persistent-channel sink selection (at most one)
    #[serde(default)]
    pub transport: Option<DuplexConfig>,
    /// Display dimensions for the session context
    #[serde(default)]
    pub viewport: Option<Resolution>,
    /// Network characteristics for the session context
    #[serde(default)]
    pub network: Option<NetworkInfo>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            session_id: None,
            user_id: None,
            video_id: None,
            transport: None,
            viewport: None,
            network: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Persistent duplex-channel sink selection
///
/// Tagged by transport kind; an unrecognized kind is a configuration error at
/// deserialization time, never a silent default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplexConfig {
    /// Raw persistent channel: one serialized record per frame
    Raw {
        url: Url,
        #[serde(default)]
        options: DuplexOptions,
    },
    /// Event-multiplexed channel: frames wrapped in a named event envelope
    Multiplexed {
        url: Url,
        /// Event name records are published under
        #[serde(default = "default_event_name")]
        event_name: String,
        #[serde(default)]
        options: DuplexOptions,
    },
}

/// Default event name for the multiplexed duplex sink
pub const DEFAULT_EVENT_NAME: &str = "analytics";

fn default_event_name() -> String {
    DEFAULT_EVENT_NAME.to_string()
}

/// Reconnection behavior for duplex sinks
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DuplexOptions {
    /// Reconnect automatically after the channel closes
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// Delay before a reconnect attempt, in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for DuplexOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_delay_ms: 3000,
        }
    }
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

/// Session metrics surface returned by `Tracker::metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerMetrics {
    pub session_id: SessionId,
    pub session_duration_ms: u64,
    pub total_play_time_ms: u64,
    pub total_buffer_time_ms: u64,
    pub buffering_ratio: f64,
    pub rebuffer_count: u32,
    pub seek_count: u32,
    pub event_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_adopted() {
        let id = SessionId::from("abc-123".to_string());
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn test_session_id_generated_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn test_config_defaults() {
        let config: TrackerConfig = serde_json::from_str("{}").unwrap();
        assert!(config.enabled);
        assert!(config.endpoint.is_none());
        assert!(config.transport.is_none());
    }

    #[test]
    fn test_duplex_config_tag_parsing() {
        let config: DuplexConfig = serde_json::from_value(serde_json::json!({
            "kind": "multiplexed",
            "url": "wss://collect.example.com/socket",
        }))
        .unwrap();

        match config {
            DuplexConfig::Multiplexed {
                event_name,
                options,
                ..
            } => {
                assert_eq!(event_name, DEFAULT_EVENT_NAME);
                assert!(options.auto_reconnect);
                assert_eq!(options.reconnect_delay_ms, 3000);
            }
            DuplexConfig::Raw { .. } => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_duplex_config_unknown_kind_rejected() {
        let result: Result<DuplexConfig, _> = serde_json::from_value(serde_json::json!({
            "kind": "carrier_pigeon",
            "url": "wss://collect.example.com/socket",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_environment_detect() {
        let env = EnvironmentInfo::detect();
        assert!(!env.os.is_empty());
        assert!(!env.arch.is_empty());
        assert_eq!(env.library_version, env!("CARGO_PKG_VERSION"));
    }
}
