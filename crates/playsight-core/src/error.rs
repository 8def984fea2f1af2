//! Error types for Playsight Core

use thiserror::Error;

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Telemetry error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Delivery errors
    #[error("Record delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("Endpoint rejected record: status {status}")]
    EndpointStatus { status: u16 },

    // Duplex channel errors
    #[error("Duplex connect failed: {0}")]
    DuplexConnect(String),

    #[error("Duplex send failed: {0}")]
    DuplexSend(String),

    #[error("Duplex channel closed: {reason}")]
    DuplexClosed { reason: String },

    // Record errors
    #[error("Record transform failed: {0}")]
    Transform(anyhow::Error),

    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Delivery(_)
                | Error::EndpointStatus { .. }
                | Error::DuplexConnect(_)
                | Error::DuplexSend(_)
                | Error::DuplexClosed { .. }
        )
    }

    /// Returns the error code carried in telemetry and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Delivery(_) => "DELIVERY",
            Error::EndpointStatus { .. } => "ENDPOINT_STATUS",
            Error::DuplexConnect(_) => "DUPLEX_CONNECT",
            Error::DuplexSend(_) => "DUPLEX_SEND",
            Error::DuplexClosed { .. } => "DUPLEX_CLOSED",
            Error::Transform(_) => "TRANSFORM",
            Error::Serialization(_) => "SERIALIZATION",
        }
    }
}
