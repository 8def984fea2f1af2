//! Fire-and-forget HTTP delivery
//!
//! One POST per record, dispatched on a spawned task and never awaited by the
//! tracking caller. Failures are logged and swallowed; retries, if desired,
//! are the endpoint's or caller's responsibility.

use super::{Sink, SinkHooks};
use crate::{Error, Result, TelemetryRecord};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP request sink posting JSON-serialized records
pub struct RequestSink {
    client: Client,
    endpoint: Url,
    hooks: SinkHooks,
}

impl RequestSink {
    pub fn new(endpoint: Url, hooks: SinkHooks) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            hooks,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Sink for RequestSink {
    fn name(&self) -> &'static str {
        "request"
    }

    fn deliver(&self, record: &TelemetryRecord) {
        let payload = match self.hooks.encode_value(record) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, event_type = %record.event_type, "Dropping record: transform failed");
                self.hooks.emit_error(&err);
                return;
            }
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, dropping record");
            return;
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let hooks = self.hooks.clone();
        let event_type = record.event_type.clone();

        handle.spawn(async move {
            match client.post(endpoint).json(&payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!(event_type = %event_type, status = status.as_u16(), "Record delivered");
                    } else {
                        let err = Error::EndpointStatus {
                            status: status.as_u16(),
                        };
                        warn!(
                            event_type = %event_type,
                            status = status.as_u16(),
                            "Endpoint rejected record"
                        );
                        hooks.emit_error(&err);
                    }
                }
                Err(e) => {
                    let err = Error::Delivery(e);
                    warn!(event_type = %event_type, error = %err, "Record delivery failed");
                    hooks.emit_error(&err);
                }
            }
        });
    }

    fn shutdown(&self) {
        // Stateless: in-flight posts complete or fail on their own.
    }
}
