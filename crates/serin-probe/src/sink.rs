//! HTTP traffic sink.
//!
//! Pushes the desired canary weight to the traffic router's configured
//! update URL. The update is a full desired-state write, so re-sending
//! the same weight is harmless and a lost update is repaired by the
//! next step's push.

use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::debug;

use serin_core::contract::{SinkError, TrafficSink};

use crate::client::{self, ClientError};

#[derive(Serialize)]
struct WeightUpdate {
    canary_weight: u8,
}

pub struct HttpTrafficSink {
    traffic_uri: http::Uri,
    timeout: Duration,
}

impl HttpTrafficSink {
    /// Build a sink over the router's weight-update URL.
    pub fn new(traffic_endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let traffic_uri = traffic_endpoint
            .parse()
            .with_context(|| format!("traffic endpoint '{traffic_endpoint}' is not a valid uri"))?;
        Ok(Self {
            traffic_uri,
            timeout,
        })
    }
}

impl TrafficSink for HttpTrafficSink {
    async fn apply_weight(&mut self, percent: u8) -> Result<(), SinkError> {
        let body = serde_json::to_vec(&WeightUpdate {
            canary_weight: percent,
        })
        .map_err(|e| SinkError::Apply(e.to_string()))?;

        match client::request("PUT", &self.traffic_uri, Some(body), self.timeout).await {
            Ok(response) if (200..300).contains(&response.status) => {
                debug!(percent, "canary weight applied");
                Ok(())
            }
            Ok(response) => Err(SinkError::Status(response.status)),
            Err(ClientError::Timeout(ms)) => Err(SinkError::Timeout(ms)),
            Err(ClientError::Transport(e)) => Err(SinkError::Apply(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uri_is_validated_up_front() {
        assert!(
            HttpTrafficSink::new("http://127.0.0.1:8080/routes/app/weights", Duration::from_secs(2))
                .is_ok()
        );
        assert!(HttpTrafficSink::new("::::", Duration::from_secs(2)).is_err());
    }

    #[test]
    fn weight_update_wire_format() {
        let body = serde_json::to_string(&WeightUpdate { canary_weight: 30 }).unwrap();
        assert_eq!(body, r#"{"canary_weight":30}"#);
    }
}
