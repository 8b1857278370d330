//! HTTP metrics source.
//!
//! Polls the canary-local report and the optional cluster-wide report
//! in parallel and folds both into one snapshot. Each half degrades on
//! its own: a missing field, a malformed body, or a dead endpoint only
//! costs that half its values, with the safe defaults filling the gap.
//! `reset` is the one exchange whose failure the caller gets to see.

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, warn};

use serin_core::contract::{MetricsSource, SourceError};
use serin_core::types::MetricSnapshot;

use crate::client::{self, ClientError};

/// Canary-local report fields. All optional: whatever the agent left
/// out keeps its safe default.
#[derive(Debug, Default, Deserialize)]
struct LocalReport {
    error_rate: Option<f64>,
    latency_p95_ms: Option<f64>,
    avg_latency_ms: Option<f64>,
    cpu_usage: Option<f64>,
    memory_usage: Option<f64>,
}

/// Cluster-wide report fields.
#[derive(Debug, Default, Deserialize)]
struct ClusterReport {
    total_error_rate: Option<f64>,
    end_to_end_latency_ms: Option<f64>,
    request_rate: Option<f64>,
}

pub struct HttpMetricsSource {
    metrics_uri: http::Uri,
    reset_uri: http::Uri,
    cluster_uri: Option<http::Uri>,
    timeout: Duration,
}

impl HttpMetricsSource {
    /// Build a source over the canary agent's base endpoint and an
    /// optional cluster aggregator endpoint.
    pub fn new(
        local_endpoint: &str,
        cluster_endpoint: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base = local_endpoint.trim_end_matches('/');
        let metrics_uri = format!("{base}/metrics")
            .parse()
            .with_context(|| format!("canary endpoint '{local_endpoint}' is not a valid uri"))?;
        let reset_uri = format!("{base}/metrics/reset")
            .parse()
            .with_context(|| format!("canary endpoint '{local_endpoint}' is not a valid uri"))?;
        let cluster_uri = cluster_endpoint
            .map(|endpoint| {
                format!("{}/metrics", endpoint.trim_end_matches('/'))
                    .parse()
                    .with_context(|| format!("cluster endpoint '{endpoint}' is not a valid uri"))
            })
            .transpose()?;

        Ok(Self {
            metrics_uri,
            reset_uri,
            cluster_uri,
            timeout,
        })
    }

    async fn fetch_local(&self) -> LocalReport {
        fetch_report(&self.metrics_uri, self.timeout, "canary").await
    }

    async fn fetch_cluster(&self) -> ClusterReport {
        match &self.cluster_uri {
            Some(uri) => fetch_report(uri, self.timeout, "cluster").await,
            None => {
                debug!("no cluster endpoint configured, using defaults");
                ClusterReport::default()
            }
        }
    }
}

impl MetricsSource for HttpMetricsSource {
    async fn poll(&mut self) -> Result<MetricSnapshot, SourceError> {
        let (local, cluster) = tokio::join!(self.fetch_local(), self.fetch_cluster());

        let mut snapshot = MetricSnapshot::safe_default();
        if let Some(value) = local.error_rate {
            snapshot.error_rate = value;
        }
        // Prefer the p95; an agent that only tracks averages still
        // feeds the latency channel something.
        if let Some(value) = local.latency_p95_ms.or(local.avg_latency_ms) {
            snapshot.latency_p95_ms = value;
        }
        if let Some(value) = local.cpu_usage {
            snapshot.cpu_usage = value;
        }
        if let Some(value) = local.memory_usage {
            snapshot.memory_usage = value;
        }
        if let Some(value) = cluster.total_error_rate {
            snapshot.cluster_error_rate = value;
        }
        if let Some(value) = cluster.end_to_end_latency_ms {
            snapshot.end_to_end_latency_ms = value;
        }
        if let Some(value) = cluster.request_rate {
            snapshot.request_rate = value;
        }
        Ok(snapshot)
    }

    async fn reset(&mut self) -> Result<(), SourceError> {
        match client::request("POST", &self.reset_uri, None, self.timeout).await {
            Ok(response) if (200..300).contains(&response.status) => Ok(()),
            Ok(response) => Err(SourceError::Status(response.status)),
            Err(ClientError::Timeout(ms)) => Err(SourceError::Timeout(ms)),
            Err(ClientError::Transport(e)) => Err(SourceError::Poll(e.to_string())),
        }
    }
}

/// Fetch and parse one report endpoint, degrading to `Default` on any
/// failure.
async fn fetch_report<R: Default + for<'de> Deserialize<'de>>(
    uri: &http::Uri,
    timeout: Duration,
    half: &'static str,
) -> R {
    match client::request("GET", uri, None, timeout).await {
        Ok(response) if (200..300).contains(&response.status) => {
            match serde_json::from_slice(&response.body) {
                Ok(report) => report,
                Err(e) => {
                    warn!(half, error = %e, "report body unparsable, using defaults");
                    R::default()
                }
            }
        }
        Ok(response) => {
            warn!(half, status = response.status, "report endpoint non-2xx, using defaults");
            R::default()
        }
        Err(e) => {
            warn!(half, error = %e, "report endpoint unreachable, using defaults");
            R::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uris_are_validated_up_front() {
        assert!(HttpMetricsSource::new("http://127.0.0.1:9100", None, Duration::from_secs(2)).is_ok());
        assert!(
            HttpMetricsSource::new("http://127.0.0.1:9100/", None, Duration::from_secs(2)).is_ok()
        );
        assert!(HttpMetricsSource::new("not a uri", None, Duration::from_secs(2)).is_err());
        assert!(
            HttpMetricsSource::new("http://ok:1", Some("also not a uri"), Duration::from_secs(2))
                .is_err()
        );
    }

    #[test]
    fn partial_report_json_leaves_missing_fields_unset() {
        let report: LocalReport = serde_json::from_str(r#"{ "error_rate": 0.05 }"#).unwrap();
        assert_eq!(report.error_rate, Some(0.05));
        assert_eq!(report.latency_p95_ms, None);
        assert_eq!(report.cpu_usage, None);
    }

    #[test]
    fn unknown_report_fields_are_ignored() {
        let report: ClusterReport = serde_json::from_str(
            r#"{ "total_error_rate": 0.01, "node_count": 12, "uptime_secs": 9000 }"#,
        )
        .unwrap();
        assert_eq!(report.total_error_rate, Some(0.01));
        assert_eq!(report.request_rate, None);
    }
}
