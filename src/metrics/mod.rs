//! Point-in-time gauges pushed to a Prometheus Pushgateway.
//!
//! Samples are pushed without metric-level labels; the `{env, service}`
//! grouping key in the URL scopes them. Pushing the same label names both ways
//! makes the gateway reject the request.

pub mod exposition;
pub mod transport;

pub use transport::{HttpTransport, PushRequest, PushTransport};

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::summary::LogSummary;
use crate::config::MetricsConfig;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("pushgateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("pushgateway request timed out after {0:?}")]
    Timeout(Duration),

    #[error("pushgateway request failed: {0}")]
    Transport(String),

    #[error("invalid pushgateway url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("metric label {label:?} collides with the grouping key")]
    LabelConflict { label: String },

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

/// One gauge value. Created and discarded within a single push.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub help: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl MetricSample {
    pub fn gauge(name: impl Into<String>, help: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels: BTreeMap::new(),
            value,
        }
    }
}

/// The three per-run gauges. The last-success timestamp is only included on
/// success so a failed run leaves the gateway's previous value in place.
pub fn outcome_samples(
    prefix: &str,
    success: bool,
    duration_secs: f64,
    now_unix: f64,
) -> Vec<MetricSample> {
    let mut samples = vec![
        MetricSample::gauge(
            format!("{prefix}_last_result"),
            "1 success, 0 failure",
            if success { 1.0 } else { 0.0 },
        ),
        MetricSample::gauge(
            format!("{prefix}_test_duration_seconds"),
            "total duration",
            duration_secs,
        ),
    ];
    if success {
        samples.push(MetricSample::gauge(
            format!("{prefix}_last_success_timestamp"),
            "unix ts last success",
            now_unix,
        ));
    }
    samples
}

/// Metric-name suffix for a summary window: `1h` for 60 minutes, `30m` for 30.
pub fn window_suffix(window_minutes: i64) -> String {
    if window_minutes > 0 && window_minutes % 60 == 0 {
        format!("{}h", window_minutes / 60)
    } else {
        format!("{window_minutes}m")
    }
}

/// Windowed counts derived from a probe log. The counter names carry the
/// window, so the default 60-minute window yields `*_1h`.
pub fn summary_samples(
    prefix: &str,
    summary: &LogSummary,
    window_minutes: i64,
) -> Vec<MetricSample> {
    let window = window_suffix(window_minutes);
    let mut samples = vec![
        MetricSample::gauge(
            format!("{prefix}_last_result"),
            "1 success, 0 failure",
            if summary.last_result_success() { 1.0 } else { 0.0 },
        ),
        MetricSample::gauge(
            format!("{prefix}_success_count_{window}"),
            "successful runs in window",
            summary.success_count as f64,
        ),
        MetricSample::gauge(
            format!("{prefix}_failure_count_{window}"),
            "failed runs in window",
            summary.failure_count as f64,
        ),
        MetricSample::gauge(
            format!("{prefix}_availability_ratio_{window}"),
            "success / (success + failure) in window",
            summary.availability_ratio(),
        ),
    ];
    if let Some(ts) = summary.last_success_unix {
        samples.push(MetricSample::gauge(
            format!("{prefix}_last_success_timestamp"),
            "unix ts last success",
            ts as f64,
        ));
    }
    samples
}

/// Build `<base>/metrics/job/<job>/<label>/<value>...`.
///
/// Values containing `/` (or empty values) use the `<label>@base64` form the
/// Pushgateway requires; everything else is percent-encoded.
pub fn grouping_url(base: &str, job: &str, grouping: &[(&str, &str)]) -> Result<Url, PushError> {
    let invalid = |reason: String| PushError::InvalidUrl {
        url: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| invalid("cannot be a base URL".to_string()))?;
        segments.pop_if_empty().extend(["metrics"]);
        for (label, value) in std::iter::once(&("job", job)).chain(grouping.iter()) {
            if value.is_empty() || value.contains('/') {
                let encoded = URL_SAFE.encode(value);
                let encoded = if encoded.is_empty() { "=".to_string() } else { encoded };
                segments.push(&format!("{label}@base64")).push(&encoded);
            } else {
                segments.push(label).push(value);
            }
        }
    }
    Ok(url)
}

/// Pushes gauges for one service/env pair.
pub struct MetricsExporter<T = HttpTransport> {
    config: MetricsConfig,
    transport: T,
}

impl MetricsExporter<HttpTransport> {
    pub fn new(config: MetricsConfig) -> Result<Self, PushError> {
        let transport = HttpTransport::new(config.timeout())?;
        Ok(Self { config, transport })
    }
}

impl<T: PushTransport> MetricsExporter<T> {
    pub fn with_transport(config: MetricsConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn is_enabled(&self) -> bool {
        self.gateway_url().is_some()
    }

    fn gateway_url(&self) -> Option<&str> {
        self.config
            .gateway_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Push the outcome of a single probe run. A no-op when no gateway is
    /// configured.
    pub async fn push(
        &self,
        service: &str,
        env: &str,
        success: bool,
        duration_secs: f64,
    ) -> Result<(), PushError> {
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        let samples = outcome_samples(&self.config.metric_prefix, success, duration_secs, now);
        self.push_samples(&self.config.job, service, env, &samples).await
    }

    /// Push windowed log counts under `summary_job`, so they never replace
    /// the per-run outcome gauges of the same service.
    pub async fn push_summary(
        &self,
        service: &str,
        env: &str,
        summary: &LogSummary,
        window_minutes: i64,
    ) -> Result<(), PushError> {
        let samples = summary_samples(&self.config.metric_prefix, summary, window_minutes);
        self.push_samples(&self.config.summary_job, service, env, &samples).await
    }

    pub async fn push_samples(
        &self,
        job: &str,
        service: &str,
        env: &str,
        samples: &[MetricSample],
    ) -> Result<(), PushError> {
        let Some(base) = self.gateway_url() else {
            debug!(%service, "no pushgateway configured, skipping push");
            return Ok(());
        };

        let grouping = [("env", env), ("service", service)];
        for sample in samples {
            if let Some(label) = sample
                .labels
                .keys()
                .find(|k| grouping.iter().any(|(g, _)| *g == k.as_str()))
            {
                return Err(PushError::LabelConflict {
                    label: label.clone(),
                });
            }
        }

        let request = PushRequest {
            url: grouping_url(base, job, &grouping)?,
            body: exposition::render(samples)?,
            basic_auth: self.config.basic_auth(),
        };
        self.transport.send(request).await?;
        info!(%job, %service, %env, samples = samples.len(), "pushed metrics");
        Ok(())
    }
}
