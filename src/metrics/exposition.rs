//! Prometheus text exposition of one push body.

use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};

use super::{MetricSample, PushError};

pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Encode samples through a throwaway registry, one gauge per sample.
pub fn render(samples: &[MetricSample]) -> Result<String, PushError> {
    let registry = Registry::new();
    for sample in samples {
        let opts = Opts::new(sample.name.as_str(), sample.help.as_str())
            .const_labels(sample.labels.clone().into_iter().collect());
        let gauge = Gauge::with_opts(opts)?;
        gauge.set(sample.value);
        registry.register(Box::new(gauge))?;
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
