//! Turning parsed probe results into dashboard state and metric summaries.

pub mod aggregator;
pub mod summary;

pub use aggregator::{Aggregator, ScanReport};
pub use summary::LogSummary;
