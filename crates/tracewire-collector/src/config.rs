//! Configuration for the collector pipeline.

use std::time::Duration;

/// Pipeline knobs, applied at construction.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Fraction of traces to keep, in `[0, 1]`.
    pub sample_rate: f32,
    /// Raw payloads buffered before `submit` applies backpressure.
    pub queue_capacity: usize,
    /// Spans gathered before a batch is written to storage.
    pub max_batch_length: usize,
    /// The maximum wait before a partial batch is written.
    pub batch_timeout: Duration,
    /// Window during which a repeated drop reason logs quietly.
    pub log_quiet_period: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            queue_capacity: 1_000,
            max_batch_length: 1_000,
            batch_timeout: Duration::from_secs(1),
            log_quiet_period: Duration::from_secs(60),
        }
    }
}
