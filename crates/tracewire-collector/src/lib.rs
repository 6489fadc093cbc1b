//! Span ingest: trace sampling, repeat gating, and the async pipeline
//! that turns raw transport payloads into storage writes.

mod collector;
mod config;
mod delay_limiter;
mod error;
mod sampler;

pub use collector::{Collector, CollectorMetrics};
pub use config::CollectorConfig;
pub use delay_limiter::DelayLimiter;
pub use error::CollectorError;
pub use sampler::Sampler;
