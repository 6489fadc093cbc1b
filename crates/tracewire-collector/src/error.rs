//! Errors for this crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    /// Sample rates are fractions of traces to keep.
    #[error("sample rate {0} is not between 0 and 1")]
    InvalidSampleRate(f32),
    /// The pipeline was shut down; submissions can no longer be queued.
    #[error("collector is closed")]
    Closed,
}
