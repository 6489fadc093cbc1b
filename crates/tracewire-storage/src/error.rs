use thiserror::Error;

/// Failures surfaced through the storage call path.
///
/// The in-memory store never does I/O, so these are contract errors:
/// misusing a [`crate::Call`], or handing a query builder values it
/// rejects. They fail fast rather than being absorbed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("call already executed; clone it to retry")]
    AlreadyExecuted,

    #[error("call canceled")]
    Canceled,

    #[error("invalid trace id: {0}")]
    InvalidTraceId(String),

    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("max duration is only valid with a min duration at or below it")]
    InvalidDurationBounds,
}
