use thiserror::Error;

/// Structural failures while reading wire data.
///
/// These never escape the public decode functions: untrusted input that
/// trips one is reported as `None` or an empty list so a collector loop can
/// count the drop and move on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input at byte {0}")]
    Underflow(usize),

    /// A length header claimed more data than the buffer holds. Guards
    /// against corrupt input requesting huge allocations.
    #[error("truncated: length {length} > bytes remaining {remaining}")]
    Truncated { length: usize, remaining: usize },

    #[error("malformed input at byte {at}: {reason}")]
    Malformed { at: usize, reason: &'static str },
}

impl CodecError {
    pub(crate) fn malformed(at: usize, reason: &'static str) -> CodecError {
        CodecError::Malformed { at, reason }
    }
}
