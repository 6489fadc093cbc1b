use thiserror::Error;

/// Contract violations raised by builders and ID normalization.
///
/// These indicate caller bugs, not untrusted wire input. Codecs that decode
/// untrusted bytes catch these internally and surface `None` instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("trace id should be lower-hex of 1 to 32 characters: {0:?}")]
    InvalidTraceId(String),

    #[error("trace id cannot be all zeros")]
    EmptyTraceId,

    #[error("{name} should be lower-hex of 1 to 16 characters: {value:?}")]
    InvalidId { name: &'static str, value: String },

    #[error("span id cannot be all zeros")]
    EmptySpanId,

    #[error("span is missing a required {0} field")]
    MissingField(&'static str),
}
