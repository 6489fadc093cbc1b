//! Canonical span data model shared by the codecs, storage, and collector.
//!
//! Spans are immutable once built; [`Span::builder`] is the single place ID
//! normalization and name lower-casing happen, so decoders for every wire
//! format produce structurally equal values for the same logical span.

mod dependency_link;
mod endpoint;
mod error;
mod span;

pub use dependency_link::DependencyLink;
pub use endpoint::{Endpoint, EndpointBuilder};
pub use error::ModelError;
pub use span::{
    hex_to_u64, lower_hex, normalize_id, normalize_trace_id, Annotation, Kind,
    Span, SpanBuilder,
};
