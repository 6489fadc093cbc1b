//! Encoders and decoders for span wire formats.
//!
//! Three formats are supported: JSON (canonical and legacy shapes), the
//! legacy thrift binary protocol, and proto3. Each codec exposes the same
//! surface: `size_in_bytes`, `encode`, `encode_list`, `encode_list_into`,
//! `decode_one` and `decode_list`. Decoders are lenient by contract:
//! untrusted input never panics and malformed payloads come back as `None`
//! or an empty list, with the reason logged at debug level.
//!
//! [`detect::decode_any`] sniffs the format of an untyped payload, which
//! transports without content negotiation rely on.

mod buffer;
mod error;

pub mod detect;
pub mod json;
pub mod proto3;
pub mod thrift;
pub mod v1;

pub use detect::{decode_any, Encoding};
pub use error::CodecError;
