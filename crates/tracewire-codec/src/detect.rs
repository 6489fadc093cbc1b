//! Wire format detection for untyped ingest payloads.
//!
//! Transports like message queues carry no content-type header, so the
//! format is sniffed from the first bytes. The binary formats collide on
//! their first byte: a protobuf list starts with key 0x0a followed by a
//! non-zero length, while a bare legacy thrift struct starts with a field
//! type byte (at most 16) whose second byte is the high half of a
//! big-endian field id, which is always zero for the small ids in use.

use tracewire_model::Span;

use crate::{json, proto3, thrift};

// TType.STRUCT, the element type opening a thrift span list
const THRIFT_STRUCT: u8 = 12;
const THRIFT_MAX_TYPE: u8 = 16;
const PROTO3_SPAN_KEY: u8 = 0x0a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Thrift,
    Proto3,
}

impl Encoding {
    pub fn media_type(self) -> &'static str {
        match self {
            Encoding::Json => "application/json",
            Encoding::Thrift => "application/x-thrift",
            Encoding::Proto3 => "application/x-protobuf",
        }
    }
}

/// Guesses the encoding of a span list payload, or `None` when the bytes
/// open with something no codec would have written.
pub fn detect(bytes: &[u8]) -> Option<Encoding> {
    let &first = bytes.first()?;
    if first == b'[' {
        return Some(Encoding::Json);
    }
    if first == THRIFT_STRUCT {
        return Some(Encoding::Thrift);
    }
    if first == PROTO3_SPAN_KEY && bytes.len() > 1 && bytes[1] != 0 {
        return Some(Encoding::Proto3);
    }
    // a legacy single-span thrift record opens with a field header
    if first <= THRIFT_MAX_TYPE {
        return Some(Encoding::Thrift);
    }
    None
}

/// Sniffs the encoding and decodes. Unrecognizable or malformed input
/// yields an empty list.
pub fn decode_any(bytes: &[u8]) -> Vec<Span> {
    match detect(bytes) {
        Some(Encoding::Json) => json::decode_list(bytes),
        Some(Encoding::Proto3) => proto3::decode_list(bytes),
        Some(Encoding::Thrift) => {
            if bytes[0] == THRIFT_STRUCT {
                thrift::decode_list(bytes)
            } else {
                thrift::decode(bytes)
            }
        }
        None => {
            tracing::debug!(
                first_byte = bytes.first().copied(),
                "unrecognized span payload"
            );
            Vec::new()
        }
    }
}
