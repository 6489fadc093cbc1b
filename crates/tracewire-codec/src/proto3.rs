//! Hand-rolled proto3 codec for the span schema.
//!
//! Spans are framed as field 1 of a list message, so one encoded span is
//! also a valid single-element list. Every encode precomputes the exact
//! message size field-by-field and then writes into an allocation of that
//! size; the two passes agreeing is asserted in debug builds and pinned by
//! interop tests against an independently derived protobuf encoder.
//!
//! All field numbers are below 16, so every tag fits one byte.

use tracewire_model::{Annotation, Endpoint, Kind, Span};

use crate::buffer::{varint32_size, varint64_size, ReadBuffer, WriteBuffer};
use crate::CodecError;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LENGTH_DELIMITED: u32 = 2;
const WIRE_FIXED32: u32 = 5;

const fn key(field_number: u32, wire_type: u32) -> u32 {
    (field_number << 3) | wire_type
}

// the only field in the list message
const SPAN_KEY: u32 = key(1, WIRE_LENGTH_DELIMITED);

const TRACE_ID_KEY: u32 = key(1, WIRE_LENGTH_DELIMITED);
const PARENT_ID_KEY: u32 = key(2, WIRE_LENGTH_DELIMITED);
const ID_KEY: u32 = key(3, WIRE_LENGTH_DELIMITED);
const KIND_KEY: u32 = key(4, WIRE_VARINT);
const NAME_KEY: u32 = key(5, WIRE_LENGTH_DELIMITED);
const TIMESTAMP_KEY: u32 = key(6, WIRE_FIXED64);
const DURATION_KEY: u32 = key(7, WIRE_VARINT);
const LOCAL_ENDPOINT_KEY: u32 = key(8, WIRE_LENGTH_DELIMITED);
const REMOTE_ENDPOINT_KEY: u32 = key(9, WIRE_LENGTH_DELIMITED);
const ANNOTATION_KEY: u32 = key(10, WIRE_LENGTH_DELIMITED);
const TAG_KEY: u32 = key(11, WIRE_LENGTH_DELIMITED);
const DEBUG_KEY: u32 = key(12, WIRE_VARINT);
const SHARED_KEY: u32 = key(13, WIRE_VARINT);

const SERVICE_NAME_KEY: u32 = key(1, WIRE_LENGTH_DELIMITED);
const IPV4_KEY: u32 = key(2, WIRE_LENGTH_DELIMITED);
const IPV6_KEY: u32 = key(3, WIRE_LENGTH_DELIMITED);
const PORT_KEY: u32 = key(4, WIRE_VARINT);

const ANN_TIMESTAMP_KEY: u32 = key(1, WIRE_FIXED64);
const ANN_VALUE_KEY: u32 = key(2, WIRE_LENGTH_DELIMITED);

const TAG_KEY_KEY: u32 = key(1, WIRE_LENGTH_DELIMITED);
const TAG_VALUE_KEY: u32 = key(2, WIRE_LENGTH_DELIMITED);

// tag + length prefix + payload
fn delimited_size(payload: usize) -> usize {
    1 + varint32_size(payload as u32) + payload
}

/// Exact encoded size of one span including its field-1 framing.
pub fn size_in_bytes(span: &Span) -> usize {
    delimited_size(span_payload_size(span))
}

pub fn encode(span: &Span) -> Vec<u8> {
    let size = size_in_bytes(span);
    let mut buffer = WriteBuffer::with_capacity(size);
    write_span(span, &mut buffer);
    debug_assert_eq!(buffer.pos(), size);
    buffer.into_bytes()
}

pub fn encode_list(spans: &[Span]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_list_into(spans, &mut out);
    out
}

/// In-place variant of [`encode_list`]; returns the bytes appended.
pub fn encode_list_into(spans: &[Span], out: &mut Vec<u8>) -> usize {
    let size: usize = spans.iter().map(size_in_bytes).sum();
    let mut buffer = WriteBuffer::with_capacity(size);
    for span in spans {
        write_span(span, &mut buffer);
    }
    debug_assert_eq!(buffer.pos(), size);

    let bytes = buffer.into_bytes();
    let written = bytes.len();
    out.extend_from_slice(&bytes);
    written
}

pub fn decode_one(bytes: &[u8]) -> Option<Span> {
    if bytes.is_empty() {
        return None;
    }
    let mut buffer = ReadBuffer::new(bytes);
    let result = buffer
        .read_varint32()
        .and_then(|_key| read_span(&mut buffer));
    match result {
        Ok(span) => Some(span),
        Err(error) => {
            tracing::debug!(%error, "dropping malformed proto3 span");
            None
        }
    }
}

pub fn decode_list(bytes: &[u8]) -> Vec<Span> {
    let mut buffer = ReadBuffer::new(bytes);
    let mut out = Vec::new();
    while buffer.remaining() > 0 {
        let result = buffer
            .read_varint32()
            .and_then(|_key| read_span(&mut buffer));
        match result {
            Ok(span) => out.push(span),
            Err(error) => {
                tracing::debug!(%error, "dropping malformed proto3 span list");
                return Vec::new();
            }
        }
    }
    out
}

fn span_payload_size(span: &Span) -> usize {
    let mut size = delimited_size(span.trace_id.len() / 2);
    if let Some(parent_id) = &span.parent_id {
        size += delimited_size(parent_id.len() / 2);
    }
    size += delimited_size(span.id.len() / 2);
    if span.kind.is_some() {
        size += 2; // tag + single-byte varint
    }
    if let Some(name) = &span.name {
        size += delimited_size(name.len());
    }
    if span.timestamp.is_some() {
        size += 1 + 8;
    }
    if let Some(duration) = span.duration {
        size += 1 + varint64_size(duration);
    }
    if let Some(endpoint) = &span.local_endpoint {
        size += delimited_size(endpoint_payload_size(endpoint));
    }
    if let Some(endpoint) = &span.remote_endpoint {
        size += delimited_size(endpoint_payload_size(endpoint));
    }
    for annotation in &span.annotations {
        size += delimited_size(annotation_payload_size(annotation));
    }
    for (tag_key, tag_value) in &span.tags {
        size += delimited_size(tag_payload_size(tag_key, tag_value));
    }
    if span.debug {
        size += 2;
    }
    if span.shared {
        size += 2;
    }
    size
}

fn endpoint_payload_size(endpoint: &Endpoint) -> usize {
    let mut size = 0;
    if let Some(service_name) = &endpoint.service_name {
        size += delimited_size(service_name.len());
    }
    if endpoint.ipv4.is_some() {
        size += delimited_size(4);
    }
    if endpoint.ipv6.is_some() {
        size += delimited_size(16);
    }
    if let Some(port) = endpoint.port {
        size += 1 + varint32_size(u32::from(port));
    }
    size
}

fn annotation_payload_size(annotation: &Annotation) -> usize {
    let mut size = 0;
    if annotation.timestamp != 0 {
        size += 1 + 8;
    }
    size + delimited_size(annotation.value.len())
}

fn tag_payload_size(tag_key: &str, tag_value: &str) -> usize {
    // empty values are still written so they round-trip
    delimited_size(tag_key.len()) + delimited_size(tag_value.len())
}

fn write_span(span: &Span, buffer: &mut WriteBuffer) {
    buffer.write_byte(SPAN_KEY as u8);
    buffer.write_varint(span_payload_size(span) as u64);

    write_hex(buffer, TRACE_ID_KEY, &span.trace_id);
    if let Some(parent_id) = &span.parent_id {
        write_hex(buffer, PARENT_ID_KEY, parent_id);
    }
    write_hex(buffer, ID_KEY, &span.id);
    if let Some(kind) = span.kind {
        buffer.write_byte(KIND_KEY as u8);
        buffer.write_varint(kind.wire_value());
    }
    if let Some(name) = &span.name {
        write_string(buffer, NAME_KEY, name);
    }
    if let Some(timestamp) = span.timestamp {
        buffer.write_byte(TIMESTAMP_KEY as u8);
        buffer.write_u64_le(timestamp);
    }
    if let Some(duration) = span.duration {
        buffer.write_byte(DURATION_KEY as u8);
        buffer.write_varint(duration);
    }
    if let Some(endpoint) = &span.local_endpoint {
        write_endpoint(buffer, LOCAL_ENDPOINT_KEY, endpoint);
    }
    if let Some(endpoint) = &span.remote_endpoint {
        write_endpoint(buffer, REMOTE_ENDPOINT_KEY, endpoint);
    }
    for annotation in &span.annotations {
        buffer.write_byte(ANNOTATION_KEY as u8);
        buffer.write_varint(annotation_payload_size(annotation) as u64);
        if annotation.timestamp != 0 {
            buffer.write_byte(ANN_TIMESTAMP_KEY as u8);
            buffer.write_u64_le(annotation.timestamp);
        }
        write_string(buffer, ANN_VALUE_KEY, &annotation.value);
    }
    for (tag_key, tag_value) in &span.tags {
        buffer.write_byte(TAG_KEY as u8);
        buffer.write_varint(tag_payload_size(tag_key, tag_value) as u64);
        write_string(buffer, TAG_KEY_KEY, tag_key);
        write_string(buffer, TAG_VALUE_KEY, tag_value);
    }
    if span.debug {
        buffer.write_byte(DEBUG_KEY as u8);
        buffer.write_byte(1);
    }
    if span.shared {
        buffer.write_byte(SHARED_KEY as u8);
        buffer.write_byte(1);
    }
}

fn write_string(buffer: &mut WriteBuffer, field_key: u32, value: &str) {
    buffer.write_byte(field_key as u8);
    buffer.write_varint(value.len() as u64);
    buffer.write_utf8(value);
}

fn write_hex(buffer: &mut WriteBuffer, field_key: u32, hex: &str) {
    buffer.write_byte(field_key as u8);
    buffer.write_varint((hex.len() / 2) as u64);
    let digits = hex.as_bytes();
    for pair in digits.chunks_exact(2) {
        buffer.write_byte((hex_nibble(pair[0]) << 4) | hex_nibble(pair[1]));
    }
}

// IDs are normalized lower-hex before they reach an encoder
fn hex_nibble(digit: u8) -> u8 {
    if digit.is_ascii_digit() {
        digit - b'0'
    } else {
        digit - b'a' + 10
    }
}

fn write_endpoint(buffer: &mut WriteBuffer, field_key: u32, endpoint: &Endpoint) {
    buffer.write_byte(field_key as u8);
    buffer.write_varint(endpoint_payload_size(endpoint) as u64);
    if let Some(service_name) = &endpoint.service_name {
        write_string(buffer, SERVICE_NAME_KEY, service_name);
    }
    if let Some(ipv4) = endpoint.ipv4 {
        buffer.write_byte(IPV4_KEY as u8);
        buffer.write_varint(4);
        buffer.write_bytes(&ipv4.octets());
    }
    if let Some(ipv6) = endpoint.ipv6 {
        buffer.write_byte(IPV6_KEY as u8);
        buffer.write_varint(16);
        buffer.write_bytes(&ipv6.octets());
    }
    if let Some(port) = endpoint.port {
        buffer.write_byte(PORT_KEY as u8);
        buffer.write_varint(u64::from(port));
    }
}

fn read_span(buffer: &mut ReadBuffer<'_>) -> Result<Span, CodecError> {
    let length = buffer.guard_varint_length()?;
    let end = buffer.pos() + length;

    let mut builder = Span::builder();
    while buffer.pos() < end {
        let field_key = buffer.read_varint32()?;
        match field_key {
            TRACE_ID_KEY => {
                if let Some(hex) = read_hex(buffer)? {
                    builder = builder.trace_id(hex);
                }
            }
            PARENT_ID_KEY => {
                if let Some(hex) = read_hex(buffer)? {
                    builder = builder.parent_id(hex);
                }
            }
            ID_KEY => {
                if let Some(hex) = read_hex(buffer)? {
                    builder = builder.id(hex);
                }
            }
            KIND_KEY => {
                if let Some(kind) = Kind::from_wire_value(buffer.read_varint64()?)
                {
                    builder = builder.kind(kind);
                }
            }
            NAME_KEY => {
                if let Some(name) = read_string(buffer)? {
                    builder = builder.name(name);
                }
            }
            TIMESTAMP_KEY => builder = builder.timestamp(buffer.read_u64_le()?),
            DURATION_KEY => builder = builder.duration(buffer.read_varint64()?),
            LOCAL_ENDPOINT_KEY => {
                if let Some(endpoint) = read_endpoint(buffer)? {
                    builder = builder.local_endpoint(endpoint);
                }
            }
            REMOTE_ENDPOINT_KEY => {
                if let Some(endpoint) = read_endpoint(buffer)? {
                    builder = builder.remote_endpoint(endpoint);
                }
            }
            ANNOTATION_KEY => {
                if let Some((timestamp, value)) = read_annotation(buffer)? {
                    builder = builder.annotation(timestamp, value);
                }
            }
            TAG_KEY => {
                if let Some((tag_key, tag_value)) = read_tag(buffer)? {
                    builder = builder.tag(tag_key, tag_value);
                }
            }
            DEBUG_KEY => {
                if read_bool(buffer)? {
                    builder = builder.debug(true);
                }
            }
            SHARED_KEY => {
                if read_bool(buffer)? {
                    builder = builder.shared(true);
                }
            }
            _ => skip_field(buffer, field_key)?,
        }
    }

    builder
        .build()
        .map_err(|_| CodecError::malformed(buffer.pos(), "invalid span ids"))
}

fn read_hex(buffer: &mut ReadBuffer<'_>) -> Result<Option<String>, CodecError> {
    const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";
    let length = buffer.guard_varint_length()?;
    if length == 0 {
        return Ok(None);
    }
    let mut hex = String::with_capacity(length * 2);
    for &byte in buffer.read_bytes(length)? {
        hex.push(HEX_DIGITS[usize::from(byte >> 4)] as char);
        hex.push(HEX_DIGITS[usize::from(byte & 0x0f)] as char);
    }
    Ok(Some(hex))
}

fn read_string(
    buffer: &mut ReadBuffer<'_>,
) -> Result<Option<String>, CodecError> {
    let length = buffer.guard_varint_length()?;
    if length == 0 {
        return Ok(None);
    }
    Ok(Some(buffer.read_utf8(length)?))
}

fn read_endpoint(
    buffer: &mut ReadBuffer<'_>,
) -> Result<Option<Endpoint>, CodecError> {
    let length = buffer.guard_varint_length()?;
    if length == 0 {
        return Ok(None);
    }
    let end = buffer.pos() + length;
    let mut builder = Endpoint::builder();
    while buffer.pos() < end {
        let field_key = buffer.read_varint32()?;
        match field_key {
            SERVICE_NAME_KEY => {
                if let Some(name) = read_string(buffer)? {
                    builder = builder.service_name(name);
                }
            }
            IPV4_KEY | IPV6_KEY => {
                let length = buffer.guard_varint_length()?;
                builder.parse_ip_bytes(buffer.read_bytes(length)?);
            }
            PORT_KEY => {
                builder = builder.port(buffer.read_varint32()? as u16);
            }
            _ => skip_field(buffer, field_key)?,
        }
    }
    Ok(builder.build().filter_empty())
}

fn read_annotation(
    buffer: &mut ReadBuffer<'_>,
) -> Result<Option<(u64, String)>, CodecError> {
    let length = buffer.guard_varint_length()?;
    if length == 0 {
        return Ok(None);
    }
    let end = buffer.pos() + length;
    let mut timestamp = 0u64;
    let mut value: Option<String> = None;
    while buffer.pos() < end {
        let field_key = buffer.read_varint32()?;
        match field_key {
            ANN_TIMESTAMP_KEY => timestamp = buffer.read_u64_le()?,
            ANN_VALUE_KEY => value = read_string(buffer)?,
            _ => skip_field(buffer, field_key)?,
        }
    }
    match value {
        Some(value) if timestamp != 0 => Ok(Some((timestamp, value))),
        _ => Ok(None),
    }
}

fn read_tag(
    buffer: &mut ReadBuffer<'_>,
) -> Result<Option<(String, String)>, CodecError> {
    let length = buffer.guard_varint_length()?;
    if length == 0 {
        return Ok(None);
    }
    let end = buffer.pos() + length;
    let mut tag_key: Option<String> = None;
    let mut tag_value = String::new(); // empty tag values are allowed
    while buffer.pos() < end {
        let field_key = buffer.read_varint32()?;
        match field_key {
            TAG_KEY_KEY => tag_key = read_string(buffer)?,
            TAG_VALUE_KEY => {
                if let Some(read) = read_string(buffer)? {
                    tag_value = read;
                }
            }
            _ => skip_field(buffer, field_key)?,
        }
    }
    Ok(tag_key.map(|tag_key| (tag_key, tag_value)))
}

fn read_bool(buffer: &mut ReadBuffer<'_>) -> Result<bool, CodecError> {
    match buffer.read_byte()? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(CodecError::malformed(buffer.pos(), "invalid boolean value")),
    }
}

// Unknown fields are skipped by wire type for forward compatibility.
fn skip_field(
    buffer: &mut ReadBuffer<'_>,
    field_key: u32,
) -> Result<(), CodecError> {
    let wire_type = field_key & 0x07;
    if field_key >> 3 == 0 {
        return Err(CodecError::malformed(buffer.pos(), "field number was zero"));
    }
    tracing::debug!(
        field_number = field_key >> 3,
        wire_type,
        at = buffer.pos(),
        "skipping unknown field"
    );
    match wire_type {
        WIRE_VARINT => buffer.read_varint64().map(|_| ()),
        WIRE_FIXED64 => buffer.skip(8),
        WIRE_LENGTH_DELIMITED => {
            let length = buffer.guard_varint_length()?;
            buffer.skip(length)
        }
        WIRE_FIXED32 => buffer.skip(4),
        _ => Err(CodecError::malformed(buffer.pos(), "invalid wire type")),
    }
}
