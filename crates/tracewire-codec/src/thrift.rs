//! TBinaryProtocol codec for the legacy span format.
//!
//! The wire layout is hand-rolled: each field is a type byte plus a 16-bit
//! big-endian field ID, payloads follow, and structs end with a stop byte.
//! Only the handful of field types the span schema uses are implemented;
//! unknown fields are skipped by type so newer producers don't break decode.

use tracewire_model::{Endpoint, Span};

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::v1::{v1_to_v2, v2_to_v1, V1Annotation, V1BinaryAnnotation, V1Span};
use crate::CodecError;

const TYPE_STOP: u8 = 0;
const TYPE_BOOL: u8 = 2;
const TYPE_BYTE: u8 = 3;
const TYPE_DOUBLE: u8 = 4;
const TYPE_I16: u8 = 6;
const TYPE_I32: u8 = 8;
const TYPE_I64: u8 = 10;
const TYPE_STRING: u8 = 11;
const TYPE_STRUCT: u8 = 12;
const TYPE_MAP: u8 = 13;
const TYPE_SET: u8 = 14;
const TYPE_LIST: u8 = 15;

// Nested containers deeper than this are treated as malformed rather than
// recursed into.
const MAX_SKIP_DEPTH: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    kind: u8,
    id: u16,
}

impl Field {
    const fn new(kind: u8, id: u16) -> Field {
        Field { kind, id }
    }

    fn write(self, buffer: &mut WriteBuffer) {
        buffer.write_byte(self.kind);
        buffer.write_u16_be(self.id);
    }

    fn read(buffer: &mut ReadBuffer<'_>) -> Result<Field, CodecError> {
        let kind = buffer.read_byte()?;
        if kind == TYPE_STOP {
            return Ok(Field { kind, id: 0 });
        }
        let id = buffer.read_u16_be()?;
        Ok(Field { kind, id })
    }
}

// span struct
const TRACE_ID: Field = Field::new(TYPE_I64, 1);
const NAME: Field = Field::new(TYPE_STRING, 3);
const ID: Field = Field::new(TYPE_I64, 4);
const PARENT_ID: Field = Field::new(TYPE_I64, 5);
const ANNOTATIONS: Field = Field::new(TYPE_LIST, 6);
const BINARY_ANNOTATIONS: Field = Field::new(TYPE_LIST, 8);
const DEBUG: Field = Field::new(TYPE_BOOL, 9);
const TIMESTAMP: Field = Field::new(TYPE_I64, 10);
const DURATION: Field = Field::new(TYPE_I64, 11);
const TRACE_ID_HIGH: Field = Field::new(TYPE_I64, 12);

// endpoint struct
const ENDPOINT_IPV4: Field = Field::new(TYPE_I32, 1);
const ENDPOINT_PORT: Field = Field::new(TYPE_I16, 2);
const ENDPOINT_SERVICE_NAME: Field = Field::new(TYPE_STRING, 3);
const ENDPOINT_IPV6: Field = Field::new(TYPE_STRING, 4);

// annotation struct
const ANN_TIMESTAMP: Field = Field::new(TYPE_I64, 1);
const ANN_VALUE: Field = Field::new(TYPE_STRING, 2);
const ANN_ENDPOINT: Field = Field::new(TYPE_STRUCT, 3);

// binary annotation struct
const BIN_KEY: Field = Field::new(TYPE_STRING, 1);
const BIN_VALUE: Field = Field::new(TYPE_STRING, 2);
const BIN_TYPE: Field = Field::new(TYPE_I32, 3);
const BIN_ENDPOINT: Field = Field::new(TYPE_STRUCT, 4);

const BIN_TYPE_BOOL: i32 = 0;
const BIN_TYPE_STRING: i32 = 6;

/// Exact encoded size of one span, for pre-sizing framed messages.
pub fn size_in_bytes(span: &Span) -> usize {
    let v1 = v2_to_v1(span);
    v1_size(&v1, span)
}

/// Encodes one span in the legacy single-span framing.
pub fn encode(span: &Span) -> Vec<u8> {
    let v1 = v2_to_v1(span);
    let size = v1_size(&v1, span);
    let mut buffer = WriteBuffer::with_capacity(size);
    write_v1(&v1, span, &mut buffer);
    debug_assert_eq!(buffer.pos(), size);
    buffer.into_bytes()
}

/// Encodes spans with the list header: element-type byte plus a 32-bit
/// big-endian count.
pub fn encode_list(spans: &[Span]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_list_into(spans, &mut out);
    out
}

/// In-place variant of [`encode_list`]; returns the bytes appended.
pub fn encode_list_into(spans: &[Span], out: &mut Vec<u8>) -> usize {
    if spans.is_empty() {
        return 0;
    }
    let converted: Vec<(V1Span, &Span)> =
        spans.iter().map(|span| (v2_to_v1(span), span)).collect();
    let size: usize = 5 + converted
        .iter()
        .map(|(v1, span)| v1_size(v1, span))
        .sum::<usize>();

    let mut buffer = WriteBuffer::with_capacity(size);
    buffer.write_byte(TYPE_STRUCT);
    buffer.write_i32_be(spans.len() as i32);
    for (v1, span) in &converted {
        write_v1(v1, span, &mut buffer);
    }
    debug_assert_eq!(buffer.pos(), size);

    let bytes = buffer.into_bytes();
    let written = bytes.len();
    out.extend_from_slice(&bytes);
    written
}

/// Decodes a legacy single-span message. A merged client+server record
/// splits into multiple spans, hence the list return.
pub fn decode(bytes: &[u8]) -> Vec<Span> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut buffer = ReadBuffer::new(bytes);
    match read_v1_span(&mut buffer) {
        Ok(v1) => v1_to_v2(&v1),
        Err(error) => {
            tracing::debug!(%error, "dropping malformed thrift span");
            Vec::new()
        }
    }
}

/// First span of a legacy single-span message, `None` when malformed.
pub fn decode_one(bytes: &[u8]) -> Option<Span> {
    decode(bytes).into_iter().next()
}

/// Decodes a span list, returning empty on any structural failure.
pub fn decode_list(bytes: &[u8]) -> Vec<Span> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut buffer = ReadBuffer::new(bytes);
    match read_v1_list(&mut buffer) {
        Ok(spans) => spans,
        Err(error) => {
            tracing::debug!(%error, "dropping malformed thrift span list");
            Vec::new()
        }
    }
}

fn read_v1_list(buffer: &mut ReadBuffer<'_>) -> Result<Vec<Span>, CodecError> {
    let count = read_list_length(buffer)?;
    let mut out = Vec::new();
    for _ in 0..count {
        let v1 = read_v1_span(buffer)?;
        out.extend(v1_to_v2(&v1));
    }
    Ok(out)
}

fn read_list_length(buffer: &mut ReadBuffer<'_>) -> Result<usize, CodecError> {
    buffer.read_byte()?; // element type, unchecked like other readers
    buffer.guard_length()
}

fn read_v1_span(buffer: &mut ReadBuffer<'_>) -> Result<V1Span, CodecError> {
    let mut span = V1Span::default();
    loop {
        let field = Field::read(buffer)?;
        if field.kind == TYPE_STOP {
            break;
        }
        match field {
            TRACE_ID => span.trace_id = buffer.read_u64_be()?,
            TRACE_ID_HIGH => span.trace_id_high = buffer.read_u64_be()?,
            NAME => {
                let length = buffer.guard_length()?;
                let name = buffer.read_utf8(length)?;
                span.set_name(&name);
            }
            ID => span.id = buffer.read_u64_be()?,
            PARENT_ID => span.parent_id = buffer.read_u64_be()?,
            ANNOTATIONS => {
                let length = read_list_length(buffer)?;
                for _ in 0..length {
                    read_annotation(buffer, &mut span)?;
                }
            }
            BINARY_ANNOTATIONS => {
                let length = read_list_length(buffer)?;
                for _ in 0..length {
                    read_binary_annotation(buffer, &mut span)?;
                }
            }
            DEBUG => span.debug = Some(buffer.read_byte()? == 1),
            TIMESTAMP => span.timestamp = buffer.read_u64_be()?,
            DURATION => span.duration = buffer.read_u64_be()?,
            _ => skip_value(buffer, field.kind, MAX_SKIP_DEPTH)?,
        }
    }
    Ok(span)
}

fn read_annotation(
    buffer: &mut ReadBuffer<'_>,
    span: &mut V1Span,
) -> Result<(), CodecError> {
    let mut timestamp = 0u64;
    let mut value: Option<String> = None;
    let mut endpoint: Option<Endpoint> = None;
    loop {
        let field = Field::read(buffer)?;
        if field.kind == TYPE_STOP {
            break;
        }
        match field {
            ANN_TIMESTAMP => timestamp = buffer.read_u64_be()?,
            ANN_VALUE => {
                let length = buffer.guard_length()?;
                value = Some(buffer.read_utf8(length)?);
            }
            ANN_ENDPOINT => endpoint = read_endpoint(buffer)?,
            _ => skip_value(buffer, field.kind, MAX_SKIP_DEPTH)?,
        }
    }
    if let Some(value) = value {
        if timestamp != 0 {
            span.add_annotation(timestamp, value, endpoint);
        }
    }
    Ok(())
}

fn read_binary_annotation(
    buffer: &mut ReadBuffer<'_>,
    span: &mut V1Span,
) -> Result<(), CodecError> {
    let mut key: Option<String> = None;
    let mut value: Option<String> = None;
    let mut endpoint: Option<Endpoint> = None;
    let mut is_boolean = false;
    let mut is_string = false;
    loop {
        let field = Field::read(buffer)?;
        if field.kind == TYPE_STOP {
            break;
        }
        match field {
            BIN_KEY => {
                let length = buffer.guard_length()?;
                key = Some(buffer.read_utf8(length)?);
            }
            BIN_VALUE => {
                let length = buffer.guard_length()?;
                value = Some(buffer.read_utf8(length)?);
            }
            BIN_TYPE => match buffer.read_i32_be()? {
                BIN_TYPE_BOOL => is_boolean = true,
                BIN_TYPE_STRING => is_string = true,
                _ => {}
            },
            BIN_ENDPOINT => endpoint = read_endpoint(buffer)?,
            _ => skip_value(buffer, field.kind, MAX_SKIP_DEPTH)?,
        }
    }
    let (Some(key), Some(value)) = (key, value) else { return Ok(()) };
    if is_string {
        span.add_string_annotation(key, value, endpoint);
    } else if is_boolean && value == "\u{1}" && endpoint.is_some() {
        if key == "sa" || key == "ca" || key == "ma" {
            span.add_address_annotation(key, endpoint);
        }
    }
    Ok(())
}

fn endpoint_size(endpoint: &Endpoint) -> usize {
    let mut size = 0;
    size += 3 + 4; // ipv4
    size += 3 + 2; // port
    size += 3
        + 4
        + endpoint.service_name.as_deref().map_or(0, str::len);
    if endpoint.ipv6.is_some() {
        size += 3 + 4 + 16;
    }
    size + 1 // stop
}

fn write_endpoint(endpoint: &Endpoint, buffer: &mut WriteBuffer) {
    ENDPOINT_IPV4.write(buffer);
    let ipv4 = endpoint.ipv4.map_or(0, |ip| u32::from(ip) as i32);
    buffer.write_i32_be(ipv4);

    ENDPOINT_PORT.write(buffer);
    buffer.write_u16_be(endpoint.port.unwrap_or(0));

    ENDPOINT_SERVICE_NAME.write(buffer);
    let service_name = endpoint.service_name.as_deref().unwrap_or("");
    buffer.write_i32_be(service_name.len() as i32);
    buffer.write_utf8(service_name);

    if let Some(ipv6) = endpoint.ipv6 {
        ENDPOINT_IPV6.write(buffer);
        buffer.write_i32_be(16);
        buffer.write_bytes(&ipv6.octets());
    }

    buffer.write_byte(TYPE_STOP);
}

fn read_endpoint(
    buffer: &mut ReadBuffer<'_>,
) -> Result<Option<Endpoint>, CodecError> {
    let mut builder = Endpoint::builder();
    loop {
        let field = Field::read(buffer)?;
        if field.kind == TYPE_STOP {
            break;
        }
        match field {
            ENDPOINT_IPV4 => {
                let ipv4 = buffer.read_i32_be()?;
                if ipv4 != 0 {
                    builder.parse_ip_bytes(&ipv4.to_be_bytes());
                }
            }
            ENDPOINT_PORT => {
                builder = builder.port(buffer.read_u16_be()?);
            }
            ENDPOINT_SERVICE_NAME => {
                let length = buffer.guard_length()?;
                let name = buffer.read_utf8(length)?;
                builder = builder.service_name(name);
            }
            ENDPOINT_IPV6 => {
                let length = buffer.guard_length()?;
                builder.parse_ip_bytes(buffer.read_bytes(length)?);
            }
            _ => skip_value(buffer, field.kind, MAX_SKIP_DEPTH)?,
        }
    }
    Ok(builder.build().filter_empty())
}

fn annotation_size(value_size: usize, endpoint_size: usize) -> usize {
    let mut size = 0;
    size += 3 + 8; // timestamp
    size += 3 + 4 + value_size;
    if endpoint_size > 0 {
        size += 3 + endpoint_size;
    }
    size + 1 // stop
}

fn binary_annotation_size(
    key_size: usize,
    value_size: usize,
    endpoint_size: usize,
) -> usize {
    let mut size = 0;
    size += 3 + 4 + key_size;
    size += 3 + 4 + value_size;
    size += 3 + 4; // type
    if endpoint_size > 0 {
        size += 3 + endpoint_size;
    }
    size + 1 // stop
}

fn v1_size(v1: &V1Span, value: &Span) -> usize {
    let local_endpoint_size =
        value.local_endpoint.as_ref().map_or(0, endpoint_size);

    let mut size = 3 + 8; // trace id
    if v1.trace_id_high != 0 {
        size += 3 + 8;
    }
    if v1.parent_id != 0 {
        size += 3 + 8;
    }
    size += 3 + 8; // id
    size += 3 + 4 + value.name.as_deref().map_or(0, str::len);

    // list fields are written even when empty, matching finagle
    size += 3 + 5;
    for a in &v1.annotations {
        size += annotation_size(a.value.len(), local_endpoint_size);
    }

    size += 3 + 5;
    for b in &v1.binary_annotations {
        match &b.string_value {
            Some(string_value) => {
                size += binary_annotation_size(
                    b.key.len(),
                    string_value.len(),
                    local_endpoint_size,
                );
            }
            None => {
                let remote_size = b.endpoint.as_ref().map_or(0, endpoint_size);
                size += binary_annotation_size(b.key.len(), 1, remote_size);
            }
        }
    }

    if v1.debug.is_some() {
        size += 3 + 1;
    }
    if v1.timestamp != 0 {
        size += 3 + 8;
    }
    if v1.duration != 0 {
        size += 3 + 8;
    }

    size + 1 // stop
}

fn write_v1(v1: &V1Span, value: &Span, buffer: &mut WriteBuffer) {
    let local_endpoint = value.local_endpoint.as_ref();

    TRACE_ID.write(buffer);
    buffer.write_u64_be(v1.trace_id);

    NAME.write(buffer);
    let name = value.name.as_deref().unwrap_or("");
    buffer.write_i32_be(name.len() as i32);
    buffer.write_utf8(name);

    ID.write(buffer);
    buffer.write_u64_be(v1.id);

    if v1.parent_id != 0 {
        PARENT_ID.write(buffer);
        buffer.write_u64_be(v1.parent_id);
    }

    ANNOTATIONS.write(buffer);
    buffer.write_byte(TYPE_STRUCT);
    buffer.write_i32_be(v1.annotations.len() as i32);
    for annotation in &v1.annotations {
        write_annotation(annotation, local_endpoint, buffer);
    }

    BINARY_ANNOTATIONS.write(buffer);
    buffer.write_byte(TYPE_STRUCT);
    buffer.write_i32_be(v1.binary_annotations.len() as i32);
    for binary in &v1.binary_annotations {
        write_binary_annotation(binary, local_endpoint, buffer);
    }

    if let Some(debug) = v1.debug {
        DEBUG.write(buffer);
        buffer.write_byte(u8::from(debug));
    }
    if v1.timestamp != 0 {
        TIMESTAMP.write(buffer);
        buffer.write_u64_be(v1.timestamp);
    }
    if v1.duration != 0 {
        DURATION.write(buffer);
        buffer.write_u64_be(v1.duration);
    }
    if v1.trace_id_high != 0 {
        TRACE_ID_HIGH.write(buffer);
        buffer.write_u64_be(v1.trace_id_high);
    }

    buffer.write_byte(TYPE_STOP);
}

fn write_annotation(
    annotation: &V1Annotation,
    local_endpoint: Option<&Endpoint>,
    buffer: &mut WriteBuffer,
) {
    ANN_TIMESTAMP.write(buffer);
    buffer.write_u64_be(annotation.timestamp);

    ANN_VALUE.write(buffer);
    buffer.write_i32_be(annotation.value.len() as i32);
    buffer.write_utf8(&annotation.value);

    if let Some(endpoint) = local_endpoint {
        ANN_ENDPOINT.write(buffer);
        write_endpoint(endpoint, buffer);
    }
    buffer.write_byte(TYPE_STOP);
}

fn write_binary_annotation(
    binary: &V1BinaryAnnotation,
    local_endpoint: Option<&Endpoint>,
    buffer: &mut WriteBuffer,
) {
    BIN_KEY.write(buffer);
    buffer.write_i32_be(binary.key.len() as i32);
    buffer.write_utf8(&binary.key);

    BIN_VALUE.write(buffer);
    let kind = match &binary.string_value {
        Some(string_value) => {
            buffer.write_i32_be(string_value.len() as i32);
            buffer.write_utf8(string_value);
            BIN_TYPE_STRING
        }
        None => {
            buffer.write_i32_be(1);
            buffer.write_byte(1);
            BIN_TYPE_BOOL
        }
    };

    BIN_TYPE.write(buffer);
    buffer.write_i32_be(kind);

    // tags carry the local endpoint; address annotations carry the remote
    let endpoint = match &binary.string_value {
        Some(_) => local_endpoint,
        None => binary.endpoint.as_ref(),
    };
    if let Some(endpoint) = endpoint {
        BIN_ENDPOINT.write(buffer);
        write_endpoint(endpoint, buffer);
    }
    buffer.write_byte(TYPE_STOP);
}

fn skip_value(
    buffer: &mut ReadBuffer<'_>,
    kind: u8,
    depth: u32,
) -> Result<(), CodecError> {
    if depth == 0 {
        return Err(CodecError::malformed(
            buffer.pos(),
            "maximum skip depth exceeded",
        ));
    }
    match kind {
        TYPE_BOOL | TYPE_BYTE => buffer.skip(1),
        TYPE_I16 => buffer.skip(2),
        TYPE_I32 => buffer.skip(4),
        TYPE_DOUBLE | TYPE_I64 => buffer.skip(8),
        TYPE_STRING => {
            let length = buffer.guard_length()?;
            buffer.skip(length)
        }
        TYPE_STRUCT => loop {
            let field = Field::read(buffer)?;
            if field.kind == TYPE_STOP {
                return Ok(());
            }
            skip_value(buffer, field.kind, depth - 1)?;
        },
        TYPE_MAP => {
            let key_kind = buffer.read_byte()?;
            let value_kind = buffer.read_byte()?;
            let length = buffer.guard_length()?;
            for _ in 0..length {
                skip_value(buffer, key_kind, depth - 1)?;
                skip_value(buffer, value_kind, depth - 1)?;
            }
            Ok(())
        }
        TYPE_SET | TYPE_LIST => {
            let element_kind = buffer.read_byte()?;
            let length = buffer.guard_length()?;
            for _ in 0..length {
                skip_value(buffer, element_kind, depth - 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracewire_model::Kind;

    fn client_span() -> Span {
        Span::builder()
            .trace_id("48485a3953bb6124")
            .parent_id("6b221d5bc9e6496c")
            .id("5b4185666d50f68b")
            .name("get")
            .kind(Kind::Client)
            .timestamp(1_472_470_996_199_000)
            .duration(207_000)
            .local_endpoint(
                Endpoint::builder()
                    .service_name("frontend")
                    .ip("127.0.0.1")
                    .build(),
            )
            .remote_endpoint(
                Endpoint::builder()
                    .service_name("backend")
                    .ip("192.168.99.101")
                    .port(9000)
                    .build(),
            )
            .annotation(1_472_470_996_238_000, "foo")
            .tag("clnt/finagle.version", "6.45.0")
            .tag("http.path", "/api")
            .build()
            .unwrap()
    }

    #[test]
    fn size_matches_encoded_length() {
        let span = client_span();
        assert_eq!(size_in_bytes(&span), encode(&span).len());
    }

    #[test]
    fn minimal_span_layout_is_stable() {
        let span = Span::builder().trace_id("1").id("2").build().unwrap();
        let bytes = encode(&span);
        // trace id + empty name + id + two empty lists + stop
        assert_eq!(bytes.len(), 46);
        assert_eq!(&bytes[..3], &[TYPE_I64, 0, 1]);
        assert_eq!(bytes[45], TYPE_STOP);
        assert_eq!(decode(&bytes), vec![span]);
    }

    #[test]
    fn round_trips_client_span() {
        let span = client_span();
        assert_eq!(decode(&encode(&span)), vec![span]);
    }

    #[test]
    fn round_trips_128bit_trace_and_utf8() {
        let span = Span::builder()
            .trace_id("48485a3953bb612446e0a2c7ba4c6d31")
            .id("2")
            .name("买")
            .timestamp(1)
            .local_endpoint(
                Endpoint::builder().service_name("相右").build(),
            )
            .tag("你好", "")
            .build()
            .unwrap();
        assert_eq!(size_in_bytes(&span), encode(&span).len());
        assert_eq!(decode(&encode(&span)), vec![span]);
    }

    #[test]
    fn round_trips_list() {
        let spans = vec![
            client_span(),
            Span::builder().trace_id("a").id("b").build().unwrap(),
        ];
        let bytes = encode_list(&spans);
        assert_eq!(bytes[0], TYPE_STRUCT);
        assert_eq!(decode_list(&bytes), spans);
    }

    #[test]
    fn encode_list_into_appends_and_reports_length() {
        let spans = vec![client_span()];
        let mut out = vec![0xAA];
        let written = encode_list_into(&spans, &mut out);
        assert_eq!(written, out.len() - 1);
        assert_eq!(decode_list(&out[1..]), spans);
    }

    #[test]
    fn empty_list_encodes_to_nothing() {
        assert!(encode_list(&[]).is_empty());
    }

    #[test]
    fn malformed_input_decodes_to_empty() {
        for bytes in [
            &b""[..],
            b"malformed",
            b"[\"='",
            &encode(&client_span())[..10], // truncated
        ] {
            assert!(decode(bytes).is_empty(), "input {bytes:?}");
            assert!(decode_list(bytes).is_empty(), "input {bytes:?}");
            assert!(decode_one(bytes).is_none(), "input {bytes:?}");
        }
    }

    #[test]
    fn huge_list_count_is_rejected() {
        // list of structs claiming u32::MAX/4 elements
        let bytes = [TYPE_STRUCT, 0x3f, 0xff, 0xff, 0xff, 0x00];
        assert!(decode_list(&bytes).is_empty());
    }

    #[test]
    fn merged_record_with_both_sides_splits_on_decode() {
        let frontend =
            Endpoint::builder().service_name("frontend").build();
        let backend = Endpoint::builder().service_name("backend").build();
        let annotations = [
            (1_000u64, "cs", &frontend),
            (1_050, "sr", &backend),
            (1_150, "ss", &backend),
            (1_200, "cr", &frontend),
        ];

        // A finagle-era record where client and server logged to one span.
        let mut buffer = WriteBuffer::with_capacity(512);
        TRACE_ID.write(&mut buffer);
        buffer.write_u64_be(1);
        NAME.write(&mut buffer);
        buffer.write_i32_be(0);
        ID.write(&mut buffer);
        buffer.write_u64_be(2);
        ANNOTATIONS.write(&mut buffer);
        buffer.write_byte(TYPE_STRUCT);
        buffer.write_i32_be(annotations.len() as i32);
        for (timestamp, value, endpoint) in annotations {
            let annotation = V1Annotation {
                timestamp,
                value: value.into(),
                endpoint: None,
            };
            write_annotation(&annotation, Some(endpoint), &mut buffer);
        }
        BINARY_ANNOTATIONS.write(&mut buffer);
        buffer.write_byte(TYPE_STRUCT);
        buffer.write_i32_be(0);
        buffer.write_byte(TYPE_STOP);

        let spans = decode(&buffer.into_bytes());
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().any(|s| s.shared));
        assert!(spans.iter().any(|s| s.kind == Some(Kind::Client)));
    }
}
