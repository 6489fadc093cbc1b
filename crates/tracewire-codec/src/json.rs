//! JSON codec.
//!
//! Writing always emits the canonical camelCase shape via serde. Reading
//! accepts both that shape and the legacy one; the two are told apart by
//! probing for a `binaryAnnotations` member, which only legacy records
//! carry. Legacy records are converted through [`v1_to_v2`], so one record
//! can decode into two spans when a client and server shared it.

use serde::Deserialize;
use serde_json::Value;
use tracewire_model::{hex_to_u64, Endpoint, Span};

use crate::v1::{v1_to_v2, V1Span};

pub fn size_in_bytes(span: &Span) -> usize {
    encode(span).len()
}

pub fn encode(span: &Span) -> Vec<u8> {
    serde_json::to_vec(span).unwrap_or_default()
}

pub fn encode_list(spans: &[Span]) -> Vec<u8> {
    serde_json::to_vec(spans).unwrap_or_default()
}

/// In-place variant of [`encode_list`]; returns the bytes appended.
pub fn encode_list_into(spans: &[Span], out: &mut Vec<u8>) -> usize {
    let bytes = encode_list(spans);
    let written = bytes.len();
    out.extend_from_slice(&bytes);
    written
}

/// Decodes a single JSON object in either shape. A legacy record that held
/// both sides of an RPC yields its first span.
pub fn decode_one(bytes: &[u8]) -> Option<Span> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    if !value.is_object() {
        return None;
    }
    decode_value(value).and_then(|mut spans| {
        if spans.is_empty() {
            None
        } else {
            Some(spans.remove(0))
        }
    })
}

/// Decodes a JSON array of spans in either shape. Returns an empty list when
/// the input is not well-formed, so callers can count the drop and move on.
pub fn decode_list(bytes: &[u8]) -> Vec<Span> {
    let list: Vec<Value> = match serde_json::from_slice(bytes) {
        Ok(list) => list,
        Err(error) => {
            tracing::debug!(%error, "dropping malformed json span list");
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for value in list {
        match decode_value(value) {
            Some(spans) => out.extend(spans),
            None => {
                tracing::debug!("dropping json span list with invalid entry");
                return Vec::new();
            }
        }
    }
    out
}

fn decode_value(value: Value) -> Option<Vec<Span>> {
    if value.get("binaryAnnotations").is_some() {
        let legacy: JsonV1Span = serde_json::from_value(value).ok()?;
        return Some(v1_to_v2(&legacy.into_v1()));
    }
    let span: Span = serde_json::from_value(value).ok()?;
    // re-run normalization: pad IDs, sort annotations, drop self-parents
    span.to_builder().build().ok().map(|span| vec![span])
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonV1Span {
    trace_id: String,
    id: String,
    parent_id: Option<String>,
    name: Option<String>,
    timestamp: Option<u64>,
    duration: Option<u64>,
    annotations: Vec<JsonV1Annotation>,
    binary_annotations: Vec<JsonV1BinaryAnnotation>,
    debug: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonV1Annotation {
    timestamp: u64,
    value: String,
    endpoint: Option<JsonV1Endpoint>,
}

// `value` stays a raw JSON value: legacy writers emitted strings, booleans
// and numbers here, and an address marker is a boolean.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonV1BinaryAnnotation {
    key: String,
    value: Value,
    endpoint: Option<JsonV1Endpoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonV1Endpoint {
    service_name: Option<String>,
    ipv4: Option<String>,
    ipv6: Option<String>,
    port: Option<i32>,
}

impl JsonV1Span {
    fn into_v1(self) -> V1Span {
        let mut span = V1Span {
            trace_id_high: hex_high(&self.trace_id),
            trace_id: hex_low(&self.trace_id),
            id: hex_low(&self.id),
            parent_id: self.parent_id.as_deref().map_or(0, hex_low),
            timestamp: self.timestamp.unwrap_or(0),
            duration: self.duration.unwrap_or(0),
            debug: self.debug,
            ..V1Span::default()
        };
        if let Some(name) = &self.name {
            span.set_name(name);
        }
        for annotation in self.annotations {
            if annotation.timestamp == 0 || annotation.value.is_empty() {
                continue;
            }
            span.add_annotation(
                annotation.timestamp,
                annotation.value,
                annotation.endpoint.and_then(JsonV1Endpoint::into_endpoint),
            );
        }
        for binary in self.binary_annotations {
            let endpoint =
                binary.endpoint.and_then(JsonV1Endpoint::into_endpoint);
            match binary.value {
                Value::String(value) => {
                    span.add_string_annotation(binary.key, value, endpoint)
                }
                Value::Bool(true)
                    if endpoint.is_some()
                        && matches!(binary.key.as_str(), "sa" | "ca" | "ma") =>
                {
                    span.add_address_annotation(binary.key, endpoint)
                }
                Value::Bool(value) => span.add_string_annotation(
                    binary.key,
                    value.to_string(),
                    endpoint,
                ),
                Value::Number(value) => span.add_string_annotation(
                    binary.key,
                    value.to_string(),
                    endpoint,
                ),
                _ => {}
            }
        }
        span
    }
}

impl JsonV1Endpoint {
    fn into_endpoint(self) -> Option<Endpoint> {
        let mut builder = Endpoint::builder();
        if let Some(name) = self.service_name {
            builder = builder.service_name(name);
        }
        if let Some(ipv4) = &self.ipv4 {
            builder.parse_ip(ipv4);
        }
        if let Some(ipv6) = &self.ipv6 {
            builder.parse_ip(ipv6);
        }
        // legacy writers used -1 for unknown and sometimes wrote the port as
        // an unsigned value that overflowed the signed 16-bit wire field
        if let Some(port) = self.port {
            if port > 0 {
                builder = builder.port(port as u16);
            }
        }
        builder.build().filter_empty()
    }
}

fn hex_high(hex: &str) -> u64 {
    if hex.len() > 16 {
        hex_to_u64(&hex[..hex.len() - 16])
    } else {
        0
    }
}

fn hex_low(hex: &str) -> u64 {
    if hex.len() > 16 {
        hex_to_u64(&hex[hex.len() - 16..])
    } else {
        hex_to_u64(hex)
    }
}

#[cfg(test)]
mod tests {
    use tracewire_model::Kind;

    use super::*;

    fn client_span() -> Span {
        Span::builder()
            .trace_id("48485a3953bb612446e0a2c7ba4c6d31")
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
            .annotation(1_472_470_996_238_000, "foo")
            .tag("http.path", "/api")
            .build()
            .unwrap()
    }

    #[test]
    fn canonical_shape_round_trips() {
        let span = client_span();
        assert_eq!(decode_one(&encode(&span)), Some(span.clone()));
        assert_eq!(decode_list(&encode_list(&[span.clone()])), vec![span]);
    }

    #[test]
    fn writes_camel_case_and_omits_absent_fields() {
        let json = String::from_utf8(encode(&client_span())).unwrap();
        assert!(json.contains("\"traceId\""));
        assert!(json.contains("\"localEndpoint\""));
        assert!(json.contains("\"serviceName\""));
        assert!(!json.contains("parentId"), "absent fields are omitted");
        assert!(!json.contains("shared"));
    }

    #[test]
    fn size_matches_encoded_length() {
        let span = client_span();
        assert_eq!(size_in_bytes(&span), encode(&span).len());
    }

    #[test]
    fn legacy_client_record_converts() {
        let json = br#"[{
            "traceId": "48485a3953bb6124",
            "id": "5b4185666d50f68b",
            "name": "GET",
            "timestamp": 1472470996199000,
            "duration": 207000,
            "annotations": [
                {"timestamp": 1472470996199000, "value": "cs",
                 "endpoint": {"serviceName": "frontend", "ipv4": "127.0.0.1"}},
                {"timestamp": 1472470996406000, "value": "cr",
                 "endpoint": {"serviceName": "frontend", "ipv4": "127.0.0.1"}}
            ],
            "binaryAnnotations": [
                {"key": "http.path", "value": "/api",
                 "endpoint": {"serviceName": "frontend", "ipv4": "127.0.0.1"}},
                {"key": "sa", "value": true,
                 "endpoint": {"serviceName": "backend", "ipv4": "192.168.99.101", "port": 9000}}
            ]
        }]"#;

        let spans = decode_list(json);
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.kind, Some(Kind::Client));
        assert_eq!(span.name.as_deref(), Some("get"));
        assert_eq!(span.timestamp, Some(1_472_470_996_199_000));
        assert_eq!(span.duration, Some(207_000));
        assert_eq!(span.local_service_name(), Some("frontend"));
        assert_eq!(span.remote_service_name(), Some("backend"));
        assert_eq!(span.remote_endpoint.as_ref().unwrap().port, Some(9000));
        assert_eq!(span.tags.get("http.path").map(String::as_str), Some("/api"));
        assert!(span.annotations.is_empty(), "cs/cr fold into kind");
    }

    #[test]
    fn legacy_merged_record_splits_in_two() {
        let json = br#"[{
            "traceId": "48485a3953bb6124",
            "id": "5b4185666d50f68b",
            "name": "get",
            "annotations": [
                {"timestamp": 100000, "value": "cs",
                 "endpoint": {"serviceName": "frontend"}},
                {"timestamp": 150000, "value": "sr",
                 "endpoint": {"serviceName": "backend"}},
                {"timestamp": 180000, "value": "ss",
                 "endpoint": {"serviceName": "backend"}},
                {"timestamp": 200000, "value": "cr",
                 "endpoint": {"serviceName": "frontend"}}
            ],
            "binaryAnnotations": []
        }]"#;

        let spans = decode_list(json);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, Some(Kind::Client));
        assert_eq!(spans[1].kind, Some(Kind::Server));
        assert!(spans[1].shared);
    }

    #[test]
    fn legacy_number_and_bool_values_become_string_tags() {
        let json = br#"[{
            "traceId": "1", "id": "2",
            "binaryAnnotations": [
                {"key": "http.status_code", "value": 500},
                {"key": "error", "value": false}
            ]
        }]"#;

        let spans = decode_list(json);
        assert_eq!(spans.len(), 1);
        assert_eq!(
            spans[0].tags.get("http.status_code").map(String::as_str),
            Some("500")
        );
        assert_eq!(spans[0].tags.get("error").map(String::as_str), Some("false"));
    }

    #[test]
    fn canonical_ids_are_normalized_on_read() {
        let json = br#"[{"traceId": "a", "id": "b", "parentId": "b"}]"#;
        let spans = decode_list(json);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].trace_id, "000000000000000a");
        assert_eq!(spans[0].id, "000000000000000b");
        assert!(spans[0].parent_id.is_none(), "self-parent is cleared");
    }

    #[test]
    fn malformed_input_decodes_to_empty() {
        for bytes in [
            &b""[..],
            b"malformed",
            b"{\"traceId\": \"1\"}",
            b"[{\"traceId\": \"1\"}]",
            b"[\"='",
        ] {
            assert!(decode_one(bytes).is_none(), "input {bytes:?}");
            assert!(decode_list(bytes).is_empty(), "input {bytes:?}");
        }
    }

    #[test]
    fn empty_list_decodes_to_empty() {
        assert!(decode_list(b"[]").is_empty());
        assert!(decode_list(b" [ ] ").is_empty());
    }
}
