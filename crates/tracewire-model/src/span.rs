use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Endpoint, ModelError};

/// Indicates the network context of an operation, used to place the span in
/// the service dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Kind {
    Client,
    Server,
    Producer,
    Consumer,
}

impl Kind {
    /// Wire enum value used by the proto3 codec; zero is "unspecified".
    pub fn wire_value(self) -> u64 {
        match self {
            Kind::Client => 1,
            Kind::Server => 2,
            Kind::Producer => 3,
            Kind::Consumer => 4,
        }
    }

    pub fn from_wire_value(value: u64) -> Option<Kind> {
        match value {
            1 => Some(Kind::Client),
            2 => Some(Kind::Server),
            3 => Some(Kind::Producer),
            4 => Some(Kind::Consumer),
            _ => None,
        }
    }
}

/// A timestamped event explaining latency within a span.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Annotation {
    /// Microseconds since epoch.
    pub timestamp: u64,
    pub value: String,
}

/// One timed operation within a trace.
///
/// Built by [`Span::builder`], which enforces the ID invariants and
/// normalizes names and hex IDs; decoders feed everything through the same
/// builder so equal logical spans compare equal regardless of wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Span {
    /// 16 or 32 lower-hex characters, never all zeros.
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// 16 lower-hex characters, never all zeros.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Microseconds since epoch of the start of this span.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Microseconds of critical path, if known. Never zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "is_false")]
    pub debug: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub shared: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Span {
    pub fn builder() -> SpanBuilder {
        SpanBuilder::default()
    }

    /// Re-opens this span for merging or re-normalization.
    pub fn to_builder(&self) -> SpanBuilder {
        SpanBuilder {
            trace_id: Some(self.trace_id.clone()),
            parent_id: self.parent_id.clone(),
            id: Some(self.id.clone()),
            kind: self.kind,
            name: self.name.clone(),
            timestamp: self.timestamp,
            duration: self.duration,
            local_endpoint: self.local_endpoint.clone(),
            remote_endpoint: self.remote_endpoint.clone(),
            annotations: self.annotations.clone(),
            tags: self.tags.clone(),
            debug: self.debug,
            shared: self.shared,
        }
    }

    pub fn is_128bit_trace(&self) -> bool {
        self.trace_id.len() == 32
    }

    /// High 64 bits of the trace ID, zero for 64-bit traces.
    pub fn trace_id_high(&self) -> u64 {
        if self.trace_id.len() == 32 {
            hex_to_u64(&self.trace_id[..16])
        } else {
            0
        }
    }

    /// Low 64 bits of the trace ID, the part legacy indexes key on.
    pub fn trace_id_low(&self) -> u64 {
        let hex = &self.trace_id[self.trace_id.len().saturating_sub(16)..];
        hex_to_u64(hex)
    }

    pub fn id_u64(&self) -> u64 {
        hex_to_u64(&self.id)
    }

    pub fn parent_id_u64(&self) -> Option<u64> {
        self.parent_id.as_deref().map(hex_to_u64)
    }

    pub fn local_service_name(&self) -> Option<&str> {
        self.local_endpoint
            .as_ref()
            .and_then(|e| e.service_name.as_deref())
    }

    pub fn remote_service_name(&self) -> Option<&str> {
        self.remote_endpoint
            .as_ref()
            .and_then(|e| e.service_name.as_deref())
    }
}

/// Formats a 64-bit ID the way every index and wire format expects it.
pub fn lower_hex(id: u64) -> String {
    format!("{id:016x}")
}

/// Lenient inverse of [`lower_hex`] for already-normalized IDs.
pub fn hex_to_u64(hex: &str) -> u64 {
    u64::from_str_radix(hex, 16).unwrap_or(0)
}

/// Pads a trace ID to 16 or 32 lower-hex characters, dropping an all-zero
/// high half. All-zero IDs and non-lower-hex input are rejected.
pub fn normalize_trace_id(trace_id: &str) -> Result<String, ModelError> {
    if trace_id.is_empty() || trace_id.len() > 32 {
        return Err(ModelError::InvalidTraceId(trace_id.to_owned()));
    }
    if !is_lower_hex(trace_id) {
        return Err(ModelError::InvalidTraceId(trace_id.to_owned()));
    }
    let width = if trace_id.len() > 16 { 32 } else { 16 };
    let mut normalized = String::with_capacity(width);
    for _ in 0..width - trace_id.len() {
        normalized.push('0');
    }
    normalized.push_str(trace_id);
    if normalized.len() == 32 && normalized[..16].bytes().all(|b| b == b'0') {
        normalized.drain(..16);
    }
    if normalized.bytes().all(|b| b == b'0') {
        return Err(ModelError::EmptyTraceId);
    }
    Ok(normalized)
}

/// Pads a span or parent ID to 16 lower-hex characters. All zeros means
/// "absent", surfaced as `Ok(None)` so callers decide if that is an error.
pub fn normalize_id(
    name: &'static str,
    id: &str,
) -> Result<Option<String>, ModelError> {
    if id.is_empty() || id.len() > 16 || !is_lower_hex(id) {
        return Err(ModelError::InvalidId { name, value: id.to_owned() });
    }
    let mut normalized = String::with_capacity(16);
    for _ in 0..16 - id.len() {
        normalized.push('0');
    }
    normalized.push_str(id);
    if normalized.bytes().all(|b| b == b'0') {
        return Ok(None);
    }
    Ok(Some(normalized))
}

fn is_lower_hex(id: &str) -> bool {
    id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[derive(Debug, Default, Clone)]
pub struct SpanBuilder {
    trace_id: Option<String>,
    parent_id: Option<String>,
    id: Option<String>,
    kind: Option<Kind>,
    name: Option<String>,
    timestamp: Option<u64>,
    duration: Option<u64>,
    local_endpoint: Option<Endpoint>,
    remote_endpoint: Option<Endpoint>,
    annotations: Vec<Annotation>,
    tags: BTreeMap<String, String>,
    debug: bool,
    shared: bool,
}

impl SpanBuilder {
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Sets the trace ID from its two 64-bit halves.
    pub fn trace_id_parts(mut self, high: u64, low: u64) -> Self {
        self.trace_id = Some(if high != 0 {
            format!("{high:016x}{low:016x}")
        } else {
            lower_hex(low)
        });
        self
    }

    pub fn parent_id(mut self, parent_id: impl Into<String>) -> Self {
        let parent_id = parent_id.into();
        self.parent_id = if parent_id.is_empty() {
            None
        } else {
            Some(parent_id)
        };
        self
    }

    pub fn parent_id_u64(mut self, parent_id: u64) -> Self {
        self.parent_id = if parent_id == 0 {
            None
        } else {
            Some(lower_hex(parent_id))
        };
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id_u64(mut self, id: u64) -> Self {
        self.id = Some(lower_hex(id));
        self
    }

    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.is_empty() {
            None
        } else {
            Some(name.to_ascii_lowercase())
        };
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = if timestamp == 0 { None } else { Some(timestamp) };
        self
    }

    pub fn duration(mut self, duration: u64) -> Self {
        self.duration = if duration == 0 { None } else { Some(duration) };
        self
    }

    pub fn local_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.local_endpoint = endpoint.filter_empty();
        self
    }

    pub fn remote_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.remote_endpoint = endpoint.filter_empty();
        self
    }

    pub fn annotation(
        mut self,
        timestamp: u64,
        value: impl Into<String>,
    ) -> Self {
        self.annotations.push(Annotation { timestamp, value: value.into() });
        self
    }

    pub fn tag(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Fills absent fields from another message reporting the same span,
    /// used when a span arrives split across transports or batches.
    pub fn merge(mut self, other: &Span) -> Self {
        if self.kind.is_none() {
            self.kind = other.kind;
        }
        if self.name.is_none() {
            self.name = other.name.clone();
        }
        if self.timestamp.is_none() {
            self.timestamp = other.timestamp;
        }
        if self.duration.is_none() {
            self.duration = other.duration;
        }
        if self.local_endpoint.is_none() {
            self.local_endpoint = other.local_endpoint.clone();
        }
        if self.remote_endpoint.is_none() {
            self.remote_endpoint = other.remote_endpoint.clone();
        }
        self.annotations.extend(other.annotations.iter().cloned());
        for (key, value) in &other.tags {
            self.tags.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self.debug |= other.debug;
        self.shared |= other.shared;
        self
    }

    pub fn build(mut self) -> Result<Span, ModelError> {
        let trace_id = match self.trace_id {
            Some(trace_id) => normalize_trace_id(&trace_id)?,
            None => return Err(ModelError::MissingField("traceId")),
        };
        let id = match self.id {
            Some(id) => normalize_id("id", &id)?
                .ok_or(ModelError::EmptySpanId)?,
            None => return Err(ModelError::MissingField("id")),
        };
        let parent_id = match self.parent_id {
            Some(parent_id) => normalize_id("parentId", &parent_id)?,
            None => None,
        };
        // A span cannot be its own parent.
        let parent_id = parent_id.filter(|parent_id| *parent_id != id);

        self.annotations.sort();
        self.annotations.dedup();

        Ok(Span {
            trace_id,
            parent_id,
            id,
            kind: self.kind,
            name: self.name,
            timestamp: self.timestamp,
            duration: self.duration,
            local_endpoint: self.local_endpoint,
            remote_endpoint: self.remote_endpoint,
            annotations: self.annotations,
            tags: self.tags,
            debug: self.debug,
            shared: self.shared,
        })
    }
}
