//! Legacy span shape used by the Thrift wire format and old JSON payloads.
//!
//! A v1 span mixes both sides of an RPC into one record: the caller and
//! callee each log core annotations ("cs", "sr", ...) and the span carries
//! typed binary annotations instead of a tag map. [`v1_to_v2`] splits such a
//! record into one canonical span per reporting endpoint; [`v2_to_v1`] is
//! its inverse, used when encoding to the legacy format.

use tracewire_model::{Annotation, Endpoint, Kind, Span};

/// Span in the legacy shape. IDs are packed 64-bit words; zero means unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct V1Span {
    pub trace_id_high: u64,
    pub trace_id: u64,
    pub id: u64,
    pub parent_id: u64,
    pub name: Option<String>,
    pub timestamp: u64,
    pub duration: u64,
    pub annotations: Vec<V1Annotation>,
    pub binary_annotations: Vec<V1BinaryAnnotation>,
    pub debug: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct V1Annotation {
    pub timestamp: u64,
    pub value: String,
    pub endpoint: Option<Endpoint>,
}

/// `string_value` present means a tag; absent means an address annotation
/// whose endpoint is the remote side of the call.
#[derive(Debug, Clone, PartialEq)]
pub struct V1BinaryAnnotation {
    pub key: String,
    pub string_value: Option<String>,
    pub endpoint: Option<Endpoint>,
}

impl V1Span {
    pub fn set_name(&mut self, name: &str) {
        self.name = if name.is_empty() {
            None
        } else {
            Some(name.to_ascii_lowercase())
        };
    }

    pub fn add_annotation(
        &mut self,
        timestamp: u64,
        value: impl Into<String>,
        endpoint: Option<Endpoint>,
    ) {
        self.annotations.push(V1Annotation {
            timestamp,
            value: value.into(),
            endpoint: endpoint.and_then(Endpoint::filter_empty),
        });
    }

    /// Ignores empty endpoints rather than failing on bad address data.
    pub fn add_address_annotation(
        &mut self,
        key: impl Into<String>,
        endpoint: Option<Endpoint>,
    ) {
        let Some(endpoint) = endpoint.and_then(Endpoint::filter_empty) else {
            return;
        };
        self.binary_annotations.push(V1BinaryAnnotation {
            key: key.into(),
            string_value: None,
            endpoint: Some(endpoint),
        });
    }

    pub fn add_string_annotation(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        endpoint: Option<Endpoint>,
    ) {
        self.binary_annotations.push(V1BinaryAnnotation {
            key: key.into(),
            string_value: Some(value.into()),
            endpoint: endpoint.and_then(Endpoint::filter_empty),
        });
    }
}

// Working copy of one output span while untangling a v1 record. Durations
// and timestamps use zero for absent, like the v1 wire form.
#[derive(Debug, Clone, Default)]
struct Shell {
    kind: Option<Kind>,
    local_endpoint: Option<Endpoint>,
    remote_endpoint: Option<Endpoint>,
    timestamp: u64,
    duration: u64,
    shared: bool,
    annotations: Vec<(u64, String)>,
    tags: Vec<(String, String)>,
}

/// Splits a legacy span into one canonical span per reporting endpoint.
///
/// Returns an empty vec when the record is structurally invalid (zero trace
/// or span ID), keeping the lenient decode contract.
pub fn v1_to_v2(source: &V1Span) -> Vec<Span> {
    let mut shells: Vec<Shell> = vec![Shell::default()];
    let mut core = CoreAnnotations::default();

    process_annotations(source, &mut shells, &mut core);
    process_binary_annotations(source, &mut shells, &core);
    finish(source, shells)
}

#[derive(Default)]
struct CoreAnnotations {
    cs: Option<V1Annotation>,
    sr: Option<V1Annotation>,
    ss: Option<V1Annotation>,
    cr: Option<V1Annotation>,
    ms: Option<V1Annotation>,
    mr: Option<V1Annotation>,
    ws: Option<V1Annotation>,
    wr: Option<V1Annotation>,
}

fn process_annotations(
    source: &V1Span,
    shells: &mut Vec<Shell>,
    core: &mut CoreAnnotations,
) {
    for a in &source.annotations {
        let idx = for_endpoint(shells, a.endpoint.as_ref());
        // Core annotations require an endpoint; without one they are kept
        // as plain annotations.
        if a.value.len() == 2 && a.endpoint.is_some() {
            match a.value.as_str() {
                "cs" => {
                    shells[idx].kind = Some(Kind::Client);
                    core.cs = Some(a.clone());
                }
                "sr" => {
                    shells[idx].kind = Some(Kind::Server);
                    core.sr = Some(a.clone());
                }
                "ss" => {
                    shells[idx].kind = Some(Kind::Server);
                    core.ss = Some(a.clone());
                }
                "cr" => {
                    shells[idx].kind = Some(Kind::Client);
                    core.cr = Some(a.clone());
                }
                "ms" => {
                    shells[idx].kind = Some(Kind::Producer);
                    core.ms = Some(a.clone());
                }
                "mr" => {
                    shells[idx].kind = Some(Kind::Consumer);
                    core.mr = Some(a.clone());
                }
                "ws" => core.ws = Some(a.clone()),
                "wr" => core.wr = Some(a.clone()),
                _ => shells[idx].annotations.push((a.timestamp, a.value.clone())),
            }
        } else {
            shells[idx].annotations.push((a.timestamp, a.value.clone()));
        }
    }

    // When bridging between event and span models a start annotation can go
    // missing; recover it from the explicit timestamp and duration.
    if core.cs.is_none() && end_reflects_duration(core.cr.as_ref(), source) {
        core.cs = Some(V1Annotation {
            timestamp: source.timestamp,
            value: "cs".into(),
            endpoint: core.cr.as_ref().and_then(|a| a.endpoint.clone()),
        });
    }
    if core.sr.is_none() && end_reflects_duration(core.ss.as_ref(), source) {
        core.sr = Some(V1Annotation {
            timestamp: source.timestamp,
            value: "sr".into(),
            endpoint: core.ss.as_ref().and_then(|a| a.endpoint.clone()),
        });
    }

    if core.cs.is_some() && core.sr.is_some() {
        // In a shared span the client side owns span duration, via
        // annotations or the explicit timestamp.
        let cs = core.cs.clone().unwrap();
        let sr = core.sr.clone().unwrap();
        maybe_timestamp_duration(shells, source, &cs, core.cr.as_ref());

        // Loopback calls need a forked span so both sides exist.
        let client = for_endpoint(shells, cs.endpoint.as_ref());
        let server = if same_service(cs.endpoint.as_ref(), sr.endpoint.as_ref())
        {
            shells[client].kind = Some(Kind::Client);
            let forked = new_shell(shells, sr.endpoint.clone());
            shells[forked].kind = Some(Kind::Server);
            forked
        } else {
            for_endpoint(shells, sr.endpoint.as_ref())
        };

        shells[server].shared = true;
        shells[server].timestamp = sr.timestamp;
        if let Some(ss) = &core.ss {
            shells[server].duration = ss.timestamp.saturating_sub(sr.timestamp);
        }
        if core.cr.is_none() && source.duration == 0 {
            shells[client].duration = 0; // one-way has no duration
        }
    } else if core.cs.is_some() && core.cr.is_some() {
        let cs = core.cs.clone().unwrap();
        maybe_timestamp_duration(shells, source, &cs, core.cr.as_ref());
    } else if core.sr.is_some() && core.ss.is_some() {
        let sr = core.sr.clone().unwrap();
        maybe_timestamp_duration(shells, source, &sr, core.ss.as_ref());
    } else {
        handle_incomplete_rpc(source, shells, core);
    }

    // The v1 format had no shared flag; an absent timestamp on the server
    // side implied it. Carry that signal over.
    if core.cs.is_none() {
        if let Some(sr) = &core.sr {
            if source.timestamp == 0
                || (core.ss.is_some() && source.duration == 0)
            {
                let idx = for_endpoint(shells, sr.endpoint.as_ref());
                shells[idx].shared = true;
            }
        }
    }

    match (core.ms.clone(), core.mr.clone()) {
        // ms and mr are not supposed to share a span, but in case they do..
        (Some(ms), Some(mr)) => {
            let producer = for_endpoint(shells, ms.endpoint.as_ref());
            let consumer =
                if same_service(ms.endpoint.as_ref(), mr.endpoint.as_ref()) {
                    shells[producer].kind = Some(Kind::Producer);
                    let forked = new_shell(shells, mr.endpoint.clone());
                    shells[forked].kind = Some(Kind::Consumer);
                    forked
                } else {
                    for_endpoint(shells, mr.endpoint.as_ref())
                };

            shells[consumer].shared = true;
            if let Some(wr) = &core.wr {
                shells[consumer].timestamp = wr.timestamp;
                shells[consumer].duration =
                    mr.timestamp.saturating_sub(wr.timestamp);
            } else {
                shells[consumer].timestamp = mr.timestamp;
            }

            shells[producer].timestamp = ms.timestamp;
            shells[producer].duration = core
                .ws
                .as_ref()
                .map(|ws| ws.timestamp.saturating_sub(ms.timestamp))
                .unwrap_or(0);
        }
        (Some(ms), None) => {
            maybe_timestamp_duration(shells, source, &ms, core.ws.as_ref());
        }
        (None, Some(mr)) => {
            if let Some(wr) = core.wr.clone() {
                maybe_timestamp_duration(shells, source, &wr, Some(&mr));
            } else {
                maybe_timestamp_duration(shells, source, &mr, None);
            }
        }
        (None, None) => {
            for wire in [&core.ws, &core.wr].into_iter().flatten().cloned() {
                let idx = for_endpoint(shells, wire.endpoint.as_ref());
                shells[idx].annotations.push((wire.timestamp, wire.value));
            }
        }
    }
}

fn handle_incomplete_rpc(
    source: &V1Span,
    shells: &mut [Shell],
    core: &CoreAnnotations,
) {
    for shell in shells.iter_mut() {
        match shell.kind {
            Some(Kind::Client) => {
                if let Some(cs) = &core.cs {
                    shell.timestamp = cs.timestamp;
                }
                if let Some(cr) = &core.cr {
                    shell.annotations.push((cr.timestamp, cr.value.clone()));
                }
            }
            Some(Kind::Server) => {
                if let Some(sr) = &core.sr {
                    shell.timestamp = sr.timestamp;
                }
                if let Some(ss) = &core.ss {
                    shell.annotations.push((ss.timestamp, ss.value.clone()));
                }
            }
            _ => {}
        }
    }
    if source.timestamp != 0 {
        shells[0].timestamp = source.timestamp;
        shells[0].duration = source.duration;
    }
}

fn end_reflects_duration(end: Option<&V1Annotation>, source: &V1Span) -> bool {
    match end {
        Some(end) => {
            source.timestamp != 0
                && source.duration != 0
                && source.timestamp.saturating_add(source.duration)
                    == end.timestamp
        }
        None => false,
    }
}

fn maybe_timestamp_duration(
    shells: &mut Vec<Shell>,
    source: &V1Span,
    begin: &V1Annotation,
    end: Option<&V1Annotation>,
) {
    let idx = for_endpoint(shells, begin.endpoint.as_ref());
    if source.timestamp != 0 && source.duration != 0 {
        shells[idx].timestamp = source.timestamp;
        shells[idx].duration = source.duration;
    } else {
        shells[idx].timestamp = begin.timestamp;
        if let Some(end) = end {
            shells[idx].duration =
                end.timestamp.saturating_sub(begin.timestamp);
        }
    }
}

fn process_binary_annotations(
    source: &V1Span,
    shells: &mut Vec<Shell>,
    core: &CoreAnnotations,
) {
    let mut ca: Option<Endpoint> = None;
    let mut sa: Option<Endpoint> = None;
    let mut ma: Option<Endpoint> = None;

    for b in &source.binary_annotations {
        // Address annotations are peeked by key alone: some tracers report
        // them with a string value, so the value is not trustworthy.
        match b.key.as_str() {
            "ca" => {
                ca = b.endpoint.clone();
                continue;
            }
            "sa" => {
                sa = b.endpoint.clone();
                continue;
            }
            "ma" => {
                ma = b.endpoint.clone();
                continue;
            }
            _ => {}
        }

        let idx = for_endpoint(shells, b.endpoint.as_ref());
        let value = b.string_value.clone().unwrap_or_default();
        // "lc" with an empty value only marks the local endpoint
        if b.key == "lc" && value.is_empty() {
            continue;
        }
        shells[idx].tags.push((b.key.clone(), value));
    }

    let no_core = core.cs.is_none()
        && core.cr.is_none()
        && core.ss.is_none()
        && core.sr.is_none();
    if no_core && (ca.is_some() || sa.is_some()) {
        match (ca, sa) {
            (Some(ca), Some(sa)) => {
                let idx = for_endpoint(shells, Some(&ca));
                shells[idx].remote_endpoint = Some(sa);
            }
            (None, Some(sa)) => {
                // "sa" is a default for a remote address, don't make it a
                // client span
                shells[0].remote_endpoint = Some(sa);
            }
            (Some(ca), None) => {
                shells[0].kind = Some(Kind::Server);
                shells[0].remote_endpoint = Some(ca);
            }
            (None, None) => unreachable!(),
        }
        return;
    }

    let server = core.sr.as_ref().or(core.ss.as_ref());
    if let (Some(ca_endpoint), Some(server)) = (ca.clone(), server) {
        if Some(&ca_endpoint) != server.endpoint.as_ref() {
            let mut ca_endpoint = ca_endpoint;
            // Finagle repeats the callee service name on the client address;
            // dropping it prevents loopback links.
            if let Some(server_endpoint) = server.endpoint.as_ref() {
                if ca_endpoint.service_name == server_endpoint.service_name {
                    ca_endpoint.service_name = None;
                }
            }
            let idx = for_endpoint(shells, server.endpoint.as_ref());
            shells[idx].remote_endpoint = Some(ca_endpoint);
        }
    }
    if let Some(sa) = sa {
        // client span
        if let Some(cs) = &core.cs {
            let idx = for_endpoint(shells, cs.endpoint.as_ref());
            shells[idx].remote_endpoint = Some(sa);
        } else if let Some(cr) = &core.cr {
            let idx = for_endpoint(shells, cr.endpoint.as_ref());
            shells[idx].remote_endpoint = Some(sa);
        }
    }
    if let Some(ma) = ma {
        // Both sides of an accidentally shared messaging span get the
        // broker address.
        if let Some(ms) = &core.ms {
            let idx = for_endpoint(shells, ms.endpoint.as_ref());
            shells[idx].remote_endpoint = Some(ma.clone());
        }
        if let Some(mr) = &core.mr {
            let idx = for_endpoint(shells, mr.endpoint.as_ref());
            shells[idx].remote_endpoint = Some(ma);
        }
    }
}

// Missing endpoint data is allocated to the first shell.
fn for_endpoint(shells: &mut Vec<Shell>, endpoint: Option<&Endpoint>) -> usize {
    let Some(endpoint) = endpoint else { return 0 };
    for idx in 0..shells.len() {
        match &shells[idx].local_endpoint {
            None => {
                shells[idx].local_endpoint = Some(endpoint.clone());
                return idx;
            }
            Some(local) if local.service_name == endpoint.service_name => {
                return idx;
            }
            _ => {}
        }
    }
    new_shell(shells, Some(endpoint.clone()))
}

fn new_shell(shells: &mut Vec<Shell>, endpoint: Option<Endpoint>) -> usize {
    shells.push(Shell { local_endpoint: endpoint, ..Shell::default() });
    shells.len() - 1
}

fn same_service(left: Option<&Endpoint>, right: Option<&Endpoint>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => left.service_name == right.service_name,
        _ => false,
    }
}

fn finish(source: &V1Span, shells: Vec<Shell>) -> Vec<Span> {
    let mut out = Vec::with_capacity(shells.len());
    for shell in shells {
        let mut builder = Span::builder()
            .trace_id_parts(source.trace_id_high, source.trace_id)
            .parent_id_u64(source.parent_id)
            .id_u64(source.id)
            .name(source.name.clone().unwrap_or_default())
            .timestamp(shell.timestamp)
            .duration(shell.duration)
            .debug(source.debug == Some(true))
            .shared(shell.shared);
        if let Some(kind) = shell.kind {
            builder = builder.kind(kind);
        }
        if let Some(endpoint) = shell.local_endpoint {
            builder = builder.local_endpoint(endpoint);
        }
        if let Some(endpoint) = shell.remote_endpoint {
            builder = builder.remote_endpoint(endpoint);
        }
        for (timestamp, value) in shell.annotations {
            builder = builder.annotation(timestamp, value);
        }
        for (key, value) in shell.tags {
            builder = builder.tag(key, value);
        }
        if let Ok(span) = builder.build() {
            out.push(span);
        }
    }
    out
}

/// Converts a canonical span back to the legacy shape for v1 encoders.
pub fn v2_to_v1(value: &Span) -> V1Span {
    let mut result = V1Span {
        trace_id_high: value.trace_id_high(),
        trace_id: value.trace_id_low(),
        id: value.id_u64(),
        parent_id: value.parent_id_u64().unwrap_or(0),
        name: value.name.clone(),
        debug: if value.debug { Some(true) } else { None },
        ..V1Span::default()
    };

    // Shared spans don't own the span's timestamp or duration; those are
    // conveyed by core annotations instead so merging works on read-back.
    if !value.shared {
        result.timestamp = value.timestamp.unwrap_or(0);
        result.duration = value.duration.unwrap_or(0);
    }

    let start_ts = value.timestamp.unwrap_or(0);
    let end_ts = match (value.timestamp, value.duration) {
        (Some(timestamp), Some(duration)) => {
            timestamp.saturating_add(duration)
        }
        _ => 0,
    };

    let mut begin: Option<&str> = None;
    let mut end: Option<&str> = None;
    let mut address_key: Option<&str> = None;
    match value.kind {
        Some(Kind::Client) => {
            address_key = Some("sa");
            begin = (start_ts != 0).then_some("cs");
            end = (end_ts != 0).then_some("cr");
        }
        Some(Kind::Server) => {
            address_key = Some("ca");
            begin = (start_ts != 0).then_some("sr");
            end = (end_ts != 0).then_some("ss");
        }
        Some(Kind::Producer) => {
            address_key = Some("ma");
            begin = (start_ts != 0).then_some("ms");
            end = (end_ts != 0).then_some("ws");
        }
        Some(Kind::Consumer) => {
            address_key = Some("ma");
            if start_ts != 0 && end_ts != 0 {
                begin = Some("wr");
                end = Some("mr");
            } else if start_ts != 0 {
                begin = Some("mr");
            }
        }
        None => {}
    }

    let endpoint = value.local_endpoint.clone();
    let mut wrote_endpoint = false;

    for Annotation { timestamp, value } in &value.annotations {
        result.add_annotation(*timestamp, value.clone(), endpoint.clone());
        wrote_endpoint |= endpoint.is_some();
    }
    if let Some(begin) = begin {
        result.add_annotation(start_ts, begin, endpoint.clone());
        wrote_endpoint |= endpoint.is_some();
    }
    if let Some(end) = end {
        result.add_annotation(end_ts, end, endpoint.clone());
    }
    for (key, tag_value) in &value.tags {
        result.add_string_annotation(
            key.clone(),
            tag_value.clone(),
            endpoint.clone(),
        );
        wrote_endpoint |= endpoint.is_some();
    }
    if let Some(key) = address_key {
        result.add_address_annotation(key, value.remote_endpoint.clone());
    }
    // Without any annotation carrying it, record the local endpoint as an
    // empty "lc" tag so it survives the v1 format.
    if !wrote_endpoint {
        if let Some(endpoint) = endpoint {
            result.add_string_annotation("lc", "", Some(endpoint));
        }
    }

    result
        .annotations
        .sort_by(|a, b| (a.timestamp, &a.value).cmp(&(b.timestamp, &b.value)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracewire_model::Endpoint;

    fn frontend() -> Endpoint {
        Endpoint::builder().service_name("frontend").ip("127.0.0.1").build()
    }

    fn backend() -> Endpoint {
        Endpoint::builder()
            .service_name("backend")
            .ip("192.168.99.101")
            .port(9000)
            .build()
    }

    #[test]
    fn client_span_round_trips() {
        let span = Span::builder()
            .trace_id("862f3daf9ab73e24")
            .id("43fc1cf5b6d5d95e")
            .name("get")
            .kind(Kind::Client)
            .timestamp(1_472_470_996_199_000)
            .duration(207_000)
            .local_endpoint(frontend())
            .remote_endpoint(backend())
            .tag("http.path", "/api")
            .build()
            .unwrap();

        let v1 = v2_to_v1(&span);
        assert_eq!(v1.timestamp, 1_472_470_996_199_000);
        assert_eq!(v1.annotations.len(), 2); // cs + cr
        assert_eq!(v1.annotations[0].value, "cs");
        assert_eq!(v1.annotations[1].value, "cr");

        let back = v1_to_v2(&v1);
        assert_eq!(back, vec![span]);
    }

    #[test]
    fn shared_server_span_round_trips() {
        let span = Span::builder()
            .trace_id("1")
            .parent_id("2")
            .id("3")
            .name("get")
            .kind(Kind::Server)
            .shared(true)
            .timestamp(100_000)
            .duration(50_000)
            .local_endpoint(backend())
            .build()
            .unwrap();

        let v1 = v2_to_v1(&span);
        // shared spans must not claim the span-level timestamp
        assert_eq!(v1.timestamp, 0);
        assert_eq!(v1.duration, 0);

        let back = v1_to_v2(&v1);
        assert_eq!(back, vec![span]);
    }

    #[test]
    fn kindless_span_keeps_local_endpoint_via_lc() {
        let span = Span::builder()
            .trace_id("1")
            .id("2")
            .name("work")
            .timestamp(100)
            .duration(10)
            .local_endpoint(frontend())
            .build()
            .unwrap();

        let v1 = v2_to_v1(&span);
        assert_eq!(v1.binary_annotations.len(), 1);
        assert_eq!(v1.binary_annotations[0].key, "lc");

        assert_eq!(v1_to_v2(&v1), vec![span]);
    }

    #[test]
    fn merged_client_server_record_splits_in_two() {
        let mut v1 = V1Span {
            trace_id: 1,
            id: 2,
            timestamp: 1_000,
            duration: 200,
            ..V1Span::default()
        };
        v1.set_name("get");
        v1.add_annotation(1_000, "cs", Some(frontend()));
        v1.add_annotation(1_050, "sr", Some(backend()));
        v1.add_annotation(1_150, "ss", Some(backend()));
        v1.add_annotation(1_200, "cr", Some(frontend()));

        let spans = v1_to_v2(&v1);
        assert_eq!(spans.len(), 2);

        let client = &spans[0];
        assert_eq!(client.kind, Some(Kind::Client));
        assert_eq!(client.timestamp, Some(1_000));
        assert_eq!(client.duration, Some(200));
        assert!(!client.shared);

        let server = &spans[1];
        assert_eq!(server.kind, Some(Kind::Server));
        assert!(server.shared);
        assert_eq!(server.timestamp, Some(1_050));
        assert_eq!(server.duration, Some(100));
    }

    #[test]
    fn address_annotations_become_remote_endpoints() {
        let mut v1 = V1Span { trace_id: 1, id: 2, ..V1Span::default() };
        v1.add_annotation(1_000, "cs", Some(frontend()));
        v1.add_annotation(1_100, "cr", Some(frontend()));
        v1.add_address_annotation("sa", Some(backend()));

        let spans = v1_to_v2(&v1);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].remote_endpoint, Some(backend()));
    }

    #[test]
    fn sa_only_without_core_annotations_is_not_a_client_span() {
        let mut v1 = V1Span { trace_id: 1, id: 2, ..V1Span::default() };
        v1.add_address_annotation("sa", Some(backend()));

        let spans = v1_to_v2(&v1);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, None);
        assert_eq!(spans[0].remote_endpoint, Some(backend()));
    }

    #[test]
    fn loopback_forks_client_and_server() {
        let mut v1 = V1Span { trace_id: 1, id: 2, ..V1Span::default() };
        v1.add_annotation(1_000, "cs", Some(frontend()));
        v1.add_annotation(1_010, "sr", Some(frontend()));

        let spans = v1_to_v2(&v1);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, Some(Kind::Client));
        assert_eq!(spans[1].kind, Some(Kind::Server));
        assert!(spans[1].shared);
    }

    #[test]
    fn zero_ids_yield_nothing() {
        let v1 = V1Span::default();
        assert!(v1_to_v2(&v1).is_empty());
    }

    #[test]
    fn timestamps_near_the_numeric_ceiling_do_not_overflow() {
        // hostile wire values: timestamp + duration would wrap
        let mut v1 = V1Span {
            trace_id: 1,
            id: 2,
            timestamp: u64::MAX,
            duration: 2,
            ..V1Span::default()
        };
        v1.add_annotation(u64::MAX, "cr", Some(frontend()));

        let spans = v1_to_v2(&v1);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].timestamp, Some(u64::MAX));

        let span = Span::builder()
            .trace_id("1")
            .id("2")
            .kind(Kind::Client)
            .timestamp(u64::MAX)
            .duration(2)
            .local_endpoint(frontend())
            .build()
            .unwrap();
        let back = v2_to_v1(&span);
        assert_eq!(back.timestamp, u64::MAX);
        assert!(back.annotations.iter().any(|a| a.value == "cr"));
    }
}
