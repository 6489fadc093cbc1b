//! Bounded in-memory span store.
//!
//! Spans are indexed on the low 64 bits of the trace ID. The primary map
//! orders (trace, timestamp) keys newest first; every other index is
//! derived from it and the whole set mutates together under one coarse
//! lock. This is the reference store: simple and strictly serialized,
//! not the production persistence layer.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use parking_lot::Mutex;
use tracewire_model::{normalize_trace_id, DependencyLink, Span};

use crate::linker::DependencyLinker;
use crate::query::QueryRequest;
use crate::{Call, StorageError};

/// Storage knobs, applied at construction.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// When false, traces whose 128-bit IDs collide on the low 64 bits
    /// are served as one trace rather than split apart.
    pub strict_trace_id: bool,
    /// When false, the service and span-name indexes are not written and
    /// search queries return empty. Accept and trace lookup still work.
    pub search_enabled: bool,
    /// Oldest whole traces are evicted to keep the span count under this.
    pub max_span_count: usize,
}

impl Default for StorageConfig {
    fn default() -> StorageConfig {
        StorageConfig {
            strict_trace_id: true,
            search_enabled: true,
            max_span_count: 500_000,
        }
    }
}

/// Primary key: newest first, ties broken by descending trace ID.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceKey {
    low_trace_id: String,
    timestamp: u64,
}

impl Ord for TraceKey {
    fn cmp(&self, other: &TraceKey) -> std::cmp::Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.low_trace_id.cmp(&self.low_trace_id))
    }
}

impl PartialOrd for TraceKey {
    fn partial_cmp(&self, other: &TraceKey) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct Indexes {
    /// Spans ordered descending by timestamp. Values are lists rather
    /// than sets so duplicate accepts of one span stay visible.
    spans_by_key: BTreeMap<TraceKey, Vec<Span>>,
    trace_id_to_keys: BTreeMap<String, BTreeSet<TraceKey>>,
    /// Trace IDs per service name, from either endpoint of a span.
    service_to_trace_ids: BTreeMap<String, BTreeSet<String>>,
    service_to_span_names: BTreeMap<String, BTreeSet<String>>,
    span_count: usize,
    accepted_span_count: u64,
}

#[derive(Debug)]
pub struct InMemoryStorage {
    config: StorageConfig,
    indexes: Mutex<Indexes>,
}

impl Default for InMemoryStorage {
    fn default() -> InMemoryStorage {
        InMemoryStorage::new(StorageConfig::default())
    }
}

impl InMemoryStorage {
    pub fn new(config: StorageConfig) -> InMemoryStorage {
        InMemoryStorage { config, indexes: Mutex::new(Indexes::default()) }
    }

    /// Total spans ever accepted, across evictions.
    pub fn accepted_span_count(&self) -> u64 {
        self.indexes.lock().accepted_span_count
    }

    pub fn clear(&self) {
        let mut indexes = self.indexes.lock();
        *indexes = Indexes::default();
    }

    /// Indexes every span. Capacity pressure is absorbed by evicting the
    /// oldest whole traces first, so this never fails.
    pub fn accept(&self, spans: Vec<Span>) -> Call<()> {
        let mut indexes = self.indexes.lock();

        let over = (indexes.span_count + spans.len())
            .saturating_sub(self.config.max_span_count);
        if over > 0 {
            let evicted = indexes.evict_to_recover(over);
            tracing::debug!(evicted, "evicted oldest traces for headroom");
        }

        for span in spans {
            let key = TraceKey {
                low_trace_id: low_trace_id(&span.trace_id).to_owned(),
                timestamp: span.timestamp.unwrap_or(0),
            };
            indexes
                .trace_id_to_keys
                .entry(key.low_trace_id.clone())
                .or_default()
                .insert(key.clone());
            indexes.span_count += 1;
            indexes.accepted_span_count += 1;

            if self.config.search_enabled {
                let span_name = span.name.clone();
                let services = [
                    span.local_service_name(),
                    span.remote_service_name(),
                ];
                for service in services.into_iter().flatten() {
                    indexes
                        .service_to_trace_ids
                        .entry(service.to_owned())
                        .or_default()
                        .insert(key.low_trace_id.clone());
                    if let Some(name) = &span_name {
                        indexes
                            .service_to_span_names
                            .entry(service.to_owned())
                            .or_default()
                            .insert(name.clone());
                    }
                }
            }

            indexes.spans_by_key.entry(key).or_default().push(span);
        }
        Call::value(())
    }

    /// Traces matching the request, most recent first, up to its limit.
    pub fn get_traces(&self, request: &QueryRequest) -> Call<Vec<Vec<Span>>> {
        let indexes = self.indexes.lock();
        Call::value(self.traces_matching(
            &indexes,
            request,
            self.config.strict_trace_id,
        ))
    }

    fn traces_matching(
        &self,
        indexes: &Indexes,
        request: &QueryRequest,
        strict_trace_id: bool,
    ) -> Vec<Vec<Span>> {
        let candidates = self.trace_ids_descending_by_timestamp(indexes, request);

        let mut result = Vec::new();
        for low_trace_id in candidates {
            if result.len() >= request.limit {
                break;
            }
            let trace = indexes.spans_by_trace_id(&low_trace_id);
            if !request.test(&trace) {
                continue;
            }
            if !strict_trace_id {
                result.push(trace);
                continue;
            }
            // the index collapses 128-bit IDs to their low 64 bits, so
            // re-split and re-test now that spans are strictly grouped
            for strict_trace in strict_by_trace_id(trace) {
                if result.len() >= request.limit {
                    break;
                }
                if request.test(&strict_trace) {
                    result.push(strict_trace);
                }
            }
        }
        result
    }

    fn trace_ids_descending_by_timestamp(
        &self,
        indexes: &Indexes,
        request: &QueryRequest,
    ) -> Vec<String> {
        if !self.config.search_enabled {
            return Vec::new();
        }

        let keys: Vec<TraceKey> = match &request.service_name {
            Some(service) => indexes
                .service_to_trace_ids
                .get(service)
                .into_iter()
                .flatten()
                .flat_map(|low_trace_id| {
                    indexes
                        .trace_id_to_keys
                        .get(low_trace_id)
                        .into_iter()
                        .flatten()
                        .cloned()
                })
                .sorted()
                .collect(),
            None => indexes.spans_by_key.keys().cloned().collect(),
        };

        let end_ts = request.end_ts.saturating_mul(1000);
        let start_ts =
            end_ts.saturating_sub(request.lookback.saturating_mul(1000));

        let mut result = Vec::new();
        for key in keys {
            if key.timestamp >= start_ts && key.timestamp <= end_ts {
                if !result.contains(&key.low_trace_id) {
                    result.push(key.low_trace_id);
                }
            }
        }
        result
    }

    /// All spans of one trace. In strict mode only spans whose full
    /// trace ID matches are returned.
    pub fn get_trace(&self, trace_id: &str) -> Call<Vec<Span>> {
        let trace_id = match normalize_trace_id(trace_id) {
            Ok(trace_id) => trace_id,
            Err(_) => {
                return Call::error(StorageError::InvalidTraceId(
                    trace_id.to_owned(),
                ))
            }
        };
        let indexes = self.indexes.lock();
        let mut spans = indexes.spans_by_trace_id(low_trace_id(&trace_id));
        if self.config.strict_trace_id {
            spans.retain(|span| span.trace_id == trace_id);
        }
        Call::value(spans)
    }

    /// Sorted snapshot of every service name seen.
    pub fn get_service_names(&self) -> Call<Vec<String>> {
        if !self.config.search_enabled {
            return Call::value(Vec::new());
        }
        let indexes = self.indexes.lock();
        Call::value(indexes.service_to_trace_ids.keys().cloned().collect())
    }

    /// Sorted snapshot of span names recorded for a service.
    pub fn get_span_names(&self, service: &str) -> Call<Vec<String>> {
        if service.is_empty() || !self.config.search_enabled {
            return Call::value(Vec::new());
        }
        let service = service.to_ascii_lowercase();
        let indexes = self.indexes.lock();
        Call::value(
            indexes
                .service_to_span_names
                .get(&service)
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
        )
    }

    /// Service dependency links over the query window.
    ///
    /// Trace grouping ignores strict mode here: splitting a 128-bit trace
    /// in two would double its call counts.
    pub fn get_dependencies(
        &self,
        end_ts: u64,
        lookback: u64,
    ) -> Call<Vec<DependencyLink>> {
        let request = match QueryRequest::builder()
            .end_ts(end_ts)
            .lookback(lookback)
            .limit(usize::MAX)
            .build()
        {
            Ok(request) => request,
            Err(error) => return Call::error(error),
        };
        let indexes = self.indexes.lock();
        let traces = self.traces_matching(&indexes, &request, false);
        Call::value(link_dependencies(traces))
    }

    /// Every stored trace, unconditionally. A test and ops hook.
    pub fn traces(&self) -> Vec<Vec<Span>> {
        let indexes = self.indexes.lock();
        let mut result = Vec::new();
        for low_trace_id in indexes.trace_id_to_keys.keys() {
            let trace = indexes.spans_by_trace_id(low_trace_id);
            if self.config.strict_trace_id {
                result.extend(strict_by_trace_id(trace));
            } else {
                result.push(trace);
            }
        }
        result
    }

    /// Links over every stored trace, unconditionally. A test hook.
    pub fn dependencies(&self) -> Vec<DependencyLink> {
        link_dependencies(self.traces())
    }
}

impl Indexes {
    fn spans_by_trace_id(&self, low_trace_id: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        for key in self.trace_id_to_keys.get(low_trace_id).into_iter().flatten()
        {
            if let Some(stored) = self.spans_by_key.get(key) {
                spans.extend(stored.iter().cloned());
            }
        }
        spans
    }

    /// Deletes oldest whole traces until at least `spans_to_recover`
    /// spans are gone. Returns the count evicted.
    fn evict_to_recover(&mut self, mut spans_to_recover: usize) -> usize {
        let mut evicted = 0;
        while spans_to_recover > 0 {
            let dropped = self.delete_oldest_trace();
            if dropped == 0 {
                break;
            }
            spans_to_recover = spans_to_recover.saturating_sub(dropped);
            evicted += dropped;
        }
        evicted
    }

    fn delete_oldest_trace(&mut self) -> usize {
        // keys order newest first, so the last key is the oldest trace
        let Some((oldest, _)) = self.spans_by_key.last_key_value() else {
            return 0;
        };
        let low_trace_id = oldest.low_trace_id.clone();

        let mut evicted = 0;
        for key in self.trace_id_to_keys.remove(&low_trace_id).unwrap_or_default()
        {
            if let Some(spans) = self.spans_by_key.remove(&key) {
                evicted += spans.len();
            }
        }
        self.span_count -= evicted;

        // prune now-orphaned service entries
        let mut orphaned = Vec::new();
        for (service, trace_ids) in self.service_to_trace_ids.iter_mut() {
            if trace_ids.remove(&low_trace_id) && trace_ids.is_empty() {
                orphaned.push(service.clone());
            }
        }
        for service in orphaned {
            self.service_to_trace_ids.remove(&service);
            self.service_to_span_names.remove(&service);
        }
        evicted
    }
}

/// Regroups spans that the low-64-bit index lumped together, preserving
/// first-seen order of the full trace IDs.
fn strict_by_trace_id(spans: Vec<Span>) -> Vec<Vec<Span>> {
    let mut grouped: Vec<(String, Vec<Span>)> = Vec::new();
    for span in spans {
        match grouped.iter_mut().find(|(id, _)| *id == span.trace_id) {
            Some((_, group)) => group.push(span),
            None => grouped.push((span.trace_id.clone(), vec![span])),
        }
    }
    grouped.into_iter().map(|(_, group)| group).collect()
}

fn link_dependencies(traces: Vec<Vec<Span>>) -> Vec<DependencyLink> {
    let mut linker = DependencyLinker::new();
    for trace in &traces {
        linker.put_trace(trace);
    }
    linker.link()
}

fn low_trace_id(trace_id: &str) -> &str {
    if trace_id.len() == 32 {
        &trace_id[16..]
    } else {
        trace_id
    }
}

#[cfg(test)]
mod tests {
    use tracewire_model::{Endpoint, Kind};

    use super::*;

    const TODAY: u64 = 1_700_000_000_000; // epoch millis

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::builder().service_name(name).build()
    }

    fn span(trace_id: &str, id: &str, service: &str, name: &str) -> Span {
        Span::builder()
            .trace_id(trace_id)
            .id(id)
            .name(name)
            .timestamp(TODAY * 1000)
            .duration(100)
            .local_endpoint(endpoint(service))
            .build()
            .unwrap()
    }

    fn request() -> QueryRequest {
        QueryRequest::builder()
            .end_ts(TODAY)
            .lookback(TODAY)
            .limit(10)
            .build()
            .unwrap()
    }

    fn web_query_jdbc_trace() -> Vec<Span> {
        let web = Span::builder()
            .trace_id("1")
            .id("1")
            .name("get")
            .timestamp(TODAY * 1000)
            .duration(350)
            .local_endpoint(endpoint("zipkin-web"))
            .build()
            .unwrap();
        let query = Span::builder()
            .trace_id("1")
            .id("2")
            .parent_id("1")
            .name("get-traces")
            .kind(Kind::Server)
            .timestamp(TODAY * 1000 + 50)
            .duration(250)
            .local_endpoint(endpoint("zipkin-query"))
            .remote_endpoint(endpoint("zipkin-web"))
            .build()
            .unwrap();
        let jdbc = Span::builder()
            .trace_id("1")
            .id("3")
            .parent_id("2")
            .name("query")
            .kind(Kind::Client)
            .timestamp(TODAY * 1000 + 100)
            .duration(150)
            .local_endpoint(endpoint("zipkin-query"))
            .remote_endpoint(endpoint("zipkin-jdbc"))
            .build()
            .unwrap();
        vec![web, query, jdbc]
    }

    #[test]
    fn end_to_end_trace_and_search() {
        let storage = InMemoryStorage::default();
        storage.accept(web_query_jdbc_trace()).execute().unwrap();

        assert_eq!(
            storage.get_service_names().execute().unwrap(),
            vec!["zipkin-jdbc", "zipkin-query", "zipkin-web"]
        );
        assert_eq!(
            storage.get_span_names("zipkin-query").execute().unwrap(),
            vec!["get-traces", "query"]
        );

        let trace = storage.get_trace("1").execute().unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(storage.accepted_span_count(), 3);
    }

    #[test]
    fn get_traces_filters_by_service_and_name() {
        let storage = InMemoryStorage::default();
        storage.accept(web_query_jdbc_trace()).execute().unwrap();

        let by_service = QueryRequest::builder()
            .end_ts(TODAY)
            .lookback(TODAY)
            .limit(10)
            .service_name("zipkin-web")
            .build()
            .unwrap();
        assert_eq!(storage.get_traces(&by_service).execute().unwrap().len(), 1);

        let wrong_name = QueryRequest::builder()
            .end_ts(TODAY)
            .lookback(TODAY)
            .limit(10)
            .span_name("missing")
            .build()
            .unwrap();
        assert!(storage.get_traces(&wrong_name).execute().unwrap().is_empty());
    }

    #[test]
    fn traces_order_most_recent_first() {
        let storage = InMemoryStorage::default();
        let older = span("a", "1", "svc", "one")
            .to_builder()
            .timestamp(TODAY * 1000 - 2000)
            .build()
            .unwrap();
        let newer = span("b", "2", "svc", "two");
        storage.accept(vec![older, newer]).execute().unwrap();

        let traces = storage.get_traces(&request()).execute().unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0][0].name.as_deref(), Some("two"));
        assert_eq!(traces[1][0].name.as_deref(), Some("one"));
    }

    #[test]
    fn eviction_is_whole_trace_and_respects_ceiling() {
        let storage = InMemoryStorage::new(StorageConfig {
            max_span_count: 4,
            ..StorageConfig::default()
        });

        // oldest trace has two spans at distinct timestamps
        let old_one = span("a", "1", "old", "one");
        let old_two = span("a", "2", "old", "two")
            .to_builder()
            .timestamp(TODAY * 1000 + 10)
            .build()
            .unwrap();
        let mid = span("b", "3", "mid", "three")
            .to_builder()
            .timestamp(TODAY * 1000 + 20)
            .build()
            .unwrap();
        storage
            .accept(vec![old_one, old_two, mid])
            .execute()
            .unwrap();

        let new_one = span("c", "4", "new", "four")
            .to_builder()
            .timestamp(TODAY * 1000 + 30)
            .build()
            .unwrap();
        let new_two = span("c", "5", "new", "five")
            .to_builder()
            .timestamp(TODAY * 1000 + 40)
            .build()
            .unwrap();
        storage.accept(vec![new_one, new_two]).execute().unwrap();

        // trace a went away entirely; b and c are whole
        assert!(storage.get_trace("a").execute().unwrap().is_empty());
        assert_eq!(storage.get_trace("b").execute().unwrap().len(), 1);
        assert_eq!(storage.get_trace("c").execute().unwrap().len(), 2);
        assert_eq!(
            storage.get_service_names().execute().unwrap(),
            vec!["mid", "new"]
        );
        assert_eq!(storage.accepted_span_count(), 5);
    }

    #[test]
    fn strict_mode_splits_low_bit_collisions() {
        let shared_low = "46e0a2c7ba4c6d31";
        let first = span(
            &format!("48485a3953bb6124{shared_low}"),
            "1",
            "svc",
            "one",
        );
        let second = span(
            &format!("deadbeefdeadbeef{shared_low}"),
            "2",
            "svc",
            "two",
        );

        let strict = InMemoryStorage::default();
        strict.accept(vec![first.clone(), second.clone()]).execute().unwrap();
        let traces = strict.get_traces(&request()).execute().unwrap();
        assert_eq!(traces.len(), 2);
        let by_full_id =
            strict.get_trace(&first.trace_id).execute().unwrap();
        assert_eq!(by_full_id, vec![first.clone()]);

        let lenient = InMemoryStorage::new(StorageConfig {
            strict_trace_id: false,
            ..StorageConfig::default()
        });
        lenient.accept(vec![first, second]).execute().unwrap();
        let traces = lenient.get_traces(&request()).execute().unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].len(), 2);
    }

    #[test]
    fn limit_holds_across_a_collision_split() {
        let shared_low = "46e0a2c7ba4c6d31";
        let first = span(
            &format!("48485a3953bb6124{shared_low}"),
            "1",
            "svc",
            "one",
        );
        let second = span(
            &format!("deadbeefdeadbeef{shared_low}"),
            "2",
            "svc",
            "two",
        );

        let storage = InMemoryStorage::default();
        storage.accept(vec![first, second]).execute().unwrap();
        // both strict traces come out of one candidate group
        let limited = QueryRequest::builder()
            .end_ts(TODAY)
            .lookback(TODAY)
            .limit(1)
            .build()
            .unwrap();
        assert_eq!(storage.get_traces(&limited).execute().unwrap().len(), 1);
    }

    #[test]
    fn search_disabled_still_serves_traces() {
        let storage = InMemoryStorage::new(StorageConfig {
            search_enabled: false,
            ..StorageConfig::default()
        });
        storage.accept(web_query_jdbc_trace()).execute().unwrap();

        assert!(storage.get_service_names().execute().unwrap().is_empty());
        assert!(storage
            .get_span_names("zipkin-query")
            .execute()
            .unwrap()
            .is_empty());
        assert!(storage.get_traces(&request()).execute().unwrap().is_empty());
        assert_eq!(storage.get_trace("1").execute().unwrap().len(), 3);
    }

    #[test]
    fn dependencies_sum_across_batches() {
        let storage = InMemoryStorage::default();
        storage.accept(web_query_jdbc_trace()).execute().unwrap();

        // second trace with the same shape
        let second: Vec<Span> = web_query_jdbc_trace()
            .into_iter()
            .map(|span| {
                span.to_builder().trace_id("2").build().unwrap()
            })
            .collect();
        storage.accept(second).execute().unwrap();

        let links =
            storage.get_dependencies(TODAY, TODAY).execute().unwrap();
        assert_eq!(
            links,
            vec![
                DependencyLink {
                    call_count: 2,
                    ..DependencyLink::new("zipkin-query", "zipkin-jdbc")
                },
                DependencyLink {
                    call_count: 2,
                    ..DependencyLink::new("zipkin-web", "zipkin-query")
                },
            ]
        );
    }

    #[test]
    fn duplicate_accepts_count_once_in_dependencies() {
        let storage = InMemoryStorage::default();
        storage.accept(web_query_jdbc_trace()).execute().unwrap();
        storage.accept(web_query_jdbc_trace()).execute().unwrap();

        let links =
            storage.get_dependencies(TODAY, TODAY).execute().unwrap();
        for link in links {
            assert_eq!(link.call_count, 1, "{link:?}");
        }
    }

    #[test]
    fn clear_resets_everything() {
        let storage = InMemoryStorage::default();
        storage.accept(web_query_jdbc_trace()).execute().unwrap();
        storage.clear();

        assert_eq!(storage.accepted_span_count(), 0);
        assert!(storage.get_trace("1").execute().unwrap().is_empty());
        assert!(storage.get_service_names().execute().unwrap().is_empty());
    }

    #[test]
    fn invalid_trace_id_fails_fast() {
        let storage = InMemoryStorage::default();
        assert_eq!(
            storage.get_trace("not-hex").execute(),
            Err(StorageError::InvalidTraceId("not-hex".into()))
        );
    }

    #[test]
    fn limit_caps_results() {
        let storage = InMemoryStorage::default();
        for i in 0..5u64 {
            let trace_id = format!("{:x}", i + 1);
            storage
                .accept(vec![span(&trace_id, "1", "svc", "get")])
                .execute()
                .unwrap();
        }
        let limited = QueryRequest::builder()
            .end_ts(TODAY)
            .lookback(TODAY)
            .limit(3)
            .build()
            .unwrap();
        assert_eq!(storage.get_traces(&limited).execute().unwrap().len(), 3);
    }
}
