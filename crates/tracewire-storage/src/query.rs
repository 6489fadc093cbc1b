use std::collections::BTreeMap;

use tracewire_model::Span;

use crate::StorageError;

/// A trace search: filters applied to whole assembled traces.
///
/// `end_ts` and `lookback` are epoch milliseconds, a coarser grain than
/// the microsecond span timestamps, because that is what query and
/// windowing surfaces deal in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Constrains matches to traces with a span whose local endpoint
    /// carries this service name, and scopes every other filter to the
    /// spans of that service.
    pub service_name: Option<String>,
    pub remote_service_name: Option<String>,
    pub span_name: Option<String>,
    /// Entries with an empty value match an annotation value or tag key;
    /// entries with a value require a tag with exactly that value. All
    /// entries must match, on top of the other conditions.
    pub annotation_query: BTreeMap<String, String>,
    pub min_duration: Option<u64>,
    pub max_duration: Option<u64>,
    pub end_ts: u64,
    pub lookback: u64,
    pub limit: usize,
}

impl QueryRequest {
    pub fn builder() -> QueryRequestBuilder {
        QueryRequestBuilder::default()
    }

    /// Tests an assembled trace against this request. Used because the
    /// store cannot fully refine a query from its indexes alone.
    pub fn test(&self, trace: &[Span]) -> bool {
        // the root span's timestamp stands for the trace, else the earliest
        let mut timestamp = 0u64;
        for span in trace {
            let Some(span_timestamp) = span.timestamp else { continue };
            if span.parent_id.is_none() {
                timestamp = span_timestamp;
                break;
            }
            if timestamp == 0 || timestamp > span_timestamp {
                timestamp = span_timestamp;
            }
        }
        if timestamp == 0
            || timestamp
                < self.end_ts.saturating_sub(self.lookback).saturating_mul(1000)
            || timestamp > self.end_ts.saturating_mul(1000)
        {
            return false;
        }

        let mut service_seen = false;
        let mut tested_duration =
            self.min_duration.is_none() && self.max_duration.is_none();
        let mut remote_to_match = self.remote_service_name.as_deref();
        let mut name_to_match = self.span_name.as_deref();
        let mut query_remaining = self.annotation_query.clone();

        for span in trace {
            let local = span.local_service_name();
            let in_scope = match self.service_name.as_deref() {
                None => true,
                Some(service) => local == Some(service),
            };
            if in_scope && self.service_name.is_some() {
                service_seen = true;
            }
            if !in_scope {
                continue;
            }

            for annotation in &span.annotations {
                if query_remaining.get(&annotation.value)
                    == Some(&String::new())
                {
                    query_remaining.remove(&annotation.value);
                }
            }
            for (key, value) in &span.tags {
                if let Some(wanted) = query_remaining.get(key) {
                    if wanted.is_empty() || wanted == value {
                        query_remaining.remove(key);
                    }
                }
            }
            if remote_to_match.is_some()
                && remote_to_match == span.remote_service_name()
            {
                remote_to_match = None;
            }
            if name_to_match.is_some() && name_to_match == span.name.as_deref()
            {
                name_to_match = None;
            }

            if !tested_duration {
                let duration = span.duration.unwrap_or(0);
                tested_duration = match (self.min_duration, self.max_duration)
                {
                    (Some(min), Some(max)) => {
                        duration >= min && duration <= max
                    }
                    (Some(min), None) => duration >= min,
                    _ => true,
                };
            }
        }

        (self.service_name.is_none() || service_seen)
            && remote_to_match.is_none()
            && name_to_match.is_none()
            && query_remaining.is_empty()
            && tested_duration
    }
}

#[derive(Debug, Default, Clone)]
pub struct QueryRequestBuilder {
    service_name: Option<String>,
    remote_service_name: Option<String>,
    span_name: Option<String>,
    annotation_query: BTreeMap<String, String>,
    min_duration: Option<u64>,
    max_duration: Option<u64>,
    end_ts: u64,
    lookback: u64,
    limit: usize,
}

impl QueryRequestBuilder {
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn remote_service_name(mut self, name: impl Into<String>) -> Self {
        self.remote_service_name = Some(name.into());
        self
    }

    /// The reserved span name "all" is treated as no filter.
    pub fn span_name(mut self, name: impl Into<String>) -> Self {
        self.span_name = Some(name.into());
        self
    }

    /// Parses the query-parameter form, e.g. `"http.method=GET and error"`.
    pub fn parse_annotation_query(mut self, query: &str) -> Self {
        for clause in query.split(" and ") {
            match clause.split_once('=') {
                Some((key, value)) => {
                    self.annotation_query
                        .insert(key.to_owned(), value.to_owned());
                }
                None => {
                    self.annotation_query
                        .insert(clause.to_owned(), String::new());
                }
            }
        }
        self
    }

    pub fn annotation_query(
        mut self,
        query: BTreeMap<String, String>,
    ) -> Self {
        self.annotation_query = query;
        self
    }

    pub fn min_duration(mut self, micros: u64) -> Self {
        self.min_duration = Some(micros);
        self
    }

    pub fn max_duration(mut self, micros: u64) -> Self {
        self.max_duration = Some(micros);
        self
    }

    pub fn end_ts(mut self, millis: u64) -> Self {
        self.end_ts = millis;
        self
    }

    pub fn lookback(mut self, millis: u64) -> Self {
        self.lookback = millis;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn build(mut self) -> Result<QueryRequest, StorageError> {
        // names are indexed lower-case
        let mut service_name =
            self.service_name.map(|name| name.to_ascii_lowercase());
        let mut span_name = self.span_name.map(|name| name.to_ascii_lowercase());

        self.annotation_query.remove("");
        if service_name.as_deref() == Some("") {
            service_name = None;
        }
        let mut remote_service_name = self.remote_service_name;
        if remote_service_name.as_deref() == Some("") {
            remote_service_name = None;
        }
        if matches!(span_name.as_deref(), Some("") | Some("all")) {
            span_name = None;
        }

        if self.end_ts == 0 {
            return Err(StorageError::NonPositive("end_ts"));
        }
        if self.limit == 0 {
            return Err(StorageError::NonPositive("limit"));
        }
        if self.lookback == 0 {
            return Err(StorageError::NonPositive("lookback"));
        }
        match (self.min_duration, self.max_duration) {
            (Some(0), _) => return Err(StorageError::NonPositive("min_duration")),
            (Some(min), Some(max)) if max < min => {
                return Err(StorageError::InvalidDurationBounds)
            }
            (None, Some(_)) => return Err(StorageError::InvalidDurationBounds),
            _ => {}
        }

        Ok(QueryRequest {
            service_name,
            remote_service_name,
            span_name,
            annotation_query: self.annotation_query,
            min_duration: self.min_duration,
            max_duration: self.max_duration,
            end_ts: self.end_ts,
            lookback: self.lookback,
            limit: self.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use tracewire_model::{Endpoint, Span};

    use super::*;

    fn request() -> QueryRequestBuilder {
        QueryRequest::builder().end_ts(1000).lookback(1000).limit(10)
    }

    fn frontend_span() -> Span {
        Span::builder()
            .trace_id("a")
            .id("b")
            .name("get")
            .timestamp(500_000)
            .duration(200)
            .local_endpoint(
                Endpoint::builder().service_name("frontend").build(),
            )
            .annotation(600_000, "foo")
            .tag("http.method", "GET")
            .build()
            .unwrap()
    }

    #[test]
    fn builder_normalizes_names() {
        let request = request()
            .service_name("FavStar")
            .span_name("GET")
            .build()
            .unwrap();
        assert_eq!(request.service_name.as_deref(), Some("favstar"));
        assert_eq!(request.span_name.as_deref(), Some("get"));

        let request = self::request().span_name("all").service_name("").build().unwrap();
        assert!(request.span_name.is_none());
        assert!(request.service_name.is_none());
    }

    #[test]
    fn builder_rejects_bad_bounds() {
        assert_eq!(
            QueryRequest::builder().lookback(1).limit(1).build(),
            Err(StorageError::NonPositive("end_ts"))
        );
        assert_eq!(
            request().limit(0).build(),
            Err(StorageError::NonPositive("limit"))
        );
        assert_eq!(
            request().min_duration(10).max_duration(9).build(),
            Err(StorageError::InvalidDurationBounds)
        );
        assert_eq!(
            request().max_duration(9).build(),
            Err(StorageError::InvalidDurationBounds)
        );
    }

    #[test]
    fn parses_annotation_query_clauses() {
        let request = request()
            .parse_annotation_query("http.method=GET and error")
            .build()
            .unwrap();
        assert_eq!(
            request.annotation_query.get("http.method").map(String::as_str),
            Some("GET")
        );
        assert_eq!(
            request.annotation_query.get("error").map(String::as_str),
            Some("")
        );
    }

    #[test]
    fn matches_on_time_window() {
        let span = frontend_span();
        assert!(request().build().unwrap().test(&[span.clone()]));
        // trace at 500ms falls outside a 100ms window ending at 1000ms
        assert!(!request().lookback(100).build().unwrap().test(&[span]));
    }

    #[test]
    fn absurd_windows_saturate_instead_of_wrapping() {
        let span = frontend_span();
        // end_ts in microseconds would exceed u64; the window clamps open
        assert!(request()
            .end_ts(u64::MAX)
            .lookback(u64::MAX)
            .build()
            .unwrap()
            .test(std::slice::from_ref(&span)));
        // same ceiling with a tiny lookback clamps shut
        assert!(!request()
            .end_ts(u64::MAX)
            .lookback(1)
            .build()
            .unwrap()
            .test(&[span]));
    }

    #[test]
    fn spanless_timestamps_never_match() {
        let span = Span::builder().trace_id("a").id("b").build().unwrap();
        assert!(!request().build().unwrap().test(&[span]));
    }

    #[test]
    fn matches_service_and_span_name() {
        let span = frontend_span();
        assert!(request()
            .service_name("frontend")
            .span_name("get")
            .build()
            .unwrap()
            .test(&[span.clone()]));
        assert!(!request()
            .service_name("backend")
            .build()
            .unwrap()
            .test(&[span]));
    }

    #[test]
    fn annotation_query_matches_tags_and_annotations() {
        let span = frontend_span();
        let matches = |query: &str| {
            request()
                .parse_annotation_query(query)
                .build()
                .unwrap()
                .test(std::slice::from_ref(&span))
        };
        assert!(matches("http.method=GET"));
        assert!(matches("http.method"));
        assert!(matches("foo"));
        assert!(matches("http.method=GET and foo"));
        assert!(!matches("http.method=POST"));
        assert!(!matches("missing"));
    }

    #[test]
    fn duration_bounds_apply() {
        let span = frontend_span();
        assert!(request()
            .min_duration(100)
            .build()
            .unwrap()
            .test(std::slice::from_ref(&span)));
        assert!(request()
            .min_duration(100)
            .max_duration(300)
            .build()
            .unwrap()
            .test(std::slice::from_ref(&span)));
        assert!(!request()
            .min_duration(500)
            .build()
            .unwrap()
            .test(&[span]));
    }
}
