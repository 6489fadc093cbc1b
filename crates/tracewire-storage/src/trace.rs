//! Trace cleanup: merging duplicate reports of the same span.
//!
//! Instrumentation can report one span several times, e.g. on flush and
//! again on completion, and client and server halves of a shared span
//! arrive separately per endpoint. Merging first keeps the trace tree
//! free of redundant leaves and dependency counts honest.

use tracewire_model::Span;

/// Merges duplicate spans in one trace.
///
/// Spans merge when they agree on span ID, shared flag, and local service
/// name. When any span carries a 128-bit trace ID, spans reported with
/// only the low 64 bits are rewritten to the full ID.
pub fn merge(spans: &[Span]) -> Vec<Span> {
    if spans.len() <= 1 {
        return spans.to_vec();
    }

    let mut sorted: Vec<Span> = spans.to_vec();
    sorted.sort_by(|a, b| {
        a.id.cmp(&b.id)
            .then(a.shared.cmp(&b.shared))
            .then(a.local_service_name().cmp(&b.local_service_name()))
    });

    let full_trace_id = sorted
        .iter()
        .map(|span| span.trace_id.as_str())
        .find(|trace_id| trace_id.len() == 32)
        .map(str::to_owned);

    let mut merged: Vec<Span> = Vec::with_capacity(sorted.len());
    for span in sorted {
        if let Some(last) = merged.last_mut() {
            if last.id == span.id
                && last.shared == span.shared
                && close_enough(last, &span)
            {
                if let Ok(combined) = last.to_builder().merge(&span).build() {
                    *last = combined;
                    continue;
                }
            }
        }
        merged.push(span);
    }

    if let Some(full_trace_id) = full_trace_id {
        for span in &mut merged {
            if span.trace_id.len() != 32 {
                if let Ok(rebuilt) = span
                    .to_builder()
                    .trace_id(full_trace_id.clone())
                    .build()
                {
                    *span = rebuilt;
                }
            }
        }
    }
    merged
}

// An absent service name merges with anything; different names are
// different hosts reusing the span ID.
fn close_enough(left: &Span, right: &Span) -> bool {
    match (left.local_service_name(), right.local_service_name()) {
        (Some(left), Some(right)) => left == right,
        _ => true,
    }
}
