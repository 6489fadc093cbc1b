//! Derives service dependency links from trace trees.
//!
//! Traversal creates links between server spans, with one exception at
//! the bottom of the tree: a client span recording a remote endpoint is
//! linked too, since that accounts for uninstrumented services. Spans
//! without a kind but with both endpoints are treated as client spans.

use std::collections::BTreeMap;

use itertools::Itertools;
use tracewire_model::{DependencyLink, Kind, Span};

use crate::span_node::SpanTree;

#[derive(Debug, Default)]
pub struct DependencyLinker {
    call_counts: BTreeMap<(String, String), u64>,
    error_counts: BTreeMap<(String, String), u64>,
}

impl DependencyLinker {
    pub fn new() -> DependencyLinker {
        DependencyLinker::default()
    }

    /// Adds one trace's links. All spans must share a trace ID.
    pub fn put_trace(&mut self, spans: &[Span]) -> &mut Self {
        if spans.is_empty() {
            return self;
        }
        let tree = SpanTree::build(spans);

        for node in tree.traverse() {
            let Some(span) = tree.span(node) else {
                continue;
            };

            let mut kind = span.kind;
            // when a client span has children, the server side names the
            // link, so skip the client here
            if kind == Some(Kind::Client) && !tree.children(node).is_empty() {
                continue;
            }

            let local = span.local_service_name().map(str::to_owned);
            let remote = span.remote_service_name().map(str::to_owned);
            if kind.is_none() {
                if local.is_some() && remote.is_some() {
                    kind = Some(Kind::Client);
                } else {
                    tracing::debug!(id = %span.id, "non remote span; skipping");
                    continue;
                }
            }
            let kind = kind.unwrap_or(Kind::Client);

            let (mut parent, child) = match kind {
                Kind::Server | Kind::Consumer => {
                    if node == tree.root() && remote.is_none() {
                        tracing::debug!("root's client is unknown; skipping");
                        continue;
                    }
                    (remote.clone(), local.clone())
                }
                Kind::Client | Kind::Producer => (local.clone(), remote.clone()),
            };

            let mut is_error = span.tags.contains_key("error");
            if matches!(kind, Kind::Producer | Kind::Consumer) {
                match (parent, child) {
                    (Some(parent), Some(child)) => {
                        self.add_link(parent, child, is_error)
                    }
                    _ => tracing::debug!(
                        "cannot link messaging span to its broker; skipping"
                    ),
                }
                continue;
            }

            // local spans may sit between this node and its remote parent
            if let Some(ancestor_span) = first_remote_ancestor(&tree, node) {
                if let Some(ancestor_name) =
                    ancestor_span.local_service_name().map(str::to_owned)
                {
                    // some instrumentation put the remote service name on
                    // client spans; backfill the missing link to it
                    if kind == Kind::Client {
                        if let Some(local) = &local {
                            if *local != ancestor_name {
                                self.add_link(
                                    ancestor_name.clone(),
                                    local.clone(),
                                    false,
                                );
                            }
                        }
                    }

                    if kind == Kind::Server || parent.is_none() {
                        parent = Some(ancestor_name);
                    }

                    // in a split RPC the server half is skipped; pick up
                    // errors recorded on the client parent
                    if !is_error
                        && ancestor_span.kind == Some(Kind::Client)
                        && span.parent_id.is_some()
                        && span.parent_id.as_deref()
                            == Some(ancestor_span.id.as_str())
                    {
                        is_error = ancestor_span.tags.contains_key("error");
                    }
                }
            }

            match (parent, child) {
                (Some(parent), Some(child)) => {
                    self.add_link(parent, child, is_error)
                }
                _ => {
                    tracing::debug!("cannot find remote ancestor; skipping")
                }
            }
        }
        self
    }

    fn add_link(&mut self, parent: String, child: String, is_error: bool) {
        tracing::debug!(%parent, %child, is_error, "incrementing link");
        let key = (parent, child);
        *self.call_counts.entry(key.clone()).or_insert(0) += 1;
        if is_error {
            *self.error_counts.entry(key).or_insert(0) += 1;
        }
    }

    /// The accumulated links, ordered by parent then child.
    pub fn link(self) -> Vec<DependencyLink> {
        let error_counts = self.error_counts;
        self.call_counts
            .into_iter()
            .map(|((parent, child), call_count)| {
                let error_count = error_counts
                    .get(&(parent.clone(), child.clone()))
                    .copied()
                    .unwrap_or(0);
                DependencyLink { parent, child, call_count, error_count }
            })
            .collect()
    }

    /// Merges links from multiple sources by summing counts per pair.
    pub fn merge(
        links: impl IntoIterator<Item = DependencyLink>,
    ) -> Vec<DependencyLink> {
        links
            .into_iter()
            .sorted_by(|a, b| {
                a.parent.cmp(&b.parent).then_with(|| a.child.cmp(&b.child))
            })
            .coalesce(|a, b| {
                if a.parent == b.parent && a.child == b.child {
                    Ok(DependencyLink {
                        call_count: a.call_count + b.call_count,
                        error_count: a.error_count + b.error_count,
                        ..a
                    })
                } else {
                    Err((a, b))
                }
            })
            .collect()
    }
}

fn first_remote_ancestor<'a>(
    tree: &'a SpanTree,
    node: usize,
) -> Option<&'a Span> {
    let mut ancestor = tree.parent(node);
    while let Some(current) = ancestor {
        match tree.span(current) {
            Some(span) if span.kind.is_some() => return Some(span),
            _ => ancestor = tree.parent(current),
        }
    }
    None
}
