//! Trace tree assembly.
//!
//! Dependency linking needs a tree view of a trace. Input is typically
//! imperfect: spans arrive out of order, parents can be missing, and a
//! server reuses (shares) its client's span ID. The tree is built
//! defensively: duplicate spans are merged first, shared spans are keyed
//! by endpoint so multiple servers answering one client stay distinct,
//! and spans with unresolvable parents attach to the root.

use std::collections::HashMap;
use std::collections::VecDeque;

use tracewire_model::{Endpoint, Span};

use crate::trace;

/// A trace assembled into parent/child form, nodes stored in an arena
/// and addressed by index.
#[derive(Debug)]
pub struct SpanTree {
    nodes: Vec<Node>,
    root: usize,
}

#[derive(Debug)]
struct Node {
    span: Option<Span>,
    parent: Option<usize>,
    children: Vec<usize>,
}

// Spans are indexed by ID, except shared (server) spans which need their
// endpoint too: two servers can answer the same client span ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Plain(String),
    Shared(String, Option<Endpoint>),
}

fn key(id: &str, shared: bool, endpoint: &Option<Endpoint>) -> Key {
    if shared {
        Key::Shared(id.to_owned(), endpoint.clone())
    } else {
        Key::Plain(id.to_owned())
    }
}

impl SpanTree {
    /// Merges and arranges the spans of one trace. An empty input yields
    /// a tree with only a synthetic root.
    pub fn build(spans: &[Span]) -> SpanTree {
        Builder::default().build(trace::merge(spans))
    }

    /// The root index. Holds no span when the real root never arrived.
    pub fn root(&self) -> usize {
        self.root
    }

    pub fn span(&self, node: usize) -> Option<&Span> {
        self.nodes[node].span.as_ref()
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].parent
    }

    pub fn children(&self, node: usize) -> &[usize] {
        &self.nodes[node].children
    }

    /// Breadth-first node order. A synthetic root is skipped.
    pub fn traverse(&self) -> Vec<usize> {
        let mut queue: VecDeque<usize> = VecDeque::new();
        if self.nodes[self.root].span.is_none() {
            queue.extend(&self.nodes[self.root].children);
        } else {
            queue.push_back(self.root);
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = queue.pop_front() {
            order.push(node);
            queue.extend(&self.nodes[node].children);
        }
        order
    }
}

#[derive(Default)]
struct Builder {
    nodes: Vec<Node>,
    root: Option<usize>,
    key_to_node: HashMap<Key, usize>,
    // insertion-ordered parent assignments; None value means "root or
    // unknown parent", a tombstoned key was claimed by the root
    span_to_parent: Vec<(Key, Option<Key>)>,
    parent_index: HashMap<Key, usize>,
}

impl Builder {
    fn build(mut self, cleaned: Vec<Span>) -> SpanTree {
        for span in &cleaned {
            self.index(span);
        }
        for span in cleaned {
            self.process(span);
        }

        let root = match self.root {
            Some(root) => root,
            None => {
                tracing::debug!("no root span; substituting synthetic root");
                self.new_node(None)
            }
        };

        let assignments: Vec<(Key, Option<Key>)> =
            self.span_to_parent.drain(..).collect();
        for (child_key, parent_key) in assignments {
            let Some(&child) = self.key_to_node.get(&child_key) else {
                continue; // claimed by the root
            };
            let parent = parent_key
                .and_then(|key| self.key_to_node.get(&key).copied())
                .unwrap_or(root);
            if parent == child {
                continue;
            }
            self.nodes[child].parent = Some(parent);
            self.nodes[parent].children.push(child);
        }

        self.sort_children_by_timestamp(root);
        SpanTree { nodes: self.nodes, root }
    }

    fn index(&mut self, span: &Span) {
        if span.shared {
            // a shared span's parent is its client, unambiguous by ID
            self.assign(
                key(&span.id, true, &span.local_endpoint),
                Some(Key::Plain(span.id.clone())),
            );
        } else {
            self.assign(
                Key::Plain(span.id.clone()),
                span.parent_id.clone().map(Key::Plain),
            );
        }
    }

    fn process(&mut self, span: Span) {
        let endpoint = span.local_endpoint.clone();
        let shared = span.shared;
        let primary_key = key(&span.id, shared, &endpoint);
        let no_endpoint_key = if endpoint.is_some() {
            key(&span.id, shared, &None)
        } else {
            primary_key.clone()
        };

        let mut parent: Option<Key> = None;
        if shared {
            parent = Some(Key::Plain(span.id.clone()));
        } else if let Some(parent_id) = &span.parent_id {
            // a local span can be the child of a shared server span on
            // the same endpoint; try that before the plain parent ID
            let shared_parent =
                Key::Shared(parent_id.clone(), endpoint.clone());
            if self.parent_index.contains_key(&shared_parent) {
                self.assign(no_endpoint_key.clone(), Some(shared_parent.clone()));
                parent = Some(shared_parent);
            } else {
                parent = Some(Key::Plain(parent_id.clone()));
            }
        }

        let node = self.new_node(Some(span));
        if parent.is_none() && self.root.is_none() {
            // the first parentless span is taken as the root; attach
            // everything else that lacks a parent underneath it
            self.root = Some(node);
            self.remove_assignment(&no_endpoint_key);
        } else if shared {
            // address a shared span both ways for intermediate spans
            // that lack endpoint information
            self.key_to_node.insert(primary_key, node);
            self.key_to_node.insert(no_endpoint_key, node);
        } else {
            self.key_to_node.insert(no_endpoint_key, node);
        }
    }

    fn new_node(&mut self, span: Option<Span>) -> usize {
        self.nodes.push(Node { span, parent: None, children: Vec::new() });
        self.nodes.len() - 1
    }

    fn assign(&mut self, child: Key, parent: Option<Key>) {
        match self.parent_index.get(&child) {
            Some(&at) => self.span_to_parent[at].1 = parent,
            None => {
                self.parent_index.insert(child.clone(), self.span_to_parent.len());
                self.span_to_parent.push((child, parent));
            }
        }
    }

    fn remove_assignment(&mut self, child: &Key) {
        if let Some(at) = self.parent_index.remove(child) {
            self.span_to_parent.remove(at);
            for index in self.parent_index.values_mut() {
                if *index > at {
                    *index -= 1;
                }
            }
        }
    }

    fn sort_children_by_timestamp(&mut self, root: usize) {
        let mut queue = vec![root];
        while let Some(node) = queue.pop() {
            let mut children = std::mem::take(&mut self.nodes[node].children);
            children.sort_by_key(|&child| {
                self.nodes[child]
                    .span
                    .as_ref()
                    .and_then(|span| span.timestamp)
                    .unwrap_or(0)
            });
            queue.extend(&children);
            self.nodes[node].children = children;
        }
    }
}

#[cfg(test)]
mod tests {
    use tracewire_model::{Endpoint, Kind};

    use super::*;

    fn endpoint(name: &str) -> Endpoint {
        Endpoint::builder().service_name(name).build()
    }

    fn span(id: &str, parent: Option<&str>, service: &str) -> Span {
        let mut builder = Span::builder()
            .trace_id("a")
            .id(id)
            .local_endpoint(endpoint(service));
        if let Some(parent) = parent {
            builder = builder.parent_id(parent);
        }
        builder.build().unwrap()
    }

    fn ids(tree: &SpanTree) -> Vec<String> {
        tree.traverse()
            .into_iter()
            .map(|node| tree.span(node).unwrap().id.clone())
            .collect()
    }

    #[test]
    fn builds_parent_child_tree() {
        let root = span("1", None, "web");
        let child = span("2", Some("1"), "web");
        let grandchild = span("3", Some("2"), "query");

        let tree =
            SpanTree::build(&[grandchild.clone(), child.clone(), root.clone()]);
        assert_eq!(
            ids(&tree),
            vec![
                "0000000000000001",
                "0000000000000002",
                "0000000000000003"
            ]
        );
        let order = tree.traverse();
        assert_eq!(tree.parent(order[1]), Some(order[0]));
        assert_eq!(tree.parent(order[2]), Some(order[1]));
    }

    #[test]
    fn shared_server_span_is_child_of_its_client() {
        let client = Span::builder()
            .trace_id("a")
            .id("1")
            .kind(Kind::Client)
            .local_endpoint(endpoint("frontend"))
            .build()
            .unwrap();
        let server = Span::builder()
            .trace_id("a")
            .id("1")
            .kind(Kind::Server)
            .shared(true)
            .local_endpoint(endpoint("backend"))
            .build()
            .unwrap();

        let tree = SpanTree::build(&[server, client]);
        let order = tree.traverse();
        assert_eq!(order.len(), 2);
        assert_eq!(tree.span(order[0]).unwrap().kind, Some(Kind::Client));
        assert_eq!(tree.span(order[1]).unwrap().kind, Some(Kind::Server));
        assert_eq!(tree.parent(order[1]), Some(order[0]));
    }

    #[test]
    fn headless_spans_attach_to_a_synthetic_root() {
        let orphan_one = span("2", Some("1"), "web");
        let orphan_two = span("3", Some("1"), "web");

        let tree = SpanTree::build(&[orphan_one, orphan_two]);
        assert!(tree.span(tree.root()).is_none());
        assert_eq!(tree.traverse().len(), 2);
    }

    #[test]
    fn children_sorted_by_timestamp() {
        let root = span("1", None, "web");
        let late = span("2", Some("1"), "web")
            .to_builder()
            .timestamp(200)
            .build()
            .unwrap();
        let early = span("3", Some("1"), "web")
            .to_builder()
            .timestamp(100)
            .build()
            .unwrap();

        let tree = SpanTree::build(&[root, late, early]);
        assert_eq!(
            ids(&tree),
            vec![
                "0000000000000001",
                "0000000000000003",
                "0000000000000002"
            ]
        );
    }

    #[test]
    fn empty_input_yields_only_a_synthetic_root() {
        let tree = SpanTree::build(&[]);
        assert!(tree.span(tree.root()).is_none());
        assert!(tree.traverse().is_empty());
    }
}
