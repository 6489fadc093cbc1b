//! In-memory trace storage and the query surface over it.
//!
//! [`InMemoryStorage`] keeps accepted spans in four coordinated indexes
//! under one coarse lock, bounded by whole-trace eviction. Reads go
//! through [`Call`], the single-shot result type durable backends share,
//! so callers are written once against both. Dependency links are
//! derived on demand by assembling each trace into a [`SpanTree`] and
//! walking it with the [`DependencyLinker`].

mod call;
mod error;
mod linker;
mod query;
mod span_node;
mod store;
pub mod trace;

pub use call::Call;
pub use error::StorageError;
pub use linker::DependencyLinker;
pub use query::{QueryRequest, QueryRequestBuilder};
pub use span_node::SpanTree;
pub use store::{InMemoryStorage, StorageConfig};
