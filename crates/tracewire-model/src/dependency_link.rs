use serde::{Deserialize, Serialize};

/// An aggregated parent-to-child service call edge derived from traces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyLink {
    /// Service making the call.
    pub parent: String,
    /// Service being called.
    pub child: String,
    pub call_count: u64,
    /// Calls where the callee tagged an error.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub error_count: u64,
}

fn is_zero(count: &u64) -> bool {
    *count == 0
}

impl DependencyLink {
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        DependencyLink {
            parent: parent.into().to_ascii_lowercase(),
            child: child.into().to_ascii_lowercase(),
            call_count: 0,
            error_count: 0,
        }
    }
}
