//! Shared value types crossing crate boundaries.

use serde::{Deserialize, Serialize};

/// Rows returned from a governed execution.
///
/// Values are JSON-typed because the governance core is driver-agnostic: the
/// pool adapter is responsible for mapping native types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
