use serde::{Deserialize, Serialize};

use crate::MIN_QUERY_BYTES_FLOOR;

/// Whether equal sensitive values (under the same `col_ref`/`oid`) map to
/// the same token, or to a fresh token every time (§3 `SafetyPolicy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnStrategy {
    Deterministic,
    Randomized,
}

impl Default for ColumnStrategy {
    fn default() -> Self {
        ColumnStrategy::Deterministic
    }
}

/// Runtime caps and defaults applied to every query on a connection,
/// overridable per connection in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyPolicy {
    #[serde(default = "default_read_only")]
    pub read_only: bool,

    #[serde(default = "default_max_rows")]
    pub max_rows: u32,

    #[serde(default = "default_max_query_bytes")]
    pub max_query_bytes: u32,

    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u32,

    #[serde(default)]
    pub column_strategy: ColumnStrategy,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            read_only: default_read_only(),
            max_rows: default_max_rows(),
            max_query_bytes: default_max_query_bytes(),
            statement_timeout_ms: default_statement_timeout_ms(),
            column_strategy: ColumnStrategy::default(),
        }
    }
}

impl SafetyPolicy {
    /// `max_query_bytes`, floored so the builder can always store at
    /// least one minimally sized, NUL-terminated cell.
    pub fn effective_max_query_bytes(&self) -> u32 {
        self.max_query_bytes.max(MIN_QUERY_BYTES_FLOOR)
    }

    /// Normalize in place; called once at catalog ingest.
    pub fn normalize(&mut self) {
        self.max_query_bytes = self.effective_max_query_bytes();
    }
}

fn default_read_only() -> bool {
    true
}

fn default_max_rows() -> u32 {
    200
}

fn default_max_query_bytes() -> u32 {
    65536
}

fn default_statement_timeout_ms() -> u32 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_values() {
        let policy = SafetyPolicy::default();
        assert!(policy.read_only);
        assert_eq!(policy.max_rows, 200);
        assert_eq!(policy.max_query_bytes, 65536);
        assert_eq!(policy.statement_timeout_ms, 5000);
        assert_eq!(policy.column_strategy, ColumnStrategy::Deterministic);
    }

    #[test]
    fn undersized_max_query_bytes_is_floored() {
        let mut policy = SafetyPolicy {
            max_query_bytes: 10,
            ..SafetyPolicy::default()
        };
        policy.normalize();
        assert_eq!(policy.max_query_bytes, MIN_QUERY_BYTES_FLOOR);
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let policy: SafetyPolicy = serde_yaml::from_str("max_rows: 50\n").unwrap();
        assert_eq!(policy.max_rows, 50);
        assert!(policy.read_only);
    }
}
