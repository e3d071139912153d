//! Core data types for the catalog.
//!
//! A [`Record`] is one cataloged dataset entry: an order-preserving map
//! from column name to JSON scalar. A [`Generation`] is one immutable
//! `(records, tags)` snapshot produced by a refresh run; it is replaced
//! wholesale by the next successful refresh and never mutated in place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column split into comma-separated task tokens by the tag extractor.
pub const TASKS_COLUMN: &str = "Tasks";
/// Column holding dialect descriptors with a parenthesized country name.
pub const DIALECT_COLUMN: &str = "Dialect";

/// Enrichment column: 1-based sequential id, assigned in refresh order.
pub const ID_COLUMN: &str = "Id";
/// Enrichment column: integer cluster id in `[0, 15)`.
pub const CLUSTER_COLUMN: &str = "Cluster";
/// Enrichment column: `[x, y]` pair from the 2-D projection.
pub const EMBEDDINGS_COLUMN: &str = "Embeddings";

/// Projection sentinel: a `features` list of exactly `["all"]` means
/// "return the object unchanged".
pub const ALL_FEATURES: &str = "all";

/// Tag index: column name → sorted, duplicate-free array of distinct
/// values observed across the generation.
pub type TagIndex = Map<String, Value>;

/// One cataloged dataset entry. Keys preserve source column order;
/// values are JSON scalars (string, number, or null).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Column names in source order.
    pub fn columns(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Text fed to the embedding provider for this record.
    ///
    /// Prefers the `Name` and `Description` columns; falls back to every
    /// string-valued column joined in source order, so records without a
    /// description still embed to something meaningful.
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<&str> = ["Name", "Description"]
            .iter()
            .filter_map(|col| self.0.get(*col).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
            .collect();

        if parts.is_empty() {
            parts = self
                .0
                .values()
                .filter_map(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .collect();
        }

        parts.join(" ")
    }

    /// Apply the shared projection rule to this record.
    pub fn project(&self, features: &[String]) -> Record {
        Record(project_keys(&self.0, features))
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One immutable `(records, tags)` snapshot.
///
/// Published atomically under the `"adawat"` and `"tags"` cache keys;
/// a reader must never observe the records of one generation with the
/// tags of another.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub records: Vec<Record>,
    pub tags: TagIndex,
}

/// Shared projection rule for records and the tag index.
///
/// `["all"]` alone returns the map unchanged; otherwise only entries
/// whose key appears in `features` are kept, in original key order.
/// Requested features with no matching key are silently dropped.
pub fn project_keys(map: &Map<String, Value>, features: &[String]) -> Map<String, Value> {
    if features.len() == 1 && features[0] == ALL_FEATURES {
        return map.clone();
    }

    map.iter()
        .filter(|(key, _)| features.iter().any(|f| f == *key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
