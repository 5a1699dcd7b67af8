//! Lookup tables used to translate raw cell values

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `(table, key) -> value` entry as stored in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LookupEntry {
    pub source_table: String,
    pub key: String,
    pub value: String,
}

impl LookupEntry {
    pub fn new(
        source_table: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Read-only index of lookup tables
///
/// Table names, keys and values are trimmed on construction. Matching is exact
/// and case-sensitive. When a key repeats within a table the last entry wins.
#[derive(Debug, Clone, Default)]
pub struct LookupCollection {
    tables: HashMap<String, HashMap<String, String>>,
}

impl LookupCollection {
    pub fn new<'a>(entries: impl IntoIterator<Item = &'a LookupEntry>) -> Self {
        let mut tables: HashMap<String, HashMap<String, String>> = HashMap::new();
        for entry in entries {
            tables
                .entry(entry.source_table.trim().to_string())
                .or_default()
                .insert(entry.key.trim().to_string(), entry.value.trim().to_string());
        }
        Self { tables }
    }

    /// Look a key up; absence is reported as `None` so callers decide if it matters
    pub fn try_lookup(&self, table: &str, key: &str) -> Option<&str> {
        self.tables
            .get(table.trim())
            .and_then(|entries| entries.get(key.trim()))
            .map(String::as_str)
    }

    pub fn source_tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table.trim())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn collection() -> LookupCollection {
        LookupCollection::new(&[
            LookupEntry::new("T", "k", "value"),
            LookupEntry::new(" grades ", " 9 ", " Ninth grade "),
            LookupEntry::new("grades", "10", "Tenth grade"),
        ])
    }

    #[test]
    fn test_lookup_is_trimmed() {
        let lookups = collection();
        assert_eq!(lookups.try_lookup("T", " k "), Some("value"));
        assert_eq!(lookups.try_lookup("T", "k"), Some("value"));
        assert_eq!(lookups.try_lookup("grades", "9"), Some("Ninth grade"));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let lookups = collection();
        assert_eq!(lookups.try_lookup("T", "K"), None);
        assert_eq!(lookups.try_lookup("t", "k"), None);
        assert_eq!(lookups.try_lookup("missing", "k"), None);
    }

    #[test]
    fn test_source_tables() {
        let lookups = collection();
        let mut tables: Vec<_> = lookups.source_tables().collect();
        tables.sort();
        assert_eq!(tables, vec!["T", "grades"]);
        assert!(lookups.contains_table(" grades"));
    }
}
