//! One row of tabular input

use std::sync::Arc;

use crate::error::{MapError, Result};

/// Column values for one row, addressed by header name
///
/// Headers are shared between all rows of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 1-based position in the source, excluding the header line
    pub number: usize,
    headers: Arc<[String]>,
    values: Vec<String>,
}

impl Row {
    /// Build a row; missing trailing cells read as empty
    pub fn new(number: usize, headers: Arc<[String]>, mut values: Vec<String>) -> Self {
        values.resize(headers.len(), String::new());
        Self {
            number,
            headers,
            values,
        }
    }

    pub fn from_pairs<K, V>(number: usize, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (headers, values): (Vec<String>, Vec<String>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).unzip();
        Self::new(number, headers.into(), values)
    }

    /// Value of a named column; a column missing from the header is an error
    pub fn get(&self, column: &str) -> Result<&str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .map(|idx| self.values[idx].as_str())
            .ok_or_else(|| MapError::MissingColumn {
                column: column.to_string(),
            })
    }

    pub fn columns(&self) -> &[String] {
        &self.headers
    }

    pub fn headers(&self) -> Arc<[String]> {
        Arc::clone(&self.headers)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .zip(self.values.iter())
            .map(|(h, v)| (h.as_str(), v.as_str()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_name() {
        let row = Row::from_pairs(1, [("Col1", "a"), ("Col2", "")]);
        assert_eq!(row.get("Col1").unwrap(), "a");
        assert_eq!(row.get("Col2").unwrap(), "");
        assert_eq!(row.columns(), &["Col1".to_string(), "Col2".to_string()]);
    }

    #[test]
    fn test_missing_column_fails() {
        let row = Row::from_pairs(3, [("Col1", "a")]);
        let err = row.get("col1").unwrap_err();
        assert!(matches!(err, MapError::MissingColumn { ref column } if column == "col1"));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let headers: Arc<[String]> = vec!["a".to_string(), "b".to_string()].into();
        let row = Row::new(1, headers, vec!["1".to_string()]);
        assert_eq!(row.get("b").unwrap(), "");
        assert_eq!(row.iter().count(), 2);
    }
}
