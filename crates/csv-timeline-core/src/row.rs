//! One parsed data row.

use std::{collections::BTreeMap, sync::Arc};

/// Field values of one row zipped with the column names of its file.
///
/// Values beyond the column count are dropped; a short line leaves the
/// trailing columns unset, so [`Row::get`] returns `None` for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, mut values: Vec<String>) -> Self {
        values.truncate(columns.len());
        Self { columns, values }
    }

    /// Value of `column`, if the column exists and the row reached it.
    pub fn get(&self, column: &str) -> Option<&str> {
        let position = self.columns.iter().position(|name| name == column)?;
        self.values.get(position).map(String::as_str)
    }

    /// Number of columns that have a value.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no column has a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column names of the file the row came from.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// `(column, value)` pairs in column order, set columns only.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Owned column to value mapping.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Arc<[String]> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn excess_values_are_dropped() {
        let row = Row::new(
            columns(&["a", "b"]),
            vec!["1".into(), "2".into(), "3".into()],
        );
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("b"), Some("2"));
        assert_eq!(row.values(), ["1", "2"]);
    }

    #[test]
    fn short_rows_leave_trailing_columns_unset() {
        let row = Row::new(columns(&["a", "b", "c"]), vec!["x".into()]);
        assert_eq!(row.get("a"), Some("x"));
        assert_eq!(row.get("c"), None);
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.iter().collect::<Vec<_>>(), [("a", "x")]);
        assert_eq!(row.to_map().len(), 1);
    }
}
