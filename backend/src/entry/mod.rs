//! Entries: one normalized input record.
//!
//! An [`Entry`] is an ordered field → values record built by a reader from
//! one row. The field set is fixed by the header row; a lookup by an unknown
//! field returns an empty slice, never an error.

use serde_json::{Map, Value};
use std::sync::Arc;

/// One input record exposed as ordered field → values.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    fields: Arc<[String]>,
    values: Vec<Vec<String>>,
    row: usize,
}

impl Entry {
    /// Build an entry from raw cells.
    ///
    /// Missing trailing cells read as empty and excess cells are dropped.
    /// With a separator, each cell is split into several values. Values are
    /// trimmed and empty values are removed.
    pub fn from_cells(
        fields: Arc<[String]>,
        cells: Vec<String>,
        separator: Option<&str>,
        row: usize,
    ) -> Self {
        let mut cells = cells.into_iter();
        let values = (0..fields.len())
            .map(|_| match cells.next() {
                Some(cell) => split_cell(&cell, separator),
                None => Vec::new(),
            })
            .collect();
        Self { fields, values, row }
    }

    /// Build an entry from already split values, one list per field.
    pub fn from_values(fields: Arc<[String]>, mut values: Vec<Vec<String>>, row: usize) -> Self {
        values.resize_with(fields.len(), Vec::new);
        values.truncate(fields.len());
        Self { fields, values, row }
    }

    /// Field names, in header order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Row number in the source (1 = first data row).
    pub fn row(&self) -> usize {
        self.row
    }

    /// Values of a field; empty for unknown fields.
    pub fn get(&self, field: &str) -> &[String] {
        self.fields
            .iter()
            .position(|f| f == field)
            .map(|i| self.values[i].as_slice())
            .unwrap_or(&[])
    }

    /// Values at a field position; empty when out of range.
    pub fn get_at(&self, index: usize) -> &[String] {
        self.values.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of a field.
    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field).first().map(String::as_str)
    }

    /// Whether the field exists in the header.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Whether every field is empty.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Vec::is_empty)
    }

    /// Iterate over fields and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Vec::as_slice))
    }

    /// JSON object view: single values as strings, multiple values as arrays.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (field, values) in self.iter() {
            let value = match values {
                [] => Value::String(String::new()),
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            obj.insert(field.to_string(), value);
        }
        Value::Object(obj)
    }
}

/// Split one cell into trimmed, non-empty values.
pub fn split_cell(cell: &str, separator: Option<&str>) -> Vec<String> {
    match separator {
        Some(sep) if !sep.is_empty() => cell
            .split(sep)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect(),
        _ => {
            let v = cell.trim();
            if v.is_empty() {
                Vec::new()
            } else {
                vec![v.to_string()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Arc<[String]> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_multi_value_split() {
        let entry = Entry::from_cells(
            fields(&["title", "tags"]),
            cells(&["A", "x|y"]),
            Some("|"),
            1,
        );
        assert_eq!(entry.get("title"), ["A"]);
        assert_eq!(entry.get("tags"), ["x", "y"]);
    }

    #[test]
    fn test_short_row_reads_empty() {
        let entry = Entry::from_cells(
            fields(&["a", "b", "c", "d", "e"]),
            cells(&["1", "2", "3"]),
            None,
            1,
        );
        assert_eq!(entry.get("c"), ["3"]);
        assert!(entry.get("d").is_empty());
        assert!(entry.get("e").is_empty());
    }

    #[test]
    fn test_long_row_is_truncated() {
        let entry = Entry::from_cells(
            fields(&["a", "b", "c", "d", "e"]),
            cells(&["1", "2", "3", "4", "5", "6", "7"]),
            None,
            1,
        );
        assert_eq!(entry.fields().len(), 5);
        assert_eq!(entry.iter().count(), 5);
        assert_eq!(entry.get("e"), ["5"]);
    }

    #[test]
    fn test_unknown_field_is_empty() {
        let entry = Entry::from_cells(fields(&["a"]), cells(&["1"]), None, 1);
        assert!(entry.get("missing").is_empty());
        assert!(entry.first("missing").is_none());
        assert!(!entry.has_field("missing"));
    }

    #[test]
    fn test_split_drops_blank_parts() {
        assert_eq!(split_cell(" a | | b ", Some("|")), vec!["a", "b"]);
        assert!(split_cell("   ", Some("|")).is_empty());
        assert_eq!(split_cell("\u{00a0}a|b\u{2003}", Some("|")), vec!["a", "b"]);
    }

    #[test]
    fn test_to_json() {
        let entry = Entry::from_cells(fields(&["a", "b", "c"]), cells(&["1", "x;y"]), Some(";"), 3);
        let json = entry.to_json();
        assert_eq!(json["a"], "1");
        assert_eq!(json["b"][1], "y");
        assert_eq!(json["c"], "");
        assert_eq!(entry.row(), 3);
    }
}
