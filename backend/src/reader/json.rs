//! JSON and JSON-LD reader.
//!
//! Accepts an array of objects, a JSON-LD document with an `@graph` array,
//! or a single object. The field list is the union of object keys in
//! first-seen order. Arrays become multi-value fields; value objects
//! (`{"@value": ...}`, `{"@id": ...}`, `{"o:id": ...}`) contribute their
//! scalar.

use super::{invalid_source, Reader, ReaderOptions};
use crate::entry::{split_cell, Entry};
use crate::error::{ReaderError, ReaderResult};
use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reader for JSON sources.
pub struct JsonReader {
    path: PathBuf,
    options: ReaderOptions,
    fields: Arc<[String]>,
    records: Vec<Map<String, Value>>,
    position: usize,
    last_error: Option<String>,
}

impl JsonReader {
    /// Open a JSON file.
    pub fn open(path: &Path, options: ReaderOptions) -> Self {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ReaderError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Err(ReaderError::NotFound {
                path: path.to_path_buf(),
            })
        };
        let mut reader = Self::empty(path, options);
        if let Err(e) = content.and_then(|c| reader.load(&c)) {
            tracing::warn!(path = %path.display(), error = %e, "cannot open source");
            reader.last_error = Some(e.to_string());
        }
        reader
    }

    /// Read JSON content already in memory.
    pub fn from_content(name: &str, content: &str, options: ReaderOptions) -> Self {
        let mut reader = Self::empty(Path::new(name), options);
        if let Err(e) = reader.load(content) {
            reader.last_error = Some(e.to_string());
        }
        reader
    }

    fn empty(path: &Path, options: ReaderOptions) -> Self {
        Self {
            path: path.to_path_buf(),
            options,
            fields: Arc::from(Vec::new()),
            records: Vec::new(),
            position: 0,
            last_error: None,
        }
    }

    fn load(&mut self, content: &str) -> ReaderResult<()> {
        let document: Value = serde_json::from_str(content).map_err(|e| ReaderError::Parse {
            format: "json",
            row: e.line(),
            message: e.to_string(),
        })?;

        let items = match document {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("@graph") {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(obj)],
            },
            _ => {
                return Err(ReaderError::Parse {
                    format: "json",
                    row: 0,
                    message: "expected an array of objects".to_string(),
                })
            }
        };

        let mut fields = IndexSet::new();
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(record) => {
                    fields.extend(record.keys().cloned());
                    self.records.push(record);
                }
                other => tracing::warn!(
                    index,
                    kind = json_kind(&other),
                    "skipping non-object JSON record"
                ),
            }
        }
        if fields.is_empty() {
            return Err(ReaderError::NoHeader {
                path: self.path.clone(),
            });
        }
        self.fields = fields.into_iter().collect::<Vec<_>>().into();
        Ok(())
    }

    fn values_of(&self, value: &Value) -> Vec<String> {
        let separator = self.options.separator.as_deref();
        let mut values = Vec::new();
        collect_scalars(value, &mut |s| values.extend(split_cell(&s, separator)));
        values
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn collect_scalars(value: &Value, push: &mut dyn FnMut(String)) {
    match value {
        Value::Null => {}
        Value::String(s) => push(s.clone()),
        Value::Bool(_) | Value::Number(_) => push(value.to_string()),
        Value::Array(items) => {
            for item in items {
                collect_scalars(item, push);
            }
        }
        Value::Object(obj) => {
            match ["@value", "@id", "o:id", "value"]
                .iter()
                .find_map(|k| obj.get(*k).filter(|v| !v.is_object() && !v.is_array()))
            {
                Some(scalar) => collect_scalars(scalar, push),
                None => push(value.to_string()),
            }
        }
    }
}

impl Reader for JsonReader {
    fn format(&self) -> &'static str {
        "json"
    }

    fn is_valid(&self) -> bool {
        self.last_error.is_none()
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn next_entry(&mut self) -> ReaderResult<Option<Entry>> {
        if !self.is_valid() {
            return Err(invalid_source(self.last_error.as_deref()));
        }
        let Some(record) = self.records.get(self.position) else {
            return Ok(None);
        };
        let values = self
            .fields
            .iter()
            .map(|f| record.get(f).map(|v| self.values_of(v)).unwrap_or_default())
            .collect();
        self.position += 1;
        Ok(Some(Entry::from_values(
            Arc::clone(&self.fields),
            values,
            self.position,
        )))
    }

    fn rewind(&mut self) -> ReaderResult<()> {
        if !self.is_valid() {
            return Err(invalid_source(self.last_error.as_deref()));
        }
        self.position = 0;
        Ok(())
    }

    fn is_restartable(&self) -> bool {
        true
    }

    fn count(&mut self) -> ReaderResult<usize> {
        if !self.is_valid() {
            return Err(invalid_source(self.last_error.as_deref()));
        }
        Ok(self.records.len())
    }
}
