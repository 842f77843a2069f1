//! Automap dictionary: common header phrases mapped to canonical targets.

use super::automap::normalize_name;
use super::target::FieldTarget;
use crate::error::{MappingError, MappingResult};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

static BUILTIN: Lazy<AutomapDictionary> = Lazy::new(|| {
    let entries = [
        ("id", "o:id"),
        ("internal id", "o:id"),
        ("o:id", "o:id"),
        ("item set", "o:item_set"),
        ("item sets", "o:item_set"),
        ("collection", "o:item_set"),
        ("collections", "o:item_set"),
        ("item set id", "o:item_set{o:id}"),
        ("item set title", "o:item_set{dcterms:title}"),
        ("item", "o:item"),
        ("item id", "o:item{o:id}"),
        ("owner", "o:owner"),
        ("owner email", "o:owner"),
        ("public", "o:is_public"),
        ("visibility", "o:is_public"),
        ("is public", "o:is_public"),
        ("open", "o:is_open"),
        ("is open", "o:is_open"),
        ("template", "o:resource_template"),
        ("resource template", "o:resource_template"),
        ("class", "o:resource_class"),
        ("resource class", "o:resource_class"),
        ("resource type", "resource_type"),
        ("type of resource", "resource_type"),
        ("media", "o:media{url}"),
        ("file", "o:media{file}"),
        ("files", "o:media{file}"),
        ("filename", "o:media{file}"),
        ("url", "o:media{url}"),
        ("media url", "o:media{url}"),
        ("html", "o:media{html}"),
        ("media html", "o:media{html}"),
        ("media title", "o:media{dcterms:title}"),
    ];
    AutomapDictionary {
        version: "1.0".to_string(),
        entries: entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
});

/// Versioned map of header phrase → target string.
///
/// Immutable once built; pass it to [`super::Automap::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomapDictionary {
    #[serde(default = "default_version")]
    pub version: String,
    pub entries: IndexMap<String, String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl AutomapDictionary {
    /// The built-in dictionary, built once per process.
    pub fn builtin() -> &'static AutomapDictionary {
        &BUILTIN
    }

    /// Dictionary without entries.
    pub fn empty() -> Self {
        Self {
            version: default_version(),
            entries: IndexMap::new(),
        }
    }

    /// Parse a dictionary from JSON.
    ///
    /// Accepts either `{"version": ..., "entries": {...}}` or a bare object of
    /// phrase → target.
    pub fn from_json(json: &str) -> MappingResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let dictionary = if value.get("entries").is_some() {
            serde_json::from_value(value)?
        } else {
            Self {
                version: default_version(),
                entries: serde_json::from_value(value)?,
            }
        };
        dictionary.compile()?;
        Ok(dictionary)
    }

    /// Load a dictionary file.
    pub fn from_file(path: &Path) -> MappingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Add or replace an entry.
    pub fn with_entry(mut self, phrase: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.insert(phrase.into(), target.into());
        self
    }

    /// Built-in entries overridden and extended by `other`.
    pub fn merged(&self, other: &AutomapDictionary) -> Self {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.clone());
        Self {
            version: other.version.clone(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse every entry: normalized phrase and target, in entry order.
    pub fn compile(&self) -> MappingResult<Vec<(String, FieldTarget)>> {
        self.entries
            .iter()
            .map(|(phrase, target)| {
                let parsed = FieldTarget::parse(target).map_err(|_| {
                    MappingError::InvalidTarget(format!("{} (for '{}')", target, phrase))
                })?;
                Ok((normalize_name(phrase), parsed))
            })
            .collect()
    }
}
