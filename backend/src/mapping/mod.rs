//! Field mapping: source fields to canonical targets.
//!
//! - [`target`] - canonical target descriptors and their qualifiers
//! - [`dictionary`] - the versioned automap dictionary
//! - [`automap`] - heuristic header resolution
//!
//! A [`FieldMapping`] is what the processor consumes: an ordered list of
//! source fields with their targets. It is built from automap output or
//! loaded from JSON, and can be stored in the mapping registry.
//!
//! # Example
//! ```ignore
//! use bulkport::mapping::{Automap, AutomapDictionary, AutomapOptions, FieldMapping};
//! use bulkport::models::VocabularySet;
//!
//! let automap = Automap::new(&VocabularySet::builtin(), AutomapDictionary::builtin(), AutomapOptions::default())?;
//! let mapping = FieldMapping::from_automap(&automap, &["Title", "Item set", "Notes"]);
//! assert_eq!(mapping.unmapped, vec!["Notes"]);
//! ```

pub mod automap;
pub mod dictionary;
pub mod target;

use crate::error::{MappingError, MappingResult};
use crate::models::VocabularySet;
use serde::{Deserialize, Serialize};

pub use automap::{normalize_name, Automap, AutomapOptions};
pub use dictionary::AutomapDictionary;
pub use target::{FieldTarget, Qualifiers, StructuralField, Target};

/// One source field and the targets it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedField {
    /// Source field name, as in the header.
    pub source: String,
    /// Targets, in order.
    pub targets: Vec<FieldTarget>,
}

/// Ordered mapping of source fields to targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Version of the target vocabulary.
    #[serde(default = "default_version")]
    pub version: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Mapped fields, in source order.
    #[serde(default)]
    pub fields: Vec<MappedField>,

    /// Source fields left without target.
    #[serde(default)]
    pub unmapped: Vec<String>,
}

fn default_version() -> String {
    target::TARGET_VOCABULARY_VERSION.to_string()
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self {
            version: default_version(),
            description: String::new(),
            fields: Vec::new(),
            unmapped: Vec::new(),
        }
    }

    /// Build a mapping from automap results.
    pub fn from_automap<S: AsRef<str>>(automap: &Automap, fields: &[S]) -> Self {
        let mut mapping = Self::new();
        for (field, target) in fields.iter().zip(automap.resolve(fields)) {
            match target {
                Some(target) => mapping.push(field.as_ref(), target),
                None => mapping.unmapped.push(field.as_ref().to_string()),
            }
        }
        mapping
    }

    /// Parse a mapping from JSON.
    ///
    /// Accepts the full form or a bare object of field → target (or list of
    /// targets).
    pub fn from_json(json: &str) -> MappingResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("fields").is_some() {
            return Ok(serde_json::from_value(value)?);
        }
        let serde_json::Value::Object(pairs) = value else {
            return Err(MappingError::InvalidTarget(
                "mapping must be a JSON object".to_string(),
            ));
        };
        let mut mapping = Self::new();
        for (source, targets) in pairs {
            let targets = match targets {
                serde_json::Value::String(s) => vec![s],
                serde_json::Value::Null => Vec::new(),
                other => serde_json::from_value(other)?,
            };
            if targets.is_empty() {
                mapping.unmapped.push(source);
                continue;
            }
            for target in targets {
                mapping.push(&source, FieldTarget::parse(&target)?);
            }
        }
        Ok(mapping)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> MappingResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Add a target to a source field, keeping source order.
    pub fn push(&mut self, source: &str, target: FieldTarget) {
        match self.fields.iter_mut().find(|f| f.source == source) {
            Some(field) => {
                if !field.targets.contains(&target) {
                    field.targets.push(target);
                }
            }
            None => self.fields.push(MappedField {
                source: source.to_string(),
                targets: vec![target],
            }),
        }
        self.unmapped.retain(|u| u != source);
    }

    /// Targets of a source field.
    pub fn targets_of(&self, source: &str) -> &[FieldTarget] {
        self.fields
            .iter()
            .find(|f| f.source == source)
            .map(|f| f.targets.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate over `(source, target)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &FieldTarget)> {
        self.fields
            .iter()
            .flat_map(|f| f.targets.iter().map(move |t| (f.source.as_str(), t)))
    }

    /// Source fields feeding a given target.
    pub fn sources_of(&self, target: &Target) -> Vec<&str> {
        self.pairs()
            .filter(|(_, t)| &t.target == target)
            .map(|(s, _)| s)
            .collect()
    }

    /// Whether any field maps to the target.
    pub fn has_target(&self, target: &Target) -> bool {
        self.pairs().any(|(_, t)| &t.target == target)
    }

    /// Get all source columns referenced in the mapping
    pub fn source_columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.source.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate that all mapped source columns exist in the headers
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Check every property target against the vocabulary.
    pub fn validate(&self, vocabulary: &VocabularySet) -> MappingResult<()> {
        for (_, target) in self.pairs() {
            target.target.validate(vocabulary)?;
        }
        Ok(())
    }
}
