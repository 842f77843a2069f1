//! Automap: raw header names to canonical targets.
//!
//! Lookup tables are built once from a vocabulary snapshot and a dictionary;
//! [`Automap::resolve`] is then a pure read and can be shared across threads.
//!
//! Matching order for each field (first hit wins):
//!
//! 1. dictionary phrase, exact then case-insensitive
//! 2. canonical term (`dcterms:title`, `o:item_set`, nested paths), exact
//!    then case-insensitive
//! 3. full label (`Dublin Core : Title`), exact then case-insensitive
//! 4. local name (`Title`, `dc:title`), exact then case-insensitive, when
//!    [`AutomapOptions::check_names_alone`] is set

use super::dictionary::AutomapDictionary;
use super::target::{split_qualifiers, FieldTarget, StructuralField, Target};
use crate::error::MappingResult;
use crate::models::VocabularySet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid spaces regex"));
static COLON_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*:\s*").expect("valid colon regex"));

/// Normalize a field name for matching.
///
/// Trims Unicode whitespace, collapses inner whitespace runs and removes
/// whitespace around colons: `" Dublin Core : Title "` → `"Dublin Core:Title"`.
pub fn normalize_name(name: &str) -> String {
    let collapsed = SPACES_RE.replace_all(name.trim(), " ");
    COLON_RE.replace_all(&collapsed, ":").into_owned()
}

/// Automap options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutomapOptions {
    /// Match local names and bare labels once prefixed forms fail.
    pub check_names_alone: bool,
    /// Read `@lang`, `^^datatype` and `§visibility` qualifiers in headers.
    pub extract_qualifiers: bool,
}

impl Default for AutomapOptions {
    fn default() -> Self {
        Self {
            check_names_alone: true,
            extract_qualifiers: true,
        }
    }
}

/// Exact and case-folded lookup; the first inserted key wins.
#[derive(Debug, Default)]
struct Lookup {
    exact: HashMap<String, FieldTarget>,
    folded: HashMap<String, FieldTarget>,
}

impl Lookup {
    fn insert(&mut self, key: &str, target: FieldTarget) {
        self.folded
            .entry(key.to_lowercase())
            .or_insert_with(|| target.clone());
        self.exact.entry(key.to_string()).or_insert(target);
    }

    fn find(&self, key: &str) -> Option<&FieldTarget> {
        self.exact
            .get(key)
            .or_else(|| self.folded.get(&key.to_lowercase()))
    }
}

/// Header resolver over one vocabulary snapshot and one dictionary.
#[derive(Debug)]
pub struct Automap {
    vocabulary: VocabularySet,
    dictionary: Lookup,
    terms: Lookup,
    labels: Lookup,
    names: Lookup,
    options: AutomapOptions,
}

impl Automap {
    /// Build lookup tables.
    ///
    /// Fails only when a dictionary entry has a malformed target.
    pub fn new(
        vocabulary: &VocabularySet,
        dictionary: &AutomapDictionary,
        options: AutomapOptions,
    ) -> MappingResult<Self> {
        let mut dict = Lookup::default();
        for (phrase, target) in dictionary.compile()? {
            dict.insert(&phrase, target);
        }

        let mut terms = Lookup::default();
        let mut labels = Lookup::default();
        let mut names = Lookup::default();

        terms.insert("o:id", FieldTarget::new(Target::InternalId));
        for field in StructuralField::ALL {
            terms.insert(field.term(), FieldTarget::new(Target::Structural(field)));
        }

        for property in vocabulary.properties() {
            let target = FieldTarget::new(Target::Property(property.term.clone()));
            terms.insert(&property.term, target.clone());

            let label = normalize_name(&property.full_label());
            if labels.exact.contains_key(&label) {
                labels.insert(&format!("{} ({})", label, property.id), target.clone());
            } else {
                labels.insert(&label, target.clone());
            }

            names.insert(property.local_name, target.clone());
            names.insert(&normalize_name(property.label), target);
        }
        for field in StructuralField::ALL {
            labels.insert(field.label(), FieldTarget::new(Target::Structural(field)));
        }

        Ok(Self {
            vocabulary: vocabulary.clone(),
            dictionary: dict,
            terms,
            labels,
            names,
            options,
        })
    }

    /// Resolve each field; output has the same length and order as input.
    pub fn resolve<S: AsRef<str>>(&self, fields: &[S]) -> Vec<Option<FieldTarget>> {
        fields.iter().map(|f| self.resolve_one(f.as_ref())).collect()
    }

    /// Resolve a single field name.
    pub fn resolve_one(&self, field: &str) -> Option<FieldTarget> {
        let (base, qualifiers) = if self.options.extract_qualifiers {
            split_qualifiers(field)
        } else {
            (field.to_string(), Default::default())
        };
        let name = normalize_name(&base);
        if name.is_empty() {
            return None;
        }

        let found = self
            .dictionary
            .find(&name)
            .or_else(|| self.terms.find(&name))
            .cloned()
            .or_else(|| self.nested_path(&name))
            .or_else(|| self.labels.find(&name).cloned())
            .or_else(|| {
                if !self.options.check_names_alone {
                    return None;
                }
                let local = name.rsplit_once(':').map(|(_, l)| l).unwrap_or(&name);
                self.names.find(local).cloned()
            })?;

        Some(found.with_qualifiers(&qualifiers))
    }

    fn nested_path(&self, name: &str) -> Option<FieldTarget> {
        if !name.contains('{') {
            return None;
        }
        let target = Target::parse(name).ok()?;
        target.validate(&self.vocabulary).ok()?;
        Some(FieldTarget::new(target))
    }
}
