//! Canonical field targets.
//!
//! A target string names where a source field goes (or, on export, where an
//! output column comes from):
//!
//! - `o:id` - internal id
//! - `dcterms:title` - a property term
//! - `o:item_set`, `o:is_public`, `resource_type`... - structural fields
//! - `o:item_set{dcterms:title}`, `o:media{url}` - nested paths
//!
//! A target may carry qualifiers after the path:
//! `dcterms:title @fr ^^literal §private`.

use crate::error::{MappingError, MappingResult};
use crate::models::VocabularySet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static TERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][\w.-]*:[A-Za-z_][\w.-]*$").expect("valid term regex"));

/// Version of the canonical target vocabulary.
pub const TARGET_VOCABULARY_VERSION: &str = "1.0";

// =============================================================================
// Structural Fields
// =============================================================================

/// Fields of a resource that are not property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralField {
    ResourceTemplate,
    ResourceClass,
    Owner,
    IsPublic,
    IsOpen,
    ItemSet,
    Item,
    Media,
    ResourceType,
}

impl StructuralField {
    pub const ALL: [StructuralField; 9] = [
        Self::ResourceTemplate,
        Self::ResourceClass,
        Self::Owner,
        Self::IsPublic,
        Self::IsOpen,
        Self::ItemSet,
        Self::Item,
        Self::Media,
        Self::ResourceType,
    ];

    /// Canonical term.
    pub fn term(&self) -> &'static str {
        match self {
            Self::ResourceTemplate => "o:resource_template",
            Self::ResourceClass => "o:resource_class",
            Self::Owner => "o:owner",
            Self::IsPublic => "o:is_public",
            Self::IsOpen => "o:is_open",
            Self::ItemSet => "o:item_set",
            Self::Item => "o:item",
            Self::Media => "o:media",
            Self::ResourceType => "resource_type",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ResourceTemplate => "Resource template",
            Self::ResourceClass => "Resource class",
            Self::Owner => "Owner",
            Self::IsPublic => "Visibility public",
            Self::IsOpen => "Is open",
            Self::ItemSet => "Item set",
            Self::Item => "Item",
            Self::Media => "Media",
            Self::ResourceType => "Resource type",
        }
    }

    pub fn from_term(term: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.term() == term)
    }

    /// Whether the field links to other resources.
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::ItemSet | Self::Item | Self::Media)
    }
}

// =============================================================================
// Target
// =============================================================================

/// Canonical destination of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// `o:id`.
    InternalId,
    /// A property term (`dcterms:title`).
    Property(String),
    /// A structural field.
    Structural(StructuralField),
    /// `parent{child}`: a field of a related resource.
    Nested { parent: String, child: String },
}

impl Target {
    /// Parse a bare target path, without qualifiers.
    pub fn parse(path: &str) -> MappingResult<Self> {
        let path = path.trim();
        if let Some((parent, rest)) = path.split_once('{') {
            let child = rest
                .strip_suffix('}')
                .map(str::trim)
                .filter(|c| !c.is_empty() && !c.contains(['{', '}']))
                .ok_or_else(|| MappingError::InvalidTarget(path.to_string()))?;
            let parent = parent.trim();
            return match Self::parse(parent)? {
                Target::Nested { .. } | Target::InternalId => {
                    Err(MappingError::InvalidTarget(path.to_string()))
                }
                _ => Ok(Target::Nested {
                    parent: parent.to_string(),
                    child: child.to_string(),
                }),
            };
        }
        if path == "o:id" {
            return Ok(Target::InternalId);
        }
        if let Some(field) = StructuralField::from_term(path) {
            return Ok(Target::Structural(field));
        }
        if !path.starts_with("o:") && TERM_RE.is_match(path) {
            return Ok(Target::Property(path.to_string()));
        }
        Err(MappingError::InvalidTarget(path.to_string()))
    }

    /// Canonical path string.
    pub fn path(&self) -> String {
        match self {
            Target::InternalId => "o:id".to_string(),
            Target::Property(term) => term.clone(),
            Target::Structural(field) => field.term().to_string(),
            Target::Nested { parent, child } => format!("{}{{{}}}", parent, child),
        }
    }

    /// Property term, when the target is a property.
    pub fn property(&self) -> Option<&str> {
        match self {
            Target::Property(term) => Some(term),
            _ => None,
        }
    }

    /// Check property terms against a vocabulary.
    pub fn validate(&self, vocabulary: &VocabularySet) -> MappingResult<()> {
        match self {
            Target::Property(term) if !vocabulary.has_term(term) => {
                Err(MappingError::InvalidTarget(term.clone()))
            }
            Target::Nested { parent, .. } => match Target::parse(parent)? {
                Target::Property(term) if !vocabulary.has_term(&term) => {
                    Err(MappingError::InvalidTarget(term))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

// =============================================================================
// Field Target (target + qualifiers)
// =============================================================================

/// A target with its optional qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldTarget {
    pub target: Target,
    /// Value data type (`^^literal`, `^^uri`, `^^resource:item`...).
    pub data_type: Option<String>,
    /// Language tag (`@fr`).
    pub language: Option<String>,
    /// Visibility (`§public`, `§private`).
    pub is_public: Option<bool>,
}

/// Qualifiers split off a field name or target string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Qualifiers {
    pub data_type: Option<String>,
    pub language: Option<String>,
    pub is_public: Option<bool>,
}

impl Qualifiers {
    pub fn is_empty(&self) -> bool {
        self.data_type.is_none() && self.language.is_none() && self.is_public.is_none()
    }
}

/// Split trailing qualifiers from a string.
///
/// Returns the remaining base and the qualifiers found. Tokens that do not
/// look like qualifiers stay in the base.
pub fn split_qualifiers(input: &str) -> (String, Qualifiers) {
    let mut qualifiers = Qualifiers::default();
    let mut base = Vec::new();
    for token in input.split_whitespace() {
        if let Some(dt) = token.strip_prefix("^^").filter(|t| !t.is_empty()) {
            qualifiers.data_type = Some(dt.to_string());
        } else if let Some(lang) = token
            .strip_prefix('@')
            .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        {
            qualifiers.language = Some(lang.to_string());
        } else if let Some(visibility) = token.strip_prefix('§') {
            match visibility.to_lowercase().as_str() {
                "public" => qualifiers.is_public = Some(true),
                "private" => qualifiers.is_public = Some(false),
                _ => base.push(token),
            }
        } else {
            base.push(token);
        }
    }
    (base.join(" "), qualifiers)
}

impl FieldTarget {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            data_type: None,
            language: None,
            is_public: None,
        }
    }

    /// Parse a qualified target string.
    pub fn parse(input: &str) -> MappingResult<Self> {
        let (base, qualifiers) = split_qualifiers(input);
        let target = Target::parse(&base)?;
        Ok(Self::new(target).with_qualifiers(&qualifiers))
    }

    /// Apply qualifiers, keeping existing ones when a qualifier is absent.
    pub fn with_qualifiers(mut self, qualifiers: &Qualifiers) -> Self {
        if qualifiers.data_type.is_some() {
            self.data_type = qualifiers.data_type.clone();
        }
        if qualifiers.language.is_some() {
            self.language = qualifiers.language.clone();
        }
        if qualifiers.is_public.is_some() {
            self.is_public = qualifiers.is_public;
        }
        self
    }
}

impl fmt::Display for FieldTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        if let Some(ref lang) = self.language {
            write!(f, " @{}", lang)?;
        }
        if let Some(ref dt) = self.data_type {
            write!(f, " ^^{}", dt)?;
        }
        match self.is_public {
            Some(true) => write!(f, " §public"),
            Some(false) => write!(f, " §private"),
            None => Ok(()),
        }
    }
}

impl FromStr for FieldTarget {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldTarget {
    type Error = MappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldTarget> for String {
    fn from(target: FieldTarget) -> Self {
        target.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(Target::parse("o:id").unwrap(), Target::InternalId);
        assert_eq!(
            Target::parse("dcterms:title").unwrap(),
            Target::Property("dcterms:title".into())
        );
        assert_eq!(
            Target::parse("o:item_set").unwrap(),
            Target::Structural(StructuralField::ItemSet)
        );
        assert_eq!(
            Target::parse("resource_type").unwrap(),
            Target::Structural(StructuralField::ResourceType)
        );
        assert_eq!(
            Target::parse("o:item_set{o:id}").unwrap(),
            Target::Nested {
                parent: "o:item_set".into(),
                child: "o:id".into()
            }
        );
    }

    #[test]
    fn test_invalid_targets() {
        for bad in ["", "title", "o:unknown", "o:id{x}", "a:b{}", "a:b{c{d}}", "o:media{url"] {
            assert!(Target::parse(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_qualified_target() {
        let target = FieldTarget::parse("dcterms:title @fr ^^literal §private").unwrap();
        assert_eq!(target.target, Target::Property("dcterms:title".into()));
        assert_eq!(target.language.as_deref(), Some("fr"));
        assert_eq!(target.data_type.as_deref(), Some("literal"));
        assert_eq!(target.is_public, Some(false));
        assert_eq!(target.to_string(), "dcterms:title @fr ^^literal §private");
    }

    #[test]
    fn test_serde_as_string() {
        let target: FieldTarget = serde_json::from_str(r#""o:media{url}""#).unwrap();
        assert_eq!(serde_json::to_string(&target).unwrap(), r#""o:media{url}""#);
        assert!(serde_json::from_str::<FieldTarget>(r#""nope""#).is_err());
    }

    #[test]
    fn test_split_qualifiers_keeps_plain_words() {
        let (base, q) = split_qualifiers("Item set @en");
        assert_eq!(base, "Item set");
        assert_eq!(q.language.as_deref(), Some("en"));
        let (base, q) = split_qualifiers("contact @ home");
        assert_eq!(base, "contact @ home");
        assert!(q.is_empty());
    }

    #[test]
    fn test_validate_against_vocabulary() {
        let vocab = VocabularySet::builtin();
        assert!(Target::parse("dcterms:title").unwrap().validate(&vocab).is_ok());
        assert!(Target::parse("dcterms:nope").unwrap().validate(&vocab).is_err());
        assert!(Target::parse("dcterms:isPartOf{o:id}")
            .unwrap()
            .validate(&vocab)
            .is_ok());
    }
}
