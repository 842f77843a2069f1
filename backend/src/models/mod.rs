//! Domain models for the bulkport pipeline.
//!
//! This module contains the resource graph shared by readers, the processor
//! and the writers:
//!
//! - [`Resource`] - An item, item set, media or annotation with its values
//! - [`ResourceType`] - The closed set of resource kinds
//! - [`PropertyValue`] - One value of a property (literal, URI or linked resource)
//! - [`MediaSource`] - Ingestion source of a media (URL, file name, HTML)
//! - [`Vocabulary`] - Property vocabularies used for automap and labels

pub mod vocabulary;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use vocabulary::{Property, Vocabulary, VocabularySet};

// =============================================================================
// Resource Type
// =============================================================================

/// Kind of resource stored in the repository.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Regular item.
    Items,
    /// Collection of items.
    ItemSets,
    /// File or embedded content attached to an item.
    Media,
    /// Annotation targeting another resource.
    Annotations,
}

impl ResourceType {
    /// All resource types, in export order.
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Items,
        ResourceType::ItemSets,
        ResourceType::Media,
        ResourceType::Annotations,
    ];

    /// Parse a resource type from its API name or a common alias.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "items" | "item" | "o:item" => Some(Self::Items),
            "item_sets" | "item_set" | "itemset" | "itemsets" | "o:itemset" | "collection" => {
                Some(Self::ItemSets)
            }
            "media" | "medias" | "o:media" | "file" => Some(Self::Media),
            "annotations" | "annotation" | "oa:annotation" => Some(Self::Annotations),
            _ => None,
        }
    }

    /// API name, used in URLs and in the resource type column.
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::ItemSets => "item_sets",
            Self::Media => "media",
            Self::Annotations => "annotations",
        }
    }

    /// JSON-LD class of this resource type.
    pub fn json_ld_type(&self) -> &'static str {
        match self {
            Self::Items => "o:Item",
            Self::ItemSets => "o:ItemSet",
            Self::Media => "o:Media",
            Self::Annotations => "o:Annotation",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

// =============================================================================
// Property Value
// =============================================================================

/// Data type of a literal value.
pub const DATA_TYPE_LITERAL: &str = "literal";
/// Data type of a URI value.
pub const DATA_TYPE_URI: &str = "uri";
/// Data type of a linked resource value.
pub const DATA_TYPE_RESOURCE: &str = "resource";
/// Data type of a "lat,lng" coordinates value.
pub const DATA_TYPE_COORDINATES: &str = "geography:coordinates";

/// One value of a property.
///
/// A value is a literal (`value`), a URI (`uri` with an optional `label`) or
/// a link to another resource (`resource_id`), depending on `data_type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyValue {
    /// Data type identifier (`literal`, `uri`, `resource`, `resource:item`...).
    #[serde(rename = "type")]
    pub data_type: String,
    /// Literal content.
    #[serde(rename = "@value", skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
    /// URI for `uri` values.
    #[serde(rename = "@id", skip_serializing_if = "Option::is_none", default)]
    pub uri: Option<String>,
    /// Label of a URI value.
    #[serde(rename = "o:label", skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
    /// Linked resource for `resource` values.
    #[serde(rename = "value_resource_id", skip_serializing_if = "Option::is_none", default)]
    pub resource_id: Option<u64>,
    /// Language tag.
    #[serde(rename = "@language", skip_serializing_if = "Option::is_none", default)]
    pub lang: Option<String>,
    /// Whether the value is visible to anonymous users.
    #[serde(default = "default_true")]
    pub is_public: bool,
}

fn default_true() -> bool {
    true
}

impl PropertyValue {
    /// Create a literal value.
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            data_type: DATA_TYPE_LITERAL.to_string(),
            value: Some(value.into()),
            uri: None,
            label: None,
            resource_id: None,
            lang: None,
            is_public: true,
        }
    }

    /// Create a URI value with an optional label.
    pub fn uri(uri: impl Into<String>, label: Option<String>) -> Self {
        Self {
            data_type: DATA_TYPE_URI.to_string(),
            value: None,
            uri: Some(uri.into()),
            label,
            resource_id: None,
            lang: None,
            is_public: true,
        }
    }

    /// Create a link to another resource.
    pub fn resource(id: u64) -> Self {
        Self {
            data_type: DATA_TYPE_RESOURCE.to_string(),
            value: None,
            uri: None,
            label: None,
            resource_id: Some(id),
            lang: None,
            is_public: true,
        }
    }

    /// Set the language tag.
    pub fn with_lang(mut self, lang: Option<String>) -> Self {
        self.lang = lang;
        self
    }

    /// Set the visibility.
    pub fn with_visibility(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    /// Whether this value links to another resource.
    pub fn is_resource(&self) -> bool {
        self.data_type == DATA_TYPE_RESOURCE || self.data_type.starts_with("resource:")
    }

    /// Whether this value is a URI.
    pub fn is_uri(&self) -> bool {
        self.data_type == DATA_TYPE_URI || self.data_type.starts_with("valuesuggest:")
    }

    /// Plain string form: literal content, URI, or linked id.
    pub fn as_plain(&self) -> String {
        if let Some(ref v) = self.value {
            return v.clone();
        }
        if let Some(ref u) = self.uri {
            return u.clone();
        }
        self.resource_id.map(|id| id.to_string()).unwrap_or_default()
    }
}

// =============================================================================
// Media Source
// =============================================================================

/// Where a media was ingested from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaSource {
    /// Ingester kind (`url`, `file`, `html`, `iiif`...).
    pub ingester: String,
    /// Source URL, file name or content.
    pub source: String,
}

// =============================================================================
// Resource
// =============================================================================

/// A resource of the repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    /// Internal id; 0 until stored.
    #[serde(rename = "o:id", default)]
    pub id: u64,
    /// Kind of resource.
    pub resource_type: ResourceType,
    /// Owner email.
    #[serde(rename = "o:owner", skip_serializing_if = "Option::is_none", default)]
    pub owner: Option<String>,
    /// Resource template id.
    #[serde(rename = "o:resource_template", skip_serializing_if = "Option::is_none", default)]
    pub resource_template: Option<u64>,
    /// Resource class term (`bibo:Book`).
    #[serde(rename = "o:resource_class", skip_serializing_if = "Option::is_none", default)]
    pub resource_class: Option<String>,
    /// Visibility.
    #[serde(rename = "o:is_public", default = "default_true")]
    pub is_public: bool,
    /// Whether an item set accepts new items from any user.
    #[serde(rename = "o:is_open", default)]
    pub is_open: bool,
    /// Item sets of an item.
    #[serde(rename = "o:item_set", skip_serializing_if = "Vec::is_empty", default)]
    pub item_sets: Vec<u64>,
    /// Parent item of a media.
    #[serde(rename = "o:item", skip_serializing_if = "Option::is_none", default)]
    pub item: Option<u64>,
    /// Media of an item, in position order.
    #[serde(rename = "o:media", skip_serializing_if = "Vec::is_empty", default)]
    pub media: Vec<u64>,
    /// Ingestion source of a media.
    #[serde(rename = "o:source", skip_serializing_if = "Option::is_none", default)]
    pub media_source: Option<MediaSource>,
    /// Property values keyed by term, in insertion order.
    #[serde(default)]
    pub values: IndexMap<String, Vec<PropertyValue>>,
}

impl Resource {
    /// Create an empty, unsaved resource.
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            id: 0,
            resource_type,
            owner: None,
            resource_template: None,
            resource_class: None,
            is_public: true,
            is_open: false,
            item_sets: Vec::new(),
            item: None,
            media: Vec::new(),
            media_source: None,
            values: IndexMap::new(),
        }
    }

    /// Append a value to a property.
    pub fn add_value(&mut self, term: &str, value: PropertyValue) {
        self.values.entry(term.to_string()).or_default().push(value);
    }

    /// Values of a property; empty when the property is not set.
    pub fn values_of(&self, term: &str) -> &[PropertyValue] {
        self.values.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First plain value of a property.
    pub fn first_value(&self, term: &str) -> Option<String> {
        self.values_of(term).first().map(PropertyValue::as_plain)
    }

    /// Display title: `dcterms:title`, else the media source, else `#id`.
    pub fn display_title(&self) -> String {
        self.first_value("dcterms:title")
            .or_else(|| self.media_source.as_ref().map(|s| s.source.clone()))
            .unwrap_or_else(|| format!("#{}", self.id))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_parse() {
        assert_eq!(ResourceType::parse("items"), Some(ResourceType::Items));
        assert_eq!(ResourceType::parse("Item Set"), Some(ResourceType::ItemSets));
        assert_eq!(ResourceType::parse("o:ItemSet"), Some(ResourceType::ItemSets));
        assert_eq!(ResourceType::parse("media"), Some(ResourceType::Media));
        assert_eq!(ResourceType::parse("nothing"), None);
    }

    #[test]
    fn test_resource_type_roundtrip() {
        for rt in ResourceType::ALL {
            assert_eq!(ResourceType::parse(rt.api_name()), Some(rt));
        }
    }

    #[test]
    fn test_value_kinds() {
        assert!(PropertyValue::resource(3).is_resource());
        assert!(PropertyValue::uri("https://example.org", None).is_uri());
        assert_eq!(PropertyValue::literal("A").as_plain(), "A");
        assert_eq!(PropertyValue::resource(3).as_plain(), "3");
    }

    #[test]
    fn test_resource_serialization() {
        let mut resource = Resource::new(ResourceType::Items);
        resource.add_value("dcterms:title", PropertyValue::literal("Test"));
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["resource_type"], "items");
        assert_eq!(json["values"]["dcterms:title"][0]["@value"], "Test");
        // Empty relations are omitted
        assert!(json.get("o:item_set").is_none());

        let back: Resource = serde_json::from_value(json).unwrap();
        assert_eq!(back, resource);
    }

    #[test]
    fn test_display_title_fallbacks() {
        let mut media = Resource::new(ResourceType::Media);
        media.id = 7;
        assert_eq!(media.display_title(), "#7");
        media.media_source = Some(MediaSource {
            ingester: "url".into(),
            source: "https://example.org/a.jpg".into(),
        });
        assert_eq!(media.display_title(), "https://example.org/a.jpg");
    }
}
