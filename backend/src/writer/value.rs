//! Value formatting policies.
//!
//! How a stored value becomes a cell is configuration, not code per output
//! format: every formatter goes through [`ValueFormatter`].

use crate::error::WriterResult;
use crate::models::{PropertyValue, Resource, ResourceType};
use crate::store::ResourceStore;
use serde::{Deserialize, Serialize};

/// Field headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldNameStyle {
    /// Canonical term (`dcterms:title`).
    #[default]
    Term,
    /// Human label (`Title`).
    Label,
}

/// Literal values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueStyle {
    #[default]
    Plain,
    /// Escaped HTML, with the language as a `lang` attribute.
    Html,
}

/// Linked resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStyle {
    /// Value of the identifier property.
    Identifier,
    /// Internal id.
    #[default]
    Id,
    /// Identifier when there is one, internal id otherwise.
    IdentifierOrId,
    /// API URL.
    Url,
    /// Display title.
    Title,
    /// API URL followed by the title.
    UrlAndTitle,
}

/// URI values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UriStyle {
    /// URI followed by its label.
    #[default]
    UriLabel,
    Uri,
    /// `<a href>` link.
    Html,
}

/// Formatting knobs of an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    pub field_names: FieldNameStyle,
    pub value_style: ValueStyle,
    pub resource_style: ResourceStyle,
    pub uri_style: UriStyle,
    /// Property holding resource identifiers.
    pub identifier_property: String,
    /// Base of resource URLs (`https://example.org/api`).
    pub base_url: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            field_names: FieldNameStyle::Term,
            value_style: ValueStyle::Plain,
            resource_style: ResourceStyle::Id,
            uri_style: UriStyle::UriLabel,
            identifier_property: "dcterms:identifier".to_string(),
            base_url: String::new(),
        }
    }
}

impl FormatOptions {
    /// URL of a resource.
    pub fn resource_url(&self, resource_type: ResourceType, id: u64) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            resource_type.api_name(),
            id
        )
    }
}

/// Escape text for HTML output.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Formats values with a store at hand for linked resources.
pub struct ValueFormatter<'a> {
    store: &'a dyn ResourceStore,
    options: &'a FormatOptions,
}

impl<'a> ValueFormatter<'a> {
    pub fn new(store: &'a dyn ResourceStore, options: &'a FormatOptions) -> Self {
        Self { store, options }
    }

    /// Format one property value.
    pub fn value(&self, value: &PropertyValue) -> WriterResult<String> {
        if let Some(id) = value.resource_id.filter(|_| value.is_resource()) {
            return self.linked(id);
        }
        if let Some(ref uri) = value.uri {
            let label = value.label.as_deref().filter(|l| !l.is_empty());
            return Ok(match (self.options.uri_style, label) {
                (UriStyle::Uri, _) | (UriStyle::UriLabel, None) => uri.clone(),
                (UriStyle::UriLabel, Some(label)) => format!("{} {}", uri, label),
                (UriStyle::Html, label) => format!(
                    "<a href=\"{}\">{}</a>",
                    escape_html(uri),
                    escape_html(label.unwrap_or(uri))
                ),
            });
        }
        let text = value.value.clone().unwrap_or_default();
        Ok(match (self.options.value_style, value.lang.as_deref()) {
            (ValueStyle::Plain, _) => text,
            (ValueStyle::Html, Some(lang)) => {
                format!("<span lang=\"{}\">{}</span>", escape_html(lang), escape_html(&text))
            }
            (ValueStyle::Html, None) => escape_html(&text),
        })
    }

    /// Format a link to another resource; a missing resource gives an
    /// empty string.
    pub fn linked(&self, id: u64) -> WriterResult<String> {
        if self.options.resource_style == ResourceStyle::Id {
            return Ok(id.to_string());
        }
        match self.store.get(id)? {
            Some(resource) => Ok(self.linked_resource(&resource)),
            None => Ok(String::new()),
        }
    }

    fn linked_resource(&self, resource: &Resource) -> String {
        let identifier = resource.first_value(&self.options.identifier_property);
        let url = || self.options.resource_url(resource.resource_type, resource.id);
        match self.options.resource_style {
            ResourceStyle::Id => resource.id.to_string(),
            ResourceStyle::Identifier => identifier.unwrap_or_default(),
            ResourceStyle::IdentifierOrId => identifier.unwrap_or_else(|| resource.id.to_string()),
            ResourceStyle::Url => url(),
            ResourceStyle::Title => resource.display_title(),
            ResourceStyle::UrlAndTitle => format!("{} {}", url(), resource.display_title()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VocabularySet;
    use crate::store::MemoryStore;

    fn store_with_person() -> (MemoryStore, u64) {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut person = Resource::new(ResourceType::Items);
        person.add_value("dcterms:title", PropertyValue::literal("Ada"));
        person.add_value("dcterms:identifier", PropertyValue::literal("P-1"));
        let id = store.insert(person).unwrap();
        (store, id)
    }

    #[test]
    fn test_linked_resource_styles() {
        let (store, id) = store_with_person();
        let cases = [
            (ResourceStyle::Id, id.to_string()),
            (ResourceStyle::Identifier, "P-1".to_string()),
            (ResourceStyle::Title, "Ada".to_string()),
            (ResourceStyle::Url, format!("https://example.org/api/items/{}", id)),
            (ResourceStyle::UrlAndTitle, format!("https://example.org/api/items/{} Ada", id)),
        ];
        for (style, expected) in cases {
            let options = FormatOptions {
                resource_style: style,
                base_url: "https://example.org/api/".into(),
                ..FormatOptions::default()
            };
            let formatter = ValueFormatter::new(&store, &options);
            assert_eq!(formatter.value(&PropertyValue::resource(id)).unwrap(), expected);
        }

        let options = FormatOptions {
            resource_style: ResourceStyle::Title,
            ..FormatOptions::default()
        };
        let formatter = ValueFormatter::new(&store, &options);
        assert_eq!(formatter.linked(id + 50).unwrap(), "");
    }

    #[test]
    fn test_uri_and_literal_styles() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let uri = PropertyValue::uri("https://example.org/x", Some("X & Y".into()));
        let literal = PropertyValue::literal("<b>").with_lang(Some("fr".into()));

        let plain = FormatOptions::default();
        let formatter = ValueFormatter::new(&store, &plain);
        assert_eq!(formatter.value(&uri).unwrap(), "https://example.org/x X & Y");
        assert_eq!(formatter.value(&literal).unwrap(), "<b>");

        let html = FormatOptions {
            uri_style: UriStyle::Html,
            value_style: ValueStyle::Html,
            ..FormatOptions::default()
        };
        let formatter = ValueFormatter::new(&store, &html);
        assert_eq!(
            formatter.value(&uri).unwrap(),
            "<a href=\"https://example.org/x\">X &amp; Y</a>"
        );
        assert_eq!(formatter.value(&literal).unwrap(), "<span lang=\"fr\">&lt;b&gt;</span>");
    }
}
