//! Export: resources → rows → output formats.
//!
//! An [`Exporter`] selects resources from a store, decides the ordered list
//! of output fields and produces one [`ExportRow`] per resource, lazily.
//! Formatters turn those rows into bytes:
//!
//! - [`tabular`] - CSV, TSV and ODS
//! - [`json`] - JSON, JSON-LD and GeoJSON
//! - [`text`] - plain text through a handlebars template
//!
//! Multi-valued cells are joined with the configured separator. The reader
//! splits on the same separator, so a value containing it does not survive
//! a round trip: choosing an unused separator is up to the caller.
//!
//! # Example
//! ```ignore
//! use bulkport::writer::{ExportConfig, Exporter, FormatterRegistry};
//!
//! let exporter = Exporter::new(&store, ExportConfig::default())?;
//! let mut out = Vec::new();
//! FormatterRegistry::default().write("csv", &exporter, &mut out)?;
//! ```

pub mod json;
pub mod tabular;
pub mod text;
pub mod value;

use crate::error::{WriterError, WriterResult};
use crate::mapping::{StructuralField, Target};
use crate::models::{Resource, ResourceType, VocabularySet};
use crate::store::ResourceStore;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::io::Write;

pub use json::{GeoJsonFormatter, JsonFormatter, JsonLdFormatter};
pub use tabular::{CsvFormatter, OdsFormatter};
pub use text::TextFormatter;
pub use value::{
    FieldNameStyle, FormatOptions, ResourceStyle, UriStyle, ValueFormatter, ValueStyle,
};

/// Default multi-value separator.
pub const DEFAULT_SEPARATOR: &str = "|";

// =============================================================================
// Configuration
// =============================================================================

/// Property equality filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub term: String,
    pub value: String,
}

/// Which resources to export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportQuery {
    /// Only these ids, when not empty.
    pub ids: Vec<u64>,
    pub is_public: Option<bool>,
    /// Only members of this item set.
    pub item_set: Option<u64>,
    /// Property values that must all be present (case-insensitive).
    pub properties: Vec<PropertyFilter>,
}

/// Export configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Output format id.
    pub format: String,
    /// Resource types, in output order.
    pub resource_types: Vec<ResourceType>,
    /// Fields to keep; `dcterms:*` keeps a whole vocabulary. Empty keeps all.
    pub include: Vec<String>,
    /// Fields to drop, same patterns.
    pub exclude: Vec<String>,
    pub query: ExportQuery,
    /// Multi-value separator.
    pub separator: String,
    pub options: FormatOptions,
    /// Handlebars template of the text format.
    pub template: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: "csv".to_string(),
            resource_types: vec![ResourceType::Items],
            include: Vec::new(),
            exclude: Vec::new(),
            query: ExportQuery::default(),
            separator: DEFAULT_SEPARATOR.to_string(),
            options: FormatOptions::default(),
            template: None,
        }
    }
}

/// `dcterms:*` matches by prefix, anything else exactly.
fn pattern_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}

// =============================================================================
// Fields & Rows
// =============================================================================

/// One output field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportField {
    pub target: Target,
    /// Canonical key (`dcterms:title`, `o:item_set{o:id}`).
    pub key: String,
    /// Header, per the field name style.
    pub header: String,
}

/// One output row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: u64,
    pub resource_type: ResourceType,
    /// Values of each field, in field order.
    pub cells: Vec<Vec<String>>,
}

impl ExportRow {
    /// Cells with multiple values joined.
    pub fn joined(&self, separator: &str) -> Vec<String> {
        self.cells.iter().map(|values| values.join(separator)).collect()
    }
}

/// Lazy iterator over export rows.
pub struct Rows<'e, 'a> {
    exporter: &'e Exporter<'a>,
    position: usize,
}

impl Iterator for Rows<'_, '_> {
    type Item = WriterResult<ExportRow>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.exporter.ids.get(self.position).copied() {
            self.position += 1;
            match self.exporter.store.get(id) {
                // Deleted since selection.
                Ok(None) => continue,
                Ok(Some(resource)) => return Some(self.exporter.row(&resource)),
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }
}

// =============================================================================
// Exporter
// =============================================================================

/// Selects resources and builds rows.
pub struct Exporter<'a> {
    store: &'a dyn ResourceStore,
    config: ExportConfig,
    vocabulary: VocabularySet,
    fields: Vec<ExportField>,
    ids: Vec<u64>,
    error: Option<String>,
}

impl<'a> Exporter<'a> {
    /// Prepare an export.
    ///
    /// Storage failures are returned; configuration problems make the
    /// exporter invalid (see [`Exporter::is_valid`]) and every output
    /// attempt fail before writing anything.
    pub fn new(store: &'a dyn ResourceStore, config: ExportConfig) -> WriterResult<Self> {
        let vocabulary = store.vocabulary()?;
        let mut exporter = Self {
            store,
            config,
            vocabulary,
            fields: Vec::new(),
            ids: Vec::new(),
            error: None,
        };
        if let Err(message) = exporter.check_config() {
            tracing::warn!(error = %message, "invalid export configuration");
            exporter.error = Some(message);
            return Ok(exporter);
        }
        exporter.ids = exporter.select()?;
        exporter.fields = exporter.build_fields()?;
        tracing::debug!(
            resources = exporter.ids.len(),
            fields = exporter.fields.len(),
            "export prepared"
        );
        Ok(exporter)
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Fail when the configuration is invalid.
    pub fn ensure_valid(&self) -> WriterResult<()> {
        match self.error {
            Some(ref message) => Err(WriterError::InvalidConfig(message.clone())),
            None => Ok(()),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn separator(&self) -> &str {
        &self.config.separator
    }

    pub fn store(&self) -> &'a dyn ResourceStore {
        self.store
    }

    pub fn vocabulary(&self) -> &VocabularySet {
        &self.vocabulary
    }

    pub fn fields(&self) -> &[ExportField] {
        &self.fields
    }

    /// Output field headers, in order.
    pub fn available_fields(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.header.as_str()).collect()
    }

    /// Number of selected resources.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Selected resource ids, in output order.
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Rows of the selected resources, fetched one at a time.
    pub fn rows(&self) -> WriterResult<Rows<'_, 'a>> {
        self.ensure_valid()?;
        Ok(Rows {
            exporter: self,
            position: 0,
        })
    }

    /// Selected resources, fetched one at a time.
    pub fn resources(&self) -> WriterResult<impl Iterator<Item = WriterResult<Resource>> + '_> {
        self.ensure_valid()?;
        Ok(self
            .ids
            .iter()
            .filter_map(|id| self.store.get(*id).map_err(WriterError::from).transpose()))
    }

    pub fn value_formatter(&self) -> ValueFormatter<'_> {
        ValueFormatter::new(self.store, &self.config.options)
    }

    fn check_config(&self) -> Result<(), String> {
        if self.config.separator.is_empty() {
            return Err("a separator is required for multi-value fields".to_string());
        }
        if self.config.resource_types.is_empty() {
            return Err("no resource type selected".to_string());
        }
        for pattern in self.config.include.iter().chain(&self.config.exclude) {
            if pattern.ends_with('*') {
                continue;
            }
            if pattern == StructuralField::ResourceType.term() {
                continue;
            }
            let target = Target::parse(pattern).map_err(|e| e.to_string())?;
            target.validate(&self.vocabulary).map_err(|e| e.to_string())?;
            if let Target::Nested { child, .. } = &target {
                if !self.is_known_child(child) {
                    return Err(format!("unknown nested field '{}'", pattern));
                }
            }
        }
        for filter in &self.config.query.properties {
            if !self.vocabulary.has_term(&filter.term) {
                return Err(format!("unknown property '{}' in query", filter.term));
            }
        }
        let options = &self.config.options;
        if matches!(
            options.resource_style,
            ResourceStyle::Identifier | ResourceStyle::IdentifierOrId
        ) && !self.vocabulary.has_term(&options.identifier_property)
        {
            return Err(format!(
                "unknown identifier property '{}'",
                options.identifier_property
            ));
        }
        Ok(())
    }

    fn is_known_child(&self, child: &str) -> bool {
        matches!(child, "o:id" | "o:title" | "o:source")
            || crate::processor::draft::MEDIA_INGESTERS.contains(&child)
            || self.vocabulary.has_term(child)
    }

    fn select(&self) -> WriterResult<Vec<u64>> {
        let query = &self.config.query;
        let needs_resource =
            query.is_public.is_some() || query.item_set.is_some() || !query.properties.is_empty();

        let mut ids = Vec::new();
        for resource_type in &self.config.resource_types {
            for id in self.store.ids(Some(*resource_type))? {
                if !query.ids.is_empty() && !query.ids.contains(&id) {
                    continue;
                }
                if needs_resource {
                    match self.store.get(id)? {
                        Some(resource) if Self::matches_query(query, &resource) => {}
                        _ => continue,
                    }
                }
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn matches_query(query: &ExportQuery, resource: &Resource) -> bool {
        if query.is_public.is_some_and(|p| p != resource.is_public) {
            return false;
        }
        if query.item_set.is_some_and(|s| !resource.item_sets.contains(&s)) {
            return false;
        }
        query.properties.iter().all(|filter| {
            let wanted = filter.value.trim().to_lowercase();
            resource
                .values_of(&filter.term)
                .iter()
                .any(|v| v.as_plain().trim().to_lowercase() == wanted)
        })
    }

    fn build_fields(&self) -> WriterResult<Vec<ExportField>> {
        let types = &self.config.resource_types;
        let multiple_types = types.len() > 1;

        let mut targets: IndexSet<Target> = IndexSet::new();
        targets.insert(Target::InternalId);
        if multiple_types {
            targets.insert(Target::Structural(StructuralField::ResourceType));
        }
        for field in [
            StructuralField::ResourceTemplate,
            StructuralField::ResourceClass,
            StructuralField::Owner,
            StructuralField::IsPublic,
        ] {
            targets.insert(Target::Structural(field));
        }
        if types.contains(&ResourceType::ItemSets) {
            targets.insert(Target::Structural(StructuralField::IsOpen));
        }
        if types.contains(&ResourceType::Items) {
            targets.insert(Target::Structural(StructuralField::ItemSet));
        }
        if types.contains(&ResourceType::Media) {
            targets.insert(Target::Structural(StructuralField::Item));
        }
        if types.contains(&ResourceType::Items) || types.contains(&ResourceType::Media) {
            targets.insert(Target::Structural(StructuralField::Media));
        }

        // Properties in use, in vocabulary order, then unknown terms.
        let mut used: IndexSet<String> = IndexSet::new();
        for id in &self.ids {
            if let Some(resource) = self.store.get(*id)? {
                used.extend(resource.values.keys().cloned());
            }
        }
        for property in self.vocabulary.properties() {
            if used.shift_remove(&property.term) {
                targets.insert(Target::Property(property.term));
            }
        }
        let mut unknown: Vec<String> = used.into_iter().collect();
        unknown.sort();
        targets.extend(unknown.into_iter().map(Target::Property));

        let mut fields: Vec<Target> = targets
            .into_iter()
            .filter(|t| {
                let key = t.path();
                let forced = multiple_types
                    && *t == Target::Structural(StructuralField::ResourceType);
                forced
                    || ((self.config.include.is_empty()
                        || self.config.include.iter().any(|p| pattern_matches(p, &key)))
                        && !self.config.exclude.iter().any(|p| pattern_matches(p, &key)))
            })
            .collect();

        // Explicit includes not produced above (nested fields mostly).
        for pattern in &self.config.include {
            if pattern.ends_with('*') {
                continue;
            }
            if let Ok(target) = Target::parse(pattern) {
                if !fields.contains(&target)
                    && !self.config.exclude.iter().any(|p| pattern_matches(p, pattern))
                {
                    fields.push(target);
                }
            }
        }

        Ok(fields
            .into_iter()
            .map(|target| ExportField {
                key: target.path(),
                header: self.header(&target),
                target,
            })
            .collect())
    }

    fn header(&self, target: &Target) -> String {
        if self.config.options.field_names == FieldNameStyle::Term {
            return target.path();
        }
        self.label_of(target)
    }

    fn label_of(&self, target: &Target) -> String {
        match target {
            Target::InternalId => "Internal id".to_string(),
            Target::Structural(field) => field.label().to_string(),
            Target::Property(term) => self
                .vocabulary
                .by_term(term)
                .map(|p| p.label.to_string())
                .unwrap_or_else(|| term.clone()),
            Target::Nested { parent, child } => {
                let parent = Target::parse(parent)
                    .map(|t| self.label_of(&t))
                    .unwrap_or_else(|_| parent.clone());
                let child = match Target::parse(child) {
                    Ok(t @ Target::Property(_)) => self.label_of(&t),
                    _ => child.clone(),
                };
                format!("{} ({})", parent, child)
            }
        }
    }

    fn row(&self, resource: &Resource) -> WriterResult<ExportRow> {
        let mut cells = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            cells.push(self.cell(resource, &field.target)?);
        }
        Ok(ExportRow {
            id: resource.id,
            resource_type: resource.resource_type,
            cells,
        })
    }

    /// Values of one field for a resource.
    pub fn cell(&self, resource: &Resource, target: &Target) -> WriterResult<Vec<String>> {
        let formatter = self.value_formatter();
        let values = match target {
            Target::InternalId => vec![resource.id.to_string()],
            Target::Property(term) => resource
                .values_of(term)
                .iter()
                .map(|v| formatter.value(v))
                .collect::<WriterResult<_>>()?,
            Target::Structural(field) => match field {
                StructuralField::ResourceType => {
                    vec![resource.resource_type.api_name().to_string()]
                }
                StructuralField::ResourceTemplate => {
                    resource.resource_template.iter().map(u64::to_string).collect()
                }
                StructuralField::ResourceClass => resource.resource_class.iter().cloned().collect(),
                StructuralField::Owner => resource.owner.iter().cloned().collect(),
                StructuralField::IsPublic => vec![resource.is_public.to_string()],
                StructuralField::IsOpen => vec![resource.is_open.to_string()],
                StructuralField::ItemSet => resource
                    .item_sets
                    .iter()
                    .map(|id| formatter.linked(*id))
                    .collect::<WriterResult<_>>()?,
                StructuralField::Item => resource
                    .item
                    .iter()
                    .map(|id| formatter.linked(*id))
                    .collect::<WriterResult<_>>()?,
                StructuralField::Media => self
                    .related(resource, StructuralField::Media)?
                    .iter()
                    .filter_map(|m| m.media_source.as_ref().map(|s| s.source.clone()))
                    .collect(),
            },
            Target::Nested { parent, child } => self.nested_cell(resource, parent, child)?,
        };
        Ok(values.into_iter().filter(|v: &String| !v.is_empty()).collect())
    }

    /// Resources behind a relation field; missing ones are skipped.
    fn related(&self, resource: &Resource, field: StructuralField) -> WriterResult<Vec<Resource>> {
        let ids: Vec<u64> = match field {
            StructuralField::ItemSet => resource.item_sets.clone(),
            StructuralField::Item => resource.item.into_iter().collect(),
            StructuralField::Media if resource.resource_type == ResourceType::Media => {
                return Ok(vec![resource.clone()]);
            }
            StructuralField::Media => resource.media.clone(),
            _ => Vec::new(),
        };
        self.fetch_all(&ids)
    }

    fn fetch_all(&self, ids: &[u64]) -> WriterResult<Vec<Resource>> {
        let mut resources = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(resource) = self.store.get(*id)? {
                resources.push(resource);
            }
        }
        Ok(resources)
    }

    fn nested_cell(&self, resource: &Resource, parent: &str, child: &str) -> WriterResult<Vec<String>> {
        let related = match Target::parse(parent) {
            Ok(Target::Structural(field)) => self.related(resource, field)?,
            Ok(Target::Property(term)) => {
                let ids: Vec<u64> = resource
                    .values_of(&term)
                    .iter()
                    .filter(|v| v.is_resource())
                    .filter_map(|v| v.resource_id)
                    .collect();
                self.fetch_all(&ids)?
            }
            _ => Vec::new(),
        };

        let formatter = self.value_formatter();
        let mut values = Vec::new();
        for other in &related {
            match child {
                "o:id" => values.push(other.id.to_string()),
                "o:title" => values.push(other.display_title()),
                "o:source" => values.extend(other.media_source.iter().map(|s| s.source.clone())),
                ingester if crate::processor::draft::MEDIA_INGESTERS.contains(&ingester) => values.extend(
                    other
                        .media_source
                        .iter()
                        .filter(|s| s.ingester == ingester)
                        .map(|s| s.source.clone()),
                ),
                term => {
                    for value in other.values_of(term) {
                        values.push(formatter.value(value)?);
                    }
                }
            }
        }
        Ok(values)
    }
}

// =============================================================================
// Formatters
// =============================================================================

/// An output format.
pub trait Formatter: Send + Sync {
    /// Format id (`csv`, `jsonld`...).
    fn format(&self) -> &'static str;

    /// File extension of the output.
    fn extension(&self) -> &'static str;

    /// MIME type of the output.
    fn media_type(&self) -> &'static str;

    /// Write the whole export; returns the number of resources written.
    fn write(&self, exporter: &Exporter<'_>, out: &mut dyn Write) -> WriterResult<usize>;
}

/// Maps format ids to formatters.
pub struct FormatterRegistry {
    formatters: IndexMap<&'static str, Box<dyn Formatter>>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(CsvFormatter::csv()));
        registry.register(Box::new(CsvFormatter::tsv()));
        registry.register(Box::new(OdsFormatter));
        registry.register(Box::new(JsonFormatter));
        registry.register(Box::new(JsonLdFormatter));
        registry.register(Box::new(GeoJsonFormatter));
        registry.register(Box::new(TextFormatter));
        registry
    }
}

impl FormatterRegistry {
    pub fn empty() -> Self {
        Self {
            formatters: IndexMap::new(),
        }
    }

    pub fn register(&mut self, formatter: Box<dyn Formatter>) {
        self.formatters.insert(formatter.format(), formatter);
    }

    /// Registered format ids.
    pub fn formats(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.formatters.keys().copied()
    }

    pub fn get(&self, format: &str) -> WriterResult<&dyn Formatter> {
        self.formatters
            .get(format.to_lowercase().as_str())
            .map(|f| f.as_ref())
            .ok_or_else(|| WriterError::UnsupportedFormat(format.to_string()))
    }

    /// Format for a file extension.
    pub fn format_for_extension(&self, extension: &str) -> Option<&'static str> {
        let extension = extension.to_lowercase();
        self.formatters
            .values()
            .find(|f| f.extension() == extension)
            .map(|f| f.format())
    }

    /// Write an export in a format.
    pub fn write(&self, format: &str, exporter: &Exporter<'_>, out: &mut dyn Write) -> WriterResult<usize> {
        let formatter = self.get(format)?;
        exporter.ensure_valid()?;
        formatter.write(exporter, out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{MediaSource, PropertyValue};
    use crate::store::{MemoryStore, Mutation};

    /// Two items in one item set, one of them with a media.
    pub(crate) fn sample_store() -> MemoryStore {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut set = Resource::new(ResourceType::ItemSets);
        set.add_value("dcterms:title", PropertyValue::literal("Posters"));
        let set_id = store.insert(set).unwrap();

        let mut first = Resource::new(ResourceType::Items);
        first.item_sets = vec![set_id];
        first.add_value("dcterms:title", PropertyValue::literal("A"));
        first.add_value("dcterms:subject", PropertyValue::literal("x"));
        first.add_value("dcterms:subject", PropertyValue::literal("y"));
        first.add_value("dcterms:spatial", {
            let mut v = PropertyValue::literal("48.85,2.35");
            v.data_type = crate::models::DATA_TYPE_COORDINATES.to_string();
            v
        });
        let mut media = Resource::new(ResourceType::Media);
        media.media_source = Some(MediaSource {
            ingester: "url".into(),
            source: "https://example.org/a.jpg".into(),
        });
        store
            .commit(vec![Mutation::Create {
                resource: Box::new(first),
                media: vec![media],
            }])
            .unwrap();

        let mut second = Resource::new(ResourceType::Items);
        second.is_public = false;
        second.item_sets = vec![set_id];
        second.add_value("dcterms:title", PropertyValue::literal("B"));
        second.add_value("bibo:isbn", PropertyValue::literal("978"));
        store.insert(second).unwrap();
        store
    }

    fn keys(exporter: &Exporter) -> Vec<String> {
        exporter.fields().iter().map(|f| f.key.clone()).collect()
    }

    #[test]
    fn test_fields_and_rows() {
        let store = sample_store();
        let exporter = Exporter::new(&store, ExportConfig::default()).unwrap();
        assert!(exporter.is_valid());
        assert_eq!(exporter.count(), 2);
        assert_eq!(
            keys(&exporter),
            vec![
                "o:id",
                "o:resource_template",
                "o:resource_class",
                "o:owner",
                "o:is_public",
                "o:item_set",
                "o:media",
                "dcterms:title",
                "dcterms:subject",
                "dcterms:spatial",
                "bibo:isbn",
            ]
        );

        let rows: Vec<ExportRow> = exporter.rows().unwrap().collect::<WriterResult<_>>().unwrap();
        let first = rows[0].joined(exporter.separator());
        assert_eq!(first[6], "https://example.org/a.jpg");
        assert_eq!(first[8], "x|y");
        assert_eq!(rows[1].cells[4], vec!["false"]);
    }

    #[test]
    fn test_include_exclude_and_nested() {
        let store = sample_store();
        let config = ExportConfig {
            include: vec!["o:id".into(), "dcterms:*".into(), "o:item_set{dcterms:title}".into()],
            exclude: vec!["dcterms:spatial".into()],
            ..ExportConfig::default()
        };
        let exporter = Exporter::new(&store, config).unwrap();
        assert_eq!(
            keys(&exporter),
            vec!["o:id", "dcterms:title", "dcterms:subject", "o:item_set{dcterms:title}"]
        );
        let row = exporter.rows().unwrap().next().unwrap().unwrap();
        assert_eq!(row.cells[3], vec!["Posters"]);
    }

    #[test]
    fn test_missing_relation_gives_empty_cell() {
        let store = sample_store();
        let config = ExportConfig {
            include: vec!["o:id".into(), "dcterms:creator{dcterms:title}".into()],
            ..ExportConfig::default()
        };
        let exporter = Exporter::new(&store, config).unwrap();
        let row = exporter.rows().unwrap().next().unwrap().unwrap();
        assert!(row.cells[1].is_empty());
    }

    #[test]
    fn test_multiple_types_add_discriminator() {
        let store = sample_store();
        let config = ExportConfig {
            resource_types: vec![ResourceType::Items, ResourceType::ItemSets],
            include: vec!["dcterms:title".into()],
            ..ExportConfig::default()
        };
        let exporter = Exporter::new(&store, config).unwrap();
        assert_eq!(keys(&exporter), vec!["resource_type", "dcterms:title"]);
        let types: Vec<String> = exporter
            .rows()
            .unwrap()
            .map(|r| r.unwrap().cells[0][0].clone())
            .collect();
        assert_eq!(types, vec!["items", "items", "item_sets"]);
    }

    #[test]
    fn test_query_filters() {
        let store = sample_store();
        let config = ExportConfig {
            query: ExportQuery {
                is_public: Some(true),
                properties: vec![PropertyFilter {
                    term: "dcterms:subject".into(),
                    value: "Y".into(),
                }],
                ..ExportQuery::default()
            },
            ..ExportConfig::default()
        };
        let exporter = Exporter::new(&store, config).unwrap();
        assert_eq!(exporter.count(), 1);

        let config = ExportConfig {
            query: ExportQuery {
                is_public: Some(false),
                ..ExportQuery::default()
            },
            ..ExportConfig::default()
        };
        assert_eq!(Exporter::new(&store, config).unwrap().count(), 1);
    }

    #[test]
    fn test_labels() {
        let store = sample_store();
        let config = ExportConfig {
            include: vec!["dcterms:title".into(), "o:item_set".into(), "o:item_set{dcterms:title}".into()],
            options: FormatOptions {
                field_names: FieldNameStyle::Label,
                ..FormatOptions::default()
            },
            ..ExportConfig::default()
        };
        let exporter = Exporter::new(&store, config).unwrap();
        assert_eq!(exporter.available_fields(), vec!["Item set", "Title", "Item set (Title)"]);
    }

    #[test]
    fn test_invalid_config_fails_before_output() {
        let store = sample_store();
        for config in [
            ExportConfig {
                separator: String::new(),
                ..ExportConfig::default()
            },
            ExportConfig {
                include: vec!["dcterms:nothing".into()],
                ..ExportConfig::default()
            },
            ExportConfig {
                resource_types: Vec::new(),
                ..ExportConfig::default()
            },
        ] {
            let exporter = Exporter::new(&store, config).unwrap();
            assert!(!exporter.is_valid());
            assert!(exporter.rows().is_err());
            let mut out = Vec::new();
            let result = FormatterRegistry::default().write("csv", &exporter, &mut out);
            assert!(matches!(result, Err(WriterError::InvalidConfig(_))));
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_registry() {
        let registry = FormatterRegistry::default();
        let formats: Vec<&str> = registry.formats().collect();
        assert_eq!(formats, vec!["csv", "tsv", "ods", "json", "jsonld", "geojson", "txt"]);
        assert_eq!(registry.format_for_extension("ODS"), Some("ods"));
        assert!(matches!(registry.get("xml"), Err(WriterError::UnsupportedFormat(_))));
    }
}
