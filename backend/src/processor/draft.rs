//! Entry → resource draft.
//!
//! A [`ResourceDraft`] holds, for every mapped target, what the entry says
//! about it: nothing (the target is not mapped), "empty" (mapped, no value
//! in this row) or a set of values. Actions decide what to do with each of
//! those states; see [`super::actions`].
//!
//! Linked values (`o:item_set`, `o:item`, `^^resource` values and nested
//! `parent{child}` targets) are resolved here through the identifier
//! resolver. Lookups are memoized for the lifetime of the builder, which the
//! processor scopes to one batch.

use super::{IssueCategory, RowIssue};
use crate::entry::Entry;
use crate::error::StoreResult;
use crate::mapping::{FieldMapping, FieldTarget, StructuralField, Target};
use crate::models::{
    MediaSource, PropertyValue, Resource, ResourceType, DATA_TYPE_LITERAL, DATA_TYPE_RESOURCE,
    DATA_TYPE_URI,
};
use crate::resolver::{IdentifierKind, IdentifierResolver};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Media ingesters accepted in `o:media{...}`.
pub const MEDIA_INGESTERS: [&str; 4] = ["url", "file", "html", "iiif"];

// =============================================================================
// Patch
// =============================================================================

/// What an entry says about one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    /// The target is not mapped.
    #[default]
    Unmapped,
    /// The target is mapped but the entry has no value for it.
    Clear,
    /// The entry provides a value.
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_mapped(&self) -> bool {
        !matches!(self, Patch::Unmapped)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Record that a mapped field was empty.
    fn mark_empty(&mut self) {
        if let Patch::Unmapped = self {
            *self = Patch::Clear;
        }
    }

    /// Record a scalar value; the first value wins.
    fn set_first(&mut self, value: T) {
        if !matches!(self, Patch::Set(_)) {
            *self = Patch::Set(value);
        }
    }
}

impl<T> Patch<Vec<T>> {
    /// Record list values, appending to those already set.
    fn extend(&mut self, values: Vec<T>) {
        match self {
            Patch::Set(existing) => existing.extend(values),
            _ => *self = Patch::Set(values),
        }
    }
}

// =============================================================================
// Draft
// =============================================================================

/// Changes an entry requests on one resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceDraft {
    /// Property values, keyed by term in mapping order.
    pub values: IndexMap<String, Patch<Vec<PropertyValue>>>,
    pub owner: Patch<String>,
    pub resource_template: Patch<u64>,
    pub resource_class: Patch<String>,
    pub is_public: Patch<bool>,
    pub is_open: Patch<bool>,
    pub item_sets: Patch<Vec<u64>>,
    /// Parent item, for media.
    pub item: Patch<u64>,
    /// Own ingestion source, for media.
    pub media_source: Patch<MediaSource>,
    /// New media to attach, for items.
    pub media: Vec<Resource>,
}

impl ResourceDraft {
    fn values_mut(&mut self, term: &str) -> &mut Patch<Vec<PropertyValue>> {
        self.values.entry(term.to_string()).or_default()
    }
}

/// Parse a visibility or open flag.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "x" | "public" | "open" => Some(true),
        "0" | "false" | "no" | "n" | "private" | "closed" => Some(false),
        _ => None,
    }
}

/// Resource type scope of a `resource:*` data type.
pub fn resource_scope(data_type: &str) -> Option<ResourceType> {
    match data_type.strip_prefix("resource:")? {
        "item" => Some(ResourceType::Items),
        "itemset" | "item_set" => Some(ResourceType::ItemSets),
        "media" => Some(ResourceType::Media),
        "annotation" => Some(ResourceType::Annotations),
        _ => None,
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Media requested by one row, before they become resources.
#[derive(Default)]
struct PendingMedia {
    sources: Vec<MediaSource>,
    values: Vec<(String, FieldTarget, Vec<String>)>,
}

/// Builds drafts from entries.
pub struct DraftBuilder<'r, 'a> {
    resolver: &'r IdentifierResolver<'a>,
    link_kinds: Vec<IdentifierKind>,
    default_language: Option<String>,
    cache: HashMap<(String, Option<ResourceType>, String), Option<u64>>,
}

impl<'r, 'a> DraftBuilder<'r, 'a> {
    pub fn new(
        resolver: &'r IdentifierResolver<'a>,
        link_kinds: Vec<IdentifierKind>,
        default_language: Option<String>,
    ) -> Self {
        Self {
            resolver,
            link_kinds,
            default_language,
            cache: HashMap::new(),
        }
    }

    /// Build the draft of one entry; value-level problems go to `issues`.
    pub fn build(
        &mut self,
        entry: &Entry,
        mapping: &FieldMapping,
        resource_type: ResourceType,
        issues: &mut Vec<RowIssue>,
    ) -> StoreResult<ResourceDraft> {
        let row = entry.row();
        let mut draft = ResourceDraft::default();
        let mut media = PendingMedia::default();

        for (source, field) in mapping.pairs() {
            let raw = entry.get(source);
            match &field.target {
                // Used for identification only.
                Target::InternalId | Target::Structural(StructuralField::ResourceType) => {}
                Target::Property(term) => {
                    let mut values = Vec::with_capacity(raw.len());
                    for value in raw {
                        if let Some(value) = self.convert_value(term, field, value, row, issues)? {
                            values.push(value);
                        }
                    }
                    apply_list(draft.values_mut(term), raw, values);
                }
                Target::Structural(structural) => {
                    self.structural(*structural, raw, &mut draft, &mut media, row, issues)?;
                }
                Target::Nested { parent, child } => {
                    self.nested(parent, child, field, raw, &mut draft, &mut media, row, issues)?;
                }
            }
        }

        self.attach_media(&mut draft, media, resource_type, field_visibility(mapping));
        Ok(draft)
    }

    fn structural(
        &mut self,
        structural: StructuralField,
        raw: &[String],
        draft: &mut ResourceDraft,
        media: &mut PendingMedia,
        row: usize,
        issues: &mut Vec<RowIssue>,
    ) -> StoreResult<()> {
        let first = raw.first().map(String::as_str);
        match structural {
            StructuralField::Owner => apply_scalar(&mut draft.owner, first, |v| Some(v.to_string())),
            StructuralField::ResourceTemplate => {
                apply_parsed(&mut draft.resource_template, first, row, issues, "resource template", |v| {
                    v.parse().ok()
                })
            }
            StructuralField::ResourceClass => {
                apply_parsed(&mut draft.resource_class, first, row, issues, "resource class", |v| {
                    v.contains(':').then(|| v.to_string())
                })
            }
            StructuralField::IsPublic => {
                apply_parsed(&mut draft.is_public, first, row, issues, "visibility", parse_flag)
            }
            StructuralField::IsOpen => {
                apply_parsed(&mut draft.is_open, first, row, issues, "open flag", parse_flag)
            }
            StructuralField::ItemSet => {
                let kinds = self.link_kinds.clone();
                let ids = self.lookup_all(raw, &kinds, Some(ResourceType::ItemSets), "item set", row, issues)?;
                apply_list(&mut draft.item_sets, raw, ids);
            }
            StructuralField::Item => {
                let kinds = self.link_kinds.clone();
                let ids = self.lookup_all(&raw[..raw.len().min(1)], &kinds, Some(ResourceType::Items), "item", row, issues)?;
                match ids.into_iter().next() {
                    Some(id) => draft.item.set_first(id),
                    None if raw.is_empty() => draft.item.mark_empty(),
                    None => {}
                }
            }
            StructuralField::Media => {
                for source in raw {
                    media.sources.push(MediaSource {
                        ingester: "url".to_string(),
                        source: source.clone(),
                    });
                }
            }
            StructuralField::ResourceType => {}
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn nested(
        &mut self,
        parent: &str,
        child: &str,
        field: &FieldTarget,
        raw: &[String],
        draft: &mut ResourceDraft,
        media: &mut PendingMedia,
        row: usize,
        issues: &mut Vec<RowIssue>,
    ) -> StoreResult<()> {
        let parent_target = match Target::parse(parent) {
            Ok(target) => target,
            Err(_) => return Ok(()),
        };

        if parent_target == Target::Structural(StructuralField::Media) {
            if MEDIA_INGESTERS.contains(&child) {
                media.sources.extend(raw.iter().map(|source| MediaSource {
                    ingester: child.to_string(),
                    source: source.clone(),
                }));
            } else {
                media.values.push((child.to_string(), field.clone(), raw.to_vec()));
            }
            return Ok(());
        }

        let Some(kind) = self.child_kind(child) else {
            issues.push(RowIssue::warning(
                row,
                IssueCategory::InvalidValue,
                format!("cannot look up resources by '{}'", child),
            ));
            return Ok(());
        };
        let kinds = [kind];

        match parent_target {
            Target::Structural(StructuralField::ItemSet) => {
                let ids = self.lookup_all(raw, &kinds, Some(ResourceType::ItemSets), "item set", row, issues)?;
                apply_list(&mut draft.item_sets, raw, ids);
            }
            Target::Structural(StructuralField::Item) => {
                let ids = self.lookup_all(&raw[..raw.len().min(1)], &kinds, Some(ResourceType::Items), "item", row, issues)?;
                match ids.into_iter().next() {
                    Some(id) => draft.item.set_first(id),
                    None if raw.is_empty() => draft.item.mark_empty(),
                    None => {}
                }
            }
            Target::Property(term) => {
                let scope = field.data_type.as_deref().and_then(resource_scope);
                let ids = self.lookup_all(raw, &kinds, scope, "linked resource", row, issues)?;
                let visibility = field.is_public.unwrap_or(true);
                let values = ids
                    .into_iter()
                    .map(|id| PropertyValue::resource(id).with_visibility(visibility))
                    .collect();
                apply_list(draft.values_mut(&term), raw, values);
            }
            other => issues.push(RowIssue::warning(
                row,
                IssueCategory::InvalidValue,
                format!("nested values are not supported under '{}'", other),
            )),
        }
        Ok(())
    }

    fn child_kind(&self, child: &str) -> Option<IdentifierKind> {
        self.resolver.kind(child)
    }

    /// Convert one raw value of a property.
    fn convert_value(
        &mut self,
        term: &str,
        field: &FieldTarget,
        raw: &str,
        row: usize,
        issues: &mut Vec<RowIssue>,
    ) -> StoreResult<Option<PropertyValue>> {
        let data_type = field.data_type.as_deref().unwrap_or(DATA_TYPE_LITERAL);
        let visibility = field.is_public.unwrap_or(true);

        let value = if data_type == DATA_TYPE_RESOURCE || data_type.starts_with("resource:") {
            let kinds = self.link_kinds.clone();
            match self.lookup(raw, &kinds, resource_scope(data_type))? {
                Some(id) => {
                    let mut value = PropertyValue::resource(id);
                    value.data_type = data_type.to_string();
                    value
                }
                None => {
                    issues.push(RowIssue::warning(
                        row,
                        IssueCategory::UnresolvedReference,
                        format!("{}: no resource found for '{}'", term, raw),
                    ));
                    return Ok(None);
                }
            }
        } else if data_type == DATA_TYPE_URI || data_type.starts_with("valuesuggest:") {
            let (uri, label) = match raw.split_once(char::is_whitespace) {
                Some((uri, label)) => (uri, Some(label.trim().to_string()).filter(|l| !l.is_empty())),
                None => (raw, None),
            };
            let mut value = PropertyValue::uri(uri, label);
            value.data_type = data_type.to_string();
            value
        } else {
            let mut value = PropertyValue::literal(raw)
                .with_lang(field.language.clone().or_else(|| self.default_language.clone()));
            value.data_type = data_type.to_string();
            value
        };

        Ok(Some(value.with_visibility(visibility)))
    }

    /// Resolve one identifier with the given kinds, memoized.
    fn lookup(
        &mut self,
        identifier: &str,
        kinds: &[IdentifierKind],
        scope: Option<ResourceType>,
    ) -> StoreResult<Option<u64>> {
        let kinds_key = kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(";");
        let key = (kinds_key, scope, identifier.trim().to_string());
        if let Some(found) = self.cache.get(&key) {
            return Ok(*found);
        }
        let found = self
            .resolver
            .resolve_any(&[identifier], kinds, scope, false)?
            .get(identifier);
        self.cache.insert(key, found);
        Ok(found)
    }

    fn lookup_all(
        &mut self,
        raw: &[String],
        kinds: &[IdentifierKind],
        scope: Option<ResourceType>,
        what: &str,
        row: usize,
        issues: &mut Vec<RowIssue>,
    ) -> StoreResult<Vec<u64>> {
        let mut ids = Vec::with_capacity(raw.len());
        for identifier in raw {
            match self.lookup(identifier, kinds, scope)? {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => issues.push(RowIssue::warning(
                    row,
                    IssueCategory::UnresolvedReference,
                    format!("no {} found for '{}'", what, identifier),
                )),
            }
        }
        Ok(ids)
    }

    /// Turn collected media sources into media resources, or into the
    /// row's own source when the row describes a media.
    fn attach_media(
        &self,
        draft: &mut ResourceDraft,
        media: PendingMedia,
        resource_type: ResourceType,
        is_public: Option<bool>,
    ) {
        if resource_type == ResourceType::Media {
            if let Some(source) = media.sources.into_iter().next() {
                draft.media_source.set_first(source);
            }
            return;
        }

        for (position, source) in media.sources.into_iter().enumerate() {
            let mut resource = Resource::new(ResourceType::Media);
            if let Some(is_public) = is_public {
                resource.is_public = is_public;
            }
            for (child, field, values) in &media.values {
                if let Some(value) = values.get(position) {
                    let value = PropertyValue::literal(value.clone())
                        .with_lang(field.language.clone().or_else(|| self.default_language.clone()));
                    resource.add_value(child, value);
                }
            }
            resource.media_source = Some(source);
            draft.media.push(resource);
        }
    }
}

/// Visibility given to new media: the `o:is_public` qualifier of the
/// `o:media` fields, if any.
fn field_visibility(mapping: &FieldMapping) -> Option<bool> {
    mapping
        .pairs()
        .filter(|(_, f)| match &f.target {
            Target::Structural(StructuralField::Media) => true,
            Target::Nested { parent, .. } => parent == "o:media",
            _ => false,
        })
        .find_map(|(_, f)| f.is_public)
}

fn apply_list<T>(slot: &mut Patch<Vec<T>>, raw: &[String], values: Vec<T>) {
    if raw.is_empty() {
        slot.mark_empty();
    } else if !values.is_empty() {
        slot.extend(values);
    }
}

fn apply_scalar<T>(slot: &mut Patch<T>, raw: Option<&str>, parse: impl FnOnce(&str) -> Option<T>) {
    match raw {
        None => slot.mark_empty(),
        Some(raw) => {
            if let Some(value) = parse(raw) {
                slot.set_first(value);
            }
        }
    }
}

fn apply_parsed<T>(
    slot: &mut Patch<T>,
    raw: Option<&str>,
    row: usize,
    issues: &mut Vec<RowIssue>,
    what: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) {
    match raw {
        None => slot.mark_empty(),
        Some(raw) => match parse(raw) {
            Some(value) => slot.set_first(value),
            None => issues.push(RowIssue::warning(
                row,
                IssueCategory::InvalidValue,
                format!("invalid {} '{}'", what, raw),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VocabularySet;
    use crate::store::{MemoryStore, ResourceStore};
    use std::sync::Arc;

    fn entry(fields: &[&str], cells: &[&str]) -> Entry {
        let fields: Arc<[String]> = fields.iter().map(|f| f.to_string()).collect();
        let cells: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        Entry::from_cells(fields, cells, Some("|"), 2)
    }

    fn mapping(pairs: &[(&str, &str)]) -> FieldMapping {
        let mut mapping = FieldMapping::new();
        for (source, target) in pairs {
            mapping.push(source, FieldTarget::parse(target).unwrap());
        }
        mapping
    }

    fn kinds(resolver: &IdentifierResolver) -> Vec<IdentifierKind> {
        vec![IdentifierKind::InternalId, resolver.kind("dcterms:title").unwrap()]
    }

    #[test]
    fn test_patch_states() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let resolver = IdentifierResolver::new(&store).unwrap();
        let mut builder = DraftBuilder::new(&resolver, kinds(&resolver), None);
        let mapping = mapping(&[("Title", "dcterms:title @en"), ("Subject", "dcterms:subject")]);

        let mut issues = Vec::new();
        let draft = builder
            .build(&entry(&["Title", "Subject"], &["A|B", ""]), &mapping, ResourceType::Items, &mut issues)
            .unwrap();
        let titles = draft.values["dcterms:title"].as_set().unwrap();
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[1].lang.as_deref(), Some("en"));
        assert_eq!(draft.values["dcterms:subject"], Patch::Clear);
        assert!(!draft.owner.is_mapped());
        assert!(issues.is_empty());
    }

    #[test]
    fn test_structural_fields() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut set = Resource::new(ResourceType::ItemSets);
        set.add_value("dcterms:title", PropertyValue::literal("Posters"));
        let set_id = store.insert(set).unwrap();
        let resolver = IdentifierResolver::new(&store).unwrap();
        let mut builder = DraftBuilder::new(&resolver, kinds(&resolver), None);
        let mapping = mapping(&[
            ("Public", "o:is_public"),
            ("Template", "o:resource_template"),
            ("Class", "o:resource_class"),
            ("Sets", "o:item_set"),
        ]);

        let mut issues = Vec::new();
        let draft = builder
            .build(
                &entry(&["Public", "Template", "Class", "Sets"], &["no", "abc", "bibo:Book", "Posters|Missing"]),
                &mapping,
                ResourceType::Items,
                &mut issues,
            )
            .unwrap();
        assert_eq!(draft.is_public, Patch::Set(false));
        assert_eq!(draft.resource_template, Patch::Unmapped);
        assert_eq!(draft.resource_class, Patch::Set("bibo:Book".into()));
        assert_eq!(draft.item_sets, Patch::Set(vec![set_id]));
        let categories: Vec<IssueCategory> = issues.iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec![IssueCategory::InvalidValue, IssueCategory::UnresolvedReference]
        );
    }

    #[test]
    fn test_linked_and_uri_values() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut person = Resource::new(ResourceType::Items);
        person.add_value("dcterms:identifier", PropertyValue::literal("P-1"));
        let person_id = store.insert(person).unwrap();
        let resolver = IdentifierResolver::new(&store).unwrap();
        let mut builder = DraftBuilder::new(&resolver, kinds(&resolver), Some("fr".into()));
        let mapping = mapping(&[
            ("Creator", "dcterms:creator{dcterms:identifier}"),
            ("Source", "dcterms:source ^^uri"),
            ("Related", "dcterms:relation ^^resource:item"),
            ("Note", "dcterms:description"),
        ]);

        let mut issues = Vec::new();
        let draft = builder
            .build(
                &entry(
                    &["Creator", "Source", "Related", "Note"],
                    &["P-1", "https://example.org/a Example A", &person_id.to_string(), "texte"],
                ),
                &mapping,
                ResourceType::Items,
                &mut issues,
            )
            .unwrap();

        let creator = &draft.values["dcterms:creator"].as_set().unwrap()[0];
        assert_eq!(creator.resource_id, Some(person_id));
        let source = &draft.values["dcterms:source"].as_set().unwrap()[0];
        assert_eq!(source.uri.as_deref(), Some("https://example.org/a"));
        assert_eq!(source.label.as_deref(), Some("Example A"));
        let related = &draft.values["dcterms:relation"].as_set().unwrap()[0];
        assert_eq!(related.data_type, "resource:item");
        let note = &draft.values["dcterms:description"].as_set().unwrap()[0];
        assert_eq!(note.lang.as_deref(), Some("fr"));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_media_sources_and_titles() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let resolver = IdentifierResolver::new(&store).unwrap();
        let mut builder = DraftBuilder::new(&resolver, kinds(&resolver), None);
        let mapping = mapping(&[
            ("Files", "o:media{file}"),
            ("Captions", "o:media{dcterms:title}"),
        ]);

        let mut issues = Vec::new();
        let draft = builder
            .build(&entry(&["Files", "Captions"], &["a.jpg|b.jpg", "Front"]), &mapping, ResourceType::Items, &mut issues)
            .unwrap();
        assert_eq!(draft.media.len(), 2);
        assert_eq!(draft.media[0].media_source.as_ref().unwrap().ingester, "file");
        assert_eq!(draft.media[0].first_value("dcterms:title").as_deref(), Some("Front"));
        assert!(draft.media[1].values.is_empty());

        // A media row keeps its own source instead.
        let draft = builder
            .build(&entry(&["Files", "Captions"], &["c.jpg", ""]), &mapping, ResourceType::Media, &mut issues)
            .unwrap();
        assert!(draft.media.is_empty());
        assert_eq!(draft.media_source.as_set().unwrap().source, "c.jpg");
    }

    #[test]
    fn test_lookups_are_memoized() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut set = Resource::new(ResourceType::ItemSets);
        set.add_value("dcterms:title", PropertyValue::literal("S"));
        let id = store.insert(set).unwrap();
        let resolver = IdentifierResolver::new(&store).unwrap();
        let mut builder = DraftBuilder::new(&resolver, kinds(&resolver), None);
        let kinds = kinds(&resolver);

        assert_eq!(builder.lookup("S", &kinds, Some(ResourceType::ItemSets)).unwrap(), Some(id));
        store.commit(vec![crate::store::Mutation::Delete(id)]).unwrap();
        // Still served from the cache.
        assert_eq!(builder.lookup("S", &kinds, Some(ResourceType::ItemSets)).unwrap(), Some(id));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag(" Yes "), Some(true));
        assert_eq!(parse_flag("private"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
