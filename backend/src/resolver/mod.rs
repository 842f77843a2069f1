//! Identifier resolution.
//!
//! Turns textual identifiers found in a source (an internal id, a value of
//! one or more properties, a media URL or file name) into resource ids.
//!
//! Identifiers are trimmed and deduplicated first; blank ones are dropped
//! without any query. For each identifier the resolver picks:
//!
//! 1. the lowest resource id among exact (case-sensitive) matches, else
//! 2. the lowest resource id among case-insensitive matches.
//!
//! Every identifier also gets a match count. With exact matches, it is the
//! number of resources holding the exact value. Without them, it is the
//! number of distinct (identifier, resource) pairs in the identifier's
//! case-folded group within the batch: `["Foo", "foo"]` against a single
//! stored `"Foo"` gives `Foo` = 1 and `foo` = 2. An identifier is ambiguous
//! when its count is above one; with `unique_only`, ambiguous identifiers
//! resolve to `None` and the counts tell the caller why.

use crate::error::StoreResult;
use crate::models::{ResourceType, VocabularySet};
use crate::store::{ResourceStore, ValueMatch};
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// =============================================================================
// Identifier Kind
// =============================================================================

/// What an identifier refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Internal resource id.
    InternalId,
    /// Value of one of these properties, tried in order.
    Properties(Vec<String>),
    /// Ingestion source of a media, for one ingester kind, optionally
    /// restricted to the media of one item.
    MediaSource {
        ingester: String,
        item: Option<u64>,
    },
}

impl IdentifierKind {
    /// Parse a descriptor.
    ///
    /// Accepted forms: `o:id`, a property term or numeric property id, a
    /// comma-separated list of those, and `media_source:<ingester>`. Returns
    /// `None` for anything else, including unknown properties.
    pub fn parse(descriptor: &str, vocabulary: &VocabularySet) -> Option<Self> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return None;
        }
        if matches!(descriptor, "o:id" | "id" | "internal_id") {
            return Some(IdentifierKind::InternalId);
        }
        if let Some(ingester) = descriptor.strip_prefix("media_source:") {
            let ingester = ingester.trim();
            return (!ingester.is_empty()).then(|| IdentifierKind::MediaSource {
                ingester: ingester.to_string(),
                item: None,
            });
        }

        let mut terms = Vec::new();
        for part in descriptor.split(',').map(str::trim) {
            let term = match part.parse::<u32>() {
                Ok(id) => vocabulary.properties().find(|p| p.id == id)?.term,
                Err(_) if vocabulary.has_term(part) => part.to_string(),
                Err(_) => return None,
            };
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        Some(IdentifierKind::Properties(terms))
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierKind::InternalId => f.write_str("o:id"),
            IdentifierKind::Properties(terms) => f.write_str(&terms.join(",")),
            IdentifierKind::MediaSource { ingester, .. } => write!(f, "media_source:{}", ingester),
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Resolution of a batch of identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierResult {
    /// Identifier → resource id, in first-seen order.
    pub ids: IndexMap<String, Option<u64>>,
    /// Identifier → number of matches.
    pub counts: IndexMap<String, usize>,
    /// Whether any identifier is ambiguous.
    pub has_duplicates: bool,
}

impl IdentifierResult {
    fn unresolved(identifiers: &IndexSet<String>) -> Self {
        Self {
            ids: identifiers.iter().map(|i| (i.clone(), None)).collect(),
            counts: identifiers.iter().map(|i| (i.clone(), 0)).collect(),
            has_duplicates: false,
        }
    }

    /// Resource id of an identifier.
    pub fn get(&self, identifier: &str) -> Option<u64> {
        self.ids.get(identifier.trim()).copied().flatten()
    }

    /// Match count of an identifier.
    pub fn count(&self, identifier: &str) -> usize {
        self.counts.get(identifier.trim()).copied().unwrap_or(0)
    }

    /// Identifiers with more than one match.
    pub fn ambiguous(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts
            .iter()
            .filter(|(_, c)| **c > 1)
            .map(|(i, c)| (i.as_str(), *c))
    }

    /// Whether at least one identifier resolved.
    pub fn any_found(&self) -> bool {
        self.ids.values().any(Option::is_some)
    }

    /// Whether at least one identifier matched, resolved or ambiguous.
    pub fn matched(&self) -> bool {
        self.counts.values().any(|c| *c > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Trim, drop blanks and deduplicate, keeping first-seen order.
pub fn normalize_identifiers<S: AsRef<str>>(identifiers: &[S]) -> IndexSet<String> {
    identifiers
        .iter()
        .map(|i| i.as_ref().trim())
        .filter(|i| !i.is_empty())
        .map(String::from)
        .collect()
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves identifiers against a store.
pub struct IdentifierResolver<'a> {
    store: &'a dyn ResourceStore,
    vocabulary: VocabularySet,
}

impl<'a> IdentifierResolver<'a> {
    pub fn new(store: &'a dyn ResourceStore) -> StoreResult<Self> {
        Ok(Self {
            vocabulary: store.vocabulary()?,
            store,
        })
    }

    /// Parse a descriptor against the store vocabulary.
    pub fn kind(&self, descriptor: &str) -> Option<IdentifierKind> {
        IdentifierKind::parse(descriptor, &self.vocabulary)
    }

    /// Resolve a single identifier.
    pub fn resolve_one(
        &self,
        identifier: &str,
        kind: &IdentifierKind,
        scope: Option<ResourceType>,
        unique_only: bool,
    ) -> StoreResult<Option<u64>> {
        Ok(self
            .resolve(&[identifier], kind, scope, unique_only)?
            .get(identifier))
    }

    /// Resolve identifiers with a textual kind descriptor.
    ///
    /// A malformed descriptor yields an empty result and a warning.
    pub fn resolve_descriptor<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        descriptor: &str,
        scope: Option<ResourceType>,
        unique_only: bool,
    ) -> StoreResult<IdentifierResult> {
        match self.kind(descriptor) {
            Some(kind) => self.resolve(identifiers, &kind, scope, unique_only),
            None => {
                tracing::warn!(descriptor, "malformed identifier kind, nothing resolved");
                Ok(IdentifierResult::default())
            }
        }
    }

    /// Try kinds in order; the first one matching any identifier wins,
    /// even when its matches are ambiguous.
    ///
    /// Results of different kinds are never merged.
    pub fn resolve_any<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        kinds: &[IdentifierKind],
        scope: Option<ResourceType>,
        unique_only: bool,
    ) -> StoreResult<IdentifierResult> {
        let mut last = IdentifierResult::unresolved(&normalize_identifiers(identifiers));
        for kind in kinds {
            let result = self.resolve(identifiers, kind, scope, unique_only)?;
            if result.matched() {
                return Ok(result);
            }
            last = result;
        }
        Ok(last)
    }

    /// Resolve identifiers of one kind.
    pub fn resolve<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        kind: &IdentifierKind,
        scope: Option<ResourceType>,
        unique_only: bool,
    ) -> StoreResult<IdentifierResult> {
        let identifiers = normalize_identifiers(identifiers);
        if identifiers.is_empty() {
            return Ok(IdentifierResult::default());
        }
        let needles: Vec<String> = identifiers.iter().cloned().collect();

        let mut result = match kind {
            IdentifierKind::InternalId => self.resolve_ids(&identifiers, scope)?,
            IdentifierKind::Properties(terms) => {
                let matches = self.store.match_values(terms, &needles, scope)?;
                pick_matches(&identifiers, terms, &matches)
            }
            IdentifierKind::MediaSource { ingester, item } => {
                let matches = self.store.match_media_sources(ingester, &needles, *item)?;
                pick_matches(&identifiers, &["o:source".to_string()], &matches)
            }
        };

        result.has_duplicates = result.counts.values().any(|c| *c > 1);
        if unique_only {
            for (identifier, id) in result.ids.iter_mut() {
                if result.counts.get(identifier).is_some_and(|c| *c > 1) {
                    *id = None;
                }
            }
        }
        Ok(result)
    }

    fn resolve_ids(
        &self,
        identifiers: &IndexSet<String>,
        scope: Option<ResourceType>,
    ) -> StoreResult<IdentifierResult> {
        let parsed: Vec<Option<u64>> = identifiers.iter().map(|i| i.parse().ok()).collect();
        let wanted: Vec<u64> = parsed.iter().flatten().copied().collect();
        let existing: BTreeSet<u64> = self.store.existing(&wanted, scope)?.into_iter().collect();

        let mut result = IdentifierResult::default();
        for (identifier, id) in identifiers.iter().zip(parsed) {
            let found = id.filter(|id| existing.contains(id));
            result.ids.insert(identifier.clone(), found);
            result.counts.insert(identifier.clone(), usize::from(found.is_some()));
        }
        Ok(result)
    }
}

/// Apply the tie-break and count rules to candidate matches.
///
/// `terms` gives the fallback order: each identifier uses the first term
/// with at least one match for it.
fn pick_matches(
    identifiers: &IndexSet<String>,
    terms: &[String],
    matches: &[ValueMatch],
) -> IdentifierResult {
    let mut group_sizes: HashMap<String, usize> = HashMap::new();
    for identifier in identifiers {
        *group_sizes.entry(identifier.to_lowercase()).or_default() += 1;
    }

    let mut result = IdentifierResult::default();
    for identifier in identifiers {
        let folded = identifier.to_lowercase();
        let candidates = terms.iter().find_map(|term| {
            let found: Vec<&ValueMatch> = matches
                .iter()
                .filter(|m| &m.term == term && m.value.trim().to_lowercase() == folded)
                .collect();
            (!found.is_empty()).then_some(found)
        });

        let (id, count) = match candidates {
            None => (None, 0),
            Some(found) => {
                let exact: BTreeSet<u64> = found
                    .iter()
                    .filter(|m| m.value.trim() == identifier)
                    .map(|m| m.resource_id)
                    .collect();
                if let Some(first) = exact.first() {
                    (Some(*first), exact.len())
                } else {
                    let folded_ids: BTreeSet<u64> = found.iter().map(|m| m.resource_id).collect();
                    let group = group_sizes.get(&folded).copied().unwrap_or(1);
                    (folded_ids.first().copied(), group * folded_ids.len())
                }
            }
        };
        result.ids.insert(identifier.clone(), id);
        result.counts.insert(identifier.clone(), count);
    }
    result
}
