//! Resource storage.
//!
//! The pipeline never talks to a database directly: it reads and writes
//! through a [`ResourceStore`]. Reads are snapshot-style queries used by the
//! identifier resolver and the exporter; writes go through
//! [`ResourceStore::commit`], which applies one batch of mutations
//! atomically.

pub mod memory;

use crate::error::StoreResult;
use crate::models::{Resource, ResourceType, VocabularySet};

pub use memory::MemoryStore;

/// A stored value matching a lookup needle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueMatch {
    /// Resource holding the value.
    pub resource_id: u64,
    /// Term (or `o:source` for media sources) the value was found under.
    pub term: String,
    /// Stored value, as written.
    pub value: String,
}

/// One change in a commit batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create a resource and media attached to it.
    Create {
        resource: Box<Resource>,
        media: Vec<Resource>,
    },
    /// Replace a stored resource (matched by id) and attach new media.
    Update {
        resource: Box<Resource>,
        media: Vec<Resource>,
    },
    /// Delete a resource; media of a deleted item go with it.
    Delete(u64),
}

impl Mutation {
    pub fn create(resource: Resource) -> Self {
        Mutation::Create {
            resource: Box::new(resource),
            media: Vec::new(),
        }
    }

    pub fn update(resource: Resource) -> Self {
        Mutation::Update {
            resource: Box::new(resource),
            media: Vec::new(),
        }
    }
}

/// Storage backend consumed by the resolver, processor and exporter.
///
/// Implementations must be safe to share between jobs; `commit` is the only
/// write and must be all-or-nothing for its batch.
pub trait ResourceStore: Send + Sync {
    /// Property vocabulary snapshot.
    fn vocabulary(&self) -> StoreResult<VocabularySet>;

    /// Fetch a resource.
    fn get(&self, id: u64) -> StoreResult<Option<Resource>>;

    /// All resource ids in ascending order, optionally limited to one type.
    fn ids(&self, scope: Option<ResourceType>) -> StoreResult<Vec<u64>>;

    /// The subset of `ids` that exist (within scope), in ascending order.
    fn existing(&self, ids: &[u64], scope: Option<ResourceType>) -> StoreResult<Vec<u64>>;

    /// Values of `terms` equal to any needle, ignoring case.
    ///
    /// Matches are ordered by resource id, then term order.
    fn match_values(
        &self,
        terms: &[String],
        needles: &[String],
        scope: Option<ResourceType>,
    ) -> StoreResult<Vec<ValueMatch>>;

    /// Media whose ingestion source equals any needle, ignoring case.
    ///
    /// Restricted to one ingester kind, and to the media of `item` when
    /// given. Matches are ordered by media id.
    fn match_media_sources(
        &self,
        ingester: &str,
        sources: &[String],
        item: Option<u64>,
    ) -> StoreResult<Vec<ValueMatch>>;

    /// Apply a batch atomically; returns the id of each mutation's resource.
    fn commit(&self, batch: Vec<Mutation>) -> StoreResult<Vec<u64>>;
}
