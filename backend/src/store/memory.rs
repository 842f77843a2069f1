//! In-memory resource store with a JSON snapshot file.

use super::{Mutation, ResourceStore, ValueMatch};
use crate::error::{StoreError, StoreResult};
use crate::models::{Resource, ResourceType, VocabularySet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// On-disk snapshot layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default = "VocabularySet::builtin")]
    vocabularies: VocabularySet,
    #[serde(default = "first_id")]
    next_id: u64,
    #[serde(default)]
    resources: Vec<Resource>,
}

fn first_id() -> u64 {
    1
}

#[derive(Debug, Clone)]
struct State {
    vocabulary: VocabularySet,
    next_id: u64,
    resources: BTreeMap<u64, Resource>,
}

/// Resource store held in memory, optionally backed by a snapshot file.
#[derive(Debug)]
pub struct MemoryStore {
    path: Option<PathBuf>,
    state: RwLock<State>,
}

impl MemoryStore {
    /// Empty store over a vocabulary.
    pub fn new(vocabulary: VocabularySet) -> Self {
        Self {
            path: None,
            state: RwLock::new(State {
                vocabulary,
                next_id: first_id(),
                resources: BTreeMap::new(),
            }),
        }
    }

    /// Open a snapshot file; a missing file gives an empty store that
    /// [`MemoryStore::save`] will create.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            let next_id = snapshot
                .resources
                .iter()
                .map(|r| r.id + 1)
                .max()
                .unwrap_or(1)
                .max(snapshot.next_id);
            Self {
                path: None,
                state: RwLock::new(State {
                    vocabulary: snapshot.vocabularies,
                    next_id,
                    resources: snapshot.resources.into_iter().map(|r| (r.id, r)).collect(),
                }),
            }
        } else {
            Self::new(VocabularySet::builtin())
        };
        tracing::debug!(path = %path.display(), resources = store.len(), "store opened");
        store.path = Some(path);
        Ok(store)
    }

    /// Write the snapshot back to the file it was opened from.
    pub fn save(&self) -> StoreResult<()> {
        match self.path {
            Some(ref path) => self.save_to(path),
            None => Ok(()),
        }
    }

    /// Write the snapshot to a file.
    pub fn save_to(&self, path: &Path) -> StoreResult<()> {
        let state = self.read();
        let snapshot = Snapshot {
            vocabularies: state.vocabulary.clone(),
            next_id: state.next_id,
            resources: state.resources.values().cloned().collect(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(())
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.read().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store one new resource and return its id.
    pub fn insert(&self, resource: Resource) -> StoreResult<u64> {
        let ids = self.commit(vec![Mutation::create(resource)])?;
        Ok(ids[0])
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn in_scope(resource: &Resource, scope: Option<ResourceType>) -> bool {
        scope.map_or(true, |t| resource.resource_type == t)
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_links(&self, resource: &Resource) -> StoreResult<()> {
        for set_id in &resource.item_sets {
            match self.resources.get(set_id) {
                Some(set) if set.resource_type == ResourceType::ItemSets => {}
                _ => {
                    return Err(StoreError::Conflict {
                        id: *set_id,
                        message: "not an item set".to_string(),
                    })
                }
            }
        }
        if resource.resource_type == ResourceType::Media {
            let item = resource.item.ok_or_else(|| StoreError::Conflict {
                id: resource.id,
                message: "media without parent item".to_string(),
            })?;
            match self.resources.get(&item) {
                Some(parent) if parent.resource_type == ResourceType::Items => {}
                _ => {
                    return Err(StoreError::Conflict {
                        id: item,
                        message: "media parent is not an item".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn attach_media(&mut self, item: &mut Resource, media: Vec<Resource>) -> StoreResult<()> {
        for mut m in media {
            m.id = self.allocate();
            m.resource_type = ResourceType::Media;
            m.item = Some(item.id);
            if m.media_source.is_none() {
                return Err(StoreError::Conflict {
                    id: m.id,
                    message: "media without source".to_string(),
                });
            }
            item.media.push(m.id);
            self.resources.insert(m.id, m);
        }
        Ok(())
    }

    fn apply(&mut self, mutation: Mutation) -> StoreResult<u64> {
        match mutation {
            Mutation::Create {
                mut resource,
                media,
            } => {
                resource.id = self.allocate();
                self.check_links(&resource)?;
                if !media.is_empty() && resource.resource_type != ResourceType::Items {
                    return Err(StoreError::Conflict {
                        id: resource.id,
                        message: "only items can have media".to_string(),
                    });
                }
                self.attach_media(&mut resource, media)?;
                if let Some(item) = resource.item.filter(|_| resource.resource_type == ResourceType::Media) {
                    if let Some(parent) = self.resources.get_mut(&item) {
                        parent.media.push(resource.id);
                    }
                }
                let id = resource.id;
                self.resources.insert(id, *resource);
                Ok(id)
            }
            Mutation::Update {
                mut resource,
                media,
            } => {
                let id = resource.id;
                let (stored_type, stored_media) = self
                    .resources
                    .get(&id)
                    .map(|r| (r.resource_type, r.media.clone()))
                    .ok_or(StoreError::NotFound(id))?;
                if stored_type != resource.resource_type {
                    return Err(StoreError::Conflict {
                        id,
                        message: format!(
                            "cannot change resource type from {} to {}",
                            stored_type, resource.resource_type
                        ),
                    });
                }
                // Media membership is owned by the store.
                resource.media = stored_media;
                self.check_links(&resource)?;
                self.attach_media(&mut resource, media)?;
                self.resources.insert(id, *resource);
                Ok(id)
            }
            Mutation::Delete(id) => {
                let removed = self.resources.remove(&id).ok_or(StoreError::NotFound(id))?;
                match removed.resource_type {
                    ResourceType::Items => {
                        for media_id in &removed.media {
                            self.resources.remove(media_id);
                        }
                    }
                    ResourceType::Media => {
                        if let Some(parent) = removed.item.and_then(|i| self.resources.get_mut(&i)) {
                            parent.media.retain(|m| *m != id);
                        }
                    }
                    ResourceType::ItemSets => {
                        for resource in self.resources.values_mut() {
                            resource.item_sets.retain(|s| *s != id);
                        }
                    }
                    ResourceType::Annotations => {}
                }
                Ok(id)
            }
        }
    }
}

fn folded_set(needles: &[String]) -> HashSet<String> {
    needles.iter().map(|n| n.trim().to_lowercase()).collect()
}

impl ResourceStore for MemoryStore {
    fn vocabulary(&self) -> StoreResult<VocabularySet> {
        Ok(self.read().vocabulary.clone())
    }

    fn get(&self, id: u64) -> StoreResult<Option<Resource>> {
        Ok(self.read().resources.get(&id).cloned())
    }

    fn ids(&self, scope: Option<ResourceType>) -> StoreResult<Vec<u64>> {
        Ok(self
            .read()
            .resources
            .values()
            .filter(|r| State::in_scope(r, scope))
            .map(|r| r.id)
            .collect())
    }

    fn existing(&self, ids: &[u64], scope: Option<ResourceType>) -> StoreResult<Vec<u64>> {
        let state = self.read();
        let mut found: Vec<u64> = ids
            .iter()
            .filter(|id| {
                state
                    .resources
                    .get(*id)
                    .is_some_and(|r| State::in_scope(r, scope))
            })
            .copied()
            .collect();
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }

    fn match_values(
        &self,
        terms: &[String],
        needles: &[String],
        scope: Option<ResourceType>,
    ) -> StoreResult<Vec<ValueMatch>> {
        let wanted = folded_set(needles);
        let state = self.read();
        let mut matches = Vec::new();
        for resource in state.resources.values().filter(|r| State::in_scope(r, scope)) {
            for term in terms {
                for value in resource.values_of(term) {
                    let candidates = [value.value.as_deref(), value.uri.as_deref()];
                    for stored in candidates.into_iter().flatten() {
                        if wanted.contains(&stored.trim().to_lowercase()) {
                            matches.push(ValueMatch {
                                resource_id: resource.id,
                                term: term.clone(),
                                value: stored.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(matches)
    }

    fn match_media_sources(
        &self,
        ingester: &str,
        sources: &[String],
        item: Option<u64>,
    ) -> StoreResult<Vec<ValueMatch>> {
        let wanted = folded_set(sources);
        let state = self.read();
        Ok(state
            .resources
            .values()
            .filter(|r| r.resource_type == ResourceType::Media)
            .filter(|r| item.map_or(true, |i| r.item == Some(i)))
            .filter_map(|r| {
                let source = r.media_source.as_ref()?;
                (source.ingester.eq_ignore_ascii_case(ingester)
                    && wanted.contains(&source.source.trim().to_lowercase()))
                .then(|| ValueMatch {
                    resource_id: r.id,
                    term: "o:source".to_string(),
                    value: source.source.clone(),
                })
            })
            .collect())
    }

    fn commit(&self, batch: Vec<Mutation>) -> StoreResult<Vec<u64>> {
        let mut state = self.write();
        let mut staged = state.clone();
        let ids = batch
            .into_iter()
            .map(|m| staged.apply(m))
            .collect::<StoreResult<Vec<_>>>()?;
        *state = staged;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaSource, PropertyValue};
    use tempfile::tempdir;

    fn item(title: &str) -> Resource {
        let mut r = Resource::new(ResourceType::Items);
        r.add_value("dcterms:title", PropertyValue::literal(title));
        r
    }

    fn media(url: &str) -> Resource {
        let mut m = Resource::new(ResourceType::Media);
        m.media_source = Some(MediaSource {
            ingester: "url".into(),
            source: url.into(),
        });
        m
    }

    #[test]
    fn test_create_and_match_values() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let a = store.insert(item("Foo")).unwrap();
        let b = store.insert(item("foo")).unwrap();
        let matches = store
            .match_values(&["dcterms:title".into()], &["FOO".into()], None)
            .unwrap();
        let ids: Vec<u64> = matches.iter().map(|m| m.resource_id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(matches[0].value, "Foo");

        let none = store
            .match_values(&["dcterms:title".into()], &["foo".into()], Some(ResourceType::Media))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_media_created_with_item() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let ids = store
            .commit(vec![Mutation::Create {
                resource: Box::new(item("A")),
                media: vec![media("https://example.org/a.jpg")],
            }])
            .unwrap();
        let stored = store.get(ids[0]).unwrap().unwrap();
        assert_eq!(stored.media.len(), 1);

        let found = store
            .match_media_sources("url", &["https://EXAMPLE.org/a.jpg".into()], Some(ids[0]))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_id, stored.media[0]);
        assert!(store
            .match_media_sources("file", &["https://example.org/a.jpg".into()], None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_commit_is_atomic() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let result = store.commit(vec![Mutation::create(item("A")), Mutation::Delete(999)]);
        assert!(matches!(result, Err(StoreError::NotFound(999))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_cascades_media() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let ids = store
            .commit(vec![Mutation::Create {
                resource: Box::new(item("A")),
                media: vec![media("https://example.org/a.jpg")],
            }])
            .unwrap();
        assert_eq!(store.len(), 2);
        store.commit(vec![Mutation::Delete(ids[0])]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_item_set_links_are_checked() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let not_a_set = store.insert(item("A")).unwrap();
        let mut b = item("B");
        b.item_sets.push(not_a_set);
        assert!(matches!(
            store.insert(b),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = MemoryStore::open(&path).unwrap();
        let id = store.insert(item("A")).unwrap();
        store.save().unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(id).unwrap().unwrap().display_title(), "A");
        let next = reopened.insert(item("B")).unwrap();
        assert!(next > id);
    }
}
