//! Mapping Registry - Store and reuse field mappings
//!
//! Saves mappings to disk as JSON and matches them to new sources by their
//! header row.

use crate::error::{RegistryError, RegistryResult};
use crate::mapping::FieldMapping;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory where mappings are stored when `BULKPORT_HOME` is not set
/// (relative to current dir)
const DEFAULT_REGISTRY_DIR: &str = ".bulkport/mappings";

/// Environment variable holding the bulkport home directory.
pub const HOME_ENV: &str = "BULKPORT_HOME";

/// Minimum share of stored columns found in a source header.
const MIN_COMPATIBILITY: f64 = 0.5;

/// A stored mapping with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMapping {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// The field mapping
    pub mapping: FieldMapping,
    /// Source columns this mapping was created for
    pub columns: Vec<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last time this mapping was used
    pub last_used: Option<String>,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Number of times used
    pub use_count: u32,
}

/// Registry for managing stored mappings
pub struct MappingRegistry {
    registry_dir: PathBuf,
    mappings: HashMap<String, StoredMapping>,
}

impl MappingRegistry {
    /// Open the registry under `$BULKPORT_HOME/mappings`, or
    /// `.bulkport/mappings`.
    pub fn new() -> Self {
        match std::env::var_os(HOME_ENV) {
            Some(home) => Self::with_dir(PathBuf::from(home).join("mappings")),
            None => Self::with_dir(DEFAULT_REGISTRY_DIR),
        }
    }

    /// Create a registry with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: dir.as_ref().to_path_buf(),
            mappings: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    pub fn dir(&self) -> &Path {
        &self.registry_dir
    }

    /// Load all mappings; unreadable files are skipped.
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let stored = fs::read_to_string(&path)
                .map_err(RegistryError::from)
                .and_then(|content| Ok(serde_json::from_str::<StoredMapping>(&content)?));
            match stored {
                Ok(stored) => {
                    self.mappings.insert(stored.id.clone(), stored);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping stored mapping"),
            }
        }
    }

    /// All stored mappings, by name.
    pub fn list(&self) -> Vec<&StoredMapping> {
        let mut list: Vec<_> = self.mappings.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn get(&self, id: &str) -> RegistryResult<&StoredMapping> {
        self.mappings
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Mappings usable for a source header, best first.
    ///
    /// Ranked by compatibility score times success rate.
    pub fn find_compatible(&self, columns: &[String]) -> Vec<(&StoredMapping, f64)> {
        let mut compatible: Vec<_> = self
            .mappings
            .values()
            .filter_map(|m| {
                let score = compatibility(&m.columns, columns);
                (score > MIN_COMPATIBILITY).then_some((m, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            let score_a = a.1 * a.0.success_rate;
            let score_b = b.1 * b.0.success_rate;
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        compatible
    }

    /// Save a mapping; returns its id.
    pub fn save(&mut self, mapping: FieldMapping, name: &str, columns: Vec<String>) -> RegistryResult<String> {
        fs::create_dir_all(&self.registry_dir)?;

        let id = self.generate_id(name);
        let stored = StoredMapping {
            id: id.clone(),
            name: name.to_string(),
            mapping,
            columns,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            success_rate: 1.0,
            use_count: 0,
        };
        self.write(&stored)?;

        tracing::info!(id = %id, name, "mapping saved");
        self.mappings.insert(id.clone(), stored);
        Ok(id)
    }

    /// Import a mapping from a JSON file (full or bare form).
    pub fn import(&mut self, path: &Path, name: Option<&str>) -> RegistryResult<String> {
        let content = fs::read_to_string(path)?;
        let mapping = FieldMapping::from_json(&content)?;

        let name = name.unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("imported")
        });

        let mut columns = mapping.source_columns();
        columns.extend(mapping.unmapped.iter().cloned());
        self.save(mapping, name, columns)
    }

    /// Record the outcome of a run with a mapping.
    pub fn update_stats(&mut self, id: &str, success: bool) -> RegistryResult<()> {
        let stored = self
            .mappings
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        // Exponential moving average
        stored.success_rate = if success {
            stored.success_rate * 0.9 + 0.1
        } else {
            stored.success_rate * 0.9
        };
        stored.last_used = Some(chrono::Utc::now().to_rfc3339());
        stored.use_count += 1;

        let stored = stored.clone();
        self.write(&stored)
    }

    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if self.mappings.remove(id).is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(self.path_of(id))?;
        Ok(())
    }

    fn path_of(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    fn write(&self, stored: &StoredMapping) -> RegistryResult<()> {
        let content = serde_json::to_string_pretty(stored)?;
        fs::write(self.path_of(&stored.id), content)?;
        Ok(())
    }

    /// Slug of the name plus a timestamp, unique within the registry.
    fn generate_id(&self, name: &str) -> String {
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        let slug = if slug.is_empty() { "mapping".to_string() } else { slug };

        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut id = format!("{}-{}", slug, timestamp);
        let mut n = 1;
        while self.mappings.contains_key(&id) {
            n += 1;
            id = format!("{}-{}-{}", slug, timestamp, n);
        }
        id
    }
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of stored columns present in a header, ignoring case.
fn compatibility(stored: &[String], header: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let header: Vec<String> = header.iter().map(|c| c.trim().to_lowercase()).collect();
    let matches = stored
        .iter()
        .filter(|col| header.contains(&col.trim().to_lowercase()))
        .count();

    matches as f64 / stored.len() as f64
}
