//! API-key mapping storage.
//!
//! A flat dictionary from opaque API-key identifiers (`key_<suffix>`) to
//! human-readable names, persisted as pretty-printed JSON at a configured
//! path. The usage core never reads this store; the dashboard joins names in
//! after aggregation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

/// Required prefix for API-key identifiers.
const KEY_PREFIX: &str = "key_";

/// Whether `id` is a well-formed key identifier: the `key_` prefix followed
/// by a non-empty opaque suffix.
pub fn is_valid_key_id(id: &str) -> bool {
    id.len() > KEY_PREFIX.len() && id.starts_with(KEY_PREFIX)
}

/// Counts reported after merging seed mappings into the store.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Entries in the seed map.
    pub from_seed: usize,
    /// Entries already present before the merge.
    pub existing: usize,
    /// Entries after the merge.
    pub after_merge: usize,
}

/// In-memory mapping store with JSON file persistence.
#[derive(Debug)]
pub struct MappingStore {
    mappings: RwLock<HashMap<String, String>>,
    storage_path: PathBuf,
}

impl MappingStore {
    /// Create a store at `storage_path`, loading existing mappings if the
    /// file exists. A missing file is an empty store, not an error.
    pub fn new(storage_path: PathBuf) -> Self {
        let mappings = match Self::load_from_path(&storage_path) {
            Ok(Some(loaded)) => {
                tracing::info!(
                    path = %storage_path.display(),
                    count = loaded.len(),
                    "loaded API key mappings"
                );
                loaded
            }
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!(
                    path = %storage_path.display(),
                    error = %e,
                    "failed to load mappings, starting empty"
                );
                HashMap::new()
            }
        };

        Self {
            mappings: RwLock::new(mappings),
            storage_path,
        }
    }

    fn load_from_path(path: &PathBuf) -> Result<Option<HashMap<String, String>>, std::io::Error> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let mappings = serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Some(mappings))
    }

    async fn save_to_disk(&self) -> Result<(), std::io::Error> {
        let mappings = self.mappings.read().await;

        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(&*mappings)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.storage_path, contents)?;
        tracing::debug!(path = %self.storage_path.display(), "saved mappings");
        Ok(())
    }

    /// Path the store persists to.
    pub fn storage_path(&self) -> &PathBuf {
        &self.storage_path
    }

    /// All mappings as a plain dictionary.
    pub async fn all(&self) -> HashMap<String, String> {
        self.mappings.read().await.clone()
    }

    /// Insert or replace the name for `key_id` and persist.
    pub async fn upsert(
        &self,
        key_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Result<(), std::io::Error> {
        {
            let mut mappings = self.mappings.write().await;
            mappings.insert(key_id.into(), user_name.into());
        }
        self.save_to_disk().await
    }

    /// Remove the mapping for `key_id`. Returns whether it existed; removal
    /// of an existing entry is persisted.
    pub async fn delete(&self, key_id: &str) -> Result<bool, std::io::Error> {
        let existed = {
            let mut mappings = self.mappings.write().await;
            mappings.remove(key_id).is_some()
        };

        if existed {
            self.save_to_disk().await?;
        }
        Ok(existed)
    }

    /// Merge `seed` into the store, existing entries taking precedence, and
    /// persist the result.
    pub async fn migrate(
        &self,
        seed: HashMap<String, String>,
    ) -> Result<MigrationReport, std::io::Error> {
        let report = {
            let mut mappings = self.mappings.write().await;
            let existing = mappings.len();
            let from_seed = seed.len();

            for (key, name) in seed {
                mappings.entry(key).or_insert(name);
            }

            MigrationReport {
                from_seed,
                existing,
                after_merge: mappings.len(),
            }
        };

        self.save_to_disk().await?;
        Ok(report)
    }
}

/// Shared mapping store for concurrent access.
pub type SharedMappingStore = Arc<MappingStore>;
