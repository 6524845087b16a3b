//! Persisted string-keyed JSON blobs.
//!
//! Three independent layers live here (remote snapshot, infra URLs,
//! annotations). Each is read once on startup and written whole after
//! every change. There is no transaction across layers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::annotations::AnnotationBundle;
use crate::codec::InfraUrls;
use crate::fetch::RemoteRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize value for key {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Backend-agnostic string store. Values are opaque strings; typed
/// access goes through [`Layer`].
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(key);
        fs::write(&path, value).map_err(|source| StoreError::Io { path, source })
    }
}

/// Volatile store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Typed handle on a single key.
pub struct Layer<T> {
    key: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> Layer<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            _value: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Read the layer. A missing key yields the default; a corrupt blob is
    /// logged and also yields the default.
    pub fn load(&self, store: &dyn KeyValueStore) -> Result<T, StoreError> {
        let Some(raw) = store.get(self.key)? else {
            debug!(key = self.key, "layer not present, using default");
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(key = self.key, error = %e, "ignoring unreadable layer");
                Ok(T::default())
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
            key: self.key.to_string(),
            source,
        })?;
        store.set(self.key, &raw)?;
        debug!(key = self.key, bytes = raw.len(), "saved layer");
        Ok(())
    }
}

pub const SNAPSHOT: Layer<Vec<RemoteRecord>> = Layer::new("repos_snapshot");
pub const INFRA_URLS: Layer<InfraUrls> = Layer::new("infra_urls");
pub const ANNOTATIONS: Layer<AnnotationBundle> = Layer::new("annotations");

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_file_store_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.get("nothing").unwrap().is_none());
    }

    #[test]
    fn test_file_store_creates_directory_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("data"));
        store.set("k", "\"v\"").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("\"v\""));
        assert!(store.dir().join("k.json").exists());
    }

    #[test]
    fn test_layer_defaults_when_absent() {
        let store = MemoryStore::new();
        let urls = INFRA_URLS.load(&store).unwrap();
        assert!(urls.is_empty());
    }

    #[test]
    fn test_layer_recovers_from_corrupt_blob() {
        let store = MemoryStore::new();
        store.set(INFRA_URLS.key(), "{not json").unwrap();
        let urls = INFRA_URLS.load(&store).unwrap();
        assert!(urls.is_empty());
    }

    #[test]
    fn test_layer_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let mut urls = BTreeMap::new();
        urls.insert("site".to_string(), "https://site.example".to_string());
        INFRA_URLS.save(&store, &urls).unwrap();

        let reopened = FileStore::new(dir.path());
        assert_eq!(INFRA_URLS.load(&reopened).unwrap(), urls);
    }

    #[test]
    fn test_layers_are_independent() {
        let store = MemoryStore::new();
        let mut bundle = AnnotationBundle::default();
        bundle.classes.push("tool".to_string());
        ANNOTATIONS.save(&store, &bundle).unwrap();

        assert!(SNAPSHOT.load(&store).unwrap().is_empty());
        assert_eq!(ANNOTATIONS.load(&store).unwrap().classes, vec!["tool"]);
    }
}
