use std::fs;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheStoreError;
use crate::paths::cache_file_name;
use crate::schema::{CacheEntryRef, CacheFile, CacheFileRef, CacheKind, CACHE_FILE_VERSION};

/// Entries kept per kind unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 8;

/// What [`BoundedStore::load`] found on disk.
#[derive(Debug)]
pub enum LoadOutcome {
    /// No backing file yet; the store starts empty.
    Missing,
    Loaded { entries: usize },
    /// The backing file was unreadable and has been reset to an empty store.
    Recovered { reason: CacheStoreError },
}

/// Bounded LRU map for one resource kind, persisted as a single JSON file.
///
/// Every mutation and the file write it triggers happen under the same lock,
/// so there is exactly one writer per kind at any time.
#[derive(Debug)]
pub struct BoundedStore<V> {
    kind: CacheKind,
    path: Option<PathBuf>,
    entries: Mutex<LruCache<String, V>>,
}

impl<V> BoundedStore<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Creates an empty store backed by `<dir>/<kind>.json`. Nothing is read
    /// until [`BoundedStore::load`] is called.
    #[must_use]
    pub fn new(kind: CacheKind, dir: &Path, capacity: usize) -> Self {
        Self {
            kind,
            path: Some(dir.join(cache_file_name(kind))),
            entries: Mutex::new(LruCache::new(non_zero_capacity(capacity))),
        }
    }

    /// Creates a store that never touches the filesystem.
    #[must_use]
    pub fn in_memory(kind: CacheKind, capacity: usize) -> Self {
        Self {
            kind,
            path: None,
            entries: Mutex::new(LruCache::new(non_zero_capacity(capacity))),
        }
    }

    #[must_use]
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Keys from most to least recently used.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Looks up `key` and marks it most recently used.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Looks up `key` without touching its recency.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<V> {
        self.lock().peek(key).cloned()
    }

    /// Inserts or overwrites `key`, evicting the least recently used entry
    /// first when a new key would exceed capacity. Returns the evicted key.
    pub fn put(&self, key: impl Into<String>, value: V) -> Result<Option<String>, CacheStoreError> {
        let key = key.into();
        let mut entries = self.lock();

        let evicted = if !entries.contains(&key) && entries.len() >= entries.cap().get() {
            entries.pop_lru().map(|(evicted, _)| evicted)
        } else {
            None
        };
        if let Some(evicted) = &evicted {
            tracing::debug!(kind = %self.kind, key = %evicted, "evicted least recently used cache entry");
        }

        entries.put(key, value);
        self.persist(&entries)?;
        Ok(evicted)
    }

    pub fn remove(&self, key: &str) -> Result<Option<V>, CacheStoreError> {
        let mut entries = self.lock();
        let removed = entries.pop(key);
        if removed.is_some() {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), CacheStoreError> {
        let mut entries = self.lock();
        entries.clear();
        self.persist(&entries)
    }

    /// Replaces the in-memory contents with the backing file.
    ///
    /// A missing file leaves the store empty. An unreadable or malformed file
    /// is reported as [`LoadOutcome::Recovered`] and overwritten with an empty
    /// store; only failing to create the directory or to write that reset is
    /// an error.
    pub fn load(&self) -> Result<LoadOutcome, CacheStoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(LoadOutcome::Missing);
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|source| CacheStoreError::io("creating cache directory", dir, source))?;
        }

        let mut entries = self.lock();
        entries.clear();

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(source) => {
                let reason = CacheStoreError::io("reading cache file", path, source);
                return self.reset_after_failure(&entries, reason);
            }
        };

        let file = match self.parse(path, &bytes) {
            Ok(file) => file,
            Err(reason) => return self.reset_after_failure(&entries, reason),
        };

        let loaded = file.entries.len();
        for entry in file.entries {
            entries.push(entry.key, entry.value);
        }
        if loaded > entries.len() {
            tracing::debug!(
                kind = %self.kind,
                stored_capacity = file.capacity,
                capacity = entries.cap().get(),
                dropped = loaded - entries.len(),
                "cache capacity shrank since the file was written"
            );
        }

        Ok(LoadOutcome::Loaded {
            entries: entries.len(),
        })
    }

    /// Writes the current contents to the backing file.
    pub fn flush(&self) -> Result<(), CacheStoreError> {
        let entries = self.lock();
        self.persist(&entries)
    }

    fn parse(&self, path: &Path, bytes: &[u8]) -> Result<CacheFile<V>, CacheStoreError> {
        let file: CacheFile<V> =
            serde_json::from_slice(bytes).map_err(|source| CacheStoreError::corrupt(path, source))?;

        if file.version != CACHE_FILE_VERSION {
            return Err(CacheStoreError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: file.version,
                expected: CACHE_FILE_VERSION,
            });
        }
        if file.kind != self.kind {
            return Err(CacheStoreError::KindMismatch {
                path: path.to_path_buf(),
                found: file.kind,
                expected: self.kind,
            });
        }
        Ok(file)
    }

    fn reset_after_failure(
        &self,
        entries: &LruCache<String, V>,
        reason: CacheStoreError,
    ) -> Result<LoadOutcome, CacheStoreError> {
        tracing::warn!(kind = %self.kind, error = %reason, "discarding unreadable cache file");
        self.persist(entries)?;
        Ok(LoadOutcome::Recovered { reason })
    }

    fn persist(&self, entries: &LruCache<String, V>) -> Result<(), CacheStoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let file = CacheFileRef {
            version: CACHE_FILE_VERSION,
            kind: self.kind,
            capacity: entries.cap().get(),
            entries: entries
                .iter()
                .rev()
                .map(|(key, value)| CacheEntryRef { key, value })
                .collect(),
        };
        let bytes = serde_json::to_vec(&file).map_err(|source| CacheStoreError::Serialize {
            kind: self.kind,
            path: path.to_path_buf(),
            source,
        })?;

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, bytes)
            .map_err(|source| CacheStoreError::io("writing cache file", &staging, source))?;
        fs::rename(&staging, path)
            .map_err(|source| CacheStoreError::io("replacing cache file", path, source))
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, V>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn non_zero_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}
