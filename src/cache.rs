//! Write-once content cache in front of the fetch layer.
//!
//! Filings and daily index files are immutable once published, so a cache entry is
//! trusted forever: there is no expiry and no revalidation against the remote copy.
//! Deleting the file on disk is the only way to force a refetch.
//!
//! [`ContentCache`] serializes work per key, which keeps the at-most-one-fetch guarantee
//! intact when several workers ask for the same key at once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::core::Fetch;
use super::error::{InsiderError, Result};

/// Durable byte storage addressed by relative paths.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the stored bytes, or `None` when the key has never been written.
    async fn read(&self, key: &Path) -> Result<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`. Failures surface as `InsiderError::Persistence`.
    async fn write(&self, key: &Path, bytes: &[u8]) -> Result<()>;
}

/// Cache store rooted at a directory; keys are paths relative to the root.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `key` under the root.
    ///
    /// # Errors
    ///
    /// `InsiderError::InvalidCacheKey` unless `key` is a non-empty relative path made of
    /// plain segments only (no `..`, `.`, root or drive prefix).
    pub fn path_for(&self, key: &Path) -> Result<PathBuf> {
        let plain = key
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !plain || key.as_os_str().is_empty() {
            return Err(InsiderError::InvalidCacheKey(key.to_path_buf()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn read(&self, key: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(InsiderError::FileError(e)),
        }
    }

    async fn write(&self, key: &Path, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        let persistence = |source| InsiderError::Persistence {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(persistence)?;
        }

        // Readers only ever see complete entries.
        let mut partial = OsString::from(path.as_os_str());
        partial.push(".part");
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, bytes)
            .await
            .map_err(persistence)?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(persistence)?;
        Ok(())
    }
}

/// In-memory cache store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry as if it had been fetched earlier.
    pub fn insert(&self, key: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.lock().insert(key.into(), bytes.into());
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, key: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn write(&self, key: &Path, bytes: &[u8]) -> Result<()> {
        self.lock().insert(key.to_path_buf(), bytes.to_vec());
        Ok(())
    }
}

type KeyLocks = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// Fetch-through cache combining a [`Fetch`] source with a [`CacheStore`].
#[derive(Clone)]
pub struct ContentCache {
    fetch: Arc<dyn Fetch>,
    store: Arc<dyn CacheStore>,
    locks: Arc<KeyLocks>,
}

impl ContentCache {
    pub fn new(fetch: Arc<dyn Fetch>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            fetch,
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_for(&self, key: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.to_path_buf()).or_default().clone()
    }

    /// Returns the bytes stored under `key`, fetching `url` and persisting on a miss.
    ///
    /// # Errors
    ///
    /// * Any error from the fetch layer on a miss (nothing is written in that case)
    /// * `InsiderError::Persistence` if the fetched bytes cannot be stored
    /// * `InsiderError::FileError` if an existing entry cannot be read
    /// * `InsiderError::InvalidCacheKey` if the store refuses `key`
    pub async fn get_or_fetch(&self, url: &str, key: &Path) -> Result<Vec<u8>> {
        let lock = self.lock_for(key);
        let result = {
            let _guard = lock.lock().await;
            self.read_through(url, key).await
        };
        self.release(key, lock);
        result
    }

    /// Drops the key's lock from the table once no other caller holds it.
    fn release(&self, key: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the table, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    async fn read_through(&self, url: &str, key: &Path) -> Result<Vec<u8>> {
        if let Some(bytes) = self.store.read(key).await? {
            tracing::debug!("Cache hit for {}", key.display());
            return Ok(bytes);
        }

        tracing::debug!("Cache miss for {}, fetching {}", key.display(), url);
        let bytes = self.fetch.fetch(url).await?;
        self.store.write(key, &bytes).await?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFetch {
        calls: AtomicUsize,
        body: Vec<u8>,
    }

    impl CountingFetch {
        fn new(body: &[u8]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                body: body.to_vec(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetch for CountingFetch {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(self.body.clone())
        }
    }

    struct FailingFetch;

    #[async_trait]
    impl Fetch for FailingFetch {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            Err(InsiderError::NotFound)
        }
    }

    #[tokio::test]
    async fn test_hit_performs_no_fetch() {
        let fetch = Arc::new(CountingFetch::new(b"remote"));
        let store = Arc::new(MemoryStore::new());
        store.insert("master.20220401.idx", b"cached".to_vec());

        let cache = ContentCache::new(fetch.clone(), store);
        let bytes = cache
            .get_or_fetch("https://example.test/a", Path::new("master.20220401.idx"))
            .await
            .unwrap();

        assert_eq!(bytes, b"cached");
        assert_eq!(fetch.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_once_and_persists() {
        let fetch = Arc::new(CountingFetch::new(b"remote"));
        let store = Arc::new(MemoryStore::new());
        let cache = ContentCache::new(fetch.clone(), store.clone());
        let key = Path::new("320193_000032019322000050.xml");

        let first = cache.get_or_fetch("https://example.test/a", key).await.unwrap();
        let second = cache.get_or_fetch("https://example.test/a", key).await.unwrap();

        assert_eq!(first, b"remote");
        assert_eq!(second, b"remote");
        assert_eq!(fetch.calls(), 1);
        assert!(store.contains(key));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let fetch = Arc::new(CountingFetch::new(b"remote"));
        let cache = ContentCache::new(fetch.clone(), Arc::new(MemoryStore::new()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_fetch("https://example.test/a", Path::new("same-key"))
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), b"remote");
        }
        assert_eq!(fetch.calls(), 1);
        assert!(cache.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_locks_are_released() {
        let cache = ContentCache::new(
            Arc::new(CountingFetch::new(b"remote")),
            Arc::new(MemoryStore::new()),
        );

        for i in 0..50 {
            let key = PathBuf::from(format!("{i}_000000000022000001.xml"));
            cache.get_or_fetch("https://example.test/a", &key).await.unwrap();
        }
        let _ = cache
            .get_or_fetch("https://example.test/a", Path::new(""))
            .await;

        assert!(cache.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let cache = ContentCache::new(Arc::new(FailingFetch), store.clone());

        let result = cache
            .get_or_fetch("https://example.test/missing", Path::new("missing"))
            .await;

        assert!(matches!(result, Err(InsiderError::NotFound)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_disk_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().join("form4_xml"));
        let key = Path::new("nested/320193_000032019322000050.xml");

        assert!(store.read(key).await.unwrap().is_none());
        store.write(key, b"<XML></XML>").await.unwrap();

        assert_eq!(store.read(key).await.unwrap().unwrap(), b"<XML></XML>");
        assert!(
            !store
                .path_for(Path::new("nested/320193_000032019322000050.xml.part"))
                .unwrap()
                .exists()
        );
    }

    #[tokio::test]
    async fn test_disk_store_rejects_keys_leaving_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().join("masterfiles"));
        let outside = dir.path().join("escaped.idx");

        for key in [
            outside.clone(),
            PathBuf::from("../escaped.idx"),
            PathBuf::from("sub/../../escaped.idx"),
            PathBuf::from(""),
        ] {
            assert!(matches!(
                store.write(&key, b"x").await,
                Err(InsiderError::InvalidCacheKey(_))
            ));
            assert!(matches!(
                store.read(&key).await,
                Err(InsiderError::InvalidCacheKey(_))
            ));
        }
        assert!(!outside.exists());
    }

    #[tokio::test]
    async fn test_disk_store_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let cache = ContentCache::new(
            Arc::new(CountingFetch::new(b"remote")),
            Arc::new(DiskStore::new(&blocker)),
        );
        let result = cache
            .get_or_fetch("https://example.test/a", Path::new("sub/entry"))
            .await;

        assert!(matches!(result, Err(InsiderError::Persistence { .. })));
    }
}
