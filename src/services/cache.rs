//! Persisted fallback cache
//!
//! One whole snapshot per logical source. Writes replace the previous
//! snapshot; there is no merge or field-level update.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use directories::BaseDirs;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::types::{CacheSnapshot, EsgError, Result};

/// On-disk format version; files with another version are ignored
pub const CACHE_VERSION: u32 = 1;

/// Logical data sources that own a cache slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKey {
    Invoices,
    Metrics,
}

impl SourceKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKey::Invoices => "invoices",
            SourceKey::Metrics => "metrics",
        }
    }
}

/// Injected persisted-cache collaborator
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been cached under `key`
    async fn read_snapshot(&self, key: &str) -> Result<Option<CacheSnapshot<Value>>>;

    /// Replace whatever is stored under `key`
    async fn write_snapshot(&self, key: &str, snapshot: CacheSnapshot<Value>) -> Result<()>;

    async fn clear(&self, key: &str) -> Result<()>;
}

/// Serialize a typed snapshot for storage
pub fn encode_snapshot<T: Serialize>(snapshot: &CacheSnapshot<T>) -> Result<CacheSnapshot<Value>> {
    let records = serde_json::to_value(&snapshot.records)
        .map_err(|e| EsgError::Cache(format!("Serialization failed: {}", e)))?;
    Ok(CacheSnapshot {
        captured_at: snapshot.captured_at,
        records,
    })
}

/// Decode a stored snapshot back into its typed form
pub fn decode_snapshot<T: DeserializeOwned>(
    snapshot: CacheSnapshot<Value>,
) -> Result<CacheSnapshot<T>> {
    let records = serde_json::from_value(snapshot.records)
        .map_err(|e| EsgError::CacheCorrupted(format!("Unexpected snapshot contents: {}", e)))?;
    Ok(CacheSnapshot {
        captured_at: snapshot.captured_at,
        records,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    key: String,
    snapshot: CacheSnapshot<Value>,
}

/// JSON-file store under `~/.esgtrack/cache`
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    cache_dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| EsgError::Cache("Cannot determine home directory".into()))?;
        let cache_dir = base_dirs.home_dir().join(".esgtrack").join("cache");
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.cache_dir.join(format!("{}.json", safe))
    }

    /// Blocking read under a shared lock
    fn load(path: &Path, key: &str) -> Result<Option<CacheSnapshot<Value>>> {
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(path)?;
        file.lock_shared()
            .map_err(|e| EsgError::Cache(format!("Failed to acquire read lock: {}", e)))?;

        let mut content = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut content);
        let _ = file.unlock();
        read?;

        let raw: Value = serde_json::from_str(&content)
            .map_err(|e| EsgError::CacheCorrupted(format!("Corrupted cache file: {}", e)))?;

        let found = raw
            .get("version")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0);
        if found != CACHE_VERSION {
            return Err(EsgError::CacheVersion {
                found,
                expected: CACHE_VERSION,
            });
        }

        let cache: CacheFile = serde_json::from_value(raw)
            .map_err(|e| EsgError::CacheCorrupted(format!("Corrupted cache file: {}", e)))?;
        if cache.key != key {
            return Err(EsgError::CacheCorrupted(format!(
                "Cache file holds '{}', expected '{}'",
                cache.key, key
            )));
        }

        Ok(Some(cache.snapshot))
    }

    /// Atomic write (temp file + rename) under an exclusive lock
    fn save(cache_dir: &Path, path: &Path, cache: &CacheFile) -> Result<()> {
        fs::create_dir_all(cache_dir)?;

        let content = serde_json::to_string_pretty(cache)
            .map_err(|e| EsgError::Cache(format!("Serialization failed: {}", e)))?;

        let temp_path = path.with_extension("json.tmp");
        {
            let mut file = File::create(&temp_path)
                .map_err(|e| EsgError::Cache(format!("Failed to create temp file: {}", e)))?;
            file.write_all(content.as_bytes())
                .map_err(|e| EsgError::Cache(format!("Failed to write temp file: {}", e)))?;
            file.sync_all()
                .map_err(|e| EsgError::Cache(format!("Failed to sync temp file: {}", e)))?;
        }

        let target = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        target
            .lock_exclusive()
            .map_err(|e| EsgError::Cache(format!("Failed to acquire write lock: {}", e)))?;

        let renamed = fs::rename(&temp_path, path)
            .map_err(|e| EsgError::Cache(format!("Failed to rename temp file: {}", e)));

        let _ = target.unlock();
        renamed
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| EsgError::Cache(format!("Cache task failed: {}", e)))?
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read_snapshot(&self, key: &str) -> Result<Option<CacheSnapshot<Value>>> {
        let path = self.cache_path(key);
        let key = key.to_string();
        blocking(move || Self::load(&path, &key)).await
    }

    async fn write_snapshot(&self, key: &str, snapshot: CacheSnapshot<Value>) -> Result<()> {
        let cache_dir = self.cache_dir.clone();
        let path = self.cache_path(key);
        let cache = CacheFile {
            version: CACHE_VERSION,
            key: key.to_string(),
            snapshot,
        };
        blocking(move || Self::save(&cache_dir, &path, &cache)).await?;
        tracing::debug!(key, "cache snapshot replaced");
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let path = self.cache_path(key);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

/// In-process store for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slots: RwLock<HashMap<String, CacheSnapshot<Value>>>,
    writes: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one snapshot (not counted as a write)
    pub fn seeded(key: &str, snapshot: CacheSnapshot<Value>) -> Self {
        let mut slots = HashMap::new();
        slots.insert(key.to_string(), snapshot);
        Self {
            slots: RwLock::new(slots),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful `write_snapshot` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read_snapshot(&self, key: &str) -> Result<Option<CacheSnapshot<Value>>> {
        Ok(self.slots.read().await.get(key).cloned())
    }

    async fn write_snapshot(&self, key: &str, snapshot: CacheSnapshot<Value>) -> Result<()> {
        self.slots.write().await.insert(key.to_string(), snapshot);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.slots.write().await.remove(key);
        Ok(())
    }
}
