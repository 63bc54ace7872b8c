/// Content cache for memoizing expensive generations
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// Key → JSON blob store.
///
/// Callers compute the key (see [`cache_key`]). Concurrent writers to the same
/// key race; the last write wins.
#[async_trait]
pub trait ContentCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// md5 hex digest over the given parts, separated so that
/// `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn cache_key(parts: &[&str]) -> String {
    let mut context = md5::Context::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            context.consume([0x1fu8]);
        }
        context.consume(part.as_bytes());
    }
    format!("{:x}", context.compute())
}

/// Single JSON file holding every entry.
///
/// The file is read once, on first access; every `set` rewrites it so entries
/// survive restarts. A missing or corrupt file starts an empty cache.
pub struct JsonFileCache {
    path: PathBuf,
    entries: OnceCell<RwLock<BTreeMap<String, Value>>>,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub file_bytes: u64,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn entries(&self) -> &RwLock<BTreeMap<String, Value>> {
        self.entries
            .get_or_init(|| async { RwLock::new(Self::load(&self.path).await) })
            .await
    }

    async fn load(path: &Path) -> BTreeMap<String, Value> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Starting empty cache, could not read {}: {}", path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, Value>>(&content) {
            Ok(entries) => {
                info!("📚 Loaded {} cached entries from {}", entries.len(), path.display());
                entries
            }
            Err(e) => {
                warn!("Failed to parse cache file {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    /// Write the whole map next to the target, then rename over it.
    async fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json_content = serde_json::to_string_pretty(entries)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json_content).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries().await.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry and persist the empty cache
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries().await.write().await;
        let cleared = entries.len();
        entries.clear();
        self.flush(&entries).await?;

        if cleared > 0 {
            info!("🧹 Cleared {} cache entries", cleared);
        }
        Ok(cleared)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let entries = self.len().await;
        let file_bytes = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => 0,
        };
        Ok(CacheStats { entries, file_bytes })
    }
}

#[async_trait]
impl ContentCache for JsonFileCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries().await.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        // Held across the flush so writers cannot interleave file contents
        let mut entries = self.entries().await.write().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries).await?;
        debug!("💾 Cached entry {} ({} total)", key, entries.len());
        Ok(())
    }
}

/// Process-local cache with no persistence.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_cache_key_is_stable_and_separated() {
        let a = cache_key(&["ab", "c"]);
        assert_eq!(a, cache_key(&["ab", "c"]));
        assert_ne!(a, cache_key(&["a", "bc"]));
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(temp_dir.path().join("nested/ai-responses.json"));
        assert!(cache.get("anything").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache/ai-responses.json");

        let cache = JsonFileCache::new(&path);
        cache.set("k1", json!({"title": "Unit 1"})).await.unwrap();
        assert_eq!(cache.get("k1").await, Some(json!({"title": "Unit 1"})));
        assert!(path.exists());

        let reopened = JsonFileCache::new(&path);
        assert_eq!(reopened.get("k1").await, Some(json!({"title": "Unit 1"})));
        assert_eq!(reopened.len().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ai-responses.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let cache = JsonFileCache::new(&path);
        assert!(cache.get("k").await.is_none());
        cache.set("k", json!(1)).await.unwrap();
        assert_eq!(JsonFileCache::new(&path).get("k").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let temp_dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(temp_dir.path().join("c.json"));
        cache.set("k", json!("first")).await.unwrap();
        cache.set("k", json!("second")).await.unwrap();
        assert_eq!(cache.get("k").await, Some(json!("second")));
    }

    #[tokio::test]
    async fn test_concurrent_writers_keep_all_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("c.json");
        let cache = Arc::new(JsonFileCache::new(&path));

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.set(&format!("key-{}", i), json!(i)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reopened = JsonFileCache::new(&path);
        assert_eq!(reopened.len().await, 16);
        assert_eq!(reopened.get("key-7").await, Some(json!(7)));
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let cache = JsonFileCache::new(temp_dir.path().join("c.json"));
        cache.set("a", json!(1)).await.unwrap();
        cache.set("b", json!(2)).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.file_bytes > 0);

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.is_none());
        cache.set("k", json!([1, 2])).await.unwrap();
        assert_eq!(cache.get("k").await, Some(json!([1, 2])));
        assert_eq!(cache.len().await, 1);
    }
}
