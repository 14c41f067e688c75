use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use {
    anyhow::Result,
    async_trait::async_trait,
    azfeed_config::{TOKEN_CACHE_KEY, find_or_default_config_path, load_config, update_config_value},
    serde_json::{Map, Value},
};

/// Where raw token cache entries live.
///
/// Entries are untyped here; [`TokenCache`](crate::TokenCache) validates
/// them on read.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// All entries, keyed by registry URL.
    async fn load(&self) -> Result<BTreeMap<String, Value>>;

    /// Insert or replace the entry for one registry, leaving the others.
    async fn store(&self, registry: &str, entry: Value) -> Result<()>;
}

/// Token cache kept under `tokenCache` in the host configuration file.
#[derive(Debug, Clone)]
pub struct ConfigFileBackend {
    path: PathBuf,
}

impl ConfigFileBackend {
    /// Use the discovered config file, or the default user-global path.
    pub fn discover() -> Self {
        Self {
            path: find_or_default_config_path(),
        }
    }

    /// Use a config file at a specific path (useful for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CacheBackend for ConfigFileBackend {
    async fn load(&self) -> Result<BTreeMap<String, Value>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<BTreeMap<String, Value>> {
            if !path.exists() {
                return Ok(BTreeMap::new());
            }
            Ok(load_config(&path)?.token_cache)
        })
        .await?
    }

    async fn store(&self, registry: &str, entry: Value) -> Result<()> {
        let path = self.path.clone();
        let registry = registry.to_string();
        tokio::task::spawn_blocking(move || {
            update_config_value(&path, |doc| insert_entry(doc, registry, entry))
        })
        .await?
    }
}

fn insert_entry(doc: &mut Value, registry: String, entry: Value) {
    let Some(root) = doc.as_object_mut() else {
        return;
    };
    let cache = root
        .entry(TOKEN_CACHE_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !cache.is_object() {
        *cache = Value::Object(Map::new());
    }
    if let Some(cache) = cache.as_object_mut() {
        cache.insert(registry, entry);
    }
}

/// Process-local token cache, for hosts without a config file and for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn load(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.snapshot())
    }

    async fn store(&self, registry: &str, entry: Value) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(registry.to_string(), entry);
        Ok(())
    }
}
