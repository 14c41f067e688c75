use std::{sync::Arc, time::Duration};

use {
    chrono::{DateTime, SecondsFormat, TimeDelta, Utc},
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{cli_output::parse_expiry, error::PersistError, storage::CacheBackend, types::CacheEntry};

/// On-disk shape of one cache entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    expires_on: String,
    token: String,
}

/// Per-registry token cache over a [`CacheBackend`].
pub struct TokenCache {
    backend: Arc<dyn CacheBackend>,
    safety_margin: Duration,
}

impl TokenCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            safety_margin: Duration::ZERO,
        }
    }

    pub fn with_safety_margin(mut self, safety_margin: Duration) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// The entry for `registry`, if one exists and is well formed.
    ///
    /// Never fails: an unreadable store or a malformed entry reads as absent.
    pub async fn get(&self, registry: &str) -> Option<CacheEntry> {
        let mut entries = match self.backend.load().await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(registry, error = %e, "token cache unreadable, treating as empty");
                return None;
            },
        };
        let raw = entries.remove(registry)?;
        let entry = decode(registry, raw);
        if entry.is_none() {
            debug!(registry, "ignoring malformed token cache entry");
        }
        entry
    }

    /// The entry for `registry` if it is still valid at `now`.
    pub async fn get_valid(&self, registry: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        self.get(registry)
            .await
            .filter(|entry| is_valid(entry, now, self.safety_margin))
    }

    /// Every well-formed entry, in registry order.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        match self.backend.load().await {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|(registry, raw)| decode(&registry, raw))
                .collect(),
            Err(e) => {
                debug!(error = %e, "token cache unreadable, treating as empty");
                Vec::new()
            },
        }
    }

    /// Persist `entry`, replacing any previous entry for its registry.
    pub async fn put(&self, entry: &CacheEntry) -> Result<(), PersistError> {
        let stored = StoredEntry {
            expires_on: entry.expires_on.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            token: entry.token.expose_secret().clone(),
        };
        let value = serde_json::to_value(&stored).map_err(|e| PersistError(e.into()))?;
        self.backend
            .store(&entry.registry, value)
            .await
            .map_err(PersistError)?;
        debug!(registry = %entry.registry, expires_on = %entry.expires_on, "token cached");
        Ok(())
    }
}

/// Whether `entry` can still be used at `now`: strictly before its expiry
/// minus `safety_margin`.
pub fn is_valid(entry: &CacheEntry, now: DateTime<Utc>, safety_margin: Duration) -> bool {
    TimeDelta::from_std(safety_margin)
        .ok()
        .and_then(|margin| entry.expires_on.checked_sub_signed(margin))
        .is_some_and(|cutoff| now < cutoff)
}

fn decode(registry: &str, raw: serde_json::Value) -> Option<CacheEntry> {
    let stored: StoredEntry = serde_json::from_value(raw).ok()?;
    if stored.token.is_empty() {
        return None;
    }
    Some(CacheEntry {
        registry: registry.to_string(),
        token: SecretString::new(stored.token),
        expires_on: parse_expiry(&stored.expires_on)?,
    })
}

#[cfg(test)]
mod tests {
    use {super::*, crate::storage::MemoryBackend, serde_json::json, std::collections::BTreeMap};

    const REGISTRY: &str = "https://pkgs.dev.azure.com/org/_packaging/feed/npm/registry/";

    fn entry(expires_on: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            registry: REGISTRY.into(),
            token: SecretString::new("tok".into()),
            expires_on,
        }
    }

    fn cache_with(entries: BTreeMap<String, serde_json::Value>) -> TokenCache {
        TokenCache::new(Arc::new(MemoryBackend::with_entries(entries)))
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = TokenCache::new(Arc::new(MemoryBackend::new()));
        let expires_on = DateTime::parse_from_rfc3339("2030-01-02T03:04:05.678Z")
            .unwrap()
            .with_timezone(&Utc);
        cache.put(&entry(expires_on)).await.unwrap();

        let got = cache.get(REGISTRY).await.unwrap();
        assert_eq!(got.token.expose_secret(), "tok");
        assert_eq!(got.expires_on, expires_on);
        assert!(cache.get("https://pkgs.dev.azure.com/other/").await.is_none());
    }

    #[tokio::test]
    async fn stored_form_is_utc_iso() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = TokenCache::new(backend.clone());
        let expires_on = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        cache.put(&entry(expires_on)).await.unwrap();

        assert_eq!(
            backend.snapshot()[REGISTRY],
            json!({ "expiresOn": "2030-03-17T17:46:40Z", "token": "tok" })
        );
    }

    #[tokio::test]
    async fn malformed_entries_read_as_absent() {
        let mut entries = BTreeMap::new();
        entries.insert("a".to_string(), json!({ "token": "t" }));
        entries.insert("b".to_string(), json!({ "token": "t", "expiresOn": "soon" }));
        entries.insert("c".to_string(), json!({ "token": 42, "expiresOn": "2030-01-01T00:00:00Z" }));
        entries.insert("d".to_string(), json!({ "token": "", "expiresOn": "2030-01-01T00:00:00Z" }));
        entries.insert("e".to_string(), json!("Bearer t"));
        entries.insert("ok".to_string(), json!({ "token": "t", "expiresOn": "2030-01-01T00:00:00Z" }));
        let cache = cache_with(entries);

        for key in ["a", "b", "c", "d", "e", "missing"] {
            assert!(cache.get(key).await.is_none(), "{key} should be absent");
        }
        assert!(cache.get("ok").await.is_some());
        let listed: Vec<_> = cache.entries().await.into_iter().map(|e| e.registry).collect();
        assert_eq!(listed, vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn legacy_offset_timestamps_are_accepted() {
        let mut entries = BTreeMap::new();
        entries.insert(
            REGISTRY.to_string(),
            json!({ "token": "t", "expiresOn": "2030-01-01T01:00:00.000+01:00" }),
        );
        let got = cache_with(entries).get(REGISTRY).await.unwrap();
        assert_eq!(got.expires_on.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn validity_is_strict() {
        let now = Utc::now();
        assert!(is_valid(&entry(now + TimeDelta::minutes(10)), now, Duration::ZERO));
        assert!(!is_valid(&entry(now), now, Duration::ZERO));
        assert!(!is_valid(&entry(now - TimeDelta::seconds(1)), now, Duration::ZERO));
    }

    #[test]
    fn validity_honours_margin() {
        let now = Utc::now();
        let e = entry(now + TimeDelta::seconds(30));
        assert!(is_valid(&e, now, Duration::from_secs(29)));
        assert!(!is_valid(&e, now, Duration::from_secs(30)));
        assert!(!is_valid(&e, now, Duration::from_secs(u64::MAX)));
    }

    #[tokio::test]
    async fn get_valid_filters_expired() {
        let cache = TokenCache::new(Arc::new(MemoryBackend::new()))
            .with_safety_margin(Duration::from_secs(60));
        let now = Utc::now();
        cache.put(&entry(now + TimeDelta::seconds(30))).await.unwrap();
        assert!(cache.get(REGISTRY).await.is_some());
        assert!(cache.get_valid(REGISTRY, now).await.is_none());
    }
}
