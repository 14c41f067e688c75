use std::sync::Arc;

use {
    azfeed_config::{FeedSettings, discover_and_load},
    azfeed_exec::{CommandRunner, ShellRunner},
    chrono::{DateTime, Utc},
    secrecy::SecretString,
    tracing::{debug, warn},
};

use crate::{
    acquirer::TokenAcquirer,
    cache::{TokenCache, is_valid},
    error::AuthError,
    single_flight::SingleFlight,
    storage::{CacheBackend, ConfigFileBackend},
    types::{CacheEntry, TokenResult, bearer_header},
};

/// Environment variable carrying a pipeline-issued token. When set it wins
/// over the CLI and the cache.
pub const ACCESS_TOKEN_ENV: &str = "SYSTEM_ACCESSTOKEN";

type Outcome = Result<TokenResult, AuthError>;

/// A cached token as shown to the operator; the token itself is omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTokenStatus {
    pub registry: String,
    pub expires_on: DateTime<Utc>,
    pub valid: bool,
}

/// Produces `Authorization` header values for feed registries.
pub struct AuthHeaderResolver {
    settings: FeedSettings,
    cache: Arc<TokenCache>,
    acquirer: Arc<TokenAcquirer>,
    flights: SingleFlight<Outcome>,
    access_token: Option<SecretString>,
}

impl AuthHeaderResolver {
    pub fn new(
        settings: FeedSettings,
        runner: Arc<dyn CommandRunner>,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let cache = TokenCache::new(backend).with_safety_margin(settings.safety_margin());
        let acquirer = TokenAcquirer::new(runner, &settings);
        Self {
            settings,
            cache: Arc::new(cache),
            acquirer: Arc::new(acquirer),
            flights: SingleFlight::new(),
            access_token: None,
        }
    }

    /// Build a resolver from the discovered host config, the shell, and the
    /// process environment.
    pub fn from_host_config() -> Self {
        let settings = discover_and_load().feed.with_env_overrides();
        let runner = Arc::new(ShellRunner::new(settings.timeout()));
        let backend = Arc::new(ConfigFileBackend::discover());
        Self::new(settings, runner, backend).with_env_lookup(|name| std::env::var(name).ok())
    }

    /// Take the out-of-band token from [`ACCESS_TOKEN_ENV`] as seen by
    /// `lookup`.
    pub fn with_env_lookup(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.with_access_token(lookup(ACCESS_TOKEN_ENV))
    }

    /// Use an out-of-band token for every matching registry. Empty values
    /// are ignored.
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::new);
        self
    }

    /// The header value for `registry`, or `None` if it is not a feed
    /// registry.
    ///
    /// Concurrent calls for the same registry share one CLI acquisition,
    /// and the refreshed token is cached once per acquisition. A cache write
    /// failure is logged and does not fail the call.
    pub async fn resolve_header(&self, registry: &str) -> Result<Option<String>, AuthError> {
        if !self.settings.matches_registry(registry) {
            debug!(registry, "not a feed registry, no header");
            return Ok(None);
        }

        if let Some(token) = &self.access_token {
            debug!(registry, "using {ACCESS_TOKEN_ENV}");
            return Ok(Some(bearer_header(token)));
        }

        if let Some(entry) = self.cache.get_valid(registry, Utc::now()).await {
            debug!(registry, expires_on = %entry.expires_on, "using cached token");
            return Ok(Some(bearer_header(&entry.token)));
        }

        let acquirer = Arc::clone(&self.acquirer);
        let cache = Arc::clone(&self.cache);
        let key = registry.to_string();
        let token = self
            .flights
            .acquire(registry, move || refresh(acquirer, cache, key))
            .await?;

        Ok(Some(bearer_header(&token.access_token)))
    }

    /// Verify the CLI is installed and logged in before any request is made.
    /// A no-op when an out-of-band token is configured.
    pub async fn preflight(&self) -> Result<(), AuthError> {
        if self.access_token.is_some() {
            return Ok(());
        }
        self.acquirer.check_logged_in().await
    }

    /// Every cached token with its expiry and current validity.
    pub async fn cached_tokens(&self) -> Vec<CachedTokenStatus> {
        let now = Utc::now();
        self.cache
            .entries()
            .await
            .into_iter()
            .map(|entry| CachedTokenStatus {
                valid: is_valid(&entry, now, self.cache.safety_margin()),
                registry: entry.registry,
                expires_on: entry.expires_on,
            })
            .collect()
    }
}

/// One flight: acquire from the CLI, then cache the result once for every
/// caller that joined.
///
/// A caller can miss the cache just before an earlier flight writes it and
/// start a new flight just after that one settles, so the cache is checked
/// again first.
async fn refresh(acquirer: Arc<TokenAcquirer>, cache: Arc<TokenCache>, registry: String) -> Outcome {
    if let Some(entry) = cache.get_valid(&registry, Utc::now()).await {
        debug!(registry = %registry, "token cached by an earlier flight");
        return Ok(TokenResult {
            access_token: entry.token,
            expires_on: entry.expires_on,
        });
    }

    let token = acquirer.acquire().await?;
    let entry = CacheEntry::new(registry, &token);
    if let Err(e) = cache.put(&entry).await {
        warn!(registry = %entry.registry, error = %e, "token not cached");
    }
    Ok(token)
}
