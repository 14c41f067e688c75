use {
    chrono::{DateTime, Utc},
    secrecy::{ExposeSecret, SecretString},
};

/// A token freshly issued by the CLI.
#[derive(Debug, Clone)]
pub struct TokenResult {
    pub access_token: SecretString,
    pub expires_on: DateTime<Utc>,
}

/// A cached token for one registry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub registry: String,
    pub token: SecretString,
    pub expires_on: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(registry: impl Into<String>, token: &TokenResult) -> Self {
        Self {
            registry: registry.into(),
            token: token.access_token.clone(),
            expires_on: token.expires_on,
        }
    }
}

/// Format the value of an `Authorization` header.
pub fn bearer_header(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
