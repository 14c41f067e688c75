/// Config schema types (feed settings and the persisted token cache).
use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Key under which the token cache lives in the host configuration file.
pub const TOKEN_CACHE_KEY: &str = "tokenCache";

/// Azure DevOps resource id used when requesting a token from the CLI.
pub const AZURE_DEVOPS_RESOURCE_ID: &str = "499b84ac-1321-427f-aa17-267ca6975798";

/// Root configuration, as seen by this helper.
///
/// Only the keys below are typed; the host file may carry anything else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    #[serde(rename = "azureFeed")]
    pub feed: FeedSettings,

    /// Registry URL → raw cache entry. Entries are validated by the reader,
    /// so a malformed one never fails the whole file.
    #[serde(rename = "tokenCache")]
    pub token_cache: BTreeMap<String, serde_json::Value>,
}

/// Settings for the feed and the CLI that issues its tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedSettings {
    /// Registry URL prefixes this helper authenticates.
    pub host_prefixes: Vec<String>,

    /// Resource id passed to `get-access-token --resource`.
    pub resource_id: String,

    /// Executable name of the cloud CLI.
    pub cli_command: String,

    /// Upper bound on a single CLI invocation, including interactive login.
    pub timeout_secs: u64,

    /// Cached tokens expiring within this many seconds are refreshed.
    pub safety_margin_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            host_prefixes: vec![
                "https://pkgs.dev.azure.com".into(),
                "http://pkgs.dev.azure.com".into(),
            ],
            resource_id: AZURE_DEVOPS_RESOURCE_ID.into(),
            cli_command: "az".into(),
            timeout_secs: 180,
            safety_margin_secs: 0,
        }
    }
}

impl FeedSettings {
    /// Whether `registry` belongs to the configured feed host.
    pub fn matches_registry(&self, registry: &str) -> bool {
        self.host_prefixes
            .iter()
            .any(|prefix| registry.starts_with(prefix.as_str()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    /// Override individual fields from the process environment.
    ///
    /// `AZFEED_CLI_COMMAND`, `AZFEED_RESOURCE_ID`, `AZFEED_TIMEOUT_SECS`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an
    /// explicit lookup (useful for testing).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("AZFEED_CLI_COMMAND").filter(|v| !v.trim().is_empty()) {
            self.cli_command = v;
        }
        if let Some(v) = lookup("AZFEED_RESOURCE_ID").filter(|v| !v.trim().is_empty()) {
            self.resource_id = v;
        }
        if let Some(secs) = lookup("AZFEED_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.timeout_secs = secs;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefixes_match_both_schemes() {
        let settings = FeedSettings::default();
        assert!(settings.matches_registry("https://pkgs.dev.azure.com/org/_packaging/feed/npm/registry/"));
        assert!(settings.matches_registry("http://pkgs.dev.azure.com/org/"));
        assert!(!settings.matches_registry("https://registry.npmjs.org/"));
        assert!(!settings.matches_registry("https://evil.example/https://pkgs.dev.azure.com"));
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let cfg: HostConfig =
            serde_json::from_str(r#"{"azureFeed":{"cliCommand":"az-next"},"npmScopes":{}}"#)
                .unwrap();
        assert_eq!(cfg.feed.cli_command, "az-next");
        assert_eq!(cfg.feed.resource_id, AZURE_DEVOPS_RESOURCE_ID);
        assert_eq!(cfg.feed.timeout_secs, 180);
        assert!(cfg.token_cache.is_empty());
    }

    #[test]
    fn overrides_apply_only_when_present() {
        let settings = FeedSettings::default().with_overrides(|name| match name {
            "AZFEED_CLI_COMMAND" => Some("/opt/az/bin/az".into()),
            "AZFEED_TIMEOUT_SECS" => Some("not-a-number".into()),
            _ => None,
        });
        assert_eq!(settings.cli_command, "/opt/az/bin/az");
        assert_eq!(settings.timeout_secs, 180);
        assert_eq!(settings.resource_id, AZURE_DEVOPS_RESOURCE_ID);
    }
}
