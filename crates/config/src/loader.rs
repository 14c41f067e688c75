use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use {
    anyhow::Context,
    tracing::{debug, warn},
};

use crate::schema::HostConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["azfeed.toml", "azfeed.yaml", "azfeed.yml", "azfeed.json"];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks in
/// this directory (working-directory and user-global paths are skipped).
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Load the typed view of the config at `path` (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<HostConfig> {
    let value = load_config_value(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("invalid config in {}", path.display()))
}

/// Load the config at `path` as an untyped document.
pub fn load_config_value(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config_value(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./azfeed.{toml,yaml,yml,json}` (working directory)
/// 2. `~/.config/azfeed/azfeed.{toml,yaml,yml,json}` (user-global)
///
/// Returns `HostConfig::default()` if no usable config file is found.
pub fn discover_and_load() -> HostConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return HostConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            HostConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
///
/// When a config dir override is set, only that directory is searched.
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }

    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| user_config_dir().and_then(|dir| first_existing(&dir)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the config directory: override, or `~/.config/azfeed/`.
pub fn config_dir() -> Option<PathBuf> {
    config_dir_override().or_else(user_config_dir)
}

fn user_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("azfeed"))
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("azfeed.toml")
}

/// Lock guarding config read-modify-write cycles within this process.
static CONFIG_SAVE_LOCK: Mutex<()> = Mutex::new(());

/// Load the document at `path`, apply `f`, and write it back.
///
/// Works on the untyped document so keys owned by the host survive. A
/// missing file starts as an empty document and is created with owner-only
/// permissions on Unix. Other processes are not locked out; the last writer
/// wins.
pub fn update_config_value(
    path: &Path,
    f: impl FnOnce(&mut serde_json::Value),
) -> anyhow::Result<()> {
    let _guard = CONFIG_SAVE_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    let existed = path.exists();
    let mut doc = if existed {
        load_config_value(path)?
    } else {
        serde_json::Value::Object(serde_json::Map::new())
    };
    if doc.is_null() {
        // An empty YAML file parses as null.
        doc = serde_json::Value::Object(serde_json::Map::new());
    }
    if !doc.is_object() {
        anyhow::bail!("config root in {} is not a table", path.display());
    }

    f(&mut doc);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = serialize_config_value(&doc, path)?;
    std::fs::write(path, serialized)?;

    // The cache holds bearer tokens.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if !existed {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
    }

    debug!(path = %path.display(), "saved config");
    Ok(())
}

fn config_format(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

fn parse_config_value(raw: &str, path: &Path) -> anyhow::Result<serde_json::Value> {
    match config_format(path) {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        ext => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

fn serialize_config_value(doc: &serde_json::Value, path: &Path) -> anyhow::Result<String> {
    match config_format(path) {
        "toml" => toml::to_string_pretty(doc).map_err(|e| anyhow::anyhow!("serialize config: {e}")),
        "yaml" | "yml" => Ok(serde_yaml::to_string(doc)?),
        "json" => Ok(serde_json::to_string_pretty(doc)?),
        ext => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
