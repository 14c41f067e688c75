//! Host configuration for the feed token helper.
//!
//! The helper shares one configuration file with its host. It reads the
//! `azureFeed` settings block and owns the `tokenCache` key; every other key
//! in the file is preserved untouched on write.

pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, discover_and_load, find_config_file,
        find_or_default_config_path, load_config, load_config_value, set_config_dir,
        update_config_value,
    },
    schema::{AZURE_DEVOPS_RESOURCE_ID, FeedSettings, HostConfig, TOKEN_CACHE_KEY},
};
