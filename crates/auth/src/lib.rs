//! Bearer tokens for Azure DevOps package feeds, issued by the Azure CLI.
//!
//! [`AuthHeaderResolver`] is the entry point a package manager calls per
//! registry request. Tokens come from `az account get-access-token`, are
//! cached in the host configuration file until they expire, and concurrent
//! refreshes for one registry share a single CLI invocation.

pub mod acquirer;
pub mod cache;
pub mod cli_output;
pub mod error;
pub mod install;
pub mod resolver;
pub mod single_flight;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

pub use {
    acquirer::TokenAcquirer,
    cache::{TokenCache, is_valid},
    error::{AuthError, PersistError},
    resolver::{ACCESS_TOKEN_ENV, AuthHeaderResolver, CachedTokenStatus},
    single_flight::SingleFlight,
    storage::{CacheBackend, ConfigFileBackend, MemoryBackend},
    types::{CacheEntry, TokenResult, bearer_header},
};
