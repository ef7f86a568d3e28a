//! Key/value cache used for derived, read-side figures.
//!
//! The ledger never reads its own state from here: balances live in the
//! database and the cache only holds values computed from them (daily limit,
//! spending history, list pages). Every failure is therefore recoverable by
//! recomputing.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

mod coordinator;
mod memory;

pub use coordinator::{CacheCoordinator, CacheTtls};
pub use memory::MemoryCache;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache serialization failed: {0}")]
    Serialization(String),
}

pub type ResultCache<T> = Result<T, CacheError>;

/// Generic key/value store with per-entry expiry. Values are JSON strings.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> ResultCache<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> ResultCache<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn invalidate(&self, key: &str) -> ResultCache<()>;

    /// Removes every key starting with `prefix`.
    async fn invalidate_prefix(&self, prefix: &str) -> ResultCache<()>;
}
