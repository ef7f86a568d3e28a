use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};

use super::{CacheError, CacheStore, MemoryCache};

/// Time-to-live of each cached artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTtls {
    pub daily_limit: Duration,
    pub spending_history: Duration,
    pub transactions: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            daily_limit: Duration::from_secs(24 * 60 * 60),
            spending_history: Duration::from_secs(60 * 60),
            transactions: Duration::from_secs(5 * 60),
        }
    }
}

/// Owns cache keys and the invalidate-on-write contract.
///
/// Reads populate entries lazily; ledger mutations only delete keys once the
/// storage transaction has committed. Store failures are logged and swallowed.
///
/// Every invalidation bumps a per-account generation. Readers capture it
/// before touching storage and write through [`Self::store_for_account`], so a
/// value computed before a concurrent mutation never outlives its
/// invalidation.
#[derive(Clone, Debug)]
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    ttls: CacheTtls,
    generations: Arc<DashMap<String, u64>>,
}

impl Default for CacheCoordinator {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCache::new()), CacheTtls::default())
    }
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self {
            store,
            ttls,
            generations: Arc::new(DashMap::new()),
        }
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    pub fn daily_limit_key(account_id: &str) -> String {
        format!("daily-limit:{account_id}")
    }

    pub fn spending_history_key(account_id: &str, days: u32) -> String {
        format!("{}{days}", Self::spending_history_prefix(account_id))
    }

    fn spending_history_prefix(account_id: &str) -> String {
        format!("spending-history:{account_id}:")
    }

    pub fn transactions_prefix(account_id: &str) -> String {
        format!("transactions:{account_id}:")
    }

    pub fn transactions_key(account_id: &str, signature: &str) -> String {
        format!("{}{signature}", Self::transactions_prefix(account_id))
    }

    /// Cached value for `key`, `None` on miss, decode error or store failure.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "dropping undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Invalidation counter of the account, captured by readers before they
    /// load the state a cached value is derived from.
    pub fn generation(&self, account_id: &str) -> u64 {
        self.generations.get(account_id).map_or(0, |generation| *generation)
    }

    fn bump_generation(&self, account_id: &str) {
        let mut generation = self.generations.entry(account_id.to_string()).or_insert(0);
        *generation = generation.wrapping_add(1);
    }

    /// Stores a value derived from account state read at `generation`.
    ///
    /// The write is undone when the account was invalidated in the meantime.
    /// Writers bump before deleting, so either this check sees the bump or the
    /// writer's delete runs after this write.
    pub async fn store_for_account<T: Serialize>(
        &self,
        account_id: &str,
        generation: u64,
        key: &str,
        value: &T,
        ttl: Duration,
    ) {
        self.store(key, value, ttl).await;
        if self.generation(account_id) != generation {
            tracing::debug!(key, "dropping cache entry computed before an invalidation");
            self.invalidate(key).await;
        }
    }

    /// Stores `value` under `key` for `ttl`.
    pub async fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let result = match serde_json::to_string(value) {
            Ok(raw) => self.store.set_with_ttl(key, raw, ttl).await,
            Err(err) => Err(CacheError::Serialization(err.to_string())),
        };
        if let Err(err) = result {
            tracing::warn!(key, error = %err, "cache write failed");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(err) = self.store.invalidate(key).await {
            tracing::warn!(key, error = %err, "cache invalidation failed");
        }
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        if let Err(err) = self.store.invalidate_prefix(prefix).await {
            tracing::warn!(prefix, error = %err, "cache prefix invalidation failed");
        }
    }

    pub async fn invalidate_daily_limit(&self, account_id: &str) {
        self.bump_generation(account_id);
        self.invalidate(&Self::daily_limit_key(account_id)).await;
    }

    /// Drops every cached list page of the account.
    pub async fn invalidate_transaction_pages(&self, account_id: &str) {
        self.bump_generation(account_id);
        self.invalidate_prefix(&Self::transactions_prefix(account_id))
            .await;
    }

    /// Called after a committed mutation that moved the account balances.
    pub async fn balances_changed(&self, account_id: &str) {
        self.invalidate_daily_limit(account_id).await;
        self.invalidate_transaction_pages(account_id).await;
    }

    /// Drops every entry of a deleted account.
    pub async fn account_removed(&self, account_id: &str) {
        self.balances_changed(account_id).await;
        self.bump_generation(account_id);
        self.invalidate_prefix(&Self::spending_history_prefix(account_id))
            .await;
    }
}
