use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    AccessGuard, ActiveRuleResolver, CacheCoordinator, CacheStore, CacheTtls, EngineError,
    MembershipGuard, MemoryCache, ReservePercentage, ResultEngine, RuleResolver,
};

mod access;
mod accounts;
mod balances;
mod suggestions;
mod transactions;

pub use suggestions::{DailyLimitStatus, DaySpending, LimitStatus, SpendingHistory};
pub use transactions::{LedgerReceipt, Pagination, TransactionPage};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Ledger knobs consumed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Used when an account has no active reserve rule, and for every
    /// amount change or reversal of an income.
    pub default_reserve_percentage: ReservePercentage,
    /// Number of days the available balance is spread over.
    pub daily_limit_window_days: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            default_reserve_percentage: ReservePercentage::DEFAULT,
            daily_limit_window_days: 30,
        }
    }
}

impl LedgerSettings {
    fn validate(&self) -> ResultEngine<()> {
        if self.daily_limit_window_days == 0 {
            return Err(EngineError::Validation("daily limit window must be > 0 days".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    guard: Arc<dyn AccessGuard>,
    rules: Arc<dyn RuleResolver>,
    cache: CacheCoordinator,
    settings: LedgerSettings,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn settings(&self) -> LedgerSettings {
        self.settings
    }
}

fn normalize_required_text(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{label} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    guard: Option<Arc<dyn AccessGuard>>,
    rules: Option<Arc<dyn RuleResolver>>,
    cache_store: Option<Arc<dyn CacheStore>>,
    cache_ttls: CacheTtls,
    settings: LedgerSettings,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Replace the default [`MembershipGuard`].
    pub fn access_guard(mut self, guard: Arc<dyn AccessGuard>) -> EngineBuilder {
        self.guard = Some(guard);
        self
    }

    /// Replace the default [`ActiveRuleResolver`].
    pub fn rule_resolver(mut self, rules: Arc<dyn RuleResolver>) -> EngineBuilder {
        self.rules = Some(rules);
        self
    }

    /// Replace the default in-process [`MemoryCache`].
    pub fn cache_store(mut self, store: Arc<dyn CacheStore>) -> EngineBuilder {
        self.cache_store = Some(store);
        self
    }

    pub fn cache_ttls(mut self, ttls: CacheTtls) -> EngineBuilder {
        self.cache_ttls = ttls;
        self
    }

    pub fn settings(mut self, settings: LedgerSettings) -> EngineBuilder {
        self.settings = settings;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        self.settings.validate()?;
        let store = self
            .cache_store
            .unwrap_or_else(|| Arc::new(MemoryCache::new()));
        Ok(Engine {
            database: self.database,
            guard: self.guard.unwrap_or_else(|| Arc::new(MembershipGuard)),
            rules: self.rules.unwrap_or_else(|| Arc::new(ActiveRuleResolver)),
            cache: CacheCoordinator::new(store, self.cache_ttls),
            settings: self.settings,
        })
    }
}
