//! Balance mutation engine of the SafeSpend ledger.
//!
//! Every account carries four balance fields that always satisfy
//! `total == available + locked + emergency_reserve`. The [`Engine`] moves
//! money between them as incomes, fixed expenses and variable expenses are
//! created, edited, paid, duplicated or deleted, appends a snapshot to the
//! balance history and keeps the cached daily spending limit coherent.

pub use accounts::{Account, Balances};
pub use allocation::{BalanceDelta, IncomeSplit, ReservePercentage, split_income};
pub use balance_history::{BalanceSnapshot, ChangeReason};
pub use cache::{CacheCoordinator, CacheError, CacheStore, CacheTtls, MemoryCache, ResultCache};
pub use commands::{
    DEFAULT_PAGE_LIMIT, FixedExpenseCmd, IncomeCmd, ListTransactionsCmd, MAX_PAGE_LIMIT,
    UpdateTransactionCmd, VariableExpenseCmd,
};
pub use currency::Currency;
pub use error::EngineError;
pub use guard::{AccessGuard, AccountRole, MembershipGuard};
pub use money::MoneyCents;
pub use ops::{
    DailyLimitStatus, DaySpending, Engine, EngineBuilder, LedgerReceipt, LedgerSettings,
    LimitStatus, Pagination, SpendingHistory, TransactionPage,
};
pub use rules::{ActiveRuleResolver, RuleResolver};
pub use transactions::{
    Recurrence, RecurrencePattern, Transaction, TransactionKind, TransactionStatus,
};

mod account_members;
mod accounts;
pub mod allocation;
mod allocation_rules;
mod balance_history;
mod cache;
mod commands;
mod currency;
mod error;
mod guard;
mod money;
mod ops;
mod rules;
mod transactions;
mod users;

pub type ResultEngine<T> = Result<T, EngineError>;
