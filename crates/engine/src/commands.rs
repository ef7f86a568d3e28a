//! Command structs for engine operations.
//!
//! These types group parameters for ledger operations
//! (income/fixed/variable/update/list), keeping call sites readable and
//! avoiding long argument lists. Each command validates itself before the
//! engine opens a storage transaction.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{EngineError, Recurrence, ResultEngine, TransactionKind, TransactionStatus};

pub const DEFAULT_PAGE_LIMIT: u64 = 50;
pub const MAX_PAGE_LIMIT: u64 = 100;
/// Highest page whose row offset still fits a signed 64-bit SQL parameter.
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PAGE_LIMIT;

fn validate_amount(amount_minor: i64) -> ResultEngine<()> {
    if amount_minor <= 0 {
        return Err(EngineError::Validation("amount must be > 0".to_string()));
    }
    Ok(())
}

fn validate_description(description: &str) -> ResultEngine<()> {
    if description.trim().is_empty() {
        return Err(EngineError::Validation("description must not be empty".to_string()));
    }
    Ok(())
}

/// Fixed expenses cannot be due before today (UTC, day granularity).
fn validate_due_date(due_date: DateTime<Utc>, today: NaiveDate) -> ResultEngine<()> {
    if due_date.date_naive() < today {
        return Err(EngineError::Validation(format!(
            "due date {} is in the past",
            due_date.date_naive()
        )));
    }
    Ok(())
}

/// Record an income.
#[derive(Clone, Debug)]
pub struct IncomeCmd {
    pub account_id: String,
    pub user_id: String,
    pub amount_minor: i64,
    pub description: String,
    pub category_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recurrence: Recurrence,
}

impl IncomeCmd {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        user_id: impl Into<String>,
        amount_minor: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            user_id: user_id.into(),
            amount_minor,
            description: description.into(),
            category_id: None,
            due_date: None,
            recurrence: Recurrence::default(),
        }
    }

    #[must_use]
    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    #[must_use]
    pub fn due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    #[must_use]
    pub fn recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn validate(&self) -> ResultEngine<()> {
        validate_amount(self.amount_minor)?;
        validate_description(&self.description)
    }
}

/// Lock funds for a future fixed expense.
#[derive(Clone, Debug)]
pub struct FixedExpenseCmd {
    pub account_id: String,
    pub user_id: String,
    pub amount_minor: i64,
    pub description: String,
    pub category_id: Option<String>,
    pub due_date: DateTime<Utc>,
    pub recurrence: Recurrence,
}

impl FixedExpenseCmd {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        user_id: impl Into<String>,
        amount_minor: i64,
        description: impl Into<String>,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            user_id: user_id.into(),
            amount_minor,
            description: description.into(),
            category_id: None,
            due_date,
            recurrence: Recurrence::default(),
        }
    }

    #[must_use]
    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    #[must_use]
    pub fn recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn validate(&self, today: NaiveDate) -> ResultEngine<()> {
        validate_amount(self.amount_minor)?;
        validate_description(&self.description)?;
        validate_due_date(self.due_date, today)
    }
}

/// Debit a variable expense immediately.
#[derive(Clone, Debug)]
pub struct VariableExpenseCmd {
    pub account_id: String,
    pub user_id: String,
    pub amount_minor: i64,
    pub description: String,
    pub category_id: Option<String>,
}

impl VariableExpenseCmd {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        user_id: impl Into<String>,
        amount_minor: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            user_id: user_id.into(),
            amount_minor,
            description: description.into(),
            category_id: None,
        }
    }

    #[must_use]
    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn validate(&self) -> ResultEngine<()> {
        validate_amount(self.amount_minor)?;
        validate_description(&self.description)
    }
}

/// Edit an existing transaction. `None` fields are left untouched.
#[derive(Clone, Debug)]
pub struct UpdateTransactionCmd {
    pub transaction_id: Uuid,
    pub user_id: String,
    pub amount_minor: Option<i64>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl UpdateTransactionCmd {
    #[must_use]
    pub fn new(transaction_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            transaction_id,
            user_id: user_id.into(),
            amount_minor: None,
            description: None,
            category_id: None,
            due_date: None,
        }
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    #[must_use]
    pub fn due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn validate(&self) -> ResultEngine<()> {
        if let Some(amount_minor) = self.amount_minor {
            validate_amount(amount_minor)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        Ok(())
    }
}

/// Filtered, paginated transaction listing.
#[derive(Clone, Debug)]
pub struct ListTransactionsCmd {
    pub user_id: String,
    pub account_id: Option<String>,
    pub kind: Option<TransactionKind>,
    pub statuses: Vec<TransactionStatus>,
    pub category_id: Option<String>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub page: u64,
    pub limit: u64,
}

impl ListTransactionsCmd {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            account_id: None,
            kind: None,
            statuses: Vec::new(),
            category_id: None,
            due_from: None,
            due_to: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }

    #[must_use]
    pub fn account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn statuses(mut self, statuses: impl IntoIterator<Item = TransactionStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    #[must_use]
    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    #[must_use]
    pub fn due_between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.due_from = from;
        self.due_to = to;
        self
    }

    #[must_use]
    pub fn page(mut self, page: u64, limit: u64) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn validate(&self) -> ResultEngine<()> {
        if self.page == 0 || self.page > MAX_PAGE {
            return Err(EngineError::Validation(format!("page must be between 1 and {MAX_PAGE}")));
        }
        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(EngineError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        if let (Some(from), Some(to)) = (self.due_from, self.due_to)
            && from > to
        {
            return Err(EngineError::Validation("due date range is inverted".to_string()));
        }
        Ok(())
    }

    /// Rows skipped before the requested page.
    pub fn offset(&self) -> ResultEngine<u64> {
        self.page
            .checked_sub(1)
            .and_then(|skipped| skipped.checked_mul(self.limit))
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| EngineError::Validation(format!("page {} is out of range", self.page)))
    }

    /// Stable cache key suffix for the filters (excluding the account).
    #[must_use]
    pub fn signature(&self) -> String {
        let mut statuses: Vec<&str> = self.statuses.iter().map(|s| s.as_str()).collect();
        statuses.sort_unstable();
        statuses.dedup();
        format!(
            "kind={}|status={}|category={}|from={}|to={}|page={}|limit={}",
            self.kind.map(TransactionKind::as_str).unwrap_or("*"),
            statuses.join(","),
            self.category_id.as_deref().unwrap_or("*"),
            self.due_from.map(|d| d.to_rfc3339()).unwrap_or_default(),
            self.due_to.map(|d| d.to_rfc3339()).unwrap_or_default(),
            self.page,
            self.limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn rejects_non_positive_amounts_and_blank_descriptions() {
        assert!(IncomeCmd::new("a", "u", 0, "salary").validate().is_err());
        assert!(IncomeCmd::new("a", "u", -5, "salary").validate().is_err());
        assert!(VariableExpenseCmd::new("a", "u", 10, "   ").validate().is_err());
        assert!(VariableExpenseCmd::new("a", "u", 10, "coffee").validate().is_ok());
    }

    #[test]
    fn fixed_expense_due_date_is_compared_by_day() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let early_today = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 1).unwrap();
        let yesterday = early_today - Duration::days(1);

        let ok = FixedExpenseCmd::new("a", "u", 10, "rent", early_today);
        assert!(ok.validate(today).is_ok());
        let late = FixedExpenseCmd::new("a", "u", 10, "rent", yesterday);
        assert!(matches!(late.validate(today), Err(EngineError::Validation(_))));
    }

    #[test]
    fn list_bounds() {
        assert!(ListTransactionsCmd::new("u").page(0, 10).validate().is_err());
        assert!(ListTransactionsCmd::new("u").page(1, 101).validate().is_err());
        assert!(ListTransactionsCmd::new("u").page(3, 100).validate().is_ok());
        assert!(ListTransactionsCmd::new("u").page(MAX_PAGE, 100).validate().is_ok());
        assert!(ListTransactionsCmd::new("u").page(MAX_PAGE + 1, 1).validate().is_err());
    }

    #[test]
    fn offset_never_overflows() {
        assert_eq!(ListTransactionsCmd::new("u").page(3, 20).offset().unwrap(), 40);
        let huge = ListTransactionsCmd::new("u").page(u64::MAX / 10, 50);
        assert!(matches!(huge.offset(), Err(EngineError::Validation(_))));
        assert!(ListTransactionsCmd::new("u").page(0, 10).offset().is_err());
    }

    #[test]
    fn signature_ignores_status_order() {
        let a = ListTransactionsCmd::new("u")
            .statuses([TransactionStatus::Locked, TransactionStatus::Executed]);
        let b = ListTransactionsCmd::new("u")
            .statuses([TransactionStatus::Executed, TransactionStatus::Locked]);
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), a.clone().page(2, 50).signature());
    }
}
