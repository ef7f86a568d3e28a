use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseTransaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Balances, ChangeReason, IncomeSplit, MoneyCents, Recurrence, ResultEngine, Transaction,
    TransactionKind, TransactionStatus, allocation, transactions,
};

use super::{Engine, normalize_optional_text, normalize_required_text};

mod list;
mod write;

/// Outcome of a mutation that created or paid a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub transaction: Transaction,
    /// Account balances right after the mutation.
    pub balances: Balances,
    /// Reserve/available split, only for incomes.
    pub breakdown: Option<IncomeSplit>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub pagination: Pagination,
}

/// Everything needed to record a new transaction, already validated.
struct NewTransaction {
    account_id: String,
    user_id: String,
    kind: TransactionKind,
    amount: MoneyCents,
    description: String,
    category_id: Option<String>,
    due_date: DateTime<Utc>,
    recurrence: Recurrence,
}

impl Engine {
    /// Shared creation path of income, fixed and variable expenses.
    ///
    /// Checks access, applies the creation delta (guarded for debits), inserts
    /// the row and appends the history snapshot, all on `db_tx`.
    async fn create_transaction_in(
        &self,
        db_tx: &DatabaseTransaction,
        new: NewTransaction,
    ) -> ResultEngine<LedgerReceipt> {
        let NewTransaction {
            account_id,
            user_id,
            kind,
            amount,
            description,
            category_id,
            due_date,
            recurrence,
        } = new;

        self.require_account_write(db_tx, &account_id, &user_id)
            .await?;
        let pct = match kind {
            TransactionKind::Income => self.reserve_percentage(db_tx, &account_id).await?,
            TransactionKind::FixedExpense | TransactionKind::VariableExpense => {
                self.settings.default_reserve_percentage
            }
        };

        let (status, delta) = allocation::creation(kind, amount, pct);
        let balances = self
            .apply_delta(db_tx, &account_id, delta, delta.required_available())
            .await?;

        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id,
            category_id: normalize_optional_text(category_id.as_deref()),
            kind,
            amount,
            description: normalize_required_text(&description, "description")?,
            due_date,
            executed_at: (status == TransactionStatus::Executed).then_some(now),
            status,
            recurrence,
            created_by: user_id,
            created_at: now,
            updated_at: now,
        };
        transactions::ActiveModel::from(&tx).insert(db_tx).await?;
        self.append_history(
            db_tx,
            &tx.account_id,
            tx.id,
            balances,
            ChangeReason::for_creation(kind),
        )
        .await?;

        let breakdown =
            (kind == TransactionKind::Income).then(|| allocation::split_income(amount, pct));
        Ok(LedgerReceipt {
            transaction: tx,
            balances,
            breakdown,
        })
    }
}
