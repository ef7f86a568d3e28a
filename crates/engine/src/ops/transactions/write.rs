use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseTransaction, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Balances, ChangeReason, EngineError, FixedExpenseCmd, IncomeCmd, MoneyCents, Recurrence,
    ResultEngine, Transaction, TransactionKind, TransactionStatus, UpdateTransactionCmd,
    VariableExpenseCmd, allocation, transactions,
};

use super::super::{Engine, normalize_optional_text, normalize_required_text, with_tx};
use super::{LedgerReceipt, NewTransaction};

impl Engine {
    /// Records an income, splitting it between reserve and available funds.
    pub async fn process_income(&self, cmd: IncomeCmd) -> ResultEngine<LedgerReceipt> {
        cmd.validate()?;
        let receipt = with_tx!(self, |db_tx| {
            self.create_transaction_in(&db_tx, NewTransaction::from(cmd))
                .await
        })?;
        self.after_balance_change(&receipt, "income recorded").await;
        Ok(receipt)
    }

    /// Locks `amount` of the available balance for a future fixed expense.
    ///
    /// `total` is untouched until the expense is paid.
    pub async fn create_fixed_expense(&self, cmd: FixedExpenseCmd) -> ResultEngine<LedgerReceipt> {
        cmd.validate(Utc::now().date_naive())?;
        let receipt = with_tx!(self, |db_tx| {
            self.create_transaction_in(&db_tx, NewTransaction::from(cmd))
                .await
        })?;
        self.after_balance_change(&receipt, "fixed expense locked")
            .await;
        Ok(receipt)
    }

    /// Debits a variable expense from `total` and `available` immediately.
    pub async fn create_variable_expense(
        &self,
        cmd: VariableExpenseCmd,
    ) -> ResultEngine<LedgerReceipt> {
        cmd.validate()?;
        let receipt = with_tx!(self, |db_tx| {
            self.create_transaction_in(&db_tx, NewTransaction::from(cmd))
                .await
        })?;
        self.after_balance_change(&receipt, "variable expense paid")
            .await;
        Ok(receipt)
    }

    /// Moves a locked fixed expense out of `locked` and `total`.
    pub async fn mark_fixed_expense_paid(
        &self,
        transaction_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<LedgerReceipt> {
        let receipt = with_tx!(self, |db_tx| {
            let model = self
                .require_transaction_write(&db_tx, transaction_id, user_id)
                .await?;
            let mut tx = Transaction::try_from(model)?;
            if tx.kind != TransactionKind::FixedExpense {
                return Err(EngineError::Validation(
                    "only fixed expenses can be marked as paid".to_string(),
                ));
            }
            if tx.status != TransactionStatus::Locked {
                return Err(EngineError::Validation(format!(
                    "fixed expense is {}, expected locked",
                    tx.status.as_str()
                )));
            }

            let balances = self
                .apply_delta(&db_tx, &tx.account_id, allocation::payment(tx.amount), None)
                .await?;
            let now = Utc::now();
            tx.status = TransactionStatus::Executed;
            tx.executed_at = Some(now);
            tx.updated_at = now;
            transactions::ActiveModel::from(&tx).update(&db_tx).await?;
            self.append_history(
                &db_tx,
                &tx.account_id,
                tx.id,
                balances,
                ChangeReason::FixedExpensePaid,
            )
            .await?;

            Ok(LedgerReceipt {
                transaction: tx,
                balances,
                breakdown: None,
            })
        })?;
        self.after_balance_change(&receipt, "fixed expense paid")
            .await;
        Ok(receipt)
    }

    /// Edits a transaction. A new amount re-applies the difference according
    /// to the current status; other fields never touch balances.
    pub async fn update_transaction(&self, cmd: UpdateTransactionCmd) -> ResultEngine<Transaction> {
        cmd.validate()?;
        let UpdateTransactionCmd {
            transaction_id,
            user_id,
            amount_minor,
            description,
            category_id,
            due_date,
        } = cmd;

        let (tx, amount_changed) = with_tx!(self, |db_tx| {
            let model = self
                .require_transaction_write(&db_tx, transaction_id, &user_id)
                .await?;
            let mut tx = Transaction::try_from(model)?;

            let new_amount = amount_minor
                .map(MoneyCents::new)
                .filter(|amount| *amount != tx.amount);
            if let Some(new_amount) = new_amount {
                let delta = allocation::amount_change(
                    tx.kind,
                    tx.status,
                    tx.amount,
                    new_amount,
                    self.settings.default_reserve_percentage,
                );
                self.apply_delta(&db_tx, &tx.account_id, delta, None)
                    .await?;
                tx.amount = new_amount;
            }
            if let Some(description) = description.as_deref() {
                tx.description = normalize_required_text(description, "description")?;
            }
            if category_id.is_some() {
                tx.category_id = normalize_optional_text(category_id.as_deref());
            }
            if let Some(due_date) = due_date {
                tx.due_date = due_date;
            }
            tx.updated_at = Utc::now();
            transactions::ActiveModel::from(&tx).update(&db_tx).await?;

            Ok((tx, new_amount.is_some()))
        })?;

        if amount_changed {
            self.cache.balances_changed(&tx.account_id).await;
        } else {
            self.cache
                .invalidate_transaction_pages(&tx.account_id)
                .await;
        }
        tracing::debug!(
            account_id = %tx.account_id,
            transaction_id = %tx.id,
            amount_changed,
            "transaction updated"
        );
        Ok(tx)
    }

    /// Creates a copy of a categorized transaction through the regular
    /// creation path, due now.
    pub async fn duplicate_transaction(
        &self,
        transaction_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<LedgerReceipt> {
        let receipt = with_tx!(self, |db_tx| {
            let (model, _) = self
                .require_transaction(&db_tx, transaction_id, user_id)
                .await?;
            let source = Transaction::try_from(model)?;
            let Some(category_id) = source.category_id.clone() else {
                return Err(EngineError::Validation(
                    "cannot duplicate a transaction without category".to_string(),
                ));
            };
            let recurrence = match source.kind {
                TransactionKind::Income | TransactionKind::FixedExpense => source.recurrence,
                TransactionKind::VariableExpense => Recurrence::default(),
            };
            let copy = NewTransaction {
                account_id: source.account_id,
                user_id: user_id.to_string(),
                kind: source.kind,
                amount: source.amount,
                description: format!("{} (copy)", source.description),
                category_id: Some(category_id),
                due_date: Utc::now(),
                recurrence,
            };
            self.create_transaction_in(&db_tx, copy).await
        })?;
        self.after_balance_change(&receipt, "transaction duplicated")
            .await;
        Ok(receipt)
    }

    /// Reverses the transaction's balance effect and removes the row.
    ///
    /// No history snapshot is written for a deletion.
    pub async fn delete_transaction(
        &self,
        transaction_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<Balances> {
        let (account_id, balances) = with_tx!(self, |db_tx| {
            let model = self
                .require_transaction_write(&db_tx, transaction_id, user_id)
                .await?;
            let tx = Transaction::try_from(model)?;
            let balances = self.reverse_and_remove(&db_tx, &tx).await?;
            Ok((tx.account_id, balances))
        })?;

        self.cache.balances_changed(&account_id).await;
        tracing::debug!(%account_id, %transaction_id, "transaction deleted");
        Ok(balances)
    }

    async fn reverse_and_remove(
        &self,
        db_tx: &DatabaseTransaction,
        tx: &Transaction,
    ) -> ResultEngine<Balances> {
        let delta = allocation::reversal(
            tx.kind,
            tx.status,
            tx.amount,
            self.settings.default_reserve_percentage,
        );
        let balances = self
            .apply_delta(db_tx, &tx.account_id, delta, None)
            .await?;
        transactions::Entity::delete_by_id(tx.id.to_string())
            .exec(db_tx)
            .await?;
        Ok(balances)
    }

    async fn after_balance_change(&self, receipt: &LedgerReceipt, message: &str) {
        let tx = &receipt.transaction;
        self.cache.balances_changed(&tx.account_id).await;
        tracing::debug!(
            account_id = %tx.account_id,
            transaction_id = %tx.id,
            kind = tx.kind.as_str(),
            amount = tx.amount.cents(),
            "{message}"
        );
    }
}

impl From<IncomeCmd> for NewTransaction {
    fn from(cmd: IncomeCmd) -> Self {
        Self {
            account_id: cmd.account_id,
            user_id: cmd.user_id,
            kind: TransactionKind::Income,
            amount: MoneyCents::new(cmd.amount_minor),
            description: cmd.description,
            category_id: cmd.category_id,
            due_date: cmd.due_date.unwrap_or_else(Utc::now),
            recurrence: cmd.recurrence,
        }
    }
}

impl From<FixedExpenseCmd> for NewTransaction {
    fn from(cmd: FixedExpenseCmd) -> Self {
        Self {
            account_id: cmd.account_id,
            user_id: cmd.user_id,
            kind: TransactionKind::FixedExpense,
            amount: MoneyCents::new(cmd.amount_minor),
            description: cmd.description,
            category_id: cmd.category_id,
            due_date: cmd.due_date,
            recurrence: cmd.recurrence,
        }
    }
}

impl From<VariableExpenseCmd> for NewTransaction {
    fn from(cmd: VariableExpenseCmd) -> Self {
        Self {
            account_id: cmd.account_id,
            user_id: cmd.user_id,
            kind: TransactionKind::VariableExpense,
            amount: MoneyCents::new(cmd.amount_minor),
            description: cmd.description,
            category_id: cmd.category_id,
            due_date: Utc::now(),
            recurrence: Recurrence::default(),
        }
    }
}
