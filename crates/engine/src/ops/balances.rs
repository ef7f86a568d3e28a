use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    BalanceDelta, BalanceSnapshot, Balances, ChangeReason, EngineError, MoneyCents, ResultEngine,
    accounts, balance_history,
};

use super::{Engine, with_tx};

impl Engine {
    /// Applies `delta` to the account row with one `UPDATE ... SET col = col + ?`.
    ///
    /// With `required_available` set, the update only matches when
    /// `available_balance >= required_available`; no match is
    /// `InsufficientBalance` and nothing is written.
    pub(super) async fn apply_delta(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
        delta: BalanceDelta,
        required_available: Option<MoneyCents>,
    ) -> ResultEngine<Balances> {
        debug_assert!(delta.is_balanced(), "unbalanced delta: {delta:?}");

        if !delta.is_zero() {
            let mut update = accounts::Entity::update_many()
                .col_expr(
                    accounts::Column::TotalBalance,
                    Expr::col(accounts::Column::TotalBalance).add(delta.total.cents()),
                )
                .col_expr(
                    accounts::Column::AvailableBalance,
                    Expr::col(accounts::Column::AvailableBalance).add(delta.available.cents()),
                )
                .col_expr(
                    accounts::Column::LockedBalance,
                    Expr::col(accounts::Column::LockedBalance).add(delta.locked.cents()),
                )
                .col_expr(
                    accounts::Column::EmergencyReserve,
                    Expr::col(accounts::Column::EmergencyReserve)
                        .add(delta.emergency_reserve.cents()),
                )
                .col_expr(accounts::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(accounts::Column::Id.eq(account_id.to_string()));
            if let Some(required) = required_available {
                update = update.filter(accounts::Column::AvailableBalance.gte(required.cents()));
            }

            let result = update.exec(db).await?;
            if result.rows_affected == 0 {
                return Err(match required_available {
                    Some(required) => EngineError::InsufficientBalance(format!(
                        "available balance is lower than {required}"
                    )),
                    None => EngineError::NotFound("account not exists".to_string()),
                });
            }
        }

        let model = accounts::Entity::find_by_id(account_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("account not exists".to_string()))?;
        Ok(model.balances())
    }

    /// Appends one immutable snapshot to the history log.
    pub(super) async fn append_history(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
        transaction_id: Uuid,
        balances: Balances,
        reason: ChangeReason,
    ) -> ResultEngine<BalanceSnapshot> {
        let snapshot =
            BalanceSnapshot::new(account_id.to_string(), transaction_id, balances, reason);
        balance_history::ActiveModel::from(&snapshot)
            .insert(db)
            .await?;
        Ok(snapshot)
    }

    /// Returns the account's snapshots, newest first.
    pub async fn balance_history(
        &self,
        account_id: &str,
        user_id: &str,
        limit: u64,
    ) -> ResultEngine<Vec<BalanceSnapshot>> {
        with_tx!(self, |db_tx| {
            self.require_account(&db_tx, account_id, user_id).await?;
            let models = balance_history::Entity::find()
                .filter(balance_history::Column::AccountId.eq(account_id.to_string()))
                .order_by_desc(balance_history::Column::RecordedAt)
                .order_by_desc(balance_history::Column::Id)
                .limit(limit)
                .all(&db_tx)
                .await?;
            models
                .into_iter()
                .map(BalanceSnapshot::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Snapshots written by `transaction_id`, oldest first.
    ///
    /// Still answers after the transaction itself was deleted.
    pub async fn balances_after(
        &self,
        user_id: &str,
        transaction_id: Uuid,
    ) -> ResultEngine<Vec<BalanceSnapshot>> {
        with_tx!(self, |db_tx| {
            let models = balance_history::Entity::find()
                .filter(balance_history::Column::TransactionId.eq(transaction_id.to_string()))
                .order_by_asc(balance_history::Column::RecordedAt)
                .all(&db_tx)
                .await?;
            let Some(first) = models.first() else {
                return Err(EngineError::NotFound("no balance history for transaction".to_string()));
            };
            self.require_account(&db_tx, &first.account_id, user_id)
                .await?;
            models
                .into_iter()
                .map(BalanceSnapshot::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}
