use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, PaginatorTrait, QueryFilter, TransactionTrait, prelude::*,
    sea_query::OnConflict,
};
use uuid::Uuid;

use crate::{
    Account, AccountRole, Currency, EngineError, ResultEngine, account_members, accounts,
    allocation_rules, balance_history, transactions, users,
};

use super::{Engine, normalize_required_text, with_tx};

impl Engine {
    /// Registers a new user.
    pub async fn new_user(&self, username: &str) -> ResultEngine<()> {
        let username = normalize_required_text(username, "username")?;
        with_tx!(self, |db_tx| {
            let exists = users::Entity::find_by_id(username.clone())
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::Validation(format!("user {username} already exists")));
            }
            users::ActiveModel {
                username: ActiveValue::Set(username.clone()),
                created_at: ActiveValue::Set(Utc::now()),
            }
            .insert(&db_tx)
            .await?;
            Ok(())
        })?;
        tracing::debug!(%username, "user created");
        Ok(())
    }

    /// Opens a zero-balance account owned by `user_id`, with the default
    /// reserve rule and the owner membership.
    pub async fn new_account(
        &self,
        user_id: &str,
        name: &str,
        currency: Currency,
    ) -> ResultEngine<Account> {
        let name = normalize_required_text(name, "account name")?;
        let account = with_tx!(self, |db_tx| {
            self.require_user_exists(&db_tx, user_id).await?;

            let account = Account::new(name, user_id, currency);
            accounts::ActiveModel::from(&account).insert(&db_tx).await?;
            allocation_rules::ActiveModel {
                id: ActiveValue::Set(Uuid::new_v4().to_string()),
                account_id: ActiveValue::Set(account.id.clone()),
                rule_type: ActiveValue::Set(allocation_rules::EMERGENCY_RESERVE.to_string()),
                percentage_bps: ActiveValue::Set(
                    self.settings.default_reserve_percentage.to_bps(),
                ),
                priority: ActiveValue::Set(1),
                is_active: ActiveValue::Set(true),
            }
            .insert(&db_tx)
            .await?;
            account_members::ActiveModel {
                account_id: ActiveValue::Set(account.id.clone()),
                user_id: ActiveValue::Set(user_id.to_string()),
                role: ActiveValue::Set(AccountRole::Owner.as_str().to_string()),
            }
            .insert(&db_tx)
            .await?;
            Ok(account)
        })?;
        tracing::debug!(account_id = %account.id, user_id, "account created");
        Ok(account)
    }

    /// Grants `member_id` access to the account. Owner only.
    pub async fn add_account_member(
        &self,
        account_id: &str,
        owner_id: &str,
        member_id: &str,
        role: AccountRole,
    ) -> ResultEngine<()> {
        if role == AccountRole::Owner {
            return Err(EngineError::Validation("ownership cannot be granted".to_string()));
        }
        with_tx!(self, |db_tx| {
            let account = self
                .require_account_owner(&db_tx, account_id, owner_id)
                .await?;
            if account.user_id == member_id {
                return Err(EngineError::Validation("the owner is already a member".to_string()));
            }
            self.require_user_exists(&db_tx, member_id).await?;

            account_members::Entity::insert(account_members::ActiveModel {
                account_id: ActiveValue::Set(account_id.to_string()),
                user_id: ActiveValue::Set(member_id.to_string()),
                role: ActiveValue::Set(role.as_str().to_string()),
            })
            .on_conflict(
                OnConflict::columns([
                    account_members::Column::AccountId,
                    account_members::Column::UserId,
                ])
                .update_column(account_members::Column::Role)
                .to_owned(),
            )
            .exec(&db_tx)
            .await?;
            Ok(())
        })?;
        tracing::debug!(account_id, member_id, role = role.as_str(), "member added");
        Ok(())
    }

    /// Returns the account with its current balances.
    pub async fn account(&self, account_id: &str, user_id: &str) -> ResultEngine<Account> {
        with_tx!(self, |db_tx| {
            let (model, _) = self.require_account(&db_tx, account_id, user_id).await?;
            Account::try_from(model)
        })
    }

    /// Deletes an empty account. Owner only.
    ///
    /// The account must have no transactions, no balance history and all four
    /// balances at zero. Snapshots are never deleted, so an account that ever
    /// moved money stays.
    pub async fn delete_account(&self, account_id: &str, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let model = self
                .require_account_owner(&db_tx, account_id, user_id)
                .await?;
            let transaction_count = transactions::Entity::find()
                .filter(transactions::Column::AccountId.eq(account_id.to_string()))
                .count(&db_tx)
                .await?;
            if transaction_count > 0 {
                return Err(EngineError::Validation(format!(
                    "account has {transaction_count} transactions"
                )));
            }
            let snapshot_count = balance_history::Entity::find()
                .filter(balance_history::Column::AccountId.eq(account_id.to_string()))
                .count(&db_tx)
                .await?;
            if snapshot_count > 0 {
                return Err(EngineError::Validation(format!(
                    "account has {snapshot_count} balance history entries"
                )));
            }
            if !model.balances().is_zero() {
                return Err(EngineError::Validation("account balances must be zero".to_string()));
            }
            accounts::Entity::delete_by_id(account_id.to_string())
                .exec(&db_tx)
                .await?;
            Ok(())
        })?;
        self.cache.account_removed(account_id).await;
        tracing::debug!(account_id, "account deleted");
        Ok(())
    }
}
