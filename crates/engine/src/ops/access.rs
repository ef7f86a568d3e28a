use sea_orm::{DatabaseTransaction, QueryFilter, QuerySelect, prelude::*};
use uuid::Uuid;

use crate::{
    AccountRole, EngineError, ReservePercentage, ResultEngine, account_members, accounts,
    transactions, users,
};

use super::Engine;

impl Engine {
    async fn find_account_by_id(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
    ) -> ResultEngine<Option<accounts::Model>> {
        accounts::Entity::find_by_id(account_id.to_string())
            .one(db)
            .await
            .map_err(Into::into)
    }

    /// Loads the account and the caller's role on it.
    ///
    /// A missing account is `NotFound`; an existing one the user cannot see is
    /// `Forbidden`.
    pub(super) async fn require_account(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
        user_id: &str,
    ) -> ResultEngine<(accounts::Model, AccountRole)> {
        let model = self
            .find_account_by_id(db, account_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("account not exists".to_string()))?;
        let role = self
            .guard
            .check_access(db, account_id, user_id)
            .await?
            .ok_or_else(|| EngineError::Forbidden("no access to account".to_string()))?;
        Ok((model, role))
    }

    pub(super) async fn require_account_write(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
        user_id: &str,
    ) -> ResultEngine<accounts::Model> {
        let (model, role) = self.require_account(db, account_id, user_id).await?;
        if !role.can_write() {
            return Err(EngineError::Forbidden("read-only access to account".to_string()));
        }
        Ok(model)
    }

    pub(super) async fn require_account_owner(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
        user_id: &str,
    ) -> ResultEngine<accounts::Model> {
        let (model, role) = self.require_account(db, account_id, user_id).await?;
        if role != AccountRole::Owner {
            return Err(EngineError::Forbidden("only the owner can do this".to_string()));
        }
        Ok(model)
    }

    /// Loads a transaction the user can read.
    pub(super) async fn require_transaction(
        &self,
        db: &DatabaseTransaction,
        transaction_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<(transactions::Model, AccountRole)> {
        let model = transactions::Entity::find_by_id(transaction_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::NotFound("transaction not exists".to_string()))?;
        let (_, role) = self
            .require_account(db, &model.account_id, user_id)
            .await?;
        Ok((model, role))
    }

    pub(super) async fn require_transaction_write(
        &self,
        db: &DatabaseTransaction,
        transaction_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<transactions::Model> {
        let (model, role) = self
            .require_transaction(db, transaction_id, user_id)
            .await?;
        if !role.can_write() {
            return Err(EngineError::Forbidden("read-only access to account".to_string()));
        }
        Ok(model)
    }

    pub(super) async fn require_user_exists(
        &self,
        db: &DatabaseTransaction,
        username: &str,
    ) -> ResultEngine<()> {
        let exists = users::Entity::find_by_id(username.to_string())
            .one(db)
            .await?
            .is_some();
        if !exists {
            return Err(EngineError::NotFound("user not exists".to_string()));
        }
        Ok(())
    }

    /// Every account the user owns or is a member of.
    pub(super) async fn accessible_account_ids(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
    ) -> ResultEngine<Vec<String>> {
        let mut ids: Vec<String> = accounts::Entity::find()
            .select_only()
            .column(accounts::Column::Id)
            .filter(accounts::Column::UserId.eq(user_id.to_string()))
            .into_tuple()
            .all(db)
            .await?;
        let shared: Vec<String> = account_members::Entity::find()
            .select_only()
            .column(account_members::Column::AccountId)
            .filter(account_members::Column::UserId.eq(user_id.to_string()))
            .into_tuple()
            .all(db)
            .await?;
        for id in shared {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Reserve percentage applied to a new income on `account_id`.
    pub(super) async fn reserve_percentage(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
    ) -> ResultEngine<ReservePercentage> {
        Ok(self
            .rules
            .reserve_percentage(db, account_id)
            .await?
            .unwrap_or(self.settings.default_reserve_percentage))
    }
}
