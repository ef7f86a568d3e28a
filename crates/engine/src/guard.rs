//! Access checks for accounts.
//!
//! The ledger asks an [`AccessGuard`] which role (if any) a user holds on an
//! account before every read or write. [`MembershipGuard`] answers from the
//! `accounts` and `account_members` tables.

use std::fmt::Debug;

use async_trait::async_trait;
use sea_orm::{DatabaseTransaction, prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine, account_members, accounts};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Owner,
    Member,
    Viewer,
}

impl AccountRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }

    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(self, Self::Owner | Self::Member)
    }
}

impl TryFrom<&str> for AccountRole {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            "viewer" => Ok(Self::Viewer),
            other => Err(EngineError::Validation(format!("invalid account role: {other}"))),
        }
    }
}

#[async_trait]
pub trait AccessGuard: Send + Sync + Debug {
    /// Role of `user_id` on `account_id`, `None` when the user has no access.
    ///
    /// Runs on the caller's storage transaction.
    async fn check_access(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
        user_id: &str,
    ) -> ResultEngine<Option<AccountRole>>;
}

/// The account creator is the owner; everybody else needs a membership row.
#[derive(Clone, Copy, Debug, Default)]
pub struct MembershipGuard;

#[async_trait]
impl AccessGuard for MembershipGuard {
    async fn check_access(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
        user_id: &str,
    ) -> ResultEngine<Option<AccountRole>> {
        let Some(account) = accounts::Entity::find_by_id(account_id.to_string())
            .one(db)
            .await?
        else {
            return Ok(None);
        };
        if account.user_id == user_id {
            return Ok(Some(AccountRole::Owner));
        }
        let row =
            account_members::Entity::find_by_id((account_id.to_string(), user_id.to_string()))
                .one(db)
                .await?;
        row.as_ref()
            .map(|m| AccountRole::try_from(m.role.as_str()))
            .transpose()
    }
}
