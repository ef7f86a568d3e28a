//! The `Account` owns the four balance fields moved by the ledger.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, MoneyCents};

/// Balance fields of an account at one point in time.
///
/// `total == available + locked + emergency_reserve` must hold after every
/// ledger mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub total: MoneyCents,
    pub available: MoneyCents,
    pub locked: MoneyCents,
    pub emergency_reserve: MoneyCents,
}

impl Balances {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.total == self.available + self.locked + self.emergency_reserve
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub currency: Currency,
    pub balances: Balances,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: String, user_id: &str, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            user_id: user_id.to_string(),
            currency,
            balances: Balances::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub currency: String,
    pub total_balance: i64,
    pub available_balance: i64,
    pub locked_balance: i64,
    pub emergency_reserve: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    #[must_use]
    pub fn balances(&self) -> Balances {
        Balances {
            total: MoneyCents::new(self.total_balance),
            available: MoneyCents::new(self.available_balance),
            locked: MoneyCents::new(self.locked_balance),
            emergency_reserve: MoneyCents::new(self.emergency_reserve),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
    #[sea_orm(has_many = "super::account_members::Entity")]
    Members,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::account_members::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::Set(account.id.clone()),
            user_id: ActiveValue::Set(account.user_id.clone()),
            name: ActiveValue::Set(account.name.clone()),
            currency: ActiveValue::Set(account.currency.code().to_string()),
            total_balance: ActiveValue::Set(account.balances.total.cents()),
            available_balance: ActiveValue::Set(account.balances.available.cents()),
            locked_balance: ActiveValue::Set(account.balances.locked.cents()),
            emergency_reserve: ActiveValue::Set(account.balances.emergency_reserve.cents()),
            created_at: ActiveValue::Set(account.created_at),
            updated_at: ActiveValue::Set(account.updated_at),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let balances = model.balances();
        Ok(Self {
            currency: Currency::try_from(model.currency.as_str())?,
            id: model.id,
            user_id: model.user_id,
            name: model.name,
            balances,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
