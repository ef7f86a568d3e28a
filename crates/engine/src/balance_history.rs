//! Append-only balance snapshots.
//!
//! One row is written after every create, lock and pay. Rows are never
//! updated or deleted, and `transaction_id` survives the deletion of the
//! transaction it points to.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Balances, EngineError, MoneyCents, TransactionKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    IncomeReceived,
    ExpenseLocked,
    ExpensePaid,
    FixedExpensePaid,
}

impl ChangeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncomeReceived => "income_received",
            Self::ExpenseLocked => "expense_locked",
            Self::ExpensePaid => "expense_paid",
            Self::FixedExpensePaid => "fixed_expense_paid",
        }
    }

    /// Reason recorded when a transaction of `kind` is created.
    #[must_use]
    pub fn for_creation(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Income => Self::IncomeReceived,
            TransactionKind::FixedExpense => Self::ExpenseLocked,
            TransactionKind::VariableExpense => Self::ExpensePaid,
        }
    }
}

impl TryFrom<&str> for ChangeReason {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income_received" => Ok(Self::IncomeReceived),
            "expense_locked" => Ok(Self::ExpenseLocked),
            "expense_paid" => Ok(Self::ExpensePaid),
            "fixed_expense_paid" => Ok(Self::FixedExpensePaid),
            other => Err(EngineError::Validation(format!("invalid change reason: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub id: Uuid,
    pub account_id: String,
    pub transaction_id: Uuid,
    pub balances: Balances,
    pub change_reason: ChangeReason,
    pub recorded_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn new(
        account_id: String,
        transaction_id: Uuid,
        balances: Balances,
        change_reason: ChangeReason,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            transaction_id,
            balances,
            change_reason,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "balance_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub transaction_id: String,
    pub total_balance: i64,
    pub available_balance: i64,
    pub locked_balance: i64,
    pub emergency_reserve: i64,
    pub change_reason: String,
    pub recorded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Accounts,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&BalanceSnapshot> for ActiveModel {
    fn from(snapshot: &BalanceSnapshot) -> Self {
        Self {
            id: ActiveValue::Set(snapshot.id.to_string()),
            account_id: ActiveValue::Set(snapshot.account_id.clone()),
            transaction_id: ActiveValue::Set(snapshot.transaction_id.to_string()),
            total_balance: ActiveValue::Set(snapshot.balances.total.cents()),
            available_balance: ActiveValue::Set(snapshot.balances.available.cents()),
            locked_balance: ActiveValue::Set(snapshot.balances.locked.cents()),
            emergency_reserve: ActiveValue::Set(snapshot.balances.emergency_reserve.cents()),
            change_reason: ActiveValue::Set(snapshot.change_reason.as_str().to_string()),
            recorded_at: ActiveValue::Set(snapshot.recorded_at),
        }
    }
}

impl TryFrom<Model> for BalanceSnapshot {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let parse_id = |value: &str| {
            Uuid::parse_str(value)
                .map_err(|_| EngineError::NotFound(format!("invalid snapshot reference: {value}")))
        };
        Ok(Self {
            id: parse_id(&model.id)?,
            transaction_id: parse_id(&model.transaction_id)?,
            account_id: model.account_id,
            balances: Balances {
                total: MoneyCents::new(model.total_balance),
                available: MoneyCents::new(model.available_balance),
                locked: MoneyCents::new(model.locked_balance),
                emergency_reserve: MoneyCents::new(model.emergency_reserve),
            },
            change_reason: ChangeReason::try_from(model.change_reason.as_str())?,
            recorded_at: model.recorded_at,
        })
    }
}
