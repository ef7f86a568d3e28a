//! Transaction primitives.
//!
//! A `Transaction` is one money-movement intent recorded against an account.
//! Its `kind` and `status` decide how it moves the account balances (see
//! [`crate::allocation`]).

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    FixedExpense,
    VariableExpense,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::FixedExpense => "fixed_expense",
            Self::VariableExpense => "variable_expense",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "fixed_expense" => Ok(Self::FixedExpense),
            "variable_expense" => Ok(Self::VariableExpense),
            other => Err(EngineError::Validation(format!("invalid transaction kind: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Locked,
    Executed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Locked => "locked",
            Self::Executed => "executed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<&str> for TransactionStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "locked" => Ok(Self::Locked),
            "executed" => Ok(Self::Executed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!("invalid transaction status: {other}"))),
        }
    }
}

/// How often a transaction is expected to repeat. Descriptive only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrencePattern {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl TryFrom<&str> for RecurrencePattern {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(EngineError::Validation(format!("invalid recurrence pattern: {other}"))),
        }
    }
}

/// Recurrence flags carried by income and fixed expenses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub is_recurring: bool,
    pub pattern: Option<RecurrencePattern>,
}

impl Recurrence {
    #[must_use]
    pub fn every(pattern: RecurrencePattern) -> Self {
        Self {
            is_recurring: true,
            pattern: Some(pattern),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: String,
    pub category_id: Option<String>,
    pub kind: TransactionKind,
    pub amount: MoneyCents,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    pub recurrence: Recurrence,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub category_id: Option<String>,
    pub kind: String,
    pub amount_minor: i64,
    pub description: String,
    pub due_date: DateTimeUtc,
    pub executed_at: Option<DateTimeUtc>,
    pub status: String,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<String>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
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

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            account_id: ActiveValue::Set(tx.account_id.clone()),
            category_id: ActiveValue::Set(tx.category_id.clone()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(tx.amount.cents()),
            description: ActiveValue::Set(tx.description.clone()),
            due_date: ActiveValue::Set(tx.due_date),
            executed_at: ActiveValue::Set(tx.executed_at),
            status: ActiveValue::Set(tx.status.as_str().to_string()),
            is_recurring: ActiveValue::Set(tx.recurrence.is_recurring),
            recurrence_pattern: ActiveValue::Set(
                tx.recurrence.pattern.map(|p| p.as_str().to_string()),
            ),
            created_by: ActiveValue::Set(tx.created_by.clone()),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::NotFound("transaction not exists".to_string()))?,
            account_id: model.account_id,
            category_id: model.category_id,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            amount: MoneyCents::new(model.amount_minor),
            description: model.description,
            due_date: model.due_date,
            executed_at: model.executed_at,
            status: TransactionStatus::try_from(model.status.as_str())?,
            recurrence: Recurrence {
                is_recurring: model.is_recurring,
                pattern: model
                    .recurrence_pattern
                    .as_deref()
                    .map(RecurrencePattern::try_from)
                    .transpose()?,
            },
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
