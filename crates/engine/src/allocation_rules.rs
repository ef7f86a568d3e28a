//! Per-account allocation rules.
//!
//! Only `emergency_reserve` rules are consumed by the ledger: the active one
//! with the lowest `priority` decides how income is split.

use sea_orm::entity::prelude::*;

pub const EMERGENCY_RESERVE: &str = "emergency_reserve";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "allocation_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub rule_type: String,
    /// Basis points, 3000 = 30%.
    pub percentage_bps: i64,
    pub priority: i32,
    pub is_active: bool,
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
