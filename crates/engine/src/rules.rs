//! Reserve percentage lookup.

use std::fmt::Debug;

use async_trait::async_trait;
use sea_orm::{DatabaseTransaction, QueryOrder, prelude::*};

use crate::{ReservePercentage, ResultEngine, allocation_rules};

#[async_trait]
pub trait RuleResolver: Send + Sync + Debug {
    /// Active reserve percentage of the account, `None` when no rule applies.
    async fn reserve_percentage(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
    ) -> ResultEngine<Option<ReservePercentage>>;
}

/// Picks the active `emergency_reserve` rule with the lowest priority.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActiveRuleResolver;

#[async_trait]
impl RuleResolver for ActiveRuleResolver {
    async fn reserve_percentage(
        &self,
        db: &DatabaseTransaction,
        account_id: &str,
    ) -> ResultEngine<Option<ReservePercentage>> {
        let rule = allocation_rules::Entity::find()
            .filter(allocation_rules::Column::AccountId.eq(account_id.to_string()))
            .filter(allocation_rules::Column::RuleType.eq(allocation_rules::EMERGENCY_RESERVE))
            .filter(allocation_rules::Column::IsActive.eq(true))
            .order_by_asc(allocation_rules::Column::Priority)
            .one(db)
            .await?;
        rule.map(|r| ReservePercentage::from_bps(r.percentage_bps))
            .transpose()
    }
}
