//! Read-side figures derived from the ledger: the daily spending limit, how
//! today compares to it and the per-day spending history.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::{
    CacheCoordinator, EngineError, MoneyCents, ResultEngine, TransactionKind, TransactionStatus,
    accounts, balance_history, transactions,
};

use super::{Engine, with_tx};

pub const MAX_HISTORY_DAYS: u32 = 30;
const WARNING_PERCENTAGE: Decimal = dec!(80);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStatus {
    Ok,
    Warning,
    Exceeded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLimitStatus {
    pub daily_limit: MoneyCents,
    pub spent_today: MoneyCents,
    pub remaining: MoneyCents,
    /// Capped at 100.
    pub percentage_used: Decimal,
    pub exceeded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySpending {
    pub date: NaiveDate,
    pub spent: MoneyCents,
    pub daily_limit: MoneyCents,
    pub percentage_used: Decimal,
    pub exceeded: bool,
    pub status: LimitStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingHistory {
    /// Newest day first; days without spending are omitted.
    pub days: Vec<DaySpending>,
    pub total_spent: MoneyCents,
    pub average_daily_spent: MoneyCents,
    pub days_with_spending: u32,
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// `spent / limit * 100` to two decimals, 0 when there is no limit.
fn percentage_of(spent: MoneyCents, limit: MoneyCents) -> Decimal {
    if !limit.is_positive() {
        return Decimal::ZERO;
    }
    (Decimal::from(spent.cents()) * Decimal::ONE_HUNDRED / Decimal::from(limit.cents()))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl Engine {
    /// `max(0, available) / window_days`, floored to whole minor units.
    fn limit_from_available(&self, available: MoneyCents) -> MoneyCents {
        let window = i64::from(self.settings.daily_limit_window_days);
        MoneyCents::new(available.cents().max(0) / window)
    }

    /// Safe amount to spend per day. Served from cache when present.
    pub async fn daily_limit(&self, account_id: &str, user_id: &str) -> ResultEngine<MoneyCents> {
        let key = CacheCoordinator::daily_limit_key(account_id);
        let generation = self.cache.generation(account_id);
        let (limit, cached) = with_tx!(self, |db_tx| {
            let (model, _) = self.require_account(&db_tx, account_id, user_id).await?;
            match self.cache.fetch::<MoneyCents>(&key).await {
                Some(limit) => Ok((limit, true)),
                None => Ok((self.limit_from_available(model.balances().available), false)),
            }
        })?;
        if !cached {
            self.cache
                .store_for_account(
                    account_id,
                    generation,
                    &key,
                    &limit,
                    self.cache.ttls().daily_limit,
                )
                .await;
        }
        Ok(limit)
    }

    /// Drops the cached daily limit and computes it again.
    pub async fn recalculate_daily_limit(
        &self,
        account_id: &str,
        user_id: &str,
    ) -> ResultEngine<MoneyCents> {
        with_tx!(self, |db_tx| {
            self.require_account(&db_tx, account_id, user_id)
                .await
                .map(|_| ())
        })?;
        self.cache.invalidate_daily_limit(account_id).await;
        self.daily_limit(account_id, user_id).await
    }

    /// Today's variable spending against the daily limit.
    pub async fn daily_limit_status(
        &self,
        account_id: &str,
        user_id: &str,
    ) -> ResultEngine<DailyLimitStatus> {
        let daily_limit = self.daily_limit(account_id, user_id).await?;
        let today = Utc::now().date_naive();
        let spent_today = with_tx!(self, |db_tx| {
            let spent = self
                .variable_spending(
                    &db_tx,
                    account_id,
                    day_start(today),
                    day_start(today + Duration::days(1)),
                )
                .await?;
            Ok(spent.into_iter().map(|(_, amount)| amount).sum::<i64>())
        })?;
        let spent_today = MoneyCents::new(spent_today);
        let remaining = daily_limit - spent_today;

        Ok(DailyLimitStatus {
            daily_limit,
            spent_today,
            remaining: remaining.max(MoneyCents::ZERO),
            percentage_used: percentage_of(spent_today, daily_limit).min(Decimal::ONE_HUNDRED),
            exceeded: spent_today > daily_limit,
        })
    }

    /// Per-day executed variable spending over the last `days` days plus today,
    /// each day compared with the limit in force when it began.
    pub async fn spending_history(
        &self,
        account_id: &str,
        user_id: &str,
        days: u32,
    ) -> ResultEngine<SpendingHistory> {
        if days == 0 || days > MAX_HISTORY_DAYS {
            return Err(EngineError::Validation(format!(
                "days must be between 1 and {MAX_HISTORY_DAYS}"
            )));
        }
        let key = CacheCoordinator::spending_history_key(account_id, days);
        let generation = self.cache.generation(account_id);
        let (history, cached) = with_tx!(self, |db_tx| {
            let (model, _) = self.require_account(&db_tx, account_id, user_id).await?;
            match self.cache.fetch::<SpendingHistory>(&key).await {
                Some(history) => Ok((history, true)),
                None => self
                    .build_spending_history(&db_tx, &model, days)
                    .await
                    .map(|history| (history, false)),
            }
        })?;
        if !cached {
            self.cache
                .store_for_account(
                    account_id,
                    generation,
                    &key,
                    &history,
                    self.cache.ttls().spending_history,
                )
                .await;
        }
        Ok(history)
    }

    async fn build_spending_history(
        &self,
        db_tx: &DatabaseTransaction,
        account: &accounts::Model,
        days: u32,
    ) -> ResultEngine<SpendingHistory> {
        let today = Utc::now().date_naive();
        let start = day_start(today - Duration::days(i64::from(days)));
        let end = day_start(today + Duration::days(1));

        let mut per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for (executed_at, amount) in self
            .variable_spending(db_tx, &account.id, start, end)
            .await?
        {
            *per_day.entry(executed_at.date_naive()).or_default() += amount;
        }

        let current_limit = self.limit_from_available(account.balances().available);
        let mut history = Vec::with_capacity(per_day.len());
        for (date, spent) in per_day.into_iter().rev() {
            let daily_limit = self
                .limit_before(db_tx, &account.id, day_start(date))
                .await?
                .unwrap_or(current_limit);
            let spent = MoneyCents::new(spent);
            let percentage_used = percentage_of(spent, daily_limit);
            let exceeded = spent > daily_limit;
            let status = if exceeded {
                LimitStatus::Exceeded
            } else if percentage_used >= WARNING_PERCENTAGE {
                LimitStatus::Warning
            } else {
                LimitStatus::Ok
            };
            history.push(DaySpending {
                date,
                spent,
                daily_limit,
                percentage_used,
                exceeded,
                status,
            });
        }

        let total_spent: i64 = history.iter().map(|day| day.spent.cents()).sum();
        let days_with_spending = u32::try_from(history.len()).unwrap_or(u32::MAX);
        let average_daily_spent = if days_with_spending == 0 {
            0
        } else {
            total_spent / i64::from(days_with_spending)
        };
        Ok(SpendingHistory {
            days: history,
            total_spent: MoneyCents::new(total_spent),
            average_daily_spent: MoneyCents::new(average_daily_spent),
            days_with_spending,
        })
    }

    /// Daily limit derived from the latest snapshot recorded before `at`.
    async fn limit_before(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: &str,
        at: DateTime<Utc>,
    ) -> ResultEngine<Option<MoneyCents>> {
        let snapshot = balance_history::Entity::find()
            .filter(balance_history::Column::AccountId.eq(account_id.to_string()))
            .filter(balance_history::Column::RecordedAt.lt(at))
            .order_by_desc(balance_history::Column::RecordedAt)
            .one(db_tx)
            .await?;
        Ok(snapshot.map(|s| self.limit_from_available(MoneyCents::new(s.available_balance))))
    }

    /// `(executed_at, amount)` of executed variable expenses in `[from, to)`.
    async fn variable_spending(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ResultEngine<Vec<(DateTime<Utc>, i64)>> {
        transactions::Entity::find()
            .select_only()
            .column(transactions::Column::ExecutedAt)
            .column(transactions::Column::AmountMinor)
            .filter(transactions::Column::AccountId.eq(account_id.to_string()))
            .filter(transactions::Column::Kind.eq(TransactionKind::VariableExpense.as_str()))
            .filter(transactions::Column::Status.eq(TransactionStatus::Executed.as_str()))
            .filter(transactions::Column::ExecutedAt.gte(from))
            .filter(transactions::Column::ExecutedAt.lt(to))
            .into_tuple()
            .all(db_tx)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_zero_without_limit() {
        assert_eq!(
            percentage_of(MoneyCents::new(500), MoneyCents::ZERO),
            Decimal::ZERO
        );
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        // 1 / 3 = 33.333..%
        assert_eq!(
            percentage_of(MoneyCents::new(1), MoneyCents::new(3)).to_string(),
            "33.33"
        );
        assert_eq!(WARNING_PERCENTAGE, Decimal::from(80));
    }
}
