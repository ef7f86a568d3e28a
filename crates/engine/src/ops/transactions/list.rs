use sea_orm::{
    DatabaseTransaction, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    prelude::*,
};
use uuid::Uuid;

use crate::{CacheCoordinator, ListTransactionsCmd, ResultEngine, Transaction, transactions};

use super::super::{Engine, with_tx};
use super::{Pagination, TransactionPage};

trait ApplyListFilters: QueryFilter + Sized {
    fn apply_list_filters(self, cmd: &ListTransactionsCmd) -> Self;
}

impl<T> ApplyListFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_list_filters(mut self, cmd: &ListTransactionsCmd) -> Self {
        if let Some(kind) = cmd.kind {
            self = self.filter(transactions::Column::Kind.eq(kind.as_str()));
        }
        if !cmd.statuses.is_empty() {
            let statuses: Vec<&str> = cmd.statuses.iter().map(|s| s.as_str()).collect();
            self = self.filter(transactions::Column::Status.is_in(statuses));
        }
        if let Some(category_id) = &cmd.category_id {
            self = self.filter(transactions::Column::CategoryId.eq(category_id.clone()));
        }
        if let Some(from) = cmd.due_from {
            self = self.filter(transactions::Column::DueDate.gte(from));
        }
        if let Some(to) = cmd.due_to {
            self = self.filter(transactions::Column::DueDate.lte(to));
        }
        self
    }
}

impl Engine {
    /// Returns one transaction the user can read.
    pub async fn transaction(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            let (model, _) = self
                .require_transaction(&db_tx, transaction_id, user_id)
                .await?;
            Transaction::try_from(model)
        })
    }

    /// Lists transactions, newest due date first.
    ///
    /// Without an account filter every account the user can see is included.
    /// Account-scoped pages are served from cache after the access check.
    pub async fn list_transactions(&self, cmd: ListTransactionsCmd) -> ResultEngine<TransactionPage> {
        cmd.validate()?;
        let cache_key = cmd
            .account_id
            .as_deref()
            .map(|account_id| {
                (
                    account_id,
                    self.cache.generation(account_id),
                    CacheCoordinator::transactions_key(account_id, &cmd.signature()),
                )
            });

        let (page, cached) = with_tx!(self, |db_tx| {
            let account_ids = match &cmd.account_id {
                Some(account_id) => {
                    self.require_account(&db_tx, account_id, &cmd.user_id)
                        .await?;
                    vec![account_id.clone()]
                }
                None => self.accessible_account_ids(&db_tx, &cmd.user_id).await?,
            };

            let hit = match &cache_key {
                Some((_, _, key)) => self.cache.fetch::<TransactionPage>(key).await,
                None => None,
            };
            match hit {
                Some(page) => Ok((page, true)),
                None => self
                    .query_transactions(&db_tx, account_ids, &cmd)
                    .await
                    .map(|page| (page, false)),
            }
        })?;

        if let (Some((account_id, generation, key)), false) = (&cache_key, cached) {
            self.cache
                .store_for_account(
                    account_id,
                    *generation,
                    key,
                    &page,
                    self.cache.ttls().transactions,
                )
                .await;
        }
        Ok(page)
    }

    async fn query_transactions(
        &self,
        db_tx: &DatabaseTransaction,
        account_ids: Vec<String>,
        cmd: &ListTransactionsCmd,
    ) -> ResultEngine<TransactionPage> {
        let pagination = |total_items: u64| Pagination {
            current_page: cmd.page,
            total_pages: total_items.div_ceil(cmd.limit),
            total_items,
            items_per_page: cmd.limit,
        };
        if account_ids.is_empty() {
            return Ok(TransactionPage {
                transactions: Vec::new(),
                pagination: pagination(0),
            });
        }

        let query = transactions::Entity::find()
            .filter(transactions::Column::AccountId.is_in(account_ids))
            .apply_list_filters(cmd);
        let total_items = query.clone().count(db_tx).await?;
        let models = query
            .order_by_desc(transactions::Column::DueDate)
            .order_by_desc(transactions::Column::CreatedAt)
            .offset(cmd.offset()?)
            .limit(cmd.limit)
            .all(db_tx)
            .await?;
        let transactions = models
            .into_iter()
            .map(Transaction::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;

        Ok(TransactionPage {
            transactions,
            pagination: pagination(total_items),
        })
    }
}
