//! Ledger schema migration - creates all tables from scratch.
//!
//! - `users`: principals referenced by accounts and memberships
//! - `accounts`: the four balance fields per account
//! - `account_members`: shared access to an account
//! - `allocation_rules`: reserve percentage applied to income
//! - `transactions`: money-movement intents
//! - `balance_history`: append-only balance snapshots

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Username,
    CreatedAt,
}

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    UserId,
    Name,
    Currency,
    TotalBalance,
    AvailableBalance,
    LockedBalance,
    EmergencyReserve,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum AccountMembers {
    Table,
    AccountId,
    UserId,
    Role,
}

#[derive(Iden)]
enum AllocationRules {
    Table,
    Id,
    AccountId,
    RuleType,
    PercentageBps,
    Priority,
    IsActive,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    AccountId,
    CategoryId,
    Kind,
    AmountMinor,
    Description,
    DueDate,
    ExecutedAt,
    Status,
    IsRecurring,
    RecurrencePattern,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum BalanceHistory {
    Table,
    Id,
    AccountId,
    TransactionId,
    TotalBalance,
    AvailableBalance,
    LockedBalance,
    EmergencyReserve,
    ChangeReason,
    RecordedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Accounts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::UserId).string().not_null())
                    .col(ColumnDef::new(Accounts::Name).string().not_null())
                    .col(
                        ColumnDef::new(Accounts::Currency)
                            .string()
                            .not_null()
                            .default("BRL"),
                    )
                    .col(
                        ColumnDef::new(Accounts::TotalBalance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::AvailableBalance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::LockedBalance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::EmergencyReserve)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Accounts::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Accounts::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-accounts-user_id")
                            .from(Accounts::Table, Accounts::UserId)
                            .to(Users::Table, Users::Username),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-user_id")
                    .table(Accounts::Table)
                    .col(Accounts::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Account Members
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(AccountMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccountMembers::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AccountMembers::UserId).string().not_null())
                    .col(ColumnDef::new(AccountMembers::Role).string().not_null())
                    .primary_key(
                        Index::create()
                            .col(AccountMembers::AccountId)
                            .col(AccountMembers::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-account_members-account_id")
                            .from(AccountMembers::Table, AccountMembers::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-account_members-user_id")
                            .from(AccountMembers::Table, AccountMembers::UserId)
                            .to(Users::Table, Users::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-account_members-user_id")
                    .table(AccountMembers::Table)
                    .col(AccountMembers::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Allocation Rules
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(AllocationRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AllocationRules::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AllocationRules::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AllocationRules::RuleType).string().not_null())
                    .col(
                        ColumnDef::new(AllocationRules::PercentageBps)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AllocationRules::Priority)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(AllocationRules::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-allocation_rules-account_id")
                            .from(AllocationRules::Table, AllocationRules::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-allocation_rules-account_id-active")
                    .table(AllocationRules::Table)
                    .col(AllocationRules::AccountId)
                    .col(AllocationRules::IsActive)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::AccountId).string().not_null())
                    .col(ColumnDef::new(Transactions::CategoryId).string())
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::Description)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::DueDate).timestamp().not_null())
                    .col(ColumnDef::new(Transactions::ExecutedAt).timestamp())
                    .col(ColumnDef::new(Transactions::Status).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::IsRecurring)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Transactions::RecurrencePattern).string())
                    .col(ColumnDef::new(Transactions::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-account_id")
                            .from(Transactions::Table, Transactions::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-account_id-due_date")
                    .table(Transactions::Table)
                    .col(Transactions::AccountId)
                    .col(Transactions::DueDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-account_id-kind-executed_at")
                    .table(Transactions::Table)
                    .col(Transactions::AccountId)
                    .col(Transactions::Kind)
                    .col(Transactions::ExecutedAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Balance History
        // ───────────────────────────────────────────────────────────────────
        // `transaction_id` is deliberately not a foreign key: snapshots
        // outlive the transaction rows they describe.
        manager
            .create_table(
                Table::create()
                    .table(BalanceHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BalanceHistory::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BalanceHistory::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BalanceHistory::TransactionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BalanceHistory::TotalBalance)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BalanceHistory::AvailableBalance)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BalanceHistory::LockedBalance)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BalanceHistory::EmergencyReserve)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BalanceHistory::ChangeReason)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BalanceHistory::RecordedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-balance_history-account_id")
                            .from(BalanceHistory::Table, BalanceHistory::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-balance_history-account_id-recorded_at")
                    .table(BalanceHistory::Table)
                    .col(BalanceHistory::AccountId)
                    .col(BalanceHistory::RecordedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-balance_history-transaction_id")
                    .table(BalanceHistory::Table)
                    .col(BalanceHistory::TransactionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(BalanceHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AllocationRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AccountMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
