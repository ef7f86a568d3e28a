use chrono::{Duration, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    AccountRole, Balances, ChangeReason, Currency, Engine, EngineError, FixedExpenseCmd, IncomeCmd,
    ListTransactionsCmd, MoneyCents, Recurrence, RecurrencePattern, TransactionKind,
    TransactionStatus, UpdateTransactionCmd, VariableExpenseCmd,
};
use migration::MigratorTrait;
use uuid::Uuid;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    for user in ["alice", "bob", "carol"] {
        engine.new_user(user).await.unwrap();
    }
    (engine, db)
}

async fn seed_balances(
    db: &DatabaseConnection,
    account_id: &str,
    total: i64,
    available: i64,
    locked: i64,
    reserve: i64,
) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE accounts SET total_balance = ?, available_balance = ?, locked_balance = ?, emergency_reserve = ? WHERE id = ?",
        vec![
            total.into(),
            available.into(),
            locked.into(),
            reserve.into(),
            account_id.into(),
        ],
    ))
    .await
    .unwrap();
}

async fn set_reserve_bps(db: &DatabaseConnection, account_id: &str, bps: i64) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE allocation_rules SET percentage_bps = ? WHERE account_id = ?",
        vec![bps.into(), account_id.into()],
    ))
    .await
    .unwrap();
}

async fn balances(engine: &Engine, account_id: &str) -> Balances {
    let balances = engine.account(account_id, "alice").await.unwrap().balances;
    assert!(balances.is_consistent(), "inconsistent balances: {balances:?}");
    balances
}

fn cents(v: i64) -> MoneyCents {
    MoneyCents::new(v)
}

fn expect_balances(balances: Balances, total: i64, available: i64, locked: i64, reserve: i64) {
    assert_eq!(
        (
            balances.total.cents(),
            balances.available.cents(),
            balances.locked.cents(),
            balances.emergency_reserve.cents()
        ),
        (total, available, locked, reserve)
    );
}

async fn new_account(engine: &Engine) -> String {
    engine
        .new_account("alice", "Main", Currency::Brl)
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn new_account_starts_at_zero_with_default_rule() {
    let (engine, _db) = engine_with_db().await;
    let account = engine
        .new_account("alice", "  Main  ", Currency::Eur)
        .await
        .unwrap();

    assert_eq!(account.name, "Main");
    assert_eq!(account.currency, Currency::Eur);
    assert!(account.balances.is_zero());

    let income = engine
        .process_income(IncomeCmd::new(&account.id, "alice", 1000, "salary"))
        .await
        .unwrap();
    assert_eq!(income.breakdown.unwrap().emergency_reserve, cents(300));
}

#[tokio::test]
async fn new_account_requires_existing_user() {
    let (engine, _db) = engine_with_db().await;
    let err = engine
        .new_account("mallory", "Main", Currency::Brl)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn income_splits_thirty_seventy() {
    let (engine, _db) = engine_with_db().await;
    let account_id = new_account(&engine).await;

    let receipt = engine
        .process_income(
            IncomeCmd::new(&account_id, "alice", 1000, "salary")
                .category("work")
                .recurrence(Recurrence::every(RecurrencePattern::Monthly)),
        )
        .await
        .unwrap();

    expect_balances(receipt.balances, 1000, 700, 0, 300);
    let breakdown = receipt.breakdown.unwrap();
    assert_eq!(breakdown.total_received, cents(1000));
    assert_eq!(breakdown.emergency_reserve, cents(300));
    assert_eq!(breakdown.available, cents(700));

    let tx = &receipt.transaction;
    assert_eq!(tx.kind, TransactionKind::Income);
    assert_eq!(tx.status, TransactionStatus::Executed);
    assert!(tx.executed_at.is_some());
    assert_eq!(tx.recurrence.pattern, Some(RecurrencePattern::Monthly));
    assert_eq!(tx.created_by, "alice");

    let history = engine
        .balance_history(&account_id, "alice", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change_reason, ChangeReason::IncomeReceived);
    assert_eq!(history[0].transaction_id, tx.id);
    assert_eq!(history[0].balances, receipt.balances);
}

#[tokio::test]
async fn income_uses_active_reserve_rule() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    set_reserve_bps(&db, &account_id, 1250).await;

    let receipt = engine
        .process_income(IncomeCmd::new(&account_id, "alice", 333, "bonus"))
        .await
        .unwrap();

    // 12.5% of 333 = 41.625, rounded half away from zero
    expect_balances(receipt.balances, 333, 291, 0, 42);
}

#[tokio::test]
async fn income_then_delete_restores_balances() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 5000, 3000, 1000, 1000).await;

    let receipt = engine
        .process_income(IncomeCmd::new(&account_id, "alice", 1234, "freelance"))
        .await
        .unwrap();
    let restored = engine
        .delete_transaction(receipt.transaction.id, "alice")
        .await
        .unwrap();

    expect_balances(restored, 5000, 3000, 1000, 1000);
    expect_balances(balances(&engine, &account_id).await, 5000, 3000, 1000, 1000);
    let err = engine
        .transaction(receipt.transaction.id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn delete_appends_no_history_but_snapshots_stay_readable() {
    let (engine, _db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    let receipt = engine
        .process_income(IncomeCmd::new(&account_id, "alice", 1000, "salary"))
        .await
        .unwrap();

    engine
        .delete_transaction(receipt.transaction.id, "alice")
        .await
        .unwrap();

    let history = engine
        .balance_history(&account_id, "alice", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);

    let after = engine
        .balances_after("alice", receipt.transaction.id)
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    expect_balances(after[0].balances, 1000, 700, 0, 300);

    let err = engine
        .balances_after("bob", receipt.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn income_reversal_uses_default_percentage_not_the_applied_one() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    set_reserve_bps(&db, &account_id, 2000).await;

    let receipt = engine
        .process_income(IncomeCmd::new(&account_id, "alice", 1000, "salary"))
        .await
        .unwrap();
    expect_balances(receipt.balances, 1000, 800, 0, 200);

    // Reversal recomputes the split at the engine default (30%), so the
    // reserve and available fields drift while the invariant still holds.
    let after = engine
        .delete_transaction(receipt.transaction.id, "alice")
        .await
        .unwrap();
    expect_balances(after, 0, 100, 0, -100);
    assert!(after.is_consistent());
}

#[tokio::test]
async fn fixed_expense_locks_then_pays() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 1000, 0, 0).await;

    let locked = engine
        .create_fixed_expense(FixedExpenseCmd::new(
            &account_id,
            "alice",
            500,
            "rent",
            Utc::now(),
        ))
        .await
        .unwrap();
    assert_eq!(locked.transaction.status, TransactionStatus::Locked);
    assert!(locked.transaction.executed_at.is_none());
    assert!(locked.breakdown.is_none());
    expect_balances(locked.balances, 1000, 500, 500, 0);

    let paid = engine
        .mark_fixed_expense_paid(locked.transaction.id, "alice")
        .await
        .unwrap();
    assert_eq!(paid.transaction.status, TransactionStatus::Executed);
    assert!(paid.transaction.executed_at.is_some());
    expect_balances(paid.balances, 500, 500, 0, 0);

    let reasons: Vec<ChangeReason> = engine
        .balance_history(&account_id, "alice", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.change_reason)
        .collect();
    assert!(reasons.contains(&ChangeReason::ExpenseLocked));
    assert!(reasons.contains(&ChangeReason::FixedExpensePaid));
    assert_eq!(reasons.len(), 2);
}

#[tokio::test]
async fn fixed_expense_delete_unlocks() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 800, 0, 200).await;

    let locked = engine
        .create_fixed_expense(FixedExpenseCmd::new(
            &account_id,
            "alice",
            300,
            "insurance",
            Utc::now() + Duration::days(10),
        ))
        .await
        .unwrap();
    expect_balances(locked.balances, 1000, 500, 300, 200);

    let after = engine
        .delete_transaction(locked.transaction.id, "alice")
        .await
        .unwrap();
    expect_balances(after, 1000, 800, 0, 200);
}

#[tokio::test]
async fn paid_fixed_expense_delete_refunds_total_and_available() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 1000, 0, 0).await;

    let locked = engine
        .create_fixed_expense(FixedExpenseCmd::new(&account_id, "alice", 400, "rent", Utc::now()))
        .await
        .unwrap();
    engine
        .mark_fixed_expense_paid(locked.transaction.id, "alice")
        .await
        .unwrap();
    let after = engine
        .delete_transaction(locked.transaction.id, "alice")
        .await
        .unwrap();
    expect_balances(after, 1000, 1000, 0, 0);
}

#[tokio::test]
async fn fixed_expense_in_the_past_is_rejected() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 1000, 0, 0).await;

    let err = engine
        .create_fixed_expense(FixedExpenseCmd::new(
            &account_id,
            "alice",
            100,
            "rent",
            Utc::now() - Duration::days(2),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    expect_balances(balances(&engine, &account_id).await, 1000, 1000, 0, 0);
}

#[tokio::test]
async fn variable_expense_debits_immediately() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 700, 0, 300).await;

    let receipt = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 250, "groceries"))
        .await
        .unwrap();
    assert_eq!(receipt.transaction.status, TransactionStatus::Executed);
    expect_balances(receipt.balances, 750, 450, 0, 300);

    let history = engine
        .balance_history(&account_id, "alice", 10)
        .await
        .unwrap();
    assert_eq!(history[0].change_reason, ChangeReason::ExpensePaid);
}

#[tokio::test]
async fn expenses_beyond_available_fail_without_side_effects() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 10, 10, 0, 0).await;

    let err = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 50, "dinner"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance(_)));
    assert_eq!(err.status_code(), 422);

    let err = engine
        .create_fixed_expense(FixedExpenseCmd::new(&account_id, "alice", 11, "gym", Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance(_)));

    expect_balances(balances(&engine, &account_id).await, 10, 10, 0, 0);
    let page = engine
        .list_transactions(ListTransactionsCmd::new("alice").account(&account_id))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 0);
    assert!(
        engine
            .balance_history(&account_id, "alice", 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn expense_of_exactly_available_succeeds() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 50, 50, 0, 0).await;

    let receipt = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 50, "dinner"))
        .await
        .unwrap();
    expect_balances(receipt.balances, 0, 0, 0, 0);
}

#[tokio::test]
async fn update_amount_on_locked_expense_moves_delta() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 1000, 0, 0).await;

    let locked = engine
        .create_fixed_expense(FixedExpenseCmd::new(&account_id, "alice", 100, "phone", Utc::now()))
        .await
        .unwrap();
    expect_balances(locked.balances, 1000, 900, 100, 0);

    let updated = engine
        .update_transaction(
            UpdateTransactionCmd::new(locked.transaction.id, "alice").amount_minor(150),
        )
        .await
        .unwrap();
    assert_eq!(updated.amount, cents(150));
    expect_balances(balances(&engine, &account_id).await, 1000, 850, 150, 0);
}

#[tokio::test]
async fn update_amount_on_income_applies_split_difference() {
    let (engine, _db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    let receipt = engine
        .process_income(IncomeCmd::new(&account_id, "alice", 1000, "salary"))
        .await
        .unwrap();

    engine
        .update_transaction(
            UpdateTransactionCmd::new(receipt.transaction.id, "alice").amount_minor(2000),
        )
        .await
        .unwrap();
    expect_balances(balances(&engine, &account_id).await, 2000, 1400, 0, 600);

    engine
        .update_transaction(
            UpdateTransactionCmd::new(receipt.transaction.id, "alice").amount_minor(500),
        )
        .await
        .unwrap();
    expect_balances(balances(&engine, &account_id).await, 500, 350, 0, 150);
}

#[tokio::test]
async fn update_amount_on_executed_expense_adjusts_total_and_available() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 1000, 0, 0).await;
    let receipt = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 100, "taxi"))
        .await
        .unwrap();

    engine
        .update_transaction(
            UpdateTransactionCmd::new(receipt.transaction.id, "alice").amount_minor(40),
        )
        .await
        .unwrap();
    expect_balances(balances(&engine, &account_id).await, 960, 960, 0, 0);
}

#[tokio::test]
async fn update_without_amount_leaves_balances_untouched() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 1000, 0, 0).await;
    let receipt = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 100, "taxi"))
        .await
        .unwrap();
    let due = Utc::now() + Duration::days(3);

    let updated = engine
        .update_transaction(
            UpdateTransactionCmd::new(receipt.transaction.id, "alice")
                .amount_minor(100)
                .description("  uber  ")
                .category("transport")
                .due_date(due),
        )
        .await
        .unwrap();
    assert_eq!(updated.description, "uber");
    assert_eq!(updated.category_id.as_deref(), Some("transport"));
    assert_eq!(updated.due_date, due);
    expect_balances(balances(&engine, &account_id).await, 900, 900, 0, 0);

    let stored = engine
        .transaction(receipt.transaction.id, "alice")
        .await
        .unwrap();
    assert_eq!(stored.description, "uber");
}

#[tokio::test]
async fn update_rejects_invalid_amount_before_touching_storage() {
    let (engine, _db) = engine_with_db().await;
    let err = engine
        .update_transaction(UpdateTransactionCmd::new(Uuid::new_v4(), "alice").amount_minor(0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .update_transaction(UpdateTransactionCmd::new(Uuid::new_v4(), "alice").amount_minor(5))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn mark_paid_rejects_wrong_kind_or_status() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 1000, 0, 0).await;

    let variable = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 10, "snack"))
        .await
        .unwrap();
    let err = engine
        .mark_fixed_expense_paid(variable.transaction.id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let fixed = engine
        .create_fixed_expense(FixedExpenseCmd::new(&account_id, "alice", 100, "rent", Utc::now()))
        .await
        .unwrap();
    engine
        .mark_fixed_expense_paid(fixed.transaction.id, "alice")
        .await
        .unwrap();
    let err = engine
        .mark_fixed_expense_paid(fixed.transaction.id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    expect_balances(balances(&engine, &account_id).await, 890, 890, 0, 0);
}

#[tokio::test]
async fn duplicate_requires_category() {
    let (engine, _db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    let receipt = engine
        .process_income(IncomeCmd::new(&account_id, "alice", 1000, "salary"))
        .await
        .unwrap();

    let err = engine
        .duplicate_transaction(receipt.transaction.id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    expect_balances(balances(&engine, &account_id).await, 1000, 700, 0, 300);
}

#[tokio::test]
async fn duplicate_replays_creation_effects() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 1000, 1000, 0, 0).await;

    let fixed = engine
        .create_fixed_expense(
            FixedExpenseCmd::new(
                &account_id,
                "alice",
                200,
                "rent",
                Utc::now() + Duration::days(20),
            )
            .category("housing")
            .recurrence(Recurrence::every(RecurrencePattern::Monthly)),
        )
        .await
        .unwrap();
    let copy = engine
        .duplicate_transaction(fixed.transaction.id, "alice")
        .await
        .unwrap();

    assert_ne!(copy.transaction.id, fixed.transaction.id);
    assert_eq!(copy.transaction.description, "rent (copy)");
    assert_eq!(copy.transaction.kind, TransactionKind::FixedExpense);
    assert_eq!(copy.transaction.status, TransactionStatus::Locked);
    assert_eq!(copy.transaction.category_id.as_deref(), Some("housing"));
    assert_eq!(copy.transaction.recurrence, fixed.transaction.recurrence);
    assert!(copy.transaction.due_date < fixed.transaction.due_date);
    expect_balances(copy.balances, 1000, 600, 400, 0);

    let variable = engine
        .create_variable_expense(
            VariableExpenseCmd::new(&account_id, "alice", 600, "laptop").category("tech"),
        )
        .await
        .unwrap();
    let err = engine
        .duplicate_transaction(variable.transaction.id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance(_)));
    expect_balances(balances(&engine, &account_id).await, 400, 0, 400, 0);
}

#[tokio::test]
async fn access_errors_distinguish_missing_and_forbidden() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 100, 100, 0, 0).await;

    let err = engine
        .process_income(IncomeCmd::new("missing", "alice", 10, "salary"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(err.status_code(), 404);

    let err = engine
        .process_income(IncomeCmd::new(&account_id, "bob", 10, "salary"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    assert_eq!(err.status_code(), 403);

    let receipt = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 10, "tea"))
        .await
        .unwrap();
    let err = engine
        .delete_transaction(receipt.transaction.id, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine
        .delete_transaction(Uuid::new_v4(), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    expect_balances(balances(&engine, &account_id).await, 90, 90, 0, 0);
}

#[tokio::test]
async fn members_write_and_viewers_only_read() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 100, 100, 0, 0).await;
    engine
        .add_account_member(&account_id, "alice", "bob", AccountRole::Member)
        .await
        .unwrap();
    engine
        .add_account_member(&account_id, "alice", "carol", AccountRole::Viewer)
        .await
        .unwrap();

    let receipt = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "bob", 30, "lunch"))
        .await
        .unwrap();
    assert_eq!(receipt.transaction.created_by, "bob");

    let err = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "carol", 30, "lunch"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let seen = engine
        .transaction(receipt.transaction.id, "carol")
        .await
        .unwrap();
    assert_eq!(seen.id, receipt.transaction.id);
    assert_eq!(engine.account(&account_id, "carol").await.unwrap().id, account_id);

    let err = engine
        .add_account_member(&account_id, "bob", "carol", AccountRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_write() {
    let (engine, _db) = engine_with_db().await;
    let account_id = new_account(&engine).await;

    for amount in [0, -100] {
        let err = engine
            .process_income(IncomeCmd::new(&account_id, "alice", amount, "salary"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }
    let err = engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 10, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(balances(&engine, &account_id).await.is_zero());
}

#[tokio::test]
async fn list_filters_orders_and_paginates() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 10_000, 10_000, 0, 0).await;
    let now = Utc::now();

    for days in 1..=3 {
        engine
            .create_fixed_expense(
                FixedExpenseCmd::new(
                    &account_id,
                    "alice",
                    100,
                    format!("bill {days}"),
                    now + Duration::days(days),
                )
                .category("bills"),
            )
            .await
            .unwrap();
    }
    engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 50, "coffee"))
        .await
        .unwrap();
    engine
        .process_income(IncomeCmd::new(&account_id, "alice", 500, "refund"))
        .await
        .unwrap();

    let page = engine
        .list_transactions(
            ListTransactionsCmd::new("alice")
                .account(&account_id)
                .kind(TransactionKind::FixedExpense)
                .page(1, 2),
        )
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 3);
    assert_eq!(page.pagination.total_pages, 2);
    assert_eq!(page.pagination.items_per_page, 2);
    let descriptions: Vec<&str> = page
        .transactions
        .iter()
        .map(|t| t.description.as_str())
        .collect();
    assert_eq!(descriptions, ["bill 3", "bill 2"]);

    let second = engine
        .list_transactions(
            ListTransactionsCmd::new("alice")
                .account(&account_id)
                .kind(TransactionKind::FixedExpense)
                .page(2, 2),
        )
        .await
        .unwrap();
    assert_eq!(second.transactions.len(), 1);
    assert_eq!(second.transactions[0].description, "bill 1");

    let executed = engine
        .list_transactions(
            ListTransactionsCmd::new("alice")
                .account(&account_id)
                .statuses([TransactionStatus::Executed]),
        )
        .await
        .unwrap();
    assert_eq!(executed.pagination.total_items, 2);

    let ranged = engine
        .list_transactions(
            ListTransactionsCmd::new("alice")
                .category("bills")
                .due_between(Some(now + Duration::days(2)), Some(now + Duration::days(3))),
        )
        .await
        .unwrap();
    assert_eq!(ranged.pagination.total_items, 2);
}

#[tokio::test]
async fn list_without_account_spans_owned_and_shared_accounts() {
    let (engine, _db) = engine_with_db().await;
    let own = new_account(&engine).await;
    let shared = engine
        .new_account("bob", "Family", Currency::Brl)
        .await
        .unwrap()
        .id;
    let private = engine
        .new_account("carol", "Secret", Currency::Brl)
        .await
        .unwrap()
        .id;
    engine
        .add_account_member(&shared, "bob", "alice", AccountRole::Viewer)
        .await
        .unwrap();

    engine
        .process_income(IncomeCmd::new(&own, "alice", 100, "a"))
        .await
        .unwrap();
    engine
        .process_income(IncomeCmd::new(&shared, "bob", 100, "b"))
        .await
        .unwrap();
    engine
        .process_income(IncomeCmd::new(&private, "carol", 100, "c"))
        .await
        .unwrap();

    let page = engine
        .list_transactions(ListTransactionsCmd::new("alice"))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 2);
    assert!(page.transactions.iter().all(|t| t.account_id != private));

    let err = engine
        .list_transactions(ListTransactionsCmd::new("alice").account(&private))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine
        .list_transactions(ListTransactionsCmd::new("alice").page(1, 500))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn account_with_balance_history_cannot_be_deleted() {
    let (engine, _db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    let receipt = engine
        .process_income(IncomeCmd::new(&account_id, "alice", 100, "gift"))
        .await
        .unwrap();

    let err = engine
        .delete_account(&account_id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    engine
        .delete_transaction(receipt.transaction.id, "alice")
        .await
        .unwrap();
    expect_balances(balances(&engine, &account_id).await, 0, 0, 0, 0);

    let err = engine
        .delete_account(&account_id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    let history = engine
        .balance_history(&account_id, "alice", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn delete_account_requires_owner_and_zero_balances() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    engine
        .add_account_member(&account_id, "alice", "bob", AccountRole::Member)
        .await
        .unwrap();
    let err = engine
        .delete_account(&account_id, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    seed_balances(&db, &account_id, 5, 5, 0, 0).await;
    let err = engine
        .delete_account(&account_id, "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    seed_balances(&db, &account_id, 0, 0, 0, 0).await;
    engine.delete_account(&account_id, "alice").await.unwrap();
    let err = engine.account(&account_id, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn daily_limit_spreads_available_over_window() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 4000, 3000, 0, 1000).await;

    assert_eq!(
        engine.daily_limit(&account_id, "alice").await.unwrap(),
        cents(100)
    );

    engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 60, "lunch"))
        .await
        .unwrap();
    // 2940 / 30
    assert_eq!(
        engine.daily_limit(&account_id, "alice").await.unwrap(),
        cents(98)
    );

    let status = engine
        .daily_limit_status(&account_id, "alice")
        .await
        .unwrap();
    assert_eq!(status.daily_limit, cents(98));
    assert_eq!(status.spent_today, cents(60));
    assert_eq!(status.remaining, cents(38));
    assert!(!status.exceeded);
    assert_eq!(status.percentage_used.to_string(), "61.22");
}

#[tokio::test]
async fn daily_limit_never_goes_negative() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 0, -300, 300, 0).await;

    assert_eq!(
        engine.daily_limit(&account_id, "alice").await.unwrap(),
        MoneyCents::ZERO
    );
}

#[tokio::test]
async fn limit_status_caps_percentage_when_exceeded() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 300, 300, 0, 0).await;

    engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 100, "shoes"))
        .await
        .unwrap();
    let status = engine
        .daily_limit_status(&account_id, "alice")
        .await
        .unwrap();
    // limit: 200 / 30 = 6
    assert_eq!(status.daily_limit, cents(6));
    assert!(status.exceeded);
    assert_eq!(status.remaining, MoneyCents::ZERO);
    assert_eq!(status.percentage_used, rust_decimal::Decimal::ONE_HUNDRED);
}

#[tokio::test]
async fn spending_history_validates_days() {
    let (engine, _db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    for days in [0, 31] {
        let err = engine
            .spending_history(&account_id, "alice", days)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}

#[tokio::test]
async fn spending_history_uses_snapshot_limit_of_each_day() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 3000, 3000, 0, 0).await;
    let backend = db.get_database_backend();
    let now = Utc::now();

    // Snapshot three days ago: available 300 -> limit 10 for the days after it.
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO balance_history (id, account_id, transaction_id, total_balance, available_balance, locked_balance, emergency_reserve, change_reason, recorded_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        vec![
            Uuid::new_v4().to_string().into(),
            account_id.clone().into(),
            Uuid::new_v4().to_string().into(),
            300i64.into(),
            300i64.into(),
            0i64.into(),
            0i64.into(),
            "income_received".into(),
            (now - Duration::days(3)).into(),
        ],
    ))
    .await
    .unwrap();
    // Variable expense executed two days ago.
    let two_days_ago = now - Duration::days(2);
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO transactions (id, account_id, category_id, kind, amount_minor, description, due_date, executed_at, status, is_recurring, recurrence_pattern, created_by, created_at, updated_at) VALUES (?, ?, NULL, 'variable_expense', ?, 'old dinner', ?, ?, 'executed', 0, NULL, 'alice', ?, ?)",
        vec![
            Uuid::new_v4().to_string().into(),
            account_id.clone().into(),
            9i64.into(),
            two_days_ago.into(),
            two_days_ago.into(),
            two_days_ago.into(),
            two_days_ago.into(),
        ],
    ))
    .await
    .unwrap();

    engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 15, "lunch"))
        .await
        .unwrap();
    engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 5, "coffee"))
        .await
        .unwrap();

    let history = engine
        .spending_history(&account_id, "alice", 7)
        .await
        .unwrap();
    assert_eq!(history.days_with_spending, 2);
    assert_eq!(history.total_spent, cents(29));
    assert_eq!(history.average_daily_spent, cents(14));

    let today = &history.days[0];
    assert_eq!(today.date, now.date_naive());
    assert_eq!(today.spent, cents(20));
    assert_eq!(today.daily_limit, cents(10));
    assert!(today.exceeded);
    assert_eq!(today.status, engine::LimitStatus::Exceeded);

    let older = &history.days[1];
    assert_eq!(older.date, two_days_ago.date_naive());
    assert_eq!(older.spent, cents(9));
    assert_eq!(older.daily_limit, cents(10));
    assert_eq!(older.status, engine::LimitStatus::Warning);
    assert_eq!(older.percentage_used, rust_decimal::Decimal::from(90));
}

#[tokio::test]
async fn spending_history_falls_back_to_current_limit() {
    let (engine, db) = engine_with_db().await;
    let account_id = new_account(&engine).await;
    seed_balances(&db, &account_id, 3060, 3060, 0, 0).await;

    engine
        .create_variable_expense(VariableExpenseCmd::new(&account_id, "alice", 60, "lunch"))
        .await
        .unwrap();
    let history = engine
        .spending_history(&account_id, "alice", 1)
        .await
        .unwrap();

    assert_eq!(history.days.len(), 1);
    // no snapshot before today: current available 3000 / 30
    assert_eq!(history.days[0].daily_limit, cents(100));
    assert_eq!(history.days[0].status, engine::LimitStatus::Ok);
}
