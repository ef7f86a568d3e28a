use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{
    AccountRole, Currency, Engine, EngineError, FixedExpenseCmd, IncomeCmd, ListTransactionsCmd,
    MoneyCents, Recurrence, RecurrencePattern, TransactionKind, TransactionStatus,
    UpdateTransactionCmd, VariableExpenseCmd,
};
use migration::{Migrator, MigratorTrait};
use serde::Serialize;
use uuid::Uuid;

mod settings;

type AppResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "safespend")]
#[command(about = "Personal finance ledger with emergency reserve and daily spending limit")]
struct Cli {
    /// Settings file, without extension.
    #[arg(long, env = "SAFESPEND_CONFIG", default_value = "settings")]
    config: String,

    /// Acting user.
    #[arg(long, global = true, env = "SAFESPEND_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a user.
    UserCreate { username: String },
    #[command(subcommand)]
    Account(AccountCommand),
    /// Record an income, split between reserve and available funds.
    Income(IncomeArgs),
    /// Lock funds for a fixed expense.
    Fixed(FixedArgs),
    /// Pay a variable expense from the available balance.
    Spend(SpendArgs),
    /// Mark a locked fixed expense as paid.
    Pay { transaction: Uuid },
    Update(UpdateArgs),
    Duplicate { transaction: Uuid },
    Delete { transaction: Uuid },
    Show { transaction: Uuid },
    List(ListArgs),
    /// Balance snapshots of an account, newest first.
    History {
        account: String,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Snapshots recorded by one transaction.
    BalancesAfter { transaction: Uuid },
    DailyLimit {
        account: String,
        /// Drop the cached value first.
        #[arg(long)]
        recalculate: bool,
    },
    LimitStatus { account: String },
    SpendingHistory {
        account: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Create {
        name: String,
        #[arg(long, default_value = "BRL", value_parser = parse_with::<Currency>)]
        currency: Currency,
    },
    Show { account: String },
    Delete { account: String },
    AddMember {
        account: String,
        member: String,
        #[arg(long, default_value = "member", value_parser = parse_with::<AccountRole>)]
        role: AccountRole,
    },
}

#[derive(Args, Debug)]
struct EntryArgs {
    account: String,
    /// Amount in major units (`12.34` or `12,34`).
    #[arg(value_parser = parse_amount)]
    amount: MoneyCents,
    description: String,
    #[arg(long)]
    category: Option<String>,
}

#[derive(Args, Debug)]
struct IncomeArgs {
    #[command(flatten)]
    entry: EntryArgs,
    #[arg(long, value_parser = parse_with::<RecurrencePattern>)]
    every: Option<RecurrencePattern>,
}

#[derive(Args, Debug)]
struct FixedArgs {
    #[command(flatten)]
    entry: EntryArgs,
    /// Due date (`YYYY-MM-DD`).
    #[arg(long)]
    due: NaiveDate,
    #[arg(long, value_parser = parse_with::<RecurrencePattern>)]
    every: Option<RecurrencePattern>,
}

#[derive(Args, Debug)]
struct SpendArgs {
    #[command(flatten)]
    entry: EntryArgs,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    transaction: Uuid,
    #[arg(long, value_parser = parse_amount)]
    amount: Option<MoneyCents>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    due: Option<NaiveDate>,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    account: Option<String>,
    #[arg(long, value_parser = parse_with::<TransactionKind>)]
    kind: Option<TransactionKind>,
    #[arg(long, value_parser = parse_with::<TransactionStatus>)]
    status: Vec<TransactionStatus>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long, default_value_t = 1)]
    page: u64,
    #[arg(long, default_value_t = engine::DEFAULT_PAGE_LIMIT)]
    limit: u64,
}

fn parse_with<T>(raw: &str) -> Result<T, String>
where
    T: for<'a> TryFrom<&'a str, Error = EngineError>,
{
    T::try_from(raw).map_err(|err| err.to_string())
}

fn parse_amount(raw: &str) -> Result<MoneyCents, String> {
    raw.parse::<MoneyCents>().map_err(|err| err.to_string())
}

fn start_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn recurrence(every: Option<RecurrencePattern>) -> Recurrence {
    every.map(Recurrence::every).unwrap_or_default()
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Process exit code for a failed command.
fn exit_code(err: &(dyn Error + Send + Sync + 'static)) -> i32 {
    match err.downcast_ref::<EngineError>().map(EngineError::status_code) {
        Some(400) => 2,
        Some(403) => 3,
        Some(404) => 4,
        Some(422) => 5,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = match settings::Settings::new(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid settings: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(format!(
            "safespend={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    if let Err(err) = run(cli, settings).await {
        tracing::debug!("command failed: {err}");
        eprintln!("error: {err}");
        std::process::exit(exit_code(err.as_ref()));
    }
}

async fn build_engine(settings: &settings::Settings) -> AppResult<Engine> {
    let db = sea_orm::Database::connect(settings.database.url()).await?;
    Migrator::up(&db, None).await?;

    let engine = Engine::builder()
        .database(db)
        .settings(settings.ledger.to_engine()?)
        .cache_ttls(settings.cache.to_engine())
        .build()
        .await?;
    Ok(engine)
}

async fn run(cli: Cli, settings: settings::Settings) -> AppResult<()> {
    let engine = build_engine(&settings).await?;

    if let Command::UserCreate { username } = &cli.command {
        engine.new_user(username).await?;
        println!("created user: {}", username.trim());
        return Ok(());
    }
    let Some(user) = cli.user.as_deref() else {
        return Err("--user (or SAFESPEND_USER) is required".into());
    };

    match cli.command {
        Command::UserCreate { .. } => {}
        Command::Account(command) => match command {
            AccountCommand::Create { name, currency } => {
                print_json(&engine.new_account(user, &name, currency).await?)?;
            }
            AccountCommand::Show { account } => {
                print_json(&engine.account(&account, user).await?)?;
            }
            AccountCommand::Delete { account } => {
                engine.delete_account(&account, user).await?;
                println!("deleted account: {account}");
            }
            AccountCommand::AddMember {
                account,
                member,
                role,
            } => {
                engine
                    .add_account_member(&account, user, &member, role)
                    .await?;
                println!("added {member} to {account} as {}", role.as_str());
            }
        },
        Command::Income(IncomeArgs { entry, every }) => {
            let mut cmd =
                IncomeCmd::new(entry.account, user, entry.amount.cents(), entry.description)
                    .recurrence(recurrence(every));
            if let Some(category) = entry.category {
                cmd = cmd.category(category);
            }
            print_json(&engine.process_income(cmd).await?)?;
        }
        Command::Fixed(FixedArgs { entry, due, every }) => {
            let mut cmd = FixedExpenseCmd::new(
                entry.account,
                user,
                entry.amount.cents(),
                entry.description,
                start_of(due),
            )
            .recurrence(recurrence(every));
            if let Some(category) = entry.category {
                cmd = cmd.category(category);
            }
            print_json(&engine.create_fixed_expense(cmd).await?)?;
        }
        Command::Spend(SpendArgs { entry }) => {
            let mut cmd = VariableExpenseCmd::new(
                entry.account,
                user,
                entry.amount.cents(),
                entry.description,
            );
            if let Some(category) = entry.category {
                cmd = cmd.category(category);
            }
            print_json(&engine.create_variable_expense(cmd).await?)?;
        }
        Command::Pay { transaction } => {
            print_json(&engine.mark_fixed_expense_paid(transaction, user).await?)?;
        }
        Command::Update(args) => {
            let mut cmd = UpdateTransactionCmd::new(args.transaction, user);
            if let Some(amount) = args.amount {
                cmd = cmd.amount_minor(amount.cents());
            }
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            if let Some(category) = args.category {
                cmd = cmd.category(category);
            }
            if let Some(due) = args.due {
                cmd = cmd.due_date(start_of(due));
            }
            print_json(&engine.update_transaction(cmd).await?)?;
        }
        Command::Duplicate { transaction } => {
            print_json(&engine.duplicate_transaction(transaction, user).await?)?;
        }
        Command::Delete { transaction } => {
            print_json(&engine.delete_transaction(transaction, user).await?)?;
        }
        Command::Show { transaction } => {
            print_json(&engine.transaction(transaction, user).await?)?;
        }
        Command::List(args) => {
            let mut cmd = ListTransactionsCmd::new(user)
                .statuses(args.status)
                .due_between(args.from.map(start_of), args.to.map(start_of))
                .page(args.page, args.limit);
            if let Some(account) = args.account {
                cmd = cmd.account(account);
            }
            if let Some(kind) = args.kind {
                cmd = cmd.kind(kind);
            }
            if let Some(category) = args.category {
                cmd = cmd.category(category);
            }
            print_json(&engine.list_transactions(cmd).await?)?;
        }
        Command::History { account, limit } => {
            print_json(&engine.balance_history(&account, user, limit).await?)?;
        }
        Command::BalancesAfter { transaction } => {
            print_json(&engine.balances_after(user, transaction).await?)?;
        }
        Command::DailyLimit {
            account,
            recalculate,
        } => {
            let limit = if recalculate {
                engine.recalculate_daily_limit(&account, user).await?
            } else {
                engine.daily_limit(&account, user).await?
            };
            println!("{limit}");
        }
        Command::LimitStatus { account } => {
            print_json(&engine.daily_limit_status(&account, user).await?)?;
        }
        Command::SpendingHistory { account, days } => {
            print_json(&engine.spending_history(&account, user, days).await?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_amounts_in_major_units() {
        assert_eq!(parse_amount("12,34").unwrap(), MoneyCents::new(1234));
        assert!(parse_amount("1.234").is_err());
    }

    #[test]
    fn parses_spend_command() {
        let cli = Cli::try_parse_from([
            "safespend", "--user", "alice", "spend", "acc-1", "9.90", "coffee", "--category", "food",
        ])
        .unwrap();
        let Command::Spend(SpendArgs { entry }) = cli.command else {
            panic!("expected spend");
        };
        assert_eq!(entry.amount, MoneyCents::new(990));
        assert_eq!(entry.category.as_deref(), Some("food"));
        assert_eq!(cli.user.as_deref(), Some("alice"));
    }

    #[test]
    fn engine_errors_map_to_exit_codes() {
        let err: Box<dyn Error + Send + Sync> =
            Box::new(EngineError::InsufficientBalance("short".to_string()));
        assert_eq!(exit_code(err.as_ref()), 5);
        let err: Box<dyn Error + Send + Sync> = "plain".into();
        assert_eq!(exit_code(err.as_ref()), 1);
    }
}
