use std::{error::Error, time::Duration};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use engine::{
    Actor, AdminTransactionCmd, DatabaseRouter, DeferredPaymentFilter, DepositCmd, Engine,
    ExpenseTypePatch, NewDeferredPaymentCmd, ReclassifyScope, TransactionKind,
    TransactionListFilter, WithdrawalCmd,
};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde::Serialize;
use uuid::Uuid;

use settings::Settings;

mod settings;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "fundledger_admin")]
#[command(about = "Operator utilities for the fund ledger (funds, projects, ledger)")]
struct Cli {
    /// Settings file, without extension (defaults to `settings`).
    #[arg(long)]
    config: Option<String>,

    /// Overrides the configured database URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// User the operation is performed as.
    #[arg(long = "as", default_value = "admin")]
    user: String,

    #[arg(long, value_enum, default_value_t = RoleArg::Admin)]
    role: RoleArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Admin,
    Member,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Project(ProjectCommand),
    #[command(subcommand)]
    Fund(FundCommand),
    /// Income or expense on the admin fund.
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Move money from the admin fund to a project.
    Deposit(DepositArgs),
    /// Spend money from a project fund.
    Withdraw(WithdrawArgs),
    #[command(subcommand)]
    ExpenseType(ExpenseTypeCommand),
    #[command(subcommand)]
    Deferred(DeferredCommand),
    #[command(subcommand)]
    Ledger(LedgerCommand),
    #[command(subcommand)]
    Transaction(TransactionCommand),
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    Create {
        #[arg(long)]
        name: String,
    },
    Grant {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        user: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum FundCommand {
    List,
    Bootstrap {
        #[arg(long, default_value_t = 0)]
        opening_balance: i64,
    },
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    Income(AmountArgs),
    Expense(AmountArgs),
}

#[derive(Args, Debug)]
struct AmountArgs {
    #[arg(long)]
    amount: i64,
    #[arg(long)]
    expense_type: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct DepositArgs {
    #[arg(long)]
    project: Uuid,
    #[arg(long)]
    amount: i64,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct WithdrawArgs {
    #[arg(long)]
    project: Uuid,
    #[arg(long)]
    amount: i64,
    /// Omit for a general expense.
    #[arg(long)]
    expense_type: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ExpenseTypeCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        /// Include disabled types.
        #[arg(long)]
        all: bool,
    },
    Disable {
        #[arg(long)]
        name: String,
    },
    Delete {
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum DeferredCommand {
    Create {
        #[arg(long)]
        beneficiary: String,
        #[arg(long)]
        total: i64,
        #[arg(long)]
        project: Option<Uuid>,
        /// Due date as YYYY-MM-DD.
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        description: Option<String>,
    },
    Pay {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        amount: i64,
    },
    Transfer {
        #[arg(long)]
        id: Uuid,
    },
    List {
        #[arg(long)]
        project: Option<Uuid>,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerCommand {
    Reclassify {
        #[arg(long)]
        project: Option<Uuid>,
        /// Rewrite existing entries and classify general expenses.
        #[arg(long)]
        force: bool,
    },
    Totals {
        #[arg(long)]
        project: Option<Uuid>,
    },
}

#[derive(Subcommand, Debug)]
enum TransactionCommand {
    List {
        #[arg(long)]
        project: Option<Uuid>,
        #[arg(long)]
        limit: Option<u64>,
    },
    Delete {
        #[arg(long)]
        id: Uuid,
    },
}

async fn connect_db(url: &str, settings: &Settings) -> CliResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(url.to_string());
    options
        .connect_timeout(Duration::from_secs(settings.database.connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout_secs))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn build_engine(cli: &Cli, settings: &Settings) -> CliResult<Engine> {
    let url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.database.url.clone());
    let mut router = DatabaseRouter::new(connect_db(&url, settings).await?);
    if let Some(backup_url) = &settings.database.backup_url {
        router = router.with_backup(connect_db(backup_url, settings).await?);
    }
    tracing::debug!(
        backup = settings.database.backup_url.is_some(),
        "database ready"
    );
    Ok(Engine::builder()
        .router(router)
        .admin_owner(settings.engine.admin_owner.clone())
        .build()
        .await?)
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "fundledger_admin={level},engine={level},audit={level}",
            level = settings.log.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let engine = build_engine(&cli, &settings).await?;
    let actor = match cli.role {
        RoleArg::Admin => Actor::admin(cli.user.clone()),
        RoleArg::Member => Actor::member(cli.user.clone()),
    };

    match cli.command {
        Command::Project(ProjectCommand::Create { name }) => {
            let project = engine.create_project(&actor, &name).await?;
            println!("created project: {} ({})", project.name, project.id);
        }
        Command::Project(ProjectCommand::Grant { project, user }) => {
            engine.grant_project_access(&actor, project, &user).await?;
            println!("granted {user} access to {project}");
        }
        Command::Project(ProjectCommand::List) => {
            print_json(&engine.list_projects(&actor).await?)?;
        }
        Command::Fund(FundCommand::List) => {
            print_json(&engine.list_funds(&actor).await?)?;
        }
        Command::Fund(FundCommand::Bootstrap { opening_balance }) => {
            let fund = engine.bootstrap_admin_fund(&actor, opening_balance).await?;
            println!("admin fund ready: {} (balance {})", fund.id, fund.balance);
        }
        Command::Admin(command) => {
            let (kind, args) = match command {
                AdminCommand::Income(args) => (TransactionKind::Income, args),
                AdminCommand::Expense(args) => (TransactionKind::Expense, args),
            };
            let mut cmd = AdminTransactionCmd::new(actor, kind, args.amount);
            if let Some(name) = args.expense_type {
                cmd = cmd.expense_type(name);
            }
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            let tx = engine.process_admin_transaction(cmd).await?;
            println!("recorded {}: {} ({})", kind.as_str(), tx.amount, tx.id);
        }
        Command::Deposit(args) => {
            let mut cmd = DepositCmd::new(actor, args.project, args.amount);
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            let tx = engine.process_deposit(cmd).await?;
            println!("deposited {} into {} ({})", tx.amount, args.project, tx.id);
        }
        Command::Withdraw(args) => {
            let mut cmd = WithdrawalCmd::new(actor, args.project, args.amount);
            if let Some(name) = args.expense_type {
                cmd = cmd.expense_type(name);
            }
            if let Some(description) = args.description {
                cmd = cmd.description(description);
            }
            let tx = engine.process_withdrawal(cmd).await?;
            println!("withdrew {} from {} ({})", tx.amount, args.project, tx.id);
        }
        Command::ExpenseType(ExpenseTypeCommand::Create { name, description }) => {
            let expense_type = engine
                .create_expense_type(&actor, &name, description.as_deref())
                .await?;
            println!("created expense type: {} ({})", expense_type.name, expense_type.id);
        }
        Command::ExpenseType(ExpenseTypeCommand::List { all }) => {
            print_json(&engine.list_expense_types(all).await?)?;
        }
        Command::ExpenseType(ExpenseTypeCommand::Disable { name }) => {
            let Some(expense_type) = engine.expense_type_by_name(&name).await? else {
                eprintln!("expense type not found: {name}");
                std::process::exit(1);
            };
            let patch = ExpenseTypePatch {
                is_active: Some(false),
                ..Default::default()
            };
            engine
                .update_expense_type(&actor, expense_type.id, patch)
                .await?;
            println!("disabled expense type: {}", expense_type.name);
        }
        Command::ExpenseType(ExpenseTypeCommand::Delete { name }) => {
            let Some(expense_type) = engine.expense_type_by_name(&name).await? else {
                eprintln!("expense type not found: {name}");
                std::process::exit(1);
            };
            engine.delete_expense_type(&actor, expense_type.id).await?;
            println!("deleted expense type: {}", expense_type.name);
        }
        Command::Deferred(DeferredCommand::Create {
            beneficiary,
            total,
            project,
            due,
            description,
        }) => {
            let mut cmd = NewDeferredPaymentCmd::new(actor, beneficiary, total);
            if let Some(project) = project {
                cmd = cmd.project_id(project);
            }
            if let Some(due) = due {
                cmd = cmd.due_date(due);
            }
            if let Some(description) = description {
                cmd = cmd.description(description);
            }
            let payment = engine.create_deferred_payment(cmd).await?;
            println!(
                "created deferred payment for {}: {} ({})",
                payment.beneficiary_name, payment.total_amount, payment.id
            );
        }
        Command::Deferred(DeferredCommand::Pay { id, amount }) => {
            let receipt = engine.pay_installment(&actor, id, amount).await?;
            println!(
                "paid {amount}: {}/{} ({})",
                receipt.payment.paid_amount,
                receipt.payment.total_amount,
                receipt.payment.status.as_str()
            );
        }
        Command::Deferred(DeferredCommand::Transfer { id }) => {
            let entry = engine.transfer_to_ledger(&actor, id).await?;
            println!(
                "transferred {} to the ledger as {}",
                entry.amount,
                entry.kind.as_str()
            );
        }
        Command::Deferred(DeferredCommand::List { project }) => {
            let filter = DeferredPaymentFilter {
                project_id: project,
                ..Default::default()
            };
            print_json(&engine.list_deferred_payments(&actor, &filter).await?)?;
        }
        Command::Ledger(LedgerCommand::Reclassify { project, force }) => {
            let scope = ReclassifyScope {
                project_id: project,
                force,
                ..Default::default()
            };
            print_json(&engine.reclassify_transactions(&actor, &scope).await?)?;
        }
        Command::Ledger(LedgerCommand::Totals { project }) => {
            print_json(&engine.ledger_totals(&actor, project).await?)?;
        }
        Command::Transaction(TransactionCommand::List { project, limit }) => {
            let filter = TransactionListFilter {
                project_id: project,
                limit,
                ..Default::default()
            };
            print_json(&engine.list_transactions(&actor, &filter).await?)?;
        }
        Command::Transaction(TransactionCommand::Delete { id }) => {
            let tx = engine.delete_transaction(&actor, id).await?;
            println!("deleted transaction {} ({} reversed)", tx.id, tx.amount);
        }
    }

    Ok(())
}
