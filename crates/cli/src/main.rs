use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use engine::{Engine, Money, NewUser};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use error::CliError;
use settings::Settings;

mod error;
mod settings;

#[derive(Parser, Debug)]
#[command(name = "wallet_ledger")]
#[command(about = "Single-currency wallet ledger: users, credits, debits and audits")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`). Overrides
    /// the configured database.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Settings file, without extension.
    #[arg(long, default_value = "settings")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(User),
    Wallet(Wallet),
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user together with their wallet.
    Create(UserCreateArgs),
}

#[derive(Args, Debug)]
struct UserCreateArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
}

#[derive(Args, Debug)]
struct Wallet {
    #[command(subcommand)]
    command: WalletCommand,
}

#[derive(Subcommand, Debug)]
enum WalletCommand {
    /// Provision the wallet of an existing user.
    Open(UserArg),
    Credit(MovementArgs),
    Debit(MovementArgs),
    Balance(UserArg),
    History(HistoryArgs),
    /// Replay the ledger and compare it with the cached balance.
    Audit(UserArg),
}

#[derive(Args, Debug)]
struct UserArg {
    #[arg(long)]
    user: Uuid,
}

#[derive(Args, Debug)]
struct MovementArgs {
    #[arg(long)]
    user: Uuid,
    /// Amount in major units, e.g. `20000` or `150.50`.
    #[arg(long, value_parser = parse_amount)]
    amount: Money,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    #[arg(long)]
    user: Uuid,
    #[arg(long, default_value_t = 20)]
    limit: u64,
    /// Print the transactions as JSON.
    #[arg(long)]
    json: bool,
}

fn parse_amount(raw: &str) -> Result<Money, String> {
    raw.parse::<Money>().map_err(|err| err.to_string())
}

async fn connect_db(database_url: &str) -> Result<DatabaseConnection, CliError> {
    let db = Database::connect(database_url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::new(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{}", CliError::from(err));
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "wallet_ledger={level},engine={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    match run(cli, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<(), CliError> {
    let db = connect_db(&settings.database_url(cli.database_url.as_deref())).await?;
    let engine = Engine::builder()
        .database(db)
        .references(settings.reference.generator())
        .write_retry(settings.retry.writes())
        .read_retry(settings.retry.reads())
        .build()
        .await?;

    match cli.command {
        Command::User(User {
            command: UserCommand::Create(args),
        }) => {
            let new_user = NewUser::new(args.email, args.first_name, args.last_name);
            let (user, wallet) = engine.register_user(new_user).await?;
            println!("created user: {} ({})", user.email, user.id);
            println!("wallet: {} balance {}", wallet.id, wallet.balance);
        }
        Command::Wallet(Wallet { command }) => run_wallet(&engine, command).await?,
    }

    Ok(())
}

async fn run_wallet(engine: &Engine, command: WalletCommand) -> Result<(), CliError> {
    match command {
        WalletCommand::Open(UserArg { user }) => {
            let wallet = engine.open_wallet(user).await?;
            println!("opened wallet: {}", wallet.id);
        }
        WalletCommand::Credit(MovementArgs { user, amount }) => {
            let receipt = engine.credit(user, amount).await?;
            println!(
                "{} {}: {} -> {}",
                receipt.reference, receipt.amount, receipt.previous_balance, receipt.new_balance
            );
        }
        WalletCommand::Debit(MovementArgs { user, amount }) => {
            let receipt = engine.debit(user, amount).await?;
            println!(
                "{} -{}: {} -> {}",
                receipt.reference, receipt.amount, receipt.previous_balance, receipt.new_balance
            );
        }
        WalletCommand::Balance(UserArg { user }) => {
            println!("{}", engine.balance(user).await?);
        }
        WalletCommand::History(args) => {
            let transactions = engine.transactions(args.user, args.limit).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&transactions)?);
            } else {
                for tx in &transactions {
                    println!(
                        "{}\t{}\t{:>6}\t{:>12}\t{}",
                        tx.created_at.format("%Y-%m-%d %H:%M:%S"),
                        tx.reference,
                        tx.kind.as_str(),
                        tx.signed_amount().to_string(),
                        tx.status.as_str()
                    );
                }
            }
        }
        WalletCommand::Audit(UserArg { user }) => {
            let audit = engine.audit_wallet(user).await?;
            println!("{}", serde_json::to_string_pretty(&audit)?);
            if !audit.is_consistent() {
                return Err(CliError::Inconsistent(audit.violations.len()));
            }
        }
    }
    Ok(())
}
