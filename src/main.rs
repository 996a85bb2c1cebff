// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;

use mamar_bank::money::{format_amount, parse_amount};
use mamar_bank::{
    db, report, telemetry, AccountProfile, AccountType, Address, Bank, BankConfig, DateRange,
    Gender, Outcome, Receipt, TransactionType,
};

#[derive(Parser)]
#[command(name = "mamar-bank", version, about = "Mamar Bank ledger")]
struct Cli {
    /// Config file (default: ./mamar-bank.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Open an account for a user
    OpenAccount {
        #[arg(long)]
        owner: i64,
        #[arg(long, default_value = "savings")]
        account_type: AccountType,
        #[arg(long)]
        gender: Gender,
        #[arg(long)]
        birth_date: NaiveDate,
        #[arg(long)]
        street: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        postal_code: i64,
        #[arg(long)]
        country: String,
    },
    Deposit {
        #[arg(long)]
        account_no: i64,
        amount: String,
    },
    Withdraw {
        #[arg(long)]
        account_no: i64,
        amount: String,
    },
    /// Loan workflow
    Loan {
        #[command(subcommand)]
        action: LoanCommand,
    },
    Transfer {
        #[arg(long)]
        account_no: i64,
        #[arg(long)]
        to: i64,
        amount: String,
    },
    /// Print the statement, optionally limited to a date range
    Report {
        #[arg(long)]
        account_no: i64,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Also write the statement to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Bank-wide kill switch
    Bankrupt {
        #[command(subcommand)]
        action: BankruptCommand,
    },
    /// Interactive statement viewer
    Ui {
        #[arg(long)]
        account_no: i64,
    },
}

#[derive(Subcommand)]
enum LoanCommand {
    Request {
        #[arg(long)]
        account_no: i64,
        amount: String,
    },
    Approve { loan_id: i64 },
    Pay {
        #[arg(long)]
        account_no: i64,
        loan_id: i64,
    },
    List {
        #[arg(long)]
        account_no: i64,
    },
}

#[derive(Subcommand)]
enum BankruptCommand {
    On,
    Off,
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BankConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.db {
        config.database.path = path;
    }

    // Log lines would corrupt the alternate screen
    if !matches!(cli.command, Command::Ui { .. }) {
        telemetry::init(&config.telemetry);
    }

    let conn = db::open(&config.database.path, config.busy_timeout())
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    let mut bank = Bank::open(conn, &config.bank)?;

    match cli.command {
        Command::Init => {
            println!("🗄️  Database ready at {}", config.database.path.display());
            Ok(())
        }
        Command::OpenAccount {
            owner,
            account_type,
            gender,
            birth_date,
            street,
            city,
            postal_code,
            country,
        } => {
            let profile = AccountProfile {
                account_type,
                gender,
                birth_date,
            };
            let address = Address {
                owner_id: owner,
                street_address: street,
                city,
                postal_code,
                country,
            };
            let result = bank.open_account(owner, &profile, &address);
            let message = match &result {
                Ok(account) => format!("Account {} opened", account.account_no),
                Err(_) => String::new(),
            };
            finish(Outcome::from_result(result, message))
        }
        Command::Deposit { account_no, amount } => finish_receipt(
            parse_amount(&amount).and_then(|amount| bank.deposit(account_no, amount)),
        ),
        Command::Withdraw { account_no, amount } => finish_receipt(
            parse_amount(&amount).and_then(|amount| bank.withdraw(account_no, amount)),
        ),
        Command::Transfer {
            account_no,
            to,
            amount,
        } => finish_receipt(
            parse_amount(&amount).and_then(|amount| bank.transfer(account_no, to, amount)),
        ),
        Command::Loan { action } => run_loan(&mut bank, action),
        Command::Report {
            account_no,
            start,
            end,
            csv,
        } => run_report(&bank, account_no, start, end, csv),
        Command::Bankrupt { action } => {
            let result = match action {
                BankruptCommand::On => bank.set_bankrupt(true),
                BankruptCommand::Off => bank.set_bankrupt(false),
                BankruptCommand::Status => Ok(()),
            };
            let result = result.and_then(|_| bank.is_bankrupt());
            let status = match &result {
                Ok(true) => "Bank is bankrupt",
                _ => "Bank is operating normally",
            };
            finish(Outcome::from_result(result, status))
        }
        Command::Ui { account_no } => run_ui_mode(&bank, account_no),
    }
}

fn run_loan(bank: &mut Bank, action: LoanCommand) -> Result<()> {
    match action {
        LoanCommand::Request { account_no, amount } => finish_receipt(
            parse_amount(&amount).and_then(|amount| bank.request_loan(account_no, amount)),
        ),
        LoanCommand::Approve { loan_id } => finish_receipt(bank.approve_loan(loan_id)),
        LoanCommand::Pay {
            account_no,
            loan_id,
        } => finish_receipt(bank.pay_loan(account_no, loan_id)),
        LoanCommand::List { account_no } => {
            let outcome = Outcome::from_result(bank.loans(account_no), "Loans");
            if let Some(loans) = &outcome.data {
                println!("{:>6}  {:>14}  {:<10}  {}", "ID", "AMOUNT", "STATUS", "REQUESTED");
                for loan in loans {
                    let status = if loan.is_outstanding_loan() { "approved" } else { "pending" };
                    println!(
                        "{:>6}  {:>14}  {:<10}  {}",
                        loan.id,
                        format_amount(loan.amount),
                        status,
                        loan.timestamp.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            finish(outcome)
        }
    }
}

fn run_report(
    bank: &Bank,
    account_no: i64,
    start: Option<String>,
    end: Option<String>,
    csv: Option<PathBuf>,
) -> Result<()> {
    let result = DateRange::parse(start.as_deref(), end.as_deref())
        .and_then(|range| bank.report(account_no, range));
    let outcome = Outcome::from_result(result, "Statement");

    if let Some(statement) = &outcome.data {
        println!("📊 Account {} ({})", statement.account.account_no, statement.account.account_type.as_str());
        if let Some(address) = bank.address(statement.account.owner_id)? {
            println!("   {}", address.one_line());
        }
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for tx in &statement.transactions {
            println!(
                "{:>6}  {}  {:<15} {:>14}  {:>14}",
                tx.id,
                tx.timestamp.format("%Y-%m-%d %H:%M"),
                tx.transaction_type.label(),
                format_amount(tx.amount),
                format_amount(tx.balance_after_transaction)
            );
        }
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for tx_type in TransactionType::ALL {
            let total = statement.total_of(tx_type);
            if !total.is_zero() {
                println!("{:<15} {:>14}", tx_type.label(), format_amount(total));
            }
        }
        println!("Balance: {}$", format_amount(statement.balance));

        if let Some(path) = csv {
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            report::write_csv(statement, file)?;
            println!("✓ Wrote {} rows to {}", statement.transactions.len(), path.display());
        }
    }

    finish(outcome)
}

fn finish_receipt(result: mamar_bank::Result<Receipt>) -> Result<()> {
    let outcome = Outcome::from(result);
    if let Some(receipt) = &outcome.data {
        println!("   Balance: {}$", format_amount(receipt.account.balance));
    }
    finish(outcome)
}

/// Print the outcome message; failures exit with status 1
fn finish<T>(outcome: Outcome<T>) -> Result<()> {
    if outcome.success {
        println!("✅ {}", outcome.message);
        Ok(())
    } else {
        eprintln!("❌ {}", outcome.message);
        std::process::exit(1);
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(bank: &Bank, account_no: i64) -> Result<()> {
    let statement = match bank.report(account_no, DateRange::default()) {
        Ok(statement) => statement,
        Err(e) => return finish(Outcome::<()>::failure(&e)),
    };

    let address = bank.address(statement.account.owner_id)?;
    let mut app = ui::App::new(statement, address);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_bank: &Bank, _account_no: i64) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the HTTP API: cargo run --bin mamar-server --features server");
    std::process::exit(1);
}
