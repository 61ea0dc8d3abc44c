//! `uow` command line entry point.
//!
//! # Responsibility
//! - Drive the sample `customers` table through `CustomerService`.
//! - Print each command's outcome envelope as one JSON object.
//!
//! # Invariants
//! - Every write runs inside begin, service call, save, commit; a failed
//!   envelope or save rolls the transaction back.
//! - The process exits non-zero when the envelope reports failure.

mod customer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use customer::{ensure_schema, Customer, CustomerService};
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use uow_core::{ContextOptions, IsolationLevel, OrderBy, Outcome, UnitOfWork};

#[derive(Parser)]
#[command(name = "uow")]
#[command(about = "Unit of Work demo over a customers table")]
struct Cli {
    /// SQLite database file; an in-memory database when omitted
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Absolute directory for rolling log files; logging is off when omitted
    #[arg(long, global = true)]
    log_dir: Option<String>,
    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// SQLite journal mode, e.g. wal
    #[arg(long, global = true)]
    journal_mode: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a customer
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        contact: Option<String>,
    },
    /// List customers ordered by id
    List {
        #[arg(long)]
        company_contains: Option<String>,
        #[arg(long)]
        skip: Option<usize>,
        #[arg(long)]
        take: Option<usize>,
    },
    /// Remove a customer by id
    Remove {
        #[arg(long)]
        id: String,
    },
    /// Count customers
    Count,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli
            .log_level
            .as_deref()
            .unwrap_or_else(|| uow_core::default_log_level());
        uow_core::init_logging(level, log_dir)?;
    }

    let options = ContextOptions {
        journal_mode: cli.journal_mode.clone(),
        ..ContextOptions::default()
    };
    let unit_of_work = match cli.db.as_deref() {
        Some(path) => UnitOfWork::open(path, &options)?,
        None => UnitOfWork::open_in_memory(&options)?,
    };
    ensure_schema(&unit_of_work)?;
    let service = CustomerService::new(&unit_of_work)?;

    let succeeded = match cli.command {
        Commands::Add {
            id,
            company,
            contact,
        } => {
            info!("event=cli_command module=cli status=start command=add");
            let customer = Customer {
                id,
                company_name: company,
                contact_name: contact,
            };
            print(&write(&unit_of_work, || service.insert(customer))?)?
        }
        Commands::List {
            company_contains,
            skip,
            take,
        } => {
            info!("event=cli_command module=cli status=start command=list");
            let outcome = match company_contains.as_deref() {
                Some(needle) => service.customers_by_company(needle, skip, take),
                None => service.get_all(Some(OrderBy::asc("id")), skip, take, &[]),
            };
            print(&outcome)?
        }
        Commands::Remove { id } => {
            info!("event=cli_command module=cli status=start command=remove");
            print(&write(&unit_of_work, || service.delete_by_id(&id))?)?
        }
        Commands::Count => {
            info!("event=cli_command module=cli status=start command=count");
            print(&service.get_count(None))?
        }
    };

    unit_of_work.dispose();
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Runs `call` as one committed unit; anything short of success rolls back.
fn write<T>(unit_of_work: &UnitOfWork, call: impl FnOnce() -> Outcome<T>) -> Result<Outcome<T>> {
    unit_of_work.begin_transaction(IsolationLevel::Serializable)?;

    let outcome = call();
    if outcome.has_error() {
        unit_of_work.rollback_transaction()?;
        return Ok(outcome);
    }

    if let Err(err) = unit_of_work.save_changes() {
        unit_of_work.rollback_transaction()?;
        return Ok(Outcome::from_fault(err));
    }
    unit_of_work.commit_transaction()?;
    Ok(outcome)
}

fn print<T: Serialize>(outcome: &Outcome<T>) -> Result<bool> {
    println!("{}", serde_json::to_string(outcome)?);
    Ok(outcome.succeeded())
}
