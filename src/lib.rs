// Mamar Bank - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod bank;
pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod money;
pub mod outcome;
pub mod report;
pub mod telemetry;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use bank::{Bank, BankruptFlag, OverdraftPolicy, Policy, Receipt};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BankConfig, BankSettings, ConfigError};
pub use db::{open, open_in_memory, setup_database, Event};
pub use entities::{
    Account, AccountProfile, AccountType, Address, Gender, NewTransaction, Transaction,
    TransactionType,
};
pub use error::{BankError, Result};
pub use outcome::Outcome;
pub use report::{DateRange, TransactionReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
