// ⚠️ Bank Errors - one result type for every money-movement operation
//
// Every operation returns `Result<T, BankError>`. Front ends (CLI, TUI, HTTP)
// never special-case a failure: they render `Display` as the message and use
// `status_code()` when they need a transport status.

use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BankError>;

#[derive(Debug, Error)]
pub enum BankError {
    /// Global kill-switch is on: no money moves.
    #[error("Sorry the bank is bankrupted this time!")]
    Bankrupt,

    #[error("You have crossed the loan limit of {limit} approved loans")]
    LoanLimitExceeded { limit: u32 },

    #[error("Insufficient balance: requested {requested}, available {balance}")]
    InsufficientBalance { balance: Decimal, requested: Decimal },

    #[error("Transfer account not found! ({0})")]
    UnknownTransferTarget(i64),

    #[error("Cannot transfer money to the same account")]
    SelfTransfer,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Account not found")]
    AccountNotFound,

    #[error("Owner {0} already has a bank account")]
    DuplicateAccount(i64),

    #[error("Invalid owner id: {0}")]
    InvalidOwner(i64),

    /// Number derived for a new owner is held by an existing account
    #[error("Account number {0} is already taken")]
    AccountNumberTaken(i64),

    #[error("Loan {0} not found")]
    LoanNotFound(i64),

    #[error("Loan {0} has not been approved yet")]
    LoanNotApproved(i64),

    #[error("Loan {0} is not awaiting approval")]
    LoanNotPending(i64),

    #[error("Loan {0} is already paid")]
    LoanAlreadyPaid(i64),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored data could not be decoded (bad decimal, unknown type code, ...)
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl BankError {
    /// HTTP status code for the API layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Bankrupt => 503,
            Self::LoanLimitExceeded { .. } => 409,
            Self::InsufficientBalance { .. } => 409,
            Self::UnknownTransferTarget(_) => 404,
            Self::SelfTransfer => 400,
            Self::InvalidAmount(_) => 400,
            Self::InvalidDate(_) => 400,
            Self::AccountNotFound => 404,
            Self::DuplicateAccount(_) => 409,
            Self::InvalidOwner(_) => 400,
            Self::AccountNumberTaken(_) => 409,
            Self::LoanNotFound(_) => 404,
            Self::LoanNotApproved(_) => 409,
            Self::LoanNotPending(_) => 409,
            Self::LoanAlreadyPaid(_) => 409,
            Self::Database(_) => 500,
            Self::Corrupt(_) => 500,
        }
    }

    /// Rejections are expected business outcomes; everything else is a fault.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Corrupt(_))
    }
}
