// 📒 Transaction Entity - one ledger entry per balance-changing action
//
// Entries are append-only, with one exception: loan entries are updated in
// place when approved (loan_approved = true) and when paid off
// (transaction_type = LoanPaid).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Loan,
    LoanPaid,
    Transfer,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Deposit,
        TransactionType::Withdrawal,
        TransactionType::Loan,
        TransactionType::LoanPaid,
        TransactionType::Transfer,
    ];

    /// Stored integer code
    pub fn code(&self) -> i64 {
        match self {
            TransactionType::Deposit => 1,
            TransactionType::Withdrawal => 2,
            TransactionType::Loan => 3,
            TransactionType::LoanPaid => 4,
            TransactionType::Transfer => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(TransactionType::Deposit),
            2 => Some(TransactionType::Withdrawal),
            3 => Some(TransactionType::Loan),
            4 => Some(TransactionType::LoanPaid),
            5 => Some(TransactionType::Transfer),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "Deposit",
            TransactionType::Withdrawal => "Withdrawal",
            TransactionType::Loan => "Loan",
            TransactionType::LoanPaid => "Loan Paid",
            TransactionType::Transfer => "Transfer Money",
        }
    }
}

// ============================================================================
// TRANSACTION ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub amount: Decimal,

    /// Balance snapshot of the owning account right after this entry
    pub balance_after_transaction: Decimal,

    pub transaction_type: TransactionType,

    /// Creation time, never updated
    pub timestamp: DateTime<Utc>,

    pub loan_approved: bool,

    /// Destination account number (transfers only)
    pub transfer_account_no: Option<i64>,
}

impl Transaction {
    /// Loan still waiting for approval
    pub fn is_pending_loan(&self) -> bool {
        self.transaction_type == TransactionType::Loan && !self.loan_approved
    }

    /// Approved loan not yet paid off; these count toward the loan limit
    pub fn is_outstanding_loan(&self) -> bool {
        self.transaction_type == TransactionType::Loan && self.loan_approved
    }
}

/// Insert payload for a ledger entry; id and timestamp are assigned on write
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: i64,
    pub amount: Decimal,
    pub balance_after_transaction: Decimal,
    pub transaction_type: TransactionType,
    pub loan_approved: bool,
    pub transfer_account_no: Option<i64>,
}

impl NewTransaction {
    pub fn new(
        account_id: i64,
        transaction_type: TransactionType,
        amount: Decimal,
        balance_after_transaction: Decimal,
    ) -> Self {
        NewTransaction {
            account_id,
            amount,
            balance_after_transaction,
            transaction_type,
            loan_approved: false,
            transfer_account_no: None,
        }
    }

    pub fn with_transfer_account(mut self, account_no: i64) -> Self {
        self.transfer_account_no = Some(account_no);
        self
    }
}
