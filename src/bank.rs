// 🏦 Bank Service - every balance-changing operation lives here
//
// Rules:
// - One guard (`check_solvent`) checks the bankrupt flag before any money
//   moves or loans are listed. Money movements check it inside their own
//   transaction, so a flag stored by another process is seen immediately.
// - Every mutation runs in a single IMMEDIATE SQLite transaction: the balance
//   read, the balance write, the ledger entry and the audit event commit
//   together or not at all, and concurrent writers are serialized by the
//   database lock.
// - Failures come back as `BankError`; callers render them uniformly.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::BankSettings;
use crate::db::{self, Event};
use crate::entities::account::ACCOUNT_NUMBER_OFFSET;
use crate::entities::{
    Account, AccountProfile, Address, NewTransaction, Transaction, TransactionType,
};
use crate::error::{BankError, Result};
use crate::money::{self, format_amount};
use crate::report::{self, DateRange, TransactionReport};

// ============================================================================
// POLICY
// ============================================================================

/// What a withdrawal (or outgoing transfer) may do to the balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverdraftPolicy {
    /// Amount must not exceed the balance
    #[default]
    Reject,
    /// Balance may go negative
    Allow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Max approved, unpaid loans per account
    pub loan_limit: u32,
    pub overdraft: OverdraftPolicy,
    pub account_number_offset: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            loan_limit: 3,
            overdraft: OverdraftPolicy::Reject,
            account_number_offset: ACCOUNT_NUMBER_OFFSET,
        }
    }
}

// ============================================================================
// BANKRUPT FLAG
// ============================================================================

/// Shared kill-switch handle; clones observe the same value
#[derive(Debug, Clone, Default)]
pub struct BankruptFlag(Arc<AtomicBool>);

impl BankruptFlag {
    pub fn new(bankrupt: bool) -> Self {
        BankruptFlag(Arc::new(AtomicBool::new(bankrupt)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, bankrupt: bool) {
        self.0.store(bankrupt, Ordering::SeqCst);
    }
}

// ============================================================================
// RECEIPT
// ============================================================================

/// Result of a successful money operation
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    /// Account state after the operation
    pub account: Account,
    /// Ledger entry written or updated
    pub transaction: Transaction,
    pub message: String,
}

// ============================================================================
// BANK
// ============================================================================

pub struct Bank {
    conn: Connection,
    policy: Policy,
    bankrupt: BankruptFlag,
    clock: Arc<dyn Clock>,
}

impl Bank {
    pub fn new(
        conn: Connection,
        policy: Policy,
        bankrupt: BankruptFlag,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Bank {
            conn,
            policy,
            bankrupt,
            clock,
        }
    }

    /// Production wiring: stored flag wins over the configured default
    pub fn open(conn: Connection, settings: &BankSettings) -> Result<Self> {
        db::setup_database(&conn)?;
        let stored = db::load_bankrupt(&conn)?;
        let flag = BankruptFlag::new(stored.unwrap_or(settings.bankrupt));

        Ok(Bank::new(conn, settings.policy(), flag, Arc::new(SystemClock)))
    }

    pub fn bankrupt_flag(&self) -> BankruptFlag {
        self.bankrupt.clone()
    }

    /// Current flag; the stored row wins over the handle once it exists
    pub fn is_bankrupt(&self) -> Result<bool> {
        sync_bankrupt(&self.conn, &self.bankrupt)?;
        Ok(self.bankrupt.is_set())
    }

    /// Gate for reads that are refused while bankrupt
    pub fn ensure_solvent(&self) -> Result<()> {
        check_solvent(&self.conn, &self.bankrupt)
    }

    /// Flip the kill-switch and persist it
    pub fn set_bankrupt(&mut self, bankrupt: bool) -> Result<()> {
        self.atomically(|conn, _, now| {
            db::store_bankrupt(conn, bankrupt)?;
            let event = Event::new(
                "bankrupt_set",
                "bank",
                "bankrupt",
                serde_json::json!({ "bankrupt": bankrupt }),
                "admin",
                now,
            );
            db::insert_event(conn, &event)
        })?;

        self.bankrupt.set(bankrupt);
        warn!(bankrupt, "bankrupt flag changed");
        Ok(())
    }

    // ========================================================================
    // ACCOUNTS
    // ========================================================================

    /// Open the owner's account (balance 0.00) together with their address
    pub fn open_account(
        &mut self,
        owner_id: i64,
        profile: &AccountProfile,
        address: &Address,
    ) -> Result<Account> {
        let account_no = match Account::number_for(owner_id, self.policy.account_number_offset) {
            Some(no) => no,
            None => {
                warn!(owner_id, "account opening rejected: invalid owner id");
                return Err(BankError::InvalidOwner(owner_id));
            }
        };

        let result = self.atomically(|conn, _, now| {
            if db::get_account_by_owner(conn, owner_id)?.is_some() {
                return Err(BankError::DuplicateAccount(owner_id));
            }

            let account = db::insert_account(conn, owner_id, account_no, profile, now)?;
            db::insert_address(
                conn,
                &Address {
                    owner_id,
                    ..address.clone()
                },
            )?;

            record(
                conn,
                "account_opened",
                &account,
                serde_json::json!({
                    "owner_id": owner_id,
                    "account_type": profile.account_type.as_str(),
                }),
                "admin",
                now,
            )?;

            Ok(account)
        });

        match &result {
            Ok(account) => info!(owner_id, account_no = account.account_no, "account opened"),
            Err(e) => warn!(owner_id, error = %e, "account opening rejected"),
        }
        result
    }

    pub fn account(&self, account_no: i64) -> Result<Account> {
        load_account(&self.conn, account_no)
    }

    pub fn account_for_owner(&self, owner_id: i64) -> Result<Account> {
        db::get_account_by_owner(&self.conn, owner_id)?.ok_or(BankError::AccountNotFound)
    }

    pub fn address(&self, owner_id: i64) -> Result<Option<Address>> {
        db::get_address(&self.conn, owner_id)
    }

    // ========================================================================
    // MONEY MOVEMENT
    // ========================================================================

    pub fn deposit(&mut self, account_no: i64, amount: Decimal) -> Result<Receipt> {
        let result = self.deposit_inner(account_no, amount);
        trace_outcome("deposit", account_no, amount, &result);
        result
    }

    fn deposit_inner(&mut self, account_no: i64, amount: Decimal) -> Result<Receipt> {
        self.guarded(|conn, _, now| {
            let amount = money::validate_amount(amount)?;
            let mut account = load_account(conn, account_no)?;
            account.balance += amount;
            db::update_balance(conn, account.id, account.balance)?;

            let transaction = db::insert_transaction(
                conn,
                &NewTransaction::new(account.id, TransactionType::Deposit, amount, account.balance),
                now,
            )?;
            record_movement(conn, "deposit", &account, &transaction, now)?;

            Ok(Receipt {
                message: format!(
                    "{}$ was deposited to your account successfully",
                    format_amount(amount)
                ),
                account,
                transaction,
            })
        })
    }

    pub fn withdraw(&mut self, account_no: i64, amount: Decimal) -> Result<Receipt> {
        let result = self.withdraw_inner(account_no, amount);
        trace_outcome("withdraw", account_no, amount, &result);
        result
    }

    fn withdraw_inner(&mut self, account_no: i64, amount: Decimal) -> Result<Receipt> {
        self.guarded(|conn, policy, now| {
            let amount = money::validate_amount(amount)?;
            let mut account = load_account(conn, account_no)?;
            check_overdraft(policy, &account, amount)?;

            account.balance -= amount;
            db::update_balance(conn, account.id, account.balance)?;

            let transaction = db::insert_transaction(
                conn,
                &NewTransaction::new(
                    account.id,
                    TransactionType::Withdrawal,
                    amount,
                    account.balance,
                ),
                now,
            )?;
            record_movement(conn, "withdrawal", &account, &transaction, now)?;

            Ok(Receipt {
                message: format!(
                    "Successfully withdrawn {}$ from your account",
                    format_amount(amount)
                ),
                account,
                transaction,
            })
        })
    }

    /// File a loan request; the balance only changes once it is approved
    pub fn request_loan(&mut self, account_no: i64, amount: Decimal) -> Result<Receipt> {
        let result = self.request_loan_inner(account_no, amount);
        trace_outcome("loan_request", account_no, amount, &result);
        result
    }

    fn request_loan_inner(&mut self, account_no: i64, amount: Decimal) -> Result<Receipt> {
        self.guarded(|conn, policy, now| {
            let amount = money::validate_amount(amount)?;
            let account = load_account(conn, account_no)?;
            check_loan_limit(conn, policy, &account)?;

            let transaction = db::insert_transaction(
                conn,
                &NewTransaction::new(account.id, TransactionType::Loan, amount, account.balance),
                now,
            )?;
            record_movement(conn, "loan_requested", &account, &transaction, now)?;

            Ok(Receipt {
                message: format!(
                    "Loan request for {}$ submitted successfully",
                    format_amount(amount)
                ),
                account,
                transaction,
            })
        })
    }

    /// Administrative approval: marks the loan approved and credits the account
    pub fn approve_loan(&mut self, loan_id: i64) -> Result<Receipt> {
        let result = self.approve_loan_inner(loan_id);
        match &result {
            Ok(receipt) => info!(
                loan_id,
                account_no = receipt.account.account_no,
                amount = %receipt.transaction.amount,
                "loan approved"
            ),
            Err(e) if e.is_rejection() => warn!(loan_id, error = %e, "loan approval rejected"),
            Err(e) => error!(loan_id, error = %e, "loan approval failed"),
        }
        result
    }

    fn approve_loan_inner(&mut self, loan_id: i64) -> Result<Receipt> {
        self.guarded(|conn, policy, now| {
            let mut loan = db::get_transaction(conn, loan_id)?.ok_or(BankError::LoanNotFound(loan_id))?;
            match loan.transaction_type {
                TransactionType::Loan if !loan.loan_approved => {}
                TransactionType::Loan | TransactionType::LoanPaid => {
                    return Err(BankError::LoanNotPending(loan_id))
                }
                _ => return Err(BankError::LoanNotFound(loan_id)),
            }

            let mut account = db::get_account(conn, loan.account_id)?.ok_or(BankError::AccountNotFound)?;
            check_loan_limit(conn, policy, &account)?;

            account.balance += loan.amount;
            db::update_balance(conn, account.id, account.balance)?;

            loan.loan_approved = true;
            loan.balance_after_transaction = account.balance;
            db::update_loan(conn, &loan)?;
            record(
                conn,
                "loan_approved",
                &account,
                serde_json::json!({
                    "loan_id": loan.id,
                    "amount": money::to_sql(loan.amount),
                    "balance_after": money::to_sql(account.balance),
                }),
                "admin",
                now,
            )?;

            Ok(Receipt {
                message: format!(
                    "Loan of {}$ approved for account {}",
                    format_amount(loan.amount),
                    account.account_no
                ),
                account,
                transaction: loan,
            })
        })
    }

    /// Pay back an approved loan from the account balance
    pub fn pay_loan(&mut self, account_no: i64, loan_id: i64) -> Result<Receipt> {
        let result = self.pay_loan_inner(account_no, loan_id);
        match &result {
            Ok(receipt) => info!(
                account_no,
                loan_id,
                amount = %receipt.transaction.amount,
                "loan paid"
            ),
            Err(e) if e.is_rejection() => {
                warn!(account_no, loan_id, error = %e, "loan payment rejected")
            }
            Err(e) => error!(account_no, loan_id, error = %e, "loan payment failed"),
        }
        result
    }

    fn pay_loan_inner(&mut self, account_no: i64, loan_id: i64) -> Result<Receipt> {
        self.guarded(|conn, _, now| {
            let mut account = load_account(conn, account_no)?;
            let mut loan = db::get_transaction(conn, loan_id)?
                .filter(|t| t.account_id == account.id)
                .ok_or(BankError::LoanNotFound(loan_id))?;

            match loan.transaction_type {
                TransactionType::Loan => {}
                TransactionType::LoanPaid => return Err(BankError::LoanAlreadyPaid(loan_id)),
                _ => return Err(BankError::LoanNotFound(loan_id)),
            }
            if !loan.loan_approved {
                return Err(BankError::LoanNotApproved(loan_id));
            }
            // strictly less: paying the exact balance is refused
            if loan.amount >= account.balance {
                return Err(BankError::InsufficientBalance {
                    balance: account.balance,
                    requested: loan.amount,
                });
            }

            account.balance -= loan.amount;
            db::update_balance(conn, account.id, account.balance)?;

            loan.balance_after_transaction = account.balance;
            loan.transaction_type = TransactionType::LoanPaid;
            db::update_loan(conn, &loan)?;
            record_movement(conn, "loan_paid", &account, &loan, now)?;

            Ok(Receipt {
                message: format!("Loan of {}$ paid successfully", format_amount(loan.amount)),
                account,
                transaction: loan,
            })
        })
    }

    /// Move money to another account; one ledger entry, on the sender
    pub fn transfer(&mut self, account_no: i64, to_account_no: i64, amount: Decimal) -> Result<Receipt> {
        let result = self.transfer_inner(account_no, to_account_no, amount);
        match &result {
            Ok(_) => info!(account_no, to_account_no, amount = %amount, "transfer completed"),
            Err(e) if e.is_rejection() => {
                warn!(account_no, to_account_no, amount = %amount, error = %e, "transfer rejected")
            }
            Err(e) => error!(account_no, to_account_no, error = %e, "transfer failed"),
        }
        result
    }

    fn transfer_inner(&mut self, account_no: i64, to_account_no: i64, amount: Decimal) -> Result<Receipt> {
        self.guarded(|conn, policy, now| {
            let amount = money::validate_amount(amount)?;
            let mut sender = load_account(conn, account_no)?;
            let mut recipient = db::get_account_by_number(conn, to_account_no)?
                .ok_or(BankError::UnknownTransferTarget(to_account_no))?;
            if recipient.id == sender.id {
                return Err(BankError::SelfTransfer);
            }
            check_overdraft(policy, &sender, amount)?;

            sender.balance -= amount;
            recipient.balance += amount;
            db::update_balance(conn, sender.id, sender.balance)?;
            db::update_balance(conn, recipient.id, recipient.balance)?;

            let transaction = db::insert_transaction(
                conn,
                &NewTransaction::new(sender.id, TransactionType::Transfer, amount, sender.balance)
                    .with_transfer_account(recipient.account_no),
                now,
            )?;
            record_movement(conn, "transfer_sent", &sender, &transaction, now)?;
            record(
                conn,
                "transfer_received",
                &recipient,
                serde_json::json!({
                    "transaction_id": transaction.id,
                    "from_account_no": sender.account_no,
                    "amount": money::to_sql(amount),
                }),
                &format!("account:{}", sender.account_no),
                now,
            )?;

            Ok(Receipt {
                message: format!(
                    "Successfully transferred {}$ to account {}",
                    format_amount(amount),
                    recipient.account_no
                ),
                account: sender,
                transaction,
            })
        })
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Loan entries still of type Loan (pending or approved)
    pub fn loans(&self, account_no: i64) -> Result<Vec<Transaction>> {
        self.ensure_solvent()?;
        let account = load_account(&self.conn, account_no)?;
        db::get_loans_for_account(&self.conn, account.id)
    }

    /// Statement for the account, optionally limited to a date range
    pub fn report(&self, account_no: i64, range: DateRange) -> Result<TransactionReport> {
        let account = load_account(&self.conn, account_no)?;
        let transactions =
            db::get_transactions_for_account(&self.conn, account.id, range.start, range.end)?;
        Ok(report::build(account, range, transactions))
    }

    pub fn transaction_count(&self, account_no: i64) -> Result<i64> {
        let account = load_account(&self.conn, account_no)?;
        db::count_transactions(&self.conn, account.id)
    }

    /// Audit trail for the account, newest first
    pub fn events(&self, account_no: i64) -> Result<Vec<Event>> {
        db::get_events_for_entity(&self.conn, "account", &account_no.to_string())
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Run `f` in an IMMEDIATE transaction; commit on Ok, roll back on Err
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, &Policy, DateTime<Utc>) -> Result<T>,
    {
        let now = self.clock.now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&*tx, &self.policy, now)?;
        tx.commit()?;
        Ok(value)
    }

    /// `atomically`, refused while bankrupt; the flag is read under the write lock
    fn guarded<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, &Policy, DateTime<Utc>) -> Result<T>,
    {
        let flag = self.bankrupt.clone();
        self.atomically(|conn, policy, now| {
            check_solvent(conn, &flag)?;
            f(conn, policy, now)
        })
    }
}

/// Pull the stored flag into the handle; without a stored row the handle stands
fn sync_bankrupt(conn: &Connection, flag: &BankruptFlag) -> Result<()> {
    if let Some(stored) = db::load_bankrupt(conn)? {
        flag.set(stored);
    }
    Ok(())
}

fn check_solvent(conn: &Connection, flag: &BankruptFlag) -> Result<()> {
    sync_bankrupt(conn, flag)?;
    if flag.is_set() {
        return Err(BankError::Bankrupt);
    }
    Ok(())
}

fn load_account(conn: &Connection, account_no: i64) -> Result<Account> {
    db::get_account_by_number(conn, account_no)?.ok_or(BankError::AccountNotFound)
}

fn check_overdraft(policy: &Policy, account: &Account, amount: Decimal) -> Result<()> {
    if policy.overdraft == OverdraftPolicy::Reject && amount > account.balance {
        return Err(BankError::InsufficientBalance {
            balance: account.balance,
            requested: amount,
        });
    }
    Ok(())
}

fn check_loan_limit(conn: &Connection, policy: &Policy, account: &Account) -> Result<()> {
    let approved = db::count_approved_loans(conn, account.id)?;
    if approved >= policy.loan_limit {
        return Err(BankError::LoanLimitExceeded {
            limit: policy.loan_limit,
        });
    }
    Ok(())
}

fn record(
    conn: &Connection,
    event_type: &str,
    account: &Account,
    data: serde_json::Value,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let event = Event::new(
        event_type,
        "account",
        &account.account_no.to_string(),
        data,
        actor,
        now,
    );
    db::insert_event(conn, &event)
}

fn record_movement(
    conn: &Connection,
    event_type: &str,
    account: &Account,
    transaction: &Transaction,
    now: DateTime<Utc>,
) -> Result<()> {
    record(
        conn,
        event_type,
        account,
        serde_json::json!({
            "transaction_id": transaction.id,
            "amount": money::to_sql(transaction.amount),
            "balance_after": money::to_sql(transaction.balance_after_transaction),
            "transfer_account_no": transaction.transfer_account_no,
        }),
        &format!("account:{}", account.account_no),
        now,
    )
}

fn trace_outcome(op: &str, account_no: i64, amount: Decimal, result: &Result<Receipt>) {
    match result {
        Ok(receipt) => info!(
            op,
            account_no,
            amount = %amount,
            balance = %receipt.account.balance,
            "operation completed"
        ),
        Err(e) if e.is_rejection() => {
            warn!(op, account_no, amount = %amount, error = %e, "operation rejected")
        }
        Err(e) => error!(op, account_no, amount = %amount, error = %e, "operation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entities::{AccountType, Gender};
    use chrono::{NaiveDate, TimeZone};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn profile() -> AccountProfile {
        AccountProfile {
            account_type: AccountType::Savings,
            gender: Gender::Male,
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
        }
    }

    fn address() -> Address {
        Address {
            owner_id: 0,
            street_address: "7 Mirpur Road".to_string(),
            city: "Dhaka".to_string(),
            postal_code: 1216,
            country: "Bangladesh".to_string(),
        }
    }

    fn bank_with(policy: Policy) -> Bank {
        let conn = db::open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
        Bank::new(conn, policy, BankruptFlag::default(), clock)
    }

    fn test_bank() -> Bank {
        bank_with(Policy::default())
    }

    /// Open an account for `owner_id` and fund it through a deposit
    fn funded(bank: &mut Bank, owner_id: i64, balance: &str) -> i64 {
        let account = bank.open_account(owner_id, &profile(), &address()).unwrap();
        if d(balance) > Decimal::ZERO {
            bank.deposit(account.account_no, d(balance)).unwrap();
        }
        account.account_no
    }

    fn ledger(bank: &Bank, account_no: i64) -> Vec<Transaction> {
        bank.report(account_no, DateRange::default()).unwrap().transactions
    }

    mod accounts {
        use super::*;

        #[test]
        fn test_open_account_derives_number() {
            let mut bank = test_bank();
            let account = bank.open_account(42, &profile(), &address()).unwrap();

            assert_eq!(account.account_no, 100_042);
            assert_eq!(account.balance, Decimal::ZERO);
            assert_eq!(bank.account_for_owner(42).unwrap().account_no, 100_042);
            assert_eq!(bank.address(42).unwrap().unwrap().owner_id, 42);
        }

        #[test]
        fn test_open_account_twice_is_rejected() {
            let mut bank = test_bank();
            bank.open_account(1, &profile(), &address()).unwrap();

            let err = bank.open_account(1, &profile(), &address()).unwrap_err();
            assert!(matches!(err, BankError::DuplicateAccount(1)));
        }

        #[test]
        fn test_open_account_rejects_bad_owner_ids() {
            let mut bank = test_bank();

            for owner_id in [0, -3, i64::MAX] {
                let err = bank.open_account(owner_id, &profile(), &address()).unwrap_err();
                assert!(matches!(err, BankError::InvalidOwner(id) if id == owner_id));
            }
            assert!(matches!(bank.account_for_owner(i64::MAX), Err(BankError::AccountNotFound)));
        }

        #[test]
        fn test_open_account_reports_number_clash() {
            let conn = db::open_in_memory().unwrap();
            let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()));
            let mut bank = Bank::new(conn, Policy::default(), BankruptFlag::default(), clock);
            bank.open_account(5, &profile(), &address()).unwrap(); // 100_005

            bank.policy.account_number_offset = 100_000 - 1;
            let err = bank.open_account(6, &profile(), &address()).unwrap_err();
            assert!(matches!(err, BankError::AccountNumberTaken(100_005)));
        }

        #[test]
        fn test_unknown_account() {
            let mut bank = test_bank();
            assert!(matches!(bank.account(100_001), Err(BankError::AccountNotFound)));
            assert!(matches!(
                bank.deposit(100_001, d("10")),
                Err(BankError::AccountNotFound)
            ));
        }
    }

    mod deposits {
        use super::*;

        #[test]
        fn test_deposit_increases_balance_and_writes_one_entry() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "1000.00");

            let receipt = bank.deposit(a, d("250.00")).unwrap();

            assert_eq!(receipt.account.balance, d("1250.00"));
            assert_eq!(receipt.transaction.transaction_type, TransactionType::Deposit);
            assert_eq!(receipt.transaction.amount, d("250.00"));
            assert_eq!(receipt.transaction.balance_after_transaction, d("1250.00"));
            assert_eq!(
                receipt.message,
                "250.00$ was deposited to your account successfully"
            );
            assert_eq!(bank.account(a).unwrap().balance, d("1250.00"));
            assert_eq!(bank.transaction_count(a).unwrap(), 2);
        }

        #[test]
        fn test_deposit_rejects_invalid_amount() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "0");

            assert!(matches!(bank.deposit(a, d("0")), Err(BankError::InvalidAmount(_))));
            assert!(matches!(bank.deposit(a, d("-1")), Err(BankError::InvalidAmount(_))));
            assert_eq!(bank.transaction_count(a).unwrap(), 0);
        }

        #[test]
        fn test_deposit_writes_audit_event() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "0");
            bank.deposit(a, d("75")).unwrap();

            let events = bank.events(a).unwrap();
            assert_eq!(events[0].event_type, "deposit");
            assert_eq!(events[0].data["amount"], "75.00");
            assert_eq!(events[0].actor, format!("account:{}", a));
        }
    }

    mod withdrawals {
        use super::*;

        #[test]
        fn test_withdrawal_decreases_balance() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "1250.00");

            let receipt = bank.withdraw(a, d("250")).unwrap();

            assert_eq!(receipt.account.balance, d("1000.00"));
            assert_eq!(receipt.transaction.transaction_type, TransactionType::Withdrawal);
            assert_eq!(receipt.transaction.balance_after_transaction, d("1000.00"));
            assert_eq!(receipt.message, "Successfully withdrawn 250.00$ from your account");
        }

        #[test]
        fn test_overdraft_rejected_by_default() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "1250.00");

            let err = bank.withdraw(a, d("1300.00")).unwrap_err();

            assert!(matches!(err, BankError::InsufficientBalance { .. }));
            assert_eq!(bank.account(a).unwrap().balance, d("1250.00"));
            assert_eq!(bank.transaction_count(a).unwrap(), 1);
        }

        #[test]
        fn test_withdrawing_entire_balance_is_allowed() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "100");

            let receipt = bank.withdraw(a, d("100")).unwrap();
            assert_eq!(receipt.account.balance, Decimal::ZERO);
        }

        #[test]
        fn test_overdraft_allowed_by_policy() {
            let mut bank = bank_with(Policy {
                overdraft: OverdraftPolicy::Allow,
                ..Policy::default()
            });
            let a = funded(&mut bank, 1, "1250.00");

            let receipt = bank.withdraw(a, d("1300.00")).unwrap();

            assert_eq!(receipt.account.balance, d("-50.00"));
            assert!(receipt.account.is_overdrawn());
        }
    }

    mod loans {
        use super::*;

        #[test]
        fn test_loan_request_does_not_move_money() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "100");

            let receipt = bank.request_loan(a, d("500")).unwrap();

            assert_eq!(receipt.transaction.transaction_type, TransactionType::Loan);
            assert!(!receipt.transaction.loan_approved);
            assert_eq!(receipt.account.balance, d("100"));
            assert_eq!(bank.account(a).unwrap().balance, d("100"));
            assert_eq!(receipt.message, "Loan request for 500.00$ submitted successfully");
        }

        #[test]
        fn test_approval_credits_account() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "100");
            let loan = bank.request_loan(a, d("500")).unwrap().transaction;

            let receipt = bank.approve_loan(loan.id).unwrap();

            assert!(receipt.transaction.loan_approved);
            assert_eq!(receipt.transaction.balance_after_transaction, d("600"));
            assert_eq!(bank.account(a).unwrap().balance, d("600"));
        }

        #[test]
        fn test_approving_twice_is_rejected() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "0");
            let loan = bank.request_loan(a, d("500")).unwrap().transaction;
            bank.approve_loan(loan.id).unwrap();

            assert!(matches!(bank.approve_loan(loan.id), Err(BankError::LoanNotPending(_))));
            assert_eq!(bank.account(a).unwrap().balance, d("500"));
        }

        #[test]
        fn test_approving_non_loan_entry() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "10");
            let deposit_id = ledger(&bank, a)[0].id;

            assert!(matches!(bank.approve_loan(deposit_id), Err(BankError::LoanNotFound(_))));
            assert!(matches!(bank.approve_loan(999), Err(BankError::LoanNotFound(999))));
        }

        #[test]
        fn test_fourth_loan_request_rejected_after_three_approved() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "0");

            for _ in 0..3 {
                let loan = bank.request_loan(a, d("100")).unwrap().transaction;
                bank.approve_loan(loan.id).unwrap();
            }
            let entries_before = bank.transaction_count(a).unwrap();
            let balance_before = bank.account(a).unwrap().balance;

            let err = bank.request_loan(a, d("100")).unwrap_err();

            assert!(matches!(err, BankError::LoanLimitExceeded { limit: 3 }));
            assert_eq!(bank.transaction_count(a).unwrap(), entries_before);
            assert_eq!(bank.account(a).unwrap().balance, balance_before);
        }

        #[test]
        fn test_pending_loans_do_not_count_toward_limit() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "0");

            for _ in 0..5 {
                bank.request_loan(a, d("100")).unwrap();
            }
            assert_eq!(bank.loans(a).unwrap().len(), 5);
        }

        #[test]
        fn test_approval_respects_limit() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "0");
            let pending: Vec<i64> = (0..4)
                .map(|_| bank.request_loan(a, d("100")).unwrap().transaction.id)
                .collect();

            for id in &pending[..3] {
                bank.approve_loan(*id).unwrap();
            }

            let err = bank.approve_loan(pending[3]).unwrap_err();
            assert!(matches!(err, BankError::LoanLimitExceeded { limit: 3 }));
            assert_eq!(bank.account(a).unwrap().balance, d("300"));
        }

        #[test]
        fn test_paid_loans_free_a_slot() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "10000");

            let mut approved = Vec::new();
            for _ in 0..3 {
                let loan = bank.request_loan(a, d("100")).unwrap().transaction;
                approved.push(bank.approve_loan(loan.id).unwrap().transaction.id);
            }
            bank.pay_loan(a, approved[0]).unwrap();

            assert!(bank.request_loan(a, d("100")).is_ok());
        }

        #[test]
        fn test_pay_loan() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "1000");
            let loan = bank.request_loan(a, d("300")).unwrap().transaction;
            bank.approve_loan(loan.id).unwrap();

            let receipt = bank.pay_loan(a, loan.id).unwrap();

            assert_eq!(receipt.account.balance, d("1000"));
            assert_eq!(receipt.transaction.transaction_type, TransactionType::LoanPaid);
            assert!(receipt.transaction.loan_approved);
            assert_eq!(receipt.transaction.balance_after_transaction, d("1000"));
            // updated in place, no new ledger row
            assert_eq!(bank.transaction_count(a).unwrap(), 2);
            assert!(bank.loans(a).unwrap().is_empty());
        }

        #[test]
        fn test_pay_loan_requires_strictly_greater_balance() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "0");
            let loan = bank.request_loan(a, d("500")).unwrap().transaction;
            bank.approve_loan(loan.id).unwrap();
            // balance is exactly the loan amount now
            assert_eq!(bank.account(a).unwrap().balance, d("500"));

            let err = bank.pay_loan(a, loan.id).unwrap_err();

            assert!(matches!(err, BankError::InsufficientBalance { .. }));
            assert_eq!(bank.account(a).unwrap().balance, d("500"));
            assert_eq!(bank.loans(a).unwrap()[0].transaction_type, TransactionType::Loan);

            bank.deposit(a, d("0.01")).unwrap();
            let receipt = bank.pay_loan(a, loan.id).unwrap();
            assert_eq!(receipt.account.balance, d("0.01"));
        }

        #[test]
        fn test_pay_unapproved_loan_is_rejected() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "1000");
            let loan = bank.request_loan(a, d("100")).unwrap().transaction;

            assert!(matches!(bank.pay_loan(a, loan.id), Err(BankError::LoanNotApproved(_))));
            assert_eq!(bank.account(a).unwrap().balance, d("1000"));
        }

        #[test]
        fn test_pay_loan_twice_is_rejected() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "1000");
            let loan = bank.request_loan(a, d("100")).unwrap().transaction;
            bank.approve_loan(loan.id).unwrap();
            bank.pay_loan(a, loan.id).unwrap();

            assert!(matches!(bank.pay_loan(a, loan.id), Err(BankError::LoanAlreadyPaid(_))));
            assert_eq!(bank.account(a).unwrap().balance, d("1000"));
        }

        #[test]
        fn test_cannot_pay_someone_elses_loan() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "1000");
            let b = funded(&mut bank, 2, "1000");
            let loan = bank.request_loan(a, d("100")).unwrap().transaction;
            bank.approve_loan(loan.id).unwrap();

            assert!(matches!(bank.pay_loan(b, loan.id), Err(BankError::LoanNotFound(_))));
            assert_eq!(bank.account(b).unwrap().balance, d("1000"));
        }
    }

    mod transfers {
        use super::*;

        #[test]
        fn test_transfer_moves_money_and_writes_one_entry() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "500.00");
            let b = funded(&mut bank, 2, "300.00");
            let b_entries = bank.transaction_count(b).unwrap();

            let receipt = bank.transfer(a, b, d("200.00")).unwrap();

            assert_eq!(bank.account(a).unwrap().balance, d("300.00"));
            assert_eq!(bank.account(b).unwrap().balance, d("500.00"));
            assert_eq!(receipt.transaction.transaction_type, TransactionType::Transfer);
            assert_eq!(receipt.transaction.transfer_account_no, Some(b));
            assert_eq!(receipt.transaction.balance_after_transaction, d("300.00"));
            assert_eq!(bank.transaction_count(a).unwrap(), 2);
            assert_eq!(bank.transaction_count(b).unwrap(), b_entries);
            assert_eq!(
                receipt.message,
                format!("Successfully transferred 200.00$ to account {}", b)
            );
        }

        #[test]
        fn test_transfer_to_unknown_account() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "500");

            let err = bank.transfer(a, 999_999, d("100")).unwrap_err();

            assert!(matches!(err, BankError::UnknownTransferTarget(999_999)));
            assert_eq!(bank.account(a).unwrap().balance, d("500"));
            assert_eq!(bank.transaction_count(a).unwrap(), 1);
        }

        #[test]
        fn test_transfer_to_self_is_rejected() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "500");

            assert!(matches!(bank.transfer(a, a, d("1")), Err(BankError::SelfTransfer)));
        }

        #[test]
        fn test_transfer_respects_overdraft_policy() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "50");
            let b = funded(&mut bank, 2, "0");

            let err = bank.transfer(a, b, d("60")).unwrap_err();
            assert!(matches!(err, BankError::InsufficientBalance { .. }));
            assert_eq!(bank.account(a).unwrap().balance, d("50"));
            assert_eq!(bank.account(b).unwrap().balance, d("0"));
        }

        #[test]
        fn test_transfer_is_audited_on_both_sides() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "500");
            let b = funded(&mut bank, 2, "0");
            bank.transfer(a, b, d("20")).unwrap();

            assert_eq!(bank.events(a).unwrap()[0].event_type, "transfer_sent");
            assert_eq!(bank.events(b).unwrap()[0].event_type, "transfer_received");
        }
    }

    mod bankrupt {
        use super::*;

        #[test]
        fn test_bankrupt_blocks_every_money_movement() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "1000");
            let b = funded(&mut bank, 2, "1000");
            let loan = bank.request_loan(a, d("100")).unwrap().transaction;
            let approved = bank.request_loan(a, d("100")).unwrap().transaction;
            bank.approve_loan(approved.id).unwrap();

            let entries_a = bank.transaction_count(a).unwrap();
            let entries_b = bank.transaction_count(b).unwrap();
            let balance_a = bank.account(a).unwrap().balance;

            bank.set_bankrupt(true).unwrap();

            assert!(matches!(bank.deposit(a, d("1")), Err(BankError::Bankrupt)));
            assert!(matches!(bank.withdraw(a, d("1")), Err(BankError::Bankrupt)));
            assert!(matches!(bank.request_loan(a, d("1")), Err(BankError::Bankrupt)));
            assert!(matches!(bank.approve_loan(loan.id), Err(BankError::Bankrupt)));
            assert!(matches!(bank.pay_loan(a, approved.id), Err(BankError::Bankrupt)));
            assert!(matches!(bank.transfer(a, b, d("1")), Err(BankError::Bankrupt)));
            assert!(matches!(bank.loans(a), Err(BankError::Bankrupt)));

            assert_eq!(bank.transaction_count(a).unwrap(), entries_a);
            assert_eq!(bank.transaction_count(b).unwrap(), entries_b);
            assert_eq!(bank.account(a).unwrap().balance, balance_a);
            assert_eq!(bank.account(b).unwrap().balance, d("1000"));

            // reports stay readable
            assert!(bank.report(a, DateRange::default()).is_ok());
        }

        #[test]
        fn test_flag_is_shared_and_reversible() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "10");

            let handle = bank.bankrupt_flag();
            handle.set(true);
            assert!(bank.is_bankrupt().unwrap());
            assert!(matches!(bank.deposit(a, d("1")), Err(BankError::Bankrupt)));

            handle.set(false);
            assert!(bank.deposit(a, d("1")).is_ok());
        }

        #[test]
        fn test_open_restores_stored_flag() {
            let conn = db::open_in_memory().unwrap();
            db::store_bankrupt(&conn, true).unwrap();

            let settings = BankSettings {
                bankrupt: false,
                loan_limit: 3,
                overdraft: OverdraftPolicy::Reject,
                account_number_offset: ACCOUNT_NUMBER_OFFSET,
            };
            let bank = Bank::open(conn, &settings).unwrap();
            assert!(bank.is_bankrupt().unwrap());
        }

        #[test]
        fn test_open_uses_configured_default_when_never_stored() {
            let settings = BankSettings {
                bankrupt: true,
                loan_limit: 3,
                overdraft: OverdraftPolicy::Reject,
                account_number_offset: ACCOUNT_NUMBER_OFFSET,
            };
            let bank = Bank::open(db::open_in_memory().unwrap(), &settings).unwrap();
            assert!(bank.is_bankrupt().unwrap());
        }

        #[test]
        fn test_stored_flag_is_read_on_every_operation() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "100");

            // written behind the handle's back, as another process would
            db::store_bankrupt(&bank.conn, true).unwrap();
            assert!(matches!(bank.deposit(a, d("5")), Err(BankError::Bankrupt)));
            assert!(matches!(bank.loans(a), Err(BankError::Bankrupt)));
            assert!(bank.is_bankrupt().unwrap());
            assert_eq!(bank.transaction_count(a).unwrap(), 1);

            db::store_bankrupt(&bank.conn, false).unwrap();
            assert!(bank.deposit(a, d("5")).is_ok());
            assert!(!bank.is_bankrupt().unwrap());
        }

        #[test]
        fn test_bankrupt_is_reported_before_amount_validation() {
            let mut bank = test_bank();
            let a = funded(&mut bank, 1, "100");
            let b = funded(&mut bank, 2, "0");
            bank.set_bankrupt(true).unwrap();

            assert!(matches!(bank.deposit(a, d("0")), Err(BankError::Bankrupt)));
            assert!(matches!(bank.withdraw(a, d("-1")), Err(BankError::Bankrupt)));
            assert!(matches!(bank.request_loan(a, d("0.001")), Err(BankError::Bankrupt)));
            assert!(matches!(bank.transfer(a, b, d("0")), Err(BankError::Bankrupt)));
        }
    }
}
