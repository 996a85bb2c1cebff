use crate::entities::{Account, AccountProfile, Address, NewTransaction, Transaction, TransactionType};
use crate::error::{BankError, Result};
use crate::money;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Event for audit trail: every successful mutation leaves one behind
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// Connection & schema
// ============================================================================

/// Open (or create) the bank database at `path`
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    setup_database(&conn)?;
    Ok(conn)
}

/// In-memory database (tests, dry runs)
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER UNIQUE NOT NULL,
            account_no INTEGER UNIQUE NOT NULL,
            account_type TEXT NOT NULL,
            gender TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            balance TEXT NOT NULL DEFAULT '0.00',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER UNIQUE NOT NULL REFERENCES accounts(owner_id) ON DELETE CASCADE,
            street_address TEXT NOT NULL,
            city TEXT NOT NULL,
            postal_code INTEGER NOT NULL,
            country TEXT NOT NULL
        );

        -- Ledger: one row per balance-changing action
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            amount TEXT NOT NULL,
            balance_after_transaction TEXT NOT NULL,
            transaction_type INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            loan_approved INTEGER NOT NULL DEFAULT 0,
            transfer_account_no INTEGER
        );

        -- Single-row kill-switch
        CREATE TABLE IF NOT EXISTS bankrupt (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            bank_rupt INTEGER NOT NULL DEFAULT 0
        );

        -- Audit trail
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )?;

    Ok(())
}

// ============================================================================
// Column codecs
// ============================================================================

/// Fixed-width UTC text, so ORDER BY timestamp is chronological
pub fn timestamp_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn decimal_col(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    money::from_sql(&text).map_err(|e| conversion_error(idx, format!("'{}': {}", text, e)))
}

fn timestamp_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("'{}': {}", text, e)))
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map_err(|e| conversion_error(idx, format!("'{}': {}", text, e)))
}

fn parsed_col<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

/// Map decode failures to `Corrupt`, everything else to `Database`
fn classify(err: rusqlite::Error) -> BankError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(idx, _, cause) => {
            BankError::Corrupt(format!("column {}: {}", idx, cause))
        }
        other => BankError::Database(other),
    }
}

// ============================================================================
// Accounts & addresses
// ============================================================================

const ACCOUNT_COLUMNS: &str =
    "id, owner_id, account_type, gender, birth_date, account_no, balance, created_at";

fn account_from_row(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        account_type: parsed_col(row, 2)?,
        gender: parsed_col(row, 3)?,
        birth_date: date_col(row, 4)?,
        account_no: row.get(5)?,
        balance: decimal_col(row, 6)?,
        created_at: timestamp_col(row, 7)?,
    })
}

/// Insert a new account with a zero balance
pub fn insert_account(
    conn: &Connection,
    owner_id: i64,
    account_no: i64,
    profile: &AccountProfile,
    created_at: DateTime<Utc>,
) -> Result<Account> {
    let result = conn.execute(
        "INSERT INTO accounts (owner_id, account_no, account_type, gender, birth_date, balance, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            owner_id,
            account_no,
            profile.account_type.as_str(),
            profile.gender.as_str(),
            profile.birth_date.format("%Y-%m-%d").to_string(),
            money::to_sql(Decimal::ZERO),
            timestamp_to_sql(&created_at),
        ],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, msg))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            // e.g. "UNIQUE constraint failed: accounts.account_no"
            let msg = msg.unwrap_or_default();
            if msg.contains("accounts.account_no") && !msg.contains("accounts.owner_id") {
                return Err(BankError::AccountNumberTaken(account_no));
            }
            return Err(BankError::DuplicateAccount(owner_id));
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Account {
        id: conn.last_insert_rowid(),
        owner_id,
        account_type: profile.account_type,
        gender: profile.gender,
        birth_date: profile.birth_date,
        account_no,
        balance: money::round(Decimal::ZERO),
        created_at,
    })
}

fn find_account(conn: &Connection, column: &str, value: i64) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE {} = ?1", ACCOUNT_COLUMNS, column);
    conn.query_row(&sql, [value], account_from_row)
        .optional()
        .map_err(classify)
}

pub fn get_account(conn: &Connection, id: i64) -> Result<Option<Account>> {
    find_account(conn, "id", id)
}

pub fn get_account_by_owner(conn: &Connection, owner_id: i64) -> Result<Option<Account>> {
    find_account(conn, "owner_id", owner_id)
}

pub fn get_account_by_number(conn: &Connection, account_no: i64) -> Result<Option<Account>> {
    find_account(conn, "account_no", account_no)
}

pub fn update_balance(conn: &Connection, account_id: i64, balance: Decimal) -> Result<()> {
    let changed = conn.execute(
        "UPDATE accounts SET balance = ?1 WHERE id = ?2",
        params![money::to_sql(balance), account_id],
    )?;
    if changed == 0 {
        return Err(BankError::AccountNotFound);
    }
    Ok(())
}

pub fn insert_address(conn: &Connection, address: &Address) -> Result<()> {
    conn.execute(
        "INSERT INTO addresses (owner_id, street_address, city, postal_code, country)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            address.owner_id,
            address.street_address,
            address.city,
            address.postal_code,
            address.country,
        ],
    )?;
    Ok(())
}

pub fn get_address(conn: &Connection, owner_id: i64) -> Result<Option<Address>> {
    conn.query_row(
        "SELECT owner_id, street_address, city, postal_code, country
         FROM addresses WHERE owner_id = ?1",
        [owner_id],
        |row| {
            Ok(Address {
                owner_id: row.get(0)?,
                street_address: row.get(1)?,
                city: row.get(2)?,
                postal_code: row.get(3)?,
                country: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(classify)
}

// ============================================================================
// Ledger
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, account_id, amount, balance_after_transaction,
    transaction_type, timestamp, loan_approved, transfer_account_no";

fn transaction_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    let code: i64 = row.get(4)?;
    let transaction_type = TransactionType::from_code(code)
        .ok_or_else(|| conversion_error(4, format!("unknown transaction type {}", code)))?;

    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        amount: decimal_col(row, 2)?,
        balance_after_transaction: decimal_col(row, 3)?,
        transaction_type,
        timestamp: timestamp_col(row, 5)?,
        loan_approved: row.get(6)?,
        transfer_account_no: row.get(7)?,
    })
}

pub fn insert_transaction(
    conn: &Connection,
    new: &NewTransaction,
    timestamp: DateTime<Utc>,
) -> Result<Transaction> {
    let amount = money::round(new.amount);
    let balance_after = money::round(new.balance_after_transaction);

    conn.execute(
        "INSERT INTO transactions (
            account_id, amount, balance_after_transaction, transaction_type,
            timestamp, loan_approved, transfer_account_no
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new.account_id,
            money::to_sql(amount),
            money::to_sql(balance_after),
            new.transaction_type.code(),
            timestamp_to_sql(&timestamp),
            new.loan_approved,
            new.transfer_account_no,
        ],
    )?;

    Ok(Transaction {
        id: conn.last_insert_rowid(),
        account_id: new.account_id,
        amount,
        balance_after_transaction: balance_after,
        transaction_type: new.transaction_type,
        timestamp,
        loan_approved: new.loan_approved,
        transfer_account_no: new.transfer_account_no,
    })
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    let sql = format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS);
    conn.query_row(&sql, [id], transaction_from_row)
        .optional()
        .map_err(classify)
}

/// Persist the mutable loan fields: approval flag, type and balance snapshot
pub fn update_loan(conn: &Connection, loan: &Transaction) -> Result<()> {
    conn.execute(
        "UPDATE transactions
         SET loan_approved = ?1, transaction_type = ?2, balance_after_transaction = ?3
         WHERE id = ?4",
        params![
            loan.loan_approved,
            loan.transaction_type.code(),
            money::to_sql(loan.balance_after_transaction),
            loan.id,
        ],
    )?;
    Ok(())
}

/// Ledger for one account, optionally bounded by inclusive UTC dates
pub fn get_transactions_for_account(
    conn: &Connection,
    account_id: i64,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE account_id = ?1
           AND (?2 IS NULL OR substr(timestamp, 1, 10) >= ?2)
           AND (?3 IS NULL OR substr(timestamp, 1, 10) <= ?3)
         ORDER BY timestamp ASC, id ASC",
        TRANSACTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let start = start.map(|d| d.format("%Y-%m-%d").to_string());
    let end = end.map(|d| d.format("%Y-%m-%d").to_string());

    let transactions = stmt
        .query_map(params![account_id, start, end], transaction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(classify)?;

    Ok(transactions)
}

/// Loan entries (pending and approved, not paid) for one account
pub fn get_loans_for_account(conn: &Connection, account_id: i64) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE account_id = ?1 AND transaction_type = ?2
         ORDER BY timestamp ASC, id ASC",
        TRANSACTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let loans = stmt
        .query_map(params![account_id, TransactionType::Loan.code()], transaction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(classify)?;

    Ok(loans)
}

/// Approved, unpaid loans; this is what the loan limit counts
pub fn count_approved_loans(conn: &Connection, account_id: i64) -> Result<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions
         WHERE account_id = ?1 AND transaction_type = ?2 AND loan_approved = 1",
        params![account_id, TransactionType::Loan.code()],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

pub fn count_transactions(conn: &Connection, account_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE account_id = ?1",
        [account_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// Bankrupt flag
// ============================================================================

/// Stored flag, `None` when it was never written
pub fn load_bankrupt(conn: &Connection) -> Result<Option<bool>> {
    let flag = conn
        .query_row("SELECT bank_rupt FROM bankrupt WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    Ok(flag)
}

pub fn store_bankrupt(conn: &Connection, bankrupt: bool) -> Result<()> {
    conn.execute(
        "INSERT INTO bankrupt (id, bank_rupt) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET bank_rupt = excluded.bank_rupt",
        [bankrupt],
    )?;
    Ok(())
}

// ============================================================================
// Audit trail
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)
        .map_err(|e| BankError::Corrupt(format!("event data: {}", e)))?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            timestamp_to_sql(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_col(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| conversion_error(5, e.to_string()))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(classify)?;

    Ok(events)
}
