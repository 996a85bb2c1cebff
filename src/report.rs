// 📊 Transaction Report - statement for one account
//
// With a date range, `balance` is the sum of the account's own entries in
// that range. Without one, it is the account's current balance.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

use crate::entities::{Account, Transaction, TransactionType};
use crate::error::{BankError, Result};
use crate::money;

// ============================================================================
// DATE RANGE
// ============================================================================

/// Inclusive UTC calendar-date bounds; either side may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(BankError::InvalidDate(format!(
                    "start_date {} is after end_date {}",
                    s, e
                )));
            }
        }
        Ok(DateRange { start, end })
    }

    /// Parse ISO `YYYY-MM-DD` query values; empty strings count as absent
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        DateRange::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| BankError::InvalidDate(format!("'{}' is not a YYYY-MM-DD date", text))),
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub account: Account,
    pub range: DateRange,
    pub transactions: Vec<Transaction>,
    /// Range sum when filtered, current balance otherwise
    pub balance: Decimal,
}

impl TransactionReport {
    pub fn total_of(&self, tx_type: TransactionType) -> Decimal {
        self.transactions
            .iter()
            .filter(|tx| tx.transaction_type == tx_type)
            .map(|tx| tx.amount)
            .sum()
    }
}

/// Assemble a report from an account and its (already filtered) ledger
pub fn build(account: Account, range: DateRange, transactions: Vec<Transaction>) -> TransactionReport {
    let balance = if range.is_unbounded() {
        account.balance
    } else {
        transactions.iter().map(|tx| tx.amount).sum()
    };

    TransactionReport {
        account,
        range,
        transactions,
        balance: money::round(balance),
    }
}

/// Write the statement as CSV (one row per ledger entry)
pub fn write_csv<W: Write>(report: &TransactionReport, writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "id",
        "timestamp",
        "type",
        "amount",
        "balance_after_transaction",
        "loan_approved",
        "transfer_account_no",
    ])?;

    for tx in &report.transactions {
        wtr.write_record([
            tx.id.to_string(),
            tx.timestamp.to_rfc3339(),
            tx.transaction_type.label().to_string(),
            money::to_sql(tx.amount),
            money::to_sql(tx.balance_after_transaction),
            tx.loan_approved.to_string(),
            tx.transfer_account_no.map(|n| n.to_string()).unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AccountType, Gender};
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn test_account(balance: &str) -> Account {
        Account {
            id: 1,
            owner_id: 1,
            account_type: AccountType::Current,
            gender: Gender::Female,
            birth_date: NaiveDate::from_ymd_opt(1988, 2, 29).unwrap(),
            account_no: 100_001,
            balance: d(balance),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn entry(id: i64, tx_type: TransactionType, amount: &str) -> Transaction {
        Transaction {
            id,
            account_id: 1,
            amount: d(amount),
            balance_after_transaction: d(amount),
            transaction_type: tx_type,
            timestamp: Utc.with_ymd_and_hms(2024, 1, id as u32, 8, 0, 0).unwrap(),
            loan_approved: false,
            transfer_account_no: if tx_type == TransactionType::Transfer { Some(100_002) } else { None },
        }
    }

    #[test]
    fn test_parse_range() {
        let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 1, 31));

        assert!(DateRange::parse(None, None).unwrap().is_unbounded());
        assert!(DateRange::parse(Some(""), Some(" ")).unwrap().is_unbounded());
        assert!(matches!(
            DateRange::parse(Some("01/02/2024"), None),
            Err(BankError::InvalidDate(_))
        ));
        assert!(matches!(
            DateRange::parse(Some("2024-02-01"), Some("2024-01-01")),
            Err(BankError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_unbounded_report_shows_current_balance() {
        let report = build(
            test_account("1250.00"),
            DateRange::default(),
            vec![entry(1, TransactionType::Deposit, "1000"), entry(2, TransactionType::Deposit, "250")],
        );
        assert_eq!(report.balance, d("1250.00"));
    }

    #[test]
    fn test_ranged_report_sums_entries() {
        let range = DateRange::parse(Some("2024-01-02"), Some("2024-01-03")).unwrap();
        let report = build(
            test_account("9999"),
            range,
            vec![entry(2, TransactionType::Deposit, "100"), entry(3, TransactionType::Withdrawal, "40")],
        );
        assert_eq!(report.balance, d("140"));
        assert_eq!(report.total_of(TransactionType::Withdrawal), d("40"));
        assert_eq!(report.total_of(TransactionType::Loan), Decimal::ZERO);
    }

    #[test]
    fn test_csv_export() {
        let report = build(
            test_account("300"),
            DateRange::default(),
            vec![entry(1, TransactionType::Deposit, "500"), entry(2, TransactionType::Transfer, "200")],
        );

        let mut out = Vec::new();
        write_csv(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "id,timestamp,type,amount,balance_after_transaction,loan_approved,transfer_account_no"
        );
        assert!(lines[1].starts_with("1,2024-01-01T08:00:00+00:00,Deposit,500.00,500.00,false,"));
        assert!(lines[2].ends_with(",Transfer Money,200.00,200.00,false,100002"));
    }
}
