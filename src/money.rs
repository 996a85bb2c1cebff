// 💵 Money - fixed-point amounts
//
// Balances and amounts are `rust_decimal::Decimal` with two decimal places,
// matching a DECIMAL(12,2) column: at most 10 integer digits and 2 fractional.

use crate::error::{BankError, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Fractional digits kept for every stored amount
pub const SCALE: u32 = 2;

/// Largest magnitude representable in DECIMAL(12,2), exclusive
const LIMIT: i64 = 10_000_000_000;

/// Validate a user-supplied amount: positive, <= 2 decimals, fits DECIMAL(12,2)
pub fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(BankError::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }

    if amount.normalize().scale() > SCALE {
        return Err(BankError::InvalidAmount(format!(
            "amount {} has more than {} decimal places",
            amount, SCALE
        )));
    }

    if amount >= Decimal::from(LIMIT) {
        return Err(BankError::InvalidAmount(format!(
            "amount {} exceeds 12 digits",
            amount
        )));
    }

    Ok(round(amount))
}

/// Parse a textual amount ("250", "250.5", "1000.00")
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let amount = Decimal::from_str(input.trim())
        .map_err(|e| BankError::InvalidAmount(format!("'{}': {}", input, e)))?;
    validate_amount(amount)
}

/// Round to storage precision
pub fn round(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp(SCALE);
    rounded.rescale(SCALE);
    rounded
}

/// Storage representation: always two decimals, e.g. "1250.00"
pub fn to_sql(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

/// Decode a stored amount
pub fn from_sql(value: &str) -> std::result::Result<Decimal, rust_decimal::Error> {
    Decimal::from_str(value)
}

/// Human format with thousands separators: 1234.5 → "1,234.50"
pub fn format_amount(amount: Decimal) -> String {
    let text = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((&text, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount.is_sign_negative() && !amount.is_zero() { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}
