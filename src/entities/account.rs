// 💳 Account Entity - one bank account per owner
//
// The owner identity lives outside this crate (auth/session layer). The
// account number is derived from it: ACCOUNT_NUMBER_OFFSET + owner_id, so the
// number is unique and deterministic at creation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default offset added to the owner id to form the account number
pub const ACCOUNT_NUMBER_OFFSET: i64 = 100_000;

// ============================================================================
// ACCOUNT TYPE / GENDER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Savings,
    Current,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "Savings",
            AccountType::Current => "Current",
        }
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "current" => Ok(AccountType::Current),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(format!("unknown gender '{}'", other)),
        }
    }
}

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

/// Personal details captured when an account is opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub account_type: AccountType,
    pub gender: Gender,
    pub birth_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,

    /// External user identity (one account per owner)
    pub owner_id: i64,

    pub account_type: AccountType,
    pub gender: Gender,
    pub birth_date: NaiveDate,

    /// offset + owner_id
    pub account_no: i64,

    /// Current balance; may only go negative under the Allow overdraft policy
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Derive the account number for an owner; `None` for non-positive ids
    /// or when the sum does not fit
    pub fn number_for(owner_id: i64, offset: i64) -> Option<i64> {
        if owner_id <= 0 {
            return None;
        }
        offset.checked_add(owner_id).filter(|no| *no > 0)
    }

    pub fn is_overdrawn(&self) -> bool {
        self.balance < Decimal::ZERO
    }
}
