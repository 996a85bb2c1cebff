// Uniform result envelope shown to users by every front end

use serde::{Deserialize, Serialize};

use crate::bank::Receipt;
use crate::error::{BankError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Outcome<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(error: &BankError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            data: None,
        }
    }

    /// Wrap a read result; `message` is used on success
    pub fn from_result(result: Result<T>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(e) => Self::failure(&e),
        }
    }
}

impl From<Result<Receipt>> for Outcome<Receipt> {
    fn from(result: Result<Receipt>) -> Self {
        match result {
            Ok(receipt) => {
                let message = receipt.message.clone();
                Outcome::ok(message, receipt)
            }
            Err(e) => Outcome::failure(&e),
        }
    }
}
