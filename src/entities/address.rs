// 🏠 Address Entity - one per owner, created together with the account

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub owner_id: i64,
    pub street_address: String,
    pub city: String,
    pub postal_code: i64,
    pub country: String,
}

impl Address {
    /// Single-line rendering for the CLI statement and the TUI header
    pub fn one_line(&self) -> String {
        format!(
            "{}, {} {}, {}",
            self.street_address, self.city, self.postal_code, self.country
        )
    }
}
