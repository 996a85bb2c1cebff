// Entity Models
//
// Each entity maps 1:1 to a table in the bank database:
// - Account: one per owner, carries the balance
// - Address: one per owner
// - Transaction: ledger entry, owned by an Account

pub mod account;
pub mod address;
pub mod transaction;

pub use account::{Account, AccountProfile, AccountType, Gender};
pub use address::Address;
pub use transaction::{NewTransaction, Transaction, TransactionType};
