//! # seva-wallet: Wallet Ledger
//!
//! Each identity's wallet is an append-only list of signed transactions.
//! The balance is never stored as an authority: it is the sum of the list.
//! A [`BalanceSnapshot`] records `(balance, count, last timestamp)` so a
//! cached balance can be checked against the log before it is trusted.
//!
//! Mutations are two-phase. `prepare_*` validates against the current log
//! and builds the transaction without appending it; [`WalletLedger::append`]
//! records it. Callers that persist elsewhere first write the prepared
//! transaction to storage and only then append, so a storage failure leaves
//! the ledger untouched.

pub mod ledger;
pub mod transaction;

pub use ledger::{WalletError, WalletLedger};
pub use transaction::{BalanceSnapshot, TransactionKind, WalletTransaction};
