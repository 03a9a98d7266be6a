//! Core types for the tally ledger.
//!
//! This crate provides the foundational types shared by storage, service and client:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `TransferId`, `SnapshotId`
//! - **Transactions**: `Transaction`, `TransactionKind`, `ArchivedTransaction`
//! - **Balances**: `BalanceTally`, `BalanceReportEntry`, `BalanceSnapshot`
//! - **Transfers**: `Transfer`, `TransferRecord`
//! - **Scores**: `ScoreCounter`
//!
//! # Amounts
//!
//! All amounts are `i64` minor currency units (cents). A transaction always stores a
//! positive magnitude; its kind decides the sign:
//!
//! - credits: `Charge`, `TransferReceived`
//! - debits: `Purchase`, `TransferSent`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod balance;
pub mod error;
pub mod ids;
pub mod snapshot;
pub mod transaction;
pub mod transfer;

pub use account::{apply_score_delta, Account, ScoreCounter, MAX_SCORE};
pub use balance::{total_balance, BalanceReportEntry, BalanceTally};
pub use error::{LedgerError, Result};
pub use ids::{IdError, SnapshotId, TransactionId, TransferId, UserId};
pub use snapshot::{BalanceSnapshot, SnapshotFailure, SnapshotRun};
pub use transaction::{ensure_positive, ArchivedTransaction, Transaction, TransactionKind};
pub use transfer::{Transfer, TransferRecord};
