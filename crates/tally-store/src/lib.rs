//! Storage layer and ledger operations for tally.
//!
//! This crate provides the [`Store`] trait, three backends, and the [`Ledger`] facade
//! that implements balance, snapshot, transfer and score operations on top of any store.
//!
//! # Backends
//!
//! - [`MemoryStore`]: mutex-guarded tables, always available (tests, local runs)
//! - `RocksStore`: `RocksDB` `TransactionDB` with column families (feature `rocksdb-backend`)
//! - `PgStore`: PostgreSQL through `sqlx` (feature `postgres-backend`)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tally_core::UserId;
//! use tally_store::{Ledger, MemoryStore};
//!
//! # async fn example() -> tally_store::Result<()> {
//! let ledger = Ledger::new(Arc::new(MemoryStore::new()));
//!
//! let alice = UserId::generate();
//! let bob = UserId::generate();
//! ledger.open_account(alice, "alice").await?;
//! ledger.open_account(bob, "bob").await?;
//!
//! ledger.charge(&alice, 500).await?;
//! ledger.transfer(&alice, &bob, 120).await?;
//!
//! assert_eq!(ledger.compute_balance(&alice).await?, 380);
//! assert_eq!(ledger.compute_balance(&bob).await?, 120);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
#[cfg(feature = "rocksdb-backend")]
pub mod keys;
pub mod ledger;
pub mod memory;
#[cfg(feature = "postgres-backend")]
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use ledger::Ledger;
pub use memory::MemoryStore;
#[cfg(feature = "postgres-backend")]
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;

use tally_core::{
    Account, ArchivedTransaction, BalanceReportEntry, BalanceSnapshot, BalanceTally,
    LedgerError, ScoreCounter, Transaction, TransactionId, Transfer, TransferId,
    TransferRecord, UserId,
};

/// Read-modify-write step run while a score row is exclusively locked.
///
/// Receives the current score and returns the score to persist. Returning an error
/// aborts the locked unit without writing. The step is `'static` so blocking backends
/// can run it off the async worker.
pub type ScoreUpdate =
    Box<dyn FnOnce(i64) -> std::result::Result<i64, LedgerError> + Send + 'static>;

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer so the ledger can run against a relational
/// database, `RocksDB`, or an in-memory store in tests.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user is already registered.
    async fn create_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// List every registered account, ordered by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    // =========================================================================
    // Transaction Log
    // =========================================================================

    /// Append a transaction to the live log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_transaction(&self, transaction_id: &TransactionId)
        -> Result<Option<Transaction>>;

    /// List transactions for a user, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    /// Aggregate a user's whole live log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn balance_tally(&self, user_id: &UserId) -> Result<BalanceTally>;

    /// Count and balance for every registered account, in one pass over the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn balance_report(&self) -> Result<Vec<BalanceReportEntry>>;

    // =========================================================================
    // Archive Tier
    // =========================================================================

    /// Store a copy of a transaction in the archive tier.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the transaction was already archived.
    async fn put_archived_transaction(&self, archived: &ArchivedTransaction) -> Result<()>;

    /// List a user's archived transactions (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_archived_by_user(&self, user_id: &UserId) -> Result<Vec<ArchivedTransaction>>;

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Write both transfer transactions and the linking record as one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written then.
    async fn put_transfer(&self, transfer: &Transfer) -> Result<()>;

    /// Get a transfer record by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_transfer(&self, transfer_id: &TransferId) -> Result<Option<TransferRecord>>;

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Append a balance snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<()>;

    /// List a user's snapshots (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_snapshots_by_user(&self, user_id: &UserId) -> Result<Vec<BalanceSnapshot>>;

    // =========================================================================
    // Score Counters
    // =========================================================================

    /// Read a score counter without locking.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_score(&self, user_id: &UserId) -> Result<Option<ScoreCounter>>;

    /// Run `update` against the user's score row under an exclusive lock.
    ///
    /// The row is created at 0 inside the locked unit if it does not exist yet.
    /// Concurrent callers for the same user block until the holder has persisted
    /// its result.
    ///
    /// # Errors
    ///
    /// - `StoreError::Ledger` if `update` rejects the value; the stored score is unchanged.
    /// - Database errors from the backend.
    async fn with_score_lock(
        &self,
        user_id: &UserId,
        update: ScoreUpdate,
    ) -> Result<ScoreCounter>;
}
