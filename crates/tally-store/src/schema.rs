//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Registered users, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Live ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Transfer records, keyed by `transfer_id` (ULID).
    pub const TRANSFERS: &str = "transfers";

    /// Balance snapshots, keyed by `snapshot_id` (ULID).
    pub const SNAPSHOTS: &str = "snapshots";

    /// Index: snapshots by user, keyed by `user_id || snapshot_id`.
    pub const SNAPSHOTS_BY_USER: &str = "snapshots_by_user";

    /// Archived transaction copies, keyed by `transaction_id`.
    pub const ARCHIVE: &str = "archive";

    /// Index: archived transactions by user, keyed by `user_id || transaction_id`.
    pub const ARCHIVE_BY_USER: &str = "archive_by_user";

    /// Score counters, keyed by `user_id`.
    pub const SCORES: &str = "scores";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TRANSFERS,
        cf::SNAPSHOTS,
        cf::SNAPSHOTS_BY_USER,
        cf::ARCHIVE,
        cf::ARCHIVE_BY_USER,
        cf::SCORES,
    ]
}
