//! Point-in-time balance snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SnapshotId, UserId};

/// An immutable record of a user's balance at one moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Unique snapshot ID.
    pub id: SnapshotId,

    /// The user whose balance was captured.
    pub user_id: UserId,

    /// Balance in minor units.
    pub balance: i64,

    /// When the balance was captured.
    pub created_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// Capture `balance` for `user_id` now.
    #[must_use]
    pub fn new(user_id: UserId, balance: i64) -> Self {
        Self {
            id: SnapshotId::generate(),
            user_id,
            balance,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for BalanceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.user_id,
            self.balance,
            self.created_at.to_rfc3339()
        )
    }
}

/// A snapshot that could not be recorded during a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFailure {
    /// The user that was skipped.
    pub user_id: UserId,

    /// Rendered error.
    pub error: String,
}

/// Outcome of recording a snapshot for every user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRun {
    /// Snapshots written, in user order.
    pub recorded: Vec<BalanceSnapshot>,

    /// Users whose snapshot failed. Earlier and later users are unaffected.
    pub failed: Vec<SnapshotFailure>,
}

impl SnapshotRun {
    /// Whether every user got a snapshot.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
