//! Accounts and score counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::UserId;

/// Highest score a counter may hold.
pub const MAX_SCORE: i64 = 32_767;

/// A registered ledger user.
///
/// Accounts carry identity only. Balances are always derived from the
/// transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The user ID.
    pub user_id: UserId,

    /// Display name.
    pub username: String,

    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account.
    #[must_use]
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            created_at: Utc::now(),
        }
    }
}

/// Per-user score, mutated in place under an exclusive lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCounter {
    /// Owner of the counter.
    pub user_id: UserId,

    /// Current score, within `0..=MAX_SCORE`.
    pub score: i64,
}

impl ScoreCounter {
    /// A fresh counter at zero.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self { user_id, score: 0 }
    }
}

/// Apply `delta` to `current`, enforcing the score bounds.
///
/// # Errors
///
/// Returns `LedgerError::ScoreOutOfRange` if the result would be negative, above
/// [`MAX_SCORE`], or overflow.
pub fn apply_score_delta(current: i64, delta: i64) -> Result<i64> {
    let next = current
        .checked_add(delta)
        .ok_or(LedgerError::ScoreOutOfRange {
            score: if delta > 0 { i64::MAX } else { i64::MIN },
        })?;

    if !(0..=MAX_SCORE).contains(&next) {
        return Err(LedgerError::ScoreOutOfRange { score: next });
    }
    Ok(next)
}
