//! Error types for tally.

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Domain errors raised by ledger rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The debited user does not have enough balance.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Balance at the time of the check, in minor units.
        balance: i64,
        /// Amount the operation needed, in minor units.
        required: i64,
    },

    /// Amounts must be strictly positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A credit or debit sum, or a sum of balances, would not fit in an `i64`.
    #[error("balance arithmetic overflow")]
    BalanceOverflow,

    /// Sender and receiver of a transfer are the same user.
    #[error("cannot transfer to the sending account")]
    SelfTransfer,

    /// A score update would leave the allowed range.
    #[error("score out of range: {score} (allowed 0..={})", crate::MAX_SCORE)]
    ScoreOutOfRange {
        /// The rejected score.
        score: i64,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
