//! Ledger transaction types.
//!
//! Every monetary event is an immutable [`Transaction`]. Amounts are always stored as
//! positive magnitudes; the [`TransactionKind`] decides whether an amount adds to or
//! subtracts from the balance.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::{TransactionId, UserId};

/// An append-only ledger entry.
///
/// Transactions are never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user who owns this entry.
    pub user_id: UserId,

    /// Kind of monetary event.
    pub kind: TransactionKind,

    /// Magnitude in minor units (always > 0).
    pub amount: i64,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if `amount` is zero or negative.
    pub fn new(user_id: UserId, kind: TransactionKind, amount: i64) -> Result<Self> {
        ensure_positive(amount)?;

        Ok(Self {
            id: TransactionId::generate(),
            user_id,
            kind,
            amount,
            created_at: Utc::now(),
        })
    }

    /// Create a charge (account top-up).
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if `amount` is not positive.
    pub fn charge(user_id: UserId, amount: i64) -> Result<Self> {
        Self::new(user_id, TransactionKind::Charge, amount)
    }

    /// Create a purchase (spend).
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if `amount` is not positive.
    pub fn purchase(user_id: UserId, amount: i64) -> Result<Self> {
        Self::new(user_id, TransactionKind::Purchase, amount)
    }

    /// The signed effect of this entry on the owner's balance.
    #[must_use]
    pub const fn signed_amount(&self) -> i64 {
        if self.kind.is_credit() {
            self.amount
        } else {
            -self.amount
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} - {}", self.user_id, self.kind, self.amount)
    }
}

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Funds added to the account.
    Charge,

    /// Funds spent on an order.
    Purchase,

    /// Incoming side of a transfer.
    TransferReceived,

    /// Outgoing side of a transfer.
    TransferSent,
}

impl TransactionKind {
    /// All kinds, in code order.
    pub const ALL: [Self; 4] = [
        Self::Charge,
        Self::Purchase,
        Self::TransferReceived,
        Self::TransferSent,
    ];

    /// Check if this kind adds to the balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Charge | Self::TransferReceived)
    }

    /// Check if this kind subtracts from the balance.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Purchase | Self::TransferSent)
    }

    /// Stable numeric code used by relational storage.
    #[must_use]
    pub const fn code(&self) -> i16 {
        match self {
            Self::Charge => 1,
            Self::Purchase => 2,
            Self::TransferReceived => 3,
            Self::TransferSent => 4,
        }
    }

    /// Look up a kind by its numeric code.
    #[must_use]
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Charge),
            2 => Some(Self::Purchase),
            3 => Some(Self::TransferReceived),
            4 => Some(Self::TransferSent),
            _ => None,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Charge => "Charge",
            Self::Purchase => "Purchase",
            Self::TransferReceived => "Transfer Received",
            Self::TransferSent => "Transfer Sent",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A transaction copied into the archive retention tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedTransaction {
    /// The archived entry, unchanged.
    pub transaction: Transaction,

    /// When the copy was made.
    pub archived_at: DateTime<Utc>,
}

impl ArchivedTransaction {
    /// Archive a copy of `transaction` now.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            archived_at: Utc::now(),
        }
    }
}

impl fmt::Display for ArchivedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.transaction.fmt(f)
    }
}

/// Reject zero and negative amounts.
///
/// # Errors
///
/// Returns `LedgerError::InvalidAmount` if `amount <= 0`.
pub fn ensure_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}
