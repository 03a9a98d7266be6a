//! Peer-to-peer transfers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::transaction::ensure_positive;
use crate::{Transaction, TransactionId, TransactionKind, TransferId, UserId};

/// Links the two halves of one logical transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Unique transfer ID.
    pub id: TransferId,

    /// The sender's `TransferSent` transaction.
    pub sender_transaction: TransactionId,

    /// The receiver's `TransferReceived` transaction.
    pub receiver_transaction: TransactionId,

    /// When the transfer was committed.
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.sender_transaction,
            self.receiver_transaction,
            self.created_at.to_rfc3339()
        )
    }
}

/// The three rows a transfer writes, built together so storage can commit them as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Debit on the sender.
    pub sent: Transaction,

    /// Credit on the receiver.
    pub received: Transaction,

    /// Record linking `sent` and `received`.
    pub record: TransferRecord,
}

impl Transfer {
    /// Build the rows for moving `amount` from `sender` to `receiver`.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if `amount` is not positive.
    /// - `LedgerError::SelfTransfer` if sender and receiver are the same user.
    pub fn new(sender: UserId, receiver: UserId, amount: i64) -> Result<Self> {
        ensure_positive(amount)?;
        if sender == receiver {
            return Err(LedgerError::SelfTransfer);
        }

        let sent = Transaction::new(sender, TransactionKind::TransferSent, amount)?;
        let received = Transaction::new(receiver, TransactionKind::TransferReceived, amount)?;
        let record = TransferRecord {
            id: TransferId::generate(),
            sender_transaction: sent.id,
            receiver_transaction: received.id,
            created_at: Utc::now(),
        };

        Ok(Self {
            sent,
            received,
            record,
        })
    }

    /// Transferred amount.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.sent.amount
    }
}
