//! Balance computation.
//!
//! A balance is never stored. It is derived from the transaction log:
//! `sum(Charge, TransferReceived) - sum(Purchase, TransferSent)`.

use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result, Transaction, TransactionKind, UserId};

/// Running aggregate over a slice of the transaction log.
///
/// An empty tally has zero credits and zero debits, so a user with no
/// transactions has balance 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTally {
    /// Number of transactions folded in.
    pub transaction_count: u64,

    /// Sum of credit-kind amounts.
    pub credits: i64,

    /// Sum of debit-kind amounts.
    pub debits: i64,
}

impl BalanceTally {
    /// Fold a whole log.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::BalanceOverflow` if a sum leaves the `i64` range.
    pub fn from_transactions<'a, I>(transactions: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut tally = Self::default();
        for tx in transactions {
            tally.record(tx)?;
        }
        Ok(tally)
    }

    /// Fold one transaction.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::BalanceOverflow` if a sum leaves the `i64` range.
    pub fn record(&mut self, transaction: &Transaction) -> Result<()> {
        self.record_amount(transaction.kind, transaction.amount)
    }

    /// Fold a bare `(kind, amount)` pair.
    ///
    /// The tally is left unchanged on error.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::BalanceOverflow` if a sum leaves the `i64` range.
    pub fn record_amount(&mut self, kind: TransactionKind, amount: i64) -> Result<()> {
        if kind.is_credit() {
            self.credits = checked_sum(self.credits, amount)?;
        } else {
            self.debits = checked_sum(self.debits, amount)?;
        }
        self.transaction_count += 1;
        Ok(())
    }

    /// Check that crediting `amount` keeps the credit sum representable.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::BalanceOverflow` if it would not.
    pub fn ensure_can_credit(&self, amount: i64) -> Result<()> {
        checked_sum(self.credits, amount).map(|_| ())
    }

    /// Signed balance in minor units.
    ///
    /// Credits and debits are sums of positive amounts, so the difference always fits.
    #[must_use]
    pub const fn balance(&self) -> i64 {
        self.credits - self.debits
    }
}

fn checked_sum(a: i64, b: i64) -> Result<i64> {
    a.checked_add(b).ok_or(LedgerError::BalanceOverflow)
}

/// One row of the all-users balance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReportEntry {
    /// The user.
    pub user_id: UserId,

    /// Username recorded on the account.
    pub username: String,

    /// Number of live transactions owned by the user.
    pub transaction_count: u64,

    /// Current balance in minor units.
    pub balance: i64,
}

/// Sum the balances of a report.
///
/// # Errors
///
/// Returns `LedgerError::BalanceOverflow` if the total does not fit in an `i64`.
pub fn total_balance(report: &[BalanceReportEntry]) -> Result<i64> {
    report
        .iter()
        .try_fold(0_i64, |total, entry| checked_sum(total, entry.balance))
}
