//! Ledger operations over an injected [`Store`].
//!
//! [`Ledger`] owns the business rules: validation, balance checks, best-effort
//! snapshot runs and bounded score updates. Storage atomicity and row locking are
//! delegated to the store.

use std::sync::Arc;

use tally_core::{
    apply_score_delta, total_balance, Account, ArchivedTransaction, BalanceReportEntry,
    BalanceSnapshot, LedgerError, SnapshotFailure, SnapshotRun, Transaction, TransactionId,
    Transfer, TransferId, TransferRecord, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

/// Balance, snapshot, transfer and score operations.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    /// Create a ledger on top of `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn require_account(&self, user_id: &UserId) -> Result<Account> {
        self.store
            .get_account(user_id)
            .await?
            .ok_or_else(|| StoreError::account_not_found(user_id))
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Register a user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user is already registered.
    pub async fn open_account(
        &self,
        user_id: UserId,
        username: impl Into<String> + Send,
    ) -> Result<Account> {
        let account = Account::new(user_id, username);
        self.store.create_account(&account).await?;

        tracing::info!(user_id = %user_id, username = %account.username, "Account opened");
        Ok(account)
    }

    /// Fetch a registered account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user is not registered.
    pub async fn get_account(&self, user_id: &UserId) -> Result<Account> {
        self.require_account(user_id).await
    }

    // =========================================================================
    // Balances
    // =========================================================================

    /// Current signed balance, derived from the user's whole live log.
    ///
    /// An empty log yields 0.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user is not registered.
    pub async fn compute_balance(&self, user_id: &UserId) -> Result<i64> {
        self.require_account(user_id).await?;
        Ok(self.store.balance_tally(user_id).await?.balance())
    }

    /// Transaction count and balance for every registered user.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn balance_report(&self) -> Result<Vec<BalanceReportEntry>> {
        self.store.balance_report().await
    }

    /// Sum of every user's balance.
    ///
    /// # Errors
    ///
    /// - `LedgerError::BalanceOverflow` if the total does not fit in an `i64`
    /// - Database errors from the store
    pub async fn total_balance(&self) -> Result<i64> {
        Ok(total_balance(&self.store.balance_report().await?)?)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Record a top-up.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if `amount` is not positive
    /// - `StoreError::NotFound` if the user is not registered
    /// - `LedgerError::BalanceOverflow` if the user's credits would no longer fit in an `i64`
    pub async fn charge(&self, user_id: &UserId, amount: i64) -> Result<Transaction> {
        let tx = Transaction::charge(*user_id, amount)?;
        self.require_account(user_id).await?;
        self.store.balance_tally(user_id).await?.ensure_can_credit(amount)?;
        self.store.put_transaction(&tx).await?;

        tracing::info!(user_id = %user_id, amount, transaction_id = %tx.id, "Charge recorded");
        Ok(tx)
    }

    /// Record a purchase, which may not exceed the current balance.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if `amount` is not positive
    /// - `StoreError::NotFound` if the user is not registered
    /// - `LedgerError::InsufficientBalance` if the balance is below `amount`
    pub async fn purchase(&self, user_id: &UserId, amount: i64) -> Result<Transaction> {
        let tx = Transaction::purchase(*user_id, amount)?;
        self.require_account(user_id).await?;

        let balance = self.store.balance_tally(user_id).await?.balance();
        if balance < amount {
            tracing::debug!(user_id = %user_id, balance, amount, "Purchase rejected");
            return Err(LedgerError::InsufficientBalance {
                balance,
                required: amount,
            }
            .into());
        }

        self.store.put_transaction(&tx).await?;

        tracing::info!(user_id = %user_id, amount, transaction_id = %tx.id, "Purchase recorded");
        Ok(tx)
    }

    /// A page of the user's live log, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user is not registered.
    pub async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        self.require_account(user_id).await?;
        self.store
            .list_transactions_by_user(user_id, limit, offset)
            .await
    }

    /// Fetch one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no such transaction exists.
    pub async fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Transaction> {
        self.store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "transaction",
                id: transaction_id.to_string(),
            })
    }

    /// Copy a live transaction into the archive tier.
    ///
    /// The live row stays in place, so balances are unaffected.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if no such transaction exists
    /// - `StoreError::AlreadyExists` if it was archived before
    pub async fn archive_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<ArchivedTransaction> {
        let tx = self.get_transaction(transaction_id).await?;
        let archived = ArchivedTransaction::new(tx);
        self.store.put_archived_transaction(&archived).await?;

        tracing::info!(transaction_id = %transaction_id, "Transaction archived");
        Ok(archived)
    }

    /// The user's archived transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user is not registered.
    pub async fn list_archived(&self, user_id: &UserId) -> Result<Vec<ArchivedTransaction>> {
        self.require_account(user_id).await?;
        self.store.list_archived_by_user(user_id).await
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Compute the user's balance and append it as a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user is not registered.
    pub async fn record_snapshot(&self, user_id: &UserId) -> Result<BalanceSnapshot> {
        let balance = self.compute_balance(user_id).await?;
        let snapshot = BalanceSnapshot::new(*user_id, balance);
        self.store.put_snapshot(&snapshot).await?;

        tracing::debug!(user_id = %user_id, balance, "Balance snapshot recorded");
        Ok(snapshot)
    }

    /// Record a snapshot for every registered user.
    ///
    /// Each user is independent: a failure is logged, collected in
    /// [`SnapshotRun::failed`], and the run continues.
    ///
    /// # Errors
    ///
    /// Returns an error only if the account list cannot be read.
    pub async fn record_all_snapshots(&self) -> Result<SnapshotRun> {
        let accounts = self.store.list_accounts().await?;
        let mut run = SnapshotRun::default();

        for account in accounts {
            match self.record_snapshot(&account.user_id).await {
                Ok(snapshot) => run.recorded.push(snapshot),
                Err(e) => {
                    tracing::warn!(
                        user_id = %account.user_id,
                        error = %e,
                        "Failed to record balance snapshot"
                    );
                    run.failed.push(SnapshotFailure {
                        user_id: account.user_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            recorded = run.recorded.len(),
            failed = run.failed.len(),
            "Snapshot run finished"
        );
        Ok(run)
    }

    /// The user's snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user is not registered.
    pub async fn list_snapshots(&self, user_id: &UserId) -> Result<Vec<BalanceSnapshot>> {
        self.require_account(user_id).await?;
        self.store.list_snapshots_by_user(user_id).await
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Move `amount` from `sender` to `receiver`.
    ///
    /// Both transactions and the linking record are written as one atomic unit.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if `amount` is not positive
    /// - `LedgerError::SelfTransfer` if sender and receiver are the same user
    /// - `StoreError::NotFound` if either user is not registered
    /// - `LedgerError::InsufficientBalance` if the sender's balance is below `amount`
    /// - `LedgerError::BalanceOverflow` if the receiver's credits would no longer fit in an `i64`
    pub async fn transfer(
        &self,
        sender: &UserId,
        receiver: &UserId,
        amount: i64,
    ) -> Result<TransferRecord> {
        let transfer = Transfer::new(*sender, *receiver, amount)?;
        self.require_account(sender).await?;
        self.require_account(receiver).await?;

        let balance = self.store.balance_tally(sender).await?.balance();
        if balance < amount {
            tracing::debug!(
                sender = %sender,
                receiver = %receiver,
                balance,
                amount,
                "Transfer rejected"
            );
            return Err(LedgerError::InsufficientBalance {
                balance,
                required: amount,
            }
            .into());
        }
        self.store
            .balance_tally(receiver)
            .await?
            .ensure_can_credit(amount)?;

        self.store.put_transfer(&transfer).await?;

        tracing::info!(
            transfer_id = %transfer.record.id,
            sender = %sender,
            receiver = %receiver,
            amount,
            "Transfer completed"
        );
        Ok(transfer.record)
    }

    /// Fetch a transfer record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no such transfer exists.
    pub async fn get_transfer(&self, transfer_id: &TransferId) -> Result<TransferRecord> {
        self.store
            .get_transfer(transfer_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "transfer",
                id: transfer_id.to_string(),
            })
    }

    // =========================================================================
    // Scores
    // =========================================================================

    /// Add `delta` to the user's score and return the new value.
    ///
    /// Concurrent calls for the same user are serialized by the store's row lock.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user is not registered
    /// - `LedgerError::ScoreOutOfRange` if the result leaves `0..=MAX_SCORE`; the
    ///   stored score is unchanged
    pub async fn change_score(&self, user_id: &UserId, delta: i64) -> Result<i64> {
        self.require_account(user_id).await?;

        let counter = self
            .store
            .with_score_lock(
                user_id,
                Box::new(move |current: i64| apply_score_delta(current, delta)),
            )
            .await?;

        tracing::debug!(user_id = %user_id, delta, score = counter.score, "Score changed");
        Ok(counter.score)
    }

    /// The user's current score (0 if it was never changed).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user is not registered.
    pub async fn get_score(&self, user_id: &UserId) -> Result<i64> {
        self.require_account(user_id).await?;
        Ok(self
            .store
            .get_score(user_id)
            .await?
            .map_or(0, |counter| counter.score))
    }
}
