//! In-memory storage implementation.
//!
//! Tables live behind one mutex, so every multi-row write is atomic. Score counters
//! are separate rows, each with its own mutex, mirroring row-level locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use tally_core::{
    Account, ArchivedTransaction, BalanceReportEntry, BalanceSnapshot, BalanceTally,
    ScoreCounter, Transaction, TransactionId, Transfer, TransferId, TransferRecord, UserId,
};

use crate::error::{Result, StoreError};
use crate::{ScoreUpdate, Store};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<UserId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
    transactions_by_user: HashMap<UserId, Vec<TransactionId>>,
    archive: HashMap<TransactionId, ArchivedTransaction>,
    archive_by_user: HashMap<UserId, Vec<TransactionId>>,
    transfers: HashMap<TransferId, TransferRecord>,
    snapshots_by_user: HashMap<UserId, Vec<BalanceSnapshot>>,
}

impl Tables {
    fn append_transaction(&mut self, transaction: &Transaction) {
        self.transactions
            .insert(transaction.id, transaction.clone());
        self.transactions_by_user
            .entry(transaction.user_id)
            .or_default()
            .push(transaction.id);
    }
}

/// Process-local store, mainly for tests and single-node development.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    scores: Mutex<HashMap<UserId, Arc<Mutex<i64>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    /// Fetch or create the lock cell for a user's score row.
    fn score_row(&self, user_id: &UserId) -> Result<Arc<Mutex<i64>>> {
        let mut scores = self
            .scores
            .lock()
            .map_err(|_| StoreError::Database("score table lock poisoned".into()))?;

        Ok(Arc::clone(
            scores
                .entry(*user_id)
                .or_insert_with(|| Arc::new(Mutex::new(0))),
        ))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_account(&self, account: &Account) -> Result<()> {
        let mut tables = self.tables()?;
        if tables.accounts.contains_key(&account.user_id) {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }
        tables.accounts.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.tables()?.accounts.get(user_id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.tables()?.accounts.values().cloned().collect())
    }

    async fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.tables()?.append_transaction(transaction);
        Ok(())
    }

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Transaction>> {
        Ok(self.tables()?.transactions.get(transaction_id).cloned())
    }

    async fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let tables = self.tables()?;
        let Some(ids) = tables.transactions_by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|id| tables.transactions.get(id).cloned())
            .collect())
    }

    async fn balance_tally(&self, user_id: &UserId) -> Result<BalanceTally> {
        let tables = self.tables()?;
        let ids = tables
            .transactions_by_user
            .get(user_id)
            .map_or(&[][..], Vec::as_slice);

        Ok(BalanceTally::from_transactions(
            ids.iter().filter_map(|id| tables.transactions.get(id)),
        )?)
    }

    async fn balance_report(&self) -> Result<Vec<BalanceReportEntry>> {
        let tables = self.tables()?;

        let mut tallies: HashMap<UserId, BalanceTally> = HashMap::new();
        for tx in tables.transactions.values() {
            tallies.entry(tx.user_id).or_default().record(tx)?;
        }

        Ok(tables
            .accounts
            .values()
            .map(|account| {
                let tally = tallies.get(&account.user_id).copied().unwrap_or_default();
                BalanceReportEntry {
                    user_id: account.user_id,
                    username: account.username.clone(),
                    transaction_count: tally.transaction_count,
                    balance: tally.balance(),
                }
            })
            .collect())
    }

    async fn put_archived_transaction(&self, archived: &ArchivedTransaction) -> Result<()> {
        let mut tables = self.tables()?;
        let tx = &archived.transaction;
        if tables.archive.contains_key(&tx.id) {
            return Err(StoreError::AlreadyExists {
                entity: "archived transaction",
                id: tx.id.to_string(),
            });
        }
        tables.archive.insert(tx.id, archived.clone());
        tables
            .archive_by_user
            .entry(tx.user_id)
            .or_default()
            .push(tx.id);
        Ok(())
    }

    async fn list_archived_by_user(&self, user_id: &UserId) -> Result<Vec<ArchivedTransaction>> {
        let tables = self.tables()?;
        let Some(ids) = tables.archive_by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .iter()
            .rev()
            .filter_map(|id| tables.archive.get(id).cloned())
            .collect())
    }

    async fn put_transfer(&self, transfer: &Transfer) -> Result<()> {
        let mut tables = self.tables()?;
        tables.append_transaction(&transfer.sent);
        tables.append_transaction(&transfer.received);
        tables
            .transfers
            .insert(transfer.record.id, transfer.record.clone());
        Ok(())
    }

    async fn get_transfer(&self, transfer_id: &TransferId) -> Result<Option<TransferRecord>> {
        Ok(self.tables()?.transfers.get(transfer_id).cloned())
    }

    async fn put_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        self.tables()?
            .snapshots_by_user
            .entry(snapshot.user_id)
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn list_snapshots_by_user(&self, user_id: &UserId) -> Result<Vec<BalanceSnapshot>> {
        Ok(self
            .tables()?
            .snapshots_by_user
            .get(user_id)
            .map(|snapshots| snapshots.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_score(&self, user_id: &UserId) -> Result<Option<ScoreCounter>> {
        let row = {
            let scores = self
                .scores
                .lock()
                .map_err(|_| StoreError::Database("score table lock poisoned".into()))?;
            scores.get(user_id).cloned()
        };

        let Some(row) = row else {
            return Ok(None);
        };
        let score = *row
            .lock()
            .map_err(|_| StoreError::Database("score row lock poisoned".into()))?;

        Ok(Some(ScoreCounter {
            user_id: *user_id,
            score,
        }))
    }

    async fn with_score_lock(
        &self,
        user_id: &UserId,
        update: ScoreUpdate,
    ) -> Result<ScoreCounter> {
        let row = self.score_row(user_id)?;
        let mut score = row
            .lock()
            .map_err(|_| StoreError::Database("score row lock poisoned".into()))?;

        let next = update(*score)?;
        *score = next;

        Ok(ScoreCounter {
            user_id: *user_id,
            score: next,
        })
    }
}
