//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait on top of a
//! pessimistic `TransactionDB`. Multi-row writes go through one database transaction;
//! score updates take a `get_for_update` lock on the counter key.
//!
//! `RocksDB` calls block, including lock waits, so every trait method runs its work on
//! the blocking thread pool.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, MultiThreaded, Options,
    TransactionDB, TransactionDBOptions,
};

use tally_core::{
    Account, ArchivedTransaction, BalanceReportEntry, BalanceSnapshot, BalanceTally,
    ScoreCounter, SnapshotId, Transaction, TransactionId, Transfer, TransferId, TransferRecord,
    UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{ScoreUpdate, Store};

type Db = TransactionDB<MultiThreaded>;
type Txn<'a> = rocksdb::Transaction<'a, Db>;

/// RocksDB-backed storage implementation.
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<Db>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        // Lock waiters block until the holder commits.
        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(-1);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, &txn_db_opts, path, cf_descriptors)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run `op` against a clone of the store on the blocking thread pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::Database(format!("blocking task failed: {e}")))?
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_record<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Record IDs in a per-user index, newest first.
    fn index_ids(&self, cf_name: &str, user_id: &UserId) -> Result<Vec<[u8; 16]>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::user_prefix(user_id);
        let upper = keys::user_upper_bound(user_id);

        let mut ids = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&upper, Direction::Reverse));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(id) = keys::extract_record_id(&key) {
                ids.push(id);
            }
        }

        Ok(ids)
    }

    /// Stage a live transaction plus its user index entry.
    fn stage_transaction(&self, txn: &Txn<'_>, transaction: &Transaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        txn.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        )?;
        txn.put_cf(
            &cf_by_user,
            keys::user_index_key(&transaction.user_id, transaction.id.to_bytes()),
            [],
        )?;
        Ok(())
    }

    fn create_account_sync(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);

        let txn = self.db.transaction();
        if txn.get_for_update_cf(&cf, &key, true)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }
        txn.put_cf(&cf, &key, Self::serialize(account)?)?;
        txn.commit()?;

        Ok(())
    }

    fn list_accounts_sync(&self) -> Result<Vec<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            accounts.push(Self::deserialize(&value)?);
        }
        Ok(accounts)
    }

    fn put_transaction_sync(&self, transaction: &Transaction) -> Result<()> {
        let txn = self.db.transaction();
        self.stage_transaction(&txn, transaction)?;
        txn.commit()?;
        Ok(())
    }

    fn list_transactions_sync(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        for id in self
            .index_ids(cf::TRANSACTIONS_BY_USER, user_id)?
            .into_iter()
            .skip(offset)
            .take(limit)
        {
            let tx_id = TransactionId::from_bytes(id);
            if let Some(tx) = self.get_record(cf::TRANSACTIONS, &keys::transaction_key(&tx_id))? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    fn balance_tally_sync(&self, user_id: &UserId) -> Result<BalanceTally> {
        let mut tally = BalanceTally::default();
        for id in self.index_ids(cf::TRANSACTIONS_BY_USER, user_id)? {
            let tx_id = TransactionId::from_bytes(id);
            let tx: Option<Transaction> =
                self.get_record(cf::TRANSACTIONS, &keys::transaction_key(&tx_id))?;
            if let Some(tx) = tx {
                tally.record(&tx)?;
            }
        }
        Ok(tally)
    }

    fn balance_report_sync(&self) -> Result<Vec<BalanceReportEntry>> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;

        let mut tallies: HashMap<UserId, BalanceTally> = HashMap::new();
        for item in self.db.iterator_cf(&cf_tx, IteratorMode::Start) {
            let (_, value) = item?;
            let tx: Transaction = Self::deserialize(&value)?;
            tallies.entry(tx.user_id).or_default().record(&tx)?;
        }

        Ok(self
            .list_accounts_sync()?
            .into_iter()
            .map(|account| {
                let tally = tallies.remove(&account.user_id).unwrap_or_default();
                BalanceReportEntry {
                    user_id: account.user_id,
                    username: account.username,
                    transaction_count: tally.transaction_count,
                    balance: tally.balance(),
                }
            })
            .collect())
    }

    fn put_archived_sync(&self, archived: &ArchivedTransaction) -> Result<()> {
        let cf_archive = self.cf(cf::ARCHIVE)?;
        let cf_by_user = self.cf(cf::ARCHIVE_BY_USER)?;
        let tx = &archived.transaction;
        let key = keys::transaction_key(&tx.id);

        let txn = self.db.transaction();
        if txn.get_for_update_cf(&cf_archive, &key, true)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "archived transaction",
                id: tx.id.to_string(),
            });
        }
        txn.put_cf(&cf_archive, &key, Self::serialize(archived)?)?;
        txn.put_cf(
            &cf_by_user,
            keys::user_index_key(&tx.user_id, tx.id.to_bytes()),
            [],
        )?;
        txn.commit()?;

        Ok(())
    }

    fn list_archived_sync(&self, user_id: &UserId) -> Result<Vec<ArchivedTransaction>> {
        let mut archived = Vec::new();
        for id in self.index_ids(cf::ARCHIVE_BY_USER, user_id)? {
            let key = keys::transaction_key(&TransactionId::from_bytes(id));
            if let Some(record) = self.get_record(cf::ARCHIVE, &key)? {
                archived.push(record);
            }
        }
        Ok(archived)
    }

    fn put_transfer_sync(&self, transfer: &Transfer) -> Result<()> {
        let cf_transfers = self.cf(cf::TRANSFERS)?;

        let txn = self.db.transaction();
        self.stage_transaction(&txn, &transfer.sent)?;
        self.stage_transaction(&txn, &transfer.received)?;
        txn.put_cf(
            &cf_transfers,
            keys::transfer_key(&transfer.record.id),
            Self::serialize(&transfer.record)?,
        )?;
        txn.commit()?;

        Ok(())
    }

    fn put_snapshot_sync(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        let cf_snapshots = self.cf(cf::SNAPSHOTS)?;
        let cf_by_user = self.cf(cf::SNAPSHOTS_BY_USER)?;

        let txn = self.db.transaction();
        txn.put_cf(
            &cf_snapshots,
            keys::snapshot_key(&snapshot.id),
            Self::serialize(snapshot)?,
        )?;
        txn.put_cf(
            &cf_by_user,
            keys::user_index_key(&snapshot.user_id, snapshot.id.to_bytes()),
            [],
        )?;
        txn.commit()?;

        Ok(())
    }

    fn list_snapshots_sync(&self, user_id: &UserId) -> Result<Vec<BalanceSnapshot>> {
        let mut snapshots = Vec::new();
        for id in self.index_ids(cf::SNAPSHOTS_BY_USER, user_id)? {
            let key = keys::snapshot_key(&SnapshotId::from_bytes(id));
            if let Some(snapshot) = self.get_record(cf::SNAPSHOTS, &key)? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    fn with_score_lock_sync(&self, user_id: &UserId, update: ScoreUpdate) -> Result<ScoreCounter> {
        let cf = self.cf(cf::SCORES)?;
        let key = keys::score_key(user_id);

        // Locks the key even when no counter exists yet, so first-time callers
        // cannot both insert a row.
        let txn = self.db.transaction();
        let current = match txn.get_for_update_cf(&cf, &key, true)? {
            Some(data) => Self::deserialize::<ScoreCounter>(&data)?.score,
            None => 0,
        };

        let counter = ScoreCounter {
            user_id: *user_id,
            score: update(current)?,
        };
        txn.put_cf(&cf, &key, Self::serialize(&counter)?)?;
        txn.commit()?;

        Ok(counter)
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn create_account(&self, account: &Account) -> Result<()> {
        let account = account.clone();
        self.blocking(move |store| store.create_account_sync(&account))
            .await
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let key = keys::account_key(user_id);
        self.blocking(move |store| store.get_record(cf::ACCOUNTS, &key))
            .await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.blocking(Self::list_accounts_sync).await
    }

    // =========================================================================
    // Transaction Log
    // =========================================================================

    async fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        let transaction = transaction.clone();
        self.blocking(move |store| store.put_transaction_sync(&transaction))
            .await
    }

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Transaction>> {
        let key = keys::transaction_key(transaction_id);
        self.blocking(move |store| store.get_record(cf::TRANSACTIONS, &key))
            .await
    }

    async fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let user_id = *user_id;
        self.blocking(move |store| store.list_transactions_sync(&user_id, limit, offset))
            .await
    }

    async fn balance_tally(&self, user_id: &UserId) -> Result<BalanceTally> {
        let user_id = *user_id;
        self.blocking(move |store| store.balance_tally_sync(&user_id))
            .await
    }

    async fn balance_report(&self) -> Result<Vec<BalanceReportEntry>> {
        self.blocking(Self::balance_report_sync).await
    }

    // =========================================================================
    // Archive Tier
    // =========================================================================

    async fn put_archived_transaction(&self, archived: &ArchivedTransaction) -> Result<()> {
        let archived = archived.clone();
        self.blocking(move |store| store.put_archived_sync(&archived))
            .await
    }

    async fn list_archived_by_user(&self, user_id: &UserId) -> Result<Vec<ArchivedTransaction>> {
        let user_id = *user_id;
        self.blocking(move |store| store.list_archived_sync(&user_id))
            .await
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    async fn put_transfer(&self, transfer: &Transfer) -> Result<()> {
        let transfer = transfer.clone();
        self.blocking(move |store| store.put_transfer_sync(&transfer))
            .await
    }

    async fn get_transfer(&self, transfer_id: &TransferId) -> Result<Option<TransferRecord>> {
        let key = keys::transfer_key(transfer_id);
        self.blocking(move |store| store.get_record(cf::TRANSFERS, &key))
            .await
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    async fn put_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        let snapshot = snapshot.clone();
        self.blocking(move |store| store.put_snapshot_sync(&snapshot))
            .await
    }

    async fn list_snapshots_by_user(&self, user_id: &UserId) -> Result<Vec<BalanceSnapshot>> {
        let user_id = *user_id;
        self.blocking(move |store| store.list_snapshots_sync(&user_id))
            .await
    }

    // =========================================================================
    // Score Counters
    // =========================================================================

    async fn get_score(&self, user_id: &UserId) -> Result<Option<ScoreCounter>> {
        let key = keys::score_key(user_id);
        self.blocking(move |store| store.get_record(cf::SCORES, &key))
            .await
    }

    async fn with_score_lock(&self, user_id: &UserId, update: ScoreUpdate) -> Result<ScoreCounter> {
        let user_id = *user_id;
        self.blocking(move |store| store.with_score_lock_sync(&user_id, update))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{LedgerError, TransactionKind};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn account_registration() {
        let (store, _dir) = create_test_store();
        let account = Account::new(UserId::generate(), "alice");

        store.create_account(&account).await.unwrap();
        assert_eq!(
            store.get_account(&account.user_id).await.unwrap(),
            Some(account.clone())
        );

        let duplicate = store.create_account(&account).await;
        assert!(matches!(duplicate, Err(StoreError::AlreadyExists { .. })));
        assert_eq!(store.list_accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transaction_operations() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let tx1 = Transaction::charge(user_id, 5000).unwrap();
        store.put_transaction(&tx1).await.unwrap();
        let tx2 = Transaction::purchase(user_id, 2500).unwrap();
        store.put_transaction(&tx2).await.unwrap();

        let retrieved = store.get_transaction(&tx1.id).await.unwrap().unwrap();
        assert_eq!(retrieved, tx1);

        // Newest first
        let transactions = store
            .list_transactions_by_user(&user_id, 10, 0)
            .await
            .unwrap();
        assert_eq!(transactions, vec![tx2.clone(), tx1.clone()]);

        // Pagination
        let page1 = store.list_transactions_by_user(&user_id, 1, 0).await.unwrap();
        let page2 = store.list_transactions_by_user(&user_id, 1, 1).await.unwrap();
        assert_eq!(page1, vec![tx2]);
        assert_eq!(page2, vec![tx1]);

        let tally = store.balance_tally(&user_id).await.unwrap();
        assert_eq!(tally.balance(), 2500);
        assert_eq!(tally.transaction_count, 2);
    }

    #[tokio::test]
    async fn index_does_not_leak_between_users() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let other = UserId::generate();

        store
            .put_transaction(&Transaction::charge(user, 10).unwrap())
            .await
            .unwrap();
        store
            .put_transaction(&Transaction::charge(other, 20).unwrap())
            .await
            .unwrap();

        assert_eq!(store.balance_tally(&user).await.unwrap().balance(), 10);
        assert_eq!(store.balance_tally(&other).await.unwrap().balance(), 20);
        assert_eq!(
            store
                .balance_tally(&UserId::generate())
                .await
                .unwrap()
                .balance(),
            0
        );
    }

    #[tokio::test]
    async fn report_scans_whole_log() {
        let (store, _dir) = create_test_store();
        let alice = Account::new(UserId::generate(), "alice");
        let bob = Account::new(UserId::generate(), "bob");
        store.create_account(&alice).await.unwrap();
        store.create_account(&bob).await.unwrap();

        for (kind, amount) in [
            (TransactionKind::Charge, 500),
            (TransactionKind::Purchase, 200),
            (TransactionKind::TransferReceived, 50),
        ] {
            store
                .put_transaction(&Transaction::new(alice.user_id, kind, amount).unwrap())
                .await
                .unwrap();
        }

        let report = store.balance_report().await.unwrap();
        let alice_row = report.iter().find(|e| e.user_id == alice.user_id).unwrap();
        let bob_row = report.iter().find(|e| e.user_id == bob.user_id).unwrap();

        assert_eq!(alice_row.balance, 350);
        assert_eq!(alice_row.transaction_count, 3);
        assert_eq!(alice_row.username, "alice");
        assert_eq!(bob_row.balance, 0);
        assert_eq!(bob_row.transaction_count, 0);
    }

    #[tokio::test]
    async fn transfer_commits_three_rows() {
        let (store, _dir) = create_test_store();
        let transfer = Transfer::new(UserId::generate(), UserId::generate(), 40).unwrap();

        store.put_transfer(&transfer).await.unwrap();

        assert_eq!(
            store.get_transfer(&transfer.record.id).await.unwrap(),
            Some(transfer.record.clone())
        );
        assert_eq!(
            store.get_transaction(&transfer.sent.id).await.unwrap(),
            Some(transfer.sent.clone())
        );
        assert_eq!(
            store
                .balance_tally(&transfer.received.user_id)
                .await
                .unwrap()
                .balance(),
            40
        );
    }

    #[tokio::test]
    async fn snapshots_append() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();

        let first = BalanceSnapshot::new(user, 100);
        store.put_snapshot(&first).await.unwrap();
        let second = BalanceSnapshot::new(user, 250);
        store.put_snapshot(&second).await.unwrap();

        let listed = store.list_snapshots_by_user(&user).await.unwrap();
        assert_eq!(listed, vec![second, first]);
    }

    #[tokio::test]
    async fn archive_is_separate_tier() {
        let (store, _dir) = create_test_store();
        let tx = Transaction::charge(UserId::generate(), 70).unwrap();
        store.put_transaction(&tx).await.unwrap();

        let archived = ArchivedTransaction::new(tx.clone());
        store.put_archived_transaction(&archived).await.unwrap();

        assert!(matches!(
            store.put_archived_transaction(&archived).await,
            Err(StoreError::AlreadyExists { .. })
        ));
        assert_eq!(
            store.list_archived_by_user(&tx.user_id).await.unwrap(),
            vec![archived]
        );
        // The live log is untouched.
        assert_eq!(store.balance_tally(&tx.user_id).await.unwrap().balance(), 70);
    }

    #[tokio::test]
    async fn score_lock_creates_row_and_rejects_without_writing() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        assert!(store.get_score(&user).await.unwrap().is_none());

        let counter = store
            .with_score_lock(&user, Box::new(|score: i64| Ok::<_, LedgerError>(score + 3)))
            .await
            .unwrap();
        assert_eq!(counter.score, 3);

        let rejected = store
            .with_score_lock(
                &user,
                Box::new(|score: i64| Err::<i64, _>(LedgerError::ScoreOutOfRange { score: score - 10 })),
            )
            .await;
        assert!(matches!(rejected, Err(StoreError::Ledger(_))));
        assert_eq!(store.get_score(&user).await.unwrap().unwrap().score, 3);
    }

    #[tokio::test]
    async fn score_lock_wait_leaves_runtime_free() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();

        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        // Holds the row lock until released. On this single-threaded runtime the
        // test would hang if the holder ran on the async worker.
        let holder = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .with_score_lock(
                        &user,
                        Box::new(move |score: i64| {
                            let _ = entered_tx.send(());
                            release_rx.recv().ok();
                            Ok::<_, LedgerError>(score + 1)
                        }),
                    )
                    .await
            }
        });
        entered_rx.await.unwrap();

        let waiter = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .with_score_lock(&user, Box::new(|score: i64| Ok::<_, LedgerError>(score + 1)))
                    .await
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        release_tx.send(()).unwrap();
        assert_eq!(holder.await.unwrap().unwrap().score, 1);
        assert_eq!(waiter.await.unwrap().unwrap().score, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_score_updates_are_serialized() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user = UserId::generate();

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .with_score_lock(&user, Box::new(|score: i64| Ok::<_, LedgerError>(score + 1)))
                        .await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        assert_eq!(store.get_score(&user).await.unwrap().unwrap().score, 32);
    }
}
