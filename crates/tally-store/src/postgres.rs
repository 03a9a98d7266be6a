//! PostgreSQL storage implementation.
//!
//! Aggregates run in the database (`COALESCE(SUM(..) FILTER (..), 0)`), transfers use a
//! single SQL transaction, and score updates lock the counter row with
//! `SELECT ... FOR UPDATE`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use tally_core::{
    Account, ArchivedTransaction, BalanceReportEntry, BalanceSnapshot, BalanceTally, IdError,
    ScoreCounter, Transaction, TransactionId, TransactionKind, Transfer, TransferId,
    TransferRecord, UserId,
};

use crate::error::{Result, StoreError};
use crate::{ScoreUpdate, Store};

// Kind codes follow `TransactionKind::code`: credits are 1 and 3, debits 2 and 4.
const USER_TALLY_SQL: &str = "\
    SELECT COUNT(*) AS transaction_count, \
           COALESCE(SUM(amount) FILTER (WHERE kind IN (1, 3)), 0)::BIGINT AS credits, \
           COALESCE(SUM(amount) FILTER (WHERE kind IN (2, 4)), 0)::BIGINT AS debits \
    FROM transactions WHERE user_id = $1";

const REPORT_SQL: &str = "\
    SELECT a.user_id, a.username, COUNT(t.id) AS transaction_count, \
           COALESCE(SUM(t.amount) FILTER (WHERE t.kind IN (1, 3)), 0)::BIGINT \
         - COALESCE(SUM(t.amount) FILTER (WHERE t.kind IN (2, 4)), 0)::BIGINT AS balance \
    FROM accounts a LEFT JOIN transactions t ON t.user_id = a.user_id \
    GROUP BY a.user_id, a.username \
    ORDER BY a.user_id";

const INSERT_TRANSACTION_SQL: &str = "\
    INSERT INTO transactions (id, user_id, kind, amount, created_at) \
    VALUES ($1, $2, $3, $4, $5)";

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `database_url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool without running migrations.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("PostgreSQL migrations applied");
        Ok(())
    }
}

fn corrupt(err: &IdError) -> StoreError {
    StoreError::Serialization(err.to_string())
}

fn kind_from_row(row: &PgRow) -> Result<TransactionKind> {
    let code: i16 = row.try_get("kind")?;
    TransactionKind::from_code(code)
        .ok_or_else(|| StoreError::Serialization(format!("unknown transaction kind: {code}")))
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let id: String = row.try_get("id")?;
    Ok(Transaction {
        id: id.parse().map_err(|e| corrupt(&e))?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        kind: kind_from_row(row)?,
        amount: row.try_get("amount")?,
        created_at: row.try_get("created_at")?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        username: row.try_get("username")?,
        created_at: row.try_get("created_at")?,
    })
}

fn snapshot_from_row(row: &PgRow) -> Result<BalanceSnapshot> {
    let id: String = row.try_get("id")?;
    Ok(BalanceSnapshot {
        id: id.parse().map_err(|e| corrupt(&e))?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn insert_transaction<'e, E>(executor: E, tx: &Transaction) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(INSERT_TRANSACTION_SQL)
        .bind(tx.id.to_string())
        .bind(tx.user_id.as_uuid())
        .bind(tx.kind.code())
        .bind(tx.amount)
        .bind(tx.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn create_account(&self, account: &Account) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO accounts (user_id, username, created_at) VALUES ($1, $2, $3)",
        )
        .bind(account.user_id.as_uuid())
        .bind(&account.username)
        .bind(account.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists {
                entity: "account",
                id: account.user_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        sqlx::query("SELECT user_id, username, created_at FROM accounts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(account_from_row)
            .transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        sqlx::query("SELECT user_id, username, created_at FROM accounts ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(account_from_row)
            .collect()
    }

    async fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        insert_transaction(&self.pool, transaction).await
    }

    async fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Transaction>> {
        sqlx::query(
            "SELECT id, user_id, kind, amount, created_at FROM transactions WHERE id = $1",
        )
        .bind(transaction_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(transaction_from_row)
        .transpose()
    }

    async fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        sqlx::query(
            "SELECT id, user_id, kind, amount, created_at FROM transactions \
             WHERE user_id = $1 ORDER BY id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(transaction_from_row)
        .collect()
    }

    async fn balance_tally(&self, user_id: &UserId) -> Result<BalanceTally> {
        let row = sqlx::query(USER_TALLY_SQL)
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.try_get("transaction_count")?;
        Ok(BalanceTally {
            transaction_count: count.unsigned_abs(),
            credits: row.try_get("credits")?,
            debits: row.try_get("debits")?,
        })
    }

    async fn balance_report(&self) -> Result<Vec<BalanceReportEntry>> {
        sqlx::query(REPORT_SQL)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| {
                let count: i64 = row.try_get("transaction_count")?;
                Ok(BalanceReportEntry {
                    user_id: UserId::from_uuid(row.try_get("user_id")?),
                    username: row.try_get("username")?,
                    transaction_count: count.unsigned_abs(),
                    balance: row.try_get("balance")?,
                })
            })
            .collect()
    }

    async fn put_archived_transaction(&self, archived: &ArchivedTransaction) -> Result<()> {
        let tx = &archived.transaction;
        let result = sqlx::query(
            "INSERT INTO transaction_archive (id, user_id, kind, amount, created_at, archived_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(tx.id.to_string())
        .bind(tx.user_id.as_uuid())
        .bind(tx.kind.code())
        .bind(tx.amount)
        .bind(tx.created_at)
        .bind(archived.archived_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists {
                entity: "archived transaction",
                id: tx.id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_archived_by_user(&self, user_id: &UserId) -> Result<Vec<ArchivedTransaction>> {
        sqlx::query(
            "SELECT id, user_id, kind, amount, created_at, archived_at FROM transaction_archive \
             WHERE user_id = $1 ORDER BY id DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(ArchivedTransaction {
                transaction: transaction_from_row(row)?,
                archived_at: row.try_get("archived_at")?,
            })
        })
        .collect()
    }

    async fn put_transfer(&self, transfer: &Transfer) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        insert_transaction(&mut *tx, &transfer.sent).await?;
        insert_transaction(&mut *tx, &transfer.received).await?;
        sqlx::query(
            "INSERT INTO transfers (id, sender_transaction, receiver_transaction, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(transfer.record.id.to_string())
        .bind(transfer.record.sender_transaction.to_string())
        .bind(transfer.record.receiver_transaction.to_string())
        .bind(transfer.record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_transfer(&self, transfer_id: &TransferId) -> Result<Option<TransferRecord>> {
        let Some(row) = sqlx::query(
            "SELECT id, sender_transaction, receiver_transaction, created_at \
             FROM transfers WHERE id = $1",
        )
        .bind(transfer_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let id: String = row.try_get("id")?;
        let sender: String = row.try_get("sender_transaction")?;
        let receiver: String = row.try_get("receiver_transaction")?;
        Ok(Some(TransferRecord {
            id: id.parse().map_err(|e| corrupt(&e))?,
            sender_transaction: sender.parse().map_err(|e| corrupt(&e))?,
            receiver_transaction: receiver.parse().map_err(|e| corrupt(&e))?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn put_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO balance_snapshots (id, user_id, balance, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.user_id.as_uuid())
        .bind(snapshot.balance)
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_snapshots_by_user(&self, user_id: &UserId) -> Result<Vec<BalanceSnapshot>> {
        sqlx::query(
            "SELECT id, user_id, balance, created_at FROM balance_snapshots \
             WHERE user_id = $1 ORDER BY id DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(snapshot_from_row)
        .collect()
    }

    async fn get_score(&self, user_id: &UserId) -> Result<Option<ScoreCounter>> {
        let score: Option<i64> =
            sqlx::query_scalar("SELECT score FROM score_counters WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(score.map(|score| ScoreCounter {
            user_id: *user_id,
            score,
        }))
    }

    async fn with_score_lock(
        &self,
        user_id: &UserId,
        update: ScoreUpdate,
    ) -> Result<ScoreCounter> {
        let mut tx = self.pool.begin().await?;

        // Concurrent first-time callers race on the insert; the loser waits on the
        // winner's row and then takes the row lock below.
        sqlx::query(
            "INSERT INTO score_counters (user_id, score) VALUES ($1, 0) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        let current: i64 =
            sqlx::query_scalar("SELECT score FROM score_counters WHERE user_id = $1 FOR UPDATE")
                .bind(user_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;

        // Dropping `tx` on error rolls back, leaving the stored score untouched.
        let score = update(current)?;

        sqlx::query("UPDATE score_counters SET score = $2 WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .bind(score)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(ScoreCounter {
            user_id: *user_id,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    //! These tests need a scratch database: `DATABASE_URL=postgres://... cargo test
    //! --features postgres-backend -- --ignored`.

    use std::sync::Arc;

    use super::*;
    use tally_core::LedgerError;

    async fn connect() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        PgStore::connect(&url, 16).await.unwrap()
    }

    async fn registered(store: &PgStore, name: &str) -> UserId {
        let account = Account::new(UserId::generate(), name);
        store.create_account(&account).await.unwrap();
        account.user_id
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn tally_coalesces_empty_sums() {
        let store = connect().await;
        let user = registered(&store, "empty").await;

        let tally = store.balance_tally(&user).await.unwrap();
        assert_eq!(tally, BalanceTally::default());
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn tally_and_report_agree() {
        let store = connect().await;
        let user = registered(&store, "shopper").await;

        for (kind, amount) in [
            (TransactionKind::Charge, 500),
            (TransactionKind::Purchase, 200),
            (TransactionKind::TransferReceived, 50),
        ] {
            store
                .put_transaction(&Transaction::new(user, kind, amount).unwrap())
                .await
                .unwrap();
        }

        assert_eq!(store.balance_tally(&user).await.unwrap().balance(), 350);

        let report = store.balance_report().await.unwrap();
        let row = report.iter().find(|e| e.user_id == user).unwrap();
        assert_eq!(row.balance, 350);
        assert_eq!(row.transaction_count, 3);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn duplicate_account_conflicts() {
        let store = connect().await;
        let account = Account::new(UserId::generate(), "twice");
        store.create_account(&account).await.unwrap();
        assert!(matches!(
            store.create_account(&account).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn transfer_rolls_back_as_a_unit() {
        let store = connect().await;
        let sender = registered(&store, "sender").await;

        // Receiver has no account, so the second insert violates its foreign key.
        let transfer = Transfer::new(sender, UserId::generate(), 10).unwrap();
        assert!(store.put_transfer(&transfer).await.is_err());

        assert!(store
            .get_transaction(&transfer.sent.id)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_transfer(&transfer.record.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires DATABASE_URL"]
    async fn concurrent_score_updates_are_serialized() {
        let store = Arc::new(connect().await);
        let user = registered(&store, "scorer").await;

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .with_score_lock(
                            &user,
                            Box::new(|score: i64| Ok::<_, LedgerError>(score + 1)),
                        )
                        .await
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        assert_eq!(store.get_score(&user).await.unwrap().unwrap().score, 20);
    }
}
