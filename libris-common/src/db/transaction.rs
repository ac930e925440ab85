//! Monitored transactions
//!
//! Every multi-row mutation in Libris runs inside one of these. The wrapper
//! logs how long the connection was held and reports transactions that were
//! dropped without an explicit commit or rollback (the error path: sqlx rolls
//! them back on drop).

use crate::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl MonitoredTransaction {
    fn new(tx: Transaction<'static, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    /// Connection to run statements on inside the transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        // Only commit()/rollback() take the transaction, and both consume self
        &mut **self.tx.as_mut().expect("Transaction already consumed")
    }

    /// Name of the operation that opened this transaction
    pub fn caller(&self) -> &'static str {
        self.caller
    }

    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        let tx = self.tx.take().expect("Transaction already consumed");

        tx.commit().await?;

        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "Long transaction committed, connection held for extended period"
            );
        } else {
            tracing::debug!(
                caller = self.caller,
                held_ms = held_ms,
                "Connection released (commit)"
            );
        }

        Ok(())
    }

    /// Roll back the transaction and log release timing
    pub async fn rollback(mut self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        let tx = self.tx.take().expect("Transaction already consumed");

        tx.rollback().await?;

        tracing::debug!(
            caller = self.caller,
            held_ms = held_ms,
            "Connection released (rollback)"
        );

        Ok(())
    }

    /// Roll back and return `err`
    ///
    /// For expected rejections (wrong state, missing capability) found after
    /// the transaction was opened, so they are not reported as abandoned.
    pub async fn reject<T, E: From<Error>>(self, err: E) -> std::result::Result<T, E> {
        self.rollback().await?;
        Err(err)
    }
}

impl Drop for MonitoredTransaction {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls the transaction back when it is dropped uncommitted
            tracing::warn!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Transaction dropped without commit, rolled back"
            );
        }
    }
}

/// Begin a monitored transaction with connection pool timing logs
///
/// # Example
/// ```ignore
/// let mut tx = begin_monitored(&pool, "cascade::tombstone_work").await?;
/// sqlx::query("UPDATE works SET ...").execute(tx.conn()).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored(
    pool: &SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction> {
    let start = Instant::now();

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(
            caller = caller,
            wait_ms = wait_ms,
            "Slow connection acquisition, pool may be saturated"
        );
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_database;

    #[tokio::test]
    async fn test_commit_persists_rows() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("tx.db")).await.unwrap();

        let mut tx = begin_monitored(&pool, "test::commit").await.unwrap();
        sqlx::query("INSERT INTO settings (key, value) VALUES ('k', 'v')")
            .execute(tx.conn())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'k'")
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert_eq!(value.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("tx.db")).await.unwrap();

        {
            let mut tx = begin_monitored(&pool, "test::drop").await.unwrap();
            sqlx::query("INSERT INTO settings (key, value) VALUES ('gone', 'v')")
                .execute(tx.conn())
                .await
                .unwrap();
            assert_eq!(tx.caller(), "test::drop");
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'gone'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_reject_rolls_back_and_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("tx.db")).await.unwrap();

        let mut tx = begin_monitored(&pool, "test::reject").await.unwrap();
        sqlx::query("INSERT INTO settings (key, value) VALUES ('rejected', 'v')")
            .execute(tx.conn())
            .await
            .unwrap();
        let result: Result<()> = tx.reject(Error::InvalidInput("nope".to_string())).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'rejected'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
