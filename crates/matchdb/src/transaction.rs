//! Transaction helpers: macros and Savepoint API.
//!
//! Prefer passing a transaction (`tokio_postgres::Transaction` or
//! `deadpool_postgres::Transaction`) into APIs that accept [`GenericClient`].
//! Every statement the query compiler issues runs against whatever client it
//! is handed, so multi-statement materialization (fetch keys, then fetch
//! dependents) stays on one snapshot when the caller wraps it in a
//! transaction.
//!
//! For ergonomic commit/rollback handling, use the [`transaction!`] macro.
//!
//! # Example
//!
//! ```ignore
//! use matchdb::{Query, StoreResult};
//! use tokio_postgres::NoTls;
//!
//! # async fn demo() -> StoreResult<()> {
//! let (mut client, connection) = tokio_postgres::connect("postgres://...", NoTls).await?;
//! tokio::spawn(async move { let _ = connection.await; });
//!
//! matchdb::transaction!(&mut client, tx, {
//!     let events = Query::new().event([("week", 5.into())]).as_events(&tx).await?;
//!     Ok(events.len())
//! })?;
//! # Ok(()) }
//! ```

use crate::error::{StoreError, StoreResult};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// Global counter for anonymous savepoint naming.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction via `$client.transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `matchdb::StoreResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($client:expr, $tx:ident, $body:block) => {{
        let mut $tx = ($client)
            .transaction()
            .await
            .map_err($crate::StoreError::from_db_error)?;

        let __matchdb_tx_body_result = async { $body }.await;
        match __matchdb_tx_body_result {
            Ok(value) => {
                $tx.commit()
                    .await
                    .map_err($crate::StoreError::from_db_error)?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::StoreError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

/// Runs the given block inside a savepoint within an existing transaction.
///
/// - Creates a savepoint on `$tx`.
/// - Releases (commits) on `Ok(_)`.
/// - Rolls back to savepoint on `Err(_)`.
///
/// The block must evaluate to `matchdb::StoreResult<T>`.
#[macro_export]
macro_rules! savepoint {
    // Named savepoint
    ($tx:expr, $name:expr, $sp:ident, $body:block) => {{
        let mut $sp = ($tx)
            .savepoint($name)
            .await
            .map_err($crate::StoreError::from_db_error)?;

        let __matchdb_sp_body_result = async { $body }.await;
        match __matchdb_sp_body_result {
            Ok(value) => {
                $sp.commit()
                    .await
                    .map_err($crate::StoreError::from_db_error)?;
                Ok(value)
            }
            Err(error) => match $sp.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::StoreError::Other(format!(
                    "{error} (savepoint rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
    // Anonymous savepoint
    ($tx:expr, $sp:ident, $body:block) => {{
        let __matchdb_sp_name = $crate::__next_savepoint_name();
        $crate::savepoint!($tx, &__matchdb_sp_name, $sp, $body)
    }};
}

/// Runs the given block inside a nested transaction (savepoint).
///
/// An inner scope that observes it is already "in transaction" defers the
/// real commit/rollback to the outermost scope; only the savepoint is
/// released or rolled back here.
///
/// # Example
///
/// ```ignore
/// matchdb::transaction!(&mut client, tx, {
///     event.save(&tx).await?;
///
///     // Inner savepoint: failure here won't roll back the event upsert
///     matchdb::nested_transaction!(tx, inner, {
///         for seg in &segments {
///             seg.save(&inner).await?;
///         }
///         Ok(())
///     })?;
///
///     Ok(())
/// })?;
/// ```
#[macro_export]
macro_rules! nested_transaction {
    ($tx:expr, $inner:ident, $body:block) => {{
        let __matchdb_sp_name = $crate::__next_savepoint_name();
        $crate::savepoint!($tx, &__matchdb_sp_name, $inner, $body)
    }};
}

/// Generate a unique anonymous savepoint name.
///
/// This is a public helper used by the `savepoint!` and `nested_transaction!`
/// macros. Not intended for direct use.
#[doc(hidden)]
pub fn __next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("matchdb_sp_{n}")
}

// ─── Savepoint wrapper ──────────────────────────────────────────────────────

/// A named savepoint within a transaction.
///
/// Wraps a nested `tokio_postgres::Transaction` created via `savepoint()`.
/// Provides explicit `release()` and `rollback()` methods, and implements
/// [`GenericClient`](crate::GenericClient) for query execution within the
/// savepoint scope.
pub struct Savepoint<'a> {
    inner: Option<tokio_postgres::Transaction<'a>>,
    name: String,
}

impl<'a> Savepoint<'a> {
    fn new(inner: tokio_postgres::Transaction<'a>, name: String) -> Self {
        Self {
            inner: Some(inner),
            name,
        }
    }

    /// Returns the savepoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the savepoint (make changes permanent within the transaction).
    ///
    /// Equivalent to `RELEASE SAVEPOINT name`.
    pub async fn release(mut self) -> StoreResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.commit().await.map_err(StoreError::from_db_error)?;
        }
        Ok(())
    }

    /// Roll back to this savepoint (undo changes made since the savepoint).
    ///
    /// Equivalent to `ROLLBACK TO SAVEPOINT name`.
    pub async fn rollback(mut self) -> StoreResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.rollback().await.map_err(StoreError::from_db_error)?;
        }
        Ok(())
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            // tokio_postgres::Transaction::drop already handles rollback
            // when dropped without commit. We just log a warning.
            tracing::warn!(
                "Savepoint '{}' dropped without explicit release or rollback",
                self.name,
            );
        }
    }
}

// GenericClient delegation for Savepoint
impl crate::GenericClient for Savepoint<'_> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StoreResult<Vec<Row>> {
        let tx = self
            .inner
            .as_ref()
            .ok_or_else(|| StoreError::Other("savepoint already consumed".to_string()))?;
        crate::GenericClient::query(tx, sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StoreResult<Row> {
        let tx = self
            .inner
            .as_ref()
            .ok_or_else(|| StoreError::Other("savepoint already consumed".to_string()))?;
        crate::GenericClient::query_one(tx, sql, params).await
    }

    async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> StoreResult<Option<Row>> {
        let tx = self
            .inner
            .as_ref()
            .ok_or_else(|| StoreError::Other("savepoint already consumed".to_string()))?;
        crate::GenericClient::query_opt(tx, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StoreResult<u64> {
        let tx = self
            .inner
            .as_ref()
            .ok_or_else(|| StoreError::Other("savepoint already consumed".to_string()))?;
        crate::GenericClient::execute(tx, sql, params).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        self.inner
            .as_ref()
            .and_then(|tx| crate::GenericClient::cancel_token(tx))
    }
}

// ─── TransactionExt ─────────────────────────────────────────────────────────

/// Extension trait adding savepoint support to transactions.
pub trait TransactionExt {
    /// Create a named savepoint within this transaction.
    fn db_savepoint(
        &mut self,
        name: &str,
    ) -> impl std::future::Future<Output = StoreResult<Savepoint<'_>>> + Send;

    /// Create an anonymous savepoint (auto-numbered) within this transaction.
    fn db_savepoint_anon(
        &mut self,
    ) -> impl std::future::Future<Output = StoreResult<Savepoint<'_>>> + Send;
}

impl TransactionExt for tokio_postgres::Transaction<'_> {
    async fn db_savepoint(&mut self, name: &str) -> StoreResult<Savepoint<'_>> {
        let inner = self.savepoint(name).await.map_err(StoreError::from_db_error)?;
        Ok(Savepoint::new(inner, name.to_string()))
    }

    async fn db_savepoint_anon(&mut self) -> StoreResult<Savepoint<'_>> {
        let name = __next_savepoint_name();
        let inner = self
            .savepoint(&name)
            .await
            .map_err(StoreError::from_db_error)?;
        Ok(Savepoint::new(inner, name))
    }
}

#[cfg(feature = "pool")]
impl TransactionExt for deadpool_postgres::Transaction<'_> {
    async fn db_savepoint(&mut self, name: &str) -> StoreResult<Savepoint<'_>> {
        // Access the inner tokio_postgres::Transaction via DerefMut to get a
        // tokio_postgres::Transaction savepoint (not the deadpool wrapper).
        let inner_tx: &mut tokio_postgres::Transaction<'_> = std::ops::DerefMut::deref_mut(self);
        let inner = inner_tx
            .savepoint(name)
            .await
            .map_err(StoreError::from_db_error)?;
        Ok(Savepoint::new(inner, name.to_string()))
    }

    async fn db_savepoint_anon(&mut self) -> StoreResult<Savepoint<'_>> {
        let name = __next_savepoint_name();
        let inner_tx: &mut tokio_postgres::Transaction<'_> = std::ops::DerefMut::deref_mut(self);
        let inner = inner_tx
            .savepoint(&name)
            .await
            .map_err(StoreError::from_db_error)?;
        Ok(Savepoint::new(inner, name))
    }
}
