//! Row mapping traits and utilities

use crate::error::StoreResult;
use tokio_postgres::Row;

/// Trait for converting a database row into a Rust struct.
///
/// Entity implementations expect the column-aliasing convention used by the
/// query compiler: every selected column is aliased
/// `<primary_table>_<field>` (e.g. `event_week`), which keeps table aliases
/// opaque to materialization and lets the same entity be read out of any
/// join shape.
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> StoreResult<Self>;
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning StoreError::Decode on failure
    fn try_get_column<T>(&self, column: &str) -> StoreResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>;

    /// Like `try_get_column`, but returns `None` when the column is absent
    /// from the row instead of erroring. Used by entities that materialize
    /// from both full-row and aggregate-row shapes.
    fn get_column_opt<T>(&self, column: &str) -> StoreResult<Option<T>>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> StoreResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| crate::error::StoreError::decode(column, e.to_string()))
    }

    fn get_column_opt<T>(&self, column: &str) -> StoreResult<Option<T>>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        if self.columns().iter().any(|c| c.name() == column) {
            self.try_get(column)
                .map_err(|e| crate::error::StoreError::decode(column, e.to_string()))
        } else {
            Ok(None)
        }
    }
}
