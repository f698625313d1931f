//! Error types for matchdb

use crate::schema::EntityKind;
use thiserror::Error;

/// Result type alias for matchdb operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types for query compilation and database operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Registry misconfiguration (field collisions, bad derived expansions).
    /// Fatal at startup, never raised at query time.
    #[error("Registry configuration error: {0}")]
    Config(String),

    /// A criteria or sort field that no table or derived rule defines
    #[error("No such field '{field}' for entity {kind}")]
    UnknownField { kind: EntityKind, field: String },

    /// A statistic name outside the known category set
    #[error("Unknown statistic category: {0}")]
    UnknownStatistic(String),

    /// List values only combine with the `=` operator
    #[error("List value for '{field}' requires the '=' operator, got '{op}'")]
    ListOperator { field: String, op: &'static str },

    /// Join requested between entities whose primary keys share no fields
    #[error(
        "Cannot join {from} to {to}: non-overlapping primary keys \
         (Participant is only reachable through ParticipantAction)"
    )]
    UnrelatedJoin { from: EntityKind, to: EntityKind },

    /// Join requested from an entity to itself
    #[error("Cannot join {0} with itself")]
    SelfJoin(EntityKind),

    /// Aggregate criteria were supplied but a non-aggregate result method was called
    #[error("Aggregate criteria are only compatible with as_aggregate")]
    AggregateOnly,

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Migration error
    #[cfg(feature = "migrate")]
    #[error("Migration error: {0}")]
    Migration(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for errors caused by malformed query construction rather than
    /// backend execution. Usage errors are always raised before a statement
    /// is sent to the database.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownField { .. }
                | Self::UnknownStatistic(_)
                | Self::ListOperator { .. }
                | Self::UnrelatedJoin { .. }
                | Self::SelfJoin(_)
                | Self::AggregateOnly
        )
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Parse a tokio_postgres error into a more specific StoreError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(feature = "migrate")]
impl From<refinery::Error> for StoreError {
    fn from(err: refinery::Error) -> Self {
        Self::Migration(err.to_string())
    }
}
