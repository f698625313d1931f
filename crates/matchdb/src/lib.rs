//! # matchdb
//!
//! A PostgreSQL-backed relational store and query compiler for hierarchical
//! match data: events contain segments, segments contain actions, actions
//! carry per-participant stat lines, and participants sit alongside the
//! chain, reachable only through their stat lines.
//!
//! ## Features
//!
//! - **Entity-oriented criteria**: describe what you want per entity kind
//!   and let the compiler work out the joins
//! - **One statement per result shape**: criteria across the whole
//!   hierarchy compile into a single parameterized SELECT
//! - **Derived fields**: computed columns (yardage sums, points, winner)
//!   usable in criteria and sorting exactly like stored ones
//! - **Aggregates in the backend**: statistic totals grouped per
//!   participant with HAVING pushed into SQL
//! - **Transaction-friendly**: pass a transaction anywhere a
//!   [`GenericClient`] is expected
//!
//! ## Querying
//!
//! ```ignore
//! use matchdb::{Query, query_or};
//!
//! // Events from the 2024 season where anyone passed for 300+ yards.
//! let events = Query::new()
//!     .event([("season_year", 2024.into())])
//!     .participant_action([("passing_yds__ge", 300.into())])
//!     .as_events(&client)
//!     .await?;
//!
//! // Top ten rushing totals across a season.
//! let totals = Query::new()
//!     .event([("season_year", 2024.into())])
//!     .aggregate([("rushing_yds__ge", 1.into())])
//!     .sort("rushing_yds")
//!     .limit(10)
//!     .as_aggregate(&client)
//!     .await?;
//! ```
//!
//! Field names accept a comparison suffix (`__eq`, `__ne`, `__lt`, `__le`,
//! `__gt`, `__ge`); a bare name means equality, and a list value compiles
//! to `IN (..)`. Criteria added to a [`Query`] combine conjunctively;
//! [`query_or`] builds disjunctive queries, and `andalso`/`orelse` nest
//! whole sub-queries for arbitrary boolean shapes.

pub mod cache;
pub mod client;
pub mod condition;
pub mod eager;
pub mod error;
pub mod field;
pub mod join;
pub mod params;
pub mod query;
pub mod row;
pub mod schema;
pub mod sorter;
pub mod stats;
pub mod transaction;
pub mod types;

pub use client::GenericClient;
pub use condition::{Comparison, FieldRef, Op, Value};
pub use error::{StoreError, StoreResult};
pub use query::{Query, query, query_or};
pub use row::{FromRow, RowExt};
pub use schema::{EntityKind, validate_registry};
pub use sorter::{SortOrder, SortSpec};
pub use stats::Statistics;
pub use transaction::{Savepoint, TransactionExt};

// Used by the transaction macros; not part of the public API.
#[doc(hidden)]
pub use transaction::__next_savepoint_name;
pub use types::{
    Action, Clock, Event, FieldPos, Participant, ParticipantAction, Segment, Team,
};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};

#[cfg(feature = "migrate")]
pub mod migrate;
