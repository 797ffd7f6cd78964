//! Sift Store - Postgres persistence
//!
//! All database access goes through [`Database`], which owns a sized
//! connection pool. Writes that span multiple statements run in explicit
//! transactions; a transaction dropped on an error path rolls back before
//! the connection returns to the pool.

pub mod db;
pub mod findings;
pub mod jobs;
pub mod progress;

pub use db::{Database, DbConfig};
pub use findings::{next_cursor, FindingRow, FindingsFilter, Pagination};
pub use jobs::{JobRow, JobStats};
pub use progress::{ProgressRow, RefreshLogRow, RefreshResult, RefreshStats, RefreshType};
