use chrono::{DateTime, Utc};
use serde_json::Value;

/// One row leased out of `delayed_jobs`, as returned by the lease query's
/// `RETURNING` clause. Extension columns configured via `DJ_EXTRA_FIELDS`
/// are collected into `extra_fields`, keyed by column name.
#[derive(Debug, Clone)]
pub struct LeasedRow {
    pub id: i64,
    pub attempts: i32,
    pub run_at: DateTime<Utc>,
    pub queue: String,
    pub handler: String,
    pub extra_fields: Value,
}

/// The fields the enqueuer writes for a brand-new row.
#[derive(Debug, Clone)]
pub struct NewDelayedJob {
    pub handler: String,
    pub queue: String,
    pub run_at: DateTime<Utc>,
}
