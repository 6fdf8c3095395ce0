// crates/postgresflow/src/jobs/repo.rs
//
// Lease SQL, settlement SQL and the DELETE used on success. Every
// user-derived value (error text, worker identity, timestamps) is bound
// as a query parameter; only the already-whitelisted queue-name list is
// spliced into the `IN (...)` clause, since there is no placeholder
// syntax for a variable-length list of string literals in the non-macro
// `query`/`query_as` API used here.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::jobs::model::LeasedRow;

#[derive(Clone)]
pub struct JobsRepo {
    pool: PgPool,
    extra_fields: Vec<String>,
}

impl JobsRepo {
    pub fn new(pool: PgPool, extra_fields: Vec<String>) -> Self {
        Self { pool, extra_fields }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Atomically claims at most one leasable row. Rows are ordered
    /// `(priority ASC, run_at ASC)`.
    pub async fn lease_one(
        &self,
        queues: &[String],
        max_run_time_seconds: i64,
        self_identity: &str,
    ) -> anyhow::Result<Option<LeasedRow>> {
        validate_queue_names(queues)?;

        let now = Utc::now();
        let expired = now - chrono::Duration::seconds(max_run_time_seconds);
        let queue_list = queues
            .iter()
            .map(|q| format!("'{q}'"))
            .collect::<Vec<_>>()
            .join(", ");

        let extra_cols = self
            .extra_fields
            .iter()
            .map(|f| format!(", {f}"))
            .collect::<String>();

        let sql = format!(
            r#"
            UPDATE delayed_jobs
               SET locked_at = $1, locked_by = $2
             WHERE id IN (
               SELECT id FROM delayed_jobs
                WHERE ( (run_at <= $1 AND (locked_at IS NULL OR locked_at < $3))
                        OR locked_by = $2 )
                  AND failed_at IS NULL
                  AND queue IN ({queue_list})
                ORDER BY priority ASC, run_at ASC
                LIMIT 1
                FOR UPDATE
             )
            RETURNING id, attempts, run_at, queue, handler{extra_cols}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(now)
            .bind(self_identity)
            .bind(expired)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut extra = serde_json::Map::new();
        for field in &self.extra_fields {
            let value: Option<Value> = row.try_get(field.as_str()).unwrap_or(None);
            extra.insert(field.clone(), value.unwrap_or(Value::Null));
        }

        Ok(Some(LeasedRow {
            id: row.try_get("id")?,
            attempts: row.try_get("attempts")?,
            run_at: row.try_get("run_at")?,
            queue: row.try_get("queue")?,
            handler: row.try_get("handler")?,
            extra_fields: Value::Object(extra),
        }))
    }

    /// Retry settlement: clears the lease, bumps `attempts`, records the
    /// error, and schedules the next run.
    pub async fn apply_retry_settlement(
        &self,
        id: i64,
        attempts: i32,
        error_text: &str,
        next_run_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE delayed_jobs
               SET locked_at = NULL,
                   locked_by = NULL,
                   attempts = $2,
                   last_error = $3,
                   run_at = $4
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error_text)
        .bind(next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Permanent-failure settlement: clears the lease, bumps `attempts`,
    /// records the error, and sets `failed_at`. `run_at` is left
    /// unchanged.
    pub async fn apply_failure_settlement(
        &self,
        id: i64,
        attempts: i32,
        error_text: &str,
        failed_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE delayed_jobs
               SET locked_at = NULL,
                   locked_by = NULL,
                   attempts = $2,
                   last_error = $3,
                   failed_at = $4
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error_text)
        .bind(failed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Success settlement: the row is deleted outright.
    pub async fn remove(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM delayed_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Rejects anything that can't be safely spliced into an `IN (...)`
/// clause: blank entries and commas (which would let one "queue name"
/// inject additional entries).
fn validate_queue_names(queues: &[String]) -> anyhow::Result<()> {
    if queues.is_empty() {
        anyhow::bail!("queue list must not be empty");
    }
    for q in queues {
        if q.trim().is_empty() {
            anyhow::bail!("queue name must not be blank");
        }
        if q.contains(',') {
            anyhow::bail!("queue name must not contain a comma: {q:?}");
        }
        if !q
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            anyhow::bail!("queue name contains unsupported characters: {q:?}");
        }
    }
    Ok(())
}
