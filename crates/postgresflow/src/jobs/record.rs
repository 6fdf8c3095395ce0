//! `JobRecord`: the in-memory state of one leased row, owned by the
//! worker thread that holds the lease until it settles. Split into an
//! envelope (this struct) plus the user-supplied `Job` trait object the
//! registry constructs (see `jobs::registry`).

use chrono::Utc;
use serde_json::Value;

use crate::jobs::backoff::compute_backoff_seconds;
use crate::jobs::repo::JobsRepo;

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub class_name: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub queue: String,
    pub max_backoff_seconds: Option<i64>,
    pub attributes: Value,
    /// `true` when the handler blob's class name has no registered
    /// constructor — the record carries envelope data only and cannot
    /// execute.
    pub abstract_job: bool,
    pub extra_fields: Value,
}

impl JobRecord {
    pub fn job_name(&self) -> String {
        format!("{}#run", self.class_name)
    }

    /// The failure settlement. Returns `true` when the job has now
    /// reached `max_attempts` and is permanently failed.
    pub async fn set_error_and_unlock(
        &mut self,
        repo: &JobsRepo,
        error_text: &str,
    ) -> anyhow::Result<bool> {
        self.attempts += 1;
        let now = Utc::now();

        if self.attempts >= self.max_attempts {
            repo.apply_failure_settlement(self.id, self.attempts, error_text, now)
                .await?;
            return Ok(true);
        }

        let delta = compute_backoff_seconds(self.attempts, self.max_backoff_seconds);
        let next_run_at = now + chrono::Duration::seconds(delta);
        repo.apply_retry_settlement(self.id, self.attempts, error_text, next_run_at)
            .await?;
        Ok(false)
    }

    /// The success settlement: delete the row outright.
    pub async fn remove(&self, repo: &JobsRepo) -> anyhow::Result<()> {
        repo.remove(self.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(attempts: i32, max_attempts: i32) -> JobRecord {
        JobRecord {
            id: 1,
            class_name: "RegisteredJob".to_string(),
            attempts,
            max_attempts,
            queue: "default".to_string(),
            max_backoff_seconds: None,
            attributes: Value::Null,
            abstract_job: false,
            extra_fields: Value::Null,
        }
    }

    #[test]
    fn job_name_matches_class_hash_run() {
        assert_eq!(record(0, 3).job_name(), "RegisteredJob#run");
    }
}
