// Demo job registry: registers a couple of example `Job` implementations
// so the worker binary runs out of the box. Replace these with real
// handlers for your jobs.

use postgresflow::jobs::{BoxFuture, Job, JobRegistry};
use serde_json::Value;

/// Mirrors the `RegisteredJob` fixture from the original test suite: a
/// minimal concrete job whose `run` does nothing.
struct RegisteredJob {
    #[allow(dead_code)]
    attributes: Value,
}

impl Job for RegisteredJob {
    fn run(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// A job that always fails, used to exercise the retry/backoff path.
struct AlwaysFailsJob {
    message: String,
}

impl Job for AlwaysFailsJob {
    fn run(&mut self) -> BoxFuture<'_, anyhow::Result<()>> {
        let message = self.message.clone();
        Box::pin(async move { Err(anyhow::anyhow!(message)) })
    }
}

pub fn build_registry() -> JobRegistry {
    let registry = JobRegistry::new();

    registry.register("RegisteredJob", |_job_id, attributes| {
        Ok(Box::new(RegisteredJob { attributes }) as Box<dyn Job>)
    });

    registry.register("AlwaysFailsJob", |_job_id, _attributes| {
        Ok(Box::new(AlwaysFailsJob {
            message: "boom".to_string(),
        }) as Box<dyn Job>)
    });

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_demo_jobs() {
        let registry = build_registry();
        assert!(registry.is_registered("RegisteredJob"));
        assert!(registry.is_registered("AlwaysFailsJob"));
        assert!(!registry.is_registered("SomethingElse"));
    }
}
