mod handlers;

use postgresflow::config::Config;
use postgresflow::db;
use postgresflow::handler::parse_handler;
use postgresflow::jobs::{JobRecord, JobRegistry, JobsRepo};
use postgresflow::telemetry::{LoggingTelemetry, NoopTelemetry, TelemetryRecorder};

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// The worker-loop-internal error taxonomy, realized as a small enum
/// instead of an exception hierarchy. It never escapes `handle_job` — it
/// is always converted into a settlement call and, where telemetry is
/// configured, a `record_exception` call.
enum JobFailure {
    Runtime(String),
    Timeout,
    Terminated(&'static str),
}

impl JobFailure {
    fn message(&self, max_run_time: i64) -> String {
        match self {
            JobFailure::Runtime(text) => text.clone(),
            JobFailure::Timeout => format!(
                "Execution expired. Either do the job faster or raise max_run_time > {max_run_time} seconds"
            ),
            JobFailure::Terminated(signal) => signal.to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;

    println!(
        "pgflow worker starting... worker={} queues={:?} sleep_delay={}s max_attempts={} max_run_time={}s telemetry={}",
        cfg.worker_name,
        cfg.queues,
        cfg.sleep_delay,
        cfg.max_attempts,
        cfg.max_run_time,
        cfg.telemetry_enabled(),
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let jobs_repo = JobsRepo::new(pool.clone(), cfg.extra_fields.clone());
    let registry = Arc::new(handlers::build_registry());

    let telemetry: Arc<dyn TelemetryRecorder> = if cfg.telemetry_enabled() {
        Arc::new(LoggingTelemetry::new(cfg.attribute_prefix.clone()))
    } else {
        Arc::new(NoopTelemetry)
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel::<Option<&'static str>>(None);
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        println!("received signal: {name}");
        let _ = shutdown_tx.send(Some(name));
    });

    loop {
        if shutdown_rx.borrow().is_some() {
            break;
        }

        let leased = jobs_repo
            .lease_one(&cfg.queues, cfg.max_run_time, &cfg.worker_name)
            .await?;

        let Some(row) = leased else {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(cfg.sleep_delay)) => {},
                _ = shutdown_rx.changed() => {},
            }
            continue;
        };

        let should_exit = handle_job(
            row,
            &registry,
            &jobs_repo,
            telemetry.as_ref(),
            cfg.max_attempts,
            cfg.max_run_time,
            cfg.max_backoff_seconds,
            &mut shutdown_rx,
        )
        .await?;

        if should_exit {
            break;
        }
    }

    pool.close().await;
    telemetry.shutdown();
    println!("pgflow worker shut down cleanly");
    Ok(())
}

/// Lease → dispatch → time-bounded execute → settle, for one job.
/// Returns `true` when the worker loop must exit (a termination signal
/// was delivered while this job was running).
#[allow(clippy::too_many_arguments)]
async fn handle_job(
    row: postgresflow::jobs::LeasedRow,
    registry: &JobRegistry,
    repo: &JobsRepo,
    telemetry: &dyn TelemetryRecorder,
    max_attempts: i32,
    max_run_time: i64,
    max_backoff_seconds: Option<i64>,
    shutdown_rx: &mut watch::Receiver<Option<&'static str>>,
) -> anyhow::Result<bool> {
    let start = Instant::now();

    let parsed = parse_handler(&row.handler);
    let (class_name, attributes, job_obj) = match parsed {
        Ok(parsed) if registry.is_registered(&parsed.class_name) => {
            let job_obj = registry
                .construct(&parsed.class_name, row.id, parsed.attributes.clone())
                .expect("registry.is_registered just confirmed this class is present")?;
            (parsed.class_name, parsed.attributes, Some(job_obj))
        }
        Ok(parsed) => (parsed.class_name, Value::Null, None),
        Err(e) => (format!("<unparsable: {e}>"), Value::Null, None),
    };

    let mut record = JobRecord {
        id: row.id,
        class_name: class_name.clone(),
        attempts: row.attempts,
        max_attempts,
        queue: row.queue.clone(),
        max_backoff_seconds,
        attributes,
        abstract_job: job_obj.is_none(),
        extra_fields: row.extra_fields.clone(),
    };

    let latency_seconds = (chrono::Utc::now() - row.run_at).num_milliseconds() as f64 / 1000.0;
    let scope = telemetry.scope(&record.job_name());
    scope.report(&[
        ("job_id", Value::from(record.id)),
        ("job_name", Value::String(record.job_name())),
        ("job_queue", Value::String(record.queue.clone())),
        ("job_latency", Value::from(latency_seconds)),
        ("job_attempts", Value::from(record.attempts)),
    ]);
    if let Value::Object(extra) = &record.extra_fields {
        let extra_attrs: Vec<(&str, Value)> =
            extra.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        if !extra_attrs.is_empty() {
            scope.report(&extra_attrs);
        }
    }

    let mut should_exit = false;
    let mut error_flag = false;
    let mut failed_flag = false;
    let mut exception_text: Option<String> = None;

    match job_obj {
        None => {
            error_flag = true;
            let message = format!(
                "Unsupported Job: {class_name}, please import it before you can handle it"
            );
            exception_text = Some(message.clone());
            failed_flag = record.set_error_and_unlock(repo, &message).await?;
        }
        Some(mut job) => {
            println!("running job id={} class={}", record.id, record.class_name);

            let outcome: Result<(), JobFailure> = {
                let hooks = async {
                    job.before().await.map_err(|e| JobFailure::Runtime(e.to_string()))?;
                    job.run().await.map_err(|e| JobFailure::Runtime(e.to_string()))?;
                    job.after().await.map_err(|e| JobFailure::Runtime(e.to_string()))?;
                    Ok(())
                };
                tokio::pin!(hooks);

                tokio::select! {
                    res = &mut hooks => res,
                    _ = tokio::time::sleep(Duration::from_secs(max_run_time.max(0) as u64)) => {
                        Err(JobFailure::Timeout)
                    }
                    _ = shutdown_rx.changed() => {
                        let name = shutdown_rx.borrow().unwrap_or("SIGTERM");
                        Err(JobFailure::Terminated(name))
                    }
                }
            };

            match outcome {
                Ok(()) => {
                    job.success().await;
                    record.remove(repo).await?;
                }
                Err(failure) => {
                    error_flag = true;
                    should_exit = matches!(failure, JobFailure::Terminated(_));
                    let message = failure.message(max_run_time);
                    exception_text = Some(message.clone());
                    job.error(&message).await;
                    failed_flag = record.set_error_and_unlock(repo, &message).await?;
                    if failed_flag {
                        job.failure(&message).await;
                    }
                }
            }
        }
    }

    scope.report(&[
        ("error", Value::from(error_flag)),
        ("job_failure", Value::from(failed_flag)),
    ]);
    if let Some(text) = &exception_text {
        scope.record_exception(text);
    }

    println!(
        "job id={} finished in {} seconds",
        record.id,
        start.elapsed().as_secs()
    );

    Ok(should_exit)
}
