// Config is a central place for runtime configuration.
// It loads values from environment variables (falling back to a .env
// file via dotenvy) and gives you a typed, validated struct instead of
// raw strings scattered everywhere.

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_name: String,
    pub queues: Vec<String>,
    pub sleep_delay: u64,
    pub max_attempts: i32,
    pub max_run_time: i64,
    pub max_backoff_seconds: Option<i64>,
    pub extra_fields: Vec<String>,
    pub attribute_prefix: String,
    pub migrate_on_startup: bool,
    pub new_relic_license_key: Option<String>,
    pub new_relic_app_name: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_name = worker_identity();

        let queues = env_or_fallback("QUEUES", "PGFLOW_QUEUES")
            .unwrap_or_else(|| "default".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let sleep_delay = env_or_fallback("DJ_SLEEP_DELAY", "PGFLOW_SLEEP_DELAY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let max_attempts = env_or_fallback("DJ_MAX_ATTEMPTS", "PGFLOW_MAX_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let max_run_time = env_or_fallback("DJ_MAX_RUN_TIME", "PGFLOW_MAX_RUN_TIME")
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);

        let max_backoff_seconds = env_or_fallback("DJ_MAX_BACKOFF_SECONDS", "PGFLOW_MAX_BACKOFF_SECONDS")
            .and_then(|s| s.parse::<i64>().ok())
            .map(|v| v.max(5));

        let extra_fields = env_or_fallback("DJ_EXTRA_FIELDS", "PGFLOW_EXTRA_FIELDS")
            .map(|s| {
                s.split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let attribute_prefix =
            env_or_fallback("PGFLOW_ATTRIBUTE_PREFIX", "DJ_ATTRIBUTE_PREFIX").unwrap_or_default();

        let migrate_on_startup = env_bool("PGFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        let new_relic_license_key =
            std::env::var("NEW_RELIC_LICENSE_KEY").ok().filter(|s| !s.trim().is_empty());
        let new_relic_app_name =
            std::env::var("NEW_RELIC_APP_NAME").ok().filter(|s| !s.trim().is_empty());

        Ok(Self {
            database_url,
            worker_name,
            queues,
            sleep_delay,
            max_attempts,
            max_run_time,
            max_backoff_seconds,
            extra_fields,
            attribute_prefix,
            migrate_on_startup,
            new_relic_license_key,
            new_relic_app_name,
        })
    }

    /// Telemetry is only enabled when both New Relic env vars are set.
    pub fn telemetry_enabled(&self) -> bool {
        self.new_relic_license_key.is_some() && self.new_relic_app_name.is_some()
    }
}

/// `host:<hostname> pid:<pid>` — stable for the lifetime of one process,
/// used as the `locked_by` value.
fn worker_identity() -> String {
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    format!("host:{} pid:{}", hostname, std::process::id())
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
