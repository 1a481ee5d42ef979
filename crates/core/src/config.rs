//! Queue configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Default number of jobs admitted to processing at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;
/// Default interval of the periodic admission check.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
/// Default number of completed jobs retained for estimation.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;
/// Default per-file processing time before any history exists.
pub const DEFAULT_PER_FILE_MS: u64 = 5000;
/// Default fixed per-job overhead before any history exists.
pub const DEFAULT_BASE_OVERHEAD_MS: u64 = 10_000;
/// Default watchdog limit for a single job (5 minutes).
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 300_000;

/// Admission queue and estimation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Size of the processing pool. Must be positive.
    pub max_concurrent_jobs: usize,
    /// Interval of the safety-net admission tick.
    pub poll_interval: Duration,
    /// Ring buffer size of completed-job history. Must be positive.
    pub history_capacity: usize,
    pub default_per_file_ms: u64,
    pub default_base_overhead_ms: u64,
    /// Processing time after which the watchdog fails a job. `None` disables it.
    pub job_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            default_per_file_ms: DEFAULT_PER_FILE_MS,
            default_base_overhead_ms: DEFAULT_BASE_OVERHEAD_MS,
            job_timeout: Some(Duration::from_millis(DEFAULT_JOB_TIMEOUT_MS)),
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default  |
    /// |----------------------------|----------|
    /// | `MAX_CONCURRENT_JOBS`      | `2`      |
    /// | `QUEUE_POLL_INTERVAL_MS`   | `2000`   |
    /// | `HISTORY_CAPACITY`         | `20`     |
    /// | `DEFAULT_PER_FILE_MS`      | `5000`   |
    /// | `DEFAULT_BASE_OVERHEAD_MS` | `10000`  |
    /// | `JOB_TIMEOUT_MS`           | `300000` (`0` disables) |
    pub fn from_env() -> Result<Self, CoreError> {
        let timeout_ms: u64 = env_or("JOB_TIMEOUT_MS", DEFAULT_JOB_TIMEOUT_MS)?;

        let config = Self {
            max_concurrent_jobs: env_or("MAX_CONCURRENT_JOBS", DEFAULT_MAX_CONCURRENT_JOBS)?,
            poll_interval: Duration::from_millis(env_or(
                "QUEUE_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            history_capacity: env_or("HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY)?,
            default_per_file_ms: env_or("DEFAULT_PER_FILE_MS", DEFAULT_PER_FILE_MS)?,
            default_base_overhead_ms: env_or("DEFAULT_BASE_OVERHEAD_MS", DEFAULT_BASE_OVERHEAD_MS)?,
            job_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the queue cannot operate with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrent_jobs == 0 {
            return Err(CoreError::Validation(
                "max_concurrent_jobs must be greater than 0".into(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(CoreError::Validation(
                "history_capacity must be greater than 0".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(CoreError::Validation(
                "poll_interval must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{name} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
