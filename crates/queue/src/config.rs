use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use wmpro_core::error::CoreError;
use wmpro_core::job::{JobType, MAX_ATTEMPTS_LIMIT};

/// Maximum active jobs per job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    pub video: usize,
    pub image: usize,
    pub pdf: usize,
}

impl ConcurrencyLimits {
    pub fn for_type(&self, job_type: JobType) -> usize {
        match job_type {
            JobType::Video => self.video,
            JobType::Image => self.image,
            JobType::Pdf => self.pdf,
        }
    }
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            video: 2,
            image: 5,
            pdf: 3,
        }
    }
}

/// Attempt limit and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Default `maxAttempts` for jobs that do not override it.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Add up to 25% random jitter on top of the computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(60_000),
            jitter: false,
        }
    }
}

/// How many terminal records the store keeps before evicting the oldest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_completed: 10,
            keep_failed: 5,
        }
    }
}

/// Queue configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: ConcurrencyLimits,
    pub retry: RetryConfig,
    pub retention: RetentionConfig,
    /// Per-attempt limit on the processing call. `None` disables it.
    pub processing_timeout: Option<Duration>,
    /// Directory where per-attempt input copies are staged.
    pub work_dir: PathBuf,
    /// Prefix joined with the output file name to form `resultUrl`.
    pub output_url_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyLimits::default(),
            retry: RetryConfig::default(),
            retention: RetentionConfig::default(),
            processing_timeout: None,
            work_dir: std::env::temp_dir().join("wmpro-work"),
            output_url_prefix: "/output".to_string(),
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default        |
    /// |---------------------------|----------------|
    /// | `VIDEO_CONCURRENCY`       | `2`            |
    /// | `IMAGE_CONCURRENCY`       | `5`            |
    /// | `PDF_CONCURRENCY`         | `3`            |
    /// | `JOB_MAX_ATTEMPTS`        | `3`            |
    /// | `RETRY_BACKOFF_BASE_MS`   | `1000`         |
    /// | `RETRY_BACKOFF_MAX_MS`    | `60000`        |
    /// | `RETRY_JITTER`            | `false`        |
    /// | `KEEP_COMPLETED_JOBS`     | `10`           |
    /// | `KEEP_FAILED_JOBS`        | `5`            |
    /// | `PROCESSING_TIMEOUT_SECS` | unset          |
    /// | `WORK_DIR`                | OS temp dir    |
    /// | `OUTPUT_URL_PREFIX`       | `/output`      |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let concurrency = ConcurrencyLimits {
            video: parse_or(&lookup, "VIDEO_CONCURRENCY", defaults.concurrency.video)?,
            image: parse_or(&lookup, "IMAGE_CONCURRENCY", defaults.concurrency.image)?,
            pdf: parse_or(&lookup, "PDF_CONCURRENCY", defaults.concurrency.pdf)?,
        };

        let retry = RetryConfig {
            max_attempts: parse_or(&lookup, "JOB_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            backoff_base: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_BACKOFF_BASE_MS",
                defaults.retry.backoff_base.as_millis() as u64,
            )?),
            backoff_max: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_BACKOFF_MAX_MS",
                defaults.retry.backoff_max.as_millis() as u64,
            )?),
            jitter: parse_or(&lookup, "RETRY_JITTER", defaults.retry.jitter)?,
        };

        let retention = RetentionConfig {
            keep_completed: parse_or(
                &lookup,
                "KEEP_COMPLETED_JOBS",
                defaults.retention.keep_completed,
            )?,
            keep_failed: parse_or(&lookup, "KEEP_FAILED_JOBS", defaults.retention.keep_failed)?,
        };

        let processing_timeout = match lookup("PROCESSING_TIMEOUT_SECS") {
            Some(raw) if !raw.trim().is_empty() => {
                Some(Duration::from_secs(parse_value("PROCESSING_TIMEOUT_SECS", &raw)?))
            }
            _ => None,
        };

        let work_dir = lookup("WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);

        let output_url_prefix = lookup("OUTPUT_URL_PREFIX")
            .map(|prefix| prefix.trim_end_matches('/').to_string())
            .unwrap_or(defaults.output_url_prefix);

        let config = Self {
            concurrency,
            retry,
            retention,
            processing_timeout,
            work_dir,
            output_url_prefix,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the queue cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        for job_type in JobType::ALL {
            if self.concurrency.for_type(job_type) == 0 {
                return Err(CoreError::Validation(format!(
                    "Concurrency for {job_type} jobs must be at least 1"
                )));
            }
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(CoreError::Validation(format!(
                "JOB_MAX_ATTEMPTS must be between 1 and {MAX_ATTEMPTS_LIMIT}"
            )));
        }
        if self.retry.backoff_max < self.retry.backoff_base {
            return Err(CoreError::Validation(
                "RETRY_BACKOFF_MAX_MS must not be lower than RETRY_BACKOFF_BASE_MS".to_string(),
            ));
        }
        if self.processing_timeout == Some(Duration::ZERO) {
            return Err(CoreError::Validation(
                "PROCESSING_TIMEOUT_SECS must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} has an invalid value '{raw}'")))
}
