use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Settings for a [`WorkerPool`](crate::thread_pool::WorkerPool).
///
/// Every field has a default, so a config file only needs the keys it changes:
///
/// ```
/// use telemetry::config::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(r#"{ "workers": 4 }"#).unwrap();
/// assert_eq!(config.workers, 4);
/// assert_eq!(config.queue_capacity(), 8);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    // queue holds `workers * queue_factor` pending jobs
    pub queue_factor: usize,
    pub shutdown_timeout_ms: u64,
    pub backoff_unit_ms: u64,
}

impl PoolConfig {
    const DEFAULT_WORKERS: usize = 2;
    const DEFAULT_QUEUE_FACTOR: usize = 2;
    const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;
    const DEFAULT_BACKOFF_UNIT_MS: u64 = 1_000;

    pub fn new(workers: usize) -> Self {
        PoolConfig {
            workers,
            ..PoolConfig::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: PoolConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_config(
                "worker count must be positive".to_string(),
            ));
        }
        if self.queue_factor == 0 {
            return Err(Error::invalid_config(
                "queue factor must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn queue_capacity(&self) -> usize {
        self.workers.saturating_mul(self.queue_factor)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: PoolConfig::DEFAULT_WORKERS,
            queue_factor: PoolConfig::DEFAULT_QUEUE_FACTOR,
            shutdown_timeout_ms: PoolConfig::DEFAULT_SHUTDOWN_TIMEOUT_MS,
            backoff_unit_ms: PoolConfig::DEFAULT_BACKOFF_UNIT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.queue_capacity(), 4);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.backoff_unit(), Duration::from_secs(1));
    }

    #[test]
    fn load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "workers": 3, "backoff_unit_ms": 10 }}"#).unwrap();

        let config = PoolConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.backoff_unit(), Duration::from_millis(10));
        assert_eq!(config.shutdown_timeout_ms, 5_000);
    }

    #[test]
    fn reject_zero_workers() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "workers": 0 }}"#).unwrap();

        let err = PoolConfig::from_file(file.path()).unwrap_err();
        match err.kind() {
            ErrorKind::InvalidConfig(_) => {}
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn reject_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "workers = 3").unwrap();

        let err = PoolConfig::from_file(file.path()).unwrap_err();
        match err.kind() {
            ErrorKind::Json(_) => {}
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PoolConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
        match err.kind() {
            ErrorKind::Io(_) => {}
            other => panic!("unexpected error {:?}", other),
        }
    }
}
