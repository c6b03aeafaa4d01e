use crate::budget::DEFAULT_MAX_TOTAL_CELLS;
use std::time::Duration;

/// Upper bound on workers picked when nothing is configured.
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Environment variable overriding the worker count.
pub const WORKER_THREADS_ENV: &str = "WORKER_THREADS";

/// Per-request resource limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Lookup-table cells plus variables allowed per request.
    pub max_total_cells: u64,
    pub max_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_total_cells: DEFAULT_MAX_TOTAL_CELLS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    /// Requests waiting for a worker before `submit` blocks.
    pub queue_capacity: usize,
    /// How long `drain` waits for in-flight tasks.
    pub shutdown_timeout: Duration,
    pub limits: Limits,
}

/// `min(available parallelism, 4)`, at least one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, DEFAULT_MAX_WORKERS)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            limits: Limits::default(),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            ..Self::default()
        }
    }

    /// Defaults, with `WORKER_THREADS` honoured when it holds a positive integer.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = std::env::var(WORKER_THREADS_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            config.workers = workers;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_workers_are_capped() {
        let workers = default_worker_count();
        assert!((1..=DEFAULT_MAX_WORKERS).contains(&workers));
    }

    #[test]
    fn zero_workers_round_up() {
        assert_eq!(PoolConfig::with_workers(0).workers, 1);
    }

    #[test]
    fn limits_default_to_reference_values() {
        let limits = Limits::default();
        assert_eq!(limits.max_total_cells, 50_000);
        assert_eq!(limits.max_body_bytes, 1_048_576);
    }
}
