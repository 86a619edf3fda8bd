//! Configuration for a data-feeding coordinator.
//!
//! Example:
//! ```ignore
//! let config = CoordinatorConfig::builder()
//!     .field_names(["data", "label"])
//!     .batch_size(32)
//!     .num_worker_threads(4)
//!     .source_name("train")
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_worker_threads`: more producers can improve throughput when the
//!   fetch plugin is I/O bound, at the cost of more buffered chunks
//! - `max_buffered_chunks`: larger values smooth out bursty producers but
//!   hold more samples in memory
//! - `poll_timeout`: shorter values make shutdown more responsive at the
//!   cost of more wakeups while idle

use anyhow::{ensure, Result};
use std::time::Duration;

/// Configuration for one coordinator (one data source).
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Ordered field identifiers; fixes the chunk/batch shape arity.
    pub field_names: Vec<String>,
    /// Exact sample count of every batch forwarded downstream.
    pub batch_size: usize,
    /// Number of producer threads invoking the fetch plugin.
    pub num_worker_threads: usize,
    /// Queue-sharing key: coordinators naming the same source share one
    /// internal queue.
    pub source_name: String,
    /// Capacity of the internal chunk queue.
    pub max_buffered_chunks: usize,
    /// Timeout of every blocking queue operation. Bounds how long a worker
    /// takes to observe a stop signal.
    pub poll_timeout: Duration,
    /// Grace period `stop_all` waits per supervised thread.
    pub join_timeout: Duration,
    /// Metrics flush period; also rate-limits the backpressure warning.
    pub flush_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            field_names: Vec::new(),
            batch_size: 1,
            num_worker_threads: 2,
            source_name: "train".to_string(),
            max_buffered_chunks: 800,
            poll_timeout: Duration::from_millis(500),
            join_timeout: Duration::from_secs(5),
            flush_interval: Duration::from_secs(60),
        }
    }
}

impl CoordinatorConfig {
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            !self.field_names.is_empty(),
            "At least one field name is required"
        );
        ensure!(self.batch_size > 0, "Batch size must be greater than 0");
        ensure!(
            self.num_worker_threads > 0,
            "Cannot feed data with 0 worker threads"
        );
        ensure!(
            self.max_buffered_chunks > 0,
            "Queue capacity must be greater than 0"
        );
        ensure!(
            !self.poll_timeout.is_zero(),
            "Poll timeout must be non-zero"
        );
        Ok(())
    }
}

/// Builder for CoordinatorConfig with method chaining
#[derive(Default)]
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    /// Set the ordered field names (must be non-empty)
    pub fn field_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.field_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the batch size (must be > 0)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the number of producer threads
    pub fn num_worker_threads(mut self, workers: usize) -> Self {
        self.config.num_worker_threads = workers;
        self
    }

    /// Set the source name used as the queue-sharing key
    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.config.source_name = name.into();
        self
    }

    /// Set the internal queue capacity
    pub fn max_buffered_chunks(mut self, capacity: usize) -> Self {
        self.config.max_buffered_chunks = capacity;
        self
    }

    /// Set the polling interval for blocking queue operations
    ///
    /// - Too low: more responsive shutdown, higher CPU usage.
    /// - Too high: less CPU overhead, slower shutdown response
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    /// Set the per-thread grace period used when joining workers
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config.join_timeout = timeout;
        self
    }

    /// Set the metrics flush period (also the backpressure warning rate limit)
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> CoordinatorConfig {
        self.config
    }
}
