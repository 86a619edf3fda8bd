//! Caller-supplied plugin contracts.
//!
//! The pipeline never loads data itself; it drives a user-provided
//! [`Fetcher`] from its producer threads. Optional hooks cover one-time
//! setup ([`Initializer`]) and periodic metrics export ([`MetricsLogger`]).
//!
//! Closures implement [`Fetcher`] and [`Initializer`] directly, so simple
//! callers do not need a named type:
//!
//! ```ignore
//! let fetcher = Arc::new(|worker_id: u64, hint: usize| -> Result<Option<Vec<Vec<i64>>>> {
//!     Ok(Some(vec![read_rows(hint)?, read_labels(hint)?]))
//! });
//! ```

use anyhow::Result;
use std::collections::HashMap;

use crate::chunk::BatchArray;
use crate::pipeline::{Coordinator, Registry};

/// Produces chunks of per-field data, one call at a time.
///
/// Called concurrently from every producer thread of a coordinator, each
/// with its own process-unique `worker_id`. `batch_size_hint` is advisory
/// only: the returned arrays may carry any sample count, as long as every
/// field agrees on it.
pub trait Fetcher<A: BatchArray>: Send + Sync {
    /// Returns one array per configured field, in configuration order, or
    /// `None` when no data is available yet (not an error; the producer
    /// simply retries).
    fn fetch(&self, worker_id: u64, batch_size_hint: usize) -> Result<Option<Vec<A>>>;
}

impl<A, F> Fetcher<A> for F
where
    A: BatchArray,
    F: Fn(u64, usize) -> Result<Option<Vec<A>>> + Send + Sync,
{
    fn fetch(&self, worker_id: u64, batch_size_hint: usize) -> Result<Option<Vec<A>>> {
        self(worker_id, batch_size_hint)
    }
}

/// One-time setup hook, run before any producer or assembler thread starts.
///
/// Typical uses: opening a data source, seeding a cache, pre-registering
/// extra queues through the registry.
pub trait Initializer<A: BatchArray>: Send {
    fn init(&mut self, coordinator: &Coordinator<A>, registry: &Registry<A>) -> Result<()>;
}

impl<A, F> Initializer<A> for F
where
    A: BatchArray,
    F: FnMut(&Coordinator<A>, &Registry<A>) -> Result<()> + Send,
{
    fn init(&mut self, coordinator: &Coordinator<A>, registry: &Registry<A>) -> Result<()> {
        self(coordinator, registry)
    }
}

/// Sink for periodic metric flushes.
///
/// Each configured logger receives the full metrics map once per flush
/// interval. Logger failures are isolated: an error is logged and the
/// remaining loggers still run.
pub trait MetricsLogger: Send + Sync {
    fn log(&self, metrics: &HashMap<String, f64>) -> Result<()>;
}
