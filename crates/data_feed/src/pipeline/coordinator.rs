//! Coordinator: lifecycle and batching for one data source.
//!
//! A coordinator owns the shared chunk queue reference, the downstream
//! field channels, the supervised producer/assembler threads, and the
//! metrics window for one source. It is built through
//! [`Registry::create_coordinator`](super::Registry::create_coordinator)
//! and is one-shot: once stopped it cannot be restarted, a fresh instance
//! is required for a new run.
//!
//! # Lifecycle
//! ```text
//! Created ──(init plugin, optional)──► Initialized ──start()──► Running
//!                                                                 │
//!                                  stop() / fatal producer error ─┘
//!                                                                 ▼
//!                                                              Stopped
//! ```
//!
//! Shutdown is cooperative: `stop` flips an atomic flag that every worker
//! loop re-checks within one poll interval; `join` then waits a bounded
//! grace period per thread and reports stragglers instead of blocking.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::chunk::{BatchArray, Chunk};
use crate::plugin::{Fetcher, Initializer, MetricsLogger};
use crate::sink::{BatchSink, FieldChannel};

use super::config::CoordinatorConfig;
use super::metrics::{MetricTimer, MetricsAccumulator};
use super::queue::ChunkQueue;
use super::registry::Registry;
use super::workers;

/// Queue depth below which producers are considered to be lagging behind
/// the consumer.
const BACKPRESSURE_LOW_WATER: usize = 2;

/// Sleep between `is_finished` probes while joining with a deadline.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Supervises the producer and assembler threads of one data source.
pub struct Coordinator<A: BatchArray> {
    source_name: String,
    field_names: Vec<String>,
    batch_size: usize,
    poll_timeout: Duration,
    join_timeout: Duration,
    warn_interval: Duration,

    queue: Arc<ChunkQueue<A>>,
    channels: Vec<Box<dyn FieldChannel<A>>>,
    fetcher: Arc<dyn Fetcher<A>>,
    initializer: Mutex<Option<Box<dyn Initializer<A>>>>,
    worker_ids: Vec<u64>,

    active: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
    pushed_chunks: AtomicU64,
    backpressure_warnings: AtomicU64,
    last_backpressure_warning: Mutex<Instant>,
    stop_reason: Mutex<Option<String>>,
    metrics: MetricsAccumulator,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl<A: BatchArray> Coordinator<A> {
    pub(crate) fn new(
        config: CoordinatorConfig,
        queue: Arc<ChunkQueue<A>>,
        worker_ids: Vec<u64>,
        fetcher: Arc<dyn Fetcher<A>>,
        sink: Box<dyn BatchSink<A>>,
        initializer: Option<Box<dyn Initializer<A>>>,
        loggers: Vec<Arc<dyn MetricsLogger>>,
    ) -> Result<Self> {
        let mut channels = Vec::with_capacity(config.field_names.len());
        for name in &config.field_names {
            let channel = sink
                .create_channel(name)
                .with_context(|| format!("Failed to create downstream channel for field {name}"))?;
            channels.push(channel);
        }

        let metrics = MetricsAccumulator::new(&config, loggers);
        Ok(Self {
            source_name: config.source_name,
            field_names: config.field_names,
            batch_size: config.batch_size,
            poll_timeout: config.poll_timeout,
            join_timeout: config.join_timeout,
            warn_interval: config.flush_interval,
            queue,
            channels,
            fetcher,
            initializer: Mutex::new(initializer),
            worker_ids,
            active: AtomicBool::new(false),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            pushed_chunks: AtomicU64::new(0),
            backpressure_warnings: AtomicU64::new(0),
            last_backpressure_warning: Mutex::new(Instant::now()),
            stop_reason: Mutex::new(None),
            metrics,
            workers: Mutex::new(Vec::new()),
        })
    }

    // ============================================================================
    // 1. Lifecycle
    // ============================================================================

    /// Runs the init plugin, if one was supplied, exactly once.
    pub(crate) fn initialize(&self, registry: &Registry<A>) -> Result<()> {
        let taken = self.initializer.lock().take();
        if let Some(mut init) = taken {
            init.init(self, registry)
                .with_context(|| format!("Init plugin failed for source {}", self.source_name))?;
        }
        Ok(())
    }

    /// Spawns the producer and assembler threads. A no-op when already
    /// started; a stopped coordinator stays stopped.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.stopped.load(Ordering::Relaxed) || self.started.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        self.active.store(true, Ordering::Relaxed);
        self.metrics.reset_window();

        let mut supervised = self.workers.lock();
        for &worker_id in &self.worker_ids {
            let coordinator = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("data_feed-fetcher-{worker_id}"))
                .spawn(move || workers::run_fetcher(coordinator, worker_id))
                .with_context(|| format!("Failed to spawn fetcher thread {worker_id}"))?;
            supervised.push(handle);
        }

        let coordinator = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("data_feed-enqueuer-{}", self.source_name))
            .spawn(move || workers::run_enqueuer(coordinator))
            .with_context(|| {
                format!("Failed to spawn enqueuer thread for {}", self.source_name)
            })?;
        supervised.push(handle);
        Ok(())
    }

    /// Signals every worker loop to wind down and closes the downstream
    /// channels. Idempotent: only the first call logs the reason and closes
    /// channels; every call flushes final metrics.
    pub fn stop(&self, reason: Option<&str>) {
        self.active.store(false, Ordering::Relaxed);
        let first_stop = !self.stopped.swap(true, Ordering::Relaxed);
        if first_stop {
            if let Some(reason) = reason {
                error!(
                    "{}: data input failed due to an error: {}",
                    self.source_name, reason
                );
                *self.stop_reason.lock() = Some(reason.to_string());
            }
            for (name, channel) in self.field_names.iter().zip(&self.channels) {
                if let Err(e) = channel.close() {
                    warn!(
                        "{}: failed to close downstream channel for field {}: {:#}",
                        self.source_name, name, e
                    );
                }
            }
        }
        self.metrics.force_flush(self.queue.len());
    }

    /// Waits up to `per_thread_timeout` for each supervised thread. Returns
    /// false when any thread outlived its grace period; such threads are
    /// reported and detached, never waited on indefinitely.
    pub fn join(&self, per_thread_timeout: Duration) -> bool {
        let handles: Vec<thread::JoinHandle<()>> = self.workers.lock().drain(..).collect();
        let current = thread::current().id();
        let mut success = true;
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle
                .thread()
                .name()
                .unwrap_or("<unnamed>")
                .to_string();
            let deadline = Instant::now() + per_thread_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL.min(per_thread_timeout));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("{}: worker thread {} panicked", self.source_name, name);
                }
            } else {
                warn!(
                    "{}: worker thread {} failed to terminate within {:?}",
                    self.source_name, name, per_thread_timeout
                );
                success = false;
            }
        }
        success
    }

    // ============================================================================
    // 2. Queueing
    // ============================================================================

    /// Pushes a producer-fetched chunk onto the internal queue, blocking in
    /// bounded steps while the coordinator is active.
    ///
    /// Zero-length chunks are rejected with a warning. While the queue is
    /// full the push is retried each poll interval; a stop in between
    /// abandons the chunk (at-most-one enqueue per produced chunk).
    pub fn enqueue_chunk(&self, chunk: Chunk<A>) {
        if chunk.field_count() == 0 || chunk.sample_count() == 0 {
            warn!("{}: worker provided zero-length input", self.source_name);
            return;
        }
        let samples = chunk.sample_count();
        let mut pending = chunk;
        while self.is_active() {
            self.warn_if_lagging();
            match self.queue.push_timeout(pending, self.poll_timeout) {
                Ok(()) => {
                    self.pushed_chunks.fetch_add(1, Ordering::Relaxed);
                    self.metrics.note_samples(samples, self.queue.len());
                    return;
                }
                Err(returned) => {
                    debug!("{}: queue full, stalling fetchers", self.source_name);
                    pending = returned;
                }
            }
        }
    }

    /// Emits the lagging-backpressure warning when the queue is nearly
    /// drained, rate-limited to one warning per flush interval.
    fn warn_if_lagging(&self) {
        let depth = self.queue.len();
        if depth >= BACKPRESSURE_LOW_WATER {
            return;
        }
        let mut last = self.last_backpressure_warning.lock();
        if last.elapsed() >= self.warn_interval {
            warn!(
                "{}: data loading lagging behind, queue depth {}",
                self.source_name, depth
            );
            self.backpressure_warnings.fetch_add(1, Ordering::Relaxed);
            *last = Instant::now();
        }
    }

    /// One assembler round: drain chunks until a full batch accumulates,
    /// split off any surplus back to the queue, forward the exact-size
    /// batch downstream.
    ///
    /// The surplus return is non-blocking; on a momentarily full queue the
    /// surplus is dropped, counted under `leftover_dropped`. A partial
    /// accumulation interrupted by a stop is returned the same way so the
    /// samples stay observable in the queue. Elapsed wall time is recorded
    /// under `enqueue_time` on every path.
    pub(crate) fn assemble_and_forward_batch(&self) {
        let mut accumulated: Option<Chunk<A>> = None;

        // Collect data until we have a full batch size
        while self.is_active()
            && accumulated.as_ref().map_or(0, Chunk::sample_count) < self.batch_size
        {
            let Some(chunk) = self.queue.pop_timeout(self.poll_timeout) else {
                continue;
            };
            match accumulated.as_mut() {
                None => accumulated = Some(chunk),
                Some(batch) => {
                    if let Err(e) = batch.append(chunk) {
                        self.stop(Some(&format!(
                            "producers feeding queue {} disagree on chunk shape: {:#}",
                            self.source_name, e
                        )));
                        return;
                    }
                }
            }
        }

        let _timer = MetricTimer::new(&self.metrics, "enqueue_time");
        let Some(mut batch) = accumulated else {
            return;
        };

        // Return data over the batch size back to the queue
        if batch.sample_count() > self.batch_size {
            let leftover = batch.split_off(self.batch_size);
            self.return_to_queue(leftover);
        }

        if !self.is_active() {
            // Stopped before a full batch formed (or before forwarding);
            // keep the samples buffered rather than vanishing them.
            self.return_to_queue(batch);
            return;
        }

        debug_assert_eq!(batch.sample_count(), self.batch_size);
        let arrays = batch.into_fields();
        for ((name, channel), array) in self.field_names.iter().zip(&self.channels).zip(arrays) {
            if let Err(e) = channel.forward(array) {
                debug!(
                    "{}: downstream forward failed for field {}: {:#}",
                    self.source_name, name, e
                );
            }
        }
    }

    /// Non-blocking give-back of surplus samples; drops them (counted) when
    /// the queue has no room.
    fn return_to_queue(&self, chunk: Chunk<A>) {
        let samples = chunk.sample_count();
        if samples == 0 {
            return;
        }
        if self.queue.try_push(chunk).is_err() {
            debug!(
                "{}: queue full, dropping {} leftover samples",
                self.source_name, samples
            );
            self.metrics.record("leftover_dropped", samples as f64, true);
        }
    }

    // ============================================================================
    // 3. Metrics & introspection
    // ============================================================================

    /// Adds `value` to the running total for `key`; when `count` also bumps
    /// the `{key}_count` companion counter.
    pub fn record_metric(&self, key: &str, value: f64, count: bool) {
        self.metrics.record(key, value, count);
    }

    /// Copy of the metrics accumulated since the last flush.
    pub fn metrics_snapshot(&self) -> HashMap<String, f64> {
        self.metrics.snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Worker IDs assigned to this coordinator's producer threads.
    pub fn worker_ids(&self) -> &[u64] {
        &self.worker_ids
    }

    /// Chunks currently buffered in the shared queue.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Chunks successfully pushed by producers so far.
    pub fn pushed_chunks(&self) -> u64 {
        self.pushed_chunks.load(Ordering::Relaxed)
    }

    /// Lagging-backpressure warnings emitted so far.
    pub fn backpressure_warnings(&self) -> u64 {
        self.backpressure_warnings.load(Ordering::Relaxed)
    }

    /// Reason given to the first effective `stop`, if any.
    pub fn stop_reason(&self) -> Option<String> {
        self.stop_reason.lock().clone()
    }

    pub(crate) fn fetcher(&self) -> &Arc<dyn Fetcher<A>> {
        &self.fetcher
    }

    pub(crate) fn metrics(&self) -> &MetricsAccumulator {
        &self.metrics
    }

    pub(crate) fn configured_join_timeout(&self) -> Duration {
        self.join_timeout
    }
}
