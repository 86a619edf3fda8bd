#![allow(dead_code)] // each test binary uses its own subset of these helpers

use anyhow::{bail, Result};
use data_feed::{BatchSink, Chunk, ChunkQueue, Fetcher, FieldChannel, MetricsLogger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Arrays in these tests are plain row vectors: one `i64` per sample.
pub type Rows = Vec<i64>;

/// Polls `cond` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Drains a queue non-destructively for the pipeline (which is stopped by
/// the time tests call this) and returns the remaining chunks.
pub fn drain_queue(queue: &ChunkQueue<Rows>) -> Vec<Chunk<Rows>> {
    let mut chunks = Vec::new();
    while let Some(chunk) = queue.pop_timeout(Duration::from_millis(20)) {
        chunks.push(chunk);
    }
    chunks
}

pub fn drained_samples(chunks: &[Chunk<Rows>]) -> usize {
    chunks.iter().map(Chunk::sample_count).sum()
}

// ============================================================================
// Fetchers
// ============================================================================

/// Produces `chunk_samples`-sized chunks of consecutive values until
/// `max_chunks` have been handed out, then reports "no data".
pub struct LimitedFetcher {
    fields: usize,
    chunk_samples: usize,
    max_chunks: usize,
    produced: AtomicUsize,
    next_value: AtomicUsize,
}

impl LimitedFetcher {
    pub fn new(fields: usize, chunk_samples: usize, max_chunks: usize) -> Self {
        Self {
            fields,
            chunk_samples,
            max_chunks,
            produced: AtomicUsize::new(0),
            next_value: AtomicUsize::new(0),
        }
    }

    pub fn chunks_produced(&self) -> usize {
        self.produced.load(Ordering::Relaxed)
    }
}

impl Fetcher<Rows> for LimitedFetcher {
    fn fetch(&self, _worker_id: u64, _batch_size_hint: usize) -> Result<Option<Vec<Rows>>> {
        let claimed = self
            .produced
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                (n < self.max_chunks).then_some(n + 1)
            });
        if claimed.is_err() {
            thread::sleep(Duration::from_millis(2));
            return Ok(None);
        }
        let base = self.next_value.fetch_add(self.chunk_samples, Ordering::Relaxed) as i64;
        let values: Rows = (0..self.chunk_samples as i64).map(|i| base + i).collect();
        Ok(Some(vec![values; self.fields]))
    }
}

/// Serves exactly one chunk per worker ID, then "no data" forever. Records
/// every produced value for conservation checks.
pub struct PerWorkerOnceFetcher {
    fields: usize,
    chunk_samples: usize,
    served: Mutex<Vec<u64>>,
    pub produced_values: Arc<Mutex<Vec<i64>>>,
}

impl PerWorkerOnceFetcher {
    pub fn new(fields: usize, chunk_samples: usize) -> Self {
        Self {
            fields,
            chunk_samples,
            served: Mutex::new(Vec::new()),
            produced_values: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Fetcher<Rows> for PerWorkerOnceFetcher {
    fn fetch(&self, worker_id: u64, _batch_size_hint: usize) -> Result<Option<Vec<Rows>>> {
        {
            let mut served = self.served.lock().unwrap();
            if served.contains(&worker_id) {
                drop(served);
                thread::sleep(Duration::from_millis(2));
                return Ok(None);
            }
            served.push(worker_id);
        }
        let values: Rows = (0..self.chunk_samples as i64)
            .map(|i| worker_id as i64 * 100 + i)
            .collect();
        self.produced_values
            .lock()
            .unwrap()
            .extend(values.iter().copied());
        Ok(Some(vec![values; self.fields]))
    }
}

/// Always reports "no data yet".
pub struct NoneFetcher {
    calls: AtomicUsize,
}

impl NoneFetcher {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Fetcher<Rows> for NoneFetcher {
    fn fetch(&self, _worker_id: u64, _batch_size_hint: usize) -> Result<Option<Vec<Rows>>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        thread::sleep(Duration::from_millis(1));
        Ok(None)
    }
}

/// Returns single-sample chunks until call number `fail_on`, then errors.
pub struct FailOnNthFetcher {
    fields: usize,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FailOnNthFetcher {
    pub fn new(fields: usize, fail_on: usize) -> Self {
        Self {
            fields,
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Fetcher<Rows> for FailOnNthFetcher {
    fn fetch(&self, _worker_id: u64, _batch_size_hint: usize) -> Result<Option<Vec<Rows>>> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if call >= self.fail_on {
            bail!("synthetic fetch failure on call {call}");
        }
        Ok(Some(vec![vec![call as i64]; self.fields]))
    }
}

/// Simulates a producer wedged in slow I/O: sleeps, then reports "no data".
pub struct BlockingFetcher {
    delay: Duration,
}

impl BlockingFetcher {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Fetcher<Rows> for BlockingFetcher {
    fn fetch(&self, _worker_id: u64, _batch_size_hint: usize) -> Result<Option<Vec<Rows>>> {
        thread::sleep(self.delay);
        Ok(None)
    }
}

/// Returns arrays whose per-field sample counts disagree.
pub struct MisshapenFetcher;

impl Fetcher<Rows> for MisshapenFetcher {
    fn fetch(&self, _worker_id: u64, _batch_size_hint: usize) -> Result<Option<Vec<Rows>>> {
        Ok(Some(vec![vec![1, 2, 3], vec![1]]))
    }
}

// ============================================================================
// Sinks and loggers
// ============================================================================

/// Records every channel creation, forward, and close. Cloning shares the
/// underlying state, so tests keep a handle while the coordinator owns the
/// sink.
#[derive(Clone, Default)]
pub struct CollectingSink {
    pub created: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<Mutex<Vec<String>>>,
    pub forwarded: Arc<Mutex<Vec<(String, Rows)>>>,
    forward_delay: Option<Duration>,
}

impl CollectingSink {
    pub fn with_forward_delay(delay: Duration) -> Self {
        Self {
            forward_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Arrays forwarded for one field, in forwarding order.
    pub fn batches_for(&self, field: &str) -> Vec<Rows> {
        self.forwarded
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == field)
            .map(|(_, rows)| rows.clone())
            .collect()
    }
}

impl BatchSink<Rows> for CollectingSink {
    fn create_channel(&self, field_name: &str) -> Result<Box<dyn FieldChannel<Rows>>> {
        self.created.lock().unwrap().push(field_name.to_string());
        Ok(Box::new(CollectingChannel {
            field: field_name.to_string(),
            sink: self.clone(),
        }))
    }
}

struct CollectingChannel {
    field: String,
    sink: CollectingSink,
}

impl FieldChannel<Rows> for CollectingChannel {
    fn forward(&self, array: Rows) -> Result<()> {
        if let Some(delay) = self.sink.forward_delay {
            thread::sleep(delay);
        }
        self.sink
            .forwarded
            .lock()
            .unwrap()
            .push((self.field.clone(), array));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.sink.closed.lock().unwrap().push(self.field.clone());
        Ok(())
    }
}

/// Stores every flushed metrics map.
#[derive(Clone, Default)]
pub struct CapturingLogger {
    pub flushes: Arc<Mutex<Vec<HashMap<String, f64>>>>,
}

impl CapturingLogger {
    pub fn flush_count(&self) -> usize {
        self.flushes.lock().unwrap().len()
    }

    /// Sum of `key` across every captured flush (absent keys count as 0).
    pub fn summed(&self, key: &str) -> f64 {
        self.flushes
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.get(key).copied().unwrap_or(0.0))
            .sum()
    }
}

impl MetricsLogger for CapturingLogger {
    fn log(&self, metrics: &HashMap<String, f64>) -> Result<()> {
        self.flushes.lock().unwrap().push(metrics.clone());
        Ok(())
    }
}

/// Always fails; used to prove logger isolation.
pub struct FailingLogger;

impl MetricsLogger for FailingLogger {
    fn log(&self, _metrics: &HashMap<String, f64>) -> Result<()> {
        bail!("metrics sink unavailable")
    }
}
