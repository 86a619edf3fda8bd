//! Per-coordinator metrics accumulation and periodic flushing.
//!
//! Counters accumulate in a string-keyed map with zero-default semantics.
//! A flush computes the derived window metrics (`inputs_per_sec`,
//! `queue_size`, `time_elapsed`), hands a snapshot to every external
//! logger, then resets the map and the window. Flushes are piggybacked on
//! successful enqueues once the flush interval has elapsed, and forced when
//! the coordinator stops.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::plugin::MetricsLogger;

use super::config::CoordinatorConfig;

/// Metric accumulation window plus the external logger fan-out.
pub(crate) struct MetricsAccumulator {
    source_name: String,
    flush_interval: Duration,
    loggers: Vec<Arc<dyn MetricsLogger>>,
    window: Mutex<Window>,
}

struct Window {
    totals: HashMap<String, f64>,
    samples: u64,
    started: Instant,
}

impl MetricsAccumulator {
    pub(crate) fn new(config: &CoordinatorConfig, loggers: Vec<Arc<dyn MetricsLogger>>) -> Self {
        Self {
            source_name: config.source_name.clone(),
            flush_interval: config.flush_interval,
            loggers,
            window: Mutex::new(Window {
                totals: HashMap::new(),
                samples: 0,
                started: Instant::now(),
            }),
        }
    }

    /// Adds `value` under `key`; when `count`, also bumps the `{key}_count`
    /// companion. Unseen keys start at zero.
    pub(crate) fn record(&self, key: &str, value: f64, count: bool) {
        let mut window = self.window.lock();
        *window.totals.entry(key.to_string()).or_insert(0.0) += value;
        if count {
            *window.totals.entry(format!("{key}_count")).or_insert(0.0) += 1.0;
        }
    }

    /// Accounts `samples` freshly enqueued inputs and flushes if the window
    /// has run its course.
    pub(crate) fn note_samples(&self, samples: usize, queue_depth: usize) {
        let payload = {
            let mut window = self.window.lock();
            window.samples += samples as u64;
            if window.started.elapsed() >= self.flush_interval {
                Some(Self::drain_locked(&mut window, queue_depth))
            } else {
                None
            }
        };
        if let Some(payload) = payload {
            self.emit(&payload);
        }
    }

    /// Unconditional flush, used when the coordinator stops.
    pub(crate) fn force_flush(&self, queue_depth: usize) {
        let payload = {
            let mut window = self.window.lock();
            Self::drain_locked(&mut window, queue_depth)
        };
        self.emit(&payload);
    }

    /// Starts a fresh window; called when the coordinator starts.
    pub(crate) fn reset_window(&self) {
        let mut window = self.window.lock();
        window.samples = 0;
        window.started = Instant::now();
    }

    /// Copy of the running totals, for introspection.
    pub(crate) fn snapshot(&self) -> HashMap<String, f64> {
        self.window.lock().totals.clone()
    }

    /// Resets the window and returns its totals with the derived window
    /// metrics merged in. Called with the window lock held.
    fn drain_locked(window: &mut Window, queue_depth: usize) -> HashMap<String, f64> {
        let elapsed = window.started.elapsed().as_secs_f64();
        let inputs_per_sec = if elapsed > 0.0 {
            window.samples as f64 / elapsed
        } else {
            0.0
        };
        let mut totals = std::mem::take(&mut window.totals);
        totals.insert("inputs_per_sec".to_string(), inputs_per_sec);
        totals.insert("queue_size".to_string(), queue_depth as f64);
        totals.insert("time_elapsed".to_string(), elapsed);

        window.samples = 0;
        window.started = Instant::now();
        totals
    }

    /// Hands a flushed payload to every external logger. Runs outside the
    /// window lock so a slow or re-entrant logger cannot stall producers.
    fn emit(&self, payload: &HashMap<String, f64>) {
        info!(
            "{}: {:.0} inputs/sec, queue depth {:.0}",
            self.source_name, payload["inputs_per_sec"], payload["queue_size"]
        );
        for logger in &self.loggers {
            if let Err(e) = logger.log(payload) {
                warn!(
                    "{}: external metrics logger failed: {:#}",
                    self.source_name, e
                );
            }
        }
    }
}

/// Records elapsed wall time under `key` when dropped, so the metric is
/// written on every exit path of the enclosing scope.
pub(crate) struct MetricTimer<'a> {
    metrics: &'a MetricsAccumulator,
    key: &'static str,
    started: Instant,
}

impl<'a> MetricTimer<'a> {
    pub(crate) fn new(metrics: &'a MetricsAccumulator, key: &'static str) -> Self {
        Self {
            metrics,
            key,
            started: Instant::now(),
        }
    }
}

impl Drop for MetricTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .record(self.key, self.started.elapsed().as_secs_f64(), true);
    }
}
