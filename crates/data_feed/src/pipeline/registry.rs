//! Process-wide registry of coordinators and named queues.
//!
//! The registry multiplexes independent data sources: coordinators naming
//! the same source share one internal queue instance, worker IDs are
//! allocated from one monotonic sequence, and `start_all`/`stop_all` drive
//! every registered coordinator from a single control point.
//!
//! Applications own the registry and call [`Registry::stop_all`] from their
//! control path; the `Drop` impl is only an advisory safety net covering
//! threads still running at teardown.

use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::chunk::BatchArray;
use crate::plugin::{Fetcher, Initializer, MetricsLogger};
use crate::sink::BatchSink;

use super::config::CoordinatorConfig;
use super::coordinator::Coordinator;
use super::queue::ChunkQueue;

/// Registry of named queues and active coordinators.
///
/// Queue and coordinator tables are mutex-guarded so registration from
/// multiple threads stays safe, although the expected usage pattern drives
/// everything from one control thread.
pub struct Registry<A: BatchArray> {
    queues: Mutex<HashMap<String, Arc<ChunkQueue<A>>>>,
    coordinators: Mutex<Vec<Arc<Coordinator<A>>>>,
    next_worker_id: AtomicU64,
    allocated_ids: Mutex<Vec<u64>>,
}

impl<A: BatchArray> Registry<A> {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            coordinators: Mutex::new(Vec::new()),
            next_worker_id: AtomicU64::new(0),
            allocated_ids: Mutex::new(Vec::new()),
        }
    }

    /// Returns the queue registered under `name`, creating it with
    /// `capacity` on first use. The first caller fixes the capacity for the
    /// process lifetime; a later caller asking for a different capacity
    /// receives the existing queue unchanged.
    pub fn get_or_create_queue(&self, name: &str, capacity: usize) -> Arc<ChunkQueue<A>> {
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get(name) {
            if queue.capacity() != capacity {
                debug!(
                    "queue {} already exists with capacity {}, ignoring requested capacity {}",
                    name,
                    queue.capacity(),
                    capacity
                );
            }
            return Arc::clone(queue);
        }
        let queue = Arc::new(ChunkQueue::new(capacity));
        queues.insert(name.to_string(), Arc::clone(&queue));
        queue
    }

    /// Hands out the next worker ID. IDs are process-unique and strictly
    /// increasing in allocation order, never reused, even across
    /// independent coordinators.
    pub fn allocate_worker_id(&self) -> u64 {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        self.allocated_ids.lock().push(id);
        id
    }

    /// Worker IDs handed out so far, in allocation order.
    pub fn allocated_worker_ids(&self) -> Vec<u64> {
        self.allocated_ids.lock().clone()
    }

    /// Appends a coordinator to the tracked set. No deduplication: a
    /// coordinator registered twice is started and stopped twice, which its
    /// idempotent lifecycle absorbs.
    pub fn register(&self, coordinator: Arc<Coordinator<A>>) {
        self.coordinators.lock().push(coordinator);
    }

    /// Builds and registers a coordinator for one data source.
    ///
    /// Resolves the shared queue by source name, allocates one worker ID
    /// per producer thread, and lets the sink create one downstream channel
    /// per field. The coordinator is not started; call
    /// [`start_all`](Self::start_all) (or `coordinator.start()`) next.
    pub fn create_coordinator(
        &self,
        config: CoordinatorConfig,
        fetcher: Arc<dyn Fetcher<A>>,
        sink: Box<dyn BatchSink<A>>,
    ) -> Result<Arc<Coordinator<A>>> {
        self.create_coordinator_with(config, fetcher, sink, None, Vec::new())
    }

    /// Like [`create_coordinator`](Self::create_coordinator), with an init
    /// plugin and external metrics loggers.
    pub fn create_coordinator_with(
        &self,
        config: CoordinatorConfig,
        fetcher: Arc<dyn Fetcher<A>>,
        sink: Box<dyn BatchSink<A>>,
        initializer: Option<Box<dyn Initializer<A>>>,
        loggers: Vec<Arc<dyn MetricsLogger>>,
    ) -> Result<Arc<Coordinator<A>>> {
        config.validate()?;
        let queue = self.get_or_create_queue(&config.source_name, config.max_buffered_chunks);
        let worker_ids: Vec<u64> = (0..config.num_worker_threads)
            .map(|_| self.allocate_worker_id())
            .collect();
        let coordinator = Arc::new(Coordinator::new(
            config,
            queue,
            worker_ids,
            fetcher,
            sink,
            initializer,
            loggers,
        )?);
        self.register(Arc::clone(&coordinator));
        Ok(coordinator)
    }

    /// Runs each registered coordinator's init plugin, then starts it. An
    /// init or spawn failure aborts and leaves the remaining coordinators
    /// unstarted.
    pub fn start_all(&self) -> Result<()> {
        // Snapshot outside the lock: init plugins may call back into the
        // registry (extra queues, further registration).
        let coordinators: Vec<_> = self.coordinators.lock().clone();
        for coordinator in coordinators {
            coordinator.initialize(self)?;
            coordinator.start()?;
        }
        Ok(())
    }

    /// Stops every registered coordinator, then joins each with its
    /// configured grace period. Returns true only if every supervised
    /// thread terminated in time. The registered set is cleared either way:
    /// coordinators are one-shot.
    pub fn stop_all(&self) -> bool {
        let coordinators: Vec<_> = {
            let mut guard = self.coordinators.lock();
            guard.drain(..).collect()
        };
        for coordinator in &coordinators {
            coordinator.stop(None);
        }
        let mut all_success = true;
        for coordinator in &coordinators {
            let success = coordinator.join(coordinator.configured_join_timeout());
            all_success = all_success && success;
        }
        all_success
    }
}

impl<A: BatchArray> Default for Registry<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Advisory teardown hook: stops whatever is still registered so dangling
/// producer threads do not outlive the owning application. Not a substitute
/// for an explicit `stop_all` on the control path.
impl<A: BatchArray> Drop for Registry<A> {
    fn drop(&mut self) {
        let _ = self.stop_all();
    }
}

#[cfg(test)]
mod registry_test {
    use super::*;

    #[test]
    fn test_worker_ids_are_strictly_increasing() {
        let registry: Registry<Vec<i64>> = Registry::new();
        let ids: Vec<u64> = (0..5).map(|_| registry.allocate_worker_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(registry.allocated_worker_ids(), ids);
    }

    #[test]
    fn test_queue_reuse_ignores_new_capacity() {
        let registry: Registry<Vec<i64>> = Registry::new();
        let first = registry.get_or_create_queue("train", 5);
        let second = registry.get_or_create_queue("train", 50);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.capacity(), 5);

        let other = registry.get_or_create_queue("test", 7);
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_empty_registry_stop_all_is_harmless() {
        let registry: Registry<Vec<i64>> = Registry::new();
        assert!(registry.stop_all());
        assert!(registry.start_all().is_ok());
    }
}
