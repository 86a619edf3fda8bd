//! Producer (fetcher) and assembler (enqueuer) thread bodies.
//!
//! Both loops poll the coordinator's `active` flag between bounded blocking
//! operations, so a stop is observed within one poll interval. A producer
//! that returns an invalid result or an error stops the whole coordinator:
//! downstream consumers need a continuous, trustworthy stream, and a
//! corrupted producer cannot be trusted to self-heal.

use anyhow::{ensure, Result};
use std::sync::Arc;
use tracing::{debug, error};

use crate::chunk::{BatchArray, Chunk};

use super::coordinator::Coordinator;
use super::metrics::MetricTimer;

/// Producer loop: repeatedly invokes the fetch plugin and pushes validated
/// chunks onto the coordinator's queue.
pub(crate) fn run_fetcher<A: BatchArray>(coordinator: Arc<Coordinator<A>>, worker_id: u64) {
    while coordinator.is_active() {
        let _timer = MetricTimer::new(coordinator.metrics(), "fetcher_time");
        match coordinator
            .fetcher()
            .fetch(worker_id, coordinator.batch_size())
        {
            Ok(None) => {
                debug!("fetcher {} returned no data", worker_id);
            }
            Ok(Some(arrays)) => match build_chunk(arrays, coordinator.field_names().len()) {
                Ok(chunk) => coordinator.enqueue_chunk(chunk),
                Err(e) => {
                    error!("invalid fetch result from worker {}: {:#}", worker_id, e);
                    coordinator.stop(Some(&format!(
                        "invalid fetch result from worker {worker_id}: {e:#}"
                    )));
                }
            },
            Err(e) => {
                error!("exception in fetcher {}: {:#}", worker_id, e);
                coordinator.stop(Some(&format!("exception in fetcher {worker_id}: {e:#}")));
            }
        }
    }
}

/// Validates the shape of a fetch result: one array per configured field,
/// all sharing one leading sample count (checked by `Chunk::new`). The
/// "every element is an array" requirement is enforced at compile time by
/// the `BatchArray` bound.
fn build_chunk<A: BatchArray>(arrays: Vec<A>, expected_fields: usize) -> Result<Chunk<A>> {
    ensure!(
        arrays.len() == expected_fields,
        "expecting one array per field: got {} arrays for {} fields",
        arrays.len(),
        expected_fields,
    );
    Chunk::new(arrays)
}

/// Assembler loop: the single consumer of the internal queue and the single
/// forwarder to the downstream sink.
pub(crate) fn run_enqueuer<A: BatchArray>(coordinator: Arc<Coordinator<A>>) {
    while coordinator.is_active() {
        coordinator.assemble_and_forward_batch();
    }
}
