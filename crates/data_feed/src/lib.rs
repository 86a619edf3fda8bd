//! Multithreaded batch-feeding pipeline.
//!
//! This crate provides an in-process data input mechanism for consumers
//! that want fixed-size batches at a steady rate. A pool of producer
//! threads drives a caller-supplied fetch plugin and feeds a bounded
//! queue; a single assembler thread drains the queue, enforces exact batch
//! sizes, and forwards batches to a downstream sink.
//!
//! Basic usage:
//! ```ignore
//! let registry: Registry<Vec<Row>> = Registry::new();
//! let coordinator = registry.create_coordinator(
//!     CoordinatorConfig::builder()
//!         .field_names(["data", "label"])
//!         .batch_size(32)
//!         .source_name("train")
//!         .build(),
//!     Arc::new(my_fetch_fun),
//!     Box::new(my_sink),
//! )?;
//! registry.start_all()?;
//! // ...
//! registry.stop_all();
//! ```
//!
//! The fetch plugin has call signature `fetch(worker_id, batch_size_hint)`
//! and returns one array per configured field. The arrays can have an
//! arbitrary number of samples; the batch size is provided as a hint only.
//! Returning `None` means "no data yet" and is retried, not an error.
//!
//! Coordinators constructed with the same `source_name` share one internal
//! queue, so distinct sources (such as train and test data) stay separate
//! while replicas of one source pool their producers.

pub mod chunk;
pub mod pipeline;
pub mod plugin;
pub mod sink;

pub use chunk::{BatchArray, Chunk};
pub use pipeline::{ChunkQueue, Coordinator, CoordinatorConfig, Registry};
pub use plugin::{Fetcher, Initializer, MetricsLogger};
pub use sink::{BatchSink, FieldChannel};
