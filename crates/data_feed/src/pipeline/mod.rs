//! The concurrent coordination layer of the pipeline.
//!
//! Decouples slow, caller-defined data production from a downstream
//! consumer that wants exact-size batches at a steady rate.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌────────────┐   ┌────────────┐        (N per coordinator)
//!   │ fetcher 0  │   │ fetcher 1  │  ...   each drives the Fetcher plugin
//!   └─────┬──────┘   └─────┬──────┘
//!         │ Chunk          │ Chunk
//!         ▼                ▼
//!       ┌──────────────────────┐
//!       │  ChunkQueue (bounded)│  shared by name across coordinators
//!       └─────────┬────────────┘
//!                 │ Chunks (arbitrary sample counts)
//!                 ▼
//!         ┌───────────────┐
//!         │   enqueuer    │  accumulates, splits at batch_size,
//!         └───────┬───────┘  returns surplus to the queue
//!                 │ Batch (exactly batch_size samples)
//!                 ▼
//!        ┌─────────────────┐
//!        │ FieldChannels   │  one per field, owned by the sink
//!        └─────────────────┘
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/pipeline/
//! ├── mod.rs             # Public API exports + module-level architecture docs
//! ├── config.rs          # CoordinatorConfig, builder, and validation
//! ├── queue.rs           # Bounded chunk queue with timeout-blocking ops
//! ├── metrics.rs         # Metrics accumulation and periodic flushing
//! ├── coordinator.rs     # Coordinator lifecycle and the batching algorithm
//! ├── workers.rs         # Producer and assembler thread bodies
//! └── registry.rs        # Named-queue sharing, worker IDs, start/stop-all
//! ```
//!
//! # Example Usage
//!
//! ```ignore
//! let registry: Registry<Vec<Row>> = Registry::new();
//! let config = CoordinatorConfig::builder()
//!     .field_names(["data", "label"])
//!     .batch_size(32)
//!     .num_worker_threads(4)
//!     .source_name("train")
//!     .build();
//!
//! registry.create_coordinator(config, Arc::new(my_fetcher), Box::new(my_sink))?;
//! registry.start_all()?;
//! // ... training loop consumes batches from the sink ...
//! let clean = registry.stop_all();
//! ```

mod config;
mod coordinator;
mod metrics;
mod queue;
mod registry;
mod workers;

// Public re-exports
pub use config::{CoordinatorConfig, CoordinatorConfigBuilder};
pub use coordinator::Coordinator;
pub use queue::ChunkQueue;
pub use registry::Registry;
