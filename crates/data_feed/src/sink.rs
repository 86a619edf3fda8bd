//! Downstream sink contracts.
//!
//! The compute engine consuming the batches lives outside this crate. Its
//! surface is reduced to two traits: a [`BatchSink`] that opens one channel
//! per configured field at coordinator construction, and the per-field
//! [`FieldChannel`] handles the assembler forwards exact-size batches into.

use anyhow::Result;

use crate::chunk::BatchArray;

/// Factory for per-field downstream channels.
///
/// `create_channel` is called once per field name when a coordinator is
/// constructed; the returned handles live for the coordinator's lifetime.
pub trait BatchSink<A: BatchArray>: Send + Sync {
    fn create_channel(&self, field_name: &str) -> Result<Box<dyn FieldChannel<A>>>;
}

/// Handle to one downstream field channel.
///
/// `forward` receives an array of exactly the configured batch size, once
/// per field per assembled batch. `close` is issued once per field when the
/// coordinator stops. A `forward` may race with `close` during shutdown;
/// implementations must tolerate the overlap (returning an error is enough,
/// the assembler treats forward failures as non-fatal).
pub trait FieldChannel<A>: Send + Sync {
    fn forward(&self, array: A) -> Result<()>;
    fn close(&self) -> Result<()>;
}
