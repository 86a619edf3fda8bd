//! Bounded chunk queue shared between producers and the assembler.
//!
//! Thin wrapper over a `crossbeam_channel::bounded` pair. Holding both ends
//! in one struct keeps the channel alive for the queue's lifetime, so the
//! only failure modes callers see are `Timeout` (bounded blocking) and
//! `Full` (non-blocking push). Every blocking operation takes a sub-second
//! timeout so callers can re-check a liveness flag instead of parking
//! forever.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

use crate::chunk::{BatchArray, Chunk};

/// Capacity-bounded FIFO of chunks, safe for concurrent multi-producer /
/// single-consumer use. Shared between coordinators as `Arc<ChunkQueue<A>>`
/// when they name the same source.
pub struct ChunkQueue<A> {
    tx: Sender<Chunk<A>>,
    rx: Receiver<Chunk<A>>,
    capacity: usize,
}

impl<A: BatchArray> ChunkQueue<A> {
    /// Creates a queue holding at most `capacity` chunks.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Blocking push bounded by `timeout`. On timeout the chunk is handed
    /// back to the caller so it can retry after re-checking liveness.
    pub fn push_timeout(&self, chunk: Chunk<A>, timeout: Duration) -> Result<(), Chunk<A>> {
        match self.tx.send_timeout(chunk, timeout) {
            Ok(()) => Ok(()),
            Err(err) => Err(err.into_inner()),
        }
    }

    /// Non-blocking push. On a full queue the chunk is handed back.
    pub fn try_push(&self, chunk: Chunk<A>) -> Result<(), Chunk<A>> {
        match self.tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(chunk)) | Err(TrySendError::Disconnected(chunk)) => Err(chunk),
        }
    }

    /// Blocking pop bounded by `timeout`; `None` when nothing arrived.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Chunk<A>> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Some(chunk),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Chunks currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Capacity fixed at creation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod queue_test {
    use super::*;
    use anyhow::Result;
    use std::time::Duration;

    fn chunk_of(values: Vec<i64>) -> Chunk<Vec<i64>> {
        Chunk::new(vec![values]).unwrap()
    }

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_queue_is_fifo() -> Result<()> {
        let queue: ChunkQueue<Vec<i64>> = ChunkQueue::new(4);
        queue.push_timeout(chunk_of(vec![1]), SHORT).unwrap();
        queue.push_timeout(chunk_of(vec![2, 3]), SHORT).unwrap();
        assert_eq!(queue.len(), 2);

        let first = queue.pop_timeout(SHORT).unwrap();
        assert_eq!(first.fields()[0], vec![1]);
        let second = queue.pop_timeout(SHORT).unwrap();
        assert_eq!(second.fields()[0], vec![2, 3]);
        assert!(queue.is_empty());
        Ok(())
    }

    #[test]
    fn test_pop_times_out_on_empty_queue() {
        let queue: ChunkQueue<Vec<i64>> = ChunkQueue::new(1);
        assert!(queue.pop_timeout(SHORT).is_none());
    }

    #[test]
    fn test_push_returns_chunk_when_full() {
        let queue: ChunkQueue<Vec<i64>> = ChunkQueue::new(1);
        queue.try_push(chunk_of(vec![1])).unwrap();

        let rejected = queue.try_push(chunk_of(vec![2])).unwrap_err();
        assert_eq!(rejected.fields()[0], vec![2]);

        let timed_out = queue.push_timeout(chunk_of(vec![3]), SHORT).unwrap_err();
        assert_eq!(timed_out.fields()[0], vec![3]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.capacity(), 1);
    }
}
