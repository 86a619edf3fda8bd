//! Chunks of per-field sample arrays.
//!
//! A `Chunk` is the unit of transfer between producer threads and the batch
//! assembler: one array per configured field, all sharing a single leading
//! sample count. The arrays themselves are opaque to the pipeline; anything
//! implementing [`BatchArray`] can flow through it.

use anyhow::{ensure, Result};

/// Interface boundary to the numeric array representation.
///
/// The pipeline only ever needs three things from an array: its leading
/// sample count, concatenation along the leading dimension, and a split at a
/// sample index. Tensor libraries, arrow buffers, or a plain `Vec` of rows
/// all fit behind this trait.
pub trait BatchArray: Send + 'static {
    /// Number of samples along the leading dimension.
    fn sample_count(&self) -> usize;

    /// Concatenates `other` after `self` along the leading dimension.
    fn append(&mut self, other: Self);

    /// Splits at sample index `at`: `self` keeps `[0, at)`, the returned
    /// array holds `[at, ..)`.
    fn split_off(&mut self, at: usize) -> Self;
}

/// A `Vec` of rows is the simplest array: one element per sample.
impl<T: Send + 'static> BatchArray for Vec<T> {
    fn sample_count(&self) -> usize {
        self.len()
    }

    fn append(&mut self, mut other: Self) {
        Vec::append(self, &mut other);
    }

    fn split_off(&mut self, at: usize) -> Self {
        Vec::split_off(self, at)
    }
}

/// An ordered group of per-field arrays produced by one fetch call.
///
/// All fields share one leading sample count; the count itself is arbitrary
/// relative to the configured batch size. Chunks are concatenated field-wise
/// by the assembler until an exact batch can be split off.
#[derive(Debug)]
pub struct Chunk<A> {
    fields: Vec<A>,
}

impl<A: BatchArray> Chunk<A> {
    /// Builds a chunk from per-field arrays, validating that every field
    /// carries the same number of samples.
    pub fn new(fields: Vec<A>) -> Result<Self> {
        if let Some(first) = fields.first() {
            let expected = first.sample_count();
            for (index, field) in fields.iter().enumerate().skip(1) {
                ensure!(
                    field.sample_count() == expected,
                    "field {} carries {} samples but field 0 carries {}; \
                     every field in a chunk must share one sample count",
                    index,
                    field.sample_count(),
                    expected,
                );
            }
        }
        Ok(Self { fields })
    }

    /// Samples shared by every field (0 for a field-less chunk).
    pub fn sample_count(&self) -> usize {
        self.fields.first().map_or(0, |f| f.sample_count())
    }

    /// Number of per-field arrays.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// True when the chunk carries no fields or no samples.
    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Concatenates `other` onto `self`, field by field.
    pub fn append(&mut self, other: Chunk<A>) -> Result<()> {
        ensure!(
            self.fields.len() == other.fields.len(),
            "cannot append a {}-field chunk onto a {}-field chunk",
            other.fields.len(),
            self.fields.len(),
        );
        for (dst, src) in self.fields.iter_mut().zip(other.fields) {
            dst.append(src);
        }
        Ok(())
    }

    /// Splits every field at sample index `at`; `self` keeps the prefix.
    pub fn split_off(&mut self, at: usize) -> Chunk<A> {
        let fields = self.fields.iter_mut().map(|f| f.split_off(at)).collect();
        Chunk { fields }
    }

    /// Borrow the per-field arrays in configuration order.
    pub fn fields(&self) -> &[A] {
        &self.fields
    }

    /// Consume the chunk, yielding the per-field arrays in order.
    pub fn into_fields(self) -> Vec<A> {
        self.fields
    }
}
