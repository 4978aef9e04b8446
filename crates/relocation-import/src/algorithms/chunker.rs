//! # Chunker
//!
//! Splits the record stream into contiguous same-kind batches of bounded
//! size, preserving source order.
//!
//! Offsets count the same-kind records already emitted. They restart when
//! the kind changes, since kinds are expected to be contiguous.

use shared_types::{KindName, Record};
use std::iter::Peekable;

use crate::domain::Chunk;

/// Iterator over the batches of a record stream.
pub struct Chunker<I: Iterator<Item = Record>> {
    records: Peekable<I>,
    max_batch_size: usize,
    current_kind: Option<KindName>,
    offset: u64,
}

impl<I: Iterator<Item = Record>> Chunker<I> {
    /// Chunk `records` into batches of at most `max_batch_size` (at least 1).
    pub fn new(records: impl IntoIterator<IntoIter = I>, max_batch_size: usize) -> Self {
        Self {
            records: records.into_iter().peekable(),
            max_batch_size: max_batch_size.max(1),
            current_kind: None,
            offset: 0,
        }
    }
}

impl<I: Iterator<Item = Record>> Iterator for Chunker<I> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let first = self.records.next()?;
        let kind = first.kind.clone();

        if self.current_kind.as_ref() != Some(&kind) {
            self.current_kind = Some(kind.clone());
            self.offset = 0;
        }

        let mut records = Vec::with_capacity(self.max_batch_size);
        records.push(first);
        while records.len() < self.max_batch_size {
            match self.records.next_if(|r| r.kind == kind) {
                Some(record) => records.push(record),
                None => break,
            }
        }

        let chunk = Chunk {
            kind,
            offset: self.offset,
            records,
        };
        self.offset += chunk.len() as u64;
        Some(chunk)
    }
}

/// Collect every batch of `records`.
pub fn chunk_records(records: Vec<Record>, max_batch_size: usize) -> Vec<Chunk> {
    Chunker::new(records, max_batch_size).collect()
}
