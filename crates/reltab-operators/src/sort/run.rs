//! Run generation for the external sort.
//!
//! Accumulates rows in memory (up to the row and byte bounds), sorts each
//! chunk, and streams it into a spill segment. An input that fits in a single
//! chunk never touches storage.

use std::sync::Arc;

use reltab_core::budget::{BudgetGuard, MemoryBudget};
use reltab_core::error::{Error, Result};
use reltab_core::key::BoundKey;
use reltab_core::order::compare;
use reltab_core::{Header, Row, RowStream, Value};
use reltab_mem::guard::Reservation;
use reltab_mem::{ByteBudget, Codec, SegmentMeta, SpillManager, Storage};

use super::merge::{MergeIter, RowSource};
use super::SortOptions;

/// The product of run generation: either one in-memory run or a set of
/// sealed spill segments ready for the final merge.
pub(crate) struct SortedRuns {
    header: Header,
    key: BoundKey,
    reverse: bool,
    runs: Runs,
}

enum Runs {
    Memory(Arc<Vec<Row>>),
    Spilled {
        spill: SpillManager,
        segments: Vec<SegmentMeta>,
    },
}

impl SortedRuns {
    /// Start one pass over the sorted rows. Spilled segments are merged on
    /// the fly; the stream keeps `runs` (and so the segments) alive.
    pub(crate) fn stream(runs: &Arc<SortedRuns>) -> Result<RowStream> {
        let header = runs.header.clone();
        match &runs.runs {
            Runs::Memory(rows) => {
                let rows = Arc::clone(rows);
                let iter = (0..rows.len()).map(move |i| Ok(rows[i].clone()));
                Ok(RowStream::new(header, iter))
            }
            Runs::Spilled { spill, segments } => {
                let sources = open_segments(spill, segments, &runs.key)?;
                let merged = MergeIter::new(sources, runs.reverse);
                Ok(RowStream::new(
                    header,
                    Pinned {
                        _runs: Arc::clone(runs),
                        inner: merged,
                    },
                ))
            }
        }
    }
}

/// Holds the owner of the spill segments for as long as they are read.
struct Pinned<I> {
    _runs: Arc<SortedRuns>,
    inner: I,
}

impl<I: Iterator> Iterator for Pinned<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

fn open_segments(
    spill: &SpillManager,
    segments: &[SegmentMeta],
    key: &BoundKey,
) -> Result<Vec<(RowSource, BoundKey)>> {
    segments
        .iter()
        .map(|meta| {
            let reader = spill.read_run(meta)?;
            let source: RowSource = Box::new(reader.map(|r| r.map_err(Into::into)));
            Ok((source, key.clone()))
        })
        .collect()
}

/// Generator for sorted runs.
///
/// Accumulates rows in memory, sorts when a bound is hit, writes to spill.
pub(crate) struct RunGenerator {
    key: BoundKey,
    reverse: bool,
    max_rows: usize,
    budget: ByteBudget,
    reservation: Option<Reservation>,
    storage: Option<Arc<dyn Storage>>,
    temp_dir: Option<std::path::PathBuf>,
    codec: Codec,
    fan_in: usize,
    chunk: Vec<(Value, Row)>,
    spill: Option<SpillManager>,
    segments: Vec<SegmentMeta>,
}

impl RunGenerator {
    pub(crate) fn new(key: BoundKey, opts: &SortOptions, storage: Option<Arc<dyn Storage>>) -> Self {
        let budget = match opts.buffer_bytes {
            Some(bytes) => ByteBudget::new(bytes),
            None => ByteBudget::unbounded(),
        };
        let reservation = budget.try_acquire(0, "sort-chunk");
        Self {
            key,
            reverse: opts.reverse,
            max_rows: opts.buffer_rows.max(1),
            budget,
            reservation,
            storage,
            temp_dir: opts.temp_dir.clone(),
            codec: Codec::from(opts.codec),
            fan_in: opts.fan_in.max(2),
            chunk: Vec::new(),
            spill: None,
            segments: Vec::new(),
        }
    }

    /// Add one row. Flushes the current chunk first when the row would not
    /// fit in the byte budget, and after it when the row bound is reached.
    pub(crate) fn push(&mut self, row: Row) -> Result<()> {
        let size: usize = row.iter().map(Value::approx_size).sum();
        if !self.reserve(size) && !self.chunk.is_empty() {
            self.flush()?;
            // A single row larger than the budget still forms its own chunk.
            self.reserve(size);
        }
        let (key, row) = self.key.extract_owned(row);
        self.chunk.push((key, row));
        if self.chunk.len() >= self.max_rows {
            self.flush()?;
        }
        Ok(())
    }

    fn reserve(&mut self, size: usize) -> bool {
        match self.reservation.as_mut() {
            Some(guard) => {
                let want = guard.bytes().saturating_add(size);
                guard.try_resize(want)
            }
            None => {
                self.reservation = self.budget.try_acquire(size, "sort-chunk");
                self.reservation.is_some()
            }
        }
    }

    fn sort_chunk(&mut self) {
        let reverse = self.reverse;
        // `sort_by` is stable, so ties keep their input order in both directions.
        self.chunk.sort_by(|(a, _), (b, _)| {
            let ord = compare(a, b);
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    fn spill_manager(&mut self) -> Result<&mut SpillManager> {
        if self.spill.is_none() {
            let storage = match &self.storage {
                Some(storage) => Arc::clone(storage),
                None => reltab_io::scoped_storage(self.temp_dir.as_deref())?,
            };
            self.spill = Some(SpillManager::new(storage, self.codec));
        }
        match self.spill.as_mut() {
            Some(spill) => Ok(spill),
            None => Err(Error::Spill("spill manager unavailable".into())),
        }
    }

    /// Flush the current chunk to a sorted run on storage.
    fn flush(&mut self) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        self.sort_chunk();
        let chunk = std::mem::take(&mut self.chunk);
        let spill = self.spill_manager()?;
        let segment = spill.write_run(chunk.iter().map(|(_, row)| row))?;
        tracing::debug!(rows = segment.rows, run = self.segments.len(), "spilled sorted run");
        self.segments.push(segment);
        if let Some(guard) = self.reservation.as_mut() {
            guard.try_resize(0);
        }
        Ok(())
    }

    /// Finish run generation. Keeps a lone chunk in memory; otherwise spills
    /// the remainder and merges down to at most `fan_in` segments.
    pub(crate) fn finish(mut self, header: Header) -> Result<SortedRuns> {
        if self.segments.is_empty() {
            self.sort_chunk();
            let rows: Vec<Row> = std::mem::take(&mut self.chunk)
                .into_iter()
                .map(|(_, row)| row)
                .collect();
            tracing::debug!(rows = rows.len(), "sorted in memory");
            return Ok(SortedRuns {
                header,
                key: self.key,
                reverse: self.reverse,
                runs: Runs::Memory(Arc::new(rows)),
            });
        }
        self.flush()?;
        self.reduce()?;
        let spill = self
            .spill
            .take()
            .ok_or_else(|| Error::Spill("spilled runs without a spill manager".into()))?;
        tracing::debug!(segments = self.segments.len(), "sort runs ready for merge");
        Ok(SortedRuns {
            header,
            key: self.key,
            reverse: self.reverse,
            runs: Runs::Spilled {
                spill,
                segments: self.segments,
            },
        })
    }

    /// Merge consecutive groups of `fan_in` segments until one pass suffices.
    ///
    /// Groups are consecutive so earlier runs stay ahead of later ones and
    /// the merge remains stable.
    fn reduce(&mut self) -> Result<()> {
        let mut pass = 0;
        while self.segments.len() > self.fan_in {
            pass += 1;
            let inputs = std::mem::take(&mut self.segments);
            let key = self.key.clone();
            let reverse = self.reverse;
            let fan_in = self.fan_in;
            let spill = self.spill_manager()?;
            let mut outputs = Vec::with_capacity(inputs.len().div_ceil(fan_in));
            for group in inputs.chunks(fan_in) {
                let sources = open_segments(spill, group, &key)?;
                let mut run = spill.begin_run()?;
                for row in MergeIter::new(sources, reverse) {
                    run.push(&row?)?;
                }
                outputs.push(spill.seal(run)?);
                for meta in group {
                    spill.delete_segment(&meta.name)?;
                }
            }
            tracing::debug!(pass, from = inputs.len(), to = outputs.len(), "intermediate merge pass");
            self.segments = outputs;
        }
        Ok(())
    }
}
