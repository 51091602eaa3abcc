//! K-way merge of sorted row sources using a min-heap.
//!
//! Ties are broken by source index, so merging runs in the order they were
//! produced keeps the sort stable.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use reltab_core::error::Result;
use reltab_core::key::BoundKey;
use reltab_core::order::compare;
use reltab_core::{Row, Value};

pub(crate) type RowSource = Box<dyn Iterator<Item = Result<Row>>>;

/// Entry in the merge heap.
///
/// Ordered by key (reversed for min-heap behavior), then by source index.
struct MergeEntry {
    key: Value,
    row: Row,
    source: usize,
    reverse: bool,
}

impl MergeEntry {
    fn rank(&self, other: &Self) -> Ordering {
        let by_key = compare(&self.key, &other.key);
        let by_key = if self.reverse { by_key.reverse() } else { by_key };
        by_key.then(self.source.cmp(&other.source))
    }
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other.rank(self)
    }
}

/// Merges sources that are each sorted by their own key.
pub(crate) struct MergeIter {
    sources: Vec<(RowSource, BoundKey)>,
    heap: BinaryHeap<MergeEntry>,
    reverse: bool,
    primed: bool,
    failed: bool,
}

impl MergeIter {
    pub(crate) fn new(sources: Vec<(RowSource, BoundKey)>, reverse: bool) -> Self {
        let heap = BinaryHeap::with_capacity(sources.len());
        Self {
            sources,
            heap,
            reverse,
            primed: false,
            failed: false,
        }
    }

    /// Pull the next row of `source` into the heap.
    fn refill(&mut self, source: usize) -> Result<()> {
        let (iter, key) = &mut self.sources[source];
        if let Some(row) = iter.next() {
            let (k, row) = key.extract_owned(row?);
            self.heap.push(MergeEntry {
                key: k,
                row,
                source,
                reverse: self.reverse,
            });
        }
        Ok(())
    }
}

impl Iterator for MergeIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.primed {
            self.primed = true;
            for i in 0..self.sources.len() {
                if let Err(e) = self.refill(i) {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        let entry = self.heap.pop()?;
        if let Err(e) = self.refill(entry.source) {
            self.failed = true;
            return Some(Err(e));
        }
        Some(Ok(entry.row))
    }
}

#[cfg(test)]
mod tests {
    use reltab_core::{row, Header};

    use super::*;

    fn source(rows: Vec<Row>) -> RowSource {
        Box::new(rows.into_iter().map(Ok))
    }

    #[test]
    fn ties_come_out_in_source_order() {
        let header: Header = ["k", "tag"].into_iter().collect();
        let key = reltab_core::key::KeySpec::from("k").bind(&header).unwrap();
        let merged: Vec<Row> = MergeIter::new(
            vec![
                (source(vec![row![1, "a0"], row![2, "a1"]]), key.clone()),
                (source(vec![row![1, "b0"], row![3, "b1"]]), key.clone()),
                (source(vec![row![0, "c0"], row![2, "c1"]]), key),
            ],
            false,
        )
        .collect::<Result<_>>()
        .unwrap();
        let tags: Vec<String> = merged.iter().map(|r| r[1].to_string()).collect();
        assert_eq!(tags, ["c0", "a0", "b0", "a1", "c1", "b1"]);
    }

    #[test]
    fn reverse_merge() {
        let header: Header = ["k"].into_iter().collect();
        let key = BoundKey::whole_row(&header);
        let merged: Vec<Row> = MergeIter::new(
            vec![
                (source(vec![row![3], row![1]]), key.clone()),
                (source(vec![row![2], row![1]]), key),
            ],
            true,
        )
        .collect::<Result<_>>()
        .unwrap();
        assert_eq!(merged, vec![row![3], row![2], row![1], row![1]]);
    }
}
