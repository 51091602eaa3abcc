//! Merge overlapping or touching intervals into maximal spans.

use std::sync::Arc;

use reltab_core::config::EngineConfig;
use reltab_core::error::Result;
use reltab_core::field::FieldSpec;
use reltab_core::key::KeySpec;
use reltab_core::order::{compare, equal, less_than};
use reltab_core::{Header, Row, RowStream, Table, TableRef, Value};

use super::lookup::{BoundInterval, IntervalSpec};
use crate::fields::FieldGetter;
use crate::sort::{sorted_input, SortOptions};

/// Merge `intervals` into sorted, non-overlapping spans. An interval that
/// starts at or before the current span's stop extends it. Reversed
/// intervals are dropped.
pub fn collapse(intervals: impl IntoIterator<Item = (Value, Value)>) -> Vec<(Value, Value)> {
    let mut items: Vec<(Value, Value)> = intervals
        .into_iter()
        .filter(|(s, e)| !less_than(e, s))
        .collect();
    items.sort_by(|a, b| compare(&a.0, &b.0));
    let mut out: Vec<(Value, Value)> = Vec::with_capacity(items.len());
    for (s, e) in items {
        match out.last_mut() {
            Some(cur) if !less_than(&cur.1, &s) => {
                if less_than(&cur.1, &e) {
                    cur.1 = e;
                }
            }
            _ => out.push((s, e)),
        }
    }
    out
}

/// Streamed collapse of a table's intervals, optionally per facet key.
#[derive(Clone)]
pub struct IntervalCollapse {
    source: TableRef,
    spec: IntervalSpec,
    key: Option<FieldSpec>,
    presorted: bool,
    sort: SortOptions,
}

impl IntervalCollapse {
    pub fn new(source: TableRef) -> Self {
        Self {
            source,
            spec: IntervalSpec::default(),
            key: None,
            presorted: false,
            sort: SortOptions::default(),
        }
    }

    pub fn interval(mut self, start: impl Into<FieldSpec>, stop: impl Into<FieldSpec>) -> Self {
        self.spec = IntervalSpec::new(start, stop);
        self
    }

    /// Collapse separately per value of `key`.
    pub fn key(mut self, key: impl Into<FieldSpec>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The input is already ordered by key then start.
    pub fn presorted(mut self, presorted: bool) -> Self {
        self.presorted = presorted;
        self
    }

    pub fn sort_options(mut self, opts: SortOptions) -> Self {
        self.sort = opts;
        self
    }

    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }

    fn sort_key(&self) -> KeySpec {
        match &self.key {
            Some(key) => FieldSpec::Sequence(vec![key.clone(), self.spec.start.clone()]).into(),
            None => self.spec.start.clone().into(),
        }
    }
}

impl Table for IntervalCollapse {
    fn open(&self) -> Result<RowStream> {
        let key = self.sort_key();
        let input = sorted_input(&self.source, Some(&key), self.presorted, &self.sort);
        let stream = input.open()?;
        let missing = EngineConfig::global().missing.clone();
        let bounds = BoundInterval::bind(stream.header(), &self.spec, &missing)?;
        let facet = self
            .key
            .as_ref()
            .map(|k| FieldGetter::bind(stream.header(), k))
            .transpose()?;
        let header = match facet {
            Some(_) => Header::from_iter(["key", "start", "stop"]),
            None => Header::from_iter(["start", "stop"]),
        };
        let spans = Spans {
            rows: stream,
            bounds,
            facet,
            missing,
            current: None,
            done: false,
        };
        Ok(RowStream::new(header, spans))
    }

    fn name(&self) -> &'static str {
        "interval_collapse"
    }
}

struct Spans {
    rows: RowStream,
    bounds: BoundInterval,
    facet: Option<FieldGetter>,
    missing: Value,
    current: Option<(Value, Value, Value)>,
    done: bool,
}

impl Spans {
    fn emit(&self, (k, s, e): (Value, Value, Value)) -> Row {
        match self.facet {
            Some(_) => vec![k, s, e],
            None => vec![s, e],
        }
    }
}

impl Iterator for Spans {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let row = match self.rows.next() {
                Some(Ok(row)) => row,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    let last = self.current.take()?;
                    return Some(Ok(self.emit(last)));
                }
            };
            let (s, e) = self.bounds.bounds(&row);
            if less_than(&e, &s) {
                continue;
            }
            let k = match &self.facet {
                Some(f) => f.get(&row, &self.missing),
                None => Value::Missing,
            };
            match self.current.as_mut() {
                Some((ck, _, ce)) if equal(ck, &k) && !less_than(ce, &s) => {
                    if less_than(ce, &e) {
                        *ce = e;
                    }
                }
                _ => {
                    if let Some(done) = self.current.replace((k, s, e)) {
                        return Some(Ok(self.emit(done)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use reltab_core::table::to_rows;
    use reltab_core::{row, MemTable};

    use super::*;

    fn pairs(v: &[(i64, i64)]) -> Vec<(Value, Value)> {
        v.iter().map(|&(s, e)| (Value::Int(s), Value::Int(e))).collect()
    }

    #[test]
    fn collapses_overlapping_and_touching() {
        assert_eq!(
            collapse(pairs(&[(5, 8), (1, 3), (3, 4), (9, 10), (6, 7)])),
            pairs(&[(1, 4), (5, 8), (9, 10)])
        );
    }

    #[test]
    fn reversed_intervals_are_dropped() {
        assert_eq!(collapse(pairs(&[(4, 1), (2, 3)])), pairs(&[(2, 3)]));
    }

    #[test]
    fn table_collapse() {
        let t = MemTable::from_rows(vec![
            row!["start", "stop"],
            row![8, 9],
            row![1, 4],
            row![2, 6],
            row![7, 8],
        ])
        .into_ref();
        assert_eq!(
            to_rows(&IntervalCollapse::new(t)).unwrap(),
            vec![row!["start", "stop"], row![1, 6], row![7, 9]]
        );
    }

    #[test]
    fn faceted_table_collapse() {
        let t = MemTable::from_rows(vec![
            row!["chr", "from", "to"],
            row!["b", 1, 3],
            row!["a", 2, 5],
            row!["a", 1, 3],
            row!["b", 5, 6],
        ])
        .into_ref();
        let c = IntervalCollapse::new(t).interval("from", "to").key("chr");
        assert_eq!(
            to_rows(&c).unwrap(),
            vec![
                row!["key", "start", "stop"],
                row!["a", 1, 5],
                row!["b", 1, 3],
                row!["b", 5, 6],
            ]
        );
    }
}
