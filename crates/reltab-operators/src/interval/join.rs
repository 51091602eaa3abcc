//! Interval joins and subtraction.
//!
//! The right table is indexed in full when iteration starts; the left table
//! is streamed, one lookup per row.

use std::sync::Arc;

use reltab_core::config::EngineConfig;
use reltab_core::error::{Error, Result};
use reltab_core::field::{resolve_one, FieldSpec};
use reltab_core::order::less_than;
use reltab_core::{Header, Row, RowStream, Table, TableRef, Value};

use super::collapse::collapse;
use super::lookup::{row_facets, row_index, BoundInterval, FacetIntervalIndex, IntervalIndex, IntervalSpec};
use super::tree::Query;
use crate::fields::{pad, FieldGetter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    /// Each left row joined with every overlapping right row.
    #[default]
    Inner,
    /// Like inner, plus left rows without a match padded with missing values.
    Left,
    /// Left rows that overlap nothing.
    Anti,
}

/// Right-hand rows indexed either as one tree or one tree per key.
enum RightIndex {
    Plain(IntervalIndex<Row>),
    Facets(FacetIntervalIndex<Row>, FieldGetter),
}

impl RightIndex {
    fn matches(&self, left: &[Value], query: &Query, missing: &Value) -> Vec<&Row> {
        match self {
            RightIndex::Plain(idx) => idx
                .tree()
                .query(query)
                .into_iter()
                .map(|i| &i.payload)
                .collect(),
            RightIndex::Facets(idx, key) => idx.query(&key.get(left, missing), query),
        }
    }
}

/// Everything both interval operators share: inputs, bounds and facet keys.
#[derive(Clone)]
struct Sides {
    left: TableRef,
    right: TableRef,
    left_spec: IntervalSpec,
    right_spec: IntervalSpec,
    left_key: Option<FieldSpec>,
    right_key: Option<FieldSpec>,
    missing: Value,
}

struct OpenSides {
    left: RowStream,
    left_bounds: BoundInterval,
    right_header: Header,
    right: RightIndex,
}

impl Sides {
    fn new(left: TableRef, right: TableRef) -> Self {
        Self {
            left,
            right,
            left_spec: IntervalSpec::default(),
            right_spec: IntervalSpec::default(),
            left_key: None,
            right_key: None,
            missing: EngineConfig::global().missing.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        match (&self.left_key, &self.right_key) {
            (Some(_), None) | (None, Some(_)) => Err(Error::Argument(
                "facet key must be given for both sides or neither".into(),
            )),
            _ => Ok(()),
        }
    }

    fn open(&self) -> Result<OpenSides> {
        let left = self.left.open()?;
        let left_bounds = BoundInterval::bind(left.header(), &self.left_spec, &self.missing)?;
        let (right_header, right) = match (&self.left_key, &self.right_key) {
            (Some(lk), Some(rk)) => {
                let key = FieldGetter::bind(left.header(), lk)?;
                let (header, idx) = row_facets(self.right.as_ref(), rk, &self.right_spec)?;
                (header, RightIndex::Facets(idx, key))
            }
            _ => {
                let (header, idx) = row_index(self.right.as_ref(), &self.right_spec)?;
                (header, RightIndex::Plain(idx))
            }
        };
        Ok(OpenSides {
            left,
            left_bounds,
            right_header,
            right,
        })
    }
}

macro_rules! sides_builder {
    ($builder:ty) => {
        impl $builder {
            /// Fields bounding the left intervals.
            pub fn left_interval(mut self, start: impl Into<FieldSpec>, stop: impl Into<FieldSpec>) -> Self {
                self.sides.left_spec = IntervalSpec::new(start, stop);
                self
            }

            /// Fields bounding the right intervals.
            pub fn right_interval(mut self, start: impl Into<FieldSpec>, stop: impl Into<FieldSpec>) -> Self {
                let include_stop = self.sides.right_spec.include_stop;
                self.sides.right_spec = IntervalSpec::new(start, stop).include_stop(include_stop);
                self
            }

            /// Treat right interval stops as inclusive when matching.
            pub fn include_stop(mut self, include_stop: bool) -> Self {
                self.sides.right_spec.include_stop = include_stop;
                self
            }

            /// Only match rows whose facet keys are equal.
            pub fn key(self, key: impl Into<FieldSpec>) -> Self {
                let key = key.into();
                self.left_key(key.clone()).right_key(key)
            }

            pub fn left_key(mut self, key: impl Into<FieldSpec>) -> Self {
                self.sides.left_key = Some(key.into());
                self
            }

            pub fn right_key(mut self, key: impl Into<FieldSpec>) -> Self {
                self.sides.right_key = Some(key.into());
                self
            }

            pub fn missing(mut self, missing: impl Into<Value>) -> Self {
                self.sides.missing = missing.into();
                self
            }
        }
    };
}

/// Builder for [`IntervalJoin`].
pub struct IntervalJoinBuilder {
    sides: Sides,
    kind: JoinKind,
}

sides_builder!(IntervalJoinBuilder);

impl IntervalJoinBuilder {
    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    /// Fails with [`Error::Argument`] when a facet key is given for one side only.
    pub fn build(self) -> Result<IntervalJoin> {
        self.sides.validate()?;
        Ok(IntervalJoin {
            sides: self.sides,
            kind: self.kind,
        })
    }
}

/// Join left rows with the right rows whose intervals overlap theirs.
#[derive(Clone)]
pub struct IntervalJoin {
    sides: Sides,
    kind: JoinKind,
}

impl IntervalJoin {
    pub fn builder(left: TableRef, right: TableRef) -> IntervalJoinBuilder {
        IntervalJoinBuilder {
            sides: Sides::new(left, right),
            kind: JoinKind::Inner,
        }
    }

    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }
}

impl Table for IntervalJoin {
    fn open(&self) -> Result<RowStream> {
        let OpenSides {
            left,
            left_bounds,
            right_header,
            right,
        } = self.sides.open()?;
        let left_header = left.header().clone();
        let header = match self.kind {
            JoinKind::Anti => left_header.clone(),
            _ => left_header.concat(&right_header),
        };
        let (lw, rw) = (left_header.len(), right_header.len());
        let kind = self.kind;
        let missing = self.sides.missing.clone();
        tracing::debug!(kind = ?kind, "interval join opened");
        let rows = left.flat_map(move |row| -> Vec<Result<Row>> {
            let row = match row {
                Ok(row) => row,
                Err(e) => return vec![Err(e)],
            };
            let (start, stop) = left_bounds.bounds(&row);
            let hits = right.matches(&row, &Query::Range(start, stop), &missing);
            match kind {
                JoinKind::Anti if hits.is_empty() => vec![Ok(row)],
                JoinKind::Anti => Vec::new(),
                JoinKind::Left if hits.is_empty() => {
                    let mut out = pad(row, lw, &missing);
                    out.extend(std::iter::repeat(missing.clone()).take(rw));
                    vec![Ok(out)]
                }
                _ => {
                    let base = pad(row, lw, &missing);
                    hits.into_iter()
                        .map(|r| {
                            let mut out = base.clone();
                            out.extend(pad(r.clone(), rw, &missing));
                            Ok(out)
                        })
                        .collect()
                }
            }
        });
        Ok(RowStream::new(header, rows))
    }

    fn name(&self) -> &'static str {
        "interval_join"
    }
}

/// Builder for [`IntervalSubtract`].
pub struct IntervalSubtractBuilder {
    sides: Sides,
}

sides_builder!(IntervalSubtractBuilder);

impl IntervalSubtractBuilder {
    pub fn build(self) -> Result<IntervalSubtract> {
        self.sides.validate()?;
        Ok(IntervalSubtract { sides: self.sides })
    }
}

/// Left intervals minus the union of the right intervals overlapping them.
///
/// Each left row is emitted once per remaining piece, with its start and stop
/// fields replaced by the piece's bounds. Coverage is half-open.
#[derive(Clone)]
pub struct IntervalSubtract {
    sides: Sides,
}

impl IntervalSubtract {
    pub fn builder(left: TableRef, right: TableRef) -> IntervalSubtractBuilder {
        IntervalSubtractBuilder {
            sides: Sides::new(left, right),
        }
    }

    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }
}

/// Pieces of `[start, stop)` not covered by `cover`, which must be sorted and
/// non-overlapping.
pub(crate) fn gaps(start: &Value, stop: &Value, cover: &[(Value, Value)]) -> Vec<(Value, Value)> {
    let mut out = Vec::new();
    let mut cursor = start.clone();
    for (s, e) in cover {
        if !less_than(&cursor, stop) {
            break;
        }
        if less_than(&cursor, s) {
            let end = if less_than(s, stop) { s.clone() } else { stop.clone() };
            out.push((cursor.clone(), end));
        }
        if less_than(&cursor, e) {
            cursor = e.clone();
        }
    }
    if less_than(&cursor, stop) {
        out.push((cursor, stop.clone()));
    }
    out
}

impl Table for IntervalSubtract {
    fn open(&self) -> Result<RowStream> {
        let OpenSides {
            left,
            left_bounds,
            right_header,
            right,
        } = self.sides.open()?;
        let header = left.header().clone();
        let start_at = resolve_one(&header, &self.sides.left_spec.start)?;
        let stop_at = resolve_one(&header, &self.sides.left_spec.stop)?;
        let right_bounds = BoundInterval::bind(&right_header, &self.sides.right_spec, &self.sides.missing)?;
        let missing = self.sides.missing.clone();
        let width = header.len();
        let rows = left.flat_map(move |row| -> Vec<Result<Row>> {
            let row = match row {
                Ok(row) => row,
                Err(e) => return vec![Err(e)],
            };
            let (start, stop) = left_bounds.bounds(&row);
            let hits = right.matches(&row, &Query::Range(start.clone(), stop.clone()), &missing);
            if hits.is_empty() {
                return vec![Ok(row)];
            }
            let cover = collapse(hits.into_iter().map(|r| right_bounds.bounds(r)));
            let base = pad(row, width, &missing);
            gaps(&start, &stop, &cover)
                .into_iter()
                .map(|(s, e)| {
                    let mut out = base.clone();
                    out[start_at] = s;
                    out[stop_at] = e;
                    Ok(out)
                })
                .collect()
        });
        Ok(RowStream::new(header, rows))
    }

    fn name(&self) -> &'static str {
        "interval_subtract"
    }
}

pub fn interval_join(left: TableRef, right: TableRef) -> IntervalJoinBuilder {
    IntervalJoin::builder(left, right)
}

pub fn interval_left_join(left: TableRef, right: TableRef) -> IntervalJoinBuilder {
    IntervalJoin::builder(left, right).kind(JoinKind::Left)
}

pub fn interval_anti_join(left: TableRef, right: TableRef) -> IntervalJoinBuilder {
    IntervalJoin::builder(left, right).kind(JoinKind::Anti)
}

pub fn interval_subtract(left: TableRef, right: TableRef) -> IntervalSubtractBuilder {
    IntervalSubtract::builder(left, right)
}

#[cfg(test)]
mod tests {
    use reltab_core::table::{data_rows, to_rows};
    use reltab_core::{row, MemTable};

    use super::*;

    fn left() -> TableRef {
        MemTable::from_rows(vec![
            row!["begin", "end", "quux"],
            row![1, 2, "a"],
            row![2, 4, "b"],
            row![2, 5, "c"],
            row![9, 14, "d"],
            row![1, 1, "e"],
            row![10, 10, "f"],
        ])
        .into_ref()
    }

    fn right() -> TableRef {
        MemTable::from_rows(vec![
            row!["start", "stop", "value"],
            row![1, 4, "foo"],
            row![3, 7, "bar"],
            row![4, 9, "baz"],
        ])
        .into_ref()
    }

    fn tags(rows: Vec<Row>) -> Vec<String> {
        rows.iter()
            .map(|r| format!("{}{}", r[2], r.get(5).map(|v| v.to_string()).unwrap_or_default()))
            .collect()
    }

    #[test]
    fn inner_join() {
        let joined = interval_join(left(), right()).left_interval("begin", "end").build().unwrap();
        let rows = to_rows(&joined).unwrap();
        assert_eq!(rows[0], row!["begin", "end", "quux", "start", "stop", "value"]);
        assert_eq!(
            tags(rows[1..].to_vec()),
            ["afoo", "bfoo", "bbar", "cfoo", "cbar", "cbaz"]
        );
    }

    #[test]
    fn inclusive_join_widens_matches() {
        let joined = interval_join(left(), right())
            .left_interval("begin", "end")
            .include_stop(true)
            .build()
            .unwrap();
        let rows = data_rows(&joined).unwrap();
        assert!(tags(rows).contains(&"dbaz".to_string()));
    }

    #[test]
    fn left_join_pads_unmatched_rows() {
        let joined = interval_left_join(left(), right()).left_interval("begin", "end").build().unwrap();
        let rows = data_rows(&joined).unwrap();
        let d = rows.iter().find(|r| r[2] == Value::from("d")).unwrap();
        assert_eq!(d, &row![9, 14, "d", Value::Missing, Value::Missing, Value::Missing]);
    }

    #[test]
    fn anti_join_keeps_unmatched_left_rows() {
        let joined = interval_anti_join(left(), right()).left_interval("begin", "end").build().unwrap();
        assert_eq!(
            to_rows(&joined).unwrap(),
            vec![
                row!["begin", "end", "quux"],
                row![9, 14, "d"],
                row![1, 1, "e"],
                row![10, 10, "f"],
            ]
        );
    }

    #[test]
    fn faceted_join_matches_only_same_key() {
        let l = MemTable::from_rows(vec![row!["chr", "start", "stop"], row!["a", 1, 3], row!["b", 1, 3]]).into_ref();
        let r = MemTable::from_rows(vec![row!["chrom", "start", "stop"], row!["a", 2, 5]]).into_ref();
        let joined = interval_join(l, r).left_key("chr").right_key("chrom").build().unwrap();
        assert_eq!(data_rows(&joined).unwrap(), vec![row!["a", 1, 3, "a", 2, 5]]);
    }

    #[test]
    fn one_sided_key_is_an_argument_error() {
        let err = interval_join(left(), right()).left_key("quux").build().err();
        assert!(matches!(err, Some(Error::Argument(_))));
        let err = interval_subtract(left(), right()).right_key("value").build().err();
        assert!(matches!(err, Some(Error::Argument(_))));
    }

    #[test]
    fn subtract_leaves_uncovered_pieces() {
        let l = MemTable::from_rows(vec![row!["start", "stop", "tag"], row![0, 20, "x"], row![30, 40, "y"]]).into_ref();
        let r = MemTable::from_rows(vec![
            row!["start", "stop"],
            row![2, 5],
            row![4, 8],
            row![12, 15],
            row![18, 25],
        ])
        .into_ref();
        let out = data_rows(&interval_subtract(l, r).build().unwrap()).unwrap();
        assert_eq!(
            out,
            vec![
                row![0, 2, "x"],
                row![8, 12, "x"],
                row![15, 18, "x"],
                row![30, 40, "y"],
            ]
        );
    }

    #[test]
    fn gaps_of_fully_covered_interval() {
        let cover = vec![(Value::Int(0), Value::Int(10))];
        assert!(gaps(&Value::Int(2), &Value::Int(5), &cover).is_empty());
    }
}
