//! Interval indexes built from tables, plain or faceted by a key field.

use std::collections::BTreeMap;

use reltab_core::config::EngineConfig;
use reltab_core::error::{Error, Result};
use reltab_core::field::FieldSpec;
use reltab_core::order::Comparable;
use reltab_core::{Header, Record, Row, Table, Value};

use super::tree::{Interval, IntervalTree, Query};
use crate::fields::FieldGetter;

/// Which fields bound an interval, and whether the stop is inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSpec {
    pub start: FieldSpec,
    pub stop: FieldSpec,
    pub include_stop: bool,
}

impl IntervalSpec {
    pub fn new(start: impl Into<FieldSpec>, stop: impl Into<FieldSpec>) -> Self {
        Self {
            start: start.into(),
            stop: stop.into(),
            include_stop: false,
        }
    }

    pub fn include_stop(mut self, include_stop: bool) -> Self {
        self.include_stop = include_stop;
        self
    }
}

impl Default for IntervalSpec {
    fn default() -> Self {
        Self::new("start", "stop")
    }
}

/// Start and stop getters resolved against one header.
pub(crate) struct BoundInterval {
    start: FieldGetter,
    stop: FieldGetter,
    missing: Value,
}

impl BoundInterval {
    pub(crate) fn bind(header: &Header, spec: &IntervalSpec, missing: &Value) -> Result<Self> {
        Ok(Self {
            start: FieldGetter::bind(header, &spec.start)?,
            stop: FieldGetter::bind(header, &spec.stop)?,
            missing: missing.clone(),
        })
    }

    pub(crate) fn bounds(&self, row: &[Value]) -> (Value, Value) {
        (self.start.get(row, &self.missing), self.stop.get(row, &self.missing))
    }
}

fn one<T>(hits: Vec<&Interval<T>>, strict: bool, what: impl FnOnce() -> String) -> Result<Option<&T>> {
    if strict && hits.len() > 1 {
        return Err(Error::DuplicateKey(what()));
    }
    Ok(hits.into_iter().next().map(|i| &i.payload))
}

/// An interval tree keyed by values read from a table.
#[derive(Debug, Clone)]
pub struct IntervalIndex<T> {
    tree: IntervalTree<T>,
}

impl<T> IntervalIndex<T> {
    pub fn from_tree(tree: IntervalTree<T>) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &IntervalTree<T> {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Payloads of intervals overlapping `[start, stop)`.
    pub fn search(&self, start: impl Into<Value>, stop: impl Into<Value>) -> Vec<&T> {
        payloads(self.tree.search(&start.into(), &stop.into()))
    }

    pub fn search_point(&self, point: impl Into<Value>) -> Vec<&T> {
        payloads(self.tree.search_point(&point.into()))
    }

    /// At most one hit: `None` on zero, the first on several unless `strict`,
    /// which turns several into [`Error::DuplicateKey`].
    pub fn search_one(&self, start: impl Into<Value>, stop: impl Into<Value>, strict: bool) -> Result<Option<&T>> {
        let (start, stop) = (start.into(), stop.into());
        one(self.tree.search(&start, &stop), strict, || {
            format!("more than one interval overlaps ({start}, {stop})")
        })
    }

    pub fn search_point_one(&self, point: impl Into<Value>, strict: bool) -> Result<Option<&T>> {
        let point = point.into();
        one(self.tree.search_point(&point), strict, || {
            format!("more than one interval contains {point}")
        })
    }
}

fn payloads<T>(hits: Vec<&Interval<T>>) -> Vec<&T> {
    hits.into_iter().map(|i| &i.payload).collect()
}

/// One interval tree per distinct key value.
#[derive(Debug, Clone)]
pub struct FacetIntervalIndex<T> {
    trees: BTreeMap<Comparable, IntervalTree<T>>,
}

impl<T> FacetIntervalIndex<T> {
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.trees.keys().map(|k| &k.0)
    }

    pub fn get(&self, key: &Value) -> Option<&IntervalTree<T>> {
        self.trees.get(&Comparable(key.clone()))
    }

    pub fn query(&self, key: &Value, query: &Query) -> Vec<&T> {
        self.get(key).map(|t| payloads(t.query(query))).unwrap_or_default()
    }

    pub fn search(&self, key: impl Into<Value>, start: impl Into<Value>, stop: impl Into<Value>) -> Vec<&T> {
        self.query(&key.into(), &Query::Range(start.into(), stop.into()))
    }

    pub fn search_point(&self, key: impl Into<Value>, point: impl Into<Value>) -> Vec<&T> {
        self.query(&key.into(), &Query::Point(point.into()))
    }

    pub fn search_one(
        &self,
        key: impl Into<Value>,
        start: impl Into<Value>,
        stop: impl Into<Value>,
        strict: bool,
    ) -> Result<Option<&T>> {
        let key = key.into();
        let (start, stop) = (start.into(), stop.into());
        let hits = match self.get(&key) {
            Some(tree) => tree.search(&start, &stop),
            None => return Ok(None),
        };
        one(hits, strict, || {
            format!("more than one interval for key {key} overlaps ({start}, {stop})")
        })
    }
}

/// Scan one iteration of `table`, turning each row into an interval.
fn scan<T, F>(table: &dyn Table, spec: &IntervalSpec, key: Option<&FieldSpec>, payload: F) -> Result<Vec<(Value, Interval<T>)>>
where
    F: Fn(&Header, Row) -> Result<T>,
{
    let stream = table.open()?;
    let header = stream.header().clone();
    let missing = EngineConfig::global().missing.clone();
    let bounds = BoundInterval::bind(&header, spec, &missing)?;
    let key = key.map(|k| FieldGetter::bind(&header, k)).transpose()?;
    let mut out = Vec::new();
    for row in stream {
        let row = row?;
        let (start, stop) = bounds.bounds(&row);
        let k = key.as_ref().map_or(Value::Missing, |k| k.get(&row, &missing));
        let payload = payload(&header, row)?;
        out.push((
            k,
            Interval {
                start,
                stop,
                payload,
            },
        ));
    }
    Ok(out)
}

fn build<T, F>(table: &dyn Table, spec: &IntervalSpec, payload: F) -> Result<IntervalIndex<T>>
where
    F: Fn(&Header, Row) -> Result<T>,
{
    let items = scan(table, spec, None, payload)?
        .into_iter()
        .map(|(_, i)| i)
        .collect();
    Ok(IntervalIndex::from_tree(IntervalTree::new(items, spec.include_stop)))
}

fn build_facets<T, F>(table: &dyn Table, key: &FieldSpec, spec: &IntervalSpec, payload: F) -> Result<FacetIntervalIndex<T>>
where
    F: Fn(&Header, Row) -> Result<T>,
{
    let mut groups: BTreeMap<Comparable, Vec<Interval<T>>> = BTreeMap::new();
    for (k, interval) in scan(table, spec, Some(key), payload)? {
        groups.entry(Comparable(k)).or_default().push(interval);
    }
    let trees = groups
        .into_iter()
        .map(|(k, items)| (k, IntervalTree::new(items, spec.include_stop)))
        .collect();
    Ok(FacetIntervalIndex { trees })
}

fn value_payload(header: &Header, value: Option<&FieldSpec>) -> Result<impl Fn(&Header, Row) -> Result<Value>> {
    let getter = value.map(|v| FieldGetter::bind(header, v)).transpose()?;
    let missing = EngineConfig::global().missing.clone();
    Ok(move |_: &Header, row: Row| -> Result<Value> {
        Ok(match &getter {
            Some(g) => g.get(&row, &missing),
            None => Value::List(row),
        })
    })
}

fn record_payload(header: &Header, row: Row) -> Result<Record> {
    Ok(Record::with_missing(
        header.clone(),
        row,
        EngineConfig::global().missing.clone(),
    ))
}

fn table_header(table: &dyn Table) -> Result<Header> {
    Ok(table.open()?.header().clone())
}

/// Index whole rows (as lists), or the `value` field when given.
pub fn interval_lookup(table: &dyn Table, spec: &IntervalSpec, value: Option<FieldSpec>) -> Result<IntervalIndex<Value>> {
    let payload = value_payload(&table_header(table)?, value.as_ref())?;
    build(table, spec, payload)
}

/// Index rows as records.
pub fn interval_record_lookup(table: &dyn Table, spec: &IntervalSpec) -> Result<IntervalIndex<Record>> {
    build(table, spec, record_payload)
}

/// One index per distinct `key` value.
pub fn facet_interval_lookup(
    table: &dyn Table,
    key: impl Into<FieldSpec>,
    spec: &IntervalSpec,
    value: Option<FieldSpec>,
) -> Result<FacetIntervalIndex<Value>> {
    let payload = value_payload(&table_header(table)?, value.as_ref())?;
    build_facets(table, &key.into(), spec, payload)
}

pub fn facet_interval_record_lookup(
    table: &dyn Table,
    key: impl Into<FieldSpec>,
    spec: &IntervalSpec,
) -> Result<FacetIntervalIndex<Record>> {
    build_facets(table, &key.into(), spec, record_payload)
}

/// Plain rows per interval, for the join operators.
pub(crate) fn row_index(table: &dyn Table, spec: &IntervalSpec) -> Result<(Header, IntervalIndex<Row>)> {
    let header = table_header(table)?;
    Ok((header, build(table, spec, |_, row| Ok(row))?))
}

pub(crate) fn row_facets(
    table: &dyn Table,
    key: &FieldSpec,
    spec: &IntervalSpec,
) -> Result<(Header, FacetIntervalIndex<Row>)> {
    let header = table_header(table)?;
    Ok((header, build_facets(table, key, spec, |_, row| Ok(row))?))
}

#[cfg(test)]
mod tests {
    use reltab_core::{row, MemTable};

    use super::*;

    fn table() -> MemTable {
        MemTable::from_rows(vec![
            row!["start", "stop", "value"],
            row![1, 4, "foo"],
            row![3, 7, "bar"],
            row![4, 9, "baz"],
        ])
    }

    #[test]
    fn lookup_whole_rows_and_values() {
        let spec = IntervalSpec::default();
        let rows = interval_lookup(&table(), &spec, None).unwrap();
        assert_eq!(rows.search(2, 4), vec![&Value::List(row![1, 4, "foo"]), &Value::List(row![3, 7, "bar"])]);
        let values = interval_lookup(&table(), &spec.clone().include_stop(true), Some("value".into())).unwrap();
        assert_eq!(values.search(2, 4), vec![&Value::from("foo"), &Value::from("bar"), &Value::from("baz")]);
        assert!(values.search_point(10).is_empty());
    }

    #[test]
    fn lookup_one_strict_and_lenient() {
        let idx = interval_lookup(&table(), &IntervalSpec::default(), Some("value".into())).unwrap();
        assert_eq!(idx.search_one(0, 2, true).unwrap(), Some(&Value::from("foo")));
        assert_eq!(idx.search_one(10, 12, true).unwrap(), None);
        assert_eq!(idx.search_one(2, 4, false).unwrap(), Some(&Value::from("foo")));
        assert!(matches!(idx.search_one(2, 4, true), Err(Error::DuplicateKey(_))));
        assert!(matches!(idx.search_point_one(5, true), Err(Error::DuplicateKey(_))));
    }

    #[test]
    fn record_lookup_reads_fields_by_name() {
        let idx = interval_record_lookup(&table(), &IntervalSpec::default()).unwrap();
        let hits = idx.search_point(8);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["value"], Value::from("baz"));
    }

    #[test]
    fn faceted_lookup() {
        let t = MemTable::from_rows(vec![
            row!["chr", "start", "stop"],
            row!["a", 1, 5],
            row!["b", 1, 5],
            row!["a", 4, 8],
        ]);
        let idx = facet_interval_lookup(&t, "chr", &IntervalSpec::default(), None).unwrap();
        assert_eq!(idx.search("a", 4, 5).len(), 2);
        assert_eq!(idx.search("b", 4, 5), vec![&Value::List(row!["b", 1, 5])]);
        assert!(idx.search("c", 0, 100).is_empty());
        assert!(matches!(idx.search_one("a", 4, 5, true), Err(Error::DuplicateKey(_))));
        let recs = facet_interval_record_lookup(&t, "chr", &IntervalSpec::default()).unwrap();
        assert_eq!(recs.keys().count(), 2);
    }

    #[test]
    fn unknown_bound_field_is_a_selection_error() {
        let spec = IntervalSpec::new("begin", "end");
        assert!(matches!(interval_lookup(&table(), &spec, None), Err(Error::FieldSelection(_))));
    }
}
