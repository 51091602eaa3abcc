//! Grouping of consecutive equal keys and the dedup operators built on it.
//!
//! Keys are compared with the ordering engine's equality, so `1`, `1.0` and
//! `true` land in the same group.

use std::sync::Arc;

use reltab_core::config::EngineConfig;
use reltab_core::error::{Error, Result};
use reltab_core::field::{resolve, FieldSpec};
use reltab_core::key::{BoundKey, KeySpec};
use reltab_core::order::equal;
use reltab_core::{Header, Row, RowStream, Table, TableRef, Value};

use crate::fields::{pad, FieldGetter};
use crate::sort::{sorted_input, SortOptions};

/// Groups of consecutive rows sharing a key, from an already ordered input.
///
/// Each group is a [`Group`] that borrows the grouper mutably, so it cannot be
/// held across a call to [`RowGroupBy::next_group`]. Rows of a group left
/// unread are skipped when the next group is requested.
pub struct RowGroupBy {
    stream: RowStream,
    key: BoundKey,
    value: Option<FieldGetter>,
    missing: Value,
    pending: Option<(Value, Row)>,
    current: Option<Value>,
    failed: bool,
}

impl RowGroupBy {
    pub fn new(table: &dyn Table, key: impl Into<KeySpec>) -> Result<Self> {
        let stream = table.open()?;
        let key = key.into().bind(stream.header())?;
        Ok(Self {
            stream,
            key,
            value: None,
            missing: EngineConfig::global().missing.clone(),
            pending: None,
            current: None,
            failed: false,
        })
    }

    /// Group `table` and report `value` for each row instead of the whole row.
    pub fn with_value(table: &dyn Table, key: impl Into<KeySpec>, value: impl Into<FieldSpec>) -> Result<Self> {
        let mut grouped = Self::new(table, key)?;
        grouped.value = Some(FieldGetter::bind(grouped.stream.header(), &value.into())?);
        Ok(grouped)
    }

    pub fn header(&self) -> &Header {
        self.stream.header()
    }

    fn advance(&mut self) -> Option<Result<(Value, Row)>> {
        if let Some(entry) = self.pending.take() {
            return Some(Ok(entry));
        }
        if self.failed {
            return None;
        }
        match self.stream.next()? {
            Ok(row) => Some(Ok(self.key.extract_owned(row))),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    /// Move to the next group, skipping whatever is left of the current one.
    pub fn next_group(&mut self) -> Option<Result<Group<'_>>> {
        if let Some(current) = self.current.take() {
            while let Some(item) = self.advance() {
                match item {
                    Ok((k, _)) if equal(&k, &current) => continue,
                    Ok(next) => {
                        self.pending = Some(next);
                        break;
                    }
                    Err(e) => return Some(Err(e)),
                }
            }
        }
        match self.advance()? {
            Ok((key, row)) => {
                self.current = Some(key.clone());
                self.pending = Some((key.clone(), row));
                Some(Ok(Group { parent: self, key }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// The rows of one group. Single pass.
pub struct Group<'a> {
    parent: &'a mut RowGroupBy,
    key: Value,
}

impl Group<'_> {
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// Next row's value field, or the whole row as a list when the grouper
    /// has no value field.
    pub fn next_value(&mut self) -> Option<Result<Value>> {
        let row = self.next()?;
        Some(row.map(|row| match &self.parent.value {
            Some(getter) => getter.get(&row, &self.parent.missing),
            None => Value::List(row),
        }))
    }
}

impl Iterator for Group<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.parent.advance()? {
            Ok((k, row)) if equal(&k, &self.key) => Some(Ok(row)),
            Ok(other) => {
                self.parent.pending = Some(other);
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Owned runs of equal keys, for operators that look at whole groups.
pub(crate) struct GroupRuns {
    stream: RowStream,
    key: BoundKey,
    pending: Option<(Value, Row)>,
}

impl GroupRuns {
    pub(crate) fn new(stream: RowStream, key: BoundKey) -> Self {
        Self {
            stream,
            key,
            pending: None,
        }
    }
}

impl Iterator for GroupRuns {
    type Item = Result<(Value, Vec<Row>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, first) = match self.pending.take() {
            Some(entry) => entry,
            None => match self.stream.next()? {
                Ok(row) => self.key.extract_owned(row),
                Err(e) => return Some(Err(e)),
            },
        };
        let mut rows = vec![first];
        for row in self.stream.by_ref() {
            let (k, row) = match row {
                Ok(row) => self.key.extract_owned(row),
                Err(e) => return Some(Err(e)),
            };
            if equal(&k, &key) {
                rows.push(row);
            } else {
                self.pending = Some((k, row));
                break;
            }
        }
        Some(Ok((key, rows)))
    }
}

/// What every grouped operator holds: its input, a key and how to order it.
#[derive(Clone)]
struct GroupInput {
    source: TableRef,
    key: Option<KeySpec>,
    presorted: bool,
    sort: SortOptions,
}

impl GroupInput {
    fn new(source: TableRef, key: Option<KeySpec>) -> Self {
        Self {
            source,
            key,
            presorted: false,
            sort: SortOptions::default(),
        }
    }

    fn open(&self) -> Result<(Header, GroupRuns)> {
        let input = sorted_input(&self.source, self.key.as_ref(), self.presorted, &self.sort);
        let stream = input.open()?;
        let header = stream.header().clone();
        let key = BoundKey::bind_opt(self.key.as_ref(), &header)?;
        Ok((header, GroupRuns::new(stream, key)))
    }
}

macro_rules! grouped_builder {
    ($t:ty) => {
        impl $t {
            /// Skip sorting; the input is already ordered by the key.
            pub fn presorted(mut self, presorted: bool) -> Self {
                self.input.presorted = presorted;
                self
            }

            pub fn sort_options(mut self, opts: SortOptions) -> Self {
                self.input.sort = opts;
                self
            }

            pub fn into_ref(self) -> TableRef {
                Arc::new(self)
            }
        }
    };
}

/// Flatten runs into rows, keeping runs for which `keep` holds.
fn filter_runs<F>(runs: GroupRuns, keep: F) -> impl Iterator<Item = Result<Row>>
where
    F: Fn(&[Row]) -> bool + 'static,
{
    runs.flat_map(move |run| -> Vec<Result<Row>> {
        match run {
            Ok((_, rows)) if keep(&rows) => rows.into_iter().map(Ok).collect(),
            Ok(_) => Vec::new(),
            Err(e) => vec![Err(e)],
        }
    })
}

/// Every row whose key occurs more than once.
#[derive(Clone)]
pub struct Duplicates {
    input: GroupInput,
}

impl Duplicates {
    pub fn new(source: TableRef, key: Option<KeySpec>) -> Self {
        Self {
            input: GroupInput::new(source, key),
        }
    }
}

grouped_builder!(Duplicates);

impl Table for Duplicates {
    fn open(&self) -> Result<RowStream> {
        let (header, runs) = self.input.open()?;
        Ok(RowStream::new(header, filter_runs(runs, |rows| rows.len() > 1)))
    }

    fn name(&self) -> &'static str {
        "duplicates"
    }
}

/// Rows whose key occurs exactly once.
#[derive(Clone)]
pub struct Unique {
    input: GroupInput,
}

impl Unique {
    pub fn new(source: TableRef, key: Option<KeySpec>) -> Self {
        Self {
            input: GroupInput::new(source, key),
        }
    }
}

grouped_builder!(Unique);

impl Table for Unique {
    fn open(&self) -> Result<RowStream> {
        let (header, runs) = self.input.open()?;
        Ok(RowStream::new(header, filter_runs(runs, |rows| rows.len() == 1)))
    }

    fn name(&self) -> &'static str {
        "unique"
    }
}

/// The first row of each run of equal keys (whole rows by default).
#[derive(Clone)]
pub struct Distinct {
    input: GroupInput,
    count: Option<String>,
}

impl Distinct {
    pub fn new(source: TableRef, key: Option<KeySpec>) -> Self {
        Self {
            input: GroupInput::new(source, key),
            count: None,
        }
    }

    /// Append a field holding the size of each run.
    pub fn count(mut self, field: impl Into<String>) -> Self {
        self.count = Some(field.into());
        self
    }
}

grouped_builder!(Distinct);

impl Table for Distinct {
    fn open(&self) -> Result<RowStream> {
        let (header, runs) = self.input.open()?;
        let header = match &self.count {
            Some(name) => header.concat(&Header::from_iter([name.as_str()])),
            None => header,
        };
        let width = header.len();
        let counted = self.count.is_some();
        let missing = EngineConfig::global().missing.clone();
        let rows = runs.map(move |run| -> Result<Row> {
            let (_, rows) = run?;
            let n = rows.len();
            let mut first = rows.into_iter().next().unwrap_or_default();
            if counted {
                // Pad short rows so the count lands under its own field.
                first = pad(first, width - 1, &missing);
                first.push(Value::from(n));
            }
            Ok(first)
        });
        Ok(RowStream::new(header, rows))
    }

    fn name(&self) -> &'static str {
        "distinct"
    }
}

/// Rows of groups whose members disagree on some non-missing value.
#[derive(Clone)]
pub struct Conflicts {
    input: GroupInput,
    include: Option<FieldSpec>,
    exclude: Option<FieldSpec>,
    missing: Value,
}

impl Conflicts {
    pub fn new(source: TableRef, key: impl Into<KeySpec>) -> Self {
        Self {
            input: GroupInput::new(source, Some(key.into())),
            include: None,
            exclude: None,
            missing: EngineConfig::global().missing.clone(),
        }
    }

    /// Only compare these fields.
    pub fn include(mut self, fields: impl Into<FieldSpec>) -> Self {
        self.include = Some(fields.into());
        self
    }

    /// Never compare these fields.
    pub fn exclude(mut self, fields: impl Into<FieldSpec>) -> Self {
        self.exclude = Some(fields.into());
        self
    }

    /// Value treated as "no information" and ignored.
    pub fn missing(mut self, missing: impl Into<Value>) -> Self {
        self.missing = missing.into();
        self
    }

    fn compared(&self, header: &Header) -> Result<Vec<usize>> {
        let mut skip = Vec::new();
        if let Some(KeySpec::Fields(spec)) = &self.input.key {
            skip.extend(resolve(header, spec)?);
        }
        if let Some(spec) = &self.exclude {
            skip.extend(resolve(header, spec)?);
        }
        let candidates = match &self.include {
            Some(spec) => resolve(header, spec)?,
            None => (0..header.len()).collect(),
        };
        Ok(candidates.into_iter().filter(|i| !skip.contains(i)).collect())
    }
}

grouped_builder!(Conflicts);

fn in_conflict(rows: &[Row], columns: &[usize], missing: &Value) -> bool {
    columns.iter().any(|&c| {
        let mut seen: Option<&Value> = None;
        for v in rows.iter().filter_map(|r| r.get(c)) {
            if v.is_same(missing) || v.is_missing() {
                continue;
            }
            match seen {
                Some(s) if !equal(s, v) => return true,
                Some(_) => {}
                None => seen = Some(v),
            }
        }
        false
    })
}

impl Table for Conflicts {
    fn open(&self) -> Result<RowStream> {
        let (header, runs) = self.input.open()?;
        let columns = self.compared(&header)?;
        let missing = self.missing.clone();
        let rows = filter_runs(runs, move |rows| rows.len() > 1 && in_conflict(rows, &columns, &missing));
        Ok(RowStream::new(header, rows))
    }

    fn name(&self) -> &'static str {
        "conflicts"
    }
}

pub type FoldFn = Arc<dyn Fn(Value, Value) -> Result<Value> + Send + Sync>;

/// Left-reduce the `value` field of each key group, yielding `(key, value)`.
#[derive(Clone)]
pub struct Fold {
    input: GroupInput,
    value: FieldSpec,
    f: FoldFn,
    missing: Value,
}

impl Fold {
    pub fn new<F>(source: TableRef, key: impl Into<KeySpec>, value: impl Into<FieldSpec>, f: F) -> Self
    where
        F: Fn(Value, Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            input: GroupInput::new(source, Some(key.into())),
            value: value.into(),
            f: Arc::new(f),
            missing: EngineConfig::global().missing.clone(),
        }
    }
}

grouped_builder!(Fold);

impl Table for Fold {
    fn open(&self) -> Result<RowStream> {
        let (header, runs) = self.input.open()?;
        let value = FieldGetter::bind(&header, &self.value)?;
        let f = Arc::clone(&self.f);
        let missing = self.missing.clone();
        let rows = runs.map(move |run| -> Result<Row> {
            let (key, rows) = run?;
            let mut values = rows.iter().map(|r| value.get(r, &missing));
            let first = values
                .next()
                .ok_or_else(|| Error::Value("empty group".into()))?;
            let reduced = values.try_fold(first, |acc, v| f(acc, v))?;
            Ok(vec![key, reduced])
        });
        Ok(RowStream::new(Header::from_iter(["key", "value"]), rows))
    }

    fn name(&self) -> &'static str {
        "fold"
    }
}

pub fn duplicates(table: TableRef, key: impl Into<KeySpec>) -> Duplicates {
    Duplicates::new(table, Some(key.into()))
}

pub fn unique(table: TableRef, key: impl Into<KeySpec>) -> Unique {
    Unique::new(table, Some(key.into()))
}

/// Distinct whole rows.
pub fn distinct(table: TableRef) -> Distinct {
    Distinct::new(table, None)
}

pub fn conflicts(table: TableRef, key: impl Into<KeySpec>) -> Conflicts {
    Conflicts::new(table, key)
}

pub fn fold<F>(table: TableRef, key: impl Into<KeySpec>, value: impl Into<FieldSpec>, f: F) -> Fold
where
    F: Fn(Value, Value) -> Result<Value> + Send + Sync + 'static,
{
    Fold::new(table, key, value, f)
}

/// Whether no key occurs twice in `table`.
pub fn is_unique(table: TableRef, key: Option<KeySpec>) -> Result<bool> {
    let (_, runs) = GroupInput::new(table, key).open()?;
    for run in runs {
        let (_, rows) = run?;
        if rows.len() > 1 {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use reltab_core::table::{data_rows, to_rows};
    use reltab_core::{row, MemTable};

    use super::*;

    fn table() -> TableRef {
        MemTable::from_rows(vec![
            row!["foo", "bar", "baz"],
            row!["A", 1, 2],
            row!["B", "2", "3.4"],
            row!["D", "xyz", 9.0],
            row!["B", 3, 7.8],
            row!["B", "2", 42],
            row!["E", Value::Missing, Value::Missing],
            row!["D", 4, 12.3],
        ])
        .into_ref()
    }

    #[test]
    fn groups_share_keys_and_skip_unread_rows() {
        let t = MemTable::from_rows(vec![row!["k", "v"], row![1, "a"], row![1.0, "b"], row![2, "c"], row![3, "d"]]);
        let mut grouped = RowGroupBy::with_value(&t, "k", "v").unwrap();
        let mut seen = Vec::new();
        while let Some(group) = grouped.next_group() {
            let mut group = group.unwrap();
            let key = group.key().clone();
            // Read only the first value of every group.
            let first = group.next_value().unwrap().unwrap();
            seen.push((key, first));
        }
        assert_eq!(
            seen,
            vec![
                (Value::Int(1), Value::from("a")),
                (Value::Int(2), Value::from("c")),
                (Value::Int(3), Value::from("d")),
            ]
        );
    }

    #[test]
    fn group_rows_are_whole_rows_by_default() {
        let t = MemTable::from_rows(vec![row!["k", "v"], row![1, "a"], row![1, "b"]]);
        let mut grouped = RowGroupBy::new(&t, "k").unwrap();
        let group = grouped.next_group().unwrap().unwrap();
        let rows: Vec<Row> = group.collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![row![1, "a"], row![1, "b"]]);
        assert!(grouped.next_group().is_none());
    }

    #[test]
    fn groupby_unknown_key_fails() {
        let t = MemTable::from_rows(vec![row!["k"], row![1]]);
        assert!(matches!(RowGroupBy::new(&t, "nope"), Err(Error::FieldSelection(_))));
    }

    #[test]
    fn duplicates_and_unique_partition_by_key() {
        let dups = data_rows(&duplicates(table(), "foo")).unwrap();
        assert_eq!(
            dups,
            vec![
                row!["B", "2", "3.4"],
                row!["B", 3, 7.8],
                row!["B", "2", 42],
                row!["D", "xyz", 9.0],
                row!["D", 4, 12.3],
            ]
        );
        let uniq = data_rows(&unique(table(), "foo")).unwrap();
        assert_eq!(uniq, vec![row!["A", 1, 2], row!["E", Value::Missing, Value::Missing]]);
    }

    #[test]
    fn distinct_rows_with_count() {
        let t = MemTable::from_rows(vec![row!["a", "b"], row![2, "x"], row![1, "y"], row![2, "x"]]).into_ref();
        assert_eq!(
            to_rows(&distinct(t.clone()).count("n")).unwrap(),
            vec![row!["a", "b", "n"], row![1, "y", 1], row![2, "x", 2]]
        );
        assert_eq!(data_rows(&distinct(t)).unwrap(), vec![row![1, "y"], row![2, "x"]]);
    }

    #[test]
    fn conflicts_ignore_missing_values() {
        let t = MemTable::from_rows(vec![
            row!["k", "a", "b"],
            row![1, "x", Value::Missing],
            row![1, "x", 3],
            row![2, "y", 1],
            row![2, "z", 1],
        ])
        .into_ref();
        assert_eq!(
            data_rows(&conflicts(t.clone(), "k")).unwrap(),
            vec![row![2, "y", 1], row![2, "z", 1]]
        );
        assert!(data_rows(&conflicts(t, "k").exclude("a")).unwrap().is_empty());
    }

    #[test]
    fn fold_sums_per_key() {
        let t = MemTable::from_rows(vec![row!["id", "n"], row![1, 3], row![1, 5], row![2, 4]]).into_ref();
        let add = |a: Value, b: Value| -> Result<Value> {
            match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Ok(Value::Int(a + b)),
                _ => Err(Error::value("not an int")),
            }
        };
        assert_eq!(
            to_rows(&fold(t, "id", "n", add)).unwrap(),
            vec![row!["key", "value"], row![1, 8], row![2, 4]]
        );
    }

    #[test]
    fn presorted_input_is_not_reordered() {
        let t = MemTable::from_rows(vec![row!["k"], row![2], row![1], row![2]]).into_ref();
        assert_eq!(data_rows(&unique(t.clone(), "k").presorted(true)).unwrap().len(), 3);
        assert_eq!(data_rows(&unique(t, "k")).unwrap(), vec![row![1]]);
    }

    #[test]
    fn uniqueness_check() {
        let t = MemTable::from_rows(vec![row!["k"], row![2], row![1]]).into_ref();
        assert!(is_unique(t.clone(), Some("k".into())).unwrap());
        let d = MemTable::from_rows(vec![row!["k"], row![2], row![2.0]]).into_ref();
        assert!(!is_unique(d, None).unwrap());
    }
}
