//! Field and row mapping under a per-row error policy.
//!
//! Field mapping isolates failures per output field; row mapping isolates
//! them per input row (or per group for [`RowGroupMap`]). What happens to a
//! failure is decided by [`FailOnError`].

use std::collections::BTreeMap;
use std::sync::Arc;

use reltab_core::config::{EngineConfig, FailOnError};
use reltab_core::error::{Error, Result};
use reltab_core::field::FieldSpec;
use reltab_core::key::KeySpec;
use reltab_core::order::Comparable;
use reltab_core::{Header, Record, Row, RowStream, Table, TableRef, Value};

use crate::expr::{BoundExpr, Expr};
use crate::fields::FieldGetter;
use crate::group::GroupRuns;
use crate::sort::{sorted_input, SortOptions};

pub type RecordFn = Arc<dyn Fn(&Record) -> Result<Value> + Send + Sync>;
pub type ConvertFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// How one output field is computed.
#[derive(Clone)]
pub enum FieldRule {
    /// Copy a source field (a `List` for compound specs).
    Field(FieldSpec),
    /// Evaluate an expression.
    Expr(Arc<Expr>),
    /// Call a function on the whole record.
    Record(RecordFn),
    /// Transform the value of a source field.
    Convert(FieldSpec, ConvertFn),
    /// Look the source value up in a table; unknown values pass through.
    Translate(FieldSpec, Arc<BTreeMap<Comparable, Value>>),
}

impl FieldRule {
    pub fn field(spec: impl Into<FieldSpec>) -> Self {
        FieldRule::Field(spec.into())
    }

    pub fn expr(source: &str) -> Result<Self> {
        Ok(FieldRule::Expr(Arc::new(Expr::parse(source)?)))
    }

    pub fn record<F>(f: F) -> Self
    where
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        FieldRule::Record(Arc::new(f))
    }

    pub fn convert<F>(spec: impl Into<FieldSpec>, f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        FieldRule::Convert(spec.into(), Arc::new(f))
    }

    pub fn translate<I, K, V>(spec: impl Into<FieldSpec>, table: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let map = table
            .into_iter()
            .map(|(k, v)| (Comparable(k.into()), v.into()))
            .collect();
        FieldRule::Translate(spec.into(), Arc::new(map))
    }

    fn bind(&self, header: &Header) -> Result<BoundRule> {
        Ok(match self {
            FieldRule::Field(spec) => BoundRule::Field(FieldGetter::bind(header, spec)?),
            FieldRule::Expr(e) => BoundRule::Expr(e.bind(header)?),
            FieldRule::Record(f) => BoundRule::Record(Arc::clone(f)),
            FieldRule::Convert(spec, f) => {
                BoundRule::Convert(FieldGetter::bind(header, spec)?, Arc::clone(f))
            }
            FieldRule::Translate(spec, map) => {
                BoundRule::Translate(FieldGetter::bind(header, spec)?, Arc::clone(map))
            }
        })
    }
}

impl std::fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldRule::Field(spec) => write!(f, "Field({spec})"),
            FieldRule::Expr(e) => write!(f, "Expr({e})"),
            FieldRule::Record(_) => f.write_str("Record(..)"),
            FieldRule::Convert(spec, _) => write!(f, "Convert({spec}, ..)"),
            FieldRule::Translate(spec, map) => write!(f, "Translate({spec}, {} entries)", map.len()),
        }
    }
}

enum BoundRule {
    Field(FieldGetter),
    Expr(BoundExpr),
    Record(RecordFn),
    Convert(FieldGetter, ConvertFn),
    Translate(FieldGetter, Arc<BTreeMap<Comparable, Value>>),
}

impl BoundRule {
    fn apply(&self, rec: &Record, missing: &Value) -> Result<Value> {
        match self {
            BoundRule::Field(g) => Ok(g.get(rec.row(), missing)),
            BoundRule::Expr(e) => e.eval(rec.row(), missing),
            BoundRule::Record(f) => f(rec),
            BoundRule::Convert(g, f) => f(&g.get(rec.row(), missing)),
            BoundRule::Translate(g, map) => {
                let key = Comparable(g.get(rec.row(), missing));
                Ok(match map.get(&key) {
                    Some(v) => v.clone(),
                    None => key.into_inner(),
                })
            }
        }
    }
}

/// Error handling shared by every mapping operator.
#[derive(Debug, Clone)]
pub struct ErrorPolicy {
    pub fail_on_error: FailOnError,
    /// Substituted for a failed field under [`FailOnError::Substitute`].
    pub error_value: Value,
    pub missing: Value,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::from_config(EngineConfig::global())
    }
}

impl ErrorPolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            fail_on_error: cfg.fail_on_error,
            error_value: cfg.error_value.clone(),
            missing: cfg.missing.clone(),
        }
    }

    fn field_failure(&self, field: &str, err: Error) -> Result<Value> {
        match self.fail_on_error {
            FailOnError::Propagate => Err(err),
            FailOnError::Inline => Ok(Value::Error(err.to_string())),
            FailOnError::Substitute => {
                tracing::trace!(field, error = %err, "field mapping failed; substituting");
                Ok(self.error_value.clone())
            }
        }
    }

    /// Rows to emit in place of a failed row (or group).
    fn row_failure(&self, err: Error) -> Result<Vec<Row>> {
        match self.fail_on_error {
            FailOnError::Propagate => Err(err),
            FailOnError::Inline => Ok(vec![vec![Value::Error(err.to_string())]]),
            FailOnError::Substitute => {
                tracing::trace!(error = %err, "row mapping failed; dropping its output");
                Ok(Vec::new())
            }
        }
    }
}

/// Map every row to a new set of fields.
///
/// The output header is the rule names in the order they were added.
#[derive(Clone)]
pub struct FieldMap {
    source: TableRef,
    rules: Vec<(String, FieldRule)>,
    policy: ErrorPolicy,
}

impl FieldMap {
    pub fn new(source: TableRef) -> Self {
        Self {
            source,
            rules: Vec::new(),
            policy: ErrorPolicy::default(),
        }
    }

    /// Add (or replace, keeping its position) the rule for output field `name`.
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        let name = name.into();
        match self.rules.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = rule,
            None => self.rules.push((name, rule)),
        }
        self
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn fail_on_error(mut self, mode: FailOnError) -> Self {
        self.policy.fail_on_error = mode;
        self
    }

    pub fn error_value(mut self, v: Value) -> Self {
        self.policy.error_value = v;
        self
    }

    pub fn missing(mut self, v: Value) -> Self {
        self.policy.missing = v;
        self
    }
}

impl Table for FieldMap {
    fn open(&self) -> Result<RowStream> {
        let stream = self.source.open()?;
        let in_header = stream.header().clone();
        let bound = self
            .rules
            .iter()
            .map(|(name, rule)| Ok((name.clone(), rule.bind(&in_header)?)))
            .collect::<Result<Vec<_>>>()?;
        let out_header: Header = self.rules.iter().map(|(n, _)| n.clone()).collect();
        let policy = self.policy.clone();
        let rows = stream.map(move |row| {
            let rec = Record::with_missing(in_header.clone(), row?, policy.missing.clone());
            bound
                .iter()
                .map(|(name, rule)| match rule.apply(&rec, &policy.missing) {
                    Ok(v) => Ok(v),
                    Err(e) => policy.field_failure(name, e),
                })
                .collect::<Result<Row>>()
        });
        Ok(RowStream::new(out_header, rows))
    }

    fn name(&self) -> &'static str {
        "field_map"
    }
}

pub type RowFn = Arc<dyn Fn(&Record) -> Result<Row> + Send + Sync>;
pub type RowManyFn = Arc<dyn Fn(&Record) -> Result<Vec<Row>> + Send + Sync>;
pub type GroupFn = Arc<dyn Fn(&Value, &[Record]) -> Result<Vec<Row>> + Send + Sync>;

/// Map each row to one output row under an explicit header.
#[derive(Clone)]
pub struct RowMap {
    source: TableRef,
    header: Header,
    f: RowFn,
    policy: ErrorPolicy,
}

impl RowMap {
    pub fn new<F>(source: TableRef, header: Header, f: F) -> Self
    where
        F: Fn(&Record) -> Result<Row> + Send + Sync + 'static,
    {
        Self {
            source,
            header,
            f: Arc::new(f),
            policy: ErrorPolicy::default(),
        }
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn fail_on_error(mut self, mode: FailOnError) -> Self {
        self.policy.fail_on_error = mode;
        self
    }
}

impl Table for RowMap {
    fn open(&self) -> Result<RowStream> {
        let f = Arc::clone(&self.f);
        RowMapMany::with_fn(
            Arc::clone(&self.source),
            self.header.clone(),
            Arc::new(move |rec: &Record| f(rec).map(|row| vec![row])),
            self.policy.clone(),
        )
        .open()
    }

    fn name(&self) -> &'static str {
        "row_map"
    }
}

/// Map each row to zero or more output rows under an explicit header.
#[derive(Clone)]
pub struct RowMapMany {
    source: TableRef,
    header: Header,
    f: RowManyFn,
    policy: ErrorPolicy,
}

impl RowMapMany {
    pub fn new<F>(source: TableRef, header: Header, f: F) -> Self
    where
        F: Fn(&Record) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        Self::with_fn(source, header, Arc::new(f), ErrorPolicy::default())
    }

    fn with_fn(source: TableRef, header: Header, f: RowManyFn, policy: ErrorPolicy) -> Self {
        Self {
            source,
            header,
            f,
            policy,
        }
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn fail_on_error(mut self, mode: FailOnError) -> Self {
        self.policy.fail_on_error = mode;
        self
    }
}

impl Table for RowMapMany {
    fn open(&self) -> Result<RowStream> {
        let stream = self.source.open()?;
        let in_header = stream.header().clone();
        let f = Arc::clone(&self.f);
        let policy = self.policy.clone();
        let rows = stream.flat_map(move |row| -> Vec<Result<Row>> {
            let row = match row {
                Ok(row) => row,
                Err(e) => return vec![Err(e)],
            };
            let rec = Record::with_missing(in_header.clone(), row, policy.missing.clone());
            match f(&rec).or_else(|e| policy.row_failure(e)) {
                Ok(out) => out.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            }
        });
        Ok(RowStream::new(self.header.clone(), rows))
    }

    fn name(&self) -> &'static str {
        "row_map_many"
    }
}

/// Group rows by key and map each group to zero or more output rows.
///
/// The input is sorted by the key first unless marked presorted.
#[derive(Clone)]
pub struct RowGroupMap {
    source: TableRef,
    key: KeySpec,
    header: Header,
    f: GroupFn,
    presorted: bool,
    sort: SortOptions,
    policy: ErrorPolicy,
}

impl RowGroupMap {
    pub fn new<F>(source: TableRef, key: impl Into<KeySpec>, header: Header, f: F) -> Self
    where
        F: Fn(&Value, &[Record]) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        Self {
            source,
            key: key.into(),
            header,
            f: Arc::new(f),
            presorted: false,
            sort: SortOptions::default(),
            policy: ErrorPolicy::default(),
        }
    }

    pub fn presorted(mut self, presorted: bool) -> Self {
        self.presorted = presorted;
        self
    }

    pub fn sort_options(mut self, opts: SortOptions) -> Self {
        self.sort = opts;
        self
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn fail_on_error(mut self, mode: FailOnError) -> Self {
        self.policy.fail_on_error = mode;
        self
    }
}

impl Table for RowGroupMap {
    fn open(&self) -> Result<RowStream> {
        let input = sorted_input(&self.source, Some(&self.key), self.presorted, &self.sort);
        let stream = input.open()?;
        let in_header = stream.header().clone();
        let groups = GroupRuns::new(stream, self.key.bind(&in_header)?);
        let f = Arc::clone(&self.f);
        let policy = self.policy.clone();
        let rows = groups.flat_map(move |group| -> Vec<Result<Row>> {
            let (key, rows) = match group {
                Ok(g) => g,
                Err(e) => return vec![Err(e)],
            };
            let records: Vec<Record> = rows
                .into_iter()
                .map(|r| Record::with_missing(in_header.clone(), r, policy.missing.clone()))
                .collect();
            match f(&key, &records).or_else(|e| policy.row_failure(e)) {
                Ok(out) => out.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            }
        });
        Ok(RowStream::new(self.header.clone(), rows))
    }

    fn name(&self) -> &'static str {
        "row_group_map"
    }
}

#[cfg(test)]
mod tests {
    use reltab_core::table::{data_rows, to_rows};
    use reltab_core::{row, MemTable};

    use super::*;

    fn table() -> TableRef {
        MemTable::from_rows(vec![
            row!["id", "sex", "age"],
            row![1, "male", 16],
            row![2, "female", 19],
            row![3, "x"],
        ])
        .into_ref()
    }

    fn doubled_age() -> FieldRule {
        FieldRule::convert("age", |v| {
            v.as_i64()
                .map(|a| Value::Int(a * 2))
                .ok_or_else(|| Error::value(format!("age {v:?} is not a number")))
        })
    }

    #[test]
    fn field_map_rules() {
        let t = FieldMap::new(table())
            .field("subject", FieldRule::field("id"))
            .field("gender", FieldRule::translate("sex", [("male", "M"), ("female", "F")]))
            .field("age_months", FieldRule::expr("{age} * 12").unwrap())
            .field(
                "label",
                FieldRule::record(|r| Ok(Value::Text(format!("{}-{}", r["id"], r["sex"])))),
            );
        let rows = to_rows(&t).unwrap();
        assert_eq!(rows[0], row!["subject", "gender", "age_months", "label"]);
        assert_eq!(rows[1], row![1, "M", 192, "1-male"]);
        // unknown translation keys pass through
        assert_eq!(rows[3][1], Value::from("x"));
    }

    #[test]
    fn field_failures_follow_the_policy() {
        let t = FieldMap::new(table())
            .field("id", FieldRule::field("id"))
            .field("age2", doubled_age())
            .error_value(Value::from(-1));
        assert_eq!(data_rows(&t).unwrap()[2], row![3, -1]);

        let inline = t.clone().fail_on_error(FailOnError::Inline);
        let rows = data_rows(&inline).unwrap();
        assert!(matches!(rows[2][1], Value::Error(_)));
        assert_eq!(rows[2][0], Value::from(3));

        let strict = t.fail_on_error(FailOnError::Propagate);
        let results: Vec<_> = strict.open().unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
    }

    #[test]
    fn bad_source_field_fails_on_open() {
        let t = FieldMap::new(table()).field("x", FieldRule::field("nope"));
        assert!(matches!(t.open(), Err(Error::FieldSelection(_))));
    }

    #[test]
    fn row_map_drops_failed_rows_by_default() {
        let header: Header = ["id", "age2"].into_iter().collect();
        let t = RowMap::new(table(), header, |r| {
            let age = r["age"].as_i64().ok_or_else(|| Error::value("no age"))?;
            Ok(row![r["id"].clone(), age * 2])
        });
        assert_eq!(data_rows(&t).unwrap(), vec![row![1, 32], row![2, 38]]);

        let inline = t.fail_on_error(FailOnError::Inline);
        let rows = data_rows(&inline).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(matches!(rows[2][0], Value::Error(_)));
    }

    #[test]
    fn row_map_many_expands() {
        let header: Header = ["id", "var", "value"].into_iter().collect();
        let t = RowMapMany::new(table(), header, |r| {
            Ok(vec![
                row![r["id"].clone(), "sex", r["sex"].clone()],
                row![r["id"].clone(), "age", r["age"].clone()],
            ])
        });
        let rows = data_rows(&t).unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows[5][2].is_missing());
    }

    #[test]
    fn row_group_map_sees_whole_groups() {
        let src = MemTable::from_rows(vec![
            row!["k", "v"],
            row!["b", 1],
            row!["a", 2],
            row!["b", 3],
        ])
        .into_ref();
        let header: Header = ["k", "total"].into_iter().collect();
        let t = RowGroupMap::new(src, "k", header, |key, recs| {
            let total: i64 = recs.iter().filter_map(|r| r["v"].as_i64()).sum();
            Ok(vec![row![key.clone(), total]])
        });
        assert_eq!(data_rows(&t).unwrap(), vec![row!["a", 2], row!["b", 4]]);
    }
}
