//! Row selection.
//!
//! Every selector is a [`Select`] table over a [`Predicate`]. The predicate is
//! bound to the header of each iteration when the table is opened, so field
//! specs that cannot be resolved fail there, never at construction.
//!
//! `complement` is XORed with the predicate outcome.

use std::collections::BTreeSet;
use std::sync::Arc;

use reltab_core::config::EngineConfig;
use reltab_core::error::Result;
use reltab_core::field::FieldSpec;
use reltab_core::order::{compare, equal, Comparable};
use reltab_core::table::require_header;
use reltab_core::value::ValueKind;
use reltab_core::{Header, Record, Row, RowStream, Table, TableRef, Value};

use crate::expr::{BoundExpr, Expr};
use crate::fields::FieldGetter;

pub type RowFn = Arc<dyn Fn(&Record) -> bool + Send + Sync>;
pub type ValueFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Predicate {
    /// Receives the whole record.
    Row(RowFn),
    /// Receives the resolved field value (a `List` for compound specs).
    Field(FieldSpec, ValueFn),
    /// An expression evaluated for truthiness.
    Expr(Arc<Expr>),
    /// Rows with exactly this many values.
    RowLen(usize),
}

impl Predicate {
    pub fn row<F>(f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Predicate::Row(Arc::new(f))
    }

    pub fn field<F>(spec: impl Into<FieldSpec>, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Predicate::Field(spec.into(), Arc::new(f))
    }

    /// Parse `source` with the expression language.
    pub fn expr(source: &str) -> Result<Self> {
        Ok(Predicate::Expr(Arc::new(Expr::parse(source)?)))
    }

    fn bind(&self, header: &Header) -> Result<BoundPredicate> {
        Ok(match self {
            Predicate::Row(f) => BoundPredicate::Row(Arc::clone(f)),
            Predicate::Field(spec, f) => {
                require_header(header, "field selection")?;
                BoundPredicate::Field(FieldGetter::bind(header, spec)?, Arc::clone(f))
            }
            Predicate::Expr(e) => BoundPredicate::Expr(e.bind(header)?),
            Predicate::RowLen(n) => BoundPredicate::RowLen(*n),
        })
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Row(_) => f.write_str("Row(..)"),
            Predicate::Field(spec, _) => write!(f, "Field({spec}, ..)"),
            Predicate::Expr(e) => write!(f, "Expr({e})"),
            Predicate::RowLen(n) => write!(f, "RowLen({n})"),
        }
    }
}

enum BoundPredicate {
    Row(RowFn),
    Field(FieldGetter, ValueFn),
    Expr(BoundExpr),
    RowLen(usize),
}

impl BoundPredicate {
    fn test(&self, header: &Header, row: &Row, missing: &Value) -> Result<bool> {
        Ok(match self {
            BoundPredicate::Row(f) => {
                let rec = Record::with_missing(header.clone(), row.clone(), missing.clone());
                f(&rec)
            }
            BoundPredicate::Field(getter, f) => f(&getter.get(row, missing)),
            BoundPredicate::Expr(e) => e.eval(row, missing)?.is_truthy(),
            BoundPredicate::RowLen(n) => row.len() == *n,
        })
    }
}

/// Rows for which the predicate holds (or fails, with `complement`).
#[derive(Clone)]
pub struct Select {
    source: TableRef,
    predicate: Predicate,
    complement: bool,
    missing: Value,
}

impl Select {
    pub fn new(source: TableRef, predicate: Predicate) -> Self {
        Self {
            source,
            predicate,
            complement: false,
            missing: EngineConfig::global().missing.clone(),
        }
    }

    pub fn complement(mut self, complement: bool) -> Self {
        self.complement = complement;
        self
    }

    /// Value seen for fields past the end of a short row.
    pub fn missing(mut self, missing: Value) -> Self {
        self.missing = missing;
        self
    }

    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }
}

impl Table for Select {
    fn open(&self) -> Result<RowStream> {
        let stream = self.source.open()?;
        let header = stream.header().clone();
        let bound = self.predicate.bind(&header)?;
        let complement = self.complement;
        let missing = self.missing.clone();
        let h = header.clone();
        let rows = stream.filter_map(move |row| match row {
            Err(e) => Some(Err(e)),
            Ok(row) => match bound.test(&h, &row, &missing) {
                Ok(keep) if keep != complement => Some(Ok(row)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            },
        });
        Ok(RowStream::new(header, rows))
    }

    fn name(&self) -> &'static str {
        "select"
    }
}

impl std::fmt::Debug for Select {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Select")
            .field("predicate", &self.predicate)
            .field("complement", &self.complement)
            .finish_non_exhaustive()
    }
}

/// Select with a row predicate.
pub fn select<F>(table: TableRef, f: F) -> Select
where
    F: Fn(&Record) -> bool + Send + Sync + 'static,
{
    Select::new(table, Predicate::row(f))
}

/// Select with a predicate on one field (or a `List` of several).
pub fn select_field<F>(table: TableRef, field: impl Into<FieldSpec>, f: F) -> Select
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Select::new(table, Predicate::field(field, f))
}

/// Select with an expression, e.g. `{amount} > 100 and {kind} == 'x'`.
pub fn select_expr(table: TableRef, source: &str) -> Result<Select> {
    Ok(Select::new(table, Predicate::expr(source)?))
}

/// Rows with exactly `n` values.
pub fn select_len(table: TableRef, n: usize) -> Select {
    Select::new(table, Predicate::RowLen(n))
}

/// Comparison operators for [`select_op`], evaluated with the total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn apply(self, a: &Value, b: &Value) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => equal(a, b),
            CompareOp::Ne => !equal(a, b),
            CompareOp::Lt => compare(a, b) == Less,
            CompareOp::Le => compare(a, b) != Greater,
            CompareOp::Gt => compare(a, b) == Greater,
            CompareOp::Ge => compare(a, b) != Less,
        }
    }
}

/// Rows where `field op value` holds.
pub fn select_op(table: TableRef, field: impl Into<FieldSpec>, op: CompareOp, value: impl Into<Value>) -> Select {
    let value = value.into();
    select_field(table, field, move |v| op.apply(v, &value))
}

pub fn select_eq(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    select_op(table, field, CompareOp::Eq, value)
}

pub fn select_ne(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    select_op(table, field, CompareOp::Ne, value)
}

pub fn select_lt(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    select_op(table, field, CompareOp::Lt, value)
}

pub fn select_le(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    select_op(table, field, CompareOp::Le, value)
}

pub fn select_gt(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    select_op(table, field, CompareOp::Gt, value)
}

pub fn select_ge(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    select_op(table, field, CompareOp::Ge, value)
}

/// Rows whose field value contains `value` (substring, sub-bytes, or list member).
pub fn select_contains(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    let value = value.into();
    select_field(table, field, move |v| v.contains(&value))
}

/// Rows whose field value equals one of `values`.
pub fn select_in(table: TableRef, field: impl Into<FieldSpec>, values: Vec<Value>) -> Select {
    let set: BTreeSet<Comparable> = values.into_iter().map(Comparable).collect();
    select_field(table, field, move |v| set.contains(&Comparable(v.clone())))
}

pub fn select_not_in(table: TableRef, field: impl Into<FieldSpec>, values: Vec<Value>) -> Select {
    select_in(table, field, values).complement(true)
}

/// Strict identity: same variant and equal payload (`1` is not `1.0`).
pub fn select_is(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    let value = value.into();
    select_field(table, field, move |v| v.is_same(&value))
}

pub fn select_is_not(table: TableRef, field: impl Into<FieldSpec>, value: impl Into<Value>) -> Select {
    select_is(table, field, value).complement(true)
}

pub fn select_is_instance(table: TableRef, field: impl Into<FieldSpec>, kind: ValueKind) -> Select {
    select_field(table, field, move |v| v.kind() == kind)
}

/// `min <= v <= max`.
pub fn select_range_open(table: TableRef, field: impl Into<FieldSpec>, min: impl Into<Value>, max: impl Into<Value>) -> Select {
    let (min, max) = (min.into(), max.into());
    select_field(table, field, move |v| {
        CompareOp::Le.apply(&min, v) && CompareOp::Le.apply(v, &max)
    })
}

/// `min < v < max`.
pub fn select_range_closed(table: TableRef, field: impl Into<FieldSpec>, min: impl Into<Value>, max: impl Into<Value>) -> Select {
    let (min, max) = (min.into(), max.into());
    select_field(table, field, move |v| {
        CompareOp::Lt.apply(&min, v) && CompareOp::Lt.apply(v, &max)
    })
}

/// `min <= v < max`.
pub fn select_range_open_left(table: TableRef, field: impl Into<FieldSpec>, min: impl Into<Value>, max: impl Into<Value>) -> Select {
    let (min, max) = (min.into(), max.into());
    select_field(table, field, move |v| {
        CompareOp::Le.apply(&min, v) && CompareOp::Lt.apply(v, &max)
    })
}

/// `min < v <= max`.
pub fn select_range_open_right(table: TableRef, field: impl Into<FieldSpec>, min: impl Into<Value>, max: impl Into<Value>) -> Select {
    let (min, max) = (min.into(), max.into());
    select_field(table, field, move |v| {
        CompareOp::Lt.apply(&min, v) && CompareOp::Le.apply(v, &max)
    })
}

/// Rows whose field value is truthy.
pub fn select_true(table: TableRef, field: impl Into<FieldSpec>) -> Select {
    select_field(table, field, Value::is_truthy)
}

pub fn select_false(table: TableRef, field: impl Into<FieldSpec>) -> Select {
    select_field(table, field, |v| !v.is_truthy())
}

/// Rows whose field value is missing.
pub fn select_none(table: TableRef, field: impl Into<FieldSpec>) -> Select {
    select_field(table, field, Value::is_missing)
}

pub fn select_not_none(table: TableRef, field: impl Into<FieldSpec>) -> Select {
    select_none(table, field).complement(true)
}

/// Split into (matching, non-matching) tables over the same predicate.
pub fn biselect(table: TableRef, predicate: Predicate) -> (Select, Select) {
    let yes = Select::new(table, predicate);
    let no = yes.clone().complement(true);
    (yes, no)
}

pub type ContextFn = Arc<dyn Fn(Option<&Record>, &Record, Option<&Record>) -> bool + Send + Sync>;

/// Selection with one row of context on either side.
///
/// The predicate sees `(previous, current, next)`; `previous` is `None` for
/// the first row and `next` is `None` for the last.
#[derive(Clone)]
pub struct SelectUsingContext {
    source: TableRef,
    predicate: ContextFn,
    complement: bool,
    missing: Value,
}

impl SelectUsingContext {
    pub fn new<F>(source: TableRef, f: F) -> Self
    where
        F: Fn(Option<&Record>, &Record, Option<&Record>) -> bool + Send + Sync + 'static,
    {
        Self {
            source,
            predicate: Arc::new(f),
            complement: false,
            missing: EngineConfig::global().missing.clone(),
        }
    }

    pub fn complement(mut self, complement: bool) -> Self {
        self.complement = complement;
        self
    }

    pub fn missing(mut self, missing: Value) -> Self {
        self.missing = missing;
        self
    }
}

impl Table for SelectUsingContext {
    fn open(&self) -> Result<RowStream> {
        let mut stream = self.source.open()?;
        let header = stream.header().clone();
        let first = stream.next().transpose()?;
        let rec = |row: Row| Record::with_missing(header.clone(), row, self.missing.clone());
        let iter = ContextIter {
            stream,
            prev: None,
            cur: first.map(rec),
            header: header.clone(),
            missing: self.missing.clone(),
            predicate: Arc::clone(&self.predicate),
            complement: self.complement,
        };
        Ok(RowStream::new(header, iter))
    }

    fn name(&self) -> &'static str {
        "select_using_context"
    }
}

/// Select with `(previous, current, next)` context.
pub fn select_using_context<F>(table: TableRef, f: F) -> SelectUsingContext
where
    F: Fn(Option<&Record>, &Record, Option<&Record>) -> bool + Send + Sync + 'static,
{
    SelectUsingContext::new(table, f)
}

struct ContextIter {
    stream: RowStream,
    prev: Option<Record>,
    cur: Option<Record>,
    header: Header,
    missing: Value,
    predicate: ContextFn,
    complement: bool,
}

impl Iterator for ContextIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cur = self.cur.take()?;
            let next = match self.stream.next() {
                None => None,
                Some(Ok(row)) => Some(Record::with_missing(self.header.clone(), row, self.missing.clone())),
                Some(Err(e)) => return Some(Err(e)),
            };
            let keep = (self.predicate)(self.prev.as_ref(), &cur, next.as_ref()) != self.complement;
            let out = keep.then(|| cur.row().to_vec());
            self.prev = Some(cur);
            self.cur = next;
            if let Some(row) = out {
                return Some(Ok(row));
            }
        }
    }
}

/// Partition by the distinct values of `field`, one table per value, in
/// ascending value order.
///
/// Runs one iteration to discover the values; each facet table re-filters
/// the source on its own iterations.
pub fn facet(table: TableRef, field: impl Into<FieldSpec>) -> Result<Vec<(Value, TableRef)>> {
    let field = field.into();
    let missing = EngineConfig::global().missing.clone();
    let stream = table.open()?;
    require_header(stream.header(), "facet")?;
    let getter = FieldGetter::bind(stream.header(), &field)?;
    let mut values = BTreeSet::new();
    for row in stream {
        values.insert(Comparable(getter.get(&row?, &missing)));
    }
    Ok(values
        .into_iter()
        .map(|Comparable(v)| {
            let facet: TableRef = Arc::new(select_eq(Arc::clone(&table), field.clone(), v.clone()).missing(missing.clone()));
            (v, facet)
        })
        .collect())
}
