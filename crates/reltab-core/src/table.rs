//! The table protocol.
//!
//! A [`Table`] is a description of a computation, not a stream: every call to
//! [`Table::open`] starts an independent iteration that yields the header and
//! then the data rows, and two iterations of the same table yield the same rows.
//!
//! Opening is the first step of iteration. Construction of an operator never
//! touches data; anything data-dependent (including resolving field specs
//! against the header) surfaces from `open` or from the row iterator.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::record::{Header, Record, Row};
use crate::value::Value;

/// A re-iterable, headered row source.
pub trait Table: Send + Sync {
    /// Start a fresh iteration.
    fn open(&self) -> Result<RowStream>;

    /// Stable operator name for logs.
    fn name(&self) -> &'static str {
        "table"
    }
}

/// Shared handle to a table; operators hold their inputs this way.
pub type TableRef = Arc<dyn Table>;

impl<T: Table + ?Sized> Table for Arc<T> {
    fn open(&self) -> Result<RowStream> {
        (**self).open()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// One iteration over a table: the header plus a fused row iterator.
///
/// The iterator stops for good after the first `Err`, so a failure is fatal to
/// the iteration that observed it.
pub struct RowStream {
    header: Header,
    rows: Box<dyn Iterator<Item = Result<Row>>>,
    failed: bool,
}

impl RowStream {
    pub fn new<I>(header: Header, rows: I) -> Self
    where
        I: Iterator<Item = Result<Row>> + 'static,
    {
        Self {
            header,
            rows: Box::new(rows),
            failed: false,
        }
    }

    /// A stream with a header and no data rows.
    pub fn header_only(header: Header) -> Self {
        Self::new(header, std::iter::empty())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Wrap every row into a [`Record`] sharing this stream's header.
    pub fn records(self, missing: Value) -> impl Iterator<Item = Result<Record>> {
        let header = self.header.clone();
        self.map(move |row| row.map(|r| Record::with_missing(header.clone(), r, missing.clone())))
    }
}

impl Iterator for RowStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.rows.next()?;
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("header", &self.header)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

/// An in-memory table.
#[derive(Debug, Clone)]
pub struct MemTable {
    header: Header,
    rows: Arc<Vec<Row>>,
}

impl MemTable {
    pub fn new(header: Header, rows: Vec<Row>) -> Self {
        Self {
            header,
            rows: Arc::new(rows),
        }
    }

    /// Build a table from raw rows where the first row is the header.
    ///
    /// An empty input gives a table with an empty header and no rows.
    pub fn from_rows(mut rows: Vec<Row>) -> Self {
        if rows.is_empty() {
            return Self::empty();
        }
        let header = Header::from_values(&rows.remove(0));
        Self::new(header, rows)
    }

    /// A table that yields nothing, not even a header.
    pub fn empty() -> Self {
        Self::new(Header::empty(), Vec::new())
    }

    /// Wrap into a shareable [`TableRef`].
    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Table for MemTable {
    fn open(&self) -> Result<RowStream> {
        let rows = Arc::clone(&self.rows);
        let iter = (0..rows.len()).map(move |i| Ok(rows[i].clone()));
        Ok(RowStream::new(self.header.clone(), iter))
    }

    fn name(&self) -> &'static str {
        "mem"
    }
}

/// A table backed by a closure that starts a new iteration on every call.
pub struct FnSource<F> {
    open: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> Result<RowStream> + Send + Sync,
{
    pub fn new(open: F) -> Self {
        Self { open }
    }
}

impl<F> Table for FnSource<F>
where
    F: Fn() -> Result<RowStream> + Send + Sync,
{
    fn open(&self) -> Result<RowStream> {
        (self.open)()
    }

    fn name(&self) -> &'static str {
        "fn_source"
    }
}

/// Run one full iteration and collect header and data rows.
pub fn materialize(table: &dyn Table) -> Result<(Header, Vec<Row>)> {
    let stream = table.open()?;
    let header = stream.header().clone();
    let rows = stream.collect::<Result<Vec<_>>>()?;
    Ok((header, rows))
}

/// Collect the data rows of one iteration.
pub fn data_rows(table: &dyn Table) -> Result<Vec<Row>> {
    materialize(table).map(|(_, rows)| rows)
}

/// Collect one iteration as raw rows, header first (as text values).
///
/// A table with an empty header and no rows yields nothing at all.
pub fn to_rows(table: &dyn Table) -> Result<Vec<Row>> {
    let (header, rows) = materialize(table)?;
    if header.is_empty() && rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(header.to_row());
    out.extend(rows);
    Ok(out)
}

/// Fail with a [`Error::FieldSelection`] unless the header has fields.
pub fn require_header(header: &Header, what: &str) -> Result<()> {
    if header.is_empty() {
        return Err(Error::FieldSelection(format!(
            "{what}: table has no header"
        )));
    }
    Ok(())
}
