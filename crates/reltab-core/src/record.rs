//! Headers, rows, and the hybrid positional/by-name record view.

use std::ops::Deref;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::field::{resolve, FieldSpec};
use crate::value::Value;

/// A data row. Rows are not required to match their header's length.
pub type Row = Vec<Value>;

/// Ordered field names of a table; cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header(Arc<[String]>);

impl Header {
    pub fn new(names: Vec<String>) -> Self {
        Header(names.into())
    }

    /// The header of a table that produced no rows at all.
    pub fn empty() -> Self {
        Header(Arc::from(Vec::new()))
    }

    /// Build a header from a row of values, coercing each value to a string.
    pub fn from_values(values: &[Value]) -> Self {
        Header::new(values.iter().map(ToString::to_string).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }

    /// The header as a row of text values.
    pub fn to_row(&self) -> Row {
        self.0.iter().map(|n| Value::Text(n.clone())).collect()
    }

    /// Concatenate two headers (left fields first).
    pub fn concat(&self, other: &Header) -> Header {
        Header::new(self.0.iter().chain(other.0.iter()).cloned().collect())
    }
}

impl Default for Header {
    fn default() -> Self {
        Header::empty()
    }
}

impl Deref for Header {
    type Target = [String];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for Header {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Header::new(iter.into_iter().map(Into::into).collect())
    }
}

/// A single row bound to its header.
///
/// Lookups within the header but beyond the end of a short row return the
/// record's missing value; lookups outside the header are
/// [`Error::FieldNotFound`].
#[derive(Debug, Clone)]
pub struct Record {
    header: Header,
    row: Row,
    missing: Value,
}

impl Record {
    pub fn new(header: Header, row: Row) -> Self {
        Self::with_missing(header, row, Value::Missing)
    }

    pub fn with_missing(header: Header, row: Row, missing: Value) -> Self {
        Self {
            header,
            row,
            missing,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn row(&self) -> &[Value] {
        &self.row
    }

    pub fn into_row(self) -> Row {
        self.row
    }

    /// Positional access without header bounds: short rows yield the missing value.
    pub fn get(&self, idx: usize) -> &Value {
        self.row.get(idx).unwrap_or(&self.missing)
    }

    pub fn get_by_index(&self, idx: usize) -> Result<&Value> {
        if idx >= self.header.len() {
            return Err(Error::FieldNotFound(format!(
                "position {idx} outside header of {} fields",
                self.header.len()
            )));
        }
        Ok(self.get(idx))
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Value> {
        let idx = self
            .header
            .index_of(name)
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))?;
        Ok(self.get(idx))
    }

    /// Values of several columns, in spec order.
    pub fn values(&self, spec: &FieldSpec) -> Result<Vec<Value>> {
        let idx = resolve(&self.header, spec).map_err(|e| match e {
            Error::FieldSelection(msg) => Error::FieldNotFound(msg),
            other => other,
        })?;
        Ok(self.pick(&idx))
    }

    /// Clone the values at already-resolved positions.
    pub fn pick(&self, indices: &[usize]) -> Vec<Value> {
        indices.iter().map(|&i| self.get(i).clone()).collect()
    }
}

impl std::ops::Index<usize> for Record {
    type Output = Value;
    fn index(&self, idx: usize) -> &Value {
        self.get(idx)
    }
}

impl std::ops::Index<&str> for Record {
    type Output = Value;
    /// Panics when `name` is not part of the header; use [`Record::get_by_name`]
    /// for a fallible lookup.
    fn index(&self, name: &str) -> &Value {
        match self.header.index_of(name) {
            Some(idx) => self.get(idx),
            None => panic!("field {name:?} not in header"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn record(row: Row) -> Record {
        Record::new(Header::from_iter(["foo", "bar", "baz"]), row)
    }

    #[test]
    fn positional_and_named_access() {
        let rec = record(row!["a", 1, 2.5]);
        assert_eq!(rec.get(0), &Value::from("a"));
        assert_eq!(rec.get_by_name("bar").unwrap(), &Value::Int(1));
        assert_eq!(rec["baz"], Value::Float(2.5));
    }

    #[test]
    fn short_row_is_missing_not_an_error() {
        let rec = Record::with_missing(
            Header::from_iter(["foo", "bar", "baz"]),
            row!["a"],
            Value::from("NA"),
        );
        assert_eq!(rec.get_by_name("baz").unwrap(), &Value::from("NA"));
        assert_eq!(rec.get_by_index(2).unwrap(), &Value::from("NA"));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let rec = record(row!["a", 1, 2]);
        assert!(matches!(rec.get_by_name("nope"), Err(Error::FieldNotFound(_))));
        assert!(matches!(rec.get_by_index(3), Err(Error::FieldNotFound(_))));
    }

    #[test]
    fn values_follow_spec_order() {
        let rec = record(row!["a", 1, 2]);
        let vals = rec.values(&vec!["baz", "foo"].into()).unwrap();
        assert_eq!(vals, row![2, "a"]);
    }
}
