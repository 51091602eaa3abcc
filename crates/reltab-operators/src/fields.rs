//! Field access bound to one header.

use reltab_core::error::Result;
use reltab_core::field::{resolve, FieldSpec};
use reltab_core::{Header, Value};

/// A field spec resolved against the header of the current iteration.
///
/// A single field yields its value; a compound spec yields a `List`.
#[derive(Debug, Clone)]
pub(crate) struct FieldGetter {
    indices: Vec<usize>,
    compound: bool,
}

impl FieldGetter {
    pub(crate) fn bind(header: &Header, spec: &FieldSpec) -> Result<Self> {
        Ok(Self {
            indices: resolve(header, spec)?,
            compound: spec.is_compound(),
        })
    }

    /// Value for `row`; positions past the end of a short row read as `missing`.
    pub(crate) fn get(&self, row: &[Value], missing: &Value) -> Value {
        let at = |i: usize| row.get(i).unwrap_or(missing).clone();
        if self.compound {
            Value::List(self.indices.iter().map(|&i| at(i)).collect())
        } else {
            at(self.indices[0])
        }
    }
}

/// Pad `row` with `missing` up to `width` fields.
pub(crate) fn pad(mut row: Vec<Value>, width: usize, missing: &Value) -> Vec<Value> {
    if row.len() < width {
        row.resize(width, missing.clone());
    }
    row
}
