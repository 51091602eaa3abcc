//! Sort/group keys: a field spec, a callable on the record, or the whole row.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::field::{resolve, FieldSpec};
use crate::record::{Header, Record, Row};
use crate::value::Value;

pub type KeyFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

#[derive(Clone)]
pub enum KeySpec {
    Fields(FieldSpec),
    Func(KeyFn),
}

impl KeySpec {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        KeySpec::Func(Arc::new(f))
    }

    /// Resolve against the header of the current iteration.
    pub fn bind(&self, header: &Header) -> Result<BoundKey> {
        match self {
            KeySpec::Fields(spec) => {
                let indices = resolve(header, spec)?;
                Ok(BoundKey {
                    header: header.clone(),
                    kind: if spec.is_compound() {
                        BoundKind::Columns(indices)
                    } else {
                        BoundKind::Column(indices[0])
                    },
                })
            }
            KeySpec::Func(f) => Ok(BoundKey {
                header: header.clone(),
                kind: BoundKind::Func(Arc::clone(f)),
            }),
        }
    }
}

impl fmt::Debug for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySpec::Fields(spec) => f.debug_tuple("Fields").field(spec).finish(),
            KeySpec::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<FieldSpec> for KeySpec {
    fn from(v: FieldSpec) -> Self {
        KeySpec::Fields(v)
    }
}

impl From<&str> for KeySpec {
    fn from(v: &str) -> Self {
        KeySpec::Fields(v.into())
    }
}

impl From<String> for KeySpec {
    fn from(v: String) -> Self {
        KeySpec::Fields(v.into())
    }
}

impl From<usize> for KeySpec {
    fn from(v: usize) -> Self {
        KeySpec::Fields(v.into())
    }
}

impl<T: Into<FieldSpec>> From<Vec<T>> for KeySpec {
    fn from(v: Vec<T>) -> Self {
        KeySpec::Fields(v.into())
    }
}

#[derive(Clone)]
enum BoundKind {
    Row,
    Column(usize),
    Columns(Vec<usize>),
    Func(KeyFn),
}

/// A key resolved against one header; extracts key values from rows.
#[derive(Clone)]
pub struct BoundKey {
    header: Header,
    kind: BoundKind,
}

impl BoundKey {
    /// Key over the whole row.
    pub fn whole_row(header: &Header) -> Self {
        Self {
            header: header.clone(),
            kind: BoundKind::Row,
        }
    }

    /// Bind an optional key; `None` keys on the whole row.
    pub fn bind_opt(key: Option<&KeySpec>, header: &Header) -> Result<Self> {
        match key {
            Some(k) => k.bind(header),
            None => Ok(Self::whole_row(header)),
        }
    }

    /// Extract the key value of `row`. Short rows contribute missing values.
    pub fn extract(&self, row: &[Value]) -> Value {
        match &self.kind {
            BoundKind::Row => Value::List(row.to_vec()),
            BoundKind::Column(i) => row.get(*i).cloned().unwrap_or_default(),
            BoundKind::Columns(idx) => Value::List(
                idx.iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect(),
            ),
            BoundKind::Func(f) => {
                let rec = Record::new(self.header.clone(), row.to_vec());
                f(&rec)
            }
        }
    }

    /// Extract from an owned row without cloning it into a record twice.
    pub fn extract_owned(&self, row: Row) -> (Value, Row) {
        match &self.kind {
            BoundKind::Func(f) => {
                let rec = Record::new(self.header.clone(), row);
                let key = f(&rec);
                (key, rec.into_row())
            }
            _ => (self.extract(&row), row),
        }
    }
}

impl fmt::Debug for BoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            BoundKind::Row => "row".to_string(),
            BoundKind::Column(i) => format!("column {i}"),
            BoundKind::Columns(idx) => format!("columns {idx:?}"),
            BoundKind::Func(_) => "func".to_string(),
        };
        f.debug_struct("BoundKey").field("kind", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn single_and_compound_keys() {
        let h = Header::from_iter(["a", "b", "c"]);
        let one = KeySpec::from("b").bind(&h).unwrap();
        assert_eq!(one.extract(&row![1, 2, 3]), Value::Int(2));
        let two = KeySpec::from(vec!["c", "a"]).bind(&h).unwrap();
        assert_eq!(two.extract(&row![1, 2, 3]), Value::List(row![3, 1]));
        assert_eq!(one.extract(&row![1]), Value::Missing);
    }

    #[test]
    fn func_key_sees_record() {
        let h = Header::from_iter(["a", "b"]);
        let k = KeySpec::func(|r: &Record| r["b"].clone())
            .bind(&h)
            .unwrap();
        assert_eq!(k.extract(&row![1, "x"]), Value::from("x"));
    }

    #[test]
    fn whole_row_key() {
        let h = Header::from_iter(["a"]);
        let k = BoundKey::bind_opt(None, &h).unwrap();
        assert_eq!(k.extract(&row![1, 2]), Value::List(row![1, 2]));
    }
}
