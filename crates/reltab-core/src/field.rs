//! Field specifications and their resolution against a header.
//!
//! A spec is resolved per use, against whatever header the current iteration
//! produced. Nothing is cached across headers.

use std::fmt;

use crate::error::{Error, Result};
use crate::record::Header;

/// A column selector: a name, a zero-based position, or a sequence of either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    Position(usize),
    Name(String),
    Sequence(Vec<FieldSpec>),
}

impl FieldSpec {
    /// Number of columns this spec selects once resolved.
    pub fn arity(&self) -> usize {
        match self {
            FieldSpec::Sequence(specs) => specs.iter().map(FieldSpec::arity).sum(),
            _ => 1,
        }
    }

    /// True for a sequence spec, even a one-element one.
    pub fn is_compound(&self) -> bool {
        matches!(self, FieldSpec::Sequence(_))
    }

    fn flatten<'a>(&'a self, out: &mut Vec<&'a FieldSpec>) {
        match self {
            FieldSpec::Sequence(specs) => specs.iter().for_each(|s| s.flatten(out)),
            leaf => out.push(leaf),
        }
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::Position(i) => write!(f, "#{i}"),
            FieldSpec::Name(n) => write!(f, "{n:?}"),
            FieldSpec::Sequence(specs) => {
                f.write_str("[")?;
                for (i, s) in specs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{s}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for FieldSpec {
    fn from(v: &str) -> Self {
        FieldSpec::Name(v.to_string())
    }
}

impl From<String> for FieldSpec {
    fn from(v: String) -> Self {
        FieldSpec::Name(v)
    }
}

impl From<&String> for FieldSpec {
    fn from(v: &String) -> Self {
        FieldSpec::Name(v.clone())
    }
}

impl From<usize> for FieldSpec {
    fn from(v: usize) -> Self {
        FieldSpec::Position(v)
    }
}

impl<T: Into<FieldSpec>> From<Vec<T>> for FieldSpec {
    fn from(v: Vec<T>) -> Self {
        FieldSpec::Sequence(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldSpec> + Clone> From<&[T]> for FieldSpec {
    fn from(v: &[T]) -> Self {
        FieldSpec::Sequence(v.iter().cloned().map(Into::into).collect())
    }
}

impl<const N: usize, T: Into<FieldSpec>> From<[T; N]> for FieldSpec {
    fn from(v: [T; N]) -> Self {
        FieldSpec::Sequence(v.into_iter().map(Into::into).collect())
    }
}

/// Resolve `spec` against `header` to positional indices.
///
/// Positions must be in bounds. Names match header entries and consume the
/// matched slot, so a name repeated inside one compound spec resolves to the
/// next column carrying that name, or fails when none is left. A column can be
/// selected at most once per spec.
pub fn resolve(header: &Header, spec: &FieldSpec) -> Result<Vec<usize>> {
    let mut leaves = Vec::new();
    spec.flatten(&mut leaves);

    let mut used = vec![false; header.len()];
    let mut indices = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let idx = match leaf {
            FieldSpec::Position(pos) => {
                if *pos >= header.len() {
                    return Err(Error::FieldSelection(format!(
                        "position {pos} out of range for header of {} fields",
                        header.len()
                    )));
                }
                if used[*pos] {
                    return Err(Error::FieldSelection(format!(
                        "position {pos} selected more than once"
                    )));
                }
                *pos
            }
            FieldSpec::Name(name) => header
                .iter()
                .enumerate()
                .position(|(i, h)| !used[i] && h == name)
                .ok_or_else(|| {
                    Error::FieldSelection(format!("no (unused) field named {name:?} in header"))
                })?,
            FieldSpec::Sequence(_) => unreachable!("flatten yields leaves only"),
        };
        used[idx] = true;
        indices.push(idx);
    }
    Ok(indices)
}

/// Resolve a spec that must select exactly one column.
pub fn resolve_one(header: &Header, spec: &FieldSpec) -> Result<usize> {
    match resolve(header, spec)?.as_slice() {
        [idx] => Ok(*idx),
        other => Err(Error::FieldSelection(format!(
            "{spec} must select exactly one field, selected {}",
            other.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Header {
        Header::new(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn resolves_names_and_positions() {
        let h = header(&["foo", "bar", "baz"]);
        assert_eq!(resolve(&h, &"bar".into()).unwrap(), vec![1]);
        assert_eq!(resolve(&h, &2usize.into()).unwrap(), vec![2]);
        let spec: FieldSpec = vec![FieldSpec::from("baz"), FieldSpec::from(0usize)].into();
        assert_eq!(resolve(&h, &spec).unwrap(), vec![2, 0]);
    }

    #[test]
    fn repeated_name_consumes_slots() {
        let h = header(&["a", "x", "a"]);
        assert_eq!(resolve(&h, &vec!["a", "a"].into()).unwrap(), vec![0, 2]);
        let err = resolve(&h, &vec!["a", "a", "a"].into()).unwrap_err();
        assert!(matches!(err, Error::FieldSelection(_)));
    }

    #[test]
    fn unknown_name_and_bad_position_fail() {
        let h = header(&["a"]);
        assert!(matches!(
            resolve(&h, &"b".into()),
            Err(Error::FieldSelection(_))
        ));
        assert!(matches!(
            resolve(&h, &1usize.into()),
            Err(Error::FieldSelection(_))
        ));
        assert!(matches!(
            resolve(&h, &vec![0usize, 0].into()),
            Err(Error::FieldSelection(_))
        ));
    }

    #[test]
    fn empty_header_never_resolves() {
        let h = Header::empty();
        assert!(matches!(
            resolve(&h, &"a".into()),
            Err(Error::FieldSelection(_))
        ));
        assert!(matches!(
            resolve_one(&h, &0usize.into()),
            Err(Error::FieldSelection(_))
        ));
    }

    #[test]
    fn resolve_one_rejects_compound() {
        let h = header(&["a", "b"]);
        assert!(resolve_one(&h, &vec!["a", "b"].into()).is_err());
        assert_eq!(resolve_one(&h, &"b".into()).unwrap(), 1);
    }
}
