//! Sort-merge set algebra over whole rows.
//!
//! Field names are ignored unless the record variants are used, which first
//! line `b`'s columns up with `a`'s header by name. Rows compare with the
//! ordering engine, so no mix of value types can stop a merge.
//!
//! Counts follow multiset rules: each row of `b` cancels one equal row of `a`
//! in a complement, and an intersection keeps as many copies as the side with
//! fewer of them. A strict complement removes every row of `a` that occurs in
//! `b` at all.

use std::cmp::Ordering;
use std::sync::Arc;

use reltab_core::config::EngineConfig;
use reltab_core::error::Result;
use reltab_core::field::resolve_one;
use reltab_core::order::compare_rows;
use reltab_core::{Header, Row, RowStream, Table, TableRef, Value};

use crate::fields::pad;
use crate::sort::{sorted_input, SortOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    Complement { strict: bool },
    Intersection,
}

#[derive(Clone)]
struct Pair {
    a: TableRef,
    b: TableRef,
    presorted: bool,
    sort: SortOptions,
    by_name: bool,
}

impl Pair {
    fn new(a: TableRef, b: TableRef) -> Self {
        Self {
            a,
            b,
            presorted: false,
            sort: SortOptions::default(),
            by_name: false,
        }
    }

    fn open(&self, walk: Walk) -> Result<RowStream> {
        let a = sorted_input(&self.a, None, self.presorted, &self.sort).open()?;
        let header = a.header().clone();
        let b_source = if self.by_name {
            AlignTo::new(Arc::clone(&self.b), header.clone()).into_ref()
        } else {
            Arc::clone(&self.b)
        };
        let b = sorted_input(&b_source, None, self.presorted, &self.sort).open()?;
        Ok(RowStream::new(header, MergeWalk::new(a, b, walk)))
    }
}

/// Two sorted cursors advanced in lock step.
struct MergeWalk {
    a: RowStream,
    b: RowStream,
    a_cur: Option<Row>,
    b_cur: Option<Row>,
    primed: bool,
    walk: Walk,
}

impl MergeWalk {
    fn new(a: RowStream, b: RowStream, walk: Walk) -> Self {
        Self {
            a,
            b,
            a_cur: None,
            b_cur: None,
            primed: false,
            walk,
        }
    }

    fn step_a(&mut self) -> Result<()> {
        self.a_cur = self.a.next().transpose()?;
        Ok(())
    }

    fn step_b(&mut self) -> Result<()> {
        self.b_cur = self.b.next().transpose()?;
        Ok(())
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if !self.primed {
            self.primed = true;
            self.step_a()?;
            self.step_b()?;
        }
        loop {
            let Some(a) = self.a_cur.as_ref() else {
                return Ok(None);
            };
            let Some(b) = self.b_cur.as_ref() else {
                if self.walk == Walk::Intersection {
                    return Ok(None);
                }
                let out = self.a_cur.take();
                self.step_a()?;
                return Ok(out);
            };
            match (compare_rows(a, b), self.walk) {
                (Ordering::Less, Walk::Complement { .. }) => {
                    let out = self.a_cur.take();
                    self.step_a()?;
                    return Ok(out);
                }
                (Ordering::Less, Walk::Intersection) => self.step_a()?,
                (Ordering::Greater, _) => self.step_b()?,
                (Ordering::Equal, Walk::Complement { strict: true }) => self.step_a()?,
                (Ordering::Equal, Walk::Complement { strict: false }) => {
                    self.step_a()?;
                    self.step_b()?;
                }
                (Ordering::Equal, Walk::Intersection) => {
                    let out = self.a_cur.take();
                    self.step_a()?;
                    self.step_b()?;
                    return Ok(out);
                }
            }
        }
    }
}

impl Iterator for MergeWalk {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// `b` projected onto the field names of `header`, in that order.
struct AlignTo {
    source: TableRef,
    header: Header,
    missing: Value,
}

impl AlignTo {
    fn new(source: TableRef, header: Header) -> Self {
        Self {
            source,
            header,
            missing: EngineConfig::global().missing.clone(),
        }
    }

    fn into_ref(self) -> TableRef {
        Arc::new(self)
    }
}

impl Table for AlignTo {
    fn open(&self) -> Result<RowStream> {
        let stream = self.source.open()?;
        let indices = self
            .header
            .iter()
            .map(|name| resolve_one(stream.header(), &name.as_str().into()))
            .collect::<Result<Vec<_>>>()?;
        let missing = self.missing.clone();
        let width = stream.header().len();
        let rows = stream.map(move |row| -> Result<Row> {
            let row = pad(row?, width, &missing);
            Ok(indices.iter().map(|&i| row[i].clone()).collect())
        });
        Ok(RowStream::new(self.header.clone(), rows))
    }

    fn name(&self) -> &'static str {
        "align"
    }
}

macro_rules! pair_builder {
    ($t:ty) => {
        impl $t {
            /// Skip sorting; both inputs are already in whole-row order.
            pub fn presorted(mut self, presorted: bool) -> Self {
                self.pair.presorted = presorted;
                self
            }

            pub fn sort_options(mut self, opts: SortOptions) -> Self {
                self.pair.sort = opts;
                self
            }

            /// Compare `b`'s fields by name against `a`'s header.
            pub fn by_name(mut self, by_name: bool) -> Self {
                self.pair.by_name = by_name;
                self
            }

            pub fn into_ref(self) -> TableRef {
                Arc::new(self)
            }
        }
    };
}

/// Rows of `a` not found in `b`.
#[derive(Clone)]
pub struct Complement {
    pair: Pair,
    strict: bool,
}

impl Complement {
    pub fn new(a: TableRef, b: TableRef) -> Self {
        Self {
            pair: Pair::new(a, b),
            strict: false,
        }
    }

    /// Set semantics: any match in `b` removes all equal rows of `a`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

pair_builder!(Complement);

impl Table for Complement {
    fn open(&self) -> Result<RowStream> {
        self.pair.open(Walk::Complement {
            strict: self.strict,
        })
    }

    fn name(&self) -> &'static str {
        "complement"
    }
}

/// Rows found in both `a` and `b`.
#[derive(Clone)]
pub struct Intersection {
    pair: Pair,
}

impl Intersection {
    pub fn new(a: TableRef, b: TableRef) -> Self {
        Self {
            pair: Pair::new(a, b),
        }
    }
}

pair_builder!(Intersection);

impl Table for Intersection {
    fn open(&self) -> Result<RowStream> {
        self.pair.open(Walk::Intersection)
    }

    fn name(&self) -> &'static str {
        "intersection"
    }
}

pub fn complement(a: TableRef, b: TableRef) -> Complement {
    Complement::new(a, b)
}

pub fn intersection(a: TableRef, b: TableRef) -> Intersection {
    Intersection::new(a, b)
}

/// `(added, subtracted)` going from `a` to `b`.
pub fn diff(a: TableRef, b: TableRef) -> (Complement, Complement) {
    (Complement::new(Arc::clone(&b), Arc::clone(&a)), Complement::new(a, b))
}

/// Complement after aligning `b`'s fields to `a`'s header by name.
pub fn record_complement(a: TableRef, b: TableRef) -> Complement {
    Complement::new(a, b).by_name(true)
}

/// Like [`diff`] but comparing fields by name.
pub fn record_diff(a: TableRef, b: TableRef) -> (Complement, Complement) {
    (
        record_complement(Arc::clone(&b), Arc::clone(&a)),
        record_complement(a, b),
    )
}
