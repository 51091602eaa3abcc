//! Static interval tree over a sorted array.
//!
//! Intervals are sorted by `(start, stop)`; the array is read as an implicit
//! balanced tree whose root is the middle element, and every node stores the
//! largest stop in its subtree so whole subtrees can be skipped.

use std::cmp::Ordering;

use reltab_core::order::compare;
use reltab_core::Value;

/// One stored interval and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval<T> {
    pub start: Value,
    pub stop: Value,
    pub payload: T,
}

/// What to search for.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Point(Value),
    Range(Value, Value),
}

fn lt(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Less
}

fn le(a: &Value, b: &Value) -> bool {
    compare(a, b) != Ordering::Greater
}

/// Whether the interval `[start, stop)` (or `[start, stop]` with
/// `include_stop`) overlaps `query`. Reversed intervals and reversed range
/// queries overlap nothing.
pub fn overlaps(start: &Value, stop: &Value, query: &Query, include_stop: bool) -> bool {
    if lt(stop, start) {
        return false;
    }
    match query {
        Query::Point(p) => le(start, p) && if include_stop { le(p, stop) } else { lt(p, stop) },
        Query::Range(qs, qe) => {
            if lt(qe, qs) {
                return false;
            }
            if include_stop {
                le(start, qe) && le(qs, stop)
            } else {
                lt(start, qe) && lt(qs, stop)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntervalTree<T> {
    items: Vec<Interval<T>>,
    max_stop: Vec<Value>,
    include_stop: bool,
}

impl<T> IntervalTree<T> {
    pub fn new(mut items: Vec<Interval<T>>, include_stop: bool) -> Self {
        // Stable, so equal intervals keep insertion order.
        items.sort_by(|a, b| compare(&a.start, &b.start).then_with(|| compare(&a.stop, &b.stop)));
        let mut max_stop = vec![Value::Missing; items.len()];
        fill_max(&items, &mut max_stop, 0, items.len());
        Self {
            items,
            max_stop,
            include_stop,
        }
    }

    pub fn from_triples(triples: impl IntoIterator<Item = (Value, Value, T)>, include_stop: bool) -> Self {
        let items = triples
            .into_iter()
            .map(|(start, stop, payload)| Interval {
                start,
                stop,
                payload,
            })
            .collect();
        Self::new(items, include_stop)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn include_stop(&self) -> bool {
        self.include_stop
    }

    /// All intervals in tree order.
    pub fn iter(&self) -> impl Iterator<Item = &Interval<T>> {
        self.items.iter()
    }

    /// Intervals overlapping `query`, in tree order.
    pub fn query(&self, query: &Query) -> Vec<&Interval<T>> {
        let mut out = Vec::new();
        if let Query::Range(qs, qe) = query {
            if lt(qe, qs) {
                return out;
            }
        }
        self.visit(query, 0, self.items.len(), &mut out);
        out
    }

    pub fn search(&self, start: &Value, stop: &Value) -> Vec<&Interval<T>> {
        self.query(&Query::Range(start.clone(), stop.clone()))
    }

    pub fn search_point(&self, point: &Value) -> Vec<&Interval<T>> {
        self.query(&Query::Point(point.clone()))
    }

    fn visit<'a>(&'a self, query: &Query, lo: usize, hi: usize, out: &mut Vec<&'a Interval<T>>) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let q_start = match query {
            Query::Point(p) => p,
            Query::Range(s, _) => s,
        };
        // Nothing below ends late enough.
        let reaches = if self.include_stop {
            le(q_start, &self.max_stop[mid])
        } else {
            lt(q_start, &self.max_stop[mid])
        };
        if !reaches {
            return;
        }
        self.visit(query, lo, mid, out);
        let node = &self.items[mid];
        let starts_in_time = match query {
            Query::Point(p) => le(&node.start, p),
            Query::Range(_, e) if self.include_stop => le(&node.start, e),
            Query::Range(_, e) => lt(&node.start, e),
        };
        if !starts_in_time {
            // Everything to the right starts no earlier.
            return;
        }
        if overlaps(&node.start, &node.stop, query, self.include_stop) {
            out.push(node);
        }
        self.visit(query, mid + 1, hi, out);
    }
}

fn fill_max<T>(items: &[Interval<T>], max_stop: &mut [Value], lo: usize, hi: usize) -> Option<Value> {
    if lo >= hi {
        return None;
    }
    let mid = lo + (hi - lo) / 2;
    let mut best = items[mid].stop.clone();
    for side in [fill_max(items, max_stop, lo, mid), fill_max(items, max_stop, mid + 1, hi)]
        .into_iter()
        .flatten()
    {
        if lt(&best, &side) {
            best = side;
        }
    }
    max_stop[mid] = best.clone();
    Some(best)
}
