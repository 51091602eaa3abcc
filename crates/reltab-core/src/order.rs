//! Total ordering over heterogeneous values.
//!
//! Rules, in precedence order:
//! 1. `Missing` sorts before every other value.
//! 2. Numbers (bool, int, float) sort before every non-numeric value and
//!    compare numerically with each other. NaN sorts after every other number
//!    and equals itself.
//! 3. Bytes sort before text.
//! 4. Lists compare element-wise with these same rules, shorter prefix first.
//! 5. Any other pair of distinct kinds falls back to comparing type names.
//!
//! The order never fails, whatever mix of values it is given.

use std::cmp::Ordering;

use crate::value::{Number, Value};

/// Compare two values under the engine-wide total order.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Missing, Value::Missing) => return Ordering::Equal,
        (Value::Missing, _) => return Ordering::Less,
        (_, Value::Missing) => return Ordering::Greater,
        _ => {}
    }

    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => return compare_numbers(x, y),
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
        (None, None) => {}
    }

    match (a, b) {
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::List(x), Value::List(y)) => compare_rows(x, y),
        (Value::Error(x), Value::Error(y)) => x.cmp(y),
        (Value::Bytes(_), Value::Text(_)) => Ordering::Less,
        (Value::Text(_), Value::Bytes(_)) => Ordering::Greater,
        _ => a.type_name().cmp(b.type_name()),
    }
}

/// `a < b` under [`compare`].
pub fn less_than(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Less
}

/// Native equality: numbers are equal across int/float/bool, everything
/// else only within its own kind.
pub fn equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Equal
}

/// Element-wise comparison of two rows (or any value sequences).
pub fn compare_rows(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match compare(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn compare_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        (Number::Float(x), Number::Float(y)) => compare_floats(x, y),
        (Number::Int(x), Number::Float(y)) => compare_int_float(x, y),
        (Number::Float(x), Number::Int(y)) => compare_int_float(y, x).reverse(),
    }
}

fn compare_floats(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        // Neither is NaN, so partial_cmp is total here (and -0.0 == 0.0).
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

/// Exact comparison of an integer with a float, without rounding the integer.
fn compare_int_float(i: i64, f: f64) -> Ordering {
    // 2^63 is exactly representable; every i64 is below it.
    const TWO_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() || f >= TWO_63 {
        return Ordering::Less;
    }
    if f < -TWO_63 {
        return Ordering::Greater;
    }
    let t = f.trunc();
    // |t| < 2^63 here, so the cast is exact.
    match i.cmp(&(t as i64)) {
        Ordering::Equal => {
            if f > t {
                Ordering::Less
            } else if f < t {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

/// A value wrapped so it participates in `Ord`-based containers.
#[derive(Debug, Clone, Default)]
pub struct Comparable(pub Value);

impl Comparable {
    pub fn into_inner(self) -> Value {
        self.0
    }
}

impl From<Value> for Comparable {
    fn from(v: Value) -> Self {
        Comparable(v)
    }
}

impl PartialEq for Comparable {
    fn eq(&self, other: &Self) -> bool {
        equal(&self.0, &other.0)
    }
}

impl Eq for Comparable {}

impl PartialOrd for Comparable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Comparable {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    #[test]
    fn missing_sorts_first() {
        assert!(less_than(&Value::Missing, &Value::Int(i64::MIN)));
        assert!(less_than(&Value::Missing, &text("")));
        assert!(!less_than(&Value::Missing, &Value::Missing));
    }

    #[test]
    fn numbers_before_non_numbers() {
        assert!(less_than(&Value::Float(1e300), &text("a")));
        assert!(less_than(&Value::Int(5), &Value::Bytes(vec![])));
        assert!(less_than(&Value::Bool(true), &Value::List(vec![])));
        assert!(!less_than(&text("a"), &Value::Int(0)));
    }

    #[test]
    fn bytes_before_text() {
        assert!(less_than(&Value::Bytes(b"zzz".to_vec()), &text("aaa")));
        assert!(!less_than(&text("aaa"), &Value::Bytes(b"zzz".to_vec())));
    }

    #[test]
    fn mixed_numbers_compare_exactly() {
        assert_eq!(compare(&Value::Int(2), &Value::Float(2.5)), Ordering::Less);
        assert_eq!(compare(&Value::Float(-0.5), &Value::Int(0)), Ordering::Less);
        assert_eq!(compare(&Value::Int(3), &Value::Float(3.0)), Ordering::Equal);
        assert_eq!(
            compare(&Value::Int(i64::MAX), &Value::Float(9.3e18)),
            Ordering::Less
        );
        assert_eq!(
            compare(&Value::Int(i64::MAX - 1), &Value::Int(i64::MAX)),
            Ordering::Less
        );
    }

    #[test]
    fn nan_is_greatest_number_and_self_equal() {
        let nan = Value::Float(f64::NAN);
        assert!(less_than(&Value::Float(f64::INFINITY), &nan));
        assert!(less_than(&Value::Int(i64::MAX), &nan));
        assert!(less_than(&nan, &text("")));
        assert!(equal(&nan, &nan));
    }

    #[test]
    fn lists_compare_elementwise() {
        let a = Value::List(row![1, "b"]);
        let b = Value::List(row![1, "c"]);
        let c = Value::List(row![1]);
        assert!(less_than(&a, &b));
        assert!(less_than(&c, &a));
        assert!(less_than(&Value::List(row![Value::Missing, 9]), &a));
    }

    #[test]
    fn fallback_uses_type_names() {
        // "error" < "list" < "text"
        let err = Value::Error("boom".into());
        let list = Value::List(vec![]);
        assert!(less_than(&err, &list));
        assert!(less_than(&list, &text("a")));
        assert!(less_than(&Value::Bytes(vec![]), &err));
    }

    #[test]
    fn comparable_in_btree() {
        let mut set = std::collections::BTreeSet::new();
        set.insert(Comparable(Value::Int(1)));
        set.insert(Comparable(Value::Float(1.0)));
        set.insert(Comparable(text("x")));
        set.insert(Comparable(Value::Missing));
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().next().map(|c| c.0.is_missing()), Some(true));
    }

    proptest::proptest! {
        #[test]
        fn ints_and_floats_share_one_number_line(a in -1000i64..1000, b in -1000i64..1000) {
            proptest::prop_assert_eq!(compare(&Value::Int(a), &Value::Float(b as f64)), a.cmp(&b));
            proptest::prop_assert_eq!(compare(&Value::Float(a as f64), &Value::Int(b)), a.cmp(&b));
        }

        #[test]
        fn numbers_sort_before_text(n in proptest::num::f64::NORMAL, s in "[a-z]{0,4}") {
            proptest::prop_assert!(less_than(&Value::Float(n), &Value::Text(s)));
        }
    }
}
