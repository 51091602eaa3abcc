//! Table builders shared by the integration tests.
#![allow(dead_code)]

use std::path::Path;

use reltab_core::{Header, MemTable, Row, TableRef, Value};

/// Deterministic xorshift generator so a failing case reproduces.
pub struct KeyGen(u64);

impl KeyGen {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_below(&mut self, n: u64) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x % n
    }
}

pub fn table(header: &[&str], rows: Vec<Row>) -> TableRef {
    MemTable::new(Header::from_iter(header.iter().copied()), rows).into_ref()
}

/// `rows` rows of `(key, seq)` where `key` repeats across at most
/// `distinct_keys` values and `seq` is the input position.
pub fn generate_keyed_table(rows: usize, distinct_keys: u64, seed: u64) -> TableRef {
    let mut gen = KeyGen::new(seed);
    let data = (0..rows)
        .map(|i| vec![Value::Int(gen.next_below(distinct_keys) as i64), Value::Int(i as i64)])
        .collect();
    table(&["key", "seq"], data)
}

pub fn create_temp_spill_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("reltab-tests-")
        .tempdir()
        .expect("temp dir")
}

pub fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

/// Keys never decrease and equal keys keep their input order.
pub fn assert_stably_sorted(rows: &[Row]) {
    for pair in rows.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let (ka, kb) = (a[0].as_i64().unwrap(), b[0].as_i64().unwrap());
        assert!(ka <= kb, "keys out of order: {a:?} before {b:?}");
        if ka == kb {
            assert!(a[1].as_i64() < b[1].as_i64(), "tie order lost: {a:?} before {b:?}");
        }
    }
}
