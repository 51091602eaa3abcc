//! External sort: spilling, multi-pass merging, caching and temp cleanup.

mod test_data_gen;

use std::sync::Arc;

use proptest::prelude::*;
use reltab_core::table::{data_rows, to_rows};
use reltab_core::{row, Table};
use reltab_io::MemoryStorage;
use reltab_operators::{sort, Sort};
use test_data_gen::{assert_stably_sorted, create_temp_spill_dir, dir_is_empty, generate_keyed_table, table};

#[test]
fn sorts_by_key_field() {
    let t = table(&["id", "v"], vec![row![2, "b"], row![1, "a"]]);
    assert_eq!(
        to_rows(&sort(t, "id")).unwrap(),
        vec![row!["id", "v"], row![1, "a"], row![2, "b"]]
    );
}

#[test]
fn spilled_sort_matches_in_memory_sort() {
    let t = generate_keyed_table(5_000, 40, 7);
    let dir = create_temp_spill_dir();

    let in_memory = data_rows(&sort(Arc::clone(&t), "key").buffer_rows(1_000_000)).unwrap();
    let spilled = data_rows(
        &sort(t, "key")
            .buffer_rows(97)
            .fan_in(4)
            .temp_dir(dir.path()),
    )
    .unwrap();

    assert_eq!(spilled.len(), 5_000);
    assert_stably_sorted(&spilled);
    assert_eq!(spilled, in_memory);
}

#[test]
fn byte_budget_forces_spilling() {
    let t = generate_keyed_table(2_000, 25, 11);
    let storage = MemoryStorage::new();
    let s = sort(t, "key")
        .buffer_rows(1_000_000)
        .buffer_bytes(Some(4 * 1024))
        .cache(true)
        .storage(Arc::new(storage.clone()));
    let rows = data_rows(&s).unwrap();
    assert_stably_sorted(&rows);
    assert!(!storage.is_empty(), "a 4 KiB budget should have spilled");
    drop(s);
    assert!(storage.is_empty());
}

#[test]
fn spill_files_live_only_as_long_as_the_stream() {
    let dir = create_temp_spill_dir();
    let s = sort(generate_keyed_table(1_000, 10, 3), "key")
        .buffer_rows(50)
        .cache(false)
        .temp_dir(dir.path());

    let mut stream = s.open().unwrap();
    assert!(stream.next().is_some());
    assert!(!dir_is_empty(dir.path()));

    // Abandoned half way.
    drop(stream);
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn cached_sort_keeps_runs_until_dropped() {
    let dir = create_temp_spill_dir();
    let s = sort(generate_keyed_table(1_000, 10, 5), "key")
        .buffer_rows(64)
        .cache(true)
        .temp_dir(dir.path());

    let first = to_rows(&s).unwrap();
    assert!(!dir_is_empty(dir.path()));
    assert_eq!(to_rows(&s).unwrap(), first);

    s.clear_cache().unwrap();
    assert!(dir_is_empty(dir.path()));
    assert_eq!(to_rows(&s).unwrap(), first);

    drop(s);
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn uncached_sort_is_reiterable() {
    let s = sort(generate_keyed_table(500, 7, 9), "key")
        .buffer_rows(30)
        .cache(false)
        .storage(Arc::new(MemoryStorage::new()));
    assert_eq!(to_rows(&s).unwrap(), to_rows(&s).unwrap());
}

#[test]
fn reverse_sort_is_stable() {
    let rows = data_rows(
        &sort(generate_keyed_table(600, 6, 13), "key")
            .reverse(true)
            .buffer_rows(40)
            .storage(Arc::new(MemoryStorage::new())),
    )
    .unwrap();
    for pair in rows.windows(2) {
        let (ka, kb) = (pair[0][0].as_i64().unwrap(), pair[1][0].as_i64().unwrap());
        assert!(ka >= kb);
        if ka == kb {
            assert!(pair[0][1].as_i64() < pair[1][1].as_i64());
        }
    }
}

#[cfg(feature = "zstd")]
#[test]
fn compressed_spill_round_trips() {
    use reltab_core::config::SpillCodec;

    let t = generate_keyed_table(1_500, 30, 17);
    let rows = data_rows(
        &Sort::new(t)
            .key("key")
            .buffer_rows(100)
            .codec(SpillCodec::Zstd)
            .storage(Arc::new(MemoryStorage::new())),
    )
    .unwrap();
    assert_stably_sorted(&rows);
}

proptest! {
    #[test]
    fn external_sort_is_a_stable_sort(
        keys in prop::collection::vec(0i64..6, 0..200),
        buffer in 1usize..16,
        fan_in in 2usize..5,
    ) {
        let data: Vec<_> = keys.iter().enumerate().map(|(i, k)| row![*k, i]).collect();
        let t = table(&["key", "seq"], data.clone());
        let got = data_rows(
            &Sort::new(t)
                .key("key")
                .buffer_rows(buffer)
                .fan_in(fan_in)
                .storage(Arc::new(MemoryStorage::new())),
        )
        .unwrap();

        let mut want = data;
        want.sort_by_key(|r| r[0].as_i64());
        prop_assert_eq!(got, want);
    }
}
