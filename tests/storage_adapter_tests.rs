//! Spill storage backends behind the sort's spill manager.

mod test_data_gen;

use std::io::Write;
use std::sync::Arc;

use reltab_core::row;
use reltab_io::{scoped_storage, FsStorage, MemoryStorage};
use reltab_mem::{Codec, SpillManager, Storage};
use test_data_gen::{create_temp_spill_dir, dir_is_empty};

fn write_and_read(storage: Arc<dyn Storage>) {
    let rows = vec![row![1, "a"], row![2, "b"], row![3, reltab_core::Value::Missing]];
    let mut mgr = SpillManager::new(storage, Codec::None);
    let meta = mgr.write_run(&rows).expect("write run");
    assert_eq!(meta.rows, 3);
    let back: Vec<_> = mgr
        .read_run(&meta)
        .expect("open run")
        .collect::<Result<_, _>>()
        .expect("read run");
    assert_eq!(back, rows);
}

#[test]
fn fs_storage_round_trips_segments() {
    let dir = create_temp_spill_dir();
    write_and_read(Arc::new(FsStorage::new(dir.path())));
    // The manager removed its segments when dropped.
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn memory_storage_round_trips_segments() {
    let storage = MemoryStorage::new();
    write_and_read(Arc::new(storage.clone()));
    assert!(storage.is_empty());
}

#[test]
fn scoped_storage_removes_its_directory() {
    let parent = create_temp_spill_dir();
    let storage = scoped_storage(Some(parent.path())).expect("scoped storage");
    let mut w = storage.create("probe").expect("create");
    w.write_all(b"spill").expect("write");
    drop(w);
    assert_eq!(storage.size("probe").expect("size"), 5);
    assert!(!dir_is_empty(parent.path()));

    drop(storage);
    assert!(dir_is_empty(parent.path()));
}

#[test]
fn missing_segment_is_a_storage_error() {
    let dir = create_temp_spill_dir();
    let storage = FsStorage::new(dir.path());
    assert!(storage.open("nope").is_err());
    assert!(storage.delete("nope").is_ok());
}

#[test]
fn corrupted_segment_fails_to_read() {
    let storage = MemoryStorage::new();
    let mut mgr = SpillManager::new(Arc::new(storage.clone()), Codec::None);
    let rows: Vec<_> = (0..20).map(|i| row![i, "payload"]).collect();
    let meta = mgr.write_run(&rows).expect("write run");
    assert_eq!(mgr.list_segments(), vec![meta.name.clone()]);
    assert_eq!(mgr.get_segment(&meta.name).map(|m| m.rows), Some(20));

    let mut bytes = storage.bytes(&meta.name.0).expect("segment bytes");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    storage.overwrite(&meta.name.0, bytes).expect("overwrite");

    let read: Result<Vec<_>, _> = mgr.read_run(&meta).and_then(|r| r.collect());
    assert!(read.is_err());

    mgr.delete_segment(&meta.name).expect("delete");
    assert!(mgr.list_segments().is_empty());
    assert!(storage.is_empty());
}
