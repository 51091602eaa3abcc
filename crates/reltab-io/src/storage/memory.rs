//! In-memory storage backend.
//!
//! A HashMap-backed `Storage` for tests and for sorts that must not touch disk.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use reltab_mem::error::{Error as MemError, Result as MemResult};
use reltab_mem::Storage;

type Files = Arc<Mutex<HashMap<String, Vec<u8>>>>;

fn lock(files: &Files) -> MemResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
    files
        .lock()
        .map_err(|_| MemError::Storage("memory storage lock poisoned".into()))
}

/// Thread-safe in-memory storage. Clones share the same files.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    files: Files,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.files).map(|f| f.contains_key(path)).unwrap_or(false)
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        lock(&self.files).map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace a stored file's bytes (used by tests to simulate corruption).
    pub fn overwrite(&self, path: &str, bytes: Vec<u8>) -> MemResult<()> {
        lock(&self.files)?.insert(path.to_string(), bytes);
        Ok(())
    }

    pub fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.files).ok()?.get(path).cloned()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage").field("files", &self.len()).finish()
    }
}

/// Appends straight into the shared map; there is nothing to commit.
struct MemoryWriter {
    path: String,
    files: Files,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut files = self
            .files
            .lock()
            .map_err(|_| std::io::Error::other("memory storage lock poisoned"))?;
        files.entry(self.path.clone()).or_default().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn create(&self, path: &str) -> MemResult<Box<dyn Write + Send>> {
        lock(&self.files)?.insert(path.to_string(), Vec::new());
        Ok(Box::new(MemoryWriter {
            path: path.to_string(),
            files: Arc::clone(&self.files),
        }))
    }

    fn open(&self, path: &str) -> MemResult<Box<dyn Read + Send>> {
        let bytes = lock(&self.files)?
            .get(path)
            .cloned()
            .ok_or_else(|| MemError::Storage(format!("path not found: {path}")))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        lock(&self.files)?.remove(path);
        Ok(())
    }

    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        let mut result: Vec<String> = lock(&self.files)?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        result.sort();
        Ok(result)
    }

    fn size(&self, path: &str) -> MemResult<u64> {
        lock(&self.files)?
            .get(path)
            .map(|b| b.len() as u64)
            .ok_or_else(|| MemError::Storage(format!("path not found: {path}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_visible_to_readers() {
        let storage = MemoryStorage::new();
        let mut w = storage.create("dir/one").unwrap();
        w.write_all(b"hello ").unwrap();
        w.write_all(b"world").unwrap();

        let mut s = String::new();
        storage.open("dir/one").unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "hello world");
        assert_eq!(storage.size("dir/one").unwrap(), 11);
    }

    #[test]
    fn list_filters_by_prefix() {
        let storage = MemoryStorage::new();
        storage.create("dir/file1").unwrap();
        storage.create("dir/file2").unwrap();
        storage.create("other/file3").unwrap();

        assert_eq!(storage.list("dir/").unwrap(), vec!["dir/file1", "dir/file2"]);
        storage.delete("dir/file1").unwrap();
        assert!(!storage.contains("dir/file1"));
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn missing_path_is_an_error() {
        let storage = MemoryStorage::new();
        assert!(storage.open("nope").is_err());
        assert!(storage.size("nope").is_err());
    }
}
