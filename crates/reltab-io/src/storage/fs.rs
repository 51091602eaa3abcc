use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use reltab_mem::error::{Error as MemError, Result as MemResult};
use reltab_mem::Storage;
use tempfile::TempDir;

/// Local filesystem storage rooted at one directory.
///
/// A scoped instance owns a fresh temp directory and removes it, with every
/// file still inside, when dropped.
#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
    scratch: Option<TempDir>,
}

impl FsStorage {
    /// Use an existing directory. Nothing is removed on drop.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scratch: None,
        }
    }

    /// Create a private temp directory inside `parent` (or the platform temp
    /// dir) that lives as long as this storage.
    pub fn scoped_in(parent: Option<&Path>) -> MemResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("reltab-sort-");
        let dir = match parent {
            Some(p) => {
                fs::create_dir_all(p).map_err(|e| MemError::Storage(format!("mkdir {}: {e}", p.display())))?;
                builder.tempdir_in(p)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| MemError::Storage(format!("tempdir: {e}")))?;
        tracing::trace!(dir = %dir.path().display(), "created spill directory");
        Ok(Self {
            root: dir.path().to_path_buf(),
            scratch: Some(dir),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_scoped(&self) -> bool {
        self.scratch.is_some()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Storage for FsStorage {
    fn create(&self, path: &str) -> MemResult<Box<dyn Write + Send>> {
        let p = self.resolve(path);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).map_err(|e| MemError::Storage(format!("mkparent: {e}")))?;
        }
        let f = File::create(&p).map_err(|e| MemError::Storage(format!("create {}: {e}", p.display())))?;
        Ok(Box::new(f))
    }

    fn open(&self, path: &str) -> MemResult<Box<dyn Read + Send>> {
        let p = self.resolve(path);
        let f = File::open(&p).map_err(|e| MemError::Storage(format!("open {}: {e}", p.display())))?;
        Ok(Box::new(f))
    }

    fn delete(&self, path: &str) -> MemResult<()> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MemError::Storage(format!("delete: {e}"))),
        }
    }

    fn list(&self, prefix: &str) -> MemResult<Vec<String>> {
        fn visit(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    visit(root, &path, out)?;
                } else if let Ok(rel) = path.strip_prefix(root) {
                    if let Some(s) = rel.to_str() {
                        out.push(s.to_string());
                    }
                }
            }
            Ok(())
        }

        let mut results = Vec::new();
        if !self.root.exists() {
            return Ok(results);
        }
        visit(&self.root, &self.root, &mut results)
            .map_err(|e| MemError::Storage(format!("list: {e}")))?;
        results.retain(|p| p.starts_with(prefix));
        results.sort();
        Ok(results)
    }

    fn size(&self, path: &str) -> MemResult<u64> {
        let meta = fs::metadata(self.resolve(path)).map_err(|e| MemError::Storage(format!("size: {e}")))?;
        Ok(meta.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_directory_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let root = {
            let storage = FsStorage::scoped_in(Some(parent.path())).unwrap();
            let mut w = storage.create("a/b.seg").unwrap();
            w.write_all(b"hello").unwrap();
            drop(w);
            assert_eq!(storage.size("a/b.seg").unwrap(), 5);
            assert_eq!(storage.list("a").unwrap(), vec![format!("a{}b.seg", std::path::MAIN_SEPARATOR)]);
            storage.root().to_path_buf()
        };
        assert!(!root.exists());
        assert!(parent.path().exists());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        storage.create("x").unwrap().write_all(b"1").unwrap();
        storage.delete("x").unwrap();
        storage.delete("x").unwrap();
        assert!(storage.list("").unwrap().is_empty());
        assert!(!storage.is_scoped());
    }

    #[test]
    fn read_back_what_was_written() {
        let storage = FsStorage::scoped_in(None).unwrap();
        storage.create("seg").unwrap().write_all(b"payload").unwrap();
        let mut buf = String::new();
        storage.open("seg").unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "payload");
    }
}
