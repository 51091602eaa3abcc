//! Storage adapters implementing `reltab_mem::spill::Storage`.
//!
//! - `fs`: local filesystem, normally scoped to a private temp directory.
//! - `memory`: in-process HashMap, for tests.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use std::path::Path;
use std::sync::Arc;

use reltab_mem::error::Result as MemResult;
use reltab_mem::Storage;

/// Spill storage for one sort: a fresh directory under `temp_dir` (or the
/// platform temp dir), removed when the last handle is dropped.
pub fn scoped_storage(temp_dir: Option<&Path>) -> MemResult<Arc<dyn Storage>> {
    Ok(Arc::new(FsStorage::scoped_in(temp_dir)?))
}
