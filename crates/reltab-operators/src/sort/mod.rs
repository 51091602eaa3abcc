//! External sort: bounded in-memory chunks, spilled sorted runs and a k-way
//! merge.
//!
//! Sorting is stable in both directions. With caching on, the sorted runs
//! survive between iterations and each new iteration only re-merges them.

mod merge;
mod run;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use reltab_core::config::{EngineConfig, SpillCodec};
use reltab_core::error::{Error, Result};
use reltab_core::key::{BoundKey, KeySpec};
use reltab_core::order::compare;
use reltab_core::{RowStream, Table, TableRef};
use reltab_mem::Storage;

use merge::{MergeIter, RowSource};
use run::{RunGenerator, SortedRuns};

/// Tuning for one sort.
#[derive(Debug, Clone)]
pub struct SortOptions {
    pub reverse: bool,
    pub buffer_rows: usize,
    pub buffer_bytes: Option<usize>,
    pub temp_dir: Option<PathBuf>,
    pub cache: bool,
    pub codec: SpillCodec,
    pub fan_in: usize,
}

impl SortOptions {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            reverse: false,
            buffer_rows: cfg.buffer_rows,
            buffer_bytes: cfg.buffer_bytes,
            temp_dir: cfg.temp_dir.clone(),
            cache: cfg.sort_cache,
            codec: cfg.spill_codec,
            fan_in: cfg.merge_fan_in,
        }
    }
}

impl Default for SortOptions {
    fn default() -> Self {
        Self::from_config(EngineConfig::global())
    }
}

/// A table sorted by `key` (or by whole rows when no key is given).
pub struct Sort {
    source: TableRef,
    key: Option<KeySpec>,
    opts: SortOptions,
    storage: Option<Arc<dyn Storage>>,
    cached: Mutex<Option<Arc<SortedRuns>>>,
}

impl Sort {
    pub fn new(source: TableRef) -> Self {
        Self {
            source,
            key: None,
            opts: SortOptions::default(),
            storage: None,
            cached: Mutex::new(None),
        }
    }

    pub fn key(self, key: impl Into<KeySpec>) -> Self {
        self.key_opt(Some(key.into()))
    }

    pub fn key_opt(mut self, key: Option<KeySpec>) -> Self {
        self.key = key;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.opts.reverse = reverse;
        self
    }

    pub fn buffer_rows(mut self, rows: usize) -> Self {
        self.opts.buffer_rows = rows;
        self
    }

    pub fn buffer_bytes(mut self, bytes: Option<usize>) -> Self {
        self.opts.buffer_bytes = bytes;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.temp_dir = Some(dir.into());
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.opts.cache = cache;
        self
    }

    pub fn codec(mut self, codec: SpillCodec) -> Self {
        self.opts.codec = codec;
        self
    }

    pub fn fan_in(mut self, fan_in: usize) -> Self {
        self.opts.fan_in = fan_in;
        self
    }

    pub fn options(mut self, opts: SortOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Spill into `storage` instead of a private temp directory.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }

    /// Drop cached runs (and their spill segments) if nothing is reading them.
    pub fn clear_cache(&self) -> Result<()> {
        *self.lock_cache()? = None;
        Ok(())
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, Option<Arc<SortedRuns>>>> {
        self.cached
            .lock()
            .map_err(|_| Error::Spill("sort cache lock poisoned".into()))
    }

    fn build(&self) -> Result<SortedRuns> {
        let stream = self.source.open()?;
        let header = stream.header().clone();
        let key = BoundKey::bind_opt(self.key.as_ref(), &header)?;
        let span = tracing::debug_span!("sort", source = self.source.name(), cache = self.opts.cache);
        let _enter = span.enter();
        let mut gen = RunGenerator::new(key, &self.opts, self.storage.clone());
        for row in stream {
            gen.push(row?)?;
        }
        gen.finish(header)
    }
}

impl Table for Sort {
    fn open(&self) -> Result<RowStream> {
        if !self.opts.cache {
            return SortedRuns::stream(&Arc::new(self.build()?));
        }
        let runs = {
            let mut cached = self.lock_cache()?;
            match cached.as_ref() {
                Some(runs) => Arc::clone(runs),
                None => {
                    let runs = Arc::new(self.build()?);
                    *cached = Some(Arc::clone(&runs));
                    runs
                }
            }
        };
        SortedRuns::stream(&runs)
    }

    fn name(&self) -> &'static str {
        "sort"
    }
}

impl std::fmt::Debug for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sort")
            .field("source", &self.source.name())
            .field("key", &self.key)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

/// Sort `table` by `key` with the default options.
pub fn sort(table: TableRef, key: impl Into<KeySpec>) -> Sort {
    Sort::new(table).key(key)
}

/// `source` itself when the caller vouches for its order, otherwise a sort
/// of it by `key`.
pub(crate) fn sorted_input(
    source: &TableRef,
    key: Option<&KeySpec>,
    presorted: bool,
    opts: &SortOptions,
) -> TableRef {
    if presorted {
        return Arc::clone(source);
    }
    Sort::new(Arc::clone(source))
        .key_opt(key.cloned())
        .options(opts.clone())
        .into_ref()
}

/// Merge several tables, each sorted by `key`, into one sorted table.
///
/// The header is taken from the first table. Ties keep table order.
pub struct MergeSort {
    sources: Vec<TableRef>,
    key: Option<KeySpec>,
    presorted: bool,
    opts: SortOptions,
}

impl MergeSort {
    pub fn new(sources: Vec<TableRef>) -> Self {
        Self {
            sources,
            key: None,
            presorted: false,
            opts: SortOptions::default(),
        }
    }

    pub fn key(mut self, key: impl Into<KeySpec>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn presorted(mut self, presorted: bool) -> Self {
        self.presorted = presorted;
        self
    }

    pub fn options(mut self, opts: SortOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn into_ref(self) -> TableRef {
        Arc::new(self)
    }
}

impl Table for MergeSort {
    fn open(&self) -> Result<RowStream> {
        let mut header = None;
        let mut sources = Vec::with_capacity(self.sources.len());
        for table in &self.sources {
            let input = sorted_input(table, self.key.as_ref(), self.presorted, &self.opts);
            let stream = input.open()?;
            let key = BoundKey::bind_opt(self.key.as_ref(), stream.header())?;
            header.get_or_insert_with(|| stream.header().clone());
            let source: RowSource = Box::new(stream);
            sources.push((source, key));
        }
        let header = header.unwrap_or_default();
        Ok(RowStream::new(header, MergeIter::new(sources, self.opts.reverse)))
    }

    fn name(&self) -> &'static str {
        "merge_sort"
    }
}

/// Merge presorted-or-not tables by `key`.
pub fn merge_sort(tables: Vec<TableRef>, key: Option<KeySpec>, presorted: bool) -> MergeSort {
    let merge = MergeSort::new(tables).presorted(presorted);
    match key {
        Some(key) => merge.key(key),
        None => merge,
    }
}

/// Whether one iteration of `table` is ordered by `key`.
///
/// `strict` also rejects equal neighbours.
pub fn is_sorted(table: &dyn Table, key: Option<&KeySpec>, reverse: bool, strict: bool) -> Result<bool> {
    let stream = table.open()?;
    let key = BoundKey::bind_opt(key, stream.header())?;
    let mut prev = None;
    for row in stream {
        let k = key.extract(&row?);
        if let Some(p) = prev.as_ref() {
            let ord = compare(p, &k);
            let ord = if reverse { ord.reverse() } else { ord };
            let bad = if strict { ord.is_ge() } else { ord.is_gt() };
            if bad {
                return Ok(false);
            }
        }
        prev = Some(k);
    }
    Ok(true)
}
