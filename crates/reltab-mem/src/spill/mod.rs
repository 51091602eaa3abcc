//! Spill manager for the external sort.
//!
//! Rows are streamed into segments one frame at a time and read back the same
//! way, so neither side ever holds a whole run in memory.

pub mod codec;
pub mod segment;

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use reltab_core::Row;

use crate::error::{Error, Result};

pub use codec::{Codec, DecodeReader, EncodeWriter};
pub use segment::{SegmentHeader, SegmentMeta, SegmentName, HEADER_LEN, MAX_FRAME_LEN};

/// Abstract storage for spill segments.
///
/// Paths are relative to whatever root the backend was scoped to.
/// Implemented by `reltab-io` (`FsStorage`, `MemoryStorage`).
pub trait Storage: Send + Sync {
    /// Create (or truncate) a path and return a writer for it.
    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>>;

    /// Open a path for sequential reading.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Delete a path. Idempotent.
    fn delete(&self, path: &str) -> Result<()>;

    /// List paths starting with `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn size(&self, path: &str) -> Result<u64>;
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(0);

/// Owns every segment written through it; dropping the manager deletes them.
pub struct SpillManager {
    storage: Arc<dyn Storage>,
    codec: Codec,
    session: u64,
    next_run: AtomicU32,
    segments: BTreeMap<SegmentName, SegmentMeta>,
    unsealed: BTreeSet<SegmentName>,
}

impl SpillManager {
    pub fn new(storage: Arc<dyn Storage>, codec: Codec) -> Self {
        Self {
            storage,
            codec,
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            next_run: AtomicU32::new(0),
            segments: BTreeMap::new(),
            unsealed: BTreeSet::new(),
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Start a new segment. Rows are appended with [`RunWriter::push`] and the
    /// segment becomes readable once passed to [`SpillManager::seal`].
    pub fn begin_run(&mut self) -> Result<RunWriter> {
        let name = SegmentName::new(self.session, self.next_run.fetch_add(1, Ordering::Relaxed));
        let mut raw = BufWriter::new(self.storage.create(&name.0)?);
        self.unsealed.insert(name.clone());
        raw.write_all(&SegmentHeader::new(self.codec).to_bytes())
            .map_err(|e| Error::Storage(format!("write header: {e}")))?;
        Ok(RunWriter {
            name,
            codec: self.codec,
            out: EncodeWriter::new(self.codec, raw)?,
            hasher: blake3::Hasher::new(),
            scratch: Vec::new(),
            rows: 0,
            payload_len: 0,
        })
    }

    pub fn seal(&mut self, run: RunWriter) -> Result<SegmentMeta> {
        let RunWriter {
            name,
            codec,
            out,
            hasher,
            rows,
            payload_len,
            ..
        } = run;
        let mut raw = out.finish()?;
        raw.flush()
            .map_err(|e| Error::Storage(format!("flush {}: {e}", name.0)))?;
        drop(raw);

        let meta = SegmentMeta {
            name: name.clone(),
            codec,
            rows,
            payload_len,
            checksum: hasher.finalize().into(),
        };
        tracing::debug!(
            segment = %name.0,
            rows,
            payload_len,
            stored_len = self.storage.size(&name.0).ok(),
            "sealed spill segment"
        );
        self.unsealed.remove(&name);
        self.segments.insert(name, meta.clone());
        Ok(meta)
    }

    /// Write every row into one sealed segment.
    pub fn write_run<'a, I>(&mut self, rows: I) -> Result<SegmentMeta>
    where
        I: IntoIterator<Item = &'a Row>,
    {
        let mut run = self.begin_run()?;
        for row in rows {
            run.push(row)?;
        }
        self.seal(run)
    }

    /// Stream a sealed segment back. The checksum is verified after the last row.
    pub fn read_run(&self, meta: &SegmentMeta) -> Result<SegmentReader> {
        if !self.segments.contains_key(&meta.name) {
            return Err(Error::UnknownSegment(meta.name.0.clone()));
        }
        let mut raw = self.storage.open(&meta.name.0)?;
        let mut head = [0u8; HEADER_LEN];
        raw.read_exact(&mut head).map_err(|e| Error::Corrupt {
            name: meta.name.0.clone(),
            reason: format!("short header: {e}"),
        })?;
        let header = SegmentHeader::from_bytes(&meta.name, &head)?;
        if header.codec != meta.codec {
            return Err(Error::Corrupt {
                name: meta.name.0.clone(),
                reason: format!("codec {:?} does not match {:?}", header.codec, meta.codec),
            });
        }
        tracing::trace!(segment = %meta.name.0, rows = meta.rows, "reading spill segment");
        Ok(SegmentReader {
            name: meta.name.clone(),
            input: DecodeReader::new(header.codec, raw)?,
            remaining: meta.rows,
            expected: meta.checksum,
            hasher: blake3::Hasher::new(),
            buf: Vec::new(),
            done: false,
        })
    }

    pub fn get_segment(&self, name: &SegmentName) -> Option<&SegmentMeta> {
        self.segments.get(name)
    }

    pub fn delete_segment(&mut self, name: &SegmentName) -> Result<()> {
        if self.segments.remove(name).is_some() || self.unsealed.remove(name) {
            self.storage.delete(&name.0)?;
        }
        Ok(())
    }

    pub fn list_segments(&self) -> Vec<SegmentName> {
        self.segments.keys().cloned().collect()
    }
}

impl Drop for SpillManager {
    fn drop(&mut self) {
        let names = self.segments.keys().chain(self.unsealed.iter());
        for name in names {
            if let Err(e) = self.storage.delete(&name.0) {
                tracing::warn!(segment = %name.0, error = %e, "failed to remove spill segment");
            }
        }
    }
}

impl std::fmt::Debug for SpillManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillManager")
            .field("codec", &self.codec)
            .field("session", &self.session)
            .field("segments", &self.segments.len())
            .finish()
    }
}

/// An open, unsealed segment.
pub struct RunWriter {
    name: SegmentName,
    codec: Codec,
    out: EncodeWriter<BufWriter<Box<dyn Write + Send>>>,
    hasher: blake3::Hasher,
    scratch: Vec<u8>,
    rows: u64,
    payload_len: u64,
}

impl RunWriter {
    pub fn push(&mut self, row: &Row) -> Result<()> {
        self.scratch.clear();
        self.scratch = postcard::to_extend(row, std::mem::take(&mut self.scratch))?;
        let len = u32::try_from(self.scratch.len())
            .ok()
            .filter(|l| *l <= MAX_FRAME_LEN)
            .ok_or_else(|| Error::Encode(format!("row of {} bytes is too large", self.scratch.len())))?;
        let len_bytes = len.to_le_bytes();
        self.hasher.update(&len_bytes);
        self.hasher.update(&self.scratch);
        self.out
            .write_all(&len_bytes)
            .and_then(|_| self.out.write_all(&self.scratch))
            .map_err(|e| Error::Storage(format!("write {}: {e}", self.name.0)))?;
        self.rows += 1;
        self.payload_len += 4 + u64::from(len);
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

/// Iterator over the rows of one sealed segment.
pub struct SegmentReader {
    name: SegmentName,
    input: DecodeReader<Box<dyn Read + Send>>,
    remaining: u64,
    expected: [u8; 32],
    hasher: blake3::Hasher,
    buf: Vec<u8>,
    done: bool,
}

impl SegmentReader {
    fn corrupt(&self, reason: String) -> Error {
        Error::Corrupt {
            name: self.name.0.clone(),
            reason,
        }
    }

    fn read_frame(&mut self) -> Result<Row> {
        let mut len_bytes = [0u8; 4];
        self.input.read_exact(&mut len_bytes).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                self.corrupt("truncated before last row".into())
            } else {
                Error::Storage(format!("read {}: {e}", self.name.0))
            }
        })?;
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FRAME_LEN {
            return Err(self.corrupt(format!("frame length {len} out of range")));
        }
        self.buf.resize(len as usize, 0);
        self.input
            .read_exact(&mut self.buf)
            .map_err(|e| Error::Storage(format!("read {}: {e}", self.name.0)))?;
        self.hasher.update(&len_bytes);
        self.hasher.update(&self.buf);
        Ok(postcard::from_bytes(&self.buf)?)
    }
}

impl Iterator for SegmentReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.remaining == 0 {
            self.done = true;
            let actual: [u8; 32] = self.hasher.finalize().into();
            if actual != self.expected {
                return Some(Err(Error::ChecksumMismatch(self.name.0.clone())));
            }
            return None;
        }
        match self.read_frame() {
            Ok(row) => {
                self.remaining -= 1;
                Some(Ok(row))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
