//! Segment file header and metadata.
//!
//! Layout on storage:
//! [ magic: u32 ][ version: u16 ][ codec: u8 ][ reserved: u8 ]
//! [ codec-encoded payload … ]
//!
//! The decoded payload is a sequence of frames, one per row:
//! [ len: u32 ][ postcard-encoded row: len bytes ]
//!
//! A blake3 checksum over the decoded payload is kept in [`SegmentMeta`] and
//! verified once a reader has consumed every row.

use serde::{Deserialize, Serialize};

use super::Codec;
use crate::error::{Error, Result};

pub const MAGIC: u32 = 0x5254_5347; // "RTSG"
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 1 + 1;

/// Frames larger than this are treated as corruption rather than allocated.
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub codec: Codec,
}

impl SegmentHeader {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4..6].copy_from_slice(&VERSION.to_le_bytes());
        out[6] = self.codec as u8;
        // out[7] reserved
        out
    }

    pub fn from_bytes(name: &SegmentName, bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if magic != MAGIC || version != VERSION {
            return Err(Error::Corrupt {
                name: name.0.clone(),
                reason: format!("bad magic/version {magic:#x}/{version}"),
            });
        }
        Ok(Self {
            codec: Codec::from_u8(bytes[6])?,
        })
    }
}

/// Storage-relative name of a segment, derived from its spill session and run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentName(pub String);

impl SegmentName {
    pub fn new(session: u64, run_index: u32) -> Self {
        SegmentName(format!("s{session}-run{run_index:06}.seg"))
    }
}

/// What the spill manager remembers about a sealed segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub name: SegmentName,
    pub codec: Codec,
    pub rows: u64,
    /// Decoded payload bytes (frames included).
    pub payload_len: u64,
    pub checksum: [u8; 32],
}
