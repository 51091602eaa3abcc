//! Streaming compression for spill segments (feature-gated).
//!
//! Only `None`, `Zstd` and `Lz4` exist. Asking for a codec whose feature was
//! not compiled in is an error at write time, never a silent fallback.

use std::io::{self, BufReader, Read, Write};

use reltab_core::config::SpillCodec;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Codec {
    #[default]
    None = 0,
    Zstd = 1,
    Lz4 = 2,
}

impl Codec {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Codec::None),
            1 => Ok(Codec::Zstd),
            2 => Ok(Codec::Lz4),
            _ => Err(Error::CodecUnsupported("unknown")),
        }
    }
}

impl From<SpillCodec> for Codec {
    fn from(c: SpillCodec) -> Self {
        match c {
            SpillCodec::None => Codec::None,
            SpillCodec::Zstd => Codec::Zstd,
            SpillCodec::Lz4 => Codec::Lz4,
        }
    }
}

/// Writer that compresses with the segment's codec. Must be `finish`ed.
pub enum EncodeWriter<W: Write> {
    Plain(W),
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
    #[cfg(feature = "lz4")]
    Lz4(lz4_flex::frame::FrameEncoder<W>),
}

impl<W: Write> EncodeWriter<W> {
    pub fn new(codec: Codec, inner: W) -> Result<Self> {
        match codec {
            Codec::None => Ok(EncodeWriter::Plain(inner)),
            Codec::Zstd => {
                #[cfg(feature = "zstd")]
                {
                    let lvl = 3;
                    zstd::stream::write::Encoder::new(inner, lvl)
                        .map(EncodeWriter::Zstd)
                        .map_err(|e| Error::Codec(format!("zstd: {e}")))
                }
                #[cfg(not(feature = "zstd"))]
                {
                    drop(inner);
                    Err(Error::CodecUnsupported("zstd"))
                }
            }
            Codec::Lz4 => {
                #[cfg(feature = "lz4")]
                {
                    Ok(EncodeWriter::Lz4(lz4_flex::frame::FrameEncoder::new(inner)))
                }
                #[cfg(not(feature = "lz4"))]
                {
                    drop(inner);
                    Err(Error::CodecUnsupported("lz4"))
                }
            }
        }
    }

    /// Flush codec trailers and hand back the inner writer.
    pub fn finish(self) -> Result<W> {
        match self {
            EncodeWriter::Plain(w) => Ok(w),
            #[cfg(feature = "zstd")]
            EncodeWriter::Zstd(enc) => enc.finish().map_err(|e| Error::Codec(format!("zstd: {e}"))),
            #[cfg(feature = "lz4")]
            EncodeWriter::Lz4(enc) => enc.finish().map_err(|e| Error::Codec(format!("lz4: {e}"))),
        }
    }
}

impl<W: Write> Write for EncodeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EncodeWriter::Plain(w) => w.write(buf),
            #[cfg(feature = "zstd")]
            EncodeWriter::Zstd(w) => w.write(buf),
            #[cfg(feature = "lz4")]
            EncodeWriter::Lz4(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EncodeWriter::Plain(w) => w.flush(),
            #[cfg(feature = "zstd")]
            EncodeWriter::Zstd(w) => w.flush(),
            #[cfg(feature = "lz4")]
            EncodeWriter::Lz4(w) => w.flush(),
        }
    }
}

/// Reader that decompresses a segment payload.
pub enum DecodeReader<R: Read> {
    Plain(BufReader<R>),
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::read::Decoder<'static, BufReader<R>>),
    #[cfg(feature = "lz4")]
    Lz4(lz4_flex::frame::FrameDecoder<BufReader<R>>),
}

impl<R: Read> DecodeReader<R> {
    pub fn new(codec: Codec, inner: R) -> Result<Self> {
        match codec {
            Codec::None => Ok(DecodeReader::Plain(BufReader::new(inner))),
            Codec::Zstd => {
                #[cfg(feature = "zstd")]
                {
                    zstd::stream::read::Decoder::new(inner)
                        .map(DecodeReader::Zstd)
                        .map_err(|e| Error::Codec(format!("zstd: {e}")))
                }
                #[cfg(not(feature = "zstd"))]
                {
                    drop(inner);
                    Err(Error::CodecUnsupported("zstd"))
                }
            }
            Codec::Lz4 => {
                #[cfg(feature = "lz4")]
                {
                    Ok(DecodeReader::Lz4(lz4_flex::frame::FrameDecoder::new(
                        BufReader::new(inner),
                    )))
                }
                #[cfg(not(feature = "lz4"))]
                {
                    drop(inner);
                    Err(Error::CodecUnsupported("lz4"))
                }
            }
        }
    }
}

impl<R: Read> Read for DecodeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecodeReader::Plain(r) => r.read(buf),
            #[cfg(feature = "zstd")]
            DecodeReader::Zstd(r) => r.read(buf),
            #[cfg(feature = "lz4")]
            DecodeReader::Lz4(r) => r.read(buf),
        }
    }
}
