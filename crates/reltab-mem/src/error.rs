use thiserror::Error;

/// Result type local to reltab-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("spill storage error: {0}")]
    Storage(String),

    #[error("unsupported codec: {0}")]
    CodecUnsupported(&'static str),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("row encoding error: {0}")]
    Encode(String),

    #[error("checksum mismatch in segment {0}")]
    ChecksumMismatch(String),

    #[error("corrupt segment {name}: {reason}")]
    Corrupt { name: String, reason: String },

    #[error("unknown segment {0}")]
    UnknownSegment(String),
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Error::Encode(e.to_string())
    }
}

impl From<Error> for reltab_core::Error {
    fn from(e: Error) -> Self {
        reltab_core::Error::Spill(e.to_string())
    }
}
