use thiserror::Error;

/// Result type local to reltab-io.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("storage: {0}")]
    Storage(String),

    #[error(transparent)]
    Engine(#[from] reltab_core::Error),
}

impl From<Error> for reltab_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Engine(inner) => inner,
            other => reltab_core::Error::Io(other.to_string()),
        }
    }
}

impl From<Error> for reltab_mem::error::Error {
    fn from(e: Error) -> Self {
        reltab_mem::error::Error::Storage(e.to_string())
    }
}
