use thiserror::Error;

/// Canonical result for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A field spec could not be resolved against the current header.
    #[error("field selection error: {0}")]
    FieldSelection(String),

    /// A lookup-one style operation found more than one match under strict mode.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Invalid combination of operator parameters.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Record lookup of a field that is not part of the header.
    ///
    /// A row that is merely shorter than its header yields the missing value instead.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// A user callable or a value conversion failed.
    #[error("value error: {0}")]
    Value(String),

    #[error("expression error: {0}")]
    Expr(String),

    // The core crate does not spill, but the mem crate maps its errors into this
    // variant so operators can propagate them with `?`.
    #[error("spill error: {0}")]
    Spill(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a [`Error::Value`] raised from inside a user callable.
    pub fn value(msg: impl Into<String>) -> Self {
        Error::Value(msg.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
