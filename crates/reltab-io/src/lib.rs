#![forbid(unsafe_code)]
//! reltab-io: spill storage backends and CSV adapters.
//!
//! Storage backends implement `reltab_mem::Storage`; the CSV source and writer
//! speak the table protocol from `reltab-core` and nothing else.

pub mod csv;
pub mod error;
pub mod storage;

pub use crate::csv::{write_csv, CsvSource, CsvWriter};
pub use storage::{scoped_storage, FsStorage, MemoryStorage};
