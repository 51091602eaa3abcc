//! Convenient re-exports for downstream crates.

pub use crate::config::{EngineConfig, FailOnError, SpillCodec};
pub use crate::error::{Error, Result};
pub use crate::field::{resolve, resolve_one, FieldSpec};
pub use crate::key::{BoundKey, KeySpec};
pub use crate::order::{compare, compare_rows, equal, less_than, Comparable};
pub use crate::record::{Header, Record, Row};
pub use crate::row;
pub use crate::table::{
    data_rows, materialize, to_rows, FnSource, MemTable, RowStream, Table, TableRef,
};
pub use crate::value::{Value, ValueKind};
