#![forbid(unsafe_code)]
//! reltab-core: values, the cross-type total order, field resolution, and the
//! re-iterable table/record model every reltab operator is built on.
//!
//! No I/O, spilling, or operator logic lives here.

pub mod budget;
pub mod config;
pub mod error;
pub mod field;
pub mod key;
pub mod order;
pub mod prelude;
pub mod record;
pub mod table;
pub mod value;

pub use error::{Error, Result};
pub use record::{Header, Record, Row};
pub use table::{MemTable, RowStream, Table, TableRef};
pub use value::Value;
