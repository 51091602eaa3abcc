#![forbid(unsafe_code)]
//! reltab-mem: byte budgeting and the spill manager.
//!
//! Concrete implementations of the interfaces in `reltab-core::budget` plus
//! the segment format used by the external sort. A generic `Storage` trait is
//! exposed (in `spill::`) and implemented by `reltab-io`.

pub mod error;
pub mod guard;
pub mod spill;

pub use guard::{ByteBudget, Reservation};
pub use spill::{Codec, SegmentMeta, SegmentReader, SpillManager, Storage};
