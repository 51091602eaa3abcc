//! Interval search, joins, subtraction and collapsing.
//!
//! Intervals are half-open `[start, stop)` unless `include_stop` is set.

pub mod collapse;
pub mod join;
pub mod lookup;
pub mod tree;

pub use collapse::{collapse, IntervalCollapse};
pub use join::{
    interval_anti_join, interval_join, interval_left_join, interval_subtract, IntervalJoin, IntervalJoinBuilder,
    IntervalSubtract, IntervalSubtractBuilder, JoinKind,
};
pub use lookup::{
    facet_interval_lookup, facet_interval_record_lookup, interval_lookup, interval_record_lookup, FacetIntervalIndex,
    IntervalIndex, IntervalSpec,
};
pub use tree::{overlaps, Interval, IntervalTree, Query};
