#![forbid(unsafe_code)]
//! reltab-operators: lazy, re-iterable table operators.
//!
//! Every operator is itself a [`Table`](reltab_core::Table): building one does
//! no work, and each `open()` streams the result afresh from its inputs.
//! Sorting spills through `reltab-mem` once a buffer fills; everything keyed
//! (grouping, set algebra, collapse) sorts first unless told the input is
//! presorted.

pub mod expr;
mod fields;
pub mod group;
pub mod interval;
pub mod map;
pub mod select;
pub mod setops;
pub mod sort;

pub use expr::{BoundExpr, Expr};
pub use group::{
    conflicts, distinct, duplicates, fold, is_unique, unique, Conflicts, Distinct, Duplicates, Fold, Group,
    RowGroupBy, Unique,
};
pub use interval::{
    collapse, interval_anti_join, interval_join, interval_left_join, interval_lookup, interval_subtract,
    IntervalCollapse, IntervalIndex, IntervalSpec, IntervalTree, JoinKind,
};
pub use map::{ErrorPolicy, FieldMap, FieldRule, RowGroupMap, RowMap, RowMapMany};
pub use select::{biselect, facet, select, select_expr, select_field, Predicate, Select, SelectUsingContext};
pub use setops::{complement, diff, intersection, record_complement, record_diff, Complement, Intersection};
pub use sort::{is_sorted, merge_sort, sort, MergeSort, Sort, SortOptions};
