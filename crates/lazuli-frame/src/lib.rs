//! `lazuli-frame` is a lazy query-builder over Arrow record batches.
//!
//! A [`LazyFrame`] is a cheap, immutable handle to a plan held by an
//! [`Evaluator`]. Every transformation registers a new plan and returns a new
//! handle; nothing touches data until a terminal operation (`collect`,
//! `fetch`, `sink_csv`, `sink_parquet`) runs. The bundled
//! [`LocalEvaluator`] optimizes the plan, compiles it to a physical plan and
//! executes it in process.

/// Evaluator configuration loading.
pub mod config;
/// Eager DataFrame and Series types.
pub mod dataframe;
mod error;
/// Evaluator seam and the in-process evaluator.
pub mod evaluator;
/// Expression DSL used by lazy plans.
pub mod expr;
/// CSV / Parquet I/O and option types.
pub mod io;
/// Lazy query planning and optimization.
pub mod lazy;
/// Physical plan compilation and execution.
pub mod physical;
/// Durations and window options for temporal grouping.
pub mod temporal;

/// Re-export of the primary eager types.
pub use crate::dataframe::{DataFrame, Series};
/// Re-export of the crate error type and result alias.
pub use crate::error::{DataFrameError, Result};
/// Re-export of the evaluator seam.
pub use crate::evaluator::{
    default_evaluator, Evaluator, LocalEvaluator, PlanHandle, SerializeFormat,
};
/// Re-export of the expression DSL entrypoints.
pub use crate::expr::{all, col, cols, lit, AggFunc, Expr, QuantileMethod, Selection};
/// Re-export of eager CSV / Parquet I/O helpers.
pub use crate::io::{read_csv, read_parquet, write_csv, write_parquet};
/// Re-export of the lazy facade and its option types.
pub use crate::lazy::{
    AsofJoinOptions, AsofStrategy, CollectOptions, DynamicGroupOptions, JoinOptions, JoinType,
    LazyFrame, LazyGroupBy, OptFlags, RollingOptions, SliceOptions, SortOptions, Tolerance,
    UniqueKeepStrategy, UniqueOptions,
};
/// Re-export of temporal window types.
pub use crate::temporal::{ClosedWindow, Duration, Label, StartBy};

/// Create a `LazyFrame` that scans a CSV file without performing I/O eagerly.
pub fn scan_csv(path: impl AsRef<std::path::Path>) -> Result<LazyFrame> {
    LazyFrame::scan_csv(path)
}

/// Create a `LazyFrame` that scans a Parquet file without performing I/O eagerly.
pub fn scan_parquet(path: impl AsRef<std::path::Path>) -> Result<LazyFrame> {
    LazyFrame::scan_parquet(path)
}
