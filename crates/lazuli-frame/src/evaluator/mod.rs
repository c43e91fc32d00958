//! The seam between the lazy facade and whatever evaluates its plans.
//!
//! [`LazyFrame`](crate::LazyFrame) only ever talks to an [`Evaluator`]
//! through [`PlanHandle`]s. [`LocalEvaluator`] is the in-process
//! implementation shipped with the crate.

mod local;

use std::fmt::Debug;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use arrow::datatypes::SchemaRef;

use crate::config::EvaluatorConfig;
use crate::io::{CsvWriterOptions, ParquetWriterOptions, SinkOptions};
use crate::lazy::{AsofJoinArgs, JoinArgs, LogicalPlan, OptFlags};
use crate::{DataFrame, Expr, Result};

pub use local::LocalEvaluator;

/// Opaque reference to a plan registered with an [`Evaluator`].
///
/// Handles are only minted by evaluators and are meaningless to any other
/// evaluator instance. A released slot may be reused; the generation tells a
/// stale handle apart from the slot's new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanHandle {
    index: usize,
    generation: u32,
}

impl PlanHandle {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the owning evaluator.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

/// Wire format for plan (de)serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeFormat {
    Json,
    Bincode,
}

impl SerializeFormat {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SerializeFormat::Json => "json",
            SerializeFormat::Bincode => "bincode",
        }
    }
}

/// Plan storage, optimization and execution behind the lazy facade.
///
/// Registered plans are immutable: every operation that changes a plan
/// (including attaching optimization flags) returns a new handle.
pub trait Evaluator: Send + Sync + Debug {
    /// Store `plan` and return its handle.
    fn register(&self, plan: LogicalPlan) -> PlanHandle;

    /// The plan stored under `handle`.
    fn resolve(&self, handle: PlanHandle) -> Result<Arc<LogicalPlan>>;

    /// Register an equi or cross join of two plans.
    fn join(
        &self,
        left: PlanHandle,
        right: PlanHandle,
        left_on: Vec<Expr>,
        right_on: Vec<Expr>,
        args: JoinArgs,
    ) -> Result<PlanHandle>;

    /// Register an as-of join of two plans.
    #[allow(clippy::too_many_arguments)]
    fn join_asof(
        &self,
        left: PlanHandle,
        right: PlanHandle,
        left_on: Expr,
        right_on: Expr,
        by_left: Vec<String>,
        by_right: Vec<String>,
        args: AsofJoinArgs,
    ) -> Result<PlanHandle>;

    /// Same plan as `handle`, evaluated with `flags`.
    fn optimization_toggle(&self, handle: PlanHandle, flags: OptFlags) -> Result<PlanHandle>;

    /// Forget the plan stored under `handle`.
    ///
    /// Plans derived from it share the tree and are unaffected. Releasing an
    /// unknown or already released handle is a no-op.
    fn release(&self, handle: PlanHandle);

    /// Evaluate the plan.
    fn collect(&self, handle: PlanHandle) -> Result<DataFrame>;

    /// Evaluate the plan with every source scan limited to `n_rows`.
    fn fetch(&self, handle: PlanHandle, n_rows: usize) -> Result<DataFrame>;

    /// Evaluate the plan, write it as CSV and return a handle to the consumed sink.
    fn sink_csv(
        &self,
        handle: PlanHandle,
        path: &Path,
        options: &CsvWriterOptions,
        sink: &SinkOptions,
    ) -> Result<PlanHandle>;

    /// Evaluate the plan, write it as Parquet and return a handle to the consumed sink.
    fn sink_parquet(
        &self,
        handle: PlanHandle,
        path: &Path,
        options: &ParquetWriterOptions,
        sink: &SinkOptions,
    ) -> Result<PlanHandle>;

    /// Text rendering of the plan as built.
    fn describe_plan(&self, handle: PlanHandle) -> Result<String>;

    /// Text rendering of the plan after optimization.
    fn describe_optimized_plan(&self, handle: PlanHandle) -> Result<String>;

    /// Output schema of the plan.
    fn schema(&self, handle: PlanHandle) -> Result<SchemaRef>;

    /// Serialize the plan stored under `handle`.
    fn serialize(&self, handle: PlanHandle, format: SerializeFormat) -> Result<Vec<u8>>;

    /// Register a plan produced by [`Evaluator::serialize`].
    fn deserialize(&self, bytes: &[u8], format: SerializeFormat) -> Result<PlanHandle>;
}

/// Process-wide evaluator used by constructors that do not take one.
///
/// Configured from `lazuli.toml` / `LAZULI__*` on first use; an invalid
/// configuration is logged and replaced by the defaults.
pub fn default_evaluator() -> Arc<dyn Evaluator> {
    static DEFAULT: OnceLock<Arc<dyn Evaluator>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| {
            let config = EvaluatorConfig::load(None).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "invalid evaluator config, using defaults");
                EvaluatorConfig::default()
            });
            Arc::new(LocalEvaluator::new(config))
        })
        .clone()
}
