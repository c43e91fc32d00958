use std::path::Path;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;

use crate::evaluator::{default_evaluator, Evaluator, PlanHandle, SerializeFormat};
use crate::expr::{selection_to_exprs, selection_to_names, QuantileMethod, Selection};
use crate::io::{
    CsvReadOptions, CsvWriterOptions, ParquetReadOptions, ParquetWriterOptions, SinkOptions,
};
use crate::lazy::group_by::{DynamicGroupOptions, LazyGroupBy, RollingOptions};
use crate::lazy::join::{AsofJoinOptions, JoinOptions};
use crate::lazy::logical_plan::{next_cache_id, ReduceFunc};
use crate::lazy::options::{CollectOptions, OptFlags, SliceOptions, SortOptions, UniqueOptions};
use crate::lazy::{LogicalPlan, ProjectionKind};
use crate::{DataFrame, DataFrameError, Expr, Result};

/// Rows taken by `head`, `limit` and `tail` when no count is given.
const DEFAULT_SLICE_LEN: usize = 5;

/// A registered plan, released from its evaluator on drop.
#[derive(Debug)]
struct OwnedHandle {
    evaluator: Arc<dyn Evaluator>,
    handle: PlanHandle,
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        self.evaluator.release(self.handle);
    }
}

/// A lazily-evaluated query: a handle to a plan held by an [`Evaluator`].
///
/// Every transformation registers a new plan and returns a new `LazyFrame`;
/// the receiver is never changed. Nothing is read or computed until a
/// terminal call (`collect`, `fetch`, `sink_*`, `schema`, ...). Clones share
/// the handle; the plan slot is released when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct LazyFrame {
    plan: Arc<OwnedHandle>,
}

impl LazyFrame {
    fn new(evaluator: Arc<dyn Evaluator>, plan: LogicalPlan) -> Self {
        let handle = evaluator.register(plan);
        Self::from_handle(evaluator, handle)
    }

    fn from_handle(evaluator: Arc<dyn Evaluator>, handle: PlanHandle) -> Self {
        Self {
            plan: Arc::new(OwnedHandle { evaluator, handle }),
        }
    }

    /// Scan an in-memory `DataFrame` on the process-wide evaluator.
    pub fn from_dataframe(df: DataFrame) -> Self {
        Self::from_dataframe_in(default_evaluator(), df)
    }

    /// Scan an in-memory `DataFrame` on `evaluator`.
    pub fn from_dataframe_in(evaluator: Arc<dyn Evaluator>, df: DataFrame) -> Self {
        Self::new(evaluator, LogicalPlan::DataFrameScan { df })
    }

    /// Build a CSV scan plan (no file I/O is performed until evaluation).
    pub fn scan_csv(path: impl AsRef<Path>) -> Result<Self> {
        Self::scan_csv_with_options(path, CsvReadOptions::default())
    }

    /// Build a CSV scan plan with explicit read options.
    pub fn scan_csv_with_options(path: impl AsRef<Path>, options: CsvReadOptions) -> Result<Self> {
        Ok(Self::new(
            default_evaluator(),
            LogicalPlan::CsvScan {
                path: path.as_ref().to_path_buf(),
                options,
                predicate: None,
            },
        ))
    }

    /// Build a Parquet scan plan (no file I/O is performed until evaluation).
    pub fn scan_parquet(path: impl AsRef<Path>) -> Result<Self> {
        Self::scan_parquet_with_options(path, ParquetReadOptions::default())
    }

    /// Build a Parquet scan plan with explicit read options.
    pub fn scan_parquet_with_options(
        path: impl AsRef<Path>,
        options: ParquetReadOptions,
    ) -> Result<Self> {
        Ok(Self::new(
            default_evaluator(),
            LogicalPlan::ParquetScan {
                path: path.as_ref().to_path_buf(),
                options,
                predicate: None,
            },
        ))
    }

    /// The evaluator that owns this plan.
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.plan.evaluator
    }

    /// Handle of this plan inside its evaluator.
    pub fn handle(&self) -> PlanHandle {
        self.plan.handle
    }

    /// Register a node built on top of the current plan.
    pub(crate) fn derive(
        &self,
        build: impl FnOnce(Arc<LogicalPlan>) -> LogicalPlan,
    ) -> Result<LazyFrame> {
        let input = self.evaluator().resolve(self.handle())?;
        Ok(Self::new(Arc::clone(self.evaluator()), build(input)))
    }

    /// Add a projection (`select`) node.
    pub fn select(&self, exprs: impl Into<Selection>) -> Result<LazyFrame> {
        let exprs = selection_to_exprs(exprs)?;
        self.derive(|input| LogicalPlan::Projection {
            input,
            exprs,
            kind: ProjectionKind::Select,
        })
    }

    /// Keep the rows where `predicate` is true.
    pub fn filter(&self, predicate: Expr) -> Result<LazyFrame> {
        self.derive(|input| LogicalPlan::Filter { input, predicate })
    }

    /// Add or overwrite one column.
    pub fn with_column(&self, expr: Expr) -> Result<LazyFrame> {
        self.with_columns(expr)
    }

    /// Add or overwrite columns, keeping every existing column.
    pub fn with_columns(&self, exprs: impl Into<Selection>) -> Result<LazyFrame> {
        let exprs = selection_to_exprs(exprs)?;
        self.derive(|input| LogicalPlan::Projection {
            input,
            exprs,
            kind: ProjectionKind::WithColumns,
        })
    }

    /// Sort by a column name, expression, `(by, descending)` pair or [`SortOptions`].
    pub fn sort(&self, options: impl Into<SortOptions>) -> Result<LazyFrame> {
        let options = options.into();
        let nulls_last = options.nulls_last;
        let maintain_order = options.maintain_order;
        let (by, descending) = options.resolve()?;
        self.derive(|input| LogicalPlan::Sort {
            input,
            by,
            descending,
            nulls_last,
            maintain_order,
        })
    }

    /// Remove columns by name.
    pub fn drop(&self, columns: impl Into<Selection>) -> Result<LazyFrame> {
        let columns = selection_to_names(columns)?;
        self.derive(|input| LogicalPlan::Drop { input, columns })
    }

    /// Drop rows that have a null in any column.
    pub fn drop_nulls(&self) -> Result<LazyFrame> {
        self.derive(|input| LogicalPlan::DropNulls {
            input,
            subset: None,
        })
    }

    /// Drop rows that have a null in one of `subset`.
    pub fn drop_nulls_subset(&self, subset: impl Into<Selection>) -> Result<LazyFrame> {
        let subset = selection_to_names(subset)?;
        self.derive(|input| LogicalPlan::DropNulls {
            input,
            subset: Some(subset),
        })
    }

    /// Explode list columns into one row per element.
    ///
    /// An empty selection explodes every column of the current plan.
    pub fn explode(&self, columns: impl Into<Selection>) -> Result<LazyFrame> {
        let columns = columns.into();
        let columns = if columns.is_empty() {
            self.columns()?
        } else {
            selection_to_names(columns)?
        };
        self.derive(|input| LogicalPlan::Explode { input, columns })
    }

    /// Replace nulls with `value` in every column whose type can hold it.
    pub fn fill_null(&self, value: Expr) -> Result<LazyFrame> {
        self.derive(|input| LogicalPlan::FillNull { input, value })
    }

    /// Rename `existing[i]` to `new[i]`.
    pub fn rename(
        &self,
        existing: impl Into<Selection>,
        new: impl Into<Selection>,
    ) -> Result<LazyFrame> {
        let existing = selection_to_names(existing)?;
        let new = selection_to_names(new)?;
        if existing.len() != new.len() {
            return Err(DataFrameError::contract(format!(
                "rename got {} existing names and {} new names",
                existing.len(),
                new.len()
            )));
        }
        self.derive(|input| LogicalPlan::Rename {
            input,
            existing,
            new,
        })
    }

    /// Rename a single column.
    pub fn with_column_renamed(&self, existing: &str, new: &str) -> Result<LazyFrame> {
        self.rename(existing, new)
    }

    /// Reverse row order.
    pub fn reverse(&self) -> Result<LazyFrame> {
        self.derive(|input| LogicalPlan::Reverse { input })
    }

    /// Take `length` rows starting at `offset` (negative offsets count from the end).
    pub fn slice(&self, options: impl Into<SliceOptions>) -> Result<LazyFrame> {
        let SliceOptions { offset, length } = options.into();
        self.derive(|input| LogicalPlan::Slice {
            input,
            offset,
            len: length,
        })
    }

    /// First `n` rows (default 5).
    pub fn head(&self, n: impl Into<Option<usize>>) -> Result<LazyFrame> {
        self.slice((0, n.into().unwrap_or(DEFAULT_SLICE_LEN)))
    }

    /// Alias of [`LazyFrame::head`].
    pub fn limit(&self, n: impl Into<Option<usize>>) -> Result<LazyFrame> {
        self.head(n)
    }

    /// Last `n` rows (default 5).
    pub fn tail(&self, n: impl Into<Option<usize>>) -> Result<LazyFrame> {
        let n = n.into().unwrap_or(DEFAULT_SLICE_LEN);
        let offset = -i64::try_from(n)
            .map_err(|_| DataFrameError::contract(format!("tail length {n} is too large")))?;
        self.slice((offset, n))
    }

    /// The last row, as a one-row plan.
    pub fn last(&self) -> Result<LazyFrame> {
        self.tail(1)
    }

    /// Shift every column by `periods` rows, filling the gap with nulls.
    pub fn shift(&self, periods: i64) -> Result<LazyFrame> {
        self.derive(|input| LogicalPlan::Shift {
            input,
            periods,
            fill: None,
        })
    }

    /// Shift every column by `periods` rows, filling the gap with `fill`.
    pub fn shift_and_fill(&self, periods: i64, fill: Expr) -> Result<LazyFrame> {
        self.derive(|input| LogicalPlan::Shift {
            input,
            periods,
            fill: Some(fill),
        })
    }

    /// Drop duplicate rows. `unique(true)` keeps the original order.
    pub fn unique(&self, options: impl Into<UniqueOptions>) -> Result<LazyFrame> {
        let UniqueOptions {
            maintain_order,
            subset,
            keep,
        } = options.into();
        let subset = subset.map(selection_to_names).transpose()?;
        self.derive(|input| LogicalPlan::Unique {
            input,
            subset,
            keep,
            maintain_order,
        })
    }

    /// Prepend a `UInt32` row counter named `name` (default `row_nr`).
    pub fn with_row_count(&self, name: Option<&str>, offset: Option<u32>) -> Result<LazyFrame> {
        let name = name.unwrap_or("row_nr").to_string();
        let offset = offset.unwrap_or(0);
        self.derive(|input| LogicalPlan::RowCount {
            input,
            name,
            offset,
        })
    }

    /// Wide to long: one row per (id row, value column).
    ///
    /// An empty `value_vars` selection takes every column not in `id_vars`.
    pub fn unpivot(
        &self,
        id_vars: impl Into<Selection>,
        value_vars: impl Into<Selection>,
    ) -> Result<LazyFrame> {
        let id_vars = selection_to_names(id_vars)?;
        let value_vars = selection_to_names(value_vars)?;
        self.derive(|input| LogicalPlan::Unpivot {
            input,
            id_vars,
            value_vars,
            variable_name: "variable".to_string(),
            value_name: "value".to_string(),
        })
    }

    /// Alias of [`LazyFrame::unpivot`].
    pub fn melt(
        &self,
        id_vars: impl Into<Selection>,
        value_vars: impl Into<Selection>,
    ) -> Result<LazyFrame> {
        self.unpivot(id_vars, value_vars)
    }

    /// Evaluate this plan at most once per evaluation of any plan that uses it.
    pub fn cache(&self) -> Result<LazyFrame> {
        let id = next_cache_id();
        self.derive(|input| LogicalPlan::Cache { input, id })
    }

    /// Group by `by`. Group order is not guaranteed to be stable.
    pub fn group_by(&self, by: impl Into<Selection>) -> Result<LazyGroupBy> {
        self.keyed_group_by(by, false)
    }

    /// Group by `by`, keeping groups in order of first appearance.
    pub fn group_by_stable(&self, by: impl Into<Selection>) -> Result<LazyGroupBy> {
        self.keyed_group_by(by, true)
    }

    fn keyed_group_by(&self, by: impl Into<Selection>, maintain_order: bool) -> Result<LazyGroupBy> {
        let keys = selection_to_exprs(by)?;
        if keys.is_empty() {
            return Err(DataFrameError::contract("group_by requires at least one key"));
        }
        Ok(LazyGroupBy::keyed(self.clone(), keys, maintain_order))
    }

    /// One window per row over a temporal or integer index.
    pub fn group_by_rolling(&self, options: RollingOptions) -> Result<LazyGroupBy> {
        Ok(LazyGroupBy::rolling(self.clone(), options.resolve()?))
    }

    /// Regular windows over a temporal or integer index.
    pub fn group_by_dynamic(&self, options: DynamicGroupOptions) -> Result<LazyGroupBy> {
        Ok(LazyGroupBy::dynamic(self.clone(), options.resolve()?))
    }

    /// Join with `other`.
    ///
    /// Options are validated before anything is sent to the evaluator.
    pub fn join(&self, other: &LazyFrame, options: JoinOptions) -> Result<LazyFrame> {
        let (left_on, right_on, args) = options.resolve()?;
        let right = self.import(other)?;
        let handle = self
            .evaluator()
            .join(self.handle(), right.handle, left_on, right_on, args)?;
        Ok(Self::from_handle(Arc::clone(self.evaluator()), handle))
    }

    /// As-of join with `other` on a single sorted key.
    pub fn join_asof(&self, other: &LazyFrame, options: AsofJoinOptions) -> Result<LazyFrame> {
        let (left_on, right_on, by_left, by_right, args) = options.resolve()?;
        let right = self.import(other)?;
        let handle = self.evaluator().join_asof(
            self.handle(),
            right.handle,
            left_on,
            right_on,
            by_left,
            by_right,
            args,
        )?;
        Ok(Self::from_handle(Arc::clone(self.evaluator()), handle))
    }

    /// `other`'s plan as held by this frame's evaluator.
    fn import(&self, other: &LazyFrame) -> Result<Arc<OwnedHandle>> {
        let same = std::ptr::eq(
            Arc::as_ptr(self.evaluator()) as *const (),
            Arc::as_ptr(other.evaluator()) as *const (),
        );
        if same {
            return Ok(Arc::clone(&other.plan));
        }
        let plan = other.evaluator().resolve(other.handle())?;
        let handle = self.evaluator().register(plan.as_ref().clone());
        Ok(Arc::new(OwnedHandle {
            evaluator: Arc::clone(self.evaluator()),
            handle,
        }))
    }

    fn reduce(&self, func: ReduceFunc) -> Result<LazyFrame> {
        self.derive(|input| LogicalPlan::Reduce { input, func })
    }

    /// Column-wise maximum.
    pub fn max(&self) -> Result<LazyFrame> {
        self.reduce(ReduceFunc::Max)
    }

    /// Column-wise minimum.
    pub fn min(&self) -> Result<LazyFrame> {
        self.reduce(ReduceFunc::Min)
    }

    /// Column-wise sum.
    pub fn sum(&self) -> Result<LazyFrame> {
        self.reduce(ReduceFunc::Sum)
    }

    /// Column-wise mean.
    pub fn mean(&self) -> Result<LazyFrame> {
        self.reduce(ReduceFunc::Mean)
    }

    /// Column-wise median.
    pub fn median(&self) -> Result<LazyFrame> {
        self.reduce(ReduceFunc::Median)
    }

    /// Column-wise standard deviation.
    pub fn std(&self, ddof: u8) -> Result<LazyFrame> {
        self.reduce(ReduceFunc::Std { ddof })
    }

    /// Column-wise variance.
    pub fn var(&self, ddof: u8) -> Result<LazyFrame> {
        self.reduce(ReduceFunc::Var { ddof })
    }

    /// Column-wise quantile.
    pub fn quantile(&self, q: f64, method: QuantileMethod) -> Result<LazyFrame> {
        self.reduce(ReduceFunc::Quantile { q, method })
    }

    /// This plan with `options` attached, released once the terminal call is done.
    fn toggled(&self, options: &CollectOptions) -> Result<OwnedHandle> {
        let handle = self
            .evaluator()
            .optimization_toggle(self.handle(), OptFlags::from(options))?;
        Ok(OwnedHandle {
            evaluator: Arc::clone(self.evaluator()),
            handle,
        })
    }

    /// Evaluate the plan on tokio's blocking pool.
    pub async fn collect(&self, options: CollectOptions) -> Result<DataFrame> {
        let toggled = self.toggled(&options)?;
        tokio::task::spawn_blocking(move || toggled.evaluator.collect(toggled.handle))
            .await
            .map_err(|err| DataFrameError::Task {
                message: err.to_string(),
            })?
    }

    /// Evaluate the plan on the calling thread.
    ///
    /// Blocks until evaluation finishes. Do not call it from an async task;
    /// use [`LazyFrame::collect`] there so the runtime's worker threads stay free.
    pub fn collect_sync(&self, options: CollectOptions) -> Result<DataFrame> {
        let toggled = self.toggled(&options)?;
        toggled.evaluator.collect(toggled.handle)
    }

    /// Evaluate with every source scan limited to `n` rows.
    pub async fn fetch(&self, n: usize, options: CollectOptions) -> Result<DataFrame> {
        let toggled = self.toggled(&options)?;
        tokio::task::spawn_blocking(move || toggled.evaluator.fetch(toggled.handle, n))
            .await
            .map_err(|err| DataFrameError::Task {
                message: err.to_string(),
            })?
    }

    /// Blocking form of [`LazyFrame::fetch`].
    ///
    /// Blocks the calling thread until evaluation finishes, so it must not run
    /// inside an async task.
    pub fn fetch_sync(&self, n: usize, options: CollectOptions) -> Result<DataFrame> {
        let toggled = self.toggled(&options)?;
        toggled.evaluator.fetch(toggled.handle, n)
    }

    /// Evaluate with every source scan limited to one row.
    pub fn first(&self) -> Result<DataFrame> {
        self.fetch_sync(1, CollectOptions::default())
    }

    /// Evaluate now and write the result to a CSV file.
    ///
    /// The returned frame wraps the consumed sink and cannot be evaluated again.
    pub fn sink_csv(
        &self,
        path: impl AsRef<Path>,
        options: CsvWriterOptions,
        sink: SinkOptions,
    ) -> Result<LazyFrame> {
        let handle = self
            .evaluator()
            .sink_csv(self.handle(), path.as_ref(), &options, &sink)?;
        Ok(Self::from_handle(Arc::clone(self.evaluator()), handle))
    }

    /// Evaluate now and write the result to a Parquet file.
    pub fn sink_parquet(
        &self,
        path: impl AsRef<Path>,
        options: ParquetWriterOptions,
        sink: SinkOptions,
    ) -> Result<LazyFrame> {
        let handle = self
            .evaluator()
            .sink_parquet(self.handle(), path.as_ref(), &options, &sink)?;
        Ok(Self::from_handle(Arc::clone(self.evaluator()), handle))
    }

    /// Render the logical plan as text.
    pub fn describe_plan(&self) -> Result<String> {
        self.evaluator().describe_plan(self.handle())
    }

    /// Render the plan after optimization as text.
    pub fn describe_optimized_plan(&self) -> Result<String> {
        self.evaluator().describe_optimized_plan(self.handle())
    }

    /// Output schema of the plan.
    pub fn schema(&self) -> Result<SchemaRef> {
        self.evaluator().schema(self.handle())
    }

    /// Output column names of the plan.
    pub fn columns(&self) -> Result<Vec<String>> {
        Ok(self
            .schema()?
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect())
    }

    /// Serialize the logical plan.
    pub fn serialize(&self, format: SerializeFormat) -> Result<Vec<u8>> {
        self.evaluator().serialize(self.handle(), format)
    }

    /// Rebuild a frame from [`LazyFrame::serialize`] output on the process-wide evaluator.
    pub fn deserialize(bytes: &[u8], format: SerializeFormat) -> Result<LazyFrame> {
        Self::deserialize_with(default_evaluator(), bytes, format)
    }

    /// Rebuild a frame from serialized bytes on `evaluator`.
    pub fn deserialize_with(
        evaluator: Arc<dyn Evaluator>,
        bytes: &[u8],
        format: SerializeFormat,
    ) -> Result<LazyFrame> {
        let handle = evaluator.deserialize(bytes, format)?;
        Ok(Self::from_handle(evaluator, handle))
    }
}
