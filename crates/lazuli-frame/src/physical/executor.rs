use std::cell::RefCell;
use std::collections::HashMap;

use arrow::record_batch::RecordBatch;

use crate::io::{
    read_csv_batch, read_parquet_batch, DEFAULT_INFER_SCHEMA_LENGTH, DEFAULT_PARQUET_BATCH_SIZE,
};
use crate::physical::expr_eval::{EvalOptions, ExprEval};
use crate::physical::plan::{PhysicalPlan, ScanSource};
use crate::physical::{aggregate, join, operators, window};
use crate::{Expr, Result};

/// Runtime switches for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    pub type_coercion: bool,
    pub comm_subexpr_elim: bool,
    /// Rows sampled for CSV schema inference when the scan does not say.
    pub csv_infer_schema_length: usize,
    /// Parquet reader batch size when the scan does not say.
    pub parquet_batch_size: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            type_coercion: true,
            comm_subexpr_elim: true,
            csv_infer_schema_length: DEFAULT_INFER_SCHEMA_LENGTH,
            parquet_batch_size: DEFAULT_PARQUET_BATCH_SIZE,
        }
    }
}

/// Executes `PhysicalPlan` trees into a single `RecordBatch`.
///
/// `CacheExec` results are kept for the lifetime of the executor, so a
/// subplan shared by both sides of a self-join runs once.
#[derive(Debug, Default)]
pub struct Executor {
    options: ExecOptions,
    cache: RefCell<HashMap<u64, RecordBatch>>,
}

impl Executor {
    pub fn new(options: ExecOptions) -> Self {
        Self {
            options,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            type_coercion: self.options.type_coercion,
            comm_subexpr_elim: self.options.comm_subexpr_elim,
        }
    }

    fn eval<'a>(&self, batch: &'a RecordBatch) -> ExprEval<'a> {
        ExprEval::new(batch, self.eval_options())
    }

    /// Execute a physical plan and return its output.
    pub fn execute(&self, plan: &PhysicalPlan) -> Result<RecordBatch> {
        match plan {
            PhysicalPlan::ScanExec { source } => self.scan(source),
            PhysicalPlan::ProjectionExec { input, exprs, kind } => {
                let batch = self.execute(input)?;
                operators::project(&self.eval(&batch), &batch, exprs, *kind)
            }
            PhysicalPlan::FilterExec { input, predicate } => {
                let batch = self.execute(input)?;
                operators::filter(&self.eval(&batch), &batch, predicate)
            }
            PhysicalPlan::AggregateExec { input, keys, aggs } => {
                let batch = self.execute(input)?;
                aggregate::group_aggregate(&self.eval(&batch), keys, aggs)
            }
            PhysicalPlan::GroupSliceExec {
                input,
                keys,
                head,
                n,
            } => {
                let batch = self.execute(input)?;
                aggregate::group_slice(&self.eval(&batch), &batch, keys, *head, *n)
            }
            PhysicalPlan::RollingExec { input, spec, aggs } => {
                let batch = self.execute(input)?;
                window::rolling(&self.eval(&batch), &batch, spec, aggs)
            }
            PhysicalPlan::DynamicExec { input, spec, aggs } => {
                let batch = self.execute(input)?;
                window::dynamic(&self.eval(&batch), &batch, spec, aggs)
            }
            PhysicalPlan::SortExec {
                input,
                by,
                descending,
                nulls_last,
                maintain_order,
            } => {
                let batch = self.execute(input)?;
                operators::sort(
                    &self.eval(&batch),
                    &batch,
                    by,
                    descending,
                    *nulls_last,
                    *maintain_order,
                )
            }
            PhysicalPlan::SliceExec { input, offset, len } => {
                let batch = self.execute(input)?;
                Ok(operators::slice(&batch, *offset, *len))
            }
            PhysicalPlan::ReverseExec { input } => operators::reverse(&self.execute(input)?),
            PhysicalPlan::DropExec { input, columns } => {
                operators::drop_columns(&self.execute(input)?, columns)
            }
            PhysicalPlan::DropNullsExec { input, subset } => {
                operators::drop_nulls(&self.execute(input)?, subset.as_deref())
            }
            PhysicalPlan::ExplodeExec { input, columns } => {
                operators::explode(&self.execute(input)?, columns)
            }
            PhysicalPlan::FillNullExec { input, value } => {
                let batch = self.execute(input)?;
                operators::fill_null(&self.eval(&batch), &batch, value)
            }
            PhysicalPlan::RenameExec {
                input,
                existing,
                new,
            } => operators::rename(&self.execute(input)?, existing, new),
            PhysicalPlan::ShiftExec {
                input,
                periods,
                fill,
            } => {
                let batch = self.execute(input)?;
                operators::shift(&self.eval(&batch), &batch, *periods, fill.as_ref())
            }
            PhysicalPlan::UniqueExec {
                input,
                subset,
                keep,
            } => operators::unique(&self.execute(input)?, subset.as_deref(), *keep),
            PhysicalPlan::RowCountExec {
                input,
                name,
                offset,
            } => operators::with_row_count(&self.execute(input)?, name, *offset),
            PhysicalPlan::UnpivotExec {
                input,
                id_vars,
                value_vars,
                variable_name,
                value_name,
            } => operators::unpivot(
                &self.execute(input)?,
                id_vars,
                value_vars,
                variable_name,
                value_name,
            ),
            PhysicalPlan::CacheExec { input, id } => {
                if let Some(batch) = self.cache.borrow().get(id) {
                    tracing::debug!(id, "cache hit");
                    return Ok(batch.clone());
                }
                let batch = self.execute(input)?;
                self.cache.borrow_mut().insert(*id, batch.clone());
                Ok(batch)
            }
            PhysicalPlan::JoinExec {
                left,
                right,
                left_on,
                right_on,
                args,
            } => {
                let left = self.execute(left)?;
                let right = self.execute(right)?;
                join::join(&left, &right, left_on, right_on, args, self.eval_options())
            }
            PhysicalPlan::AsofJoinExec {
                left,
                right,
                left_on,
                right_on,
                by_left,
                by_right,
                args,
            } => {
                let left = self.execute(left)?;
                let right = self.execute(right)?;
                join::join_asof(
                    &left,
                    &right,
                    left_on,
                    right_on,
                    by_left,
                    by_right,
                    args,
                    self.eval_options(),
                )
            }
            PhysicalPlan::ReduceExec { input, func } => {
                aggregate::reduce(&self.execute(input)?, *func)
            }
        }
    }

    fn scan(&self, source: &ScanSource) -> Result<RecordBatch> {
        match source {
            ScanSource::DataFrame { df, n_rows } => {
                let batch = df.to_record_batch()?;
                Ok(match n_rows {
                    Some(n) => batch.slice(0, (*n).min(batch.num_rows())),
                    None => batch,
                })
            }
            ScanSource::Csv {
                path,
                options,
                predicate,
            } => {
                let batch = read_csv_batch(path, options, self.options.csv_infer_schema_length)?;
                tracing::debug!(path = %path.display(), rows = batch.num_rows(), "csv scan");
                self.apply_predicate(batch, predicate.as_ref())
            }
            ScanSource::Parquet {
                path,
                options,
                predicate,
            } => {
                let batch = read_parquet_batch(path, options, self.options.parquet_batch_size)?;
                tracing::debug!(path = %path.display(), rows = batch.num_rows(), "parquet scan");
                self.apply_predicate(batch, predicate.as_ref())
            }
        }
    }

    fn apply_predicate(&self, batch: RecordBatch, predicate: Option<&Expr>) -> Result<RecordBatch> {
        match predicate {
            Some(predicate) => operators::filter(&self.eval(&batch), &batch, predicate),
            None => Ok(batch),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use super::{ExecOptions, Executor};
    use crate::lazy::{LogicalPlan, ProjectionKind};
    use crate::physical::compile;
    use crate::{col, lit, DataFrame};

    fn df() -> DataFrame {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])) as ArrayRef,
                Arc::new(StringArray::from(vec!["w", "x", "y", "z"])) as ArrayRef,
            ],
        )
        .unwrap();
        DataFrame::from_record_batch(batch)
    }

    fn run(plan: &LogicalPlan, fetch: Option<usize>) -> RecordBatch {
        let physical = compile(plan, fetch).unwrap();
        Executor::new(ExecOptions::default())
            .execute(&physical)
            .unwrap()
    }

    #[test]
    fn filter_then_project() {
        let scan = Arc::new(LogicalPlan::DataFrameScan { df: df() });
        let filtered = Arc::new(LogicalPlan::Filter {
            input: scan,
            predicate: col("a").gt(lit(2_i64)),
        });
        let plan = LogicalPlan::Projection {
            input: filtered,
            exprs: vec![col("b")],
            kind: ProjectionKind::Select,
        };
        let out = run(&plan, None);
        assert_eq!(out.num_columns(), 1);
        let b = out.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(b.value(0), "y");
        assert_eq!(b.value(1), "z");
    }

    #[test]
    fn fetch_limits_in_memory_scan() {
        let plan = LogicalPlan::DataFrameScan { df: df() };
        assert_eq!(run(&plan, Some(2)).num_rows(), 2);
        assert_eq!(run(&plan, Some(10)).num_rows(), 4);
        assert_eq!(run(&plan, Some(0)).num_columns(), 2);
    }

    #[test]
    fn cached_subplan_is_shared() {
        let cached = Arc::new(LogicalPlan::Cache {
            input: Arc::new(LogicalPlan::DataFrameScan { df: df() }),
            id: 7,
        });
        let plan = LogicalPlan::Reverse { input: cached };
        let physical = compile(&plan, None).unwrap();
        let executor = Executor::new(ExecOptions::default());
        executor.execute(&physical).unwrap();
        assert!(executor.cache.borrow().contains_key(&7));
        let out = executor.execute(&physical).unwrap();
        let a = out.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(a.value(0), 4);
    }
}
