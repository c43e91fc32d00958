use std::path::PathBuf;

use crate::io::{CsvReadOptions, ParquetReadOptions};
use crate::lazy::{
    AsofJoinArgs, DynamicSpec, JoinArgs, LogicalPlan, ProjectionKind, ReduceFunc, RollingSpec,
    SinkTarget, SortKey, UniqueKeepStrategy,
};
use crate::{DataFrame, DataFrameError, Expr, Result};

/// Source for a physical scan operator.
#[derive(Debug, Clone)]
pub enum ScanSource {
    /// In-memory `DataFrame`, optionally limited to the first `n_rows`.
    DataFrame { df: DataFrame, n_rows: Option<usize> },
    /// CSV file; the predicate is applied right after reading.
    Csv {
        path: PathBuf,
        options: CsvReadOptions,
        predicate: Option<Expr>,
    },
    /// Parquet file; the predicate is applied right after reading.
    Parquet {
        path: PathBuf,
        options: ParquetReadOptions,
        predicate: Option<Expr>,
    },
}

/// Physical execution plan produced from a `LogicalPlan`.
#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    ScanExec {
        source: ScanSource,
    },
    ProjectionExec {
        input: Box<PhysicalPlan>,
        exprs: Vec<Expr>,
        kind: ProjectionKind,
    },
    FilterExec {
        input: Box<PhysicalPlan>,
        predicate: Expr,
    },
    AggregateExec {
        input: Box<PhysicalPlan>,
        keys: Vec<Expr>,
        aggs: Vec<Expr>,
    },
    GroupSliceExec {
        input: Box<PhysicalPlan>,
        keys: Vec<Expr>,
        head: bool,
        n: usize,
    },
    RollingExec {
        input: Box<PhysicalPlan>,
        spec: RollingSpec,
        aggs: Vec<Expr>,
    },
    DynamicExec {
        input: Box<PhysicalPlan>,
        spec: DynamicSpec,
        aggs: Vec<Expr>,
    },
    SortExec {
        input: Box<PhysicalPlan>,
        by: SortKey,
        descending: Vec<bool>,
        nulls_last: bool,
        maintain_order: bool,
    },
    SliceExec {
        input: Box<PhysicalPlan>,
        offset: i64,
        len: Option<usize>,
    },
    ReverseExec {
        input: Box<PhysicalPlan>,
    },
    DropExec {
        input: Box<PhysicalPlan>,
        columns: Vec<String>,
    },
    DropNullsExec {
        input: Box<PhysicalPlan>,
        subset: Option<Vec<String>>,
    },
    ExplodeExec {
        input: Box<PhysicalPlan>,
        columns: Vec<String>,
    },
    FillNullExec {
        input: Box<PhysicalPlan>,
        value: Expr,
    },
    RenameExec {
        input: Box<PhysicalPlan>,
        existing: Vec<String>,
        new: Vec<String>,
    },
    ShiftExec {
        input: Box<PhysicalPlan>,
        periods: i64,
        fill: Option<Expr>,
    },
    UniqueExec {
        input: Box<PhysicalPlan>,
        subset: Option<Vec<String>>,
        keep: UniqueKeepStrategy,
    },
    RowCountExec {
        input: Box<PhysicalPlan>,
        name: String,
        offset: u32,
    },
    UnpivotExec {
        input: Box<PhysicalPlan>,
        id_vars: Vec<String>,
        value_vars: Vec<String>,
        variable_name: String,
        value_name: String,
    },
    /// Shared subplan; the executor evaluates each id at most once.
    CacheExec {
        input: Box<PhysicalPlan>,
        id: u64,
    },
    JoinExec {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        left_on: Vec<Expr>,
        right_on: Vec<Expr>,
        args: JoinArgs,
    },
    AsofJoinExec {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        left_on: Expr,
        right_on: Expr,
        by_left: Vec<String>,
        by_right: Vec<String>,
        args: AsofJoinArgs,
    },
    ReduceExec {
        input: Box<PhysicalPlan>,
        func: ReduceFunc,
    },
}

fn cap(n_rows: Option<usize>, fetch: Option<usize>) -> Option<usize> {
    match (n_rows, fetch) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Compile a `LogicalPlan` into a `PhysicalPlan`.
///
/// `fetch` caps the number of rows every source scan produces.
pub fn compile(logical: &LogicalPlan, fetch: Option<usize>) -> Result<PhysicalPlan> {
    let child = |input: &LogicalPlan| compile(input, fetch).map(Box::new);

    let plan = match logical {
        LogicalPlan::DataFrameScan { df } => PhysicalPlan::ScanExec {
            source: ScanSource::DataFrame {
                df: df.clone(),
                n_rows: fetch,
            },
        },
        LogicalPlan::CsvScan {
            path,
            options,
            predicate,
        } => {
            let mut options = options.clone();
            options.n_rows = cap(options.n_rows, fetch);
            PhysicalPlan::ScanExec {
                source: ScanSource::Csv {
                    path: path.clone(),
                    options,
                    predicate: predicate.clone(),
                },
            }
        }
        LogicalPlan::ParquetScan {
            path,
            options,
            predicate,
        } => {
            let mut options = options.clone();
            options.n_rows = cap(options.n_rows, fetch);
            PhysicalPlan::ScanExec {
                source: ScanSource::Parquet {
                    path: path.clone(),
                    options,
                    predicate: predicate.clone(),
                },
            }
        }
        LogicalPlan::Projection { input, exprs, kind } => PhysicalPlan::ProjectionExec {
            input: child(input)?,
            exprs: exprs.clone(),
            kind: *kind,
        },
        LogicalPlan::Filter { input, predicate } => PhysicalPlan::FilterExec {
            input: child(input)?,
            predicate: predicate.clone(),
        },
        LogicalPlan::Aggregate {
            input, keys, aggs, ..
        } => PhysicalPlan::AggregateExec {
            input: child(input)?,
            keys: keys.clone(),
            aggs: aggs.clone(),
        },
        LogicalPlan::GroupSlice {
            input,
            keys,
            head,
            n,
        } => PhysicalPlan::GroupSliceExec {
            input: child(input)?,
            keys: keys.clone(),
            head: *head,
            n: *n,
        },
        LogicalPlan::RollingAggregate { input, spec, aggs } => PhysicalPlan::RollingExec {
            input: child(input)?,
            spec: spec.clone(),
            aggs: aggs.clone(),
        },
        LogicalPlan::DynamicAggregate { input, spec, aggs } => PhysicalPlan::DynamicExec {
            input: child(input)?,
            spec: spec.clone(),
            aggs: aggs.clone(),
        },
        LogicalPlan::Sort {
            input,
            by,
            descending,
            nulls_last,
            maintain_order,
        } => PhysicalPlan::SortExec {
            input: child(input)?,
            by: by.clone(),
            descending: descending.clone(),
            nulls_last: *nulls_last,
            maintain_order: *maintain_order,
        },
        LogicalPlan::Slice { input, offset, len } => PhysicalPlan::SliceExec {
            input: child(input)?,
            offset: *offset,
            len: *len,
        },
        LogicalPlan::Reverse { input } => PhysicalPlan::ReverseExec {
            input: child(input)?,
        },
        LogicalPlan::Drop { input, columns } => PhysicalPlan::DropExec {
            input: child(input)?,
            columns: columns.clone(),
        },
        LogicalPlan::DropNulls { input, subset } => PhysicalPlan::DropNullsExec {
            input: child(input)?,
            subset: subset.clone(),
        },
        LogicalPlan::Explode { input, columns } => PhysicalPlan::ExplodeExec {
            input: child(input)?,
            columns: columns.clone(),
        },
        LogicalPlan::FillNull { input, value } => PhysicalPlan::FillNullExec {
            input: child(input)?,
            value: value.clone(),
        },
        LogicalPlan::Rename {
            input,
            existing,
            new,
        } => PhysicalPlan::RenameExec {
            input: child(input)?,
            existing: existing.clone(),
            new: new.clone(),
        },
        LogicalPlan::Shift {
            input,
            periods,
            fill,
        } => PhysicalPlan::ShiftExec {
            input: child(input)?,
            periods: *periods,
            fill: fill.clone(),
        },
        LogicalPlan::Unique {
            input,
            subset,
            keep,
            ..
        } => PhysicalPlan::UniqueExec {
            input: child(input)?,
            subset: subset.clone(),
            keep: *keep,
        },
        LogicalPlan::RowCount {
            input,
            name,
            offset,
        } => PhysicalPlan::RowCountExec {
            input: child(input)?,
            name: name.clone(),
            offset: *offset,
        },
        LogicalPlan::Unpivot {
            input,
            id_vars,
            value_vars,
            variable_name,
            value_name,
        } => PhysicalPlan::UnpivotExec {
            input: child(input)?,
            id_vars: id_vars.clone(),
            value_vars: value_vars.clone(),
            variable_name: variable_name.clone(),
            value_name: value_name.clone(),
        },
        LogicalPlan::Cache { input, id } => PhysicalPlan::CacheExec {
            input: child(input)?,
            id: *id,
        },
        LogicalPlan::Join {
            left,
            right,
            left_on,
            right_on,
            args,
        } => PhysicalPlan::JoinExec {
            left: child(left)?,
            right: child(right)?,
            left_on: left_on.clone(),
            right_on: right_on.clone(),
            args: args.clone(),
        },
        LogicalPlan::AsofJoin {
            left,
            right,
            left_on,
            right_on,
            by_left,
            by_right,
            args,
        } => PhysicalPlan::AsofJoinExec {
            left: child(left)?,
            right: child(right)?,
            left_on: left_on.clone(),
            right_on: right_on.clone(),
            by_left: by_left.clone(),
            by_right: by_right.clone(),
            args: args.clone(),
        },
        LogicalPlan::Reduce { input, func } => PhysicalPlan::ReduceExec {
            input: child(input)?,
            func: *func,
        },
        LogicalPlan::Sink { target, .. } => {
            let path = match target {
                SinkTarget::Csv { path, .. } | SinkTarget::Parquet { path, .. } => path,
            };
            return Err(DataFrameError::contract(format!(
                "plan was already written to '{}' and cannot be evaluated again",
                path.display()
            )));
        }
    };
    Ok(plan)
}
