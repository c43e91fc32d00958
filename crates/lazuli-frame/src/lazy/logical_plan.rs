use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expr::{AggFunc, QuantileMethod};
use crate::io::{
    CsvReadOptions, CsvWriterOptions, ParquetReadOptions, ParquetWriterOptions, SinkOptions,
};
use crate::lazy::group_by::{DynamicSpec, RollingSpec};
use crate::lazy::join::{AsofJoinArgs, JoinArgs};
use crate::lazy::options::UniqueKeepStrategy;
use crate::{DataFrame, Expr};

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_cache_id() -> u64 {
    NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed)
}

/// How a projection node should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// Select columns/expressions, producing a new schema.
    Select,
    /// Add or overwrite columns, preserving existing columns.
    WithColumns,
}

/// Sort key of a `Sort` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortKey {
    /// Single column looked up by name.
    Column(String),
    /// One or more expressions evaluated per row.
    Exprs(Vec<Expr>),
}

/// Whole-frame reductions (`LazyFrame::max()` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReduceFunc {
    Max,
    Min,
    Sum,
    Mean,
    Median,
    Std { ddof: u8 },
    Var { ddof: u8 },
    Quantile { q: f64, method: QuantileMethod },
}

impl ReduceFunc {
    pub(crate) fn agg_func(&self) -> AggFunc {
        match *self {
            ReduceFunc::Max => AggFunc::Max,
            ReduceFunc::Min => AggFunc::Min,
            ReduceFunc::Sum => AggFunc::Sum,
            ReduceFunc::Mean => AggFunc::Mean,
            ReduceFunc::Median => AggFunc::Median,
            ReduceFunc::Std { ddof } => AggFunc::Std { ddof },
            ReduceFunc::Var { ddof } => AggFunc::Var { ddof },
            ReduceFunc::Quantile { q, method } => AggFunc::Quantile { q, method },
        }
    }
}

/// Destination of a `Sink` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SinkTarget {
    Csv {
        path: PathBuf,
        options: CsvWriterOptions,
        sink: SinkOptions,
    },
    Parquet {
        path: PathBuf,
        options: ParquetWriterOptions,
        sink: SinkOptions,
    },
}

/// Logical query plan nodes for `LazyFrame`.
///
/// Children are shared, so deriving a node from an existing plan never copies
/// the subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// Scan an in-memory `DataFrame`.
    DataFrameScan { df: DataFrame },
    /// Scan a CSV file. Projection and row limit live in `options`.
    CsvScan {
        path: PathBuf,
        options: CsvReadOptions,
        predicate: Option<Expr>,
    },
    /// Scan a Parquet file. Projection and row limit live in `options`.
    ParquetScan {
        path: PathBuf,
        options: ParquetReadOptions,
        predicate: Option<Expr>,
    },
    /// Projection node (select or with_columns).
    Projection {
        input: Arc<LogicalPlan>,
        exprs: Vec<Expr>,
        kind: ProjectionKind,
    },
    /// Filter node.
    Filter {
        input: Arc<LogicalPlan>,
        predicate: Expr,
    },
    /// Group keys and aggregations.
    Aggregate {
        input: Arc<LogicalPlan>,
        keys: Vec<Expr>,
        aggs: Vec<Expr>,
        maintain_order: bool,
    },
    /// First (`head`) or last `n` rows of every group.
    GroupSlice {
        input: Arc<LogicalPlan>,
        keys: Vec<Expr>,
        head: bool,
        n: usize,
    },
    /// One window per row, looking back from the index value.
    RollingAggregate {
        input: Arc<LogicalPlan>,
        spec: RollingSpec,
        aggs: Vec<Expr>,
    },
    /// Fixed or calendar windows over the index column.
    DynamicAggregate {
        input: Arc<LogicalPlan>,
        spec: DynamicSpec,
        aggs: Vec<Expr>,
    },
    Sort {
        input: Arc<LogicalPlan>,
        by: SortKey,
        descending: Vec<bool>,
        nulls_last: bool,
        maintain_order: bool,
    },
    /// Negative offsets count from the end.
    Slice {
        input: Arc<LogicalPlan>,
        offset: i64,
        len: Option<usize>,
    },
    Reverse { input: Arc<LogicalPlan> },
    Drop {
        input: Arc<LogicalPlan>,
        columns: Vec<String>,
    },
    /// Drop rows with a null in `subset` (every column when `None`).
    DropNulls {
        input: Arc<LogicalPlan>,
        subset: Option<Vec<String>>,
    },
    Explode {
        input: Arc<LogicalPlan>,
        columns: Vec<String>,
    },
    FillNull {
        input: Arc<LogicalPlan>,
        value: Expr,
    },
    Rename {
        input: Arc<LogicalPlan>,
        existing: Vec<String>,
        new: Vec<String>,
    },
    Shift {
        input: Arc<LogicalPlan>,
        periods: i64,
        fill: Option<Expr>,
    },
    Unique {
        input: Arc<LogicalPlan>,
        subset: Option<Vec<String>>,
        keep: UniqueKeepStrategy,
        maintain_order: bool,
    },
    /// Prepend a `UInt32` row counter.
    RowCount {
        input: Arc<LogicalPlan>,
        name: String,
        offset: u32,
    },
    Unpivot {
        input: Arc<LogicalPlan>,
        id_vars: Vec<String>,
        value_vars: Vec<String>,
        variable_name: String,
        value_name: String,
    },
    /// Evaluate `input` once per execution and reuse the result.
    Cache { input: Arc<LogicalPlan>, id: u64 },
    Join {
        left: Arc<LogicalPlan>,
        right: Arc<LogicalPlan>,
        left_on: Vec<Expr>,
        right_on: Vec<Expr>,
        args: JoinArgs,
    },
    AsofJoin {
        left: Arc<LogicalPlan>,
        right: Arc<LogicalPlan>,
        left_on: Expr,
        right_on: Expr,
        by_left: Vec<String>,
        by_right: Vec<String>,
        args: AsofJoinArgs,
    },
    Reduce {
        input: Arc<LogicalPlan>,
        func: ReduceFunc,
    },
    /// A plan already written out by a sink. It cannot be evaluated again.
    Sink {
        input: Arc<LogicalPlan>,
        target: SinkTarget,
    },
}

impl LogicalPlan {
    /// Short node name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalPlan::DataFrameScan { .. } => "dataframe_scan",
            LogicalPlan::CsvScan { .. } => "csv_scan",
            LogicalPlan::ParquetScan { .. } => "parquet_scan",
            LogicalPlan::Projection { .. } => "projection",
            LogicalPlan::Filter { .. } => "filter",
            LogicalPlan::Aggregate { .. } => "aggregate",
            LogicalPlan::GroupSlice { .. } => "group_slice",
            LogicalPlan::RollingAggregate { .. } => "rolling_aggregate",
            LogicalPlan::DynamicAggregate { .. } => "dynamic_aggregate",
            LogicalPlan::Sort { .. } => "sort",
            LogicalPlan::Slice { .. } => "slice",
            LogicalPlan::Reverse { .. } => "reverse",
            LogicalPlan::Drop { .. } => "drop",
            LogicalPlan::DropNulls { .. } => "drop_nulls",
            LogicalPlan::Explode { .. } => "explode",
            LogicalPlan::FillNull { .. } => "fill_null",
            LogicalPlan::Rename { .. } => "rename",
            LogicalPlan::Shift { .. } => "shift",
            LogicalPlan::Unique { .. } => "unique",
            LogicalPlan::RowCount { .. } => "row_count",
            LogicalPlan::Unpivot { .. } => "unpivot",
            LogicalPlan::Cache { .. } => "cache",
            LogicalPlan::Join { .. } => "join",
            LogicalPlan::AsofJoin { .. } => "asof_join",
            LogicalPlan::Reduce { .. } => "reduce",
            LogicalPlan::Sink { .. } => "sink",
        }
    }

    /// Direct children, left to right.
    pub fn inputs(&self) -> Vec<&Arc<LogicalPlan>> {
        match self {
            LogicalPlan::DataFrameScan { .. }
            | LogicalPlan::CsvScan { .. }
            | LogicalPlan::ParquetScan { .. } => Vec::new(),
            LogicalPlan::Join { left, right, .. } | LogicalPlan::AsofJoin { left, right, .. } => {
                vec![left, right]
            }
            LogicalPlan::Projection { input, .. }
            | LogicalPlan::Filter { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::GroupSlice { input, .. }
            | LogicalPlan::RollingAggregate { input, .. }
            | LogicalPlan::DynamicAggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Slice { input, .. }
            | LogicalPlan::Reverse { input }
            | LogicalPlan::Drop { input, .. }
            | LogicalPlan::DropNulls { input, .. }
            | LogicalPlan::Explode { input, .. }
            | LogicalPlan::FillNull { input, .. }
            | LogicalPlan::Rename { input, .. }
            | LogicalPlan::Shift { input, .. }
            | LogicalPlan::Unique { input, .. }
            | LogicalPlan::RowCount { input, .. }
            | LogicalPlan::Unpivot { input, .. }
            | LogicalPlan::Cache { input, .. }
            | LogicalPlan::Reduce { input, .. }
            | LogicalPlan::Sink { input, .. } => vec![input],
        }
    }

    fn inputs_mut(&mut self) -> Vec<&mut Arc<LogicalPlan>> {
        match self {
            LogicalPlan::DataFrameScan { .. }
            | LogicalPlan::CsvScan { .. }
            | LogicalPlan::ParquetScan { .. } => Vec::new(),
            LogicalPlan::Join { left, right, .. } | LogicalPlan::AsofJoin { left, right, .. } => {
                vec![left, right]
            }
            LogicalPlan::Projection { input, .. }
            | LogicalPlan::Filter { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::GroupSlice { input, .. }
            | LogicalPlan::RollingAggregate { input, .. }
            | LogicalPlan::DynamicAggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Slice { input, .. }
            | LogicalPlan::Reverse { input }
            | LogicalPlan::Drop { input, .. }
            | LogicalPlan::DropNulls { input, .. }
            | LogicalPlan::Explode { input, .. }
            | LogicalPlan::FillNull { input, .. }
            | LogicalPlan::Rename { input, .. }
            | LogicalPlan::Shift { input, .. }
            | LogicalPlan::Unique { input, .. }
            | LogicalPlan::RowCount { input, .. }
            | LogicalPlan::Unpivot { input, .. }
            | LogicalPlan::Cache { input, .. }
            | LogicalPlan::Reduce { input, .. }
            | LogicalPlan::Sink { input, .. } => vec![input],
        }
    }

    /// Copy of this node with its children replaced, in `inputs()` order.
    pub(crate) fn with_new_inputs(&self, inputs: Vec<Arc<LogicalPlan>>) -> LogicalPlan {
        let mut plan = self.clone();
        for (slot, input) in plan.inputs_mut().into_iter().zip(inputs) {
            *slot = input;
        }
        plan
    }

    /// Copy of this node with `f` applied to every expression it owns.
    pub(crate) fn map_exprs(&self, f: &dyn Fn(&Expr) -> Expr) -> LogicalPlan {
        let map_all = |exprs: &[Expr]| exprs.iter().map(f).collect::<Vec<_>>();
        let mut plan = self.clone();
        match &mut plan {
            LogicalPlan::CsvScan { predicate, .. } | LogicalPlan::ParquetScan { predicate, .. } => {
                *predicate = predicate.as_ref().map(f);
            }
            LogicalPlan::Projection { exprs, .. } => *exprs = map_all(exprs),
            LogicalPlan::Filter { predicate, .. } => *predicate = f(&*predicate),
            LogicalPlan::Aggregate { keys, aggs, .. } => {
                *keys = map_all(keys);
                *aggs = map_all(aggs);
            }
            LogicalPlan::RollingAggregate { aggs, .. }
            | LogicalPlan::DynamicAggregate { aggs, .. } => *aggs = map_all(aggs),
            LogicalPlan::Sort {
                by: SortKey::Exprs(exprs),
                ..
            } => *exprs = map_all(exprs),
            LogicalPlan::FillNull { value, .. } => *value = f(&*value),
            _ => {}
        }
        plan
    }

    /// Render this plan as a readable string (used by `describe_plan()` and tests).
    pub fn display(&self) -> String {
        let mut out = String::new();
        self.fmt_into(&mut out, 0);
        out
    }

    fn fmt_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        match self {
            LogicalPlan::DataFrameScan { df } => {
                out.push_str(&format!(
                    "{pad}scan[dataframe columns={:?} rows={}]\n",
                    df.column_names(),
                    df.height()
                ));
            }
            LogicalPlan::CsvScan {
                path,
                options,
                predicate,
            } => {
                out.push_str(&format!("{pad}scan[csv path='{}']", path.display()));
                fmt_scan_details(out, options.projection.as_ref(), options.n_rows, predicate);
            }
            LogicalPlan::ParquetScan {
                path,
                options,
                predicate,
            } => {
                out.push_str(&format!("{pad}scan[parquet path='{}']", path.display()));
                fmt_scan_details(out, options.columns.as_ref(), options.n_rows, predicate);
            }
            LogicalPlan::Projection { exprs, kind, .. } => {
                let label = match kind {
                    ProjectionKind::Select => "project",
                    ProjectionKind::WithColumns => "with_columns",
                };
                out.push_str(&format!("{pad}{label} [{}]\n", fmt_exprs(exprs)));
            }
            LogicalPlan::Filter { predicate, .. } => {
                out.push_str(&format!("{pad}filter [{}]\n", fmt_expr(predicate)));
            }
            LogicalPlan::Aggregate {
                keys,
                aggs,
                maintain_order,
                ..
            } => {
                out.push_str(&format!(
                    "{pad}aggregate by=[{}] aggs=[{}]{}\n",
                    fmt_exprs(keys),
                    fmt_exprs(aggs),
                    if *maintain_order { " stable" } else { "" }
                ));
            }
            LogicalPlan::GroupSlice { keys, head, n, .. } => {
                let label = if *head { "head" } else { "tail" };
                out.push_str(&format!("{pad}group_{label}({n}) by=[{}]\n", fmt_exprs(keys)));
            }
            LogicalPlan::RollingAggregate { spec, aggs, .. } => {
                out.push_str(&format!(
                    "{pad}rolling index={} period={} offset={} closed={:?} by=[{}] aggs=[{}]\n",
                    spec.index_column,
                    spec.period,
                    spec.offset,
                    spec.closed,
                    fmt_exprs(&spec.by),
                    fmt_exprs(aggs)
                ));
            }
            LogicalPlan::DynamicAggregate { spec, aggs, .. } => {
                out.push_str(&format!(
                    "{pad}dynamic index={} every={} period={} offset={} closed={:?} label={:?} start_by={:?} by=[{}] aggs=[{}]\n",
                    spec.index_column,
                    spec.every,
                    spec.period,
                    spec.offset,
                    spec.closed,
                    spec.label,
                    spec.start_by,
                    fmt_exprs(&spec.by),
                    fmt_exprs(aggs)
                ));
            }
            LogicalPlan::Sort {
                by,
                descending,
                nulls_last,
                maintain_order,
                ..
            } => {
                let keys = match by {
                    SortKey::Column(name) => format!("col({name})"),
                    SortKey::Exprs(exprs) => fmt_exprs(exprs),
                };
                out.push_str(&format!(
                    "{pad}sort by=[{keys}] descending={descending:?} nulls_last={nulls_last} maintain_order={maintain_order}\n"
                ));
            }
            LogicalPlan::Slice { offset, len, .. } => match len {
                Some(len) => out.push_str(&format!("{pad}slice offset={offset} len={len}\n")),
                None => out.push_str(&format!("{pad}slice offset={offset}\n")),
            },
            LogicalPlan::Reverse { .. } => out.push_str(&format!("{pad}reverse\n")),
            LogicalPlan::Drop { columns, .. } => {
                out.push_str(&format!("{pad}drop {columns:?}\n"));
            }
            LogicalPlan::DropNulls { subset, .. } => match subset {
                Some(subset) => out.push_str(&format!("{pad}drop_nulls {subset:?}\n")),
                None => out.push_str(&format!("{pad}drop_nulls\n")),
            },
            LogicalPlan::Explode { columns, .. } => {
                out.push_str(&format!("{pad}explode {columns:?}\n"));
            }
            LogicalPlan::FillNull { value, .. } => {
                out.push_str(&format!("{pad}fill_null [{}]\n", fmt_expr(value)));
            }
            LogicalPlan::Rename { existing, new, .. } => {
                out.push_str(&format!("{pad}rename {existing:?} -> {new:?}\n"));
            }
            LogicalPlan::Shift { periods, fill, .. } => match fill {
                Some(fill) => out.push_str(&format!(
                    "{pad}shift periods={periods} fill=[{}]\n",
                    fmt_expr(fill)
                )),
                None => out.push_str(&format!("{pad}shift periods={periods}\n")),
            },
            LogicalPlan::Unique {
                subset,
                keep,
                maintain_order,
                ..
            } => {
                out.push_str(&format!(
                    "{pad}unique subset={subset:?} keep={keep:?} maintain_order={maintain_order}\n"
                ));
            }
            LogicalPlan::RowCount { name, offset, .. } => {
                out.push_str(&format!("{pad}row_count name={name} offset={offset}\n"));
            }
            LogicalPlan::Unpivot {
                id_vars,
                value_vars,
                variable_name,
                value_name,
                ..
            } => {
                out.push_str(&format!(
                    "{pad}unpivot id={id_vars:?} values={value_vars:?} as ({variable_name}, {value_name})\n"
                ));
            }
            LogicalPlan::Cache { id, .. } => out.push_str(&format!("{pad}cache id={id}\n")),
            LogicalPlan::Join {
                left_on,
                right_on,
                args,
                ..
            } => {
                out.push_str(&format!(
                    "{pad}join[{}] left_on=[{}] right_on=[{}] suffix={}\n",
                    args.how.as_str(),
                    fmt_exprs(left_on),
                    fmt_exprs(right_on),
                    args.suffix
                ));
            }
            LogicalPlan::AsofJoin {
                left_on,
                right_on,
                by_left,
                by_right,
                args,
                ..
            } => {
                out.push_str(&format!(
                    "{pad}join_asof[{:?}] left_on={} right_on={} by_left={by_left:?} by_right={by_right:?}",
                    args.strategy,
                    fmt_expr(left_on),
                    fmt_expr(right_on),
                ));
                if let Some(t) = args.tolerance_num {
                    out.push_str(&format!(" tolerance={t}"));
                }
                if let Some(t) = &args.tolerance_str {
                    out.push_str(&format!(" tolerance='{t}'"));
                }
                out.push('\n');
            }
            LogicalPlan::Reduce { func, .. } => {
                out.push_str(&format!("{pad}reduce {}\n", func.agg_func().name()));
            }
            LogicalPlan::Sink { target, .. } => match target {
                SinkTarget::Csv { path, .. } => {
                    out.push_str(&format!("{pad}sink[csv path='{}']\n", path.display()))
                }
                SinkTarget::Parquet { path, .. } => {
                    out.push_str(&format!("{pad}sink[parquet path='{}']\n", path.display()))
                }
            },
        }
        for input in self.inputs() {
            input.fmt_into(out, indent + 1);
        }
    }
}

fn fmt_scan_details(
    out: &mut String,
    projection: Option<&Vec<String>>,
    n_rows: Option<usize>,
    predicate: &Option<Expr>,
) {
    if let Some(projection) = projection {
        out.push_str(&format!(" projection={:?}", projection));
    }
    if let Some(n_rows) = n_rows {
        out.push_str(&format!(" n_rows={n_rows}"));
    }
    if let Some(predicate) = predicate {
        out.push_str(&format!(" filters=[{}]", fmt_expr(predicate)));
    }
    out.push('\n');
}

fn fmt_exprs(exprs: &[Expr]) -> String {
    exprs.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
}

pub(crate) fn fmt_expr(expr: &Expr) -> String {
    use crate::expr::{Expr as E, Scalar, UnaryOperator};

    match expr {
        E::Column(name) => format!("col({name})"),
        E::Literal(Scalar::Null) => "lit(null)".to_string(),
        E::Literal(Scalar::Boolean(v)) => format!("lit({v})"),
        E::Literal(Scalar::Int64(v)) => format!("lit({v})"),
        E::Literal(Scalar::Float64(v)) => format!("lit({v})"),
        E::Literal(Scalar::Utf8(v)) => format!("lit({v:?})"),
        E::Wildcard => "*".to_string(),
        E::Alias { expr, name } => format!("{} as {name}", fmt_expr(expr)),
        E::UnaryOp { op, expr } => {
            let f = match op {
                UnaryOperator::Not => "not",
                UnaryOperator::Neg => "neg",
                UnaryOperator::IsNull => "is_null",
                UnaryOperator::IsNotNull => "is_not_null",
            };
            format!("{f}({})", fmt_expr(expr))
        }
        E::BinaryOp { left, op, right } => {
            format!("({} {} {})", fmt_expr(left), op.symbol(), fmt_expr(right))
        }
        E::Agg { func, expr } => format!("{}({})", func.name(), fmt_expr(expr)),
        E::Cast { expr, dtype } => format!("cast({} as {dtype})", fmt_expr(expr)),
        E::MapDict { expr, mapping } => {
            format!("map_dict({}, {} entries)", fmt_expr(expr), mapping.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{LogicalPlan, ProjectionKind};
    use crate::expr::{col, lit};
    use crate::io::CsvReadOptions;

    fn csv_scan() -> Arc<LogicalPlan> {
        Arc::new(LogicalPlan::CsvScan {
            path: "data.csv".into(),
            options: CsvReadOptions::default().with_projection(["a", "b"]),
            predicate: None,
        })
    }

    #[test]
    fn display_is_readable_and_stable() {
        let plan = LogicalPlan::Filter {
            input: Arc::new(LogicalPlan::Projection {
                input: csv_scan(),
                exprs: vec![col("a"), col("b").alias("bb")],
                kind: ProjectionKind::Select,
            }),
            predicate: col("a").gt(lit(1_i64)),
        };

        let s = plan.display();
        assert!(s.contains("scan[csv"));
        assert!(s.contains("project"));
        assert!(s.contains("filter"));
        assert!(s.contains("col(a)"));
        assert_eq!(s, plan.display());
    }

    #[test]
    fn with_new_inputs_replaces_children_only() {
        let scan = csv_scan();
        let plan = LogicalPlan::Slice {
            input: scan.clone(),
            offset: 0,
            len: Some(3),
        };
        let other = Arc::new(LogicalPlan::Reverse { input: scan });
        let rebuilt = plan.with_new_inputs(vec![other.clone()]);
        match rebuilt {
            LogicalPlan::Slice { input, offset, len } => {
                assert!(Arc::ptr_eq(&input, &other));
                assert_eq!((offset, len), (0, Some(3)));
            }
            other => panic!("expected Slice, got {other:?}"),
        }
    }

    #[test]
    fn plans_serialize_through_json() {
        let plan = LogicalPlan::Filter {
            input: csv_scan(),
            predicate: col("a").gt(lit(1_i64)),
        };
        let bytes = serde_json::to_vec(&plan).unwrap();
        let back: LogicalPlan = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.display(), plan.display());
    }
}
