use std::collections::HashSet;
use std::sync::Arc;

use crate::expr::{Expr as E, Operator, Scalar, UnaryOperator};
use crate::lazy::logical_plan::{next_cache_id, SortKey};
use crate::lazy::{LogicalPlan, OptFlags, ProjectionKind};
use crate::Expr;

/// Optimizer that rewrites `LogicalPlan` according to a set of [`OptFlags`].
///
/// `type_coercion` and `comm_subexpr_elim` act during evaluation rather than
/// on the plan; they are read by the executor. Literal folding follows the
/// same coercion rules so a folded expression keeps its evaluated type.
pub struct Optimizer;

impl Optimizer {
    /// Optimize a `LogicalPlan` and return the rewritten plan.
    pub fn optimize(plan: &Arc<LogicalPlan>, flags: &OptFlags) -> Arc<LogicalPlan> {
        // Runs first: it relies on shared subtrees still being the same allocation.
        let mut plan = if flags.comm_subplan_elim {
            comm_subplan_elim(plan)
        } else {
            plan.clone()
        };
        if flags.simplify_expression {
            plan = simplify_plan(&plan, flags.type_coercion);
        }
        if flags.predicate_pushdown {
            plan = predicate_pushdown(&plan);
        }
        if flags.projection_pushdown {
            plan = projection_pushdown(&plan);
        }
        if flags.slice_pushdown {
            plan = slice_pushdown(&plan);
        }
        plan
    }
}

fn map_children(
    plan: &Arc<LogicalPlan>,
    f: impl Fn(&Arc<LogicalPlan>) -> Arc<LogicalPlan>,
) -> Arc<LogicalPlan> {
    let inputs = plan.inputs();
    if inputs.is_empty() {
        return plan.clone();
    }
    let new_inputs = inputs.into_iter().map(f).collect();
    Arc::new(plan.with_new_inputs(new_inputs))
}

fn comm_subplan_elim(plan: &Arc<LogicalPlan>) -> Arc<LogicalPlan> {
    match plan.as_ref() {
        LogicalPlan::Join { left, right, .. } | LogicalPlan::AsofJoin { left, right, .. }
            if Arc::ptr_eq(left, right) =>
        {
            let shared = comm_subplan_elim(left);
            let cached = match shared.as_ref() {
                LogicalPlan::Cache { .. } => shared,
                _ => Arc::new(LogicalPlan::Cache {
                    input: shared,
                    id: next_cache_id(),
                }),
            };
            Arc::new(plan.with_new_inputs(vec![cached.clone(), cached]))
        }
        _ => map_children(plan, comm_subplan_elim),
    }
}

fn simplify_plan(plan: &Arc<LogicalPlan>, coerce: bool) -> Arc<LogicalPlan> {
    let plan = map_children(plan, |input| simplify_plan(input, coerce));
    Arc::new(plan.map_exprs(&|expr| simplify_expr(expr, coerce)))
}

fn simplify_expr(expr: &Expr, coerce: bool) -> Expr {
    match expr {
        E::BinaryOp { left, op, right } => {
            let left = simplify_expr(left, coerce);
            let right = simplify_expr(right, coerce);
            if let (E::Literal(l), E::Literal(r)) = (&left, &right) {
                if let Some(folded) = fold_literals(*op, l, r, coerce) {
                    return E::Literal(folded);
                }
            }
            match (op, &left, &right) {
                (Operator::And, E::Literal(Scalar::Boolean(true)), other)
                | (Operator::And, other, E::Literal(Scalar::Boolean(true)))
                | (Operator::Or, E::Literal(Scalar::Boolean(false)), other)
                | (Operator::Or, other, E::Literal(Scalar::Boolean(false))) => other.clone(),
                (Operator::And, E::Literal(Scalar::Boolean(false)), _)
                | (Operator::And, _, E::Literal(Scalar::Boolean(false))) => {
                    E::Literal(Scalar::Boolean(false))
                }
                (Operator::Or, E::Literal(Scalar::Boolean(true)), _)
                | (Operator::Or, _, E::Literal(Scalar::Boolean(true))) => {
                    E::Literal(Scalar::Boolean(true))
                }
                _ => E::BinaryOp {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                },
            }
        }
        E::UnaryOp { op, expr } => {
            let inner = simplify_expr(expr, coerce);
            match (op, &inner) {
                (UnaryOperator::Not, E::Literal(Scalar::Boolean(v))) => {
                    E::Literal(Scalar::Boolean(!v))
                }
                (UnaryOperator::Neg, E::Literal(Scalar::Int64(v))) if *v != i64::MIN => {
                    E::Literal(Scalar::Int64(-v))
                }
                (UnaryOperator::Neg, E::Literal(Scalar::Float64(v))) => {
                    E::Literal(Scalar::Float64(-v))
                }
                _ => E::UnaryOp {
                    op: *op,
                    expr: Box::new(inner),
                },
            }
        }
        E::Alias { expr, name } => E::Alias {
            expr: Box::new(simplify_expr(expr, coerce)),
            name: name.clone(),
        },
        E::Agg { func, expr } => E::Agg {
            func: *func,
            expr: Box::new(simplify_expr(expr, coerce)),
        },
        E::Cast { expr, dtype } => E::Cast {
            expr: Box::new(simplify_expr(expr, coerce)),
            dtype: dtype.clone(),
        },
        E::MapDict { expr, mapping } => E::MapDict {
            expr: Box::new(simplify_expr(expr, coerce)),
            mapping: mapping.clone(),
        },
        E::Column(_) | E::Literal(_) | E::Wildcard => expr.clone(),
    }
}

/// Without coercion integer division stays integral and mixed numeric
/// operands are left for the executor to reject.
fn fold_literals(op: Operator, l: &Scalar, r: &Scalar, coerce: bool) -> Option<Scalar> {
    match (l, r) {
        (Scalar::Int64(a), Scalar::Int64(b)) => match op {
            Operator::Add => a.checked_add(*b).map(Scalar::Int64),
            Operator::Sub => a.checked_sub(*b).map(Scalar::Int64),
            Operator::Mul => a.checked_mul(*b).map(Scalar::Int64),
            Operator::Div if *b == 0 => None,
            Operator::Div if coerce => Some(Scalar::Float64(*a as f64 / *b as f64)),
            Operator::Div => a.checked_div(*b).map(Scalar::Int64),
            _ => compare(op, Some(a.cmp(b))),
        },
        (Scalar::Int64(_) | Scalar::Float64(_), Scalar::Int64(_) | Scalar::Float64(_))
            if coerce || matches!((l, r), (Scalar::Float64(_), Scalar::Float64(_))) =>
        {
            let a = as_f64(l)?;
            let b = as_f64(r)?;
            match op {
                Operator::Add => Some(Scalar::Float64(a + b)),
                Operator::Sub => Some(Scalar::Float64(a - b)),
                Operator::Mul => Some(Scalar::Float64(a * b)),
                Operator::Div => Some(Scalar::Float64(a / b)),
                _ => compare(op, a.partial_cmp(&b)),
            }
        }
        (Scalar::Utf8(a), Scalar::Utf8(b)) => compare(op, Some(a.cmp(b))),
        (Scalar::Boolean(a), Scalar::Boolean(b)) => match op {
            Operator::And => Some(Scalar::Boolean(*a && *b)),
            Operator::Or => Some(Scalar::Boolean(*a || *b)),
            _ => compare(op, Some(a.cmp(b))),
        },
        _ => None,
    }
}

fn compare(op: Operator, ordering: Option<std::cmp::Ordering>) -> Option<Scalar> {
    use std::cmp::Ordering::*;

    let ordering = ordering?;
    let v = match op {
        Operator::Eq => ordering == Equal,
        Operator::Neq => ordering != Equal,
        Operator::Gt => ordering == Greater,
        Operator::Lt => ordering == Less,
        Operator::Ge => ordering != Less,
        Operator::Le => ordering != Greater,
        _ => return None,
    };
    Some(Scalar::Boolean(v))
}

fn as_f64(s: &Scalar) -> Option<f64> {
    match s {
        Scalar::Int64(v) => Some(*v as f64),
        Scalar::Float64(v) => Some(*v),
        _ => None,
    }
}

fn predicate_pushdown(plan: &Arc<LogicalPlan>) -> Arc<LogicalPlan> {
    match plan.as_ref() {
        LogicalPlan::Filter { input, predicate } => {
            push_filter(predicate.clone(), &predicate_pushdown(input))
        }
        _ => map_children(plan, predicate_pushdown),
    }
}

/// Put `predicate` on top of `input` and sink it as far down as it can go.
fn push_filter(predicate: Expr, input: &Arc<LogicalPlan>) -> Arc<LogicalPlan> {
    let keep = |predicate: Expr| {
        Arc::new(LogicalPlan::Filter {
            input: input.clone(),
            predicate,
        })
    };
    // Aggregations see every input row; moving them would change their value.
    if predicate.has_agg() {
        return keep(predicate);
    }

    match input.as_ref() {
        LogicalPlan::Filter {
            input: inner,
            predicate: inner_predicate,
        } => push_filter(and_expr(inner_predicate.clone(), predicate), inner),
        LogicalPlan::Projection {
            input: inner,
            exprs,
            kind,
        } if can_push_filter_through_projection(&predicate, exprs, *kind) => {
            Arc::new(LogicalPlan::Projection {
                input: push_filter(predicate, inner),
                exprs: exprs.clone(),
                kind: *kind,
            })
        }
        LogicalPlan::Sort { input: inner, .. } | LogicalPlan::Reverse { input: inner } => {
            Arc::new(input.with_new_inputs(vec![push_filter(predicate, inner)]))
        }
        LogicalPlan::CsvScan {
            path,
            options,
            predicate: existing,
        } if options.n_rows.is_none() => Arc::new(LogicalPlan::CsvScan {
            path: path.clone(),
            options: options.clone(),
            predicate: Some(merge_predicate(existing.clone(), predicate)),
        }),
        LogicalPlan::ParquetScan {
            path,
            options,
            predicate: existing,
        } if options.n_rows.is_none() => Arc::new(LogicalPlan::ParquetScan {
            path: path.clone(),
            options: options.clone(),
            predicate: Some(merge_predicate(existing.clone(), predicate)),
        }),
        _ => keep(predicate),
    }
}

fn merge_predicate(existing: Option<Expr>, predicate: Expr) -> Expr {
    match existing {
        Some(existing) => and_expr(existing, predicate),
        None => predicate,
    }
}

fn and_expr(left: Expr, right: Expr) -> Expr {
    let mut conjuncts = Vec::new();
    conjuncts.extend(flatten_and(left));
    conjuncts.extend(flatten_and(right));
    build_and(conjuncts)
}

fn flatten_and(expr: Expr) -> Vec<Expr> {
    match expr {
        E::BinaryOp {
            left,
            op: Operator::And,
            right,
        } => {
            let mut out = flatten_and(*left);
            out.extend(flatten_and(*right));
            out
        }
        other => vec![other],
    }
}

fn build_and(conjuncts: Vec<Expr>) -> Expr {
    let mut iter = conjuncts.into_iter().rev();
    let Some(last) = iter.next() else {
        return E::Literal(Scalar::Boolean(true));
    };
    iter.fold(last, |acc, expr| E::BinaryOp {
        left: Box::new(expr),
        op: Operator::And,
        right: Box::new(acc),
    })
}

fn can_push_filter_through_projection(
    predicate: &Expr,
    exprs: &[Expr],
    kind: ProjectionKind,
) -> bool {
    if exprs.iter().any(Expr::has_agg) {
        return false;
    }
    let referenced = referenced_columns(predicate);

    match kind {
        ProjectionKind::Select => {
            let has_wildcard = exprs.iter().any(|e| matches!(e, E::Wildcard));
            referenced.iter().all(|name| {
                let producers = exprs
                    .iter()
                    .filter(|e| !matches!(e, E::Wildcard) && &e.output_name() == name)
                    .collect::<Vec<_>>();
                match producers.as_slice() {
                    [] => has_wildcard,
                    [E::Column(source)] => source == name,
                    _ => false,
                }
            })
        }
        ProjectionKind::WithColumns => {
            let assigned = exprs.iter().map(Expr::output_name).collect::<HashSet<_>>();
            !referenced.iter().any(|c| assigned.contains(c))
        }
    }
}

fn referenced_columns(expr: &Expr) -> HashSet<String> {
    let mut out = HashSet::new();
    collect_referenced_columns(expr, &mut out);
    out
}

/// Returns `false` when `expr` contains a wildcard (every column is needed).
fn collect_referenced_columns(expr: &Expr, out: &mut HashSet<String>) -> bool {
    match expr {
        E::Column(name) => {
            out.insert(name.clone());
            true
        }
        E::Alias { expr, .. }
        | E::UnaryOp { expr, .. }
        | E::Agg { expr, .. }
        | E::Cast { expr, .. }
        | E::MapDict { expr, .. } => collect_referenced_columns(expr, out),
        E::BinaryOp { left, right, .. } => {
            let l = collect_referenced_columns(left, out);
            let r = collect_referenced_columns(right, out);
            l && r
        }
        E::Literal(_) => true,
        E::Wildcard => false,
    }
}

fn projection_pushdown(plan: &Arc<LogicalPlan>) -> Arc<LogicalPlan> {
    push_projection(plan, RequiredColumns::All)
}

#[derive(Debug, Clone)]
enum RequiredColumns {
    All,
    Some(HashSet<String>),
}

impl RequiredColumns {
    fn of_exprs<'a>(exprs: impl IntoIterator<Item = &'a Expr>) -> Self {
        let mut needed = HashSet::new();
        for expr in exprs {
            if !collect_referenced_columns(expr, &mut needed) {
                return RequiredColumns::All;
            }
        }
        RequiredColumns::Some(needed)
    }

    fn union(self, other: Self) -> Self {
        match (self, other) {
            (RequiredColumns::All, _) | (_, RequiredColumns::All) => RequiredColumns::All,
            (RequiredColumns::Some(mut a), RequiredColumns::Some(b)) => {
                a.extend(b);
                RequiredColumns::Some(a)
            }
        }
    }
}

fn push_projection(plan: &Arc<LogicalPlan>, required: RequiredColumns) -> Arc<LogicalPlan> {
    let single = |input: &Arc<LogicalPlan>, required: RequiredColumns| {
        Arc::new(plan.with_new_inputs(vec![push_projection(input, required)]))
    };

    match plan.as_ref() {
        LogicalPlan::Projection {
            input,
            exprs,
            kind: ProjectionKind::Select,
        } => single(input, RequiredColumns::of_exprs(exprs)),
        LogicalPlan::Projection {
            input,
            exprs,
            kind: ProjectionKind::WithColumns,
        } => {
            let needed = match required {
                RequiredColumns::All => RequiredColumns::All,
                RequiredColumns::Some(mut cols) => {
                    // Assigned names come from the projection itself, not from below.
                    for expr in exprs {
                        cols.remove(&expr.output_name());
                    }
                    RequiredColumns::Some(cols).union(RequiredColumns::of_exprs(exprs))
                }
            };
            single(input, needed)
        }
        LogicalPlan::Filter { input, predicate } => single(
            input,
            required.union(RequiredColumns::of_exprs([predicate])),
        ),
        LogicalPlan::Aggregate {
            input, keys, aggs, ..
        } => single(input, RequiredColumns::of_exprs(keys.iter().chain(aggs))),
        LogicalPlan::Sort { input, by, .. } => {
            let keys = match by {
                SortKey::Column(name) => {
                    RequiredColumns::Some(HashSet::from([name.clone()]))
                }
                SortKey::Exprs(exprs) => RequiredColumns::of_exprs(exprs),
            };
            single(input, required.union(keys))
        }
        LogicalPlan::Slice { input, .. } | LogicalPlan::Reverse { input } => {
            single(input, required)
        }
        LogicalPlan::CsvScan {
            path,
            options,
            predicate,
        } => match scan_projection(options.projection.clone(), required, predicate) {
            Some(projection) => {
                let mut options = options.clone();
                options.projection = Some(projection);
                Arc::new(LogicalPlan::CsvScan {
                    path: path.clone(),
                    options,
                    predicate: predicate.clone(),
                })
            }
            None => plan.clone(),
        },
        LogicalPlan::ParquetScan {
            path,
            options,
            predicate,
        } => match scan_projection(options.columns.clone(), required, predicate) {
            Some(columns) => {
                let mut options = options.clone();
                options.columns = Some(columns);
                Arc::new(LogicalPlan::ParquetScan {
                    path: path.clone(),
                    options,
                    predicate: predicate.clone(),
                })
            }
            None => plan.clone(),
        },
        _ => map_children(plan, |input| push_projection(input, RequiredColumns::All)),
    }
}

/// New scan projection, or `None` to leave the scan as it is.
fn scan_projection(
    existing: Option<Vec<String>>,
    required: RequiredColumns,
    predicate: &Option<Expr>,
) -> Option<Vec<String>> {
    let filter_columns = match predicate {
        Some(p) => RequiredColumns::of_exprs([p]),
        None => RequiredColumns::Some(HashSet::new()),
    };
    let RequiredColumns::Some(needed) = required.union(filter_columns) else {
        return None;
    };
    if needed.is_empty() {
        return None;
    }

    let mut out = match existing {
        Some(existing) => existing
            .into_iter()
            .filter(|c| needed.contains(c))
            .collect::<Vec<_>>(),
        None => needed.into_iter().collect(),
    };
    if out.is_empty() {
        return None;
    }
    out.sort();
    Some(out)
}

fn slice_pushdown(plan: &Arc<LogicalPlan>) -> Arc<LogicalPlan> {
    match plan.as_ref() {
        LogicalPlan::Slice {
            input,
            offset,
            len: Some(len),
        } if *offset >= 0 => {
            let input = slice_pushdown(input);
            let limit = (*offset as usize).saturating_add(*len);
            let input = limit_scan(&input, limit).unwrap_or(input);
            Arc::new(plan.with_new_inputs(vec![input]))
        }
        _ => map_children(plan, slice_pushdown),
    }
}

/// Cap the scan under `plan` at `limit` rows when every node on the way keeps
/// rows one to one and in order.
fn limit_scan(plan: &Arc<LogicalPlan>, limit: usize) -> Option<Arc<LogicalPlan>> {
    match plan.as_ref() {
        LogicalPlan::CsvScan {
            path,
            options,
            predicate: None,
        } => {
            let mut options = options.clone();
            options.n_rows = Some(options.n_rows.map_or(limit, |n| n.min(limit)));
            Some(Arc::new(LogicalPlan::CsvScan {
                path: path.clone(),
                options,
                predicate: None,
            }))
        }
        LogicalPlan::ParquetScan {
            path,
            options,
            predicate: None,
        } => {
            let mut options = options.clone();
            options.n_rows = Some(options.n_rows.map_or(limit, |n| n.min(limit)));
            Some(Arc::new(LogicalPlan::ParquetScan {
                path: path.clone(),
                options,
                predicate: None,
            }))
        }
        LogicalPlan::Projection { input, exprs, .. } if !exprs.iter().any(Expr::has_agg) => {
            let inner = limit_scan(input, limit)?;
            Some(Arc::new(plan.with_new_inputs(vec![inner])))
        }
        LogicalPlan::Rename { input, .. }
        | LogicalPlan::Drop { input, .. }
        | LogicalPlan::FillNull { input, .. }
        | LogicalPlan::RowCount { input, .. } => {
            let inner = limit_scan(input, limit)?;
            Some(Arc::new(plan.with_new_inputs(vec![inner])))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Optimizer;
    use crate::expr::{col, lit};
    use crate::io::CsvReadOptions;
    use crate::lazy::join::{JoinArgs, JoinType};
    use crate::lazy::{LogicalPlan, OptFlags, ProjectionKind};

    fn scan() -> Arc<LogicalPlan> {
        Arc::new(LogicalPlan::CsvScan {
            path: "data.csv".into(),
            options: CsvReadOptions::default(),
            predicate: None,
        })
    }

    fn optimize(plan: LogicalPlan) -> Arc<LogicalPlan> {
        Optimizer::optimize(&Arc::new(plan), &OptFlags::default())
    }

    #[test]
    fn predicate_pushdown_moves_filter_into_scan() {
        let plan = LogicalPlan::Filter {
            input: scan(),
            predicate: col("a").gt(lit(1_i64)),
        };

        match optimize(plan).as_ref() {
            LogicalPlan::CsvScan { predicate, .. } => assert!(predicate.is_some()),
            other => panic!("expected CsvScan, got {other:?}"),
        }
    }

    #[test]
    fn predicate_pushdown_combines_multiple_filters_with_and() {
        let plan = LogicalPlan::Filter {
            input: Arc::new(LogicalPlan::Filter {
                input: scan(),
                predicate: col("a").gt(lit(1_i64)),
            }),
            predicate: col("b").lt(lit(10_i64)),
        };

        match optimize(plan).as_ref() {
            LogicalPlan::CsvScan {
                predicate: Some(p), ..
            } => {
                let s = format!("{p:?}");
                assert!(s.contains("And"));
            }
            other => panic!("expected CsvScan with predicate, got {other:?}"),
        }
    }

    #[test]
    fn predicate_pushdown_does_not_cross_select_when_column_not_selected() {
        let plan = LogicalPlan::Filter {
            input: Arc::new(LogicalPlan::Projection {
                input: scan(),
                exprs: vec![col("a")],
                kind: ProjectionKind::Select,
            }),
            predicate: col("b").gt(lit(1_i64)),
        };

        assert!(matches!(optimize(plan).as_ref(), LogicalPlan::Filter { .. }));
    }

    #[test]
    fn predicate_pushdown_does_not_cross_alias() {
        let plan = LogicalPlan::Filter {
            input: Arc::new(LogicalPlan::Projection {
                input: scan(),
                exprs: vec![col("a").alias("b")],
                kind: ProjectionKind::Select,
            }),
            predicate: col("b").gt(lit(1_i64)),
        };

        assert!(matches!(optimize(plan).as_ref(), LogicalPlan::Filter { .. }));
    }

    #[test]
    fn projection_pushdown_sets_scan_projection() {
        let plan = LogicalPlan::Projection {
            input: scan(),
            exprs: vec![col("b"), col("a")],
            kind: ProjectionKind::Select,
        };

        let s = optimize(plan).display();
        assert!(s.contains(r#"projection=["a", "b"]"#), "{s}");
    }

    #[test]
    fn projection_pushdown_skips_columns_created_by_with_columns() {
        let plan = LogicalPlan::Projection {
            input: Arc::new(LogicalPlan::Projection {
                input: scan(),
                exprs: vec![col("a").add(lit(1)).alias("c")],
                kind: ProjectionKind::WithColumns,
            }),
            exprs: vec![col("c")],
            kind: ProjectionKind::Select,
        };

        let s = optimize(plan).display();
        assert!(s.contains(r#"projection=["a"]"#), "{s}");
    }

    #[test]
    fn with_columns_under_full_output_keeps_every_column() {
        let plan = LogicalPlan::Projection {
            input: scan(),
            exprs: vec![col("a").add(lit(1)).alias("c")],
            kind: ProjectionKind::WithColumns,
        };

        assert!(!optimize(plan).display().contains("projection="));
    }

    #[test]
    fn slice_pushdown_limits_unfiltered_scan() {
        let plan = LogicalPlan::Slice {
            input: scan(),
            offset: 2,
            len: Some(3),
        };
        assert!(optimize(plan).display().contains("n_rows=5"));
    }

    #[test]
    fn simplify_folds_literals() {
        let plan = LogicalPlan::Filter {
            input: scan(),
            predicate: col("a").gt(lit(1).add(lit(2))).and_(lit(true)),
        };
        let s = optimize(plan).display();
        assert!(s.contains("filters=[(col(a) > lit(3))]"), "{s}");
    }

    #[test]
    fn integer_division_folds_by_the_coercion_rule() {
        let plan = Arc::new(LogicalPlan::Projection {
            input: scan(),
            exprs: vec![lit(7).div(lit(2)).alias("q"), lit(1).add(lit(0.5)).alias("m")],
            kind: ProjectionKind::Select,
        });

        let coerced = Optimizer::optimize(&plan, &OptFlags::default()).display();
        assert!(coerced.contains("lit(3.5)"), "{coerced}");
        assert!(coerced.contains("lit(1.5)"), "{coerced}");

        let strict = OptFlags {
            type_coercion: false,
            ..OptFlags::default()
        };
        let strict = Optimizer::optimize(&plan, &strict).display();
        assert!(strict.contains("lit(3)"), "{strict}");
        assert!(!strict.contains("lit(3.5)"), "{strict}");
        assert!(strict.contains("(lit(1) + lit(0.5))"), "{strict}");
    }

    #[test]
    fn disabled_flags_leave_plan_untouched() {
        let plan = Arc::new(LogicalPlan::Filter {
            input: scan(),
            predicate: col("a").gt(lit(1_i64)),
        });
        let flags = OptFlags {
            predicate_pushdown: false,
            projection_pushdown: false,
            simplify_expression: false,
            slice_pushdown: false,
            comm_subplan_elim: false,
            ..OptFlags::default()
        };
        let out = Optimizer::optimize(&plan, &flags);
        assert!(Arc::ptr_eq(&out, &plan));
    }

    #[test]
    fn self_join_shares_one_cached_input() {
        let side = scan();
        let plan = LogicalPlan::Join {
            left: side.clone(),
            right: side,
            left_on: vec![col("a")],
            right_on: vec![col("a")],
            args: JoinArgs {
                how: JoinType::Inner,
                suffix: "_right".to_string(),
                allow_parallel: true,
                force_parallel: false,
            },
        };
        match optimize(plan).as_ref() {
            LogicalPlan::Join { left, right, .. } => {
                match (left.as_ref(), right.as_ref()) {
                    (LogicalPlan::Cache { id: l, .. }, LogicalPlan::Cache { id: r, .. }) => {
                        assert_eq!(l, r)
                    }
                    other => panic!("expected cached inputs, got {other:?}"),
                }
            }
            other => panic!("expected Join, got {other:?}"),
        }
    }
}
