use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, Float64Array, Int64Array, ListArray, UInt32Array,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::row::{Row, RowConverter, SortField};

use crate::expr::{AggFunc, Expr as E, QuantileMethod};
use crate::lazy::ReduceFunc;
use crate::physical::expr_eval::{
    broadcast, cast_array, eval_binary, eval_unary, is_scalar_like, map_dict, ExprEval,
};
use crate::{DataFrameError, Expr, Result};

/// Apply `func` to every group of row indices in `values`.
///
/// The result has one row per group. Empty groups yield null (zero for
/// `count`/`sum`/`n_unique`, an empty list for `list`).
pub(crate) fn aggregate(func: AggFunc, values: &ArrayRef, groups: &[Vec<u32>]) -> Result<ArrayRef> {
    let nulls = values.logical_nulls();
    match func {
        AggFunc::Count => Ok(Arc::new(Int64Array::from_iter_values(groups.iter().map(
            |g| g.iter().filter(|&&i| is_valid(&nulls, i)).count() as i64,
        )))),
        AggFunc::First => pick(values, groups.iter().map(|g| g.first().copied())),
        AggFunc::Last => pick(values, groups.iter().map(|g| g.last().copied())),
        AggFunc::Min => extreme(values, groups, Ordering::Less),
        AggFunc::Max => extreme(values, groups, Ordering::Greater),
        AggFunc::NUnique => n_unique(values, groups),
        AggFunc::List => implode(values, groups),
        AggFunc::Sum => {
            require_numeric(values)?;
            let dtype = values.data_type();
            if dtype.is_integer() || matches!(dtype, DataType::Boolean | DataType::Null) {
                let ints = cast_array(values, &DataType::Int64)?;
                let ints = downcast_i64(&ints)?;
                Ok(Arc::new(Int64Array::from_iter_values(groups.iter().map(|g| {
                    g.iter()
                        .filter(|&&i| ints.is_valid(i as usize))
                        .fold(0_i64, |acc, &i| acc.wrapping_add(ints.value(i as usize)))
                }))))
            } else {
                float_agg(values, groups, |v| Some(v.iter().sum()))
            }
        }
        AggFunc::Mean => float_agg(values, groups, |v| {
            (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64)
        }),
        AggFunc::Median => float_agg(values, groups, |v| {
            quantile_of(sorted(v), 0.5, QuantileMethod::Linear)
        }),
        AggFunc::Quantile { q, method } => {
            if !(0.0..=1.0).contains(&q) {
                return Err(DataFrameError::invalid_operation(format!(
                    "quantile must be between 0 and 1, got {q}"
                )));
            }
            float_agg(values, groups, |v| quantile_of(sorted(v), q, method))
        }
        AggFunc::Var { ddof } => float_agg(values, groups, |v| variance(&v, ddof)),
        AggFunc::Std { ddof } => float_agg(values, groups, |v| variance(&v, ddof).map(f64::sqrt)),
    }
}

fn is_valid(nulls: &Option<NullBuffer>, i: u32) -> bool {
    nulls.as_ref().map_or(true, |n| n.is_valid(i as usize))
}

fn require_numeric(values: &ArrayRef) -> Result<()> {
    if is_numeric_like(values.data_type()) {
        Ok(())
    } else {
        Err(DataFrameError::type_mismatch(
            None::<String>,
            "numeric type",
            values.data_type().to_string(),
        ))
    }
}

pub(crate) fn is_numeric_like(dtype: &DataType) -> bool {
    dtype.is_numeric() || matches!(dtype, DataType::Boolean | DataType::Null)
}

fn downcast_i64(array: &ArrayRef) -> Result<&Int64Array> {
    array
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| DataFrameError::invalid_operation("bad Int64Array downcast"))
}

fn pick(values: &ArrayRef, indices: impl Iterator<Item = Option<u32>>) -> Result<ArrayRef> {
    let indices = UInt32Array::from(indices.collect::<Vec<_>>());
    Ok(take(values.as_ref(), &indices, None)?)
}

fn extreme(values: &ArrayRef, groups: &[Vec<u32>], keep: Ordering) -> Result<ArrayRef> {
    if values.data_type() == &DataType::Null {
        return Ok(new_null_array(&DataType::Null, groups.len()));
    }
    let nulls = values.logical_nulls();
    let converter = RowConverter::new(vec![SortField::new(values.data_type().clone())])?;
    let rows = converter.convert_columns(&[Arc::clone(values)])?;
    let picks = groups.iter().map(|g| {
        g.iter()
            .copied()
            .filter(|&i| is_valid(&nulls, i))
            .reduce(|best, i| {
                if rows.row(i as usize).cmp(&rows.row(best as usize)) == keep {
                    i
                } else {
                    best
                }
            })
    });
    pick(values, picks)
}

fn n_unique(values: &ArrayRef, groups: &[Vec<u32>]) -> Result<ArrayRef> {
    let converter = RowConverter::new(vec![SortField::new(values.data_type().clone())])?;
    let rows = converter.convert_columns(&[Arc::clone(values)])?;
    Ok(Arc::new(Int64Array::from_iter_values(groups.iter().map(
        |g| {
            g.iter()
                .map(|&i| rows.row(i as usize))
                .collect::<HashSet<Row<'_>>>()
                .len() as i64
        },
    ))))
}

fn implode(values: &ArrayRef, groups: &[Vec<u32>]) -> Result<ArrayRef> {
    let flat = groups.iter().flatten().copied().collect::<Vec<_>>();
    let taken = take(values.as_ref(), &UInt32Array::from(flat), None)?;
    let offsets = OffsetBuffer::<i32>::from_lengths(groups.iter().map(Vec::len));
    let field = Arc::new(Field::new("item", values.data_type().clone(), true));
    Ok(Arc::new(ListArray::try_new(field, offsets, taken, None)?))
}

fn float_agg(
    values: &ArrayRef,
    groups: &[Vec<u32>],
    f: impl Fn(Vec<f64>) -> Option<f64>,
) -> Result<ArrayRef> {
    require_numeric(values)?;
    let floats = cast_array(values, &DataType::Float64)?;
    let floats = floats
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| DataFrameError::invalid_operation("bad Float64Array downcast"))?;
    let out = groups
        .iter()
        .map(|g| {
            let group = g
                .iter()
                .filter(|&&i| floats.is_valid(i as usize))
                .map(|&i| floats.value(i as usize))
                .collect::<Vec<_>>();
            f(group)
        })
        .collect::<Float64Array>();
    Ok(Arc::new(out))
}

fn sorted(mut v: Vec<f64>) -> Vec<f64> {
    v.sort_by(f64::total_cmp);
    v
}

fn quantile_of(sorted: Vec<f64>, q: f64, method: QuantileMethod) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q * last as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    Some(match method {
        QuantileMethod::Nearest => sorted[pos.round() as usize],
        QuantileMethod::Lower => sorted[lo],
        QuantileMethod::Higher => sorted[hi],
        QuantileMethod::Midpoint => (sorted[lo] + sorted[hi]) / 2.0,
        QuantileMethod::Linear => sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo]),
    })
}

fn variance(v: &[f64], ddof: u8) -> Option<f64> {
    let n = v.len();
    if n <= ddof as usize {
        return None;
    }
    let mean = v.iter().sum::<f64>() / n as f64;
    let ss = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
    Some(ss / (n - ddof as usize) as f64)
}

/// Row indices of every distinct key tuple, in first-seen order.
pub(crate) fn group_indices(keys: &[ArrayRef]) -> Result<Vec<Vec<u32>>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let fields = keys
        .iter()
        .map(|k| SortField::new(k.data_type().clone()))
        .collect();
    let converter = RowConverter::new(fields)?;
    let rows = converter.convert_columns(keys)?;

    let mut slots: HashMap<Row<'_>, usize> = HashMap::new();
    let mut groups: Vec<Vec<u32>> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let slot = *slots.entry(row).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i as u32);
    }
    Ok(groups)
}

/// Evaluate `expr` once per group.
///
/// Aggregations reduce their input per group, literals repeat, and any
/// other expression is collected into a list per group.
pub(crate) fn eval_grouped(eval: &ExprEval<'_>, expr: &Expr, groups: &[Vec<u32>]) -> Result<ArrayRef> {
    if !expr.has_agg() {
        if is_scalar_like(expr) {
            return broadcast(eval.evaluate(expr)?, groups.len());
        }
        return aggregate(AggFunc::List, &eval.evaluate_full(expr)?, groups);
    }

    match expr {
        E::Alias { expr, .. } => eval_grouped(eval, expr, groups),
        E::Agg { func, expr } => {
            if expr.has_agg() {
                return Err(DataFrameError::invalid_operation(
                    "nested aggregations are not supported",
                ));
            }
            aggregate(*func, &eval.evaluate_full(expr)?, groups)
        }
        E::BinaryOp { left, op, right } => eval_binary(
            *op,
            eval_grouped(eval, left, groups)?,
            eval_grouped(eval, right, groups)?,
            eval.options().type_coercion,
        ),
        E::UnaryOp { op, expr } => eval_unary(*op, &eval_grouped(eval, expr, groups)?),
        E::Cast { expr, dtype } => cast_array(&eval_grouped(eval, expr, groups)?, dtype),
        E::MapDict { expr, mapping } => map_dict(&eval_grouped(eval, expr, groups)?, mapping),
        E::Column(_) | E::Literal(_) | E::Wildcard => Err(DataFrameError::invalid_operation(
            format!("cannot aggregate {expr:?}"),
        )),
    }
}

/// Assemble a batch from named columns; nullable fields throughout.
pub(crate) fn build_batch(columns: Vec<(String, ArrayRef)>, num_rows: usize) -> Result<RecordBatch> {
    let mut seen = HashSet::new();
    for (name, _) in &columns {
        if !seen.insert(name.as_str()) {
            return Err(DataFrameError::schema_mismatch(format!(
                "duplicate output column '{name}'"
            )));
        }
    }
    let fields = columns
        .iter()
        .map(|(name, array)| Field::new(name, array.data_type().clone(), true))
        .collect::<Vec<_>>();
    let arrays = columns.into_iter().map(|(_, array)| array).collect();
    let options = arrow::record_batch::RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}

fn take_all(columns: &[ArrayRef], indices: &UInt32Array) -> Result<Vec<ArrayRef>> {
    columns
        .iter()
        .map(|c| Ok(take(c.as_ref(), indices, None)?))
        .collect()
}

fn eval_keys(eval: &ExprEval<'_>, keys: &[Expr]) -> Result<(Vec<String>, Vec<ArrayRef>)> {
    let names = keys.iter().map(Expr::output_name).collect();
    let arrays = keys
        .iter()
        .map(|k| eval.evaluate_full(k))
        .collect::<Result<Vec<_>>>()?;
    Ok((names, arrays))
}

/// Group by `keys` and evaluate `aggs` per group. Groups come out in the
/// order their first row appears, so the output order is always stable.
pub(crate) fn group_aggregate(
    eval: &ExprEval<'_>,
    keys: &[Expr],
    aggs: &[Expr],
) -> Result<RecordBatch> {
    let (names, key_arrays) = eval_keys(eval, keys)?;
    let groups = group_indices(&key_arrays)?;

    let firsts = UInt32Array::from_iter_values(groups.iter().map(|g| g[0]));
    let mut columns = names
        .into_iter()
        .zip(take_all(&key_arrays, &firsts)?)
        .collect::<Vec<_>>();
    for agg in aggs {
        columns.push((agg.output_name(), eval_grouped(eval, agg, &groups)?));
    }
    build_batch(columns, groups.len())
}

/// First or last `n` rows of every group: key columns, then the rest.
pub(crate) fn group_slice(
    eval: &ExprEval<'_>,
    batch: &RecordBatch,
    keys: &[Expr],
    head: bool,
    n: usize,
) -> Result<RecordBatch> {
    let (names, key_arrays) = eval_keys(eval, keys)?;
    let groups = group_indices(&key_arrays)?;

    let mut picked = Vec::new();
    for g in &groups {
        let slice = if head {
            &g[..n.min(g.len())]
        } else {
            &g[g.len().saturating_sub(n)..]
        };
        picked.extend_from_slice(slice);
    }
    let indices = UInt32Array::from(picked);

    let mut columns = names
        .iter()
        .cloned()
        .zip(take_all(&key_arrays, &indices)?)
        .collect::<Vec<_>>();
    let schema = batch.schema();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if names.iter().any(|name| name == field.name()) {
            continue;
        }
        columns.push((
            field.name().clone(),
            take(column.as_ref(), &indices, None)?,
        ));
    }
    build_batch(columns, indices.len())
}

/// Reduce every column to a single row. Columns that are not numeric
/// reduce to a null of their own type.
pub(crate) fn reduce(batch: &RecordBatch, func: ReduceFunc) -> Result<RecordBatch> {
    let all = vec![(0..batch.num_rows() as u32).collect::<Vec<_>>()];
    let schema = batch.schema();
    let mut columns = Vec::with_capacity(batch.num_columns());
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let out = if is_numeric_like(field.data_type()) {
            aggregate(func.agg_func(), column, &all)?
        } else {
            new_null_array(field.data_type(), 1)
        };
        columns.push((field.name().clone(), out));
    }
    build_batch(columns, 1)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, ListArray, StringArray};

    use super::{aggregate, group_indices};
    use crate::expr::{AggFunc, QuantileMethod};
    use crate::DataFrameError;

    fn ints(values: Vec<Option<i64>>) -> ArrayRef {
        Arc::new(Int64Array::from(values))
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let keys: ArrayRef = Arc::new(StringArray::from(vec!["b", "a", "b", "c", "a"]));
        let groups = group_indices(&[keys]).unwrap();
        assert_eq!(groups, vec![vec![0, 2], vec![1, 4], vec![3]]);
    }

    #[test]
    fn sum_count_and_mean_skip_nulls() {
        let v = ints(vec![Some(1), None, Some(3), Some(4)]);
        let groups = vec![vec![0, 1, 2], vec![3]];

        let sum = aggregate(AggFunc::Sum, &v, &groups).unwrap();
        let sum = sum.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(sum.values().to_vec(), vec![4, 4]);

        let count = aggregate(AggFunc::Count, &v, &groups).unwrap();
        let count = count.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(count.values().to_vec(), vec![2, 1]);

        let mean = aggregate(AggFunc::Mean, &v, &groups).unwrap();
        let mean = mean.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(mean.value(0), 2.0);
    }

    #[test]
    fn quantile_methods_interpolate() {
        let v = ints(vec![Some(1), Some(2), Some(3), Some(4)]);
        let groups = vec![vec![0, 1, 2, 3]];
        let q = |method| {
            let out = aggregate(AggFunc::Quantile { q: 0.5, method }, &v, &groups).unwrap();
            out.as_any().downcast_ref::<Float64Array>().unwrap().value(0)
        };
        assert_eq!(q(QuantileMethod::Lower), 2.0);
        assert_eq!(q(QuantileMethod::Higher), 3.0);
        assert_eq!(q(QuantileMethod::Midpoint), 2.5);
        assert_eq!(q(QuantileMethod::Linear), 2.5);

        let err = aggregate(
            AggFunc::Quantile {
                q: 1.5,
                method: QuantileMethod::Linear,
            },
            &v,
            &groups,
        )
        .unwrap_err();
        assert!(matches!(err, DataFrameError::InvalidOperation { .. }));
    }

    #[test]
    fn std_with_too_few_rows_is_null() {
        let v = ints(vec![Some(2), Some(4), Some(9)]);
        let out = aggregate(AggFunc::Std { ddof: 1 }, &v, &[vec![0, 1], vec![2]]).unwrap();
        let out = out.as_any().downcast_ref::<Float64Array>().unwrap();
        assert!((out.value(0) - 2.0_f64.sqrt()).abs() < 1e-12);
        assert!(out.is_null(1));
    }

    #[test]
    fn min_max_work_on_strings() {
        let v: ArrayRef = Arc::new(StringArray::from(vec![Some("pear"), None, Some("apple")]));
        let out = aggregate(AggFunc::Max, &v, &[vec![0, 1, 2]]).unwrap();
        let out = out.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(out.value(0), "pear");

        let err = aggregate(AggFunc::Mean, &v, &[vec![0]]).unwrap_err();
        assert!(matches!(err, DataFrameError::TypeMismatch { .. }));
    }

    #[test]
    fn n_unique_counts_null_once() {
        let v = ints(vec![Some(1), None, Some(1), None, Some(2)]);
        let out = aggregate(AggFunc::NUnique, &v, &[vec![0, 1, 2, 3, 4]]).unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(out.value(0), 3);
    }

    #[test]
    fn list_collects_group_values() {
        let v = ints(vec![Some(1), Some(2), Some(3)]);
        let out = aggregate(AggFunc::List, &v, &[vec![0, 2], vec![1]]).unwrap();
        let out = out.as_any().downcast_ref::<ListArray>().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.value_length(0), 2);
        assert_eq!(out.value_length(1), 1);
    }
}
