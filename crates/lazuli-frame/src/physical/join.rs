use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use arrow::array::{Array, ArrayRef, Float64Array, UInt32Array};
use arrow::compute::kernels::zip::zip;
use arrow::compute::{take, take_record_batch};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::row::{Row, RowConverter, SortField};

use crate::lazy::{AsofJoinArgs, AsofStrategy, JoinArgs, JoinType};
use crate::physical::aggregate::build_batch;
use crate::physical::expr_eval::{cast_array, EvalOptions, ExprEval};
use crate::physical::operators::{column, named_columns};
use crate::temporal::{index_values, Duration};
use crate::{DataFrameError, Expr, Result};

/// `false` for rows where any key is null.
fn key_validity(keys: &[ArrayRef], len: usize) -> Vec<bool> {
    let mut valid = vec![true; len];
    for key in keys {
        if let Some(nulls) = key.logical_nulls() {
            for (i, v) in valid.iter_mut().enumerate() {
                *v &= nulls.is_valid(i);
            }
        }
    }
    valid
}

/// Left columns followed by right columns taken at the given row indices.
/// Right columns named in `skip_right` are dropped; others that collide with
/// a left name get `suffix`.
fn assemble(
    mut columns: Vec<(String, ArrayRef)>,
    right: &RecordBatch,
    right_idx: &UInt32Array,
    skip_right: &[&str],
    suffix: &str,
    num_rows: usize,
) -> Result<RecordBatch> {
    let left_names = columns
        .iter()
        .map(|(name, _)| name.clone())
        .collect::<HashSet<_>>();
    for (name, array) in named_columns(right) {
        if skip_right.contains(&name.as_str()) {
            continue;
        }
        let name = if left_names.contains(&name) {
            format!("{name}{suffix}")
        } else {
            name
        };
        columns.push((name, take(array.as_ref(), right_idx, None)?));
    }
    build_batch(columns, num_rows)
}

fn take_columns(batch: &RecordBatch, indices: &UInt32Array) -> Result<Vec<(String, ArrayRef)>> {
    named_columns(batch)
        .into_iter()
        .map(|(name, array)| Ok((name, take(array.as_ref(), indices, None)?)))
        .collect()
}

/// Equi or cross join of two evaluated inputs.
///
/// Null keys never match. Inner, left and outer joins drop right key columns
/// that are plain column references; the outer join fills the left key from
/// the right side for rows that only exist on the right.
pub(crate) fn join(
    left: &RecordBatch,
    right: &RecordBatch,
    left_on: &[Expr],
    right_on: &[Expr],
    args: &JoinArgs,
    options: EvalOptions,
) -> Result<RecordBatch> {
    let (n, m) = (left.num_rows(), right.num_rows());

    if args.how == JoinType::Cross {
        let li = UInt32Array::from_iter_values(
            (0..n as u32).flat_map(|i| std::iter::repeat(i).take(m)),
        );
        let ri = UInt32Array::from_iter_values((0..n).flat_map(|_| 0..m as u32));
        return assemble(take_columns(left, &li)?, right, &ri, &[], &args.suffix, n * m);
    }

    if left_on.len() != right_on.len() || left_on.is_empty() {
        return Err(DataFrameError::invalid_operation(format!(
            "{} join needs the same non-zero number of left and right keys",
            args.how.as_str()
        )));
    }

    let left_eval = ExprEval::new(left, options);
    let right_eval = ExprEval::new(right, options);
    let left_keys = left_on
        .iter()
        .map(|e| left_eval.evaluate_full(e))
        .collect::<Result<Vec<_>>>()?;
    let right_keys = right_on
        .iter()
        .zip(&left_keys)
        .map(|(e, l)| cast_array(&right_eval.evaluate_full(e)?, l.data_type()))
        .collect::<Result<Vec<_>>>()?;

    let converter = RowConverter::new(
        left_keys
            .iter()
            .map(|k| SortField::new(k.data_type().clone()))
            .collect(),
    )?;
    let left_rows = converter.convert_columns(&left_keys)?;
    let right_rows = converter.convert_columns(&right_keys)?;
    let left_valid = key_validity(&left_keys, n);
    let right_valid = key_validity(&right_keys, m);

    let mut table: HashMap<Row<'_>, Vec<u32>> = HashMap::new();
    for (j, row) in right_rows.iter().enumerate() {
        if right_valid[j] {
            table.entry(row).or_default().push(j as u32);
        }
    }

    let mut li: Vec<Option<u32>> = Vec::new();
    let mut ri: Vec<Option<u32>> = Vec::new();
    let mut right_matched = vec![false; m];
    for i in 0..n {
        let matches = if left_valid[i] {
            table.get(&left_rows.row(i))
        } else {
            None
        };
        match (args.how, matches) {
            (JoinType::Semi, Some(_)) | (JoinType::Anti, None) => li.push(Some(i as u32)),
            (JoinType::Semi, None) | (JoinType::Anti, Some(_)) => {}
            (_, Some(js)) => {
                for &j in js {
                    li.push(Some(i as u32));
                    ri.push(Some(j));
                    right_matched[j as usize] = true;
                }
            }
            (JoinType::Left | JoinType::Outer, None) => {
                li.push(Some(i as u32));
                ri.push(None);
            }
            (_, None) => {}
        }
    }

    if matches!(args.how, JoinType::Semi | JoinType::Anti) {
        return Ok(take_record_batch(left, &UInt32Array::from(li))?);
    }
    if args.how == JoinType::Outer {
        for (j, matched) in right_matched.iter().enumerate() {
            if !matched {
                li.push(None);
                ri.push(Some(j as u32));
            }
        }
    }

    let li = UInt32Array::from(li);
    let ri = UInt32Array::from(ri);
    let mut columns = take_columns(left, &li)?;

    if args.how == JoinType::Outer {
        let left_missing = arrow::compute::is_null(&li)?;
        for ((l, r), right_key) in left_on.iter().zip(right_on).zip(&right_keys) {
            let (Some(lname), Some(_)) = (l.as_column(), r.as_column()) else {
                continue;
            };
            if let Some(slot) = columns.iter_mut().find(|(name, _)| name == lname) {
                let from_right = take(right_key.as_ref(), &ri, None)?;
                slot.1 = zip(&left_missing, &from_right, &slot.1)?;
            }
        }
    }

    let skip_right = right_on
        .iter()
        .filter_map(Expr::as_column)
        .collect::<Vec<_>>();
    assemble(columns, right, &ri, &skip_right, &args.suffix, li.len())
}

trait AsofKey: Copy + PartialOrd {
    fn distance(self, other: Self) -> f64;
}

impl AsofKey for i64 {
    fn distance(self, other: Self) -> f64 {
        (self as i128 - other as i128).unsigned_abs() as f64
    }
}

impl AsofKey for f64 {
    fn distance(self, other: Self) -> f64 {
        (self - other).abs()
    }
}

/// Best right row for every left row, searching only the right rows of the
/// same `by` group and accepting keys within `bounds(left_key)`.
fn asof_search<T: AsofKey>(
    left: &[Option<T>],
    right: &[Option<T>],
    left_group: &[Option<usize>],
    right_groups: &[Vec<u32>],
    strategy: AsofStrategy,
    bounds: impl Fn(T) -> Result<(T, T)>,
) -> Result<Vec<Option<u32>>> {
    let sorted_groups = right_groups
        .iter()
        .map(|g| {
            let mut keyed = g
                .iter()
                .filter_map(|&j| right[j as usize].map(|k| (k, j)))
                .collect::<Vec<_>>();
            keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            keyed
        })
        .collect::<Vec<_>>();

    left.iter()
        .zip(left_group)
        .map(|(key, group)| {
            let (Some(key), Some(group)) = (*key, *group) else {
                return Ok(None);
            };
            let candidates = &sorted_groups[group];
            let backward = candidates
                .partition_point(|(k, _)| *k <= key)
                .checked_sub(1)
                .map(|p| candidates[p]);
            let forward = candidates
                .get(candidates.partition_point(|(k, _)| *k < key))
                .copied();
            let choice = match strategy {
                AsofStrategy::Backward => backward,
                AsofStrategy::Forward => forward,
                AsofStrategy::Nearest => match (backward, forward) {
                    (Some(b), Some(f)) if f.0.distance(key) < b.0.distance(key) => Some(f),
                    (b, f) => b.or(f),
                },
            };
            let (lo, hi) = bounds(key)?;
            Ok(choice.filter(|(k, _)| *k >= lo && *k <= hi).map(|(_, j)| j))
        })
        .collect()
}

/// Group index of every left row and the right rows of every group.
fn asof_groups(
    left: &RecordBatch,
    right: &RecordBatch,
    by_left: &[String],
    by_right: &[String],
) -> Result<(Vec<Option<usize>>, Vec<Vec<u32>>)> {
    if by_left.is_empty() {
        return Ok((
            vec![Some(0); left.num_rows()],
            vec![(0..right.num_rows() as u32).collect()],
        ));
    }
    if by_left.len() != by_right.len() {
        return Err(DataFrameError::invalid_operation(
            "asof join needs as many 'by' columns on the left as on the right",
        ));
    }

    let lby = by_left
        .iter()
        .map(|name| column(left, name).cloned())
        .collect::<Result<Vec<_>>>()?;
    let rby = by_right
        .iter()
        .zip(&lby)
        .map(|(name, l)| cast_array(column(right, name)?, l.data_type()))
        .collect::<Result<Vec<_>>>()?;

    let converter = RowConverter::new(
        lby.iter()
            .map(|k| SortField::new(k.data_type().clone()))
            .collect(),
    )?;
    let left_rows = converter.convert_columns(&lby)?;
    let right_rows = converter.convert_columns(&rby)?;

    let mut slots: HashMap<Row<'_>, usize> = HashMap::new();
    let mut groups: Vec<Vec<u32>> = Vec::new();
    for (j, row) in right_rows.iter().enumerate() {
        let slot = *slots.entry(row).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(j as u32);
    }
    let left_group = (0..left.num_rows())
        .map(|i| slots.get(&left_rows.row(i)).copied())
        .collect();
    Ok((left_group, groups))
}

/// As-of join: every left row takes at most one right row, chosen by key
/// proximity within its `by` group.
#[allow(clippy::too_many_arguments)]
pub(crate) fn join_asof(
    left: &RecordBatch,
    right: &RecordBatch,
    left_on: &Expr,
    right_on: &Expr,
    by_left: &[String],
    by_right: &[String],
    args: &AsofJoinArgs,
    options: EvalOptions,
) -> Result<RecordBatch> {
    let left_key = ExprEval::new(left, options).evaluate_full(left_on)?;
    let right_key = ExprEval::new(right, options).evaluate_full(right_on)?;
    let (left_group, right_groups) = asof_groups(left, right, by_left, by_right)?;

    let float_keys = left_key.data_type().is_floating() || right_key.data_type().is_floating();
    let matches = if float_keys {
        if args.tolerance_str.is_some() {
            return Err(DataFrameError::invalid_operation(
                "a duration tolerance needs an integer or temporal asof key",
            ));
        }
        let l = float_values(&left_key)?;
        let r = float_values(&right_key)?;
        let tol = args.tolerance_num;
        asof_search(&l, &r, &left_group, &right_groups, args.strategy, |v| {
            Ok(match tol {
                Some(t) => (v - t, v + t),
                None => (f64::NEG_INFINITY, f64::INFINITY),
            })
        })?
    } else {
        let (left_key, right_key) = if left_key.data_type().is_integer() {
            (
                cast_array(&left_key, &DataType::Int64)?,
                cast_array(&right_key, &DataType::Int64)?,
            )
        } else {
            let right_key = cast_array(&right_key, left_key.data_type())?;
            (left_key, right_key)
        };
        let (kind, l) = index_values(&left_key)?;
        let (_, r) = index_values(&right_key)?;
        let duration = args
            .tolerance_str
            .as_deref()
            .map(Duration::parse)
            .transpose()?;
        let tol = args.tolerance_num;
        asof_search(&l, &r, &left_group, &right_groups, args.strategy, |v| {
            if let Some(d) = &duration {
                return Ok((d.negate().add_to(v, kind)?, d.add_to(v, kind)?));
            }
            Ok(match tol {
                Some(t) => {
                    let t = t.floor() as i64;
                    (v.saturating_sub(t), v.saturating_add(t))
                }
                None => (i64::MIN, i64::MAX),
            })
        })?
    };

    let mut skip_right = by_right.iter().map(String::as_str).collect::<Vec<_>>();
    if let (Some(l), Some(r)) = (left_on.as_column(), right_on.as_column()) {
        if l == r {
            skip_right.push(r);
        }
    }
    let ri = UInt32Array::from(matches);
    assemble(
        named_columns(left),
        right,
        &ri,
        &skip_right,
        &args.suffix,
        left.num_rows(),
    )
}

fn float_values(array: &ArrayRef) -> Result<Vec<Option<f64>>> {
    let floats = cast_array(array, &DataType::Float64)?;
    let floats = floats
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| DataFrameError::invalid_operation("bad Float64Array downcast"))?;
    Ok(floats.iter().collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    use super::{join, join_asof};
    use crate::expr::col;
    use crate::lazy::{AsofJoinArgs, AsofStrategy, JoinArgs, JoinType, DEFAULT_JOIN_SUFFIX};
    use crate::physical::expr_eval::EvalOptions;

    fn frame(cols: Vec<(&str, ArrayRef)>) -> RecordBatch {
        let schema = Arc::new(Schema::new(
            cols.iter()
                .map(|(name, a)| Field::new(*name, a.data_type().clone(), true))
                .collect::<Vec<_>>(),
        ));
        RecordBatch::try_new(schema, cols.into_iter().map(|(_, a)| a).collect()).unwrap()
    }

    fn ints(values: Vec<Option<i64>>) -> ArrayRef {
        Arc::new(Int64Array::from(values))
    }

    fn args(how: JoinType) -> JoinArgs {
        JoinArgs {
            how,
            suffix: DEFAULT_JOIN_SUFFIX.to_string(),
            allow_parallel: true,
            force_parallel: false,
        }
    }

    fn names(batch: &RecordBatch) -> Vec<String> {
        batch.schema().fields().iter().map(|f| f.name().clone()).collect()
    }

    fn left() -> RecordBatch {
        frame(vec![
            ("id", ints(vec![Some(1), Some(2), None])),
            ("x", ints(vec![Some(10), Some(20), Some(30)])),
        ])
    }

    fn right() -> RecordBatch {
        frame(vec![
            ("id", ints(vec![Some(2), Some(3), None])),
            ("x", ints(vec![Some(200), Some(300), Some(400)])),
        ])
    }

    #[test]
    fn inner_join_drops_right_key_and_suffixes() {
        let out = join(&left(), &right(), &[col("id")], &[col("id")], &args(JoinType::Inner), EvalOptions::default()).unwrap();
        assert_eq!(names(&out), vec!["id", "x", "x_right"]);
        assert_eq!(out.num_rows(), 1);
    }

    #[test]
    fn null_keys_never_match() {
        let out = join(&left(), &right(), &[col("id")], &[col("id")], &args(JoinType::Left), EvalOptions::default()).unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.column(2).null_count(), 2);

        let anti = join(&left(), &right(), &[col("id")], &[col("id")], &args(JoinType::Anti), EvalOptions::default()).unwrap();
        assert_eq!(anti.num_rows(), 2);
        assert_eq!(names(&anti), vec!["id", "x"]);
    }

    #[test]
    fn outer_join_coalesces_keys() {
        let out = join(&left(), &right(), &[col("id")], &[col("id")], &args(JoinType::Outer), EvalOptions::default()).unwrap();
        assert_eq!(out.num_rows(), 5);
        let ids = out.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        let ids: Vec<_> = ids.iter().collect();
        assert_eq!(ids, vec![Some(1), Some(2), None, Some(3), None]);
    }

    #[test]
    fn cross_join_is_left_major() {
        let l = frame(vec![("a", Arc::new(StringArray::from(vec!["p", "q"])) as ArrayRef)]);
        let out = join(&l, &right(), &[], &[], &args(JoinType::Cross), EvalOptions::default()).unwrap();
        assert_eq!(out.num_rows(), 6);
        let a = out.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(a.value(2), "p");
        assert_eq!(a.value(3), "q");
    }

    #[test]
    fn asof_strategies_and_tolerance() {
        let l = frame(vec![("t", ints(vec![Some(1), Some(5), Some(10)]))]);
        let r = frame(vec![
            ("t", ints(vec![Some(0), Some(4), Some(6)])),
            ("v", ints(vec![Some(100), Some(400), Some(600)])),
        ]);
        let run = |strategy, tolerance_num| {
            let args = AsofJoinArgs {
                strategy,
                tolerance_num,
                tolerance_str: None,
                suffix: DEFAULT_JOIN_SUFFIX.to_string(),
                allow_parallel: true,
                force_parallel: false,
            };
            let out = join_asof(&l, &r, &col("t"), &col("t"), &[], &[], &args, EvalOptions::default()).unwrap();
            assert_eq!(names(&out), vec!["t", "v"]);
            let v = out.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
            v.iter().collect::<Vec<_>>()
        };
        assert_eq!(run(AsofStrategy::Backward, None), vec![Some(100), Some(400), Some(600)]);
        assert_eq!(run(AsofStrategy::Forward, None), vec![Some(400), Some(600), None]);
        assert_eq!(run(AsofStrategy::Nearest, None), vec![Some(100), Some(400), Some(600)]);
        assert_eq!(run(AsofStrategy::Backward, Some(2.0)), vec![Some(100), Some(400), None]);
    }

    #[test]
    fn asof_by_groups_restrict_matches() {
        let l = frame(vec![
            ("t", ints(vec![Some(5), Some(5)])),
            ("g", Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef),
        ]);
        let r = frame(vec![
            ("t", ints(vec![Some(1), Some(2)])),
            ("g", Arc::new(StringArray::from(vec!["b", "a"])) as ArrayRef),
            ("v", ints(vec![Some(1), Some(2)])),
        ]);
        let args = AsofJoinArgs {
            strategy: AsofStrategy::Backward,
            tolerance_num: None,
            tolerance_str: None,
            suffix: DEFAULT_JOIN_SUFFIX.to_string(),
            allow_parallel: true,
            force_parallel: false,
        };
        let by = ["g".to_string()];
        let out = join_asof(&l, &r, &col("t"), &col("t"), &by, &by, &args, EvalOptions::default()).unwrap();
        assert_eq!(names(&out), vec!["t", "g", "v"]);
        let v = out.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![Some(2), Some(1)]);
        assert_eq!(out.column(0).data_type(), &DataType::Int64);
    }
}
