use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::lazy::{DynamicSpec, RollingSpec};
use crate::physical::aggregate::{build_batch, eval_grouped, group_indices};
use crate::physical::expr_eval::ExprEval;
use crate::physical::operators::column;
use crate::temporal::{index_values, ticks_to_array, Duration, IndexKind, Label, StartBy};
use crate::{DataFrameError, Expr, Result};

struct Index {
    name: String,
    kind: IndexKind,
    dtype: DataType,
    ticks: Vec<i64>,
}

impl Index {
    fn read(batch: &RecordBatch, name: &str) -> Result<Self> {
        let array = column(batch, name)?;
        let (kind, ticks) = index_values(array)?;
        let ticks = ticks.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
            DataFrameError::invalid_operation(format!("index column '{name}' contains nulls"))
        })?;
        Ok(Self {
            name: name.to_string(),
            kind,
            dtype: array.data_type().clone(),
            ticks,
        })
    }

    fn at(&self, row: u32) -> i64 {
        self.ticks[row as usize]
    }

    /// Index values of `group`, which must be ascending.
    fn sorted_ticks(&self, group: &[u32]) -> Result<Vec<i64>> {
        let ticks = group.iter().map(|&i| self.at(i)).collect::<Vec<_>>();
        if ticks.windows(2).any(|w| w[0] > w[1]) {
            return Err(DataFrameError::invalid_operation(format!(
                "index column '{}' must be sorted ascending within each group",
                self.name
            )));
        }
        Ok(ticks)
    }
}

/// `by` key columns and the row groups they induce. Without keys every row
/// belongs to one group.
fn partitions(
    eval: &ExprEval<'_>,
    by: &[Expr],
    num_rows: usize,
) -> Result<(Vec<(String, ArrayRef)>, Vec<Vec<u32>>)> {
    if by.is_empty() {
        let all = (0..num_rows as u32).collect::<Vec<_>>();
        return Ok((Vec::new(), vec![all]));
    }
    let keys = by
        .iter()
        .map(|e| Ok((e.output_name(), eval.evaluate_full(e)?)))
        .collect::<Result<Vec<_>>>()?;
    let arrays = keys.iter().map(|(_, a)| a.clone()).collect::<Vec<_>>();
    Ok((keys, group_indices(&arrays)?))
}

/// Members of `group` (with ascending `ticks`) inside the window.
fn members(
    group: &[u32],
    ticks: &[i64],
    lower: i64,
    upper: i64,
    contains: impl Fn(i64) -> bool,
) -> Vec<u32> {
    let start = ticks.partition_point(|&t| t < lower);
    let end = ticks.partition_point(|&t| t <= upper);
    group[start..end]
        .iter()
        .zip(&ticks[start..end])
        .filter(|(_, t)| contains(**t))
        .map(|(&row, _)| row)
        .collect()
}

fn take_keys(keys: &[(String, ArrayRef)], rows: &UInt32Array) -> Result<Vec<(String, ArrayRef)>> {
    keys.iter()
        .map(|(name, array)| Ok((name.clone(), take(array.as_ref(), rows, None)?)))
        .collect()
}

/// One window per row: `[t + offset, t + offset + period]`, bounds per
/// `closed`. Output is keys, index, then one column per aggregation.
pub(crate) fn rolling(
    eval: &ExprEval<'_>,
    batch: &RecordBatch,
    spec: &RollingSpec,
    aggs: &[Expr],
) -> Result<RecordBatch> {
    let index = Index::read(batch, &spec.index_column)?;
    let (keys, groups) = partitions(eval, &spec.by, batch.num_rows())?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    let mut windows = Vec::with_capacity(batch.num_rows());
    for group in &groups {
        let ticks = index.sorted_ticks(group)?;
        for (&row, &t) in group.iter().zip(&ticks) {
            let lower = spec.offset.add_to(t, index.kind)?;
            let upper = spec.period.add_to(lower, index.kind)?;
            windows.push(members(group, &ticks, lower, upper, |x| {
                spec.closed.contains(lower, upper, x)
            }));
            rows.push(row);
        }
    }

    let rows = UInt32Array::from(rows);
    let mut columns = take_keys(&keys, &rows)?;
    columns.push((
        index.name.clone(),
        take(column(batch, &index.name)?.as_ref(), &rows, None)?,
    ));
    for agg in aggs {
        columns.push((agg.output_name(), eval_grouped(eval, agg, &windows)?));
    }
    build_batch(columns, rows.len())
}

/// Start of the first window for a group whose first index value is `first`.
fn first_window_start(spec: &DynamicSpec, first: i64, kind: IndexKind) -> Result<i64> {
    if spec.start_by == StartBy::DataPoint {
        spec.every.add_to(first, kind)?;
        return Ok(first);
    }
    let truncated = spec.every.truncate(first, kind)?;
    match spec.start_by.weekday_offset() {
        Some(weekday) if spec.every.has_weeks() => {
            let week = Duration::weeks(1);
            let monday = week.truncate(first, kind)?;
            let start = Duration::days(weekday).add_to(monday, kind)?;
            if start > first {
                week.negate().add_to(start, kind)
            } else {
                Ok(start)
            }
        }
        _ => Ok(truncated),
    }
}

/// Windows every `every`, each `period` long and shifted by `offset`.
/// Empty windows are skipped.
pub(crate) fn dynamic(
    eval: &ExprEval<'_>,
    batch: &RecordBatch,
    spec: &DynamicSpec,
    aggs: &[Expr],
) -> Result<RecordBatch> {
    let index = Index::read(batch, &spec.index_column)?;
    let (keys, groups) = partitions(eval, &spec.by, batch.num_rows())?;

    let mut key_rows = Vec::new();
    let mut lowers = Vec::new();
    let mut uppers = Vec::new();
    let mut labels = Vec::new();
    let mut windows = Vec::new();
    for group in &groups {
        let ticks = index.sorted_ticks(group)?;
        let (Some(&first), Some(&last)) = (ticks.first(), ticks.last()) else {
            continue;
        };

        let mut start = first_window_start(spec, first, index.kind)?;
        loop {
            let lower = spec.offset.add_to(start, index.kind)?;
            if lower > last {
                break;
            }
            let upper = spec.period.add_to(lower, index.kind)?;
            let rows = members(group, &ticks, lower, upper, |x| {
                spec.closed.contains(lower, upper, x)
            });
            if let Some(&first_row) = rows.first() {
                let label = match spec.label {
                    Label::Left => lower,
                    Label::Right => upper,
                    Label::DataPoint => index.at(first_row),
                };
                key_rows.push(group[0]);
                lowers.push(Some(lower));
                uppers.push(Some(upper));
                labels.push(Some(label));
                windows.push(rows);
            }

            let next = spec.every.add_to(start, index.kind)?;
            if next <= start {
                return Err(DataFrameError::invalid_operation(format!(
                    "window step '{}' must be positive",
                    spec.every
                )));
            }
            start = next;
        }
    }

    let num_windows = windows.len();
    let mut columns = take_keys(&keys, &UInt32Array::from(key_rows))?;
    if spec.include_boundaries {
        columns.push(("_lower_boundary".to_string(), ticks_to_array(lowers, &index.dtype)?));
        columns.push(("_upper_boundary".to_string(), ticks_to_array(uppers, &index.dtype)?));
    }
    columns.push((index.name.clone(), ticks_to_array(labels, &index.dtype)?));
    for agg in aggs {
        columns.push((agg.output_name(), eval_grouped(eval, agg, &windows)?));
    }
    build_batch(columns, num_windows)
}
