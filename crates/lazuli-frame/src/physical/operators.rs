use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, ListArray, Scalar as ArrowScalar, StringArray,
    UInt32Array,
};
use arrow::compute::kernels::zip::zip;
use arrow::compute::{
    concat, filter_record_batch, lexsort_to_indices, sort_to_indices, take, take_record_batch,
    SortColumn, SortOptions as ArrowSortOptions,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::expr::Expr as E;
use crate::lazy::{ProjectionKind, SortKey, UniqueKeepStrategy};
use crate::physical::aggregate::{build_batch, group_indices};
use crate::physical::expr_eval::{broadcast, cast_array, is_scalar_like, ExprEval};
use crate::{DataFrameError, Expr, Result};

pub(crate) fn named_columns(batch: &RecordBatch) -> Vec<(String, ArrayRef)> {
    batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| (field.name().clone(), Arc::clone(column)))
        .collect()
}

pub(crate) fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| DataFrameError::column_not_found(name))
}

/// Evaluate a select or with_columns projection.
///
/// A select made only of literals and aggregations yields one row; anything
/// else keeps the input height and repeats scalar results.
pub(crate) fn project(
    eval: &ExprEval<'_>,
    batch: &RecordBatch,
    exprs: &[Expr],
    kind: ProjectionKind,
) -> Result<RecordBatch> {
    match kind {
        ProjectionKind::Select => {
            let exprs = exprs
                .iter()
                .flat_map(|expr| match expr {
                    E::Wildcard => batch
                        .schema()
                        .fields()
                        .iter()
                        .map(|f| E::Column(f.name().clone()))
                        .collect::<Vec<_>>(),
                    other => vec![other.clone()],
                })
                .collect::<Vec<_>>();
            let rows = if !exprs.is_empty() && exprs.iter().all(is_scalar_like) {
                1
            } else {
                batch.num_rows()
            };
            let columns = exprs
                .iter()
                .map(|expr| Ok((expr.output_name(), broadcast(eval.evaluate(expr)?, rows)?)))
                .collect::<Result<Vec<_>>>()?;
            build_batch(columns, rows)
        }
        ProjectionKind::WithColumns => {
            let mut columns = named_columns(batch);
            for expr in exprs {
                let name = expr.output_name();
                let array = eval.evaluate_full(expr)?;
                match columns.iter_mut().find(|(existing, _)| *existing == name) {
                    Some(slot) => slot.1 = array,
                    None => columns.push((name, array)),
                }
            }
            build_batch(columns, batch.num_rows())
        }
    }
}

pub(crate) fn filter(eval: &ExprEval<'_>, batch: &RecordBatch, predicate: &Expr) -> Result<RecordBatch> {
    let mask = eval.evaluate_full(predicate)?;
    let mask = if mask.data_type() == &DataType::Null {
        cast_array(&mask, &DataType::Boolean)?
    } else {
        mask
    };
    let mask = mask
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| {
            DataFrameError::type_mismatch(
                None::<String>,
                DataType::Boolean.to_string(),
                mask.data_type().to_string(),
            )
        })?;
    Ok(filter_record_batch(batch, mask)?)
}

/// Sort by one or more keys. With `maintain_order` rows that compare equal
/// keep their input order.
pub(crate) fn sort(
    eval: &ExprEval<'_>,
    batch: &RecordBatch,
    by: &SortKey,
    descending: &[bool],
    nulls_last: bool,
    maintain_order: bool,
) -> Result<RecordBatch> {
    let keys = match by {
        SortKey::Column(name) => vec![Arc::clone(column(batch, name)?)],
        SortKey::Exprs(exprs) => exprs
            .iter()
            .map(|e| eval.evaluate_full(e))
            .collect::<Result<Vec<_>>>()?,
    };
    if keys.is_empty() {
        return Ok(batch.clone());
    }

    let mut sort_columns = keys
        .into_iter()
        .enumerate()
        .map(|(i, values)| SortColumn {
            values,
            options: Some(ArrowSortOptions {
                descending: descending
                    .get(i)
                    .or(descending.last())
                    .copied()
                    .unwrap_or(false),
                nulls_first: !nulls_last,
            }),
        })
        .collect::<Vec<_>>();
    if maintain_order {
        sort_columns.push(SortColumn {
            values: Arc::new(UInt32Array::from_iter_values(0..batch.num_rows() as u32)),
            options: None,
        });
    }

    let indices = if sort_columns.len() == 1 {
        sort_to_indices(sort_columns[0].values.as_ref(), sort_columns[0].options, None)?
    } else {
        lexsort_to_indices(&sort_columns, None)?
    };
    Ok(take_record_batch(batch, &indices)?)
}

/// Rows `[offset, offset + len)`; a negative offset counts from the end.
pub(crate) fn slice(batch: &RecordBatch, offset: i64, len: Option<usize>) -> RecordBatch {
    let n = batch.num_rows();
    let start = if offset < 0 {
        n.saturating_sub(offset.unsigned_abs() as usize)
    } else {
        (offset as usize).min(n)
    };
    let end = len.map_or(n, |len| start.saturating_add(len).min(n));
    batch.slice(start, end - start)
}

pub(crate) fn reverse(batch: &RecordBatch) -> Result<RecordBatch> {
    let indices = UInt32Array::from_iter_values((0..batch.num_rows() as u32).rev());
    Ok(take_record_batch(batch, &indices)?)
}

pub(crate) fn drop_columns(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
    for name in columns {
        column(batch, name)?;
    }
    let schema = batch.schema();
    let keep = (0..schema.fields().len())
        .filter(|&i| !columns.contains(schema.field(i).name()))
        .collect::<Vec<_>>();
    Ok(batch.project(&keep)?)
}

pub(crate) fn drop_nulls(batch: &RecordBatch, subset: Option<&[String]>) -> Result<RecordBatch> {
    let names = match subset {
        Some(names) => names.to_vec(),
        None => batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect(),
    };

    let mut keep: Option<BooleanArray> = None;
    for name in &names {
        let valid = arrow::compute::is_not_null(column(batch, name)?.as_ref())?;
        keep = Some(match keep {
            None => valid,
            Some(acc) => arrow::compute::and(&acc, &valid)?,
        });
    }
    match keep {
        None => Ok(batch.clone()),
        Some(mask) => Ok(filter_record_batch(batch, &mask)?),
    }
}

fn list_len(list: &ListArray, i: usize) -> usize {
    if list.is_null(i) {
        0
    } else {
        list.value_length(i) as usize
    }
}

/// One row per list element. Null and empty lists produce a single null row;
/// exploded columns must agree on element counts row by row.
pub(crate) fn explode(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
    if columns.is_empty() {
        return Ok(batch.clone());
    }
    let schema = batch.schema();
    let mut lists = Vec::with_capacity(columns.len());
    for name in columns {
        let idx = schema
            .index_of(name)
            .map_err(|_| DataFrameError::column_not_found(name.clone()))?;
        let array = batch.column(idx);
        let list = array.as_any().downcast_ref::<ListArray>().ok_or_else(|| {
            DataFrameError::type_mismatch(
                Some(name.clone()),
                "List",
                array.data_type().to_string(),
            )
        })?;
        lists.push((idx, list));
    }

    let n = batch.num_rows();
    let (_, first) = lists[0];
    for (idx, list) in &lists[1..] {
        if (0..n).any(|i| list_len(list, i) != list_len(first, i)) {
            return Err(DataFrameError::schema_mismatch(format!(
                "exploded column '{}' does not match the element counts of '{}'",
                schema.field(*idx).name(),
                columns[0]
            )));
        }
    }

    let repeat = (0..n)
        .flat_map(|i| std::iter::repeat(i as u32).take(list_len(first, i).max(1)))
        .collect::<Vec<_>>();
    let repeat = UInt32Array::from(repeat);

    let mut out = Vec::with_capacity(batch.num_columns());
    for (idx, (field, array)) in schema.fields().iter().zip(batch.columns()).enumerate() {
        let exploded = match lists.iter().find(|(i, _)| *i == idx) {
            Some((_, list)) => {
                let offsets = list.value_offsets();
                let mut child = Vec::with_capacity(repeat.len());
                for i in 0..n {
                    let (start, end) = (offsets[i] as u32, offsets[i + 1] as u32);
                    if list.is_null(i) || start == end {
                        child.push(None);
                    } else {
                        child.extend((start..end).map(Some));
                    }
                }
                take(list.values().as_ref(), &UInt32Array::from(child), None)?
            }
            None => take(array.as_ref(), &repeat, None)?,
        };
        out.push((field.name().clone(), exploded));
    }
    build_batch(out, repeat.len())
}

fn fillable(column: &DataType, fill: &DataType) -> bool {
    column == fill || *column == DataType::Null || (column.is_numeric() && fill.is_numeric())
}

/// `fill` where `mask` is set, `column` elsewhere. `fill` has one row or
/// as many as `column`.
fn fill_where(column: &ArrayRef, mask: &BooleanArray, fill: &ArrayRef) -> Result<ArrayRef> {
    let target = if column.data_type() == &DataType::Null {
        fill.data_type().clone()
    } else {
        column.data_type().clone()
    };
    let column = cast_array(column, &target)?;
    let fill = cast_array(fill, &target)?;
    if fill.len() == 1 {
        Ok(zip(mask, &ArrowScalar::new(fill), &column)?)
    } else {
        Ok(zip(mask, &fill, &column)?)
    }
}

/// Replace nulls with `value` in every column whose type can hold it.
pub(crate) fn fill_null(eval: &ExprEval<'_>, batch: &RecordBatch, value: &Expr) -> Result<RecordBatch> {
    let fill = eval.evaluate(value)?;
    if fill.data_type() == &DataType::Null {
        return Ok(batch.clone());
    }
    let mut columns = named_columns(batch);
    for (_, array) in columns.iter_mut() {
        if !fillable(array.data_type(), fill.data_type()) {
            continue;
        }
        let mask = arrow::compute::is_null(array.as_ref())?;
        if mask.true_count() > 0 {
            *array = fill_where(array, &mask, &fill)?;
        }
    }
    build_batch(columns, batch.num_rows())
}

pub(crate) fn rename(batch: &RecordBatch, existing: &[String], new: &[String]) -> Result<RecordBatch> {
    for name in existing {
        column(batch, name)?;
    }
    let columns = named_columns(batch)
        .into_iter()
        .map(|(name, array)| match existing.iter().position(|e| *e == name) {
            Some(p) => (new[p].clone(), array),
            None => (name, array),
        })
        .collect();
    build_batch(columns, batch.num_rows())
}

/// Move rows by `periods` (down when positive). Vacated rows are null or
/// take `fill` when its type fits the column.
pub(crate) fn shift(
    eval: &ExprEval<'_>,
    batch: &RecordBatch,
    periods: i64,
    fill: Option<&Expr>,
) -> Result<RecordBatch> {
    let n = batch.num_rows() as i64;
    let periods = periods.clamp(-n, n);
    let sources = (0..n)
        .map(|i| {
            let src = i - periods;
            (0..n).contains(&src).then_some(src as u32)
        })
        .collect::<Vec<_>>();
    let vacated = BooleanArray::from(sources.iter().map(Option::is_none).collect::<Vec<_>>());
    let indices = UInt32Array::from(sources);
    let fill = fill.map(|f| eval.evaluate(f)).transpose()?;

    let mut columns = named_columns(batch);
    for (_, array) in columns.iter_mut() {
        let shifted = take(array.as_ref(), &indices, None)?;
        *array = match &fill {
            Some(fill)
                if fill.data_type() != &DataType::Null
                    && fillable(shifted.data_type(), fill.data_type()) =>
            {
                fill_where(&shifted, &vacated, fill)?
            }
            _ => shifted,
        };
    }
    build_batch(columns, batch.num_rows())
}

/// Deduplicate on `subset` (every column when `None`); survivors keep their
/// input order.
pub(crate) fn unique(
    batch: &RecordBatch,
    subset: Option<&[String]>,
    keep: UniqueKeepStrategy,
) -> Result<RecordBatch> {
    let keys = match subset {
        Some(names) => names
            .iter()
            .map(|name| column(batch, name).cloned())
            .collect::<Result<Vec<_>>>()?,
        None => batch.columns().to_vec(),
    };
    if keys.is_empty() {
        return Ok(batch.clone());
    }

    let groups = group_indices(&keys)?;
    let mut picked = groups
        .iter()
        .filter_map(|g| match keep {
            UniqueKeepStrategy::First | UniqueKeepStrategy::Any => g.first().copied(),
            UniqueKeepStrategy::Last => g.last().copied(),
            UniqueKeepStrategy::None => (g.len() == 1).then(|| g[0]),
        })
        .collect::<Vec<_>>();
    picked.sort_unstable();
    Ok(take_record_batch(batch, &UInt32Array::from(picked))?)
}

pub(crate) fn with_row_count(batch: &RecordBatch, name: &str, offset: u32) -> Result<RecordBatch> {
    if batch.column_by_name(name).is_some() {
        return Err(DataFrameError::schema_mismatch(format!(
            "row count column '{name}' already exists"
        )));
    }
    let n = batch.num_rows();
    if offset as u64 + n as u64 > u32::MAX as u64 + 1 {
        return Err(DataFrameError::invalid_operation(format!(
            "row count starting at {offset} overflows UInt32 for {n} rows"
        )));
    }
    let counts = UInt32Array::from_iter_values((0..n as u32).map(|i| offset + i));

    let mut columns = vec![(name.to_string(), Arc::new(counts) as ArrayRef)];
    columns.extend(named_columns(batch));
    build_batch(columns, n)
}

/// Wide to long: one block of rows per value column. Value columns of
/// different types are cast to `Utf8`.
pub(crate) fn unpivot(
    batch: &RecordBatch,
    id_vars: &[String],
    value_vars: &[String],
    variable_name: &str,
    value_name: &str,
) -> Result<RecordBatch> {
    for name in id_vars.iter().chain(value_vars) {
        column(batch, name)?;
    }
    let value_vars = if value_vars.is_empty() {
        batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .filter(|name| !id_vars.contains(name))
            .collect::<Vec<_>>()
    } else {
        value_vars.to_vec()
    };

    let n = batch.num_rows();
    let rows = n * value_vars.len();
    let repeat = UInt32Array::from_iter_values((0..value_vars.len()).flat_map(|_| 0..n as u32));

    let mut columns = Vec::with_capacity(id_vars.len() + 2);
    for id in id_vars {
        columns.push((id.clone(), take(column(batch, id)?.as_ref(), &repeat, None)?));
    }

    let variable = StringArray::from_iter_values(
        value_vars
            .iter()
            .flat_map(|v| std::iter::repeat(v.as_str()).take(n)),
    );
    columns.push((variable_name.to_string(), Arc::new(variable) as ArrayRef));

    let values = value_vars
        .iter()
        .map(|name| column(batch, name).cloned())
        .collect::<Result<Vec<_>>>()?;
    let same_type = values
        .windows(2)
        .all(|w| w[0].data_type() == w[1].data_type());
    let values = if same_type {
        values
    } else {
        values
            .iter()
            .map(|v| cast_array(v, &DataType::Utf8))
            .collect::<Result<Vec<_>>>()?
    };
    let value = if values.is_empty() {
        new_null_array(&DataType::Null, 0)
    } else {
        concat(&values.iter().map(|v| v.as_ref()).collect::<Vec<_>>())?
    };
    columns.push((value_name.to_string(), value));

    build_batch(columns, rows)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, ArrayRef, Int64Array, ListArray, StringArray, UInt32Array};
    use arrow::datatypes::{DataType, Field, Int64Type, Schema};
    use arrow::record_batch::RecordBatch;

    use super::*;
    use crate::expr::{col, lit};
    use crate::physical::expr_eval::EvalOptions;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("k", DataType::Utf8, true),
            Field::new("v", DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["a", "b", "a", "c"])) as ArrayRef,
                Arc::new(Int64Array::from(vec![Some(3), None, Some(1), Some(2)])) as ArrayRef,
            ],
        )
        .unwrap()
    }

    fn ints(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .iter()
            .collect()
    }

    #[test]
    fn select_of_aggregates_is_one_row() {
        let b = batch();
        let eval = ExprEval::new(&b, EvalOptions::default());
        let out = project(
            &eval,
            &b,
            &[col("v").sum(), lit(1).alias("one")],
            ProjectionKind::Select,
        )
        .unwrap();
        assert_eq!(out.num_rows(), 1);

        let err = project(&eval, &b, &[col("v"), col("v")], ProjectionKind::Select).unwrap_err();
        assert!(matches!(err, DataFrameError::SchemaMismatch { .. }));
    }

    #[test]
    fn with_columns_overwrites_in_place() {
        let b = batch();
        let eval = ExprEval::new(&b, EvalOptions::default());
        let out = project(
            &eval,
            &b,
            &[col("v").mul(lit(10)), lit("x").alias("tag")],
            ProjectionKind::WithColumns,
        )
        .unwrap();
        let names: Vec<_> = out.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["k", "v", "tag"]);
        assert_eq!(ints(&out, "v"), vec![Some(30), None, Some(10), Some(20)]);
    }

    #[test]
    fn stable_sort_keeps_ties_in_input_order() {
        let b = batch();
        let eval = ExprEval::new(&b, EvalOptions::default());
        let out = sort(&eval, &b, &SortKey::Column("k".into()), &[false], true, true).unwrap();
        assert_eq!(ints(&out, "v"), vec![Some(3), Some(1), None, Some(2)]);

        let out = sort(&eval, &b, &SortKey::Column("v".into()), &[true], true, false).unwrap();
        assert_eq!(ints(&out, "v"), vec![Some(3), Some(2), Some(1), None]);
    }

    #[test]
    fn negative_slice_counts_from_end() {
        let b = batch();
        assert_eq!(ints(&slice(&b, -1, Some(1)), "v"), vec![Some(2)]);
        assert_eq!(slice(&b, -10, Some(2)).num_rows(), 2);
        assert_eq!(slice(&b, 3, None).num_rows(), 1);
        assert_eq!(slice(&b, 9, Some(3)).num_rows(), 0);
    }

    #[test]
    fn shift_and_fill_null() {
        let b = batch();
        let eval = ExprEval::new(&b, EvalOptions::default());
        let out = shift(&eval, &b, 1, Some(&lit(0))).unwrap();
        assert_eq!(ints(&out, "v"), vec![Some(0), Some(3), None, Some(1)]);

        let out = fill_null(&eval, &b, &lit(-1)).unwrap();
        assert_eq!(ints(&out, "v"), vec![Some(3), Some(-1), Some(1), Some(2)]);
    }

    #[test]
    fn shift_beyond_the_height_vacates_every_row() {
        let b = batch();
        let eval = ExprEval::new(&b, EvalOptions::default());
        for periods in [i64::MIN, i64::MIN + 1, -4, 4, 9, i64::MAX] {
            let out = shift(&eval, &b, periods, Some(&lit(7))).unwrap();
            assert_eq!(ints(&out, "v"), vec![Some(7); 4], "periods={periods}");
        }
        let out = shift(&eval, &b, -3, None).unwrap();
        assert_eq!(ints(&out, "v"), vec![Some(2), None, None, None]);
    }

    #[test]
    fn unique_keep_strategies() {
        let b = batch();
        let subset = ["k".to_string()];
        let first = unique(&b, Some(&subset), UniqueKeepStrategy::First).unwrap();
        assert_eq!(ints(&first, "v"), vec![Some(3), None, Some(2)]);
        let last = unique(&b, Some(&subset), UniqueKeepStrategy::Last).unwrap();
        assert_eq!(ints(&last, "v"), vec![None, Some(1), Some(2)]);
        let none = unique(&b, Some(&subset), UniqueKeepStrategy::None).unwrap();
        assert_eq!(ints(&none, "v"), vec![None, Some(2)]);
    }

    #[test]
    fn row_count_is_prepended() {
        let out = with_row_count(&batch(), "nr", 10).unwrap();
        assert_eq!(out.schema().field(0).name(), "nr");
        let nr = out.column(0).as_any().downcast_ref::<UInt32Array>().unwrap();
        assert_eq!(nr.values().to_vec(), vec![10, 11, 12, 13]);
        assert!(with_row_count(&batch(), "v", 0).is_err());
    }

    #[test]
    fn explode_handles_empty_and_null_lists() {
        let lists = ListArray::from_iter_primitive::<Int64Type, _, _>(vec![
            Some(vec![Some(1), Some(2)]),
            Some(vec![]),
            None,
        ]);
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("xs", lists.data_type().clone(), true),
        ]));
        let b = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
                Arc::new(lists) as ArrayRef,
            ],
        )
        .unwrap();
        let out = explode(&b, &["xs".to_string()]).unwrap();
        assert_eq!(ints(&out, "id"), vec![Some(1), Some(1), Some(2), Some(3)]);
        assert_eq!(ints(&out, "xs"), vec![Some(1), Some(2), None, None]);

        let err = explode(&b, &["id".to_string()]).unwrap_err();
        assert!(matches!(err, DataFrameError::TypeMismatch { .. }));
    }

    #[test]
    fn unpivot_stacks_value_columns() {
        let out = unpivot(&batch(), &["k".to_string()], &[], "variable", "value").unwrap();
        assert_eq!(out.num_rows(), 4);
        let names: Vec<_> = out.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["k", "variable", "value"]);
    }

    #[test]
    fn drop_and_rename_require_existing_columns() {
        let b = batch();
        assert!(matches!(
            drop_columns(&b, &["nope".to_string()]).unwrap_err(),
            DataFrameError::ColumnNotFound { .. }
        ));
        let out = rename(&b, &["v".to_string()], &["value".to_string()]).unwrap();
        assert!(out.column_by_name("value").is_some());
        assert_eq!(drop_nulls(&b, None).unwrap().num_rows(), 3);
    }
}
