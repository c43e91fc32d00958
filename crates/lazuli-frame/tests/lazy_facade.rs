mod common;

use std::sync::Arc;

use arrow::array::{ArrayRef, ListArray};
use arrow::datatypes::{DataType, Int64Type};
use common::{evaluator, float_column, frame, int_column, ints, lazy, str_column, strs};
use lazuli_frame::{col, lit, CollectOptions, DataFrameError, SortOptions, UniqueKeepStrategy, UniqueOptions};

fn foo_bar_ham() -> lazuli_frame::DataFrame {
    frame(vec![
        ("foo", ints(&[1, 2, 3])),
        ("bar", ints(&[6, 7, 8])),
        ("ham", strs(&["a", "b", "c"])),
    ])
}

#[test]
fn filter_keeps_matching_rows() {
    let ev = evaluator();
    let out = lazy(&ev, foo_bar_ham())
        .filter(col("foo").lt(lit(3)))
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();

    assert_eq!(out.height(), 2);
    assert_eq!(int_column(&out, "foo"), vec![Some(1), Some(2)]);
    assert_eq!(int_column(&out, "bar"), vec![Some(6), Some(7)]);
    assert_eq!(
        str_column(&out, "ham"),
        vec![Some("a".to_string()), Some("b".to_string())]
    );
}

#[test]
fn derived_frames_do_not_change_their_source() {
    let ev = evaluator();
    let lf = lazy(&ev, foo_bar_ham());
    let before = lf.describe_plan().unwrap();

    let _ = lf.sort("foo").unwrap();
    let _ = lf.with_column(col("foo").add(col("bar")).alias("sum")).unwrap();
    let _ = lf.drop("ham").unwrap();

    assert_eq!(lf.describe_plan().unwrap(), before);
    assert_eq!(lf.collect_sync(CollectOptions::default()).unwrap().height(), 3);
}

#[test]
fn head_and_limit_are_identical() {
    let ev = evaluator();
    let lf = lazy(&ev, foo_bar_ham());
    assert_eq!(
        lf.head(2).unwrap().describe_plan().unwrap(),
        lf.limit(2).unwrap().describe_plan().unwrap()
    );
    let out = lf.head(2).unwrap().collect_sync(CollectOptions::default()).unwrap();
    assert_eq!(int_column(&out, "foo"), vec![Some(1), Some(2)]);
}

#[test]
fn tail_and_last_count_from_the_end() {
    let ev = evaluator();
    let lf = lazy(&ev, foo_bar_ham());
    let tail = lf.tail(2).unwrap().collect_sync(CollectOptions::default()).unwrap();
    assert_eq!(int_column(&tail, "foo"), vec![Some(2), Some(3)]);
    let last = lf.last().unwrap().collect_sync(CollectOptions::default()).unwrap();
    assert_eq!(int_column(&last, "foo"), vec![Some(3)]);
}

#[test]
fn sort_descending_and_reverse() {
    let ev = evaluator();
    let lf = lazy(&ev, foo_bar_ham());
    let sorted = lf
        .sort(SortOptions::new("bar").with_descending(true))
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();
    assert_eq!(int_column(&sorted, "bar"), vec![Some(8), Some(7), Some(6)]);

    let reversed = lf.reverse().unwrap().collect_sync(CollectOptions::default()).unwrap();
    assert_eq!(int_column(&reversed, "foo"), vec![Some(3), Some(2), Some(1)]);
}

#[test]
fn with_columns_appends_and_replaces() {
    let ev = evaluator();
    let out = lazy(&ev, foo_bar_ham())
        .with_columns(vec![
            col("foo").mul(lit(10)).alias("foo"),
            col("bar").cast(DataType::Float64).alias("bar_f"),
        ])
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();
    assert_eq!(out.column_names(), vec!["foo", "bar", "ham", "bar_f"]);
    assert_eq!(int_column(&out, "foo"), vec![Some(10), Some(20), Some(30)]);
    assert_eq!(float_column(&out, "bar_f"), vec![Some(6.0), Some(7.0), Some(8.0)]);
}

#[test]
fn unique_true_keeps_first_in_order() {
    let ev = evaluator();
    let lf = lazy(
        &ev,
        frame(vec![("k", ints(&[3, 1, 3, 2, 1])), ("v", ints(&[1, 2, 3, 4, 5]))]),
    );
    assert_eq!(
        lf.unique(true).unwrap().describe_plan().unwrap(),
        lf.unique(
            UniqueOptions::default()
                .with_maintain_order(true)
                .with_keep(UniqueKeepStrategy::First)
        )
        .unwrap()
        .describe_plan()
        .unwrap()
    );

    let out = lf
        .unique(UniqueOptions::default().with_subset("k").with_keep(UniqueKeepStrategy::Last))
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();
    assert_eq!(int_column(&out, "k"), vec![Some(3), Some(2), Some(1)]);
    assert_eq!(int_column(&out, "v"), vec![Some(3), Some(4), Some(5)]);
}

#[test]
fn rename_shift_and_row_count() {
    let ev = evaluator();
    let out = lazy(&ev, foo_bar_ham())
        .rename(["foo", "bar"], ["f", "b"])
        .unwrap()
        .shift(1)
        .unwrap()
        .with_row_count(None, Some(10))
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();
    assert_eq!(out.column_names(), vec!["row_nr", "f", "b", "ham"]);
    assert_eq!(int_column(&out, "f"), vec![None, Some(1), Some(2)]);
    assert_eq!(out.column("row_nr").unwrap().dtype(), DataType::UInt32);
}

#[test]
fn fill_null_and_drop_nulls() {
    let ev = evaluator();
    let shifted = lazy(&ev, frame(vec![("a", ints(&[1, 2, 3]))]))
        .shift(-1)
        .unwrap();

    let filled = shifted
        .fill_null(lit(0))
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();
    assert_eq!(int_column(&filled, "a"), vec![Some(2), Some(3), Some(0)]);

    let dropped = shifted
        .drop_nulls()
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();
    assert_eq!(dropped.height(), 2);
}

#[test]
fn unpivot_produces_variable_and_value_columns() {
    let ev = evaluator();
    let out = lazy(
        &ev,
        frame(vec![("id", strs(&["x", "y"])), ("a", ints(&[1, 2])), ("b", ints(&[3, 4]))]),
    )
    .melt("id", ["a", "b"])
    .unwrap()
    .collect_sync(CollectOptions::default())
    .unwrap();
    assert_eq!(out.column_names(), vec!["id", "variable", "value"]);
    assert_eq!(out.height(), 4);
}

#[test]
fn column_wise_reductions() {
    let ev = evaluator();
    let lf = lazy(&ev, frame(vec![("a", ints(&[1, 2, 3, 4]))]));

    let sum = lf.sum().unwrap().collect_sync(CollectOptions::default()).unwrap();
    assert_eq!(int_column(&sum, "a"), vec![Some(10)]);

    let mean = lf.mean().unwrap().collect_sync(CollectOptions::default()).unwrap();
    assert_eq!(float_column(&mean, "a"), vec![Some(2.5)]);

    let max = lf.max().unwrap().collect_sync(CollectOptions::default()).unwrap();
    assert_eq!(int_column(&max, "a"), vec![Some(4)]);
}

#[test]
fn schema_and_columns_without_collecting() {
    let ev = evaluator();
    let lf = lazy(&ev, foo_bar_ham())
        .select(vec![col("ham"), col("foo").alias("f")])
        .unwrap();
    assert_eq!(lf.columns().unwrap(), vec!["ham", "f"]);
    assert_eq!(lf.schema().unwrap().field(1).data_type(), &DataType::Int64);
}

#[test]
fn fetch_limits_source_rows() {
    let ev = evaluator();
    let out = lazy(&ev, foo_bar_ham())
        .fetch_sync(2, CollectOptions::default())
        .unwrap();
    assert_eq!(out.height(), 2);
    assert_eq!(lazy(&ev, foo_bar_ham()).first().unwrap().height(), 1);
}

#[test]
fn missing_column_surfaces_on_evaluation() {
    let ev = evaluator();
    let lf = lazy(&ev, foo_bar_ham()).select("nope").unwrap();
    let err = lf.collect_sync(CollectOptions::default()).unwrap_err();
    assert!(matches!(err, DataFrameError::ColumnNotFound { .. }));
}

fn int_lists(rows: Vec<Vec<i64>>) -> ArrayRef {
    Arc::new(ListArray::from_iter_primitive::<Int64Type, _, _>(
        rows.into_iter()
            .map(|row| Some(row.into_iter().map(Some).collect::<Vec<_>>())),
    ))
}

#[test]
fn empty_explode_selection_explodes_every_column() {
    let ev = evaluator();
    let out = lazy(
        &ev,
        frame(vec![
            ("xs", int_lists(vec![vec![1, 2], vec![3], vec![]])),
            ("ys", int_lists(vec![vec![10, 20], vec![30], vec![]])),
        ]),
    )
    .explode(Vec::<&str>::new())
    .unwrap()
    .collect_sync(CollectOptions::default())
    .unwrap();

    assert_eq!(out.height(), 4);
    assert_eq!(int_column(&out, "xs"), vec![Some(1), Some(2), Some(3), None]);
    assert_eq!(int_column(&out, "ys"), vec![Some(10), Some(20), Some(30), None]);
}

#[test]
fn explode_single_column_repeats_the_others() {
    let ev = evaluator();
    let out = lazy(
        &ev,
        frame(vec![
            ("id", strs(&["a", "b"])),
            ("xs", int_lists(vec![vec![1, 2, 3], vec![4]])),
        ]),
    )
    .explode("xs")
    .unwrap()
    .collect_sync(CollectOptions::default())
    .unwrap();

    assert_eq!(out.column_names(), vec!["id", "xs"]);
    assert_eq!(int_column(&out, "xs"), vec![Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(
        str_column(&out, "id"),
        vec![
            Some("a".to_string()),
            Some("a".to_string()),
            Some("a".to_string()),
            Some("b".to_string())
        ]
    );
}

#[test]
fn shift_by_extreme_periods_vacates_every_row() {
    let ev = evaluator();
    let lf = lazy(&ev, frame(vec![("a", ints(&[1, 2, 3]))]));
    for periods in [i64::MIN, i64::MAX] {
        let out = lf
            .shift(periods)
            .unwrap()
            .collect_sync(CollectOptions::default())
            .unwrap();
        assert_eq!(int_column(&out, "a"), vec![None, None, None]);
    }
    let filled = lf
        .shift_and_fill(i64::MIN, lit(0))
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();
    assert_eq!(int_column(&filled, "a"), vec![Some(0), Some(0), Some(0)]);
}
