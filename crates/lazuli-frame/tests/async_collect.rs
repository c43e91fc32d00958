mod common;

use common::{evaluator, frame, int_column, ints, lazy};
use lazuli_frame::{col, CollectOptions, DataFrameError, SortOptions};

#[tokio::test]
async fn collect_runs_off_the_async_thread() {
    let ev = evaluator();
    let lf = lazy(&ev, frame(vec![("a", ints(&[3, 1, 2]))]))
        .sort(SortOptions::new("a"))
        .unwrap();
    let out = lf.collect(CollectOptions::default()).await.unwrap();
    assert_eq!(int_column(&out, "a"), vec![Some(1), Some(2), Some(3)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_and_concurrent_collects() {
    let ev = evaluator();
    let lf = lazy(&ev, frame(vec![("a", ints(&[1, 2, 3, 4]))]));

    let fetched = lf.fetch(2, CollectOptions::default()).await.unwrap();
    assert_eq!(fetched.height(), 2);

    let (x, y) = tokio::join!(
        lf.collect(CollectOptions::default()),
        lf.collect(CollectOptions::default().with_no_optimization(true)),
    );
    assert_eq!(x.unwrap().to_arrow(), y.unwrap().to_arrow());
}

#[tokio::test]
async fn evaluation_errors_come_back_unchanged() {
    let ev = evaluator();
    let err = lazy(&ev, frame(vec![("a", ints(&[1]))]))
        .select(col("missing"))
        .unwrap()
        .collect(CollectOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DataFrameError::ColumnNotFound { .. }));
}
