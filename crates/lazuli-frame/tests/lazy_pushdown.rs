mod common;

use common::{frame, int_column, ints, str_column, strs};
use lazuli_frame::{col, lit, scan_csv, scan_parquet, write_parquet, CollectOptions};

fn s(v: &str) -> Option<String> {
    Some(v.to_string())
}

#[test]
fn csv_filter_and_projection_reach_the_scan() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    std::fs::write(&path, "a,b,c\n1,x,10\n2,y,20\n3,z,30\n").unwrap();

    let lf = scan_csv(&path)
        .unwrap()
        .filter(col("a").gt(lit(1)))
        .unwrap()
        .select("b")
        .unwrap();

    let plain = lf.describe_plan().unwrap();
    assert!(plain.contains("scan[csv"));
    assert!(!plain.contains("projection="));
    assert!(!plain.contains("filters=["));

    let optimized = lf.describe_optimized_plan().unwrap();
    assert!(optimized.contains("projection="));
    assert!(optimized.contains("filters=["));

    let fast = lf.collect_sync(CollectOptions::default()).unwrap();
    let slow = lf
        .collect_sync(CollectOptions::default().with_no_optimization(true))
        .unwrap();
    assert_eq!(str_column(&fast, "b"), vec![s("y"), s("z")]);
    assert_eq!(fast.to_arrow(), slow.to_arrow());
}

#[test]
fn parquet_head_limits_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.parquet");
    let df = frame(vec![("a", ints(&[1, 2, 3, 4])), ("b", strs(&["w", "x", "y", "z"]))]);
    write_parquet(&path, &df).unwrap();

    let lf = scan_parquet(&path).unwrap().head(2).unwrap();
    assert!(lf.describe_optimized_plan().unwrap().contains("n_rows=2"));

    let out = lf.collect_sync(CollectOptions::default()).unwrap();
    assert_eq!(int_column(&out, "a"), vec![Some(1), Some(2)]);
}

#[test]
fn fetch_caps_file_scans() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.csv");
    std::fs::write(&path, "a\n1\n2\n3\n4\n5\n").unwrap();

    let out = scan_csv(&path)
        .unwrap()
        .fetch_sync(3, CollectOptions::default())
        .unwrap();
    assert_eq!(int_column(&out, "a"), vec![Some(1), Some(2), Some(3)]);
}
