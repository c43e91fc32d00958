mod common;

use common::{evaluator, frame, int_column, ints, lazy, strs};
use lazuli_frame::{col, lit, CollectOptions, JoinOptions, JoinType, OptFlags};

#[test]
fn no_optimization_turns_off_plan_rewrites() {
    let flags = OptFlags::from(CollectOptions::default().with_no_optimization(true));
    assert!(!flags.predicate_pushdown);
    assert!(!flags.projection_pushdown);
    assert!(!flags.slice_pushdown);
    assert!(!flags.comm_subplan_elim);
    assert!(!flags.comm_subexpr_elim);
    assert!(flags.type_coercion);
    assert!(flags.simplify_expression);
}

#[test]
fn streaming_turns_off_subplan_elimination_only() {
    let flags = OptFlags::from(CollectOptions::default().with_streaming(true));
    assert!(flags.streaming);
    assert!(!flags.comm_subplan_elim);
    assert!(flags.comm_subexpr_elim);
    assert!(flags.predicate_pushdown);
}

#[test]
fn results_do_not_depend_on_flags() {
    let ev = evaluator();
    let left = lazy(&ev, frame(vec![("k", ints(&[1, 2, 3])), ("v", ints(&[4, 5, 6]))]));
    let plan = left
        .join(&left, JoinOptions::new(JoinType::Inner).with_on("k"))
        .unwrap()
        .filter(col("v").gt(lit(1).add(lit(3))))
        .unwrap()
        .with_column(col("v").add(col("v")).mul(col("v").add(col("v"))).alias("sq"))
        .unwrap()
        .select(vec!["k", "sq"])
        .unwrap()
        .head(2)
        .unwrap();

    let optimized = plan.collect_sync(CollectOptions::default()).unwrap();
    let plain = plan
        .collect_sync(CollectOptions::default().with_no_optimization(true))
        .unwrap();
    let no_cse = plan
        .collect_sync(CollectOptions::default().with_comm_subexpr_elim(false))
        .unwrap();

    assert_eq!(int_column(&optimized, "k"), vec![Some(2), Some(3)]);
    assert_eq!(int_column(&optimized, "sq"), vec![Some(100), Some(144)]);
    assert_eq!(optimized.to_arrow(), plain.to_arrow());
    assert_eq!(optimized.to_arrow(), no_cse.to_arrow());
}

#[test]
fn type_coercion_widens_mixed_numeric_operands() {
    let ev = evaluator();
    let out = lazy(&ev, frame(vec![("a", ints(&[1, 2]))]))
        .with_column(col("a").add(lit(0.5)).alias("b"))
        .unwrap()
        .collect_sync(CollectOptions::default())
        .unwrap();
    assert_eq!(common::float_column(&out, "b"), vec![Some(1.5), Some(2.5)]);
}

#[test]
fn optimized_plan_folds_literals() {
    let ev = evaluator();
    let lf = lazy(&ev, frame(vec![("a", ints(&[1])), ("b", strs(&["x"]))]))
        .filter(col("a").gt(lit(1).add(lit(2))))
        .unwrap();
    assert!(lf.describe_plan().unwrap().contains("(lit(1) + lit(2))"));
    assert!(lf.describe_optimized_plan().unwrap().contains("lit(3)"));
}

#[test]
fn folding_keeps_integer_division_without_coercion() {
    let ev = evaluator();
    let lf = lazy(&ev, frame(vec![("a", ints(&[1, 2]))]))
        .with_column(lit(7).div(lit(2)).alias("q"))
        .unwrap();

    for simplify in [true, false] {
        let options = CollectOptions::default()
            .with_type_coercion(false)
            .with_simplify_expression(simplify);
        let out = lf.collect_sync(options).unwrap();
        assert_eq!(int_column(&out, "q"), vec![Some(3), Some(3)], "simplify={simplify}");
    }
}
