#![allow(dead_code)]

use std::sync::{Arc, Once};

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use lazuli_frame::{DataFrame, Evaluator, LazyFrame, LocalEvaluator, Series};

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn evaluator() -> Arc<dyn Evaluator> {
    init_tracing();
    Arc::new(LocalEvaluator::default())
}

pub fn frame(columns: Vec<(&str, ArrayRef)>) -> DataFrame {
    DataFrame::new(
        columns
            .into_iter()
            .map(|(name, array)| Series::new(name, array))
            .collect(),
    )
    .unwrap()
}

pub fn lazy(evaluator: &Arc<dyn Evaluator>, df: DataFrame) -> LazyFrame {
    LazyFrame::from_dataframe_in(Arc::clone(evaluator), df)
}

pub fn ints(values: &[i64]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

pub fn strs(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

pub fn int_column(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
    let array = df.column(name).unwrap().to_array().unwrap();
    let array = array.as_any().downcast_ref::<Int64Array>().unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i)))
        .collect()
}

pub fn float_column(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    let array = df.column(name).unwrap().to_array().unwrap();
    let array = array.as_any().downcast_ref::<Float64Array>().unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i)))
        .collect()
}

pub fn str_column(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    let array = df.column(name).unwrap().to_array().unwrap();
    let array = array.as_any().downcast_ref::<StringArray>().unwrap();
    (0..array.len())
        .map(|i| array.is_valid(i).then(|| array.value(i).to_string()))
        .collect()
}
