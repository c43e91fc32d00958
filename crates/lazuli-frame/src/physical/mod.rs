mod aggregate;
mod executor;
mod expr_eval;
mod join;
mod operators;
mod plan;
mod sink;
mod window;

/// Physical plan executor and its runtime options.
pub use executor::{ExecOptions, Executor};
/// Expression evaluation switches.
pub use expr_eval::EvalOptions;
/// Physical plan compiler and plan node types.
pub use plan::{compile, PhysicalPlan, ScanSource};

pub(crate) use sink::{write_csv_sink, write_parquet_sink};
