#[allow(clippy::module_inception)]
mod expr;
mod functions;
mod selection;

/// Expression AST and supporting enums.
pub use expr::{AggFunc, Expr, Operator, QuantileMethod, Scalar, UnaryOperator};
/// Expression builder helpers.
pub use functions::{all, col, cols, lit};
/// Selection normalisation.
pub use selection::{selection_to_exprs, selection_to_names, Selection, MAX_SELECTION_DEPTH};
