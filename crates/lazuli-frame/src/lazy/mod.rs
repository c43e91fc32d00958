mod group_by;
mod join;
mod lazyframe;
mod logical_plan;
mod optimizer;
mod options;

/// Group-by builder and window grouping options.
pub use group_by::{DynamicGroupOptions, DynamicSpec, LazyGroupBy, RollingOptions, RollingSpec};
/// Join options and their resolved forms.
pub use join::{
    AsofJoinArgs, AsofJoinOptions, AsofStrategy, JoinArgs, JoinOptions, JoinType, Tolerance,
    DEFAULT_JOIN_SUFFIX,
};
/// Lazy query API.
pub use lazyframe::LazyFrame;
/// Logical plan nodes and projection kinds.
pub use logical_plan::{LogicalPlan, ProjectionKind, ReduceFunc, SinkTarget, SortKey};
/// Logical plan optimizer.
pub use optimizer::Optimizer;
/// Terminal and transformation options.
pub use options::{
    CollectOptions, OptFlags, SliceOptions, SortOptions, UniqueKeepStrategy, UniqueOptions,
};
