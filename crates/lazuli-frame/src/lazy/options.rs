use serde::{Deserialize, Serialize};

use crate::expr::{selection_to_exprs, Selection};
use crate::lazy::logical_plan::SortKey;
use crate::{DataFrameError, Expr, Result};

/// Options accepted by the terminal `collect` / `fetch` calls.
///
/// These are turned into [`OptFlags`] on every call; nothing is remembered
/// between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectOptions {
    pub type_coercion: bool,
    pub predicate_pushdown: bool,
    pub projection_pushdown: bool,
    pub simplify_expression: bool,
    pub slice_pushdown: bool,
    pub comm_subplan_elim: bool,
    pub comm_subexpr_elim: bool,
    pub streaming: bool,
    /// Turn off every rewrite that changes the plan shape.
    pub no_optimization: bool,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            type_coercion: true,
            predicate_pushdown: true,
            projection_pushdown: true,
            simplify_expression: true,
            slice_pushdown: true,
            comm_subplan_elim: true,
            comm_subexpr_elim: true,
            streaming: false,
            no_optimization: false,
        }
    }
}

impl CollectOptions {
    /// Set `no_optimization`.
    pub fn with_no_optimization(mut self, no_optimization: bool) -> Self {
        self.no_optimization = no_optimization;
        self
    }

    /// Set `streaming`.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Set `type_coercion`.
    pub fn with_type_coercion(mut self, type_coercion: bool) -> Self {
        self.type_coercion = type_coercion;
        self
    }

    /// Set `predicate_pushdown`.
    pub fn with_predicate_pushdown(mut self, predicate_pushdown: bool) -> Self {
        self.predicate_pushdown = predicate_pushdown;
        self
    }

    /// Set `projection_pushdown`.
    pub fn with_projection_pushdown(mut self, projection_pushdown: bool) -> Self {
        self.projection_pushdown = projection_pushdown;
        self
    }

    /// Set `simplify_expression`.
    pub fn with_simplify_expression(mut self, simplify_expression: bool) -> Self {
        self.simplify_expression = simplify_expression;
        self
    }

    /// Set `slice_pushdown`.
    pub fn with_slice_pushdown(mut self, slice_pushdown: bool) -> Self {
        self.slice_pushdown = slice_pushdown;
        self
    }

    /// Set `comm_subplan_elim`.
    pub fn with_comm_subplan_elim(mut self, comm_subplan_elim: bool) -> Self {
        self.comm_subplan_elim = comm_subplan_elim;
        self
    }

    /// Set `comm_subexpr_elim`.
    pub fn with_comm_subexpr_elim(mut self, comm_subexpr_elim: bool) -> Self {
        self.comm_subexpr_elim = comm_subexpr_elim;
        self
    }
}

/// Optimization toggles submitted to the evaluator with a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptFlags {
    pub type_coercion: bool,
    pub predicate_pushdown: bool,
    pub projection_pushdown: bool,
    pub simplify_expression: bool,
    pub slice_pushdown: bool,
    pub comm_subplan_elim: bool,
    pub comm_subexpr_elim: bool,
    pub streaming: bool,
}

impl Default for OptFlags {
    fn default() -> Self {
        OptFlags::from(&CollectOptions::default())
    }
}

impl From<&CollectOptions> for OptFlags {
    fn from(opts: &CollectOptions) -> Self {
        let mut flags = OptFlags {
            type_coercion: opts.type_coercion,
            predicate_pushdown: opts.predicate_pushdown,
            projection_pushdown: opts.projection_pushdown,
            simplify_expression: opts.simplify_expression,
            slice_pushdown: opts.slice_pushdown,
            comm_subplan_elim: opts.comm_subplan_elim,
            comm_subexpr_elim: opts.comm_subexpr_elim,
            streaming: opts.streaming,
        };
        if opts.no_optimization {
            flags.predicate_pushdown = false;
            flags.projection_pushdown = false;
            flags.slice_pushdown = false;
            flags.comm_subplan_elim = false;
            flags.comm_subexpr_elim = false;
        }
        if opts.streaming {
            flags.comm_subplan_elim = false;
        }
        flags
    }
}

impl From<CollectOptions> for OptFlags {
    fn from(opts: CollectOptions) -> Self {
        OptFlags::from(&opts)
    }
}

/// Which row of a duplicate set `unique` keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniqueKeepStrategy {
    #[default]
    First,
    Last,
    /// Any row; this implementation keeps the first.
    Any,
    /// Drop every row that has a duplicate.
    None,
}

/// Canonical arguments of `LazyFrame::unique`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniqueOptions {
    pub maintain_order: bool,
    pub subset: Option<Selection>,
    pub keep: UniqueKeepStrategy,
}

impl UniqueOptions {
    /// Set `maintain_order`.
    pub fn with_maintain_order(mut self, maintain_order: bool) -> Self {
        self.maintain_order = maintain_order;
        self
    }

    /// Only compare these columns.
    pub fn with_subset(mut self, subset: impl Into<Selection>) -> Self {
        self.subset = Some(subset.into());
        self
    }

    /// Set `keep`.
    pub fn with_keep(mut self, keep: UniqueKeepStrategy) -> Self {
        self.keep = keep;
        self
    }
}

/// The positional form: `unique(maintain_order)`.
impl From<bool> for UniqueOptions {
    fn from(maintain_order: bool) -> Self {
        UniqueOptions {
            maintain_order,
            ..UniqueOptions::default()
        }
    }
}

/// Canonical arguments of `LazyFrame::slice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceOptions {
    /// Negative offsets count from the end.
    pub offset: i64,
    /// `None` takes every row after `offset`.
    pub length: Option<usize>,
}

impl From<(i64, usize)> for SliceOptions {
    fn from((offset, length): (i64, usize)) -> Self {
        SliceOptions {
            offset,
            length: Some(length),
        }
    }
}

impl From<(i64, Option<usize>)> for SliceOptions {
    fn from((offset, length): (i64, Option<usize>)) -> Self {
        SliceOptions { offset, length }
    }
}

/// Canonical arguments of `LazyFrame::sort`.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOptions {
    pub by: Selection,
    /// One flag for every key, or a single flag broadcast to all keys.
    pub descending: Vec<bool>,
    pub nulls_last: bool,
    pub maintain_order: bool,
}

impl SortOptions {
    /// Ascending sort on `by`.
    pub fn new(by: impl Into<Selection>) -> Self {
        SortOptions {
            by: by.into(),
            descending: vec![false],
            nulls_last: false,
            maintain_order: false,
        }
    }

    /// Same direction for every key.
    pub fn with_descending(mut self, descending: bool) -> Self {
        self.descending = vec![descending];
        self
    }

    /// One direction per key.
    pub fn with_descending_per_key(mut self, descending: Vec<bool>) -> Self {
        self.descending = descending;
        self
    }

    /// Set `nulls_last`.
    pub fn with_nulls_last(mut self, nulls_last: bool) -> Self {
        self.nulls_last = nulls_last;
        self
    }

    /// Set `maintain_order`.
    pub fn with_maintain_order(mut self, maintain_order: bool) -> Self {
        self.maintain_order = maintain_order;
        self
    }

    /// Resolve the sort key and per-key directions.
    ///
    /// A bare column name takes the single-column path.
    pub(crate) fn resolve(self) -> Result<(SortKey, Vec<bool>)> {
        let key = match self.by {
            Selection::Name(name) => SortKey::Column(name),
            other => {
                let exprs = selection_to_exprs(other)?;
                if exprs.is_empty() {
                    return Err(DataFrameError::contract("sort requires at least one key"));
                }
                SortKey::Exprs(exprs)
            }
        };
        let n_keys = match &key {
            SortKey::Column(_) => 1,
            SortKey::Exprs(exprs) => exprs.len(),
        };
        let descending = match self.descending.len() {
            0 => vec![false; n_keys],
            1 => vec![self.descending[0]; n_keys],
            n if n == n_keys => self.descending,
            n => {
                return Err(DataFrameError::contract(format!(
                    "sort got {n} `descending` flags for {n_keys} keys"
                )))
            }
        };
        Ok((key, descending))
    }
}

impl From<&str> for SortOptions {
    fn from(by: &str) -> Self {
        SortOptions::new(by)
    }
}

impl From<String> for SortOptions {
    fn from(by: String) -> Self {
        SortOptions::new(by)
    }
}

impl From<Expr> for SortOptions {
    fn from(by: Expr) -> Self {
        SortOptions::new(by)
    }
}

impl<T: Into<Selection>> From<Vec<T>> for SortOptions {
    fn from(by: Vec<T>) -> Self {
        SortOptions::new(by)
    }
}

/// The full positional form: `sort((by, descending, nulls_last, maintain_order))`.
impl<S: Into<Selection>> From<(S, bool, bool, bool)> for SortOptions {
    fn from((by, descending, nulls_last, maintain_order): (S, bool, bool, bool)) -> Self {
        SortOptions::new(by)
            .with_descending(descending)
            .with_nulls_last(nulls_last)
            .with_maintain_order(maintain_order)
    }
}

/// `sort((by, descending))`; the trailing positional flags default to false.
impl<S: Into<Selection>> From<(S, bool)> for SortOptions {
    fn from((by, descending): (S, bool)) -> Self {
        SortOptions::from((by, descending, false, false))
    }
}
