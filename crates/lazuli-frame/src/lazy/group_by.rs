use serde::{Deserialize, Serialize};

use crate::expr::{selection_to_exprs, Selection};
use crate::lazy::{LazyFrame, LogicalPlan};
use crate::temporal::{ClosedWindow, Duration, Label, StartBy};
use crate::{DataFrameError, Expr, Result};

/// Arguments of `LazyFrame::group_by_rolling`.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingOptions {
    pub index_column: String,
    /// Window length, e.g. `"2d"` or `"3i"`.
    pub period: String,
    /// Window start relative to each index value. Defaults to `-period`.
    pub offset: Option<String>,
    pub closed: ClosedWindow,
    pub by: Option<Selection>,
}

impl RollingOptions {
    /// Rolling windows of `period` over `index_column`, closed on the right.
    pub fn new(index_column: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            index_column: index_column.into(),
            period: period.into(),
            offset: None,
            closed: ClosedWindow::Right,
            by: None,
        }
    }

    /// Set `offset`.
    pub fn with_offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Set `closed`.
    pub fn with_closed(mut self, closed: ClosedWindow) -> Self {
        self.closed = closed;
        self
    }

    /// Set `by`.
    pub fn with_by(mut self, by: impl Into<Selection>) -> Self {
        self.by = Some(by.into());
        self
    }

    pub(crate) fn resolve(self) -> Result<RollingSpec> {
        let period = Duration::parse(&self.period)?;
        let offset = match &self.offset {
            Some(offset) => Duration::parse(offset)?,
            None => period.negate(),
        };
        Ok(RollingSpec {
            index_column: self.index_column,
            period,
            offset,
            closed: self.closed,
            by: resolve_by(self.by)?,
        })
    }
}

/// Resolved rolling window parameters stored in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSpec {
    pub index_column: String,
    pub period: Duration,
    pub offset: Duration,
    pub closed: ClosedWindow,
    pub by: Vec<Expr>,
}

/// Arguments of `LazyFrame::group_by_dynamic`.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicGroupOptions {
    pub index_column: String,
    /// Distance between window starts.
    pub every: String,
    /// Window length. Defaults to `every`.
    pub period: Option<String>,
    /// Shift of every window start. Defaults to zero.
    pub offset: Option<String>,
    pub closed: ClosedWindow,
    pub label: Label,
    pub start_by: StartBy,
    /// Add `_lower_boundary` / `_upper_boundary` columns.
    pub include_boundaries: bool,
    pub by: Option<Selection>,
}

impl DynamicGroupOptions {
    /// Windows starting every `every` over `index_column`.
    pub fn new(index_column: impl Into<String>, every: impl Into<String>) -> Self {
        Self {
            index_column: index_column.into(),
            every: every.into(),
            period: None,
            offset: None,
            closed: ClosedWindow::Left,
            label: Label::Left,
            start_by: StartBy::Monday,
            include_boundaries: false,
            by: None,
        }
    }

    /// Set `period`.
    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }

    /// Set `offset`.
    pub fn with_offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Set `closed`.
    pub fn with_closed(mut self, closed: ClosedWindow) -> Self {
        self.closed = closed;
        self
    }

    /// Set `label`.
    pub fn with_label(mut self, label: Label) -> Self {
        self.label = label;
        self
    }

    /// Set `start_by`.
    pub fn with_start_by(mut self, start_by: StartBy) -> Self {
        self.start_by = start_by;
        self
    }

    /// Set `include_boundaries`.
    pub fn with_include_boundaries(mut self, include_boundaries: bool) -> Self {
        self.include_boundaries = include_boundaries;
        self
    }

    /// Set `by`.
    pub fn with_by(mut self, by: impl Into<Selection>) -> Self {
        self.by = Some(by.into());
        self
    }

    pub(crate) fn resolve(self) -> Result<DynamicSpec> {
        let every = Duration::parse(&self.every)?;
        let period = match &self.period {
            Some(period) => Duration::parse(period)?,
            None => every,
        };
        let offset = match &self.offset {
            Some(offset) => Duration::parse(offset)?,
            None => Duration::default(),
        };
        Ok(DynamicSpec {
            index_column: self.index_column,
            every,
            period,
            offset,
            closed: self.closed,
            label: self.label,
            start_by: self.start_by,
            include_boundaries: self.include_boundaries,
            by: resolve_by(self.by)?,
        })
    }
}

/// Resolved dynamic window parameters stored in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicSpec {
    pub index_column: String,
    pub every: Duration,
    pub period: Duration,
    pub offset: Duration,
    pub closed: ClosedWindow,
    pub label: Label,
    pub start_by: StartBy,
    pub include_boundaries: bool,
    pub by: Vec<Expr>,
}

fn resolve_by(by: Option<Selection>) -> Result<Vec<Expr>> {
    match by {
        Some(by) => selection_to_exprs(by),
        None => Ok(Vec::new()),
    }
}

#[derive(Debug, Clone)]
enum Grouping {
    Keys { keys: Vec<Expr>, maintain_order: bool },
    Rolling(RollingSpec),
    Dynamic(DynamicSpec),
}

/// Group-by builder for `LazyFrame`.
#[derive(Debug, Clone)]
pub struct LazyGroupBy {
    frame: LazyFrame,
    grouping: Grouping,
}

impl LazyGroupBy {
    pub(crate) fn keyed(frame: LazyFrame, keys: Vec<Expr>, maintain_order: bool) -> Self {
        Self {
            frame,
            grouping: Grouping::Keys {
                keys,
                maintain_order,
            },
        }
    }

    pub(crate) fn rolling(frame: LazyFrame, spec: RollingSpec) -> Self {
        Self {
            frame,
            grouping: Grouping::Rolling(spec),
        }
    }

    pub(crate) fn dynamic(frame: LazyFrame, spec: DynamicSpec) -> Self {
        Self {
            frame,
            grouping: Grouping::Dynamic(spec),
        }
    }

    /// Aggregate every group.
    ///
    /// Bare column references (no aggregation) collect each group into a list.
    pub fn agg(&self, aggs: impl Into<Selection>) -> Result<LazyFrame> {
        let aggs = selection_to_exprs(aggs)?;
        let grouping = self.grouping.clone();
        self.frame.derive(move |input| match grouping {
            Grouping::Keys {
                keys,
                maintain_order,
            } => LogicalPlan::Aggregate {
                input,
                keys,
                aggs,
                maintain_order,
            },
            Grouping::Rolling(spec) => LogicalPlan::RollingAggregate { input, spec, aggs },
            Grouping::Dynamic(spec) => LogicalPlan::DynamicAggregate { input, spec, aggs },
        })
    }

    /// First `n` rows of every group (default 5).
    pub fn head(&self, n: impl Into<Option<usize>>) -> Result<LazyFrame> {
        self.group_slice(true, n.into().unwrap_or(5))
    }

    /// Last `n` rows of every group (default 5).
    pub fn tail(&self, n: impl Into<Option<usize>>) -> Result<LazyFrame> {
        self.group_slice(false, n.into().unwrap_or(5))
    }

    fn group_slice(&self, head: bool, n: usize) -> Result<LazyFrame> {
        let Grouping::Keys { keys, .. } = &self.grouping else {
            return Err(DataFrameError::contract(
                "head/tail are only available on key groupings",
            ));
        };
        let keys = keys.clone();
        self.frame
            .derive(move |input| LogicalPlan::GroupSlice { input, keys, head, n })
    }
}
