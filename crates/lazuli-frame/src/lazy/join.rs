use serde::{Deserialize, Serialize};

use crate::expr::{col, selection_to_exprs, selection_to_names, Selection};
use crate::{DataFrameError, Expr, Result};

const MISSING_JOIN_COLUMN: &str = "You should pass the column to join on as an argument";

/// Suffix appended to right-hand columns whose names collide with the left side.
pub const DEFAULT_JOIN_SUFFIX: &str = "_right";

/// Join kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    /// Full outer join; key columns are coalesced.
    Outer,
    /// Left rows that have a match, left columns only.
    Semi,
    /// Left rows without a match, left columns only.
    Anti,
    /// Cartesian product; join columns are ignored.
    Cross,
}

impl JoinType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Outer => "outer",
            JoinType::Semi => "semi",
            JoinType::Anti => "anti",
            JoinType::Cross => "cross",
        }
    }
}

/// Join arguments as callers write them.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOptions {
    pub how: JoinType,
    /// Same key columns on both sides.
    pub on: Option<Selection>,
    pub left_on: Option<Selection>,
    pub right_on: Option<Selection>,
    pub suffix: Option<String>,
    pub allow_parallel: bool,
    pub force_parallel: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            how: JoinType::Inner,
            on: None,
            left_on: None,
            right_on: None,
            suffix: None,
            allow_parallel: true,
            force_parallel: false,
        }
    }
}

impl JoinOptions {
    /// Join of kind `how` with no columns set yet.
    pub fn new(how: JoinType) -> Self {
        Self {
            how,
            ..Self::default()
        }
    }

    /// Set `on`.
    pub fn with_on(mut self, on: impl Into<Selection>) -> Self {
        self.on = Some(on.into());
        self
    }

    /// Set `left_on`.
    pub fn with_left_on(mut self, left_on: impl Into<Selection>) -> Self {
        self.left_on = Some(left_on.into());
        self
    }

    /// Set `right_on`.
    pub fn with_right_on(mut self, right_on: impl Into<Selection>) -> Self {
        self.right_on = Some(right_on.into());
        self
    }

    /// Set `suffix`.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Set `allow_parallel`.
    pub fn with_allow_parallel(mut self, allow_parallel: bool) -> Self {
        self.allow_parallel = allow_parallel;
        self
    }

    /// Set `force_parallel`.
    pub fn with_force_parallel(mut self, force_parallel: bool) -> Self {
        self.force_parallel = force_parallel;
        self
    }

    /// Resolve into the key lists and arguments handed to the evaluator.
    pub(crate) fn resolve(self) -> Result<(Vec<Expr>, Vec<Expr>, JoinArgs)> {
        let args = JoinArgs {
            how: self.how,
            suffix: self
                .suffix
                .unwrap_or_else(|| DEFAULT_JOIN_SUFFIX.to_string()),
            allow_parallel: self.allow_parallel,
            force_parallel: self.force_parallel,
        };

        if self.how == JoinType::Cross {
            return Ok((Vec::new(), Vec::new(), args));
        }

        let (left_on, right_on) = match (self.on, self.left_on, self.right_on) {
            (Some(on), _, _) => {
                let exprs = selection_to_exprs(on)?;
                (exprs.clone(), exprs)
            }
            (None, Some(left), Some(right)) => {
                (selection_to_exprs(left)?, selection_to_exprs(right)?)
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(DataFrameError::contract(MISSING_JOIN_COLUMN))
            }
            (None, None, None) => (Vec::new(), Vec::new()),
        };

        if left_on.is_empty() || right_on.is_empty() {
            return Err(DataFrameError::contract(format!(
                "{} join needs at least one key column",
                args.how.as_str()
            )));
        }
        if left_on.len() != right_on.len() {
            return Err(DataFrameError::contract(format!(
                "join got {} left keys and {} right keys",
                left_on.len(),
                right_on.len()
            )));
        }

        Ok((left_on, right_on, args))
    }
}

/// Join arguments stored in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinArgs {
    pub how: JoinType,
    pub suffix: String,
    pub allow_parallel: bool,
    pub force_parallel: bool,
}

/// Search direction of an asof join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsofStrategy {
    /// Last right row whose key is `<=` the left key.
    #[default]
    Backward,
    /// First right row whose key is `>=` the left key.
    Forward,
    /// Closest right row; ties go backward.
    Nearest,
}

/// Maximum key distance of an asof match.
#[derive(Debug, Clone, PartialEq)]
pub enum Tolerance {
    Numeric(f64),
    /// Duration string such as `"2d"` or `"30m"`.
    Duration(String),
}

impl From<f64> for Tolerance {
    fn from(v: f64) -> Self {
        Tolerance::Numeric(v)
    }
}

impl From<i64> for Tolerance {
    fn from(v: i64) -> Self {
        Tolerance::Numeric(v as f64)
    }
}

impl From<&str> for Tolerance {
    fn from(v: &str) -> Self {
        Tolerance::Duration(v.to_string())
    }
}

impl From<String> for Tolerance {
    fn from(v: String) -> Self {
        Tolerance::Duration(v)
    }
}

/// Asof join arguments as callers write them.
#[derive(Debug, Clone, PartialEq)]
pub struct AsofJoinOptions {
    pub on: Option<String>,
    pub left_on: Option<String>,
    pub right_on: Option<String>,
    pub by: Option<Selection>,
    pub by_left: Option<Selection>,
    pub by_right: Option<Selection>,
    pub strategy: AsofStrategy,
    pub tolerance: Option<Tolerance>,
    pub suffix: Option<String>,
    pub allow_parallel: bool,
    pub force_parallel: bool,
}

impl Default for AsofJoinOptions {
    fn default() -> Self {
        Self {
            on: None,
            left_on: None,
            right_on: None,
            by: None,
            by_left: None,
            by_right: None,
            strategy: AsofStrategy::Backward,
            tolerance: None,
            suffix: None,
            allow_parallel: true,
            force_parallel: false,
        }
    }
}

impl AsofJoinOptions {
    /// Asof join on the same key column on both sides.
    pub fn on(column: impl Into<String>) -> Self {
        Self {
            on: Some(column.into()),
            ..Self::default()
        }
    }

    /// Set `left_on`.
    pub fn with_left_on(mut self, column: impl Into<String>) -> Self {
        self.left_on = Some(column.into());
        self
    }

    /// Set `right_on`.
    pub fn with_right_on(mut self, column: impl Into<String>) -> Self {
        self.right_on = Some(column.into());
        self
    }

    /// Set `by`.
    pub fn with_by(mut self, by: impl Into<Selection>) -> Self {
        self.by = Some(by.into());
        self
    }

    /// Set `by_left`.
    pub fn with_by_left(mut self, by: impl Into<Selection>) -> Self {
        self.by_left = Some(by.into());
        self
    }

    /// Set `by_right`.
    pub fn with_by_right(mut self, by: impl Into<Selection>) -> Self {
        self.by_right = Some(by.into());
        self
    }

    /// Set `strategy`.
    pub fn with_strategy(mut self, strategy: AsofStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set `tolerance`.
    pub fn with_tolerance(mut self, tolerance: impl Into<Tolerance>) -> Self {
        self.tolerance = Some(tolerance.into());
        self
    }

    /// Set `suffix`.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Resolve into the arguments handed to the evaluator.
    #[allow(clippy::type_complexity)]
    pub(crate) fn resolve(self) -> Result<(Expr, Expr, Vec<String>, Vec<String>, AsofJoinArgs)> {
        let (left_on, right_on) = match (self.on, self.left_on, self.right_on) {
            (Some(on), _, _) => (col(&on), col(&on)),
            (None, Some(left), Some(right)) => (col(&left), col(&right)),
            _ => return Err(DataFrameError::contract(MISSING_JOIN_COLUMN)),
        };

        let (by_left, by_right) = match (self.by, self.by_left, self.by_right) {
            (Some(by), _, _) => {
                let names = selection_to_names(by)?;
                (names.clone(), names)
            }
            (None, Some(left), Some(right)) => {
                (selection_to_names(left)?, selection_to_names(right)?)
            }
            (None, None, None) => (Vec::new(), Vec::new()),
            _ => {
                return Err(DataFrameError::contract(
                    "asof join needs both `by_left` and `by_right`",
                ))
            }
        };
        if by_left.len() != by_right.len() {
            return Err(DataFrameError::contract(format!(
                "asof join got {} left and {} right `by` columns",
                by_left.len(),
                by_right.len()
            )));
        }

        let (tolerance_num, tolerance_str) = match self.tolerance {
            Some(Tolerance::Numeric(v)) => (Some(v), None),
            Some(Tolerance::Duration(s)) => (None, Some(s)),
            None => (None, None),
        };

        let args = AsofJoinArgs {
            strategy: self.strategy,
            tolerance_num,
            tolerance_str,
            suffix: self
                .suffix
                .unwrap_or_else(|| DEFAULT_JOIN_SUFFIX.to_string()),
            allow_parallel: self.allow_parallel,
            force_parallel: self.force_parallel,
        };
        Ok((left_on, right_on, by_left, by_right, args))
    }
}

/// Asof join arguments stored in the plan. At most one tolerance channel is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsofJoinArgs {
    pub strategy: AsofStrategy,
    pub tolerance_num: Option<f64>,
    pub tolerance_str: Option<String>,
    pub suffix: String,
    pub allow_parallel: bool,
    pub force_parallel: bool,
}

#[cfg(test)]
mod tests {
    use super::{AsofJoinOptions, AsofStrategy, JoinOptions, JoinType};
    use crate::expr::col;
    use crate::DataFrameError;

    #[test]
    fn on_is_shorthand_for_left_and_right_on() {
        let a = JoinOptions::new(JoinType::Inner).with_on("id").resolve().unwrap();
        let b = JoinOptions::new(JoinType::Inner)
            .with_left_on("id")
            .with_right_on("id")
            .resolve()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0, vec![col("id")]);
        assert_eq!(a.2.suffix, "_right");
        assert!(a.2.allow_parallel);
    }

    #[test]
    fn only_left_on_is_a_contract_error() {
        let err = JoinOptions::new(JoinType::Left)
            .with_left_on("id")
            .resolve()
            .unwrap_err();
        match err {
            DataFrameError::Contract { message } => {
                assert_eq!(message, "You should pass the column to join on as an argument")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cross_ignores_columns() {
        let (l, r, args) = JoinOptions::new(JoinType::Cross)
            .with_left_on("id")
            .resolve()
            .unwrap();
        assert!(l.is_empty() && r.is_empty());
        assert_eq!(args.how, JoinType::Cross);
    }

    #[test]
    fn key_counts_must_match() {
        let err = JoinOptions::new(JoinType::Inner)
            .with_left_on(vec!["a", "b"])
            .with_right_on("a")
            .resolve()
            .unwrap_err();
        assert!(matches!(err, DataFrameError::Contract { .. }));
    }

    #[test]
    fn asof_tolerance_uses_one_channel() {
        let (_, _, _, _, args) = AsofJoinOptions::on("t").with_tolerance("2d").resolve().unwrap();
        assert_eq!(args.tolerance_str.as_deref(), Some("2d"));
        assert!(args.tolerance_num.is_none());
        assert_eq!(args.strategy, AsofStrategy::Backward);

        let (_, _, _, _, args) = AsofJoinOptions::on("t").with_tolerance(5_i64).resolve().unwrap();
        assert_eq!(args.tolerance_num, Some(5.0));
        assert!(args.tolerance_str.is_none());
    }

    #[test]
    fn asof_by_is_normalised_to_lists() {
        let (_, _, by_left, by_right, _) = AsofJoinOptions::on("t").with_by("g").resolve().unwrap();
        assert_eq!(by_left, vec!["g"]);
        assert_eq!(by_right, vec!["g"]);

        let err = AsofJoinOptions::default().with_left_on("t").resolve().unwrap_err();
        assert!(matches!(err, DataFrameError::Contract { .. }));
    }
}
