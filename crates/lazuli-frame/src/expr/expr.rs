use std::collections::BTreeMap;

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

/// Expression AST attached to `LazyFrame` plan nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column reference.
    Column(String),
    /// Literal scalar value.
    Literal(Scalar),
    /// Binary operator expression.
    BinaryOp {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    /// Unary operator expression.
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Aggregation expression. Per group under `group_by().agg()`, whole column elsewhere.
    Agg { func: AggFunc, expr: Box<Expr> },
    /// Expression alias (renames the resulting column).
    Alias { expr: Box<Expr>, name: String },
    /// Cast to an Arrow data type.
    Cast { expr: Box<Expr>, dtype: DataType },
    /// Replace string values found in `mapping`; other values pass through.
    MapDict {
        expr: Box<Expr>,
        mapping: BTreeMap<String, String>,
    },
    /// Wildcard (`*`) that expands to all columns in projections.
    Wildcard,
}

/// Supported binary operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Equality.
    Eq,
    /// Inequality.
    Neq,
    /// Greater-than.
    Gt,
    /// Less-than.
    Lt,
    /// Greater-than-or-equal.
    Ge,
    /// Less-than-or-equal.
    Le,
    /// Boolean AND.
    And,
    /// Boolean OR.
    Or,
}

impl Operator {
    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Eq => "==",
            Operator::Neq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::And => "and",
            Operator::Or => "or",
        }
    }

    pub(crate) fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Div
        )
    }
}

/// Supported unary operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// Boolean NOT.
    Not,
    /// Arithmetic negation.
    Neg,
    /// `true` where the input is null.
    IsNull,
    /// `true` where the input is not null.
    IsNotNull,
}

/// Interpolation used by `quantile`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantileMethod {
    /// Value at the nearest rank.
    #[default]
    Nearest,
    /// Value at the lower rank.
    Lower,
    /// Value at the upper rank.
    Higher,
    /// Mean of the lower and upper values.
    Midpoint,
    /// Linear interpolation between the lower and upper values.
    Linear,
}

/// Supported aggregation functions.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggFunc {
    /// Sum of non-null values.
    Sum,
    /// Mean of non-null values.
    Mean,
    /// Count of non-null values.
    Count,
    /// Minimum of non-null values.
    Min,
    /// Maximum of non-null values.
    Max,
    /// Median of non-null values (linear interpolation).
    Median,
    /// Standard deviation with `ddof` delta degrees of freedom.
    Std { ddof: u8 },
    /// Variance with `ddof` delta degrees of freedom.
    Var { ddof: u8 },
    /// Quantile `q` in `[0, 1]`.
    Quantile { q: f64, method: QuantileMethod },
    /// First value (nulls included).
    First,
    /// Last value (nulls included).
    Last,
    /// Number of distinct values (null counts as a value).
    NUnique,
    /// Collect the values of each group into a list.
    List,
}

impl AggFunc {
    pub(crate) fn name(&self) -> String {
        match self {
            AggFunc::Sum => "sum".to_string(),
            AggFunc::Mean => "mean".to_string(),
            AggFunc::Count => "count".to_string(),
            AggFunc::Min => "min".to_string(),
            AggFunc::Max => "max".to_string(),
            AggFunc::Median => "median".to_string(),
            AggFunc::Std { ddof } => format!("std[ddof={ddof}]"),
            AggFunc::Var { ddof } => format!("var[ddof={ddof}]"),
            AggFunc::Quantile { q, method } => format!("quantile[{q}, {method:?}]"),
            AggFunc::First => "first".to_string(),
            AggFunc::Last => "last".to_string(),
            AggFunc::NUnique => "n_unique".to_string(),
            AggFunc::List => "list".to_string(),
        }
    }
}

/// Scalar literal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Null literal.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// 64-bit integer literal.
    Int64(i64),
    /// 64-bit float literal.
    Float64(f64),
    /// UTF-8 string literal.
    Utf8(String),
}

impl From<()> for Scalar {
    fn from(_: ()) -> Self {
        Scalar::Null
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int64(v as i64)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Int64(v as i64)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int64(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::Float64(v as f64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float64(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Utf8(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Utf8(v.to_string())
    }
}

impl Expr {
    /// Alias this expression (used to name output columns).
    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    fn binary(self, op: Operator, rhs: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(rhs),
        }
    }

    fn unary(self, op: UnaryOperator) -> Expr {
        Expr::UnaryOp {
            op,
            expr: Box::new(self),
        }
    }

    fn agg(self, func: AggFunc) -> Expr {
        Expr::Agg {
            func,
            expr: Box::new(self),
        }
    }

    /// Build an addition expression.
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, rhs: Expr) -> Expr {
        self.binary(Operator::Add, rhs)
    }

    /// Build a subtraction expression.
    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, rhs: Expr) -> Expr {
        self.binary(Operator::Sub, rhs)
    }

    /// Build a multiplication expression.
    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, rhs: Expr) -> Expr {
        self.binary(Operator::Mul, rhs)
    }

    /// Build a division expression. Integer operands divide as floats.
    #[allow(clippy::should_implement_trait)]
    pub fn div(self, rhs: Expr) -> Expr {
        self.binary(Operator::Div, rhs)
    }

    /// Build an equality predicate.
    pub fn eq(self, rhs: Expr) -> Expr {
        self.binary(Operator::Eq, rhs)
    }

    /// Build an inequality predicate.
    pub fn neq(self, rhs: Expr) -> Expr {
        self.binary(Operator::Neq, rhs)
    }

    /// Build a greater-than predicate.
    pub fn gt(self, rhs: Expr) -> Expr {
        self.binary(Operator::Gt, rhs)
    }

    /// Build a less-than predicate.
    pub fn lt(self, rhs: Expr) -> Expr {
        self.binary(Operator::Lt, rhs)
    }

    /// Build a greater-than-or-equal predicate.
    pub fn ge(self, rhs: Expr) -> Expr {
        self.binary(Operator::Ge, rhs)
    }

    /// Build a less-than-or-equal predicate.
    pub fn le(self, rhs: Expr) -> Expr {
        self.binary(Operator::Le, rhs)
    }

    /// Build a boolean AND predicate.
    pub fn and_(self, rhs: Expr) -> Expr {
        self.binary(Operator::And, rhs)
    }

    /// Build a boolean OR predicate.
    pub fn or_(self, rhs: Expr) -> Expr {
        self.binary(Operator::Or, rhs)
    }

    /// Build a boolean NOT predicate.
    pub fn not_(self) -> Expr {
        self.unary(UnaryOperator::Not)
    }

    /// Negate a numeric expression.
    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Expr {
        self.unary(UnaryOperator::Neg)
    }

    /// `true` for null rows.
    pub fn is_null(self) -> Expr {
        self.unary(UnaryOperator::IsNull)
    }

    /// `true` for non-null rows.
    pub fn is_not_null(self) -> Expr {
        self.unary(UnaryOperator::IsNotNull)
    }

    /// Cast to `dtype`. Values that cannot be converted become null.
    pub fn cast(self, dtype: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            dtype,
        }
    }

    /// Replace string values according to `mapping`.
    ///
    /// Values without an entry pass through unchanged and nulls stay null.
    pub fn map_dict<I, K, V>(self, mapping: I) -> Expr
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Expr::MapDict {
            expr: Box::new(self),
            mapping: mapping
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Build a `sum` aggregation.
    pub fn sum(self) -> Expr {
        self.agg(AggFunc::Sum)
    }

    /// Build a `mean` aggregation.
    pub fn mean(self) -> Expr {
        self.agg(AggFunc::Mean)
    }

    /// Build a `count` aggregation (nulls excluded).
    pub fn count(self) -> Expr {
        self.agg(AggFunc::Count)
    }

    /// Build a `min` aggregation.
    pub fn min(self) -> Expr {
        self.agg(AggFunc::Min)
    }

    /// Build a `max` aggregation.
    pub fn max(self) -> Expr {
        self.agg(AggFunc::Max)
    }

    /// Build a `median` aggregation.
    pub fn median(self) -> Expr {
        self.agg(AggFunc::Median)
    }

    /// Build a standard deviation aggregation.
    pub fn std(self, ddof: u8) -> Expr {
        self.agg(AggFunc::Std { ddof })
    }

    /// Build a variance aggregation.
    pub fn var(self, ddof: u8) -> Expr {
        self.agg(AggFunc::Var { ddof })
    }

    /// Build a quantile aggregation.
    pub fn quantile(self, q: f64, method: QuantileMethod) -> Expr {
        self.agg(AggFunc::Quantile { q, method })
    }

    /// Build a `first` aggregation.
    pub fn first(self) -> Expr {
        self.agg(AggFunc::First)
    }

    /// Build a `last` aggregation.
    pub fn last(self) -> Expr {
        self.agg(AggFunc::Last)
    }

    /// Build an `n_unique` aggregation.
    pub fn n_unique(self) -> Expr {
        self.agg(AggFunc::NUnique)
    }

    /// Collect values into a list per group.
    pub fn implode(self) -> Expr {
        self.agg(AggFunc::List)
    }

    /// Name of the column this expression produces.
    ///
    /// Columns keep their name, aliases win, literals are named `literal`, and
    /// everything else takes the name of its left-most input.
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Alias { name, .. } => name.clone(),
            Expr::Literal(_) => "literal".to_string(),
            Expr::Wildcard => "*".to_string(),
            Expr::BinaryOp { left, .. } => left.output_name(),
            Expr::UnaryOp { expr, .. }
            | Expr::Agg { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::MapDict { expr, .. } => expr.output_name(),
        }
    }

    /// Whether an aggregation appears anywhere in this expression.
    pub fn has_agg(&self) -> bool {
        match self {
            Expr::Agg { .. } => true,
            Expr::Column(_) | Expr::Literal(_) | Expr::Wildcard => false,
            Expr::BinaryOp { left, right, .. } => left.has_agg() || right.has_agg(),
            Expr::UnaryOp { expr, .. }
            | Expr::Alias { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::MapDict { expr, .. } => expr.has_agg(),
        }
    }

    /// Name of the column if this is a bare column reference.
    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expr::Column(name) => Some(name),
            _ => None,
        }
    }
}
