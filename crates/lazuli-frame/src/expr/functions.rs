use crate::expr::expr::Scalar;
use crate::Expr;

/// Create an expression that refers to a column by name (case-sensitive).
pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

/// Create one column reference per name, keeping the given order.
pub fn cols<I, S>(names: I) -> Vec<Expr>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(|n| col(n.as_ref())).collect()
}

/// Create a literal expression from a scalar value.
pub fn lit<T>(value: T) -> Expr
where
    T: Into<Scalar>,
{
    Expr::Literal(value.into())
}

/// Create a wildcard expression that expands to all columns in projections.
pub fn all() -> Expr {
    Expr::Wildcard
}
