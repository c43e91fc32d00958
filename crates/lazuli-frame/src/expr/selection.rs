use crate::{DataFrameError, Expr, Result};

/// Deepest list nesting accepted by [`selection_to_exprs`].
pub const MAX_SELECTION_DEPTH: usize = 3;

/// Column selection as callers write it: a name, an expression, or a
/// (possibly nested) list of either.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Bare column name.
    Name(String),
    /// Expression, passed through untouched.
    Expr(Expr),
    /// Ordered list of selections.
    List(Vec<Selection>),
}

impl Selection {
    /// An empty selection (used by `explode()` to mean "every column").
    pub fn empty() -> Self {
        Selection::List(Vec::new())
    }

    /// `true` when the selection names no column at any depth.
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::List(items) => items.iter().all(Selection::is_empty),
            _ => false,
        }
    }
}

impl From<&str> for Selection {
    fn from(name: &str) -> Self {
        Selection::Name(name.to_string())
    }
}

impl From<&String> for Selection {
    fn from(name: &String) -> Self {
        Selection::Name(name.clone())
    }
}

impl From<String> for Selection {
    fn from(name: String) -> Self {
        Selection::Name(name)
    }
}

impl From<Expr> for Selection {
    fn from(expr: Expr) -> Self {
        Selection::Expr(expr)
    }
}

impl<T: Into<Selection>> From<Vec<T>> for Selection {
    fn from(items: Vec<T>) -> Self {
        Selection::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Selection>, const N: usize> From<[T; N]> for Selection {
    fn from(items: [T; N]) -> Self {
        Selection::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Selection> + Clone> From<&[T]> for Selection {
    fn from(items: &[T]) -> Self {
        Selection::List(items.iter().cloned().map(Into::into).collect())
    }
}

/// Flatten a selection into expressions, preserving caller order.
///
/// Names become `col(name)`; expressions pass through unchanged.
pub fn selection_to_exprs(selection: impl Into<Selection>) -> Result<Vec<Expr>> {
    let mut out = Vec::new();
    flatten(selection.into(), 0, &mut out)?;
    Ok(out)
}

/// Flatten a selection that may only contain column names or bare column
/// references.
pub fn selection_to_names(selection: impl Into<Selection>) -> Result<Vec<String>> {
    selection_to_exprs(selection)?
        .into_iter()
        .map(|expr| match expr {
            Expr::Column(name) => Ok(name),
            other => Err(DataFrameError::contract(format!(
                "expected a column name, got expression {other:?}"
            ))),
        })
        .collect()
}

fn flatten(selection: Selection, depth: usize, out: &mut Vec<Expr>) -> Result<()> {
    match selection {
        Selection::Name(name) => out.push(Expr::Column(name)),
        Selection::Expr(expr) => out.push(expr),
        Selection::List(items) => {
            if depth == MAX_SELECTION_DEPTH {
                return Err(DataFrameError::contract(format!(
                    "selection nested deeper than {MAX_SELECTION_DEPTH} levels"
                )));
            }
            for item in items {
                flatten(item, depth + 1, out)?;
            }
        }
    }
    Ok(())
}
