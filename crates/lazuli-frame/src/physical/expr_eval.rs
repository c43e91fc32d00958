use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    UInt32Array,
};
use arrow::compute::kernels::{boolean, cmp, numeric};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::expr::{Expr as E, Operator, Scalar, UnaryOperator};
use crate::physical::aggregate::aggregate;
use crate::{DataFrameError, Expr, Result};

/// Evaluation switches taken from the plan's optimization flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    /// Widen mismatched operand types before applying a kernel.
    pub type_coercion: bool,
    /// Evaluate structurally equal sub-expressions once per batch.
    pub comm_subexpr_elim: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            type_coercion: true,
            comm_subexpr_elim: true,
        }
    }
}

/// Evaluates `Expr` values over one Arrow `RecordBatch`.
///
/// Literals and whole-column aggregations evaluate to length-1 arrays that
/// broadcast against full columns.
pub struct ExprEval<'a> {
    batch: &'a RecordBatch,
    options: EvalOptions,
    memo: RefCell<HashMap<String, ArrayRef>>,
}

impl<'a> ExprEval<'a> {
    pub fn new(batch: &'a RecordBatch, options: EvalOptions) -> Self {
        Self {
            batch,
            options,
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> EvalOptions {
        self.options
    }

    /// Evaluate `expr`; the result has either one row or `num_rows` rows.
    pub fn evaluate(&self, expr: &Expr) -> Result<ArrayRef> {
        let shared = self.options.comm_subexpr_elim
            && matches!(
                expr,
                E::BinaryOp { .. }
                    | E::UnaryOp { .. }
                    | E::Agg { .. }
                    | E::Cast { .. }
                    | E::MapDict { .. }
            );
        if !shared {
            return self.eval_uncached(expr);
        }

        let key = format!("{expr:?}");
        let hit = self.memo.borrow().get(&key).cloned();
        if let Some(hit) = hit {
            return Ok(hit);
        }
        let out = self.eval_uncached(expr)?;
        self.memo.borrow_mut().insert(key, Arc::clone(&out));
        Ok(out)
    }

    /// Evaluate `expr` and broadcast the result to `num_rows` rows.
    pub fn evaluate_full(&self, expr: &Expr) -> Result<ArrayRef> {
        broadcast(self.evaluate(expr)?, self.batch.num_rows())
    }

    fn eval_uncached(&self, expr: &Expr) -> Result<ArrayRef> {
        match expr {
            E::Column(name) => self
                .batch
                .column_by_name(name)
                .cloned()
                .ok_or_else(|| DataFrameError::column_not_found(name.clone())),
            E::Literal(s) => Ok(scalar_to_array(s, 1)),
            E::Alias { expr, .. } => self.evaluate(expr),
            E::Wildcard => Err(DataFrameError::invalid_operation(
                "wildcard cannot be evaluated as a standalone expression",
            )),
            E::UnaryOp { op, expr } => eval_unary(*op, &self.evaluate(expr)?),
            E::BinaryOp { left, op, right } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                eval_binary(*op, l, r, self.options.type_coercion)
            }
            E::Agg { func, expr } => {
                if expr.has_agg() {
                    return Err(DataFrameError::invalid_operation(
                        "nested aggregations are not supported",
                    ));
                }
                let values = self.evaluate(expr)?;
                let all = (0..values.len() as u32).collect::<Vec<_>>();
                aggregate(*func, &values, &[all])
            }
            E::Cast { expr, dtype } => cast_array(&self.evaluate(expr)?, dtype),
            E::MapDict { expr, mapping } => map_dict(&self.evaluate(expr)?, mapping),
        }
    }
}

/// `true` when `expr` never looks at a row: literals and aggregations.
pub(crate) fn is_scalar_like(expr: &Expr) -> bool {
    match expr {
        E::Literal(_) | E::Agg { .. } => true,
        E::Column(_) | E::Wildcard => false,
        E::Alias { expr, .. }
        | E::UnaryOp { expr, .. }
        | E::Cast { expr, .. }
        | E::MapDict { expr, .. } => is_scalar_like(expr),
        E::BinaryOp { left, right, .. } => is_scalar_like(left) && is_scalar_like(right),
    }
}

pub(crate) fn scalar_to_array(s: &Scalar, len: usize) -> ArrayRef {
    match s {
        Scalar::Null => new_null_array(&DataType::Null, len),
        Scalar::Boolean(v) => Arc::new(BooleanArray::from(vec![Some(*v); len])),
        Scalar::Int64(v) => Arc::new(Int64Array::from(vec![Some(*v); len])),
        Scalar::Float64(v) => Arc::new(Float64Array::from(vec![Some(*v); len])),
        Scalar::Utf8(v) => Arc::new(StringArray::from(vec![Some(v.as_str()); len])),
    }
}

/// Repeat a length-1 array `len` times; other arrays must already have `len` rows.
pub(crate) fn broadcast(array: ArrayRef, len: usize) -> Result<ArrayRef> {
    if array.len() == len {
        return Ok(array);
    }
    if array.len() != 1 {
        return Err(DataFrameError::schema_mismatch(format!(
            "cannot broadcast a column of {} rows to {len} rows",
            array.len()
        )));
    }
    let indices = UInt32Array::from(vec![0_u32; len]);
    Ok(arrow::compute::take(array.as_ref(), &indices, None)?)
}

fn align(l: ArrayRef, r: ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    match (l.len(), r.len()) {
        (a, b) if a == b => Ok((l, r)),
        (1, b) => Ok((broadcast(l, b)?, r)),
        (a, 1) => Ok((l, broadcast(r, a)?)),
        (a, b) => Err(DataFrameError::schema_mismatch(format!(
            "operands have different lengths ({a} and {b})"
        ))),
    }
}

pub(crate) fn cast_array(array: &ArrayRef, dtype: &DataType) -> Result<ArrayRef> {
    if array.data_type() == dtype {
        return Ok(Arc::clone(array));
    }
    Ok(arrow::compute::cast(array, dtype)?)
}

fn cast_to_temporal(array: &ArrayRef, target: &DataType) -> Result<ArrayRef> {
    if array.data_type().is_integer() {
        let step = if *target == DataType::Date32 {
            DataType::Int32
        } else {
            DataType::Int64
        };
        return cast_array(&cast_array(array, &step)?, target);
    }
    cast_array(array, target)
}

fn coerce(op: Operator, l: ArrayRef, r: ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    let (lt, rt) = (l.data_type().clone(), r.data_type().clone());
    let logical = matches!(op, Operator::And | Operator::Or);

    let (l, r) = if lt == rt {
        (l, r)
    } else if lt == DataType::Null || rt == DataType::Null {
        let target = if logical {
            DataType::Boolean
        } else if lt == DataType::Null {
            rt.clone()
        } else {
            lt.clone()
        };
        (cast_array(&l, &target)?, cast_array(&r, &target)?)
    } else if lt.is_numeric() && rt.is_numeric() {
        let target = if lt.is_floating() || rt.is_floating() {
            DataType::Float64
        } else {
            DataType::Int64
        };
        (cast_array(&l, &target)?, cast_array(&r, &target)?)
    } else if rt.is_temporal() && (lt == DataType::Utf8 || lt.is_integer()) {
        (cast_to_temporal(&l, &rt)?, r)
    } else if lt.is_temporal() && (rt == DataType::Utf8 || rt.is_integer()) {
        let r = cast_to_temporal(&r, &lt)?;
        (l, r)
    } else {
        (l, r)
    };

    if op == Operator::Div && l.data_type().is_integer() && r.data_type().is_integer() {
        return Ok((
            cast_array(&l, &DataType::Float64)?,
            cast_array(&r, &DataType::Float64)?,
        ));
    }
    Ok((l, r))
}

fn as_boolean(array: &ArrayRef) -> Result<&BooleanArray> {
    array
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| {
            DataFrameError::type_mismatch(
                None::<String>,
                DataType::Boolean.to_string(),
                array.data_type().to_string(),
            )
        })
}

pub(crate) fn eval_binary(
    op: Operator,
    l: ArrayRef,
    r: ArrayRef,
    type_coercion: bool,
) -> Result<ArrayRef> {
    let (l, r) = align(l, r)?;
    let (l, r) = if type_coercion {
        coerce(op, l, r)?
    } else {
        (l, r)
    };

    if l.data_type() == &DataType::Null && r.data_type() == &DataType::Null {
        let dtype = if op.is_arithmetic() {
            DataType::Null
        } else {
            DataType::Boolean
        };
        return Ok(new_null_array(&dtype, l.len()));
    }

    let out: ArrayRef = match op {
        Operator::Add => numeric::add(&l, &r)?,
        Operator::Sub => numeric::sub(&l, &r)?,
        Operator::Mul => numeric::mul(&l, &r)?,
        Operator::Div => numeric::div(&l, &r)?,
        Operator::Eq => Arc::new(cmp::eq(&l, &r)?),
        Operator::Neq => Arc::new(cmp::neq(&l, &r)?),
        Operator::Gt => Arc::new(cmp::gt(&l, &r)?),
        Operator::Lt => Arc::new(cmp::lt(&l, &r)?),
        Operator::Ge => Arc::new(cmp::gt_eq(&l, &r)?),
        Operator::Le => Arc::new(cmp::lt_eq(&l, &r)?),
        Operator::And => Arc::new(boolean::and_kleene(as_boolean(&l)?, as_boolean(&r)?)?),
        Operator::Or => Arc::new(boolean::or_kleene(as_boolean(&l)?, as_boolean(&r)?)?),
    };
    Ok(out)
}

pub(crate) fn eval_unary(op: UnaryOperator, v: &ArrayRef) -> Result<ArrayRef> {
    match op {
        UnaryOperator::Not => {
            let v = cast_array(v, &DataType::Boolean).map_err(|_| {
                DataFrameError::type_mismatch(
                    None::<String>,
                    DataType::Boolean.to_string(),
                    v.data_type().to_string(),
                )
            })?;
            Ok(Arc::new(boolean::not(as_boolean(&v)?)?))
        }
        UnaryOperator::Neg => {
            if v.data_type() == &DataType::Null {
                return Ok(Arc::clone(v));
            }
            Ok(numeric::neg(v.as_ref())?)
        }
        UnaryOperator::IsNull => Ok(Arc::new(arrow::compute::is_null(v.as_ref())?)),
        UnaryOperator::IsNotNull => Ok(Arc::new(arrow::compute::is_not_null(v.as_ref())?)),
    }
}

pub(crate) fn map_dict(v: &ArrayRef, mapping: &BTreeMap<String, String>) -> Result<ArrayRef> {
    match v.data_type() {
        DataType::Null => Ok(Arc::clone(v)),
        DataType::Utf8 | DataType::LargeUtf8 => {
            let v = cast_array(v, &DataType::Utf8)?;
            let strings = v
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| DataFrameError::invalid_operation("bad StringArray downcast"))?;
            let mapped = strings
                .iter()
                .map(|s| s.map(|s| mapping.get(s).map(String::as_str).unwrap_or(s)))
                .collect::<StringArray>();
            Ok(Arc::new(mapped))
        }
        other => Err(DataFrameError::type_mismatch(
            None::<String>,
            "Utf8",
            other.to_string(),
        )),
    }
}
