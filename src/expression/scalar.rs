//! Built-in scalar expressions.

use std::fmt;
use std::sync::Arc;

use arrow::array::BooleanArray;
use arrow::compute::kernels::cmp::{eq, gt, gt_eq, lt, lt_eq, neq};

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::types::{DataType, Value};
use crate::vector::{BitSetVector, RowMapping, TupleVector, ValueVector, ValueVectorBuilder};

use super::{ArithmeticOp, AsteriskRef, ComparisonOp, Expression, ExpressionRef, LogicalOp};

/// Scalar expression tree.
#[derive(Debug, Clone)]
pub enum ScalarExpression {
    /// Literal value (constant).
    Literal { value: Value, data_type: DataType },

    /// Reference to a column by name, optionally qualified (`alias.name`).
    ///
    /// Outer references read the context's outer tuple vector instead of
    /// the input batch.
    Column {
        name: String,
        data_type: DataType,
        outer: bool,
    },

    /// Wildcard, expanded by the projection that owns it.
    Asterisk { alias: Option<String>, outer: bool },

    /// Binary comparison.
    Comparison {
        left: Box<ScalarExpression>,
        op: ComparisonOp,
        right: Box<ScalarExpression>,
    },

    /// Logical AND/OR/NOT with three-valued semantics.
    Logical {
        op: LogicalOp,
        operands: Vec<ScalarExpression>,
    },

    /// Arithmetic operations.
    Arithmetic {
        left: Box<ScalarExpression>,
        op: ArithmeticOp,
        right: Box<ScalarExpression>,
    },

    /// IS NULL / IS NOT NULL.
    IsNull {
        operand: Box<ScalarExpression>,
        negated: bool,
    },

    /// Renames the output of an expression.
    Alias {
        operand: Box<ScalarExpression>,
        alias: String,
    },
}

impl ScalarExpression {
    /// Creates a literal expression.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let data_type = value.data_type().unwrap_or(DataType::Any);
        ScalarExpression::Literal { value, data_type }
    }

    /// Creates a typed null literal.
    #[must_use]
    pub fn null(data_type: DataType) -> Self {
        ScalarExpression::Literal {
            value: Value::Null,
            data_type,
        }
    }

    /// Creates a column reference.
    #[must_use]
    pub fn column(name: impl Into<String>, data_type: DataType) -> Self {
        ScalarExpression::Column {
            name: name.into(),
            data_type,
            outer: false,
        }
    }

    /// Creates a reference to a column of the outer tuple vector.
    #[must_use]
    pub fn outer_column(name: impl Into<String>, data_type: DataType) -> Self {
        ScalarExpression::Column {
            name: name.into(),
            data_type,
            outer: true,
        }
    }

    /// Creates a wildcard, optionally restricted to a table alias.
    #[must_use]
    pub fn asterisk(alias: Option<&str>) -> Self {
        ScalarExpression::Asterisk {
            alias: alias.map(str::to_string),
            outer: false,
        }
    }

    /// Creates a wildcard over the outer tuple vector.
    #[must_use]
    pub fn outer_asterisk(alias: Option<&str>) -> Self {
        ScalarExpression::Asterisk {
            alias: alias.map(str::to_string),
            outer: true,
        }
    }

    /// Creates a comparison expression.
    #[must_use]
    pub fn comparison(left: ScalarExpression, op: ComparisonOp, right: ScalarExpression) -> Self {
        ScalarExpression::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an equality comparison.
    #[must_use]
    pub fn eq(left: ScalarExpression, right: ScalarExpression) -> Self {
        Self::comparison(left, ComparisonOp::Eq, right)
    }

    /// Creates a logical AND expression.
    #[must_use]
    pub fn and(operands: Vec<ScalarExpression>) -> Self {
        ScalarExpression::Logical {
            op: LogicalOp::And,
            operands,
        }
    }

    /// Creates a logical OR expression.
    #[must_use]
    pub fn or(operands: Vec<ScalarExpression>) -> Self {
        ScalarExpression::Logical {
            op: LogicalOp::Or,
            operands,
        }
    }

    /// Creates a logical NOT expression.
    #[must_use]
    pub fn not(operand: ScalarExpression) -> Self {
        ScalarExpression::Logical {
            op: LogicalOp::Not,
            operands: vec![operand],
        }
    }

    /// Creates an arithmetic expression.
    #[must_use]
    pub fn arithmetic(left: ScalarExpression, op: ArithmeticOp, right: ScalarExpression) -> Self {
        ScalarExpression::Arithmetic {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an IS NULL (or IS NOT NULL) expression.
    #[must_use]
    pub fn is_null(operand: ScalarExpression, negated: bool) -> Self {
        ScalarExpression::IsNull {
            operand: Box::new(operand),
            negated,
        }
    }

    /// Renames the output of this expression.
    #[must_use]
    pub fn alias(self, alias: impl Into<String>) -> Self {
        ScalarExpression::Alias {
            operand: Box::new(self),
            alias: alias.into(),
        }
    }

    /// Wraps this expression in a shared reference.
    #[must_use]
    pub fn into_ref(self) -> ExpressionRef {
        Arc::new(self)
    }

    fn eval_column(
        name: &str,
        outer: bool,
        input: &TupleVector,
        ctx: &ExecutionContext,
    ) -> Result<ValueVector> {
        if !outer {
            return input
                .column_by_name(name)
                .cloned()
                .ok_or_else(|| VexecError::InvalidExpression(format!("Column not found: {name}")));
        }
        let outer_vector = ctx.statement().outer_tuple_vector().ok_or_else(|| {
            VexecError::InvalidExpression(format!("No outer tuple vector for outer column {name}"))
        })?;
        let column = outer_vector.column_by_name(name).ok_or_else(|| {
            VexecError::InvalidExpression(format!("Outer column not found: {name}"))
        })?;
        let rows = input.row_count();
        match outer_vector.row_count() {
            n if n == rows => Ok(column.clone()),
            1 => Ok(column.reindex(RowMapping::Repeat { row: 0 }, rows)),
            n => Err(VexecError::InvalidExpression(format!(
                "Outer tuple vector has {n} rows but input has {rows}"
            ))),
        }
    }

    fn eval_comparison(
        left: &ValueVector,
        op: ComparisonOp,
        right: &ValueVector,
    ) -> Result<ValueVector> {
        if left.data_type() == right.data_type() && left.data_type().to_arrow().is_some() {
            if let (Ok(l), Ok(r)) = (left.to_array(), right.to_array()) {
                let result = match op {
                    ComparisonOp::Eq => eq(&l, &r)?,
                    ComparisonOp::Neq => neq(&l, &r)?,
                    ComparisonOp::Lt => lt(&l, &r)?,
                    ComparisonOp::Lte => lt_eq(&l, &r)?,
                    ComparisonOp::Gt => gt(&l, &r)?,
                    ComparisonOp::Gte => gt_eq(&l, &r)?,
                };
                return Ok(ValueVector::from_boolean_array(result));
            }
        }
        let result: BooleanArray = (0..left.len())
            .map(|row| {
                let (l, r) = (left.get_value(row), right.get_value(row));
                if l.is_null() || r.is_null() {
                    return None;
                }
                match l.compare(&r) {
                    Some(ordering) => Some(op.matches(ordering)),
                    None => match op {
                        ComparisonOp::Eq => Some(false),
                        ComparisonOp::Neq => Some(true),
                        _ => None,
                    },
                }
            })
            .collect();
        Ok(ValueVector::from_boolean_array(result))
    }

    fn eval_logical(
        op: LogicalOp,
        operands: &[ScalarExpression],
        input: &TupleVector,
        ctx: &ExecutionContext,
    ) -> Result<ValueVector> {
        if op == LogicalOp::Not {
            let operand = operands
                .first()
                .ok_or_else(|| VexecError::InvalidExpression("NOT requires an operand".into()))?;
            return Ok(operand.eval(input, ctx)?.to_bitset()?.not()?.into_value_vector());
        }
        let mut result: Option<BitSetVector> = None;
        for operand in operands {
            let bits = operand.eval(input, ctx)?.to_bitset()?;
            result = Some(match result {
                None => bits,
                Some(prev) if op == LogicalOp::And => prev.and(&bits)?,
                Some(prev) => prev.or(&bits)?,
            });
        }
        let result =
            result.unwrap_or_else(|| BitSetVector::all(input.row_count(), op == LogicalOp::And));
        Ok(result.into_value_vector())
    }

    fn eval_arithmetic(
        left: &ValueVector,
        op: ArithmeticOp,
        right: &ValueVector,
        data_type: DataType,
    ) -> Result<ValueVector> {
        let mut builder = ValueVectorBuilder::new(data_type, left.len());
        for row in 0..left.len() {
            let value = apply_arithmetic(op, &left.get_value(row), &right.get_value(row))?;
            builder.push(value.cast(data_type).unwrap_or(value));
        }
        Ok(builder.finish())
    }
}

fn arithmetic_type(left: DataType, op: ArithmeticOp, right: DataType) -> DataType {
    match (left, right) {
        (DataType::String, DataType::String) if op == ArithmeticOp::Add => DataType::String,
        (l, r) if l.is_numeric() && r.is_numeric() => l.promote(r),
        _ => DataType::Any,
    }
}

#[allow(clippy::cast_precision_loss)]
fn apply_arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let overflow = || VexecError::ArithmeticOverflow(format!("{left} {} {right}", op.as_str()));
    match (left, right) {
        (Value::Int64(a), Value::Int64(b)) => {
            let result = match op {
                ArithmeticOp::Add => a.checked_add(*b),
                ArithmeticOp::Sub => a.checked_sub(*b),
                ArithmeticOp::Mul => a.checked_mul(*b),
                ArithmeticOp::Div | ArithmeticOp::Mod if *b == 0 => {
                    return Err(VexecError::DivisionByZero)
                }
                ArithmeticOp::Div => a.checked_div(*b),
                ArithmeticOp::Mod => a.checked_rem(*b),
            };
            result.map(Value::Int64).ok_or_else(overflow)
        }
        (Value::String(a), Value::String(b)) if op == ArithmeticOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let (a, b) = (a.to_f64().unwrap_or(f64::NAN), b.to_f64().unwrap_or(f64::NAN));
            let result = match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Sub => a - b,
                ArithmeticOp::Mul => a * b,
                ArithmeticOp::Div | ArithmeticOp::Mod if b == 0.0 => {
                    return Err(VexecError::DivisionByZero)
                }
                ArithmeticOp::Div => a / b,
                ArithmeticOp::Mod => a % b,
            };
            Ok(Value::Float64(result))
        }
        _ => Err(VexecError::InvalidExpression(format!(
            "Cannot apply {} to {left} and {right}",
            op.as_str()
        ))),
    }
}

impl Expression for ScalarExpression {
    fn eval(&self, input: &TupleVector, ctx: &ExecutionContext) -> Result<ValueVector> {
        match self {
            ScalarExpression::Literal { value, data_type } => Ok(if value.is_null() {
                ValueVector::nulls(*data_type, input.row_count())
            } else {
                ValueVector::literal(value.clone(), input.row_count())
            }),
            ScalarExpression::Column { name, outer, .. } => {
                Self::eval_column(name, *outer, input, ctx)
            }
            ScalarExpression::Asterisk { .. } => Err(VexecError::InvalidExpression(
                "Asterisk must be expanded by a projection".to_string(),
            )),
            ScalarExpression::Comparison { left, op, right } => {
                let l = left.eval(input, ctx)?;
                let r = right.eval(input, ctx)?;
                Self::eval_comparison(&l, *op, &r)
            }
            ScalarExpression::Logical { op, operands } => {
                Self::eval_logical(*op, operands, input, ctx)
            }
            ScalarExpression::Arithmetic { left, op, right } => {
                let l = left.eval(input, ctx)?;
                let r = right.eval(input, ctx)?;
                Self::eval_arithmetic(&l, *op, &r, self.data_type())
            }
            ScalarExpression::IsNull { operand, negated } => {
                let v = operand.eval(input, ctx)?;
                let result: BooleanArray = (0..v.len())
                    .map(|row| Some(v.is_null(row) != *negated))
                    .collect();
                Ok(ValueVector::from_boolean_array(result))
            }
            ScalarExpression::Alias { operand, .. } => operand.eval(input, ctx),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            ScalarExpression::Literal { data_type, .. }
            | ScalarExpression::Column { data_type, .. } => *data_type,
            ScalarExpression::Asterisk { .. } => DataType::Any,
            ScalarExpression::Comparison { .. }
            | ScalarExpression::Logical { .. }
            | ScalarExpression::IsNull { .. } => DataType::Bool,
            ScalarExpression::Arithmetic { left, op, right } => {
                arithmetic_type(left.data_type(), *op, right.data_type())
            }
            ScalarExpression::Alias { operand, .. } => operand.data_type(),
        }
    }

    fn output_name(&self) -> String {
        match self {
            ScalarExpression::Column { name, .. } => name
                .rsplit_once('.')
                .map_or_else(|| name.clone(), |(_, column)| column.to_string()),
            ScalarExpression::Alias { alias, .. } => alias.clone(),
            other => other.to_string(),
        }
    }

    fn asterisk(&self) -> Option<AsteriskRef<'_>> {
        match self {
            ScalarExpression::Asterisk { alias, outer } => Some(AsteriskRef {
                alias: alias.as_deref(),
                outer: *outer,
            }),
            _ => None,
        }
    }

    fn has_outer_reference(&self) -> bool {
        match self {
            ScalarExpression::Literal { .. } => false,
            ScalarExpression::Column { outer, .. } | ScalarExpression::Asterisk { outer, .. } => {
                *outer
            }
            ScalarExpression::Comparison { left, right, .. }
            | ScalarExpression::Arithmetic { left, right, .. } => {
                left.has_outer_reference() || right.has_outer_reference()
            }
            ScalarExpression::Logical { operands, .. } => {
                operands.iter().any(|o| o.has_outer_reference())
            }
            ScalarExpression::IsNull { operand, .. } | ScalarExpression::Alias { operand, .. } => {
                operand.has_outer_reference()
            }
        }
    }
}

impl fmt::Display for ScalarExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarExpression::Literal { value: Value::String(s), .. } => write!(f, "'{s}'"),
            ScalarExpression::Literal { value, .. } => write!(f, "{value}"),
            ScalarExpression::Column { name, outer: false, .. } => f.write_str(name),
            ScalarExpression::Column { name, outer: true, .. } => write!(f, "outer({name})"),
            ScalarExpression::Asterisk { alias, outer } => {
                let prefix = if *outer { "outer " } else { "" };
                match alias {
                    Some(alias) => write!(f, "{prefix}{alias}.*"),
                    None => write!(f, "{prefix}*"),
                }
            }
            ScalarExpression::Comparison { left, op, right } => {
                write!(f, "{left} {} {right}", op.as_str())
            }
            ScalarExpression::Logical { op: LogicalOp::Not, operands } => match operands.first() {
                Some(operand) => write!(f, "NOT {operand}"),
                None => f.write_str("NOT"),
            },
            ScalarExpression::Logical { op, operands } => {
                let sep = if *op == LogicalOp::And { " AND " } else { " OR " };
                let parts: Vec<String> = operands.iter().map(|o| format!("({o})")).collect();
                f.write_str(&parts.join(sep))
            }
            ScalarExpression::Arithmetic { left, op, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
            ScalarExpression::IsNull { operand, negated: false } => write!(f, "{operand} IS NULL"),
            ScalarExpression::IsNull { operand, negated: true } => {
                write!(f, "{operand} IS NOT NULL")
            }
            ScalarExpression::Alias { operand, alias } => write!(f, "{operand} AS {alias}"),
        }
    }
}

impl From<ScalarExpression> for ExpressionRef {
    fn from(expression: ScalarExpression) -> Self {
        Arc::new(expression)
    }
}
