//! Aggregate expressions evaluated over grouped rows.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::types::{DataType, Value};
use crate::vector::{ValueVector, ValueVectorBuilder};

use super::ExpressionRef;

/// Shared reference to an aggregate expression.
pub type AggregateExpressionRef = Arc<dyn AggregateExpression>;

/// An expression producing one value per group.
pub trait AggregateExpression: fmt::Debug + fmt::Display + Send + Sync {
    /// Evaluates the aggregate for every group.
    ///
    /// `groups` is a table-typed vector: row `g` holds the rows of group `g`.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation of the input expression fails.
    fn eval_groups(&self, groups: &ValueVector, ctx: &ExecutionContext) -> Result<ValueVector>;

    /// Returns the result type.
    fn data_type(&self) -> DataType;

    /// Returns the output column name.
    fn output_name(&self) -> String {
        self.to_string()
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Value of the first row in the group; used for grouped columns.
    First,
}

impl AggregateFunction {
    /// Returns the name of this aggregate function.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::First => "FIRST",
        }
    }

    /// Returns the output data type for this aggregate function given an input type.
    #[must_use]
    pub fn output_type(&self, input_type: Option<DataType>) -> DataType {
        match self {
            AggregateFunction::Count => DataType::Int64,
            AggregateFunction::Avg => DataType::Float64,
            AggregateFunction::Sum => match input_type {
                Some(DataType::Int64) | None => DataType::Int64,
                Some(t) if t.is_numeric() => DataType::Float64,
                Some(_) => DataType::Any,
            },
            AggregateFunction::Min | AggregateFunction::Max | AggregateFunction::First => {
                input_type.unwrap_or(DataType::Any)
            }
        }
    }
}

/// Built-in aggregate over an optional input expression.
#[derive(Debug, Clone)]
pub struct Aggregate {
    function: AggregateFunction,
    input: Option<ExpressionRef>,
    alias: Option<String>,
}

impl Aggregate {
    /// Creates an aggregate expression.
    #[must_use]
    pub fn new(function: AggregateFunction, input: Option<ExpressionRef>) -> Self {
        Aggregate {
            function,
            input,
            alias: None,
        }
    }

    /// Creates a COUNT(*) expression.
    #[must_use]
    pub fn count_star() -> Self {
        Self::new(AggregateFunction::Count, None)
    }

    /// Creates a FIRST(expr) expression, the value of a grouped column.
    #[must_use]
    pub fn first(input: ExpressionRef) -> Self {
        Self::new(AggregateFunction::First, Some(input))
    }

    /// Sets the output column name.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Wraps this aggregate in a shared reference.
    #[must_use]
    pub fn into_ref(self) -> AggregateExpressionRef {
        Arc::new(self)
    }

    fn aggregate(&self, values: &[Value], row_count: usize) -> Result<Value> {
        let non_null = values.iter().filter(|v| !v.is_null());
        match self.function {
            AggregateFunction::Count => {
                let count = if self.input.is_some() {
                    non_null.count()
                } else {
                    row_count
                };
                Ok(Value::Int64(i64::try_from(count).unwrap_or(i64::MAX)))
            }
            AggregateFunction::First => Ok(values.first().cloned().unwrap_or(Value::Null)),
            AggregateFunction::Min => Ok(non_null
                .min_by(|a, b| a.total_cmp(b))
                .cloned()
                .unwrap_or(Value::Null)),
            AggregateFunction::Max => Ok(non_null
                .max_by(|a, b| a.total_cmp(b))
                .cloned()
                .unwrap_or(Value::Null)),
            AggregateFunction::Sum => sum(non_null),
            AggregateFunction::Avg => {
                let mut total = 0.0;
                let mut count = 0usize;
                for value in non_null {
                    total += numeric(value)?;
                    count += 1;
                }
                if count == 0 {
                    return Ok(Value::Null);
                }
                #[allow(clippy::cast_precision_loss)]
                let avg = total / count as f64;
                Ok(Value::Float64(avg))
            }
        }
    }
}

fn numeric(value: &Value) -> Result<f64> {
    value
        .cast(DataType::Float64)
        .and_then(|v| v.as_float64())
        .ok_or_else(|| VexecError::TypeError {
            expected: "numeric".to_string(),
            actual: value.data_type().map_or("NULL", |t| t.name()).to_string(),
        })
}

fn sum<'a>(values: impl Iterator<Item = &'a Value>) -> Result<Value> {
    let mut int_sum: Option<i64> = None;
    let mut float_sum: Option<f64> = None;
    for value in values {
        match (value, float_sum) {
            (Value::Int64(v), None) => {
                let current = int_sum.unwrap_or(0);
                int_sum = Some(current.checked_add(*v).ok_or_else(|| {
                    VexecError::ArithmeticOverflow(format!("SUM overflow adding {v} to {current}"))
                })?);
            }
            _ => {
                #[allow(clippy::cast_precision_loss)]
                let base = float_sum.unwrap_or_else(|| int_sum.take().map_or(0.0, |s| s as f64));
                float_sum = Some(base + numeric(value)?);
            }
        }
    }
    Ok(match (int_sum, float_sum) {
        (_, Some(f)) => Value::Float64(f),
        (Some(i), None) => Value::Int64(i),
        (None, None) => Value::Null,
    })
}

impl AggregateExpression for Aggregate {
    fn eval_groups(&self, groups: &ValueVector, ctx: &ExecutionContext) -> Result<ValueVector> {
        let data_type = self.data_type();
        let mut builder = ValueVectorBuilder::new(data_type, groups.len());
        for group in 0..groups.len() {
            let Some(rows) = groups.get_table(group) else {
                builder.push(self.aggregate(&[], 0)?);
                continue;
            };
            let values = match &self.input {
                Some(input) => input.eval(&rows, ctx)?.values(),
                None => Vec::new(),
            };
            let value = self.aggregate(&values, rows.row_count())?;
            builder.push(value.cast(data_type).unwrap_or(value));
        }
        Ok(builder.finish())
    }

    fn data_type(&self) -> DataType {
        self.function
            .output_type(self.input.as_ref().map(|input| input.data_type()))
    }

    fn output_name(&self) -> String {
        match (&self.alias, self.function, &self.input) {
            (Some(alias), _, _) => alias.clone(),
            (None, AggregateFunction::First, Some(input)) => input.output_name(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.input {
            Some(input) => write!(f, "{}({input})", self.function.name()),
            None => write!(f, "{}(*)", self.function.name()),
        }
    }
}
