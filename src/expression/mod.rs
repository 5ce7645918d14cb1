//! Expressions evaluated over tuple vectors.
//!
//! Operators treat expressions as black boxes behind the [`Expression`]
//! trait. [`ScalarExpression`] is the built-in implementation covering
//! literals, column references (including correlated outer columns),
//! comparisons, boolean logic and arithmetic.

mod aggregate;
mod scalar;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::types::DataType;
use crate::vector::{TupleVector, ValueVector};

pub use aggregate::{Aggregate, AggregateExpression, AggregateExpressionRef, AggregateFunction};
pub use scalar::ScalarExpression;

/// Shared reference to an expression.
pub type ExpressionRef = Arc<dyn Expression>;

/// Wildcard reference produced by [`Expression::asterisk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsteriskRef<'a> {
    /// Restricts expansion to columns of this table alias.
    pub alias: Option<&'a str>,
    /// Expands the context's outer tuple vector instead of the input.
    pub outer: bool,
}

/// An expression evaluated a batch at a time.
pub trait Expression: fmt::Debug + fmt::Display + Send + Sync {
    /// Evaluates the expression for every row of `input`.
    ///
    /// The result has exactly `input.row_count()` rows.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails.
    fn eval(&self, input: &TupleVector, ctx: &ExecutionContext) -> Result<ValueVector>;

    /// Evaluates the expression without input rows, yielding one row.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails.
    fn eval_scalar(&self, ctx: &ExecutionContext) -> Result<ValueVector> {
        self.eval(&TupleVector::constant(1), ctx)
    }

    /// Returns the result type, `Any` if only known at runtime.
    fn data_type(&self) -> DataType;

    /// Returns the column name the expression produces in a projection.
    fn output_name(&self) -> String {
        self.to_string()
    }

    /// Returns the wildcard this expression stands for, if any.
    fn asterisk(&self) -> Option<AsteriskRef<'_>> {
        None
    }

    /// Returns true if the expression reads the context's outer tuple vector.
    fn has_outer_reference(&self) -> bool {
        false
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    /// Equal (=).
    Eq,
    /// Not equal (<>).
    Neq,
    /// Less than (<).
    Lt,
    /// Less than or equal (<=).
    Lte,
    /// Greater than (>).
    Gt,
    /// Greater than or equal (>=).
    Gte,
}

impl ComparisonOp {
    /// Returns the string representation of this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Neq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
        }
    }

    /// Returns true if `ordering` satisfies this operator.
    #[must_use]
    pub fn matches(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            ComparisonOp::Eq => ordering == Equal,
            ComparisonOp::Neq => ordering != Equal,
            ComparisonOp::Lt => ordering == Less,
            ComparisonOp::Lte => ordering != Greater,
            ComparisonOp::Gt => ordering == Greater,
            ComparisonOp::Gte => ordering != Less,
        }
    }
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOp {
    /// Returns the string representation of this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        }
    }
}
