//! Limit operator for LIMIT / OFFSET.

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::executor::{
    no_such_element, DescribeProperties, PhysicalOperator, TupleIterator, TupleIteratorRef,
};
use crate::expression::ExpressionRef;
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::SchemaRef;
use crate::vector::TupleVector;

/// Truncates the input stream after a number of rows, optionally skipping
/// leading rows first.
#[derive(Debug, Clone)]
pub struct Limit {
    node_id: NodeId,
    pub(crate) input: Box<PhysicalPlan>,
    count: ExpressionRef,
    offset: Option<ExpressionRef>,
}

impl Limit {
    /// Creates a limit operator.
    #[must_use]
    pub fn new(node_id: NodeId, input: PhysicalPlan, count: ExpressionRef) -> Self {
        Limit {
            node_id,
            input: Box::new(input),
            count,
            offset: None,
        }
    }

    /// Skips `offset` rows before counting.
    #[must_use]
    pub fn with_offset(mut self, offset: ExpressionRef) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Evaluates a row count expression that must yield one non-negative integer.
fn eval_row_count(expression: &ExpressionRef, clause: &str, ctx: &ExecutionContext) -> Result<usize> {
    let invalid = || {
        VexecError::query(format!(
            "{clause} expression must return a single non-negative integer, got: {expression}"
        ))
    };
    let value = expression.eval_scalar(ctx)?;
    if value.len() != 1 || value.is_null(0) {
        return Err(invalid());
    }
    let count = value.get_int64(0).map_err(|_| invalid())?;
    usize::try_from(count).map_err(|_| invalid())
}

impl PhysicalOperator for Limit {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Limit"
    }

    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        vec![self.input.as_ref()]
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        Ok(Box::new(LimitIterator {
            limit: self,
            ctx,
            input: self.input.execute(ctx)?,
            bounds: None,
            next: None,
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        let mut properties = vec![("Limit".to_string(), self.count.to_string())];
        if let Some(offset) = &self.offset {
            properties.push(("Offset".to_string(), offset.to_string()));
        }
        properties
    }
}

/// Remaining rows to skip and to emit.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    skip: usize,
    remaining: usize,
}

struct LimitIterator<'a> {
    limit: &'a Limit,
    ctx: &'a ExecutionContext,
    input: TupleIteratorRef<'a>,
    bounds: Option<Bounds>,
    next: Option<TupleVector>,
}

impl LimitIterator<'_> {
    fn bounds(&mut self) -> Result<Bounds> {
        if let Some(bounds) = self.bounds {
            return Ok(bounds);
        }
        let remaining = eval_row_count(&self.limit.count, "LIMIT", self.ctx)?;
        let skip = match &self.limit.offset {
            Some(offset) => eval_row_count(offset, "OFFSET", self.ctx)?,
            None => 0,
        };
        let bounds = Bounds { skip, remaining };
        self.bounds = Some(bounds);
        Ok(bounds)
    }
}

impl TupleIterator for LimitIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        if self.next.is_some() {
            return Ok(true);
        }
        let mut bounds = self.bounds()?;
        while bounds.remaining > 0 && self.input.has_next()? {
            let batch = self.input.next()?;
            let rows = batch.row_count();
            if bounds.skip >= rows {
                bounds.skip -= rows;
                continue;
            }
            let len = (rows - bounds.skip).min(bounds.remaining);
            let batch = if bounds.skip == 0 && len == rows {
                batch
            } else {
                batch.slice(bounds.skip, len)
            };
            bounds.skip = 0;
            bounds.remaining -= len;
            self.next = Some(batch);
            break;
        }
        self.bounds = Some(bounds);
        Ok(self.next.is_some())
    }

    fn next(&mut self) -> Result<TupleVector> {
        self.next.take().ok_or_else(|| no_such_element("Limit"))
    }

    fn close(&mut self) {
        self.next = None;
        self.input.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{collect_batches, ConstantScan};
    use crate::expression::ScalarExpression;
    use crate::types::{Column, DataType, Schema, Value};

    fn numbers(n: i64) -> PhysicalPlan {
        ConstantScan::new(
            0,
            Schema::new(vec![Column::new("n", DataType::Int64)]),
            (0..n)
                .map(|v| vec![ScalarExpression::literal(v).into_ref()])
                .collect(),
        )
        .unwrap()
        .into()
    }

    fn run(limit: &Limit) -> Result<Vec<Value>> {
        let ctx = ExecutionContext::default();
        let batches = collect_batches(limit.execute(&ctx)?)?;
        Ok(batches
            .iter()
            .flat_map(|b| b.column(0).values())
            .collect())
    }

    #[test]
    fn test_limit_truncates() {
        let limit = Limit::new(1, numbers(5), ScalarExpression::literal(3i64).into_ref());
        assert_eq!(run(&limit).unwrap(), vec![Value::Int64(0), Value::Int64(1), Value::Int64(2)]);
    }

    #[test]
    fn test_limit_with_offset() {
        let limit = Limit::new(1, numbers(5), ScalarExpression::literal(2i64).into_ref())
            .with_offset(ScalarExpression::literal(2i64).into_ref());
        assert_eq!(run(&limit).unwrap(), vec![Value::Int64(2), Value::Int64(3)]);
    }

    #[test]
    fn test_limit_zero() {
        let limit = Limit::new(1, numbers(5), ScalarExpression::literal(0i64).into_ref());
        assert!(run(&limit).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_limit_values_are_query_errors() {
        for count in [
            ScalarExpression::literal(-1i64),
            ScalarExpression::null(DataType::Int64),
            ScalarExpression::literal("ten"),
        ] {
            let limit = Limit::new(1, numbers(5), count.into_ref());
            assert!(run(&limit).unwrap_err().is_query_error());
        }
    }
}
