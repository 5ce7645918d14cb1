//! Assert operator guarding row counts.

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::executor::{
    no_such_element, DescribeProperties, PhysicalOperator, TupleIterator, TupleIteratorRef,
};
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::SchemaRef;
use crate::vector::TupleVector;

/// Passes its input through and fails the query once more than a maximum
/// number of rows has been seen, e.g. for scalar subqueries.
#[derive(Debug, Clone)]
pub struct Assert {
    node_id: NodeId,
    pub(crate) input: Box<PhysicalPlan>,
    max_row_count: usize,
    message: String,
}

impl Assert {
    /// Creates an assert allowing at most `max_row_count` rows.
    #[must_use]
    pub fn max_row_count(
        node_id: NodeId,
        input: PhysicalPlan,
        max_row_count: usize,
        message: impl Into<String>,
    ) -> Self {
        Assert {
            node_id,
            input: Box::new(input),
            max_row_count,
            message: message.into(),
        }
    }
}

impl PhysicalOperator for Assert {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Assert"
    }

    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        vec![self.input.as_ref()]
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        Ok(Box::new(AssertIterator {
            assert: self,
            input: self.input.execute(ctx)?,
            seen: 0,
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        vec![("Max row count".to_string(), self.max_row_count.to_string())]
    }
}

struct AssertIterator<'a> {
    assert: &'a Assert,
    input: TupleIteratorRef<'a>,
    seen: usize,
}

impl TupleIterator for AssertIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        self.input.has_next()
    }

    fn next(&mut self) -> Result<TupleVector> {
        let batch = self.input.next()?;
        self.seen += batch.row_count();
        if self.seen > self.assert.max_row_count {
            return Err(VexecError::query(self.assert.message.clone()));
        }
        Ok(batch)
    }

    fn close(&mut self) {
        self.input.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{collect_batches, ConstantScan};
    use crate::expression::ScalarExpression;
    use crate::types::{Column, DataType, Schema};

    fn rows(n: i64) -> PhysicalPlan {
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

    #[test]
    fn test_assert_passes_within_limit() {
        let ctx = ExecutionContext::default();
        let assert = Assert::max_row_count(1, rows(1), 1, "Subquery returned more than one row");
        let batches = collect_batches(assert.execute(&ctx).unwrap()).unwrap();
        assert_eq!(batches[0].row_count(), 1);
    }

    #[test]
    fn test_assert_fails_above_limit() {
        let ctx = ExecutionContext::default();
        let assert = Assert::max_row_count(1, rows(2), 1, "Subquery returned more than one row");
        let err = collect_batches(assert.execute(&ctx).unwrap()).unwrap_err();
        assert!(err.is_query_error());
        assert!(err.to_string().contains("more than one row"));
    }

    #[test]
    fn test_next_without_has_next_is_no_such_element() {
        let ctx = ExecutionContext::default();
        let assert = Assert::max_row_count(1, rows(0), 1, "too many rows");
        let mut iter = assert.execute(&ctx).unwrap();
        assert!(matches!(iter.next(), Err(VexecError::NoSuchElement(_))));
    }
}
