//! Instrumentation decorator recording per-node execution statistics.

use std::time::Instant;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::executor::{DescribeProperties, PhysicalOperator, TupleIterator, TupleIteratorRef};
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::SchemaRef;
use crate::vector::TupleVector;

/// Wraps a plan node and records executions, batches, rows and wall time
/// into the node's [`NodeData`](crate::context::NodeData).
///
/// The wrapper shares the node id of the wrapped node and forwards every
/// call, so results are identical with or without it. Recorded time
/// includes the time spent in children.
#[derive(Debug, Clone)]
pub struct Analyze {
    pub(crate) input: Box<PhysicalPlan>,
}

impl Analyze {
    /// Wraps `input`.
    #[must_use]
    pub fn new(input: PhysicalPlan) -> Self {
        Analyze {
            input: Box::new(input),
        }
    }

    /// Returns the wrapped node.
    #[must_use]
    pub fn input(&self) -> &PhysicalPlan {
        &self.input
    }

    /// Unwraps the decorated node.
    #[must_use]
    pub fn into_input(self) -> PhysicalPlan {
        *self.input
    }
}

impl PhysicalOperator for Analyze {
    fn node_id(&self) -> NodeId {
        self.input.node_id()
    }

    fn name(&self) -> &'static str {
        self.input.name()
    }

    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        self.input.children()
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        let node_id = self.node_id();
        let started = Instant::now();
        let input = self.input.execute(ctx);
        let elapsed = started.elapsed();
        ctx.statement().with_node_data(node_id, |data| {
            data.executions += 1;
            data.elapsed += elapsed;
        });
        Ok(Box::new(AnalyzeIterator {
            node_id,
            ctx,
            input: input?,
        }))
    }

    fn describe_properties(&self, ctx: &ExecutionContext) -> DescribeProperties {
        self.input.describe_properties(ctx)
    }
}

struct AnalyzeIterator<'a> {
    node_id: NodeId,
    ctx: &'a ExecutionContext,
    input: TupleIteratorRef<'a>,
}

impl AnalyzeIterator<'_> {
    fn timed<T>(&mut self, f: impl FnOnce(&mut dyn TupleIterator) -> T) -> T {
        let started = Instant::now();
        let result = f(self.input.as_mut());
        let elapsed = started.elapsed();
        self.ctx
            .statement()
            .with_node_data(self.node_id, |data| data.elapsed += elapsed);
        result
    }
}

impl TupleIterator for AnalyzeIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        self.timed(|input| input.has_next())
    }

    fn next(&mut self) -> Result<TupleVector> {
        let batch = self.timed(|input| input.next())?;
        let rows = batch.row_count() as u64;
        self.ctx.statement().with_node_data(self.node_id, |data| {
            data.batches += 1;
            data.rows += rows;
        });
        Ok(batch)
    }

    fn estimated_row_count(&self) -> Option<usize> {
        self.input.estimated_row_count()
    }

    fn close(&mut self) {
        self.timed(|input| input.close());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{collect_batches, ConstantScan, Filter};
    use crate::expression::ScalarExpression;
    use crate::types::{Column, DataType, Schema};

    fn numbers() -> PhysicalPlan {
        ConstantScan::new(
            2,
            Schema::new(vec![Column::new("n", DataType::Int64)]),
            (0..4)
                .map(|v: i64| vec![ScalarExpression::literal(v).into_ref()])
                .collect(),
        )
        .unwrap()
        .into()
    }

    #[test]
    fn test_analyze_is_transparent() {
        let ctx = ExecutionContext::default();
        let plain = numbers();
        let wrapped = Analyze::new(numbers());
        assert_eq!(wrapped.node_id(), plain.node_id());
        assert_eq!(wrapped.name(), plain.name());
        assert_eq!(wrapped.schema(), plain.schema());
        let expected = collect_batches(plain.execute(&ctx).unwrap()).unwrap();
        let actual = collect_batches(wrapped.execute(&ctx).unwrap()).unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_analyze_records_rows_and_batches() {
        let ctx = ExecutionContext::default();
        let filter = Filter::new(
            1,
            Analyze::new(numbers()).into(),
            ScalarExpression::literal(true).into_ref(),
        );
        let wrapped = Analyze::new(filter.into());
        collect_batches(wrapped.execute(&ctx).unwrap()).unwrap();
        for node_id in [1, 2] {
            let data = ctx.statement().node_data(node_id).unwrap();
            assert_eq!(data.executions, 1);
            assert_eq!(data.batches, 1);
            assert_eq!(data.rows, 4);
        }
    }
}
