//! Filter operator for WHERE clauses.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::executor::{
    no_such_element, DescribeProperties, PhysicalOperator, TupleIterator, TupleIteratorRef,
};
use crate::expression::ExpressionRef;
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::SchemaRef;
use crate::vector::TupleVector;

/// Filter operator for predicate evaluation.
///
/// Batches without a single matching row are skipped entirely. Partially
/// matching batches are returned as selection views over the input.
#[derive(Debug, Clone)]
pub struct Filter {
    node_id: NodeId,
    pub(crate) input: Box<PhysicalPlan>,
    predicate: ExpressionRef,
}

impl Filter {
    /// Creates a new filter operator with the given input and predicate.
    #[must_use]
    pub fn new(node_id: NodeId, input: PhysicalPlan, predicate: ExpressionRef) -> Self {
        Filter {
            node_id,
            input: Box::new(input),
            predicate,
        }
    }

    /// Returns the predicate.
    #[must_use]
    pub fn predicate(&self) -> &ExpressionRef {
        &self.predicate
    }
}

impl PhysicalOperator for Filter {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Filter"
    }

    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        vec![self.input.as_ref()]
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        Ok(Box::new(FilterIterator {
            filter: self,
            ctx,
            input: self.input.execute(ctx)?,
            next: None,
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        vec![("Predicate".to_string(), self.predicate.to_string())]
    }
}

struct FilterIterator<'a> {
    filter: &'a Filter,
    ctx: &'a ExecutionContext,
    input: TupleIteratorRef<'a>,
    next: Option<TupleVector>,
}

impl TupleIterator for FilterIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        while self.next.is_none() {
            if !self.input.has_next()? {
                return Ok(false);
            }
            let batch = self.input.next()?;
            let matches = self.filter.predicate.eval(&batch, self.ctx)?.to_bitset()?;
            let cardinality = matches.cardinality();
            if cardinality == 0 {
                continue;
            }
            self.next = Some(if cardinality == batch.row_count() {
                batch
            } else {
                batch.select(&matches.to_selection())
            });
        }
        Ok(true)
    }

    fn next(&mut self) -> Result<TupleVector> {
        self.next.take().ok_or_else(|| no_such_element("Filter"))
    }

    fn close(&mut self) {
        self.next = None;
        self.input.close();
    }
}
