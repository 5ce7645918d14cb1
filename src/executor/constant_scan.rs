//! Constant scan operator for literal rows.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::executor::{
    no_such_element, DescribeProperties, PhysicalOperator, TupleIterator, TupleIteratorRef,
};
use crate::expression::ExpressionRef;
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::{Schema, SchemaRef};
use crate::vector::{TupleVector, ValueVectorBuilder};

/// Produces a single batch of rows built from scalar expressions.
#[derive(Debug, Clone)]
pub struct ConstantScan {
    node_id: NodeId,
    schema: SchemaRef,
    rows: Vec<Vec<ExpressionRef>>,
}

impl ConstantScan {
    /// Creates a constant scan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a row does not have one expression per
    /// schema column.
    pub fn new(node_id: NodeId, schema: Schema, rows: Vec<Vec<ExpressionRef>>) -> Result<Self> {
        if let Some(row) = rows.iter().find(|r| r.len() != schema.len()) {
            return Err(VexecError::invalid_argument(format!(
                "Constant scan row has {} values, schema has {} columns",
                row.len(),
                schema.len()
            )));
        }
        Ok(ConstantScan {
            node_id,
            schema: Arc::new(schema),
            rows,
        })
    }

    /// Creates a scan of one row without columns, the input of a FROM-less select.
    #[must_use]
    pub fn one_row(node_id: NodeId) -> Self {
        ConstantScan {
            node_id,
            schema: Arc::new(Schema::empty()),
            rows: vec![Vec::new()],
        }
    }

    fn build(&self, ctx: &ExecutionContext) -> Result<TupleVector> {
        let mut columns = Vec::with_capacity(self.schema.len());
        for (ordinal, column) in self.schema.columns().iter().enumerate() {
            let mut builder = ValueVectorBuilder::new(column.data_type, self.rows.len());
            for row in &self.rows {
                builder.push(row[ordinal].eval_scalar(ctx)?.get_value(0));
            }
            columns.push(builder.finish());
        }
        TupleVector::try_new_with_row_count(self.schema.clone(), columns, self.rows.len())
    }
}

impl PhysicalOperator for ConstantScan {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Constant scan"
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        Vec::new()
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        Ok(Box::new(ConstantScanIterator {
            scan: self,
            ctx,
            done: self.rows.is_empty(),
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        vec![("Rows".to_string(), self.rows.len().to_string())]
    }
}

struct ConstantScanIterator<'a> {
    scan: &'a ConstantScan,
    ctx: &'a ExecutionContext,
    done: bool,
}

impl TupleIterator for ConstantScanIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        Ok(!self.done)
    }

    fn next(&mut self) -> Result<TupleVector> {
        if self.done {
            return Err(no_such_element("ConstantScan"));
        }
        self.done = true;
        self.scan.build(self.ctx)
    }

    fn estimated_row_count(&self) -> Option<usize> {
        Some(if self.done { 0 } else { self.scan.rows.len() })
    }

    fn close(&mut self) {
        self.done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::collect_batches;
    use crate::expression::ScalarExpression;
    use crate::types::{Column, DataType, Value};

    #[test]
    fn test_one_row_has_no_columns() {
        let ctx = ExecutionContext::default();
        let scan = ConstantScan::one_row(0);
        let batches = collect_batches(scan.execute(&ctx).unwrap()).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].row_count(), 1);
        assert_eq!(batches[0].column_count(), 0);
    }

    #[test]
    fn test_rows_are_evaluated() {
        let ctx = ExecutionContext::default();
        let scan = ConstantScan::new(
            0,
            Schema::new(vec![Column::new("a", DataType::Int64)]),
            vec![
                vec![ScalarExpression::literal(1i64).into_ref()],
                vec![ScalarExpression::null(DataType::Int64).into_ref()],
            ],
        )
        .unwrap();
        let batches = collect_batches(scan.execute(&ctx).unwrap()).unwrap();
        assert_eq!(batches[0].rows(), vec![vec![Value::Int64(1)], vec![Value::Null]]);
    }

    #[test]
    fn test_row_width_is_validated() {
        let result = ConstantScan::new(
            0,
            Schema::new(vec![Column::new("a", DataType::Int64)]),
            vec![vec![]],
        );
        assert!(matches!(result, Err(VexecError::InvalidArgument(_))));
    }
}
