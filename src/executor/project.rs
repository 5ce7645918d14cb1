//! Projection operator.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::executor::{
    no_such_element, DescribeProperties, PhysicalOperator, TupleIterator, TupleIteratorRef,
};
use crate::expression::{AsteriskRef, ExpressionRef};
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::{Column, DataType, Schema, SchemaRef};
use crate::vector::{RowMapping, TupleVector, ValueVector};

/// Evaluates a list of expressions for every input batch.
///
/// Asterisk expressions expand to the columns of the runtime batch (or of
/// the outer tuple vector for outer asterisks), optionally restricted to
/// one table alias.
#[derive(Debug, Clone)]
pub struct Projection {
    node_id: NodeId,
    pub(crate) input: Option<Box<PhysicalPlan>>,
    expressions: Vec<ExpressionRef>,
}

impl Projection {
    /// Creates a projection over `input`.
    #[must_use]
    pub fn new(node_id: NodeId, input: PhysicalPlan, expressions: Vec<ExpressionRef>) -> Self {
        Projection {
            node_id,
            input: Some(Box::new(input)),
            expressions,
        }
    }

    /// Creates a projection without input, evaluated over a single row.
    #[must_use]
    pub fn scalar(node_id: NodeId, expressions: Vec<ExpressionRef>) -> Self {
        Projection {
            node_id,
            input: None,
            expressions,
        }
    }

    /// Returns the projected expressions.
    #[must_use]
    pub fn expressions(&self) -> &[ExpressionRef] {
        &self.expressions
    }

    fn project(&self, batch: &TupleVector, ctx: &ExecutionContext) -> Result<TupleVector> {
        let mut columns = Vec::with_capacity(self.expressions.len());
        let mut vectors = Vec::with_capacity(self.expressions.len());
        for expression in &self.expressions {
            if let Some(asterisk) = expression.asterisk() {
                expand_asterisk(asterisk, batch, ctx, &mut columns, &mut vectors)?;
                continue;
            }
            let vector = expression.eval(batch, ctx)?;
            let data_type = match expression.data_type() {
                DataType::Any => vector.data_type(),
                declared => declared,
            };
            columns.push(Column::new(expression.output_name(), data_type));
            vectors.push(vector);
        }
        TupleVector::try_new_with_row_count(
            Arc::new(Schema::new(columns)),
            vectors,
            batch.row_count(),
        )
    }
}

fn expand_asterisk(
    asterisk: AsteriskRef<'_>,
    batch: &TupleVector,
    ctx: &ExecutionContext,
    columns: &mut Vec<Column>,
    vectors: &mut Vec<ValueVector>,
) -> Result<()> {
    let outer;
    let source = if asterisk.outer {
        outer = ctx.statement().outer_tuple_vector().ok_or_else(|| {
            VexecError::InvalidExpression("Outer asterisk without outer tuple vector".into())
        })?;
        &outer
    } else {
        batch
    };
    let rows = batch.row_count();
    for (column, vector) in source.schema().columns().iter().zip(source.columns()) {
        let included = match asterisk.alias {
            None => true,
            Some(alias) => column
                .table_source
                .as_ref()
                .is_some_and(|ts| ts.alias.eq_ignore_ascii_case(alias)),
        };
        if !included {
            continue;
        }
        let vector = match source.row_count() {
            n if n == rows => vector.clone(),
            1 => vector.reindex(RowMapping::Repeat { row: 0 }, rows),
            n => {
                return Err(VexecError::InvalidExpression(format!(
                    "Outer tuple vector has {n} rows but input has {rows}"
                )))
            }
        };
        columns.push(column.clone());
        vectors.push(vector);
    }
    Ok(())
}

impl PhysicalOperator for Projection {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Projection"
    }

    fn schema(&self) -> SchemaRef {
        if self.expressions.iter().any(|e| e.asterisk().is_some()) {
            return Arc::new(Schema::asterisk(None));
        }
        Arc::new(Schema::new(
            self.expressions
                .iter()
                .map(|e| Column::new(e.output_name(), e.data_type()))
                .collect(),
        ))
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        self.input.iter().map(|input| &**input).collect()
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        let input = match &self.input {
            Some(input) => Some(input.execute(ctx)?),
            None => None,
        };
        Ok(Box::new(ProjectionIterator {
            projection: self,
            ctx,
            input,
            scalar_done: false,
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        let expressions: Vec<String> = self.expressions.iter().map(ToString::to_string).collect();
        vec![("Expressions".to_string(), expressions.join(", "))]
    }
}

struct ProjectionIterator<'a> {
    projection: &'a Projection,
    ctx: &'a ExecutionContext,
    input: Option<TupleIteratorRef<'a>>,
    scalar_done: bool,
}

impl TupleIterator for ProjectionIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        match &mut self.input {
            Some(input) => input.has_next(),
            None => Ok(!self.scalar_done),
        }
    }

    fn next(&mut self) -> Result<TupleVector> {
        let batch = match &mut self.input {
            Some(input) => input.next()?,
            None if !self.scalar_done => {
                self.scalar_done = true;
                TupleVector::constant(1)
            }
            None => return Err(no_such_element("Projection")),
        };
        self.projection.project(&batch, self.ctx)
    }

    fn estimated_row_count(&self) -> Option<usize> {
        match &self.input {
            Some(input) => input.estimated_row_count(),
            None => Some(1),
        }
    }

    fn close(&mut self) {
        if let Some(input) = &mut self.input {
            input.close();
        }
        self.scalar_done = true;
    }
}
