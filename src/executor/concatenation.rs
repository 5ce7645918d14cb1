//! Concatenation operator for UNION ALL.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::executor::{
    no_such_element, DescribeProperties, PhysicalOperator, TupleIterator, TupleIteratorRef,
};
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::{Schema, SchemaRef};
use crate::vector::TupleVector;

/// Streams the batches of every input in order.
///
/// Inputs are executed one after another, each only once the previous one
/// is exhausted.
#[derive(Debug, Clone)]
pub struct Concatenation {
    node_id: NodeId,
    pub(crate) inputs: Vec<PhysicalPlan>,
}

impl Concatenation {
    /// Creates a concatenation of `inputs`.
    ///
    /// # Errors
    ///
    /// Returns a `QueryError` if two inputs with known schemas disagree on
    /// their column count.
    pub fn new(node_id: NodeId, inputs: Vec<PhysicalPlan>) -> Result<Self> {
        let mut expected: Option<usize> = None;
        for input in &inputs {
            let schema = input.schema();
            if schema.is_asterisk() {
                continue;
            }
            match expected {
                None => expected = Some(schema.len()),
                Some(n) if n != schema.len() => {
                    return Err(VexecError::query(format!(
                        "Concatenated inputs must have the same number of columns, got {n} and {}",
                        schema.len()
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(Concatenation { node_id, inputs })
    }
}

impl PhysicalOperator for Concatenation {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Concatenation"
    }

    fn schema(&self) -> SchemaRef {
        let schemas: Vec<SchemaRef> = self.inputs.iter().map(PhysicalPlan::schema).collect();
        if schemas.iter().any(|s| s.is_asterisk()) {
            return Arc::new(Schema::asterisk(None));
        }
        schemas
            .into_iter()
            .next()
            .unwrap_or_else(|| Arc::new(Schema::empty()))
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        self.inputs.iter().collect()
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        Ok(Box::new(ConcatenationIterator {
            inputs: &self.inputs,
            ctx,
            position: 0,
            current: None,
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        vec![("Inputs".to_string(), self.inputs.len().to_string())]
    }
}

struct ConcatenationIterator<'a> {
    inputs: &'a [PhysicalPlan],
    ctx: &'a ExecutionContext,
    position: usize,
    current: Option<TupleIteratorRef<'a>>,
}

impl TupleIterator for ConcatenationIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        loop {
            if let Some(current) = &mut self.current {
                if current.has_next()? {
                    return Ok(true);
                }
                current.close();
                self.current = None;
            }
            let Some(input) = self.inputs.get(self.position) else {
                return Ok(false);
            };
            self.position += 1;
            self.current = Some(input.execute(self.ctx)?);
        }
    }

    fn next(&mut self) -> Result<TupleVector> {
        match &mut self.current {
            Some(current) => current.next(),
            None => Err(no_such_element("Concatenation")),
        }
    }

    fn close(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.close();
        }
        self.position = self.inputs.len();
    }
}
