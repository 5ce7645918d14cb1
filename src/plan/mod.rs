//! Physical plan tree.
//!
//! The set of operators is closed, so a plan is a sum type over the operator
//! structs. Traversal and rewriting match on it exhaustively; execution
//! dispatches through [`PhysicalOperator`].

mod describe;
mod rewrite;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::executor::{
    Analyze, Assert, Concatenation, ConstantScan, DescribeProperties, Filter, HashAggregate,
    HashMatch, Limit, NestedLoop, PhysicalOperator, Projection, Sort, TableScan,
    TupleIteratorRef,
};
use crate::types::SchemaRef;

pub use describe::{describe_json, describe_plan, format_describe, DescribeRow};
pub use rewrite::{
    transform_up, walk, AnalyzeRewriter, PlanRewriter, PlanVisitor, StripAnalyzeRewriter,
    Transformed,
};

/// Stable identifier of a plan node, unique within one plan.
pub type NodeId = u32;

/// A node of the physical plan tree.
#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    TableScan(TableScan),
    ConstantScan(ConstantScan),
    Projection(Projection),
    Filter(Filter),
    Sort(Sort),
    Limit(Limit),
    Concatenation(Concatenation),
    Assert(Assert),
    HashAggregate(HashAggregate),
    NestedLoop(NestedLoop),
    HashMatch(HashMatch),
    /// Instrumentation wrapper around another node.
    Analyze(Analyze),
}

macro_rules! impl_from_operator {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for PhysicalPlan {
                fn from(operator: $variant) -> Self {
                    PhysicalPlan::$variant(operator)
                }
            }
        )*
    };
}

impl_from_operator!(
    TableScan,
    ConstantScan,
    Projection,
    Filter,
    Sort,
    Limit,
    Concatenation,
    Assert,
    HashAggregate,
    NestedLoop,
    HashMatch,
    Analyze,
);

impl PhysicalPlan {
    /// Returns the operator behind this node.
    #[must_use]
    pub fn operator(&self) -> &dyn PhysicalOperator {
        match self {
            PhysicalPlan::TableScan(op) => op,
            PhysicalPlan::ConstantScan(op) => op,
            PhysicalPlan::Projection(op) => op,
            PhysicalPlan::Filter(op) => op,
            PhysicalPlan::Sort(op) => op,
            PhysicalPlan::Limit(op) => op,
            PhysicalPlan::Concatenation(op) => op,
            PhysicalPlan::Assert(op) => op,
            PhysicalPlan::HashAggregate(op) => op,
            PhysicalPlan::NestedLoop(op) => op,
            PhysicalPlan::HashMatch(op) => op,
            PhysicalPlan::Analyze(op) => op,
        }
    }

    /// Returns the node id.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.operator().node_id()
    }

    /// Returns the operator name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.operator().name()
    }

    /// Returns the output schema (possibly an asterisk placeholder).
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.operator().schema()
    }

    /// Returns the structural children.
    #[must_use]
    pub fn children(&self) -> Vec<&PhysicalPlan> {
        self.operator().children()
    }

    /// Starts executing this node.
    ///
    /// # Errors
    ///
    /// Returns an error if the operator fails to start.
    pub fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        self.operator().execute(ctx)
    }

    /// Returns the properties shown when describing this node.
    #[must_use]
    pub fn describe_properties(&self, ctx: &ExecutionContext) -> DescribeProperties {
        self.operator().describe_properties(ctx)
    }

    /// Returns true for an instrumentation wrapper.
    #[must_use]
    pub fn is_analyze(&self) -> bool {
        matches!(self, PhysicalPlan::Analyze(_))
    }

    /// Returns this node with instrumentation wrappers removed.
    #[must_use]
    pub fn logical(&self) -> &PhysicalPlan {
        match self {
            PhysicalPlan::Analyze(analyze) => analyze.input().logical(),
            other => other,
        }
    }

    /// Rebuilds this node with each child replaced by `f(child)`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by `f`.
    pub fn map_children(
        self,
        f: &mut dyn FnMut(PhysicalPlan) -> Result<Transformed<PhysicalPlan>>,
    ) -> Result<Transformed<PhysicalPlan>> {
        let mut changed = false;
        let mut map = |child: PhysicalPlan| -> Result<Box<PhysicalPlan>> {
            let transformed = f(child)?;
            changed |= transformed.was_transformed();
            Ok(Box::new(transformed.into_inner()))
        };
        let plan = match self {
            leaf @ (PhysicalPlan::TableScan(_) | PhysicalPlan::ConstantScan(_)) => leaf,
            PhysicalPlan::Projection(mut op) => {
                if let Some(input) = op.input.take() {
                    op.input = Some(map(*input)?);
                }
                PhysicalPlan::Projection(op)
            }
            PhysicalPlan::Filter(mut op) => {
                op.input = map(*op.input)?;
                PhysicalPlan::Filter(op)
            }
            PhysicalPlan::Sort(mut op) => {
                op.input = map(*op.input)?;
                PhysicalPlan::Sort(op)
            }
            PhysicalPlan::Limit(mut op) => {
                op.input = map(*op.input)?;
                PhysicalPlan::Limit(op)
            }
            PhysicalPlan::Assert(mut op) => {
                op.input = map(*op.input)?;
                PhysicalPlan::Assert(op)
            }
            PhysicalPlan::HashAggregate(mut op) => {
                op.input = map(*op.input)?;
                PhysicalPlan::HashAggregate(op)
            }
            PhysicalPlan::Concatenation(mut op) => {
                let mut inputs = Vec::with_capacity(op.inputs.len());
                for input in std::mem::take(&mut op.inputs) {
                    inputs.push(*map(input)?);
                }
                op.inputs = inputs;
                PhysicalPlan::Concatenation(op)
            }
            PhysicalPlan::NestedLoop(mut op) => {
                op.outer = map(*op.outer)?;
                op.inner = map(*op.inner)?;
                PhysicalPlan::NestedLoop(op)
            }
            PhysicalPlan::HashMatch(mut op) => {
                op.outer = map(*op.outer)?;
                op.inner = map(*op.inner)?;
                PhysicalPlan::HashMatch(op)
            }
            PhysicalPlan::Analyze(mut op) => {
                op.input = map(*op.input)?;
                PhysicalPlan::Analyze(op)
            }
        };
        Ok(if changed {
            Transformed::Yes(plan)
        } else {
            Transformed::No(plan)
        })
    }
}
