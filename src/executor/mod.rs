//! Executor module for query execution.
//!
//! Every operator implements [`PhysicalOperator`]; executing one returns a
//! pull-based [`TupleIterator`] of batches. Operators are immutable and all
//! per-execution state lives in the iterators and the [`ExecutionContext`].

mod aggregate;
mod analyze;
mod assert;
mod concatenation;
mod constant_scan;
mod filter;
pub mod hash_match;
mod iterator;
mod limit;
mod nested_loop;
mod project;
mod scan;
mod sort;

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::plan::{
    describe_plan, format_describe, transform_up, AnalyzeRewriter, NodeId, PhysicalPlan,
};
use crate::types::{SchemaRef, Value};
use crate::vector::TupleVector;

pub use aggregate::HashAggregate;
pub use analyze::Analyze;
pub use assert::Assert;
pub use concatenation::Concatenation;
pub use constant_scan::ConstantScan;
pub use filter::Filter;
pub use hash_match::HashMatch;
pub use iterator::{
    collect_batches, drain, materialize, BatchIterator, TupleIterator, TupleIteratorRef,
};
pub use limit::Limit;
pub use nested_loop::{JoinType, NestedLoop};
pub use project::Projection;
pub use scan::TableScan;
pub use sort::{NullOrder, Sort, SortItem, SortKey, SortOrder};

pub(crate) use iterator::no_such_element;

/// Default number of rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Default row count above which an unknown-size inner input is hashed.
pub const DEFAULT_HASH_INNER_THRESHOLD: usize = 10_000;

/// Ordered name/value pairs describing an operator.
pub type DescribeProperties = Vec<(String, String)>;

/// Configuration for the query executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of rows per batch produced by scans.
    pub batch_size: usize,
    /// Row count threshold of the hash join build side heuristic.
    pub hash_inner_threshold: usize,
    /// Wraps every plan node in an instrumentation decorator.
    pub analyze: bool,
    /// Session properties.
    pub properties: BTreeMap<String, Value>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            hash_inner_threshold: DEFAULT_HASH_INNER_THRESHOLD,
            analyze: false,
            properties: BTreeMap::new(),
        }
    }
}

impl ExecutorConfig {
    /// Creates a new executor configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the hash join build side threshold.
    #[must_use]
    pub fn with_hash_inner_threshold(mut self, threshold: usize) -> Self {
        self.hash_inner_threshold = threshold;
        self
    }

    /// Enables or disables plan instrumentation.
    #[must_use]
    pub fn with_analyze(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }

    /// Sets a session property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Trait for physical operators in the execution pipeline.
pub trait PhysicalOperator: fmt::Debug + Send + Sync {
    /// Returns the node id.
    fn node_id(&self) -> NodeId;

    /// Returns the operator name.
    fn name(&self) -> &'static str;

    /// Returns the output schema, an asterisk schema if only known at runtime.
    fn schema(&self) -> SchemaRef;

    /// Returns the structural children.
    fn children(&self) -> Vec<&PhysicalPlan>;

    /// Starts execution.
    ///
    /// Must not evaluate expressions eagerly; expressions may depend on
    /// context state that is only set once iteration begins.
    ///
    /// # Errors
    ///
    /// Returns an error if the operator fails to start.
    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>>;

    /// Returns the properties shown when describing this operator.
    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        Vec::new()
    }
}

/// Query executor for physical plans.
#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    /// Executor configuration.
    config: ExecutorConfig,
}

impl QueryExecutor {
    /// Creates a new query executor with the given configuration.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Returns the configured batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Returns the executor configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Creates a fresh context for one execution.
    #[must_use]
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new(self.config.clone())
    }

    /// Executes a plan and returns all batches.
    ///
    /// With `analyze` enabled the plan is instrumented first.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    pub fn execute(&self, plan: &PhysicalPlan) -> Result<Vec<TupleVector>> {
        let ctx = self.new_context();
        if self.config.analyze {
            let instrumented = transform_up(plan.clone(), &AnalyzeRewriter)?.into_inner();
            return self.execute_with(&instrumented, &ctx);
        }
        self.execute_with(plan, &ctx)
    }

    /// Executes a plan in a caller supplied context.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    pub fn execute_with(
        &self,
        plan: &PhysicalPlan,
        ctx: &ExecutionContext,
    ) -> Result<Vec<TupleVector>> {
        debug!(node_id = plan.node_id(), operator = plan.name(), "executing plan");
        let batches = collect_batches(plan.execute(ctx)?)?;
        debug!(
            batches = batches.len(),
            rows = batches.iter().map(TupleVector::row_count).sum::<usize>(),
            aborted = ctx.abort_query(),
            "plan finished"
        );
        Ok(batches)
    }

    /// Executes an instrumented plan and returns its batches together with
    /// the describe output including runtime statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    pub fn analyze(&self, plan: &PhysicalPlan) -> Result<(Vec<TupleVector>, String)> {
        let ctx = self.new_context();
        let instrumented = transform_up(plan.clone(), &AnalyzeRewriter)?.into_inner();
        let batches = self.execute_with(&instrumented, &ctx)?;
        let rows = describe_plan(&instrumented, &ctx);
        Ok((batches, format_describe(&rows)))
    }

    /// Describes a plan without executing it.
    #[must_use]
    pub fn describe(&self, plan: &PhysicalPlan) -> String {
        let ctx = self.new_context();
        format_describe(&describe_plan(plan, &ctx))
    }
}
