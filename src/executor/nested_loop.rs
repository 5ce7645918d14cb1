//! Nested loop join operator.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::{ExecutionContext, OperatorData};
use crate::error::{Result, VexecError};
use crate::executor::{
    collect_batches, no_such_element, DescribeProperties, PhysicalOperator, TupleIterator,
    TupleIteratorRef,
};
use crate::expression::ExpressionRef;
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::{Column, DataType, Schema, SchemaRef};
use crate::vector::{BitSet, PopulatedTables, SelectionVector, TupleVector, ValueVector};

/// Logical join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Emits matching pairs only.
    Inner,
    /// Additionally emits every unmatched outer row once, with null inner
    /// columns.
    Left,
}

impl JoinType {
    /// Returns the SQL name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema used to null fill one side of a join.
///
/// Prefers the schema seen at runtime; unresolved asterisk columns of the
/// plan schema are dropped.
pub(crate) fn null_fill_schema(runtime: Option<&SchemaRef>, planned: &SchemaRef) -> SchemaRef {
    match runtime {
        Some(schema) => schema.clone(),
        None if planned.is_asterisk() => Arc::new(Schema::new(
            planned
                .columns()
                .iter()
                .filter(|c| !c.asterisk)
                .cloned()
                .collect(),
        )),
        None => planned.clone(),
    }
}

/// Pairs the selected outer rows with all-null inner columns.
pub(crate) fn null_filled(
    outer: &TupleVector,
    rows: &SelectionVector,
    inner_schema: SchemaRef,
) -> Result<TupleVector> {
    let outer = outer.select(rows);
    let nulls = TupleVector::nulls(inner_schema, outer.row_count());
    TupleVector::combine(&outer, &nulls)
}

/// Execution strategy, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopMode {
    /// Re-executes the inner plan for every outer row pushed as outer
    /// reference.
    Loop,
    /// Groups all inner matches of an outer row into one nested table.
    Populate,
    /// Batch at a time cartesian product.
    Batch,
}

impl LoopMode {
    fn as_str(self) -> &'static str {
        match self {
            LoopMode::Loop => "loop",
            LoopMode::Populate => "populate",
            LoopMode::Batch => "batch",
        }
    }
}

/// Nested loop join.
#[derive(Debug, Clone)]
pub struct NestedLoop {
    node_id: NodeId,
    pub(crate) outer: Box<PhysicalPlan>,
    pub(crate) inner: Box<PhysicalPlan>,
    join_type: JoinType,
    condition: Option<ExpressionRef>,
    populate_alias: Option<String>,
    correlated: bool,
    switched_inputs: bool,
}

impl NestedLoop {
    /// Creates a nested loop join without condition.
    #[must_use]
    pub fn new(
        node_id: NodeId,
        outer: PhysicalPlan,
        inner: PhysicalPlan,
        join_type: JoinType,
    ) -> Self {
        NestedLoop {
            node_id,
            outer: Box::new(outer),
            inner: Box::new(inner),
            join_type,
            condition: None,
            populate_alias: None,
            correlated: false,
            switched_inputs: false,
        }
    }

    /// Sets the join condition evaluated over outer and inner columns.
    #[must_use]
    pub fn with_condition(mut self, condition: ExpressionRef) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Groups the matching inner rows of each outer row into one nested
    /// table column named `alias`.
    #[must_use]
    pub fn with_populate_alias(mut self, alias: impl Into<String>) -> Self {
        self.populate_alias = Some(alias.into());
        self
    }

    /// Marks the inner plan as reading the outer row through outer
    /// references, so it is re-executed for every outer row.
    #[must_use]
    pub fn correlated(mut self) -> Self {
        self.correlated = true;
        self
    }

    /// Declares that the planner swapped the physical inputs.
    ///
    /// `outer` then holds the logical inner side; output columns are still
    /// produced in logical order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` unless this is an uncorrelated inner join
    /// without condition or populate alias.
    pub fn with_switched_inputs(mut self) -> Result<Self> {
        self.switched_inputs = true;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.switched_inputs
            && (self.condition.is_some()
                || self.populate_alias.is_some()
                || self.correlated
                || self.join_type != JoinType::Inner)
        {
            return Err(VexecError::invalid_argument(
                "Switched inputs require an uncorrelated inner join without condition",
            ));
        }
        Ok(())
    }

    fn mode(&self) -> LoopMode {
        if self.correlated {
            LoopMode::Loop
        } else if self.populate_alias.is_some() {
            LoopMode::Populate
        } else {
            LoopMode::Batch
        }
    }

    /// Executes the inner plan to completion.
    fn run_inner(&self, ctx: &ExecutionContext) -> Result<Vec<TupleVector>> {
        ctx.statement().with_node_data(self.node_id, |data| {
            if let OperatorData::NestedLoop { inner_executions } = &mut data.operator {
                *inner_executions += 1;
            } else {
                data.operator = OperatorData::NestedLoop {
                    inner_executions: 1,
                };
            }
        });
        collect_batches(self.inner.execute(ctx)?)
    }

    fn concat_inner(&self, batches: &[TupleVector]) -> Result<TupleVector> {
        if batches.is_empty() {
            Ok(TupleVector::empty(self.inner.schema()))
        } else {
            TupleVector::concat(batches)
        }
    }

    fn inner_null_schema(&self, batches: &[TupleVector]) -> SchemaRef {
        null_fill_schema(batches.first().map(TupleVector::schema), &self.inner.schema())
    }

    /// Joins one outer batch with one inner batch, marking matched outer rows.
    fn flatten(
        &self,
        outer: &TupleVector,
        inner: &TupleVector,
        matched: &mut BitSet,
        ctx: &ExecutionContext,
    ) -> Result<Option<TupleVector>> {
        if outer.is_empty() || inner.is_empty() {
            return Ok(None);
        }
        if self.switched_inputs {
            return Ok(Some(TupleVector::cartesian(inner, outer)));
        }
        let pairs = TupleVector::cartesian(outer, inner);
        let Some(condition) = &self.condition else {
            (0..outer.row_count()).for_each(|row| matched.set(row));
            return Ok(Some(pairs));
        };
        let selection = condition.eval(&pairs, ctx)?.to_bitset()?.to_selection();
        let inner_rows = inner.row_count();
        for pair in selection.iter() {
            matched.set(pair / inner_rows);
        }
        Ok(match selection.len() {
            0 => None,
            n if n == pairs.row_count() => Some(pairs),
            _ => Some(pairs.select(&selection)),
        })
    }

    /// Appends the populated nested table column to an outer batch.
    fn populate(
        &self,
        outer: &TupleVector,
        inner: TupleVector,
        alias: &str,
        ctx: &ExecutionContext,
    ) -> Result<Option<TupleVector>> {
        let rows = outer.row_count();
        let predicate = match &self.condition {
            Some(condition) if !inner.is_empty() => Some(
                condition
                    .eval(&TupleVector::cartesian(outer, &inner), ctx)?
                    .to_bitset()?,
            ),
            _ => None,
        };
        let tables = PopulatedTables::new(inner, predicate);
        let keep: Option<SelectionVector> = match self.join_type {
            JoinType::Inner => Some((0..rows).filter(|&r| tables.has_match(r)).collect()),
            JoinType::Left => None,
        };
        let batch = outer.with_column(
            Column::new(alias, DataType::Table),
            ValueVector::populated(tables, rows),
        )?;
        Ok(match keep {
            Some(keep) if keep.is_empty() => None,
            Some(keep) if keep.len() < rows => Some(batch.select(&keep)),
            _ if batch.is_empty() => None,
            _ => Some(batch),
        })
    }

    /// Runs the inner plan once per outer row with the row as outer reference.
    fn loop_batch(&self, outer: &TupleVector, ctx: &ExecutionContext) -> Result<Option<TupleVector>> {
        let mut parts = Vec::new();
        for row in 0..outer.row_count() {
            let single = outer.slice(row, 1);
            let inner_batches = {
                let _outer = ctx.push_outer(single.clone());
                self.run_inner(ctx)?
            };
            if let Some(alias) = &self.populate_alias {
                let inner = self.concat_inner(&inner_batches)?;
                parts.extend(self.populate(&single, inner, alias, ctx)?);
                continue;
            }
            let mut matched = BitSet::new(1);
            for inner in &inner_batches {
                parts.extend(self.flatten(&single, inner, &mut matched, ctx)?);
            }
            if self.join_type == JoinType::Left && !matched.get(0) {
                parts.push(null_filled(
                    &single,
                    &SelectionVector::all(1),
                    self.inner_null_schema(&inner_batches),
                )?);
            }
        }
        trace!(
            node_id = self.node_id,
            outer_rows = outer.row_count(),
            "nested loop iteration"
        );
        if parts.is_empty() {
            Ok(None)
        } else {
            TupleVector::concat(&parts).map(Some)
        }
    }
}

impl PhysicalOperator for NestedLoop {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Nested loop"
    }

    fn schema(&self) -> SchemaRef {
        let outer = self.outer.schema();
        let inner = self.inner.schema();
        Arc::new(match &self.populate_alias {
            Some(alias) => outer.with_column(Column::new(alias.as_str(), DataType::Table)),
            None if self.switched_inputs => inner.concat(&outer),
            None => outer.concat(&inner),
        })
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        vec![self.outer.as_ref(), self.inner.as_ref()]
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        self.validate()?;
        let mode = self.mode();
        debug!(
            node_id = self.node_id,
            mode = mode.as_str(),
            join_type = %self.join_type,
            "executing nested loop"
        );
        Ok(Box::new(NestedLoopIterator {
            join: self,
            ctx,
            mode,
            outer: self.outer.execute(ctx)?,
            inner_batches: None,
            inner_all: None,
            current: None,
            next: None,
            done: false,
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        let mut properties = vec![
            ("Join type".to_string(), self.join_type.to_string()),
            ("Mode".to_string(), self.mode().as_str().to_string()),
        ];
        if let Some(condition) = &self.condition {
            properties.push(("Condition".to_string(), condition.to_string()));
        }
        if let Some(alias) = &self.populate_alias {
            properties.push(("Populate alias".to_string(), alias.clone()));
        }
        if self.switched_inputs {
            properties.push(("Switched inputs".to_string(), "true".to_string()));
        }
        properties
    }
}

/// Outer batch being joined in batch mode.
struct OuterBatch {
    batch: TupleVector,
    inner_position: usize,
    matched: BitSet,
}

struct NestedLoopIterator<'a> {
    join: &'a NestedLoop,
    ctx: &'a ExecutionContext,
    mode: LoopMode,
    outer: TupleIteratorRef<'a>,
    inner_batches: Option<Vec<TupleVector>>,
    inner_all: Option<TupleVector>,
    current: Option<OuterBatch>,
    next: Option<TupleVector>,
    done: bool,
}

impl NestedLoopIterator<'_> {
    fn next_outer(&mut self) -> Result<Option<TupleVector>> {
        if self.outer.has_next()? {
            return self.outer.next().map(Some);
        }
        self.done = true;
        self.outer.close();
        Ok(None)
    }

    fn step(&mut self) -> Result<Option<TupleVector>> {
        match self.mode {
            LoopMode::Loop => match self.next_outer()? {
                Some(outer) => self.join.loop_batch(&outer, self.ctx),
                None => Ok(None),
            },
            LoopMode::Populate => {
                let Some(outer) = self.next_outer()? else {
                    return Ok(None);
                };
                let inner = match &self.inner_all {
                    Some(inner) => inner.clone(),
                    None => {
                        let batches = self.join.run_inner(self.ctx)?;
                        let inner = self.join.concat_inner(&batches)?;
                        self.inner_all = Some(inner.clone());
                        inner
                    }
                };
                let alias = self.join.populate_alias.as_deref().unwrap_or_default();
                self.join.populate(&outer, inner, alias, self.ctx)
            }
            LoopMode::Batch => self.step_batch(),
        }
    }

    fn step_batch(&mut self) -> Result<Option<TupleVector>> {
        if self.inner_batches.is_none() {
            self.inner_batches = Some(self.join.run_inner(self.ctx)?);
        }
        let Some(current) = &mut self.current else {
            self.current = self.next_outer()?.map(|batch| OuterBatch {
                matched: BitSet::new(batch.row_count()),
                batch,
                inner_position: 0,
            });
            return Ok(None);
        };
        let inner_batches = self.inner_batches.as_deref().unwrap_or_default();
        if let Some(inner) = inner_batches.get(current.inner_position) {
            current.inner_position += 1;
            return self
                .join
                .flatten(&current.batch, inner, &mut current.matched, self.ctx);
        }

        let unmatched: SelectionVector = current.matched.zeros().collect();
        let outer = std::mem::replace(&mut current.batch, TupleVector::constant(0));
        self.current = None;
        if self.join.join_type == JoinType::Inner || unmatched.is_empty() {
            return Ok(None);
        }
        let schema = self.join.inner_null_schema(inner_batches);
        null_filled(&outer, &unmatched, schema).map(Some)
    }
}

impl TupleIterator for NestedLoopIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        while self.next.is_none() {
            if self.done && self.current.is_none() {
                return Ok(false);
            }
            if self.ctx.abort_query() {
                debug!(node_id = self.join.node_id, "nested loop aborted");
                self.close();
                return Ok(false);
            }
            self.next = self.step()?;
        }
        Ok(true)
    }

    fn next(&mut self) -> Result<TupleVector> {
        self.next.take().ok_or_else(|| no_such_element("NestedLoop"))
    }

    fn close(&mut self) {
        self.done = true;
        self.current = None;
        self.next = None;
        self.outer.close();
    }
}
