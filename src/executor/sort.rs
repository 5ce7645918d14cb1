//! Sort operator for ORDER BY.

use std::cmp::Ordering;
use std::fmt;

use tracing::trace;

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::executor::{
    materialize, no_such_element, DescribeProperties, PhysicalOperator, TupleIterator,
    TupleIteratorRef,
};
use crate::expression::ExpressionRef;
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::{SchemaRef, Value};
use crate::vector::{SelectionVector, TupleVector, ValueVector};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// NULL placement for a sort item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrder {
    /// Nulls first when ascending, last when descending.
    Default,
    /// NULLs come first.
    First,
    /// NULLs come last.
    Last,
}

/// What a sort item orders by.
#[derive(Debug, Clone)]
pub enum SortKey {
    /// An expression evaluated over the input rows.
    Expression(ExpressionRef),
    /// A 1-based ordinal of an input column.
    Ordinal(usize),
}

/// One ORDER BY item.
#[derive(Debug, Clone)]
pub struct SortItem {
    /// Sort key.
    pub key: SortKey,
    /// Sort direction.
    pub order: SortOrder,
    /// NULL handling.
    pub null_order: NullOrder,
}

impl SortItem {
    /// Creates an ascending sort on an expression.
    #[must_use]
    pub fn asc(expression: ExpressionRef) -> Self {
        SortItem {
            key: SortKey::Expression(expression),
            order: SortOrder::Asc,
            null_order: NullOrder::Default,
        }
    }

    /// Creates a descending sort on an expression.
    #[must_use]
    pub fn desc(expression: ExpressionRef) -> Self {
        SortItem {
            key: SortKey::Expression(expression),
            order: SortOrder::Desc,
            null_order: NullOrder::Default,
        }
    }

    /// Creates a sort on a 1-based column ordinal.
    #[must_use]
    pub fn ordinal(ordinal: usize, order: SortOrder) -> Self {
        SortItem {
            key: SortKey::Ordinal(ordinal),
            order,
            null_order: NullOrder::Default,
        }
    }

    /// Sets the NULL placement.
    #[must_use]
    pub fn with_null_order(mut self, null_order: NullOrder) -> Self {
        self.null_order = null_order;
        self
    }

    fn nulls_first(&self) -> bool {
        match self.null_order {
            NullOrder::First => true,
            NullOrder::Last => false,
            NullOrder::Default => self.order == SortOrder::Asc,
        }
    }

    fn eval(&self, input: &TupleVector, ctx: &ExecutionContext) -> Result<ValueVector> {
        match &self.key {
            SortKey::Expression(expression) => expression.eval(input, ctx),
            SortKey::Ordinal(ordinal) => {
                if *ordinal == 0 || *ordinal > input.column_count() {
                    return Err(VexecError::query(format!(
                        "ORDER BY position {ordinal} is not in select list"
                    )));
                }
                Ok(input.column(ordinal - 1).clone())
            }
        }
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first() => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first() => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match self.order {
                SortOrder::Asc => a.total_cmp(b),
                SortOrder::Desc => b.total_cmp(a),
            },
        }
    }
}

impl fmt::Display for SortItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            SortKey::Expression(expression) => write!(f, "{expression}")?,
            SortKey::Ordinal(ordinal) => write!(f, "{ordinal}")?,
        }
        match self.order {
            SortOrder::Asc => f.write_str(" ASC")?,
            SortOrder::Desc => f.write_str(" DESC")?,
        }
        match self.null_order {
            NullOrder::Default => Ok(()),
            NullOrder::First => f.write_str(" NULLS FIRST"),
            NullOrder::Last => f.write_str(" NULLS LAST"),
        }
    }
}

/// Sorts the whole input and produces one ordered batch.
///
/// The sort is stable: rows with equal keys keep their input order.
#[derive(Debug, Clone)]
pub struct Sort {
    node_id: NodeId,
    pub(crate) input: Box<PhysicalPlan>,
    items: Vec<SortItem>,
}

impl Sort {
    /// Creates a sort operator.
    #[must_use]
    pub fn new(node_id: NodeId, input: PhysicalPlan, items: Vec<SortItem>) -> Self {
        Sort {
            node_id,
            input: Box::new(input),
            items,
        }
    }

    fn sort(&self, all: &TupleVector, ctx: &ExecutionContext) -> Result<TupleVector> {
        let keys: Vec<Vec<Value>> = self
            .items
            .iter()
            .map(|item| item.eval(all, ctx).map(|v| v.values()))
            .collect::<Result<_>>()?;
        let mut indices: Vec<usize> = (0..all.row_count()).collect();
        indices.sort_by(|&a, &b| {
            self.items
                .iter()
                .zip(&keys)
                .map(|(item, values)| item.compare(&values[a], &values[b]))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        trace!(rows = indices.len(), keys = self.items.len(), "sorted input");
        Ok(all.select(&indices.into_iter().collect::<SelectionVector>()))
    }
}

impl PhysicalOperator for Sort {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Sort"
    }

    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        vec![self.input.as_ref()]
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        Ok(Box::new(SortIterator {
            sort: self,
            ctx,
            input: self.input.execute(ctx)?,
            state: SortState::Pending,
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        let items: Vec<String> = self.items.iter().map(ToString::to_string).collect();
        vec![("Order by".to_string(), items.join(", "))]
    }
}

enum SortState {
    Pending,
    Ready(TupleVector),
    Done,
}

struct SortIterator<'a> {
    sort: &'a Sort,
    ctx: &'a ExecutionContext,
    input: TupleIteratorRef<'a>,
    state: SortState,
}

impl TupleIterator for SortIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        if let SortState::Pending = self.state {
            let all = materialize(self.input.as_mut())?;
            self.input.close();
            self.state = match all {
                Some(all) if !all.is_empty() => SortState::Ready(self.sort.sort(&all, self.ctx)?),
                _ => SortState::Done,
            };
        }
        Ok(matches!(self.state, SortState::Ready(_)))
    }

    fn next(&mut self) -> Result<TupleVector> {
        match std::mem::replace(&mut self.state, SortState::Done) {
            SortState::Ready(batch) => Ok(batch),
            other => {
                self.state = other;
                Err(no_such_element("Sort"))
            }
        }
    }

    fn close(&mut self) {
        self.state = SortState::Done;
        self.input.close();
    }
}
