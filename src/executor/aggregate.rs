//! Hash aggregate operator for GROUP BY and DISTINCT.

use std::cmp::Ordering;
use std::hash::Hasher;
use std::sync::Arc;

use hashbrown::hash_table::{Entry, HashTable};
use rustc_hash::FxHasher;
use tracing::debug;

use crate::context::{ExecutionContext, OperatorData};
use crate::error::Result;
use crate::executor::{
    materialize, no_such_element, DescribeProperties, PhysicalOperator, TupleIterator,
    TupleIteratorRef,
};
use crate::expression::{AggregateExpressionRef, ExpressionRef};
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::{Column, Schema, SchemaRef, Value};
use crate::vector::{SelectionVector, TupleVector, ValueVector};

/// Groups the whole input by a list of expressions.
///
/// Without aggregate expressions the operator yields one representative row
/// per group (DISTINCT). Otherwise every aggregate is evaluated over the
/// rows of each group and one row per group is produced.
#[derive(Debug, Clone)]
pub struct HashAggregate {
    node_id: NodeId,
    pub(crate) input: Box<PhysicalPlan>,
    group_by: Vec<ExpressionRef>,
    aggregates: Vec<AggregateExpressionRef>,
}

impl HashAggregate {
    /// Creates a hash aggregate.
    #[must_use]
    pub fn new(
        node_id: NodeId,
        input: PhysicalPlan,
        group_by: Vec<ExpressionRef>,
        aggregates: Vec<AggregateExpressionRef>,
    ) -> Self {
        HashAggregate {
            node_id,
            input: Box::new(input),
            group_by,
            aggregates,
        }
    }

    /// Creates a DISTINCT over the given expressions.
    #[must_use]
    pub fn distinct(node_id: NodeId, input: PhysicalPlan, group_by: Vec<ExpressionRef>) -> Self {
        Self::new(node_id, input, group_by, Vec::new())
    }

    /// Returns row indices of every group in order of first appearance.
    fn group(&self, all: &TupleVector, ctx: &ExecutionContext) -> Result<Vec<Vec<usize>>> {
        let keys: Vec<ValueVector> = self
            .group_by
            .iter()
            .map(|expression| expression.eval(all, ctx))
            .collect::<Result<_>>()?;
        let hashes: Vec<u64> = (0..all.row_count())
            .map(|row| {
                let mut hasher = FxHasher::default();
                for key in &keys {
                    key.get_value(row).hash_numeric(&mut hasher);
                }
                hasher.finish()
            })
            .collect();
        let same_key = |a: usize, b: usize| {
            keys.iter()
                .all(|k| same_group_value(&k.get_value(a), &k.get_value(b)))
        };

        let mut table: HashTable<usize> = HashTable::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (row, &hash) in hashes.iter().enumerate() {
            let entry = table.entry(
                hash,
                |&group| same_key(groups[group][0], row),
                |&group| hashes[groups[group][0]],
            );
            match entry {
                Entry::Occupied(entry) => groups[*entry.get()].push(row),
                Entry::Vacant(entry) => {
                    entry.insert(groups.len());
                    groups.push(vec![row]);
                }
            }
        }
        Ok(groups)
    }

    fn aggregate(&self, all: Option<&TupleVector>, ctx: &ExecutionContext) -> Result<TupleVector> {
        let groups = match all {
            Some(all) => self.group(all, ctx)?,
            None => Vec::new(),
        };
        debug!(
            node_id = self.node_id,
            rows = all.map_or(0, TupleVector::row_count),
            groups = groups.len(),
            "aggregated input"
        );
        ctx.statement().with_node_data(self.node_id, |data| {
            data.operator = OperatorData::Aggregate {
                groups: groups.len() as u64,
            };
        });

        if self.aggregates.is_empty() {
            return Ok(match all {
                Some(all) => all.select(&groups.iter().map(|g| g[0]).collect::<SelectionVector>()),
                None => TupleVector::empty(self.input.schema()),
            });
        }

        let tables = match all {
            // An ungrouped aggregate over no rows still yields one row.
            None if self.group_by.is_empty() => vec![None],
            None => Vec::new(),
            Some(all) => groups
                .iter()
                .map(|rows| Some(all.select(&rows.iter().copied().collect())))
                .collect(),
        };
        let group_count = tables.len();
        let tables = ValueVector::tables(tables);
        let columns = self
            .aggregates
            .iter()
            .map(|aggregate| aggregate.eval_groups(&tables, ctx))
            .collect::<Result<Vec<_>>>()?;
        TupleVector::try_new_with_row_count(self.schema(), columns, group_count)
    }
}

/// Group equality: numerics group by numeric value, everything else
/// structurally, so nulls form one group and strings never merge with
/// numbers.
fn same_group_value(a: &Value, b: &Value) -> bool {
    a == b || (a.is_numeric() && b.is_numeric() && a.compare(b) == Some(Ordering::Equal))
}

impl PhysicalOperator for HashAggregate {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Hash aggregate"
    }

    fn schema(&self) -> SchemaRef {
        if self.aggregates.is_empty() {
            return self.input.schema();
        }
        Arc::new(Schema::new(
            self.aggregates
                .iter()
                .map(|a| Column::new(a.output_name(), a.data_type()))
                .collect(),
        ))
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        vec![self.input.as_ref()]
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        Ok(Box::new(HashAggregateIterator {
            aggregate: self,
            ctx,
            input: self.input.execute(ctx)?,
            output: None,
            done: false,
        }))
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        let group_by: Vec<String> = self.group_by.iter().map(ToString::to_string).collect();
        let mut properties = vec![("Group by".to_string(), group_by.join(", "))];
        if !self.aggregates.is_empty() {
            let aggregates: Vec<String> = self.aggregates.iter().map(ToString::to_string).collect();
            properties.push(("Aggregates".to_string(), aggregates.join(", ")));
        }
        properties
    }
}

struct HashAggregateIterator<'a> {
    aggregate: &'a HashAggregate,
    ctx: &'a ExecutionContext,
    input: TupleIteratorRef<'a>,
    output: Option<TupleVector>,
    done: bool,
}

impl TupleIterator for HashAggregateIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        if !self.done {
            self.done = true;
            let all = materialize(self.input.as_mut())?.filter(|all| !all.is_empty());
            self.input.close();
            let output = self.aggregate.aggregate(all.as_ref(), self.ctx)?;
            if !output.is_empty() {
                self.output = Some(output);
            }
        }
        Ok(self.output.is_some())
    }

    fn next(&mut self) -> Result<TupleVector> {
        self.output
            .take()
            .ok_or_else(|| no_such_element("HashAggregate"))
    }

    fn close(&mut self) {
        self.done = true;
        self.output = None;
        self.input.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{collect_batches, ConstantScan};
    use crate::expression::{Aggregate, AggregateFunction, ScalarExpression};
    use crate::types::{DataType, Value};

    fn input(rows: &[(i64, i64)]) -> PhysicalPlan {
        ConstantScan::new(
            0,
            Schema::new(vec![
                Column::new("g", DataType::Int64),
                Column::new("v", DataType::Int64),
            ]),
            rows.iter()
                .map(|(g, v)| {
                    vec![
                        ScalarExpression::literal(*g).into_ref(),
                        ScalarExpression::literal(*v).into_ref(),
                    ]
                })
                .collect(),
        )
        .unwrap()
        .into()
    }

    fn g() -> ExpressionRef {
        ScalarExpression::column("g", DataType::Int64).into_ref()
    }

    fn v() -> ExpressionRef {
        ScalarExpression::column("v", DataType::Int64).into_ref()
    }

    #[test]
    fn test_distinct_keeps_one_row_per_group() {
        let ctx = ExecutionContext::default();
        let plan = input(&[(1, 0), (1, 0), (2, 0), (3, 0), (3, 0), (3, 0)]);
        let distinct = HashAggregate::distinct(1, plan, vec![g()]);
        let batches = collect_batches(distinct.execute(&ctx).unwrap()).unwrap();
        let mut values = batches[0].column(0).values();
        values.sort_by(Value::total_cmp);
        assert_eq!(values, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
        let data = ctx.statement().node_data(1).unwrap();
        assert!(matches!(data.operator, OperatorData::Aggregate { groups: 3 }));
    }

    #[test]
    fn test_group_by_with_aggregates() {
        let ctx = ExecutionContext::default();
        let plan = input(&[(1, 10), (2, 5), (1, 20)]);
        let aggregate = HashAggregate::new(
            1,
            plan,
            vec![g()],
            vec![
                Aggregate::first(g()).into_ref(),
                Aggregate::new(AggregateFunction::Sum, Some(v()))
                    .with_alias("total")
                    .into_ref(),
                Aggregate::count_star().with_alias("n").into_ref(),
            ],
        );
        assert_eq!(aggregate.schema().names(), vec!["g", "total", "n"]);
        let batches = collect_batches(aggregate.execute(&ctx).unwrap()).unwrap();
        assert_eq!(
            batches[0].rows(),
            vec![
                vec![Value::Int64(1), Value::Int64(30), Value::Int64(2)],
                vec![Value::Int64(2), Value::Int64(5), Value::Int64(1)],
            ]
        );
    }

    #[test]
    fn test_distinct_groups_equal_numerics_together() {
        let ctx = ExecutionContext::default();
        let values = [
            Value::Int64(1),
            Value::Float64(1.0),
            Value::from("1"),
            Value::Null,
            Value::Null,
            Value::Float64(2.5),
        ];
        let plan: PhysicalPlan = ConstantScan::new(
            0,
            Schema::new(vec![Column::new("g", DataType::Any)]),
            values
                .iter()
                .map(|value| vec![ScalarExpression::literal(value.clone()).into_ref()])
                .collect(),
        )
        .unwrap()
        .into();
        let key = ScalarExpression::column("g", DataType::Any).into_ref();
        let distinct = HashAggregate::distinct(1, plan, vec![key]);
        let batches = collect_batches(distinct.execute(&ctx).unwrap()).unwrap();
        assert_eq!(
            batches[0].column(0).values(),
            vec![Value::Int64(1), Value::from("1"), Value::Null, Value::Float64(2.5)]
        );
    }

    #[test]
    fn test_ungrouped_count_over_empty_input() {
        let ctx = ExecutionContext::default();
        let aggregate = HashAggregate::new(
            1,
            input(&[]),
            Vec::new(),
            vec![Aggregate::count_star().with_alias("n").into_ref()],
        );
        let batches = collect_batches(aggregate.execute(&ctx).unwrap()).unwrap();
        assert_eq!(batches[0].rows(), vec![vec![Value::Int64(0)]]);
    }

    #[test]
    fn test_grouped_aggregate_over_empty_input_yields_nothing() {
        let ctx = ExecutionContext::default();
        let aggregate = HashAggregate::new(
            1,
            input(&[]),
            vec![g()],
            vec![Aggregate::count_star().into_ref()],
        );
        assert!(collect_batches(aggregate.execute(&ctx).unwrap())
            .unwrap()
            .is_empty());
    }
}
