//! Contract tests for the join operators.
//!
//! These tests verify:
//! - Null keys never join and are emitted once by left joins
//! - Populate mode nests matches per outer row
//! - Join configuration errors are contract errors
//! - Empty inputs with a runtime-only schema join like any empty input

use std::cmp::Ordering;
use std::sync::Arc;

use vexec::context::OperatorData;
use vexec::executor::collect_batches;
use vexec::{
    Column, DataType, ExecutionContext, HashMatch, HashedSide, JoinType, MemoryDatasource,
    NestedLoop, NodeId, PhysicalOperator, PhysicalPlan, ScalarExpression, Schema, TableScan, TableSourceReference,
    TupleVector, Value, VexecError,
};

use super::{all_rows, int_table};

fn id(alias: &str) -> ScalarExpression {
    ScalarExpression::column(format!("{alias}.id"), DataType::Int64)
}

fn hash_join(outer: &[Option<i64>], inner: &[Option<i64>], join_type: JoinType) -> HashMatch {
    HashMatch::new(
        1,
        int_table(2, "a", outer),
        int_table(3, "b", inner),
        vec![id("a").into_ref()],
        vec![id("b").into_ref()],
        join_type,
    )
    .unwrap()
}

fn sorted(plan: &PhysicalPlan, ctx: &ExecutionContext) -> Vec<Vec<Value>> {
    let mut rows = all_rows(&collect_batches(plan.execute(ctx).unwrap()).unwrap());
    rows.sort_by(|a, b| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    rows
}

#[test]
fn test_key_arity_mismatch_is_invalid_argument() {
    // Contract: both sides need the same number of keys
    let err = HashMatch::new(
        1,
        int_table(2, "a", &[Some(1)]),
        int_table(3, "b", &[Some(1)]),
        vec![id("a").into_ref(), id("a").into_ref()],
        vec![id("b").into_ref()],
        JoinType::Inner,
    )
    .unwrap_err();
    assert!(matches!(err, VexecError::InvalidArgument(_)));
}

#[test]
fn test_null_keys_never_join() {
    // Contract: a null key on either side matches nothing
    let ctx = ExecutionContext::default();
    let join: PhysicalPlan = hash_join(&[None, Some(1)], &[None, Some(1)], JoinType::Inner).into();
    assert_eq!(sorted(&join, &ctx), vec![vec![Value::Int64(1), Value::Int64(1)]]);
}

#[test]
fn test_left_join_emits_null_keys_once() {
    // Contract: an unmatched outer row appears exactly once, null filled
    let ctx = ExecutionContext::default();
    let join: PhysicalPlan =
        hash_join(&[None, Some(4)], &[None, Some(1), Some(1)], JoinType::Left).into();
    assert_eq!(
        sorted(&join, &ctx),
        vec![
            vec![Value::Null, Value::Null],
            vec![Value::Int64(4), Value::Null],
        ]
    );
}

#[test]
fn test_left_join_with_empty_inner() {
    // Contract: an empty inner side null fills every outer row
    let ctx = ExecutionContext::default();
    let join: PhysicalPlan = hash_join(&[Some(1), Some(2)], &[], JoinType::Left).into();
    assert_eq!(
        sorted(&join, &ctx),
        vec![
            vec![Value::Int64(1), Value::Null],
            vec![Value::Int64(2), Value::Null],
        ]
    );
}

#[test]
fn test_hash_join_records_statistics() {
    // Contract: node data reports the hashed side and row counts
    let ctx = ExecutionContext::default();
    let join: PhysicalPlan =
        hash_join(&[Some(1), Some(2), Some(3)], &[Some(1), None], JoinType::Inner).into();
    sorted(&join, &ctx);
    let data = ctx.statement().node_data(1).unwrap();
    match data.operator {
        OperatorData::HashJoin {
            hashed_side: Some(_),
            builds,
            ..
        } => assert_eq!(builds, 1),
        other => panic!("unexpected operator data: {other:?}"),
    }
}

#[test]
fn test_populate_nests_matches_per_outer_row() {
    // Contract: one output row per outer row with its matches nested
    let ctx = ExecutionContext::default();
    let join: PhysicalPlan = hash_join(&[Some(1), Some(2)], &[Some(2), Some(2), Some(3)], JoinType::Left)
        .with_populate_alias("b")
        .into();
    let batches = collect_batches(join.execute(&ctx).unwrap()).unwrap();
    let mut nested: Vec<(Value, usize)> = batches
        .iter()
        .flat_map(|batch| {
            (0..batch.row_count()).map(move |row| {
                (
                    batch.column(0).get_value(row),
                    batch.column(1).get_table(row).map_or(0, |t| t.row_count()),
                )
            })
        })
        .collect();
    nested.sort_by(|a, b| a.0.total_cmp(&b.0));
    assert_eq!(nested, vec![(Value::Int64(1), 0), (Value::Int64(2), 2)]);
}

#[test]
fn test_nested_loop_left_join_with_empty_inner() {
    // Contract: left nested loop keeps outer rows without inner rows
    let ctx = ExecutionContext::default();
    let join: PhysicalPlan = NestedLoop::new(
        1,
        int_table(2, "a", &[Some(1)]),
        int_table(3, "b", &[]),
        JoinType::Left,
    )
    .into();
    assert_eq!(sorted(&join, &ctx), vec![vec![Value::Int64(1), Value::Null]]);
}

#[test]
fn test_nested_loop_stops_on_abort() {
    // Contract: an aborted query ends iteration without error
    let ctx = ExecutionContext::default();
    let join = NestedLoop::new(
        1,
        int_table(2, "a", &[Some(1), Some(2)]),
        int_table(3, "b", &[Some(1)]),
        JoinType::Inner,
    );
    let mut iter = join.execute(&ctx).unwrap();
    ctx.abort_handle().abort();
    assert!(!iter.has_next().unwrap());
    iter.close();
}

#[test]
fn test_switched_inputs_require_plain_inner_join() {
    // Contract: only an uncorrelated inner join without condition may switch
    let left = NestedLoop::new(
        1,
        int_table(2, "a", &[Some(1)]),
        int_table(3, "b", &[Some(1)]),
        JoinType::Left,
    )
    .with_switched_inputs();
    assert!(matches!(left, Err(VexecError::InvalidArgument(_))));
}

/// Scan over an empty `id` table that reports an asterisk schema.
fn empty_asterisk(node_id: NodeId, alias: &str, estimate: usize) -> PhysicalPlan {
    let ts = TableSourceReference::new(node_id, alias, alias);
    let data = TupleVector::empty(Arc::new(Schema::new(vec![Column::new("id", DataType::Int64)])));
    let source = MemoryDatasource::new(&ts, data)
        .with_asterisk_schema()
        .with_estimated_row_count(Some(estimate));
    TableScan::new(node_id, ts, Arc::new(source)).into()
}

fn left_join_rows(outer: PhysicalPlan, inner: PhysicalPlan) -> Vec<Vec<Value>> {
    let ctx = ExecutionContext::default();
    let join: PhysicalPlan = HashMatch::new(
        1,
        outer,
        inner,
        vec![id("a").into_ref()],
        vec![id("b").into_ref()],
        JoinType::Left,
    )
    .unwrap()
    .into();
    all_rows(&collect_batches(join.execute(&ctx).unwrap()).unwrap())
}

#[test]
fn test_empty_asterisk_inner_null_fills_outer_rows() {
    // Contract: an empty inner side of unknown shape keeps every outer row once
    for side in [HashedSide::Inner, HashedSide::Outer] {
        let estimate = match side {
            HashedSide::Inner => 0,
            HashedSide::Outer => 100,
        };
        let outer = int_table(2, "a", &[Some(1), Some(2)]);
        let rows = left_join_rows(outer, empty_asterisk(3, "b", estimate));
        let mut firsts: Vec<Value> = rows.iter().map(|row| row[0].clone()).collect();
        firsts.sort_by(Value::total_cmp);
        assert_eq!(firsts, vec![Value::Int64(1), Value::Int64(2)], "hashed side {side:?}");
        assert!(rows.iter().all(|row| row[1..].iter().all(Value::is_null)));
    }
}

#[test]
fn test_empty_asterisk_outer_produces_nothing() {
    // Contract: an empty outer side of unknown shape yields no rows
    for side in [HashedSide::Inner, HashedSide::Outer] {
        let estimate = match side {
            HashedSide::Inner => 100,
            HashedSide::Outer => 0,
        };
        let inner = int_table(3, "b", &[Some(1)]);
        let rows = left_join_rows(empty_asterisk(2, "a", estimate), inner);
        assert!(rows.is_empty(), "hashed side {side:?}");
    }
}
