//! Contract tests for the operator iterator protocol.
//!
//! These tests verify:
//! - `next` is only valid after `has_next` returned true
//! - `close` is idempotent
//! - Expressions are evaluated lazily, at iteration time
//! - User-facing failures surface as query errors

use std::sync::Arc;

use vexec::executor::{collect_batches, SortOrder};
use vexec::{
    Assert, Column, Concatenation, ConstantScan, DataType, ExecutionContext, Filter, Limit,
    PhysicalOperator, PhysicalPlan, Projection, Schema, ScalarExpression, Sort, SortItem, TupleVector, Value,
    ValueVector, VexecError,
};

use super::{all_rows, int_table};

fn numbers(values: &[i64]) -> PhysicalPlan {
    let values: Vec<Option<i64>> = values.iter().copied().map(Some).collect();
    int_table(10, "t", &values)
}

#[test]
fn test_next_without_has_next_is_no_such_element() {
    // Contract: next() after exhaustion fails with NoSuchElement
    let ctx = ExecutionContext::default();
    let filter = Filter::new(
        1,
        numbers(&[1]),
        ScalarExpression::literal(true).into_ref(),
    );
    let mut iter = filter.execute(&ctx).unwrap();
    assert!(iter.has_next().unwrap());
    iter.next().unwrap();
    assert!(!iter.has_next().unwrap());
    assert!(matches!(iter.next(), Err(VexecError::NoSuchElement(_))));
}

#[test]
fn test_has_next_is_repeatable() {
    // Contract: has_next() does not consume a batch
    let ctx = ExecutionContext::default();
    let limit = Limit::new(1, numbers(&[1, 2, 3]), ScalarExpression::literal(2i64).into_ref());
    let mut iter = limit.execute(&ctx).unwrap();
    assert!(iter.has_next().unwrap());
    assert!(iter.has_next().unwrap());
    assert_eq!(iter.next().unwrap().row_count(), 2);
    assert!(!iter.has_next().unwrap());
}

#[test]
fn test_close_is_idempotent() {
    // Contract: closing twice is harmless and ends iteration
    let ctx = ExecutionContext::default();
    let sort = Sort::new(1, numbers(&[3, 1, 2]), vec![SortItem::ordinal(1, SortOrder::Asc)]);
    let mut iter = sort.execute(&ctx).unwrap();
    iter.close();
    iter.close();
    assert!(!iter.has_next().unwrap());
}

#[test]
fn test_constant_scan_evaluates_at_iteration_time() {
    // Contract: execute() does not evaluate expressions
    let ctx = ExecutionContext::default();
    let scan = ConstantScan::new(
        1,
        Schema::new(vec![Column::new("v", DataType::Int64)]),
        vec![vec![ScalarExpression::outer_column("o", DataType::Int64).into_ref()]],
    )
    .unwrap();
    let mut iter = scan.execute(&ctx).unwrap();
    let outer = TupleVector::try_new(
        Arc::new(Schema::new(vec![Column::new("o", DataType::Int64)])),
        vec![ValueVector::from_values(DataType::Int64, vec![Value::Int64(42)])],
    )
    .unwrap();
    let _guard = ctx.push_outer(outer);
    assert!(iter.has_next().unwrap());
    assert_eq!(iter.next().unwrap().row(0), vec![Value::Int64(42)]);
}

#[test]
fn test_limit_rejects_negative_values() {
    // Contract: LIMIT needs a single non-negative integer
    let ctx = ExecutionContext::default();
    let limit = Limit::new(1, numbers(&[1]), ScalarExpression::literal(-1i64).into_ref());
    let mut iter = limit.execute(&ctx).unwrap();
    assert!(iter.has_next().unwrap_err().is_query_error());
}

#[test]
fn test_limit_with_offset_spans_batches() {
    // Contract: offset and count are applied across batch boundaries
    let ctx = ExecutionContext::new(vexec::ExecutorConfig::new().with_batch_size(2));
    let limit = Limit::new(1, numbers(&[1, 2, 3, 4, 5, 6]), ScalarExpression::literal(3i64).into_ref())
        .with_offset(ScalarExpression::literal(1i64).into_ref());
    let rows = all_rows(&collect_batches(limit.execute(&ctx).unwrap()).unwrap());
    assert_eq!(
        rows,
        vec![
            vec![Value::Int64(2)],
            vec![Value::Int64(3)],
            vec![Value::Int64(4)],
        ]
    );
}

#[test]
fn test_assert_fails_when_too_many_rows() {
    // Contract: exceeding the row count raises the configured message
    let ctx = ExecutionContext::default();
    let assert = Assert::max_row_count(1, numbers(&[1, 2]), 1, "subquery returned more than one row");
    let err = collect_batches(assert.execute(&ctx).unwrap()).unwrap_err();
    assert!(err.is_query_error());
    assert!(err.to_string().contains("more than one row"));
}

#[test]
fn test_concatenation_requires_matching_column_counts() {
    // Contract: inputs with known schemas must agree on column count
    let two_columns = Projection::new(
        2,
        numbers(&[1]),
        vec![
            ScalarExpression::column("id", DataType::Int64).into_ref(),
            ScalarExpression::literal(1i64).alias("one").into_ref(),
        ],
    );
    let err = Concatenation::new(1, vec![numbers(&[1]), two_columns.into()]).unwrap_err();
    assert!(err.is_query_error());
}

#[test]
fn test_sort_is_stable() {
    // Contract: rows with equal keys keep their input order
    let ctx = ExecutionContext::default();
    let projection = Projection::new(
        2,
        numbers(&[1, 2, 3, 4, 5]),
        vec![
            ScalarExpression::arithmetic(
                ScalarExpression::column("id", DataType::Int64),
                vexec::expression::ArithmeticOp::Mod,
                ScalarExpression::literal(2i64),
            )
            .alias("parity")
            .into_ref(),
            ScalarExpression::column("id", DataType::Int64).into_ref(),
        ],
    );
    let sort = Sort::new(1, projection.into(), vec![SortItem::ordinal(1, SortOrder::Asc)]);
    let ids: Vec<Value> = collect_batches(sort.execute(&ctx).unwrap())
        .unwrap()
        .iter()
        .flat_map(|b| b.column(1).values())
        .collect();
    assert_eq!(
        ids,
        [2, 4, 1, 3, 5].iter().map(|v| Value::Int64(*v)).collect::<Vec<_>>()
    );
}
