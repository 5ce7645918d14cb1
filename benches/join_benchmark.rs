//! Join and aggregation benchmarks.
//!
//! Benchmarks:
//! - Hash match inner join, hashing either side
//! - Nested loop join with an equality condition
//! - Hash aggregate grouping

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vexec::{
    Column, DataType, HashAggregate, HashMatch, JoinType, MemoryDatasource, NestedLoop,
    PhysicalPlan, QueryExecutor, ScalarExpression, Schema, TableScan, TableSourceReference,
    TupleVector, Value, ValueVector,
};

/// Helper: Create a scan over `rows` ids cycling through `distinct` values.
fn table(node_id: u32, alias: &str, rows: i64, distinct: i64, estimate: Option<usize>) -> PhysicalPlan {
    let ts = TableSourceReference::new(node_id, alias, alias);
    let data = TupleVector::try_new(
        Arc::new(Schema::new(vec![Column::new("id", DataType::Int64)])),
        vec![ValueVector::from_values(
            DataType::Int64,
            (0..rows).map(|i| Value::Int64(i % distinct)).collect(),
        )],
    )
    .unwrap();
    let source = MemoryDatasource::new(&ts, data).with_estimated_row_count(estimate);
    TableScan::new(node_id, ts.clone(), Arc::new(source)).into()
}

fn id(alias: &str) -> ScalarExpression {
    ScalarExpression::column(format!("{alias}.id"), DataType::Int64)
}

fn hash_join(size: i64, hash_inner: bool) -> PhysicalPlan {
    let (outer_estimate, inner_estimate) = if hash_inner {
        (Some(size as usize * 10), Some(size as usize))
    } else {
        (Some(size as usize), Some(size as usize * 10))
    };
    HashMatch::new(
        1,
        table(2, "a", size, size, outer_estimate),
        table(3, "b", size, size, inner_estimate),
        vec![id("a").into_ref()],
        vec![id("b").into_ref()],
        JoinType::Inner,
    )
    .unwrap()
    .into()
}

fn bench_hash_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_match");
    let executor = QueryExecutor::default();

    for size in [1_000i64, 10_000, 100_000] {
        group.throughput(Throughput::Elements(size as u64 * 2));
        for (label, hash_inner) in [("hash_inner", true), ("hash_outer", false)] {
            let plan = hash_join(size, hash_inner);
            group.bench_with_input(BenchmarkId::new(label, size), &plan, |b, plan| {
                b.iter(|| executor.execute(black_box(plan)).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_nested_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_loop");
    let executor = QueryExecutor::default();

    for size in [100i64, 1_000] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let plan: PhysicalPlan = NestedLoop::new(
            1,
            table(2, "a", size, size, None),
            table(3, "b", size, size, None),
            JoinType::Left,
        )
        .with_condition(ScalarExpression::eq(id("a"), id("b")).into_ref())
        .into();
        group.bench_with_input(BenchmarkId::from_parameter(size), &plan, |b, plan| {
            b.iter(|| executor.execute(black_box(plan)).unwrap());
        });
    }
    group.finish();
}

fn bench_hash_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_aggregate");
    let executor = QueryExecutor::default();

    for (rows, groups) in [(100_000i64, 10i64), (100_000, 10_000)] {
        group.throughput(Throughput::Elements(rows as u64));
        let plan: PhysicalPlan =
            HashAggregate::distinct(1, table(2, "t", rows, groups, None), vec![id("t").into_ref()])
                .into();
        group.bench_with_input(
            BenchmarkId::new("distinct", format!("{rows}x{groups}")),
            &plan,
            |b, plan| {
                b.iter(|| executor.execute(black_box(plan)).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_hash_match, bench_nested_loop, bench_hash_aggregate);
criterion_main!(benches);
