//! Executor contract suites, one file per contract area.

mod join_contract;
mod operator_contract;
mod vector_contract;

use std::sync::Arc;

use vexec::{
    Column, DataType, MemoryDatasource, NodeId, PhysicalPlan, Schema, TableScan,
    TableSourceReference, TupleVector, Value, ValueVector,
};

/// Builds a single `id` column table scan aliased `alias`.
pub fn int_table(node_id: NodeId, alias: &str, values: &[Option<i64>]) -> PhysicalPlan {
    let ts = TableSourceReference::new(node_id, alias, alias);
    let data = TupleVector::try_new(
        Arc::new(Schema::new(vec![Column::new("id", DataType::Int64)])),
        vec![ValueVector::from_values(
            DataType::Int64,
            values.iter().map(|v| Value::from(*v)).collect(),
        )],
    )
    .unwrap();
    TableScan::new(node_id, ts.clone(), Arc::new(MemoryDatasource::new(&ts, data))).into()
}

/// Flattens batches into rows.
pub fn all_rows(batches: &[TupleVector]) -> Vec<Vec<Value>> {
    batches.iter().flat_map(TupleVector::rows).collect()
}
