//! Contract tests for vectors.
//!
//! These tests verify:
//! - Selections produce views that share the source data
//! - Three-valued boolean logic
//! - Batch construction and combination invariants

use std::sync::Arc;

use vexec::vector::{BitSet, BitSetVector, RowMapping, SelectionVector};
use vexec::{Column, DataType, Schema, TupleVector, Value, ValueVector, VexecError};

fn ints(values: &[i64]) -> ValueVector {
    ValueVector::from_values(DataType::Int64, values.iter().map(|v| Value::Int64(*v)).collect())
}

fn batch(columns: &[(&str, &[i64])]) -> TupleVector {
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, _)| Column::new(*name, DataType::Int64))
            .collect(),
    ));
    TupleVector::try_new(schema, columns.iter().map(|(_, v)| ints(v)).collect()).unwrap()
}

#[test]
fn test_selection_is_a_lazy_view() {
    // Contract: selecting rows remaps indices without copying the source
    let v = ints(&[10, 20, 30, 40]);
    let selected = v.select(&SelectionVector::new(vec![3, 1]));
    assert_eq!(selected.len(), 2);
    assert_eq!(selected.values(), vec![Value::Int64(40), Value::Int64(20)]);
    let view = selected.as_view().expect("selection is a view");
    assert_eq!(view.source().len(), 4);
}

#[test]
fn test_stacked_selections_stay_one_level_deep() {
    // Contract: explicit mappings compose into one view over the source
    let v = ints(&[1, 2, 3, 4, 5]);
    let once = v.select(&SelectionVector::new(vec![4, 3, 2]));
    let twice = once.select(&SelectionVector::new(vec![2, 0]));
    assert_eq!(twice.values(), vec![Value::Int64(3), Value::Int64(5)]);
    assert!(twice.as_view().unwrap().source().as_view().is_none());
}

#[test]
fn test_nullable_mapping_reads_nulls() {
    // Contract: a missing physical row reads as null
    let v = ints(&[7, 8]);
    let mapped = v.reindex(RowMapping::Nullable(vec![None, Some(0)].into()), 2);
    assert!(mapped.is_null(0));
    assert_eq!(mapped.get_value(1), Value::Int64(7));
}

#[test]
fn test_three_valued_logic() {
    // Contract: AND/OR/NOT follow SQL three-valued logic
    let a = BitSetVector::from_options([Some(true), Some(false), None, None]);
    let b = BitSetVector::from_options([None, None, Some(false), Some(true)]);
    let and = a.and(&b).unwrap();
    assert_eq!(
        (0..4).map(|r| and.get(r)).collect::<Vec<_>>(),
        vec![None, Some(false), Some(false), None]
    );
    let or = a.or(&b).unwrap();
    assert_eq!(
        (0..4).map(|r| or.get(r)).collect::<Vec<_>>(),
        vec![Some(true), None, None, Some(true)]
    );
    let not = a.not().unwrap();
    assert_eq!(not.get(0), Some(false));
    assert_eq!(not.get(2), None);
}

#[test]
fn test_bitset_to_selection_skips_nulls() {
    // Contract: only non-null true rows are selected
    let bits = BitSetVector::from_options([Some(true), None, Some(false), Some(true)]);
    assert_eq!(bits.to_selection().indices, vec![0, 3]);
    assert_eq!(bits.cardinality(), 2);
}

#[test]
fn test_match_bitset() {
    // Contract: zeros lists unset rows in order
    let mut bits = BitSet::new(5);
    bits.set(1);
    bits.set(3);
    assert!(bits.get(1));
    assert_eq!(bits.zeros().collect::<Vec<_>>(), vec![0, 2, 4]);
    assert_eq!(bits.ones().collect::<Vec<_>>(), vec![1, 3]);
}

#[test]
fn test_column_lengths_must_agree() {
    // Contract: every column has the batch row count
    let schema = Arc::new(Schema::new(vec![
        Column::new("a", DataType::Int64),
        Column::new("b", DataType::Int64),
    ]));
    let err = TupleVector::try_new(schema, vec![ints(&[1]), ints(&[1, 2])]).unwrap_err();
    assert!(matches!(err, VexecError::InvalidArgument(_)));
}

#[test]
fn test_combine_appends_columns() {
    // Contract: combine keeps left columns first
    let left = batch(&[("a", &[1, 2])]);
    let right = batch(&[("b", &[3, 4])]);
    let combined = TupleVector::combine(&left, &right).unwrap();
    assert_eq!(combined.schema().names(), vec!["a", "b"]);
    assert_eq!(combined.row(1), vec![Value::Int64(2), Value::Int64(4)]);
}

#[test]
fn test_cartesian_product_is_outer_major() {
    // Contract: every outer row is repeated for all inner rows
    let outer = batch(&[("a", &[1, 2])]);
    let inner = batch(&[("b", &[10, 20])]);
    let product = TupleVector::cartesian(&outer, &inner);
    assert_eq!(
        product.rows(),
        vec![
            vec![Value::Int64(1), Value::Int64(10)],
            vec![Value::Int64(1), Value::Int64(20)],
            vec![Value::Int64(2), Value::Int64(10)],
            vec![Value::Int64(2), Value::Int64(20)],
        ]
    );
}

#[test]
fn test_nested_table_values() {
    // Contract: a table vector holds one nested batch or null per row
    let nested = batch(&[("x", &[1, 2, 3])]);
    let tables = ValueVector::tables(vec![Some(nested), None]);
    assert_eq!(tables.get_table(0).unwrap().row_count(), 3);
    assert!(tables.get_table(1).is_none());
    assert!(tables.is_null(1));
}
