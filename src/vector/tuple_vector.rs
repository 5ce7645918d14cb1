//! Columnar batches of rows.

use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{Field, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::{Result, VexecError};
use crate::types::{Column, DataType, Schema, SchemaRef, Value};

use super::{RowMapping, SelectionVector, ValueVector};

/// A batch of rows: a schema plus one [`ValueVector`] per column.
///
/// Every column holds exactly `row_count` values. Batches are immutable;
/// selections and joins produce new batches whose columns are views.
#[derive(Clone)]
pub struct TupleVector {
    schema: SchemaRef,
    columns: Vec<ValueVector>,
    row_count: usize,
}

impl TupleVector {
    /// Creates a batch from a schema and columns.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the column count differs from the schema
    /// or the columns differ in length.
    pub fn try_new(schema: SchemaRef, columns: Vec<ValueVector>) -> Result<Self> {
        let row_count = columns.first().map_or(0, ValueVector::len);
        Self::try_new_with_row_count(schema, columns, row_count)
    }

    /// Creates a batch with an explicit row count (needed for zero columns).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` on column count or length mismatches.
    pub fn try_new_with_row_count(
        schema: SchemaRef,
        columns: Vec<ValueVector>,
        row_count: usize,
    ) -> Result<Self> {
        if schema.len() != columns.len() {
            return Err(VexecError::invalid_argument(format!(
                "Schema has {} columns but {} vectors were supplied",
                schema.len(),
                columns.len()
            )));
        }
        if let Some((i, c)) = columns.iter().enumerate().find(|(_, c)| c.len() != row_count) {
            return Err(VexecError::invalid_argument(format!(
                "Column {} ({}) has {} rows, expected {}",
                i,
                schema.columns()[i].name,
                c.len(),
                row_count
            )));
        }
        Ok(TupleVector {
            schema,
            columns,
            row_count,
        })
    }

    /// Creates an empty batch with the given schema.
    #[must_use]
    pub fn empty(schema: SchemaRef) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|c| ValueVector::nulls(c.data_type, 0))
            .collect();
        TupleVector {
            schema,
            columns,
            row_count: 0,
        }
    }

    /// Creates a batch of `row_count` rows and no columns.
    #[must_use]
    pub fn constant(row_count: usize) -> Self {
        TupleVector {
            schema: Arc::new(Schema::empty()),
            columns: Vec::new(),
            row_count,
        }
    }

    /// Wraps an arrow record batch without copying.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for arrow types without a vexec type.
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let mut columns = Vec::with_capacity(batch.num_columns());
        let mut vectors = Vec::with_capacity(batch.num_columns());
        for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
            let vector = ValueVector::from_array(array.clone())?;
            columns.push(Column::new(field.name().clone(), vector.data_type()));
            vectors.push(vector);
        }
        Self::try_new_with_row_count(Arc::new(Schema::new(columns)), vectors, batch.num_rows())
    }

    /// Materializes this batch as an arrow record batch.
    ///
    /// # Errors
    ///
    /// Returns an error if a column has no arrow representation.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays = Vec::with_capacity(self.columns.len());
        for (column, vector) in self.schema.columns().iter().zip(&self.columns) {
            let array = vector.to_array()?;
            fields.push(Field::new(column.name.clone(), array.data_type().clone(), true));
            arrays.push(array);
        }
        let options = RecordBatchOptions::new().with_row_count(Some(self.row_count));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(ArrowSchema::new(fields)),
            arrays,
            &options,
        )?)
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the batch has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Returns all columns.
    #[must_use]
    pub fn columns(&self) -> &[ValueVector] {
        &self.columns
    }

    /// Returns a column by ordinal.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn column(&self, index: usize) -> &ValueVector {
        &self.columns[index]
    }

    /// Returns the column referenced by `name`.
    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<&ValueVector> {
        self.schema.index_of(name).map(|i| &self.columns[i])
    }

    /// Remaps every column through `mapping`, producing `len` rows.
    #[must_use]
    pub fn reindex(&self, mapping: &RowMapping, len: usize) -> TupleVector {
        TupleVector {
            schema: self.schema.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| c.reindex(mapping.clone(), len))
                .collect(),
            row_count: len,
        }
    }

    /// Returns a view of the selected rows.
    #[must_use]
    pub fn select(&self, selection: &SelectionVector) -> TupleVector {
        self.reindex(&RowMapping::from(selection), selection.len())
    }

    /// Returns a view of `len` rows starting at `offset`.
    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> TupleVector {
        TupleVector {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.slice(offset, len)).collect(),
            row_count: len,
        }
    }

    /// Concatenates batches vertically.
    ///
    /// Batches with equal column counts are concatenated by ordinal (the
    /// first batch names the columns, types are promoted). Otherwise columns
    /// are unioned by name and missing columns are null filled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `batches` is empty.
    pub fn concat(batches: &[TupleVector]) -> Result<TupleVector> {
        let first = batches
            .first()
            .ok_or_else(|| VexecError::invalid_argument("Cannot concatenate zero batches"))?;
        if batches.len() == 1 {
            return Ok(first.clone());
        }
        let row_count = batches.iter().map(TupleVector::row_count).sum();

        if batches
            .iter()
            .all(|b| b.column_count() == first.column_count())
        {
            let mut schema_columns = Vec::with_capacity(first.column_count());
            let mut vectors = Vec::with_capacity(first.column_count());
            for (i, column) in first.schema.columns().iter().enumerate() {
                let parts: Vec<ValueVector> = batches.iter().map(|b| b.columns[i].clone()).collect();
                let vector = ValueVector::concat(&parts);
                let mut column = column.clone();
                column.data_type = vector.data_type();
                schema_columns.push(column);
                vectors.push(vector);
            }
            return Self::try_new_with_row_count(
                Arc::new(Schema::new(schema_columns)),
                vectors,
                row_count,
            );
        }

        let mut schema_columns: Vec<Column> = Vec::new();
        for batch in batches {
            for column in batch.schema.columns() {
                if !schema_columns.iter().any(|c| c.name == column.name) {
                    schema_columns.push(column.clone());
                }
            }
        }
        let mut vectors = Vec::with_capacity(schema_columns.len());
        for column in &mut schema_columns {
            let parts: Vec<ValueVector> = batches
                .iter()
                .map(|b| match b.schema.columns().iter().position(|c| c.name == column.name) {
                    Some(i) => b.columns[i].clone(),
                    None => ValueVector::nulls(column.data_type, b.row_count),
                })
                .collect();
            let vector = ValueVector::concat(&parts);
            column.data_type = vector.data_type();
            vectors.push(vector);
        }
        Self::try_new_with_row_count(Arc::new(Schema::new(schema_columns)), vectors, row_count)
    }

    /// Returns the cartesian product of `outer` and `inner`.
    ///
    /// Rows are outer-major: row `i` pairs outer row `i / inner_rows` with
    /// inner row `i % inner_rows`. Outer columns come first.
    #[must_use]
    pub fn cartesian(outer: &TupleVector, inner: &TupleVector) -> TupleVector {
        let inner_rows = inner.row_count;
        let len = outer.row_count * inner_rows;
        let outer_mapping = RowMapping::Outer { inner_rows };
        let inner_mapping = RowMapping::Inner { inner_rows };
        let columns = outer
            .columns
            .iter()
            .map(|c| c.reindex(outer_mapping.clone(), len))
            .chain(
                inner
                    .columns
                    .iter()
                    .map(|c| c.reindex(inner_mapping.clone(), len)),
            )
            .collect();
        TupleVector {
            schema: Arc::new(outer.schema.concat(&inner.schema)),
            columns,
            row_count: len,
        }
    }

    /// Joins two batches of equal row count side by side.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the row counts differ.
    pub fn combine(left: &TupleVector, right: &TupleVector) -> Result<TupleVector> {
        if left.row_count != right.row_count {
            return Err(VexecError::invalid_argument(format!(
                "Cannot combine batches of {} and {} rows",
                left.row_count, right.row_count
            )));
        }
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().cloned());
        Ok(TupleVector {
            schema: Arc::new(left.schema.concat(&right.schema)),
            columns,
            row_count: left.row_count,
        })
    }

    /// Returns a batch with `vector` appended as a new column.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the vector length differs.
    pub fn with_column(&self, column: Column, vector: ValueVector) -> Result<TupleVector> {
        let mut columns = self.columns.clone();
        columns.push(vector);
        Self::try_new_with_row_count(
            Arc::new(self.schema.with_column(column)),
            columns,
            self.row_count,
        )
    }

    /// Returns a batch of `row_count` rows with the given schema, all null.
    #[must_use]
    pub fn nulls(schema: SchemaRef, row_count: usize) -> TupleVector {
        let columns = schema
            .columns()
            .iter()
            .map(|c| ValueVector::nulls(c.data_type, row_count))
            .collect();
        TupleVector {
            schema,
            columns,
            row_count,
        }
    }

    /// Returns the values of one row.
    #[must_use]
    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get_value(row)).collect()
    }

    /// Returns all rows as values.
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.row_count).map(|r| self.row(r)).collect()
    }

    /// Returns the declared data types of the columns.
    #[must_use]
    pub fn data_types(&self) -> Vec<DataType> {
        self.columns.iter().map(ValueVector::data_type).collect()
    }
}

impl PartialEq for TupleVector {
    fn eq(&self, other: &Self) -> bool {
        self.row_count == other.row_count
            && self.schema.names() == other.schema.names()
            && self.rows() == other.rows()
    }
}

impl fmt::Debug for TupleVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleVector")
            .field("schema", &self.schema.to_string())
            .field("row_count", &self.row_count)
            .field("columns", &self.columns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};

    fn batch(ids: Vec<i64>, names: Vec<&str>) -> TupleVector {
        let schema = Arc::new(ArrowSchema::new(vec![
            Field::new("id", arrow::datatypes::DataType::Int64, true),
            Field::new("name", arrow::datatypes::DataType::Utf8, true),
        ]));
        let rb = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap();
        TupleVector::from_record_batch(&rb).unwrap()
    }

    #[test]
    fn test_try_new_rejects_mismatched_lengths() {
        let schema = Arc::new(Schema::new(vec![
            Column::new("a", DataType::Int64),
            Column::new("b", DataType::Int64),
        ]));
        let result = TupleVector::try_new(
            schema,
            vec![
                ValueVector::literal(Value::Int64(1), 2),
                ValueVector::literal(Value::Int64(1), 3),
            ],
        );
        assert!(matches!(result, Err(VexecError::InvalidArgument(_))));
    }

    #[test]
    fn test_record_batch_round_trip() {
        let tv = batch(vec![1, 2], vec!["a", "b"]);
        assert_eq!(tv.row_count(), 2);
        assert_eq!(tv.schema().names(), vec!["id", "name"]);
        let rb = tv.select(&SelectionVector::new(vec![1])).to_record_batch().unwrap();
        assert_eq!(rb.num_rows(), 1);
    }

    #[test]
    fn test_concat_by_ordinal() {
        let a = batch(vec![1, 2], vec!["a", "b"]);
        let b = batch(vec![3], vec!["c"]);
        let c = TupleVector::concat(&[a, b]).unwrap();
        assert_eq!(c.row_count(), 3);
        assert_eq!(c.row(2), vec![Value::Int64(3), Value::from("c")]);
    }

    #[test]
    fn test_concat_union_by_name() {
        let a = batch(vec![1], vec!["a"]);
        let schema = Arc::new(Schema::new(vec![Column::new("id", DataType::Int64)]));
        let b = TupleVector::try_new(schema, vec![ValueVector::literal(Value::Int64(9), 1)])
            .unwrap();
        let c = TupleVector::concat(&[a, b]).unwrap();
        assert_eq!(c.column_count(), 2);
        assert_eq!(c.row(1), vec![Value::Int64(9), Value::Null]);
    }

    #[test]
    fn test_cartesian_is_outer_major() {
        let outer = batch(vec![1, 2], vec!["a", "b"]);
        let inner = batch(vec![10, 20, 30], vec!["x", "y", "z"]);
        let product = TupleVector::cartesian(&outer, &inner);
        assert_eq!(product.row_count(), 6);
        assert_eq!(product.column_count(), 4);
        assert_eq!(product.row(4)[0], Value::Int64(2));
        assert_eq!(product.row(4)[2], Value::Int64(20));
    }

    #[test]
    fn test_constant_batch_has_rows_without_columns() {
        let tv = TupleVector::constant(3);
        assert_eq!(tv.row_count(), 3);
        assert_eq!(tv.column_count(), 0);
    }
}
