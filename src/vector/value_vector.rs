//! Column vectors with null tracking and lazy, index-remapping views.

use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray};
use arrow::datatypes::{
    DataType as ArrowDataType, Date32Type, Float32Type, Float64Type, Int64Type, TimeUnit,
    TimestampMicrosecondType,
};

use crate::error::{Result, VexecError};
use crate::types::{DataType, Value};

use super::builder::build_array;
use super::populated::PopulatedTables;
use super::{BitSetVector, RowMapping, SelectionVector, TupleVector};

/// A logical column of values.
///
/// Vectors are immutable and cheap to clone. Derived vectors (selections,
/// slices, join pairings) are [`IndexedView`]s that remap rows onto a
/// source vector instead of copying values.
#[derive(Clone)]
pub struct ValueVector {
    data_type: DataType,
    len: usize,
    data: Arc<VectorData>,
}

#[derive(Debug)]
enum VectorData {
    /// Typed storage in an arrow array.
    Array(ArrayRef),
    /// Boxed values for dynamically typed columns.
    Values(Vec<Value>),
    /// The same value on every row.
    Literal(Value),
    /// One nested table per row.
    Tables(Vec<Option<TupleVector>>),
    /// Nested tables computed on demand from a join predicate.
    Populated(PopulatedTables),
    /// Several vectors laid end to end.
    Chunked(Chunks),
    /// A remapped view of another vector.
    Indexed(IndexedView),
}

/// A view that reads a source vector through a [`RowMapping`].
#[derive(Debug)]
pub struct IndexedView {
    source: ValueVector,
    mapping: RowMapping,
}

impl IndexedView {
    /// Returns the vector this view reads from.
    #[must_use]
    pub fn source(&self) -> &ValueVector {
        &self.source
    }

    /// Returns the row mapping.
    #[must_use]
    pub fn mapping(&self) -> &RowMapping {
        &self.mapping
    }
}

#[derive(Debug)]
struct Chunks {
    chunks: Vec<ValueVector>,
    /// Start row of each chunk.
    offsets: Vec<usize>,
}

impl Chunks {
    fn find(&self, row: usize) -> (usize, usize) {
        let chunk = self.offsets.partition_point(|&o| o <= row) - 1;
        (chunk, row - self.offsets[chunk])
    }
}

/// Physical storage a logical row resolves to.
enum Leaf<'a> {
    Array(&'a ArrayRef),
    Values(&'a [Value]),
    Literal(&'a Value),
    Tables(&'a [Option<TupleVector>]),
    Populated(&'a PopulatedTables),
}

impl ValueVector {
    fn with_data(data_type: DataType, len: usize, data: VectorData) -> Self {
        ValueVector {
            data_type,
            len,
            data: Arc::new(data),
        }
    }

    /// Wraps an arrow array.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for arrow types without a vexec type.
    pub fn from_array(array: ArrayRef) -> Result<Self> {
        let data_type = DataType::from_arrow(array.data_type()).ok_or_else(|| {
            VexecError::UnsupportedOperation(format!(
                "Unsupported arrow type: {:?}",
                array.data_type()
            ))
        })?;
        Ok(Self::with_data(data_type, array.len(), VectorData::Array(array)))
    }

    /// Wraps a boolean array.
    #[must_use]
    pub fn from_boolean_array(array: BooleanArray) -> Self {
        let len = array.len();
        Self::with_data(DataType::Bool, len, VectorData::Array(Arc::new(array)))
    }

    /// Creates a vector from values of the declared type.
    ///
    /// Values are stored in an arrow array when they all match the declared
    /// type, otherwise they are kept boxed.
    #[must_use]
    pub fn from_values(data_type: DataType, values: Vec<Value>) -> Self {
        let len = values.len();
        if data_type == DataType::Table {
            let tables = values
                .into_iter()
                .map(|v| match v {
                    Value::Table(t) => Some(t),
                    _ => None,
                })
                .collect();
            return Self::tables(tables);
        }
        let storage_type = if data_type == DataType::Any {
            common_type(&values)
        } else {
            Some(data_type)
        };
        if let Some(array) = storage_type.and_then(|t| build_array(t, &values)) {
            return Self::with_data(data_type, len, VectorData::Array(array));
        }
        let data_type = if values
            .iter()
            .all(|v| v.is_null() || v.data_type() == Some(data_type))
        {
            data_type
        } else {
            DataType::Any
        };
        Self::with_data(data_type, len, VectorData::Values(values))
    }

    /// Creates a vector repeating `value` on `len` rows.
    #[must_use]
    pub fn literal(value: Value, len: usize) -> Self {
        let data_type = value.data_type().unwrap_or(DataType::Any);
        Self::with_data(data_type, len, VectorData::Literal(value))
    }

    /// Creates an all-null vector of the given type.
    #[must_use]
    pub fn nulls(data_type: DataType, len: usize) -> Self {
        Self::with_data(data_type, len, VectorData::Literal(Value::Null))
    }

    /// Creates a nested-table vector.
    #[must_use]
    pub fn tables(tables: Vec<Option<TupleVector>>) -> Self {
        let len = tables.len();
        Self::with_data(DataType::Table, len, VectorData::Tables(tables))
    }

    pub(crate) fn populated(tables: PopulatedTables, len: usize) -> Self {
        Self::with_data(DataType::Table, len, VectorData::Populated(tables))
    }

    /// Concatenates vectors end to end without copying.
    #[must_use]
    pub fn concat(vectors: &[ValueVector]) -> Self {
        let chunks: Vec<ValueVector> = vectors.iter().filter(|v| v.len > 0).cloned().collect();
        let data_type = vectors
            .iter()
            .map(|v| v.data_type)
            .reduce(|a, b| if a == b { a } else { a.promote(b) })
            .unwrap_or(DataType::Any);
        match chunks.len() {
            0 => ValueVector::nulls(data_type, 0),
            1 if chunks[0].data_type == data_type => chunks[0].clone(),
            _ => {
                let mut offsets = Vec::with_capacity(chunks.len());
                let mut len = 0;
                for chunk in &chunks {
                    offsets.push(len);
                    len += chunk.len;
                }
                Self::with_data(data_type, len, VectorData::Chunked(Chunks { chunks, offsets }))
            }
        }
    }

    /// Returns a view of `len` rows reading through `mapping`.
    ///
    /// Explicit mappings stacked on explicit views are composed so view
    /// chains stay shallow.
    #[must_use]
    pub fn reindex(&self, mapping: RowMapping, len: usize) -> Self {
        if let VectorData::Indexed(view) = self.data.as_ref() {
            if mapping.is_explicit() && view.mapping.is_explicit() {
                let composed = view.mapping.compose(&mapping, len);
                return view.source.reindex(composed, len);
            }
        }
        Self::with_data(
            self.data_type,
            len,
            VectorData::Indexed(IndexedView {
                source: self.clone(),
                mapping,
            }),
        )
    }

    /// Returns a view of the selected rows.
    #[must_use]
    pub fn select(&self, selection: &SelectionVector) -> Self {
        self.reindex(RowMapping::from(selection), selection.len())
    }

    /// Returns a view of `len` rows starting at `offset`.
    #[must_use]
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        match self.data.as_ref() {
            VectorData::Array(array) => Self::with_data(
                self.data_type,
                len,
                VectorData::Array(array.slice(offset, len)),
            ),
            VectorData::Literal(value) => {
                Self::with_data(self.data_type, len, VectorData::Literal(value.clone()))
            }
            _ => self.reindex(RowMapping::Range { offset }, len),
        }
    }

    /// Returns the declared data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn size(&self) -> usize {
        self.len
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the vector has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the indexed view if this vector is one.
    #[must_use]
    pub fn as_view(&self) -> Option<&IndexedView> {
        match self.data.as_ref() {
            VectorData::Indexed(view) => Some(view),
            _ => None,
        }
    }

    fn locate(&self, row: usize) -> Option<(Leaf<'_>, usize)> {
        match self.data.as_ref() {
            VectorData::Array(array) => Some((Leaf::Array(array), row)),
            VectorData::Values(values) => Some((Leaf::Values(values), row)),
            VectorData::Literal(value) => Some((Leaf::Literal(value), row)),
            VectorData::Tables(tables) => Some((Leaf::Tables(tables), row)),
            VectorData::Populated(populated) => Some((Leaf::Populated(populated), row)),
            VectorData::Chunked(chunks) => {
                let (chunk, local) = chunks.find(row);
                chunks.chunks[chunk].locate(local)
            }
            VectorData::Indexed(view) => {
                let physical = view.mapping.physical_row(row)?;
                view.source.locate(physical)
            }
        }
    }

    /// Returns true if the value at `row` is null.
    #[must_use]
    pub fn is_null(&self, row: usize) -> bool {
        match self.locate(row) {
            None => true,
            Some((Leaf::Array(array), r)) => array.is_null(r),
            Some((Leaf::Values(values), r)) => values[r].is_null(),
            Some((Leaf::Literal(value), _)) => value.is_null(),
            Some((Leaf::Tables(tables), r)) => tables[r].is_none(),
            Some((Leaf::Populated(populated), r)) => populated.is_null(r),
        }
    }

    /// Returns true if any row is null.
    #[must_use]
    pub fn has_nulls(&self) -> bool {
        (0..self.len).any(|row| self.is_null(row))
    }

    /// Returns the value at `row`.
    #[must_use]
    pub fn get_value(&self, row: usize) -> Value {
        match self.locate(row) {
            None => Value::Null,
            Some((Leaf::Array(array), r)) => array_value(array, r),
            Some((Leaf::Values(values), r)) => values[r].clone(),
            Some((Leaf::Literal(value), _)) => value.clone(),
            Some((Leaf::Tables(tables), r)) => tables[r].clone().map_or(Value::Null, Value::Table),
            Some((Leaf::Populated(populated), r)) => {
                populated.table(r).map_or(Value::Null, Value::Table)
            }
        }
    }

    /// Returns the Int64 value at `row`, coercing compatible values.
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` if the value is null or not convertible.
    pub fn get_int64(&self, row: usize) -> Result<i64> {
        if let Some((Leaf::Array(array), r)) = self.locate(row) {
            if array.data_type() == &ArrowDataType::Int64 && array.is_valid(r) {
                return Ok(array.as_primitive::<Int64Type>().value(r));
            }
        }
        let value = self.get_value(row);
        value
            .cast(DataType::Int64)
            .and_then(|v| v.as_int64())
            .ok_or_else(|| type_error(DataType::Int64, &value))
    }

    /// Returns the Float64 value at `row`, coercing numeric values.
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` if the value is null or not convertible.
    pub fn get_float64(&self, row: usize) -> Result<f64> {
        let value = self.get_value(row);
        value
            .cast(DataType::Float64)
            .and_then(|v| v.as_float64())
            .ok_or_else(|| type_error(DataType::Float64, &value))
    }

    /// Returns the boolean value at `row`.
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` if the value is null or not a boolean.
    pub fn get_bool(&self, row: usize) -> Result<bool> {
        if let Some((Leaf::Array(array), r)) = self.locate(row) {
            if array.data_type() == &ArrowDataType::Boolean && array.is_valid(r) {
                return Ok(array.as_boolean().value(r));
            }
        }
        let value = self.get_value(row);
        value
            .cast(DataType::Bool)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| type_error(DataType::Bool, &value))
    }

    /// Returns the string value at `row`; non-string values are rendered.
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` if the value is null.
    pub fn get_string(&self, row: usize) -> Result<String> {
        match self.get_value(row) {
            Value::Null => Err(type_error(DataType::String, &Value::Null)),
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    /// Returns the nested table at `row`, or None if null.
    #[must_use]
    pub fn get_table(&self, row: usize) -> Option<TupleVector> {
        match self.get_value(row) {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Returns all values as a vector.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        (0..self.len).map(|row| self.get_value(row)).collect()
    }

    /// Interprets this vector as a three-valued predicate.
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` if a non-null value is not boolean.
    pub fn to_bitset(&self) -> Result<BitSetVector> {
        if let VectorData::Array(array) = self.data.as_ref() {
            if array.data_type() == &ArrowDataType::Boolean {
                return Ok(BitSetVector::new(array.as_boolean().clone()));
            }
        }
        let mut values = Vec::with_capacity(self.len);
        for row in 0..self.len {
            match self.get_value(row) {
                Value::Null => values.push(None),
                Value::Bool(b) => values.push(Some(b)),
                other => return Err(type_error(DataType::Bool, &other)),
            }
        }
        Ok(BitSetVector::from_options(values))
    }

    /// Materializes this vector into an arrow array.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` for vectors without arrow storage
    /// (nested tables, mixed dynamic values).
    pub fn to_array(&self) -> Result<ArrayRef> {
        if let VectorData::Array(array) = self.data.as_ref() {
            return Ok(array.clone());
        }
        let values = self.values();
        let storage_type = if self.data_type == DataType::Any {
            common_type(&values)
        } else {
            Some(self.data_type)
        };
        storage_type
            .and_then(|t| build_array(t, &values))
            .ok_or_else(|| {
                VexecError::UnsupportedOperation(format!(
                    "Cannot materialize {} vector as an arrow array",
                    self.data_type
                ))
            })
    }
}

/// Returns the single non-null type shared by all values, if any.
fn common_type(values: &[Value]) -> Option<DataType> {
    let mut types = values.iter().filter_map(Value::data_type);
    let first = types.next().unwrap_or(DataType::Any);
    if types.all(|t| t == first) && first != DataType::Any {
        Some(first)
    } else {
        None
    }
}

fn type_error(expected: DataType, actual: &Value) -> VexecError {
    VexecError::TypeError {
        expected: expected.name().to_string(),
        actual: actual
            .data_type()
            .map_or_else(|| "NULL".to_string(), |t| t.name().to_string()),
    }
}

fn array_value(array: &ArrayRef, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match array.data_type() {
        ArrowDataType::Int64 => Value::Int64(array.as_primitive::<Int64Type>().value(row)),
        ArrowDataType::Float32 => Value::Float32(array.as_primitive::<Float32Type>().value(row)),
        ArrowDataType::Float64 => Value::Float64(array.as_primitive::<Float64Type>().value(row)),
        ArrowDataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        ArrowDataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
        ArrowDataType::Date32 => Value::Date(array.as_primitive::<Date32Type>().value(row)),
        ArrowDataType::Timestamp(TimeUnit::Microsecond, _) => {
            Value::Timestamp(array.as_primitive::<TimestampMicrosecondType>().value(row))
        }
        _ => Value::Null,
    }
}

impl fmt::Debug for ValueVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 16;
        let preview: Vec<String> = (0..self.len.min(PREVIEW))
            .map(|row| self.get_value(row).to_string())
            .collect();
        f.debug_struct("ValueVector")
            .field("data_type", &self.data_type)
            .field("len", &self.len)
            .field("values", &preview)
            .finish()
    }
}
