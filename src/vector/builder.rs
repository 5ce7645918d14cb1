//! Row-at-a-time construction of value vectors.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float32Builder, Float64Builder, Int64Builder,
    StringBuilder, TimestampMicrosecondBuilder,
};

use crate::types::{DataType, Value};

use super::ValueVector;

/// Builds a [`ValueVector`] of a declared type one value at a time.
#[derive(Debug)]
pub struct ValueVectorBuilder {
    data_type: DataType,
    values: Vec<Value>,
}

impl ValueVectorBuilder {
    /// Creates a builder with room for `capacity` values.
    #[must_use]
    pub fn new(data_type: DataType, capacity: usize) -> Self {
        ValueVectorBuilder {
            data_type,
            values: Vec::with_capacity(capacity),
        }
    }

    /// Appends a value.
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Appends a null.
    pub fn push_null(&mut self) {
        self.values.push(Value::Null);
    }

    /// Returns the number of values appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Finishes the vector.
    #[must_use]
    pub fn finish(self) -> ValueVector {
        ValueVector::from_values(self.data_type, self.values)
    }
}

/// Builds an arrow array from values that all match `data_type` or are null.
///
/// Returns None if the type has no arrow storage or a value does not fit.
pub(crate) fn build_array(data_type: DataType, values: &[Value]) -> Option<ArrayRef> {
    macro_rules! build {
        ($builder:ty, $variant:ident) => {{
            let mut builder = <$builder>::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::$variant(v) => builder.append_value(*v),
                    _ => return None,
                }
            }
            Some(Arc::new(builder.finish()) as ArrayRef)
        }};
    }

    match data_type {
        DataType::Int64 => build!(Int64Builder, Int64),
        DataType::Float32 => build!(Float32Builder, Float32),
        DataType::Float64 => build!(Float64Builder, Float64),
        DataType::Bool => build!(BooleanBuilder, Bool),
        DataType::Date => build!(Date32Builder, Date),
        DataType::Timestamp => build!(TimestampMicrosecondBuilder, Timestamp),
        DataType::String => {
            let mut builder = StringBuilder::with_capacity(values.len(), values.len() * 8);
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::String(s) => builder.append_value(s),
                    _ => return None,
                }
            }
            Some(Arc::new(builder.finish()) as ArrayRef)
        }
        DataType::Any | DataType::Table => None,
    }
}
