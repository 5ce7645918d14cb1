//! Value and `DataType` definitions for vexec.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::vector::TupleVector;

/// Supported data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Dynamic type, resolved per value at runtime.
    Any,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    String,
    /// Date (stored as days since epoch).
    Date,
    /// Timestamp (stored as microseconds since epoch).
    Timestamp,
    /// Nested table, one `TupleVector` per row.
    Table,
}

impl DataType {
    /// Returns the SQL name of the data type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Any => "ANY",
            DataType::Int64 => "INT64",
            DataType::Float32 => "FLOAT32",
            DataType::Float64 => "FLOAT64",
            DataType::Bool => "BOOL",
            DataType::String => "STRING",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Table => "TABLE",
        }
    }

    /// Returns whether this type is numeric.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int64 | DataType::Float32 | DataType::Float64
        )
    }

    /// Returns the common type two operands are compared/hashed under.
    ///
    /// `Any` yields to the other side; mixed numerics widen to `Float64`;
    /// anything else that differs falls back to `Any`.
    #[must_use]
    pub fn promote(self, other: DataType) -> DataType {
        match (self, other) {
            (a, b) if a == b => a,
            (DataType::Any, b) => b,
            (a, DataType::Any) => a,
            (a, b) if a.is_numeric() && b.is_numeric() => DataType::Float64,
            _ => DataType::Any,
        }
    }

    /// Converts to an Arrow data type.
    ///
    /// Returns None for types that have no arrow storage (`Any`, `Table`).
    #[must_use]
    pub fn to_arrow(&self) -> Option<arrow::datatypes::DataType> {
        match self {
            DataType::Int64 => Some(arrow::datatypes::DataType::Int64),
            DataType::Float32 => Some(arrow::datatypes::DataType::Float32),
            DataType::Float64 => Some(arrow::datatypes::DataType::Float64),
            DataType::Bool => Some(arrow::datatypes::DataType::Boolean),
            DataType::String => Some(arrow::datatypes::DataType::Utf8),
            DataType::Date => Some(arrow::datatypes::DataType::Date32),
            DataType::Timestamp => Some(arrow::datatypes::DataType::Timestamp(
                arrow::datatypes::TimeUnit::Microsecond,
                None,
            )),
            DataType::Any | DataType::Table => None,
        }
    }

    /// Converts from an Arrow data type.
    ///
    /// Returns None for unsupported Arrow types.
    #[must_use]
    pub fn from_arrow(arrow_type: &arrow::datatypes::DataType) -> Option<Self> {
        match arrow_type {
            arrow::datatypes::DataType::Int64 => Some(DataType::Int64),
            arrow::datatypes::DataType::Float32 => Some(DataType::Float32),
            arrow::datatypes::DataType::Float64 => Some(DataType::Float64),
            arrow::datatypes::DataType::Boolean => Some(DataType::Bool),
            arrow::datatypes::DataType::Utf8 => Some(DataType::String),
            arrow::datatypes::DataType::Date32 => Some(DataType::Date),
            arrow::datatypes::DataType::Timestamp(arrow::datatypes::TimeUnit::Microsecond, _) => {
                Some(DataType::Timestamp)
            }
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime value container for data.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// 64-bit signed integer value.
    Int64(i64),
    /// 32-bit floating point value.
    Float32(f32),
    /// 64-bit floating point value.
    Float64(f64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    String(String),
    /// Date value (days since Unix epoch).
    Date(i32),
    /// Timestamp value (microseconds since Unix epoch).
    Timestamp(i64),
    /// Nested table value.
    Table(TupleVector),
}

// Manual Hash implementation because f32/f64 doesn't implement Hash
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int64(v) | Value::Timestamp(v) => v.hash(state),
            Value::Float32(v) => normalize_zero_f32(*v).to_bits().hash(state),
            Value::Float64(v) => normalize_zero_f64(*v).to_bits().hash(state),
            Value::Bool(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Table(t) => {
                t.row_count().hash(state);
                for row in 0..t.row_count() {
                    for column in t.columns() {
                        column.get_value(row).hash(state);
                    }
                }
            }
            Value::Null => {}
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int64(a), Value::Int64(b)) | (Value::Timestamp(a), Value::Timestamp(b)) => {
                a == b
            }
            (Value::Float32(a), Value::Float32(b)) => {
                normalize_zero_f32(*a).to_bits() == normalize_zero_f32(*b).to_bits()
            }
            (Value::Float64(a), Value::Float64(b)) => {
                normalize_zero_f64(*a).to_bits() == normalize_zero_f64(*b).to_bits()
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            _ => false,
        }
    }
}

// Structural equality: floats compare by bit pattern so Eq/Hash agree
impl Eq for Value {}

fn normalize_zero_f64(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

fn normalize_zero_f32(v: f32) -> f32 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl Value {
    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the data type of this value, or None for Null.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float32(_) => Some(DataType::Float32),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::String(_) => Some(DataType::String),
            Value::Date(_) => Some(DataType::Date),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Table(_) => Some(DataType::Table),
            Value::Null => None,
        }
    }

    /// Attempts to extract an i64 value.
    #[must_use]
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract an f64 value.
    #[must_use]
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Attempts to extract a bool value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attempts to extract a nested table.
    #[must_use]
    pub fn as_table(&self) -> Option<&TupleVector> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the value as f64 if it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true for Int64, Float32 and Float64 values.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int64(_) | Value::Float32(_) | Value::Float64(_))
    }

    /// Hashes numerics by their `f64` value so that numerics comparing
    /// equal hash alike. Other values use the structural hash.
    pub fn hash_numeric<H: Hasher>(&self, state: &mut H) {
        match self.to_f64() {
            Some(f) => Value::Float64(f).hash(state),
            None => self.hash(state),
        }
    }

    /// Compares two values using SQL null semantics.
    ///
    /// Numerics are promoted to a common type and numeric strings are
    /// coerced when compared against numbers. Returns None if either value
    /// is null or the types are not comparable.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int64(a), Value::Int64(b))
            | (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Float32(a), Value::Float32(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => a.to_f64()?.partial_cmp(&b.to_f64()?),
            (Value::String(s), n) if n.is_numeric() => {
                s.trim().parse::<f64>().ok()?.partial_cmp(&n.to_f64()?)
            }
            (n, Value::String(s)) if n.is_numeric() => {
                n.to_f64()?.partial_cmp(&s.trim().parse::<f64>().ok()?)
            }
            _ => None,
        }
    }

    /// Total order over non-null values used for sorting and MIN/MAX.
    ///
    /// Comparable values use [`Value::compare`]; incomparable values are
    /// ordered by type rank so the order stays deterministic.
    #[must_use]
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        if let Some(ordering) = self.compare(other) {
            return ordering;
        }
        match (self, other) {
            (Value::Float32(a), Value::Float32(b)) => a.total_cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (a, b) = (a.to_f64().unwrap_or(f64::NAN), b.to_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int64(_) | Value::Float32(_) | Value::Float64(_) => 2,
            Value::String(_) => 3,
            Value::Date(_) => 4,
            Value::Timestamp(_) => 5,
            Value::Table(_) => 6,
        }
    }

    /// Casts this value to the target type.
    ///
    /// Returns None when the value cannot be represented in the target type
    /// (for example a non integral float cast to Int64).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cast(&self, target: DataType) -> Option<Value> {
        if self.is_null() || target == DataType::Any || self.data_type() == Some(target) {
            return Some(self.clone());
        }
        match (self, target) {
            (Value::Int64(v), DataType::Float64) => Some(Value::Float64(*v as f64)),
            (Value::Int64(v), DataType::Float32) => Some(Value::Float32(*v as f32)),
            (Value::Float32(v), DataType::Float64) => Some(Value::Float64(f64::from(*v))),
            (Value::Float64(v), DataType::Float32) => Some(Value::Float32(*v as f32)),
            (Value::Float32(_) | Value::Float64(_), DataType::Int64) => {
                let f = self.to_f64()?;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Some(Value::Int64(f as i64))
                } else {
                    None
                }
            }
            (Value::String(s), DataType::Int64) => s.trim().parse().ok().map(Value::Int64),
            (Value::String(s), DataType::Float64) => s.trim().parse().ok().map(Value::Float64),
            (Value::String(s), DataType::Float32) => s.trim().parse().ok().map(Value::Float32),
            (Value::String(s), DataType::Bool) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Value::Table(_), _) | (_, DataType::Table) => None,
            (v, DataType::String) => Some(Value::String(v.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int64(v) | Value::Timestamp(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Date(v) => write!(f, "{v}"),
            Value::Table(t) => write!(f, "<table rows={}>", t.row_count()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
