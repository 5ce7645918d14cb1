//! Bit sets for match tracking and three-valued boolean vectors.

use arrow::array::{Array, BooleanArray, BooleanBufferBuilder};
use arrow::compute::kernels::boolean::{and_kleene, not, or_kleene};

use crate::error::Result;

use super::{SelectionVector, ValueVector};

/// Growable bit set, used to track which rows have been matched.
#[derive(Debug)]
pub struct BitSet {
    bits: BooleanBufferBuilder,
}

impl BitSet {
    /// Creates a bit set of `len` cleared bits.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let mut bits = BooleanBufferBuilder::new(len);
        bits.append_n(len, false);
        BitSet { bits }
    }

    /// Returns the number of bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns true if the set holds no bits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Appends a bit.
    pub fn push(&mut self, value: bool) {
        self.bits.append(value);
    }

    /// Sets the bit at `index`.
    pub fn set(&mut self, index: usize) {
        self.bits.set_bit(index, true);
    }

    /// Returns the bit at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.bits.get_bit(index)
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        (0..self.len()).filter(|&i| self.get(i)).count()
    }

    /// Iterates the indices of set bits.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&i| self.get(i))
    }

    /// Iterates the indices of cleared bits.
    pub fn zeros(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&i| !self.get(i))
    }
}

/// Boolean vector with SQL three-valued logic.
///
/// `null AND false = false`, `null AND true = null`, `null OR true = true`,
/// `NOT null = null`.
#[derive(Debug, Clone)]
pub struct BitSetVector {
    array: BooleanArray,
}

impl BitSetVector {
    /// Wraps a boolean array.
    #[must_use]
    pub fn new(array: BooleanArray) -> Self {
        BitSetVector { array }
    }

    /// Creates a vector of `len` copies of `value`.
    #[must_use]
    pub fn all(len: usize, value: bool) -> Self {
        BitSetVector {
            array: BooleanArray::from(vec![value; len]),
        }
    }

    /// Creates a vector from nullable booleans.
    pub fn from_options<I: IntoIterator<Item = Option<bool>>>(values: I) -> Self {
        BitSetVector {
            array: values.into_iter().collect(),
        }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Returns true if the vector has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Returns true if the row is null.
    #[must_use]
    pub fn is_null(&self, row: usize) -> bool {
        self.array.is_null(row)
    }

    /// Returns the nullable value of a row.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<bool> {
        if self.array.is_null(row) {
            None
        } else {
            Some(self.array.value(row))
        }
    }

    /// Returns true if the row is non-null and true.
    #[must_use]
    pub fn is_true(&self, row: usize) -> bool {
        self.array.is_valid(row) && self.array.value(row)
    }

    /// Three-valued AND.
    ///
    /// # Errors
    ///
    /// Returns an error if the vectors differ in length.
    pub fn and(&self, other: &BitSetVector) -> Result<BitSetVector> {
        Ok(BitSetVector::new(and_kleene(&self.array, &other.array)?))
    }

    /// Three-valued OR.
    ///
    /// # Errors
    ///
    /// Returns an error if the vectors differ in length.
    pub fn or(&self, other: &BitSetVector) -> Result<BitSetVector> {
        Ok(BitSetVector::new(or_kleene(&self.array, &other.array)?))
    }

    /// Three-valued NOT.
    ///
    /// # Errors
    ///
    /// Returns an error if the arrow kernel fails.
    pub fn not(&self) -> Result<BitSetVector> {
        Ok(BitSetVector::new(not(&self.array)?))
    }

    /// Returns the number of non-null true rows.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        self.array.true_count()
    }

    /// Returns the indices of non-null true rows.
    #[must_use]
    pub fn to_selection(&self) -> SelectionVector {
        (0..self.len()).filter(|&row| self.is_true(row)).collect()
    }

    /// Returns the underlying boolean array.
    #[must_use]
    pub fn array(&self) -> &BooleanArray {
        &self.array
    }

    /// Converts into a Bool typed value vector.
    #[must_use]
    pub fn into_value_vector(self) -> ValueVector {
        ValueVector::from_boolean_array(self.array)
    }
}
