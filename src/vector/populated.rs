//! Nested-table vectors computed lazily from a cartesian join predicate.

use super::{BitSetVector, SelectionVector, TupleVector};

/// Nested tables of a populating join, one per outer row.
///
/// The predicate is laid out over the cartesian product of outer and inner
/// rows in outer-major order, so outer row `r` owns the slice
/// `r * inner_rows .. (r + 1) * inner_rows`. A row's table is only
/// materialized (as a selection view over `inner`) when read.
#[derive(Debug)]
pub struct PopulatedTables {
    inner: TupleVector,
    predicate: Option<BitSetVector>,
}

impl PopulatedTables {
    /// Creates populated tables over `inner`.
    ///
    /// A missing predicate means every inner row belongs to every outer row.
    #[must_use]
    pub fn new(inner: TupleVector, predicate: Option<BitSetVector>) -> Self {
        PopulatedTables { inner, predicate }
    }

    fn inner_rows(&self) -> usize {
        self.inner.row_count()
    }

    /// Returns the inner rows matching `outer_row`.
    #[must_use]
    pub fn matches(&self, outer_row: usize) -> SelectionVector {
        let inner_rows = self.inner_rows();
        match &self.predicate {
            None => SelectionVector::all(inner_rows),
            Some(predicate) => {
                let start = outer_row * inner_rows;
                (0..inner_rows)
                    .filter(|&j| predicate.is_true(start + j))
                    .collect()
            }
        }
    }

    /// Returns true if `outer_row` has at least one matching inner row.
    #[must_use]
    pub fn has_match(&self, outer_row: usize) -> bool {
        let inner_rows = self.inner_rows();
        match &self.predicate {
            None => inner_rows > 0,
            Some(predicate) => {
                let start = outer_row * inner_rows;
                (start..start + inner_rows).any(|i| predicate.is_true(i))
            }
        }
    }

    /// Returns the nested table of `outer_row`, or None without matches.
    #[must_use]
    pub fn table(&self, outer_row: usize) -> Option<TupleVector> {
        let selection = self.matches(outer_row);
        if selection.is_empty() {
            None
        } else {
            Some(self.inner.select(&selection))
        }
    }

    /// Returns true if `outer_row` has no nested table.
    #[must_use]
    pub fn is_null(&self, outer_row: usize) -> bool {
        !self.has_match(outer_row)
    }
}
