//! Selection vectors and row index mappings.
//!
//! Instead of materializing filtered or joined results, derived vectors keep
//! track of which physical rows a logical row reads from.

use std::sync::Arc;

/// Selection vector for filtered batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionVector {
    /// Indices of selected rows.
    pub indices: Vec<u32>,
}

impl SelectionVector {
    /// Creates a new selection vector with the given indices.
    #[must_use]
    pub fn new(indices: Vec<u32>) -> Self {
        SelectionVector { indices }
    }

    /// Creates a selection vector selecting all rows up to count.
    #[must_use]
    pub fn all(count: usize) -> Self {
        SelectionVector {
            indices: (0..count as u32).collect(),
        }
    }

    /// Creates an empty selection vector with room for `capacity` indices.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        SelectionVector {
            indices: Vec::with_capacity(capacity),
        }
    }

    /// Appends a row index.
    pub fn push(&mut self, index: usize) {
        self.indices.push(index as u32);
    }

    /// Returns the number of selected rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if no rows are selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns the index at the given position.
    #[must_use]
    pub fn get(&self, pos: usize) -> Option<u32> {
        self.indices.get(pos).copied()
    }

    /// Returns an iterator over the selected row indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().map(|&i| i as usize)
    }
}

impl FromIterator<usize> for SelectionVector {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        SelectionVector {
            indices: iter.into_iter().map(|i| i as u32).collect(),
        }
    }
}

/// Maps a logical row of a view onto a physical row of its source.
#[derive(Debug, Clone)]
pub enum RowMapping {
    /// Logical row `i` reads `indices[i]`.
    Selection(Arc<[u32]>),
    /// Logical row `i` reads `offset + i`.
    Range { offset: usize },
    /// Every logical row reads the same physical row.
    Repeat { row: usize },
    /// Outer side of a cartesian product: `i / inner_rows`.
    Outer { inner_rows: usize },
    /// Inner side of a cartesian product: `i % inner_rows`.
    Inner { inner_rows: usize },
    /// Like `Selection` but `None` produces a null.
    Nullable(Arc<[Option<u32>]>),
}

impl RowMapping {
    /// Returns the physical row for a logical row, or None for a null row.
    #[must_use]
    pub fn physical_row(&self, row: usize) -> Option<usize> {
        match self {
            RowMapping::Selection(indices) => Some(indices[row] as usize),
            RowMapping::Range { offset } => Some(offset + row),
            RowMapping::Repeat { row: physical } => Some(*physical),
            RowMapping::Outer { inner_rows } => Some(row / inner_rows),
            RowMapping::Inner { inner_rows } => Some(row % inner_rows),
            RowMapping::Nullable(indices) => indices[row].map(|r| r as usize),
        }
    }

    /// Returns true if this mapping is an explicit index list.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        matches!(self, RowMapping::Selection(_) | RowMapping::Nullable(_))
    }

    /// Composes `self` (applied first) with an explicit `next` mapping into
    /// a single explicit mapping of `len` rows.
    #[must_use]
    pub fn compose(&self, next: &RowMapping, len: usize) -> RowMapping {
        let mapped: Vec<Option<u32>> = (0..len)
            .map(|row| {
                next.physical_row(row)
                    .and_then(|r| self.physical_row(r))
                    .map(|r| r as u32)
            })
            .collect();
        if mapped.iter().all(Option::is_some) {
            RowMapping::Selection(mapped.into_iter().flatten().collect())
        } else {
            RowMapping::Nullable(mapped.into())
        }
    }
}

impl From<&SelectionVector> for RowMapping {
    fn from(selection: &SelectionVector) -> Self {
        RowMapping::Selection(selection.indices.as_slice().into())
    }
}
