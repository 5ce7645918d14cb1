//! Pull-based batch iterator contract.

use std::collections::VecDeque;

use crate::error::{Result, VexecError};
use crate::vector::TupleVector;

/// Iterator over the batches produced by an executing operator.
///
/// `has_next` may do arbitrary work (pull from children, build hash tables)
/// and must be called before each `next`. `close` releases child iterators;
/// it is idempotent and also implied by dropping the iterator.
pub trait TupleIterator {
    /// Returns true if another batch is available.
    ///
    /// # Errors
    ///
    /// Returns an error if producing the batch fails.
    fn has_next(&mut self) -> Result<bool>;

    /// Returns the next batch.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchElement` unless preceded by a `has_next` returning
    /// true, or an error if producing the batch fails.
    fn next(&mut self) -> Result<TupleVector>;

    /// Returns a row count hint for the remaining rows, if known.
    fn estimated_row_count(&self) -> Option<usize> {
        None
    }

    /// Releases resources held by this iterator and its children.
    fn close(&mut self) {}
}

/// Boxed iterator borrowing from the plan and context it executes.
pub type TupleIteratorRef<'a> = Box<dyn TupleIterator + 'a>;

/// Returns the `NoSuchElement` error for an operator.
pub(crate) fn no_such_element(operator: &str) -> VexecError {
    VexecError::NoSuchElement(format!("{operator}: next() called without has_next()"))
}

/// Iterator over an already materialized list of batches.
#[derive(Debug, Default)]
pub struct BatchIterator {
    batches: VecDeque<TupleVector>,
    estimated_row_count: Option<usize>,
}

impl BatchIterator {
    /// Creates an iterator over `batches`.
    #[must_use]
    pub fn new(batches: Vec<TupleVector>) -> Self {
        let rows = batches.iter().map(TupleVector::row_count).sum();
        BatchIterator {
            batches: batches.into(),
            estimated_row_count: Some(rows),
        }
    }

    /// Creates an iterator yielding a single batch.
    #[must_use]
    pub fn single(batch: TupleVector) -> Self {
        Self::new(vec![batch])
    }

    /// Creates an iterator yielding nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Overrides the row count hint.
    #[must_use]
    pub fn with_estimated_row_count(mut self, estimate: Option<usize>) -> Self {
        self.estimated_row_count = estimate;
        self
    }
}

impl TupleIterator for BatchIterator {
    fn has_next(&mut self) -> Result<bool> {
        Ok(!self.batches.is_empty())
    }

    fn next(&mut self) -> Result<TupleVector> {
        self.batches
            .pop_front()
            .ok_or_else(|| no_such_element("BatchIterator"))
    }

    fn estimated_row_count(&self) -> Option<usize> {
        self.estimated_row_count
    }

    fn close(&mut self) {
        self.batches.clear();
    }
}

/// Drains all batches from `iter`.
///
/// # Errors
///
/// Returns the first error raised by the iterator.
pub fn drain(iter: &mut dyn TupleIterator) -> Result<Vec<TupleVector>> {
    let mut batches = Vec::new();
    while iter.has_next()? {
        batches.push(iter.next()?);
    }
    Ok(batches)
}

/// Drains and closes `iter`, closing it on error as well.
///
/// # Errors
///
/// Returns the first error raised by the iterator.
pub fn collect_batches(mut iter: TupleIteratorRef<'_>) -> Result<Vec<TupleVector>> {
    let result = drain(iter.as_mut());
    iter.close();
    result
}

/// Drains `iter` and concatenates everything into one batch.
///
/// Returns None if the iterator produced no batches.
///
/// # Errors
///
/// Returns the first error raised by the iterator.
pub fn materialize(iter: &mut dyn TupleIterator) -> Result<Option<TupleVector>> {
    let batches = drain(iter)?;
    if batches.is_empty() {
        return Ok(None);
    }
    TupleVector::concat(&batches).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_iterator_contract() {
        let mut iter = BatchIterator::new(vec![TupleVector::constant(2), TupleVector::constant(3)]);
        assert_eq!(iter.estimated_row_count(), Some(5));
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().row_count(), 2);
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap().row_count(), 3);
        assert!(!iter.has_next().unwrap());
        assert!(matches!(iter.next(), Err(VexecError::NoSuchElement(_))));
        iter.close();
        iter.close();
    }

    #[test]
    fn test_materialize_concatenates() {
        let mut iter = BatchIterator::new(vec![TupleVector::constant(2), TupleVector::constant(3)]);
        let all = materialize(&mut iter).unwrap().unwrap();
        assert_eq!(all.row_count(), 5);
        assert!(materialize(&mut BatchIterator::empty()).unwrap().is_none());
    }
}
