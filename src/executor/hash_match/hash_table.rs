//! Hash table and key hashing of the hash join.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use hashbrown::HashMap;
use rustc_hash::{FxBuildHasher, FxHasher};

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::expression::ExpressionRef;
use crate::types::{DataType, Value};
use crate::vector::{BitSet, SelectionVector, TupleVector, ValueVector};

/// Join key types, shared by both sides of one join.
///
/// Key values are cast to the common declared type of their ordinal. The
/// hash of a key normalizes numerics and numeric strings to `Float64`, and
/// candidates found through the hash are confirmed with [`Value::compare`],
/// so the join matches exactly the keys that compare equal, whichever side
/// is hashed.
#[derive(Debug, Clone)]
pub struct KeyTypes {
    types: Vec<DataType>,
}

impl KeyTypes {
    /// Derives the key types from the declared types of both key lists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the lists differ in length or are empty.
    pub fn new(outer_keys: &[ExpressionRef], inner_keys: &[ExpressionRef]) -> Result<Self> {
        if outer_keys.len() != inner_keys.len() || outer_keys.is_empty() {
            return Err(VexecError::invalid_argument(format!(
                "Hash join needs the same non-zero number of keys on both sides, got {} and {}",
                outer_keys.len(),
                inner_keys.len()
            )));
        }
        let types = outer_keys
            .iter()
            .zip(inner_keys)
            .map(|(outer, inner)| key_type(outer.data_type(), inner.data_type()))
            .collect();
        Ok(KeyTypes { types })
    }

    /// Returns the key type of every ordinal.
    #[must_use]
    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    /// Returns the key values of `row` cast to the key types.
    ///
    /// Returns None if any key is null or cannot be cast; such a row never
    /// joins.
    #[must_use]
    pub fn key(&self, keys: &[ValueVector], row: usize) -> Option<Vec<Value>> {
        self.types
            .iter()
            .zip(keys)
            .map(|(data_type, key)| {
                let value = key.get_value(row);
                if value.is_null() {
                    None
                } else {
                    value.cast(*data_type)
                }
            })
            .collect()
    }

    /// Combines the hashes of the key values.
    #[must_use]
    pub fn hash(key: &[Value]) -> u64 {
        key.iter().fold(0u64, |hash, value| {
            let mut hasher = FxHasher::default();
            hash_key_value(value, &mut hasher);
            hash.wrapping_mul(31).wrapping_add(hasher.finish())
        })
    }

    /// Returns true if every key value compares equal to its counterpart.
    #[must_use]
    pub fn equal(left: &[Value], right: &[Value]) -> bool {
        left.len() == right.len()
            && left
                .iter()
                .zip(right)
                .all(|(l, r)| l.compare(r) == Some(Ordering::Equal))
    }
}

/// Hashes a key value so that values comparing equal hash alike.
fn hash_key_value(value: &Value, state: &mut FxHasher) {
    match value {
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) => Value::Float64(f).hash(state),
            Err(_) => value.hash(state),
        },
        _ => value.hash_numeric(state),
    }
}

/// Common type of a key pair.
///
/// Numeric strings compare equal to numbers by their `f64` value, so a
/// string key joined with a numeric key is cast to `Float64`. A dynamic
/// ordinal keeps its values as they are.
fn key_type(outer: DataType, inner: DataType) -> DataType {
    match (outer, inner) {
        (a, b) if a == b => a,
        (DataType::Any, _) | (_, DataType::Any) => DataType::Any,
        (DataType::String, n) | (n, DataType::String) if n.is_numeric() => DataType::Float64,
        (a, b) => a.promote(b),
    }
}

/// Evaluates key expressions over a batch.
pub(crate) fn eval_keys(
    expressions: &[ExpressionRef],
    batch: &TupleVector,
    ctx: &ExecutionContext,
) -> Result<Vec<ValueVector>> {
    expressions.iter().map(|e| e.eval(batch, ctx)).collect()
}

/// Hash table over the fully consumed hashed side of a join.
///
/// Rows are indexed by the combined hash of their cast key values; rows
/// with a null key are stored but never indexed. A bitset tracks which
/// rows matched at least one probe row.
#[derive(Debug)]
pub struct JoinHashTable {
    rows: TupleVector,
    keys: Vec<ValueVector>,
    buckets: HashMap<u64, Vec<u32>, FxBuildHasher>,
    matched: BitSet,
    indexed_rows: usize,
}

impl JoinHashTable {
    /// Builds the table over `rows` using the evaluated `keys`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the table exceeds `u32::MAX` rows.
    pub fn build(rows: TupleVector, keys: Vec<ValueVector>, key_types: &KeyTypes) -> Result<Self> {
        let mut buckets: HashMap<u64, Vec<u32>, FxBuildHasher> =
            HashMap::with_capacity_and_hasher(rows.row_count(), FxBuildHasher);
        let mut indexed_rows = 0;
        for row in 0..rows.row_count() {
            let Some(key) = key_types.key(&keys, row) else {
                continue;
            };
            let index = u32::try_from(row).map_err(|_| {
                VexecError::invalid_argument("Hash join table exceeds u32::MAX rows")
            })?;
            buckets.entry(KeyTypes::hash(&key)).or_default().push(index);
            indexed_rows += 1;
        }
        let matched = BitSet::new(rows.row_count());
        Ok(JoinHashTable {
            rows,
            keys,
            buckets,
            matched,
            indexed_rows,
        })
    }

    /// Creates a table over a hashed side that produced no rows.
    ///
    /// No key is evaluated, so the schema of `rows` may be unresolved.
    #[must_use]
    pub fn empty(rows: TupleVector) -> Self {
        JoinHashTable {
            matched: BitSet::new(rows.row_count()),
            rows,
            keys: Vec::new(),
            buckets: HashMap::with_hasher(FxBuildHasher),
            indexed_rows: 0,
        }
    }

    /// Returns the hashed rows.
    #[must_use]
    pub fn rows(&self) -> &TupleVector {
        &self.rows
    }

    /// Returns the number of rows with a non-null key.
    #[must_use]
    pub fn indexed_rows(&self) -> usize {
        self.indexed_rows
    }

    /// Returns the average number of rows sharing one hash, at least one.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        if self.buckets.is_empty() {
            1
        } else {
            (self.indexed_rows / self.buckets.len()).max(1)
        }
    }

    /// Returns the rows whose key equals `key`.
    pub fn lookup<'t>(
        &'t self,
        key_types: &'t KeyTypes,
        key: &'t [Value],
    ) -> impl Iterator<Item = u32> + 't {
        self.buckets
            .get(&KeyTypes::hash(key))
            .into_iter()
            .flatten()
            .copied()
            .filter(move |&row| {
                key_types
                    .key(&self.keys, row as usize)
                    .is_some_and(|candidate| KeyTypes::equal(&candidate, key))
            })
    }

    /// Marks a hashed row as matched.
    pub fn mark(&mut self, row: usize) {
        self.matched.set(row);
    }

    /// Returns the hashed rows that never matched, null keys included.
    #[must_use]
    pub fn unmatched(&self) -> SelectionVector {
        self.matched.zeros().collect()
    }
}
