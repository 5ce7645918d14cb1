//! Vectorized data model: columns, batches, and lazy views.

mod bitset;
mod builder;
mod populated;
mod selection;
mod tuple_vector;
mod value_vector;

pub use bitset::{BitSet, BitSetVector};
pub use builder::ValueVectorBuilder;
pub use populated::PopulatedTables;
pub use selection::{RowMapping, SelectionVector};
pub use tuple_vector::TupleVector;
pub use value_vector::{IndexedView, ValueVector};
