//! vexec - Vectorized Query Execution
//!
//! A pull-based physical plan executor over columnar batches. Operators
//! form an immutable [`PhysicalPlan`] tree; executing a node yields a
//! [`TupleIterator`] of [`TupleVector`] batches. Joins come in two
//! flavours: [`NestedLoop`] and the adaptive [`HashMatch`], which picks the
//! side to hash from the estimated input sizes.

pub mod context;
pub mod datasource;
pub mod error;
pub mod executor;
pub mod expression;
pub mod plan;
pub mod types;
pub mod vector;

pub use context::{AbortHandle, ExecutionContext, HashedSide, NodeData, OperatorData};
pub use datasource::{Datasource, DatasourceOptions, DatasourceRef, MemoryDatasource};
pub use error::{Result, VexecError};
pub use executor::{
    Analyze, Assert, Concatenation, ConstantScan, ExecutorConfig, Filter, HashAggregate,
    HashMatch, JoinType, Limit, NestedLoop, PhysicalOperator, Projection, QueryExecutor, Sort,
    SortItem, TableScan, TupleIterator, TupleIteratorRef,
};
pub use expression::{Expression, ExpressionRef, ScalarExpression};
pub use plan::{NodeId, PhysicalPlan};
pub use types::{Column, DataType, Schema, SchemaRef, TableSourceReference, Value};
pub use vector::{BitSetVector, SelectionVector, TupleVector, ValueVector};
