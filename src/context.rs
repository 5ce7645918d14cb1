//! Execution and statement contexts.
//!
//! Plan nodes are immutable and may be executed many times. Everything that
//! belongs to one execution (correlated outer rows, per-node statistics,
//! cancellation) lives in an [`ExecutionContext`].

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::executor::ExecutorConfig;
use crate::plan::NodeId;
use crate::types::Value;
use crate::vector::TupleVector;

/// Shared cancellation flag for a running query.
///
/// Cloned handles refer to the same flag, so another thread can request
/// cancellation while the query runs.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Creates a new, unset handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Which side of a hash join was hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HashedSide {
    /// The inner input was hashed.
    Inner,
    /// The outer input was hashed.
    Outer,
}

/// Operator-specific execution state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "kind")]
pub enum OperatorData {
    /// No operator-specific state.
    #[default]
    None,
    /// Hash join statistics.
    HashJoin {
        /// Side chosen to hash on the last build.
        hashed_side: Option<HashedSide>,
        /// Rows inserted into the hash table.
        hashed_rows: u64,
        /// Rows looked up in the hash table.
        probed_rows: u64,
        /// Number of hash table builds (more than one in push-outer mode).
        builds: u64,
    },
    /// Nested loop statistics.
    NestedLoop {
        /// Number of times the inner input was executed.
        inner_executions: u64,
    },
    /// Hash aggregate statistics.
    Aggregate {
        /// Number of groups produced.
        groups: u64,
    },
}

/// Per-node execution state, keyed by node id in the statement context.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeData {
    /// Number of times the node was executed.
    pub executions: u64,
    /// Number of batches produced.
    pub batches: u64,
    /// Number of rows produced.
    pub rows: u64,
    /// Wall time spent inside the node and its children.
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    /// Operator-specific state.
    pub operator: OperatorData,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_duration<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// State of one statement execution.
#[derive(Debug, Default)]
pub struct StatementContext {
    outer_tuple_vector: RefCell<Option<TupleVector>>,
    node_data: RefCell<FxHashMap<NodeId, NodeData>>,
    abort: AbortHandle,
}

impl StatementContext {
    /// Creates an empty statement context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current outer tuple vector for correlated evaluation.
    #[must_use]
    pub fn outer_tuple_vector(&self) -> Option<TupleVector> {
        self.outer_tuple_vector.borrow().clone()
    }

    /// Replaces the outer tuple vector, returning the previous one.
    pub fn set_outer_tuple_vector(&self, outer: Option<TupleVector>) -> Option<TupleVector> {
        self.outer_tuple_vector.replace(outer)
    }

    /// Runs `f` on the node data of `node_id`, creating it on first use.
    pub fn with_node_data<R>(&self, node_id: NodeId, f: impl FnOnce(&mut NodeData) -> R) -> R {
        let mut map = self.node_data.borrow_mut();
        f(map.entry(node_id).or_default())
    }

    /// Returns a snapshot of the node data of `node_id`.
    #[must_use]
    pub fn node_data(&self, node_id: NodeId) -> Option<NodeData> {
        self.node_data.borrow().get(&node_id).cloned()
    }
}

/// Context passed to every operator and expression of one query execution.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    config: ExecutorConfig,
    statement: StatementContext,
}

impl ExecutionContext {
    /// Creates a context with the given configuration.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        ExecutionContext {
            config,
            statement: StatementContext::new(),
        }
    }

    /// Returns the executor configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Returns the statement context.
    #[must_use]
    pub fn statement(&self) -> &StatementContext {
        &self.statement
    }

    /// Returns a session property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.config.properties.get(name)
    }

    /// Returns a handle that can cancel this execution.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.statement.abort.clone()
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn abort_query(&self) -> bool {
        self.statement.abort.is_aborted()
    }

    /// Sets `outer` as the outer tuple vector until the guard is dropped.
    #[must_use]
    pub fn push_outer(&self, outer: TupleVector) -> OuterGuard<'_> {
        let previous = self.statement.set_outer_tuple_vector(Some(outer));
        OuterGuard {
            context: self,
            previous,
        }
    }
}

/// Restores the previous outer tuple vector when dropped.
#[derive(Debug)]
pub struct OuterGuard<'a> {
    context: &'a ExecutionContext,
    previous: Option<TupleVector>,
}

impl Drop for OuterGuard<'_> {
    fn drop(&mut self) {
        self.context
            .statement
            .set_outer_tuple_vector(self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_data_created_lazily() {
        let ctx = ExecutionContext::default();
        assert!(ctx.statement().node_data(1).is_none());
        ctx.statement().with_node_data(1, |d| d.rows += 5);
        ctx.statement().with_node_data(1, |d| d.rows += 2);
        assert_eq!(ctx.statement().node_data(1).unwrap().rows, 7);
    }

    #[test]
    fn test_outer_guard_restores_previous() {
        let ctx = ExecutionContext::default();
        {
            let _outer = ctx.push_outer(TupleVector::constant(1));
            assert_eq!(ctx.statement().outer_tuple_vector().unwrap().row_count(), 1);
            {
                let _inner = ctx.push_outer(TupleVector::constant(2));
                assert_eq!(ctx.statement().outer_tuple_vector().unwrap().row_count(), 2);
            }
            assert_eq!(ctx.statement().outer_tuple_vector().unwrap().row_count(), 1);
        }
        assert!(ctx.statement().outer_tuple_vector().is_none());
    }

    #[test]
    fn test_abort_handle_is_shared() {
        let ctx = ExecutionContext::default();
        let handle = ctx.abort_handle();
        assert!(!ctx.abort_query());
        handle.abort();
        assert!(ctx.abort_query());
    }
}
