//! Hash match join operator.
//!
//! The join runs as a state machine per execution:
//!
//! ```text
//! Start -> HashInner -> ProbeOuter -> NextBatch -> ProbeOuter ... -> End
//!       -> HashOuter -> ProbeInner -> NextBatch -> ProbeInner ... -> End
//! ```
//!
//! `Start` picks the side to hash from the row count hints of both inputs.
//! In push-outer-reference mode every outer batch is pushed as outer tuple
//! vector, the inner plan is executed against it and `NextBatch` returns to
//! `Start` for the next outer batch.

mod hash_table;

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::context::{ExecutionContext, HashedSide, OperatorData};
use crate::error::Result;
use crate::executor::nested_loop::{null_fill_schema, null_filled};
use crate::executor::{
    collect_batches, materialize, no_such_element, BatchIterator, DescribeProperties, JoinType,
    PhysicalOperator, TupleIterator, TupleIteratorRef,
};
use crate::expression::ExpressionRef;
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::{Column, DataType, SchemaRef};
use crate::vector::{SelectionVector, TupleVector, ValueVector};

pub use hash_table::{JoinHashTable, KeyTypes};

use hash_table::eval_keys;

/// Chooses the side to hash from the row count estimates of both inputs.
///
/// The inner side is hashed when it is known to be smaller, when its size
/// is unknown but the outer side reaches `threshold` rows, or when the
/// outer size is unknown and the inner side stays within `threshold`.
#[must_use]
pub fn choose_hashed_side(
    outer_estimate: Option<usize>,
    inner_estimate: Option<usize>,
    threshold: usize,
) -> HashedSide {
    let hash_inner = match (outer_estimate, inner_estimate) {
        (Some(outer), Some(inner)) => inner < outer,
        (Some(outer), None) => outer >= threshold,
        (None, Some(inner)) => inner <= threshold,
        (None, None) => false,
    };
    if hash_inner {
        HashedSide::Inner
    } else {
        HashedSide::Outer
    }
}

/// Equi-join on key expressions with an optional residual condition.
///
/// The output never depends on which side was hashed: inner joins emit every
/// matching pair, left joins additionally emit each unmatched outer row once
/// with null inner columns, and populate mode groups the matching inner rows
/// of every outer row into one nested table column.
#[derive(Debug, Clone)]
pub struct HashMatch {
    node_id: NodeId,
    pub(crate) outer: Box<PhysicalPlan>,
    pub(crate) inner: Box<PhysicalPlan>,
    outer_keys: Vec<ExpressionRef>,
    inner_keys: Vec<ExpressionRef>,
    key_types: KeyTypes,
    join_type: JoinType,
    condition: Option<ExpressionRef>,
    populate_alias: Option<String>,
    push_outer_reference: bool,
}

impl HashMatch {
    /// Creates a hash join matching `outer_keys` against `inner_keys`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the key lists differ in length or are
    /// empty.
    pub fn new(
        node_id: NodeId,
        outer: PhysicalPlan,
        inner: PhysicalPlan,
        outer_keys: Vec<ExpressionRef>,
        inner_keys: Vec<ExpressionRef>,
        join_type: JoinType,
    ) -> Result<Self> {
        let key_types = KeyTypes::new(&outer_keys, &inner_keys)?;
        Ok(HashMatch {
            node_id,
            outer: Box::new(outer),
            inner: Box::new(inner),
            outer_keys,
            inner_keys,
            key_types,
            join_type,
            condition: None,
            populate_alias: None,
            push_outer_reference: false,
        })
    }

    /// Sets a residual condition evaluated over candidate pairs.
    #[must_use]
    pub fn with_condition(mut self, condition: ExpressionRef) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Groups the matching inner rows of each outer row into one nested
    /// table column named `alias`.
    #[must_use]
    pub fn with_populate_alias(mut self, alias: impl Into<String>) -> Self {
        self.populate_alias = Some(alias.into());
        self
    }

    /// Re-executes the inner plan for every outer batch, with the batch
    /// pushed as outer tuple vector.
    #[must_use]
    pub fn with_push_outer_reference(mut self) -> Self {
        self.push_outer_reference = true;
        self
    }

    fn record(&self, ctx: &ExecutionContext, f: impl FnOnce(&mut HashJoinStats)) {
        ctx.statement().with_node_data(self.node_id, |data| {
            let mut stats = match data.operator {
                OperatorData::HashJoin {
                    hashed_side,
                    hashed_rows,
                    probed_rows,
                    builds,
                } => HashJoinStats {
                    hashed_side,
                    hashed_rows,
                    probed_rows,
                    builds,
                },
                _ => HashJoinStats::default(),
            };
            f(&mut stats);
            data.operator = OperatorData::HashJoin {
                hashed_side: stats.hashed_side,
                hashed_rows: stats.hashed_rows,
                probed_rows: stats.probed_rows,
                builds: stats.builds,
            };
        });
    }

    fn hashed_keys(&self, side: HashedSide) -> &[ExpressionRef] {
        match side {
            HashedSide::Inner => &self.inner_keys,
            HashedSide::Outer => &self.outer_keys,
        }
    }

    fn probe_keys(&self, side: HashedSide) -> &[ExpressionRef] {
        match side {
            HashedSide::Inner => &self.outer_keys,
            HashedSide::Outer => &self.inner_keys,
        }
    }
}

#[derive(Debug, Default)]
struct HashJoinStats {
    hashed_side: Option<HashedSide>,
    hashed_rows: u64,
    probed_rows: u64,
    builds: u64,
}

impl PhysicalOperator for HashMatch {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Hash match"
    }

    fn schema(&self) -> SchemaRef {
        let outer = self.outer.schema();
        Arc::new(match &self.populate_alias {
            Some(alias) => outer.with_column(Column::new(alias.as_str(), DataType::Table)),
            None => outer.concat(&self.inner.schema()),
        })
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        vec![self.outer.as_ref(), self.inner.as_ref()]
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        let outer = self.outer.execute(ctx)?;
        let (driver, round) = if self.push_outer_reference {
            (Some(outer), None)
        } else {
            (
                None,
                Some(Round {
                    outer,
                    inner: self.inner.execute(ctx)?,
                }),
            )
        };
        Ok(Box::new(HashMatchIterator {
            join: self,
            ctx,
            state: State::Start,
            driver,
            round,
            side: HashedSide::Inner,
            table: None,
            populated: Vec::new(),
            inner_schema: None,
            output: VecDeque::new(),
        }))
    }

    fn describe_properties(&self, ctx: &ExecutionContext) -> DescribeProperties {
        let keys = |keys: &[ExpressionRef]| {
            keys.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut properties = vec![
            ("Join type".to_string(), self.join_type.to_string()),
            ("Outer keys".to_string(), keys(&self.outer_keys)),
            ("Inner keys".to_string(), keys(&self.inner_keys)),
        ];
        if let Some(condition) = &self.condition {
            properties.push(("Condition".to_string(), condition.to_string()));
        }
        if let Some(alias) = &self.populate_alias {
            properties.push(("Populate alias".to_string(), alias.clone()));
        }
        if self.push_outer_reference {
            properties.push(("Push outer reference".to_string(), "true".to_string()));
        }
        if let Some(data) = ctx.statement().node_data(self.node_id) {
            if let OperatorData::HashJoin {
                hashed_side: Some(side),
                ..
            } = data.operator
            {
                properties.push(("Hashed side".to_string(), format!("{side:?}")));
            }
        }
        properties
    }
}

/// States of the join state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    HashInner,
    HashOuter,
    ProbeOuter,
    ProbeInner,
    NextBatch,
    End,
}

/// Inputs joined by one pass of the state machine.
struct Round<'a> {
    outer: TupleIteratorRef<'a>,
    inner: TupleIteratorRef<'a>,
}

impl Round<'_> {
    fn close(&mut self) {
        self.outer.close();
        self.inner.close();
    }
}

/// Matching pairs of probe rows and hashed rows.
struct Pairs {
    probe: SelectionVector,
    hashed: SelectionVector,
}

struct HashMatchIterator<'a> {
    join: &'a HashMatch,
    ctx: &'a ExecutionContext,
    state: State,
    /// Outer input in push-outer-reference mode, one round per batch.
    driver: Option<TupleIteratorRef<'a>>,
    round: Option<Round<'a>>,
    side: HashedSide,
    table: Option<JoinHashTable>,
    /// Matching inner rows per hashed outer row, when populating.
    populated: Vec<Vec<TupleVector>>,
    inner_schema: Option<SchemaRef>,
    output: VecDeque<TupleVector>,
}

impl HashMatchIterator<'_> {
    fn step(&mut self) -> Result<()> {
        self.state = match self.state {
            State::Start => self.start()?,
            State::HashInner => self.hash(HashedSide::Inner)?,
            State::HashOuter => self.hash(HashedSide::Outer)?,
            State::ProbeOuter | State::ProbeInner => self.probe_next()?,
            State::NextBatch => self.next_batch()?,
            State::End => State::End,
        };
        Ok(())
    }

    fn start(&mut self) -> Result<State> {
        if let Some(driver) = &mut self.driver {
            if !driver.has_next()? {
                driver.close();
                return Ok(State::End);
            }
            let batch = driver.next()?;
            let inner = {
                let _outer = self.ctx.push_outer(batch.clone());
                collect_batches(self.join.inner.execute(self.ctx)?)?
            };
            self.round = Some(Round {
                outer: Box::new(BatchIterator::single(batch)),
                inner: Box::new(BatchIterator::new(inner)),
            });
        }
        let Some(round) = &self.round else {
            return Ok(State::End);
        };
        let outer_estimate = round.outer.estimated_row_count();
        let inner_estimate = round.inner.estimated_row_count();
        let side = choose_hashed_side(
            outer_estimate,
            inner_estimate,
            self.ctx.config().hash_inner_threshold,
        );
        debug!(
            node_id = self.join.node_id,
            ?outer_estimate,
            ?inner_estimate,
            hashed = ?side,
            "hash match side chosen"
        );
        self.side = side;
        self.join.record(self.ctx, |stats| {
            stats.hashed_side = Some(side);
            stats.builds += 1;
        });
        Ok(match side {
            HashedSide::Inner => State::HashInner,
            HashedSide::Outer => State::HashOuter,
        })
    }

    fn hash(&mut self, side: HashedSide) -> Result<State> {
        let Some(round) = &mut self.round else {
            return Ok(State::End);
        };
        let (source, planned) = match side {
            HashedSide::Inner => (&mut round.inner, &self.join.inner),
            HashedSide::Outer => (&mut round.outer, &self.join.outer),
        };
        let rows = materialize(source.as_mut())?;
        source.close();
        if side == HashedSide::Inner {
            if let Some(rows) = &rows {
                self.inner_schema = Some(rows.schema().clone());
            }
        }
        let table = match rows {
            Some(rows) => {
                let keys = eval_keys(self.join.hashed_keys(side), &rows, self.ctx)?;
                JoinHashTable::build(rows, keys, &self.join.key_types)?
            }
            None => JoinHashTable::empty(TupleVector::empty(planned.schema())),
        };
        trace!(
            node_id = self.join.node_id,
            rows = table.rows().row_count(),
            indexed = table.indexed_rows(),
            "hash table built"
        );
        let hashed_rows = table.rows().row_count() as u64;
        self.join.record(self.ctx, |stats| stats.hashed_rows += hashed_rows);
        if side == HashedSide::Outer && self.join.populate_alias.is_some() {
            self.populated = vec![Vec::new(); table.rows().row_count()];
        }
        self.table = Some(table);
        Ok(match side {
            HashedSide::Inner => State::ProbeOuter,
            HashedSide::Outer => State::ProbeInner,
        })
    }

    /// Probes the hash table with the next batch of the probe side.
    fn probe_next(&mut self) -> Result<State> {
        let Some(round) = &mut self.round else {
            return Ok(State::End);
        };
        let source = match self.side {
            HashedSide::Inner => &mut round.outer,
            HashedSide::Outer => &mut round.inner,
        };
        if source.has_next()? {
            let batch = source.next()?;
            if self.side == HashedSide::Outer {
                self.inner_schema = Some(batch.schema().clone());
            }
            self.probe(&batch)?;
        }
        Ok(State::NextBatch)
    }

    /// Finds the pairs of `probe` rows and hashed rows that join.
    fn matching_pairs(&self, probe: &TupleVector, table: &JoinHashTable) -> Result<Pairs> {
        let join = self.join;
        let key_types = &join.key_types;
        let keys = eval_keys(join.probe_keys(self.side), probe, self.ctx)?;
        let probe_rows = probe.row_count();
        let hashed_rows = table.rows().row_count();
        let capacity = (probe_rows * table.cardinality()).min(probe_rows * hashed_rows / 10);
        let mut pairs = Pairs {
            probe: SelectionVector::with_capacity(capacity),
            hashed: SelectionVector::with_capacity(capacity),
        };
        for row in 0..probe_rows {
            let Some(key) = key_types.key(&keys, row) else {
                continue;
            };
            for hashed in table.lookup(key_types, &key) {
                pairs.probe.push(row);
                pairs.hashed.push(hashed as usize);
            }
        }
        let probed = probe_rows as u64;
        self.join.record(self.ctx, |stats| stats.probed_rows += probed);

        let Some(condition) = &self.join.condition else {
            return Ok(pairs);
        };
        if pairs.probe.is_empty() {
            return Ok(pairs);
        }
        let view = self.pair_view(probe, table, &pairs)?;
        let selection = condition.eval(&view, self.ctx)?.to_bitset()?.to_selection();
        Ok(Pairs {
            probe: selection
                .iter()
                .filter_map(|i| pairs.probe.get(i))
                .map(|r| r as usize)
                .collect(),
            hashed: selection
                .iter()
                .filter_map(|i| pairs.hashed.get(i))
                .map(|r| r as usize)
                .collect(),
        })
    }

    /// Combined view of the pairs, outer columns first.
    fn pair_view(
        &self,
        probe: &TupleVector,
        table: &JoinHashTable,
        pairs: &Pairs,
    ) -> Result<TupleVector> {
        let probe = probe.select(&pairs.probe);
        let hashed = table.rows().select(&pairs.hashed);
        match self.side {
            HashedSide::Inner => TupleVector::combine(&probe, &hashed),
            HashedSide::Outer => TupleVector::combine(&hashed, &probe),
        }
    }

    fn probe(&mut self, batch: &TupleVector) -> Result<()> {
        let Some(mut table) = self.table.take() else {
            return Ok(());
        };
        let result = self.probe_with(batch, &mut table);
        self.table = Some(table);
        result
    }

    fn probe_with(&mut self, batch: &TupleVector, table: &mut JoinHashTable) -> Result<()> {
        let join = self.join;
        let pairs = self.matching_pairs(batch, table)?;
        match (self.side, &join.populate_alias) {
            (HashedSide::Inner, Some(alias)) => {
                let mut tables: Vec<Option<TupleVector>> = vec![None; batch.row_count()];
                for (row, selection) in group_pairs(&pairs.probe, &pairs.hashed) {
                    tables[row] = Some(table.rows().select(&selection));
                }
                self.emit_populated(batch, tables, alias)?;
            }
            (HashedSide::Outer, Some(_)) => {
                for (row, selection) in group_pairs(&pairs.hashed, &pairs.probe) {
                    table.mark(row);
                    self.populated[row].push(batch.select(&selection));
                }
            }
            (side, None) => {
                if !pairs.probe.is_empty() {
                    self.output.push_back(self.pair_view(batch, table, &pairs)?);
                }
                match side {
                    HashedSide::Outer => {
                        pairs.hashed.iter().for_each(|row| table.mark(row));
                    }
                    HashedSide::Inner if join.join_type == JoinType::Left => {
                        let mut matched = vec![false; batch.row_count()];
                        pairs.probe.iter().for_each(|row| matched[row] = true);
                        let unmatched: SelectionVector = matched
                            .iter()
                            .enumerate()
                            .filter(|(_, m)| !**m)
                            .map(|(row, _)| row)
                            .collect();
                        if !unmatched.is_empty() {
                            let schema = self.inner_null_schema();
                            self.output
                                .push_back(null_filled(batch, &unmatched, schema)?);
                        }
                    }
                    HashedSide::Inner => {}
                }
            }
        }
        Ok(())
    }

    /// Emits the rows of the hashed outer side once every inner batch has
    /// been probed.
    fn finish_round(&mut self) -> Result<()> {
        if self.side != HashedSide::Outer {
            return Ok(());
        }
        let Some(table) = self.table.take() else {
            return Ok(());
        };
        let join = self.join;
        if let Some(alias) = &join.populate_alias {
            let tables = std::mem::take(&mut self.populated)
                .into_iter()
                .map(|parts| {
                    if parts.is_empty() {
                        Ok(None)
                    } else {
                        TupleVector::concat(&parts).map(Some)
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            return self.emit_populated(table.rows(), tables, alias);
        }
        if join.join_type == JoinType::Left {
            let unmatched = table.unmatched();
            if !unmatched.is_empty() {
                let schema = self.inner_null_schema();
                self.output
                    .push_back(null_filled(table.rows(), &unmatched, schema)?);
            }
        }
        Ok(())
    }

    fn emit_populated(
        &mut self,
        outer: &TupleVector,
        tables: Vec<Option<TupleVector>>,
        alias: &str,
    ) -> Result<()> {
        let keep: SelectionVector = match self.join.join_type {
            JoinType::Inner => tables
                .iter()
                .enumerate()
                .filter(|(_, t)| t.is_some())
                .map(|(row, _)| row)
                .collect(),
            JoinType::Left => SelectionVector::all(tables.len()),
        };
        if keep.is_empty() {
            return Ok(());
        }
        let rows = tables.len();
        let batch = outer.with_column(
            Column::new(alias, DataType::Table),
            ValueVector::tables(tables),
        )?;
        self.output.push_back(if keep.len() == rows {
            batch
        } else {
            batch.select(&keep)
        });
        Ok(())
    }

    fn inner_null_schema(&self) -> SchemaRef {
        null_fill_schema(self.inner_schema.as_ref(), &self.join.inner.schema())
    }

    fn next_batch(&mut self) -> Result<State> {
        let Some(round) = &mut self.round else {
            return Ok(State::End);
        };
        let exhausted = match self.side {
            HashedSide::Inner => !round.outer.has_next()?,
            HashedSide::Outer => !round.inner.has_next()?,
        };
        if !exhausted {
            return Ok(match self.side {
                HashedSide::Inner => State::ProbeOuter,
                HashedSide::Outer => State::ProbeInner,
            });
        }
        round.close();
        self.finish_round()?;
        self.round = None;
        self.table = None;
        Ok(if self.driver.is_some() {
            State::Start
        } else {
            State::End
        })
    }
}

/// Groups pairs by their first component, in order of first appearance.
fn group_pairs(keys: &SelectionVector, values: &SelectionVector) -> Vec<(usize, SelectionVector)> {
    let mut positions: FxHashMap<usize, usize> = FxHashMap::default();
    let mut groups: Vec<(usize, SelectionVector)> = Vec::new();
    for (key, value) in keys.iter().zip(values.iter()) {
        let position = *positions.entry(key).or_insert_with(|| {
            groups.push((key, SelectionVector::with_capacity(1)));
            groups.len() - 1
        });
        groups[position].1.push(value);
    }
    groups
}

impl TupleIterator for HashMatchIterator<'_> {
    fn has_next(&mut self) -> Result<bool> {
        while self.output.is_empty() {
            if self.state == State::End {
                return Ok(false);
            }
            if self.ctx.abort_query() {
                debug!(node_id = self.join.node_id, state = ?self.state, "hash match aborted");
                self.close();
                return Ok(false);
            }
            self.step()?;
        }
        Ok(true)
    }

    fn next(&mut self) -> Result<TupleVector> {
        self.output
            .pop_front()
            .ok_or_else(|| no_such_element("HashMatch"))
    }

    fn close(&mut self) {
        self.state = State::End;
        self.output.clear();
        self.table = None;
        if let Some(mut round) = self.round.take() {
            round.close();
        }
        if let Some(driver) = &mut self.driver {
            driver.close();
        }
    }
}
