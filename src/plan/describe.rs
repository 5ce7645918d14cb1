//! Plan describe and analyze output.

use std::fmt::Write;
use std::time::Duration;

use serde::Serialize;

use crate::context::{ExecutionContext, NodeData};
use crate::error::Result;

use super::{walk, NodeId, PhysicalPlan, PlanVisitor};

/// One described plan node.
#[derive(Debug, Clone, Serialize)]
pub struct DescribeRow {
    /// Node id.
    pub node_id: NodeId,
    /// Depth in the logical tree, zero for the root.
    pub depth: usize,
    /// Operator name.
    pub name: String,
    /// Operator properties.
    pub properties: Vec<(String, String)>,
    /// Runtime statistics, present once the node has run instrumented.
    pub stats: Option<NodeData>,
    /// Elapsed time minus the elapsed time of the children.
    #[serde(skip)]
    pub self_time: Option<Duration>,
}

struct DescribeVisitor<'c> {
    ctx: &'c ExecutionContext,
    rows: Vec<DescribeRow>,
}

impl PlanVisitor for DescribeVisitor<'_> {
    fn pre_visit(&mut self, plan: &PhysicalPlan, depth: usize) -> bool {
        let node_id = plan.node_id();
        let stats = self.ctx.statement().node_data(node_id);
        let self_time = stats.as_ref().map(|stats| {
            let children: Duration = plan
                .children()
                .into_iter()
                .filter_map(|child| self.ctx.statement().node_data(child.node_id()))
                .map(|child| child.elapsed)
                .sum();
            stats.elapsed.saturating_sub(children)
        });
        self.rows.push(DescribeRow {
            node_id,
            depth,
            name: plan.name().to_string(),
            properties: plan.describe_properties(self.ctx),
            stats,
            self_time,
        });
        true
    }
}

/// Describes every node of the logical tree of `plan` in pre-order.
///
/// Statistics are read from the node data of `ctx`, so describing after an
/// instrumented run includes them.
#[must_use]
pub fn describe_plan(plan: &PhysicalPlan, ctx: &ExecutionContext) -> Vec<DescribeRow> {
    let mut visitor = DescribeVisitor {
        ctx,
        rows: Vec::new(),
    };
    walk(plan, &mut visitor);
    visitor.rows
}

fn millis(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64() * 1000.0)
}

/// Renders describe rows as an aligned text table.
#[must_use]
pub fn format_describe(rows: &[DescribeRow]) -> String {
    let analyzed = rows.iter().any(|row| row.stats.is_some());
    let mut header = vec!["Id", "Operator", "Properties"];
    if analyzed {
        header.extend(["Executions", "Batches", "Rows", "Time (ms)", "Self (ms)"]);
    }

    let mut table: Vec<Vec<String>> = vec![header.iter().map(ToString::to_string).collect()];
    for row in rows {
        let properties: Vec<String> = row
            .properties
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect();
        let mut cells = vec![
            row.node_id.to_string(),
            format!("{}{}", "  ".repeat(row.depth), row.name),
            properties.join(", "),
        ];
        if analyzed {
            match &row.stats {
                Some(stats) => cells.extend([
                    stats.executions.to_string(),
                    stats.batches.to_string(),
                    stats.rows.to_string(),
                    millis(stats.elapsed),
                    row.self_time.map(millis).unwrap_or_default(),
                ]),
                None => cells.extend(std::iter::repeat(String::new()).take(5)),
            }
        }
        table.push(cells);
    }

    let widths: Vec<usize> = (0..header.len())
        .map(|column| {
            table
                .iter()
                .map(|cells| cells[column].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();
    let mut out = String::new();
    for cells in &table {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", line.join(" | ").trim_end());
    }
    out
}

/// Renders describe rows as JSON.
///
/// # Errors
///
/// Returns a serialization error if the rows cannot be encoded.
pub fn describe_json(rows: &[DescribeRow]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}
