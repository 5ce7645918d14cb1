//! Plan tree rewriting and traversal.

use crate::error::Result;
use crate::executor::Analyze;

use super::PhysicalPlan;

/// Result of a rewrite step.
#[derive(Debug)]
pub enum Transformed<T> {
    /// The node was replaced.
    Yes(T),
    /// The node is unchanged.
    No(T),
}

impl<T> Transformed<T> {
    /// Returns the inner value.
    pub fn into_inner(self) -> T {
        match self {
            Transformed::Yes(v) | Transformed::No(v) => v,
        }
    }

    /// Returns true if the node was replaced.
    #[must_use]
    pub fn was_transformed(&self) -> bool {
        matches!(self, Transformed::Yes(_))
    }
}

/// Rewrites one plan node at a time.
pub trait PlanRewriter: Send + Sync {
    /// Returns the name of this rewriter.
    fn name(&self) -> &str;

    /// Rewrites `plan`, whose children have already been rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the node cannot be rewritten.
    fn rewrite(&self, plan: PhysicalPlan) -> Result<Transformed<PhysicalPlan>>;
}

/// Applies `rewriter` to every node, children before parents.
///
/// # Errors
///
/// Returns the first error raised by the rewriter.
pub fn transform_up(
    plan: PhysicalPlan,
    rewriter: &dyn PlanRewriter,
) -> Result<Transformed<PhysicalPlan>> {
    let children = plan.map_children(&mut |child| transform_up(child, rewriter))?;
    let children_changed = children.was_transformed();
    let node = rewriter.rewrite(children.into_inner())?;
    Ok(match node {
        Transformed::No(plan) if children_changed => Transformed::Yes(plan),
        node => node,
    })
}

/// Wraps every node in an [`Analyze`] decorator.
///
/// Applying it to an already instrumented plan leaves it unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnalyzeRewriter;

impl PlanRewriter for AnalyzeRewriter {
    fn name(&self) -> &str {
        "analyze"
    }

    fn rewrite(&self, plan: PhysicalPlan) -> Result<Transformed<PhysicalPlan>> {
        Ok(match plan {
            // The wrapped node was instrumented on the way up.
            PhysicalPlan::Analyze(analyze) if analyze.input().is_analyze() => {
                Transformed::No(analyze.into_input())
            }
            PhysicalPlan::Analyze(analyze) => Transformed::No(PhysicalPlan::Analyze(analyze)),
            plan => Transformed::Yes(Analyze::new(plan).into()),
        })
    }
}

/// Removes every [`Analyze`] decorator.
#[derive(Debug, Default, Clone, Copy)]
pub struct StripAnalyzeRewriter;

impl PlanRewriter for StripAnalyzeRewriter {
    fn name(&self) -> &str {
        "strip_analyze"
    }

    fn rewrite(&self, plan: PhysicalPlan) -> Result<Transformed<PhysicalPlan>> {
        Ok(match plan {
            PhysicalPlan::Analyze(analyze) => Transformed::Yes(analyze.into_input()),
            plan => Transformed::No(plan),
        })
    }
}

/// Visits plan nodes in pre-order.
pub trait PlanVisitor {
    /// Called before the children of `plan`. Returning false skips them.
    fn pre_visit(&mut self, plan: &PhysicalPlan, depth: usize) -> bool;

    /// Called after the children of `plan`.
    fn post_visit(&mut self, _plan: &PhysicalPlan, _depth: usize) {}
}

/// Walks the logical tree of `plan`; [`Analyze`] decorators are not visited.
pub fn walk(plan: &PhysicalPlan, visitor: &mut dyn PlanVisitor) {
    walk_at(plan.logical(), 0, visitor);
}

fn walk_at(plan: &PhysicalPlan, depth: usize, visitor: &mut dyn PlanVisitor) {
    if visitor.pre_visit(plan, depth) {
        for child in plan.children() {
            walk_at(child.logical(), depth + 1, visitor);
        }
    }
    visitor.post_visit(plan, depth);
}
