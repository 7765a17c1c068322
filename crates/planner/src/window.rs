//! Window-function extraction.
//!
//! Projection and sort stages may reference window functions anywhere inside
//! their expression lists. Execution wants them in a dedicated windowing
//! stage, so these rules hoist every distinct window function into a
//! [`LogicalPlan::Window`] node and rewrite the original expressions to
//! reference the hoisted results by alias.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use slate_common::{Result, SlateError};
use tracing::debug;

use crate::analyzer::{AnalyzerRule, SchemaProvider};
use crate::logical_plan::{Expr, LogicalPlan, SortExpr, WindowFunction};
use crate::transform::{plan_contains, transform_expr_down, transform_plan_down, try_map_plan_children};

/// Generates session-unique alias names for hoisted window functions.
///
/// Names are unique within one analysis session (one `Analyzer`), not
/// globally persistent.
#[derive(Debug, Default)]
pub struct WindowAliasGenerator {
    next: AtomicU64,
}

impl WindowAliasGenerator {
    pub fn next_name(&self) -> String {
        format!("__window_{}", self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Collect every distinct window function in `expr`, in first-seen order.
/// Distinctness is structural equality, so textually identical window calls
/// collapse into one computation.
fn collect_window_functions(expr: &Expr, out: &mut Vec<WindowFunction>) {
    match expr {
        Expr::WindowFunction(w) => {
            if !out.contains(w) {
                out.push(w.clone());
            }
        }
        Expr::Column(_) | Expr::ColumnRef { .. } | Expr::Literal(_) => {}
        Expr::BinaryOp { left, right, .. } => {
            collect_window_functions(left, out);
            collect_window_functions(right, out);
        }
        Expr::InList { expr, list, .. } => {
            collect_window_functions(expr, out);
            for e in list {
                collect_window_functions(e, out);
            }
        }
        Expr::Cast { expr, .. } => collect_window_functions(expr, out),
        Expr::And(a, b) | Expr::Or(a, b) => {
            collect_window_functions(a, out);
            collect_window_functions(b, out);
        }
        Expr::Not(e) => collect_window_functions(e, out),
        Expr::Alias { expr, .. } => collect_window_functions(expr, out),
    }
}

/// Replace every occurrence of a collected window function with a reference
/// to its alias, top-down over the whole expression tree.
fn substitute_windows(expr: Expr, mapping: &[(WindowFunction, String)]) -> Expr {
    transform_expr_down(expr, &mut |e| match e {
        Expr::WindowFunction(w) => mapping
            .iter()
            .find(|(m, _)| m == w)
            .map(|(_, name)| Expr::Column(name.clone())),
        _ => None,
    })
}

fn alias_exprs(mapping: &[(WindowFunction, String)]) -> Vec<Expr> {
    mapping
        .iter()
        .map(|(w, name)| Expr::Alias {
            expr: Box::new(Expr::WindowFunction(w.clone())),
            name: name.clone(),
        })
        .collect()
}

/// Hoists window functions out of projection lists:
/// `Projection(exprs)` becomes `Window(aliases) <- Projection(rewritten)`.
///
/// Matches only projections whose child is fully resolved and whose
/// expression list contains at least one window function; everything else is
/// left untouched.
pub struct ExtractWindowFromProjection {
    aliases: Arc<WindowAliasGenerator>,
}

impl ExtractWindowFromProjection {
    pub fn new(aliases: Arc<WindowAliasGenerator>) -> Self {
        Self { aliases }
    }
}

impl AnalyzerRule for ExtractWindowFromProjection {
    fn name(&self) -> &str {
        "extract_window_from_projection"
    }

    fn rewrite(&self, plan: LogicalPlan, _ctx: &dyn SchemaProvider) -> Result<LogicalPlan> {
        Ok(transform_plan_down(plan, &mut |p| match p {
            LogicalPlan::Projection { exprs, input }
                if input.is_resolved()
                    && exprs.iter().any(|(e, _)| e.contains_window_function()) =>
            {
                let mut windows = vec![];
                for (e, _) in exprs {
                    collect_window_functions(e, &mut windows);
                }
                let mapping: Vec<(WindowFunction, String)> = windows
                    .into_iter()
                    .map(|w| (w, self.aliases.next_name()))
                    .collect();
                debug!(windows = mapping.len(), "hoisting window functions out of projection");

                let rewritten = exprs
                    .iter()
                    .map(|(e, name)| (substitute_windows(e.clone(), &mapping), name.clone()))
                    .collect();
                Some(LogicalPlan::Projection {
                    exprs: rewritten,
                    input: Box::new(LogicalPlan::Window {
                        exprs: alias_exprs(&mapping),
                        input: input.clone(),
                    }),
                })
            }
            _ => None,
        }))
    }
}

/// Hoists window functions out of sort keys:
/// `Sort(order)` becomes
/// `Window(aliases) <- Sort(rewritten order) <- Projection(child columns)`,
/// where the trailing projection restores the child's original column set and
/// hides the synthetic window columns from downstream stages.
///
/// Refuses to rewrite anything while an unresolved-aggregate marker exists
/// anywhere in the tree: window functions over an unresolved aggregate cannot
/// yet be typed. That deferral is a soft precondition, not an error; a later
/// pass retries after aggregate resolution has cleared the marker.
pub struct ExtractWindowFromSort {
    aliases: Arc<WindowAliasGenerator>,
}

impl ExtractWindowFromSort {
    pub fn new(aliases: Arc<WindowAliasGenerator>) -> Self {
        Self { aliases }
    }

    fn hoist(&self, plan: LogicalPlan, ctx: &dyn SchemaProvider) -> Result<LogicalPlan> {
        let plan = match plan {
            LogicalPlan::Sort { order, input }
                if input.is_resolved()
                    && order.iter().any(|s| s.expr.contains_window_function()) =>
            {
                let restored = plan_output_names(&input, ctx)?;

                let mut windows = vec![];
                for s in &order {
                    collect_window_functions(&s.expr, &mut windows);
                }
                let mapping: Vec<(WindowFunction, String)> = windows
                    .into_iter()
                    .map(|w| (w, self.aliases.next_name()))
                    .collect();
                debug!(windows = mapping.len(), "hoisting window functions out of sort keys");

                let new_order = order
                    .iter()
                    .map(|s| SortExpr {
                        expr: substitute_windows(s.expr.clone(), &mapping),
                        ascending: s.ascending,
                    })
                    .collect();

                LogicalPlan::Projection {
                    exprs: restored
                        .into_iter()
                        .map(|c| (Expr::Column(c.clone()), c))
                        .collect(),
                    input: Box::new(LogicalPlan::Sort {
                        order: new_order,
                        input: Box::new(LogicalPlan::Window {
                            exprs: alias_exprs(&mapping),
                            input,
                        }),
                    }),
                }
            }
            other => other,
        };
        try_map_plan_children(plan, &mut |child| self.hoist(child, ctx))
    }
}

impl AnalyzerRule for ExtractWindowFromSort {
    fn name(&self) -> &str {
        "extract_window_from_sort"
    }

    fn rewrite(&self, plan: LogicalPlan, ctx: &dyn SchemaProvider) -> Result<LogicalPlan> {
        // Whole-tree guard: while any unresolved aggregate remains, even
        // unrelated Sort stages stay untouched for this pass.
        if plan_contains(&plan, &|p| {
            matches!(p, LogicalPlan::UnresolvedAggregate { .. })
        }) {
            debug!("unresolved aggregate present; deferring sort-window extraction");
            return Ok(plan);
        }
        self.hoist(plan, ctx)
    }
}

/// Output column names of a plan, in output order.
fn plan_output_names(plan: &LogicalPlan, ctx: &dyn SchemaProvider) -> Result<Vec<String>> {
    match plan {
        LogicalPlan::TableScan {
            table, projection, ..
        } => match projection {
            Some(cols) => Ok(cols.clone()),
            None => Ok(ctx
                .table_schema(table)?
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect()),
        },
        LogicalPlan::Filter { input, .. }
        | LogicalPlan::Sort { input, .. }
        | LogicalPlan::Limit { input, .. } => plan_output_names(input, ctx),
        LogicalPlan::Projection { exprs, .. } => {
            Ok(exprs.iter().map(|(_, n)| n.clone()).collect())
        }
        LogicalPlan::Window { exprs, input } => {
            let mut names = plan_output_names(input, ctx)?;
            for e in exprs {
                match e {
                    Expr::Alias { name, .. } => names.push(name.clone()),
                    other => {
                        return Err(SlateError::Planning(format!(
                            "window stage expression must be aliased, got {other:?}"
                        )));
                    }
                }
            }
            Ok(names)
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            ..
        }
        | LogicalPlan::UnresolvedAggregate {
            group_exprs,
            aggr_exprs,
            ..
        } => {
            let mut names: Vec<String> = group_exprs
                .iter()
                .map(|e| crate::analyzer::expr_name(e).to_string())
                .collect();
            names.extend(aggr_exprs.iter().map(|(_, n)| n.clone()));
            Ok(names)
        }
    }
}
