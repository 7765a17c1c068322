//! Tree-rewrite combinators shared by all analysis rules.
//!
//! A rule is a partial rewrite function: it returns `Some(new_node)` for
//! shapes it matches and `None` everywhere else. The traversal is top-down
//! and deterministic: a node is rewritten before its children are visited,
//! and traversal continues on the (possibly new) children afterward.
//! Unmatched nodes are kept structurally identical.

use slate_common::Result;

use crate::logical_plan::{Expr, LogicalPlan, SortExpr};

/// Rewrite every matching subtree of `plan`, top-down.
pub fn transform_plan_down<F>(plan: LogicalPlan, rule: &mut F) -> LogicalPlan
where
    F: FnMut(&LogicalPlan) -> Option<LogicalPlan>,
{
    let plan = match rule(&plan) {
        Some(rewritten) => rewritten,
        None => plan,
    };
    map_plan_children(plan, &mut |child| transform_plan_down(child, rule))
}

/// Rewrite every matching subtree of `expr`, top-down.
pub fn transform_expr_down<F>(expr: Expr, rule: &mut F) -> Expr
where
    F: FnMut(&Expr) -> Option<Expr>,
{
    let expr = match rule(&expr) {
        Some(rewritten) => rewritten,
        None => expr,
    };
    map_expr_children(expr, &mut |child| transform_expr_down(child, rule))
}

/// Rebuild a plan node with `f` applied to each direct child plan.
pub fn map_plan_children<F>(plan: LogicalPlan, f: &mut F) -> LogicalPlan
where
    F: FnMut(LogicalPlan) -> LogicalPlan,
{
    match plan {
        LogicalPlan::TableScan { .. } => plan,
        LogicalPlan::Filter { predicate, input } => LogicalPlan::Filter {
            predicate,
            input: Box::new(f(*input)),
        },
        LogicalPlan::Projection { exprs, input } => LogicalPlan::Projection {
            exprs,
            input: Box::new(f(*input)),
        },
        LogicalPlan::Sort { order, input } => LogicalPlan::Sort {
            order,
            input: Box::new(f(*input)),
        },
        LogicalPlan::Window { exprs, input } => LogicalPlan::Window {
            exprs,
            input: Box::new(f(*input)),
        },
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input: Box::new(f(*input)),
        },
        LogicalPlan::UnresolvedAggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => LogicalPlan::UnresolvedAggregate {
            group_exprs,
            aggr_exprs,
            input: Box::new(f(*input)),
        },
        LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
            n,
            input: Box::new(f(*input)),
        },
    }
}

/// Fallible variant of [`map_plan_children`] for rules that can fail while
/// rebuilding a node.
pub fn try_map_plan_children<F>(plan: LogicalPlan, f: &mut F) -> Result<LogicalPlan>
where
    F: FnMut(LogicalPlan) -> Result<LogicalPlan>,
{
    Ok(match plan {
        LogicalPlan::TableScan { .. } => plan,
        LogicalPlan::Filter { predicate, input } => LogicalPlan::Filter {
            predicate,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Projection { exprs, input } => LogicalPlan::Projection {
            exprs,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Sort { order, input } => LogicalPlan::Sort {
            order,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Window { exprs, input } => LogicalPlan::Window {
            exprs,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::UnresolvedAggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => LogicalPlan::UnresolvedAggregate {
            group_exprs,
            aggr_exprs,
            input: Box::new(f(*input)?),
        },
        LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
            n,
            input: Box::new(f(*input)?),
        },
    })
}

/// Rebuild an expression node with `f` applied to each direct child.
pub fn map_expr_children<F>(expr: Expr, f: &mut F) -> Expr
where
    F: FnMut(Expr) -> Expr,
{
    match expr {
        Expr::Column(_) | Expr::ColumnRef { .. } | Expr::Literal(_) => expr,
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(f(*left)),
            op,
            right: Box::new(f(*right)),
        },
        Expr::InList {
            expr,
            list,
            negated,
        } => Expr::InList {
            expr: Box::new(f(*expr)),
            list: list.into_iter().map(&mut *f).collect(),
            negated,
        },
        Expr::Cast { expr, to_type } => Expr::Cast {
            expr: Box::new(f(*expr)),
            to_type,
        },
        Expr::And(a, b) => Expr::And(Box::new(f(*a)), Box::new(f(*b))),
        Expr::Or(a, b) => Expr::Or(Box::new(f(*a)), Box::new(f(*b))),
        Expr::Not(e) => Expr::Not(Box::new(f(*e))),
        Expr::Alias { expr, name } => Expr::Alias {
            expr: Box::new(f(*expr)),
            name,
        },
        Expr::WindowFunction(mut w) => {
            w.args = w.args.into_iter().map(&mut *f).collect();
            w.partition_by = w.partition_by.into_iter().map(&mut *f).collect();
            w.order_by = w
                .order_by
                .into_iter()
                .map(|s| SortExpr {
                    expr: f(s.expr),
                    ascending: s.ascending,
                })
                .collect();
            Expr::WindowFunction(w)
        }
    }
}

/// True when `pred` holds for any node in the plan tree, the root included.
pub fn plan_contains<F>(plan: &LogicalPlan, pred: &F) -> bool
where
    F: Fn(&LogicalPlan) -> bool,
{
    if pred(plan) {
        return true;
    }
    match plan {
        LogicalPlan::TableScan { .. } => false,
        LogicalPlan::Filter { input, .. }
        | LogicalPlan::Projection { input, .. }
        | LogicalPlan::Sort { input, .. }
        | LogicalPlan::Window { input, .. }
        | LogicalPlan::Aggregate { input, .. }
        | LogicalPlan::UnresolvedAggregate { input, .. }
        | LogicalPlan::Limit { input, .. } => plan_contains(input, pred),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_plan::{BinaryOp, LiteralValue};

    fn scan(table: &str) -> LogicalPlan {
        LogicalPlan::TableScan {
            table: table.to_string(),
            projection: None,
            filters: vec![],
        }
    }

    #[test]
    fn transform_is_top_down() {
        // Rewrites the outer filter into a limit; the rewritten node's child
        // must still be visited, so the inner filter is rewritten too.
        let plan = LogicalPlan::Filter {
            predicate: Expr::Literal(LiteralValue::Boolean(true)),
            input: Box::new(LogicalPlan::Filter {
                predicate: Expr::Literal(LiteralValue::Boolean(false)),
                input: Box::new(scan("t")),
            }),
        };
        let out = transform_plan_down(plan, &mut |p| match p {
            LogicalPlan::Filter { input, .. } => Some(LogicalPlan::Limit {
                n: 1,
                input: input.clone(),
            }),
            _ => None,
        });
        match out {
            LogicalPlan::Limit { input, .. } => match *input {
                LogicalPlan::Limit { input, .. } => {
                    assert_eq!(*input, scan("t"));
                }
                other => panic!("inner node not rewritten: {other:?}"),
            },
            other => panic!("outer node not rewritten: {other:?}"),
        }
    }

    #[test]
    fn unmatched_tree_is_unchanged() {
        let plan = LogicalPlan::Filter {
            predicate: Expr::Column("x".to_string()),
            input: Box::new(scan("t")),
        };
        let out = transform_plan_down(plan.clone(), &mut |_| None);
        assert_eq!(out, plan);
    }

    #[test]
    fn expr_transform_reaches_nested_children() {
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::Not(Box::new(Expr::Column("a".to_string())))),
            op: BinaryOp::Eq,
            right: Box::new(Expr::Column("b".to_string())),
        };
        let out = transform_expr_down(expr, &mut |e| match e {
            Expr::Column(name) => Some(Expr::ColumnRef {
                name: name.clone(),
                index: 0,
            }),
            _ => None,
        });
        assert!(out.is_resolved());
    }
}
