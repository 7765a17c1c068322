use crate::logical_plan::{AggExpr, Expr, LogicalPlan, SortExpr};

/// Render logical plan as human-readable multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        LogicalPlan::TableScan {
            table,
            projection,
            filters,
        } => {
            out.push_str(&format!("{pad}TableScan table={table}\n"));
            out.push_str(&format!("{pad}  projection={:?}\n", projection));
            for f in filters {
                out.push_str(&format!("{pad}    {}\n", fmt_expr(f)));
            }
        }
        LogicalPlan::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Projection { exprs, input } => {
            out.push_str(&format!("{pad}Projection\n"));
            for (e, name) in exprs {
                out.push_str(&format!("{pad}  {name} := {}\n", fmt_expr(e)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Sort { order, input } => {
            out.push_str(&format!("{pad}Sort\n"));
            for s in order {
                out.push_str(&format!("{pad}  {}\n", fmt_sort(s)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Window { exprs, input } => {
            out.push_str(&format!("{pad}Window\n"));
            for e in exprs {
                out.push_str(&format!("{pad}  {}\n", fmt_expr(e)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            out.push_str(&format!("{pad}Aggregate\n"));
            out.push_str(&format!("{pad}  group_by={}\n", group_exprs.len()));
            for g in group_exprs {
                out.push_str(&format!("{pad}    {}\n", fmt_expr(g)));
            }
            out.push_str(&format!("{pad}  aggs={}\n", aggr_exprs.len()));
            for (a, name) in aggr_exprs {
                out.push_str(&format!("{pad}    {name} := {}\n", fmt_agg(a)));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::UnresolvedAggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            out.push_str(&format!(
                "{pad}UnresolvedAggregate group_by={} aggs={}\n",
                group_exprs.len(),
                aggr_exprs.len()
            ));
            fmt_plan(input, indent + 1, out);
        }
        LogicalPlan::Limit { n, input } => {
            out.push_str(&format!("{pad}Limit n={n}\n"));
            fmt_plan(input, indent + 1, out);
        }
    }
}

fn fmt_sort(s: &SortExpr) -> String {
    format!(
        "{} {}",
        fmt_expr(&s.expr),
        if s.ascending { "ASC" } else { "DESC" }
    )
}

fn fmt_agg(a: &AggExpr) -> String {
    match a {
        AggExpr::Count(e) => format!("count({})", fmt_expr(e)),
        AggExpr::Sum(e) => format!("sum({})", fmt_expr(e)),
        AggExpr::Min(e) => format!("min({})", fmt_expr(e)),
        AggExpr::Max(e) => format!("max({})", fmt_expr(e)),
        AggExpr::Avg(e) => format!("avg({})", fmt_expr(e)),
    }
}

fn fmt_expr(e: &Expr) -> String {
    match e {
        Expr::Column(c) => c.clone(),
        Expr::ColumnRef { name, index } => format!("{name}#{index}"),
        Expr::Literal(v) => format!("{v:?}"),
        Expr::Cast { expr, to_type } => format!("cast({} as {to_type:?})", fmt_expr(expr)),
        Expr::Not(x) => format!("NOT ({})", fmt_expr(x)),
        Expr::And(a, b) => format!("({}) AND ({})", fmt_expr(a), fmt_expr(b)),
        Expr::Or(a, b) => format!("({}) OR ({})", fmt_expr(a), fmt_expr(b)),
        Expr::BinaryOp { left, op, right } => {
            format!("({}) {:?} ({})", fmt_expr(left), op, fmt_expr(right))
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => format!(
            "({}) {}IN ({})",
            fmt_expr(expr),
            if *negated { "NOT " } else { "" },
            list.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
        ),
        Expr::Alias { expr, name } => format!("{} AS {name}", fmt_expr(expr)),
        Expr::WindowFunction(w) => format!(
            "{}({}) OVER (partition_by=[{}] order_by=[{}])",
            w.name,
            w.args.iter().map(fmt_expr).collect::<Vec<_>>().join(", "),
            w.partition_by
                .iter()
                .map(fmt_expr)
                .collect::<Vec<_>>()
                .join(", "),
            w.order_by.iter().map(fmt_sort).collect::<Vec<_>>().join(", ")
        ),
    }
}
