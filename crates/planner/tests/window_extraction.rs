use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use slate_planner::{
    Analyzer, AnalyzerConfig, AnalyzerRule, Expr, ExtractWindowFromProjection,
    ExtractWindowFromSort, LiteralValue, LogicalPlan, SchemaProvider, SortExpr, WindowAliasGenerator,
    WindowFunction,
};

struct TestCtx {
    schemas: HashMap<String, SchemaRef>,
}

impl TestCtx {
    fn sales() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(
            "sales".to_string(),
            Arc::new(Schema::new(vec![
                Field::new("dept", DataType::Utf8, false),
                Field::new("salary", DataType::Int64, false),
                Field::new("price", DataType::Float64, false),
            ])),
        );
        TestCtx { schemas }
    }
}

impl SchemaProvider for TestCtx {
    fn table_schema(&self, table: &str) -> slate_common::Result<SchemaRef> {
        self.schemas
            .get(table)
            .cloned()
            .ok_or_else(|| slate_common::SlateError::Planning(format!("unknown table: {table}")))
    }
}

fn scan_sales() -> LogicalPlan {
    LogicalPlan::TableScan {
        table: "sales".to_string(),
        projection: None,
        filters: vec![],
    }
}

fn rank_over_dept() -> Expr {
    Expr::WindowFunction(WindowFunction {
        name: "rank".to_string(),
        args: vec![],
        partition_by: vec![Expr::Column("dept".to_string())],
        order_by: vec![SortExpr {
            expr: Expr::Column("salary".to_string()),
            ascending: false,
        }],
        data_type: DataType::Int64,
    })
}

fn analyze(plan: LogicalPlan) -> slate_common::Result<LogicalPlan> {
    Analyzer::new().analyze(plan, &TestCtx::sales(), AnalyzerConfig::default())
}

#[test]
fn projection_window_is_hoisted_into_window_stage() {
    // SELECT rank() OVER (...), price FROM sales
    let plan = LogicalPlan::Projection {
        exprs: vec![
            (rank_over_dept(), "r".to_string()),
            (Expr::Column("price".to_string()), "price".to_string()),
        ],
        input: Box::new(scan_sales()),
    };

    let analyzed = analyze(plan).expect("analyze");
    let rendered = slate_planner::explain_logical(&analyzed);
    assert!(rendered.contains("Window"), "explain output: {rendered}");
    match analyzed {
        LogicalPlan::Projection { exprs, input } => {
            // Original expressions now reference the hoisted alias.
            assert_eq!(exprs.len(), 2);
            match &exprs[0].0 {
                Expr::ColumnRef { name, .. } => assert_eq!(name, "__window_0"),
                other => panic!("expected alias reference, got {other:?}"),
            }
            match &exprs[1].0 {
                Expr::ColumnRef { name, .. } => assert_eq!(name, "price"),
                other => panic!("expected price column, got {other:?}"),
            }
            match *input {
                LogicalPlan::Window { exprs, input } => {
                    assert_eq!(exprs.len(), 1);
                    match &exprs[0] {
                        Expr::Alias { expr, name } => {
                            assert_eq!(name, "__window_0");
                            assert!(matches!(**expr, Expr::WindowFunction(_)));
                        }
                        other => panic!("expected aliased window function, got {other:?}"),
                    }
                    assert!(matches!(*input, LogicalPlan::TableScan { .. }));
                }
                other => panic!("expected window stage under projection, got {other:?}"),
            }
        }
        other => panic!("expected projection root, got {other:?}"),
    }
}

#[test]
fn duplicate_window_functions_share_one_computation() {
    // The same window call in two output expressions collapses into one
    // alias; both occurrences reference it.
    let plan = LogicalPlan::Projection {
        exprs: vec![
            (rank_over_dept(), "a".to_string()),
            (
                Expr::BinaryOp {
                    left: Box::new(rank_over_dept()),
                    op: slate_planner::BinaryOp::Plus,
                    right: Box::new(Expr::Literal(LiteralValue::Int64(1))),
                },
                "b".to_string(),
            ),
        ],
        input: Box::new(scan_sales()),
    };

    let analyzed = analyze(plan).expect("analyze");
    match analyzed {
        LogicalPlan::Projection { exprs, input } => {
            let window_exprs = match *input {
                LogicalPlan::Window { exprs, .. } => exprs,
                other => panic!("expected window stage, got {other:?}"),
            };
            assert_eq!(window_exprs.len(), 1, "duplicates must share one alias");

            let first = match &exprs[0].0 {
                Expr::ColumnRef { name, .. } => name.clone(),
                other => panic!("expected alias reference, got {other:?}"),
            };
            let second = match &exprs[1].0 {
                Expr::BinaryOp { left, .. } => match left.as_ref() {
                    Expr::ColumnRef { name, .. } => name.clone(),
                    other => panic!("expected alias reference inside sum, got {other:?}"),
                },
                other => panic!("expected composite expression, got {other:?}"),
            };
            assert_eq!(first, second);
        }
        other => panic!("expected projection root, got {other:?}"),
    }
}

#[test]
fn projection_without_windows_is_untouched() {
    let plan = LogicalPlan::Projection {
        exprs: vec![(Expr::Column("price".to_string()), "price".to_string())],
        input: Box::new(scan_sales()),
    };
    let rule = ExtractWindowFromProjection::new(Arc::new(WindowAliasGenerator::default()));
    let out = rule.rewrite(plan.clone(), &TestCtx::sales()).expect("rewrite");
    assert_eq!(out, plan);
}

#[test]
fn sort_window_is_hoisted_with_restoring_projection() {
    // ORDER BY rank() OVER (...): the window column is synthetic and must be
    // hidden from downstream stages by a trailing projection.
    let plan = LogicalPlan::Sort {
        order: vec![
            SortExpr {
                expr: rank_over_dept(),
                ascending: true,
            },
            SortExpr {
                expr: Expr::Column("price".to_string()),
                ascending: false,
            },
        ],
        input: Box::new(scan_sales()),
    };

    let analyzed = analyze(plan).expect("analyze");
    match analyzed {
        LogicalPlan::Projection { exprs, input } => {
            let names: Vec<&str> = exprs.iter().map(|(_, n)| n.as_str()).collect();
            assert_eq!(names, vec!["dept", "salary", "price"]);

            match *input {
                LogicalPlan::Sort { order, input } => {
                    match &order[0].expr {
                        Expr::ColumnRef { name, .. } => assert_eq!(name, "__window_0"),
                        other => panic!("expected alias reference sort key, got {other:?}"),
                    }
                    assert!(order[0].ascending);
                    match *input {
                        LogicalPlan::Window { exprs, input } => {
                            assert_eq!(exprs.len(), 1);
                            assert!(matches!(*input, LogicalPlan::TableScan { .. }));
                        }
                        other => panic!("expected window under sort, got {other:?}"),
                    }
                }
                other => panic!("expected sort under projection, got {other:?}"),
            }
        }
        other => panic!("expected restoring projection root, got {other:?}"),
    }
}

#[test]
fn sort_without_windows_is_untouched() {
    let plan = LogicalPlan::Sort {
        order: vec![SortExpr {
            expr: Expr::Column("price".to_string()),
            ascending: true,
        }],
        input: Box::new(scan_sales()),
    };
    let rule = ExtractWindowFromSort::new(Arc::new(WindowAliasGenerator::default()));
    let out = rule.rewrite(plan.clone(), &TestCtx::sales()).expect("rewrite");
    assert_eq!(out, plan);
}

#[test]
fn unresolved_aggregate_anywhere_defers_sort_extraction() {
    // The Sort stage itself is ready for extraction, but an unresolved
    // aggregate above it must freeze the whole tree for this pass.
    let sort = LogicalPlan::Sort {
        order: vec![SortExpr {
            expr: rank_over_dept(),
            ascending: true,
        }],
        input: Box::new(scan_sales()),
    };
    let plan = LogicalPlan::UnresolvedAggregate {
        group_exprs: vec![Expr::Column("dept".to_string())],
        aggr_exprs: vec![(
            slate_planner::AggExpr::Sum(Expr::Column("salary".to_string())),
            "total".to_string(),
        )],
        input: Box::new(sort),
    };

    let rule = ExtractWindowFromSort::new(Arc::new(WindowAliasGenerator::default()));
    let out = rule.rewrite(plan.clone(), &TestCtx::sales()).expect("rewrite");
    assert_eq!(out, plan, "guarded pass must leave the entire tree unchanged");
}

#[test]
fn deferred_sort_extraction_runs_after_aggregate_resolution() {
    // Same tree as above pushed through the full analyzer: a later pass
    // clears the marker and the extraction then proceeds.
    let sort = LogicalPlan::Sort {
        order: vec![SortExpr {
            expr: rank_over_dept(),
            ascending: true,
        }],
        input: Box::new(scan_sales()),
    };
    let plan = LogicalPlan::UnresolvedAggregate {
        group_exprs: vec![Expr::Column("dept".to_string())],
        aggr_exprs: vec![(
            slate_planner::AggExpr::Sum(Expr::Column("salary".to_string())),
            "total".to_string(),
        )],
        input: Box::new(sort),
    };

    let analyzed = analyze(plan).expect("analyze");
    match &analyzed {
        LogicalPlan::Aggregate { input, .. } => match input.as_ref() {
            LogicalPlan::Projection { input, .. } => match input.as_ref() {
                LogicalPlan::Sort { input, .. } => {
                    assert!(matches!(input.as_ref(), LogicalPlan::Window { .. }));
                }
                other => panic!("expected sort under projection, got {other:?}"),
            },
            other => panic!("expected restoring projection, got {other:?}"),
        },
        other => panic!("expected resolved aggregate root, got {other:?}"),
    }
    assert!(analyzed.is_resolved());
}
