use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use slate_planner::{
    transform_plan_down, Analyzer, AnalyzerConfig, AnalyzerRule, BinaryOp, Expr, LiteralValue,
    LogicalPlan, SchemaProvider,
};

struct TestCtx {
    schema: SchemaRef,
}

impl SchemaProvider for TestCtx {
    fn table_schema(&self, _table: &str) -> slate_common::Result<SchemaRef> {
        Ok(Arc::clone(&self.schema))
    }
}

struct LimitCapRule;

impl AnalyzerRule for LimitCapRule {
    fn name(&self) -> &str {
        "test_limit_cap"
    }

    fn rewrite(
        &self,
        plan: LogicalPlan,
        _ctx: &dyn SchemaProvider,
    ) -> slate_common::Result<LogicalPlan> {
        Ok(transform_plan_down(plan, &mut |p| match p {
            LogicalPlan::Limit { n, input } if *n > 100 => Some(LogicalPlan::Limit {
                n: 100,
                input: input.clone(),
            }),
            _ => None,
        }))
    }
}

#[test]
fn custom_rule_runs_in_the_analysis_batch() {
    let ctx = TestCtx {
        schema: Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)])),
    };
    let plan = LogicalPlan::Limit {
        n: 5000,
        input: Box::new(LogicalPlan::Filter {
            predicate: Expr::BinaryOp {
                left: Box::new(Expr::Column("x".to_string())),
                op: BinaryOp::Gt,
                right: Box::new(Expr::Literal(LiteralValue::Int64(10))),
            },
            input: Box::new(LogicalPlan::TableScan {
                table: "t".to_string(),
                projection: None,
                filters: vec![],
            }),
        }),
    };

    let analyzer = Analyzer::new();
    assert!(!analyzer.register_rule(Arc::new(LimitCapRule)));
    let analyzed = analyzer
        .analyze(plan, &ctx, AnalyzerConfig::default())
        .expect("analyze");

    match analyzed {
        LogicalPlan::Limit { n, input } => {
            assert_eq!(n, 100);
            match *input {
                LogicalPlan::Filter { predicate, .. } => {
                    assert!(predicate.is_resolved(), "typing still ran: {predicate:?}");
                }
                other => panic!("expected filter, got {other:?}"),
            }
        }
        other => panic!("expected capped limit, got {other:?}"),
    }

    assert!(analyzer.deregister_rule("test_limit_cap"));
    assert!(!analyzer.deregister_rule("test_limit_cap"));
}
