//! Logical plan analysis for Slate.
//!
//! Architecture role:
//! - turns an unresolved logical plan into a resolved, strictly typed plan
//! - hosts the rule-driven tree-rewriting engine and the window-extraction
//!   rules built on it
//! - provides the scalar comparison/ordering semantics the resolved types
//!   guarantee
//!
//! Key modules:
//! - [`logical_plan`]: plan and expression trees
//! - [`transform`]: top-down rewrite combinators
//! - [`types`]: primitive classification, widest-common-type, promotion
//! - [`analyzer`]: strict typing resolver and the rule batch driver
//! - [`window`]: window-function extraction rules
//! - [`eval`]: comparison, ordering, and set-membership evaluation

pub mod analyzer;
pub mod eval;
pub mod explain;
pub mod logical_plan;
pub mod transform;
pub mod types;
pub mod window;

pub use analyzer::{Analyzer, AnalyzerConfig, AnalyzerRule, ResolveAggregates, SchemaProvider};
pub use eval::{compare_values, eval_binary, eval_comparison, eval_in_list};
pub use explain::explain_logical;
pub use logical_plan::{
    AggExpr, BinaryOp, Expr, LiteralValue, LogicalPlan, SortExpr, WindowFunction,
};
pub use transform::{
    map_expr_children, map_plan_children, plan_contains, transform_expr_down, transform_plan_down,
    try_map_plan_children,
};
pub use types::{
    cast_if_needed, coerce_for_arith, coerce_for_compare, is_numeric, is_primitive, literal_type,
    narrows_into, promote_value, widest_common_type,
};
pub use window::{ExtractWindowFromProjection, ExtractWindowFromSort, WindowAliasGenerator};
