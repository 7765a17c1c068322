use arrow_schema::DataType;
use serde::{Deserialize, Serialize};

/// Scalar expression tree.
///
/// Expressions are immutable values: a rewrite produces a new node and the
/// parent wraps the result. Structural equality (`PartialEq`) is the identity
/// used for window-function deduplication and no-op detection; never rely on
/// pointer identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Unresolved column reference by (possibly qualified) name.
    Column(String),
    /// Column reference resolved into the input row layout.
    ColumnRef { name: String, index: usize },
    Literal(LiteralValue),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Set-membership test: `expr [NOT] IN (list...)`.
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Cast {
        expr: Box<Expr>,
        to_type: DataType,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Binds a sub-expression to a synthetic name so the rest of the tree can
    /// reference the result by name instead of duplicating the computation.
    Alias { expr: Box<Expr>, name: String },
    /// Windowed computation, evaluated over a partition/order frame.
    WindowFunction(WindowFunction),
}

impl Expr {
    /// True when every reference in the subtree has been bound.
    ///
    /// Type queries on an expression are only meaningful once the strict-typing
    /// resolver has produced its resolved form; this check is purely
    /// structural.
    pub fn is_resolved(&self) -> bool {
        match self {
            Expr::Column(_) => false,
            Expr::ColumnRef { .. } | Expr::Literal(_) => true,
            Expr::BinaryOp { left, right, .. } => left.is_resolved() && right.is_resolved(),
            Expr::InList { expr, list, .. } => {
                expr.is_resolved() && list.iter().all(|e| e.is_resolved())
            }
            Expr::Cast { expr, .. } => expr.is_resolved(),
            Expr::And(a, b) | Expr::Or(a, b) => a.is_resolved() && b.is_resolved(),
            Expr::Not(e) => e.is_resolved(),
            Expr::Alias { expr, .. } => expr.is_resolved(),
            Expr::WindowFunction(w) => {
                w.args.iter().all(|e| e.is_resolved())
                    && w.partition_by.iter().all(|e| e.is_resolved())
                    && w.order_by.iter().all(|s| s.expr.is_resolved())
            }
        }
    }

    /// True when a window function occurs anywhere in the subtree, including
    /// nested inside composite expressions.
    pub fn contains_window_function(&self) -> bool {
        match self {
            Expr::WindowFunction(_) => true,
            Expr::Column(_) | Expr::ColumnRef { .. } | Expr::Literal(_) => false,
            Expr::BinaryOp { left, right, .. } => {
                left.contains_window_function() || right.contains_window_function()
            }
            Expr::InList { expr, list, .. } => {
                expr.contains_window_function() || list.iter().any(|e| e.contains_window_function())
            }
            Expr::Cast { expr, .. } => expr.contains_window_function(),
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.contains_window_function() || b.contains_window_function()
            }
            Expr::Not(e) => e.contains_window_function(),
            Expr::Alias { expr, .. } => expr.contains_window_function(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl BinaryOp {
    /// True for the six comparison operators (result type boolean).
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

/// Sort specification: expression plus direction.
///
/// Direction never affects typing; only the sorted expression does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortExpr {
    pub expr: Expr,
    pub ascending: bool,
}

/// Windowed computation (for example `rank() OVER (PARTITION BY d ORDER BY s)`).
///
/// Analysis treats the computation opaquely: identity is structural equality
/// (for deduplication) and `data_type` is what the wrapping alias exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowFunction {
    pub name: String,
    pub args: Vec<Expr>,
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<SortExpr>,
    pub data_type: DataType,
}

/// Query-stage tree.
///
/// Like expressions, plans are immutable values; rules rebuild the spine they
/// change and share unchanged subtrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    TableScan {
        table: String,
        projection: Option<Vec<String>>,
        filters: Vec<Expr>,
    },
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    Projection {
        exprs: Vec<(Expr, String)>,
        input: Box<LogicalPlan>,
    },
    Sort {
        order: Vec<SortExpr>,
        input: Box<LogicalPlan>,
    },
    /// Windowing stage: each expression is an [`Expr::Alias`] wrapping one
    /// distinct window function. Output is the child's columns followed by the
    /// alias columns.
    Window {
        exprs: Vec<Expr>,
        input: Box<LogicalPlan>,
    },
    Aggregate {
        group_exprs: Vec<Expr>,
        aggr_exprs: Vec<(AggExpr, String)>,
        input: Box<LogicalPlan>,
    },
    /// Aggregate stage before aggregate analysis has validated it. Its
    /// presence anywhere in the tree blocks sort-window extraction.
    UnresolvedAggregate {
        group_exprs: Vec<Expr>,
        aggr_exprs: Vec<(AggExpr, String)>,
        input: Box<LogicalPlan>,
    },
    Limit {
        n: usize,
        input: Box<LogicalPlan>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggExpr {
    Count(Expr),
    Sum(Expr),
    Min(Expr),
    Max(Expr),
    Avg(Expr),
}

impl AggExpr {
    pub fn child(&self) -> &Expr {
        match self {
            AggExpr::Count(e)
            | AggExpr::Sum(e)
            | AggExpr::Min(e)
            | AggExpr::Max(e)
            | AggExpr::Avg(e) => e,
        }
    }
}

impl LogicalPlan {
    /// Derived resolution status: true iff every expression and reference in
    /// the subtree is bound and no unresolved-aggregate marker remains.
    pub fn is_resolved(&self) -> bool {
        match self {
            LogicalPlan::TableScan { filters, .. } => filters.iter().all(|e| e.is_resolved()),
            LogicalPlan::Filter { predicate, input } => {
                predicate.is_resolved() && input.is_resolved()
            }
            LogicalPlan::Projection { exprs, input } => {
                exprs.iter().all(|(e, _)| e.is_resolved()) && input.is_resolved()
            }
            LogicalPlan::Sort { order, input } => {
                order.iter().all(|s| s.expr.is_resolved()) && input.is_resolved()
            }
            LogicalPlan::Window { exprs, input } => {
                exprs.iter().all(|e| e.is_resolved()) && input.is_resolved()
            }
            LogicalPlan::Aggregate {
                group_exprs,
                aggr_exprs,
                input,
            } => {
                group_exprs.iter().all(|e| e.is_resolved())
                    && aggr_exprs.iter().all(|(a, _)| a.child().is_resolved())
                    && input.is_resolved()
            }
            LogicalPlan::UnresolvedAggregate { .. } => false,
            LogicalPlan::Limit { input, .. } => input.is_resolved(),
        }
    }
}
