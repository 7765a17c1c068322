use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use slate_common::{Result, SlateError};
use tracing::debug;

use crate::logical_plan::{AggExpr, Expr, LogicalPlan, SortExpr};
use crate::transform::transform_plan_down;
use crate::types::{
    cast_if_needed, coerce_for_arith, coerce_for_compare, is_numeric, is_primitive, literal_type,
    narrow_literal_to, narrows_into,
};
use crate::window::{ExtractWindowFromProjection, ExtractWindowFromSort, WindowAliasGenerator};

/// The analyzer needs schemas to resolve columns.
/// The surrounding engine provides this from its catalog; rules borrow it and
/// never own it.
pub trait SchemaProvider {
    /// Return schema for a table by name.
    fn table_schema(&self, table: &str) -> Result<SchemaRef>;
}

/// Configuration knobs for plan analysis.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Upper bound on rule-batch passes before analysis gives up. Each pass
    /// is idempotent on an already-analyzed tree, so a well-behaved rule set
    /// converges well below this.
    pub max_passes: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { max_passes: 8 }
    }
}

/// One analysis rewrite: a pure function over plans, safe to invoke
/// repeatedly. Rules that decline to act (structural preconditions not met)
/// return the plan unchanged rather than erroring.
pub trait AnalyzerRule: Send + Sync {
    /// Stable rule name used by registry.
    fn name(&self) -> &str;
    /// Rewrite input plan and return transformed plan.
    fn rewrite(&self, plan: LogicalPlan, ctx: &dyn SchemaProvider) -> Result<LogicalPlan>;
}

/// Logical-plan semantic analyzer.
///
/// Runs an ordered batch of rewrite rules followed by strict typing, repeated
/// until the tree stops changing:
/// 1. aggregate resolution (clears the unresolved-aggregate marker)
/// 2. window extraction from projections
/// 3. window extraction from sort keys (guarded on 1 having completed)
/// 4. user-registered custom rules (deterministic by name)
/// 5. column resolution + strict typing, expression by expression
///
/// Guarantees after convergence:
/// - unresolved `Expr::Column` references become `Expr::ColumnRef`;
/// - expression/aggregate types are inferred and checked;
/// - required casts are inserted for supported promotions;
/// - every Projection/Sort/Window stage this analyzer produced has the
///   extraction shapes documented on the window rules.
pub struct Analyzer {
    rules: Vec<Arc<dyn AnalyzerRule>>,
    custom_rules: RwLock<HashMap<String, Arc<dyn AnalyzerRule>>>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .custom_rules
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("Analyzer")
            .field("rules", &self.rules.len())
            .field("custom_rules", &count)
            .finish()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    /// Create a new analyzer with the built-in rule batch. Window alias names
    /// are unique within this analyzer's lifetime (one analysis session).
    pub fn new() -> Self {
        let aliases = Arc::new(WindowAliasGenerator::default());
        Self {
            rules: vec![
                Arc::new(ResolveAggregates),
                Arc::new(ExtractWindowFromProjection::new(Arc::clone(&aliases))),
                Arc::new(ExtractWindowFromSort::new(aliases)),
            ],
            custom_rules: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace a custom analysis rule.
    ///
    /// Returns `true` when an existing rule with the same name was replaced.
    pub fn register_rule(&self, rule: Arc<dyn AnalyzerRule>) -> bool {
        self.custom_rules
            .write()
            .expect("analyzer rule lock poisoned")
            .insert(rule.name().to_string(), rule)
            .is_some()
    }

    /// Deregister a custom analysis rule by name.
    ///
    /// Returns `true` when an existing rule was removed.
    pub fn deregister_rule(&self, name: &str) -> bool {
        self.custom_rules
            .write()
            .expect("analyzer rule lock poisoned")
            .remove(name)
            .is_some()
    }

    /// Analyze a logical plan to fixed point and return the resolved,
    /// type-checked plan.
    pub fn analyze(
        &self,
        plan: LogicalPlan,
        provider: &dyn SchemaProvider,
        cfg: AnalyzerConfig,
    ) -> Result<LogicalPlan> {
        if cfg.max_passes == 0 {
            return Err(SlateError::InvalidConfig(
                "analyzer max_passes must be > 0".to_string(),
            ));
        }

        let mut plan = plan;
        for pass in 0..cfg.max_passes {
            let before = plan.clone();

            for rule in &self.rules {
                plan = rule.rewrite(plan, provider)?;
            }

            let mut customs = self
                .custom_rules
                .read()
                .expect("analyzer rule lock poisoned")
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect::<Vec<_>>();
            customs.sort_by(|a, b| a.0.cmp(&b.0));
            for (_name, rule) in customs {
                plan = rule.rewrite(plan, provider)?;
            }

            let (typed, _schema, _resolver) = self.analyze_plan(plan, provider)?;
            plan = typed;

            if plan == before {
                debug!(pass, "analysis reached fixed point");
                return Ok(plan);
            }
        }

        Err(SlateError::Planning(format!(
            "analysis did not converge within {} passes",
            cfg.max_passes
        )))
    }

    // -------------------------
    // Internal analysis plumbing
    // -------------------------

    fn analyze_plan(
        &self,
        plan: LogicalPlan,
        provider: &dyn SchemaProvider,
    ) -> Result<(LogicalPlan, SchemaRef, Resolver)> {
        match plan {
            LogicalPlan::TableScan {
                table,
                projection,
                filters,
            } => {
                let schema = provider.table_schema(&table)?;
                let mut resolver = Resolver::from_table(&table, schema);

                let mut analyzed_filters = vec![];
                for f in filters {
                    let (af, t) = self.resolve_expr(f, &resolver)?;
                    if t != DataType::Boolean {
                        return Err(SlateError::Planning(
                            "table scan filter must be boolean".to_string(),
                        ));
                    }
                    analyzed_filters.push(af);
                }

                if let Some(cols) = &projection {
                    let (proj_schema, proj_resolver) = resolver.project(cols)?;
                    resolver = proj_resolver;
                    Ok((
                        LogicalPlan::TableScan {
                            table,
                            projection,
                            filters: analyzed_filters,
                        },
                        proj_schema,
                        resolver,
                    ))
                } else {
                    Ok((
                        LogicalPlan::TableScan {
                            table,
                            projection,
                            filters: analyzed_filters,
                        },
                        resolver.schema(),
                        resolver,
                    ))
                }
            }

            LogicalPlan::Filter { predicate, input } => {
                let (ain, schema, resolver) = self.analyze_plan(*input, provider)?;
                let (pred, t) = self.resolve_expr(predicate, &resolver)?;
                if t != DataType::Boolean {
                    return Err(SlateError::Planning(
                        "WHERE predicate must be boolean".to_string(),
                    ));
                }
                Ok((
                    LogicalPlan::Filter {
                        predicate: pred,
                        input: Box::new(ain),
                    },
                    schema,
                    resolver,
                ))
            }

            LogicalPlan::Projection { exprs, input } => {
                let (ain, _in_schema, in_resolver) = self.analyze_plan(*input, provider)?;

                let mut out_fields: Vec<Field> = vec![];
                let mut out_exprs: Vec<(Expr, String)> = vec![];

                for (e, name) in exprs {
                    let (ae, dt) = self.resolve_expr(e, &in_resolver)?;
                    out_fields.push(Field::new(&name, dt.clone(), true));
                    out_exprs.push((ae, name));
                }

                let out_schema = Arc::new(Schema::new(out_fields));
                let out_resolver = Resolver::anonymous(out_schema.clone());

                Ok((
                    LogicalPlan::Projection {
                        exprs: out_exprs,
                        input: Box::new(ain),
                    },
                    out_schema,
                    out_resolver,
                ))
            }

            LogicalPlan::Sort { order, input } => {
                let (ain, schema, resolver) = self.analyze_plan(*input, provider)?;
                let mut out_order = Vec::with_capacity(order.len());
                for s in order {
                    out_order.push(self.resolve_sort_expr(s, &resolver)?);
                }
                Ok((
                    LogicalPlan::Sort {
                        order: out_order,
                        input: Box::new(ain),
                    },
                    schema,
                    resolver,
                ))
            }

            LogicalPlan::Window { exprs, input } => {
                let (ain, in_schema, in_resolver) = self.analyze_plan(*input, provider)?;

                let mut alias_fields: Vec<Field> = vec![];
                let mut out_exprs: Vec<Expr> = vec![];
                for e in exprs {
                    let name = match &e {
                        Expr::Alias { name, .. } => name.clone(),
                        other => {
                            return Err(SlateError::Planning(format!(
                                "window stage expression must be aliased, got {other:?}"
                            )));
                        }
                    };
                    let (ae, dt) = self.resolve_expr(e, &in_resolver)?;
                    alias_fields.push(Field::new(&name, dt, true));
                    out_exprs.push(ae);
                }

                // Window output is the child's columns plus the alias columns.
                let alias_schema = Arc::new(Schema::new(alias_fields));
                let out_resolver =
                    Resolver::join(in_resolver, Resolver::anonymous(alias_schema.clone()));
                let mut fields: Vec<Field> = in_schema
                    .fields()
                    .iter()
                    .map(|f| f.as_ref().clone())
                    .collect();
                fields.extend(alias_schema.fields().iter().map(|f| f.as_ref().clone()));
                let out_schema = Arc::new(Schema::new(fields));

                Ok((
                    LogicalPlan::Window {
                        exprs: out_exprs,
                        input: Box::new(ain),
                    },
                    out_schema,
                    out_resolver,
                ))
            }

            LogicalPlan::Aggregate {
                group_exprs,
                aggr_exprs,
                input,
            } => {
                let (ain, group, aggs, schema, resolver) =
                    self.analyze_aggregate(group_exprs, aggr_exprs, *input, provider)?;
                Ok((
                    LogicalPlan::Aggregate {
                        group_exprs: group,
                        aggr_exprs: aggs,
                        input: Box::new(ain),
                    },
                    schema,
                    resolver,
                ))
            }

            // Typed like an aggregate but the marker stays; only the
            // aggregate-resolution rule may clear it.
            LogicalPlan::UnresolvedAggregate {
                group_exprs,
                aggr_exprs,
                input,
            } => {
                let (ain, group, aggs, schema, resolver) =
                    self.analyze_aggregate(group_exprs, aggr_exprs, *input, provider)?;
                Ok((
                    LogicalPlan::UnresolvedAggregate {
                        group_exprs: group,
                        aggr_exprs: aggs,
                        input: Box::new(ain),
                    },
                    schema,
                    resolver,
                ))
            }

            LogicalPlan::Limit { n, input } => {
                let (ain, schema, resolver) = self.analyze_plan(*input, provider)?;
                Ok((
                    LogicalPlan::Limit {
                        n,
                        input: Box::new(ain),
                    },
                    schema,
                    resolver,
                ))
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn analyze_aggregate(
        &self,
        group_exprs: Vec<Expr>,
        aggr_exprs: Vec<(AggExpr, String)>,
        input: LogicalPlan,
        provider: &dyn SchemaProvider,
    ) -> Result<(
        LogicalPlan,
        Vec<Expr>,
        Vec<(AggExpr, String)>,
        SchemaRef,
        Resolver,
    )> {
        let (ain, _in_schema, in_resolver) = self.analyze_plan(input, provider)?;

        let mut out_fields: Vec<Field> = vec![];
        let mut out_group: Vec<Expr> = vec![];
        for g in group_exprs {
            let (ag, dt) = self.resolve_expr(g, &in_resolver)?;
            out_fields.push(Field::new(expr_name(&ag), dt, true));
            out_group.push(ag);
        }

        let mut out_aggs: Vec<(AggExpr, String)> = vec![];
        for (agg, name) in aggr_exprs {
            let (aagg, dt) = self.resolve_agg(agg, &in_resolver)?;
            out_fields.push(Field::new(&name, dt, true));
            out_aggs.push((aagg, name));
        }

        let out_schema = Arc::new(Schema::new(out_fields));
        let out_resolver = Resolver::anonymous(out_schema.clone());
        Ok((ain, out_group, out_aggs, out_schema, out_resolver))
    }

    fn resolve_agg(&self, agg: AggExpr, resolver: &Resolver) -> Result<(AggExpr, DataType)> {
        match agg {
            AggExpr::Count(e) => {
                let (ae, _dt) = self.resolve_expr(e, resolver)?;
                Ok((AggExpr::Count(ae), DataType::Int64))
            }
            AggExpr::Sum(e) => {
                let (ae, dt) = self.resolve_expr(e, resolver)?;
                if !is_numeric(&dt) {
                    return Err(SlateError::TypeMismatch(format!(
                        "SUM() requires numeric, got {dt:?}"
                    )));
                }
                Ok((AggExpr::Sum(ae), dt))
            }
            AggExpr::Min(e) => {
                let (ae, dt) = self.resolve_expr(e, resolver)?;
                Ok((AggExpr::Min(ae), dt))
            }
            AggExpr::Max(e) => {
                let (ae, dt) = self.resolve_expr(e, resolver)?;
                Ok((AggExpr::Max(ae), dt))
            }
            AggExpr::Avg(e) => {
                let (ae, dt) = self.resolve_expr(e, resolver)?;
                if !is_numeric(&dt) {
                    return Err(SlateError::TypeMismatch(format!(
                        "AVG() requires numeric, got {dt:?}"
                    )));
                }
                Ok((AggExpr::Avg(ae), DataType::Float64))
            }
        }
    }

    /// Strict typing resolver: compute the fully resolved, type-checked form
    /// of one expression, or fail with a `TypeMismatch`.
    ///
    /// Idempotent: resolving an already-resolved expression returns a value
    /// equal to its input.
    fn resolve_expr(&self, expr: Expr, resolver: &Resolver) -> Result<(Expr, DataType)> {
        match expr {
            Expr::Column(name) => {
                let (idx, dt) = resolver.resolve(&name)?;
                Ok((Expr::ColumnRef { name, index: idx }, dt))
            }
            Expr::ColumnRef { name, index } => {
                let dt = resolver.data_type_at(index)?;
                Ok((Expr::ColumnRef { name, index }, dt))
            }
            Expr::Literal(v) => {
                let dt = literal_type(&v);
                Ok((Expr::Literal(v), dt))
            }
            Expr::Cast { expr, to_type } => {
                let (ae, _dt) = self.resolve_expr(*expr, resolver)?;
                Ok((
                    Expr::Cast {
                        expr: Box::new(ae),
                        to_type: to_type.clone(),
                    },
                    to_type,
                ))
            }
            Expr::And(l, r) => {
                let (al, ldt) = self.resolve_expr(*l, resolver)?;
                let (ar, rdt) = self.resolve_expr(*r, resolver)?;
                if ldt != DataType::Boolean || rdt != DataType::Boolean {
                    return Err(SlateError::TypeMismatch(format!(
                        "AND requires boolean operands, got {ldt:?} and {rdt:?}"
                    )));
                }
                Ok((Expr::And(Box::new(al), Box::new(ar)), DataType::Boolean))
            }
            Expr::Or(l, r) => {
                let (al, ldt) = self.resolve_expr(*l, resolver)?;
                let (ar, rdt) = self.resolve_expr(*r, resolver)?;
                if ldt != DataType::Boolean || rdt != DataType::Boolean {
                    return Err(SlateError::TypeMismatch(format!(
                        "OR requires boolean operands, got {ldt:?} and {rdt:?}"
                    )));
                }
                Ok((Expr::Or(Box::new(al), Box::new(ar)), DataType::Boolean))
            }
            Expr::Not(e) => {
                let (ae, dt) = self.resolve_expr(*e, resolver)?;
                if dt != DataType::Boolean {
                    return Err(SlateError::TypeMismatch(format!(
                        "NOT requires boolean operand, got {dt:?}"
                    )));
                }
                Ok((Expr::Not(Box::new(ae)), DataType::Boolean))
            }
            Expr::BinaryOp { left, op, right } => {
                let (al, ldt) = self.resolve_expr(*left, resolver)?;
                let (ar, rdt) = self.resolve_expr(*right, resolver)?;

                if op.is_comparison() {
                    let (cl, cr, _common) = coerce_for_compare(al, ldt, ar, rdt)?;
                    Ok((
                        Expr::BinaryOp {
                            left: Box::new(cl),
                            op,
                            right: Box::new(cr),
                        },
                        DataType::Boolean,
                    ))
                } else {
                    let (cl, cr, out) = coerce_for_arith(op, al, ldt, ar, rdt)?;
                    Ok((
                        Expr::BinaryOp {
                            left: Box::new(cl),
                            op,
                            right: Box::new(cr),
                        },
                        out,
                    ))
                }
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                // The test expression's resolved type is the reference type;
                // every element must narrow into it.
                let (ae, ref_dt) = self.resolve_expr(*expr, resolver)?;
                let mut out_list = Vec::with_capacity(list.len());
                for e in list {
                    let (elem, dt) = self.resolve_expr(e, resolver)?;
                    if narrows_into(&dt, &ref_dt) {
                        out_list.push(cast_if_needed(elem, &dt, &ref_dt));
                    } else if let Some(narrowed) = narrow_literal_to(&elem, &ref_dt) {
                        out_list.push(narrowed);
                    } else {
                        return Err(SlateError::TypeMismatch(format!(
                            "IN list element type {dt:?} does not narrow into test type {ref_dt:?}"
                        )));
                    }
                }
                Ok((
                    Expr::InList {
                        expr: Box::new(ae),
                        list: out_list,
                        negated,
                    },
                    DataType::Boolean,
                ))
            }
            Expr::Alias { expr, name } => {
                let (ae, dt) = self.resolve_expr(*expr, resolver)?;
                Ok((
                    Expr::Alias {
                        expr: Box::new(ae),
                        name,
                    },
                    dt,
                ))
            }
            Expr::WindowFunction(mut w) => {
                let mut args = Vec::with_capacity(w.args.len());
                for a in w.args {
                    let (ae, _dt) = self.resolve_expr(a, resolver)?;
                    args.push(ae);
                }
                let mut partition_by = Vec::with_capacity(w.partition_by.len());
                for p in w.partition_by {
                    let (ap, _dt) = self.resolve_expr(p, resolver)?;
                    partition_by.push(ap);
                }
                let mut order_by = Vec::with_capacity(w.order_by.len());
                for s in w.order_by {
                    order_by.push(self.resolve_sort_expr(s, resolver)?);
                }
                w.args = args;
                w.partition_by = partition_by;
                w.order_by = order_by;
                let dt = w.data_type.clone();
                Ok((Expr::WindowFunction(w), dt))
            }
        }
    }

    /// Non-primitive types carry no total ordering and cannot be sorted.
    /// Direction does not affect typing.
    fn resolve_sort_expr(&self, sort: SortExpr, resolver: &Resolver) -> Result<SortExpr> {
        let (ae, dt) = self.resolve_expr(sort.expr, resolver)?;
        if !is_primitive(&dt) {
            return Err(SlateError::TypeMismatch(format!(
                "sort key requires a primitive type, got {dt:?}"
            )));
        }
        Ok(SortExpr {
            expr: ae,
            ascending: sort.ascending,
        })
    }
}

/// Clears the unresolved-aggregate marker once the aggregate's input is fully
/// resolved. Sort-window extraction is blocked until this has run over the
/// whole tree.
pub struct ResolveAggregates;

impl AnalyzerRule for ResolveAggregates {
    fn name(&self) -> &str {
        "resolve_aggregates"
    }

    fn rewrite(&self, plan: LogicalPlan, _ctx: &dyn SchemaProvider) -> Result<LogicalPlan> {
        Ok(transform_plan_down(plan, &mut |p| match p {
            LogicalPlan::UnresolvedAggregate {
                group_exprs,
                aggr_exprs,
                input,
            } if input.is_resolved() => Some(LogicalPlan::Aggregate {
                group_exprs: group_exprs.clone(),
                aggr_exprs: aggr_exprs.clone(),
                input: input.clone(),
            }),
            _ => None,
        }))
    }
}

// -------------------------
// Resolver (name -> idx, dt)
// -------------------------

#[derive(Debug, Clone)]
struct Relation {
    name: String,
    fields: Vec<Arc<Field>>,
}

/// Maps (possibly qualified) column names to output indexes and data types.
#[derive(Debug, Clone)]
struct Resolver {
    relations: Vec<Relation>,
}

impl Resolver {
    fn from_table(table: &str, schema: SchemaRef) -> Self {
        Self {
            relations: vec![Relation {
                name: table.to_string(),
                fields: schema.fields().iter().cloned().collect(),
            }],
        }
    }

    fn anonymous(schema: SchemaRef) -> Self {
        Self {
            relations: vec![Relation {
                name: "".to_string(),
                fields: schema.fields().iter().cloned().collect(),
            }],
        }
    }

    fn join(left: Resolver, right: Resolver) -> Self {
        let mut rels = vec![];
        rels.extend(left.relations);
        rels.extend(right.relations);
        Self { relations: rels }
    }

    fn schema(&self) -> SchemaRef {
        let mut fields: Vec<Field> = vec![];
        for r in &self.relations {
            for f in &r.fields {
                fields.push((**f).clone());
            }
        }
        Arc::new(Schema::new(fields))
    }

    fn project(&self, cols: &[String]) -> Result<(SchemaRef, Resolver)> {
        let mut out_fields = vec![];
        for c in cols {
            let (idx, _dt) = self.resolve(c)?;
            let f = self.field_at(idx)?;
            out_fields.push(f);
        }
        let schema = Arc::new(Schema::new(out_fields));
        Ok((schema.clone(), Resolver::anonymous(schema)))
    }

    fn resolve(&self, col: &str) -> Result<(usize, DataType)> {
        let (rel_opt, name) = split_qual(col);

        let mut found: Vec<(usize, DataType)> = vec![];
        let mut base = 0usize;

        for r in &self.relations {
            let rel_match = match rel_opt {
                Some(rel) => r.name == rel,
                None => true,
            };

            if rel_match {
                for (i, f) in r.fields.iter().enumerate() {
                    if f.name() == name {
                        found.push((base + i, f.data_type().clone()));
                    }
                }
            }
            base += r.fields.len();
        }

        match found.len() {
            0 => Err(SlateError::Planning(format!("unknown column: {col}"))),
            1 => Ok(found[0].clone()),
            _ => Err(SlateError::Planning(format!(
                "ambiguous column reference: {col} (use table.col)"
            ))),
        }
    }

    fn field_at(&self, idx: usize) -> Result<Field> {
        let mut base = 0usize;
        for r in &self.relations {
            if idx < base + r.fields.len() {
                let f: &Arc<Field> = &r.fields[idx - base];
                return Ok((**f).clone());
            }
            base += r.fields.len();
        }
        Err(SlateError::Planning(format!(
            "column index out of range: {idx}"
        )))
    }

    fn data_type_at(&self, idx: usize) -> Result<DataType> {
        Ok(self.field_at(idx)?.data_type().clone())
    }
}

fn split_qual(s: &str) -> (Option<&str>, &str) {
    if let Some((a, b)) = s.split_once('.') {
        (Some(a), b)
    } else {
        (None, s)
    }
}

pub(crate) fn expr_name(e: &Expr) -> &str {
    match e {
        Expr::Column(name) => name.as_str(),
        Expr::ColumnRef { name, .. } => name.as_str(),
        Expr::Alias { name, .. } => name.as_str(),
        _ => "expr",
    }
}
