//! Expression evaluator (spec §4.3).
//!
//! Evaluates an `ast::Expr` against a row and its `iter::NameMap`. Three-
//! valued logic throughout: a Null operand propagates Null from
//! arithmetic and comparisons; AND/OR follow SQL's Kleene truth tables
//! rather than collapsing straight to a boolean.
//!
//! Subquery execution is reached through the `SubqueryRunner` trait rather
//! than a direct dependency on the plan executor, so this module stays
//! free of the executor's context plumbing; `plan_exec::ExecContext`
//! implements it.

use crate::ast::{BinOp, Expr, FromItem, Select, SelectBody, SelectCore, SelectItem, UnaryOp};
use crate::errors::{EngineError, EngineResult};
use crate::func;
use crate::iter::NameMap;
use crate::value::Value;

pub trait SubqueryRunner {
    /// Executes `query` and returns its materialized rows. Used for
    /// `IN (subquery)`, `EXISTS`, and scalar subqueries.
    fn run(&mut self, query: &Select) -> EngineResult<Vec<Vec<Value>>>;
}

pub fn eval(expr: &Expr, row: &[Value], names: &NameMap, runner: &mut dyn SubqueryRunner) -> EngineResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Column(name) => {
            let idx = names.resolve(name).ok_or_else(|| {
                if names.is_ambiguous(name) {
                    EngineError::AmbiguousColumn(name.clone())
                } else {
                    EngineError::ColumnNotFound(name.clone())
                }
            })?;
            row.get(idx).cloned().ok_or_else(|| EngineError::ColumnNotFound(name.clone()))
        }
        Expr::Unary(UnaryOp::Neg, inner) => eval(inner, row, names, runner)?.negate(),
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, row, names, runner),
        Expr::And(lhs, rhs) => {
            let l = eval(lhs, row, names, runner)?;
            if matches!(l, Value::Int(0)) {
                return Ok(Value::Int(0));
            }
            let r = eval(rhs, row, names, runner)?;
            Ok(kleene_and(&l, &r))
        }
        Expr::Or(lhs, rhs) => {
            let l = eval(lhs, row, names, runner)?;
            if l.is_truthy() && !l.is_null() {
                return Ok(Value::Int(1));
            }
            let r = eval(rhs, row, names, runner)?;
            Ok(kleene_or(&l, &r))
        }
        Expr::Not(inner) => {
            let v = eval(inner, row, names, runner)?;
            Ok(match v {
                Value::Null => Value::Null,
                other => Value::Int(if other.is_truthy() { 0 } else { 1 }),
            })
        }
        Expr::InList { expr, list, negated } => {
            let needle = eval(expr, row, names, runner)?;
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let candidate = eval(item, row, names, runner)?;
                match needle.sql_eq(&candidate) {
                    Some(true) => return Ok(bool_val(!negated)),
                    Some(false) => {}
                    None => saw_null = true,
                }
            }
            if saw_null {
                Ok(Value::Null)
            } else {
                Ok(bool_val(*negated))
            }
        }
        Expr::InSubquery { expr, query, negated } => {
            let needle = eval(expr, row, names, runner)?;
            let correlated = substitute_outer_columns(query, names, row);
            let rows = runner.run(&correlated)?;
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for r in &rows {
                let candidate = r.first().cloned().unwrap_or(Value::Null);
                match needle.sql_eq(&candidate) {
                    Some(true) => return Ok(bool_val(!negated)),
                    Some(false) => {}
                    None => saw_null = true,
                }
            }
            if saw_null {
                Ok(Value::Null)
            } else {
                Ok(bool_val(*negated))
            }
        }
        Expr::Exists { query, negated } => {
            let correlated = substitute_outer_columns(query, names, row);
            let rows = runner.run(&correlated)?;
            Ok(bool_val(rows.is_empty() == *negated))
        }
        Expr::ScalarSubquery(query) => {
            let correlated = substitute_outer_columns(query, names, row);
            let rows = runner.run(&correlated)?;
            match rows.len() {
                0 => Ok(Value::Null),
                1 => Ok(rows[0].first().cloned().unwrap_or(Value::Null)),
                _ => Err(EngineError::ScalarSubqueryCardinality),
            }
        }
        Expr::FuncCall { name, args, star } => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval(a, row, names, runner)?);
            }
            func::call(name, &values, *star)
        }
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    row: &[Value],
    names: &NameMap,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<Value> {
    let l = eval(lhs, row, names, runner)?;
    let r = eval(rhs, row, names, runner)?;
    use crate::value::ArithOp;
    match op {
        BinOp::Add => l.arith(ArithOp::Add, &r),
        BinOp::Sub => l.arith(ArithOp::Sub, &r),
        BinOp::Mul => l.arith(ArithOp::Mul, &r),
        BinOp::Div => l.arith(ArithOp::Div, &r),
        BinOp::Eq => Ok(opt_bool(l.sql_eq(&r))),
        BinOp::Ne => Ok(opt_bool(l.sql_eq(&r).map(|b| !b))),
        BinOp::Lt => Ok(opt_bool(l.sql_cmp(&r).map(|o| o == std::cmp::Ordering::Less))),
        BinOp::Le => Ok(opt_bool(l.sql_cmp(&r).map(|o| o != std::cmp::Ordering::Greater))),
        BinOp::Gt => Ok(opt_bool(l.sql_cmp(&r).map(|o| o == std::cmp::Ordering::Greater))),
        BinOp::Ge => Ok(opt_bool(l.sql_cmp(&r).map(|o| o != std::cmp::Ordering::Less))),
    }
}

pub(crate) fn bool_val(b: bool) -> Value {
    Value::Int(if b { 1 } else { 0 })
}

fn opt_bool(b: Option<bool>) -> Value {
    match b {
        Some(b) => bool_val(b),
        None => Value::Null,
    }
}

pub(crate) fn kleene_and(l: &Value, r: &Value) -> Value {
    let lt = !l.is_null() && l.is_truthy();
    let rt = !r.is_null() && r.is_truthy();
    if l.is_null() && (r.is_null() || rt) {
        Value::Null
    } else if r.is_null() && lt {
        Value::Null
    } else {
        bool_val(lt && rt)
    }
}

pub(crate) fn kleene_or(l: &Value, r: &Value) -> Value {
    let lt = !l.is_null() && l.is_truthy();
    let rt = !r.is_null() && r.is_truthy();
    if lt || rt {
        bool_val(true)
    } else if l.is_null() || r.is_null() {
        Value::Null
    } else {
        bool_val(false)
    }
}

/// Predicate truthiness for WHERE/HAVING: Null and 0 are both false (spec
/// §4.5 Filter: "Int ≠ 0, not Null").
pub fn is_predicate_true(v: &Value) -> bool {
    !v.is_null() && v.is_truthy()
}

/// Deep-copies `query`, replacing every `Column` reference that resolves in
/// `outer_names` with a `Literal` of the outer row's value (spec §4.3
/// "Correlated subqueries"). Original ASTs are never mutated; this always
/// operates on an owned copy produced by `clone()`.
pub fn substitute_outer_columns(query: &Select, outer_names: &NameMap, outer_row: &[Value]) -> Select {
    let mut copy = query.clone();
    subst_select(&mut copy, outer_names, outer_row);
    copy
}

fn subst_select(select: &mut Select, names: &NameMap, row: &[Value]) {
    for cte in &mut select.with {
        subst_body(&mut cte.anchor, names, row);
        if let Some(rec) = &mut cte.recursive_term {
            subst_body(rec, names, row);
        }
    }
    subst_body(&mut select.body, names, row);
    for key in &mut select.order_by {
        subst_expr(&mut key.expr, names, row);
    }
    if let Some(e) = &mut select.limit {
        subst_expr(e, names, row);
    }
    if let Some(e) = &mut select.offset {
        subst_expr(e, names, row);
    }
}

fn subst_body(body: &mut SelectBody, names: &NameMap, row: &[Value]) {
    match body {
        SelectBody::Query(core) => subst_core(core, names, row),
        SelectBody::SetOp { left, right, .. } => {
            subst_body(left, names, row);
            subst_body(right, names, row);
        }
    }
}

fn subst_core(core: &mut SelectCore, names: &NameMap, row: &[Value]) {
    for item in &mut core.projection {
        if let SelectItem::Expr { expr, .. } = item {
            subst_expr(expr, names, row);
        }
    }
    if let Some(from) = &mut core.from {
        subst_from(from, names, row);
    }
    if let Some(e) = &mut core.filter {
        subst_expr(e, names, row);
    }
    for g in &mut core.group_by {
        subst_expr(g, names, row);
    }
    if let Some(e) = &mut core.having {
        subst_expr(e, names, row);
    }
}

fn subst_from(from: &mut FromItem, names: &NameMap, row: &[Value]) {
    match from {
        FromItem::Table { .. } | FromItem::Cte { .. } => {}
        FromItem::Subquery { query, .. } => subst_select(query, names, row),
        FromItem::Join { left, right, on, .. } => {
            subst_from(left, names, row);
            subst_from(right, names, row);
            if let Some(e) = on {
                subst_expr(e, names, row);
            }
        }
    }
}

fn subst_expr(expr: &mut Expr, names: &NameMap, row: &[Value]) {
    match expr {
        Expr::Column(name) => {
            if let Some(idx) = names.resolve(name) {
                if let Some(v) = row.get(idx) {
                    *expr = Expr::Literal(v.clone());
                }
            }
        }
        Expr::Literal(_) => {}
        Expr::Unary(_, inner) | Expr::Not(inner) => subst_expr(inner, names, row),
        Expr::Binary(_, l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
            subst_expr(l, names, row);
            subst_expr(r, names, row);
        }
        Expr::InList { expr, list, .. } => {
            subst_expr(expr, names, row);
            for item in list {
                subst_expr(item, names, row);
            }
        }
        Expr::InSubquery { expr, query, .. } => {
            subst_expr(expr, names, row);
            subst_select(query, names, row);
        }
        Expr::Exists { query, .. } | Expr::ScalarSubquery(query) => subst_select(query, names, row),
        Expr::FuncCall { args, .. } => {
            for a in args {
                subst_expr(a, names, row);
            }
        }
    }
}
