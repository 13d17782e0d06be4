//! HashAggregate (spec §4.5): groups rows by the GROUP BY expression tuple
//! keyed on `Value::fingerprint` (Null-equals-Null), folds one
//! `agg::Accumulator` per distinct aggregate call referenced anywhere in
//! the projection or HAVING clause, and emits one row per group.
//!
//! Column references inside the projection/HAVING that are neither an
//! aggregate call nor a GROUP BY expression resolve against the last row
//! seen in that group — SQLite's own permissive (non-standard-SQL)
//! behavior for ungrouped columns, which this core adopts rather than
//! rejecting such queries outright.

use std::collections::HashMap;

use crate::agg::{AggKind, Accumulator};
use crate::ast::{BinOp, Expr, SelectItem, UnaryOp};
use crate::errors::EngineResult;
use crate::expr::{self, SubqueryRunner};
use crate::iter::{NameMap, RowIter, Schema};
use crate::value::{ArithOp, Value};

struct GroupState {
    group_values: Vec<Value>,
    last_row: Vec<Value>,
    accs: HashMap<String, Accumulator>,
}

pub struct HashAggregate<'a> {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    pos: usize,
    started: bool,
    _marker: std::marker::PhantomData<&'a ()>,
}

fn agg_kind(name: &str) -> Option<AggKind> {
    match name.to_ascii_uppercase().as_str() {
        "COUNT" => Some(AggKind::Count),
        "SUM" => Some(AggKind::Sum),
        "MIN" => Some(AggKind::Min),
        "MAX" => Some(AggKind::Max),
        "AVG" => Some(AggKind::Avg),
        _ => None,
    }
}

fn agg_signature(name: &str, args: &[Expr], star: bool) -> String {
    format!("{}:{}:{:?}", name.to_ascii_uppercase(), star, args)
}

/// Whether `expr` contains an aggregate call anywhere in its tree — used by
/// the planner to decide whether a `SelectCore` with no GROUP BY still
/// needs a `HashAggregate` (a single implicit group over the whole input).
pub fn expr_has_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::FuncCall { name, args, .. } => agg_kind(name).is_some() || args.iter().any(expr_has_aggregate),
        Expr::Unary(_, inner) | Expr::Not(inner) => expr_has_aggregate(inner),
        Expr::Binary(_, l, r) | Expr::And(l, r) | Expr::Or(l, r) => expr_has_aggregate(l) || expr_has_aggregate(r),
        Expr::InList { expr, list, .. } => expr_has_aggregate(expr) || list.iter().any(expr_has_aggregate),
        _ => false,
    }
}

/// Walks `expr` collecting every distinct aggregate call into `sigs` as
/// `(signature, argument expr, is_count_star)`; the argument expr is
/// re-evaluated against every row in the fold loop below.
fn collect_aggregates(expr: &Expr, sigs: &mut Vec<(String, Expr, bool)>) {
    match expr {
        Expr::FuncCall { name, args, star } => {
            if agg_kind(name).is_some() {
                let sig = agg_signature(name, args, *star);
                if !sigs.iter().any(|(s, _, _)| s == &sig) {
                    let arg = args.first().cloned().unwrap_or(Expr::Literal(Value::Null));
                    sigs.push((sig, arg, *star));
                }
            } else {
                for a in args {
                    collect_aggregates(a, sigs);
                }
            }
        }
        Expr::Unary(_, inner) | Expr::Not(inner) => collect_aggregates(inner, sigs),
        Expr::Binary(_, l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
            collect_aggregates(l, sigs);
            collect_aggregates(r, sigs);
        }
        Expr::InList { expr, list, .. } => {
            collect_aggregates(expr, sigs);
            for item in list {
                collect_aggregates(item, sigs);
            }
        }
        _ => {}
    }
}

/// Evaluates `expr` for final projection, substituting finished aggregate
/// values where an aggregate call appears and falling back to `last_row`
/// for any other column reference.
fn eval_proj(
    expr: &Expr,
    last_row: &[Value],
    names: &NameMap,
    agg_values: &HashMap<String, Value>,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<Value> {
    if let Expr::FuncCall { name, args, star } = expr {
        if agg_kind(name).is_some() {
            let sig = agg_signature(name, args, *star);
            return Ok(agg_values.get(&sig).cloned().unwrap_or(Value::Null));
        }
    }
    match expr {
        Expr::Literal(_) | Expr::Column(_) => expr::eval(expr, last_row, names, runner),
        Expr::Unary(UnaryOp::Neg, inner) => eval_proj(inner, last_row, names, agg_values, runner)?.negate(),
        Expr::Not(inner) => {
            let v = eval_proj(inner, last_row, names, agg_values, runner)?;
            Ok(match v {
                Value::Null => Value::Null,
                other => expr::bool_val(!other.is_truthy()),
            })
        }
        Expr::Binary(op, l, r) => {
            let lv = eval_proj(l, last_row, names, agg_values, runner)?;
            let rv = eval_proj(r, last_row, names, agg_values, runner)?;
            match op {
                BinOp::Add => lv.arith(ArithOp::Add, &rv),
                BinOp::Sub => lv.arith(ArithOp::Sub, &rv),
                BinOp::Mul => lv.arith(ArithOp::Mul, &rv),
                BinOp::Div => lv.arith(ArithOp::Div, &rv),
                BinOp::Eq => Ok(opt_bool(lv.sql_eq(&rv))),
                BinOp::Ne => Ok(opt_bool(lv.sql_eq(&rv).map(|b| !b))),
                BinOp::Lt => Ok(opt_bool(lv.sql_cmp(&rv).map(|o| o == std::cmp::Ordering::Less))),
                BinOp::Le => Ok(opt_bool(lv.sql_cmp(&rv).map(|o| o != std::cmp::Ordering::Greater))),
                BinOp::Gt => Ok(opt_bool(lv.sql_cmp(&rv).map(|o| o == std::cmp::Ordering::Greater))),
                BinOp::Ge => Ok(opt_bool(lv.sql_cmp(&rv).map(|o| o != std::cmp::Ordering::Less))),
            }
        }
        Expr::And(l, r) => {
            let lv = eval_proj(l, last_row, names, agg_values, runner)?;
            let rv = eval_proj(r, last_row, names, agg_values, runner)?;
            Ok(expr::kleene_and(&lv, &rv))
        }
        Expr::Or(l, r) => {
            let lv = eval_proj(l, last_row, names, agg_values, runner)?;
            let rv = eval_proj(r, last_row, names, agg_values, runner)?;
            Ok(expr::kleene_or(&lv, &rv))
        }
        Expr::FuncCall { name, args, star } => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval_proj(a, last_row, names, agg_values, runner)?);
            }
            crate::func::call(name, &values, *star)
        }
        // Correlated subquery expressions inside an aggregated projection
        // are evaluated against the last row of the group directly.
        other => expr::eval(other, last_row, names, runner),
    }
}

fn opt_bool(b: Option<bool>) -> Value {
    match b {
        Some(b) => expr::bool_val(b),
        None => Value::Null,
    }
}

impl<'a> HashAggregate<'a> {
    pub fn new(
        mut child: Box<dyn RowIter + 'a>,
        group_by: &[Expr],
        projection: &[SelectItem],
        having: &Option<Expr>,
        runner: &mut dyn SubqueryRunner,
    ) -> EngineResult<Self> {
        let input_names = child.schema().name_map();

        let mut sigs = Vec::new();
        for item in projection {
            if let SelectItem::Expr { expr, .. } = item {
                collect_aggregates(expr, &mut sigs);
            }
        }
        if let Some(h) = having {
            collect_aggregates(h, &mut sigs);
        }

        let mut groups: HashMap<String, GroupState> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        while child.next()? {
            let row = child.row();
            let mut key_values = Vec::with_capacity(group_by.len());
            for g in group_by {
                key_values.push(expr::eval(g, row, &input_names, runner)?);
            }
            let mut key = String::new();
            for v in &key_values {
                v.fingerprint(&mut key);
            }

            let row_owned = row.to_vec();
            let is_new = !groups.contains_key(&key);
            if is_new {
                order.push(key.clone());
                let mut accs = HashMap::new();
                for (sig, _, _) in &sigs {
                    let kind = sig.split(':').next().and_then(agg_kind).unwrap_or(AggKind::Count);
                    accs.insert(sig.clone(), Accumulator::new(kind));
                }
                groups.insert(
                    key.clone(),
                    GroupState {
                        group_values: key_values.clone(),
                        last_row: row_owned.clone(),
                        accs,
                    },
                );
            }

            let mut inputs = Vec::with_capacity(sigs.len());
            for (_, arg, star) in &sigs {
                let input = if *star {
                    Value::Int(1)
                } else {
                    expr::eval(arg, &row_owned, &input_names, runner)?
                };
                inputs.push(input);
            }

            let state = groups.get_mut(&key).expect("group just inserted");
            state.last_row = row_owned;
            for ((sig, _, star), input) in sigs.iter().zip(inputs.iter()) {
                if let Some(acc) = state.accs.get_mut(sig) {
                    acc.fold(input, *star);
                }
            }
        }
        child.close();

        let mut out_labels = Vec::new();
        for item in projection {
            if let SelectItem::Expr { expr, alias } = item {
                out_labels.push(alias.clone().unwrap_or_else(|| match expr {
                    Expr::Column(n) => n.clone(),
                    _ => "?".to_string(),
                }));
            } else {
                out_labels.push("?".to_string());
            }
        }

        let group_key_names: Vec<String> = group_by
            .iter()
            .map(|g| match g {
                Expr::Column(n) => n.clone(),
                other => format!("{other:?}"),
            })
            .collect();
        let group_names = Schema::new(group_key_names).name_map();

        let mut rows = Vec::new();
        for key in &order {
            let state = &groups[key];
            let mut agg_values = HashMap::new();
            for (sig, _, _) in &sigs {
                agg_values.insert(sig.clone(), state.accs[sig].finish());
            }

            if let Some(h) = having {
                let v = eval_having(h, &state.group_values, &group_names, &state.last_row, &input_names, &agg_values, runner)?;
                if !expr::is_predicate_true(&v) {
                    continue;
                }
            }

            let mut out_row = Vec::with_capacity(projection.len());
            for item in projection {
                if let SelectItem::Expr { expr, .. } = item {
                    let v = eval_group_expr(expr, &state.group_values, &group_names, &state.last_row, &input_names, &agg_values, runner)?;
                    out_row.push(v);
                }
            }
            rows.push(out_row);
        }

        Ok(Self {
            schema: Schema::new(out_labels),
            rows,
            pos: 0,
            started: false,
            _marker: std::marker::PhantomData,
        })
    }
}

/// Resolves a Column either against the GROUP BY key schema or, failing
/// that, against the last row of the group (the permissive fallback).
fn resolve_grouped_column(
    name: &str,
    group_values: &[Value],
    group_names: &NameMap,
    last_row: &[Value],
    input_names: &NameMap,
) -> Option<Value> {
    if let Some(idx) = group_names.resolve(name) {
        return group_values.get(idx).cloned();
    }
    input_names.resolve(name).and_then(|idx| last_row.get(idx).cloned())
}

fn eval_group_expr(
    expr: &Expr,
    group_values: &[Value],
    group_names: &NameMap,
    last_row: &[Value],
    input_names: &NameMap,
    agg_values: &HashMap<String, Value>,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<Value> {
    if let Expr::Column(name) = expr {
        if let Some(v) = resolve_grouped_column(name, group_values, group_names, last_row, input_names) {
            return Ok(v);
        }
    }
    eval_proj(expr, last_row, input_names, agg_values, runner)
}

fn eval_having(
    expr: &Expr,
    group_values: &[Value],
    group_names: &NameMap,
    last_row: &[Value],
    input_names: &NameMap,
    agg_values: &HashMap<String, Value>,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<Value> {
    eval_group_expr(expr, group_values, group_names, last_row, input_names, agg_values, runner)
}

impl<'a> RowIter for HashAggregate<'a> {
    fn next(&mut self) -> EngineResult<bool> {
        if !self.started {
            self.started = true;
        } else {
            self.pos += 1;
        }
        Ok(self.pos < self.rows.len())
    }

    fn row(&self) -> &[Value] {
        &self.rows[self.pos]
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn close(&mut self) {
        self.pos = self.rows.len();
    }
}
