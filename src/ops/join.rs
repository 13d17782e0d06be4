//! NestedLoopJoin and HashJoin (spec §4.5).
//!
//! Both materialize their build side once (the right side for
//! NestedLoopJoin, since it is rescanned per left row) and construct every
//! output row up front; `rowset::MatchedSet` tracks which build-side rows
//! were ever matched so RIGHT/FULL OUTER can emit the unmatched remainder
//! padded with Nulls on the probe side.

use crate::ast::{Expr, JoinType};
use crate::errors::EngineResult;
use crate::expr::{self, SubqueryRunner};
use crate::iter::{RowIter, Schema};
use crate::rowset::MatchedSet;
use crate::value::Value;

fn drain(mut iter: Box<dyn RowIter + '_>) -> EngineResult<(Schema, Vec<Vec<Value>>)> {
    let schema = iter.schema().clone();
    let mut rows = Vec::new();
    while iter.next()? {
        rows.push(iter.row().to_vec());
    }
    iter.close();
    Ok((schema, rows))
}

fn null_row(len: usize) -> Vec<Value> {
    vec![Value::Null; len]
}

pub struct NestedLoopJoin {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    pos: usize,
    started: bool,
}

impl NestedLoopJoin {
    pub fn new(
        left: Box<dyn RowIter + '_>,
        right: Box<dyn RowIter + '_>,
        join_type: JoinType,
        on: Option<&Expr>,
        runner: &mut dyn SubqueryRunner,
    ) -> EngineResult<Self> {
        let (left_schema, left_rows) = drain(left)?;
        let (right_schema, right_rows) = drain(right)?;
        let schema = Schema::concat(&left_schema, &right_schema);
        let names = schema.name_map();

        let mut right_matched = MatchedSet::new(right_rows.len() as u32);
        let mut out = Vec::new();

        for (li, l) in left_rows.iter().enumerate() {
            let mut left_matched = false;
            for (ri, r) in right_rows.iter().enumerate() {
                let mut combined = l.clone();
                combined.extend(r.iter().cloned());
                let keep = match on {
                    Some(pred) => expr::is_predicate_true(&expr::eval(pred, &combined, &names, runner)?),
                    None => true,
                };
                if keep {
                    left_matched = true;
                    right_matched.mark(ri as u32);
                    out.push(combined);
                }
                let _ = li;
            }
            if !left_matched && matches!(join_type, JoinType::LeftOuter | JoinType::FullOuter) {
                let mut combined = l.clone();
                combined.extend(null_row(right_schema.names.len()));
                out.push(combined);
            }
        }

        if matches!(join_type, JoinType::RightOuter | JoinType::FullOuter) {
            for (ri, r) in right_rows.iter().enumerate() {
                if !right_matched.is_marked(ri as u32) {
                    let mut combined = null_row(left_schema.names.len());
                    combined.extend(r.iter().cloned());
                    out.push(combined);
                }
            }
        }

        Ok(Self {
            schema,
            rows: out,
            pos: 0,
            started: false,
        })
    }
}

impl RowIter for NestedLoopJoin {
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

/// Equi-join variant: builds a hash table on the right side keyed by
/// `right_key`'s join key (see `join_key`), skipping Null keys (a Null key
/// never matches
/// anything, same as `=` under three-valued logic), then probes with each
/// left row's `left_key`. Only INNER is implemented; an outer HashJoin
/// degrades to NestedLoopJoin at the call site.
pub struct HashJoin {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    pos: usize,
    started: bool,
}

impl HashJoin {
    pub fn new(
        left: Box<dyn RowIter + '_>,
        right: Box<dyn RowIter + '_>,
        left_key: &Expr,
        right_key: &Expr,
        runner: &mut dyn SubqueryRunner,
    ) -> EngineResult<Self> {
        let (left_schema, left_rows) = drain(left)?;
        let (right_schema, right_rows) = drain(right)?;
        let schema = Schema::concat(&left_schema, &right_schema);
        let left_names = left_schema.name_map();
        let right_names = right_schema.name_map();

        let mut build: std::collections::HashMap<String, Vec<usize>> = std::collections::HashMap::new();
        for (ri, r) in right_rows.iter().enumerate() {
            let key = expr::eval(right_key, r, &right_names, runner)?;
            if key.is_null() {
                continue;
            }
            build.entry(join_key(&key)).or_default().push(ri);
        }

        let mut out = Vec::new();
        for l in &left_rows {
            let key = expr::eval(left_key, l, &left_names, runner)?;
            if key.is_null() {
                continue;
            }
            if let Some(indices) = build.get(&join_key(&key)) {
                for &ri in indices {
                    let mut combined = l.clone();
                    combined.extend(right_rows[ri].iter().cloned());
                    out.push(combined);
                }
            }
        }

        Ok(Self {
            schema,
            rows: out,
            pos: 0,
            started: false,
        })
    }
}

/// Hash key for a join-equality value: Int and Float key identically when
/// numerically equal so `1 = 1.0` matches across types (spec §4.5 "Int/Float
/// cross-type via promotion"), unlike `Value::fingerprint`'s type-distinct
/// multiset keys used for DISTINCT/set operations.
fn join_key(v: &Value) -> String {
    match v {
        Value::Int(i) => format!("N:{}", *i as f64),
        Value::Float(f) => format!("N:{f}"),
        other => {
            let mut fp = String::new();
            other.fingerprint(&mut fp);
            fp
        }
    }
}

impl RowIter for HashJoin {
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
