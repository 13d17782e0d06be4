//! UNION/INTERSECT/EXCEPT, ALL and distinct variants (spec §4.10).
//!
//! Multiset algebra over `Value::row_fingerprint` keys: ALL variants keep
//! per-key counts (UNION ALL sums them, INTERSECT ALL takes the min,
//! EXCEPT ALL subtracts and floors at zero); the distinct variants collapse
//! any positive count to one. Output order follows first appearance,
//! left side first.

use crate::ast::SetOp;
use crate::errors::EngineResult;
use crate::iter::{RowIter, Schema};
use crate::value::{row_fingerprint, Value};
use std::collections::HashMap;

pub struct SetOpIter {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    pos: usize,
    started: bool,
}

struct Side {
    counts: HashMap<String, usize>,
    rows: HashMap<String, Vec<Value>>,
    order: Vec<String>,
}

fn materialize(mut iter: Box<dyn RowIter + '_>) -> EngineResult<(Schema, Side)> {
    let schema = iter.schema().clone();
    let mut side = Side {
        counts: HashMap::new(),
        rows: HashMap::new(),
        order: Vec::new(),
    };
    while iter.next()? {
        let fp = row_fingerprint(iter.row());
        if !side.counts.contains_key(&fp) {
            side.order.push(fp.clone());
            side.rows.insert(fp.clone(), iter.row().to_vec());
        }
        *side.counts.entry(fp).or_insert(0) += 1;
    }
    iter.close();
    Ok((schema, side))
}

impl SetOpIter {
    pub fn new(op: SetOp, all: bool, left: Box<dyn RowIter + '_>, right: Box<dyn RowIter + '_>) -> EngineResult<Self> {
        let (schema, left_side) = materialize(left)?;
        let (_, right_side) = materialize(right)?;

        let mut rows = Vec::new();
        let mut push = |fp: &str, count: usize, side: &Side| {
            if let Some(row) = side.rows.get(fp) {
                let n = if all { count } else if count > 0 { 1 } else { 0 };
                for _ in 0..n {
                    rows.push(row.clone());
                }
            }
        };

        match op {
            SetOp::Union => {
                for fp in &left_side.order {
                    let lc = left_side.counts[fp];
                    let rc = right_side.counts.get(fp).copied().unwrap_or(0);
                    push(fp, lc + rc, &left_side);
                }
                for fp in &right_side.order {
                    if !left_side.counts.contains_key(fp) {
                        let rc = right_side.counts[fp];
                        push(fp, rc, &right_side);
                    }
                }
            }
            SetOp::Intersect => {
                for fp in &left_side.order {
                    let lc = left_side.counts[fp];
                    let rc = right_side.counts.get(fp).copied().unwrap_or(0);
                    push(fp, lc.min(rc), &left_side);
                }
            }
            SetOp::Except => {
                for fp in &left_side.order {
                    let rc = right_side.counts.get(fp).copied().unwrap_or(0);
                    if all {
                        let lc = left_side.counts[fp];
                        push(fp, lc.saturating_sub(rc), &left_side);
                    } else {
                        // Distinct EXCEPT removes a row entirely if it appears
                        // anywhere on the right, regardless of left's count.
                        push(fp, if rc == 0 { 1 } else { 0 }, &left_side);
                    }
                }
            }
        }

        Ok(Self {
            schema,
            rows,
            pos: 0,
            started: false,
        })
    }
}

impl RowIter for SetOpIter {
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
