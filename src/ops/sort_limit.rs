//! Sort and Limit (spec §4.5): Sort materializes its child and orders it by
//! `Value::compare`, DESC inverting the ordering with ties left stable;
//! Limit skips `offset` rows then yields at most `limit` (a negative limit
//! means unbounded, matching the teacher's own LIMIT/OFFSET convention).

use crate::ast::OrderKey;
use crate::errors::EngineResult;
use crate::expr::{self, SubqueryRunner};
use crate::iter::{NameMap, RowIter, Schema};
use crate::value::Value;

pub struct Sort<'a> {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    pos: usize,
    started: bool,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> Sort<'a> {
    pub fn new(mut child: Box<dyn RowIter + 'a>, keys: &[OrderKey], runner: &mut dyn SubqueryRunner) -> EngineResult<Self> {
        let schema = child.schema().clone();
        let names = schema.name_map();
        let mut rows = Vec::new();
        while child.next()? {
            rows.push(child.row().to_vec());
        }
        child.close();

        let mut sort_keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut key = Vec::with_capacity(keys.len());
            for k in keys {
                key.push(expr::eval(&k.expr, row, &names, runner)?);
            }
            sort_keys.push(key);
        }
        let mut indices: Vec<usize> = (0..rows.len()).collect();
        indices.sort_by(|&a, &b| {
            for (i, k) in keys.iter().enumerate() {
                let ord = sort_keys[a][i].compare(&sort_keys[b][i]);
                let ord = if k.desc { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        let rows = indices.into_iter().map(|i| rows[i].clone()).collect();

        Ok(Self {
            schema,
            rows,
            pos: 0,
            started: false,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<'a> RowIter for Sort<'a> {
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

/// Evaluates `limit`/`offset` expressions against the empty row (they carry
/// no column references, spec §4.5 Limit) and returns `(offset, limit)`
/// with `limit = None` meaning unbounded.
pub fn eval_limit_offset(
    limit: &Option<crate::ast::Expr>,
    offset: &Option<crate::ast::Expr>,
    runner: &mut dyn SubqueryRunner,
) -> EngineResult<(i64, Option<i64>)> {
    let empty = empty_name_map();
    let off = match offset {
        Some(e) => floor_to_int(&expr::eval(e, &[], &empty, runner)?).unwrap_or(0).max(0),
        None => 0,
    };
    let lim = match limit {
        Some(e) => {
            let v = floor_to_int(&expr::eval(e, &[], &empty, runner)?).unwrap_or(-1);
            if v < 0 {
                None
            } else {
                Some(v)
            }
        }
        None => None,
    };
    Ok((off, lim))
}

/// LIMIT/OFFSET accept Int or Float, flooring the latter (spec §4.5).
fn floor_to_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Float(f) => Some(f.floor() as i64),
        _ => None,
    }
}

fn empty_name_map() -> NameMap {
    Schema::new(Vec::new()).name_map()
}

pub struct Limit<'a> {
    child: Box<dyn RowIter + 'a>,
    remaining_offset: i64,
    remaining: Option<i64>,
}

impl<'a> Limit<'a> {
    pub fn new(child: Box<dyn RowIter + 'a>, offset: i64, limit: Option<i64>) -> Self {
        Self {
            child,
            remaining_offset: offset,
            remaining: limit,
        }
    }
}

impl<'a> RowIter for Limit<'a> {
    fn next(&mut self) -> EngineResult<bool> {
        if let Some(0) = self.remaining {
            return Ok(false);
        }
        while self.remaining_offset > 0 {
            if !self.child.next()? {
                return Ok(false);
            }
            self.remaining_offset -= 1;
        }
        if !self.child.next()? {
            return Ok(false);
        }
        if let Some(n) = &mut self.remaining {
            *n -= 1;
        }
        Ok(true)
    }

    fn row(&self) -> &[Value] {
        self.child.row()
    }

    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn close(&mut self) {
        self.child.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Select;

    struct VecIter {
        schema: Schema,
        rows: Vec<Vec<Value>>,
        pos: usize,
        started: bool,
    }
    impl RowIter for VecIter {
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
        fn close(&mut self) {}
    }
    struct NoSub;
    impl SubqueryRunner for NoSub {
        fn run(&mut self, _q: &Select) -> EngineResult<Vec<Vec<Value>>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn sorts_descending_with_nulls_first_ascending() {
        let child = Box::new(VecIter {
            schema: Schema::new(vec!["t.x".to_string()]),
            rows: vec![vec![Value::Int(3)], vec![Value::Null], vec![Value::Int(1)]],
            pos: 0,
            started: false,
        });
        let keys = vec![OrderKey { expr: crate::ast::Expr::Column("x".to_string()), desc: false }];
        let mut sort = Sort::new(child, &keys, &mut NoSub).unwrap();
        let mut seen = Vec::new();
        while sort.next().unwrap() {
            seen.push(sort.row()[0].clone());
        }
        assert!(matches!(seen[0], Value::Null));
        assert_eq!(seen[1].as_int(), Some(1));
        assert_eq!(seen[2].as_int(), Some(3));
    }

    #[test]
    fn limit_zero_yields_nothing() {
        let child = Box::new(VecIter {
            schema: Schema::new(vec!["t.x".to_string()]),
            rows: vec![vec![Value::Int(1)], vec![Value::Int(2)]],
            pos: 0,
            started: false,
        });
        let mut lim = Limit::new(child, 0, Some(0));
        assert!(!lim.next().unwrap());
    }

    #[test]
    fn offset_past_end_yields_nothing() {
        let child = Box::new(VecIter {
            schema: Schema::new(vec!["t.x".to_string()]),
            rows: vec![vec![Value::Int(1)]],
            pos: 0,
            started: false,
        });
        let mut lim = Limit::new(child, 5, None);
        assert!(!lim.next().unwrap());
    }
}
