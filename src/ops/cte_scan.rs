//! CTEScan (spec §4.5): serves the rows of a WITH-bound name. Non-recursive
//! CTEs are materialized once when the outer `Select` is planned; recursive
//! ones are materialized by driving `cte::semi_naive_fixpoint` over the
//! anchor/recursive-term pair. Either way, by the time a `CTEScan` exists
//! the rows are already in hand — this operator just streams them under
//! the CTE's alias.

use crate::errors::EngineResult;
use crate::iter::{RowIter, Schema};
use crate::value::Value;

pub struct CteScan {
    schema: Schema,
    rows: Vec<Vec<Value>>,
    pos: usize,
    started: bool,
}

impl CteScan {
    pub fn new(alias: &str, column_names: &[String], rows: Vec<Vec<Value>>) -> Self {
        Self {
            schema: Schema::prefixed(alias, column_names),
            rows,
            pos: 0,
            started: false,
        }
    }
}

impl RowIter for CteScan {
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
