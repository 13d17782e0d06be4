//! Filter (spec §4.5): evaluates a predicate against each child row and
//! passes through only rows where it is `Int ≠ 0`, not Null — three-valued
//! `WHERE` semantics live in `expr::is_predicate_true`.

use crate::ast::Expr;
use crate::errors::EngineResult;
use crate::expr::{self, SubqueryRunner};
use crate::iter::{NameMap, RowIter, Schema};

pub struct Filter<'a> {
    child: Box<dyn RowIter + 'a>,
    predicate: Expr,
    names: NameMap,
    runner: Box<dyn SubqueryRunner + 'a>,
}

impl<'a> Filter<'a> {
    pub fn new(child: Box<dyn RowIter + 'a>, predicate: Expr, runner: Box<dyn SubqueryRunner + 'a>) -> Self {
        let names = child.schema().name_map();
        Self { child, predicate, names, runner }
    }
}

impl<'a> RowIter for Filter<'a> {
    fn next(&mut self) -> EngineResult<bool> {
        loop {
            if !self.child.next()? {
                return Ok(false);
            }
            let v = expr::eval(&self.predicate, self.child.row(), &self.names, self.runner.as_mut())?;
            if expr::is_predicate_true(&v) {
                return Ok(true);
            }
        }
    }

    fn row(&self) -> &[crate::value::Value] {
        self.child.row()
    }

    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn close(&mut self) {
        self.child.close();
    }
}
